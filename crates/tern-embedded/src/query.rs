//! Query builder.
//!
//! A [`Query`] is an immutable description of which entities of one kind to
//! return. Every builder method returns a new query. Mistakes in builder
//! calls (an unknown operator, a key filter on a plain property with the
//! wrong operator, a distinct query without projection) are recorded and
//! reported when the query runs.

use std::cmp::Ordering;

use serde_json::Value as Json;

use crate::context::Context;
use crate::error::{EmbeddedError, EmbeddedResult};
use crate::iter::Iter;
use crate::key::Key;
use crate::value::{Value, compare, property};

/// Pseudo-property naming the entity key in filters and orders.
pub const KEY_PROPERTY: &str = "__key__";

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterEqual,
}

impl Operator {
    fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "=" | "==" => Self::Equal,
            "!=" => Self::NotEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterEqual,
            _ => return None,
        })
    }

    fn accepts(self, ord: Ordering) -> bool {
        match self {
            Self::Equal => ord == Ordering::Equal,
            Self::NotEqual => ord != Ordering::Equal,
            Self::LessThan => ord == Ordering::Less,
            Self::LessEqual => ord != Ordering::Greater,
            Self::GreaterThan => ord == Ordering::Greater,
            Self::GreaterEqual => ord != Ordering::Less,
        }
    }
}

/// One property filter, in the order it was added.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Property name (dotted for nested properties) or `__key__`.
    pub field: String,
    /// Comparison operator.
    pub op: Operator,
    /// Right-hand side.
    pub value: Value,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// One sort order, in the order it was added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Property name or `__key__`.
    pub field: String,
    /// Sort direction.
    pub direction: Direction,
}

/// An unexecuted query over one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    kind: String,
    ancestor: Option<Key>,
    filters: Vec<Filter>,
    orders: Vec<Order>,
    projection: Vec<String>,
    limit: Option<usize>,
    offset: usize,
    distinct: bool,
    keys_only: bool,
    eventual: bool,
    err: Option<String>,
}

impl Query {
    /// A query returning every entity of `kind`.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ancestor: None,
            filters: Vec::new(),
            orders: Vec::new(),
            projection: Vec::new(),
            limit: None,
            offset: 0,
            distinct: false,
            keys_only: false,
            eventual: false,
            err: None,
        }
    }

    fn with(&self, f: impl FnOnce(&mut Self)) -> Self {
        let mut q = self.clone();
        f(&mut q);
        q
    }

    fn fail(&self, msg: String) -> Self {
        self.with(|q| {
            q.err.get_or_insert(msg);
        })
    }

    /// Restrict results to `ancestor` and its descendants.
    #[must_use]
    pub fn ancestor(&self, ancestor: &Key) -> Self {
        self.with(|q| q.ancestor = Some(ancestor.clone()))
    }

    /// Add a filter. `expr` is a property name followed by an optional
    /// operator, e.g. `"age >"`; a bare name means equality.
    #[must_use]
    pub fn filter(&self, expr: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        let mut parts = expr.split_whitespace();
        let Some(field) = parts.next() else {
            return self.fail(format!("empty filter expression {expr:?}"));
        };
        let op = match parts.next() {
            None => Operator::Equal,
            Some(op) => match Operator::parse(op) {
                Some(op) => op,
                None => return self.fail(format!("unknown filter operator {op:?}")),
            },
        };
        if parts.next().is_some() {
            return self.fail(format!("malformed filter expression {expr:?}"));
        }
        if field == KEY_PROPERTY && !matches!(value, Value::Key(_)) {
            return self.fail(format!("{KEY_PROPERTY} filters need a key value"));
        }
        self.with(|q| {
            q.filters.push(Filter {
                field: field.to_owned(),
                op,
                value,
            });
        })
    }

    /// Add a sort order; a leading `-` sorts descending.
    #[must_use]
    pub fn order(&self, field: &str) -> Self {
        let field = field.trim();
        let (field, direction) = match field.strip_prefix('-') {
            Some(rest) => (rest.trim(), Direction::Descending),
            None => (field, Direction::Ascending),
        };
        if field.is_empty() {
            return self.fail("empty order field".into());
        }
        self.with(|q| {
            q.orders.push(Order {
                field: field.to_owned(),
                direction,
            });
        })
    }

    /// Return at most `limit` results.
    #[must_use]
    pub fn limit(&self, limit: usize) -> Self {
        self.with(|q| q.limit = Some(limit))
    }

    /// Skip the first `offset` results.
    #[must_use]
    pub fn offset(&self, offset: usize) -> Self {
        self.with(|q| q.offset = offset)
    }

    /// Return only the named properties.
    #[must_use]
    pub fn project<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.with(|q| q.projection = fields)
    }

    /// Drop results whose projected properties repeat an earlier result.
    #[must_use]
    pub fn distinct(&self) -> Self {
        self.with(|q| q.distinct = true)
    }

    /// Return keys without entity bodies.
    #[must_use]
    pub fn keys_only(&self) -> Self {
        self.with(|q| q.keys_only = true)
    }

    /// Allow stale results. The engine is always strongly consistent, so
    /// this is recorded but changes nothing.
    #[must_use]
    pub fn eventual_consistency(&self) -> Self {
        self.with(|q| q.eventual = true)
    }

    /// The queried kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The ancestor restriction.
    #[must_use]
    pub fn ancestor_key(&self) -> Option<&Key> {
        self.ancestor.as_ref()
    }

    /// Filters in the order they were added.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Sort orders in the order they were added.
    #[must_use]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Projected property names.
    #[must_use]
    pub fn projection(&self) -> &[String] {
        &self.projection
    }

    /// Result limit, if any.
    #[must_use]
    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    /// Number of results skipped.
    #[must_use]
    pub fn offset_value(&self) -> usize {
        self.offset
    }

    /// Whether results are de-duplicated.
    #[must_use]
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Whether only keys are returned.
    #[must_use]
    pub fn is_keys_only(&self) -> bool {
        self.keys_only
    }

    /// Whether eventual consistency was requested.
    #[must_use]
    pub fn is_eventual(&self) -> bool {
        self.eventual
    }

    /// Check the query is executable.
    pub(crate) fn check(&self) -> EmbeddedResult<()> {
        if let Some(err) = &self.err {
            return Err(EmbeddedError::InvalidQuery(err.clone()));
        }
        if self.kind.is_empty() {
            return Err(EmbeddedError::InvalidQuery("empty kind".into()));
        }
        if self.distinct && self.projection.is_empty() {
            return Err(EmbeddedError::InvalidQuery(
                "distinct requires a projection".into(),
            ));
        }
        if self.keys_only && !self.projection.is_empty() {
            return Err(EmbeddedError::InvalidQuery(
                "keys-only queries cannot project properties".into(),
            ));
        }
        if let Some(ancestor) = &self.ancestor {
            ancestor.validate(false)?;
        }
        Ok(())
    }

    /// Whether the entity under `key` passes the ancestor restriction, every
    /// filter, and has every sort property.
    pub(crate) fn matches(&self, key: &Key, entity: &Json) -> bool {
        if let Some(ancestor) = &self.ancestor
            && !key.has_ancestor(ancestor)
        {
            return false;
        }
        let filtered = self.filters.iter().all(|f| filter_matches(f, key, entity));
        filtered
            && self
                .orders
                .iter()
                .all(|o| o.field == KEY_PROPERTY || property(entity, &o.field).is_some())
    }

    /// Sort comparator: each order in turn, then key order.
    pub(crate) fn compare_rows(&self, a: (&Key, &Json), b: (&Key, &Json)) -> Ordering {
        for order in &self.orders {
            let ord = if order.field == KEY_PROPERTY {
                a.0.cmp(b.0)
            } else {
                match (property(a.1, &order.field), property(b.1, &order.field)) {
                    (Some(x), Some(y)) => compare(x, y),
                    _ => Ordering::Equal,
                }
            };
            let ord = match order.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.0.cmp(b.0)
    }

    /// Start executing the query. Results are read as the iterator advances.
    #[must_use]
    pub fn run(&self, ctx: &Context) -> Iter {
        Iter::new(ctx.clone(), self.clone())
    }

    /// Run the query to completion.
    ///
    /// # Errors
    ///
    /// Returns any error [`Iter::next`] reports other than
    /// [`EmbeddedError::Done`].
    pub async fn get_all<T: serde::de::DeserializeOwned>(
        &self,
        ctx: &Context,
    ) -> EmbeddedResult<(Vec<Key>, Vec<T>)> {
        let mut it = self.run(ctx);
        let (mut keys, mut values) = (Vec::new(), Vec::new());
        loop {
            if self.keys_only {
                match it.next_key().await {
                    Ok(key) => keys.push(key),
                    Err(EmbeddedError::Done) => break,
                    Err(e) => return Err(e),
                }
            } else {
                match it.next::<T>().await {
                    Ok((key, value)) => {
                        keys.push(key);
                        values.push(value);
                    },
                    Err(EmbeddedError::Done) => break,
                    Err(e) => return Err(e),
                }
            }
        }
        Ok((keys, values))
    }
}

fn filter_matches(filter: &Filter, key: &Key, entity: &Json) -> bool {
    match (&filter.value, filter.field.as_str()) {
        (Value::Key(want), KEY_PROPERTY) => filter.op.accepts(key.cmp(want)),
        (Value::Key(want), field) => {
            let want = Json::String(want.encode());
            any_element(property(entity, field), |v| {
                filter.op.accepts(compare(v, &want))
            })
        },
        (Value::Json(want), field) => any_element(property(entity, field), |v| {
            filter.op.accepts(compare(v, want))
        }),
    }
}

/// Array properties match if any element matches; missing properties
/// never match.
fn any_element(value: Option<&Json>, pred: impl Fn(&Json) -> bool) -> bool {
    match value {
        None => false,
        Some(Json::Array(items)) => items.iter().any(pred),
        Some(v) => pred(v),
    }
}
