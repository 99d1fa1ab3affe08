//! Remote queries.
//!
//! A [`Query`] is built fluently and never mutated in place. When run, it
//! is compiled to a paged `SurrealQL` `SELECT` over the kind's table.
//! Entity properties live under the record's `props` field; the key's
//! path and its ancestors' paths sit beside them in `path` and `lineage`.

use serde_json::{Map, Value as Json};

use crate::client::Client;
use crate::error::{RemoteError, RemoteResult};
use crate::iter::Iter;
use crate::key::{Key, SEQUENCE_TABLE};

/// Pseudo-property that filters and orders on the entity key.
pub const KEY_FIELD: &str = "__key__";

/// A value to compare a property against.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Any JSON value.
    Json(Json),
    /// A key, compared by path.
    Key(Key),
}

impl From<Key> for Value {
    fn from(k: Key) -> Self {
        Self::Key(k)
    }
}

impl From<&Key> for Value {
    fn from(k: &Key) -> Self {
        Self::Key(k.clone())
    }
}

macro_rules! from_json {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::Json(v.into())
            }
        })*
    };
}

from_json!(Json, bool, i32, i64, u32, u64, f64, String, &str);

/// Filter comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operator {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Operator {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "=" | "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    fn surql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    field: String,
    op: Operator,
    value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Sort {
    field: String,
    desc: bool,
}

/// A compiled statement with its bound variables.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub(crate) sql: String,
    pub(crate) vars: Map<String, Json>,
}

/// An unexecuted remote query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    kind: String,
    ancestor: Option<Key>,
    conditions: Vec<Condition>,
    sorts: Vec<Sort>,
    projection: Vec<String>,
    distinct: bool,
    keys_only: bool,
    eventual: bool,
    limit: Option<usize>,
    offset: usize,
    fault: Option<String>,
}

impl Query {
    /// Query all entities of `kind`.
    #[must_use]
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            ancestor: None,
            conditions: Vec::new(),
            sorts: Vec::new(),
            projection: Vec::new(),
            distinct: false,
            keys_only: false,
            eventual: false,
            limit: None,
            offset: 0,
            fault: None,
        }
    }

    fn fail(mut self, msg: String) -> Self {
        if self.fault.is_none() {
            self.fault = Some(msg);
        }
        self
    }

    /// Restrict results to descendants of `ancestor` (and the ancestor
    /// itself).
    #[must_use]
    pub fn ancestor(&self, ancestor: &Key) -> Self {
        let mut q = self.clone();
        q.ancestor = Some(ancestor.clone());
        q
    }

    /// Add a filter written as `"<field> <op>"`, for example `"age >="`.
    #[must_use]
    pub fn filter(&self, expr: &str, value: impl Into<Value>) -> Self {
        let q = self.clone();
        let expr = expr.trim();
        let Some((field, op)) = expr.rsplit_once(' ') else {
            return q.fail(format!("filter {expr:?} has no operator"));
        };
        let field = field.trim();
        let Some(op) = Operator::parse(op) else {
            return q.fail(format!("filter {expr:?} has unknown operator {op:?}"));
        };
        if let Err(e) = check_field(field) {
            return q.fail(e);
        }
        let value = value.into();
        if field == KEY_FIELD && !matches!(value, Value::Key(_)) {
            return q.fail(format!("{KEY_FIELD} filters need a key value"));
        }
        let mut q = q;
        q.conditions.push(Condition {
            field: field.to_owned(),
            op,
            value,
        });
        q
    }

    /// Add a sort order; a leading `-` sorts descending.
    #[must_use]
    pub fn order(&self, field: &str) -> Self {
        let q = self.clone();
        let field = field.trim();
        let (field, desc) = match field.strip_prefix('-') {
            Some(rest) => (rest.trim(), true),
            None => (field, false),
        };
        if let Err(e) = check_field(field) {
            return q.fail(e);
        }
        let mut q = q;
        q.sorts.push(Sort {
            field: field.to_owned(),
            desc,
        });
        q
    }

    /// Return at most `limit` results.
    #[must_use]
    pub fn limit(&self, limit: usize) -> Self {
        let mut q = self.clone();
        q.limit = Some(limit);
        q
    }

    /// Skip the first `offset` results.
    #[must_use]
    pub fn offset(&self, offset: usize) -> Self {
        let mut q = self.clone();
        q.offset = offset;
        q
    }

    /// Return only the named properties.
    #[must_use]
    pub fn project(&self, fields: &[&str]) -> Self {
        let mut q = self.clone();
        for field in fields {
            if let Err(e) = check_field(field) {
                return q.fail(e);
            }
            q.projection.push((*field).to_owned());
        }
        q
    }

    /// Drop results whose projected properties repeat an earlier result.
    #[must_use]
    pub fn distinct(&self) -> Self {
        let mut q = self.clone();
        q.distinct = true;
        q
    }

    /// Return keys without entities.
    #[must_use]
    pub fn keys_only(&self) -> Self {
        let mut q = self.clone();
        q.keys_only = true;
        q
    }

    /// Accept possibly stale results. Reads are always consistent here, so
    /// this only records the request.
    #[must_use]
    pub fn eventual_consistency(&self) -> Self {
        let mut q = self.clone();
        q.eventual = true;
        q
    }

    /// Kind queried.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Filters in the order they were added, as `"<field> <op>"`.
    #[must_use]
    pub fn filter_exprs(&self) -> Vec<String> {
        self.conditions
            .iter()
            .map(|c| format!("{} {}", c.field, c.op.surql()))
            .collect()
    }

    /// Sort orders in the order they were added; descending ones carry a
    /// leading `-`.
    #[must_use]
    pub fn order_exprs(&self) -> Vec<String> {
        self.sorts
            .iter()
            .map(|s| if s.desc { format!("-{}", s.field) } else { s.field.clone() })
            .collect()
    }

    /// Whether only keys are returned.
    #[must_use]
    pub fn is_keys_only(&self) -> bool {
        self.keys_only
    }

    /// Whether stale results were accepted.
    #[must_use]
    pub fn is_eventual(&self) -> bool {
        self.eventual
    }

    pub(crate) fn projection(&self) -> &[String] {
        &self.projection
    }

    pub(crate) fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub(crate) fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    pub(crate) fn offset_value(&self) -> usize {
        self.offset
    }

    /// Start iterating over the results.
    #[must_use]
    pub fn run(&self, client: &Client) -> Iter {
        client.run(self)
    }

    pub(crate) fn check(&self) -> RemoteResult<()> {
        if let Some(fault) = &self.fault {
            return Err(RemoteError::InvalidQuery(fault.clone()));
        }
        if self.kind.is_empty() {
            return Err(RemoteError::InvalidQuery("empty kind".into()));
        }
        if self.kind == SEQUENCE_TABLE {
            return Err(RemoteError::InvalidQuery(format!(
                "kind {SEQUENCE_TABLE} is reserved"
            )));
        }
        if self.distinct && self.projection.is_empty() {
            return Err(RemoteError::InvalidQuery(
                "distinct requires a projection".into(),
            ));
        }
        if self.keys_only && !self.projection.is_empty() {
            return Err(RemoteError::InvalidQuery(
                "keys-only queries cannot project".into(),
            ));
        }
        if let Some(ancestor) = &self.ancestor {
            ancestor.valid(false)?;
        }
        Ok(())
    }

    /// Compile one page of the query.
    pub(crate) fn statement(&self, start: usize, limit: usize) -> Statement {
        let mut vars = Map::new();
        vars.insert("tb".into(), Json::String(self.kind.clone()));

        let mut clauses = Vec::new();
        if let Some(ancestor) = &self.ancestor {
            vars.insert("anc".into(), Json::String(ancestor.path()));
            clauses.push("lineage CONTAINS $anc".to_owned());
        }
        for (i, cond) in self.conditions.iter().enumerate() {
            let var = format!("f{i}");
            let bound = match &cond.value {
                Value::Json(v) => v.clone(),
                Value::Key(k) => Json::String(k.path()),
            };
            vars.insert(var.clone(), bound);
            let target = column(&cond.field);
            let op = cond.op.surql();
            clauses.push(if cond.op == Operator::Eq && cond.field != KEY_FIELD {
                format!(
                    "({target} = ${var} OR (type::is::array({target}) AND {target} CONTAINS ${var}))"
                )
            } else {
                format!("{target} {op} ${var}")
            });
        }
        for sort in &self.sorts {
            if sort.field != KEY_FIELD {
                clauses.push(format!("{} != NONE", column(&sort.field)));
            }
        }

        let mut sql = String::from("SELECT * FROM type::table($tb)");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        let mut orders: Vec<String> = self
            .sorts
            .iter()
            .map(|s| format!("{} {}", column(&s.field), if s.desc { "DESC" } else { "ASC" }))
            .collect();
        if !self.sorts.iter().any(|s| s.field == KEY_FIELD) {
            orders.push("path ASC".into());
        }
        let sql = format!(
            "{sql} ORDER BY {} LIMIT {limit} START {start}",
            orders.join(", ")
        );
        Statement { sql, vars }
    }
}

fn check_field(field: &str) -> Result<(), String> {
    if field.is_empty() {
        return Err("empty property name".into());
    }
    if field.contains(['`', '\\']) || field.split('.').any(str::is_empty) {
        return Err(format!("unsupported property name {field:?}"));
    }
    Ok(())
}

fn column(field: &str) -> String {
    if field == KEY_FIELD {
        return "path".into();
    }
    let parts: Vec<String> = field.split('.').map(|p| format!("`{p}`")).collect();
    format!("props.{}", parts.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_kind_is_rejected() {
        assert!(matches!(
            Query::new("tern_sequence").check(),
            Err(RemoteError::InvalidQuery(_))
        ));
        assert!(Query::new("Task").check().is_ok());
    }

    #[test]
    fn test_builders_do_not_mutate() {
        let base = Query::new("Task");
        let filtered = base.filter("done =", false);
        assert_eq!(base, Query::new("Task"));
        assert_ne!(base, filtered);
    }

    #[test]
    fn test_bad_filter_is_reported_on_check() {
        let q = Query::new("Task").filter("done", true);
        assert!(matches!(q.check(), Err(RemoteError::InvalidQuery(_))));
        let q = Query::new("Task").filter("done ~", true);
        assert!(matches!(q.check(), Err(RemoteError::InvalidQuery(_))));
        let q = Query::new("Task").filter("__key__ >", 3);
        assert!(matches!(q.check(), Err(RemoteError::InvalidQuery(_))));
    }

    #[test]
    fn test_first_fault_wins() {
        let q = Query::new("T").filter("a ~", 1).order("b`c");
        let Err(RemoteError::InvalidQuery(msg)) = q.check() else {
            panic!("expected invalid query");
        };
        assert!(msg.contains("unknown operator"));
    }

    #[test]
    fn test_check_combinations() {
        assert!(Query::new("").check().is_err());
        assert!(Query::new("T").distinct().check().is_err());
        assert!(Query::new("T").project(&["a"]).keys_only().check().is_err());
        assert!(Query::new("T").project(&["a"]).distinct().check().is_ok());
    }

    #[test]
    fn test_statement_filters_in_insertion_order() {
        let q = Query::new("Task")
            .filter("priority >", 2)
            .filter("owner.name =", "ana")
            .order("-priority");
        let stmt = q.statement(0, 50);
        assert_eq!(
            stmt.sql,
            "SELECT * FROM type::table($tb) WHERE props.`priority` > $f0 AND \
             (props.`owner`.`name` = $f1 OR (type::is::array(props.`owner`.`name`) AND \
             props.`owner`.`name` CONTAINS $f1)) AND props.`priority` != NONE \
             ORDER BY props.`priority` DESC, path ASC LIMIT 50 START 0"
        );
        assert_eq!(stmt.vars["f0"], 2);
        assert_eq!(stmt.vars["f1"], "ana");
        assert_eq!(stmt.vars["tb"], "Task");
    }

    #[test]
    fn test_exprs_keep_insertion_order() {
        let q = Query::new("T")
            .filter("b <", 1)
            .filter("a ==", 2)
            .order("z")
            .order("-y");
        assert_eq!(q.filter_exprs(), vec!["b <", "a ="]);
        assert_eq!(q.order_exprs(), vec!["z", "-y"]);
    }

    #[test]
    fn test_statement_ancestor_and_key_filter() {
        let parent = Key::name_key("List", "l", None);
        let pivot = Key::id_key("Task", 4, Some(&parent));
        let q = Query::new("Task")
            .ancestor(&parent)
            .filter("__key__ >", &pivot)
            .order("__key__");
        let stmt = q.statement(10, 5);
        assert_eq!(
            stmt.sql,
            "SELECT * FROM type::table($tb) WHERE lineage CONTAINS $anc AND path > $f0 \
             ORDER BY path ASC LIMIT 5 START 10"
        );
        assert_eq!(stmt.vars["anc"], Json::String(parent.path()));
        assert_eq!(stmt.vars["f0"], Json::String(pivot.path()));
    }
}
