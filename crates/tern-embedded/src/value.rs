//! Filter values and property comparison.
//!
//! Entities are JSON objects. Values of different types compare by a fixed
//! type rank (null, bool, number, string, array, object) so every pair of
//! property values has a total order, as sort orders require.

use std::cmp::Ordering;

use serde_json::{Map, Value as Json};

use crate::key::Key;

/// A value a query can compare properties against.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Plain JSON value.
    Json(Json),
    /// An entity key. Compared against `__key__` directly, and against
    /// string properties through [`Key::encode`].
    Key(Key),
}

impl From<Json> for Value {
    fn from(v: Json) -> Self {
        Self::Json(v)
    }
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

macro_rules! json_value_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::Json(Json::from(v))
            }
        })*
    };
}

json_value_from!(bool, i32, i64, u32, u64, f64, String, &str);

fn type_rank(v: &Json) -> u8 {
    match v {
        Json::Null => 0,
        Json::Bool(_) => 1,
        Json::Number(_) => 2,
        Json::String(_) => 3,
        Json::Array(_) => 4,
        Json::Object(_) => 5,
    }
}

/// Total order over JSON values.
pub(crate) fn compare(a: &Json, b: &Json) -> Ordering {
    match (a, b) {
        (Json::Bool(x), Json::Bool(y)) => x.cmp(y),
        (Json::Number(x), Json::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            },
        },
        (Json::String(x), Json::String(y)) => x.cmp(y),
        (Json::Array(x), Json::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        },
        (Json::Object(x), Json::Object(y)) => {
            let (mut x, mut y): (Vec<_>, Vec<_>) = (x.iter().collect(), y.iter().collect());
            x.sort_unstable_by(|l, r| l.0.cmp(r.0));
            y.sort_unstable_by(|l, r| l.0.cmp(r.0));
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ord = lk.cmp(rk).then_with(|| compare(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        },
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Look up a dotted property path (`address.city`) in an entity.
pub(crate) fn property<'a>(entity: &'a Json, field: &str) -> Option<&'a Json> {
    let mut cur = entity;
    for part in field.split('.') {
        cur = cur.as_object()?.get(part)?;
    }
    Some(cur)
}

/// Reduce an entity to the projected properties, keeping nesting.
pub(crate) fn project(entity: &Json, fields: &[String]) -> Json {
    let mut out = Map::new();
    for field in fields {
        let Some(value) = property(entity, field) else {
            continue;
        };
        let mut parts = field.split('.').peekable();
        let mut target = &mut out;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                target.insert(part.to_owned(), value.clone());
                break;
            }
            let slot = target
                .entry(part.to_owned())
                .or_insert_with(|| Json::Object(Map::new()));
            if !slot.is_object() {
                *slot = Json::Object(Map::new());
            }
            let Json::Object(next) = slot else {
                break;
            };
            target = next;
        }
    }
    Json::Object(out)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_compare_numbers_mixed_int_float() {
        assert_eq!(compare(&json!(1), &json!(2)), Ordering::Less);
        assert_eq!(compare(&json!(2.5), &json!(2)), Ordering::Greater);
        assert_eq!(compare(&json!(3), &json!(3.0)), Ordering::Equal);
    }

    #[test]
    fn test_compare_across_types_uses_rank() {
        assert_eq!(compare(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(compare(&json!(99), &json!("1")), Ordering::Less);
        assert_eq!(compare(&json!("z"), &json!([1])), Ordering::Less);
    }

    #[test]
    fn test_compare_objects_by_content() {
        assert_eq!(compare(&json!({"a": 1}), &json!({"b": 2})), Ordering::Less);
        assert_eq!(compare(&json!({"a": 2}), &json!({"a": 1})), Ordering::Greater);
        assert_eq!(
            compare(&json!({"b": 1, "a": 2}), &json!({"a": 2, "b": 1})),
            Ordering::Equal
        );
        assert_eq!(compare(&json!({"a": 1}), &json!({"a": 1, "b": 0})), Ordering::Less);
        assert_eq!(
            compare(&json!({"a": {"x": [1, 2]}}), &json!({"a": {"x": [1, 3]}})),
            Ordering::Less
        );
    }

    #[test]
    fn test_property_dotted_path() {
        let e = json!({"address": {"city": "Oslo"}, "age": 3});
        assert_eq!(property(&e, "address.city"), Some(&json!("Oslo")));
        assert_eq!(property(&e, "age"), Some(&json!(3)));
        assert!(property(&e, "address.zip").is_none());
        assert!(property(&e, "age.x").is_none());
    }

    #[test]
    fn test_project_keeps_nesting() {
        let e = json!({"a": 1, "b": {"c": 2, "d": 3}, "z": 0});
        let p = project(&e, &["a".into(), "b.c".into(), "missing".into()]);
        assert_eq!(p, json!({"a": 1, "b": {"c": 2}}));
    }
}
