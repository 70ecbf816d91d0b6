//! Mongo-style filter and aggregation evaluation over JSON documents.
//!
//! Used by the in-memory and SQLite stores, which hold documents as
//! `serde_json::Value` and have no query engine of their own. The
//! MongoDB store sends filters to the server instead.
//!
//! # Supported filter syntax
//!
//! | Form | Meaning |
//! |------|---------|
//! | `{"field": value}` | equality; matches array fields containing `value` |
//! | `{"a.b": value}` | dotted path into nested objects or array indices |
//! | `$eq $ne $gt $gte $lt $lte` | comparison over numbers and strings |
//! | `$in $nin` | membership |
//! | `$exists $size $all $elemMatch` | element and array operators |
//! | `$not` | negates an operator expression |
//! | `$and $or $nor` | logical combination of sub-filters |
//!
//! Unknown operators never match. Extended-JSON scalar wrappers such as
//! `{"$date": "2024-01-01T00:00:00Z"}` or `{"$oid": "..."}` are values,
//! not operators: they compare as the wrapped string (or number for
//! `$numberLong` and friends) on either side.
//!
//! # Supported pipeline stages
//!
//! `$match`, `$sort`, `$limit`, `$skip`, `$count`, and top-level-field
//! `$project` (inclusion or exclusion).

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("pipeline stage must be an object with exactly one operator")]
    MalformedStage,
    #[error("unsupported pipeline stage `{0}`")]
    UnsupportedStage(String),
    #[error("invalid argument for `{stage}`: {reason}")]
    InvalidArgument { stage: &'static str, reason: String },
}

/// Returns true when `doc` satisfies `filter`.
pub fn matches(doc: &Value, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(key, cond)| match key.as_str() {
        "$and" => sub_filters(cond).is_some_and(|fs| fs.iter().all(|f| matches(doc, f))),
        "$or" => sub_filters(cond).is_some_and(|fs| fs.iter().any(|f| matches(doc, f))),
        "$nor" => sub_filters(cond).is_some_and(|fs| !fs.iter().any(|f| matches(doc, f))),
        k if k.starts_with('$') => false,
        path => field_matches(lookup(doc, path), cond),
    })
}

fn sub_filters(cond: &Value) -> Option<Vec<&Map<String, Value>>> {
    cond.as_array()?.iter().map(Value::as_object).collect()
}

/// Resolve a dotted path. Numeric segments index into arrays.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Extended-JSON keys that wrap a single scalar value.
pub const EXTENDED_JSON_WRAPPERS: &[&str] = &[
    "$date",
    "$oid",
    "$numberLong",
    "$numberInt",
    "$numberDouble",
    "$numberDecimal",
];

/// True for a one-key object like `{"$date": "2024-01-01T00:00:00Z"}`.
pub fn is_extended_json(map: &Map<String, Value>) -> bool {
    match map.iter().next() {
        Some((key, Value::String(_))) if map.len() == 1 => {
            EXTENDED_JSON_WRAPPERS.contains(&key.as_str())
        }
        _ => false,
    }
}

/// The plain value behind an extended-JSON wrapper, or `value` itself.
fn scalar(value: &Value) -> Cow<'_, Value> {
    let Value::Object(map) = value else {
        return Cow::Borrowed(value);
    };
    if !is_extended_json(map) {
        return Cow::Borrowed(value);
    }
    match map.iter().next() {
        Some((key, Value::String(s))) if key.starts_with("$number") => s
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(|n| Cow::Owned(Value::Number(n)))
            .unwrap_or(Cow::Borrowed(value)),
        Some((_, inner)) => Cow::Borrowed(inner),
        None => Cow::Borrowed(value),
    }
}

fn is_operator_expr(cond: &Value) -> bool {
    match cond {
        Value::Object(map) => {
            !map.is_empty() && !is_extended_json(map) && map.keys().all(|k| k.starts_with('$'))
        }
        _ => false,
    }
}

fn field_matches(value: Option<&Value>, cond: &Value) -> bool {
    match cond {
        Value::Object(ops) if is_operator_expr(cond) => {
            ops.iter().all(|(op, operand)| apply_operator(value, op, operand))
        }
        _ => eq_match(value, cond),
    }
}

fn apply_operator(value: Option<&Value>, op: &str, operand: &Value) -> bool {
    match op {
        "$eq" => eq_match(value, operand),
        "$ne" => !eq_match(value, operand),
        "$gt" => cmp_match(value, operand, |o| o == Ordering::Greater),
        "$gte" => cmp_match(value, operand, |o| o != Ordering::Less),
        "$lt" => cmp_match(value, operand, |o| o == Ordering::Less),
        "$lte" => cmp_match(value, operand, |o| o != Ordering::Greater),
        "$in" => operand
            .as_array()
            .is_some_and(|opts| opts.iter().any(|o| eq_match(value, o))),
        "$nin" => operand
            .as_array()
            .is_some_and(|opts| !opts.iter().any(|o| eq_match(value, o))),
        "$exists" => {
            let want = operand.as_bool().unwrap_or_else(|| operand.as_i64() != Some(0));
            value.is_some() == want
        }
        "$size" => match (value, operand.as_u64()) {
            (Some(Value::Array(items)), Some(n)) => items.len() as u64 == n,
            _ => false,
        },
        "$all" => match (value, operand.as_array()) {
            (Some(Value::Array(items)), Some(required)) => required
                .iter()
                .all(|r| items.iter().any(|item| values_equal(item, r))),
            _ => false,
        },
        "$elemMatch" => match (value, operand.as_object()) {
            (Some(Value::Array(items)), Some(sub)) => items.iter().any(|item| {
                if is_operator_expr(operand) {
                    field_matches(Some(item), operand)
                } else {
                    matches(item, sub)
                }
            }),
            _ => false,
        },
        "$not" => !field_matches(value, operand),
        _ => false,
    }
}

fn eq_match(value: Option<&Value>, target: &Value) -> bool {
    match value {
        None => target.is_null(),
        Some(v) => {
            values_equal(v, target)
                || matches!(v, Value::Array(items) if items.iter().any(|i| values_equal(i, target)))
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    let (a, b) = (scalar(a), scalar(b));
    match (a.as_ref(), b.as_ref()) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (x, y) => x == y,
    }
}

fn cmp_match(value: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .any(|i| compare(i, operand).is_some_and(&accept)),
        Some(v) => compare(v, operand).is_some_and(accept),
        None => false,
    }
}

/// Ordering for comparison operators. Only like types compare.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    let (a, b) = (scalar(a), scalar(b));
    match (a.as_ref(), b.as_ref()) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total ordering for `$sort`: missing/null < bool < number < string < other.
fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            _ => 4,
        }
    }
    match (a, b) {
        (Some(x), Some(y)) => compare(x, y).unwrap_or_else(|| rank(a).cmp(&rank(b))),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Run an aggregation pipeline over an in-memory document set.
pub fn apply_pipeline(mut docs: Vec<Value>, pipeline: &[Value]) -> Result<Vec<Value>, PipelineError> {
    for stage in pipeline {
        let (name, arg) = match stage.as_object() {
            Some(map) if map.len() == 1 => map.iter().next().ok_or(PipelineError::MalformedStage)?,
            _ => return Err(PipelineError::MalformedStage),
        };

        docs = match name.as_str() {
            "$match" => {
                let filter = arg.as_object().ok_or(PipelineError::InvalidArgument {
                    stage: "$match",
                    reason: "expected a filter object".into(),
                })?;
                docs.into_iter().filter(|d| matches(d, filter)).collect()
            }
            "$sort" => {
                let keys = sort_keys(arg)?;
                docs.sort_by(|a, b| {
                    keys.iter()
                        .map(|(path, desc)| {
                            let ord = sort_order(lookup(a, path), lookup(b, path));
                            if *desc {
                                ord.reverse()
                            } else {
                                ord
                            }
                        })
                        .find(|o| *o != Ordering::Equal)
                        .unwrap_or(Ordering::Equal)
                });
                docs
            }
            "$limit" => {
                let n = count_arg("$limit", arg)?;
                docs.truncate(n);
                docs
            }
            "$skip" => {
                let n = count_arg("$skip", arg)?;
                docs.into_iter().skip(n).collect()
            }
            "$count" => {
                let field = arg
                    .as_str()
                    .filter(|s| !s.is_empty() && !s.starts_with('$'))
                    .ok_or(PipelineError::InvalidArgument {
                        stage: "$count",
                        reason: "expected a non-empty field name".into(),
                    })?;
                let mut out = Map::new();
                out.insert(field.to_string(), Value::from(docs.len() as u64));
                vec![Value::Object(out)]
            }
            "$project" => {
                let spec = arg.as_object().ok_or(PipelineError::InvalidArgument {
                    stage: "$project",
                    reason: "expected an object".into(),
                })?;
                docs.iter().map(|d| project(d, spec)).collect()
            }
            other => return Err(PipelineError::UnsupportedStage(other.to_string())),
        };
    }
    Ok(docs)
}

fn sort_keys(arg: &Value) -> Result<Vec<(String, bool)>, PipelineError> {
    let spec = arg.as_object().ok_or(PipelineError::InvalidArgument {
        stage: "$sort",
        reason: "expected an object".into(),
    })?;
    spec.iter()
        .map(|(path, dir)| match dir.as_i64() {
            Some(1) => Ok((path.clone(), false)),
            Some(-1) => Ok((path.clone(), true)),
            _ => Err(PipelineError::InvalidArgument {
                stage: "$sort",
                reason: format!("direction for `{}` must be 1 or -1", path),
            }),
        })
        .collect()
}

fn count_arg(stage: &'static str, arg: &Value) -> Result<usize, PipelineError> {
    arg.as_u64()
        .map(|n| n as usize)
        .ok_or(PipelineError::InvalidArgument {
            stage,
            reason: "expected a non-negative integer".into(),
        })
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

fn project(doc: &Value, spec: &Map<String, Value>) -> Value {
    let Some(source) = doc.as_object() else {
        return doc.clone();
    };
    let inclusion = spec.iter().any(|(k, v)| k != "_id" && truthy(v));
    let keep_id = spec.get("_id").map_or(true, truthy);

    let mut out = Map::new();
    if inclusion {
        if keep_id {
            if let Some(id) = source.get("_id") {
                out.insert("_id".into(), id.clone());
            }
        }
        for (k, v) in spec {
            if k != "_id" && truthy(v) {
                if let Some(field) = source.get(k) {
                    out.insert(k.clone(), field.clone());
                }
            }
        }
    } else {
        for (k, v) in source {
            let excluded = spec.get(k).is_some_and(|flag| !truthy(flag));
            if !excluded {
                out.insert(k.clone(), v.clone());
            }
        }
    }
    Value::Object(out)
}

/// Keep only `_id` and the named top-level fields.
///
/// Used for schema-based store access, where results are limited to the
/// fields the event schema declares.
pub fn project_fields(doc: &Value, fields: &[String]) -> Value {
    let spec: Map<String, Value> = fields
        .iter()
        .map(|f| (f.clone(), Value::from(1)))
        .collect();
    if spec.is_empty() {
        return doc.clone();
    }
    project(doc, &spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn f(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    fn events() -> Vec<Value> {
        vec![
            json!({"_id": 1, "organization_name": "Acme", "event_type": "click", "timestamp": "2024-01-05T10:00:00Z", "tags": ["promo", "q1"], "score": 10}),
            json!({"_id": 2, "organization_name": "Acme", "event_type": "view", "timestamp": "2024-02-10T10:00:00Z", "tags": ["q1"], "score": 3}),
            json!({"_id": 3, "organization_name": "Globex", "event_type": "click", "timestamp": "2024-03-01T10:00:00Z", "meta": {"region": "EU"}, "score": 7}),
        ]
    }

    fn ids(docs: &[Value]) -> Vec<i64> {
        docs.iter().map(|d| d["_id"].as_i64().unwrap()).collect()
    }

    fn run(filter: Value) -> Vec<i64> {
        let filter = f(filter);
        let hits: Vec<Value> = events().into_iter().filter(|d| matches(d, &filter)).collect();
        ids(&hits)
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert_eq!(run(json!({})), vec![1, 2, 3]);
    }

    #[test]
    fn test_implicit_equality_and_array_contains() {
        assert_eq!(run(json!({"organization_name": "Acme"})), vec![1, 2]);
        assert_eq!(run(json!({"tags": "promo"})), vec![1]);
    }

    #[test]
    fn test_dotted_path() {
        assert_eq!(run(json!({"meta.region": "EU"})), vec![3]);
        assert_eq!(run(json!({"tags.0": "q1"})), vec![2]);
    }

    #[test]
    fn test_comparison_on_numbers_and_iso_dates() {
        assert_eq!(run(json!({"score": {"$gte": 7}})), vec![1, 3]);
        assert_eq!(run(json!({"score": {"$gt": 3, "$lt": 10}})), vec![3]);
        assert_eq!(
            run(json!({"timestamp": {"$gte": "2024-02-01T00:00:00Z"}})),
            vec![2, 3]
        );
    }

    #[test]
    fn test_extended_json_dates_compare_as_strings() {
        assert_eq!(
            run(json!({"timestamp": {"$gte": {"$date": "2024-02-01T00:00:00Z"}}})),
            vec![2, 3]
        );
        assert_eq!(
            run(json!({"timestamp": {"$date": "2024-03-01T10:00:00Z"}})),
            vec![3]
        );

        // Stored dates in relaxed extended JSON compare the same way.
        let doc = json!({"timestamp": {"$date": "2024-05-01T00:00:00Z"}});
        let filter = f(json!({"timestamp": {"$lt": {"$date": "2024-06-01T00:00:00Z"}}}));
        assert!(matches(&doc, &filter));
        let filter = f(json!({"timestamp": {"$lt": "2024-04-01T00:00:00Z"}}));
        assert!(!matches(&doc, &filter));
    }

    #[test]
    fn test_extended_json_numbers() {
        assert_eq!(run(json!({"score": {"$gt": {"$numberLong": "5"}}})), vec![1, 3]);
    }

    #[test]
    fn test_membership_and_negation() {
        assert_eq!(run(json!({"event_type": {"$in": ["view", "share"]}})), vec![2]);
        assert_eq!(run(json!({"event_type": {"$nin": ["view"]}})), vec![1, 3]);
        assert_eq!(run(json!({"organization_name": {"$ne": "Acme"}})), vec![3]);
        assert_eq!(run(json!({"score": {"$not": {"$gt": 5}}})), vec![2]);
    }

    #[test]
    fn test_element_and_array_operators() {
        assert_eq!(run(json!({"meta": {"$exists": true}})), vec![3]);
        assert_eq!(run(json!({"meta": {"$exists": false}})), vec![1, 2]);
        assert_eq!(run(json!({"tags": {"$size": 2}})), vec![1]);
        assert_eq!(run(json!({"tags": {"$all": ["q1", "promo"]}})), vec![1]);
        assert_eq!(run(json!({"tags": {"$elemMatch": {"$eq": "q1"}}})), vec![1, 2]);
    }

    #[test]
    fn test_logical_operators() {
        assert_eq!(
            run(json!({"$or": [{"event_type": "view"}, {"organization_name": "Globex"}]})),
            vec![2, 3]
        );
        assert_eq!(
            run(json!({"$and": [{"organization_name": "Acme"}, {"event_type": "click"}]})),
            vec![1]
        );
        assert_eq!(run(json!({"$nor": [{"organization_name": "Acme"}]})), vec![3]);
    }

    #[test]
    fn test_unknown_operator_never_matches() {
        assert!(run(json!({"$where": "this.score > 1"})).is_empty());
        assert!(run(json!({"score": {"$mod": [2, 0]}})).is_empty());
    }

    #[test]
    fn test_null_matches_missing() {
        assert_eq!(run(json!({"meta": null})), vec![1, 2]);
    }

    #[test]
    fn test_pipeline_match_sort_limit() {
        let out = apply_pipeline(
            events(),
            &[
                json!({"$match": {"event_type": "click"}}),
                json!({"$sort": {"score": -1}}),
                json!({"$limit": 1}),
            ],
        )
        .unwrap();
        assert_eq!(ids(&out), vec![1]);
    }

    #[test]
    fn test_pipeline_skip_and_count() {
        let out = apply_pipeline(
            events(),
            &[json!({"$skip": 1}), json!({"$count": "total"})],
        )
        .unwrap();
        assert_eq!(out, vec![json!({"total": 2})]);
    }

    #[test]
    fn test_pipeline_project_inclusion_and_exclusion() {
        let out = apply_pipeline(events(), &[json!({"$project": {"event_type": 1, "_id": 0}})])
            .unwrap();
        assert_eq!(out[0], json!({"event_type": "click"}));

        let out = apply_pipeline(events(), &[json!({"$project": {"tags": 0, "score": 0}})])
            .unwrap();
        assert!(out[0].get("tags").is_none());
        assert_eq!(out[0]["organization_name"], json!("Acme"));
    }

    #[test]
    fn test_pipeline_rejects_unknown_stage() {
        let err = apply_pipeline(events(), &[json!({"$lookup": {}})]).unwrap_err();
        assert_eq!(err, PipelineError::UnsupportedStage("$lookup".into()));
    }

    #[test]
    fn test_pipeline_rejects_malformed_stage() {
        let err = apply_pipeline(events(), &[json!({"$match": {}, "$limit": 1})]).unwrap_err();
        assert_eq!(err, PipelineError::MalformedStage);
    }

    #[test]
    fn test_project_fields_keeps_schema_fields() {
        let doc = json!({"_id": 9, "organization_name": "Acme", "secret": "x"});
        let out = project_fields(&doc, &["organization_name".to_string()]);
        assert_eq!(out, json!({"_id": 9, "organization_name": "Acme"}));
        assert_eq!(project_fields(&doc, &[]), doc);
    }
}
