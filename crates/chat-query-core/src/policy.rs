//! Structural policy for model-generated filters and pipelines.
//!
//! The filter comes from a language model prompted with untrusted user
//! text, so it is checked before it reaches a store. The policy is an
//! operator allow-list plus a nesting limit; it does not check field
//! names or values. Extended-JSON scalars (`{"$date": "..."}`,
//! `{"$oid": "..."}`, `{"$numberLong": "..."}`) are values, not operators.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::query::is_extended_json;

/// Query operators a filter may use.
pub const DEFAULT_ALLOWED_OPERATORS: &[&str] = &[
    "$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin", "$and", "$or", "$nor", "$not",
    "$exists", "$size", "$all", "$elemMatch",
];

/// Aggregation stages a pipeline may use.
pub const ALLOWED_STAGES: &[&str] = &["$match", "$sort", "$limit", "$skip", "$count", "$project"];

pub const DEFAULT_MAX_DEPTH: usize = 8;

#[derive(Debug, Error, PartialEq)]
pub enum PolicyViolation {
    #[error("operator `{0}` is not allowed in query filters")]
    Operator(String),
    #[error("filter nests deeper than {0} levels")]
    TooDeep(usize),
    #[error("pipeline stage `{0}` is not allowed")]
    Stage(String),
    #[error("{0}")]
    Shape(String),
}

#[derive(Debug, Clone)]
pub struct FilterPolicy {
    pub max_depth: usize,
    pub allowed_operators: Vec<String>,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }
}

impl FilterPolicy {
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            allowed_operators: DEFAULT_ALLOWED_OPERATORS
                .iter()
                .map(|op| op.to_string())
                .collect(),
        }
    }

    /// Check a `find` filter.
    pub fn check_filter(&self, filter: &Map<String, Value>) -> Result<(), PolicyViolation> {
        self.check_object(filter, 1)
    }

    /// Check an aggregation pipeline. Every `$match` is checked as a filter.
    pub fn check_pipeline(&self, pipeline: &[Value]) -> Result<(), PolicyViolation> {
        for stage in pipeline {
            let map = stage
                .as_object()
                .filter(|m| m.len() == 1)
                .ok_or_else(|| {
                    PolicyViolation::Shape(
                        "pipeline stage must be an object with exactly one operator".into(),
                    )
                })?;
            for (name, arg) in map {
                if !ALLOWED_STAGES.contains(&name.as_str()) {
                    return Err(PolicyViolation::Stage(name.clone()));
                }
                match name.as_str() {
                    "$match" => {
                        let filter = arg.as_object().ok_or_else(|| {
                            PolicyViolation::Shape("$match expects a filter object".into())
                        })?;
                        self.check_filter(filter)?;
                    }
                    "$project" => {
                        let spec = arg.as_object().ok_or_else(|| {
                            PolicyViolation::Shape("$project expects an object".into())
                        })?;
                        if spec.values().any(|v| v.is_object() || v.is_array() || v.is_string()) {
                            return Err(PolicyViolation::Shape(
                                "$project only supports field inclusion or exclusion".into(),
                            ));
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn check_object(&self, map: &Map<String, Value>, depth: usize) -> Result<(), PolicyViolation> {
        if depth > self.max_depth {
            return Err(PolicyViolation::TooDeep(self.max_depth));
        }
        for (key, value) in map {
            if key.starts_with('$') && !self.allowed_operators.iter().any(|op| op == key) {
                return Err(PolicyViolation::Operator(key.clone()));
            }
            self.check_value(value, depth + 1)?;
        }
        Ok(())
    }

    fn check_value(&self, value: &Value, depth: usize) -> Result<(), PolicyViolation> {
        match value {
            Value::Object(map) if is_extended_json(map) => Ok(()),
            Value::Object(map) => self.check_object(map, depth),
            Value::Array(items) => {
                if depth > self.max_depth {
                    return Err(PolicyViolation::TooDeep(self.max_depth));
                }
                items.iter().try_for_each(|item| self.check_value(item, depth + 1))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_plain_filter_passes() {
        let policy = FilterPolicy::default();
        let filter = obj(json!({
            "organization_name": "Acme",
            "timestamp": {"$gte": "2024-01-01"},
            "$or": [{"event_type": "click"}, {"event_type": {"$in": ["view"]}}]
        }));
        assert_eq!(policy.check_filter(&filter), Ok(()));
    }

    #[test]
    fn test_extended_json_values_pass() {
        let policy = FilterPolicy::default();
        let filter = obj(json!({
            "timestamp": {
                "$gte": {"$date": "2024-01-01T00:00:00Z"},
                "$lt": {"$date": "2024-02-01T00:00:00Z"}
            },
            "_id": {"$oid": "65a1f0c2e4b0a1b2c3d4e5f6"},
            "score": {"$in": [{"$numberLong": "5"}]}
        }));
        assert_eq!(policy.check_filter(&filter), Ok(()));

        let pipeline = vec![json!({"$match": {"timestamp": {"$gte": {"$date": "2024-01-01T00:00:00Z"}}}})];
        assert_eq!(policy.check_pipeline(&pipeline), Ok(()));
    }

    #[test]
    fn test_wrapper_key_with_non_scalar_is_still_an_operator() {
        let policy = FilterPolicy::default();
        let filter = obj(json!({"timestamp": {"$date": {"$where": "1"}}}));
        assert_eq!(
            policy.check_filter(&filter),
            Err(PolicyViolation::Operator("$date".into()))
        );
    }

    #[test]
    fn test_where_is_rejected() {
        let policy = FilterPolicy::default();
        let filter = obj(json!({"$where": "sleep(1000)"}));
        assert_eq!(
            policy.check_filter(&filter),
            Err(PolicyViolation::Operator("$where".into()))
        );
    }

    #[test]
    fn test_nested_disallowed_operator_is_rejected() {
        let policy = FilterPolicy::default();
        let filter = obj(json!({"$and": [{"score": {"$expr": {"$gt": ["$a", "$b"]}}}]}));
        assert_eq!(
            policy.check_filter(&filter),
            Err(PolicyViolation::Operator("$expr".into()))
        );
    }

    #[test]
    fn test_depth_limit() {
        let policy = FilterPolicy::with_max_depth(2);
        let filter = obj(json!({"a": {"b": {"c": 1}}}));
        assert_eq!(policy.check_filter(&filter), Err(PolicyViolation::TooDeep(2)));
        assert_eq!(policy.check_filter(&obj(json!({"a": {"b": 1}}))), Ok(()));
    }

    #[test]
    fn test_pipeline_stage_allow_list() {
        let policy = FilterPolicy::default();
        let ok = vec![json!({"$match": {"event_type": "click"}}), json!({"$count": "n"})];
        assert_eq!(policy.check_pipeline(&ok), Ok(()));

        let bad = vec![json!({"$lookup": {"from": "users"}})];
        assert_eq!(
            policy.check_pipeline(&bad),
            Err(PolicyViolation::Stage("$lookup".into()))
        );
    }

    #[test]
    fn test_pipeline_match_is_checked_as_filter() {
        let policy = FilterPolicy::default();
        let bad = vec![json!({"$match": {"$function": {}}})];
        assert_eq!(
            policy.check_pipeline(&bad),
            Err(PolicyViolation::Operator("$function".into()))
        );
    }

    #[test]
    fn test_pipeline_project_expressions_rejected() {
        let policy = FilterPolicy::default();
        let bad = vec![json!({"$project": {"name": {"$concat": ["$a", "$b"]}}})];
        assert!(matches!(
            policy.check_pipeline(&bad),
            Err(PolicyViolation::Shape(_))
        ));
    }
}
