// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON-Patch-style partial update engine.
//!
//! Supports `add`, `replace`, and `remove` against a slash-delimited,
//! RFC 6901-style JSON Pointer path. Top-level paths (`/gist`) address a
//! job attribute directly; deeper paths (`/bot_client_data/hello`) reach
//! into the opaque `bot_client_data` tree.

use bisect_error::{BrokerError, ErrorCode};
use serde_json::{Map, Value};

use crate::READONLY_ATTRS;

/// One of the three supported patch verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOpKind {
    /// Set a value, creating it if absent.
    Add,
    /// Set a value; conventionally requires the value to already exist.
    Replace,
    /// Delete a value.
    Remove,
}

impl PatchOpKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "add" => Some(Self::Add),
            "replace" => Some(Self::Replace),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }
}

/// A single patch operation, structurally validated but not yet applied.
#[derive(Debug, Clone)]
pub struct PatchOp {
    /// The verb.
    pub op: PatchOpKind,
    /// Slash-delimited pointer path, e.g. `/gist` or `/bot_client_data/hello`.
    pub path: String,
    /// Payload for `add`/`replace`; absent for `remove`.
    pub value: Option<Value>,
}

impl PatchOp {
    /// The pointer path split into unescaped segments (JSON Pointer
    /// escaping: `~1` → `/`, `~0` → `~`).
    fn segments(&self) -> Vec<String> {
        self.path
            .split('/')
            .skip(1)
            .map(|s| s.replace("~1", "/").replace("~0", "~"))
            .collect()
    }

    /// The top-level attribute this op targets.
    fn top_level_attr(&self) -> &str {
        self.path
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or("")
    }
}

/// Structural validation: parse the raw JSON array of patch
/// operations, rejecting any unknown op, missing `path`, or malformed entry.
/// The record is never touched if this fails.
pub fn parse_ops(raw: &Value) -> Result<Vec<PatchOp>, BrokerError> {
    let entries = raw.as_array().ok_or_else(|| {
        BrokerError::new(
            ErrorCode::JobPatchRejected,
            "patch body must be a JSON array of operations",
        )
    })?;

    let mut ops = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let obj = entry.as_object().ok_or_else(|| {
            BrokerError::new(ErrorCode::JobPatchRejected, format!("operation {i} is not an object"))
                .with_context("index", i)
        })?;

        let op_raw = obj.get("op").and_then(Value::as_str).ok_or_else(|| {
            BrokerError::new(ErrorCode::JobPatchRejected, format!("operation {i} is missing \"op\""))
                .with_context("index", i)
        })?;

        let op = PatchOpKind::parse(op_raw).ok_or_else(|| {
            BrokerError::new(
                ErrorCode::JobPatchRejected,
                format!("unknown patch op: {op_raw}"),
            )
            .with_context("op", op_raw)
        })?;

        let path = obj
            .get("path")
            .and_then(Value::as_str)
            .filter(|p| p.starts_with('/'))
            .ok_or_else(|| {
                BrokerError::new(
                    ErrorCode::JobPatchRejected,
                    format!("operation {i} has a missing or malformed \"path\""),
                )
                .with_context("index", i)
            })?
            .to_string();

        let value = obj.get("value").cloned();
        if matches!(op, PatchOpKind::Add | PatchOpKind::Replace) && value.is_none() {
            return Err(BrokerError::new(
                ErrorCode::JobPatchRejected,
                format!("{path} requires a \"value\" for {op_raw}"),
            )
            .with_context("path", path));
        }

        ops.push(PatchOp { op, path, value });
    }

    Ok(ops)
}

/// Readonly guard: reject any op whose path targets `id`,
/// `type`, or `time_created`, naming the offending path.
pub fn check_readonly(ops: &[PatchOp]) -> Result<(), BrokerError> {
    for op in ops {
        if READONLY_ATTRS.contains(&op.top_level_attr()) {
            return Err(BrokerError::new(
                ErrorCode::JobPatchRejected,
                format!("{} is readonly and cannot be modified", op.path),
            )
            .with_context("path", op.path.clone()));
        }
    }
    Ok(())
}

/// Apply a sequence of already-validated ops to a working copy of the
/// record's JSON object, in order.
pub fn apply_ops(map: &mut Map<String, Value>, ops: &[PatchOp]) -> Result<(), BrokerError> {
    for op in ops {
        let segments = op.segments();
        match op.op {
            PatchOpKind::Add => {
                let value = op.value.clone().expect("validated in parse_ops");
                set_at(map, &segments, value).map_err(|_| {
                    BrokerError::new(
                        ErrorCode::JobPatchRejected,
                        format!("{} does not resolve to a settable location", op.path),
                    )
                    .with_context("path", op.path.clone())
                })?;
            }
            PatchOpKind::Replace => {
                // Top-level attributes accept replace as a plain set, same as
                // add. Nested paths follow conventional JSON Patch semantics:
                // replace requires a value already present at that location.
                if segments.len() > 1 && !exists_at(map, &segments) {
                    return Err(BrokerError::new(
                        ErrorCode::JobPatchRejected,
                        format!("{} does not exist to replace", op.path),
                    )
                    .with_context("path", op.path.clone()));
                }
                let value = op.value.clone().expect("validated in parse_ops");
                set_at(map, &segments, value).map_err(|_| {
                    BrokerError::new(
                        ErrorCode::JobPatchRejected,
                        format!("{} does not resolve to a settable location", op.path),
                    )
                    .with_context("path", op.path.clone())
                })?;
            }
            PatchOpKind::Remove => {
                remove_at(map, &segments).map_err(|_| {
                    BrokerError::new(
                        ErrorCode::JobPatchRejected,
                        format!("{} does not exist", op.path),
                    )
                    .with_context("path", op.path.clone())
                })?;
            }
        }
    }
    Ok(())
}

fn set_at(map: &mut Map<String, Value>, segments: &[String], value: Value) -> Result<(), ()> {
    match segments {
        [] => Err(()),
        [only] => {
            map.insert(only.clone(), value);
            Ok(())
        }
        [first, rest @ ..] => {
            let entry = map
                .entry(first.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            let nested = entry.as_object_mut().ok_or(())?;
            set_at(nested, rest, value)
        }
    }
}

fn exists_at(map: &Map<String, Value>, segments: &[String]) -> bool {
    match segments {
        [] => false,
        [only] => map.contains_key(only),
        [first, rest @ ..] => match map.get(first).and_then(Value::as_object) {
            Some(nested) => exists_at(nested, rest),
            None => false,
        },
    }
}

fn remove_at(map: &mut Map<String, Value>, segments: &[String]) -> Result<(), ()> {
    match segments {
        [] => Err(()),
        [only] => map.remove(only).map(|_| ()).ok_or(()),
        [first, rest @ ..] => {
            let nested = map.get_mut(first).and_then(Value::as_object_mut).ok_or(())?;
            remove_at(nested, rest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_rejects_non_array() {
        assert!(parse_ops(&json!({})).is_err());
    }

    #[test]
    fn parse_rejects_unknown_op() {
        let err = parse_ops(&json!([{"op": "💩", "path": "/gist", "value": "x"}])).unwrap_err();
        assert!(err.message.contains("💩"));
    }

    #[test]
    fn parse_rejects_missing_path() {
        assert!(parse_ops(&json!([{"op": "replace", "value": "x"}])).is_err());
    }

    #[test]
    fn parse_rejects_missing_value_for_replace() {
        assert!(parse_ops(&json!([{"op": "replace", "path": "/gist"}])).is_err());
    }

    #[test]
    fn parse_accepts_remove_without_value() {
        let ops = parse_ops(&json!([{"op": "remove", "path": "/error"}])).unwrap();
        assert_eq!(ops.len(), 1);
        assert!(ops[0].value.is_none());
    }

    #[test]
    fn readonly_guard_rejects_id() {
        let ops = parse_ops(&json!([{"op": "replace", "path": "/id", "value": "poop"}])).unwrap();
        let err = check_readonly(&ops).unwrap_err();
        assert!(err.message.contains("/id"));
    }

    #[test]
    fn readonly_guard_allows_gist() {
        let ops = parse_ops(&json!([{"op": "replace", "path": "/gist", "value": "new"}])).unwrap();
        assert!(check_readonly(&ops).is_ok());
    }

    #[test]
    fn apply_replace_top_level() {
        let mut map = Map::new();
        map.insert("gist".into(), json!("old"));
        let ops = parse_ops(&json!([{"op": "replace", "path": "/gist", "value": "new"}])).unwrap();
        apply_ops(&mut map, &ops).unwrap();
        assert_eq!(map["gist"], json!("new"));
    }

    #[test]
    fn apply_replace_top_level_accepts_previously_absent_attribute() {
        let mut map = Map::new();
        let ops = parse_ops(&json!([{"op": "replace", "path": "/error", "value": "boom"}])).unwrap();
        apply_ops(&mut map, &ops).unwrap();
        assert_eq!(map["error"], json!("boom"));
    }

    #[test]
    fn apply_add_nested_creates_intermediate_object() {
        let mut map = Map::new();
        let ops = parse_ops(&json!([
            {"op": "add", "path": "/bot_client_data/hello/world", "value": 1}
        ]))
        .unwrap();
        apply_ops(&mut map, &ops).unwrap();
        assert_eq!(map["bot_client_data"]["hello"]["world"], json!(1));
    }

    #[test]
    fn apply_replace_nested_requires_prior_value() {
        let mut map = Map::new();
        let ops = parse_ops(&json!([
            {"op": "replace", "path": "/bot_client_data/hello/world", "value": 1}
        ]))
        .unwrap();
        let err = apply_ops(&mut map, &ops).unwrap_err();
        assert!(err.message.contains("/bot_client_data/hello/world"));
        assert!(map.get("bot_client_data").is_none());
    }

    #[test]
    fn apply_replace_nested_succeeds_when_prior_value_exists() {
        let mut map = Map::new();
        let add = parse_ops(&json!([
            {"op": "add", "path": "/bot_client_data/hello/world", "value": 1}
        ]))
        .unwrap();
        apply_ops(&mut map, &add).unwrap();

        let replace = parse_ops(&json!([
            {"op": "replace", "path": "/bot_client_data/hello/world", "value": 2}
        ]))
        .unwrap();
        apply_ops(&mut map, &replace).unwrap();
        assert_eq!(map["bot_client_data"]["hello"]["world"], json!(2));
    }

    #[test]
    fn apply_remove_top_level() {
        let mut map = Map::new();
        map.insert("error".into(), json!("boom"));
        let ops = parse_ops(&json!([{"op": "remove", "path": "/error"}])).unwrap();
        apply_ops(&mut map, &ops).unwrap();
        assert!(!map.contains_key("error"));
    }

    #[test]
    fn apply_remove_missing_path_fails() {
        let mut map = Map::new();
        let ops = parse_ops(&json!([{"op": "remove", "path": "/error"}])).unwrap();
        assert!(apply_ops(&mut map, &ops).is_err());
    }

    #[test]
    fn ops_apply_in_order() {
        let mut map = Map::new();
        map.insert("gist".into(), json!("a"));
        let ops = parse_ops(&json!([
            {"op": "replace", "path": "/gist", "value": "b"},
            {"op": "replace", "path": "/gist", "value": "c"},
        ]))
        .unwrap();
        apply_ops(&mut map, &ops).unwrap();
        assert_eq!(map["gist"], json!("c"));
    }

    use proptest::prelude::*;

    proptest! {
        /// Replacing `/gist` with an arbitrary string and reading it back
        /// always yields exactly that string, regardless of content.
        #[test]
        fn replace_gist_roundtrips_arbitrary_strings(value in "\\PC*") {
            let mut map = Map::new();
            map.insert("gist".into(), json!("placeholder"));
            let ops = parse_ops(&json!([{"op": "replace", "path": "/gist", "value": value}])).unwrap();
            apply_ops(&mut map, &ops).unwrap();
            prop_assert_eq!(map["gist"].as_str().unwrap(), value);
        }

        /// Adding then immediately removing the same nested path always
        /// leaves the tree exactly as it started.
        #[test]
        fn add_then_remove_nested_is_identity(key in "[a-z]{1,8}", value in 0i64..1000) {
            let mut map = Map::new();
            let path = format!("/bot_client_data/{key}");
            let add = parse_ops(&json!([{"op": "add", "path": path, "value": value}])).unwrap();
            apply_ops(&mut map, &add).unwrap();
            let remove = parse_ops(&json!([{"op": "remove", "path": path}])).unwrap();
            apply_ops(&mut map, &remove).unwrap();
            prop_assert!(map["bot_client_data"].as_object().unwrap().is_empty());
        }
    }
}
