// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! Job schema definition and validation.
//!
//! Every check here accumulates *all* problems it finds rather than
//! short-circuiting on the first one, so a single failing request reports
//! every offending attribute at once.

use crate::{DECLARED_ATTRS, Job, JobType, Platform, VersionRange};
use bisect_error::{BrokerError, ErrorCode};
use serde_json::Value;
use uuid::Uuid;

/// Attributes a client may set when creating a job. `id` and `time_created`
/// are part of [`DECLARED_ATTRS`] but are assigned by the store, not the
/// client, so they are excluded here.
const CREATABLE_ATTRS: &[&str] = &[
    "type",
    "gist",
    "time_started",
    "time_done",
    "platform",
    "bisect_range",
    "result_bisect",
    "bot_client_data",
    "error",
];

/// A validated, not-yet-stored job. The store assigns `id` and
/// `time_created` when it commits this into a full [`Job`].
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Enumerated job kind.
    pub kind: JobType,
    /// Opaque code payload identifier.
    pub gist: String,
    /// Worker start time, ms since epoch.
    pub time_started: Option<i64>,
    /// Worker completion time, ms since epoch.
    pub time_done: Option<i64>,
    /// Worker operating system.
    pub platform: Option<Platform>,
    /// `[v_good, v_bad]` range to bisect.
    pub bisect_range: Option<VersionRange>,
    /// `[v_good, v_bad]` boundary found by the bisection.
    pub result_bisect: Option<VersionRange>,
    /// Opaque bot-supplied payload.
    pub bot_client_data: Option<Value>,
    /// Error message.
    pub error: Option<String>,
}

/// Validate a job-creation request body.
///
/// Requires `gist` and `type`; rejects any key outside [`CREATABLE_ATTRS`]
/// and any value that fails its attribute's predicate. On failure, the
/// returned [`BrokerError`] message lists every offending attribute (and,
/// for enum violations, the offending value) so a caller can fix the
/// request in one round trip.
pub fn validate_create(input: &Value) -> Result<NewJob, BrokerError> {
    let map = input.as_object().ok_or_else(|| {
        BrokerError::new(
            ErrorCode::JobValidationFailed,
            "request body must be a JSON object",
        )
    })?;

    let mut errors = Vec::new();

    for key in map.keys() {
        if !CREATABLE_ATTRS.contains(&key.as_str()) {
            errors.push(format!("unknown attribute: {key}"));
        }
    }

    let kind = match map.get("type") {
        None => {
            errors.push("missing required attribute: type".to_string());
            None
        }
        Some(v) => match v.as_str().and_then(JobType::parse) {
            Some(k) => Some(k),
            None => {
                errors.push(format!("invalid type: {}", describe(v)));
                None
            }
        },
    };

    let gist = match map.get("gist") {
        None => {
            errors.push("missing required attribute: gist".to_string());
            None
        }
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::String(_)) => {
            errors.push("gist must not be empty".to_string());
            None
        }
        Some(v) => {
            errors.push(format!("gist must be a string, got {}", describe(v)));
            None
        }
    };

    let platform = validate_platform(map.get("platform"), &mut errors);
    let bisect_range = validate_version_range("bisect_range", map.get("bisect_range"), &mut errors);
    let result_bisect =
        validate_version_range("result_bisect", map.get("result_bisect"), &mut errors);
    let time_started = validate_i64("time_started", map.get("time_started"), &mut errors);
    let time_done = validate_i64("time_done", map.get("time_done"), &mut errors);
    let error = validate_string("error", map.get("error"), &mut errors);
    let bot_client_data = map.get("bot_client_data").cloned();

    if !errors.is_empty() {
        return Err(validation_error(errors));
    }

    Ok(NewJob {
        kind: kind.expect("validated above"),
        gist: gist.expect("validated above"),
        time_started,
        time_done,
        platform,
        bisect_range,
        result_bisect,
        bot_client_data,
        error,
    })
}

/// Validate a job record after a patch has been applied to its working
/// copy. The map must still satisfy every invariant of the
/// job schema: no unknown attributes, `id`/`type`/`time_created` present
/// and well-formed, and every optional attribute's value valid if present.
///
/// On success, returns the fully reconstructed [`Job`].
pub fn validate_patch_result(map: &serde_json::Map<String, Value>) -> Result<Job, BrokerError> {
    let mut errors = Vec::new();

    for key in map.keys() {
        if !DECLARED_ATTRS.contains(&key.as_str()) {
            errors.push(format!("unknown attribute: {key}"));
        }
    }

    let id = match map.get("id") {
        Some(Value::String(s)) => match s.parse::<Uuid>() {
            Ok(u) => Some(u),
            Err(_) => {
                errors.push(format!("invalid id: {s}"));
                None
            }
        },
        other => {
            errors.push(format!(
                "missing or invalid id: {}",
                other.map(describe).unwrap_or_else(|| "absent".to_string())
            ));
            None
        }
    };

    let time_created = match map.get("time_created") {
        Some(v) if v.is_i64() || v.is_u64() => v.as_i64(),
        other => {
            errors.push(format!(
                "missing or invalid time_created: {}",
                other.map(describe).unwrap_or_else(|| "absent".to_string())
            ));
            None
        }
    };

    let kind = match map.get("type") {
        None => {
            errors.push("missing required attribute: type".to_string());
            None
        }
        Some(v) => match v.as_str().and_then(JobType::parse) {
            Some(k) => Some(k),
            None => {
                errors.push(format!("invalid type: {}", describe(v)));
                None
            }
        },
    };

    let gist = match map.get("gist") {
        None => {
            errors.push("missing required attribute: gist".to_string());
            None
        }
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::String(_)) => {
            errors.push("gist must not be empty".to_string());
            None
        }
        Some(v) => {
            errors.push(format!("gist must be a string, got {}", describe(v)));
            None
        }
    };

    let platform = validate_platform(map.get("platform"), &mut errors);
    let bisect_range = validate_version_range("bisect_range", map.get("bisect_range"), &mut errors);
    let result_bisect =
        validate_version_range("result_bisect", map.get("result_bisect"), &mut errors);
    let time_started = validate_i64("time_started", map.get("time_started"), &mut errors);
    let time_done = validate_i64("time_done", map.get("time_done"), &mut errors);
    let error = validate_string("error", map.get("error"), &mut errors);
    let bot_client_data = map.get("bot_client_data").cloned();

    if !errors.is_empty() {
        return Err(validation_error(errors));
    }

    Ok(Job {
        id: id.expect("validated above"),
        kind: kind.expect("validated above"),
        gist: gist.expect("validated above"),
        time_created: time_created.expect("validated above"),
        time_started,
        time_done,
        platform,
        bisect_range,
        result_bisect,
        bot_client_data,
        error,
    })
}

/// Coerce a raw query-string atom into the typed value used for filter
/// comparison, given the (possibly unknown) attribute it is compared
/// against. The literal `"undefined"` always coerces to `None` (absent),
/// regardless of attribute.
///
/// Attributes with a declared scalar type (`time_created`, `time_started`,
/// `time_done` as numbers) coerce their atoms to [`Value::Number`] when
/// parseable; every other attribute compares as a string. This keeps
/// queries against unknown attribute paths tolerant rather than an error.
pub fn coerce_filter_value(attr_path: &str, raw: &str) -> Option<Value> {
    if raw == "undefined" {
        return None;
    }

    let leaf = attr_path.rsplit('.').next().unwrap_or(attr_path);
    match leaf {
        "time_created" | "time_started" | "time_done" => {
            if let Ok(n) = raw.parse::<i64>() {
                return Some(Value::from(n));
            }
            Some(Value::String(raw.to_string()))
        }
        _ => {
            if raw == "true" {
                Some(Value::Bool(true))
            } else if raw == "false" {
                Some(Value::Bool(false))
            } else if raw == "null" {
                Some(Value::Null)
            } else if let Ok(n) = raw.parse::<i64>() {
                Some(Value::from(n))
            } else if let Ok(n) = raw.parse::<f64>() {
                Some(Value::from(n))
            } else {
                Some(Value::String(raw.to_string()))
            }
        }
    }
}

fn validate_platform(value: Option<&Value>, errors: &mut Vec<String>) -> Option<Platform> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_str().and_then(Platform::parse) {
            Some(p) => Some(p),
            None => {
                errors.push(format!("invalid platform: {}", describe(v)));
                None
            }
        },
    }
}

fn validate_version_range(
    field: &str,
    value: Option<&Value>,
    errors: &mut Vec<String>,
) -> Option<VersionRange> {
    let v = match value {
        None | Some(Value::Null) => return None,
        Some(v) => v,
    };
    let arr = match v.as_array() {
        Some(a) if a.len() == 2 => a,
        _ => {
            errors.push(format!(
                "{field} must be a two-element array of semantic versions"
            ));
            return None;
        }
    };

    let good = arr[0].as_str().and_then(|s| s.parse::<semver::Version>().ok());
    let bad = arr[1].as_str().and_then(|s| s.parse::<semver::Version>().ok());

    match (good, bad) {
        (Some(good), Some(bad)) => Some((good, bad)),
        _ => {
            errors.push(format!("{field} contains an invalid semantic version"));
            None
        }
    }
}

fn validate_i64(field: &str, value: Option<&Value>, errors: &mut Vec<String>) -> Option<i64> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_i64() {
            Some(n) => Some(n),
            None => {
                errors.push(format!("{field} must be an integer, got {}", describe(v)));
                None
            }
        },
    }
}

fn validate_string(field: &str, value: Option<&Value>, errors: &mut Vec<String>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(v) => {
            errors.push(format!("{field} must be a string, got {}", describe(v)));
            None
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn validation_error(errors: Vec<String>) -> BrokerError {
    let message = errors.join("; ");
    BrokerError::new(ErrorCode::JobValidationFailed, message).with_context("errors", errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_create_minimal() {
        let input = json!({ "type": "bisect", "gist": "abc" });
        let job = validate_create(&input).unwrap();
        assert_eq!(job.gist, "abc");
        assert_eq!(job.kind, JobType::Bisect);
    }

    #[test]
    fn create_requires_gist_and_type() {
        let err = validate_create(&json!({})).unwrap_err();
        assert!(err.message.contains("gist"));
        assert!(err.message.contains("type"));
    }

    #[test]
    fn create_rejects_unknown_attribute() {
        let input = json!({ "type": "bisect", "gist": "abc", "potrzebie": "potrzebie" });
        let err = validate_create(&input).unwrap_err();
        assert!(err.message.contains("potrzebie"));
    }

    #[test]
    fn create_rejects_unknown_platform() {
        let input = json!({ "type": "bisect", "gist": "abc", "platform": "android" });
        let err = validate_create(&input).unwrap_err();
        assert!(err.message.contains("android"));
    }

    #[test]
    fn create_rejects_unknown_type() {
        let input = json!({ "type": "gromify", "gist": "abc" });
        let err = validate_create(&input).unwrap_err();
        assert!(err.message.contains("gromify"));
    }

    #[test]
    fn create_rejects_bad_semver_in_bisect_range() {
        let input = json!({
            "type": "bisect",
            "gist": "abc",
            "bisect_range": ["10.0.0", "Precise Pangolin"],
        });
        let err = validate_create(&input).unwrap_err();
        assert!(err.message.contains("bisect_range"));
    }

    #[test]
    fn create_accepts_valid_bisect_range() {
        let input = json!({
            "type": "bisect",
            "gist": "abc",
            "bisect_range": ["10.0.0", "11.2.0"],
        });
        let job = validate_create(&input).unwrap();
        let (good, bad) = job.bisect_range.unwrap();
        assert_eq!(good.to_string(), "10.0.0");
        assert_eq!(bad.to_string(), "11.2.0");
    }

    #[test]
    fn create_rejects_non_object_body() {
        let err = validate_create(&json!("not an object")).unwrap_err();
        assert_eq!(err.code, ErrorCode::JobValidationFailed);
    }

    #[test]
    fn patch_result_rejects_readonly_tamper_values() {
        let mut map = serde_json::Map::new();
        map.insert("id".into(), json!("not-a-uuid"));
        map.insert("type".into(), json!("bisect"));
        map.insert("gist".into(), json!("abc"));
        map.insert("time_created".into(), json!(1));
        let err = validate_patch_result(&map).unwrap_err();
        assert!(err.message.contains("id"));
    }

    #[test]
    fn patch_result_accepts_well_formed_record() {
        let mut map = serde_json::Map::new();
        map.insert("id".into(), json!(Uuid::nil().to_string()));
        map.insert("type".into(), json!("bisect"));
        map.insert("gist".into(), json!("new"));
        map.insert("time_created".into(), json!(1234));
        let job = validate_patch_result(&map).unwrap();
        assert_eq!(job.gist, "new");
    }

    #[test]
    fn coerce_undefined_is_absent() {
        assert_eq!(coerce_filter_value("platform", "undefined"), None);
    }

    #[test]
    fn coerce_numeric_attribute() {
        assert_eq!(
            coerce_filter_value("time_created", "1000"),
            Some(Value::from(1000))
        );
    }

    #[test]
    fn coerce_string_attribute() {
        assert_eq!(
            coerce_filter_value("platform", "linux"),
            Some(Value::String("linux".to_string()))
        );
    }

    #[test]
    fn coerce_nested_path_uses_leaf_type() {
        assert_eq!(
            coerce_filter_value("bot_client_data.hello.world", "1"),
            Some(Value::from(1))
        );
    }
}
