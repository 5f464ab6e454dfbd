// SPDX-License-Identifier: MIT OR Apache-2.0
//! bisect-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable contract and in-memory storage engine for the bisect job
//! broker: the job schema, the validator, the optimistic-concurrency job
//! store, the JSON-patch engine, the filtered query engine, and the
//! append-only log store.
//!
//! If you only take one dependency, take this one.

/// Log append-and-retrieve pipeline.
pub mod log;
/// JSON-patch-style partial update engine with readonly and ETag guards.
pub mod patch;
/// Filtered-query engine over job records (set/negation/nested-path).
pub mod query;
/// In-memory job store: id assignment, versioning, ETag derivation.
pub mod store;
/// Schema definition and validation for job records.
pub mod validate;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use uuid::Uuid;

pub use bisect_error::{BrokerError, BrokerErrorDto, ErrorCategory, ErrorCode};
pub use log::LogStore;
pub use patch::{PatchOp, PatchOpKind};
pub use query::{FilterClause, QueryEngine};
pub use store::{ApplyError, ETag, JobStore};
pub use validate::{validate_create, validate_patch_result};

/// Current schema version embedded in generated JSON schemas.
///
/// # Examples
///
/// ```
/// assert_eq!(bisect_core::SCHEMA_VERSION, "bisect-broker/v1");
/// ```
pub const SCHEMA_VERSION: &str = "bisect-broker/v1";

/// Attribute names that may never appear in a patch `path` — set once at
/// creation and never again.
pub const READONLY_ATTRS: &[&str] = &["id", "type", "time_created"];

/// The full set of attribute names a job record may declare. Anything
/// outside this set is rejected at create and patch time.
pub const DECLARED_ATTRS: &[&str] = &[
    "id",
    "type",
    "gist",
    "time_created",
    "time_started",
    "time_done",
    "platform",
    "bisect_range",
    "result_bisect",
    "bot_client_data",
    "error",
];

/// Enumerated job kinds. Only `bisect` exists today; the type is closed so
/// that an unrecognised tag is rejected rather than silently accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Binary-search a version range for the first regression point.
    Bisect,
}

impl JobType {
    /// Parse a job type tag from its wire string form.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "bisect" => Some(Self::Bisect),
            _ => None,
        }
    }

    /// Wire string form of this tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bisect => "bisect",
        }
    }
}

/// Enumerated worker operating-system platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// macOS.
    Darwin,
    /// Linux.
    Linux,
    /// Windows.
    Win32,
}

impl Platform {
    /// Parse a platform tag from its wire string form.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "darwin" => Some(Self::Darwin),
            "linux" => Some(Self::Linux),
            "win32" => Some(Self::Win32),
            _ => None,
        }
    }

    /// Wire string form of this tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Darwin => "darwin",
            Self::Linux => "linux",
            Self::Win32 => "win32",
        }
    }
}

/// Ordered `[v_good, v_bad]` pair of semantic versions bounding (or
/// resulting from) a bisection. Serializes as a plain two-element JSON
/// array of version strings, matching the wire format of the job broker
/// this contract describes.
pub type VersionRange = (semver::Version, semver::Version);

/// A bisect job record, exactly as exposed over the HTTP surface.
///
/// `log` is deliberately absent: log chunks live in a separate
/// [`LogStore`] keyed by the same id, never part of this JSON projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Opaque unique identifier, assigned by the store at creation. Readonly.
    pub id: Uuid,
    /// Enumerated job kind. Readonly.
    #[serde(rename = "type")]
    pub kind: JobType,
    /// Opaque identifier for the code payload to test. Required on creation.
    pub gist: String,
    /// Milliseconds since epoch, assigned at creation. Readonly.
    pub time_created: i64,
    /// Milliseconds since epoch the worker began executing the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_started: Option<i64>,
    /// Milliseconds since epoch the worker finished the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_done: Option<i64>,
    /// Worker operating system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    /// `[v_good, v_bad]` range to bisect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bisect_range: Option<VersionRange>,
    /// `[v_good, v_bad]` boundary found by the bisection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_bisect: Option<VersionRange>,
    /// Opaque JSON payload set by the bot; not interpreted by the broker
    /// except for filtering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_client_data: Option<serde_json::Value>,
    /// Error message, if the job failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// Render this job as a [`serde_json::Value`] object map, the
    /// representation the validator, patch engine, and query engine all
    /// operate on.
    ///
    /// # Panics
    ///
    /// Never: [`Job`]'s derived [`Serialize`] impl cannot fail.
    pub fn to_map(&self) -> Map<String, serde_json::Value> {
        let value = serde_json::to_value(self).expect("Job serialization is infallible");
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!("Job always serializes to an object"),
        }
    }

    /// Render this job as a full [`serde_json::Value`], as returned over
    /// the HTTP surface.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("Job serialization is infallible")
    }
}
