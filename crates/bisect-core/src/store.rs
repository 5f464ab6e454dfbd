// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory job store with optimistic concurrency control.
//!
//! Mirrors the nested-lock shape used elsewhere in this idiom: an outer
//! `RwLock` guards membership of the id→record map, and each record lives
//! behind its own `RwLock` so that unrelated jobs never contend on the same
//! lock. Reads (`get`, `list`) only ever take read locks; a mutation
//! (`apply`) takes the per-record write lock for the whole
//! check-ETag/apply-patch/validate/commit sequence, so two concurrent
//! patches against the same id are fully serialized and exactly one can
//! observe a given `If-Match` as current.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::validate::{validate_create, validate_patch_result, NewJob};
use crate::{patch, Job};
use bisect_error::BrokerError;

/// Opaque optimistic-concurrency token, derived from a record's internal
/// version counter. Serializes (via [`fmt::Display`]) as a quoted decimal
/// string, e.g. `"3"`, suitable for direct use as an HTTP `ETag` header
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ETag(u64);

impl ETag {
    fn initial() -> Self {
        Self(0)
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The raw version counter this tag wraps.
    pub fn version(self) -> u64 {
        self.0
    }

    /// Parse an `If-Match` header value, tolerating optional surrounding
    /// double quotes (the form produced by [`fmt::Display`] and the form a
    /// client may echo back verbatim).
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().trim_matches('"');
        trimmed.parse::<u64>().ok().map(Self)
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

/// The reasons an [`JobStore::apply`] call can fail to produce a new record.
#[derive(Debug)]
pub enum ApplyError {
    /// No job exists with the given id.
    NotFound,
    /// The supplied `If-Match` did not equal the record's current [`ETag`].
    PreconditionFailed,
    /// The patch was structurally invalid, touched a readonly attribute, or
    /// the resulting record failed schema validation.
    BadRequest(BrokerError),
}

struct JobRecord {
    job: Job,
    version: ETag,
}

/// In-memory, optimistic-concurrency job store.
///
/// Clone is cheap: internally this is an `Arc`-backed handle, so every
/// clone shares the same underlying map.
#[derive(Clone, Default)]
pub struct JobStore {
    records: Arc<RwLock<HashMap<Uuid, Arc<RwLock<JobRecord>>>>>,
}

impl JobStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and commit a new job, assigning it a fresh id and the
    /// current wall-clock time as `time_created`. Returns the stored job
    /// and its initial ETag.
    pub async fn create(&self, input: &Value) -> Result<(Job, ETag), BrokerError> {
        let new_job = validate_create(input)?;
        let job = materialize(new_job, Uuid::new_v4(), now_millis());
        let version = ETag::initial();

        let mut records = self.records.write().await;
        records.insert(job.id, Arc::new(RwLock::new(JobRecord { job: job.clone(), version })));
        Ok((job, version))
    }

    /// Fetch a job and its current ETag by id.
    pub async fn get(&self, id: Uuid) -> Option<(Job, ETag)> {
        let handle = {
            let records = self.records.read().await;
            records.get(&id)?.clone()
        };
        let record = handle.read().await;
        Some((record.job.clone(), record.version))
    }

    /// Snapshot every stored job and its id, for the query engine to filter.
    pub async fn list(&self) -> Vec<(Uuid, Job)> {
        let handles: Vec<(Uuid, Arc<RwLock<JobRecord>>)> = {
            let records = self.records.read().await;
            records.iter().map(|(id, h)| (*id, h.clone())).collect()
        };
        let mut out = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let record = handle.read().await;
            out.push((id, record.job.clone()));
        }
        out
    }

    /// Apply a sequence of patch operations to the job record `id`,
    /// enforcing optimistic concurrency against `if_match` and the readonly
    /// and schema invariants. On success, commits the new record
    /// and returns it along with its new ETag.
    pub async fn apply(
        &self,
        id: Uuid,
        if_match: ETag,
        raw_ops: &Value,
    ) -> Result<(Job, ETag), ApplyError> {
        let handle = {
            let records = self.records.read().await;
            records.get(&id).cloned().ok_or(ApplyError::NotFound)?
        };

        let mut record = handle.write().await;
        if record.version != if_match {
            return Err(ApplyError::PreconditionFailed);
        }

        let ops = patch::parse_ops(raw_ops).map_err(ApplyError::BadRequest)?;
        patch::check_readonly(&ops).map_err(ApplyError::BadRequest)?;

        let mut working = record.job.to_map();
        patch::apply_ops(&mut working, &ops).map_err(ApplyError::BadRequest)?;
        let patched = validate_patch_result(&working).map_err(ApplyError::BadRequest)?;

        record.job = patched.clone();
        record.version = record.version.next();
        Ok((patched, record.version))
    }
}

fn materialize(new_job: NewJob, id: Uuid, time_created: i64) -> Job {
    Job {
        id,
        kind: new_job.kind,
        gist: new_job.gist,
        time_created,
        time_started: new_job.time_started,
        time_done: new_job.time_done,
        platform: new_job.platform,
        bisect_range: new_job.bisect_range,
        result_bisect: new_job.result_bisect,
        bot_client_data: new_job.bot_client_data,
        error: new_job.error,
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
