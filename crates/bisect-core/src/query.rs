// SPDX-License-Identifier: MIT OR Apache-2.0
//! Filtered-query engine over job records.
//!
//! Filter clauses are conveyed as query-string key/value pairs. A key is a
//! dotted attribute path, optionally suffixed with `!` to negate the
//! clause; its value is a comma-separated list of atoms, where the literal
//! `undefined` denotes "attribute absent at this path". Clauses combine
//! with AND.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::validate::coerce_filter_value;

/// One parsed filter clause: match (or, if negated, reject) records whose
/// value at `path` is a member of `atoms`.
#[derive(Debug, Clone)]
pub struct FilterClause {
    /// Dotted path split into segments, e.g. `["bot_client_data", "hello", "world"]`.
    pub path: Vec<String>,
    /// Whether this clause is negated (trailing `!` in the query key).
    pub negate: bool,
    /// Accepted values. `None` represents the `undefined` (absent) sentinel.
    pub atoms: Vec<Option<Value>>,
}

/// Stateless parser and matcher for job-record filter clauses.
pub struct QueryEngine;

impl QueryEngine {
    /// Parse raw query parameters (as decoded by the HTTP layer) into a set
    /// of filter clauses. Unrecognized keys are not possible here: every
    /// key is itself an attribute path, known or not (unknown paths simply
    /// resolve to absent at match time).
    pub fn parse(params: &HashMap<String, String>) -> Vec<FilterClause> {
        params
            .iter()
            .map(|(key, value)| {
                let (attr_path, negate) = match key.strip_suffix('!') {
                    Some(stripped) => (stripped, true),
                    None => (key.as_str(), false),
                };
                let path: Vec<String> = attr_path.split('.').map(str::to_string).collect();
                let atoms = value
                    .split(',')
                    .map(|atom| coerce_filter_value(attr_path, atom))
                    .collect();
                FilterClause {
                    path,
                    negate,
                    atoms,
                }
            })
            .collect()
    }

    /// Returns `true` if `record` (a job rendered as a JSON object) matches
    /// every clause.
    pub fn matches(record: &Value, clauses: &[FilterClause]) -> bool {
        clauses.iter().all(|clause| Self::matches_clause(record, clause))
    }

    fn matches_clause(record: &Value, clause: &FilterClause) -> bool {
        let resolved = resolve_path(record, &clause.path);
        let is_member = clause
            .atoms
            .iter()
            .any(|atom| match (atom, resolved) {
                (None, None) => true,
                (Some(a), Some(r)) => a == r,
                _ => false,
            });
        if clause.negate { !is_member } else { is_member }
    }

    /// Filter a list of `(id, record)` pairs, returning the ids of every
    /// record that matches all `clauses`. An empty clause list matches
    /// everything.
    pub fn select(records: &[(Uuid, Value)], clauses: &[FilterClause]) -> Vec<Uuid> {
        records
            .iter()
            .filter(|(_, record)| Self::matches(record, clauses))
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Resolve a dotted path against a JSON object, traversing nested mappings
/// only (never indexing into arrays). Returns `None` if any segment along
/// the way is missing.
fn resolve_path<'a>(record: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = record;
    for segment in path {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
