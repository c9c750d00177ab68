//! One-pass repair of records as they come off disk.
//!
//! Runs on every load in two stages. The raw stage works on JSON objects and
//! folds legacy key spellings into the canonical ones and stamps records that
//! carry no readable creation time. The typed stage works
//! on [`ClientRecord`]s: it backfills missing or duplicated ids, points
//! records whose folder path sits outside the current base directory at a
//! freshly sanitized path (metadata only, nothing is moved on disk) and bumps
//! the schema version.
//!
//! The caller re-saves the collection when [`MigrationReport::repairs`] is
//! non-zero, so every repair is written back exactly once. Objects that still
//! fail to deserialize are handed back raw in [`MigrationReport::unreadable`]
//! instead of failing the whole load.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde_json::Value as JsonValue;

use crate::client_model::{parse_timestamp, ClientRecord, CURRENT_SCHEMA_VERSION};
use crate::sanitizer::{generate_id, unique_client_path};

/// `(canonical, legacy spellings)` as written by older front-end versions.
const LEGACY_FIELD_ALIASES: &[(&str, &[&str])] = &[
    ("id", &["_id"]),
    ("first_name_ar", &["firstName", "firstNameAr"]),
    ("last_name_ar", &["lastName", "lastNameAr"]),
    ("birth_date", &["birthDate"]),
    ("birth_place", &["birthPlace"]),
    ("birth_municipality", &["birthMunicipality"]),
    ("birth_state", &["birthState"]),
    ("phone_number", &["phoneNumber"]),
    ("current_address", &["currentAddress"]),
    ("current_municipality", &["currentMunicipality"]),
    ("current_state", &["currentState"]),
    ("national_id", &["nationalId"]),
    ("blood_type", &["bloodType"]),
    ("father_name", &["fatherName"]),
    ("mother_first_name", &["motherFirstName"]),
    ("mother_last_name", &["motherLastName"]),
    ("register_date", &["registerDate", "registration_date"]),
    ("register_number", &["registerNumber"]),
    ("subPrice", &["totalAmount", "total_amount"]),
    ("depositSubmitted", &["deposit_submitted"]),
    ("archived", &["isArchived"]),
];

#[derive(Debug, Default)]
pub struct MigrationReport {
    pub records: Vec<ClientRecord>,
    pub repairs: usize,
    /// Objects that still do not fit [`ClientRecord`] after repair. They are
    /// kept verbatim so the next save writes them back untouched.
    pub unreadable: Vec<JsonValue>,
}

pub fn migrate(raw: Vec<JsonValue>, base_dir: &Path, max_len: usize) -> MigrationReport {
    let now = Utc::now();
    let mut report = MigrationReport::default();
    report.records.reserve(raw.len());

    for (position, mut value) in raw.into_iter().enumerate() {
        if !value.is_object() {
            warn!("Dropping non-object entry at position {position} of the store file");
            report.repairs += 1;
            continue;
        }

        let original = value.clone();
        let repairs = fold_legacy_keys(&mut value) + stamp_timestamps(&mut value, now);

        match serde_json::from_value::<ClientRecord>(value) {
            Ok(record) => {
                report.repairs += repairs;
                report.records.push(record);
            }
            Err(e) => {
                warn!("Keeping unreadable record at position {position} as-is: {e}");
                report.unreadable.push(original);
            }
        }
    }

    report.repairs += repair_ids(&mut report.records);
    report.repairs += repair_paths(&mut report.records, base_dir, max_len);
    report.repairs += bump_schema(&mut report.records);

    if report.repairs > 0 {
        info!(
            "Migration repaired {} field(s) across {} records",
            report.repairs,
            report.records.len()
        );
    }

    report
}

/// Move legacy keys onto their canonical name. A canonical value that is
/// already present wins; the legacy key is dropped either way.
fn fold_legacy_keys(value: &mut JsonValue) -> usize {
    let Some(object) = value.as_object_mut() else {
        return 0;
    };

    let mut repairs = 0;
    for (canonical, legacy_names) in LEGACY_FIELD_ALIASES {
        for legacy in *legacy_names {
            let Some(legacy_value) = object.remove(*legacy) else {
                continue;
            };
            repairs += 1;

            let canonical_missing = object.get(*canonical).map_or(true, JsonValue::is_null);
            if canonical_missing && !legacy_value.is_null() {
                object.insert(canonical.to_string(), legacy_value);
            }
        }
    }
    repairs
}

/// Give a record without a readable `createdAt` the load time, once, and
/// pull an unreadable `updatedAt` back to `createdAt`. The stamped values are
/// persisted by the repair re-save, so later loads see the same instants.
fn stamp_timestamps(value: &mut JsonValue, now: DateTime<Utc>) -> usize {
    let Some(object) = value.as_object_mut() else {
        return 0;
    };

    let mut repairs = 0;
    let created = match object.get("createdAt").and_then(parse_timestamp) {
        Some(created) => created,
        None => {
            if let Some(old) = object.get("createdAt").filter(|v| !v.is_null()) {
                warn!("Replacing unreadable createdAt {old} with the load time");
            }
            object.insert("createdAt".to_string(), JsonValue::String(now.to_rfc3339()));
            repairs += 1;
            now
        }
    };

    if object.get("updatedAt").and_then(parse_timestamp).is_none() {
        object.insert("updatedAt".to_string(), JsonValue::String(created.to_rfc3339()));
        repairs += 1;
    }
    repairs
}

fn repair_ids(records: &mut [ClientRecord]) -> usize {
    let mut seen = HashSet::with_capacity(records.len());
    let mut repairs = 0;

    for record in records.iter_mut() {
        let blank = record.id.trim().is_empty();
        if blank || !seen.insert(record.id.clone()) {
            let old = std::mem::replace(&mut record.id, generate_id());
            if blank {
                info!("Assigned id {} to a record without one", record.id);
            } else {
                warn!("Duplicate id {old} reassigned to {}", record.id);
            }
            seen.insert(record.id.clone());
            repairs += 1;
        }
    }
    repairs
}

fn repair_paths(records: &mut [ClientRecord], base_dir: &Path, max_len: usize) -> usize {
    let mut taken: HashSet<PathBuf> = records.iter().map(|r| r.path.clone()).collect();
    let mut repairs = 0;

    for record in records.iter_mut() {
        if !is_legacy_path(&record.path, base_dir) {
            continue;
        }

        let first = record.profile.first_name_ar.clone().unwrap_or_default();
        let last = record.profile.last_name_ar.clone().unwrap_or_default();
        let new_path = unique_client_path(base_dir, &first, &last, max_len, |candidate| {
            taken.contains(candidate) || candidate.exists()
        });

        info!(
            "Record {}: folder path {} -> {}",
            record.id,
            record.path.display(),
            new_path.display()
        );
        taken.insert(new_path.clone());
        record.path = new_path;
        repairs += 1;
    }
    repairs
}

/// Empty paths, and paths that do not live under the current base directory
/// (an older install location, a pre-suffix layout on another machine).
pub fn is_legacy_path(path: &Path, base_dir: &Path) -> bool {
    path.as_os_str().is_empty() || path == base_dir || !path.starts_with(base_dir)
}

fn bump_schema(records: &mut [ClientRecord]) -> usize {
    let mut repairs = 0;
    for record in records.iter_mut() {
        if record.schema_version < CURRENT_SCHEMA_VERSION {
            record.schema_version = CURRENT_SCHEMA_VERSION;
            repairs += 1;
        }
    }
    repairs
}
