//! Data model for trainee records.
//!
//! A [`ClientRecord`] is one trainee: identity and contact details, the
//! folder that document generators write into, three exam progress slots and
//! five append-only history logs. Keys the store does not know about are kept
//! in [`ClientProfile::extra`] and written back untouched, so front-end fields
//! added later survive a load/save cycle.
//!
//! On disk the record keeps the key spelling the desktop front-end has always
//! used: profile fields in `snake_case`, store-managed fields in `camelCase`.
//!
//! ```json
//! {
//!   "id": "4b0e...",
//!   "path": "/data/Clients/محمد_أحمد_493021",
//!   "createdAt": "2024-03-01T09:12:44Z",
//!   "updatedAt": "2024-03-04T16:02:10Z",
//!   "archived": false,
//!   "tests": { "trafficLawTest": { "passed": true, "attempts": 1, "lastAttemptDate": "..." }, ... },
//!   "paymentHistory": [ { "date": "...", "amount": 500.0 } ],
//!   "first_name_ar": "محمد",
//!   "last_name_ar": "أحمد",
//!   "subPrice": 6000.0,
//!   "paid": 500.0
//! }
//! ```

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::app_response::AppResponse;

/// Schema version written by this crate. Records below it are upgraded on load.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Keys owned by the store itself. Callers cannot smuggle them in through the
/// free-form part of a create or update payload.
pub const RESERVED_FIELDS: [&str; 12] = [
    "id",
    "_id",
    "path",
    "createdAt",
    "updatedAt",
    "archived",
    "paymentHistory",
    "editHistory",
    "examHistory",
    "submissionHistory",
    "archiveHistory",
    "schemaVersion",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    #[serde(default)]
    pub id: String,

    /// Directory owned by this trainee for generated documents.
    #[serde(default)]
    pub path: PathBuf,

    #[serde(rename = "createdAt", default = "Utc::now", deserialize_with = "lenient::timestamp")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt", default = "Utc::now", deserialize_with = "lenient::timestamp")]
    pub updated_at: DateTime<Utc>,

    #[serde(default, deserialize_with = "lenient::boolean")]
    pub archived: bool,

    #[serde(default, deserialize_with = "lenient::or_default")]
    pub tests: ClientTests,

    #[serde(rename = "paymentHistory", default, deserialize_with = "lenient::or_default")]
    pub payment_history: Vec<PaymentEntry>,

    #[serde(rename = "editHistory", default, deserialize_with = "lenient::or_default")]
    pub edit_history: Vec<EditEntry>,

    #[serde(rename = "examHistory", default, deserialize_with = "lenient::or_default")]
    pub exam_history: Vec<ExamEntry>,

    #[serde(rename = "submissionHistory", default, deserialize_with = "lenient::or_default")]
    pub submission_history: Vec<SubmissionEntry>,

    #[serde(rename = "archiveHistory", default, deserialize_with = "lenient::or_default")]
    pub archive_history: Vec<ArchiveEntry>,

    #[serde(rename = "schemaVersion", default, deserialize_with = "lenient::count")]
    pub schema_version: u32,

    #[serde(flatten)]
    pub profile: ClientProfile,
}

impl ClientRecord {
    pub fn new(
        id: String,
        path: PathBuf,
        profile: ClientProfile,
        tests: ClientTests,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            path,
            created_at: now,
            updated_at: now,
            archived: false,
            tests,
            payment_history: Vec::new(),
            edit_history: Vec::new(),
            exam_history: Vec::new(),
            submission_history: Vec::new(),
            archive_history: Vec::new(),
            schema_version: CURRENT_SCHEMA_VERSION,
            profile,
        }
    }

    /// `first last`, trimmed; empty when neither part is set.
    pub fn full_name(&self) -> String {
        let first = self.profile.first_name_ar.as_deref().unwrap_or("");
        let last = self.profile.last_name_ar.as_deref().unwrap_or("");
        format!("{first} {last}").trim().to_string()
    }

    /// What is still owed, never negative.
    pub fn remaining_balance(&self) -> f64 {
        (self.profile.sub_price - self.profile.paid).max(0.0)
    }

    /// The values a text search looks at.
    pub fn searchable_fields(&self) -> [String; 3] {
        [
            self.full_name(),
            self.profile.phone_number.clone().unwrap_or_default(),
            self.profile.national_id.clone().unwrap_or_default(),
        ]
    }
}

/// Caller-editable part of a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientProfile {
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub first_name_ar: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub last_name_ar: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub register_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub register_number: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,

    /// Total registration price.
    #[serde(rename = "subPrice", default, deserialize_with = "lenient::amount")]
    pub sub_price: f64,
    /// Sum of every payment received so far.
    #[serde(default, deserialize_with = "lenient::amount")]
    pub paid: f64,

    #[serde(rename = "depositSubmitted", default, deserialize_with = "lenient::boolean")]
    pub deposit_submitted: bool,
    #[serde(default, deserialize_with = "lenient::boolean")]
    pub printed: bool,

    /// Every other key (birth place, parents' names, addresses, ...).
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl ClientProfile {
    pub fn strip_reserved(&mut self) {
        self.extra.retain(|key, _| !RESERVED_FIELDS.contains(&key.as_str()));
    }

    pub fn validate_amounts(&self) -> Result<(), AppResponse> {
        validate_money("subPrice", self.sub_price)?;
        validate_money("paid", self.paid)
    }
}

fn validate_money(field: &str, value: f64) -> Result<(), AppResponse> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppResponse::ValidationError(format!(
            "{field} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}

/// Input for [`crate::client_store::ClientStore::create`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewClient {
    /// Starting exam progress; zeroed when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<ClientTests>,

    #[serde(flatten)]
    pub profile: ClientProfile,
}

impl NewClient {
    pub fn named(first_name: &str, last_name: &str) -> Self {
        Self {
            tests: None,
            profile: ClientProfile {
                first_name_ar: Some(first_name.to_string()),
                last_name_ar: Some(last_name.to_string()),
                ..ClientProfile::default()
            },
        }
    }
}

/// Partial update. Only fields that are present replace the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name_ar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name_ar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(rename = "subPrice", default, skip_serializing_if = "Option::is_none")]
    pub sub_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid: Option<f64>,
    #[serde(rename = "depositSubmitted", default, skip_serializing_if = "Option::is_none")]
    pub deposit_submitted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<ClientTests>,

    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl ClientPatch {
    pub fn validate(&self) -> Result<(), AppResponse> {
        if let Some(sub_price) = self.sub_price {
            validate_money("subPrice", sub_price)?;
        }
        if let Some(paid) = self.paid {
            validate_money("paid", paid)?;
        }
        Ok(())
    }

    /// Shallow, field-by-field merge onto `record`.
    pub fn apply_to(self, record: &mut ClientRecord) {
        let profile = &mut record.profile;

        replace(&mut profile.first_name_ar, self.first_name_ar);
        replace(&mut profile.last_name_ar, self.last_name_ar);
        replace(&mut profile.gender, self.gender);
        replace(&mut profile.birth_date, self.birth_date);
        replace(&mut profile.phone_number, self.phone_number);
        replace(&mut profile.national_id, self.national_id);
        replace(&mut profile.register_date, self.register_date);
        replace(&mut profile.register_number, self.register_number);
        replace(&mut profile.comments, self.comments);

        if let Some(sub_price) = self.sub_price {
            profile.sub_price = sub_price;
        }
        if let Some(paid) = self.paid {
            profile.paid = paid;
        }
        if let Some(deposit_submitted) = self.deposit_submitted {
            profile.deposit_submitted = deposit_submitted;
        }
        if let Some(printed) = self.printed {
            profile.printed = printed;
        }
        if let Some(tests) = self.tests {
            record.tests = tests;
        }

        for (key, value) in self.extra {
            if !RESERVED_FIELDS.contains(&key.as_str()) {
                profile.extra.insert(key, value);
            }
        }
    }
}

fn replace(slot: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *slot = value;
    }
}

// ---------- Exam progress ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExamType {
    #[serde(rename = "trafficLawTest", alias = "trafficLaw", alias = "traffic_law")]
    TrafficLaw,
    #[serde(rename = "manoeuvresTest", alias = "maneuversTest", alias = "manoeuvres", alias = "maneuvers")]
    Manoeuvres,
    #[serde(rename = "drivingTest", alias = "driving")]
    Driving,
}

impl ExamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamType::TrafficLaw => "trafficLawTest",
            ExamType::Manoeuvres => "manoeuvresTest",
            ExamType::Driving => "drivingTest",
        }
    }
}

impl Display for ExamType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExamType {
    type Err = AppResponse;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "trafficLawTest" | "traffic_law" | "trafficLaw" => Ok(ExamType::TrafficLaw),
            "manoeuvresTest" | "maneuversTest" | "manoeuvres" | "maneuvers" => Ok(ExamType::Manoeuvres),
            "drivingTest" | "driving" => Ok(ExamType::Driving),
            other => Err(AppResponse::ValidationError(format!("Unknown exam type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestProgress {
    #[serde(default, deserialize_with = "lenient::boolean")]
    pub passed: bool,
    #[serde(default, deserialize_with = "lenient::count")]
    pub attempts: u32,
    #[serde(rename = "lastAttemptDate", default)]
    pub last_attempt_date: Option<EntryDate>,
}

/// The closed set of exams a trainee goes through, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientTests {
    #[serde(rename = "trafficLawTest", default, deserialize_with = "lenient::or_default")]
    pub traffic_law: TestProgress,
    #[serde(rename = "manoeuvresTest", default, deserialize_with = "lenient::or_default")]
    pub manoeuvres: TestProgress,
    #[serde(rename = "drivingTest", default, deserialize_with = "lenient::or_default")]
    pub driving: TestProgress,
}

impl ClientTests {
    pub fn get(&self, exam: ExamType) -> &TestProgress {
        match exam {
            ExamType::TrafficLaw => &self.traffic_law,
            ExamType::Manoeuvres => &self.manoeuvres,
            ExamType::Driving => &self.driving,
        }
    }

    pub fn get_mut(&mut self, exam: ExamType) -> &mut TestProgress {
        match exam {
            ExamType::TrafficLaw => &mut self.traffic_law,
            ExamType::Manoeuvres => &mut self.manoeuvres,
            ExamType::Driving => &mut self.driving,
        }
    }
}

// ---------- History entries ----------

/// When a history event happened.
///
/// Dates written by this crate are always `At`. Anything else found on disk
/// (`"01/03/2024"`, epoch numbers, ...) stays `Legacy` and is written back
/// exactly as it was read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryDate {
    At(DateTime<Utc>),
    Legacy(JsonValue),
}

impl EntryDate {
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            EntryDate::At(at) => Some(*at),
            EntryDate::Legacy(value) => parse_timestamp(value),
        }
    }

    fn is_missing(&self) -> bool {
        matches!(self, EntryDate::Legacy(JsonValue::Null))
    }
}

impl Default for EntryDate {
    fn default() -> Self {
        EntryDate::Legacy(JsonValue::Null)
    }
}

impl From<DateTime<Utc>> for EntryDate {
    fn from(at: DateTime<Utc>) -> Self {
        EntryDate::At(at)
    }
}

impl PartialEq<DateTime<Utc>> for EntryDate {
    fn eq(&self, other: &DateTime<Utc>) -> bool {
        matches!(self, EntryDate::At(at) if at == other)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEntry {
    #[serde(default, skip_serializing_if = "EntryDate::is_missing")]
    pub date: EntryDate,
    #[serde(deserialize_with = "lenient::amount")]
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    #[serde(rename = "oldValue", default)]
    pub old_value: JsonValue,
    #[serde(rename = "newValue", default)]
    pub new_value: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditEntry {
    #[serde(default, skip_serializing_if = "EntryDate::is_missing")]
    pub date: EntryDate,
    #[serde(default)]
    pub changes: Vec<FieldChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamEntry {
    #[serde(default, skip_serializing_if = "EntryDate::is_missing")]
    pub date: EntryDate,
    #[serde(rename = "examType")]
    pub exam_type: ExamType,
    #[serde(default, deserialize_with = "lenient::boolean")]
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionEntry {
    #[serde(default, skip_serializing_if = "EntryDate::is_missing")]
    pub date: EntryDate,
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveEvent {
    #[serde(alias = "archived", alias = "archive")]
    Archived,
    #[serde(alias = "unarchived", alias = "unarchive")]
    Unarchived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    #[serde(default, skip_serializing_if = "EntryDate::is_missing")]
    pub date: EntryDate,
    pub action: ArchiveEvent,
}

/// What the caller asks for; recorded as an [`ArchiveEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveAction {
    Archive,
    Unarchive,
}

impl ArchiveAction {
    pub fn event(&self) -> ArchiveEvent {
        match self {
            ArchiveAction::Archive => ArchiveEvent::Archived,
            ArchiveAction::Unarchive => ArchiveEvent::Unarchived,
        }
    }
}

impl FromStr for ArchiveAction {
    type Err = AppResponse;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "archive" => Ok(ArchiveAction::Archive),
            "unarchive" => Ok(ArchiveAction::Unarchive),
            other => Err(AppResponse::ValidationError(format!(
                "Archive action must be 'archive' or 'unarchive', got '{other}'"
            ))),
        }
    }
}

// ---------- Operation results ----------

/// Returned by the history operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub id: String,
    /// Length of the history log that was appended to.
    pub history_len: usize,
    pub archived: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientFilters {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub archived: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPage {
    pub clients: Vec<ClientRecord>,
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
    pub has_more: bool,
}

/// RFC 3339, a bare `YYYY-MM-DD`, or epoch milliseconds.
pub(crate) fn parse_timestamp(value: &JsonValue) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::String(s) => {
            let s = s.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return Some(parsed.with_timezone(&Utc));
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        JsonValue::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

/// Tolerant readers for values older front-end versions wrote loosely:
/// numbers as strings, `null` where an object belongs, dates without time.
mod lenient {
    use chrono::{DateTime, Utc};
    use serde::de::{DeserializeOwned, Error as _};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value as JsonValue;

    pub fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        super::parse_timestamp(&value)
            .ok_or_else(|| D::Error::custom(format!("unreadable timestamp {value}")))
    }

    pub fn amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        let parsed = match value {
            JsonValue::Number(n) => n.as_f64().unwrap_or(0.0),
            JsonValue::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        };
        Ok(if parsed.is_finite() { parsed } else { 0.0 })
    }

    pub fn count<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        let parsed = match value {
            JsonValue::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .unwrap_or(0),
            JsonValue::String(s) => s.trim().parse::<u64>().unwrap_or(0),
            _ => 0,
        };
        Ok(u32::try_from(parsed).unwrap_or(u32::MAX))
    }

    pub fn boolean<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        Ok(match value {
            JsonValue::Bool(b) => b,
            JsonValue::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
            JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            _ => false,
        })
    }

    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        Ok(match value {
            JsonValue::String(s) => Some(s),
            JsonValue::Number(n) => Some(n.to_string()),
            JsonValue::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    /// `null` becomes the type's default. Anything else must still parse:
    /// silently dropping a malformed history would lose it on the next save.
    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let value = JsonValue::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(value).map_err(D::Error::custom)
    }
}
