//! The trainee record store.
//!
//! [`ClientStore`] owns the in-memory collection, its id index and the read
//! snapshot cache. Every mutation follows the same sequence: locate the record
//! through the index, compute the new value, write it in place (or append),
//! rebuild the index when positions moved, save the whole collection, then
//! drop the cached snapshot so the next read sees the change.
//!
//! Mutating and reading both take `&mut self`: the store is meant to have a
//! single owner, and the borrow checker keeps two operations from
//! interleaving inside one process. Separate processes pointed at the same
//! file are not coordinated; the last save wins.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::Value as JsonValue;

use crate::app_response::{AppResponse, AppResult};
use crate::client_index::ClientIndex;
use crate::client_model::{
    ArchiveAction, ArchiveEntry, ClientFilters, ClientPage, ClientPatch, ClientRecord,
    Confirmation, EditEntry, ExamEntry, ExamType, FieldChange, NewClient, PaymentEntry,
    SubmissionEntry,
};
use crate::config::StoreConfig;
use crate::folders::ClientFolders;
use crate::json_file::JsonFile;
use crate::migration::migrate;
use crate::query;
use crate::sanitizer::{build_client_path, generate_id, unique_client_path};
use crate::snapshot_cache::{CacheStats, SnapshotCache};

pub struct ClientStore {
    config: StoreConfig,
    file: JsonFile,
    folders: ClientFolders,
    clients: Vec<ClientRecord>,
    index: ClientIndex,
    cache: SnapshotCache,
    /// Entries from the file that do not deserialize; saved back untouched.
    unreadable: Vec<JsonValue>,
    /// Set when the last save failed; in-memory state is ahead of the file.
    unsaved: bool,
}

impl ClientStore {
    /// Open (or create) the store described by `config`.
    ///
    /// Fails only when the base directory cannot be created. An unreadable
    /// store file is moved aside and the store starts empty.
    pub fn open(config: StoreConfig) -> AppResult<Self> {
        fs::create_dir_all(&config.base_dir).map_err(|e| {
            AppResponse::StorageError(format!(
                "Failed to create store directory {}: {e}",
                config.base_dir.display()
            ))
        })?;

        let mut store = Self {
            file: JsonFile::new(config.data_file()),
            folders: ClientFolders::new(config.base_dir.clone()),
            clients: Vec::new(),
            unreadable: Vec::new(),
            index: ClientIndex::new(),
            cache: SnapshotCache::new(config.cache_ttl),
            unsaved: false,
            config,
        };

        if let Err(e) = store.load() {
            warn!("Starting with an empty collection: {e}");
            if store.file.exists() {
                if let Err(quarantine_err) = store.file.quarantine() {
                    warn!("{quarantine_err}");
                }
            }
        }

        info!(
            "Client store opened at {} with {} records",
            store.file.path().display(),
            store.clients.len()
        );
        Ok(store)
    }

    /// Shorthand for [`ClientStore::open`] with default settings under `base_dir`.
    pub fn init(base_dir: impl Into<PathBuf>) -> AppResult<Self> {
        Self::open(StoreConfig::new(base_dir))
    }

    /// Replace the in-memory collection with the file's content, running the
    /// migration pass. On error the current collection is left as it was.
    ///
    /// Returns the number of records loaded.
    pub fn load(&mut self) -> AppResult<usize> {
        let Some(raw) = self.file.load()? else {
            self.clients.clear();
            self.unreadable.clear();
            self.index.rebuild(&self.clients);
            return Ok(0);
        };

        let report = migrate(raw, &self.config.base_dir, self.config.max_folder_name_len);
        self.clients = report.records;
        self.unreadable = report.unreadable;
        self.index.rebuild(&self.clients);

        if !self.unreadable.is_empty() {
            warn!(
                "{} unreadable record(s) in {} are kept as-is and hidden from reads",
                self.unreadable.len(),
                self.file.path().display()
            );
        }

        if report.repairs > 0 {
            if let Err(e) = self.persist() {
                warn!("Migrated records kept in memory only: {e}");
            }
        }

        Ok(self.clients.len())
    }

    /// Write the whole collection to disk. Also the way to retry after a
    /// failed save.
    pub fn persist(&mut self) -> AppResult<()> {
        match self.write_document() {
            Ok(()) => {
                self.unsaved = false;
                Ok(())
            }
            Err(e) => {
                self.unsaved = true;
                warn!("Failed to save {} records: {e}", self.clients.len());
                Err(e)
            }
        }
    }

    // ---------- CRUD ----------

    pub fn create(&mut self, new_client: NewClient) -> AppResult<ClientRecord> {
        let NewClient { tests, mut profile } = new_client;
        profile.strip_reserved();
        profile.validate_amounts()?;

        let first = profile.first_name_ar.as_deref().unwrap_or("").trim();
        let last = profile.last_name_ar.as_deref().unwrap_or("").trim();
        if first.is_empty() && last.is_empty() {
            return Err(AppResponse::ValidationError(
                "first_name_ar or last_name_ar is required".to_string(),
            ));
        }

        let clients = &self.clients;
        let path = unique_client_path(
            &self.config.base_dir,
            first,
            last,
            self.config.max_folder_name_len,
            |candidate| candidate.exists() || clients.iter().any(|r| r.path == candidate),
        );
        self.folders.ensure_client_dir(&path)?;

        let mut id = generate_id();
        while self.index.lookup(&id).is_some() {
            id = generate_id();
        }

        let record = ClientRecord::new(id, path, profile, tests.unwrap_or_default(), Utc::now());
        self.clients.push(record.clone());
        self.index.insert(&record.id, self.clients.len() - 1);
        self.commit()?;

        info!("Created client {} at {}", record.id, record.path.display());
        Ok(record)
    }

    /// Copy of every record, served from the snapshot cache when fresh.
    pub fn read_all(&mut self) -> Vec<ClientRecord> {
        self.snapshot().to_vec()
    }

    pub fn read_by_id(&mut self, id: &str) -> AppResult<ClientRecord> {
        let position = self.locate(id)?;
        Ok(self.clients[position].clone())
    }

    /// Merge `patch` onto the record. When `changed_fields` is not empty, an
    /// edit-history entry records the old and new value of each named field.
    pub fn update(
        &mut self,
        id: &str,
        patch: ClientPatch,
        changed_fields: &[String],
    ) -> AppResult<ClientRecord> {
        patch.validate()?;
        let position = self.locate(id)?;
        let now = Utc::now();

        let current = &self.clients[position];
        let mut merged = current.clone();
        patch.apply_to(&mut merged);
        merged.updated_at = now;

        let changed: Vec<&String> = changed_fields
            .iter()
            .filter(|field| !field.trim().is_empty())
            .collect();
        if !changed.is_empty() {
            let before = serde_json::to_value(current)?;
            let after = serde_json::to_value(&merged)?;
            let changes = changed
                .into_iter()
                .map(|field| FieldChange {
                    field: field.clone(),
                    old_value: before.get(field.as_str()).cloned().unwrap_or(JsonValue::Null),
                    new_value: after.get(field.as_str()).cloned().unwrap_or(JsonValue::Null),
                })
                .collect();
            merged.edit_history.push(EditEntry { date: now.into(), changes });
        }

        self.clients[position] = merged;
        self.commit()?;

        debug!("Updated client {id}");
        Ok(self.clients[position].clone())
    }

    /// Remove the record and its folder. A folder that cannot be removed is
    /// logged and left behind.
    pub fn delete(&mut self, id: &str) -> AppResult<bool> {
        let position = self.locate(id)?;
        let removed = self.clients.remove(position);
        self.index.rebuild(&self.clients);

        self.folders.remove_client_dir(&removed.path);
        self.commit()?;

        info!("Deleted client {id}");
        Ok(true)
    }

    // ---------- History ----------

    /// Append a payment and add it to the running `paid` total.
    pub fn add_payment(&mut self, id: &str, amount: f64) -> AppResult<Confirmation> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(AppResponse::ValidationError(format!(
                "Payment amount must be a positive number, got {amount}"
            )));
        }

        self.append_history(id, |record, now| {
            record.payment_history.push(PaymentEntry { date: now.into(), amount });
            record.profile.paid += amount;
            record.payment_history.len()
        })
    }

    /// Log an exam attempt and advance the matching progress slot.
    pub fn record_exam_attempt(
        &mut self,
        id: &str,
        exam_type: ExamType,
        passed: bool,
    ) -> AppResult<Confirmation> {
        self.append_history(id, |record, now| {
            record.exam_history.push(ExamEntry { date: now.into(), exam_type, passed });

            let progress = record.tests.get_mut(exam_type);
            progress.attempts = progress.attempts.saturating_add(1);
            progress.passed = passed;
            progress.last_attempt_date = Some(now.into());

            record.exam_history.len()
        })
    }

    pub fn record_submission(&mut self, id: &str, details: &str) -> AppResult<Confirmation> {
        let details = details.to_string();
        self.append_history(id, |record, now| {
            record.submission_history.push(SubmissionEntry { date: now.into(), details });
            record.submission_history.len()
        })
    }

    pub fn archive(&mut self, id: &str, action: ArchiveAction) -> AppResult<Confirmation> {
        self.append_history(id, |record, now| {
            record.archive_history.push(ArchiveEntry { date: now.into(), action: action.event() });
            record.archived = action == ArchiveAction::Archive;
            record.archive_history.len()
        })
    }

    fn append_history<F>(&mut self, id: &str, append: F) -> AppResult<Confirmation>
    where
        F: FnOnce(&mut ClientRecord, DateTime<Utc>) -> usize,
    {
        let position = self.locate(id)?;
        let now = Utc::now();

        let record = &mut self.clients[position];
        let history_len = append(record, now);
        record.updated_at = now;

        let confirmation = Confirmation {
            id: record.id.clone(),
            history_len,
            archived: record.archived,
            updated_at: now,
        };

        self.commit()?;
        Ok(confirmation)
    }

    // ---------- Queries ----------

    pub fn search(&mut self, query_text: &str, limit: usize) -> Vec<ClientRecord> {
        query::search(self.snapshot(), query_text, limit)
    }

    pub fn paginate(
        &mut self,
        page: usize,
        limit: usize,
        filters: &ClientFilters,
    ) -> AppResult<ClientPage> {
        query::paginate(self.snapshot(), page, limit, filters)
    }

    pub fn invalidate_cache(&mut self) {
        self.cache.invalidate();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ---------- Paths & folders ----------

    /// Where a trainee with this name would get a folder. Nothing is created.
    pub fn build_path(&self, first_name: &str, last_name: &str) -> PathBuf {
        build_client_path(
            &self.config.base_dir,
            first_name,
            last_name,
            self.config.max_folder_name_len,
        )
    }

    pub fn folders(&self) -> &ClientFolders {
        &self.folders
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    /// Entries in the file that could not be read as records.
    pub fn unreadable_len(&self) -> usize {
        self.unreadable.len()
    }

    /// Index position of `id`, for consistency checks in tests.
    pub(crate) fn position_of(&self, id: &str) -> Option<usize> {
        self.index.lookup(id)
    }

    pub(crate) fn record_at(&self, position: usize) -> Option<&ClientRecord> {
        self.clients.get(position)
    }

    // ---------- Internals ----------

    /// Resolve `id` to a valid position, or `NotFound`.
    fn locate(&mut self, id: &str) -> AppResult<usize> {
        if let Some(position) = self.checked_lookup(id) {
            return Ok(position);
        }
        if self.index.len() != self.clients.len() || self.index.lookup(id).is_some() {
            warn!("Index out of step with the collection, rebuilding");
            self.index.rebuild(&self.clients);
            if let Some(position) = self.checked_lookup(id) {
                return Ok(position);
            }
        }
        Err(AppResponse::not_found("Client", id))
    }

    fn checked_lookup(&self, id: &str) -> Option<usize> {
        self.index
            .lookup(id)
            .filter(|position| self.clients.get(*position).is_some_and(|r| r.id == id))
    }

    /// Typed records first, then the unreadable ones exactly as they were read.
    fn write_document(&self) -> AppResult<()> {
        let mut document = Vec::with_capacity(self.clients.len() + self.unreadable.len());
        for record in &self.clients {
            document.push(serde_json::to_value(record)?);
        }
        document.extend(self.unreadable.iter().cloned());
        self.file.save(&document)
    }

    /// Save, then drop the snapshot whether or not the save worked.
    fn commit(&mut self) -> AppResult<()> {
        let saved = self.persist();
        self.cache.invalidate();
        saved
    }

    /// Fresh snapshot: the cached one, or a reload from disk on a miss.
    ///
    /// A reload is skipped while unsaved changes exist, since the file is
    /// older than memory. A failed reload keeps the current collection.
    fn snapshot(&mut self) -> &[ClientRecord] {
        if self.cache.get().is_none() {
            if self.unsaved {
                debug!("Serving in-memory collection: unsaved changes pending");
            } else if let Err(e) = self.load() {
                warn!("Reload failed, keeping last known good collection: {e}");
            }
            self.cache.populate(self.clients.clone());
        }
        self.cache.peek().unwrap_or(&self.clients)
    }
}
