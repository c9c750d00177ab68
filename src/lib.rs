//! # Trainee Records Core
//!
//! Local record store for a driving school's trainees, designed for FFI
//! (Foreign Function Interface) integration with Flutter and other
//! cross-platform front-ends.
//!
//! All records live in a single JSON file (`Clients.json`) under a base
//! directory, and each trainee owns a sibling folder for their documents.
//!
//! ## Features
//!
//! - **Single JSON file**: whole-collection saves through a temp file and rename
//! - **Schema migration**: legacy field names, missing ids and old folder
//!   paths are repaired when the file is loaded
//! - **Append-only histories**: payments, edits, exam attempts, submissions
//!   and archive actions
//! - **Snapshot cache**: list, search and pagination read from a short-lived copy
//! - **Safe error handling**: No `unwrap()` calls in production code
//!
//! ## Quick Start
//!
//! ```no_run
//! use trainee_records_core::{create_store, create_client, free_response};
//! use std::ffi::CString;
//!
//! let base_dir = CString::new("/tmp/autoschool/Clients").unwrap();
//! let store = create_store(base_dir.as_ptr());
//!
//! let json = CString::new(r#"{"first_name_ar":"محمد","last_name_ar":"أحمد"}"#).unwrap();
//! let result = create_client(store, json.as_ptr());
//! free_response(result);
//! ```
//!
//! ## FFI Functions
//!
//! Every function except [`create_store`] and [`free_response`] returns a
//! JSON-encoded [`AppResponse`], for example `{"Ok":"<json payload>"}` or
//! `{"NotFound":"Client with id 42 not found"}`. Free it with [`free_response`].
//!
//! - [`create_store`] / [`close_store`] - Open and release a store handle
//! - [`create_client`], [`get_all_clients`], [`get_client_by_id`],
//!   [`update_client`], [`delete_client`] - Record CRUD
//! - [`add_payment`], [`record_exam_attempt`], [`record_submission`],
//!   [`archive_client`] - History logs
//! - [`search_clients`], [`get_clients_paginated`], [`invalidate_cache`] - Queries
//! - [`build_client_path`] - Folder path for a name
//! - [`create_folder`], [`read_folders`], [`rename_folder`], [`delete_folder`] -
//!   Folder management

pub mod app_response;
pub mod client_index;
pub mod client_model;
pub mod client_store;
pub mod config;
pub mod folders;
pub mod json_file;
pub mod migration;
pub mod query;
pub mod sanitizer;
pub mod snapshot_cache;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app_response::{AppResponse, AppResult};
use crate::client_model::{ArchiveAction, ClientFilters, ClientPatch, ExamType, NewClient};
use crate::client_store::ClientStore;
use crate::config::StoreConfig;

/// Body accepted by [`update_client`].
#[derive(Debug, Deserialize)]
struct UpdateRequest {
    data: ClientPatch,
    #[serde(rename = "changedFields", default)]
    changed_fields: Vec<String>,
}

/// Opens (or creates) the store rooted at `base_dir`.
///
/// The directory is created when missing. An existing `Clients.json` is
/// loaded and migrated; a file that cannot be parsed is renamed to
/// `Clients.json.corrupt-<timestamp>` and the store starts empty.
///
/// # Parameters
///
/// * `base_dir` - A null-terminated C string with the store directory
///
/// # Returns
///
/// Returns a pointer to the [`ClientStore`] on success, or a null pointer on failure.
/// Release it with [`close_store`].
///
/// # Safety
///
/// `base_dir` must be null or point to a valid null-terminated string.
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use trainee_records_core::create_store;
///
/// let base_dir = CString::new("/tmp/autoschool/Clients").unwrap();
/// let store = create_store(base_dir.as_ptr());
///
/// if !store.is_null() {
///     // Store opened successfully
/// }
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_store(base_dir: *const c_char) -> *mut ClientStore {
    if base_dir.is_null() {
        warn!("Null base_dir pointer passed to create_store");
        return std::ptr::null_mut();
    }

    let base_dir = match unsafe { CStr::from_ptr(base_dir).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in base_dir parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    let config = if base_dir.trim().is_empty() {
        StoreConfig::default()
    } else {
        StoreConfig::new(base_dir)
    };

    match ClientStore::open(config) {
        Ok(store) => Box::into_raw(Box::new(store)),
        Err(e) => {
            warn!("Failed to open client store: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Releases a store handle returned by [`create_store`].
///
/// A store whose last save failed gets one more save attempt first.
///
/// # Safety
///
/// `store` must come from [`create_store`] and must not be used afterwards.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_store(store: *mut ClientStore) -> *const c_char {
    if store.is_null() {
        let error = AppResponse::BadRequest("Null store pointer passed to close_store".to_string());
        return response_to_c_string(&error);
    }

    let mut store = unsafe { Box::from_raw(store) };
    if store.has_unsaved_changes() {
        if let Err(e) = store.persist() {
            return response_to_c_string(&e);
        }
    }
    drop(store);

    info!("Client store closed");
    response_to_c_string(&AppResponse::success("Store closed"))
}

/// Frees a response string returned by any other function of this library.
///
/// # Safety
///
/// `response` must come from this library and must not be freed twice.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(response: *const c_char) {
    if response.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(response as *mut c_char));
    }
}

/// Creates a new trainee record.
///
/// The record gets a fresh id, creation timestamps, empty histories and a
/// folder named after the trainee under the store directory.
///
/// # Parameters
///
/// * `store` - Pointer to the store
/// * `json_ptr` - Null-terminated C string containing the trainee's profile
///
/// # Returns
///
/// `{"Ok":"<record json>"}` on success. `ValidationError` when neither name
/// is given or an amount is negative.
///
/// # JSON Format
///
/// ```json
/// {
///   "first_name_ar": "محمد",
///   "last_name_ar": "أحمد",
///   "phone_number": "0555123456",
///   "subPrice": 30000,
///   "tests": { "trafficLawTest": { "passed": false, "attempts": 0 } }
/// }
/// ```
///
/// Keys the store does not know are kept on the record as-is.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_client(store: *mut ClientStore, json_ptr: *const c_char) -> *const c_char {
    let store = match store_from_ptr(store, "create_client") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let new_client: NewClient = match serde_json::from_str(&json_str) {
        Ok(c) => c,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    result_to_c_string(store.create(new_client))
}

/// Returns every record as a JSON array.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_all_clients(store: *mut ClientStore) -> *const c_char {
    let store = match store_from_ptr(store, "get_all_clients") {
        Ok(s) => s,
        Err(err) => return err,
    };

    result_to_c_string(Ok(store.read_all()))
}

/// Retrieves a record by its id.
///
/// # Returns
///
/// The record JSON, or `NotFound` for an unknown id.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_client_by_id(store: *mut ClientStore, id: *const c_char) -> *const c_char {
    let store = match store_from_ptr(store, "get_client_by_id") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let id_str = match c_ptr_to_string(id, "id") {
        Ok(s) => s,
        Err(err) => return err,
    };

    result_to_c_string(store.read_by_id(&id_str))
}

/// Merges a partial update into a record.
///
/// # JSON Format
///
/// ```json
/// {
///   "data": { "phone_number": "0666000000" },
///   "changedFields": ["phone_number"]
/// }
/// ```
///
/// Each name in `changedFields` is logged to the record's edit history with
/// its old and new value. `changedFields` may be omitted.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn update_client(
    store: *mut ClientStore,
    id: *const c_char,
    json_ptr: *const c_char,
) -> *const c_char {
    let store = match store_from_ptr(store, "update_client") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let id_str = match c_ptr_to_string(id, "id") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let request: UpdateRequest = match serde_json::from_str(&json_str) {
        Ok(r) => r,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    result_to_c_string(store.update(&id_str, request.data, &request.changed_fields))
}

/// Deletes a record and its folder.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn delete_client(store: *mut ClientStore, id: *const c_char) -> *const c_char {
    let store = match store_from_ptr(store, "delete_client") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let id_str = match c_ptr_to_string(id, "id") {
        Ok(s) => s,
        Err(err) => return err,
    };

    match store.delete(&id_str) {
        Ok(_) => response_to_c_string(&AppResponse::success(format!("Client {id_str} deleted"))),
        Err(e) => response_to_c_string(&e),
    }
}

/// Appends a payment of `amount` to the record's payment history.
///
/// `amount` must be positive and finite. The record's `paid` total grows by
/// the same amount.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn add_payment(store: *mut ClientStore, id: *const c_char, amount: f64) -> *const c_char {
    let store = match store_from_ptr(store, "add_payment") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let id_str = match c_ptr_to_string(id, "id") {
        Ok(s) => s,
        Err(err) => return err,
    };

    result_to_c_string(store.add_payment(&id_str, amount))
}

/// Logs an exam attempt.
///
/// `exam_type` is one of `trafficLawTest`, `manoeuvresTest` or `drivingTest`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn record_exam_attempt(
    store: *mut ClientStore,
    id: *const c_char,
    exam_type: *const c_char,
    passed: bool,
) -> *const c_char {
    let store = match store_from_ptr(store, "record_exam_attempt") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let id_str = match c_ptr_to_string(id, "id") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let exam_type = match c_ptr_to_string(exam_type, "exam_type") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let exam_type: ExamType = match exam_type.parse() {
        Ok(t) => t,
        Err(e) => return response_to_c_string(&e),
    };

    result_to_c_string(store.record_exam_attempt(&id_str, exam_type, passed))
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn record_submission(
    store: *mut ClientStore,
    id: *const c_char,
    details: *const c_char,
) -> *const c_char {
    let store = match store_from_ptr(store, "record_submission") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let id_str = match c_ptr_to_string(id, "id") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let details = match c_ptr_to_string(details, "details") {
        Ok(s) => s,
        Err(err) => return err,
    };

    result_to_c_string(store.record_submission(&id_str, &details))
}

/// Archives or unarchives a record. `action` is `archive` or `unarchive`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn archive_client(
    store: *mut ClientStore,
    id: *const c_char,
    action: *const c_char,
) -> *const c_char {
    let store = match store_from_ptr(store, "archive_client") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let id_str = match c_ptr_to_string(id, "id") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let action = match c_ptr_to_string(action, "action") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let action: ArchiveAction = match action.parse() {
        Ok(a) => a,
        Err(e) => return response_to_c_string(&e),
    };

    result_to_c_string(store.archive(&id_str, action))
}

/// Up to `limit` records whose name, phone number or national id contains
/// `query`, ignoring case.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn search_clients(
    store: *mut ClientStore,
    query: *const c_char,
    limit: u32,
) -> *const c_char {
    let store = match store_from_ptr(store, "search_clients") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let query = match c_ptr_to_string(query, "query") {
        Ok(s) => s,
        Err(err) => return err,
    };

    result_to_c_string(Ok(store.search(&query, limit as usize)))
}

/// One page of records.
///
/// # Parameters
///
/// * `page` - 1-based page number
/// * `limit` - Page size, at least 1
/// * `filters_ptr` - Optional JSON such as `{"search":"محمد","archived":false}`;
///   null means no filter
///
/// # Returns
///
/// `{"Ok":"{\"clients\":[...],\"total\":..,\"page\":..,\"totalPages\":..,\"hasMore\":..}"}`
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_clients_paginated(
    store: *mut ClientStore,
    page: u32,
    limit: u32,
    filters_ptr: *const c_char,
) -> *const c_char {
    let store = match store_from_ptr(store, "get_clients_paginated") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let filters = if filters_ptr.is_null() {
        ClientFilters::default()
    } else {
        let json_str = match c_ptr_to_string(filters_ptr, "filters") {
            Ok(s) => s,
            Err(err) => return err,
        };
        match serde_json::from_str(&json_str) {
            Ok(f) => f,
            Err(e) => {
                let error = AppResponse::SerializationError(format!("Invalid filters JSON: {e}"));
                return response_to_c_string(&error);
            }
        }
    };

    result_to_c_string(store.paginate(page as usize, limit as usize, &filters))
}

/// Drops the read snapshot so the next list or search reloads the file.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn invalidate_cache(store: *mut ClientStore) -> *const c_char {
    let store = match store_from_ptr(store, "invalidate_cache") {
        Ok(s) => s,
        Err(err) => return err,
    };

    store.invalidate_cache();
    response_to_c_string(&AppResponse::success("Cache invalidated"))
}

/// The folder path a trainee with this name would get. Nothing is created.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn build_client_path(
    store: *mut ClientStore,
    first_name: *const c_char,
    last_name: *const c_char,
) -> *const c_char {
    let store = match store_from_ptr(store, "build_client_path") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let first_name = match c_ptr_to_string(first_name, "first_name") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let last_name = match c_ptr_to_string(last_name, "last_name") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let path = store.build_path(&first_name, &last_name);
    response_to_c_string(&AppResponse::Ok(path.to_string_lossy().to_string()))
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_folder(store: *mut ClientStore, name: *const c_char) -> *const c_char {
    let store = match store_from_ptr(store, "create_folder") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let name = match c_ptr_to_string(name, "name") {
        Ok(s) => s,
        Err(err) => return err,
    };

    result_to_c_string(store.folders().create(&name))
}

/// Names of the folders under the store directory, sorted.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn read_folders(store: *mut ClientStore) -> *const c_char {
    let store = match store_from_ptr(store, "read_folders") {
        Ok(s) => s,
        Err(err) => return err,
    };

    result_to_c_string(store.folders().list())
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn rename_folder(
    store: *mut ClientStore,
    old_name: *const c_char,
    new_name: *const c_char,
) -> *const c_char {
    let store = match store_from_ptr(store, "rename_folder") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let old_name = match c_ptr_to_string(old_name, "old_name") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let new_name = match c_ptr_to_string(new_name, "new_name") {
        Ok(s) => s,
        Err(err) => return err,
    };

    result_to_c_string(store.folders().rename(&old_name, &new_name))
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn delete_folder(store: *mut ClientStore, name: *const c_char) -> *const c_char {
    let store = match store_from_ptr(store, "delete_folder") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let name = match c_ptr_to_string(name, "name") {
        Ok(s) => s,
        Err(err) => return err,
    };

    match store.folders().delete(&name) {
        Ok(_) => response_to_c_string(&AppResponse::success(format!("Folder {name} deleted"))),
        Err(e) => response_to_c_string(&e),
    }
}

/// Borrows the store behind an FFI handle, or builds the `BadRequest`
/// response for a null one.
fn store_from_ptr<'a>(
    store: *mut ClientStore,
    caller: &str,
) -> Result<&'a mut ClientStore, *const c_char> {
    match unsafe { store.as_mut() } {
        Some(s) => Ok(s),
        None => {
            let error = AppResponse::BadRequest(format!("Null store pointer passed to {caller}"));
            Err(response_to_c_string(&error))
        }
    }
}

/// Wraps a successful payload as `Ok(<payload json>)`, or passes the error through.
fn result_to_c_string<T: Serialize>(result: AppResult<T>) -> *const c_char {
    match result {
        Ok(value) => match serde_json::to_string(&value) {
            Ok(json) => response_to_c_string(&AppResponse::Ok(json)),
            Err(e) => {
                let error = AppResponse::SerializationError(format!("Failed to serialize result: {e}"));
                response_to_c_string(&error)
            }
        },
        Err(e) => response_to_c_string(&e),
    }
}

/// Converts an [`AppResponse`] to a C-compatible string.
///
/// The caller owns the returned string and frees it with [`free_response`].
/// Returns a null pointer if serialization or C string creation fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust String.
///
/// # Returns
///
/// * `Ok(String)` - If conversion was successful
/// * `Err(*const c_char)` - A `BadRequest` response for a null pointer or invalid UTF-8
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
