//! Folder-name sanitizing and identifier generation.
//!
//! Trainee names arrive in Arabic, Latin script, or a mix of both, and end up
//! as directory names on Windows and Unix alike. Everything here is pure
//! except for the clock-derived suffix and the random ids.

use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use crate::config::DEFAULT_MAX_FOLDER_NAME_LEN;

/// Token used when a name sanitizes down to nothing.
pub const FALLBACK_FOLDER_NAME: &str = "client";

const ILLEGAL_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const SUFFIX_MODULUS: i64 = 1_000_000;

/// Sanitize `raw` with the default length bound.
pub fn sanitize_folder_name(raw: &str) -> String {
    sanitize_folder_name_with_limit(raw, DEFAULT_MAX_FOLDER_NAME_LEN)
}

/// Produce a filesystem-safe token from arbitrary display text.
///
/// Steps, in order: trim, drop characters illegal on common filesystems, drop
/// control characters, collapse whitespace runs into `_`, keep only the
/// allow-list (ASCII letters and digits, `_`, `-`, Arabic blocks), truncate to
/// `max_len` characters. An empty result becomes [`FALLBACK_FOLDER_NAME`].
///
/// The output is a fixed point: sanitizing it again returns it unchanged.
pub fn sanitize_folder_name_with_limit(raw: &str, max_len: usize) -> String {
    let mut collapsed = String::with_capacity(raw.len());
    let mut pending_space = false;

    let cleaned = raw
        .trim()
        .chars()
        // Tabs and newlines are control characters but still separate words.
        .filter(|c| !ILLEGAL_CHARS.contains(c) && (!c.is_control() || c.is_whitespace()));

    for c in cleaned {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            collapsed.push('_');
            pending_space = false;
        }
        collapsed.push(c);
    }

    let token: String = collapsed
        .chars()
        .filter(|c| is_allowed(*c))
        .take(max_len.max(1))
        .collect();

    if token.is_empty() {
        FALLBACK_FOLDER_NAME.to_string()
    } else {
        token
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || is_arabic(c)
}

fn is_arabic(c: char) -> bool {
    matches!(c,
        '\u{0600}'..='\u{06FF}'
        | '\u{0750}'..='\u{077F}'
        | '\u{08A0}'..='\u{08FF}'
        | '\u{FB50}'..='\u{FDFF}'
        | '\u{FE70}'..='\u{FEFF}')
}

/// New opaque record identifier.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Six-digit token derived from the current wall clock, in milliseconds.
pub fn time_suffix() -> u32 {
    Utc::now().timestamp_millis().rem_euclid(SUFFIX_MODULUS) as u32
}

/// `<first>_<last>_<suffix>` with both name parts sanitized.
pub fn client_folder_name(first_name: &str, last_name: &str, suffix: u32, max_len: usize) -> String {
    format!(
        "{}_{}_{:06}",
        sanitize_folder_name_with_limit(first_name, max_len),
        sanitize_folder_name_with_limit(last_name, max_len),
        suffix % SUFFIX_MODULUS as u32
    )
}

/// Folder path for a trainee under `base_dir`, using the current time suffix.
pub fn build_client_path(
    base_dir: &Path,
    first_name: &str,
    last_name: &str,
    max_len: usize,
) -> PathBuf {
    base_dir.join(client_folder_name(first_name, last_name, time_suffix(), max_len))
}

/// Like [`build_client_path`], but steps the suffix forward while `taken`
/// reports the candidate as already in use.
///
/// Gives up after a full cycle of suffixes and returns the last candidate;
/// callers creating the directory will then see the collision themselves.
pub fn unique_client_path<F>(
    base_dir: &Path,
    first_name: &str,
    last_name: &str,
    max_len: usize,
    taken: F,
) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    let start = time_suffix();
    let mut candidate = base_dir.join(client_folder_name(first_name, last_name, start, max_len));

    for step in 1..SUFFIX_MODULUS as u32 {
        if !taken(&candidate) {
            break;
        }
        let suffix = (start + step) % SUFFIX_MODULUS as u32;
        candidate = base_dir.join(client_folder_name(first_name, last_name, suffix, max_len));
    }

    candidate
}
