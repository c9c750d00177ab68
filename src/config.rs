//! Store configuration.
//!
//! By default the store lives under the platform data directory:
//! ```text
//! ~/.local/share/autoschool/Clients/Clients.json        (Linux)
//! ~/Library/Application Support/autoschool/Clients/...  (macOS)
//! %APPDATA%\autoschool\Clients\...                      (Windows)
//! ```
//! Each trainee folder is a sibling of `Clients.json` inside that directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATA_FILE: &str = "Clients.json";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_FOLDER_NAME_LEN: usize = 50;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the JSON document and every trainee folder.
    pub base_dir: PathBuf,
    pub data_file_name: String,
    /// How long a read snapshot stays valid between mutations.
    pub cache_ttl: Duration,
    /// Upper bound, in characters, for each sanitized name token.
    pub max_folder_name_len: usize,
}

impl StoreConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            data_file_name: DEFAULT_DATA_FILE.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            max_folder_name_len: DEFAULT_MAX_FOLDER_NAME_LEN,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_data_file_name(mut self, name: impl Into<String>) -> Self {
        self.data_file_name = name.into();
        self
    }

    pub fn data_file(&self) -> PathBuf {
        self.base_dir.join(&self.data_file_name)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(app_data_dir().join("Clients"))
    }
}

/// Resolve the application data directory with fallback chain:
///
/// 1. `dirs::data_dir()`
/// 2. `dirs::home_dir() / .local/share`
/// 3. `.`
fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        })
        .join("autoschool")
}
