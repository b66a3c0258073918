//! Store configuration
//!
//! Hosts usually deserialize this from their own project file; every field
//! has a default so an empty table is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::ids::LanguageId;

/// Per-language symbol rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LanguageRules {
    /// Language name, for log output only
    pub name: String,
    /// Whether symbols compare case-sensitively
    pub case_sensitive: bool,
}

impl Default for LanguageRules {
    fn default() -> Self {
        Self {
            name: String::new(),
            case_sensitive: true,
        }
    }
}

/// Configuration for a symbol database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file (":memory:" keeps everything in memory)
    pub db_path: PathBuf,
    /// Rules keyed by language ID
    pub languages: BTreeMap<LanguageId, LanguageRules>,
    /// Case sensitivity for languages missing from `languages`
    pub default_case_sensitive: bool,
    /// How many links the resolver processes between cancellation checks
    pub cancel_check_interval: usize,
    /// Re-resolve every link after the database had to be rebuilt
    pub resolve_all_after_rebuild: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("codedb.sqlite"),
            languages: BTreeMap::new(),
            default_case_sensitive: true,
            cancel_check_interval: 1,
            resolve_all_after_rebuild: true,
        }
    }
}

impl StoreConfig {
    /// In-memory configuration, mostly for tests.
    pub fn in_memory() -> Self {
        Self {
            db_path: PathBuf::from(":memory:"),
            ..Self::default()
        }
    }

    pub fn with_language(mut self, id: LanguageId, name: &str, case_sensitive: bool) -> Self {
        self.languages.insert(
            id,
            LanguageRules {
                name: name.to_string(),
                case_sensitive,
            },
        );
        self
    }

    pub fn is_case_sensitive(&self, language: LanguageId) -> bool {
        self.languages
            .get(&language)
            .map(|rules| rules.case_sensitive)
            .unwrap_or(self.default_case_sensitive)
    }
}
