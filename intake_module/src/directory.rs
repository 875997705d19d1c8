//! Static lookup tables: chat display names, the pricing officer, and brand
//! tokens.
//!
//! Loaded once from TOML at startup and shared read-only afterwards.
//!
//! ```toml
//! pricing_officer = "估價"
//! brand_tokens = ["Toyota", "Mazda"]
//!
//! [display_names]
//! "Chiang 蔣" = "阿蔣"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::source_tag::{SourceTagClassifier, DEFAULT_BRAND_TOKENS};

/// Canonical name for anyone not in the directory.
pub const UNKNOWN_ACTOR: &str = "unknown";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryFile {
    #[serde(default)]
    pub pricing_officer: Option<String>,
    #[serde(default)]
    pub brand_tokens: Option<Vec<String>>,
    #[serde(default)]
    pub display_names: HashMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("failed to read directory file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse directory file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Immutable lookup tables handed to the resolver and classifier.
#[derive(Debug, Clone)]
pub struct Directory {
    display_names: HashMap<String, String>,
    pricing_officer: Option<String>,
    brand_tokens: Vec<String>,
}

impl Default for Directory {
    fn default() -> Self {
        Self::from_file(DirectoryFile::default())
    }
}

impl Directory {
    pub fn from_file(file: DirectoryFile) -> Self {
        let mut display_names = HashMap::new();
        for (raw, canonical) in file.display_names {
            let key = raw.trim().to_string();
            let canonical = canonical.trim().to_string();
            if key.is_empty() || canonical.is_empty() {
                warn!("directory ignoring blank display name mapping");
                continue;
            }
            display_names.insert(key, canonical);
        }

        let brand_tokens = file.brand_tokens.unwrap_or_else(|| {
            DEFAULT_BRAND_TOKENS
                .iter()
                .map(|token| token.to_string())
                .collect()
        });

        Self {
            display_names,
            pricing_officer: file
                .pricing_officer
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
            brand_tokens,
        }
    }

    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let content = std::fs::read_to_string(path).map_err(|source| DirectoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| DirectoryError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let file: DirectoryFile = toml::from_str(content)?;
        Ok(Self::from_file(file))
    }

    pub fn with_display_name(mut self, raw: &str, canonical: &str) -> Self {
        self.display_names
            .insert(raw.trim().to_string(), canonical.trim().to_string());
        self
    }

    pub fn with_pricing_officer(mut self, canonical: &str) -> Self {
        self.pricing_officer = Some(canonical.to_string());
        self
    }

    pub fn pricing_officer(&self) -> Option<&str> {
        self.pricing_officer.as_deref()
    }

    pub fn known_names(&self) -> usize {
        self.display_names.len()
    }

    pub fn resolver(&self) -> DisplayNameResolver {
        DisplayNameResolver {
            names: self.display_names.clone(),
        }
    }

    pub fn classifier(&self) -> SourceTagClassifier {
        SourceTagClassifier::new(&self.brand_tokens)
    }
}

/// Maps a chat display name to the team's short name for it.
#[derive(Debug, Clone, Default)]
pub struct DisplayNameResolver {
    names: HashMap<String, String>,
}

impl DisplayNameResolver {
    /// Total lookup: unmapped names come back as [`UNKNOWN_ACTOR`].
    pub fn resolve(&self, raw_name: &str) -> String {
        self.names
            .get(raw_name.trim())
            .cloned()
            .unwrap_or_else(|| UNKNOWN_ACTOR.to_string())
    }
}
