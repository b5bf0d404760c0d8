//! Access control list
//!
//! Admins come from the persisted document and never change at runtime.
//! The whitelist is mutated by admin commands and the whole document is
//! rewritten after every mutation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur while loading or saving the access document
#[derive(Error, Debug)]
pub enum AccessListError {
    /// The document could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path of the document
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// The document is not valid JSON of the expected shape
    #[error("Failed to parse access document: {0}")]
    Parse(#[source] serde_json::Error),
    /// `login_key` is absent or empty
    #[error("No login key provided")]
    MissingLoginKey,
    /// The document could not be serialized
    #[error("Failed to serialize access document: {0}")]
    Serialize(#[source] serde_json::Error),
    /// The document could not be written
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Path of the document
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

#[derive(Deserialize)]
struct StoredDocument {
    #[serde(default)]
    login_key: Option<String>,
    #[serde(default)]
    admins: Option<Vec<String>>,
    #[serde(default)]
    whitelist: Option<Vec<String>>,
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    login_key: &'a str,
    admins: &'a [String],
    whitelist: &'a [String],
}

/// Case-insensitive identity comparison
#[must_use]
pub fn same_identity(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

fn contains_identity(list: &[String], identity: &str) -> bool {
    list.iter().any(|entry| same_identity(entry, identity))
}

/// Admins, whitelist and the login credential, backed by a JSON file
#[derive(Debug, Clone)]
pub struct AccessList {
    path: PathBuf,
    login_key: String,
    admins: Vec<String>,
    whitelist: Vec<String>,
}

impl AccessList {
    /// Build an access list bound to `path` without touching the file
    #[must_use]
    pub fn new(
        path: impl Into<PathBuf>,
        login_key: impl Into<String>,
        admins: Vec<String>,
        whitelist: Vec<String>,
    ) -> Self {
        Self {
            path: path.into(),
            login_key: login_key.into(),
            admins,
            whitelist: dedup_identities(whitelist),
        }
    }

    /// Load the access document at `path`.
    ///
    /// Missing `admins` / `whitelist` default to empty lists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// `login_key` is absent or empty.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AccessListError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| AccessListError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: StoredDocument = serde_json::from_slice(&raw).map_err(AccessListError::Parse)?;

        let login_key = doc
            .login_key
            .filter(|key| !key.is_empty())
            .ok_or(AccessListError::MissingLoginKey)?;

        let whitelist = doc.whitelist.unwrap_or_default();
        let before = whitelist.len();
        let list = Self::new(path, login_key, doc.admins.unwrap_or_default(), whitelist);
        if list.whitelist.len() != before {
            warn!(
                "Collapsed {} duplicate whitelist entries in {}",
                before - list.whitelist.len(),
                path.display()
            );
        }

        info!(
            "Loaded access list: {} admins, {} whitelisted",
            list.admins.len(),
            list.whitelist.len()
        );
        Ok(list)
    }

    /// Overwrite the backing file with the full document.
    ///
    /// The document is written to a sibling temp file and renamed over the
    /// target, so readers never observe a half-written file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails. The
    /// in-memory state is left as is.
    pub fn save(&self) -> Result<(), AccessListError> {
        let doc = DocumentRef {
            login_key: &self.login_key,
            admins: &self.admins,
            whitelist: &self.whitelist,
        };
        let json = serde_json::to_vec(&doc).map_err(AccessListError::Serialize)?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|source| AccessListError::Write {
            path: tmp_path.clone(),
            source,
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|source| {
            let _ = std::fs::remove_file(&tmp_path);
            AccessListError::Write {
                path: self.path.clone(),
                source,
            }
        })?;

        info!(path = %self.path.display(), whitelisted = self.whitelist.len(), "access list saved");
        Ok(())
    }

    /// Whether `identity` is an admin
    #[must_use]
    pub fn is_admin(&self, identity: &str) -> bool {
        contains_identity(&self.admins, identity)
    }

    /// Whether `identity` is whitelisted
    #[must_use]
    pub fn is_whitelisted(&self, identity: &str) -> bool {
        contains_identity(&self.whitelist, identity)
    }

    /// Add `identity` to the whitelist. Returns `false` if it was already there.
    pub fn add(&mut self, identity: &str) -> bool {
        if self.is_whitelisted(identity) {
            return false;
        }
        self.whitelist.push(identity.to_string());
        true
    }

    /// Remove every case-insensitive match of `identity`. Returns `false` if none existed.
    pub fn remove(&mut self, identity: &str) -> bool {
        let before = self.whitelist.len();
        self.whitelist.retain(|entry| !same_identity(entry, identity));
        self.whitelist.len() != before
    }

    /// Login credential for the chat transport
    #[must_use]
    pub fn login_key(&self) -> &str {
        &self.login_key
    }

    /// Configured admins
    #[must_use]
    pub fn admins(&self) -> &[String] {
        &self.admins
    }

    /// Current whitelist, in insertion order
    #[must_use]
    pub fn whitelist(&self) -> &[String] {
        &self.whitelist
    }

    /// Path of the backing document
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn dedup_identities(list: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(list.len());
    for identity in list {
        if !contains_identity(&unique, &identity) {
            unique.push(identity);
        }
    }
    unique
}
