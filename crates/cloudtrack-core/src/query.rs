//! Metadata queries: which records a watch observes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::MetadataRecord;

/// Logical search domain of the remote index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// Application data outside the user-visible documents folder.
    Data,
    /// The user-visible documents folder.
    Documents,
}

/// Path filter applied to records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathPredicate {
    /// Every record under a directory (directory listing).
    Prefix(String),
    /// A single record (single-file tracking).
    Exact(String),
}

impl PathPredicate {
    /// Match everything below `dir`.
    pub fn under(dir: &Path) -> Self {
        let mut prefix = path_string(dir);
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self::Prefix(prefix)
    }

    /// Match exactly `path`.
    pub fn exact(path: &Path) -> Self {
        Self::Exact(path_string(path))
    }

    pub fn matches(&self, record_path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => record_path.starts_with(prefix.as_str()),
            Self::Exact(path) => record_path == path,
        }
    }
}

/// A predicate scoped to one or more search domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataQuery {
    pub predicate: PathPredicate,
    pub scopes: Vec<SearchScope>,
}

impl MetadataQuery {
    pub fn new(predicate: PathPredicate, scopes: Vec<SearchScope>) -> Self {
        Self { predicate, scopes }
    }

    pub fn in_scope(&self, scope: SearchScope) -> bool {
        self.scopes.contains(&scope)
    }

    pub fn matches(&self, record: &MetadataRecord) -> bool {
        self.predicate.matches(&record.path)
    }
}

/// Render a path with `/` separators, the form used by record paths.
pub fn path_string(path: &Path) -> String {
    let rendered = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        rendered.into_owned()
    } else {
        rendered.replace(std::path::MAIN_SEPARATOR, "/")
    }
}
