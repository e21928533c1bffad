//! Path algebra between visible virtual paths and `(owner, dataset, entry)` triples.
//!
//! Virtual paths follow `[owner[/dataset[/entry/path]]]`. Everything here is
//! pure string manipulation over `/`-separated names.

use crate::error::DwError;

/// Decomposition of a virtual path. Absent segments are always trailing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathTriple {
    pub owner: Option<String>,
    pub dataset_id: Option<String>,
    pub entry_path: Option<String>,
}

impl PathTriple {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn account(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            ..Self::default()
        }
    }

    pub fn dataset(owner: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            dataset_id: Some(dataset_id.into()),
            entry_path: None,
        }
    }

    pub fn entry(
        owner: impl Into<String>,
        dataset_id: impl Into<String>,
        entry_path: impl Into<String>,
    ) -> Self {
        Self {
            owner: Some(owner.into()),
            dataset_id: Some(dataset_id.into()),
            entry_path: Some(entry_path.into()),
        }
    }

    /// Backend path (`owner/dataset/entry`) without any mount prefix.
    pub fn backend_path(&self) -> String {
        join([
            self.owner.as_deref(),
            self.dataset_id.as_deref(),
            self.entry_path.as_deref(),
        ])
    }
}

/// Strips leading, trailing and repeated slashes.
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalizes and joins the present parts.
pub fn join<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    parts
        .into_iter()
        .flatten()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// `""` stays empty; any other path gains exactly one trailing slash.
pub fn directory_path(path: &str) -> String {
    let path = normalize(path);
    if path.is_empty() { path } else { format!("{path}/") }
}

/// Splits into `(directory_path(parent), name)`.
pub fn split_parent(path: &str) -> (String, String) {
    let path = normalize(path);
    match path.rsplit_once('/') {
        Some((parent, name)) => (directory_path(parent), name.to_string()),
        None => (String::new(), path),
    }
}

/// Removes `parent` plus one separator from the front of `path`.
///
/// Returns `None` unless `parent` is a whole-segment prefix of `path`.
/// Both inputs are expected to be normalized.
pub fn relative_to<'a>(path: &'a str, parent: &str) -> Option<&'a str> {
    if parent.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(parent)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

/// Decodes a visible path mounted under `prefix`.
pub fn decode(path: &str, prefix: &str) -> Result<PathTriple, DwError> {
    PathCodec::new(prefix, "").decode(path)
}

/// Encodes a triple with no mount prefix.
pub fn encode(owner: Option<&str>, dataset_id: Option<&str>, entry_path: Option<&str>) -> String {
    join([owner, dataset_id, entry_path])
}

/// Translates between visible paths and backend triples.
///
/// `prefix` is the mount point the host exposes the tree under and is
/// subtracted on decode. `root_dir` anchors the visible root at a backend
/// subtree (an account, for instance).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathCodec {
    prefix: String,
    root_dir: String,
}

impl PathCodec {
    pub fn new(prefix: &str, root_dir: &str) -> Self {
        Self {
            prefix: normalize(prefix),
            root_dir: normalize(root_dir),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn root_dir(&self) -> &str {
        &self.root_dir
    }

    pub fn decode(&self, path: &str) -> Result<PathTriple, DwError> {
        let path = normalize(path);
        let visible = relative_to(&path, &self.prefix)
            .ok_or_else(|| DwError::InvalidPath(format!("{path} is outside {}", self.prefix)))?;
        let backend = join([Some(self.root_dir.as_str()), Some(visible)]);
        Ok(split_backend_path(&backend))
    }

    pub fn encode(&self, triple: &PathTriple) -> Result<String, DwError> {
        let backend = triple.backend_path();
        let visible = relative_to(&backend, &self.root_dir).ok_or_else(|| {
            DwError::InvalidPath(format!("{backend} is outside {}", self.root_dir))
        })?;
        Ok(join([Some(self.prefix.as_str()), Some(visible)]))
    }
}

fn split_backend_path(backend: &str) -> PathTriple {
    let mut parts = backend.splitn(3, '/').filter(|part| !part.is_empty());
    PathTriple {
        owner: parts.next().map(str::to_string),
        dataset_id: parts.next().map(str::to_string),
        entry_path: parts.next().map(str::to_string),
    }
}
