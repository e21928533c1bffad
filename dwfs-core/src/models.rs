use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
    #[serde(other)]
    Unknown,
}

impl AccessLevel {
    pub fn is_writable(self) -> bool {
        matches!(self, AccessLevel::Write | AccessLevel::Admin)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum SyncStatus {
    #[serde(rename = "NEW")]
    New,
    #[serde(rename = "INPROGRESS", alias = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "READY", alias = "OK")]
    Ready,
    #[serde(rename = "ERROR")]
    Error,
    /// Any status the API adds later, `SYSTEMERROR` for instance.
    #[serde(other)]
    Unknown,
}

impl SyncStatus {
    /// Only `NEW` and `INPROGRESS` mean the entry is still being ingested.
    pub fn is_terminal(self) -> bool {
        !matches!(self, SyncStatus::New | SyncStatus::InProgress)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EntrySource {
    #[serde(default)]
    pub sync_status: Option<SyncStatus>,
}

/// One object in a dataset's flat namespace.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub name: String,
    #[serde(default)]
    pub size_in_bytes: Option<u64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated: Option<OffsetDateTime>,
    #[serde(default)]
    pub source: Option<EntrySource>,
}

impl RemoteEntry {
    pub fn sync_status(&self) -> Option<SyncStatus> {
        self.source.as_ref().and_then(|source| source.sync_status)
    }

    /// Metadata has landed: size is known or ingestion reached a terminal state.
    pub fn is_ready(&self) -> bool {
        self.size_in_bytes.is_some() || self.sync_status().is_some_and(SyncStatus::is_terminal)
    }

    /// Entries without both timestamps stay out of listings.
    pub fn timestamps(&self) -> Option<(OffsetDateTime, OffsetDateTime)> {
        Some((self.created?, self.updated?))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub owner: String,
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub access_level: Option<AccessLevel>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated: Option<OffsetDateTime>,
    #[serde(default)]
    pub files: Vec<RemoteEntry>,
}

impl Dataset {
    pub fn is_ready(&self) -> bool {
        self.files.iter().all(RemoteEntry::is_ready)
    }

    pub fn is_writable(&self) -> bool {
        self.access_level.is_some_and(AccessLevel::is_writable)
    }

    pub fn entry(&self, name: &str) -> Option<&RemoteEntry> {
        self.files.iter().find(|entry| entry.name == name)
    }
}

/// Record shape of the `/user/datasets/{scope}` listings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub owner: String,
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub access_level: Option<AccessLevel>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated: Option<OffsetDateTime>,
}

impl DatasetSummary {
    pub fn is_writable(&self) -> bool {
        self.access_level.is_some_and(AccessLevel::is_writable)
    }
}

impl From<&Dataset> for DatasetSummary {
    fn from(dataset: &Dataset) -> Self {
        Self {
            owner: dataset.owner.clone(),
            id: dataset.id.clone(),
            title: dataset.title.clone(),
            access_level: dataset.access_level,
            created: dataset.created,
            updated: dataset.updated,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub records: Vec<T>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_readiness_follows_size_or_terminal_status() {
        let entry: RemoteEntry = serde_json::from_value(json!({
            "name": "a.csv",
            "source": { "syncStatus": "NEW" }
        }))
        .unwrap();
        assert!(!entry.is_ready());

        let entry: RemoteEntry = serde_json::from_value(json!({
            "name": "a.csv",
            "source": { "syncStatus": "IN_PROGRESS" }
        }))
        .unwrap();
        assert!(!entry.is_ready());

        let entry: RemoteEntry = serde_json::from_value(json!({
            "name": "a.csv",
            "source": { "syncStatus": "ERROR" }
        }))
        .unwrap();
        assert!(entry.is_ready());

        let entry: RemoteEntry = serde_json::from_value(json!({
            "name": "a.csv",
            "sizeInBytes": 3
        }))
        .unwrap();
        assert!(entry.is_ready());
        assert!(entry.timestamps().is_none());
    }

    #[test]
    fn unlisted_sync_status_still_decodes_as_terminal() {
        let dataset: Dataset = serde_json::from_value(json!({
            "owner": "jo",
            "id": "cars",
            "files": [
                { "name": "broken.csv", "source": { "syncStatus": "SYSTEMERROR" } },
                { "name": "ok.csv", "source": { "syncStatus": "OK" } }
            ]
        }))
        .unwrap();

        assert_eq!(dataset.files[0].sync_status(), Some(SyncStatus::Unknown));
        assert_eq!(dataset.files[1].sync_status(), Some(SyncStatus::Ready));
        assert!(dataset.is_ready());
    }

    #[test]
    fn dataset_parses_access_level_and_files() {
        let dataset: Dataset = serde_json::from_value(json!({
            "owner": "jo",
            "id": "cars",
            "accessLevel": "ADMIN",
            "created": "2018-01-01T00:00:00.000Z",
            "updated": "2018-01-02T00:00:00.000Z",
            "files": [
                {
                    "name": "a.csv",
                    "sizeInBytes": 1,
                    "created": "2018-01-01T00:00:00.000Z",
                    "updated": "2018-01-01T00:00:00.000Z"
                },
                { "name": "b.csv" }
            ]
        }))
        .unwrap();

        assert!(dataset.is_writable());
        assert!(!dataset.is_ready());
        assert!(dataset.entry("a.csv").is_some());

        let dataset: Dataset = serde_json::from_value(json!({
            "owner": "jo",
            "id": "cars",
            "accessLevel": "SOMETHING_NEW"
        }))
        .unwrap();
        assert_eq!(dataset.access_level, Some(AccessLevel::Unknown));
        assert!(!dataset.is_writable());
        assert!(dataset.is_ready());
    }
}
