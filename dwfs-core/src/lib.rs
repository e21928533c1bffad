pub mod cache;
mod client;
mod error;
pub mod models;
pub mod paths;
pub mod retry;
pub mod transport;
pub mod tree;

pub use client::{DEFAULT_BASE_URL, DEFAULT_POLL_TRIES, DwClient, decode_content, merge_scopes};
pub use error::{ApiErrorClass, DwError};
pub use models::{AccessLevel, Dataset, DatasetSummary, RemoteEntry, SyncStatus, User};
pub use paths::{PathCodec, PathTriple};
pub use retry::RetryPolicy;
pub use tree::{Content, ContentFormat, ContentLoader, DatasetTree, NodeKind, VirtualNode};
