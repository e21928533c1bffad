pub mod api;
pub mod config;
pub mod contents;
pub mod mapper;

pub use api::DatasetApi;
pub use config::ContentsConfig;
pub use contents::{ContentsManager, DwContents, GetOptions};
pub use mapper::{Mapper, Model, ModelContent, ModelKind};
