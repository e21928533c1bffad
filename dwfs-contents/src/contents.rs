//! Hierarchical contents operations over the flat dataset API.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use dwfs_core::paths::{directory_path, join, normalize};
use dwfs_core::{
    Content, ContentFormat, ContentLoader, Dataset, DwError, PathCodec, PathTriple,
};
use tracing::{debug, warn};

use crate::api::DatasetApi;
use crate::mapper::{Mapper, Model, ModelKind};

/// Empty entry uploaded to make a directory exist in compatibility mode.
pub const DIRECTORY_PLACEHOLDER: &str = "dummy";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub content: bool,
    pub kind: Option<ModelKind>,
    pub format: Option<ContentFormat>,
}

impl GetOptions {
    pub fn with_content() -> Self {
        Self {
            content: true,
            ..Self::default()
        }
    }

    pub fn metadata() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: ModelKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn format(mut self, format: ContentFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// Operations a hosting framework calls on a contents backend.
#[allow(async_fn_in_trait)]
pub trait ContentsManager {
    async fn dir_exists(&self, path: &str) -> Result<bool, DwError>;

    async fn file_exists(&self, path: &str) -> Result<bool, DwError>;

    async fn exists(&self, path: &str) -> Result<bool, DwError> {
        Ok(self.file_exists(path).await? || self.dir_exists(path).await?)
    }

    async fn get(&self, path: &str, options: GetOptions) -> Result<Model, DwError>;

    async fn save(&self, model: Model, path: &str) -> Result<Model, DwError>;

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<(), DwError>;

    async fn delete(&self, path: &str) -> Result<(), DwError>;

    fn is_hidden(&self, _path: &str) -> bool {
        false
    }
}

/// Downloads one entry when its content is finally requested.
pub struct FileLoader<'a, A> {
    api: &'a A,
    owner: &'a str,
    dataset_id: &'a str,
    entry_path: &'a str,
}

impl<A: DatasetApi> ContentLoader for FileLoader<'_, A> {
    async fn load(&self, format: ContentFormat) -> Result<Content, DwError> {
        self.api
            .get_file(self.owner, self.dataset_id, self.entry_path, Some(format))
            .await
    }
}

pub struct DwContents<A> {
    api: A,
    codec: PathCodec,
    mapper: Mapper,
    compatibility_mode: bool,
}

impl<A: DatasetApi> DwContents<A> {
    pub fn new(api: A, codec: PathCodec) -> Self {
        Self {
            api,
            mapper: Mapper::new(codec.clone()),
            codec,
            compatibility_mode: false,
        }
    }

    /// Emulates directory creation and directory renames for hosts that
    /// expect them, using a placeholder entry and per-file moves.
    pub fn with_compatibility_mode(mut self, enabled: bool) -> Self {
        self.compatibility_mode = enabled;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    async fn guess_kind(&self, path: &str) -> Result<ModelKind, DwError> {
        if path.ends_with(".ipynb") {
            Ok(ModelKind::Notebook)
        } else if self.dir_exists(path).await? {
            Ok(ModelKind::Directory)
        } else {
            Ok(ModelKind::File)
        }
    }

    async fn dataset(&self, owner: &str, dataset_id: &str) -> Result<Dataset, DwError> {
        self.api
            .get_dataset(owner, dataset_id)
            .await?
            .ok_or_else(|| DwError::NotFound(format!("{owner}/{dataset_id}")))
    }

    /// Uploads one entry; an upload whose dataset is still ingesting degrades
    /// to the last snapshot.
    async fn upload(
        &self,
        path: &str,
        owner: &str,
        dataset_id: &str,
        entry_path: &str,
        data: Vec<u8>,
    ) -> Result<Dataset, DwError> {
        match self
            .api
            .upload_file(owner, dataset_id, entry_path, data)
            .await
        {
            Ok(dataset) => Ok(dataset),
            Err(DwError::NotYetReady {
                attempts, snapshot, ..
            }) => {
                warn!(path, attempts, "upload accepted but dataset still ingesting");
                Ok(*snapshot)
            }
            Err(err) => Err(err),
        }
    }

    async fn create_directory(
        &self,
        path: &str,
        owner: &str,
        dataset_id: &str,
        dir_path: &str,
    ) -> Result<Model, DwError> {
        if self.file_exists(path).await? {
            return Err(DwError::InvalidPath(format!("{path} is not a directory")));
        }
        let placeholder = join([Some(dir_path), Some(DIRECTORY_PLACEHOLDER)]);
        debug!(path, placeholder = %placeholder, "creating directory placeholder");
        let dataset = self
            .upload(path, owner, dataset_id, &placeholder, Vec::new())
            .await?;
        self.mapper.map_subdir(&dataset, dir_path, false)
    }

    async fn move_file(&self, old_path: &str, new_path: &str) -> Result<(), DwError> {
        let old = self.get(old_path, GetOptions::with_content()).await?;
        self.save(old, new_path).await?;
        self.delete(old_path).await
    }

    /// Moves every entry under a subdirectory, one file at a time.
    async fn rename_directory(&self, old_path: &str, new_path: &str) -> Result<(), DwError> {
        let old = self.codec.decode(old_path)?;
        let (Some(owner), Some(dataset_id), Some(dir_path)) =
            (&old.owner, &old.dataset_id, &old.entry_path)
        else {
            return Err(DwError::Unsupported(
                "only subdirectories of datasets can be renamed".into(),
            ));
        };
        if self.codec.decode(new_path)?.entry_path.is_none() {
            return Err(DwError::InvalidPath(format!(
                "{new_path}: directories can only be moved within datasets"
            )));
        }

        let prefix = directory_path(dir_path);
        let moved: Vec<String> = self
            .dataset(owner, dataset_id)
            .await?
            .files
            .iter()
            .filter_map(|entry| entry.name.strip_prefix(prefix.as_str()))
            .filter(|rel| !rel.is_empty())
            .map(str::to_string)
            .collect();
        debug!(old_path, new_path, entries = moved.len(), "renaming directory");
        for rel in &moved {
            let from = join([Some(old_path), Some(rel.as_str())]);
            let to = join([Some(new_path), Some(rel.as_str())]);
            self.move_file(&from, &to).await?;
        }
        Ok(())
    }

    async fn get_directory(
        &self,
        path: &str,
        triple: &PathTriple,
        include_content: bool,
    ) -> Result<Model, DwError> {
        if !self.dir_exists(path).await? {
            return Err(DwError::NotFound(format!("directory not found ({path})")));
        }
        match (&triple.owner, &triple.dataset_id, &triple.entry_path) {
            (None, _, _) => {
                let me = self.api.get_me().await?;
                let datasets = self.api.get_datasets().await?;
                self.mapper.map_root(&me, &datasets, include_content)
            }
            (Some(owner), None, _) => {
                let datasets: Vec<_> = self
                    .api
                    .get_datasets()
                    .await?
                    .into_iter()
                    .filter(|dataset| &dataset.owner == owner)
                    .collect();
                self.mapper.map_account(owner, &datasets, include_content)
            }
            (Some(owner), Some(dataset_id), None) => {
                let dataset = self.dataset(owner, dataset_id).await?;
                self.mapper.map_dataset(&dataset, include_content)
            }
            (Some(owner), Some(dataset_id), Some(dir_path)) => {
                let dataset = self.dataset(owner, dataset_id).await?;
                self.mapper.map_subdir(&dataset, dir_path, include_content)
            }
        }
    }

    async fn get_file(
        &self,
        path: &str,
        triple: &PathTriple,
        options: GetOptions,
    ) -> Result<Model, DwError> {
        let (Some(owner), Some(dataset_id), Some(entry_path)) =
            (&triple.owner, &triple.dataset_id, &triple.entry_path)
        else {
            return Err(DwError::NotFound(format!(
                "not a valid file path ({path}); files only exist within datasets"
            )));
        };
        if !self.file_exists(path).await? {
            return Err(DwError::NotFound(format!("file not found ({path})")));
        }

        let dataset = self.dataset(owner, dataset_id).await?;
        let Some(leaf) = self.mapper.tree(&dataset)?.leaf(entry_path) else {
            return Err(DwError::NotYetReady {
                owner: owner.clone(),
                dataset_id: dataset_id.clone(),
                attempts: 0,
                snapshot: Box::new(dataset),
            });
        };
        let kind = options.kind.and_then(ModelKind::node_kind);
        let mut leaf = leaf.with_overrides(kind, options.format);
        if options.content {
            let loader = FileLoader {
                api: &self.api,
                owner,
                dataset_id,
                entry_path,
            };
            leaf.load_content(&loader).await?;
        }
        Ok(self.mapper.map_leaf(&leaf, dataset.is_writable()))
    }
}

impl<A: DatasetApi> ContentsManager for DwContents<A> {
    async fn dir_exists(&self, path: &str) -> Result<bool, DwError> {
        debug!(path, "dir_exists");
        let triple = self.codec.decode(path)?;
        match (&triple.owner, &triple.dataset_id, &triple.entry_path) {
            (None, _, _) => Ok(true),
            (Some(owner), None, _) => Ok(self.api.get_user(owner).await?.is_some()),
            (Some(owner), Some(dataset_id), entry_path) => {
                let Some(dataset) = self.api.get_dataset(owner, dataset_id).await? else {
                    return Ok(false);
                };
                Ok(match entry_path {
                    None => true,
                    Some(dir_path) => {
                        let prefix = directory_path(dir_path);
                        dataset.files.iter().any(|f| f.name.starts_with(&prefix))
                    }
                })
            }
        }
    }

    async fn file_exists(&self, path: &str) -> Result<bool, DwError> {
        debug!(path, "file_exists");
        let triple = self.codec.decode(path)?;
        let (Some(owner), Some(dataset_id), Some(entry_path)) =
            (&triple.owner, &triple.dataset_id, &triple.entry_path)
        else {
            return Ok(false);
        };
        Ok(self
            .api
            .get_dataset(owner, dataset_id)
            .await?
            .is_some_and(|dataset| dataset.entry(&normalize(entry_path)).is_some()))
    }

    async fn get(&self, path: &str, options: GetOptions) -> Result<Model, DwError> {
        debug!(
            path,
            content = options.content,
            kind = ?options.kind,
            format = ?options.format,
            "get"
        );
        let triple = self.codec.decode(path)?;
        let kind = match options.kind {
            Some(kind) => kind,
            None => self.guess_kind(path).await?,
        };
        match kind {
            ModelKind::Directory => self.get_directory(path, &triple, options.content).await,
            kind => {
                let options = GetOptions {
                    kind: Some(kind),
                    ..options
                };
                self.get_file(path, &triple, options).await
            }
        }
    }

    async fn save(&self, model: Model, path: &str) -> Result<Model, DwError> {
        debug!(path, kind = ?model.kind, "save");
        let triple = self.codec.decode(path)?;

        if model.kind == ModelKind::Directory {
            if let (true, Some(owner), Some(dataset_id), Some(dir_path)) = (
                self.compatibility_mode,
                &triple.owner,
                &triple.dataset_id,
                &triple.entry_path,
            ) {
                return self.create_directory(path, owner, dataset_id, dir_path).await;
            }
            let reason = match (&triple.dataset_id, &triple.entry_path) {
                (Some(_), Some(_)) => "only files can be created within datasets",
                (Some(_), None) => "datasets are created and managed on data.world",
                (None, _) => "accounts are created and managed on data.world",
            };
            return Err(DwError::Unsupported(format!(
                "unable to create directory ({path}): {reason}"
            )));
        }

        if self.dir_exists(path).await? {
            return Err(DwError::InvalidPath(format!("{path} is not a file")));
        }
        let (Some(owner), Some(dataset_id), Some(entry_path)) =
            (&triple.owner, &triple.dataset_id, &triple.entry_path)
        else {
            return Err(DwError::InvalidPath(format!(
                "{path}: files can only be created within datasets"
            )));
        };

        let data = encode_model_content(&model)?;
        let dataset = self
            .upload(path, owner, dataset_id, entry_path, data)
            .await?;

        let node_kind = model.kind.node_kind();
        match self.mapper.tree(&dataset)?.leaf(entry_path) {
            Some(leaf) => {
                let leaf = leaf.with_overrides(node_kind, model.format);
                Ok(self.mapper.map_leaf(&leaf, dataset.is_writable()))
            }
            None => self.mapper.map_pending_file(&dataset, entry_path, model.kind),
        }
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<(), DwError> {
        debug!(old_path, new_path, "rename");
        if normalize(old_path) == self.codec.prefix() {
            return Err(DwError::InvalidPath("cannot rename root".into()));
        }
        if self.exists(new_path).await? {
            return Err(DwError::Conflict(format!("file already exists ({new_path})")));
        }
        if self.dir_exists(old_path).await? {
            if self.compatibility_mode {
                return self.rename_directory(old_path, new_path).await;
            }
            return Err(DwError::Unsupported("only files can be renamed".into()));
        }
        if self.codec.decode(new_path)?.entry_path.is_none() {
            return Err(DwError::InvalidPath(format!(
                "{new_path}: files can only be created within datasets"
            )));
        }

        self.move_file(old_path, new_path).await
    }

    async fn delete(&self, path: &str) -> Result<(), DwError> {
        debug!(path, "delete");
        if !self.exists(path).await? {
            return Err(DwError::NotFound(format!("not found ({path})")));
        }

        let triple = self.codec.decode(path)?;
        match (&triple.owner, &triple.dataset_id, &triple.entry_path) {
            (Some(owner), Some(dataset_id), None) => {
                self.api.delete_dataset(owner, dataset_id).await
            }
            (Some(owner), Some(dataset_id), Some(entry_path)) => {
                if self.dir_exists(path).await? {
                    self.api
                        .delete_subdirectory(owner, dataset_id, entry_path)
                        .await
                } else {
                    self.api.delete_file(owner, dataset_id, entry_path).await
                }
            }
            _ => Err(DwError::Unsupported(format!(
                "unable to delete ({path}): accounts can only be deleted on data.world"
            ))),
        }
    }
}

/// Raw bytes to upload for a file or notebook model.
pub fn encode_model_content(model: &Model) -> Result<Vec<u8>, DwError> {
    let content = model
        .file_content()
        .ok_or_else(|| DwError::BadFormat(format!("no content to save for {}", model.path)))?;
    match (model.kind, content) {
        (ModelKind::Notebook, Content::Json(value)) => {
            serde_json::to_vec(value).map_err(|err| DwError::BadFormat(err.to_string()))
        }
        (ModelKind::Notebook, _) => Err(DwError::BadFormat("notebook content must be JSON".into())),
        (_, Content::Base64(encoded)) => STANDARD
            .decode(encoded.as_bytes())
            .map_err(|err| DwError::BadFormat(err.to_string())),
        (_, Content::Text(text)) => Ok(text.as_bytes().to_vec()),
        (_, Content::Json(value)) => {
            serde_json::to_vec(value).map_err(|err| DwError::BadFormat(err.to_string()))
        }
    }
}
