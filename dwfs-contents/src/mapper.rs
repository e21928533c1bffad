use std::collections::BTreeMap;

use dwfs_core::tree::{Directory, Leaf};
use dwfs_core::{
    Content, ContentFormat, Dataset, DatasetSummary, DatasetTree, DwError, NodeKind, PathCodec,
    PathTriple, User, VirtualNode,
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Directory,
    File,
    Notebook,
}

impl ModelKind {
    pub fn node_kind(self) -> Option<NodeKind> {
        match self {
            ModelKind::Directory => None,
            ModelKind::File => Some(NodeKind::File),
            ModelKind::Notebook => Some(NodeKind::Notebook),
        }
    }
}

impl From<NodeKind> for ModelKind {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::File => ModelKind::File,
            NodeKind::Notebook => ModelKind::Notebook,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModelContent {
    Directory(Vec<Model>),
    File(Content),
}

/// Contents model handed to the hosting framework.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Model {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: ModelKind,
    pub writable: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_modified: Option<OffsetDateTime>,
    pub content: Option<ModelContent>,
    pub format: Option<ContentFormat>,
    pub mimetype: Option<String>,
}

impl Model {
    fn directory(name: impl Into<String>, path: String, writable: bool) -> Self {
        Self {
            name: name.into(),
            path,
            kind: ModelKind::Directory,
            writable,
            created: None,
            last_modified: None,
            content: None,
            format: None,
            mimetype: None,
        }
    }

    fn with_listing(mut self, children: Vec<Model>, include_content: bool) -> Self {
        if include_content {
            self.content = Some(ModelContent::Directory(children));
            self.format = Some(ContentFormat::Json);
        }
        self
    }

    /// File payload for a save, if one was provided.
    pub fn file_content(&self) -> Option<&Content> {
        match &self.content {
            Some(ModelContent::File(content)) => Some(content),
            _ => None,
        }
    }

    pub fn children(&self) -> Option<&[Model]> {
        match &self.content {
            Some(ModelContent::Directory(children)) => Some(children),
            _ => None,
        }
    }
}

/// Turns API records and synthesized nodes into contents models.
#[derive(Debug, Clone)]
pub struct Mapper {
    codec: PathCodec,
}

impl Mapper {
    pub fn new(codec: PathCodec) -> Self {
        Self { codec }
    }

    pub fn map_root(
        &self,
        me: &User,
        datasets: &[DatasetSummary],
        include_content: bool,
    ) -> Result<Model, DwError> {
        debug!(me = %me.id, datasets = datasets.len(), include_content, "map_root");
        let mut root = Model::directory("", self.codec.encode(&PathTriple::root())?, false);
        root.created = me.created;
        root.last_modified = me.updated;

        let accounts = self.map_accounts(datasets)?;
        if !accounts.is_empty() {
            let (created, updated) = reduce_dates(&accounts);
            root.created = created;
            root.last_modified = updated;
        }
        Ok(root.with_listing(accounts, include_content))
    }

    pub fn map_accounts(&self, datasets: &[DatasetSummary]) -> Result<Vec<Model>, DwError> {
        let mut by_owner: BTreeMap<&str, Vec<DatasetSummary>> = BTreeMap::new();
        for dataset in datasets {
            by_owner
                .entry(dataset.owner.as_str())
                .or_default()
                .push(dataset.clone());
        }
        by_owner
            .into_iter()
            .map(|(owner, datasets)| self.map_account(owner, &datasets, false))
            .collect()
    }

    pub fn map_account(
        &self,
        account: &str,
        datasets: &[DatasetSummary],
        include_content: bool,
    ) -> Result<Model, DwError> {
        debug!(account, datasets = datasets.len(), include_content, "map_account");
        let children = datasets
            .iter()
            .map(|dataset| self.map_dataset_summary(dataset))
            .collect::<Result<Vec<_>, _>>()?;
        let mut model = Model::directory(
            account,
            self.codec.encode(&PathTriple::account(account))?,
            false,
        );
        let (created, updated) = reduce_dates(&children);
        model.created = created;
        model.last_modified = updated;
        Ok(model.with_listing(children, include_content))
    }

    pub fn map_dataset_summary(&self, dataset: &DatasetSummary) -> Result<Model, DwError> {
        let mut model = Model::directory(
            dataset.id.as_str(),
            self.codec
                .encode(&PathTriple::dataset(&dataset.owner, &dataset.id))?,
            dataset.is_writable(),
        );
        model.created = dataset.created;
        model.last_modified = dataset.updated;
        Ok(model)
    }

    pub fn map_dataset(&self, dataset: &Dataset, include_content: bool) -> Result<Model, DwError> {
        debug!(dataset = %dataset.id, include_content, "map_dataset");
        let model = self.map_dataset_summary(&DatasetSummary::from(dataset))?;
        let children = if include_content {
            self.map_nodes(dataset, "")?
        } else {
            Vec::new()
        };
        Ok(model.with_listing(children, include_content))
    }

    /// Model for `dir_path` inside `dataset`; dates aggregate its descendants.
    pub fn map_subdir(
        &self,
        dataset: &Dataset,
        dir_path: &str,
        include_content: bool,
    ) -> Result<Model, DwError> {
        debug!(dataset = %dataset.id, dir_path, include_content, "map_subdir");
        let tree = self.tree(dataset)?;
        let model = match tree.directory(dir_path, false) {
            Some(dir) => self.directory_model(&dir, dataset.is_writable()),
            None => {
                // Only ingesting entries live here; fall back to dataset dates.
                let (_, name) = dwfs_core::paths::split_parent(dir_path);
                let path = self.codec.encode(&PathTriple::entry(
                    &dataset.owner,
                    &dataset.id,
                    dir_path,
                ))?;
                let mut model = Model::directory(name, path, dataset.is_writable());
                model.created = dataset.created;
                model.last_modified = dataset.updated;
                model
            }
        };
        let children = if include_content {
            self.map_nodes(dataset, dir_path)?
        } else {
            Vec::new()
        };
        Ok(model.with_listing(children, include_content))
    }

    /// Leaf model; format and mimetype are reported only alongside content.
    pub fn map_leaf(&self, leaf: &Leaf, writable: bool) -> Model {
        let loaded = leaf.content.clone();
        Model {
            name: leaf.name.clone(),
            path: leaf.path.clone(),
            kind: leaf.kind.into(),
            writable,
            created: Some(leaf.created),
            last_modified: Some(leaf.updated),
            format: loaded.as_ref().map(|_| leaf.format),
            mimetype: loaded
                .as_ref()
                .and(leaf.mimetype)
                .map(str::to_string),
            content: loaded.map(ModelContent::File),
        }
    }

    /// Model for an uploaded entry whose metadata has not landed yet.
    pub fn map_pending_file(
        &self,
        dataset: &Dataset,
        entry_path: &str,
        kind: ModelKind,
    ) -> Result<Model, DwError> {
        let (_, name) = dwfs_core::paths::split_parent(entry_path);
        Ok(Model {
            name,
            path: self.codec.encode(&PathTriple::entry(
                &dataset.owner,
                &dataset.id,
                entry_path,
            ))?,
            kind,
            writable: dataset.is_writable(),
            created: None,
            last_modified: None,
            content: None,
            format: None,
            mimetype: None,
        })
    }

    pub fn tree(&self, dataset: &Dataset) -> Result<DatasetTree, DwError> {
        let base = self
            .codec
            .encode(&PathTriple::dataset(&dataset.owner, &dataset.id))?;
        Ok(DatasetTree::new(&dataset.files, &base))
    }

    fn map_nodes(&self, dataset: &Dataset, subtree: &str) -> Result<Vec<Model>, DwError> {
        let writable = dataset.is_writable();
        Ok(self
            .tree(dataset)?
            .list(subtree)
            .iter()
            .map(|node| match node {
                VirtualNode::Directory(dir) => self.directory_model(dir, writable),
                VirtualNode::Leaf(leaf) => self.map_leaf(leaf, writable),
            })
            .collect())
    }

    fn directory_model(&self, dir: &Directory, writable: bool) -> Model {
        let mut model = Model::directory(dir.name.as_str(), dir.path.clone(), writable);
        model.created = Some(dir.created);
        model.last_modified = Some(dir.updated);
        model
    }
}

/// Earliest `created` and latest `last_modified` across `models`.
pub fn reduce_dates(models: &[Model]) -> (Option<OffsetDateTime>, Option<OffsetDateTime>) {
    let created = models.iter().filter_map(|m| m.created).min();
    let updated = models.iter().filter_map(|m| m.last_modified).max();
    (created, updated)
}
