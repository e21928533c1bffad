//! Synthesizes directories from a dataset's flat entry names.
//!
//! Nothing here is persisted: every listing is recomputed from the entry list.
//! Entries lacking either timestamp are still ingesting and stay invisible.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::DwError;
use crate::models::RemoteEntry;
use crate::paths::{join, normalize, relative_to, split_parent};

const TEXT_EXTENSIONS: &[&str] = &[
    "csv", "tsv", "xls", "xlsx", "rdf", "rdfs", "owl", "nt", "ttl", "n3", "json", "jsonl",
    "ndjson", "ipynb", "js", "r", "py", "as", "apl", "bash", "bas", "bat", "c", "cpp", "cs",
    "css", "d", "dart", "diff", "go", "ini", "java", "julia", "kt", "lua", "matlab", "nasm",
    "ml", "perl", "php", "ps1", "rb", "scala", "sql", "tcl", "ts", "vim", "yaml", "xml", "asp",
    "jade", "tex", "less", "sass", "scss", "txt", "html", "md",
];

const TEXT_FILE_NAMES: &[&str] = &["Dockerfile"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Notebook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Json,
    Text,
    Base64,
}

impl ContentFormat {
    pub fn mimetype(self) -> Option<&'static str> {
        match self {
            ContentFormat::Json => None,
            ContentFormat::Text => Some("text/plain"),
            ContentFormat::Base64 => Some("application/octet-stream"),
        }
    }
}

/// Materialized file payload, shaped by the requested format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Content {
    Json(Value),
    Text(String),
    Base64(String),
}

impl Content {
    pub fn format(&self) -> ContentFormat {
        match self {
            Content::Json(_) => ContentFormat::Json,
            Content::Text(_) => ContentFormat::Text,
            Content::Base64(_) => ContentFormat::Base64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: NodeKind,
    pub format: ContentFormat,
    pub mimetype: Option<&'static str>,
}

pub fn classify(name: &str) -> Classification {
    classify_with(name, None, None)
}

/// Infers kind and format, letting explicit overrides win. The format
/// default follows the effective kind.
pub fn classify_with(
    name: &str,
    kind: Option<NodeKind>,
    format: Option<ContentFormat>,
) -> Classification {
    let kind = kind.unwrap_or_else(|| guess_kind(name));
    let format = format.unwrap_or_else(|| guess_format(name, kind));
    Classification {
        kind,
        format,
        mimetype: format.mimetype(),
    }
}

pub fn guess_kind(name: &str) -> NodeKind {
    if name.ends_with(".ipynb") {
        NodeKind::Notebook
    } else {
        NodeKind::File
    }
}

fn guess_format(name: &str, kind: NodeKind) -> ContentFormat {
    if kind == NodeKind::Notebook {
        return ContentFormat::Json;
    }
    let (_, file_name) = split_parent(name);
    let textual = match file_name.rsplit_once('.') {
        Some((_, ext)) => TEXT_EXTENSIONS.contains(&ext),
        None => TEXT_FILE_NAMES.contains(&file_name.as_str()),
    };
    if textual {
        ContentFormat::Text
    } else {
        ContentFormat::Base64
    }
}

/// Supplies file content only when a caller asks for it.
#[allow(async_fn_in_trait)]
pub trait ContentLoader {
    async fn load(&self, format: ContentFormat) -> Result<Content, DwError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directory {
    pub name: String,
    pub path: String,
    pub created: OffsetDateTime,
    pub updated: OffsetDateTime,
    /// `None` until the directory is expanded.
    pub children: Option<Vec<VirtualNode>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub name: String,
    pub path: String,
    pub entry_path: String,
    pub kind: NodeKind,
    pub format: ContentFormat,
    pub mimetype: Option<&'static str>,
    pub size: Option<u64>,
    pub created: OffsetDateTime,
    pub updated: OffsetDateTime,
    pub content: Option<Content>,
}

impl Leaf {
    pub fn with_overrides(mut self, kind: Option<NodeKind>, format: Option<ContentFormat>) -> Self {
        let class = classify_with(&self.entry_path, kind, format);
        self.kind = class.kind;
        self.format = class.format;
        self.mimetype = class.mimetype;
        self
    }

    pub async fn load_content<L: ContentLoader>(&mut self, loader: &L) -> Result<(), DwError> {
        self.content = Some(loader.load(self.format).await?);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VirtualNode {
    Directory(Directory),
    Leaf(Leaf),
}

impl VirtualNode {
    pub fn name(&self) -> &str {
        match self {
            VirtualNode::Directory(dir) => &dir.name,
            VirtualNode::Leaf(leaf) => &leaf.name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            VirtualNode::Directory(dir) => &dir.path,
            VirtualNode::Leaf(leaf) => &leaf.path,
        }
    }

    pub fn created(&self) -> OffsetDateTime {
        match self {
            VirtualNode::Directory(dir) => dir.created,
            VirtualNode::Leaf(leaf) => leaf.created,
        }
    }

    pub fn updated(&self) -> OffsetDateTime {
        match self {
            VirtualNode::Directory(dir) => dir.updated,
            VirtualNode::Leaf(leaf) => leaf.updated,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, VirtualNode::Directory(_))
    }
}

#[derive(Debug, Clone)]
struct VisibleEntry {
    name: String,
    size: Option<u64>,
    created: OffsetDateTime,
    updated: OffsetDateTime,
}

/// Visible entries of one dataset, ready to be grouped into nodes.
#[derive(Debug, Clone)]
pub struct DatasetTree {
    base: String,
    entries: Vec<VisibleEntry>,
}

impl DatasetTree {
    /// `base` is the virtual path of the dataset itself.
    pub fn new(entries: &[RemoteEntry], base: &str) -> Self {
        let mut visible: Vec<VisibleEntry> = entries
            .iter()
            .filter_map(|entry| {
                let (created, updated) = entry.timestamps()?;
                Some(VisibleEntry {
                    name: normalize(&entry.name),
                    size: entry.size_in_bytes,
                    created,
                    updated,
                })
            })
            .collect();
        visible.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            base: normalize(base),
            entries: visible,
        }
    }

    /// Direct children of `subtree`, directories unexpanded.
    pub fn list(&self, subtree: &str) -> Vec<VirtualNode> {
        self.children(&normalize(subtree), false)
    }

    /// Direct children of `subtree` with every directory expanded.
    pub fn tree(&self, subtree: &str) -> Vec<VirtualNode> {
        self.children(&normalize(subtree), true)
    }

    /// Aggregated node for `subtree`; `None` when nothing visible lives under it.
    pub fn directory(&self, subtree: &str, expand: bool) -> Option<Directory> {
        let subtree = normalize(subtree);
        let (created, updated) = aggregate(self.descendants(&subtree).map(|(_, entry)| entry))?;
        let (_, name) = split_parent(&subtree);
        Some(Directory {
            name,
            path: join([Some(self.base.as_str()), Some(subtree.as_str())]),
            created,
            updated,
            children: expand.then(|| self.children(&subtree, true)),
        })
    }

    pub fn leaf(&self, entry_path: &str) -> Option<Leaf> {
        let entry_path = normalize(entry_path);
        let entry = self.entries.iter().find(|entry| entry.name == entry_path)?;
        let (_, name) = split_parent(&entry_path);
        Some(self.make_leaf(name, entry))
    }

    fn descendants<'s>(
        &'s self,
        subtree: &'s str,
    ) -> impl Iterator<Item = (&'s str, &'s VisibleEntry)> + 's {
        self.entries.iter().filter_map(move |entry| {
            let rel = relative_to(&entry.name, subtree)?;
            (!rel.is_empty()).then_some((rel, entry))
        })
    }

    fn children(&self, subtree: &str, expand: bool) -> Vec<VirtualNode> {
        let mut groups: BTreeMap<&str, Vec<(&str, &VisibleEntry)>> = BTreeMap::new();
        for (rel, entry) in self.descendants(subtree) {
            let key = rel.split('/').next().unwrap_or(rel);
            groups.entry(key).or_default().push((rel, entry));
        }

        let mut dirs = Vec::new();
        let mut leaves = Vec::new();
        for (key, members) in groups {
            match members.as_slice() {
                [(rel, entry)] if *rel == key => {
                    leaves.push(VirtualNode::Leaf(self.make_leaf(key.to_string(), entry)));
                }
                _ => {
                    let Some((created, updated)) = aggregate(members.iter().map(|(_, e)| *e))
                    else {
                        continue;
                    };
                    let dir_path = join([Some(subtree), Some(key)]);
                    dirs.push(VirtualNode::Directory(Directory {
                        name: key.to_string(),
                        path: join([Some(self.base.as_str()), Some(dir_path.as_str())]),
                        created,
                        updated,
                        children: expand.then(|| self.children(&dir_path, true)),
                    }));
                }
            }
        }
        dirs.extend(leaves);
        dirs
    }

    fn make_leaf(&self, name: String, entry: &VisibleEntry) -> Leaf {
        let class = classify(&entry.name);
        Leaf {
            name,
            path: join([Some(self.base.as_str()), Some(entry.name.as_str())]),
            entry_path: entry.name.clone(),
            kind: class.kind,
            format: class.format,
            mimetype: class.mimetype,
            size: entry.size,
            created: entry.created,
            updated: entry.updated,
            content: None,
        }
    }
}

fn aggregate<'e>(
    entries: impl Iterator<Item = &'e VisibleEntry>,
) -> Option<(OffsetDateTime, OffsetDateTime)> {
    entries.fold(None, |acc, entry| match acc {
        None => Some((entry.created, entry.updated)),
        Some((created, updated)) => Some((created.min(entry.created), updated.max(entry.updated))),
    })
}
