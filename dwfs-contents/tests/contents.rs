use std::collections::HashMap;
use std::sync::Mutex;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use dwfs_contents::{
    ContentsManager, DatasetApi, DwContents, GetOptions, Model, ModelContent, ModelKind,
};
use dwfs_core::{
    AccessLevel, Content, ContentFormat, Dataset, DatasetSummary, DwError, PathCodec,
    RemoteEntry, User,
};
use serde_json::json;
use time::OffsetDateTime;
use time::macros::datetime;

const T0: OffsetDateTime = datetime!(2021-05-01 10:00 UTC);
const T1: OffsetDateTime = datetime!(2021-06-01 10:00 UTC);

/// In-memory stand-in for the remote API holding a single dataset.
struct FakeApi {
    dataset: Mutex<Dataset>,
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<String>>,
    ingest_uploads: bool,
}

impl FakeApi {
    fn new(access_level: AccessLevel) -> Self {
        let api = Self {
            dataset: Mutex::new(Dataset {
                owner: "jo".into(),
                id: "cars".into(),
                title: Some("Cars".into()),
                access_level: Some(access_level),
                created: Some(T0),
                updated: Some(T1),
                files: Vec::new(),
            }),
            bodies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            ingest_uploads: false,
        };
        api.put("a.csv", b"x,y\n1,2\n", true);
        api.put("dir/sub/b.ipynb", br#"{"cells":[]}"#, true);
        api.put("dir/c.bin", &[0, 159, 146, 150], true);
        api.put("loading.csv", b"", false);
        api
    }

    fn ingesting(mut self) -> Self {
        self.ingest_uploads = true;
        self
    }

    fn put(&self, name: &str, body: &[u8], visible: bool) {
        let mut dataset = self.dataset.lock().unwrap();
        dataset.files.retain(|entry| entry.name != name);
        dataset.files.push(RemoteEntry {
            name: name.into(),
            size_in_bytes: visible.then_some(body.len() as u64),
            created: visible.then_some(T0),
            updated: visible.then_some(T1),
            source: None,
        });
        self.bodies
            .lock()
            .unwrap()
            .insert(name.into(), body.to_vec());
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .dataset
            .lock()
            .unwrap()
            .files
            .iter()
            .map(|entry| entry.name.clone())
            .collect();
        names.sort();
        names
    }

    fn body(&self, name: &str) -> Option<Vec<u8>> {
        self.bodies.lock().unwrap().get(name).cloned()
    }

    fn matches(&self, owner: &str, dataset_id: &str) -> bool {
        let dataset = self.dataset.lock().unwrap();
        dataset.owner == owner && dataset.id == dataset_id
    }
}

impl DatasetApi for FakeApi {
    async fn get_me(&self) -> Result<User, DwError> {
        Ok(User {
            id: "jo".into(),
            display_name: None,
            created: Some(T0),
            updated: Some(T0),
        })
    }

    async fn get_user(&self, user: &str) -> Result<Option<User>, DwError> {
        Ok(matches!(user, "jo" | "amy").then(|| User {
            id: user.into(),
            display_name: None,
            created: None,
            updated: None,
        }))
    }

    async fn get_datasets(&self) -> Result<Vec<DatasetSummary>, DwError> {
        let own = DatasetSummary::from(&*self.dataset.lock().unwrap());
        let liked = DatasetSummary {
            owner: "amy".into(),
            id: "birds".into(),
            title: None,
            access_level: Some(AccessLevel::Read),
            created: Some(datetime!(2019-01-01 00:00 UTC)),
            updated: Some(datetime!(2019-02-01 00:00 UTC)),
        };
        Ok(vec![liked, own])
    }

    async fn get_dataset(
        &self,
        owner: &str,
        dataset_id: &str,
    ) -> Result<Option<Dataset>, DwError> {
        Ok(self
            .matches(owner, dataset_id)
            .then(|| self.dataset.lock().unwrap().clone()))
    }

    async fn get_file(
        &self,
        _owner: &str,
        _dataset_id: &str,
        file_name: &str,
        format: Option<ContentFormat>,
    ) -> Result<Content, DwError> {
        self.record(format!("get_file {file_name}"));
        let body = self
            .body(file_name)
            .ok_or_else(|| DwError::NotFound(file_name.into()))?;
        match format.unwrap_or(ContentFormat::Base64) {
            ContentFormat::Json => serde_json::from_slice(&body)
                .map(Content::Json)
                .map_err(|err| DwError::BadFormat(err.to_string())),
            ContentFormat::Text => String::from_utf8(body)
                .map(Content::Text)
                .map_err(|err| DwError::BadFormat(err.to_string())),
            ContentFormat::Base64 => Ok(Content::Base64(STANDARD.encode(body))),
        }
    }

    async fn upload_file(
        &self,
        owner: &str,
        dataset_id: &str,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<Dataset, DwError> {
        self.record(format!("upload_file {file_name}"));
        self.put(file_name, &data, !self.ingest_uploads);
        let snapshot = self.dataset.lock().unwrap().clone();
        if self.ingest_uploads {
            return Err(DwError::NotYetReady {
                owner: owner.into(),
                dataset_id: dataset_id.into(),
                attempts: 3,
                snapshot: Box::new(snapshot),
            });
        }
        Ok(snapshot)
    }

    async fn delete_file(
        &self,
        _owner: &str,
        _dataset_id: &str,
        file_name: &str,
    ) -> Result<(), DwError> {
        self.record(format!("delete_file {file_name}"));
        self.dataset
            .lock()
            .unwrap()
            .files
            .retain(|entry| entry.name != file_name);
        Ok(())
    }

    async fn delete_subdirectory(
        &self,
        _owner: &str,
        _dataset_id: &str,
        directory_name: &str,
    ) -> Result<(), DwError> {
        self.record(format!("delete_subdirectory {directory_name}"));
        let prefix = format!("{directory_name}/");
        self.dataset
            .lock()
            .unwrap()
            .files
            .retain(|entry| !entry.name.starts_with(&prefix));
        Ok(())
    }

    async fn delete_dataset(&self, owner: &str, dataset_id: &str) -> Result<(), DwError> {
        self.record(format!("delete_dataset {owner}/{dataset_id}"));
        Ok(())
    }
}

fn contents(api: FakeApi) -> DwContents<FakeApi> {
    DwContents::new(api, PathCodec::default())
}

fn text_model(text: &str) -> Model {
    Model {
        name: String::new(),
        path: String::new(),
        kind: ModelKind::File,
        writable: true,
        created: None,
        last_modified: None,
        content: Some(ModelContent::File(Content::Text(text.into()))),
        format: Some(ContentFormat::Text),
        mimetype: None,
    }
}

fn child_names(model: &Model) -> Vec<&str> {
    model
        .children()
        .unwrap_or_default()
        .iter()
        .map(|child| child.name.as_str())
        .collect()
}

#[tokio::test]
async fn root_lists_accounts_with_aggregated_dates() {
    let contents = contents(FakeApi::new(AccessLevel::Write));
    let root = contents.get("", GetOptions::with_content()).await.unwrap();

    assert_eq!(root.kind, ModelKind::Directory);
    assert!(!root.writable);
    assert_eq!(child_names(&root), vec!["amy", "jo"]);
    assert_eq!(root.created, Some(datetime!(2019-01-01 00:00 UTC)));
    assert_eq!(root.last_modified, Some(T1));
}

#[tokio::test]
async fn dataset_listing_synthesizes_directories_and_hides_ingesting_entries() {
    let contents = contents(FakeApi::new(AccessLevel::Write));
    let dataset = contents
        .get("jo/cars", GetOptions::with_content())
        .await
        .unwrap();

    assert!(dataset.writable);
    assert_eq!(child_names(&dataset), vec!["dir", "a.csv"]);
    let children = dataset.children().unwrap();
    assert_eq!(children[0].path, "jo/cars/dir");
    assert_eq!(children[0].kind, ModelKind::Directory);

    let sub = contents
        .get("jo/cars/dir", GetOptions::with_content())
        .await
        .unwrap();
    assert_eq!(child_names(&sub), vec!["sub", "c.bin"]);
}

#[tokio::test]
async fn metadata_get_does_not_download() {
    let api = FakeApi::new(AccessLevel::Read);
    let contents = contents(api);
    let model = contents
        .get("jo/cars/a.csv", GetOptions::metadata())
        .await
        .unwrap();

    assert_eq!(model.kind, ModelKind::File);
    assert!(!model.writable);
    assert_eq!(model.content, None);
    assert_eq!(model.format, None);
    assert!(contents.api().calls().is_empty());
}

#[tokio::test]
async fn file_content_follows_inferred_format() {
    let contents = contents(FakeApi::new(AccessLevel::Write));

    let csv = contents
        .get("jo/cars/a.csv", GetOptions::with_content())
        .await
        .unwrap();
    assert_eq!(csv.file_content(), Some(&Content::Text("x,y\n1,2\n".into())));
    assert_eq!(csv.format, Some(ContentFormat::Text));
    assert_eq!(csv.mimetype.as_deref(), Some("text/plain"));

    let notebook = contents
        .get("jo/cars/dir/sub/b.ipynb", GetOptions::with_content())
        .await
        .unwrap();
    assert_eq!(notebook.kind, ModelKind::Notebook);
    assert_eq!(notebook.file_content(), Some(&Content::Json(json!({"cells": []}))));

    let binary = contents
        .get("jo/cars/dir/c.bin", GetOptions::with_content())
        .await
        .unwrap();
    assert_eq!(binary.format, Some(ContentFormat::Base64));
    assert_eq!(binary.file_content(), Some(&Content::Base64("AJ+Slg==".into())));
}

#[tokio::test]
async fn requested_format_overrides_inference() {
    let contents = contents(FakeApi::new(AccessLevel::Write));
    let model = contents
        .get(
            "jo/cars/a.csv",
            GetOptions::with_content().format(ContentFormat::Base64),
        )
        .await
        .unwrap();
    assert_eq!(model.format, Some(ContentFormat::Base64));
    assert_eq!(model.mimetype.as_deref(), Some("application/octet-stream"));
}

#[tokio::test]
async fn missing_and_ingesting_files() {
    let contents = contents(FakeApi::new(AccessLevel::Write));

    let err = contents
        .get("jo/cars/nope.csv", GetOptions::with_content())
        .await
        .unwrap_err();
    assert!(matches!(err, DwError::NotFound(_)));

    assert!(contents.file_exists("jo/cars/loading.csv").await.unwrap());
    let err = contents
        .get("jo/cars/loading.csv", GetOptions::metadata())
        .await
        .unwrap_err();
    assert!(matches!(err, DwError::NotYetReady { attempts: 0, .. }));

    let err = contents
        .get("jo", GetOptions::metadata().kind(ModelKind::File))
        .await
        .unwrap_err();
    assert!(matches!(err, DwError::NotFound(_)));
}

#[tokio::test]
async fn existence_checks_cover_every_level() {
    let contents = contents(FakeApi::new(AccessLevel::Write));

    assert!(contents.dir_exists("").await.unwrap());
    assert!(contents.dir_exists("amy").await.unwrap());
    assert!(!contents.dir_exists("nobody").await.unwrap());
    assert!(contents.dir_exists("jo/cars").await.unwrap());
    assert!(!contents.dir_exists("jo/trucks").await.unwrap());
    assert!(contents.dir_exists("jo/cars/dir/sub").await.unwrap());
    assert!(!contents.dir_exists("jo/cars/di").await.unwrap());
    assert!(!contents.dir_exists("jo/cars/a.csv").await.unwrap());

    assert!(contents.file_exists("jo/cars/a.csv").await.unwrap());
    assert!(!contents.file_exists("jo/cars/dir").await.unwrap());
    assert!(!contents.file_exists("jo/cars").await.unwrap());
    assert!(contents.exists("jo/cars/dir").await.unwrap());
    assert!(!contents.is_hidden("jo/cars/a.csv"));
}

#[tokio::test]
async fn save_uploads_and_returns_visible_model() {
    let contents = contents(FakeApi::new(AccessLevel::Write));
    let saved = contents
        .save(text_model("hello"), "jo/cars/new/notes.txt")
        .await
        .unwrap();

    assert_eq!(saved.path, "jo/cars/new/notes.txt");
    assert_eq!(saved.kind, ModelKind::File);
    assert!(saved.writable);
    assert_eq!(saved.created, Some(T0));
    assert_eq!(contents.api().body("new/notes.txt"), Some(b"hello".to_vec()));
    assert!(contents.dir_exists("jo/cars/new").await.unwrap());
}

#[tokio::test]
async fn save_degrades_to_pending_model_while_ingesting() {
    let contents = contents(FakeApi::new(AccessLevel::Write).ingesting());
    let saved = contents
        .save(text_model("hello"), "jo/cars/late.txt")
        .await
        .unwrap();

    assert_eq!(saved.name, "late.txt");
    assert_eq!(saved.path, "jo/cars/late.txt");
    assert_eq!(saved.created, None);
}

#[tokio::test]
async fn save_rejects_directories_and_paths_outside_datasets() {
    let contents = contents(FakeApi::new(AccessLevel::Write));

    let mut dir = text_model("");
    dir.kind = ModelKind::Directory;
    dir.content = None;
    let err = contents.save(dir, "jo/cars/newdir").await.unwrap_err();
    assert!(matches!(err, DwError::Unsupported(_)));

    let err = contents
        .save(text_model("x"), "jo/cars/dir")
        .await
        .unwrap_err();
    assert!(matches!(err, DwError::InvalidPath(_)));

    let err = contents
        .save(text_model("x"), "jo/trucks")
        .await
        .unwrap_err();
    assert!(matches!(err, DwError::InvalidPath(_)));
    assert!(contents.api().calls().is_empty());
}

#[tokio::test]
async fn rename_copies_then_deletes() {
    let contents = contents(FakeApi::new(AccessLevel::Write));
    contents
        .rename("jo/cars/a.csv", "jo/cars/archive/a.csv")
        .await
        .unwrap();

    assert_eq!(
        contents.api().calls(),
        vec![
            "get_file a.csv",
            "upload_file archive/a.csv",
            "delete_file a.csv",
        ]
    );
    assert_eq!(
        contents.api().body("archive/a.csv"),
        Some(b"x,y\n1,2\n".to_vec())
    );
    assert!(!contents.file_exists("jo/cars/a.csv").await.unwrap());
}

#[tokio::test]
async fn rename_guards() {
    let contents = contents(FakeApi::new(AccessLevel::Write));

    let err = contents.rename("", "jo/x").await.unwrap_err();
    assert!(matches!(err, DwError::InvalidPath(_)));

    let err = contents
        .rename("jo/cars/a.csv", "jo/cars/dir/c.bin")
        .await
        .unwrap_err();
    assert!(matches!(err, DwError::Conflict(_)));

    let err = contents
        .rename("jo/cars/dir", "jo/cars/other")
        .await
        .unwrap_err();
    assert!(matches!(err, DwError::Unsupported(_)));

    let err = contents
        .rename("jo/cars/a.csv", "jo/trucks")
        .await
        .unwrap_err();
    assert!(matches!(err, DwError::InvalidPath(_)));
    assert!(contents.api().calls().is_empty());
}

#[tokio::test]
async fn delete_dispatches_by_level() {
    let contents = contents(FakeApi::new(AccessLevel::Write));

    contents.delete("jo/cars/dir").await.unwrap();
    contents.delete("jo/cars/a.csv").await.unwrap();
    contents.delete("jo/cars").await.unwrap();
    assert_eq!(
        contents.api().calls(),
        vec![
            "delete_subdirectory dir",
            "delete_file a.csv",
            "delete_dataset jo/cars",
        ]
    );
    assert_eq!(contents.api().names(), vec!["loading.csv"]);

    let err = contents.delete("jo").await.unwrap_err();
    assert!(matches!(err, DwError::Unsupported(_)));
    let err = contents.delete("jo/cars/gone.csv").await.unwrap_err();
    assert!(matches!(err, DwError::NotFound(_)));
}

#[tokio::test]
async fn mount_prefix_is_stripped_and_restored() {
    let contents = DwContents::new(FakeApi::new(AccessLevel::Write), PathCodec::new("dw", ""));

    let model = contents
        .get("/dw/jo/cars/a.csv", GetOptions::metadata())
        .await
        .unwrap();
    assert_eq!(model.path, "dw/jo/cars/a.csv");

    let err = contents
        .get("elsewhere/jo", GetOptions::metadata())
        .await
        .unwrap_err();
    assert!(matches!(err, DwError::InvalidPath(_)));
}

#[tokio::test]
async fn root_dir_anchors_visible_tree_at_an_account() {
    let contents = DwContents::new(FakeApi::new(AccessLevel::Write), PathCodec::new("", "jo"));

    let account = contents.get("", GetOptions::with_content()).await.unwrap();
    assert_eq!(child_names(&account), vec!["cars"]);
    assert_eq!(account.children().unwrap()[0].path, "cars");

    let file = contents
        .get("cars/a.csv", GetOptions::metadata())
        .await
        .unwrap();
    assert_eq!(file.path, "cars/a.csv");
}

fn compatible(api: FakeApi) -> DwContents<FakeApi> {
    DwContents::new(api, PathCodec::default()).with_compatibility_mode(true)
}

fn directory_model() -> Model {
    Model {
        kind: ModelKind::Directory,
        content: None,
        format: None,
        ..text_model("")
    }
}

#[tokio::test]
async fn compatibility_mode_creates_directories_with_a_placeholder() {
    let contents = compatible(FakeApi::new(AccessLevel::Write));
    let created = contents
        .save(directory_model(), "jo/cars/fresh")
        .await
        .unwrap();

    assert_eq!(created.kind, ModelKind::Directory);
    assert_eq!(created.path, "jo/cars/fresh");
    assert!(created.writable);
    assert_eq!(contents.api().calls(), vec!["upload_file fresh/dummy"]);
    assert_eq!(contents.api().body("fresh/dummy"), Some(Vec::new()));
    assert!(contents.dir_exists("jo/cars/fresh").await.unwrap());
}

#[tokio::test]
async fn compatibility_mode_still_refuses_accounts_and_datasets() {
    let contents = compatible(FakeApi::new(AccessLevel::Write));

    let err = contents.save(directory_model(), "jo/newset").await.unwrap_err();
    assert!(matches!(err, DwError::Unsupported(_)));
    let err = contents.save(directory_model(), "someone").await.unwrap_err();
    assert!(matches!(err, DwError::Unsupported(_)));

    let err = contents.rename("jo/cars", "jo/trucks").await.unwrap_err();
    assert!(matches!(err, DwError::Unsupported(_)));
    assert!(contents.api().calls().is_empty());
}

#[tokio::test]
async fn compatibility_mode_renames_directories_file_by_file() {
    let contents = compatible(FakeApi::new(AccessLevel::Write));
    contents.rename("jo/cars/dir", "jo/cars/moved").await.unwrap();

    assert_eq!(
        contents.api().names(),
        vec!["a.csv", "loading.csv", "moved/c.bin", "moved/sub/b.ipynb"]
    );
    assert_eq!(
        contents.api().body("moved/c.bin"),
        Some(vec![0, 159, 146, 150])
    );
    assert_eq!(
        contents.api().body("moved/sub/b.ipynb"),
        Some(br#"{"cells":[]}"#.to_vec())
    );
    assert!(!contents.dir_exists("jo/cars/dir").await.unwrap());

    let err = contents
        .rename("jo/cars/moved", "jo/cars/a.csv")
        .await
        .unwrap_err();
    assert!(matches!(err, DwError::Conflict(_)));
}

#[tokio::test]
async fn directory_operations_stay_unsupported_by_default() {
    let contents = contents(FakeApi::new(AccessLevel::Write));
    let err = contents
        .save(directory_model(), "jo/cars/fresh")
        .await
        .unwrap_err();
    assert!(matches!(err, DwError::Unsupported(_)));
    assert!(contents.api().calls().is_empty());
}
