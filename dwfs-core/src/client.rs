use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{CachedBody, ResponseCache};
use crate::error::DwError;
use crate::models::{Dataset, DatasetSummary, ErrorEnvelope, Page, User};
use crate::paths::directory_path;
use crate::retry::RetryPolicy;
use crate::transport::ThrottledTransport;
use crate::tree::{Content, ContentFormat, classify};

pub const DEFAULT_BASE_URL: &str = "https://api.data.world/v0";
pub const DEFAULT_POLL_TRIES: u32 = 10;

const USER_AGENT: &str = concat!("dwfs - ", env!("CARGO_PKG_VERSION"));
const LISTING_SCOPES: [&str; 3] = ["own", "contributing", "liked"];
const LISTING_PAGE_SIZE: u32 = 100;
const LISTING_FIELDS: &str = "id,owner,title,accessLevel,created,updated";
const PAGE_TOKEN_PARAM: &str = "next";

#[derive(Clone)]
pub struct DwClient {
    transport: ThrottledTransport,
    base_url: Url,
    cache: Arc<ResponseCache>,
    poll_policy: RetryPolicy,
    poll_tries: u32,
}

impl DwClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DwError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DwError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            transport: ThrottledTransport::new(http),
            base_url: Url::parse(base_url)?,
            cache: Arc::new(ResponseCache::default()),
            poll_policy: RetryPolicy::polling(),
            poll_tries: DEFAULT_POLL_TRIES,
        })
    }

    /// Shares `cache` with this client; other clients may hold the same one.
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_throttle_policy(mut self, policy: RetryPolicy) -> Self {
        self.transport = self.transport.with_policy(policy);
        self
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.transport = self.transport.with_max_tries(max_tries);
        self
    }

    pub fn with_poll_policy(mut self, policy: RetryPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    pub fn with_poll_tries(mut self, poll_tries: u32) -> Self {
        self.poll_tries = poll_tries.max(1);
        self
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub async fn get_me(&self) -> Result<User, DwError> {
        let url = self.endpoint(&["user"])?;
        let body = self.get_cached(url).await?;
        decode_body(&body)?.ok_or_else(|| DwError::NotFound("current user".into()))
    }

    pub async fn get_user(&self, user: &str) -> Result<Option<User>, DwError> {
        let url = self.endpoint(&["users", user])?;
        let body = self.get_cached(url).await?;
        decode_body(&body)
    }

    /// Cached snapshot of a dataset, possibly still ingesting.
    pub async fn get_dataset(
        &self,
        owner: &str,
        dataset_id: &str,
    ) -> Result<Option<Dataset>, DwError> {
        let url = self.endpoint(&["datasets", owner, dataset_id])?;
        let body = self.get_cached(url).await?;
        decode_body(&body)
    }

    /// Fetches a dataset until every entry is ready.
    ///
    /// Bypasses the cache while polling and caches the converged result. When
    /// the poll budget runs out the last snapshot travels inside
    /// [`DwError::NotYetReady`].
    pub async fn get_dataset_consistent(
        &self,
        owner: &str,
        dataset_id: &str,
    ) -> Result<Option<Dataset>, DwError> {
        let url = self.endpoint(&["datasets", owner, dataset_id])?;
        let mut last = None;
        for attempt in 0..self.poll_tries {
            let generation = self.cache.generation();
            let Some(body) = self.fetch_optional(url.clone()).await? else {
                return Ok(None);
            };
            let dataset: Dataset = from_value(body.clone())?;
            if dataset.is_ready() {
                self.cache.insert_at(cache_key(&url), Some(body), generation);
                return Ok(Some(dataset));
            }
            debug!(owner, dataset_id, attempt, "dataset still ingesting");
            last = Some(dataset);
            if attempt + 1 < self.poll_tries {
                tokio::time::sleep(self.poll_policy.wait(attempt, None)).await;
            }
        }

        let Some(snapshot) = last else {
            return Ok(None);
        };
        warn!(
            owner,
            dataset_id,
            attempts = self.poll_tries,
            "dataset did not converge"
        );
        Err(DwError::NotYetReady {
            owner: owner.to_string(),
            dataset_id: dataset_id.to_string(),
            attempts: self.poll_tries,
            snapshot: Box::new(snapshot),
        })
    }

    /// Datasets the user owns, contributes to or liked, one per `(owner, id)`.
    pub async fn get_datasets(&self) -> Result<Vec<DatasetSummary>, DwError> {
        let key = cache_key(&self.endpoint(&["user", "datasets"])?);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(decode_body(&hit)?.unwrap_or_default());
        }
        let generation = self.cache.generation();

        let mut datasets = Vec::new();
        for scope in LISTING_SCOPES {
            datasets.extend(self.paginate::<DatasetSummary>(scope).await?);
        }
        let datasets = merge_scopes(datasets);
        let body = serde_json::to_value(&datasets)
            .map_err(|err| DwError::BadFormat(err.to_string()))?;
        self.cache.insert_at(key, Some(body), generation);
        Ok(datasets)
    }

    /// Downloads an entry, shaped by `format` or by the name's inferred format.
    pub async fn get_file(
        &self,
        owner: &str,
        dataset_id: &str,
        file_name: &str,
        format: Option<ContentFormat>,
    ) -> Result<Content, DwError> {
        let url = self.endpoint(&["file_download", owner, dataset_id, file_name])?;
        debug!(owner, dataset_id, file_name, "downloading file");
        let request = self.transport.http().get(url).build()?;
        let response = self.transport.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(DwError::NotFound(format!("{owner}/{dataset_id}/{file_name}")));
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let bytes = response.bytes().await?;
        let format = format.unwrap_or_else(|| classify(file_name).format);
        decode_content(&bytes, format)
    }

    /// Uploads `data` and returns the dataset once it has absorbed the file.
    pub async fn upload_file(
        &self,
        owner: &str,
        dataset_id: &str,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<Dataset, DwError> {
        let url = self.endpoint(&["uploads", owner, dataset_id, "files", file_name])?;
        debug!(owner, dataset_id, file_name, bytes = data.len(), "uploading file");
        let request = self
            .transport
            .http()
            .put(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .build()?;
        let response = self.transport.send(request).await?;
        ensure_success(response).await?;
        self.cache.invalidate_all();

        self.get_dataset_consistent(owner, dataset_id)
            .await?
            .ok_or_else(|| DwError::NotFound(format!("{owner}/{dataset_id}")))
    }

    pub async fn delete_file(
        &self,
        owner: &str,
        dataset_id: &str,
        file_name: &str,
    ) -> Result<(), DwError> {
        let url = self.endpoint(&["datasets", owner, dataset_id, "files", file_name])?;
        debug!(owner, dataset_id, file_name, "deleting file");
        let request = self.transport.http().delete(url).build()?;
        let response = self.transport.send(request).await;
        self.cache.invalidate_all();
        ensure_success(response?).await
    }

    /// Deletes every entry under `directory_name/`, listed from a fresh read.
    pub async fn delete_subdirectory(
        &self,
        owner: &str,
        dataset_id: &str,
        directory_name: &str,
    ) -> Result<(), DwError> {
        let url = self.endpoint(&["datasets", owner, dataset_id])?;
        let body = self
            .fetch_optional(url)
            .await?
            .ok_or_else(|| DwError::NotFound(format!("{owner}/{dataset_id}")))?;
        let dataset: Dataset = from_value(body)?;
        let prefix = directory_path(directory_name);
        debug!(owner, dataset_id, prefix = %prefix, "deleting subdirectory");
        for entry in dataset.files.iter().filter(|f| f.name.starts_with(&prefix)) {
            self.delete_file(owner, dataset_id, &entry.name).await?;
        }
        self.cache.invalidate_all();
        Ok(())
    }

    pub async fn delete_dataset(&self, owner: &str, dataset_id: &str) -> Result<(), DwError> {
        let url = self.endpoint(&["datasets", owner, dataset_id])?;
        debug!(owner, dataset_id, "deleting dataset");
        let request = self.transport.http().delete(url).build()?;
        let response = self.transport.send(request).await;
        self.cache.invalidate_all();
        ensure_success(response?).await
    }

    async fn paginate<T: DeserializeOwned>(&self, scope: &str) -> Result<Vec<T>, DwError> {
        let mut records = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut url = self.endpoint(&["user", "datasets", scope])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("limit", &LISTING_PAGE_SIZE.to_string());
                query.append_pair("fields", LISTING_FIELDS);
                if let Some(token) = token.as_deref() {
                    query.append_pair(PAGE_TOKEN_PARAM, token);
                }
            }
            debug!(scope, has_token = token.is_some(), "listing datasets page");
            let request = self.transport.http().get(url).build()?;
            let response = self.transport.send(request).await?;
            let page: Page<T> = handle_response(response).await?;
            records.extend(page.records);
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(records)
    }

    async fn get_cached(&self, url: Url) -> Result<CachedBody, DwError> {
        let key = cache_key(&url);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let generation = self.cache.generation();
        let body = self.fetch_optional(url).await?;
        Ok(self.cache.insert_at(key, body, generation))
    }

    /// GET returning `None` on 404.
    async fn fetch_optional(&self, url: Url) -> Result<Option<Value>, DwError> {
        debug!(url = %url, "fetching");
        let request = self.transport.http().get(url).build()?;
        let response = self.transport.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(handle_response(response).await?))
    }

    /// Base URL plus one percent-encoded segment per element.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, DwError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Sorts by `(owner, id)` and keeps one record per key.
pub fn merge_scopes(mut datasets: Vec<DatasetSummary>) -> Vec<DatasetSummary> {
    datasets.sort_by(|a, b| (&a.owner, &a.id).cmp(&(&b.owner, &b.id)));
    datasets.dedup_by(|a, b| a.owner == b.owner && a.id == b.id);
    datasets
}

pub fn decode_content(bytes: &[u8], format: ContentFormat) -> Result<Content, DwError> {
    match format {
        ContentFormat::Json => serde_json::from_slice(bytes)
            .map(Content::Json)
            .map_err(|err| DwError::BadFormat(err.to_string())),
        ContentFormat::Base64 => Ok(Content::Base64(STANDARD.encode(bytes))),
        ContentFormat::Text => String::from_utf8(bytes.to_vec())
            .map(Content::Text)
            .map_err(|err| DwError::BadFormat(err.to_string())),
    }
}

fn cache_key(url: &Url) -> String {
    format!("GET {url}")
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, DwError> {
    serde_json::from_value(value).map_err(|err| DwError::BadFormat(err.to_string()))
}

fn decode_body<T: DeserializeOwned>(body: &CachedBody) -> Result<Option<T>, DwError> {
    (**body).clone().map(from_value).transpose()
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, DwError> {
    if response.status().is_success() {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| DwError::BadFormat(err.to_string()))
    } else {
        Err(api_error(response).await)
    }
}

async fn ensure_success(response: Response) -> Result<(), DwError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(api_error(response).await)
    }
}

/// Prefers the API's `{"message": ...}` envelope over the reason phrase.
async fn api_error(response: Response) -> DwError {
    let status = response.status();
    let body = response.bytes().await.unwrap_or_default();
    let message = serde_json::from_slice::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.message)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });
    debug!(%status, reason = %message, "api error");
    DwError::Api { status, message }
}
