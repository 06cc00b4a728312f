use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::error::QtlError;
use crate::storage::{GCS_SCHEME, Location, Storage, WriteSink};

pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

#[derive(Debug, Clone)]
pub struct GcsOptions {
    pub endpoint: String,
    pub access_token: Option<String>,
    pub project_id: Option<String>,
    pub timeout: Duration,
}

impl Default for GcsOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GCS_ENDPOINT.to_string(),
            access_token: None,
            project_id: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl GcsOptions {
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(token) = std::env::var("GCS_ACCESS_TOKEN") {
            if !token.trim().is_empty() {
                options.access_token = Some(token.trim().to_string());
            }
        }
        if let Ok(endpoint) = std::env::var("GCS_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                options.endpoint = endpoint.trim().trim_end_matches('/').to_string();
            }
        }
        options
    }
}

#[derive(Clone)]
pub struct GcsStorage {
    client: Client,
    endpoint: String,
    project_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectListPage {
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub items: Vec<ObjectEntry>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
}

impl GcsStorage {
    pub fn new(options: GcsOptions) -> Result<Self, QtlError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("qtlformer/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| QtlError::StorageHttp(err.to_string()))?,
        );
        if let Some(token) = &options.access_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|err| QtlError::StorageHttp(err.to_string()))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(options.timeout)
            .build()
            .map_err(|err| QtlError::StorageHttp(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: options.endpoint,
            project_id: options.project_id,
        })
    }

    fn object_url(&self, bucket: &str, object: &str) -> Result<Url, QtlError> {
        let mut url = self.api_url()?;
        url.path_segments_mut()
            .map_err(|_| QtlError::InvalidLocation(self.endpoint.clone()))?
            .extend(["storage", "v1", "b", bucket, "o", object]);
        Ok(url)
    }

    fn list_url(&self, bucket: &str) -> Result<Url, QtlError> {
        let mut url = self.api_url()?;
        url.path_segments_mut()
            .map_err(|_| QtlError::InvalidLocation(self.endpoint.clone()))?
            .extend(["storage", "v1", "b", bucket, "o"]);
        Ok(url)
    }

    fn upload_url(&self, bucket: &str, object: &str) -> Result<Url, QtlError> {
        let mut url = self.api_url()?;
        url.path_segments_mut()
            .map_err(|_| QtlError::InvalidLocation(self.endpoint.clone()))?
            .extend(["upload", "storage", "v1", "b", bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object);
        Ok(url)
    }

    fn api_url(&self) -> Result<Url, QtlError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|err| QtlError::InvalidLocation(format!("{}: {err}", self.endpoint)))?;
        if let Some(project) = &self.project_id {
            url.query_pairs_mut().append_pair("userProject", project);
        }
        Ok(url)
    }

    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        page_token: Option<&str>,
    ) -> Result<ObjectListPage, QtlError> {
        let mut url = self.list_url(bucket)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("delimiter", "/");
            query.append_pair("fields", "prefixes,items(name),nextPageToken");
            if !prefix.is_empty() {
                query.append_pair("prefix", prefix);
            }
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        let response = self.send_with_retries(|| self.client.get(url.clone()))?;
        let response = ensure_success(response)?;
        response
            .json::<ObjectListPage>()
            .map_err(|err| QtlError::StorageHttp(err.to_string()))
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, QtlError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(QtlError::StorageHttp(err.to_string()));
                }
            }
        }
    }
}

impl Storage for GcsStorage {
    fn list(&self, path: &str) -> Result<Vec<String>, QtlError> {
        let (bucket, key) = split_gcs_path(path)?;
        let prefix = directory_prefix(&key);
        let mut pages = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_page(&bucket, &prefix, page_token.as_deref())?;
            page_token = page.next_page_token.clone();
            pages.push(page);
            if page_token.is_none() {
                break;
            }
        }
        debug!(path, pages = pages.len(), "listed object prefix");
        children_from_pages(&bucket, &prefix, pages)
    }

    fn exists(&self, path: &str) -> Result<bool, QtlError> {
        let (bucket, key) = split_gcs_path(path)?;
        if key.is_empty() {
            return Ok(true);
        }
        let mut url = self.object_url(&bucket, &key)?;
        url.query_pairs_mut().append_pair("fields", "name");
        let response = self.send_with_retries(|| self.client.get(url.clone()))?;
        match response.status().as_u16() {
            404 => Ok(false),
            _ => ensure_success(response).map(|_| true),
        }
    }

    fn open_for_write(&self, path: &str) -> Result<Box<dyn WriteSink>, QtlError> {
        let (bucket, key) = split_gcs_path(path)?;
        if key.is_empty() {
            return Err(QtlError::InvalidLocation(format!(
                "{path} does not name an object"
            )));
        }
        Ok(Box::new(GcsUploadSink {
            storage: self.clone(),
            bucket,
            object: key,
            buffer: Vec::new(),
        }))
    }
}

struct GcsUploadSink {
    storage: GcsStorage,
    bucket: String,
    object: String,
    buffer: Vec<u8>,
}

impl Write for GcsUploadSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WriteSink for GcsUploadSink {
    fn finish(self: Box<Self>) -> Result<(), QtlError> {
        let url = self.storage.upload_url(&self.bucket, &self.object)?;
        let response = self.storage.send_with_retries(|| {
            self.storage
                .client
                .post(url.clone())
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(self.buffer.clone())
        })?;
        ensure_success(response)?;
        debug!(
            bucket = %self.bucket,
            object = %self.object,
            bytes = self.buffer.len(),
            "uploaded object"
        );
        Ok(())
    }
}

fn ensure_success(response: Response) -> Result<Response, QtlError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .unwrap_or_else(|_| "storage request failed".to_string());
    Err(QtlError::StorageStatus { status, message })
}

pub fn split_gcs_path(path: &str) -> Result<(String, String), QtlError> {
    match Location::parse(path)? {
        Location::Gcs { bucket, prefix } => Ok((bucket, prefix)),
        Location::Local(_) => Err(QtlError::InvalidLocation(format!(
            "{path} is not a {GCS_SCHEME} URL"
        ))),
    }
}

fn directory_prefix(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        format!("{key}/")
    }
}

/// Merges sub-prefixes and objects of a listing into sorted child URLs.
///
/// The JSON API answers an unknown prefix with an empty page, so a non-root
/// prefix with nothing under it is reported as not found.
pub fn children_from_pages(
    bucket: &str,
    prefix: &str,
    pages: Vec<ObjectListPage>,
) -> Result<Vec<String>, QtlError> {
    let nothing_listed = pages
        .iter()
        .all(|page| page.prefixes.is_empty() && page.items.is_empty());
    if !prefix.is_empty() && nothing_listed {
        return Err(QtlError::StorageStatus {
            status: 404,
            message: format!(
                "{GCS_SCHEME}{bucket}/{} not found",
                prefix.trim_end_matches('/')
            ),
        });
    }
    let mut children = Vec::new();
    for page in pages {
        for sub in page.prefixes {
            let name = sub.trim_end_matches('/');
            if !name.is_empty() {
                children.push(format!("{GCS_SCHEME}{bucket}/{name}"));
            }
        }
        for item in page.items {
            // folder placeholder objects
            if item.name == prefix || item.name.ends_with('/') {
                continue;
            }
            children.push(format!("{GCS_SCHEME}{bucket}/{}", item.name));
        }
    }
    children.sort();
    children.dedup();
    Ok(children)
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
