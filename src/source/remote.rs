//! S3-compatible object store accessed over plain HTTP.

use async_stream::try_stream;
use futures_core::Stream;
use futures_util::{TryStreamExt, pin_mut};
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;

use super::{ContentStream, Enumerator, Fetcher, SourceError};

const DEFAULT_MAX_KEYS: u32 = 50;

/// Connection settings for an [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct ObjectStoreSettings {
    /// Base URL of the object store, e.g. `http://127.0.0.1:9000`.
    pub endpoint: String,
    /// Bucket holding the items.
    pub bucket: String,
    /// Only keys starting with this prefix are listed.
    pub prefix: String,
    /// Optional bearer token sent with every request.
    pub token: Option<String>,
    /// Continuation token to resume a previous listing from.
    pub start_token: Option<String>,
    /// Page size requested from the listing API.
    pub max_keys: u32,
}

impl ObjectStoreSettings {
    /// Settings for `bucket` at `endpoint` with default paging and no prefix.
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            prefix: String::new(),
            token: None,
            start_token: None,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }
}

/// Lightweight HTTP client for `ListObjectsV2` listings and object downloads.
pub struct ObjectStore {
    client: Client,
    base_url: Url,
    settings: ObjectStoreSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    contents: Vec<ObjectEntry>,
    #[serde(default)]
    is_truncated: bool,
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectEntry {
    key: String,
    #[serde(default)]
    size: u64,
}

impl ObjectStore {
    /// Build a client for the configured endpoint and bucket.
    pub fn new(settings: ObjectStoreSettings) -> Result<Self, SourceError> {
        let client = Client::builder().user_agent("rusty-ingest/0.1").build()?;
        let base_url = normalize_base_url(&settings.endpoint)?;
        tracing::debug!(
            url = %base_url,
            bucket = %settings.bucket,
            prefix = %settings.prefix,
            has_token = settings.token.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized object store client"
        );
        Ok(Self {
            client,
            base_url,
            settings,
        })
    }

    fn object_url(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                SourceError::MalformedListing(format!("endpoint cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .push(&self.settings.bucket)
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.settings.token {
            Some(token) if !token.is_empty() => request.bearer_auth(token),
            _ => request,
        }
    }

    /// Stream listing entries page by page, following continuation tokens.
    fn stream_keys(&self) -> impl Stream<Item = Result<String, SourceError>> + '_ {
        try_stream! {
            let url = self.object_url(&[])?;
            let mut continuation = self.settings.start_token.clone().filter(|token| !token.is_empty());
            let max_keys = self.settings.max_keys.max(1).to_string();

            loop {
                let mut query: Vec<(&str, &str)> = vec![
                    ("list-type", "2"),
                    ("prefix", self.settings.prefix.as_str()),
                    ("max-keys", max_keys.as_str()),
                ];
                if let Some(token) = continuation.as_deref() {
                    query.push(("continuation-token", token));
                }

                let request = self.authorize(self.client.get(url.clone()).query(&query));
                let response = request.send().await?;
                let status = response.status();
                if status.is_success() {
                    let body = response.text().await?;
                    let page: ListBucketResult = quick_xml::de::from_str(&body)
                        .map_err(|err| SourceError::MalformedListing(err.to_string()))?;
                    tracing::trace!(
                        entries = page.contents.len(),
                        truncated = page.is_truncated,
                        "Fetched listing page"
                    );
                    for entry in page.contents {
                        if entry.key.is_empty() || entry.key.ends_with('/') {
                            continue;
                        }
                        tracing::trace!(key = %entry.key, size = entry.size, "Listed object");
                        yield entry.key;
                    }

                    match page.next_continuation_token {
                        Some(next) if page.is_truncated && !next.is_empty() => continuation = Some(next),
                        _ => break,
                    }
                } else {
                    let body = response.text().await.unwrap_or_default();
                    tracing::error!(bucket = %self.settings.bucket, status = %status, "Failed to list objects");
                    Err::<(), _>(SourceError::UnexpectedStatus { status, body })?;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Enumerator for ObjectStore {
    async fn list(&self) -> Result<Vec<String>, SourceError> {
        let stream = self.stream_keys();
        pin_mut!(stream);
        let mut keys = Vec::new();
        while let Some(key) = stream.try_next().await? {
            keys.push(key);
        }
        tracing::debug!(bucket = %self.settings.bucket, count = keys.len(), "Listed remote items");
        Ok(keys)
    }
}

#[async_trait::async_trait]
impl Fetcher for ObjectStore {
    async fn fetch(&self, item: &str) -> Result<ContentStream, SourceError> {
        let segments: Vec<&str> = item.split('/').collect();
        let url = self.object_url(&segments)?;
        let response = self.authorize(self.client.get(url)).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(item.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::UnexpectedStatus { status, body });
        }
        Ok(Box::pin(response.bytes_stream().map_err(SourceError::from)))
    }
}

fn normalize_base_url(raw: &str) -> Result<Url, SourceError> {
    let trimmed = raw.trim().trim_end_matches('/');
    Url::parse(trimmed)
        .map_err(|err| SourceError::MalformedListing(format!("invalid endpoint '{raw}': {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use httpmock::{Method::GET, MockServer};

    fn store(server: &MockServer) -> ObjectStore {
        let mut settings = ObjectStoreSettings::new(server.base_url(), "docs");
        settings.prefix = "notes/".to_string();
        settings.start_token = Some("page-1".to_string());
        settings.token = Some("secret".to_string());
        ObjectStore::new(settings).expect("store")
    }

    #[tokio::test]
    async fn list_follows_continuation_tokens() {
        let server = MockServer::start_async().await;

        let first = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/docs")
                    .query_param("list-type", "2")
                    .query_param("prefix", "notes/")
                    .query_param("max-keys", "50")
                    .query_param("continuation-token", "page-1")
                    .header("Authorization", "Bearer secret");
                then.status(200).body(
                    r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>docs</Name>
  <Prefix>notes/</Prefix>
  <IsTruncated>true</IsTruncated>
  <Contents><Key>notes/a.txt</Key><Size>12</Size></Contents>
  <Contents><Key>notes/</Key><Size>0</Size></Contents>
  <NextContinuationToken>page-2</NextContinuationToken>
</ListBucketResult>"#,
                );
            })
            .await;

        let second = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/docs")
                    .query_param("continuation-token", "page-2");
                then.status(200).body(
                    r#"<ListBucketResult>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>notes/b.md</Key><Size>3</Size></Contents>
</ListBucketResult>"#,
                );
            })
            .await;

        let keys = store(&server).list().await.expect("list");

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(keys, vec!["notes/a.txt", "notes/b.md"]);
    }

    #[tokio::test]
    async fn list_surfaces_unexpected_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/docs");
                then.status(403).body("denied");
            })
            .await;

        let err = store(&server).list().await.expect_err("should fail");
        assert!(matches!(err, SourceError::UnexpectedStatus { .. }));
    }

    #[tokio::test]
    async fn fetch_streams_object_body() {
        let server = MockServer::start_async().await;
        let object = server
            .mock_async(|when, then| {
                when.method(GET).path("/docs/notes/a.txt");
                then.status(200).body("first\n\nsecond");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/docs/notes/missing.txt");
                then.status(404);
            })
            .await;

        let store = store(&server);
        let mut stream = store.fetch("notes/a.txt").await.expect("fetch");
        let mut body = Vec::new();
        while let Some(piece) = stream.next().await {
            body.extend_from_slice(&piece.expect("piece"));
        }

        object.assert_async().await;
        assert_eq!(body, b"first\n\nsecond");
        assert!(matches!(
            store.fetch("notes/missing.txt").await,
            Err(SourceError::NotFound(_))
        ));
    }
}
