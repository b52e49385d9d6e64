//! Firestore document store over the v1 REST API.

mod codec;

pub use codec::{decode_fields, decode_value, encode_fields, encode_value};

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::models::{Fields, IdGenerator, UuidIdGenerator};

use super::{
    Direction, Document, DocumentStore, Filter, FilterOp, Query, Write, DEFAULT_BATCH_LIMIT,
};

pub const FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com/v1";

const LIST_PAGE_SIZE: u32 = 300;

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<RawDocument>,
}

pub struct FirestoreStore {
    client: Client,
    base_url: String,
    project_id: String,
    database: String,
    token: Option<SecretString>,
    ids: Arc<dyn IdGenerator>,
    batch_limit: usize,
}

impl FirestoreStore {
    pub fn new(
        project_id: impl Into<String>,
        database: impl Into<String>,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Firestore HTTP client")?;
        Ok(Self {
            client,
            base_url: FIRESTORE_API_BASE.to_string(),
            project_id: project_id.into(),
            database: database.into(),
            token,
            ids: Arc::new(UuidIdGenerator),
            batch_limit: DEFAULT_BATCH_LIMIT,
        })
    }

    /// Override API base URL (emulator or tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// `projects/{p}/databases/{d}/documents`
    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database
        )
    }

    fn document_name(&self, path: &str) -> String {
        format!("{}/{}", self.documents_root(), path.trim_matches('/'))
    }

    fn root_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.documents_root()
        )
    }

    /// URL of a document or collection; path segments are percent-encoded.
    fn document_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .trim_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.root_url(), encoded.join("/"))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Send and return the status with the raw body.
    async fn send(&self, builder: RequestBuilder) -> Result<(StatusCode, String)> {
        let response = builder.send().await.context("Firestore HTTP request failed")?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read Firestore response body")?;
        Ok((status, body))
    }

    async fn send_ok(&self, builder: RequestBuilder) -> Result<String> {
        let (status, body) = self.send(builder).await?;
        if !status.is_success() {
            anyhow::bail!("Firestore request failed ({status}): {}", error_message(&body));
        }
        Ok(body)
    }

    fn to_document(&self, raw: RawDocument) -> Result<Document> {
        let root = self.documents_root();
        let path = raw
            .name
            .strip_prefix(&root)
            .map(|p| p.trim_start_matches('/'))
            .with_context(|| format!("Document {} is outside {root}", raw.name))?
            .to_string();
        let fields = decode_fields(&raw.fields)
            .with_context(|| format!("Failed to decode document {path}"))?;
        Ok(Document::new(path, fields))
    }

    /// Decode a page of documents, skipping the ones that cannot be read.
    fn decode_all(&self, raws: impl IntoIterator<Item = RawDocument>) -> Vec<Document> {
        raws.into_iter()
            .filter_map(|raw| {
                let name = raw.name.clone();
                match self.to_document(raw) {
                    Ok(doc) => Some(doc),
                    Err(err) => {
                        tracing::warn!(doc = %name, %err, "Skipping undecodable document");
                        None
                    }
                }
            })
            .collect()
    }

    async fn run_query(
        &self,
        parent: &str,
        collection_id: &str,
        all_descendants: bool,
        query: &Query,
    ) -> Result<Vec<Document>> {
        let url = if parent.is_empty() {
            format!("{}:runQuery", self.root_url())
        } else {
            format!("{}:runQuery", self.document_url(parent))
        };
        let body = json!({
            "structuredQuery": structured_query(collection_id, all_descendants, query)
        });
        let text = self
            .send_ok(self.request(Method::POST, &url).json(&body))
            .await?;
        let items: Vec<RunQueryItem> =
            serde_json::from_str(&text).context("Failed to parse Firestore runQuery response")?;
        Ok(self.decode_all(items.into_iter().filter_map(|item| item.document)))
    }

    fn encode_write(&self, write: &Write) -> Value {
        match write {
            Write::Set { path, fields } => json!({
                "update": { "name": self.document_name(path), "fields": encode_fields(fields) }
            }),
            Write::Update { path, fields } => json!({
                "update": { "name": self.document_name(path), "fields": encode_fields(fields) },
                "updateMask": { "fieldPaths": field_paths(fields) },
                "currentDocument": { "exists": true }
            }),
            Write::Delete { path } => json!({ "delete": self.document_name(path) }),
        }
    }
}

/// Pull `error.message` out of a Google API error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

fn field_paths(fields: &Fields) -> Vec<String> {
    fields
        .keys()
        .map(|name| {
            if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
            {
                name.clone()
            } else {
                format!("`{}`", name.replace('`', "\\`"))
            }
        })
        .collect()
}

fn operator(op: FilterOp) -> &'static str {
    match op {
        FilterOp::Eq => "EQUAL",
        FilterOp::Lt => "LESS_THAN",
        FilterOp::Le => "LESS_THAN_OR_EQUAL",
        FilterOp::Gt => "GREATER_THAN",
        FilterOp::Ge => "GREATER_THAN_OR_EQUAL",
        FilterOp::In => "IN",
    }
}

fn field_filter(filter: &Filter) -> Value {
    json!({
        "fieldFilter": {
            "field": { "fieldPath": filter.field },
            "op": operator(filter.op),
            "value": encode_value(&filter.value),
        }
    })
}

fn structured_query(collection_id: &str, all_descendants: bool, query: &Query) -> Value {
    let mut structured = Map::new();
    structured.insert(
        "from".into(),
        json!([{ "collectionId": collection_id, "allDescendants": all_descendants }]),
    );
    match query.filters.as_slice() {
        [] => {}
        [only] => {
            structured.insert("where".into(), field_filter(only));
        }
        many => {
            let filters: Vec<Value> = many.iter().map(field_filter).collect();
            structured.insert(
                "where".into(),
                json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
            );
        }
    }
    if let Some((field, direction)) = &query.order_by {
        let direction = match direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        structured.insert(
            "orderBy".into(),
            json!([{ "field": { "fieldPath": field }, "direction": direction }]),
        );
    }
    if let Some(limit) = query.limit {
        structured.insert("limit".into(), json!(limit));
    }
    Value::Object(structured)
}

/// Split `a/b/c` into (`a/b`, `c`).
fn split_collection(collection: &str) -> (&str, &str) {
    let collection = collection.trim_matches('/');
    collection.rsplit_once('/').unwrap_or(("", collection))
}

#[async_trait::async_trait]
impl DocumentStore for FirestoreStore {
    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let url = self.document_url(collection);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![("pageSize", LIST_PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }
            let text = self
                .send_ok(self.request(Method::GET, &url).query(&params))
                .await
                .with_context(|| format!("Failed to list {collection}"))?;
            let page: ListResponse =
                serde_json::from_str(&text).context("Failed to parse Firestore list response")?;
            documents.extend(self.decode_all(page.documents));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!(collection, count = documents.len(), "Listed documents");
        Ok(documents)
    }

    async fn get(&self, path: &str) -> Result<Option<Document>> {
        let url = self.document_url(path);
        let (status, body) = self.send(self.request(Method::GET, &url)).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            anyhow::bail!("Firestore request failed ({status}): {}", error_message(&body));
        }
        let raw: RawDocument =
            serde_json::from_str(&body).context("Failed to parse Firestore document")?;
        self.to_document(raw).map(Some)
    }

    async fn set(&self, path: &str, fields: Fields) -> Result<()> {
        let url = self.document_url(path);
        self.send_ok(
            self.request(Method::PATCH, &url)
                .json(&json!({ "fields": encode_fields(&fields) })),
        )
        .await
        .with_context(|| format!("Failed to write {path}"))?;
        Ok(())
    }

    async fn update(&self, path: &str, fields: Fields) -> Result<()> {
        let url = self.document_url(path);
        let mut params: Vec<(&str, String)> = field_paths(&fields)
            .into_iter()
            .map(|p| ("updateMask.fieldPaths", p))
            .collect();
        params.push(("currentDocument.exists", "true".to_string()));
        self.send_ok(
            self.request(Method::PATCH, &url)
                .query(&params)
                .json(&json!({ "fields": encode_fields(&fields) })),
        )
        .await
        .with_context(|| format!("Failed to update {path}"))?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.document_url(path);
        self.send_ok(self.request(Method::DELETE, &url))
            .await
            .with_context(|| format!("Failed to delete {path}"))?;
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let (parent, collection_id) = split_collection(collection);
        self.run_query(parent, collection_id, false, query).await
    }

    async fn collection_group(&self, collection_id: &str, query: &Query) -> Result<Vec<Document>> {
        self.run_query("", collection_id, true, query).await
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let body = json!({
            "writes": writes.iter().map(|w| self.encode_write(w)).collect::<Vec<_>>()
        });
        let url = format!("{}:commit", self.root_url());
        self.send_ok(self.request(Method::POST, &url).json(&body))
            .await
            .with_context(|| format!("Failed to commit batch of {} writes", writes.len()))?;
        Ok(())
    }

    fn new_key(&self) -> String {
        self.ids.new_key()
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }
}
