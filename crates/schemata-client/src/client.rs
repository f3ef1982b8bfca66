//! Async HTTP client wrapping the schema-manager JSON API.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use schemata_core::{
  store::{SaveAck, SchemaStore},
  version::Version,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Error, Result};

const API_PREFIX: &str = "/api/v1/schema-manager";

/// Connection settings for the schema-manager API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  pub timeout:  Duration,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8000".into(),
      timeout:  Duration::from_secs(30),
    }
  }
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SaveRequest<'a> {
  schema_json:    &'a Value,
  create_version: bool,
  version_notes:  &'a str,
}

#[derive(Default, Deserialize)]
struct SaveResponse {
  #[serde(default)]
  saved_at:   Option<DateTime<Utc>>,
  #[serde(default)]
  version_id: Option<Uuid>,
}

#[derive(Deserialize)]
struct SchemaRecord {
  #[serde(default)]
  versions: Vec<Version>,
}

#[derive(Serialize)]
struct ActivateRequest {
  version_id: Uuid,
}

#[derive(Deserialize)]
struct ErrorBody {
  detail: Value,
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Async HTTP client for the schema-manager REST API.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder().timeout(config.timeout).build()?;
    Ok(Self { client, config })
  }

  pub fn config(&self) -> &ApiConfig { &self.config }

  fn path(schema_id: &str, suffix: &str) -> String {
    format!("/schemas/{schema_id}{suffix}")
  }

  fn url(&self, path: &str) -> String {
    format!(
      "{}{API_PREFIX}{path}",
      self.config.base_url.trim_end_matches('/')
    )
  }

  async fn send(
    &self,
    method: Method,
    path: &str,
    build: impl FnOnce(RequestBuilder) -> RequestBuilder,
  ) -> Result<Response> {
    debug!(%method, path, "request");
    let resp = build(self.client.request(method.clone(), self.url(path)))
      .send()
      .await?;

    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let body = match resp.text().await {
      Ok(body) => body,
      Err(e) => {
        warn!(%method, path, error = %e, "failed to read error body");
        String::new()
      }
    };
    Err(Error::Status {
      method,
      path: path.to_owned(),
      status,
      detail: error_detail(&body),
    })
  }

  async fn body(resp: Response) -> Result<Value> {
    let bytes = resp.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
      return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(&bytes)?)
  }

  // ── Documents ─────────────────────────────────────────────────────────────

  /// `GET /schemas/<id>/json[?version_id=<v>]`
  pub async fn fetch_document(&self, schema_id: &str, version: Option<Uuid>) -> Result<Value> {
    let path = Self::path(schema_id, "/json");
    let resp = self
      .send(Method::GET, &path, |req| match version {
        Some(v) => req.query(&[("version_id", v.to_string())]),
        None => req,
      })
      .await?;
    Ok(unwrap_document(Self::body(resp).await?))
  }

  /// `PUT /schemas/<id>/json`
  pub async fn update_document(
    &self,
    schema_id: &str,
    document: &Value,
    create_version: bool,
    notes: &str,
  ) -> Result<SaveAck> {
    let path = Self::path(schema_id, "/json");
    let request = SaveRequest {
      schema_json: document,
      create_version,
      version_notes: notes,
    };
    let resp = self.send(Method::PUT, &path, |req| req.json(&request)).await?;
    save_ack(Self::body(resp).await?)
  }

  // ── Versions ──────────────────────────────────────────────────────────────

  /// `GET /schemas/<id>` — the schema record, of which only `versions` is read.
  pub async fn fetch_versions(&self, schema_id: &str) -> Result<Vec<Version>> {
    let path = Self::path(schema_id, "");
    let resp = self.send(Method::GET, &path, |req| req).await?;
    let record: SchemaRecord = serde_json::from_value(Self::body(resp).await?)?;
    Ok(record.versions)
  }

  /// `POST /schemas/<id>/activate`
  pub async fn activate(&self, schema_id: &str, version: Uuid) -> Result<()> {
    let path = Self::path(schema_id, "/activate");
    let request = ActivateRequest {
      version_id: version,
    };
    self.send(Method::POST, &path, |req| req.json(&request)).await?;
    Ok(())
  }
}

impl SchemaStore for ApiClient {
  type Error = Error;

  async fn load_document(&self, schema_id: &str, version: Option<Uuid>) -> Result<Value> {
    self.fetch_document(schema_id, version).await
  }

  async fn save_document(
    &self,
    schema_id: &str,
    document: Value,
    create_version: bool,
    notes: Option<String>,
  ) -> Result<SaveAck> {
    self
      .update_document(schema_id, &document, create_version, notes.as_deref().unwrap_or_default())
      .await
  }

  async fn list_versions(&self, schema_id: &str) -> Result<Vec<Version>> {
    self.fetch_versions(schema_id).await
  }

  async fn activate_version(&self, schema_id: &str, version: Uuid) -> Result<()> {
    self.activate(schema_id, version).await
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Decode a save acknowledgement. An empty or non-object body is a bare
/// success; an object whose known fields do not decode is an error.
fn save_ack(body: Value) -> Result<SaveAck> {
  let ack = match body {
    body @ Value::Object(_) => serde_json::from_value(body)?,
    _ => SaveResponse::default(),
  };
  Ok(SaveAck {
    saved_at:   ack.saved_at.unwrap_or_else(Utc::now),
    version_id: ack.version_id,
  })
}

/// Some backend releases wrap the document as `{ "schema_json": .. }`.
fn unwrap_document(body: Value) -> Value {
  match body {
    Value::Object(mut map) if map.contains_key("schema_json") => {
      map.remove("schema_json").unwrap_or(Value::Null)
    }
    other => other,
  }
}

/// The backend's `detail` message, or the raw body when there is none.
fn error_detail(body: &str) -> String {
  match serde_json::from_str::<ErrorBody>(body) {
    Ok(ErrorBody {
      detail: Value::String(s),
    }) => s,
    Ok(ErrorBody { detail }) => detail.to_string(),
    Err(_) if body.trim().is_empty() => "no details".into(),
    Err(_) => body.trim().to_owned(),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn client(base: &str) -> ApiClient {
    ApiClient::new(ApiConfig {
      base_url: base.into(),
      ..ApiConfig::default()
    })
    .unwrap()
  }

  #[test]
  fn urls() {
    let c = client("http://host:8000/");
    assert_eq!(
      c.url(&ApiClient::path("42", "/json")),
      "http://host:8000/api/v1/schema-manager/schemas/42/json"
    );
    assert_eq!(
      c.url(&ApiClient::path("42", "")),
      "http://host:8000/api/v1/schema-manager/schemas/42"
    );
  }

  #[test]
  fn wrapped_documents_are_unwrapped() {
    let doc = json!({ "tables": [] });
    assert_eq!(unwrap_document(json!({ "id": 1, "schema_json": doc.clone() })), doc);
    assert_eq!(unwrap_document(doc.clone()), doc);
  }

  #[test]
  fn detail_messages() {
    assert_eq!(error_detail(r#"{"detail":"Schema not found"}"#), "Schema not found");
    assert_eq!(
      error_detail(r#"{"detail":[{"msg":"field required"}]}"#),
      r#"[{"msg":"field required"}]"#
    );
    assert_eq!(error_detail("Bad Gateway"), "Bad Gateway");
    assert_eq!(error_detail(""), "no details");
  }

  #[test]
  fn save_acknowledgements() {
    let id = "6f1c1f52-58c5-4c55-9d5b-7a7c1a0e7f3e";
    let ack = save_ack(json!({ "version_id": id, "message": "ok" })).unwrap();
    assert_eq!(ack.version_id, Some(Uuid::parse_str(id).unwrap()));

    assert!(save_ack(Value::Null).unwrap().version_id.is_none());
    assert!(save_ack(json!({ "status": "saved" })).unwrap().version_id.is_none());

    let err = save_ack(json!({ "version_id": "not-a-uuid" })).unwrap_err();
    assert!(matches!(err, Error::Json(_)));
  }

  #[test]
  fn save_request_body() {
    let doc = json!({ "tables": [] });
    let body = serde_json::to_value(SaveRequest {
      schema_json:    &doc,
      create_version: true,
      version_notes:  "add orders",
    })
    .unwrap();
    assert_eq!(
      body,
      json!({ "schema_json": { "tables": [] }, "create_version": true, "version_notes": "add orders" })
    );
  }

  #[test]
  fn version_listing() {
    let record: SchemaRecord = serde_json::from_value(json!({
      "id": 7,
      "name": "equities",
      "versions": [
        { "id": "6f1c1f52-58c5-4c55-9d5b-7a7c1a0e7f3e", "version_number": 1,
          "status": "active", "created_at": "2024-05-01T12:00:00Z" }
      ]
    }))
    .unwrap();
    assert_eq!(record.versions.len(), 1);
    assert!(record.versions[0].is_active());
  }

  #[tokio::test]
  async fn unreachable_backend_is_an_http_error() {
    let c = client("http://127.0.0.1:1");
    let err = c.fetch_document("1", None).await.unwrap_err();
    assert!(matches!(err, Error::Http(_)));
  }
}
