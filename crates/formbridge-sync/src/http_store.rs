//! HTTP gateway to the external no-code store.
//!
//! The store's read API returns one JSON object per form, keyed by record
//! id, with a `_metaData` entry interleaved; writes go through POST/DELETE
//! on the record path. Every call carries the bounded timeout from the
//! global settings; exceeding it is reported to the engine as a per-record
//! failure, never as a fatal error for the run.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use formbridge_registry::GlobalSettings;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{SyncError, SyncOpResult};
use crate::store::{ExternalFields, ExternalRecord, ExternalStore};

/// Metadata entry interleaved with records in list responses.
const META_DATA_KEY: &str = "_metaData";
/// Response key carrying the id of a created record.
const RECORD_ID_KEY: &str = "_recordId";
/// Optional per-record modification timestamp field.
const MODIFIED_AT_KEY: &str = "_lastModified";

/// [`ExternalStore`] implementation backed by the store's HTTP API.
pub struct HttpExternalStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    naming: String,
    timeout_secs: u64,
}

impl HttpExternalStore {
    /// Build a client from the registry's global settings and an
    /// already-resolved API key.
    pub fn new(settings: &GlobalSettings, api_key: Option<String>) -> SyncOpResult<Self> {
        let timeout_secs = settings.default_timeout_secs;
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SyncError::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            api_key,
            naming: settings.naming.clone(),
            timeout_secs,
        })
    }

    fn url(&self, path: &str, record_id: Option<&str>) -> String {
        match record_id {
            Some(id) => format!("{}{}/{id}", self.base_url, path),
            None => format!("{}{}", self.base_url, path),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Basic {key}")),
            None => request,
        }
    }

    fn map_send_error(&self, error: reqwest::Error) -> SyncError {
        if error.is_timeout() {
            SyncError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            SyncError::transport(error.to_string())
        }
    }

    async fn check_status(response: Response) -> SyncOpResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(SyncError::UnexpectedStatus {
            status: status.as_u16(),
            message,
        })
    }

    fn parse_record(id: &str, value: &Value) -> Option<ExternalRecord> {
        let fields = value.as_object()?.clone();
        let modified_at = Self::parse_modified_at(&fields);
        Some(ExternalRecord {
            id: id.to_string(),
            fields,
            modified_at,
        })
    }

    fn parse_modified_at(fields: &ExternalFields) -> Option<DateTime<Utc>> {
        fields
            .get(MODIFIED_AT_KEY)
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[async_trait]
impl ExternalStore for HttpExternalStore {
    #[instrument(skip(self))]
    async fn fetch_all(&self, path: &str) -> SyncOpResult<Vec<ExternalRecord>> {
        let response = self
            .authorize(self.client.get(self.url(path, None)))
            .query(&[("api", ""), ("naming", &self.naming)])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| SyncError::transport(format!("unparsable list response: {e}")))?;
        let object = body
            .as_object()
            .ok_or_else(|| SyncError::transport("list response is not a JSON object"))?;

        let mut records = Vec::with_capacity(object.len());
        for (id, value) in object {
            if id == META_DATA_KEY {
                continue;
            }
            match Self::parse_record(id, value) {
                Some(record) => records.push(record),
                None => warn!(record_id = %id, "skipping non-object record in list response"),
            }
        }
        debug!(path, count = records.len(), "fetched records");
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn fetch_one(&self, path: &str, record_id: &str) -> SyncOpResult<Option<ExternalRecord>> {
        let response = self
            .authorize(self.client.get(self.url(path, Some(record_id))))
            .query(&[("api", ""), ("naming", &self.naming)])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_status(response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| SyncError::transport(format!("unparsable record response: {e}")))?;
        match body.as_object() {
            Some(fields) if !fields.is_empty() => {
                Ok(Self::parse_record(record_id, &Value::Object(fields.clone())))
            }
            _ => Ok(None),
        }
    }

    #[instrument(skip(self, fields))]
    async fn create(&self, path: &str, fields: &ExternalFields) -> SyncOpResult<String> {
        let response = self
            .authorize(self.client.post(self.url(path, None)))
            .query(&[("api", "")])
            .json(fields)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| SyncError::transport(format!("unparsable create response: {e}")))?;
        body.get(RECORD_ID_KEY)
            .and_then(|value| match value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| SyncError::transport("create response carries no record id"))
    }

    #[instrument(skip(self, fields))]
    async fn update(
        &self,
        path: &str,
        record_id: &str,
        fields: &ExternalFields,
    ) -> SyncOpResult<()> {
        let response = self
            .authorize(self.client.post(self.url(path, Some(record_id))))
            .query(&[("api", "")])
            .json(fields)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        Self::check_status(response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, path: &str, record_id: &str) -> SyncOpResult<bool> {
        let response = self
            .authorize(self.client.delete(self.url(path, Some(record_id))))
            .query(&[("api", "")])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check_status(response).await?;
        Ok(true)
    }
}
