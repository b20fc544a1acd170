//! `DocumentStore` connector for the Firestore REST API.
//!
//! Reads go through `:runQuery` with a structured query; writes use the
//! document endpoints (`POST` to create, `PATCH` with an update mask to
//! merge, `DELETE` to remove). Every request carries the signed-in user's
//! id token so security rules evaluate ownership server-side.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use catalog::{Direction, Document, DocumentStore, Query, StoreError};

use crate::auth::TokenSlot;
use crate::config::FirebaseConfig;
use crate::values::{decode_fields, encode_fields};

pub struct Firestore {
    config: FirebaseConfig,
    client: reqwest::Client,
    token: TokenSlot,
}

impl Firestore {
    pub fn new(config: FirebaseConfig, token: TokenSlot) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::Backend(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            config,
            client,
            token,
        })
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{collection}/{id}", self.config.firestore_base())
    }

    async fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.get().await {
            Some(id_token) => request.bearer_auth(id_token),
            None => request,
        }
    }

    /// Run a request and map non-success statuses onto the store error
    /// taxonomy. Returns the response body as JSON on success.
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Value, StoreError> {
        let response = self
            .authorize(request)
            .await
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(status_to_store_error(status.as_u16(), &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| StoreError::Backend(format!("Malformed response body: {e}")))
    }
}

#[async_trait]
impl DocumentStore for Firestore {
    async fn execute_query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let url = format!("{}:runQuery", self.config.firestore_base());
        let body = json!({ "structuredQuery": structured_query(query) });
        let results = self.execute(self.client.post(&url).json(&body)).await?;

        // runQuery streams an array of result entries; entries without a
        // `document` key carry read metadata only.
        let entries = results.as_array().cloned().unwrap_or_default();
        let mut documents = Vec::new();
        for entry in &entries {
            if let Some(doc) = entry.get("document") {
                documents.push(parse_document(doc)?);
            }
        }
        debug!(
            collection = %query.collection,
            count = documents.len(),
            "query executed"
        );
        Ok(documents)
    }

    async fn create_document(&self, collection: &str, fields: Value) -> Result<String, StoreError> {
        let url = format!("{}/{collection}", self.config.firestore_base());
        let body = json!({ "fields": encoded(&fields)? });
        let created = self.execute(self.client.post(&url).json(&body)).await?;

        let name = created
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Backend("Create response missing name".to_string()))?;
        Ok(id_from_name(name).to_string())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        partial: Value,
    ) -> Result<(), StoreError> {
        let encoded = encoded(&partial)?;
        // The update mask restricts the write to the named fields; without
        // it, PATCH replaces the whole document.
        let mask: Vec<(String, String)> = encoded
            .keys()
            .map(|k| ("updateMask.fieldPaths".to_string(), k.clone()))
            .collect();
        let url = self.document_url(collection, id);
        let body = json!({ "fields": encoded });
        self.execute(self.client.patch(&url).query(&mask).json(&body))
            .await?;
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let url = self.document_url(collection, id);
        self.execute(self.client.delete(&url)).await?;
        Ok(())
    }
}

/// Build the `structuredQuery` body for a composed query. Multiple equality
/// predicates compose under an AND filter.
fn structured_query(query: &Query) -> Value {
    let mut body = json!({
        "from": [{ "collectionId": query.collection }]
    });

    let filters: Vec<Value> = query
        .filters
        .iter()
        .map(|(field, value)| {
            json!({
                "fieldFilter": {
                    "field": { "fieldPath": field },
                    "op": "EQUAL",
                    "value": crate::values::encode_value(value)
                }
            })
        })
        .collect();
    match filters.len() {
        0 => {}
        1 => body["where"] = filters.into_iter().next().unwrap_or_default(),
        _ => {
            body["where"] = json!({
                "compositeFilter": { "op": "AND", "filters": filters }
            });
        }
    }

    if let Some((field, direction)) = &query.order_by {
        let direction = match direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        body["orderBy"] = json!([{
            "field": { "fieldPath": field },
            "direction": direction
        }]);
    }
    body
}

fn parse_document(doc: &Value) -> Result<Document, StoreError> {
    let name = doc
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Backend("Document missing name".to_string()))?;
    let fields = doc
        .get("fields")
        .and_then(Value::as_object)
        .map(decode_fields)
        .unwrap_or_default();
    Ok(Document {
        id: id_from_name(name).to_string(),
        fields: Value::Object(fields),
    })
}

/// Document ids are the last segment of the resource name
/// `projects/{p}/databases/(default)/documents/{collection}/{id}`.
fn id_from_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn encoded(fields: &Value) -> Result<serde_json::Map<String, Value>, StoreError> {
    let object = fields
        .as_object()
        .ok_or_else(|| StoreError::Backend("Document fields must be an object".to_string()))?;
    Ok(encode_fields(object))
}

/// Map a Firestore REST failure onto the store taxonomy. The interesting
/// case is a rejected composite query: Firestore reports the missing index
/// as FAILED_PRECONDITION with a console link in the message.
fn status_to_store_error(status: u16, body: &str) -> StoreError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get(0).and_then(|e| e.get("error")))
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        401 | 403 => StoreError::PermissionDenied,
        404 => StoreError::NotFound,
        400 if message.to_ascii_lowercase().contains("index") => StoreError::MissingIndex(message),
        429 | 500 | 502 | 503 | 504 => StoreError::Unavailable(message),
        _ => StoreError::Backend(format!("HTTP {status}: {message}")),
    }
}
