//! Document-store interface the core consumes.
//!
//! The hosted backend owns persistence, document identity and query
//! execution; this module only defines the shape the core talks to.
//! Concrete connectors live outside this crate (`firebase`), and
//! [`crate::memory::MemoryStore`] backs tests.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// Sort direction for a query's ordering clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A document as the store returns it: the store-assigned id plus a JSON
/// object of fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

/// A remote query: collection name, equality predicates, and at most one
/// ordering clause. Composition is pure and side-effect-free; execution is
/// the store's fallible step.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn where_equals(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }
}

/// Async interface to the hosted document store.
///
/// `delete_document` may report [`StoreError::NotFound`] for an absent id;
/// the gateway treats that as success, so connectors need not special-case
/// it.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn execute_query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Persist a new document; the store assigns and returns its id.
    async fn create_document(&self, collection: &str, fields: Value) -> Result<String, StoreError>;

    /// Merge the named fields into an existing document.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        partial: Value,
    ) -> Result<(), StoreError>;

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}
