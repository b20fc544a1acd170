//! In-memory store and identity provider.
//!
//! Test doubles with the same observable behavior as the real connectors:
//! the store evaluates the full query surface (equality filters plus one
//! ordering clause) and supports failure injection; the identity provider
//! publishes session changes on a watch channel.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use shared_types::UserId;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{AuthError, StoreError};
use crate::identity::{AuthState, IdentityProvider};
use crate::store::{Direction, Document, DocumentStore, Query};

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    collections: BTreeMap<String, BTreeMap<String, Value>>,
    fail_next: Option<StoreError>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next store call fail with `err`, whatever it is.
    pub fn fail_next(&self, err: StoreError) {
        self.lock().fail_next = Some(err);
    }

    /// Insert a document with a caller-chosen id, bypassing id assignment.
    pub fn insert_raw(&self, collection: &str, id: &str, fields: Value) {
        self.lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // A poisoned lock only happens after a panic in another test thread.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn execute_query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut inner = self.lock();
        if let Some(err) = inner.fail_next.take() {
            return Err(err);
        }

        let mut documents: Vec<Document> = inner
            .collections
            .get(&query.collection)
            .into_iter()
            .flatten()
            .filter(|(_, fields)| matches_filters(fields, &query.filters))
            .map(|(id, fields)| Document {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect();

        if let Some((field, direction)) = &query.order_by {
            documents.sort_by(|a, b| {
                let ordering = compare_values(&a.fields[field.as_str()], &b.fields[field.as_str()]);
                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        Ok(documents)
    }

    async fn create_document(&self, collection: &str, fields: Value) -> Result<String, StoreError> {
        let mut inner = self.lock();
        if let Some(err) = inner.fail_next.take() {
            return Err(err);
        }

        let id = Uuid::new_v4().to_string();
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        Ok(id)
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        partial: Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(err) = inner.fail_next.take() {
            return Err(err);
        }

        let document = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or(StoreError::NotFound)?;

        if let (Value::Object(target), Value::Object(updates)) = (document, partial) {
            for (field, value) in updates {
                target.insert(field, value);
            }
        }
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(err) = inner.fail_next.take() {
            return Err(err);
        }

        inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

fn matches_filters(fields: &Value, filters: &[(String, Value)]) -> bool {
    filters
        .iter()
        .all(|(field, expected)| fields.get(field) == Some(expected))
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

// ============================================================================
// MemoryIdentity
// ============================================================================

/// In-memory identity provider over a watch channel.
pub struct MemoryIdentity {
    users: Mutex<HashMap<String, (String, UserId)>>,
    session: watch::Sender<AuthState>,
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        let (session, _) = watch::channel(AuthState::Unknown);
        Self {
            users: Mutex::new(HashMap::new()),
            session,
        }
    }
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the provider's restored-session notification.
    pub fn announce_signed_out(&self) {
        let _ = self.session.send(AuthState::SignedOut);
    }

    fn users_lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, UserId)>> {
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.session.subscribe()
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        let mut users = self.users_lock();
        if users.contains_key(email) {
            return Err(AuthError::EmailInUse);
        }
        let user = UserId(Uuid::new_v4().to_string());
        users.insert(email.to_string(), (password.to_string(), user.clone()));
        drop(users);

        let _ = self.session.send(AuthState::SignedIn(user.clone()));
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        let users = self.users_lock();
        let user = match users.get(email) {
            Some((stored, user)) if stored == password => user.clone(),
            _ => return Err(AuthError::InvalidCredential),
        };
        drop(users);

        let _ = self.session.send(AuthState::SignedIn(user.clone()));
        Ok(user)
    }

    async fn sign_in_with_provider(&self, provider: &str) -> Result<UserId, AuthError> {
        // One stable synthetic account per federated provider.
        let user = UserId(format!("{provider}-user"));
        let _ = self.session.send(AuthState::SignedIn(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let _ = self.session.send(AuthState::SignedOut);
        Ok(())
    }
}
