//! Remote mutation gateway.
//!
//! All store traffic funnels through here: create/update/delete plus the
//! read path that executes built queries. Store-level failures are
//! translated into the user-facing taxonomy in exactly one place, so no
//! caller ever sees a raw connector error.

use chrono::Utc;
use serde_json::Value;
use shared_types::{Movie, MovieDraft, MovieId, MoviePatch, UserId, RATING_MAX_UNITS};
use tracing::{debug, warn};

use crate::error::{CollectionError, StoreError, ValidationError};
use crate::query::MOVIES_COLLECTION;
use crate::store::{Document, DocumentStore, Query};

pub struct MovieGateway<S> {
    store: S,
}

impl<S: DocumentStore> MovieGateway<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist a new movie owned by `owner`. Returns the movie carrying its
    /// store-assigned id and creation timestamp.
    ///
    /// The form machine validates before calling here, but the non-empty
    /// title, present year and rating-bound requirements are re-checked so
    /// the persistence invariants hold for every caller, not just the form.
    pub async fn create(
        &self,
        owner: &UserId,
        draft: &MovieDraft,
    ) -> Result<Movie, CollectionError> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }
        let release_year = draft
            .release_year
            .ok_or(ValidationError::MissingReleaseYear)?;
        if draft.rating > RATING_MAX_UNITS {
            return Err(ValidationError::RatingOutOfRange.into());
        }

        let movie = Movie {
            // Placeholder until the store assigns identity below.
            id: MovieId(String::new()),
            title: title.to_string(),
            release_year,
            received_award: draft.received_award,
            genre: draft.genre.clone(),
            director: draft.director.clone(),
            poster_url: draft.poster_url.clone(),
            rating: draft.rating,
            owner_id: owner.clone(),
            created_at: Utc::now(),
        };

        let fields = fields_of(&movie)?;
        let id = self
            .store
            .create_document(MOVIES_COLLECTION, fields)
            .await
            .map_err(translate)?;
        debug!(id = %id, owner = %owner, "movie created");

        Ok(Movie {
            id: MovieId(id),
            ..movie
        })
    }

    /// Merge the named fields into an existing document. The patch type has
    /// no way to express an `id`, `ownerId` or `createdAt` change.
    pub async fn update(&self, id: &MovieId, patch: &MoviePatch) -> Result<(), CollectionError> {
        if patch.is_empty() {
            return Ok(());
        }
        let partial =
            serde_json::to_value(patch).map_err(|e| CollectionError::Unknown(e.to_string()))?;
        self.store
            .update_document(MOVIES_COLLECTION, id.as_str(), partial)
            .await
            .map_err(translate)
    }

    /// Delete by id. Idempotent from the caller's perspective: a store-level
    /// not-found is treated as success.
    pub async fn delete(&self, id: &MovieId) -> Result<(), CollectionError> {
        match self
            .store
            .delete_document(MOVIES_COLLECTION, id.as_str())
            .await
        {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound) => {
                debug!(id = %id, "delete of absent document treated as success");
                Ok(())
            }
            Err(e) => Err(translate(e)),
        }
    }

    /// Execute a built query, decoding each returned document. A document
    /// that fails to decode is dropped with a warning rather than failing
    /// the whole fetch.
    pub async fn fetch(&self, query: &Query) -> Result<Vec<Movie>, CollectionError> {
        let documents = self.store.execute_query(query).await.map_err(translate)?;
        let mut movies = Vec::with_capacity(documents.len());
        for document in documents {
            let id = document.id.clone();
            match movie_from_document(document) {
                Ok(movie) => movies.push(movie),
                Err(e) => warn!(id = %id, error = %e, "dropping undecodable document"),
            }
        }
        Ok(movies)
    }
}

/// Serialize a movie into store fields. The id is stripped: the store owns
/// document identity and never sees it as a field.
fn fields_of(movie: &Movie) -> Result<Value, CollectionError> {
    let mut value =
        serde_json::to_value(movie).map_err(|e| CollectionError::Unknown(e.to_string()))?;
    if let Value::Object(map) = &mut value {
        map.remove("id");
    }
    Ok(value)
}

fn movie_from_document(document: Document) -> Result<Movie, serde_json::Error> {
    let mut fields = document.fields;
    if let Value::Object(map) = &mut fields {
        map.insert("id".to_string(), Value::String(document.id));
    }
    serde_json::from_value(fields)
}

/// Map raw store failures onto the taxonomy every caller receives.
fn translate(err: StoreError) -> CollectionError {
    match err {
        StoreError::PermissionDenied => CollectionError::PermissionDenied,
        StoreError::Unavailable(msg) => {
            warn!(%msg, "store unavailable");
            CollectionError::ServiceUnavailable
        }
        StoreError::MissingIndex(msg) => {
            // Retryable configuration problem, not a user data problem.
            warn!(%msg, "query needs an unprovisioned composite index");
            CollectionError::IndexMissing
        }
        StoreError::NotFound => CollectionError::Unknown("document no longer exists".to_string()),
        StoreError::Backend(msg) => CollectionError::Unknown(msg),
    }
}
