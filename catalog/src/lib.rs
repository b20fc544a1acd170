//! Client-side core for a remotely persisted movie collection.
//!
//! The remote store is the source of truth for persistence; this crate owns
//! everything that keeps the client consistent with it:
//!
//! - [`identity`] — session tracking over an identity-provider stream
//! - [`query`] — pure construction of owner-scoped remote queries
//! - [`gateway`] — create/update/delete/fetch with one error taxonomy
//! - [`state`] — the local view reconciler and form/edit state machine
//! - [`client`] — async driver tying state, gateway and identity together
//!
//! Mutations apply their effect to the cached view directly instead of
//! re-fetching, so persistence latency is paid once per action.

pub mod client;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod memory;
pub mod query;
pub mod state;
pub mod store;

pub use client::CollectionClient;
pub use error::{AuthError, CollectionError, StoreError, ValidationError};
pub use gateway::MovieGateway;
pub use identity::{AuthState, IdentityProvider};
pub use memory::{MemoryIdentity, MemoryStore};
pub use shared_types::{AwardFilter, Movie, MovieDraft, MovieId, MoviePatch, SortSpec, UserId};
pub use state::{CollectionState, FormMode, Notice};
pub use store::{Direction, Document, DocumentStore, Query};
