//! Firebase connectors for the collection core.
//!
//! Two REST surfaces back the two traits in [`catalog`]:
//!
//! - [`auth::FirebaseAuth`] implements `IdentityProvider` over the
//!   Identity Toolkit endpoints (`accounts:signUp`,
//!   `accounts:signInWithPassword`);
//! - [`firestore::Firestore`] implements `DocumentStore` over the
//!   Firestore document REST API (`runQuery`, create/patch/delete).
//!
//! The id token minted at sign-in is shared between the two through
//! [`auth::TokenSlot`], so store requests are authorized as the signed-in
//! user and security rules can enforce ownership server-side.

pub mod auth;
pub mod config;
pub mod firestore;
mod values;

pub use auth::{FirebaseAuth, TokenSlot};
pub use config::FirebaseConfig;
pub use firestore::Firestore;
