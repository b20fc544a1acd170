//! Data model shared between the collection core and the presentation layer
//!
//! These types are used by both:
//! - the `catalog` client core (native Rust)
//! - the browser presentation layer (via generated TypeScript)
//!
//! Serializable with serde; field names are camelCase on the wire so the
//! documents match what the hosted store holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque document-store identifier for a movie. Assigned by the store on
/// creation and immutable thereafter; a movie has no id before persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, TS)]
#[ts(export, export_to = "../web/src/types/generated.ts")]
pub struct MovieId(pub String);

impl MovieId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MovieId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity-provider user id. The sole isolation boundary between users'
/// collections: every query carries an equality predicate on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, TS)]
#[ts(export, export_to = "../web/src/types/generated.ts")]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Movies
// ============================================================================

/// Ratings are stored in doubled half-star units: 10 stars == 20 units.
pub const RATING_MAX_UNITS: u8 = 20;

/// Store field names referenced by remote queries and update masks.
pub const FIELD_OWNER_ID: &str = "ownerId";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_RELEASE_YEAR: &str = "releaseYear";
pub const FIELD_RATING: &str = "rating";

/// A persisted movie, as the remote collection holds it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../web/src/types/generated.ts")]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub release_year: i32,
    #[serde(default)]
    pub received_award: bool,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub director: String,
    #[serde(default)]
    pub poster_url: String,
    /// Half-star units, 0..=[`RATING_MAX_UNITS`].
    #[serde(default)]
    pub rating: u8,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Form payload for creating or editing a movie. Carries every editable
/// field and nothing the store or the gateway owns (`id`, `ownerId`,
/// `createdAt`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../web/src/types/generated.ts")]
pub struct MovieDraft {
    pub title: String,
    pub release_year: Option<i32>,
    pub received_award: bool,
    pub genre: String,
    pub director: String,
    pub poster_url: String,
    pub rating: u8,
}

/// Partial update: only named fields are merged into the document. There is
/// deliberately no way to express an `id`, `ownerId` or `createdAt` change.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../web/src/types/generated.ts")]
pub struct MoviePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_award: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub director: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
}

impl MoviePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.release_year.is_none()
            && self.received_award.is_none()
            && self.genre.is_none()
            && self.director.is_none()
            && self.poster_url.is_none()
            && self.rating.is_none()
    }
}

// ============================================================================
// Query state
// ============================================================================

/// Ordering applied by the remote query (and maintained by the local cache
/// between fetches). Exactly one clause is ever active.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export, export_to = "../web/src/types/generated.ts")]
pub enum SortSpec {
    #[default]
    TitleAsc,
    TitleDesc,
    YearAsc,
    YearDesc,
    RatingDesc,
}

impl SortSpec {
    /// Store field the ordering clause refers to.
    pub fn field(self) -> &'static str {
        match self {
            SortSpec::TitleAsc | SortSpec::TitleDesc => FIELD_TITLE,
            SortSpec::YearAsc | SortSpec::YearDesc => FIELD_RELEASE_YEAR,
            SortSpec::RatingDesc => FIELD_RATING,
        }
    }

    pub fn descending(self) -> bool {
        matches!(
            self,
            SortSpec::TitleDesc | SortSpec::YearDesc | SortSpec::RatingDesc
        )
    }
}

/// Award-status filter, applied client-side (see the reconciler for why it
/// is not a remote predicate).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export, export_to = "../web/src/types/generated.ts")]
pub enum AwardFilter {
    #[default]
    All,
    Winners,
    NonWinners,
}

// ============================================================================
// Tests
// ============================================================================
