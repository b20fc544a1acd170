use thiserror::Error;

/// Local, pre-network validation failures. These short-circuit before any
/// store call is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("release year is required")]
    MissingReleaseYear,
    #[error("rating must be at most 20 half-star units")]
    RatingOutOfRange,
}

/// Raw failures reported by a document-store connector. Only the gateway
/// sees these; everything above it receives a [`CollectionError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("missing composite index: {0}")]
    MissingIndex(String),
    #[error("document not found")]
    NotFound,
    #[error("{0}")]
    Backend(String),
}

/// User-facing error taxonomy. At most one is visible at a time; a new
/// error replaces the previous one in the notice slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("you do not have permission to modify this collection")]
    PermissionDenied,
    #[error("the collection service is temporarily unavailable")]
    ServiceUnavailable,
    #[error("this sort needs a composite index that is not provisioned yet")]
    IndexMissing,
    #[error("{0}")]
    Unknown(String),
}

/// Identity-provider failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredential,
    #[error("an account with this email already exists")]
    EmailInUse,
    #[error("the sign-in popup was closed before completing")]
    PopupClosed,
    #[error("{0}")]
    Unknown(String),
}
