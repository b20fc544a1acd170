//! Pure construction of the owner-scoped remote query.

use shared_types::{SortSpec, UserId, FIELD_OWNER_ID};

use crate::store::{Direction, Query};

/// Name of the remote collection holding movies.
pub const MOVIES_COLLECTION: &str = "movies";

/// Build the remote query for one user's collection under the given sort:
/// an equality predicate on the owner plus exactly one ordering clause.
///
/// Taking `&UserId` makes "no query without an identity" a type-level
/// guarantee. Award filter and free-text search are deliberately not remote
/// predicates — both are optional and change often, and pushing them remote
/// would need a composite index per sort×filter combination; single-user
/// collections are small enough to filter client-side (see the reconciler).
pub fn movies_query(owner: &UserId, sort: SortSpec) -> Query {
    Query::collection(MOVIES_COLLECTION)
        .where_equals(FIELD_OWNER_ID, owner.as_str())
        .order_by(sort.field(), direction_of(sort))
}

fn direction_of(sort: SortSpec) -> Direction {
    if sort.descending() {
        Direction::Descending
    } else {
        Direction::Ascending
    }
}
