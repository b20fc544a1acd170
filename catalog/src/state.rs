//! Local view reconciler, session-scoped collection state, and the
//! form/edit state machine.
//!
//! Everything here is synchronous. Remote work happens elsewhere: each
//! operation is a `begin_*` (validation gate, ticket issue) / `*_completed`
//! (apply effect to the cached view) pair, and the async driver in
//! [`crate::client`] runs the store call between the two. Completions are
//! applied in the order they arrive; two guards make that safe:
//!
//! - every ticket carries the auth epoch current at begin time, and a
//!   completion whose epoch no longer matches is discarded — a fetch still
//!   in flight at sign-out can never leak a previous user's rows;
//! - mutations carry a monotonic version, and a completion older than the
//!   entity's last applied version is discarded, so rapid repeated edits to
//!   the same entity cannot regress.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use shared_types::{
    AwardFilter, Movie, MovieDraft, MovieId, MoviePatch, SortSpec, UserId, RATING_MAX_UNITS,
};
use tracing::{debug, warn};

use crate::error::{CollectionError, ValidationError};
use crate::identity::AuthState;

/// How long a success notice stays visible before [`CollectionState::prune_notice`]
/// drops it.
pub const SUCCESS_NOTICE_TTL_SECS: i64 = 4;

/// The single visible notice slot: at most one error or success at a time;
/// a new notice replaces the old.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Error(CollectionError),
    Success {
        message: String,
        shown_at: DateTime<Utc>,
    },
}

/// Create vs. edit-in-place mode for the movie form. The tagged variant
/// makes "both populated at once" unrepresentable, and at most one entity
/// can be in `Editing` at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FormMode {
    #[default]
    Idle,
    Editing { id: MovieId, draft: MovieDraft },
}

// ============================================================================
// Completion tickets
// ============================================================================

/// Issued by [`CollectionState::auth_changed`] and [`CollectionState::set_sort`];
/// redeemed by [`CollectionState::refresh_completed`].
#[derive(Debug, Clone, Copy)]
pub struct RefreshTicket {
    pub(crate) epoch: u64,
    /// The fetch a fresh sign-in schedules. Its errors are suppressed from
    /// display so the sign-in transition never flashes a spurious error.
    pub(crate) initial: bool,
}

#[derive(Debug, Clone)]
pub struct CreateTicket {
    pub(crate) epoch: u64,
}

#[derive(Debug, Clone)]
pub struct UpdateTicket {
    pub(crate) epoch: u64,
    pub(crate) id: MovieId,
    pub(crate) patch: MoviePatch,
    pub(crate) version: u64,
}

impl UpdateTicket {
    pub fn id(&self) -> &MovieId {
        &self.id
    }

    pub fn patch(&self) -> &MoviePatch {
        &self.patch
    }
}

#[derive(Debug, Clone)]
pub struct DeleteTicket {
    pub(crate) epoch: u64,
    pub(crate) id: MovieId,
}

impl DeleteTicket {
    pub fn id(&self) -> &MovieId {
        &self.id
    }
}

// ============================================================================
// CollectionState
// ============================================================================

/// The client's working copy of the collection plus everything the
/// presentation layer binds to: auth state, sort/search/filter knobs, the
/// create form draft, the edit machine, and the notice slot.
///
/// The cache is mutated only through `&mut self`, which is the whole
/// locking story: one logical thread of control, no locks.
#[derive(Debug, Default)]
pub struct CollectionState {
    auth: AuthState,
    auth_epoch: u64,
    movies: Vec<Movie>,
    /// Last applied mutation version per entity; the lost-update guard.
    versions: HashMap<MovieId, u64>,
    mutation_clock: u64,
    sort: SortSpec,
    search: String,
    award_filter: AwardFilter,
    form: FormMode,
    draft: MovieDraft,
    notice: Option<Notice>,
}

impl CollectionState {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn current_user(&self) -> Option<&UserId> {
        self.auth.user()
    }

    /// The full cached sequence, remote-sorted and owner-scoped.
    pub fn movies(&self) -> &[Movie] {
        &self.movies
    }

    pub fn sort(&self) -> SortSpec {
        self.sort
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn award_filter(&self) -> AwardFilter {
        self.award_filter
    }

    pub fn form(&self) -> &FormMode {
        &self.form
    }

    /// Create-form field values, for presentation binding.
    pub fn draft(&self) -> &MovieDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut MovieDraft {
        &mut self.draft
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// The filtered/searched subsequence for presentation: case-insensitive
    /// substring match over title, genre and director, plus the award
    /// tri-state. Recomputed on every call, never cached, and never touches
    /// the underlying sequence.
    pub fn visible(&self) -> Vec<&Movie> {
        let needle = self.search.trim().to_lowercase();
        self.movies
            .iter()
            .filter(|movie| match self.award_filter {
                AwardFilter::All => true,
                AwardFilter::Winners => movie.received_award,
                AwardFilter::NonWinners => !movie.received_award,
            })
            .filter(|movie| needle.is_empty() || matches_search(movie, &needle))
            .collect()
    }

    // ------------------------------------------------------------------
    // Session tracking
    // ------------------------------------------------------------------

    /// Apply an identity-provider notification. Any transition clears the
    /// previous identity's data immediately — a signed-out cache is empty
    /// at the instant of sign-out, not when some fetch completes. A
    /// transition into signed-in returns the ticket for exactly one initial
    /// population.
    pub fn auth_changed(&mut self, user: Option<UserId>) -> Option<RefreshTicket> {
        let next = match user {
            Some(user) => AuthState::SignedIn(user),
            None => AuthState::SignedOut,
        };
        if next == self.auth {
            return None;
        }

        self.auth = next;
        self.auth_epoch += 1;
        self.movies.clear();
        self.versions.clear();
        self.form = FormMode::Idle;
        self.draft = MovieDraft::default();
        self.notice = None;

        match &self.auth {
            AuthState::SignedIn(user) => {
                debug!(user = %user, "signed in, scheduling initial fetch");
                Some(RefreshTicket {
                    epoch: self.auth_epoch,
                    initial: true,
                })
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Query-state knobs
    // ------------------------------------------------------------------

    /// Change the sort order. The cache is re-sorted immediately so the
    /// ordering invariant holds even if the re-issued remote query fails;
    /// the returned ticket re-fetches under the new ordering when signed in.
    pub fn set_sort(&mut self, sort: SortSpec) -> Option<RefreshTicket> {
        if sort == self.sort {
            return None;
        }
        self.sort = sort;
        self.resort();

        self.current_user().is_some().then_some(RefreshTicket {
            epoch: self.auth_epoch,
            initial: false,
        })
    }

    /// Ticket for a caller-requested re-fetch under the current query.
    /// Unlike the fetch a sign-in schedules, its errors are surfaced.
    pub fn begin_refresh(&mut self) -> Option<RefreshTicket> {
        self.current_user().is_some().then_some(RefreshTicket {
            epoch: self.auth_epoch,
            initial: false,
        })
    }

    /// Local only — search never touches the remote query.
    pub fn set_search(&mut self, term: impl Into<String>) {
        self.search = term.into();
    }

    /// Local only — see [`crate::query::movies_query`] for why.
    pub fn set_award_filter(&mut self, filter: AwardFilter) {
        self.award_filter = filter;
    }

    pub fn refresh_completed(
        &mut self,
        ticket: RefreshTicket,
        result: Result<Vec<Movie>, CollectionError>,
    ) {
        if ticket.epoch != self.auth_epoch {
            debug!("dropping fetch completion from a previous session");
            return;
        }

        match result {
            Ok(movies) => {
                let movies = self.owned_only(movies);
                self.movies = movies;
                self.versions.clear();
                self.resort();
                self.notice = None;
            }
            Err(e) if ticket.initial => {
                debug!(error = %e, "suppressing error from sign-in fetch");
            }
            Err(e) => self.notice = Some(Notice::Error(e)),
        }
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Validation gate for the create form. A violation sets the notice and
    /// returns synchronously; no ticket, no network call.
    pub fn begin_create(&mut self) -> Result<CreateTicket, ValidationError> {
        if let Err(e) = validate(&self.draft) {
            self.notice = Some(Notice::Error(e.clone().into()));
            return Err(e);
        }
        Ok(CreateTicket {
            epoch: self.auth_epoch,
        })
    }

    /// Append the persisted movie (now carrying its assigned id) and
    /// re-apply the sort comparator in place — no re-fetch.
    pub fn create_completed(&mut self, ticket: CreateTicket, result: Result<Movie, CollectionError>) {
        if ticket.epoch != self.auth_epoch {
            debug!("dropping create completion from a previous session");
            return;
        }

        match result {
            Ok(movie) => {
                self.draft = MovieDraft::default();
                self.upsert(movie);
                self.success("movie added");
            }
            Err(e) => self.notice = Some(Notice::Error(e)),
        }
    }

    // ------------------------------------------------------------------
    // Edit machine
    // ------------------------------------------------------------------

    /// `Idle -> Editing(id)`: snapshot the target's fields into the edit
    /// draft. Returns false when the id is not in the cache.
    pub fn edit_start(&mut self, id: &MovieId) -> bool {
        let Some(movie) = self.movies.iter().find(|m| m.id == *id) else {
            return false;
        };
        self.form = FormMode::Editing {
            id: id.clone(),
            draft: draft_of(movie),
        };
        true
    }

    /// `Editing(id) -> Idle` without a store call; edits are discarded.
    pub fn edit_cancel(&mut self) {
        self.form = FormMode::Idle;
    }

    /// Edit-form field values, when an edit is in progress.
    pub fn edit_draft_mut(&mut self) -> Option<&mut MovieDraft> {
        match &mut self.form {
            FormMode::Editing { draft, .. } => Some(draft),
            FormMode::Idle => None,
        }
    }

    /// Validation gate for saving the in-progress edit. Issues a versioned
    /// ticket carrying only the fields that differ from the cached entry,
    /// so the update mask and the re-sort decision both see real changes.
    pub fn begin_save(&mut self) -> Result<UpdateTicket, CollectionError> {
        let FormMode::Editing { id, draft } = &self.form else {
            return Err(CollectionError::Unknown("no edit in progress".to_string()));
        };
        if let Err(e) = validate(draft) {
            self.notice = Some(Notice::Error(e.clone().into()));
            return Err(e.into());
        }

        let patch = match self.movies.iter().find(|m| m.id == *id) {
            Some(movie) => diff_of(movie, draft),
            // Entity vanished from the cache mid-edit; persist everything
            // and let the store decide whether the document still exists.
            None => full_patch_of(draft),
        };

        self.mutation_clock += 1;
        Ok(UpdateTicket {
            epoch: self.auth_epoch,
            id: id.clone(),
            patch,
            version: self.mutation_clock,
        })
    }

    /// Replace the matching entry's mutated fields by id; re-sort only if
    /// the active sort's key was among them. A completion for an entity
    /// that was deleted meanwhile is a no-op (mutation is keyed by id, not
    /// position).
    pub fn update_completed(&mut self, ticket: UpdateTicket, result: Result<(), CollectionError>) {
        if ticket.epoch != self.auth_epoch {
            debug!("dropping update completion from a previous session");
            return;
        }

        match result {
            Ok(()) => {
                if self
                    .versions
                    .get(&ticket.id)
                    .is_some_and(|&applied| applied > ticket.version)
                {
                    debug!(id = %ticket.id, "discarding stale update completion");
                } else {
                    self.versions.insert(ticket.id.clone(), ticket.version);
                    if let Some(movie) = self.movies.iter_mut().find(|m| m.id == ticket.id) {
                        apply_patch(movie, &ticket.patch);
                        if touches_sort_key(&ticket.patch, self.sort) {
                            self.resort();
                        }
                    }
                }
                // Save success closes the edit form for this entity.
                if matches!(&self.form, FormMode::Editing { id, .. } if *id == ticket.id) {
                    self.form = FormMode::Idle;
                }
                self.success("movie updated");
            }
            Err(e) => self.notice = Some(Notice::Error(e)),
        }
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    pub fn begin_delete(&mut self, id: &MovieId) -> DeleteTicket {
        self.mutation_clock += 1;
        DeleteTicket {
            epoch: self.auth_epoch,
            id: id.clone(),
        }
    }

    /// Remove the matching entry by id, irreversibly. Removing an id that
    /// is already gone leaves the cache unchanged.
    pub fn delete_completed(&mut self, ticket: DeleteTicket, result: Result<(), CollectionError>) {
        if ticket.epoch != self.auth_epoch {
            debug!("dropping delete completion from a previous session");
            return;
        }

        match result {
            Ok(()) => {
                self.movies.retain(|m| m.id != ticket.id);
                self.versions.remove(&ticket.id);
                if matches!(&self.form, FormMode::Editing { id, .. } if *id == ticket.id) {
                    self.form = FormMode::Idle;
                }
                self.success("movie deleted");
            }
            Err(e) => self.notice = Some(Notice::Error(e)),
        }
    }

    // ------------------------------------------------------------------
    // Notice slot
    // ------------------------------------------------------------------

    /// Drop an expired success notice. Errors stay until replaced.
    pub fn prune_notice(&mut self, now: DateTime<Utc>) {
        if let Some(Notice::Success { shown_at, .. }) = &self.notice {
            if now - *shown_at >= Duration::seconds(SUCCESS_NOTICE_TTL_SECS) {
                self.notice = None;
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn success(&mut self, message: &str) {
        self.notice = Some(Notice::Success {
            message: message.to_string(),
            shown_at: Utc::now(),
        });
    }

    /// Defensive owner check on cache population: the remote predicate
    /// already scopes to the owner, but a foreign-owned row must never make
    /// it into the cache regardless.
    fn owned_only(&self, movies: Vec<Movie>) -> Vec<Movie> {
        let Some(user) = self.current_user() else {
            return Vec::new();
        };
        movies
            .into_iter()
            .filter(|movie| {
                if movie.owner_id == *user {
                    true
                } else {
                    warn!(id = %movie.id, "dropping foreign-owned document from fetch result");
                    false
                }
            })
            .collect()
    }

    /// Insert or replace by id — the cache never holds two entries with the
    /// same id — then re-apply the full comparator in place.
    fn upsert(&mut self, movie: Movie) {
        if let Some(existing) = self.movies.iter_mut().find(|m| m.id == movie.id) {
            *existing = movie;
        } else {
            self.movies.push(movie);
        }
        self.resort();
    }

    fn resort(&mut self) {
        let sort = self.sort;
        self.movies.sort_by(|a, b| compare(sort, a, b));
    }
}

/// Total order for the active sort specification. Stable sorting preserves
/// fetch order between equal keys.
pub fn compare(sort: SortSpec, a: &Movie, b: &Movie) -> std::cmp::Ordering {
    match sort {
        SortSpec::TitleAsc => a.title.cmp(&b.title),
        SortSpec::TitleDesc => b.title.cmp(&a.title),
        SortSpec::YearAsc => a.release_year.cmp(&b.release_year),
        SortSpec::YearDesc => b.release_year.cmp(&a.release_year),
        SortSpec::RatingDesc => b.rating.cmp(&a.rating),
    }
}

fn matches_search(movie: &Movie, needle: &str) -> bool {
    [&movie.title, &movie.genre, &movie.director]
        .into_iter()
        .any(|haystack| haystack.to_lowercase().contains(needle))
}

fn validate(draft: &MovieDraft) -> Result<(), ValidationError> {
    if draft.title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if draft.release_year.is_none() {
        return Err(ValidationError::MissingReleaseYear);
    }
    if draft.rating > RATING_MAX_UNITS {
        return Err(ValidationError::RatingOutOfRange);
    }
    Ok(())
}

fn draft_of(movie: &Movie) -> MovieDraft {
    MovieDraft {
        title: movie.title.clone(),
        release_year: Some(movie.release_year),
        received_award: movie.received_award,
        genre: movie.genre.clone(),
        director: movie.director.clone(),
        poster_url: movie.poster_url.clone(),
        rating: movie.rating,
    }
}

/// Patch of the edit draft's fields that differ from the cached movie.
/// Identity fields are not expressible.
fn diff_of(movie: &Movie, draft: &MovieDraft) -> MoviePatch {
    let title = draft.title.trim();
    MoviePatch {
        title: (title != movie.title).then(|| title.to_string()),
        release_year: draft.release_year.filter(|y| *y != movie.release_year),
        received_award: (draft.received_award != movie.received_award)
            .then_some(draft.received_award),
        genre: (draft.genre != movie.genre).then(|| draft.genre.clone()),
        director: (draft.director != movie.director).then(|| draft.director.clone()),
        poster_url: (draft.poster_url != movie.poster_url).then(|| draft.poster_url.clone()),
        rating: (draft.rating != movie.rating).then_some(draft.rating),
    }
}

/// Full patch of every editable field, for when there is no cached entry
/// to diff against.
fn full_patch_of(draft: &MovieDraft) -> MoviePatch {
    MoviePatch {
        title: Some(draft.title.trim().to_string()),
        release_year: draft.release_year,
        received_award: Some(draft.received_award),
        genre: Some(draft.genre.clone()),
        director: Some(draft.director.clone()),
        poster_url: Some(draft.poster_url.clone()),
        rating: Some(draft.rating),
    }
}

fn apply_patch(movie: &mut Movie, patch: &MoviePatch) {
    if let Some(title) = &patch.title {
        movie.title = title.clone();
    }
    if let Some(year) = patch.release_year {
        movie.release_year = year;
    }
    if let Some(received) = patch.received_award {
        movie.received_award = received;
    }
    if let Some(genre) = &patch.genre {
        movie.genre = genre.clone();
    }
    if let Some(director) = &patch.director {
        movie.director = director.clone();
    }
    if let Some(url) = &patch.poster_url {
        movie.poster_url = url.clone();
    }
    if let Some(rating) = patch.rating {
        movie.rating = rating;
    }
}

fn touches_sort_key(patch: &MoviePatch, sort: SortSpec) -> bool {
    match sort {
        SortSpec::TitleAsc | SortSpec::TitleDesc => patch.title.is_some(),
        SortSpec::YearAsc | SortSpec::YearDesc => patch.release_year.is_some(),
        SortSpec::RatingDesc => patch.rating.is_some(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(id: &str, title: &str, year: i32, rating: u8) -> Movie {
        Movie {
            id: MovieId(id.to_string()),
            title: title.to_string(),
            release_year: year,
            received_award: false,
            genre: String::new(),
            director: String::new(),
            poster_url: String::new(),
            rating,
            owner_id: UserId("u1".to_string()),
            created_at: Utc::now(),
        }
    }

    fn signed_in_state(movies: Vec<Movie>) -> CollectionState {
        let mut state = CollectionState::new();
        let ticket = state
            .auth_changed(Some(UserId("u1".to_string())))
            .expect("sign-in schedules a fetch");
        state.refresh_completed(ticket, Ok(movies));
        state
    }

    fn is_sorted_by(movies: &[Movie], sort: SortSpec) -> bool {
        movies
            .windows(2)
            .all(|pair| compare(sort, &pair[0], &pair[1]) != std::cmp::Ordering::Greater)
    }

    #[test]
    fn test_cache_ordered_after_fetch_create_update() {
        for sort in [
            SortSpec::TitleAsc,
            SortSpec::TitleDesc,
            SortSpec::YearAsc,
            SortSpec::YearDesc,
            SortSpec::RatingDesc,
        ] {
            let mut state = signed_in_state(vec![
                movie("1", "Beta", 2001, 10),
                movie("2", "Alpha", 1999, 4),
                movie("3", "Gamma", 2010, 16),
            ]);
            if let Some(ticket) = state.set_sort(sort) {
                state.refresh_completed(
                    ticket,
                    Ok(vec![
                        movie("1", "Beta", 2001, 10),
                        movie("2", "Alpha", 1999, 4),
                        movie("3", "Gamma", 2010, 16),
                    ]),
                );
            }
            assert!(is_sorted_by(state.movies(), sort), "fetch under {sort:?}");

            let ticket = state.begin_create().err().map(|_| ());
            assert!(ticket.is_some(), "empty draft fails validation");
            state.draft_mut().title = "Delta".to_string();
            state.draft_mut().release_year = Some(2005);
            state.draft_mut().rating = 12;
            let ticket = state.begin_create().unwrap();
            state.create_completed(ticket, Ok(movie("4", "Delta", 2005, 12)));
            assert!(is_sorted_by(state.movies(), sort), "create under {sort:?}");

            assert!(state.edit_start(&MovieId("2".to_string())));
            let draft = state.edit_draft_mut().unwrap();
            draft.title = "Zulu".to_string();
            draft.release_year = Some(2050);
            draft.rating = 20;
            let ticket = state.begin_save().unwrap();
            state.update_completed(ticket, Ok(()));
            assert!(is_sorted_by(state.movies(), sort), "update under {sort:?}");
        }
    }

    #[test]
    fn test_cache_holds_only_current_owner() {
        let mut state = CollectionState::new();
        let ticket = state.auth_changed(Some(UserId("u1".to_string()))).unwrap();

        let mut foreign = movie("9", "Theirs", 2000, 0);
        foreign.owner_id = UserId("u2".to_string());
        state.refresh_completed(ticket, Ok(vec![movie("1", "Mine", 2000, 0), foreign]));

        assert_eq!(state.movies().len(), 1);
        assert!(state
            .movies()
            .iter()
            .all(|m| m.owner_id == UserId("u1".to_string())));
    }

    #[test]
    fn test_delete_idempotent_on_cache() {
        let mut state = signed_in_state(vec![movie("1", "Alpha", 2000, 0)]);

        let first = state.begin_delete(&MovieId("1".to_string()));
        state.delete_completed(first, Ok(()));
        assert!(state.movies().is_empty());

        // Second delete of the same id: gateway reports success, cache
        // stays unchanged, no error notice.
        let second = state.begin_delete(&MovieId("1".to_string()));
        state.delete_completed(second, Ok(()));
        assert!(state.movies().is_empty());
        assert!(!matches!(state.notice(), Some(Notice::Error(_))));
    }

    #[test]
    fn test_create_round_trip_preserves_fields() {
        let mut state = signed_in_state(Vec::new());
        *state.draft_mut() = MovieDraft {
            title: "Alien".to_string(),
            release_year: Some(1979),
            received_award: true,
            genre: "Sci-Fi".to_string(),
            director: "Ridley Scott".to_string(),
            poster_url: "https://example.org/alien.jpg".to_string(),
            rating: 19,
        };
        let draft = state.draft().clone();

        let ticket = state.begin_create().unwrap();
        let persisted = Movie {
            id: MovieId("assigned".to_string()),
            title: draft.title.clone(),
            release_year: 1979,
            received_award: draft.received_award,
            genre: draft.genre.clone(),
            director: draft.director.clone(),
            poster_url: draft.poster_url.clone(),
            rating: draft.rating,
            owner_id: UserId("u1".to_string()),
            created_at: Utc::now(),
        };
        state.create_completed(ticket, Ok(persisted));

        let cached = state
            .movies()
            .iter()
            .find(|m| m.id == MovieId("assigned".to_string()))
            .expect("created movie is in the cache");
        assert_eq!(cached.title, draft.title);
        assert_eq!(cached.release_year, 1979);
        assert_eq!(cached.rating, draft.rating);
        // The create form clears on success.
        assert_eq!(*state.draft(), MovieDraft::default());
    }

    #[test]
    fn test_derived_view_never_mutates_cache() {
        let mut state = signed_in_state(vec![
            movie("1", "Alpha", 2000, 0),
            movie("2", "Beta", 2001, 0),
        ]);
        state.movies_snapshot_check(|state| {
            state.set_search("alp");
            let first = state.visible().len();
            state.set_search("nothing matches this");
            let second = state.visible().len();
            assert_eq!(first, 1);
            assert_eq!(second, 0);
        });
    }

    impl CollectionState {
        fn movies_snapshot_check(&mut self, f: impl FnOnce(&mut Self)) {
            let before = self.movies.clone();
            f(self);
            assert_eq!(self.movies, before, "derived view mutated the cache");
        }
    }

    #[test]
    fn test_search_matches_genre_and_director_case_insensitive() {
        let mut state = signed_in_state(vec![
            Movie {
                genre: "Sci-Fi".to_string(),
                director: "Ridley Scott".to_string(),
                ..movie("1", "Alien", 1979, 0)
            },
            movie("2", "Heat", 1995, 0),
        ]);

        state.set_search("SCI");
        assert_eq!(state.visible().len(), 1);
        state.set_search("ridley");
        assert_eq!(state.visible().len(), 1);
        state.set_search("");
        assert_eq!(state.visible().len(), 2);
    }

    #[test]
    fn test_award_filter_tristate() {
        let mut winner = movie("1", "Alpha", 2000, 0);
        winner.received_award = true;
        let mut state = signed_in_state(vec![winner, movie("2", "Beta", 2001, 0)]);

        state.set_award_filter(AwardFilter::Winners);
        assert_eq!(state.visible().len(), 1);
        assert!(state.visible()[0].received_award);

        state.set_award_filter(AwardFilter::NonWinners);
        assert_eq!(state.visible().len(), 1);
        assert!(!state.visible()[0].received_award);

        state.set_award_filter(AwardFilter::All);
        assert_eq!(state.visible().len(), 2);
    }

    #[test]
    fn test_title_update_resorts_under_title_asc() {
        let mut state = signed_in_state(vec![
            movie("2", "Alpha", 2001, 0),
            movie("1", "Beta", 2000, 0),
        ]);

        assert!(state.edit_start(&MovieId("2".to_string())));
        state.edit_draft_mut().unwrap().title = "Zeta".to_string();
        let ticket = state.begin_save().unwrap();
        state.update_completed(ticket, Ok(()));

        let titles: Vec<_> = state.movies().iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["Beta", "Zeta"]);
        assert_eq!(*state.form(), FormMode::Idle);
    }

    #[test]
    fn test_empty_title_create_is_rejected_synchronously() {
        let mut state = signed_in_state(Vec::new());
        state.draft_mut().release_year = Some(2000);

        let err = state.begin_create().unwrap_err();
        assert_eq!(err, ValidationError::EmptyTitle);
        assert!(matches!(
            state.notice(),
            Some(Notice::Error(CollectionError::Validation(
                ValidationError::EmptyTitle
            )))
        ));
    }

    #[test]
    fn test_missing_year_is_rejected() {
        let mut state = signed_in_state(Vec::new());
        state.draft_mut().title = "Alien".to_string();

        let err = state.begin_create().unwrap_err();
        assert_eq!(err, ValidationError::MissingReleaseYear);
    }

    #[test]
    fn test_sign_out_clears_cache_and_stale_fetch_is_discarded() {
        let mut state = CollectionState::new();

        // A signs in; their fetch is still in flight at sign-out.
        let a_ticket = state.auth_changed(Some(UserId("a".to_string()))).unwrap();

        assert!(state.auth_changed(None).is_none());
        assert!(state.movies().is_empty(), "cache empty at sign-out");

        // B signs in; B's fetch completes first.
        let b_ticket = state.auth_changed(Some(UserId("b".to_string()))).unwrap();
        let mut b_movie = movie("b1", "Bravo", 2001, 0);
        b_movie.owner_id = UserId("b".to_string());
        state.refresh_completed(b_ticket, Ok(vec![b_movie]));

        // A's fetch finally lands: it carries a stale epoch and is dropped.
        let mut a_movie = movie("a1", "Alpha", 2000, 0);
        a_movie.owner_id = UserId("a".to_string());
        state.refresh_completed(a_ticket, Ok(vec![a_movie]));

        assert_eq!(state.movies().len(), 1);
        assert!(state
            .movies()
            .iter()
            .all(|m| m.owner_id == UserId("b".to_string())));
    }

    #[test]
    fn test_duplicate_sign_in_notification_schedules_no_second_fetch() {
        let mut state = CollectionState::new();
        assert!(state.auth_changed(Some(UserId("u1".to_string()))).is_some());
        assert!(state.auth_changed(Some(UserId("u1".to_string()))).is_none());
    }

    #[test]
    fn test_refresh_needs_a_session() {
        let mut state = CollectionState::new();
        assert!(state.begin_refresh().is_none());

        state.auth_changed(Some(UserId("u1".to_string())));
        assert!(state.begin_refresh().is_some());

        state.auth_changed(None);
        assert!(state.begin_refresh().is_none());
    }

    #[test]
    fn test_stale_update_completion_is_discarded() {
        let mut state = signed_in_state(vec![movie("1", "Alpha", 2000, 0)]);
        let id = MovieId("1".to_string());

        // First edit issued but slow to complete.
        assert!(state.edit_start(&id));
        state.edit_draft_mut().unwrap().title = "Old".to_string();
        let slow = state.begin_save().unwrap();

        // Second edit issued later completes first.
        assert!(state.edit_start(&id));
        state.edit_draft_mut().unwrap().title = "New".to_string();
        let fast = state.begin_save().unwrap();
        state.update_completed(fast, Ok(()));
        assert_eq!(state.movies()[0].title, "New");

        // The older completion arrives last and must not regress the entry.
        state.update_completed(slow, Ok(()));
        assert_eq!(state.movies()[0].title, "New");
    }

    #[test]
    fn test_update_completion_after_delete_is_a_noop() {
        let mut state = signed_in_state(vec![movie("1", "Alpha", 2000, 0)]);
        let id = MovieId("1".to_string());

        assert!(state.edit_start(&id));
        state.edit_draft_mut().unwrap().title = "Edited".to_string();
        let update = state.begin_save().unwrap();

        let delete = state.begin_delete(&id);
        state.delete_completed(delete, Ok(()));
        assert!(state.movies().is_empty());

        state.update_completed(update, Ok(()));
        assert!(state.movies().is_empty(), "update must not resurrect");
    }

    #[test]
    fn test_save_patch_carries_only_changed_fields() {
        let mut state = signed_in_state(vec![Movie {
            genre: "Sci-Fi".to_string(),
            ..movie("1", "Alien", 1979, 10)
        }]);

        assert!(state.edit_start(&MovieId("1".to_string())));
        state.edit_draft_mut().unwrap().rating = 18;
        let ticket = state.begin_save().unwrap();

        assert_eq!(ticket.patch().rating, Some(18));
        assert!(ticket.patch().title.is_none());
        assert!(ticket.patch().release_year.is_none());
        assert!(ticket.patch().genre.is_none());
    }

    #[test]
    fn test_save_without_changes_yields_empty_patch() {
        let mut state = signed_in_state(vec![movie("1", "Alien", 1979, 10)]);

        assert!(state.edit_start(&MovieId("1".to_string())));
        let ticket = state.begin_save().unwrap();
        assert!(ticket.patch().is_empty());

        // Completing still closes the form.
        state.update_completed(ticket, Ok(()));
        assert_eq!(*state.form(), FormMode::Idle);
    }

    #[test]
    fn test_edit_cancel_discards_draft() {
        let mut state = signed_in_state(vec![movie("1", "Alpha", 2000, 0)]);
        assert!(state.edit_start(&MovieId("1".to_string())));
        state.edit_draft_mut().unwrap().title = "Changed".to_string();
        state.edit_cancel();

        assert_eq!(*state.form(), FormMode::Idle);
        assert_eq!(state.movies()[0].title, "Alpha");
        assert!(state.begin_save().is_err());
    }

    #[test]
    fn test_error_slot_replacement_and_success_ttl() {
        let mut state = signed_in_state(Vec::new());

        let ticket = state.set_sort(SortSpec::RatingDesc).unwrap();
        state.refresh_completed(ticket, Err(CollectionError::IndexMissing));
        assert!(matches!(
            state.notice(),
            Some(Notice::Error(CollectionError::IndexMissing))
        ));

        // A later success replaces the error with a transient notice.
        state.draft_mut().title = "Alien".to_string();
        state.draft_mut().release_year = Some(1979);
        let ticket = state.begin_create().unwrap();
        state.create_completed(ticket, Ok(movie("1", "Alien", 1979, 0)));
        let Some(Notice::Success { shown_at, .. }) = state.notice().cloned() else {
            panic!("expected success notice");
        };

        state.prune_notice(shown_at + Duration::seconds(SUCCESS_NOTICE_TTL_SECS - 1));
        assert!(state.notice().is_some());
        state.prune_notice(shown_at + Duration::seconds(SUCCESS_NOTICE_TTL_SECS));
        assert!(state.notice().is_none());
    }

    #[test]
    fn test_initial_fetch_error_is_suppressed() {
        let mut state = CollectionState::new();
        let ticket = state.auth_changed(Some(UserId("u1".to_string()))).unwrap();
        state.refresh_completed(ticket, Err(CollectionError::ServiceUnavailable));
        assert!(state.notice().is_none(), "sign-in fetch errors never flash");
    }
}
