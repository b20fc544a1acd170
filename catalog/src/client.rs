//! Async driver tying the synchronous state machine to the remote gateway
//! and the identity stream.
//!
//! Each operation is the same shape: ask [`CollectionState`] for a ticket,
//! run the store call through [`MovieGateway`], hand the completion back.
//! `&mut self` on every driver method is the concurrency model — one
//! logical thread of control, completions applied in arrival order.

use shared_types::{AwardFilter, Movie, MovieDraft, MovieId, SortSpec, UserId};
use tokio::sync::watch;
use tracing::debug;

use crate::error::CollectionError;
use crate::gateway::MovieGateway;
use crate::identity::{AuthState, IdentityProvider};
use crate::query::movies_query;
use crate::state::{CollectionState, RefreshTicket};
use crate::store::DocumentStore;

pub struct CollectionClient<S, I> {
    gateway: MovieGateway<S>,
    identity: I,
    session: watch::Receiver<AuthState>,
    state: CollectionState,
}

impl<S: DocumentStore, I: IdentityProvider> CollectionClient<S, I> {
    pub fn new(store: S, identity: I) -> Self {
        let session = identity.subscribe();
        Self {
            gateway: MovieGateway::new(store),
            identity,
            session,
            state: CollectionState::new(),
        }
    }

    pub fn state(&self) -> &CollectionState {
        &self.state
    }

    pub fn identity(&self) -> &I {
        &self.identity
    }

    pub fn store(&self) -> &S {
        self.gateway.store()
    }

    /// Create-form field access for the presentation layer.
    pub fn draft_mut(&mut self) -> &mut MovieDraft {
        self.state.draft_mut()
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Fold the identity provider's current value into the state machine,
    /// running the initial fetch a fresh sign-in schedules.
    pub async fn refresh_session(&mut self) {
        let user = self.session.borrow_and_update().user().cloned();
        if let Some(ticket) = self.state.auth_changed(user) {
            self.run_refresh(ticket).await;
        }
    }

    /// Wait for the next identity transition and apply it. Returns false
    /// when the identity stream has closed.
    pub async fn await_session_change(&mut self) -> bool {
        if self.session.changed().await.is_err() {
            debug!("identity stream closed");
            return false;
        }
        self.refresh_session().await;
        true
    }

    /// Re-fetch the collection under the current query. No-op while signed
    /// out; fetch failures land in the notice slot.
    pub async fn refresh(&mut self) {
        if let Some(ticket) = self.state.begin_refresh() {
            self.run_refresh(ticket).await;
        }
    }

    // ------------------------------------------------------------------
    // Collection operations
    // ------------------------------------------------------------------

    pub async fn submit_create(&mut self) -> Result<Movie, CollectionError> {
        let ticket = match self.state.begin_create() {
            Ok(ticket) => ticket,
            Err(e) => return Err(e.into()),
        };
        let result = match self.current_user() {
            Some(owner) => self.gateway.create(&owner, self.state.draft()).await,
            None => Err(CollectionError::PermissionDenied),
        };
        self.state.create_completed(ticket, result.clone());
        result
    }

    pub fn begin_edit(&mut self, id: &MovieId) -> bool {
        self.state.edit_start(id)
    }

    pub fn cancel_edit(&mut self) {
        self.state.edit_cancel();
    }

    pub fn edit_draft_mut(&mut self) -> Option<&mut MovieDraft> {
        self.state.edit_draft_mut()
    }

    pub async fn submit_save(&mut self) -> Result<(), CollectionError> {
        let ticket = self.state.begin_save()?;
        let result = self.gateway.update(ticket.id(), ticket.patch()).await;
        self.state.update_completed(ticket, result.clone());
        result
    }

    pub async fn delete(&mut self, id: &MovieId) -> Result<(), CollectionError> {
        let ticket = self.state.begin_delete(id);
        let result = self.gateway.delete(id).await;
        self.state.delete_completed(ticket, result.clone());
        result
    }

    // ------------------------------------------------------------------
    // Query knobs
    // ------------------------------------------------------------------

    /// Change the sort order, re-issuing the remote query when signed in.
    pub async fn set_sort(&mut self, sort: SortSpec) {
        if let Some(ticket) = self.state.set_sort(sort) {
            self.run_refresh(ticket).await;
        }
    }

    pub fn set_search(&mut self, term: impl Into<String>) {
        self.state.set_search(term);
    }

    pub fn set_award_filter(&mut self, filter: AwardFilter) {
        self.state.set_award_filter(filter);
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn current_user(&self) -> Option<UserId> {
        self.state.current_user().cloned()
    }

    async fn run_refresh(&mut self, ticket: RefreshTicket) {
        let Some(owner) = self.current_user() else {
            return;
        };
        let query = movies_query(&owner, self.state.sort());
        let result = self.gateway.fetch(&query).await;
        self.state.refresh_completed(ticket, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryIdentity, MemoryStore};
    use crate::state::{FormMode, Notice};

    async fn signed_in_client() -> CollectionClient<MemoryStore, MemoryIdentity> {
        let identity = MemoryIdentity::new();
        identity
            .sign_up("user@example.org", "hunter22")
            .await
            .unwrap();
        let mut client = CollectionClient::new(MemoryStore::new(), identity);
        client.refresh_session().await;
        client
    }

    fn fill_draft(draft: &mut MovieDraft, title: &str, year: i32) {
        draft.title = title.to_string();
        draft.release_year = Some(year);
    }

    #[tokio::test]
    async fn test_create_list_edit_delete_flow() {
        let mut client = signed_in_client().await;
        assert!(client.state().current_user().is_some());

        fill_draft(client.draft_mut(), "Heat", 1995);
        let created = client.submit_create().await.unwrap();
        assert!(!created.id.as_str().is_empty());
        assert_eq!(client.state().movies().len(), 1);

        fill_draft(client.draft_mut(), "Alien", 1979);
        client.submit_create().await.unwrap();
        let titles: Vec<_> = client
            .state()
            .movies()
            .iter()
            .map(|m| m.title.as_str())
            .collect();
        assert_eq!(titles, ["Alien", "Heat"]);

        assert!(client.begin_edit(&created.id));
        client.edit_draft_mut().unwrap().rating = 18;
        client.submit_save().await.unwrap();
        assert_eq!(*client.state().form(), FormMode::Idle);
        let heat = client
            .state()
            .movies()
            .iter()
            .find(|m| m.id == created.id)
            .unwrap();
        assert_eq!(heat.rating, 18);

        client.delete(&created.id).await.unwrap();
        assert_eq!(client.state().movies().len(), 1);
    }

    #[tokio::test]
    async fn test_create_while_signed_out_is_denied() {
        let mut client = CollectionClient::new(MemoryStore::new(), MemoryIdentity::new());
        client.identity().announce_signed_out();
        client.refresh_session().await;

        fill_draft(client.draft_mut(), "Heat", 1995);
        let err = client.submit_create().await.unwrap_err();
        assert_eq!(err, CollectionError::PermissionDenied);
    }

    #[tokio::test]
    async fn test_sort_change_refetches_in_new_order() {
        let mut client = signed_in_client().await;
        fill_draft(client.draft_mut(), "Alpha", 2010);
        client.submit_create().await.unwrap();
        fill_draft(client.draft_mut(), "Beta", 1990);
        client.submit_create().await.unwrap();

        client.set_sort(SortSpec::YearAsc).await;
        let years: Vec<_> = client
            .state()
            .movies()
            .iter()
            .map(|m| m.release_year)
            .collect();
        assert_eq!(years, [1990, 2010]);
    }

    #[tokio::test]
    async fn test_sign_out_empties_the_view() {
        let mut client = signed_in_client().await;
        fill_draft(client.draft_mut(), "Heat", 1995);
        client.submit_create().await.unwrap();
        assert_eq!(client.state().movies().len(), 1);

        client.identity().sign_out().await.unwrap();
        assert!(client.await_session_change().await);
        assert!(client.state().movies().is_empty());
        assert!(client.state().current_user().is_none());
    }

    #[tokio::test]
    async fn test_second_user_sees_only_their_rows() {
        let store = MemoryStore::new();
        let identity = MemoryIdentity::new();
        identity.sign_up("a@example.org", "pw-a").await.unwrap();
        let mut client = CollectionClient::new(store, identity);
        client.refresh_session().await;

        fill_draft(client.draft_mut(), "Theirs", 2000);
        client.submit_create().await.unwrap();

        client.identity().sign_out().await.unwrap();
        client.refresh_session().await;
        client
            .identity()
            .sign_up("b@example.org", "pw-b")
            .await
            .unwrap();
        client.refresh_session().await;

        assert!(client.state().movies().is_empty());
        fill_draft(client.draft_mut(), "Mine", 2001);
        client.submit_create().await.unwrap();
        assert_eq!(client.state().movies().len(), 1);
        assert_eq!(client.state().movies()[0].title, "Mine");
    }

    #[tokio::test]
    async fn test_explicit_refresh_surfaces_fetch_errors() {
        let identity = MemoryIdentity::new();
        identity
            .sign_up("user@example.org", "hunter22")
            .await
            .unwrap();
        let store = MemoryStore::new();
        store.fail_next(crate::error::StoreError::Unavailable("down".to_string()));
        let mut client = CollectionClient::new(store, identity);

        // The fetch scheduled by sign-in swallows its error.
        client.refresh_session().await;
        assert!(client.state().notice().is_none());

        // A caller-requested refresh must not.
        client
            .gateway
            .store()
            .fail_next(crate::error::StoreError::Unavailable("down".to_string()));
        client.refresh().await;
        assert!(matches!(
            client.state().notice(),
            Some(Notice::Error(CollectionError::ServiceUnavailable))
        ));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_notice() {
        let mut client = signed_in_client().await;
        fill_draft(client.draft_mut(), "Heat", 1995);
        client
            .gateway
            .store()
            .fail_next(crate::error::StoreError::Unavailable("down".to_string()));
        let err = client.submit_create().await.unwrap_err();
        assert_eq!(err, CollectionError::ServiceUnavailable);
        assert!(matches!(
            client.state().notice(),
            Some(Notice::Error(CollectionError::ServiceUnavailable))
        ));
    }
}
