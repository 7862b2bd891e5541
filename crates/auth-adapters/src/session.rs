//! Explicit session context handed to everything that needs the current actor.

use std::sync::Arc;

use domains::{Actor, AppError, AuthProvider, Result};
use tokio::sync::watch;

pub struct SessionContext {
    auth: Arc<dyn AuthProvider>,
    changes: watch::Receiver<Option<Actor>>,
    loading: bool,
}

impl SessionContext {
    /// Starts in the loading state; see [`SessionContext::resolve`].
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        let changes = auth.subscribe();
        Self {
            auth,
            changes,
            loading: true,
        }
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    /// `true` until the provider has reported a session state once.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn actor(&self) -> Option<Actor> {
        self.changes.borrow().clone()
    }

    pub fn require_actor(&self) -> Result<Actor> {
        self.actor().ok_or(AppError::AuthenticationRequired)
    }

    /// Takes the provider's current state as the first transition and ends loading.
    pub fn resolve(&mut self) -> Option<Actor> {
        self.loading = false;
        self.changes.borrow_and_update().clone()
    }

    /// Waits for the next sign-in or sign-out. `None` once the provider is gone.
    pub async fn changed(&mut self) -> Option<Option<Actor>> {
        self.changes.changed().await.ok()?;
        self.loading = false;
        Some(self.changes.borrow_and_update().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalAuth;
    use domains::{MockAuthProvider, SignUp};

    #[tokio::test]
    async fn follows_sign_in_and_sign_out() {
        let auth = Arc::new(LocalAuth::with_cost(64, 1).unwrap());
        let mut session = SessionContext::new(auth.clone());
        assert!(session.is_loading());
        assert_eq!(session.resolve(), None);
        assert!(!session.is_loading());
        assert!(matches!(session.require_actor(), Err(AppError::AuthenticationRequired)));

        let actor = auth
            .sign_up(SignUp {
                email: "anna@example.com".into(),
                password: "secret1".into(),
                display_name: None,
            })
            .await
            .unwrap();
        assert_eq!(session.changed().await, Some(Some(actor.clone())));
        assert_eq!(session.require_actor().unwrap(), actor);

        auth.sign_out().await.unwrap();
        assert_eq!(session.changed().await, Some(None));
    }

    #[tokio::test]
    async fn provider_going_away_ends_the_stream() {
        let (tx, rx) = watch::channel(None);
        let mut auth = MockAuthProvider::new();
        auth.expect_subscribe().return_once(move || rx);
        let mut session = SessionContext::new(Arc::new(auth));

        drop(tx);
        assert_eq!(session.changed().await, None);
        assert!(session.is_loading());
    }
}
