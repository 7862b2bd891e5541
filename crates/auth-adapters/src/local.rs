//! E-mail/password accounts held in process memory.
//!
//! Passwords are stored as Argon2id PHC strings. Signing up also signs the new
//! account in, and every sign-in or sign-out is pushed to subscribers.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domains::{Actor, AppError, AuthProvider, Result, SignUp, UserId};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

pub const MIN_PASSWORD_CHARS: usize = 6;

struct Account {
    actor: Actor,
    password_hash: String,
}

pub struct LocalAuth {
    hasher: Argon2<'static>,
    /// Keyed by the normalised e-mail address.
    accounts: DashMap<String, Account>,
    session: watch::Sender<Option<Actor>>,
}

impl Default for LocalAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalAuth {
    pub fn new() -> Self {
        Self::with_hasher(Argon2::default())
    }

    /// Argon2id with explicit memory (KiB) and iteration costs.
    pub fn with_cost(memory_kib: u32, iterations: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| AppError::ValidationError(format!("invalid argon2 parameters: {e}")))?;
        Ok(Self::with_hasher(Argon2::new(Algorithm::Argon2id, Version::V0x13, params)))
    }

    fn with_hasher(hasher: Argon2<'static>) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            hasher,
            accounts: DashMap::new(),
            session,
        }
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::ValidationError(format!("password could not be hashed: {e}")))
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(parsed) => self.hasher.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }
}

fn normalise_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::ValidationError(format!("{email:?} is not an e-mail address"))),
    }
}

#[async_trait]
impl AuthProvider for LocalAuth {
    fn current_actor(&self) -> Option<Actor> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Actor>> {
        self.session.subscribe()
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    async fn sign_up(&self, request: SignUp) -> Result<Actor> {
        let email = normalise_email(&request.email)?;
        if request.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AppError::ValidationError(format!(
                "password must have at least {MIN_PASSWORD_CHARS} characters"
            )));
        }
        let password_hash = self.hash(&request.password)?;
        let actor = Actor {
            id: UserId::new(uuid::Uuid::new_v4().simple().to_string()),
            display_name: request
                .display_name
                .map(|n| n.trim().to_owned())
                .filter(|n| !n.is_empty()),
            email: Some(email.clone()),
            photo_url: None,
        };

        match self.accounts.entry(email) {
            Entry::Occupied(entry) => {
                return Err(AppError::Conflict(format!("an account for {} already exists", entry.key())));
            }
            Entry::Vacant(entry) => {
                entry.insert(Account {
                    actor: actor.clone(),
                    password_hash,
                });
            }
        }
        info!(user = %actor.id, "account created");
        self.session.send_replace(Some(actor.clone()));
        Ok(actor)
    }

    #[instrument(skip(self, password))]
    async fn sign_in(&self, email: &str, password: &str) -> Result<Actor> {
        let email = normalise_email(email)?;
        let actor = self
            .accounts
            .get(&email)
            .filter(|account| self.verify(password, &account.password_hash))
            .map(|account| account.actor.clone());
        let Some(actor) = actor else {
            warn!("rejected sign-in");
            return Err(AppError::Unauthorized("invalid e-mail or password".into()));
        };
        info!(user = %actor.id, "signed in");
        self.session.send_replace(Some(actor.clone()));
        Ok(actor)
    }

    async fn sign_out(&self) -> Result<()> {
        if let Some(actor) = self.session.send_replace(None) {
            info!(user = %actor.id, "signed out");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_profile(&self, display_name: Option<String>) -> Result<Actor> {
        let current = self.current_actor().ok_or(AppError::AuthenticationRequired)?;
        let email = current.email.clone().unwrap_or_default();
        let Some(mut account) = self.accounts.get_mut(&email) else {
            return Err(AppError::not_found("account", &current.id));
        };
        if let Some(name) = display_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            account.actor.display_name = Some(name.to_owned());
        }
        let actor = account.actor.clone();
        drop(account);

        info!(user = %actor.id, "profile updated");
        self.session.send_replace(Some(actor.clone()));
        Ok(actor)
    }
}
