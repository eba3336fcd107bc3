//! Signup orchestrator
//!
//! Drives an identity through `pending -> email verified -> wallet linked`.
//! Each step is gated by one single-use secret: the magic link token, then
//! the wallet nonce and its signature. Durable writes run inside credential
//! store transactions; sessions and nonces live in the ephemeral store.

use chrono::{DateTime, Utc};
use common::error::DatabaseError;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::message::{SignInMessage, extract_nonce};
use crate::models::{
    LoginLinkRecord, MagicLink, MainSessionRecord, NewMagicLink, NewPendingSignup, NewUser,
    NonceRecord, PendingSignup, SignupSessionRecord, SignupStatus, User,
};
use crate::queue::{JobQueue, MagicLinkEmailPayload, SEND_MAGIC_LINK_EMAIL};
use crate::repositories::{CredentialStore, USERS_ADDRESS_CONSTRAINT, USERS_EMAIL_CONSTRAINT};
use crate::session::SessionManager;
use crate::signature::verify_signature;
use crate::tokens::{
    build_magic_link_url, generate_nonce, generate_session_id, generate_token, hash_token,
};
use crate::validation::{
    normalize_email, validate_address, validate_display_name, validate_email, validate_full_name,
};

/// Returned for every login link request, whether or not the email is registered
pub const LOGIN_LINK_MESSAGE: &str =
    "If an account exists for this email, a sign-in link has been sent.";

/// A freshly issued pending signup
#[derive(Debug, Clone)]
pub struct SignupResult {
    pub pending_signup: PendingSignup,
    pub magic_link: MagicLink,
}

/// Outcome of consuming a magic link token
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyResult {
    pub session_id: String,
    /// `true` when the session is a signup session still awaiting a wallet
    pub needs_wallet: bool,
}

/// A wallet challenge
#[derive(Debug, Clone, PartialEq)]
pub struct NonceResult {
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
    /// Sign-in message the wallet must sign verbatim
    pub message: String,
}

/// A registered user and their new main session
#[derive(Debug, Clone)]
pub struct CompleteSignupResult {
    pub user: User,
    pub session_id: String,
}

/// Signup and login orchestrator
#[derive(Clone)]
pub struct SignupService {
    store: Arc<dyn CredentialStore>,
    sessions: SessionManager,
    queue: JobQueue,
    config: AuthConfig,
}

impl SignupService {
    /// Create a new orchestrator.
    ///
    /// Fails with [`AuthError::InvalidStoreBackend`] if the credential store
    /// cannot run transactions.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        sessions: SessionManager,
        queue: JobQueue,
        config: AuthConfig,
    ) -> AuthResult<Self> {
        if !store.supports_transactions() {
            error!("Credential store without transaction support supplied");
            return Err(AuthError::InvalidStoreBackend);
        }
        if !sessions.is_enabled() {
            warn!("Ephemeral store not configured, sessions will not persist");
        }

        Ok(Self {
            store,
            sessions,
            queue,
            config,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Start a signup and email a verification link.
    ///
    /// Any earlier active signup for the same email is invalidated along with
    /// its magic links.
    pub async fn create_pending_signup(
        &self,
        full_name: &str,
        email: &str,
        display_name: Option<&str>,
    ) -> AuthResult<SignupResult> {
        let full_name = full_name.trim();
        let email = normalize_email(email);
        let display_name = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty());

        validate_full_name(full_name).map_err(AuthError::InvalidInput)?;
        validate_email(&email).map_err(AuthError::InvalidInput)?;
        validate_display_name(display_name).map_err(AuthError::InvalidInput)?;

        if self.store.get_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailAlreadyRegistered);
        }

        let token = generate_token()?;
        let expires_at = Utc::now() + ttl(self.config.magic_link_ttl);

        let mut tx = self.store.begin().await?;
        let invalidated = tx.invalidate_pending_signups(&email).await?;
        let pending_signup = tx
            .create_pending_signup(&NewPendingSignup {
                full_name: full_name.to_string(),
                email: email.clone(),
                display_name: display_name.map(str::to_string),
                expires_at,
            })
            .await?;
        let magic_link = tx
            .create_magic_link(&NewMagicLink {
                pending_signup_id: pending_signup.id,
                token_hash: hash_token(&token),
                expires_at,
            })
            .await?;
        tx.commit().await?;

        info!(
            pending_signup_id = %pending_signup.id,
            superseded = invalidated,
            "Created pending signup"
        );

        self.enqueue_magic_link_email(MagicLinkEmailPayload {
            email,
            name: display_name.unwrap_or(full_name).to_string(),
            magic_link_url: build_magic_link_url(&self.config.frontend_url, &token),
            is_login: false,
        });

        Ok(SignupResult {
            pending_signup,
            magic_link,
        })
    }

    /// Email a one-time sign-in link to an existing user.
    ///
    /// The reply never reveals whether the email is registered.
    pub async fn create_login_magic_link(&self, email: &str) -> AuthResult<&'static str> {
        let email = normalize_email(email);
        validate_email(&email).map_err(AuthError::InvalidInput)?;

        let Some(user) = self.store.get_user_by_email(&email).await? else {
            info!("Login link requested for unknown email");
            return Ok(LOGIN_LINK_MESSAGE);
        };

        let token = generate_token()?;
        let record = LoginLinkRecord {
            user_id: user.id,
            email: user.email.clone(),
            created_at: Utc::now(),
        };
        self.sessions
            .store_login_link(&hash_token(&token), &record, self.config.magic_link_ttl)
            .await?;

        info!(user_id = %user.id, "Issued login link");

        self.enqueue_magic_link_email(MagicLinkEmailPayload {
            email: user.email.clone(),
            name: user.greeting_name().to_string(),
            magic_link_url: build_magic_link_url(&self.config.frontend_url, &token),
            is_login: true,
        });

        Ok(LOGIN_LINK_MESSAGE)
    }

    /// Consume a magic link token.
    ///
    /// A login token mints a main session. A signup token marks the email
    /// verified and mints a signup session that still needs a wallet.
    pub async fn verify_token(&self, token: &str) -> AuthResult<VerifyResult> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidOrExpiredToken);
        }
        let token_hash = hash_token(token);

        if let Some(login) = self.sessions.take_login_link(&token_hash).await? {
            return self.complete_login(login).await;
        }

        let now = Utc::now();
        let link = self
            .store
            .get_magic_link_by_hash(&token_hash)
            .await?
            .filter(|link| !link.used && !link.is_expired(now))
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        let pending_signup = self
            .store
            .get_pending_signup(link.pending_signup_id)
            .await?
            .filter(|signup| signup.status.is_active() && !signup.is_expired(now))
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        let mut tx = self.store.begin().await?;
        if !tx.mark_magic_link_used(link.id).await? {
            return Err(AuthError::InvalidOrExpiredToken);
        }
        let verified = tx
            .mark_pending_signup_verified(pending_signup.id, now)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        tx.commit().await?;

        let session_id = generate_session_id()?;
        let record = SignupSessionRecord {
            pending_signup_id: verified.id,
            email: verified.email.clone(),
            display_name: verified.display_name.clone(),
            created_at: now,
        };
        self.sessions
            .create_signup_session(&session_id, &record, self.config.signup_session_ttl)
            .await?;

        info!(pending_signup_id = %verified.id, "Email verified");

        Ok(VerifyResult {
            session_id,
            needs_wallet: true,
        })
    }

    async fn complete_login(&self, login: LoginLinkRecord) -> AuthResult<VerifyResult> {
        let user = self
            .store
            .get_user_by_id(login.user_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        let session_id = self.start_main_session(&user).await?;
        info!(user_id = %user.id, "User signed in with login link");

        Ok(VerifyResult {
            session_id,
            needs_wallet: false,
        })
    }

    /// Issue a wallet challenge for a signup session
    pub async fn generate_nonce(
        &self,
        session_id: &str,
        address: &str,
        chain_id: Option<u64>,
    ) -> AuthResult<NonceResult> {
        let address = address.trim();
        validate_address(address).map_err(AuthError::InvalidInput)?;

        if self.sessions.get_signup_session(session_id).await?.is_none() {
            return Err(AuthError::InvalidOrExpiredSession);
        }

        let nonce = generate_nonce()?;
        let issued_at = Utc::now();
        let expires_at = issued_at + ttl(self.config.nonce_expiry);

        let record = NonceRecord {
            session_id: session_id.to_string(),
            address: address.to_string(),
            used: false,
            expires_at,
        };
        self.sessions
            .store_nonce(&nonce, &record, self.config.nonce_expiry)
            .await?;

        if let Err(e) = self
            .sessions
            .store_session_nonce(session_id, address, &nonce, self.config.nonce_expiry)
            .await
        {
            warn!("Failed to store session nonce pointer: {}", e);
        }

        let message = SignInMessage {
            address,
            uri: &self.config.frontend_url,
            chain_id,
            nonce: &nonce,
            issued_at,
        }
        .render();

        Ok(NonceResult {
            nonce,
            expires_at,
            message,
        })
    }

    /// Link a wallet to a verified signup and register the user.
    ///
    /// The nonce named in `message` is spent before the signature is checked,
    /// so a failed attempt needs a fresh nonce.
    pub async fn complete_signup(
        &self,
        session_id: &str,
        address: &str,
        signature: &str,
        message: &str,
    ) -> AuthResult<CompleteSignupResult> {
        let address = address.trim();

        let signup_session = self
            .sessions
            .get_signup_session(session_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredSession)?;
        let pending_signup = self
            .store
            .get_pending_signup(signup_session.pending_signup_id)
            .await?
            .filter(|signup| {
                signup.email_verified_at.is_some()
                    && signup.status == SignupStatus::Verified
                    && !signup.is_expired(Utc::now())
            })
            .ok_or(AuthError::InvalidOrExpiredSession)?;

        let nonce = extract_nonce(message).ok_or(AuthError::InvalidOrExpiredNonce)?;
        self.spend_nonce(nonce, session_id, address).await?;

        verify_signature(address, message, signature)?;

        if self.store.get_user_by_address(address).await?.is_some() {
            return Err(AuthError::WalletAlreadyLinked);
        }
        if self
            .store
            .get_user_by_email(&pending_signup.email)
            .await?
            .is_some()
        {
            return Err(AuthError::EmailAlreadyRegistered);
        }

        let mut tx = self.store.begin().await?;
        if !tx.complete_pending_signup(pending_signup.id).await? {
            tx.rollback().await?;
            return Err(AuthError::InvalidOrExpiredSession);
        }
        let user = tx
            .create_user(&NewUser {
                full_name: pending_signup.full_name.clone(),
                email: pending_signup.email.clone(),
                address: address.to_lowercase(),
                display_name: pending_signup.display_name.clone(),
            })
            .await
            .map_err(user_conflict)?;
        tx.commit().await.map_err(user_conflict)?;

        let main_session_id = self.start_main_session(&user).await?;

        if let Err(e) = self.sessions.delete_signup_session(session_id).await {
            warn!("Failed to delete signup session: {}", e);
        }
        if let Err(e) = self.sessions.delete_session_nonce(session_id, address).await {
            warn!("Failed to delete session nonce pointer: {}", e);
        }

        info!(
            user_id = %user.id,
            pending_signup_id = %pending_signup.id,
            "Wallet linked, signup complete"
        );

        Ok(CompleteSignupResult {
            user,
            session_id: main_session_id,
        })
    }

    async fn spend_nonce(&self, nonce: &str, session_id: &str, address: &str) -> AuthResult<()> {
        let stored = self
            .sessions
            .get_nonce(nonce)
            .await?
            .ok_or(AuthError::InvalidOrExpiredNonce)?;

        let record = &stored.record;
        if record.used || record.is_expired(Utc::now()) || !record.is_bound_to(session_id, address)
        {
            return Err(AuthError::InvalidOrExpiredNonce);
        }

        if !self.sessions.consume_nonce(nonce, &stored).await? {
            warn!("Nonce consumed concurrently");
            return Err(AuthError::InvalidOrExpiredNonce);
        }
        Ok(())
    }

    /// Resolve a main session to its user
    pub async fn get_session_user(&self, session_id: &str) -> AuthResult<User> {
        let session = self
            .sessions
            .get_main_session(session_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredSession)?;

        self.store
            .get_user_by_id(session.user_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredSession)
    }

    /// Invalidate a main session
    pub async fn logout(&self, session_id: &str) -> AuthResult<()> {
        self.sessions.delete_main_session(session_id).await
    }

    async fn start_main_session(&self, user: &User) -> AuthResult<String> {
        let session_id = generate_session_id()?;
        let record = MainSessionRecord {
            user_id: user.id,
            address: user.address.clone(),
            email: user.email.clone(),
            created_at: Utc::now(),
        };
        self.sessions
            .create_main_session(&session_id, &record, self.config.main_session_ttl)
            .await?;
        Ok(session_id)
    }

    /// Queue the email on a detached task so caller cancellation cannot drop it
    fn enqueue_magic_link_email(&self, payload: MagicLinkEmailPayload) {
        let queue = self.queue.clone();
        tokio::spawn(async move {
            if let Err(e) = queue.enqueue(SEND_MAGIC_LINK_EMAIL, &payload, None).await {
                error!("Failed to enqueue magic link email: {}", e);
            }
        });
    }
}

fn ttl(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

fn user_conflict(err: DatabaseError) -> AuthError {
    match &err {
        DatabaseError::UniqueViolation { constraint } if constraint == USERS_ADDRESS_CONSTRAINT => {
            AuthError::WalletAlreadyLinked
        }
        DatabaseError::UniqueViolation { constraint } if constraint == USERS_EMAIL_CONSTRAINT => {
            AuthError::EmailAlreadyRegistered
        }
        _ => AuthError::Database(err),
    }
}
