use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use course_core::model::{Role, User, UserId, normalize_email};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use storage::repository::{StorageError, UserRepository};

use crate::Clock;
use crate::error::AuthError;

//
// ─── PASSWORD POLICY ───────────────────────────────────────────────────────────
//

/// Minimum requirements for new passwords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_letter: bool,
    pub require_digit: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_letter: true,
            require_digit: true,
        }
    }
}

impl PasswordPolicy {
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` naming the first unmet requirement.
    pub fn check(&self, password: &str) -> Result<(), AuthError> {
        if password.chars().count() < self.min_length {
            return Err(AuthError::WeakPassword("too short"));
        }
        if self.require_letter && !password.chars().any(char::is_alphabetic) {
            return Err(AuthError::WeakPassword("must contain a letter"));
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(AuthError::WeakPassword("must contain a digit"));
        }
        Ok(())
    }
}

//
// ─── RATE LIMITING ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: DateTime<Utc>,
    failures: u32,
}

/// Fixed-window limiter for failed logins, keyed by normalized email.
#[derive(Debug)]
pub struct LoginRateLimiter {
    max_failures: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new(5, Duration::minutes(15))
    }
}

impl LoginRateLimiter {
    #[must_use]
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self {
            max_failures,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Window>> {
        self.windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// # Errors
    ///
    /// Returns `AuthError::TooManyAttempts` while the key is locked out.
    pub fn check(&self, key: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        let mut windows = self.lock();
        let Some(window) = windows.get(key).copied() else {
            return Ok(());
        };
        let reset_at = window.started_at + self.window;
        if now >= reset_at {
            windows.remove(key);
            return Ok(());
        }
        if window.failures >= self.max_failures {
            return Err(AuthError::TooManyAttempts {
                retry_after_secs: (reset_at - now).num_seconds().max(1),
            });
        }
        Ok(())
    }

    /// Count a failed attempt for `key`. Expired windows are dropped first.
    pub fn record_failure(&self, key: &str, now: DateTime<Utc>) {
        let mut windows = self.lock();
        windows.retain(|_, w| now < w.started_at + self.window);
        let window = windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            failures: 0,
        });
        if now >= window.started_at + self.window {
            *window = Window {
                started_at: now,
                failures: 0,
            };
        }
        window.failures = window.failures.saturating_add(1);
        if window.failures == self.max_failures {
            tracing::warn!(target: "security", email = key, "login rate limit reached");
        }
    }

    pub fn reset(&self, key: &str) {
        self.lock().remove(key);
    }
}

//
// ─── SESSION TOKENS ────────────────────────────────────────────────────────────
//

/// Claims carried by a signed session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 session tokens.
#[derive(Clone)]
pub struct SessionTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Default session lifetime in hours.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;

impl SessionTokens {
    #[must_use]
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// # Errors
    ///
    /// Returns `AuthError::Token` if signing fails.
    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = SessionClaims {
            sub: user.id(),
            role: user.role(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    /// Check signature and expiry against `now`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidSession` for malformed, tampered or expired tokens.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|_| AuthError::InvalidSession)?;
        if data.claims.exp <= now.timestamp() {
            return Err(AuthError::InvalidSession);
        }
        Ok(data.claims)
    }
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Outcome of a successful login.
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// Tunables for `AuthService`.
#[derive(Debug, Clone, Copy)]
pub struct AuthSettings {
    pub password_policy: PasswordPolicy,
    pub bcrypt_cost: u32,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            password_policy: PasswordPolicy::default(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Credentials login, registration and session verification.
#[derive(Clone)]
pub struct AuthService {
    clock: Clock,
    users: Arc<dyn UserRepository>,
    tokens: SessionTokens,
    limiter: Arc<LoginRateLimiter>,
    settings: AuthSettings,
}

impl AuthService {
    #[must_use]
    pub fn new(
        clock: Clock,
        users: Arc<dyn UserRepository>,
        tokens: SessionTokens,
        limiter: Arc<LoginRateLimiter>,
        settings: AuthSettings,
    ) -> Self {
        Self {
            clock,
            users,
            tokens,
            limiter,
            settings,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &SessionTokens {
        &self.tokens
    }

    /// Create a learner account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::User` or `AuthError::WeakPassword` for invalid
    /// input and `AuthError::EmailTaken` for a duplicate email.
    pub async fn register(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        self.create_account(email, name, password, Role::User).await
    }

    /// Create an account with an explicit role. Used for bootstrapping admins.
    ///
    /// # Errors
    ///
    /// Same as [`Self::register`].
    pub async fn create_account(
        &self,
        email: &str,
        name: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AuthError> {
        self.settings.password_policy.check(password)?;
        let hash = bcrypt::hash(password, self.settings.bcrypt_cost)?;
        let user = User::new(UserId::new(0), email, name, hash, role, self.clock.now())?;
        let id = match self.users.insert_user(&user).await {
            Ok(id) => id,
            Err(StorageError::Conflict) => return Err(AuthError::EmailTaken),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(user = %id, role = role.as_str(), "account created");
        Ok(user.with_id(id))
    }

    /// Verify credentials and issue a session token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown email or wrong
    /// password, and `AuthError::TooManyAttempts` while rate limited.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginSession, AuthError> {
        let now = self.clock.now();
        let key = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
        if let Err(err) = self.limiter.check(&key, now) {
            tracing::warn!(target: "security", email = %key, "login rejected by rate limiter");
            return Err(err);
        }

        let user = self.users.find_user_by_email(&key).await?;
        let verified = match &user {
            Some(user) => bcrypt::verify(password, user.password_hash())?,
            None => {
                // Unknown emails pay the same bcrypt cost as a verify.
                bcrypt::hash(password, self.settings.bcrypt_cost)?;
                false
            }
        };
        let Some(user) = user.filter(|_| verified) else {
            self.limiter.record_failure(&key, now);
            tracing::warn!(target: "security", email = %key, "failed login");
            return Err(AuthError::InvalidCredentials);
        };

        self.limiter.reset(&key);
        let token = self.tokens.issue(&user, now)?;
        tracing::info!(user = %user.id(), "login succeeded");
        Ok(LoginSession {
            token,
            expires_at: now + self.tokens.ttl(),
            user,
        })
    }

    /// Verify a token and load its user.
    ///
    /// The role is read from storage, so demotions apply before the token expires.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidSession` for bad tokens or deleted accounts.
    pub async fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        let claims = self.tokens.verify(token, self.clock.now())?;
        self.users
            .get_user(claims.sub)
            .await?
            .ok_or(AuthError::InvalidSession)
    }

    /// Like [`Self::authenticate`], additionally requiring the admin role.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AdminRequired` for non-admin users.
    pub async fn authenticate_admin(&self, token: &str) -> Result<User, AuthError> {
        let user = self.authenticate(token).await?;
        if !user.role().is_admin() {
            tracing::warn!(target: "security", user = %user.id(), "admin route denied");
            return Err(AuthError::AdminRequired);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;

    fn service(clock: Clock, users: Arc<dyn UserRepository>) -> AuthService {
        AuthService::new(
            clock,
            users,
            SessionTokens::new(b"test-secret", Duration::hours(DEFAULT_SESSION_TTL_HOURS)),
            Arc::new(LoginRateLimiter::new(3, Duration::minutes(15))),
            AuthSettings {
                bcrypt_cost: 4,
                ..AuthSettings::default()
            },
        )
    }

    #[test]
    fn password_policy_requires_letter_and_digit() {
        let policy = PasswordPolicy::default();
        assert!(policy.check("short1").is_err());
        assert!(policy.check("12345678").is_err());
        assert!(policy.check("abcdefgh").is_err());
        assert!(policy.check("abcdefg1").is_ok());
    }

    #[test]
    fn tokens_expire_and_reject_tampering() {
        let tokens = SessionTokens::new(b"secret", Duration::hours(1));
        let user = User::new(UserId::new(7), "a@b.io", "A", "h".into(), Role::Admin, fixed_now())
            .unwrap();
        let token = tokens.issue(&user, fixed_now()).unwrap();

        let claims = tokens.verify(&token, fixed_now()).unwrap();
        assert_eq!(claims.sub, UserId::new(7));
        assert_eq!(claims.role, Role::Admin);

        assert!(tokens.verify(&token, fixed_now() + Duration::hours(2)).is_err());
        let other = SessionTokens::new(b"other", Duration::hours(1));
        assert!(other.verify(&token, fixed_now()).is_err());
    }

    #[test]
    fn limiter_window_resets() {
        let limiter = LoginRateLimiter::new(2, Duration::minutes(15));
        limiter.record_failure("a@b.io", fixed_now());
        limiter.record_failure("a@b.io", fixed_now());
        assert!(matches!(
            limiter.check("a@b.io", fixed_now()),
            Err(AuthError::TooManyAttempts { .. })
        ));
        assert!(limiter.check("other@b.io", fixed_now()).is_ok());
        assert!(
            limiter
                .check("a@b.io", fixed_now() + Duration::minutes(15))
                .is_ok()
        );
    }

    #[test]
    fn limiter_drops_expired_windows() {
        let limiter = LoginRateLimiter::new(5, Duration::minutes(15));
        for i in 0..100 {
            limiter.record_failure(&format!("user{i}@example.com"), fixed_now());
        }
        assert_eq!(limiter.lock().len(), 100);

        limiter.record_failure("late@example.com", fixed_now() + Duration::days(1));
        let windows = limiter.lock();
        assert_eq!(windows.len(), 1);
        assert!(windows.contains_key("late@example.com"));
    }

    #[tokio::test]
    async fn register_then_login() {
        let auth = service(fixed_clock(), Arc::new(InMemoryRepository::new()));
        let user = auth
            .register("Learner@Example.com", "Learner", "hunter22")
            .await
            .unwrap();
        assert_eq!(user.email(), "learner@example.com");
        assert_eq!(user.role(), Role::User);

        assert!(matches!(
            auth.register("learner@example.com", "Again", "hunter22").await,
            Err(AuthError::EmailTaken)
        ));

        let session = auth.login("learner@example.com", "hunter22").await.unwrap();
        let me = auth.authenticate(&session.token).await.unwrap();
        assert_eq!(me.id(), user.id());
        assert!(matches!(
            auth.authenticate_admin(&session.token).await,
            Err(AuthError::AdminRequired)
        ));
    }

    #[tokio::test]
    async fn repeated_failures_lock_the_account() {
        let auth = service(fixed_clock(), Arc::new(InMemoryRepository::new()));
        auth.register("x@example.com", "X", "correct1").await.unwrap();
        for _ in 0..3 {
            assert!(matches!(
                auth.login("x@example.com", "wrong123").await,
                Err(AuthError::InvalidCredentials)
            ));
        }
        assert!(matches!(
            auth.login("x@example.com", "correct1").await,
            Err(AuthError::TooManyAttempts { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_email_is_a_generic_failure() {
        let auth = service(fixed_clock(), Arc::new(InMemoryRepository::new()));
        assert!(matches!(
            auth.login("nobody@example.com", "whatever1").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn unknown_email_runs_the_password_hash() {
        let auth = AuthService::new(
            fixed_clock(),
            Arc::new(InMemoryRepository::new()),
            SessionTokens::new(b"test-secret", Duration::hours(1)),
            Arc::new(LoginRateLimiter::default()),
            AuthSettings {
                bcrypt_cost: 3,
                ..AuthSettings::default()
            },
        );
        assert!(matches!(
            auth.login("nobody@example.com", "whatever1").await,
            Err(AuthError::Hash(_))
        ));
    }
}
