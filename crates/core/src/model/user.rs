use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, PromoCodeId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UserError {
    #[error("invalid email address")]
    InvalidEmail,

    #[error("name cannot be empty")]
    EmptyName,

    #[error("unknown role: {0}")]
    UnknownRole(String),
}

/// Authorization role carried in the session token.
///
/// `Instructor` is accepted everywhere but grants nothing beyond `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
    Instructor,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Instructor => "instructor",
        }
    }

    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "instructor" => Ok(Role::Instructor),
            other => Err(UserError::UnknownRole(other.to_string())),
        }
    }
}

/// Normalize and minimally validate an email address.
///
/// # Errors
///
/// Returns `UserError::InvalidEmail` unless the value has a single `@` with a
/// non-empty local part and a dotted domain.
pub fn normalize_email(raw: &str) -> Result<String, UserError> {
    let email = raw.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(UserError::InvalidEmail);
    };
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@');
    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) {
        return Err(UserError::InvalidEmail);
    }
    Ok(email)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
    email: String,
    name: String,
    password_hash: String,
    role: Role,
    purchased_courses: BTreeSet<CourseId>,
    redeemed_promo_codes: BTreeSet<PromoCodeId>,
    created_at: DateTime<Utc>,
}

impl User {
    /// Create a user account with no courses.
    ///
    /// # Errors
    ///
    /// Returns `UserError` if the email or name is invalid.
    pub fn new(
        id: UserId,
        email: &str,
        name: impl Into<String>,
        password_hash: String,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Self, UserError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(UserError::EmptyName);
        }
        Ok(Self {
            id,
            email: normalize_email(email)?,
            name,
            password_hash,
            role,
            purchased_courses: BTreeSet::new(),
            redeemed_promo_codes: BTreeSet::new(),
            created_at: now,
        })
    }

    /// Rehydrate a user from storage.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        id: UserId,
        email: String,
        name: String,
        password_hash: String,
        role: Role,
        purchased_courses: impl IntoIterator<Item = CourseId>,
        redeemed_promo_codes: impl IntoIterator<Item = PromoCodeId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email,
            name,
            password_hash,
            role,
            purchased_courses: purchased_courses.into_iter().collect(),
            redeemed_promo_codes: redeemed_promo_codes.into_iter().collect(),
            created_at,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: UserId) -> Self {
        self.id = id;
        self
    }

    /// Grant a course. Returns `false` if it was already owned.
    pub fn grant_course(&mut self, course: CourseId) -> bool {
        self.purchased_courses.insert(course)
    }

    /// Remove a course. Returns `false` if it was not owned.
    pub fn revoke_course(&mut self, course: CourseId) -> bool {
        self.purchased_courses.remove(&course)
    }

    /// Record a promo redemption. Returns `false` if already redeemed.
    pub fn record_redemption(&mut self, code: PromoCodeId) -> bool {
        self.redeemed_promo_codes.insert(code)
    }

    pub fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    #[must_use]
    pub fn owns_course(&self, course: CourseId) -> bool {
        self.purchased_courses.contains(&course)
    }

    #[must_use]
    pub fn has_redeemed(&self, code: PromoCodeId) -> bool {
        self.redeemed_promo_codes.contains(&code)
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn purchased_courses(&self) -> &BTreeSet<CourseId> {
        &self.purchased_courses
    }

    #[must_use]
    pub fn redeemed_promo_codes(&self) -> &BTreeSet<PromoCodeId> {
        &self.redeemed_promo_codes
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
