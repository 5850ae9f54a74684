use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, PromoCodeId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PromoError {
    #[error("promo code must be 3-32 characters of A-Z, 0-9, '-' or '_'")]
    InvalidCode,

    #[error("invalid discount range: {0} (expected 1-100)")]
    InvalidDiscount(u8),

    #[error("max uses must be > 0")]
    InvalidMaxUses,

    #[error("promo code is {0}")]
    NotRedeemable(PromoStatus),

    #[error("promo code does not apply to course {0}")]
    WrongCourse(CourseId),
}

/// Lifecycle state of a promo code at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromoStatus {
    Active,
    Exhausted,
    Expired,
    Deactivated,
}

impl PromoStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PromoStatus::Active => "active",
            PromoStatus::Exhausted => "exhausted",
            PromoStatus::Expired => "expired",
            PromoStatus::Deactivated => "deactivated",
        }
    }
}

impl fmt::Display for PromoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper-case and validate a promo code string.
///
/// # Errors
///
/// Returns `PromoError::InvalidCode` for empty, over-long, or non-alphanumeric codes.
pub fn normalize_code(raw: &str) -> Result<String, PromoError> {
    let code = raw.trim().to_uppercase();
    let valid_chars = code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !(3..=32).contains(&code.len()) || !valid_chars {
        return Err(PromoError::InvalidCode);
    }
    Ok(code)
}

/// Admin-editable promo code fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCodeDraft {
    pub code: String,
    pub discount_percent: u8,
    #[serde(default)]
    pub course_id: Option<CourseId>,
    #[serde(default)]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// A redeemable code granting discounted or free course access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoCode {
    id: PromoCodeId,
    code: String,
    discount_percent: u8,
    course_id: Option<CourseId>,
    max_uses: Option<u32>,
    current_uses: u32,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl PromoCode {
    /// Validate a draft into a fresh, unused promo code.
    ///
    /// # Errors
    ///
    /// Returns `PromoError` for a malformed code, a discount outside 1..=100,
    /// or a zero usage cap.
    pub fn new(
        id: PromoCodeId,
        draft: PromoCodeDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, PromoError> {
        Self::from_persisted(id, draft, 0, now)
    }

    /// Rehydrate from storage, re-running validation.
    ///
    /// # Errors
    ///
    /// Returns `PromoError` if the stored fields no longer validate.
    pub fn from_persisted(
        id: PromoCodeId,
        draft: PromoCodeDraft,
        current_uses: u32,
        created_at: DateTime<Utc>,
    ) -> Result<Self, PromoError> {
        let code = normalize_code(&draft.code)?;
        if !(1..=100).contains(&draft.discount_percent) {
            return Err(PromoError::InvalidDiscount(draft.discount_percent));
        }
        if draft.max_uses == Some(0) {
            return Err(PromoError::InvalidMaxUses);
        }
        Ok(Self {
            id,
            code,
            discount_percent: draft.discount_percent,
            course_id: draft.course_id,
            max_uses: draft.max_uses,
            current_uses,
            expires_at: draft.expires_at,
            is_active: draft.is_active,
            created_at,
        })
    }

    /// Apply new editable fields, keeping usage count and creation time.
    ///
    /// # Errors
    ///
    /// Returns `PromoError` if the draft is invalid.
    pub fn revise(&self, draft: PromoCodeDraft) -> Result<Self, PromoError> {
        Self::from_persisted(self.id, draft, self.current_uses, self.created_at)
    }

    #[must_use]
    pub fn with_id(mut self, id: PromoCodeId) -> Self {
        self.id = id;
        self
    }

    /// Current lifecycle state.
    ///
    /// When several conditions hold, manual deactivation wins over expiry,
    /// and expiry over exhaustion.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> PromoStatus {
        if !self.is_active {
            PromoStatus::Deactivated
        } else if self.expires_at.is_some_and(|at| at <= now) {
            PromoStatus::Expired
        } else if self.max_uses.is_some_and(|max| self.current_uses >= max) {
            PromoStatus::Exhausted
        } else {
            PromoStatus::Active
        }
    }

    /// Check the code can be used now, optionally for a specific course.
    ///
    /// # Errors
    ///
    /// Returns `PromoError::NotRedeemable` outside the `Active` state and
    /// `PromoError::WrongCourse` when the code is tied to another course.
    pub fn check_redeemable(
        &self,
        course: Option<CourseId>,
        now: DateTime<Utc>,
    ) -> Result<(), PromoError> {
        let status = self.status(now);
        if status != PromoStatus::Active {
            return Err(PromoError::NotRedeemable(status));
        }
        match (self.course_id, course) {
            (Some(linked), Some(requested)) if linked != requested => {
                Err(PromoError::WrongCourse(requested))
            }
            _ => Ok(()),
        }
    }

    /// Count one use.
    ///
    /// # Errors
    ///
    /// Returns `PromoError::NotRedeemable` if the code is not active.
    pub fn consume(&mut self, now: DateTime<Utc>) -> Result<(), PromoError> {
        let status = self.status(now);
        if status != PromoStatus::Active {
            return Err(PromoError::NotRedeemable(status));
        }
        self.current_uses = self.current_uses.saturating_add(1);
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    /// Price after applying this code's discount, rounded to the nearest cent.
    #[must_use]
    pub fn discounted_price(&self, price_cents: u64) -> u64 {
        let keep = u64::from(100 - self.discount_percent);
        (price_cents * keep + 50) / 100
    }

    #[must_use]
    pub fn id(&self) -> PromoCodeId {
        self.id
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn discount_percent(&self) -> u8 {
        self.discount_percent
    }

    #[must_use]
    pub fn course_id(&self) -> Option<CourseId> {
        self.course_id
    }

    #[must_use]
    pub fn max_uses(&self) -> Option<u32> {
        self.max_uses
    }

    #[must_use]
    pub fn current_uses(&self) -> u32 {
        self.current_uses
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn draft() -> PromoCodeDraft {
        PromoCodeDraft {
            code: "welcome10".into(),
            discount_percent: 10,
            course_id: None,
            max_uses: Some(1),
            expires_at: None,
            is_active: true,
        }
    }

    #[test]
    fn code_is_upper_cased() {
        let promo = PromoCode::new(PromoCodeId::new(1), draft(), fixed_now()).unwrap();
        assert_eq!(promo.code(), "WELCOME10");
    }

    #[test]
    fn discount_out_of_range_is_rejected() {
        for pct in [0, 101] {
            let mut d = draft();
            d.discount_percent = pct;
            assert_eq!(
                PromoCode::new(PromoCodeId::new(1), d, fixed_now()).unwrap_err(),
                PromoError::InvalidDiscount(pct)
            );
        }
    }

    #[test]
    fn single_use_code_exhausts_after_one_consume() {
        let now = fixed_now();
        let mut promo = PromoCode::new(PromoCodeId::new(1), draft(), now).unwrap();
        assert_eq!(promo.status(now), PromoStatus::Active);
        promo.consume(now).unwrap();
        assert_eq!(promo.status(now), PromoStatus::Exhausted);
        assert_eq!(
            promo.consume(now).unwrap_err(),
            PromoError::NotRedeemable(PromoStatus::Exhausted)
        );
    }

    #[test]
    fn deactivation_takes_precedence_over_expiry() {
        let now = fixed_now();
        let mut d = draft();
        d.expires_at = Some(now - Duration::days(1));
        let mut promo = PromoCode::new(PromoCodeId::new(1), d, now).unwrap();
        assert_eq!(promo.status(now), PromoStatus::Expired);
        promo.deactivate();
        assert_eq!(promo.status(now), PromoStatus::Deactivated);
    }

    #[test]
    fn linked_code_rejects_other_course() {
        let mut d = draft();
        d.course_id = Some(CourseId::new(2));
        let promo = PromoCode::new(PromoCodeId::new(1), d, fixed_now()).unwrap();
        assert!(promo.check_redeemable(Some(CourseId::new(2)), fixed_now()).is_ok());
        assert_eq!(
            promo
                .check_redeemable(Some(CourseId::new(3)), fixed_now())
                .unwrap_err(),
            PromoError::WrongCourse(CourseId::new(3))
        );
    }

    #[test]
    fn discounted_price_rounds_to_cent() {
        let mut d = draft();
        d.discount_percent = 15;
        let promo = PromoCode::new(PromoCodeId::new(1), d, fixed_now()).unwrap();
        assert_eq!(promo.discounted_price(1999), 1699);
        d = draft();
        d.discount_percent = 100;
        let free = PromoCode::new(PromoCodeId::new(2), d, fixed_now()).unwrap();
        assert_eq!(free.discounted_price(4900), 0);
    }
}
