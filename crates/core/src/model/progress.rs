use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{CertificateId, ChapterId, CourseId, QuizId, UserId};

/// Latest state of a learner's attempts at one quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizResult {
    pub quiz_id: QuizId,
    pub score: u8,
    pub passed: bool,
    pub attempts: u32,
    pub last_attempt_at: DateTime<Utc>,
}

/// Evidence of course completion. No document is rendered for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    pub issued_at: DateTime<Utc>,
    pub url: String,
}

/// Per-user, per-course completion record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    user_id: UserId,
    course_id: CourseId,
    completed_chapters: BTreeSet<ChapterId>,
    quiz_results: BTreeMap<QuizId, QuizResult>,
    completion_percentage: u8,
    is_completed: bool,
    certificate: Option<Certificate>,
    started_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Progress {
    /// Fresh record with zero completion.
    #[must_use]
    pub fn new(user_id: UserId, course_id: CourseId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            course_id,
            completed_chapters: BTreeSet::new(),
            quiz_results: BTreeMap::new(),
            completion_percentage: 0,
            is_completed: false,
            certificate: None,
            started_at: now,
            last_accessed_at: now,
            completed_at: None,
        }
    }

    /// Rehydrate a record from storage.
    ///
    /// Repeated chapter ids collapse into one, and later quiz results for the
    /// same quiz replace earlier ones. The percentage is clamped to 100.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        user_id: UserId,
        course_id: CourseId,
        completed_chapters: impl IntoIterator<Item = ChapterId>,
        quiz_results: impl IntoIterator<Item = QuizResult>,
        completion_percentage: u8,
        is_completed: bool,
        certificate: Option<Certificate>,
        started_at: DateTime<Utc>,
        last_accessed_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            user_id,
            course_id,
            completed_chapters: completed_chapters.into_iter().collect(),
            quiz_results: quiz_results
                .into_iter()
                .map(|r| (r.quiz_id, r))
                .collect(),
            completion_percentage: completion_percentage.min(100),
            is_completed,
            certificate,
            started_at,
            last_accessed_at,
            completed_at,
        }
    }

    /// Mark a chapter complete. Returns `false` if it already was.
    pub fn mark_chapter_complete(&mut self, chapter: ChapterId, now: DateTime<Utc>) -> bool {
        self.last_accessed_at = now;
        self.completed_chapters.insert(chapter)
    }

    /// Record a quiz attempt.
    ///
    /// Resubmissions increment the attempt counter. A quiz stays passed once
    /// passed and keeps its best score.
    pub fn record_quiz_attempt(
        &mut self,
        quiz_id: QuizId,
        score: u8,
        passed: bool,
        now: DateTime<Utc>,
    ) -> &QuizResult {
        self.last_accessed_at = now;
        let score = score.min(100);
        let entry = self
            .quiz_results
            .entry(quiz_id)
            .and_modify(|r| {
                r.attempts = r.attempts.saturating_add(1);
                r.score = r.score.max(score);
                r.passed |= passed;
                r.last_attempt_at = now;
            })
            .or_insert(QuizResult {
                quiz_id,
                score,
                passed,
                attempts: 1,
                last_attempt_at: now,
            });
        entry
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
    }

    /// Store a recomputed completion state.
    ///
    /// Completion is sticky once a certificate exists.
    pub fn apply_completion(&mut self, percentage: u8, completed: bool, now: DateTime<Utc>) {
        self.completion_percentage = percentage.min(100);
        let completed = completed || self.certificate.is_some();
        if completed && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        if !completed {
            self.completed_at = None;
        }
        self.is_completed = completed;
    }

    /// Attach a certificate and mark the record completed.
    pub fn issue_certificate(&mut self, certificate: Certificate) {
        let issued_at = certificate.issued_at;
        self.certificate = Some(certificate);
        self.is_completed = true;
        if self.completed_at.is_none() {
            self.completed_at = Some(issued_at);
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn completed_chapters(&self) -> &BTreeSet<ChapterId> {
        &self.completed_chapters
    }

    #[must_use]
    pub fn is_chapter_complete(&self, chapter: ChapterId) -> bool {
        self.completed_chapters.contains(&chapter)
    }

    pub fn quiz_results(&self) -> impl Iterator<Item = &QuizResult> {
        self.quiz_results.values()
    }

    #[must_use]
    pub fn quiz_result(&self, quiz: QuizId) -> Option<&QuizResult> {
        self.quiz_results.get(&quiz)
    }

    #[must_use]
    pub fn completion_percentage(&self) -> u8 {
        self.completion_percentage
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    #[must_use]
    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_ref()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}
