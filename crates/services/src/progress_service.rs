use std::sync::Arc;

use chrono::{DateTime, Utc};
use course_core::completion::{self, CompletionError, CompletionPolicy};
use course_core::model::{
    Certificate, CertificateId, ChapterId, Course, CourseId, NotificationKind, Progress, Quiz,
    QuizId, QuizResult, User, UserId,
};
use serde::Serialize;
use storage::repository::{CourseRepository, ProgressRepository, UserRepository};

use crate::Clock;
use crate::enrollment::Enrollment;
use crate::error::ProgressError;
use crate::notification_service::NotificationService;

/// Minimum final-quiz score that earns a certificate.
pub const CERTIFICATE_MIN_SCORE: u8 = 80;

/// What happens when a learner records progress on a course they do not own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Grant the course instead of rejecting the request.
    pub auto_grant_on_progress: bool,
}

/// Tunables for `ProgressService`.
#[derive(Debug, Clone)]
pub struct ProgressSettings {
    pub completion_policy: CompletionPolicy,
    pub access: AccessPolicy,
    /// Certificate URLs are `{certificate_base_url}/{id}`.
    pub certificate_base_url: String,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            completion_policy: CompletionPolicy::default(),
            access: AccessPolicy::default(),
            certificate_base_url: "http://localhost:3000/certificates".into(),
        }
    }
}

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChapterCompletion {
    pub completion_percentage: u8,
    pub is_completed: bool,
    pub newly_completed_chapter: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizSubmission {
    pub result: QuizResult,
    pub completion_percentage: u8,
    pub is_completed: bool,
    /// Set only when this submission issued the certificate.
    pub certificate: Option<Certificate>,
}

/// Quiz question without the answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LearnerQuestion {
    pub prompt: String,
    pub options: Vec<String>,
}

/// Quiz as shown to a learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LearnerQuiz {
    pub id: QuizId,
    pub title: String,
    pub passing_score: u8,
    pub is_final: bool,
    pub questions: Vec<LearnerQuestion>,
    pub previous_result: Option<QuizResult>,
}

impl LearnerQuiz {
    fn new(quiz: &Quiz, previous_result: Option<QuizResult>) -> Self {
        Self {
            id: quiz.id,
            title: quiz.title.clone(),
            passing_score: quiz.passing_score,
            is_final: quiz.is_final,
            questions: quiz
                .questions
                .iter()
                .map(|q| LearnerQuestion {
                    prompt: q.prompt.clone(),
                    options: q.options.clone(),
                })
                .collect(),
            previous_result,
        }
    }
}

/// Public view of an issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateRecord {
    pub certificate: Certificate,
    pub user_name: String,
    pub course_id: CourseId,
    pub course_title: String,
    pub completed_at: Option<DateTime<Utc>>,
}

/// An owned course with its progress, if any was recorded.
#[derive(Debug, Clone)]
pub struct EnrolledCourse {
    pub course: Course,
    pub progress: Option<Progress>,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Chapter completion, quiz submission and certificate issuance.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    users: Arc<dyn UserRepository>,
    progress: Arc<dyn ProgressRepository>,
    enrollment: Enrollment,
    notifications: NotificationService,
    settings: ProgressSettings,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        users: Arc<dyn UserRepository>,
        progress: Arc<dyn ProgressRepository>,
        notifications: NotificationService,
        settings: ProgressSettings,
    ) -> Self {
        let enrollment = Enrollment::new(clock, Arc::clone(&users), Arc::clone(&progress));
        Self {
            clock,
            courses,
            users,
            progress,
            enrollment,
            notifications,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ProgressSettings {
        &self.settings
    }

    async fn load_course(&self, id: CourseId) -> Result<Course, ProgressError> {
        self.courses
            .get_course(id)
            .await?
            .ok_or(ProgressError::CourseNotFound)
    }

    async fn load_user(&self, id: UserId) -> Result<User, ProgressError> {
        self.users
            .get_user(id)
            .await?
            .ok_or(ProgressError::UserNotFound)
    }

    async fn require_owner(&self, user: UserId, course: CourseId) -> Result<User, ProgressError> {
        let user = self.load_user(user).await?;
        if !user.owns_course(course) {
            tracing::warn!(user = %user.id(), course = %course, "course not owned");
            return Err(ProgressError::NotEnrolled);
        }
        Ok(user)
    }

    async fn load_or_start(
        &self,
        user: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Result<Progress, ProgressError> {
        Ok(self
            .progress
            .get_progress(user, course)
            .await?
            .unwrap_or_else(|| Progress::new(user, course, now)))
    }

    /// Current progress on an owned course, created on first access.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotEnrolled` if the user does not own the course.
    pub async fn get_progress(
        &self,
        user: UserId,
        course: CourseId,
    ) -> Result<Progress, ProgressError> {
        self.load_course(course).await?;
        self.require_owner(user, course).await?;
        let now = self.clock.now();
        let mut progress = self.load_or_start(user, course, now).await?;
        progress.touch(now);
        self.progress.upsert_progress(&progress).await?;
        Ok(progress)
    }

    /// Mark a chapter complete and recompute completion.
    ///
    /// Completing an already completed chapter changes nothing but the
    /// last-accessed time.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CourseNotFound` or `ProgressError::ChapterNotFound`
    /// for unknown ids and `ProgressError::NotEnrolled` when the user does not
    /// own the course and auto-grant is off.
    pub async fn complete_chapter(
        &self,
        user_id: UserId,
        course_id: CourseId,
        chapter: ChapterId,
    ) -> Result<ChapterCompletion, ProgressError> {
        let course = self.load_course(course_id).await?;
        if course.chapter(chapter).is_none() {
            return Err(ProgressError::ChapterNotFound);
        }

        let mut user = self.load_user(user_id).await?;
        if !user.owns_course(course_id) {
            if !self.settings.access.auto_grant_on_progress {
                tracing::warn!(user = %user_id, course = %course_id, "chapter completion without purchase");
                return Err(ProgressError::NotEnrolled);
            }
            self.enrollment.grant(&mut user, course_id).await?;
            tracing::info!(user = %user_id, course = %course_id, "course granted on first progress");
        }

        let now = self.clock.now();
        let mut progress = self.load_or_start(user_id, course_id, now).await?;
        let newly_completed_chapter = progress.mark_chapter_complete(chapter, now);
        self.refresh_completion(&mut progress, &course, now)?;
        self.progress.upsert_progress(&progress).await?;

        tracing::debug!(
            user = %user_id,
            course = %course_id,
            chapter = %chapter,
            percentage = progress.completion_percentage(),
            "chapter completed"
        );
        Ok(ChapterCompletion {
            completion_percentage: progress.completion_percentage(),
            is_completed: progress.is_completed(),
            newly_completed_chapter,
        })
    }

    /// The quiz with answers removed, plus the learner's previous result.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::QuizNotFound` for unknown quizzes and
    /// `ProgressError::NotEnrolled` if the course is not owned.
    pub async fn quiz_for_learner(
        &self,
        user: UserId,
        course_id: CourseId,
        quiz: QuizId,
    ) -> Result<LearnerQuiz, ProgressError> {
        let course = self.load_course(course_id).await?;
        let quiz = course.quiz(quiz).ok_or(ProgressError::QuizNotFound)?;
        self.require_owner(user, course_id).await?;
        let previous = self
            .progress
            .get_progress(user, course_id)
            .await?
            .and_then(|p| p.quiz_result(quiz.id).cloned());
        Ok(LearnerQuiz::new(quiz, previous))
    }

    /// Record a client-graded quiz attempt.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidScore` for scores above 100, plus the
    /// lookup and ownership errors of [`Self::quiz_for_learner`].
    pub async fn submit_quiz(
        &self,
        user: UserId,
        course_id: CourseId,
        quiz: QuizId,
        score: u8,
        passed: bool,
    ) -> Result<QuizSubmission, ProgressError> {
        if score > 100 {
            return Err(ProgressError::InvalidScore(score));
        }
        let course = self.load_course(course_id).await?;
        if course.quiz(quiz).is_none() {
            return Err(ProgressError::QuizNotFound);
        }
        self.record_attempt(user, &course, quiz, score, passed).await
    }

    /// Grade answers on the server, then record the attempt.
    ///
    /// # Errors
    ///
    /// Same as [`Self::submit_quiz`].
    pub async fn grade_and_submit(
        &self,
        user: UserId,
        course_id: CourseId,
        quiz: QuizId,
        answers: &[usize],
    ) -> Result<QuizSubmission, ProgressError> {
        let course = self.load_course(course_id).await?;
        let grade = course
            .quiz(quiz)
            .ok_or(ProgressError::QuizNotFound)?
            .grade(answers);
        self.record_attempt(user, &course, quiz, grade.score, grade.passed)
            .await
    }

    async fn record_attempt(
        &self,
        user_id: UserId,
        course: &Course,
        quiz_id: QuizId,
        score: u8,
        passed: bool,
    ) -> Result<QuizSubmission, ProgressError> {
        let user = self.require_owner(user_id, course.id()).await?;
        let is_final = course.quiz(quiz_id).is_some_and(|q| q.is_final);

        let now = self.clock.now();
        let mut progress = self.load_or_start(user_id, course.id(), now).await?;
        let result = progress
            .record_quiz_attempt(quiz_id, score, passed, now)
            .clone();
        self.refresh_completion(&mut progress, course, now)?;

        let earns_certificate = is_final
            && !course.chapters().is_empty()
            && passed
            && score >= CERTIFICATE_MIN_SCORE
            && progress.certificate().is_none()
            && completion::all_chapters_complete(&progress, course);
        let certificate = earns_certificate.then(|| self.new_certificate(now));
        if let Some(certificate) = &certificate {
            progress.issue_certificate(certificate.clone());
        }
        self.progress.upsert_progress(&progress).await?;

        if let Some(certificate) = &certificate {
            tracing::info!(
                user = %user_id,
                course = %course.id(),
                certificate = %certificate.id,
                "certificate issued"
            );
            self.notifications
                .notify_best_effort(
                    user_id,
                    NotificationKind::Certificate,
                    "Certificate earned",
                    format!(
                        "Congratulations {}, you completed \"{}\". Your certificate: {}",
                        user.name(),
                        course.title(),
                        certificate.url
                    ),
                )
                .await;
        }

        Ok(QuizSubmission {
            result,
            completion_percentage: progress.completion_percentage(),
            is_completed: progress.is_completed(),
            certificate,
        })
    }

    /// Recompute completion in place. A course without chapters stays at 0%.
    fn refresh_completion(
        &self,
        progress: &mut Progress,
        course: &Course,
        now: DateTime<Utc>,
    ) -> Result<(), ProgressError> {
        match completion::evaluate(progress, course, self.settings.completion_policy) {
            Ok(update) => {
                progress.apply_completion(update.completion_percentage, update.is_completed, now);
            }
            Err(CompletionError::NoChapters) => progress.apply_completion(0, false, now),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn new_certificate(&self, now: DateTime<Utc>) -> Certificate {
        let id = CertificateId::generate();
        Certificate {
            id,
            issued_at: now,
            url: format!(
                "{}/{id}",
                self.settings.certificate_base_url.trim_end_matches('/')
            ),
        }
    }

    /// Public certificate verification.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CertificateNotFound` for unknown ids.
    pub async fn certificate(&self, id: CertificateId) -> Result<CertificateRecord, ProgressError> {
        let progress = self
            .progress
            .find_by_certificate(id)
            .await?
            .ok_or(ProgressError::CertificateNotFound)?;
        let certificate = progress
            .certificate()
            .cloned()
            .ok_or(ProgressError::CertificateNotFound)?;
        let user_name = self
            .users
            .get_user(progress.user_id())
            .await?
            .map(|u| u.name().to_string())
            .unwrap_or_default();
        let course_title = self
            .courses
            .get_course(progress.course_id())
            .await?
            .map(|c| c.title().to_string())
            .unwrap_or_default();
        Ok(CertificateRecord {
            certificate,
            user_name,
            course_id: progress.course_id(),
            course_title,
            completed_at: progress.completed_at(),
        })
    }

    /// Owned courses in id order, each with its progress record.
    ///
    /// Courses deleted since purchase are skipped.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::UserNotFound` for unknown users.
    pub async fn my_courses(&self, user: UserId) -> Result<Vec<EnrolledCourse>, ProgressError> {
        let user = self.load_user(user).await?;
        let mut records = self.progress.list_progress_for_user(user.id()).await?;
        let mut out = Vec::with_capacity(user.purchased_courses().len());
        for course_id in user.purchased_courses() {
            let Some(course) = self.courses.get_course(*course_id).await? else {
                continue;
            };
            let progress = records
                .iter()
                .position(|p| p.course_id() == *course_id)
                .map(|i| records.swap_remove(i));
            out.push(EnrolledCourse { course, progress });
        }
        Ok(out)
    }
}
