//! Response bodies built from domain records.

use chrono::{DateTime, Utc};
use course_core::model::{
    Certificate, ChapterId, Course, CourseDraft, CourseId, CourseLevel, Progress, PromoCode,
    PromoCodeId, PromoStatus, QuizId, QuizResult, Role, User, UserId,
};
use serde::Serialize;
use services::{EnrolledCourse, PromoListing};

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub purchased_courses: Vec<CourseId>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id(),
            email: user.email().to_string(),
            name: user.name().to_string(),
            role: user.role(),
            purchased_courses: user.purchased_courses().iter().copied().collect(),
            created_at: user.created_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CourseSummary {
    pub id: CourseId,
    pub title: String,
    pub description: String,
    pub price_cents: u64,
    pub category: String,
    pub level: CourseLevel,
    pub instructor: String,
    pub thumbnail_url: Option<String>,
    pub chapter_count: usize,
    pub quiz_count: usize,
    pub total_duration_minutes: u32,
}

impl From<&Course> for CourseSummary {
    fn from(course: &Course) -> Self {
        Self {
            id: course.id(),
            title: course.title().to_string(),
            description: course.description().to_string(),
            price_cents: course.price_cents(),
            category: course.category().to_string(),
            level: course.level(),
            instructor: course.instructor().to_string(),
            thumbnail_url: course.thumbnail_url().map(str::to_string),
            chapter_count: course.chapters().len(),
            quiz_count: course.quizzes().len(),
            total_duration_minutes: course.total_duration_minutes(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChapterOutline {
    pub id: ChapterId,
    pub title: String,
    pub duration_minutes: u32,
}

#[derive(Debug, Serialize)]
pub struct QuizOutline {
    pub id: QuizId,
    pub title: String,
    pub question_count: usize,
    pub is_final: bool,
}

/// Public course page. Chapter bodies and answer keys are left out.
#[derive(Debug, Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub summary: CourseSummary,
    pub chapters: Vec<ChapterOutline>,
    pub quizzes: Vec<QuizOutline>,
}

impl From<&Course> for CourseDetail {
    fn from(course: &Course) -> Self {
        Self {
            summary: course.into(),
            chapters: course
                .chapters()
                .iter()
                .map(|c| ChapterOutline {
                    id: c.id,
                    title: c.title.clone(),
                    duration_minutes: c.duration_minutes,
                })
                .collect(),
            quizzes: course
                .quizzes()
                .iter()
                .map(|q| QuizOutline {
                    id: q.id,
                    title: q.title.clone(),
                    question_count: q.questions.len(),
                    is_final: q.is_final,
                })
                .collect(),
        }
    }
}

/// Full editable course, as admins see it.
#[derive(Debug, Serialize)]
pub struct AdminCourseView {
    pub id: CourseId,
    #[serde(flatten)]
    pub draft: CourseDraft,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Course> for AdminCourseView {
    fn from(course: &Course) -> Self {
        Self {
            id: course.id(),
            draft: course.to_draft(),
            created_at: course.created_at(),
            updated_at: course.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProgressView {
    pub course_id: CourseId,
    pub completed_chapters: Vec<ChapterId>,
    pub quiz_results: Vec<QuizResult>,
    pub completion_percentage: u8,
    pub is_completed: bool,
    pub certificate: Option<Certificate>,
    pub started_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Progress> for ProgressView {
    fn from(progress: &Progress) -> Self {
        Self {
            course_id: progress.course_id(),
            completed_chapters: progress.completed_chapters().iter().copied().collect(),
            quiz_results: progress.quiz_results().cloned().collect(),
            completion_percentage: progress.completion_percentage(),
            is_completed: progress.is_completed(),
            certificate: progress.certificate().cloned(),
            started_at: progress.started_at(),
            last_accessed_at: progress.last_accessed_at(),
            completed_at: progress.completed_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EnrolledCourseView {
    pub course: CourseSummary,
    pub progress: Option<ProgressView>,
}

impl From<&EnrolledCourse> for EnrolledCourseView {
    fn from(enrolled: &EnrolledCourse) -> Self {
        Self {
            course: (&enrolled.course).into(),
            progress: enrolled.progress.as_ref().map(ProgressView::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PromoView {
    pub id: PromoCodeId,
    pub code: String,
    pub discount_percent: u8,
    pub course_id: Option<CourseId>,
    pub max_uses: Option<u32>,
    pub current_uses: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub status: PromoStatus,
    pub created_at: DateTime<Utc>,
}

impl PromoView {
    #[must_use]
    pub fn new(promo: &PromoCode, status: PromoStatus) -> Self {
        Self {
            id: promo.id(),
            code: promo.code().to_string(),
            discount_percent: promo.discount_percent(),
            course_id: promo.course_id(),
            max_uses: promo.max_uses(),
            current_uses: promo.current_uses(),
            expires_at: promo.expires_at(),
            is_active: promo.is_active(),
            status,
            created_at: promo.created_at(),
        }
    }
}

impl From<&PromoListing> for PromoView {
    fn from(listing: &PromoListing) -> Self {
        Self::new(&listing.promo, listing.status)
    }
}
