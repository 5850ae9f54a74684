use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use course_core::model::{CertificateId, ChapterId, CourseId, QuizId};
use serde::Deserialize;
use services::{CertificateRecord, ChapterCompletion, LearnerQuiz, QuizSubmission};

use crate::AppState;
use crate::error::ApiError;
use crate::session::CurrentUser;
use crate::views::{EnrolledCourseView, ProgressView};

pub(crate) fn create_router() -> Router<AppState> {
    Router::new()
        .route("/courses/{course_id}/progress", get(get_progress))
        .route(
            "/courses/{course_id}/chapters/{chapter_id}/complete",
            post(complete_chapter),
        )
        .route("/courses/{course_id}/quizzes/{quiz_id}", get(get_quiz))
        .route(
            "/courses/{course_id}/quizzes/{quiz_id}/submit",
            post(submit_quiz),
        )
        .route("/me/courses", get(my_courses))
        .route("/certificates/{certificate_id}", get(get_certificate))
}

async fn get_progress(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(course_id): Path<CourseId>,
) -> Result<Json<ProgressView>, ApiError> {
    let progress = state
        .services
        .progress()
        .get_progress(user.id(), course_id)
        .await?;
    Ok(Json(ProgressView::from(&progress)))
}

async fn complete_chapter(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((course_id, chapter_id)): Path<(CourseId, ChapterId)>,
) -> Result<Json<ChapterCompletion>, ApiError> {
    let completion = state
        .services
        .progress()
        .complete_chapter(user.id(), course_id, chapter_id)
        .await?;
    Ok(Json(completion))
}

async fn get_quiz(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((course_id, quiz_id)): Path<(CourseId, QuizId)>,
) -> Result<Json<LearnerQuiz>, ApiError> {
    let quiz = state
        .services
        .progress()
        .quiz_for_learner(user.id(), course_id, quiz_id)
        .await?;
    Ok(Json(quiz))
}

/// Either chosen options for server-side grading or a client-computed score.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum QuizAttempt {
    Answers { answers: Vec<usize> },
    Scored { score: u8, passed: bool },
}

async fn submit_quiz(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((course_id, quiz_id)): Path<(CourseId, QuizId)>,
    Json(attempt): Json<QuizAttempt>,
) -> Result<Json<QuizSubmission>, ApiError> {
    let progress = state.services.progress();
    let submission = match attempt {
        QuizAttempt::Answers { answers } => {
            progress
                .grade_and_submit(user.id(), course_id, quiz_id, &answers)
                .await?
        }
        QuizAttempt::Scored { score, passed } => {
            progress
                .submit_quiz(user.id(), course_id, quiz_id, score, passed)
                .await?
        }
    };
    Ok(Json(submission))
}

async fn my_courses(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<EnrolledCourseView>>, ApiError> {
    let courses = state.services.progress().my_courses(user.id()).await?;
    Ok(Json(courses.iter().map(EnrolledCourseView::from).collect()))
}

async fn get_certificate(
    State(state): State<AppState>,
    Path(certificate_id): Path<CertificateId>,
) -> Result<Json<CertificateRecord>, ApiError> {
    let record = state
        .services
        .progress()
        .certificate(certificate_id)
        .await?;
    Ok(Json(record))
}
