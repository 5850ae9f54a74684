//! Course completion arithmetic.
//!
//! Maps a learner's [`Progress`] and the owning [`Course`] to a completion
//! percentage and a completed flag. Everything here is pure; callers persist
//! the result.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ChapterId, Course, Progress, QuizId, rounded_percent};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompletionError {
    #[error("course has no chapters; completion is undefined")]
    NoChapters,

    #[error("unknown completion policy: {0}")]
    UnknownPolicy(String),
}

//
// ─── POLICY ────────────────────────────────────────────────────────────────────
//

/// Rule deciding when a course counts as completed.
///
/// All variants require every chapter to be complete; they differ in how
/// quizzes gate completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionPolicy {
    /// Every quiz must be passed (no quizzes means chapters alone decide).
    #[default]
    AllQuizzes,
    /// Only the final quiz must be passed, if the course has one.
    FinalQuiz,
    /// Quizzes never gate completion.
    ChaptersOnly,
}

impl CompletionPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionPolicy::AllQuizzes => "all-quizzes",
            CompletionPolicy::FinalQuiz => "final-quiz",
            CompletionPolicy::ChaptersOnly => "chapters-only",
        }
    }
}

impl fmt::Display for CompletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletionPolicy {
    type Err = CompletionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-quizzes" => Ok(Self::AllQuizzes),
            "final-quiz" => Ok(Self::FinalQuiz),
            "chapters-only" => Ok(Self::ChaptersOnly),
            other => Err(CompletionError::UnknownPolicy(other.to_string())),
        }
    }
}

//
// ─── CALCULATION ───────────────────────────────────────────────────────────────
//

/// Result of evaluating a progress record against its course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletionUpdate {
    pub completion_percentage: u8,
    pub is_completed: bool,
    pub completed_chapters: usize,
    pub total_chapters: usize,
    pub passed_quizzes: usize,
    pub total_quizzes: usize,
}

/// True when every chapter of the course is in the progress record.
#[must_use]
pub fn all_chapters_complete(progress: &Progress, course: &Course) -> bool {
    course
        .chapters()
        .iter()
        .all(|c| progress.is_chapter_complete(c.id))
}

fn quiz_passed(progress: &Progress, quiz: QuizId) -> bool {
    progress.quiz_result(quiz).is_some_and(|r| r.passed)
}

/// Compute completion for `progress` without modifying it.
///
/// Chapters and quizzes count at most once each, and only when they belong
/// to the course.
///
/// # Errors
///
/// Returns `CompletionError::NoChapters` when the course has no chapters.
pub fn evaluate(
    progress: &Progress,
    course: &Course,
    policy: CompletionPolicy,
) -> Result<CompletionUpdate, CompletionError> {
    let chapter_ids: HashSet<ChapterId> = course.chapters().iter().map(|c| c.id).collect();
    if chapter_ids.is_empty() {
        return Err(CompletionError::NoChapters);
    }
    let quiz_ids: HashSet<QuizId> = course.quizzes().iter().map(|q| q.id).collect();

    let completed_chapters = progress
        .completed_chapters()
        .iter()
        .filter(|id| chapter_ids.contains(id))
        .count();
    let passed_quizzes = progress
        .quiz_results()
        .filter(|r| r.passed && quiz_ids.contains(&r.quiz_id))
        .count();

    let total_chapters = chapter_ids.len();
    let total_quizzes = quiz_ids.len();
    let total = total_chapters + total_quizzes;
    let done = completed_chapters + passed_quizzes;
    let completion_percentage = rounded_percent(done, total);

    let chapters_done = completed_chapters == total_chapters;
    let is_completed = chapters_done
        && match policy {
            CompletionPolicy::AllQuizzes => passed_quizzes == total_quizzes,
            CompletionPolicy::FinalQuiz => course
                .final_quiz()
                .is_none_or(|q| quiz_passed(progress, q.id)),
            CompletionPolicy::ChaptersOnly => true,
        };

    Ok(CompletionUpdate {
        completion_percentage,
        is_completed,
        completed_chapters,
        total_chapters,
        passed_quizzes,
        total_quizzes,
    })
}

/// Return `progress` with percentage and completed flag recomputed.
///
/// # Errors
///
/// Returns `CompletionError::NoChapters` when the course has no chapters.
pub fn recompute(
    mut progress: Progress,
    course: &Course,
    policy: CompletionPolicy,
    now: DateTime<Utc>,
) -> Result<Progress, CompletionError> {
    let update = evaluate(&progress, course, policy)?;
    progress.apply_completion(update.completion_percentage, update.is_completed, now);
    Ok(progress)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
