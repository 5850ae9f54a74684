use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::ids::{ChapterId, CourseId, QuizId};

/// Passing score applied when a quiz draft does not specify one.
pub const DEFAULT_PASSING_SCORE: u8 = 70;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("chapter {index} has an empty title")]
    EmptyChapterTitle { index: usize },

    #[error("duplicate chapter id {0}")]
    DuplicateChapter(ChapterId),

    #[error("duplicate quiz id {0}")]
    DuplicateQuiz(QuizId),

    #[error("quiz {0} has no questions")]
    EmptyQuiz(QuizId),

    #[error("question {question} of quiz {quiz} needs at least two options")]
    TooFewOptions { quiz: QuizId, question: usize },

    #[error("question {question} of quiz {quiz} marks a missing option as correct")]
    CorrectOptionOutOfRange { quiz: QuizId, question: usize },

    #[error("passing score must be between 0 and 100, got {0}")]
    InvalidPassingScore(u8),

    #[error("a course can have at most one final quiz")]
    MultipleFinalQuizzes,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unknown course level: {0}")]
    UnknownLevel(String),
}

//
// ─── LEVEL ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl CourseLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CourseLevel::Beginner => "beginner",
            CourseLevel::Intermediate => "intermediate",
            CourseLevel::Advanced => "advanced",
        }
    }
}

impl fmt::Display for CourseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseLevel {
    type Err = CourseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(CourseError::UnknownLevel(other.to_string())),
        }
    }
}

//
// ─── CHAPTERS & QUIZZES ────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: QuizId,
    pub title: String,
    pub questions: Vec<Question>,
    pub passing_score: u8,
    #[serde(default)]
    pub is_final: bool,
}

/// Outcome of grading a set of answers against a quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizGrade {
    pub score: u8,
    pub passed: bool,
}

impl Quiz {
    /// Grade answers given as option indexes, one per question in order.
    ///
    /// Missing answers count as wrong; extra answers are ignored.
    #[must_use]
    pub fn grade(&self, answers: &[usize]) -> QuizGrade {
        let total = self.questions.len();
        if total == 0 {
            return QuizGrade {
                score: 0,
                passed: false,
            };
        }
        let correct = self
            .questions
            .iter()
            .zip(answers)
            .filter(|(q, a)| q.correct_option == **a)
            .count();
        let score = rounded_percent(correct, total);
        QuizGrade {
            score,
            passed: score >= self.passing_score,
        }
    }
}

/// Half-up rounded `100 * part / whole`, clamped to 100.
///
/// `whole` must be non-zero.
#[must_use]
pub(crate) fn rounded_percent(part: usize, whole: usize) -> u8 {
    let pct = (200 * part + whole) / (2 * whole);
    u8::try_from(pct.min(100)).unwrap_or(100)
}

//
// ─── DRAFTS ────────────────────────────────────────────────────────────────────
//

/// Chapter as submitted by an editor; `id` is assigned when missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterDraft {
    #[serde(default)]
    pub id: Option<ChapterId>,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizDraft {
    #[serde(default)]
    pub id: Option<QuizId>,
    pub title: String,
    pub questions: Vec<Question>,
    #[serde(default)]
    pub passing_score: Option<u8>,
    #[serde(default)]
    pub is_final: bool,
}

/// Editable course content, validated into a [`Course`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price_cents: u64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub level: CourseLevel,
    #[serde(default)]
    pub instructor: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub chapters: Vec<ChapterDraft>,
    #[serde(default)]
    pub quizzes: Vec<QuizDraft>,
}

fn check_url(raw: Option<&str>) -> Result<(), CourseError> {
    match raw {
        Some(raw) if Url::parse(raw).is_err() => Err(CourseError::InvalidUrl(raw.to_string())),
        _ => Ok(()),
    }
}

impl CourseDraft {
    fn build_chapters(chapters: Vec<ChapterDraft>) -> Result<Vec<Chapter>, CourseError> {
        let mut next = chapters
            .iter()
            .filter_map(|c| c.id.map(|id| id.value()))
            .max()
            .unwrap_or(0);
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(chapters.len());

        for (index, draft) in chapters.into_iter().enumerate() {
            let title = draft.title.trim().to_string();
            if title.is_empty() {
                return Err(CourseError::EmptyChapterTitle { index });
            }
            check_url(draft.video_url.as_deref())?;
            let id = draft.id.unwrap_or_else(|| {
                next += 1;
                ChapterId::new(next)
            });
            if !seen.insert(id) {
                return Err(CourseError::DuplicateChapter(id));
            }
            out.push(Chapter {
                id,
                title,
                content: draft.content,
                video_url: draft.video_url,
                duration_minutes: draft.duration_minutes,
            });
        }
        Ok(out)
    }

    fn build_quizzes(quizzes: Vec<QuizDraft>) -> Result<Vec<Quiz>, CourseError> {
        let mut next = quizzes
            .iter()
            .filter_map(|q| q.id.map(|id| id.value()))
            .max()
            .unwrap_or(0);
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(quizzes.len());

        for draft in quizzes {
            let id = draft.id.unwrap_or_else(|| {
                next += 1;
                QuizId::new(next)
            });
            if !seen.insert(id) {
                return Err(CourseError::DuplicateQuiz(id));
            }
            let passing_score = draft.passing_score.unwrap_or(DEFAULT_PASSING_SCORE);
            if passing_score > 100 {
                return Err(CourseError::InvalidPassingScore(passing_score));
            }
            if draft.questions.is_empty() {
                return Err(CourseError::EmptyQuiz(id));
            }
            for (question, q) in draft.questions.iter().enumerate() {
                if q.options.len() < 2 {
                    return Err(CourseError::TooFewOptions { quiz: id, question });
                }
                if q.correct_option >= q.options.len() {
                    return Err(CourseError::CorrectOptionOutOfRange { quiz: id, question });
                }
            }
            out.push(Quiz {
                id,
                title: draft.title,
                questions: draft.questions,
                passing_score,
                is_final: draft.is_final,
            });
        }

        if out.iter().filter(|q| q.is_final).count() > 1 {
            return Err(CourseError::MultipleFinalQuizzes);
        }
        Ok(out)
    }
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// A purchasable unit containing ordered chapters and optional quizzes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    id: CourseId,
    title: String,
    description: String,
    price_cents: u64,
    category: String,
    level: CourseLevel,
    instructor: String,
    thumbnail_url: Option<String>,
    published: bool,
    chapters: Vec<Chapter>,
    quizzes: Vec<Quiz>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Course {
    /// Validate a draft into a course.
    ///
    /// A course without chapters is valid (an unfinished draft); progress
    /// tracking rejects it later.
    ///
    /// # Errors
    ///
    /// Returns `CourseError` if the title, chapters, quizzes or URLs are invalid.
    pub fn new(id: CourseId, draft: CourseDraft, now: DateTime<Utc>) -> Result<Self, CourseError> {
        Self::from_persisted(id, draft, now, now)
    }

    /// Rehydrate a course from storage, re-running validation.
    ///
    /// # Errors
    ///
    /// Returns `CourseError` if the stored content no longer validates.
    pub fn from_persisted(
        id: CourseId,
        draft: CourseDraft,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, CourseError> {
        let title = draft.title.trim().to_string();
        if title.is_empty() {
            return Err(CourseError::EmptyTitle);
        }
        check_url(draft.thumbnail_url.as_deref())?;
        let chapters = CourseDraft::build_chapters(draft.chapters)?;
        let quizzes = CourseDraft::build_quizzes(draft.quizzes)?;

        Ok(Self {
            id,
            title,
            description: draft.description,
            price_cents: draft.price_cents,
            category: draft.category,
            level: draft.level,
            instructor: draft.instructor,
            thumbnail_url: draft.thumbnail_url,
            published: draft.published,
            chapters,
            quizzes,
            created_at,
            updated_at,
        })
    }

    /// Replace the editable content, keeping id and creation time.
    ///
    /// # Errors
    ///
    /// Returns `CourseError` if the new draft is invalid.
    pub fn revise(&self, draft: CourseDraft, now: DateTime<Utc>) -> Result<Self, CourseError> {
        Self::from_persisted(self.id, draft, self.created_at, now)
    }

    /// Convert back into an editable draft with all ids filled in.
    #[must_use]
    pub fn to_draft(&self) -> CourseDraft {
        CourseDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            price_cents: self.price_cents,
            category: self.category.clone(),
            level: self.level,
            instructor: self.instructor.clone(),
            thumbnail_url: self.thumbnail_url.clone(),
            published: self.published,
            chapters: self
                .chapters
                .iter()
                .map(|c| ChapterDraft {
                    id: Some(c.id),
                    title: c.title.clone(),
                    content: c.content.clone(),
                    video_url: c.video_url.clone(),
                    duration_minutes: c.duration_minutes,
                })
                .collect(),
            quizzes: self
                .quizzes
                .iter()
                .map(|q| QuizDraft {
                    id: Some(q.id),
                    title: q.title.clone(),
                    questions: q.questions.clone(),
                    passing_score: Some(q.passing_score),
                    is_final: q.is_final,
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: CourseId) -> Self {
        self.id = id;
        self
    }

    pub fn set_published(&mut self, published: bool, now: DateTime<Utc>) {
        self.published = published;
        self.updated_at = now;
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn price_cents(&self) -> u64 {
        self.price_cents
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn level(&self) -> CourseLevel {
        self.level
    }

    #[must_use]
    pub fn instructor(&self) -> &str {
        &self.instructor
    }

    #[must_use]
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }

    #[must_use]
    pub fn is_published(&self) -> bool {
        self.published
    }

    #[must_use]
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    #[must_use]
    pub fn quizzes(&self) -> &[Quiz] {
        &self.quizzes
    }

    #[must_use]
    pub fn chapter(&self, id: ChapterId) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn quiz(&self, id: QuizId) -> Option<&Quiz> {
        self.quizzes.iter().find(|q| q.id == id)
    }

    #[must_use]
    pub fn final_quiz(&self) -> Option<&Quiz> {
        self.quizzes.iter().find(|q| q.is_final)
    }

    /// Sum of chapter durations in minutes.
    #[must_use]
    pub fn total_duration_minutes(&self) -> u32 {
        self.chapters
            .iter()
            .fold(0_u32, |acc, c| acc.saturating_add(c.duration_minutes))
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn question(correct: usize) -> Question {
        Question {
            prompt: "2 + 2?".into(),
            options: vec!["3".into(), "4".into(), "5".into()],
            correct_option: correct,
        }
    }

    fn chapter(title: &str) -> ChapterDraft {
        ChapterDraft {
            title: title.into(),
            ..ChapterDraft::default()
        }
    }

    fn quiz(is_final: bool) -> QuizDraft {
        QuizDraft {
            title: "Check".into(),
            questions: vec![question(1), question(1)],
            is_final,
            ..QuizDraft::default()
        }
    }

    fn draft() -> CourseDraft {
        CourseDraft {
            title: "Rust Basics".into(),
            chapters: vec![chapter("Intro"), chapter("Ownership")],
            quizzes: vec![quiz(true)],
            ..CourseDraft::default()
        }
    }

    #[test]
    fn assigns_sequential_ids_after_existing_ones() {
        let mut d = draft();
        d.chapters[0].id = Some(ChapterId::new(5));
        let course = Course::new(CourseId::new(1), d, fixed_now()).unwrap();
        let ids: Vec<_> = course.chapters().iter().map(|c| c.id.value()).collect();
        assert_eq!(ids, vec![5, 6]);
        assert_eq!(course.quizzes()[0].id, QuizId::new(1));
        assert_eq!(course.quizzes()[0].passing_score, DEFAULT_PASSING_SCORE);
    }

    #[test]
    fn rejects_blank_title() {
        let mut d = draft();
        d.title = "   ".into();
        assert_eq!(
            Course::new(CourseId::new(1), d, fixed_now()).unwrap_err(),
            CourseError::EmptyTitle
        );
    }

    #[test]
    fn rejects_duplicate_chapter_ids() {
        let mut d = draft();
        d.chapters[0].id = Some(ChapterId::new(1));
        d.chapters[1].id = Some(ChapterId::new(1));
        assert_eq!(
            Course::new(CourseId::new(1), d, fixed_now()).unwrap_err(),
            CourseError::DuplicateChapter(ChapterId::new(1))
        );
    }

    #[test]
    fn rejects_two_final_quizzes() {
        let mut d = draft();
        d.quizzes.push(quiz(true));
        assert_eq!(
            Course::new(CourseId::new(1), d, fixed_now()).unwrap_err(),
            CourseError::MultipleFinalQuizzes
        );
    }

    #[test]
    fn rejects_correct_option_out_of_range() {
        let mut d = draft();
        d.quizzes[0].questions[1].correct_option = 9;
        assert!(matches!(
            Course::new(CourseId::new(1), d, fixed_now()).unwrap_err(),
            CourseError::CorrectOptionOutOfRange { question: 1, .. }
        ));
    }

    #[test]
    fn rejects_malformed_video_url() {
        let mut d = draft();
        d.chapters[0].video_url = Some("not a url".into());
        assert!(matches!(
            Course::new(CourseId::new(1), d, fixed_now()).unwrap_err(),
            CourseError::InvalidUrl(_)
        ));
    }

    #[test]
    fn allows_course_without_chapters() {
        let mut d = draft();
        d.chapters.clear();
        let course = Course::new(CourseId::new(1), d, fixed_now()).unwrap();
        assert!(course.chapters().is_empty());
    }

    #[test]
    fn grade_rounds_half_up_and_applies_passing_score() {
        let course = Course::new(CourseId::new(1), draft(), fixed_now()).unwrap();
        let quiz = &course.quizzes()[0];
        assert_eq!(quiz.grade(&[1, 1]), QuizGrade { score: 100, passed: true });
        assert_eq!(quiz.grade(&[1, 0]), QuizGrade { score: 50, passed: false });
        assert_eq!(quiz.grade(&[]), QuizGrade { score: 0, passed: false });
    }

    #[test]
    fn rounded_percent_matches_half_up() {
        assert_eq!(rounded_percent(1, 3), 33);
        assert_eq!(rounded_percent(2, 3), 67);
        assert_eq!(rounded_percent(1, 8), 13);
        assert_eq!(rounded_percent(4, 5), 80);
        assert_eq!(rounded_percent(7, 5), 100);
    }

    #[test]
    fn draft_round_trip_keeps_ids_stable() {
        let course = Course::new(CourseId::new(1), draft(), fixed_now()).unwrap();
        let mut d = course.to_draft();
        d.chapters.push(chapter("Traits"));
        let revised = course.revise(d, fixed_now()).unwrap();
        let ids: Vec<_> = revised.chapters().iter().map(|c| c.id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(revised.created_at(), course.created_at());
    }

    #[test]
    fn level_parses_known_values() {
        assert_eq!("advanced".parse::<CourseLevel>().unwrap(), CourseLevel::Advanced);
        assert!("expert".parse::<CourseLevel>().is_err());
    }
}
