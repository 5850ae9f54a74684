mod course;
mod ids;
mod notification;
mod progress;
mod promo;
mod user;

pub use ids::{
    CertificateId, ChapterId, CourseId, NotificationId, ParseIdError, PromoCodeId, QuizId, UserId,
};

pub use course::{
    Chapter, ChapterDraft, Course, CourseDraft, CourseError, CourseLevel, DEFAULT_PASSING_SCORE,
    Question, Quiz, QuizDraft, QuizGrade,
};
pub(crate) use course::rounded_percent;
pub use notification::{Notification, NotificationKind};
pub use progress::{Certificate, Progress, QuizResult};
pub use promo::{PromoCode, PromoCodeDraft, PromoError, PromoStatus, normalize_code};
pub use user::{Role, User, UserError, normalize_email};
