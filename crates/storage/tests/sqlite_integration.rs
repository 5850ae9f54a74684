use chrono::Duration;
use course_core::model::{
    Certificate, CertificateId, ChapterDraft, ChapterId, Course, CourseDraft, CourseId,
    NotificationKind, Progress, PromoCode, PromoCodeDraft, PromoCodeId, Question, QuizDraft, Role,
    User, UserId,
};
use course_core::time::fixed_now;
use storage::repository::{
    CourseRepository, NewNotification, NotificationRepository, ProgressRepository,
    PromoCodeRepository, StorageError, UserRepository,
};
use storage::sqlite::SqliteRepository;

async fn repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn course(title: &str, published: bool) -> Course {
    let draft = CourseDraft {
        title: title.into(),
        price_cents: 4_900,
        published,
        chapters: vec![
            ChapterDraft {
                title: "Intro".into(),
                video_url: Some("https://cdn.example.com/intro.mp4".into()),
                duration_minutes: 12,
                ..ChapterDraft::default()
            },
            ChapterDraft {
                title: "Deep dive".into(),
                ..ChapterDraft::default()
            },
        ],
        quizzes: vec![QuizDraft {
            title: "Final".into(),
            questions: vec![Question {
                prompt: "Pick b".into(),
                options: vec!["a".into(), "b".into()],
                correct_option: 1,
            }],
            is_final: true,
            ..QuizDraft::default()
        }],
        ..CourseDraft::default()
    };
    Course::new(CourseId::new(0), draft, fixed_now()).unwrap()
}

fn user(email: &str) -> User {
    User::new(UserId::new(0), email, "Learner", "hash".into(), Role::User, fixed_now()).unwrap()
}

fn promo(code: &str, course_id: Option<CourseId>) -> PromoCode {
    PromoCode::new(
        PromoCodeId::new(0),
        PromoCodeDraft {
            code: code.into(),
            discount_percent: 100,
            course_id,
            max_uses: Some(2),
            expires_at: Some(fixed_now() + Duration::days(30)),
            is_active: true,
        },
        fixed_now(),
    )
    .unwrap()
}

#[tokio::test]
async fn course_roundtrip_keeps_content_and_ids() {
    let repo = repo("memdb_course_roundtrip").await;
    let original = course("Rust", true);
    let id = repo.insert_course(&original).await.unwrap();
    repo.insert_course(&course("Draft", false)).await.unwrap();

    let fetched = repo.get_course(id).await.unwrap().expect("course");
    assert_eq!(fetched.title(), "Rust");
    assert_eq!(fetched.chapters(), original.chapters());
    assert_eq!(fetched.quizzes(), original.quizzes());
    assert_eq!(fetched.total_duration_minutes(), 12);

    assert_eq!(repo.list_courses(true).await.unwrap().len(), 1);
    assert_eq!(repo.list_courses(false).await.unwrap().len(), 2);

    let mut revised = fetched.clone();
    revised.set_published(false, fixed_now() + Duration::hours(1));
    repo.upsert_course(&revised).await.unwrap();
    assert!(repo.list_courses(true).await.unwrap().is_empty());

    repo.delete_course(id).await.unwrap();
    assert!(matches!(
        repo.delete_course(id).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn users_keep_ownership_and_reject_duplicate_email() {
    let repo = repo("memdb_users").await;
    let course_id = repo.insert_course(&course("Rust", true)).await.unwrap();
    let promo_id = repo.insert_promo(&promo("WELCOME", None)).await.unwrap();

    let uid = repo.insert_user(&user("Ada@Example.com")).await.unwrap();
    assert!(matches!(
        repo.insert_user(&user("ada@example.com")).await,
        Err(StorageError::Conflict)
    ));

    let mut stored = repo.get_user(uid).await.unwrap().expect("user");
    assert!(stored.grant_course(course_id));
    assert!(stored.record_redemption(promo_id));
    repo.update_user(&stored).await.unwrap();

    let found = repo
        .find_user_by_email(" ADA@example.com ")
        .await
        .unwrap()
        .expect("by email");
    assert!(found.owns_course(course_id));
    assert!(found.has_redeemed(promo_id));

    repo.delete_course(course_id).await.unwrap();
    let after = repo.get_user(uid).await.unwrap().expect("user");
    assert!(!after.owns_course(course_id));
}

#[tokio::test]
async fn progress_roundtrip_and_certificate_lookup() {
    let repo = repo("memdb_progress").await;
    let course_id = repo.insert_course(&course("Rust", true)).await.unwrap();
    let uid = repo.insert_user(&user("grace@example.com")).await.unwrap();

    let mut progress = Progress::new(uid, course_id, fixed_now());
    progress.mark_chapter_complete(ChapterId::new(1), fixed_now());
    progress.mark_chapter_complete(ChapterId::new(2), fixed_now());
    progress.record_quiz_attempt(course_core::model::QuizId::new(1), 100, true, fixed_now());
    progress.apply_completion(100, true, fixed_now());
    let certificate = Certificate {
        id: CertificateId::generate(),
        issued_at: fixed_now(),
        url: "https://certs.example.com/abc".into(),
    };
    progress.issue_certificate(certificate.clone());
    repo.upsert_progress(&progress).await.unwrap();

    let fetched = repo
        .get_progress(uid, course_id)
        .await
        .unwrap()
        .expect("progress");
    assert_eq!(fetched, progress);

    let by_cert = repo
        .find_by_certificate(certificate.id)
        .await
        .unwrap()
        .expect("certificate");
    assert_eq!(by_cert.user_id(), uid);
    assert!(
        repo.find_by_certificate(CertificateId::generate())
            .await
            .unwrap()
            .is_none()
    );

    assert_eq!(repo.list_progress_for_user(uid).await.unwrap().len(), 1);
    assert_eq!(repo.delete_progress_for_course(course_id).await.unwrap(), 1);
    assert!(!repo.delete_progress(uid, course_id).await.unwrap());
}

#[tokio::test]
async fn malformed_progress_json_reads_as_empty() {
    let repo = repo("memdb_progress_lenient").await;
    let course_id = repo.insert_course(&course("Rust", true)).await.unwrap();
    let uid = repo.insert_user(&user("linus@example.com")).await.unwrap();
    repo.upsert_progress(&Progress::new(uid, course_id, fixed_now()))
        .await
        .unwrap();

    sqlx::query("UPDATE progress SET completed_chapters = 'oops', quiz_results = NULL")
        .execute(repo.pool())
        .await
        .unwrap();

    let fetched = repo
        .get_progress(uid, course_id)
        .await
        .unwrap()
        .expect("progress");
    assert!(fetched.completed_chapters().is_empty());
    assert_eq!(fetched.quiz_results().count(), 0);
}

#[tokio::test]
async fn promo_codes_are_unique_and_case_insensitive() {
    let repo = repo("memdb_promos").await;
    let course_id = repo.insert_course(&course("Rust", true)).await.unwrap();
    let id = repo
        .insert_promo(&promo("launch-50", Some(course_id)))
        .await
        .unwrap();
    assert!(matches!(
        repo.insert_promo(&promo("LAUNCH-50", None)).await,
        Err(StorageError::Conflict)
    ));

    let mut found = repo
        .find_promo_by_code("Launch-50")
        .await
        .unwrap()
        .expect("promo");
    assert_eq!(found.id(), id);
    assert_eq!(found.course_id(), Some(course_id));

    found.consume(fixed_now()).unwrap();
    repo.update_promo(&found).await.unwrap();
    let reloaded = repo.get_promo(id).await.unwrap().expect("promo");
    assert_eq!(reloaded.current_uses(), 1);

    repo.delete_course(course_id).await.unwrap();
    assert!(repo.get_promo(id).await.unwrap().is_none());
}

#[tokio::test]
async fn notifications_are_listed_newest_first() {
    let repo = repo("memdb_notifications").await;
    let uid = repo.insert_user(&user("alan@example.com")).await.unwrap();
    for (offset, title) in [(0, "old"), (1, "new")] {
        repo.insert_notification(NewNotification {
            user_id: uid,
            kind: NotificationKind::System,
            title: title.into(),
            message: "hello".into(),
            created_at: fixed_now() + Duration::minutes(offset),
        })
        .await
        .unwrap();
    }

    let listed = repo.list_notifications(uid, 10).await.unwrap();
    assert_eq!(listed[0].title, "new");
    assert_eq!(repo.count_unread(uid).await.unwrap(), 2);

    assert!(repo.mark_read(uid, listed[0].id).await.unwrap());
    assert!(!repo.mark_read(UserId::new(999), listed[1].id).await.unwrap());
    assert_eq!(repo.mark_all_read(uid).await.unwrap(), 1);
    assert_eq!(repo.count_unread(uid).await.unwrap(), 0);
}
