#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use api::AppState;
use chrono::Duration;
use clap::Parser;
use course_core::model::{ChapterDraft, CourseDraft, CourseLevel, Question, QuizDraft, Role};
use http::HeaderValue;
use services::{AccessPolicy, AppServices, AuthError, ProgressSettings, ServiceConfig};
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::opt::{Cli, Commands, Learning, Seed, Serve};

mod opt;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn progress_settings(learning: Learning) -> ProgressSettings {
    ProgressSettings {
        completion_policy: learning.completion_policy,
        access: AccessPolicy {
            auto_grant_on_progress: learning.auto_grant_on_progress,
        },
        certificate_base_url: learning.certificate_base_url,
    }
}

fn cors_origins(raw: &[String]) -> Result<Vec<HeaderValue>> {
    raw.iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("invalid CORS origin {origin}"))
        })
        .collect()
}

async fn serve(db_url: &str, args: Serve) -> Result<()> {
    let mut config = ServiceConfig::new(args.jwt_secret.into_bytes());
    config.session_ttl = Duration::hours(args.session_ttl_hours);
    config.progress = progress_settings(args.learning);
    let clock = config.clock;

    tracing::info!(
        policy = %config.progress.completion_policy,
        auto_grant = config.progress.access.auto_grant_on_progress,
        "initializing services"
    );
    let services = AppServices::new_sqlite(db_url, config)
        .await
        .context("failed to open database")?;

    let mut state = AppState::new(services, clock);
    state.secure_cookies = args.secure_cookies;
    let app = api::router(state, cors_origins(&args.cors_origins)?);

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(address = %args.bind, "server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                tracing::info!("received terminate signal, shutting down");
            }
            Err(error) => {
                tracing::error!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn demo_course() -> CourseDraft {
    let chapter = |title: &str, minutes| ChapterDraft {
        title: title.to_string(),
        content: format!("Notes for {title}."),
        duration_minutes: minutes,
        ..ChapterDraft::default()
    };
    CourseDraft {
        title: "Rust Foundations".into(),
        description: "Ownership, borrowing and error handling from first principles.".into(),
        price_cents: 4_900,
        category: "programming".into(),
        level: CourseLevel::Beginner,
        instructor: "Coursehub Team".into(),
        published: true,
        chapters: vec![
            chapter("Ownership", 25),
            chapter("Borrowing", 30),
            chapter("Lifetimes", 35),
            chapter("Error handling", 20),
        ],
        quizzes: vec![QuizDraft {
            title: "Final assessment".into(),
            questions: vec![
                Question {
                    prompt: "Which keyword transfers ownership into a closure?".into(),
                    options: vec!["ref".into(), "move".into(), "mut".into()],
                    correct_option: 1,
                },
                Question {
                    prompt: "What does the ? operator do on Err?".into(),
                    options: vec!["Panics".into(), "Returns early".into()],
                    correct_option: 1,
                },
            ],
            is_final: true,
            ..QuizDraft::default()
        }],
        ..CourseDraft::default()
    }
}

async fn seed(db_url: &str, args: Seed) -> Result<()> {
    // No sessions are issued while seeding.
    let services = AppServices::new_sqlite(db_url, ServiceConfig::new("seed"))
        .await
        .context("failed to open database")?;

    match services
        .auth()
        .create_account(
            &args.admin_email,
            &args.admin_name,
            &args.admin_password,
            Role::Admin,
        )
        .await
    {
        Ok(admin) => tracing::info!(user = %admin.id(), email = admin.email(), "admin created"),
        Err(AuthError::EmailTaken) => {
            tracing::info!(email = %args.admin_email, "admin already exists");
        }
        Err(e) => return Err(e).context("failed to create admin"),
    }

    if !args.no_demo_course {
        let catalog = services.catalog();
        let draft = demo_course();
        let exists = catalog
            .list_all()
            .await?
            .iter()
            .any(|c| c.title() == draft.title);
        if exists {
            tracing::info!("demo course already present");
        } else {
            let course = catalog.create(draft).await?;
            tracing::info!(course = %course.id(), "demo course created");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => serve(&cli.db_url, args).await,
        Commands::Seed(args) => seed(&cli.db_url, args).await,
    }
}
