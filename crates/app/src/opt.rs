use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};
use course_core::CompletionPolicy;

#[derive(Debug, Parser)]
#[command(name = "coursehub", about = "Course marketplace backend")]
pub(crate) struct Cli {
    #[arg(
        long = "db",
        env = "COURSEHUB_DB_URL",
        default_value = "sqlite:coursehub.sqlite3?mode=rwc",
        global = true
    )]
    pub(crate) db_url: String,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Run the HTTP server.
    Serve(Serve),
    /// Create an admin account and a demo course.
    Seed(Seed),
}

#[derive(Debug, Clone, Args)]
pub(crate) struct Learning {
    #[arg(long, default_value_t = CompletionPolicy::AllQuizzes, value_parser = parse_policy)]
    pub(crate) completion_policy: CompletionPolicy,

    #[arg(
        long,
        help = "Grant a course when a learner records progress without owning it"
    )]
    pub(crate) auto_grant_on_progress: bool,

    #[arg(
        long,
        env = "COURSEHUB_CERTIFICATE_BASE_URL",
        default_value = "http://localhost:3000/certificates"
    )]
    pub(crate) certificate_base_url: String,
}

fn parse_policy(raw: &str) -> Result<CompletionPolicy, String> {
    raw.parse().map_err(|e: course_core::CompletionError| e.to_string())
}

#[derive(Debug, Clone, Args)]
pub(crate) struct Serve {
    #[arg(long, env = "COURSEHUB_BIND", default_value = "127.0.0.1:3000")]
    pub(crate) bind: SocketAddr,

    #[arg(long, env = "COURSEHUB_JWT_SECRET", hide_env_values = true)]
    pub(crate) jwt_secret: String,

    #[arg(long, env = "COURSEHUB_SESSION_TTL_HOURS", default_value_t = 24 * 7)]
    pub(crate) session_ttl_hours: i64,

    #[arg(long = "cors-origin", env = "COURSEHUB_CORS_ORIGINS", value_delimiter = ',')]
    pub(crate) cors_origins: Vec<String>,

    #[arg(long, help = "Mark the session cookie Secure")]
    pub(crate) secure_cookies: bool,

    #[command(flatten)]
    pub(crate) learning: Learning,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct Seed {
    #[arg(long, env = "COURSEHUB_ADMIN_EMAIL", default_value = "admin@example.com")]
    pub(crate) admin_email: String,

    #[arg(long, env = "COURSEHUB_ADMIN_PASSWORD", hide_env_values = true)]
    pub(crate) admin_password: String,

    #[arg(long, default_value = "Administrator")]
    pub(crate) admin_name: String,

    #[arg(long, help = "Skip the demo course")]
    pub(crate) no_demo_course: bool,
}
