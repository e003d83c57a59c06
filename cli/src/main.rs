use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use muhasabah_client::auth::{AuthError, LoginOutcome, RetryCooldown, suggests_password_reset};
use muhasabah_client::config::{ConfigError, normalize_api_url};
use muhasabah_client::net::error::TransportError;
use muhasabah_client::net::types::{ApiRequest, RegisterRequest};
use muhasabah_client::routes::menu::visible_menu;
use muhasabah_client::{AccessDecision, ApiError, AuthClient, ClientConfig, Persistence, Role, RouteTable, Session};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Token file used when neither `--token-file` nor `MUHASABAH_TOKEN_FILE` is set.
const DEFAULT_TOKEN_FILE: &str = ".muhasabah-session.json";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client setup failed: {0}")]
    Transport(#[from] TransportError),
    #[error("{}", .0.user_message())]
    Api(#[from] ApiError),
    #[error("{0}")]
    InvalidInput(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("not logged in; run `muhasabah login` first")]
    NotLoggedIn,
}

impl From<AuthError> for CliError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidInput(fields) => Self::InvalidInput(
                fields
                    .iter()
                    .map(|f| format!("{}: {f}", f.field()))
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            AuthError::Api(e) => Self::Api(e),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "muhasabah", about = "Muhasabah dashboard session CLI")]
struct Cli {
    /// API root, overriding `MUHASABAH_API_URL`.
    #[arg(long)]
    api_url: Option<String>,

    /// Remembered-session file, overriding `MUHASABAH_TOKEN_FILE`.
    #[arg(long)]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session.
    Login(LoginArgs),
    /// Revoke the refresh token and forget the session.
    Logout,
    /// Show the current user's profile.
    Whoami,
    /// Show the sidebar entries the current user may open.
    Menu,
    /// Evaluate the route guard for a path.
    Check { path: String },
    /// Authenticated GET, printed as JSON.
    Get(GetArgs),
    /// Request a new email verification link.
    ResendVerification { email: String },
    /// Create an account; verify the emailed link before logging in.
    Register(RegisterArgs),
    /// Email a password reset link.
    ResetPassword { email: String },
    /// Set a new password from a reset link's uid and token.
    ConfirmReset(ConfirmResetArgs),
}

#[derive(Args, Debug)]
struct LoginArgs {
    /// Email or username.
    identifier: String,

    #[arg(long, env = "MUHASABAH_PASSWORD", hide_env_values = true)]
    password: String,

    /// Keep the session on disk for seven days.
    #[arg(long, default_value_t = false)]
    remember: bool,
}

#[derive(Args, Debug)]
struct RegisterArgs {
    email: String,
    username: String,

    /// One of student, sitting_head, overall_head.
    #[arg(long, value_parser = parse_role)]
    role: Role,

    #[arg(long, env = "MUHASABAH_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long)]
    location: Option<String>,

    #[arg(long)]
    whatsapp: Option<String>,
}

#[derive(Args, Debug)]
struct ConfirmResetArgs {
    uid: String,
    token: String,

    #[arg(long, env = "MUHASABAH_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args, Debug)]
struct GetArgs {
    /// Path under the API root, e.g. `/sittings/sittings/`.
    path: String,

    /// Query parameter as `key=value`; repeatable.
    #[arg(long = "query", short = 'q')]
    query: Vec<String>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.api_url.as_deref(), cli.token_file)?;
    let auth = AuthClient::connect(&config)?;

    match cli.command {
        Command::Login(args) => run_login(&auth, args).await,
        Command::Logout => {
            auth.logout().await;
            println!("logged out");
            Ok(())
        }
        Command::Whoami => {
            require_session(&auth)?;
            let profile = auth.fetch_profile().await?;
            print_json(&serde_json::to_value(&profile)?)
        }
        Command::Menu => {
            for item in visible_menu(&RouteTable::default(), &session_with_role(&auth).await) {
                println!("{:<14} {}", item.name, item.href);
            }
            Ok(())
        }
        Command::Check { path } => {
            let decision = RouteTable::default().check_access(&path, &session_with_role(&auth).await);
            print_decision(&decision);
            Ok(())
        }
        Command::Get(args) => run_get(&auth, args).await,
        Command::ResendVerification { email } => {
            let message = auth.resend_verification(&email).await?;
            println!("{message}");
            Ok(())
        }
        Command::Register(args) => {
            let request = RegisterRequest {
                email: args.email.trim().to_owned(),
                username: args.username.trim().to_owned(),
                password: args.password,
                role: args.role,
                location: args.location,
                whatsapp: args.whatsapp,
            };
            auth.register(&request).await?;
            println!("registered; check {} for the verification link", request.email);
            Ok(())
        }
        Command::ResetPassword { email } => {
            let message = auth.request_password_reset(&email).await?;
            println!("{message}");
            Ok(())
        }
        Command::ConfirmReset(args) => {
            let message = auth
                .confirm_password_reset(&args.uid, &args.token, &args.password)
                .await?;
            println!("{message}");
            Ok(())
        }
    }
}

/// Current session, with the role looked up when the stored session lacks it.
async fn session_with_role(auth: &AuthClient) -> Session {
    let session = auth.session();
    if session.is_authenticated() && session.role.is_none() {
        if let Err(e) = auth.fetch_profile().await {
            tracing::warn!(error = %e, "role unavailable");
        }
        return auth.session();
    }
    session
}

fn parse_role(raw: &str) -> Result<Role, String> {
    Role::parse(raw).ok_or_else(|| format!("unknown role '{raw}'"))
}

fn load_config(api_url: Option<&str>, token_file: Option<PathBuf>) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = api_url {
        config.api_url = normalize_api_url(url)?;
    }
    config.token_file = token_file
        .or(config.token_file)
        .or_else(|| Some(PathBuf::from(DEFAULT_TOKEN_FILE)));
    Ok(config)
}

async fn run_login(auth: &AuthClient, args: LoginArgs) -> Result<(), CliError> {
    let persistence = if args.remember { Persistence::Remembered } else { Persistence::Session };
    match auth.sign_in(&args.identifier, &args.password, persistence).await {
        Ok(LoginOutcome::Authenticated { role, landing_path }) => {
            let role = role.map_or("unknown", |r| r.as_str());
            println!("logged in as {role}; landing page {landing_path}");
            if !args.remember {
                eprintln!("note: session not remembered; pass --remember to keep it for later commands");
            }
            Ok(())
        }
        Ok(LoginOutcome::NeedsVerificationResend { message }) => {
            println!("{message}");
            println!("run `muhasabah resend-verification <email>` to get a new link");
            Ok(())
        }
        Err(AuthError::Api(err)) => {
            if let Some(cooldown) = RetryCooldown::from_error(&err, std::time::Instant::now()) {
                eprintln!("{}", cooldown.button_label(std::time::Instant::now(), false));
            } else if suggests_password_reset(&err) {
                eprintln!("forgot your password? reset it from the login page");
            }
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

async fn run_get(auth: &AuthClient, args: GetArgs) -> Result<(), CliError> {
    require_session(auth)?;
    let mut request = ApiRequest::get(args.path);
    for pair in &args.query {
        let (key, value) = parse_query_pair(pair)?;
        request = request.with_query(key, value);
    }
    let body: Value = auth.gateway().send_json(&request).await?;
    print_json(&body)
}

fn require_session(auth: &AuthClient) -> Result<(), CliError> {
    if auth.store().is_authenticated() { Ok(()) } else { Err(CliError::NotLoggedIn) }
}

fn parse_query_pair(raw: &str) -> Result<(&str, &str), CliError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => Err(CliError::InvalidInput(format!("query must be key=value, got '{raw}'"))),
    }
}

fn print_decision(decision: &AccessDecision) {
    match decision.redirect_location() {
        None => println!("allow"),
        Some(location) => println!("redirect {location}"),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
