use std::io;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use session::picture::mime_for_path;
use session::{
    BackendError, ConfigError, CredentialStore, FileStore, PictureUpload, SessionConfig, SessionController,
    SessionError, SessionEvent, SessionState, StoreError,
};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("backend client setup failed: {0}")]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Token(#[from] claims::MalformedToken),
    #[error("unrecognized image type for {0}")]
    UnknownImageType(String),
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "walkfit", about = "WalkFit session CLI")]
struct Cli {
    #[arg(long, env = "WALKFIT_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "WALKFIT_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Restore the stored session and print it.
    Status,
    /// Log in with a credential and print the resulting session.
    Login {
        token: String,
        /// Treat TOKEN as an identity-provider token and exchange it first.
        #[arg(long, default_value_t = false)]
        exchange: bool,
    },
    Logout {
        /// Also forget the cached profile picture.
        #[arg(long, default_value_t = false)]
        forget_picture: bool,
    },
    /// Retry identity resolution for the stored credential.
    Refresh,
    /// Print a token's claims without verifying it.
    Decode { token: String },
    Picture(PictureCommand),
}

#[derive(Args, Debug)]
struct PictureCommand {
    #[command(subcommand)]
    command: PictureSubcommand,
}

#[derive(Subcommand, Debug)]
enum PictureSubcommand {
    Set { path: PathBuf },
    Clear,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if let Command::Decode { token } = &cli.command {
        return run_decode(token);
    }

    let config = resolve_config(SessionConfig::from_env()?, cli.api_url, cli.state_dir);
    let controller = SessionController::from_config(&config)?;
    let store = FileStore::new(config.state_dir.clone());
    let mut events = controller.subscribe();
    let result = run(&controller, &store, cli.command).await;
    report_events(&mut events);
    result
}

fn resolve_config(mut config: SessionConfig, api_url: Option<String>, state_dir: Option<PathBuf>) -> SessionConfig {
    if let Some(api_url) = api_url {
        config.api_url = api_url.trim_end_matches('/').to_owned();
    }
    if let Some(state_dir) = state_dir {
        config.state_dir = state_dir;
    }
    config
}

async fn run(controller: &SessionController, store: &dyn CredentialStore, command: Command) -> Result<(), CliError> {
    match command {
        Command::Status => {
            controller.start().await;
            print_state(&controller.state())
        }
        Command::Login { token, exchange } => {
            let result = if exchange {
                controller.login_with_provider_token(&token).await
            } else {
                controller.login(&token).await
            };
            print_state(&controller.state())?;
            result.map(|_| ()).map_err(CliError::from)
        }
        Command::Logout { forget_picture } => {
            controller.start().await;
            if forget_picture {
                controller.logout_clearing_picture().await;
            } else {
                controller.logout().await;
            }
            print_state(&controller.state())
        }
        Command::Refresh => {
            // One lookup, and a failure keeps the stored credential for the next retry.
            let Some(credential) = store.load()? else {
                return Err(SessionError::NotAuthenticated.into());
            };
            let result = controller.login(credential.expose()).await;
            print_state(&controller.state())?;
            result.map(|_| ()).map_err(CliError::from)
        }
        Command::Picture(picture) => run_picture(controller, picture).await,
        Command::Decode { token } => run_decode(&token),
    }
}

async fn run_picture(controller: &SessionController, picture: PictureCommand) -> Result<(), CliError> {
    match picture.command {
        PictureSubcommand::Set { path } => {
            let upload = read_upload(&path)?;
            controller.start().await;
            controller.update_picture(upload)?;
            print_state(&controller.state())
        }
        PictureSubcommand::Clear => {
            controller.clear_picture();
            println!("ok");
            Ok(())
        }
    }
}

fn run_decode(token: &str) -> Result<(), CliError> {
    let decoded = claims::decode_unverified(token)?;
    eprintln!("warning: signature not verified; claims are display hints only");
    print_json(&Value::Object(decoded))
}

fn read_upload(path: &Path) -> Result<PictureUpload, CliError> {
    let mime = mime_for_path(path).ok_or_else(|| CliError::UnknownImageType(path.display().to_string()))?;
    let bytes = std::fs::read(path).map_err(|source| CliError::ReadFile { path: path.display().to_string(), source })?;
    Ok(PictureUpload::new(mime, bytes))
}

/// JSON view of the session. The credential itself is never printed.
fn state_view(state: &SessionState) -> Value {
    json!({
        "phase": state.phase().as_str(),
        "authenticated": state.is_authenticated(),
        "loading": state.is_loading(),
        "degraded": state.is_degraded(),
        "identity_source": state.identity_source(),
        "identity": state.identity(),
    })
}

fn print_state(state: &SessionState) -> Result<(), CliError> {
    print_json(&state_view(state))
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

fn report_events(events: &mut broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Unauthorized => eprintln!("server rejected the stored session; log in again"),
            SessionEvent::IdentityUnavailable { message } => eprintln!("{message}"),
            other => tracing::debug!(event = ?other, "session event"),
        }
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
