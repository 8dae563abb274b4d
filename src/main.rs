use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;

use movierec_client::config::{ClientConfig, ConfigError, parse_base_url};
use movierec_client::net::api::{AuthError, HttpAuthApi};
use movierec_client::pages::Navigator;
use movierec_client::pages::signup::{SUCCESS_DESCRIPTION, SUCCESS_TITLE, SignupError, SignupField, SignupStatus, SignupView};
use movierec_client::state::session::SessionManager;
use movierec_client::storage::FileStorage;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("client setup failed: {0}")]
    Client(AuthError),
    #[error("login failed: {0}")]
    Login(AuthError),
    #[error("{0}")]
    Signup(SignupError),
    #[error("not logged in; run `movierec login` first")]
    NotLoggedIn,
    #[error("failed to wait for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "movierec", about = "MovieRec account and session CLI")]
struct Cli {
    #[arg(long, env = "MOVIEREC_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "MOVIEREC_STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account. Does not log in.
    Signup(SignupArgs),
    /// Log in and persist the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MOVIEREC_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Clear the persisted session.
    Logout,
    /// Print the logged-in user.
    Whoami,
    /// Keep the session alive, refreshing the token until interrupted.
    KeepAlive,
}

#[derive(Args, Debug)]
struct SignupArgs {
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    email: String,
    #[arg(long, env = "MOVIEREC_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long)]
    confirm_password: String,
}

/// Forwards redirects from views to the command loop.
struct TerminalNavigator {
    tx: mpsc::UnboundedSender<String>,
}

impl Navigator for TerminalNavigator {
    fn navigate(&self, path: &str) {
        if let Err(e) = self.tx.send(path.to_owned()) {
            tracing::debug!(path = %e.0, "redirect dropped; command loop already finished");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url.as_deref() {
        config.base_url = parse_base_url(base_url)?;
    }
    if let Some(path) = cli.storage_path {
        config.storage_path = path;
    }

    let api = HttpAuthApi::new(config.base_url.clone(), config.timeouts).map_err(CliError::Client)?;
    let session = Arc::new(SessionManager::start(Arc::new(api), Arc::new(FileStorage::new(&config.storage_path))));
    tracing::debug!(base_url = %config.base_url, storage = %config.storage_path.display(), "session ready");

    let result = match cli.command {
        Command::Signup(args) => run_signup(&session, args).await,
        Command::Login { email, password } => run_login(&session, &email, &password).await,
        Command::Logout => {
            session.logout();
            println!("logged out");
            Ok(())
        }
        Command::Whoami => run_whoami(&session),
        Command::KeepAlive => run_keep_alive(&session).await,
    };
    session.shutdown();
    result
}

async fn run_signup(session: &Arc<SessionManager>, args: SignupArgs) -> Result<(), CliError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let view = SignupView::new(Arc::clone(session), Arc::new(TerminalNavigator { tx }));
    view.set_field(SignupField::FirstName, args.first_name);
    view.set_field(SignupField::LastName, args.last_name);
    view.set_field(SignupField::Email, args.email);
    view.set_field(SignupField::Password, args.password);
    view.set_field(SignupField::ConfirmPassword, args.confirm_password);

    match view.submit().await {
        SignupStatus::Succeeded => {
            println!("{SUCCESS_TITLE}");
            println!("{SUCCESS_DESCRIPTION}");
            if let Some(path) = rx.recv().await {
                println!("-> {path}: continue with `movierec login --email <EMAIL>`");
            }
            Ok(())
        }
        SignupStatus::Failed(e) => Err(CliError::Signup(e)),
        SignupStatus::Idle | SignupStatus::Submitting => Err(CliError::Signup(SignupError::Failed)),
    }
}

async fn run_login(session: &SessionManager, email: &str, password: &str) -> Result<(), CliError> {
    let user = session.login(email, password).await.map_err(CliError::Login)?;
    println!("logged in as {} <{}>", user.display_name(), user.email);
    Ok(())
}

fn run_whoami(session: &SessionManager) -> Result<(), CliError> {
    let user = session.user().ok_or(CliError::NotLoggedIn)?;
    println!("{} <{}> (id {})", user.display_name(), user.email, user.id);
    Ok(())
}

async fn run_keep_alive(session: &SessionManager) -> Result<(), CliError> {
    if !session.is_authenticated() {
        return Err(CliError::NotLoggedIn);
    }
    let mut rx = session.subscribe();
    println!("keeping session alive; press Ctrl-C to stop");
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            Ok(())
        }
        _ = rx.wait_for(|state| !state.is_authenticated()) => {
            println!("session ended");
            Err(CliError::NotLoggedIn)
        }
    }
}
