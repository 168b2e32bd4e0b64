//! Bidlink CLI
//!
//! Opens the realtime channel for a marketplace user and prints inbound
//! messages as JSON lines.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bidlink::client::storage::FileStore;
use bidlink::{AuthContext, AuthSession, ClientConfig, Locale, Origin, RealtimeEvent, RealtimeManager};

const SESSION_KEY: &str = "session";

#[derive(Parser)]
#[command(name = "bidlink")]
#[command(about = "Realtime channel client for the Bidlink marketplace", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and stream inbound events until Ctrl-C
    Connect {
        /// User to sign in as (defaults to the remembered session)
        #[arg(short, long)]
        user: Option<String>,
        /// Page origin, overrides BIDLINK_ORIGIN
        #[arg(short, long)]
        origin: Option<String>,
        /// Conversation to join once connected (re-joined after reconnects)
        #[arg(short, long)]
        join: Option<String>,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long, value_enum)]
        locale: Option<LocaleArg>,
    },
    /// Forget the remembered session
    Logout,
}

#[derive(Clone, Copy, ValueEnum)]
enum LocaleArg {
    En,
    Ar,
}

impl From<LocaleArg> for Locale {
    fn from(arg: LocaleArg) -> Self {
        match arg {
            LocaleArg::En => Locale::En,
            LocaleArg::Ar => Locale::Ar,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bidlink=info,bidlink_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let store = FileStore::user_config()?;

    match cli.command {
        Commands::Connect {
            user,
            origin,
            join,
            display_name,
            locale,
        } => {
            let session = resolve_session(&store, user, display_name, locale)?;
            run(&store, session, origin, join).await
        }
        Commands::Logout => {
            store.remove(SESSION_KEY)?;
            info!(dir = %store.dir().display(), "Cleared stored session");
            Ok(())
        }
    }
}

fn resolve_session(
    store: &FileStore,
    user: Option<String>,
    display_name: Option<String>,
    locale: Option<LocaleArg>,
) -> anyhow::Result<AuthSession> {
    let stored = store.load::<AuthSession>(SESSION_KEY);
    let mut session = match (user, stored) {
        (Some(user_id), Some(stored)) if stored.user_id == user_id => stored,
        (Some(user_id), _) => AuthSession::new(user_id),
        (None, Some(stored)) => stored,
        (None, None) => bail!("no stored session; pass --user <id>"),
    };
    if display_name.is_some() {
        session.display_name = display_name;
    }
    if let Some(locale) = locale {
        session.locale = locale.into();
    }
    Ok(session)
}

async fn run(
    store: &FileStore,
    session: AuthSession,
    origin: Option<String>,
    join: Option<String>,
) -> anyhow::Result<()> {
    let config = ClientConfig::from_env().context("reading BIDLINK_* environment")?;
    let origin = Origin::parse(origin.as_deref().unwrap_or(&config.origin))?;
    let auth = AuthContext::new(origin);

    let manager = RealtimeManager::builder(auth.clone())
        .ws_path(config.ws_path.clone())
        .auto_connect(config.auto_connect)
        .reconnect(config.reconnect.clone())
        .on_message(|msg| match msg.to_json() {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "Could not print message"),
        })
        .build()?;

    let mut events = manager.subscribe();
    let watcher = manager.clone();
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RealtimeEvent::Connected) => {
                    if let Some(conversation_id) = &join {
                        watcher.join_conversation(conversation_id);
                    }
                }
                Ok(RealtimeEvent::ReconnectExhausted { attempts }) => {
                    warn!(attempts, "Giving up on the realtime channel; press Ctrl-C to exit");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    store.save(SESSION_KEY, &session)?;
    auth.login(session);
    if !config.auto_connect {
        manager.connect();
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    manager.shutdown();
    event_task.abort();
    Ok(())
}
