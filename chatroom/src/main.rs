//! Terminal group chat with AI personas.
//!
//! Talks to Gemini directly by default:
//!
//! ```bash
//! GEMINI_API_KEY=... cargo run -p chatroom
//! ```
//!
//! or to a running `chatroom-server`:
//!
//! ```bash
//! cargo run -p chatroom -- --server http://127.0.0.1:3000/api/chat
//! ```

mod render;
mod terminal;

use anyhow::{Context, Result};
use chatroom_core::{ChatBackend, ChatSession, DirectBackend, RemoteBackend, Roster, SessionConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Post turns to a chat endpoint instead of calling Gemini directly
    #[arg(long, env = "CHATROOM_SERVER_URL", conflicts_with = "direct")]
    server: Option<String>,

    /// Call Gemini directly with GEMINI_API_KEY (the default)
    #[arg(long)]
    direct: bool,

    /// Directory the room's memory, transcript and theme are kept in
    #[arg(long, env = "CHATROOM_DATA_DIR", default_value = ".chatroom")]
    data_dir: PathBuf,

    /// Gemini model to generate with
    #[arg(long, env = "GEMINI_MODEL")]
    model: Option<String>,

    /// Disable idle chatter
    #[arg(long)]
    no_idle: bool,

    /// Seed for reproducible typing delays and read markers
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Logs go to stderr so they never interleave with the chat itself.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatroom=warn,chatroom_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = SessionConfig::default();
    if let Some(model) = &args.model {
        config = config.with_model(model);
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }

    let backend: Arc<dyn ChatBackend> = match &args.server {
        Some(url) => {
            tracing::info!(url = %url, "using remote chat endpoint");
            Arc::new(RemoteBackend::new(url))
        }
        None => {
            tracing::info!(explicit = args.direct, "calling Gemini directly");
            let backend = DirectBackend::gemini(&config).context(
                "GEMINI_API_KEY is not set; set it in .env or pass --server <url>",
            )?;
            Arc::new(backend)
        }
    };

    let session = ChatSession::open_dir(&args.data_dir, Roster::default_cast(), backend, config)
        .with_context(|| format!("failed to open chat data in {}", args.data_dir.display()))?;

    terminal::run_terminal(Arc::new(session), !args.no_idle).await
}
