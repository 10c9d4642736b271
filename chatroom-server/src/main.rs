use anyhow::Result;
use chatroom_server::{config::DEFAULT_ADDR, init_tracing, run_server, ServerConfig};
use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP listen address
    #[arg(long, env = "CHATROOM_ADDR", default_value = DEFAULT_ADDR)]
    addr: String,

    /// Gemini model to generate with
    #[arg(long, env = "GEMINI_MODEL")]
    model: Option<String>,

    /// Provider timeout in milliseconds
    #[arg(long, default_value_t = 25_000)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing("chatroom_server=info,chatroom_core=info,tower_http=info");

    let mut config = ServerConfig::default()
        .with_listen_addr(&args.addr)?
        .with_request_timeout(Duration::from_millis(args.timeout_ms));
    if let Some(model) = args.model {
        config = config.with_model(model);
    }

    run_server(config).await
}
