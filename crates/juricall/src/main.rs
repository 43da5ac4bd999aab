use anyhow::Result;
use clap::Parser;
use juricall_dispatch_engine::prelude::*;
use tracing::{info, warn};

/// Juricall: emergency legal-help dispatch server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address for the REST API to bind
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// SQLite database path (omit to run fully in memory)
    #[arg(long)]
    db: Option<String>,

    /// Acceptance window in seconds before an offer times out
    #[arg(long, default_value_t = 20)]
    acceptance_window: u64,

    /// Presence staleness threshold in seconds
    #[arg(long, default_value_t = 45)]
    staleness: u64,

    /// Maximum dispatch attempts before a call escalates
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", &args.log_level);
    }
    tracing_subscriber::fmt::init();

    info!("🚀 Juricall Dispatch v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("==========================================");
    info!("   🌐 Bind:              {}", args.bind);
    info!(
        "   💾 Database:          {}",
        args.db.as_deref().unwrap_or("(in-memory)")
    );
    info!("   ⏱️ Acceptance window: {}s", args.acceptance_window);
    info!("   📡 Staleness:         {}s", args.staleness);
    info!("   🔁 Max attempts:      {}", args.max_attempts);
    info!("==========================================");

    let mut config = DispatchConfig::default();
    config.general.bind_addr = args.bind.parse()?;
    config.dispatch.acceptance_window = std::time::Duration::from_secs(args.acceptance_window);
    config.dispatch.max_attempts = args.max_attempts;
    config.presence.staleness_threshold = std::time::Duration::from_secs(args.staleness);

    let mut builder = DispatchServerBuilder::new().with_config(config);
    if let Some(db) = args.db.clone() {
        builder = builder.with_database_path(db);
    }
    let server = builder.build().await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                warn!("server exited with error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 shutdown signal received");
        }
    }

    info!("👋 dispatch server shutting down");
    Ok(())
}
