mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::purge::PurgeTarget;
use cmd::queue::QueueSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "waybill",
    about = "Durable offline queue for delivery updates and uploads",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .waybill/)
    #[arg(long, global = true, env = "WAYBILL_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .waybill/ with a config and an empty action store
    Init {
        /// Backend base URL
        #[arg(long)]
        url: Option<String>,
        /// Upload via pre-authorized URLs instead of direct upserts
        #[arg(long)]
        signed_urls: bool,
        /// Failed attempts before an action is given up on
        #[arg(long)]
        retry_cap: Option<u32>,
    },

    /// Queue an action for the next sync
    Queue {
        #[command(subcommand)]
        subcommand: QueueSubcommand,
    },

    /// List queued actions in replay order
    List {
        /// Only actions the next sync would attempt
        #[arg(long)]
        eligible: bool,
    },

    /// Show pending/failed counts and per-status totals
    Status,

    /// Replay eligible actions against the backend once
    Sync,

    /// Delete finished actions
    Purge {
        #[arg(value_enum, default_value_t = PurgeTarget::Completed)]
        target: PurgeTarget,
    },

    /// Delete one action that is not currently syncing
    Discard { id: u64 },

    /// Serve the HTTP status and enqueue API
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "4180")]
        port: u16,
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Start offline; report connectivity via POST /api/connectivity
        #[arg(long)]
        offline: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } | Commands::Sync => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init {
            url,
            signed_urls,
            retry_cap,
        } => cmd::init::run(&root, url, signed_urls, retry_cap),
        Commands::Queue { subcommand } => cmd::queue::run(&root, subcommand, cli.json),
        Commands::List { eligible } => cmd::list::run(&root, eligible, cli.json),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Sync => cmd::sync::run(&root, cli.json),
        Commands::Purge { target } => cmd::purge::run(&root, target, cli.json),
        Commands::Discard { id } => cmd::discard::run(&root, id, cli.json),
        Commands::Serve {
            port,
            bind,
            offline,
        } => cmd::serve::run(&root, &bind, port, !offline),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
