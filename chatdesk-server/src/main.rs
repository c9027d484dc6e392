use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use chatdesk_core::Error;

mod context;
mod http;
mod server;

use context::ServerContext;

#[derive(Parser, Debug, Clone)]
#[command(name = "chatdesk")]
#[command(author, version, about = "Staff live-chat desk: assignment, rebalancing and SLA monitoring")]
pub struct Args {
    /// Mode: "server", "cycle" (run one cycle and exit) or "assign-now"
    #[arg(long, default_value = "server")]
    pub mode: String,

    /// Address the HTTP API binds to
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub server_addr: String,

    /// Postgres connection URL. Falls back to DATABASE_URL.
    #[arg(long)]
    pub database_url: Option<String>,

    #[arg(long, default_value_t = 10)]
    pub max_connections: u32,

    /// Keep all desk state in process memory instead of Postgres
    #[arg(long, default_value = "false")]
    pub in_memory: bool,

    /// Seconds between built-in cycles; 0 leaves cycles to an external cron
    #[arg(long, default_value_t = 120)]
    pub cycle_interval_secs: u64,

    #[arg(long, default_value_t = 60)]
    pub cycle_timeout_secs: u64,

    #[arg(long, default_value_t = 2.0)]
    pub imbalance_threshold: f64,

    /// "agent-id" or "most-headroom"
    #[arg(long, default_value = "agent-id")]
    pub tie_break: String,

    #[arg(long, default_value_t = 3)]
    pub retry_attempts: u32,

    #[arg(long, default_value_t = 2000)]
    pub retry_backoff_ms: u64,

    /// Global first-response SLA in minutes (seeded into sla_policies)
    #[arg(long)]
    pub sla_first_response_mins: Option<i64>,

    /// Global resolution SLA in minutes (seeded into sla_policies)
    #[arg(long)]
    pub sla_resolution_mins: Option<i64>,
}

fn init_tracing() {
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("log bridge not installed: {}", e);
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chatdesk=info,chatdesk_core=info,tower_http=info"));
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!("chatdesk starting. mode={}, in_memory={}", args.mode, args.in_memory);

    match args.mode.as_str() {
        "server" => server::run_server(args).await?,
        "cycle" => {
            let ctx = ServerContext::new(&args).await?;
            let report = server::run_cycle_once(&ctx).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                warn!(failures = report.failures.len(), "cycle finished with failures");
            }
        }
        "assign-now" => {
            let ctx = ServerContext::new(&args).await?;
            let summary = server::assign_now_once(&ctx).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        other => {
            error!("Invalid mode '{}'. Use --mode=server, --mode=cycle or --mode=assign-now.", other);
            return Err(Error::Configuration(format!("unknown mode '{}'", other)));
        }
    }

    info!("Main finished. Goodbye!");
    Ok(())
}
