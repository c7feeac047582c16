use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use telemetry_gateway::config::{GatewayCfg, LogCfg, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "gateway", about = "Hospital telemetry gateway")]
struct Cli {
    /// Extra config file, applied after gateway.toml and GATEWAY__* variables
    #[arg(long)]
    config: Option<String>,

    /// Overrides http.bind
    #[arg(long)]
    http_bind: Option<SocketAddr>,

    /// Print the resolved HTTP bind address and exit
    #[arg(long)]
    print_bind: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the gateway (default)
    Run,
    /// Publish synthetic patient and robot readings
    Simulate,
}

fn init_tracing(cfg: &LogCfg) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "telemetry_gateway=info,gateway=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match cfg.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut cfg = GatewayCfg::load(cli.config)?;
    if let Some(bind) = cli.http_bind {
        cfg.http.bind = bind;
    }
    cfg.validate()?;

    if cli.print_bind {
        println!("{}", cfg.http.bind);
        return Ok(());
    }

    init_tracing(&cfg.log);
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => telemetry_gateway::app::run(cfg).await,
        Command::Simulate => telemetry_gateway::simulator::run(cfg).await,
    }
}
