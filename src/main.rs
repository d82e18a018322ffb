use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use shopload::{
    Executor, FunnelAggregate, FunnelReport, HttpTransport, JsonReporter, Population, Reporter,
    StdoutReporter, StorefrontProfile, storefront,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
}

/// Generate storefront-shaped traffic against a shop.
#[derive(Debug, Parser)]
#[command(name = "shopload", version, about)]
struct Cli {
    /// Base URL of the storefront, e.g. http://localhost:3000
    #[arg(long, env = "SHOPLOAD_HOST")]
    host: String,

    /// Number of concurrent virtual users
    #[arg(short, long, default_value_t = 10)]
    users: usize,

    /// Users started per second
    #[arg(short = 'r', long, default_value_t = 1.0)]
    spawn_rate: f64,

    /// How long to run, e.g. 90s, 10m, 1h
    #[arg(short = 't', long, default_value = "60s", value_parser = parse_duration)]
    run_time: Duration,

    /// Per-request timeout
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    timeout: Duration,

    /// JSON storefront profile; built-in defaults when omitted
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Seed for reproducible identities and flow choices
    #[arg(long)]
    seed: Option<u64>,

    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    format: Format,

    /// Write the report here instead of stdout (json only)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let invalid = || format!("invalid duration: {s}");
    let (value, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(at) => s.split_at(at),
        None => (s, "s"),
    };
    let n: u64 = value.parse().map_err(|_| invalid())?;
    match unit {
        "ms" => Ok(Duration::from_millis(n)),
        "s" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n * 60)),
        "h" => Ok(Duration::from_secs(n * 3600)),
        _ => Err(invalid()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let profile = match &cli.profile {
        Some(path) => {
            tracing::info!("Loading profile from {}", path.display());
            StorefrontProfile::load(path)?
        }
        None => StorefrontProfile::default(),
    };
    let scenario = Arc::new(storefront::scenario(&profile)?);

    let population = Population::builder()
        .users(cli.users)
        .spawn_rate(cli.spawn_rate)
        .run_time(cli.run_time)
        .seed(cli.seed)
        .build();

    let agg: FunnelAggregate = population
        .exec(scenario, |_| HttpTransport::new(cli.host.as_str(), cli.timeout))
        .await?;
    let report = FunnelReport::from(agg);

    match cli.format {
        Format::Table => {
            Reporter::<FunnelAggregate, FunnelReport>::report(&StdoutReporter, &report).await?
        }
        Format::Json => {
            let reporter = JsonReporter {
                path: cli.output.clone(),
            };
            Reporter::<FunnelAggregate, FunnelReport>::report(&reporter, &report).await?
        }
    }

    Ok(())
}
