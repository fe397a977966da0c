use acspanel::{
    assemble::Collector,
    config::Config,
    fetch::HttpTransport,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "acspanel")]
#[command(about = "Collect ACS 1-year place data into a place-year panel")]
#[command(version)]
struct Cli {
    /// Output and checkpoint directory [default: data/acs_raw]
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// YAML file overriding groups, states, delays and endpoint
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one (year, group, state) and print it; writes nothing
    FetchOne {
        year: i32,
        /// e.g. B01001
        group: String,
        /// two-digit state FIPS, e.g. 06
        state: String,
    },
    /// Collect every configured state and group for one year
    CollectYear { year: i32 },
    /// Collect start..=end and stack the years into one panel
    CollectRange { start: i32, end: i32 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,acspanel=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.data_dir, cli.config.as_deref())?;
    let transport = HttpTransport::new(config.request_timeout)?;
    let collector = Collector::new(&config, &transport)?;
    info!(
        data_dir = %config.data_dir.display(),
        states = config.states.len(),
        groups = config.groups.len(),
        "startup"
    );

    match cli.command {
        Commands::FetchOne { year, group, state } => {
            let table = collector.fetch_one(year, &group, &state).await?;
            println!("{}", table.headers.join("\t"));
            for row in &table.rows {
                let cells: Vec<&str> = row.iter().map(|v| v.as_deref().unwrap_or("")).collect();
                println!("{}", cells.join("\t"));
            }
            println!("\n{} rows x {} columns", table.num_rows(), table.num_columns());
        }
        Commands::CollectYear { year } => {
            let out = collector.collect_year(year).await?;
            let report = &out.report;
            println!("Year {}", year);
            println!("   Places:    {}", report.places);
            println!("   Variables: {}", report.variables);
            println!(
                "   States:    {} fetched, {} resumed, {} without data",
                report.fetched_states.len(),
                report.resumed_states.len(),
                report.empty_states.len()
            );
            println!("   Requests:  {} ok, {} failed", report.succeeded, report.failed());
            println!("   Output:    {}", collector.checkpoints().year_path(year).display());
            if report.failed() > 0 {
                println!(
                    "   Failures:  {}",
                    collector.checkpoints().failures_path(year).display()
                );
            }
        }
        Commands::CollectRange { start, end } => {
            let out = collector.collect_range(start, end).await?;
            println!("Panel {}-{}", start, end);
            println!("   Rows:      {}", out.panel.num_rows());
            println!("   Columns:   {}", out.panel.num_columns());
            println!(
                "   Years:     {} collected, {} reused, {} failed",
                out.completed.len(),
                out.reused.len(),
                out.failed.len()
            );
            for (year, reason) in &out.failed {
                println!("      {}: {}", year, reason);
            }
            if !out.missing.is_empty() {
                println!("   Missing:   {} variables absent from some years", out.missing.len());
                for (variable, years) in &out.missing {
                    let years: Vec<String> = years.iter().map(|y| y.to_string()).collect();
                    println!("      {}: {}", variable, years.join(", "));
                }
            }
            println!(
                "   Requests:  {} ok, {} failed",
                out.succeeded_requests, out.failed_requests
            );
            println!("   Output:    {}", out.path.display());
        }
    }
    Ok(())
}
