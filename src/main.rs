use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;

mod aggregate;
mod calendar;
mod config;
mod db;
mod error;
mod history;
mod mock;
mod models;
mod params;
mod query;
mod report;
mod routes;
mod sql;
mod telemetry;

use config::{Settings, REPORT_TIMEZONE};
use params::{DateValidation, ReportQuery};

#[derive(Parser)]
#[command(name = "lev-audit-report")]
#[command(about = "Usage reporting over the registration search audit log", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the report and dashboard endpoints
    Serve {
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
        listen: SocketAddr,
    },
    /// Build a usage report and write it as JSON
    Report {
        /// First day, YYYY-MM-DD (defaults to the start of this month)
        #[arg(long)]
        from: Option<String>,
        /// Day after the last one, YYYY-MM-DD
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        group: Option<String>,
        #[arg(long = "without-group")]
        without_groups: Vec<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export daily usage per user as CSV
    Users {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long, default_value = "users.csv")]
        out: PathBuf,
    },
    /// Write the cumulative monthly usage as JSON
    History {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show today's and all-time search counts
    Totals {
        #[arg(long)]
        group: Option<String>,
    },
}

fn write_json<T: Serialize>(value: &T, out: Option<&PathBuf>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Written to {}.", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.settings.log_format)?;

    let source = cli.settings.source().await?;
    let now = Utc::now().with_timezone(&REPORT_TIMEZONE);

    match cli.command {
        Commands::Serve { listen } => {
            let state = routes::AppState::new(source, REPORT_TIMEZONE);
            let listener = tokio::net::TcpListener::bind(listen)
                .await
                .with_context(|| format!("failed to bind {listen}"))?;
            tracing::info!(%listen, mock = cli.settings.mock, "Listening");
            axum::serve(listener, routes::router(state))
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("server error")?;
        }
        Commands::Report {
            from,
            to,
            group,
            without_groups,
            out,
        } => {
            let query = ReportQuery {
                from,
                to,
                current_group: group,
                without_groups,
                ..ReportQuery::default()
            };
            let request = params::bind(query, DateValidation::Strict, now)?;
            let report = report::build(source.as_ref(), &request, now).await?;
            write_json(&report, out.as_ref())?;
        }
        Commands::Users { from, to, out } => {
            let query = ReportQuery {
                from,
                to,
                ..ReportQuery::default()
            };
            let request = params::bind(query, DateValidation::Strict, now)?;
            let rows = source.usage_by_user(&request.filter).await?;

            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            let written = report::write_user_csv(&rows, file)?;
            println!("Exported {written} rows to {}.", out.display());
        }
        Commands::History { out } => {
            let history = history::history(source.as_ref()).await?;
            write_json(&history, out.as_ref())?;
        }
        Commands::Totals { group } => {
            let filter_group = params::group_filter(group.as_deref());
            let dashboard =
                report::dashboard(source.as_ref(), filter_group.as_deref(), group, now).await?;
            println!("Searches today: {}", dashboard.today);
            println!("Searches all time: {}", dashboard.all_time);
        }
    }

    Ok(())
}
