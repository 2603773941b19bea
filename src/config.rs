use std::sync::Arc;

use anyhow::Context;
use chrono_tz::Tz;
use clap::Args;
use sqlx::postgres::PgPoolOptions;

use crate::db::{PostgresSource, UsageSource};
use crate::mock::MockSource;
use crate::telemetry::LogFormat;

/// Dates in requests and in the hourly breakdown are read in this zone.
pub const REPORT_TIMEZONE: Tz = chrono_tz::Europe::London;

#[derive(Debug, Args)]
pub struct Settings {
    /// Postgres connection string for the audit database
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,

    /// Serve static fixture data instead of querying the database
    #[arg(long, env = "LEV_REPORT_MOCK", global = true)]
    pub mock: bool,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5, global = true)]
    pub max_connections: u32,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,
}

impl Settings {
    pub async fn source(&self) -> anyhow::Result<Arc<dyn UsageSource>> {
        if self.mock {
            tracing::warn!("Mock mode is on; serving fixture data");
            return Ok(Arc::new(
                MockSource::load().context("failed to load mock fixtures")?,
            ));
        }

        let database_url = self
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;

        Ok(Arc::new(PostgresSource::new(
            pool,
            tracing::info_span!("audit_query"),
        )))
    }
}
