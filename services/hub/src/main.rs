//! hubctl - operator CLI for the hub's registry and listing collaborators.
//!
//! `pull-layer` fetches and verifies one artifact layer; `query` runs a
//! paginated JSON query and prints the `{data, total_count}` payload.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arthub_hub::config::{Config, LogFormat};
use arthub_hub::Services;
use arthub_oci::RegistryPuller;
use arthub_store::{JsonQuery, Pagination, PgDatabase};
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "hubctl", version, about = "Pull artifact layers and run paginated queries")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Pull one layer of an OCI artifact, selected by media type.
    PullLayer {
        /// Artifact reference, e.g. oci://ghcr.io/org/chart:1.0.0
        reference: String,

        /// Media type of the layer to fetch.
        media_type: String,

        #[arg(long, env = "HUB_OCI_USERNAME", default_value = "")]
        username: String,

        #[arg(long, env = "HUB_OCI_PASSWORD", default_value = "", hide_env_values = true)]
        password: String,

        /// Write the layer here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Run a paginated JSON query.
    Query {
        /// Data query; its last two parameters receive limit and offset.
        #[arg(long)]
        sql: String,

        /// Count query over the same predicate.
        #[arg(long)]
        count_sql: String,

        /// Text parameter bound before limit/offset (repeatable).
        #[arg(long = "arg")]
        args: Vec<String>,

        #[arg(long, default_value_t = 20)]
        limit: u32,

        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Prefer RUST_LOG, fall back to HUB_LOG_LEVEL. Logs go to stderr so
    // stdout carries only command output.
    let json = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    match cli.command {
        Command::PullLayer {
            reference,
            media_type,
            username,
            password,
            out,
        } => {
            // Pulls never touch the database; the pool stays unopened.
            let db = PgDatabase::connect_lazy(&config.database)?;
            let services = build_services(&config, db)?;
            let layer = services
                .pull_layer(&reference, &media_type, &username, &password)
                .await
                .with_context(|| format!("failed to pull {media_type} from {reference}"))?;

            match out {
                Some(path) => {
                    tokio::fs::write(&path, &layer.data)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("{}", serde_json::to_string_pretty(&layer.descriptor)?);
                }
                None => {
                    info!(
                        digest = %layer.descriptor.digest,
                        size = layer.descriptor.size,
                        "Writing layer to stdout"
                    );
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&layer.data).await?;
                    stdout.flush().await?;
                }
            }
        }
        Command::Query {
            sql,
            count_sql,
            args,
            limit,
            offset,
        } => {
            let db = PgDatabase::connect(&config.database)
                .await
                .context("failed to connect to database")?;
            let services = build_services(&config, db)?;

            let mut query = JsonQuery::new(sql);
            let mut count_query = JsonQuery::new(count_sql);
            for arg in args {
                query = query.bind(arg.clone());
                count_query = count_query.bind(arg);
            }

            let result = services
                .run_paginated_query(&query, &count_query, Pagination::new(limit, offset))
                .await
                .context("paginated query failed")?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

fn build_services(config: &Config, db: PgDatabase) -> Result<Services> {
    let puller = RegistryPuller::new(config.oci.clone()).context("failed to build HTTP client")?;
    Ok(Services::new(Arc::new(puller), db))
}
