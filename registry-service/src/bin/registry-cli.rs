//! Registry maintenance commands.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use common::config::{load_dotenv, AppConfig};
use common::geometry_loader::GeometryLoader;
use common::models::Location;
use common::search::Query;
use common::utils::{wait_for_database, WaitPolicy};
use registry_service::init_tracing;
use registry_service::state::lazy_pool;
use registry_service::store::PgStore;

/// Library registry maintenance.
#[derive(Parser, Debug)]
#[command(name = "registry-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Wait for the database; exit 0 when it answers, 1 otherwise
    WaitDb,

    /// Apply pending database migrations
    Migrate,

    /// Load places from an NDJSON file in a single transaction
    LoadPlaces {
        /// Alternating metadata and GeoJSON geometry lines
        file: PathBuf,
    },

    /// Show how a search string is classified
    Parse {
        query: String,
        /// Searcher location as `latitude,longitude`
        #[arg(long)]
        location: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    load_dotenv();
    let cli = Cli::parse();
    let config = AppConfig::load_with_service("registry-cli");
    init_tracing(config.log_json);

    match cli.command {
        Commands::WaitDb => {
            let policy = WaitPolicy::from_config(&config);
            let outcome = wait_for_database(config.database_url.as_deref(), &policy).await;
            Ok(if outcome.is_ready() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Migrate => {
            let store = PgStore::new(lazy_pool(&config)?);
            store.migrate().await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::LoadPlaces { file } => {
            let reader = File::open(&file)
                .map(BufReader::new)
                .with_context(|| format!("cannot open {}", file.display()))?;
            let store = PgStore::new(lazy_pool(&config)?);

            let mut loader = GeometryLoader::new(store.place_writer().await?);
            let summary = loader.load_ndjson(reader).await?;
            loader.into_sink().commit().await?;

            println!("{} places created, {} updated", summary.created, summary.updated);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Parse { query, location } => {
            let location = location
                .as_deref()
                .map(str::parse::<Location>)
                .transpose()?;
            let query = Query::new(Some(query.as_str()), location);

            println!("{}", serde_json::to_string_pretty(&query)?);
            for target in query.geotargets() {
                println!("geotarget: {}", serde_json::to_string(&target)?);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
