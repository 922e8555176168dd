//! notas CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use notas::{
    commands::{
        cmd_ingest, cmd_init, cmd_query, cmd_schema, cmd_status, print_ingest_report,
        print_init_info, print_query_results, print_schema, print_status, IngestInput,
        QueryOptions,
    },
    config::Config,
    error::{Error, Result},
    progress::LogWriterFactory,
    store::InvoiceDb,
};
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "notas")]
#[command(version, about = "Load invoice CSV exports into SQLite and query them", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize notas configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Load an invoice header export and its item export
    ///
    /// Headers replace the previous headers; items replace the previous
    /// items. Either pass both files or a directory containing
    /// *_nfs_cabecalho.csv and *_nfs_itens.csv.
    Ingest {
        /// Invoice header CSV
        #[arg(required_unless_present = "dir", requires = "items")]
        header: Option<PathBuf>,

        /// Invoice item CSV
        #[arg(required_unless_present = "dir")]
        items: Option<PathBuf>,

        /// Directory to search for the two exports
        #[arg(short, long, conflicts_with_all = ["header", "items"])]
        dir: Option<PathBuf>,
    },

    /// Print the live database schema
    Schema,

    /// Show paths and table row counts
    Status,

    /// Run a SQL query against the database
    Query {
        /// SQL, forwarded as written
        sql: String,

        /// Maximum number of rows
        #[arg(short, long)]
        limit: Option<usize>,

        /// Format numbers as 1.234,56
        #[arg(long)]
        br: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if let Commands::Init { force } = cli.command {
        let info = cmd_init(Some(init_base_dir(cli.config.as_deref())), force).await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&info)?);
        } else {
            print_init_info(&info);
        }
        return Ok(());
    }

    // Handle completions command (doesn't need config or database)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "notas", &mut std::io::stdout());
        return Ok(());
    }

    // Load configuration
    let config = load_config(cli.config.as_deref())?;
    let db = InvoiceDb::connect(&config).await?;

    let outcome = handle_command(&config, &db, cli.command, cli.json).await;
    db.close().await;
    outcome
}

async fn handle_command(config: &Config, db: &InvoiceDb, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Ingest { header, items, dir } => {
            let input = match (dir, header, items) {
                (Some(dir), _, _) => IngestInput::Dir(dir),
                (None, Some(header), Some(items)) => IngestInput::Files { header, items },
                _ => {
                    return Err(Error::Config(
                        "ingest needs <HEADER> <ITEMS> or --dir".to_string(),
                    ))
                }
            };

            let report = cmd_ingest(config, db, input).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_ingest_report(&report);
            }
        }

        Commands::Schema => {
            let info = cmd_schema(db).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print_schema(&info);
            }
        }

        Commands::Status => {
            let status = cmd_status(config, db).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Query { sql, limit, br } => {
            let result = cmd_query(config, db, &sql, QueryOptions { limit }).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_query_results(&result, br || config.query.brazilian_numbers);
            }
        }
    }

    Ok(())
}

/// Base directory for `init`: the parent of a `.toml` path, a directory
/// path as given, or the default location.
fn init_base_dir(path: Option<&Path>) -> PathBuf {
    match path {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_base_dir),
        Some(path) => path.to_path_buf(),
        None => Config::default_base_dir(),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}
