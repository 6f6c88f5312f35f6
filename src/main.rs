use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paper_meta::config::Config;
use paper_meta::crossref::CrossrefClient;
use paper_meta::pipeline::MetadataPipeline;
use paper_meta::store::RecordStore;

/// Resolve scholarly PDFs to canonical publication metadata via Crossref
#[derive(Parser, Debug)]
#[command(name = "paper-meta")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resolve scholarly PDFs to canonical publication metadata", long_about = None)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory for the record files (default ./data, or PAPER_META_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve a single PDF and persist the record
    Resolve {
        /// Path to the PDF
        pdf: PathBuf,

        /// Display name stored with the record (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Resolve every PDF in a directory
    Process {
        /// Directory containing PDFs
        dir: PathBuf,
    },

    /// List stored records, newest first
    List,

    /// Write the spreadsheet export and print its path
    Export,

    /// Delete a record by id
    Delete {
        /// Record id (doi:... or file:...)
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::default();
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let store = Arc::new(RecordStore::open(config.store_paths())?);
    let client = CrossrefClient::new(config.crossref.clone())?;
    let pipeline =
        MetadataPipeline::new(Arc::clone(&store), client).with_scan_pages(config.scan_pages);

    match cli.command {
        Commands::Resolve { pdf, name } => {
            let record = pipeline.resolve(&pdf, name.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&record.to_legacy())?);
        }
        Commands::Process { dir } => {
            let outcomes = pipeline.process_dir(&dir).await?;
            let mut failures = 0usize;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(record) => println!("ok    {}  ->  {}", outcome.file_name, record.id),
                    Err(err) => {
                        failures += 1;
                        println!("error {}  ->  [{}] {}", outcome.file_name, err.code(), err);
                    }
                }
            }
            println!("{} file(s), {} failure(s)", outcomes.len(), failures);
        }
        Commands::List => {
            println!(
                "{}",
                serde_json::to_string_pretty(&store.reversed_snapshot())?
            );
        }
        Commands::Export => {
            store.flush()?;
            let path = store.export_spreadsheet()?;
            println!("{}", path.display());
        }
        Commands::Delete { id } => {
            if store.delete(&id)? {
                println!("deleted {id}");
            } else {
                println!("no record with id {id}");
            }
        }
    }

    Ok(())
}
