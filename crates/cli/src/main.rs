use anyhow::Context;
use clap::{Parser, Subcommand};
use hl7::{ControlIdCounter, MessageContext};
use pas_core::store::JsonDirStore;
use pas_core::{
    importer, producers, AgeMode, CoreConfig, IdentifierAllocator, IdentifierSource,
    ImportMessage, MessageReconciler, Production, RecordStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pas")]
#[command(about = "Patient administration store CLI")]
struct Cli {
    /// Root directory of the document store
    #[arg(long, env = "PAS_DATA_DIR", default_value = pas_core::constants::DEFAULT_DATA_DIR)]
    data_dir: PathBuf,
    /// Collection holding patient documents
    #[arg(long, env = "PAS_COLLECTION", default_value = pas_core::constants::DEFAULT_COLLECTION)]
    collection: String,
    /// Three-character prefix of issued identifiers
    #[arg(long, env = "PAS_IDENTIFIER_PREFIX", default_value = pas_core::constants::DEFAULT_IDENTIFIER_PREFIX)]
    identifier_prefix: String,
    /// Largest patient document accepted, in bytes
    #[arg(long, env = "PAS_DOCUMENT_SIZE_LIMIT", default_value_t = pas_core::constants::DEFAULT_DOCUMENT_SIZE_LIMIT)]
    document_size_limit: usize,
    /// Default age matching: masquerade or realistic
    #[arg(long, env = "PAS_AGE_MODE", default_value = "masquerade")]
    age_mode: AgeMode,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import every FHIR bundle (*.json) in a directory
    Import {
        /// Directory of bundle files
        dir: PathBuf,
        /// Also write one message per imported patient: adt, orm or oru
        #[arg(long)]
        message_type: Option<ImportMessage>,
        /// Output directory for messages
        #[arg(long, default_value = "hl7_out")]
        out: PathBuf,
    },
    /// Count patients in an age range
    Count {
        lower: u32,
        upper: u32,
        /// Match on birth date instead of stored age, whatever the default mode
        #[arg(long)]
        realistic: bool,
    },
    /// Write ADT^A01 messages for patients in an age range
    ProduceAdt {
        /// Number of patients
        n: usize,
        lower: u32,
        upper: u32,
        /// Match on birth date instead of stored age, whatever the default mode
        #[arg(long)]
        realistic: bool,
        /// Output directory
        #[arg(long, default_value = "hl7_out")]
        out: PathBuf,
    },
    /// Write OML^O21 lab orders for patients of one age
    ProduceOml {
        /// Number of patients
        n: usize,
        age: u32,
        /// Take patients of any age and force them to AGE
        #[arg(long)]
        assign_age: bool,
        /// Output directory
        #[arg(long, default_value = "hl7_out")]
        out: PathBuf,
    },
    /// Merge an HL7 message file into the store
    Ingest {
        /// ER7 message file
        file: PathBuf,
        /// Drop results that match no outstanding order
        #[arg(long)]
        discard_unmatched: bool,
    },
    /// Show the identifier the next new patient would receive
    NextIdentifier,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("pas=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg = Arc::new(CoreConfig::new(
        cli.data_dir,
        cli.collection,
        cli.identifier_prefix,
        cli.document_size_limit,
    )?
    .with_age_mode(cli.age_mode));
    let store = Arc::new(
        JsonDirStore::open(cfg.collection_dir())
            .with_context(|| format!("opening store at {}", cfg.collection_dir().display()))?,
    );
    tracing::debug!("using store at {}", cfg.collection_dir().display());
    let allocator = Arc::new(IdentifierAllocator::new(store.clone(), &cfg));
    let records = Arc::new(RecordStore::new(
        store,
        allocator.clone(),
        cfg.clone(),
        pas_core::Clock::System,
    ));

    let mut counter = ControlIdCounter::new();
    let mut rng = rand::thread_rng();
    let now = records.clock().now();

    match cli.command {
        Some(Commands::Import {
            dir,
            message_type,
            out,
        }) => {
            let summary = importer::import_directory(&records, &dir)?;
            println!(
                "Imported {} file(s): {} created, {} conflict(s), {} too large, {} failed",
                summary.files,
                summary.created,
                summary.conflicts,
                summary.too_large,
                summary.failed_files
            );
            if let Some(kind) = message_type {
                let mut ctx = MessageContext::new(&mut counter, now, &mut rng);
                let produced =
                    producers::produce_for_imported(&records, &summary.imported, kind, &mut ctx)?;
                report(produced, &out)?;
            }
        }
        Some(Commands::Count {
            lower,
            upper,
            realistic,
        }) => {
            let n = records.count(lower, upper, age_mode(realistic, &cfg))?;
            println!("{n}");
        }
        Some(Commands::ProduceAdt {
            n,
            lower,
            upper,
            realistic,
            out,
        }) => {
            let mut ctx = MessageContext::new(&mut counter, now, &mut rng);
            let mode = age_mode(realistic, &cfg);
            let produced =
                producers::produce_admissions(&records, lower, upper, mode, n, &mut ctx)?;
            report(produced, &out)?;
        }
        Some(Commands::ProduceOml {
            n,
            age,
            assign_age,
            out,
        }) => {
            let mut ctx = MessageContext::new(&mut counter, now, &mut rng);
            let produced = producers::produce_lab_orders(&records, age, n, assign_age, &mut ctx)?;
            report(produced, &out)?;
        }
        Some(Commands::Ingest {
            file,
            discard_unmatched,
        }) => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let mut reconciler = MessageReconciler::new(records);
            if discard_unmatched {
                reconciler = reconciler.with_accept_unmatched_results(false);
            }
            let status = reconciler.ingest(&text)?;
            println!("{}: {status}", file.display());
        }
        Some(Commands::NextIdentifier) => {
            println!("{}", allocator.next_identifier()?);
        }
        None => {
            println!("Use 'pas --help' for commands");
        }
    }

    Ok(())
}

/// `--realistic` forces realistic matching; otherwise the configured mode applies.
fn age_mode(realistic: bool, cfg: &CoreConfig) -> AgeMode {
    if realistic {
        AgeMode::Realistic
    } else {
        cfg.age_mode()
    }
}

/// Writes each message to `<out>/<record id>.hl7`.
fn report(produced: Production, out: &Path) -> anyhow::Result<()> {
    let messages = match produced {
        Production::Messages(messages) => messages,
        Production::Shortfall(missing) => {
            println!("Not enough patients in the store: {missing} more needed");
            return Ok(());
        }
    };

    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    for (id, text) in &messages {
        let path = out.join(format!("{id}.hl7"));
        std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    }
    println!("Wrote {} message(s) to {}", messages.len(), out.display());
    Ok(())
}
