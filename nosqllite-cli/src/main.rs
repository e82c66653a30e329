use clap::{Parser, Subcommand, ValueEnum};
use nosqllite::{content_hash, Database, Key, NosqlliteError, SyncOutcome};
use std::process;

/// nosqllite CLI — inspect and edit a nosqllite database from the command line
#[derive(Parser)]
#[command(name = "nosqllite", version, about)]
struct Cli {
    /// Path to the database directory (default: $NOSQLLITE_DATA_DIR, then the current directory)
    #[arg(long)]
    data_dir: Option<String>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new database directory
    Init,

    /// List documents with their metadata
    List,

    /// Create a document (returns the existing one if the name is taken)
    New {
        /// Document name
        document: String,
    },

    /// Print a document's data, or a single key of it
    Get {
        /// Document name
        document: String,
        /// Field name, or element index for array documents
        key: Option<String>,
    },

    /// Set a key and sync the document
    Set {
        /// Document name
        document: String,
        /// Field name, or element index for array documents
        key: String,
        /// Value, parsed as JSON when possible (e.g. 30, true, '{"age": 30}')
        value: String,
    },

    /// Remove a key and sync the document
    Remove {
        /// Document name
        document: String,
        /// Field name, or element index for array documents
        key: String,
    },

    /// Write every document whose data changed
    Sync,

    /// Show the stored and current content hash of a document
    Hash {
        /// Document name
        document: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| std::env::var("NOSQLLITE_DATA_DIR").ok())
        .unwrap_or_else(|| ".".to_string());
    log::debug!("Using database directory: {data_dir}");

    let open = || Database::open(&data_dir);

    match cli.command {
        Command::Init => {
            let db = Database::create(&data_dir)?;
            print_output(
                &serde_json::json!({
                    "ok": true,
                    "database": db.name(),
                    "path": db.path().display().to_string(),
                }),
                &cli.format,
            )?;
        }

        Command::List => {
            let db = open()?;
            let docs: Vec<serde_json::Value> = db
                .documents()
                .map(|doc| {
                    serde_json::json!({
                        "name": doc.name(),
                        "timestamp": doc.metadata().timestamp,
                        "modified_at": doc.metadata().modified_at().map(|t| t.to_rfc3339()),
                        "datahash": doc.metadata().datahash,
                        "dirty": doc.is_dirty(),
                    })
                })
                .collect();
            print_output(&serde_json::Value::Array(docs), &cli.format)?;
        }

        Command::New { document } => {
            let mut db = open()?;
            let doc = db.new_document(&document)?;
            print_output(
                &serde_json::json!({
                    "ok": true,
                    "document": doc.name(),
                    "path": doc.path().display().to_string(),
                }),
                &cli.format,
            )?;
        }

        Command::Get { document, key } => {
            let db = open()?;
            let doc = db.get(&document)?;
            let value = match key {
                Some(key) => doc.get(parse_key(&key, doc.data()))?,
                None => doc.data(),
            };
            print_output(value, &cli.format)?;
        }

        Command::Set {
            document,
            key,
            value,
        } => {
            let mut db = open()?;
            let doc = db.get_mut(&document)?;
            let key = parse_key(&key, doc.data());
            doc.set(key, &parse_value(&value))?;
            let outcome = doc.sync()?;
            print_output(
                &serde_json::json!({ "ok": true, "written": outcome == SyncOutcome::Written }),
                &cli.format,
            )?;
        }

        Command::Remove { document, key } => {
            let mut db = open()?;
            let doc = db.get_mut(&document)?;
            let key = parse_key(&key, doc.data());
            let removed = doc.remove(key)?;
            doc.sync()?;
            print_output(
                &serde_json::json!({ "ok": true, "removed": removed }),
                &cli.format,
            )?;
        }

        Command::Sync => {
            let mut db = open()?;
            let report = match db.sync() {
                Ok(report) => report,
                Err(NosqlliteError::SyncFailed {
                    completed,
                    failures,
                }) => {
                    for failure in &failures {
                        log::error!("{}: {}", failure.document, failure.error);
                    }
                    print_output(
                        &serde_json::json!({
                            "ok": false,
                            "written": completed.written,
                            "unchanged": completed.unchanged,
                            "failed": failures.iter().map(|f| f.document.clone()).collect::<Vec<_>>(),
                        }),
                        &cli.format,
                    )?;
                    return Err(format!("{} document(s) failed to sync", failures.len()).into());
                }
                Err(e) => return Err(e.into()),
            };
            print_output(
                &serde_json::json!({
                    "ok": true,
                    "written": report.written,
                    "unchanged": report.unchanged,
                }),
                &cli.format,
            )?;
        }

        Command::Hash { document } => {
            let db = open()?;
            let doc = db.get(&document)?;
            print_output(
                &serde_json::json!({
                    "document": doc.name(),
                    "stored": doc.metadata().datahash,
                    "current": content_hash(doc.data()),
                    "dirty": doc.is_dirty(),
                }),
                &cli.format,
            )?;
        }
    }

    Ok(())
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// Array documents are addressed by index, object documents by field name.
fn parse_key(raw: &str, data: &serde_json::Value) -> Key {
    match (data, raw.parse::<usize>()) {
        (serde_json::Value::Array(_), Ok(index)) => Key::Index(index),
        _ => Key::Field(raw.to_string()),
    }
}

fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
