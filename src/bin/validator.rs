//! Schema Validator CLI
//!
//! Compiles a schema tree, validates events and bundles against it and
//! browses the compiled classes and objects.
//!
//! Usage:
//!   schema-validator --home ./schema compile
//!   schema-validator --home ./schema validate events.json
//!   schema-validator class network_activity --profile host

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use event_schemas::config::OutputFormat;
use event_schemas::{
    Checksum, DirectoryLoader, EntityKind, Query, Report, SchemaConfig, SchemaRegistry, Snapshot,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-validator")]
#[command(about = "Compile event schemas and validate events against them")]
struct Cli {
    /// Configuration file layered over the default locations
    #[arg(short, long)]
    config: Option<String>,

    /// Schema home directory (overrides the configuration)
    #[arg(long)]
    home: Option<PathBuf>,

    /// Additional extension directories
    #[arg(short, long = "extensions")]
    extensions: Vec<PathBuf>,

    /// Single-line JSON output
    #[arg(long)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the schema and summarize the result
    Compile {
        /// List every compile warning
        #[arg(long)]
        warnings: bool,
    },

    /// Validate events; each file holds one event or an array of events
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Validate an event bundle
    Bundle { file: PathBuf },

    /// Show a compiled class by name or uid
    Class {
        name: String,
        #[command(flatten)]
        filter: Filter,
    },

    /// Show a compiled object
    Object {
        name: String,
        #[command(flatten)]
        filter: Filter,
    },
}

#[derive(clap::Args)]
struct Filter {
    /// Only include attributes of these profiles (repeatable)
    #[arg(short, long = "profile")]
    profiles: Vec<String>,

    /// Only admit these extensions (repeatable)
    #[arg(long = "extension")]
    extensions: Vec<String>,
}

impl Filter {
    fn query(&self) -> Query {
        let mut query = Query::all();
        if !self.profiles.is_empty() {
            query = query.with_profiles(&self.profiles);
        }
        if !self.extensions.is_empty() {
            query = query.with_extensions(&self.extensions);
        }
        query
    }
}

fn main() {
    let cli = Cli::parse();

    let config = match SchemaConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli, config) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `false` when validation found errors
fn run(cli: Cli, mut config: SchemaConfig) -> Result<bool> {
    if let Some(home) = cli.home {
        config.schema.home = home;
    }
    let format = if cli.compact { OutputFormat::Compact } else { config.output.format };

    let loader = DirectoryLoader::from_config(&config).with_extensions(cli.extensions);
    let registry = SchemaRegistry::new(loader)
        .with_context(|| format!("compiling schema at {}", config.schema_home().display()))?;
    let snapshot = registry.current();

    match cli.command {
        Commands::Compile { warnings } => {
            print_summary(&snapshot, warnings)?;
            Ok(true)
        }

        Commands::Validate { files } => {
            let mut clean = true;
            for file in files {
                let reports: Vec<Report> = match read_json(&file)? {
                    Value::Array(events) => events.iter().map(|event| registry.validate(event)).collect(),
                    event => vec![registry.validate(&event)],
                };
                clean &= reports.iter().all(|report| !report.has_errors());
                let output = json!({ "file": file.display().to_string(), "reports": reports });
                println!("{}", format.render(&output)?);
            }
            Ok(clean)
        }

        Commands::Bundle { file } => {
            let report = registry.validate_bundle(&read_json(&file)?);
            println!("{}", format.render(&report)?);
            Ok(!report.has_errors())
        }

        Commands::Class { name, filter } => {
            let query = filter.query();
            let entity = match name.parse::<i64>() {
                Ok(uid) => snapshot.entity_by_uid(uid, &query),
                Err(_) => snapshot.entity(EntityKind::Class, &name, &query),
            };
            match entity {
                Some(entity) => println!("{}", format.render(&entity)?),
                None => bail!("class '{}' not found", name),
            }
            Ok(true)
        }

        Commands::Object { name, filter } => {
            match snapshot.entity(EntityKind::Object, &name, &filter.query()) {
                Some(entity) => println!("{}", format.render(&entity)?),
                None => bail!("object '{}' not found", name),
            }
            Ok(true)
        }
    }
}

fn print_summary(snapshot: &Snapshot, list_warnings: bool) -> Result<()> {
    let checksum = Checksum::of_snapshot(snapshot)?;

    println!("Schema compiled");
    println!(
        "   Version:      {}",
        snapshot.version().map(|v| v.as_str()).unwrap_or("unversioned")
    );
    println!("   Categories:   {}", snapshot.categories().len());
    println!("   Classes:      {}", snapshot.classes().len());
    println!("   Objects:      {}", snapshot.objects().len());
    println!("   Profiles:     {}", snapshot.profiles().len());
    println!("   Extensions:   {}", snapshot.extensions().len());
    println!("   Observables:  {}", snapshot.observables().len());
    println!("   Warnings:     {}", snapshot.warnings().len());
    println!("   Checksum:     {}", checksum);

    if list_warnings {
        for warning in snapshot.warnings() {
            println!("   [{}] {}: {}", warning.code.as_str(), warning.path, warning.message);
        }
    }
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}
