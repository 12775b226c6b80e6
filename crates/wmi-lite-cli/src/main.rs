//! wmi-lite CLI
//!
//! Runs WQL queries against a snapshot of management instrumentation data and
//! prints the resulting records as JSON

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use eyre::eyre;
use serde_json::{Map, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use wmi_lite::{PropertyBag, Wmi};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "wmi-lite", version)]
#[command(about = "Query management instrumentation data as case-insensitive records", long_about = None)]
struct Cli {
    /// Config file (defaults to $WMI_LITE_CONFIG or ./wmi-lite.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Snapshot file to query (TOML or JSON)
    #[arg(short, long, global = true)]
    snapshot: Option<PathBuf>,

    /// Namespace to query
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a WQL query
    #[command(name = "query")]
    Query {
        /// Query text, e.g. "select * from Win32_Service"
        wql: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List every instance of a class
    #[command(name = "instances-of")]
    InstancesOf {
        /// Class name
        class: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Show the first instance of a class
    #[command(name = "first-of")]
    FirstOf {
        /// Class name
        class: String,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Only print these properties (letter case is ignored)
    #[arg(short, long = "property")]
    properties: Vec<String>,
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Render one record, optionally projected onto the requested properties
fn render(bag: &PropertyBag, properties: &[String]) -> Result<Value> {
    if properties.is_empty() {
        return Ok(serde_json::to_value(bag.to_map()?)?);
    }

    let mut record = Map::new();
    for name in properties {
        let value = match bag.get(name)? {
            Some(value) => serde_json::to_value(value)?,
            None => Value::Null,
        };
        record.insert(name.clone(), value);
    }
    Ok(Value::Object(record))
}

fn render_all(bags: &[PropertyBag], properties: &[String]) -> Result<Value> {
    bags.iter()
        .map(|bag| render(bag, properties))
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(Config::locate);
    let config = match &config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let level = if cli.verbose { "debug" } else { config.log_level.as_str() };
    init_logging(level, config.log_json);

    match &config_path {
        Some(path) => debug!(path = %path.display(), "loaded configuration"),
        None => info!("no config file found, using defaults"),
    }

    let snapshot = cli.snapshot.or(config.snapshot).ok_or_else(|| {
        eyre!("no snapshot file given; pass --snapshot or set `snapshot` in the config file")
    })?;
    let provider = config::load_snapshot(&snapshot)?;

    let mut wmi = Wmi::new(Arc::new(provider));
    if let Some(namespace) = cli.namespace.or(config.namespace) {
        wmi = wmi.with_namespace(namespace);
    }

    let output = match cli.command {
        Commands::Query { wql, output } => render_all(&wmi.query(&wql)?, &output.properties)?,
        Commands::InstancesOf { class, output } => {
            render_all(&wmi.instances_of(&class)?, &output.properties)?
        }
        Commands::FirstOf { class, output } => match wmi.first_of(&class)? {
            Some(bag) => render(&bag, &output.properties)?,
            None => Value::Null,
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
