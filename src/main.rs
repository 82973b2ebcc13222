use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use rfgraph::config::Config;
use rfgraph::{Client, HttpTransport, Reference, ResourceKind, WalkItem, WalkOptions};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use url::Url;

/// Browse a Redfish service as a graph
#[derive(Parser, Debug)]
#[command(name = "rfgraph", version, about, long_about = None)]
struct Args {
    /// Service base URL, e.g. https://bmc.example
    #[arg(short, long, global = true)]
    endpoint: Option<String>,

    /// User for HTTP basic auth (password from RFGRAPH_PASSWORD)
    #[arg(short, long, global = true)]
    username: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Accept invalid TLS certificates
    #[arg(long, global = true)]
    insecure: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one resource and print it
    Get {
        locator: String,

        /// Expect a collection and print its members
        #[arg(long)]
        collection: bool,

        /// Expected resource kind, e.g. Chassis
        #[arg(long, default_value = "any", value_parser = parse_kind)]
        kind: ResourceKind,
    },
    /// Walk the graph breadth-first, one JSON line per node
    Walk {
        /// Locator to start from (defaults to the service root)
        #[arg(long)]
        root: Option<String>,

        /// Relation to follow; repeatable, all relations when omitted
        #[arg(short, long = "relation")]
        relations: Vec<String>,

        #[arg(short, long)]
        depth: Option<usize>,

        /// Fetches in flight per level
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        #[arg(long)]
        max_nodes: Option<usize>,
    },
    /// Print the effective configuration
    Config {
        /// Store --endpoint, --username and --insecure in the config file
        #[arg(long)]
        save: bool,
    },
}

fn parse_kind(name: &str) -> Result<ResourceKind, String> {
    ResourceKind::from_name(name).ok_or_else(|| format!("unknown resource kind '{}'", name))
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("rfgraph started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("rfgraph").join("rfgraph.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".rfgraph").join("rfgraph.log");
    }
    PathBuf::from("rfgraph.log")
}

fn connect(args: &Args, config: &Config) -> Result<Client> {
    let endpoint = config
        .effective_endpoint(args.endpoint.as_deref())
        .context("No endpoint configured: pass --endpoint or set RFGRAPH_ENDPOINT")?;
    let base = Url::parse(&endpoint).with_context(|| format!("Invalid endpoint: {}", endpoint))?;

    let mut transport = if args.insecure || config.insecure {
        HttpTransport::insecure(base.clone())?
    } else {
        HttpTransport::new(base.clone())?
    };
    if let Some(username) = config.effective_username(args.username.as_deref()) {
        transport = transport.with_basic_auth(&username, Config::password().as_deref());
    }

    tracing::info!("Using endpoint {}", base);
    Ok(Client::new(base, Arc::new(transport), config.cache_config()))
}

async fn get(client: &Client, locator: &str, collection: bool, kind: ResourceKind) -> Result<()> {
    let reference = Reference::new(client.locate(locator)?);

    let output = if collection {
        let collection = client.resolve_collection(&reference).await?;
        json!({
            "locator": collection.locator,
            "type": collection.odata_type,
            "count": collection.declared_count,
            "members": collection.iter().map(Reference::locator).collect::<Vec<_>>(),
        })
    } else {
        client.resolve(&reference, kind).await?.to_document()
    };

    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

async fn walk(client: &Client, root: &str, options: WalkOptions) -> Result<()> {
    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling walk");
            cancel.cancel();
        }
    });

    let root = Reference::new(client.locate(root)?);
    let mut walk = client.walk(root, options);

    while let Some(item) = walk.next().await {
        println!("{}", serde_json::to_string(&walk_line(&item))?);
    }

    let stats = walk.stats();
    eprintln!(
        "{} nodes, {} failed, {} cycles skipped",
        stats.emitted(),
        stats.failed(),
        stats.cycles_skipped()
    );
    Ok(())
}

fn show_config(args: &Args, mut config: Config, save: bool) -> Result<()> {
    config.apply_flags(args.endpoint.as_deref(), args.username.as_deref(), args.insecure);

    if save {
        config.save()?;
        if let Some(path) = Config::config_path() {
            eprintln!("Saved {}", path.display());
        }
    }

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn walk_line(item: &WalkItem) -> Value {
    match item {
        WalkItem::Node {
            path,
            depth,
            entity,
        } => json!({
            "path": path,
            "depth": depth,
            "locator": entity.locator,
            "type": entity.odata_type,
            "id": entity.id,
            "name": entity.name,
            "health": entity
                .status
                .as_ref()
                .and_then(|s| s.worst_health())
                .map(|h| h.as_str()),
        }),
        WalkItem::Failed {
            path,
            depth,
            locator,
            error,
        } => json!({
            "path": path,
            "depth": depth,
            "locator": locator,
            "error": error.to_string(),
            "status": error.status(),
        }),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let config = Config::load();
    if let Command::Config { save } = args.command {
        return show_config(&args, config, save);
    }
    let client = connect(&args, &config)?;

    match &args.command {
        Command::Get {
            locator,
            collection,
            kind,
        } => get(&client, locator, *collection, *kind).await,
        Command::Walk {
            root,
            relations,
            depth,
            concurrency,
            max_nodes,
        } => {
            let options = WalkOptions {
                relations: relations.clone(),
                max_depth: depth.unwrap_or(config.max_depth),
                max_concurrency: concurrency.unwrap_or(config.max_concurrency),
                max_nodes: *max_nodes,
                cancel: CancellationToken::new(),
            };
            let root = root.as_deref().unwrap_or(&config.service_root);
            walk(&client, root, options).await
        }
        Command::Config { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_arguments() {
        let args = Args::try_parse_from([
            "rfgraph",
            "--endpoint",
            "https://bmc.example",
            "walk",
            "-r",
            "Chassis",
            "--relation",
            "Assembly",
            "--depth",
            "2",
        ])
        .unwrap();

        match args.command {
            Command::Walk {
                relations, depth, ..
            } => {
                assert_eq!(relations, vec!["Chassis", "Assembly"]);
                assert_eq!(depth, Some(2));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_get_kind_is_parsed() {
        let args = Args::try_parse_from(["rfgraph", "get", "/redfish/v1/Chassis/1", "--kind", "chassis"])
            .unwrap();
        assert!(matches!(
            args.command,
            Command::Get {
                kind: ResourceKind::Chassis,
                ..
            }
        ));

        assert!(Args::try_parse_from(["rfgraph", "get", "/x", "--kind", "Toaster"]).is_err());
    }

    #[test]
    fn test_config_save_flag() {
        let args = Args::try_parse_from([
            "rfgraph",
            "config",
            "--save",
            "--endpoint",
            "https://bmc.example",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::Config { save: true }));
        assert_eq!(args.endpoint.as_deref(), Some("https://bmc.example"));
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(LogLevel::Off.to_tracing_level(), None);
        assert_eq!(LogLevel::Debug.to_tracing_level(), Some(Level::DEBUG));
    }
}
