mod server;

use std::process;

use clap::{Parser, Subcommand};
use hub_registry::{Catalog, CatalogError, RecordKind};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::server::config::{resolve_catalog, HubConfig, RootArgs, ServeArgs};

#[derive(Parser, Debug)]
#[command(name = "hub")]
#[command(version)]
#[command(about = "Registry of deployable templates and NAS apps", long_about = None)]
struct Args {
    /// Default log filter, used when RUST_LOG is not set
    #[arg(long = "log-level", env = "HUB_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the registry over HTTP
    Serve(ServeArgs),
    /// List summaries of every record of a kind
    List {
        /// templates or apps
        kind: RecordKind,

        #[command(flatten)]
        roots: RootArgs,
    },
    /// Print one record in full
    Get {
        /// templates or apps
        kind: RecordKind,

        /// Record id (e.g. jellyfin)
        id: String,

        #[command(flatten)]
        roots: RootArgs,
    },
    /// Case-insensitive search over name, description and category
    Search {
        /// templates or apps
        kind: RecordKind,

        /// Search term
        query: String,

        #[command(flatten)]
        roots: RootArgs,
    },
    /// List the distinct categories of a kind
    Categories {
        /// templates or apps
        kind: RecordKind,

        #[command(flatten)]
        roots: RootArgs,
    },
    /// Scan both directories and report every file that would be skipped
    Validate {
        #[command(flatten)]
        roots: RootArgs,
    },
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_catalog(roots: &RootArgs) -> Catalog {
    let config = HubConfig::load(&roots.config);
    let catalog = Catalog::new(resolve_catalog(roots, &config));
    if let Err(e) = catalog.initialize() {
        eprintln!("{}", e);
        process::exit(1);
    }
    catalog
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to encode output: {}", e);
            process::exit(1);
        }
    }
}

fn print_result<T: Serialize>(result: Result<T, CatalogError>) {
    match result {
        Ok(value) => print_json(&value),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn run_list(kind: RecordKind, roots: &RootArgs) {
    let catalog = open_catalog(roots);
    let mut items = match kind {
        RecordKind::Template => catalog.list_templates(),
        RecordKind::App => catalog.list_apps(),
    };
    items.sort_by(|a, b| a.id.cmp(&b.id));
    print_json(&items);
}

fn run_get(kind: RecordKind, id: &str, roots: &RootArgs) {
    let catalog = open_catalog(roots);
    match kind {
        RecordKind::Template => print_result(catalog.get_template(id)),
        RecordKind::App => print_result(catalog.get_app(id)),
    }
}

fn run_search(kind: RecordKind, query: &str, roots: &RootArgs) {
    let catalog = open_catalog(roots);
    let result = match kind {
        RecordKind::Template => catalog.search_templates(query),
        RecordKind::App => catalog.search_apps(query),
    };
    print_result(result.map(|mut items| {
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }));
}

fn run_categories(kind: RecordKind, roots: &RootArgs) {
    let catalog = open_catalog(roots);
    let categories = match kind {
        RecordKind::Template => catalog.template_categories(),
        RecordKind::App => catalog.app_categories(),
    };
    print_json(&categories);
}

fn run_validate(roots: &RootArgs) {
    let config = HubConfig::load(&roots.config);
    let catalog = Catalog::new(resolve_catalog(roots, &config));
    let mut problems = 0;

    for kind in RecordKind::ALL {
        match catalog.reload(kind) {
            Ok(report) => {
                if report.root_missing {
                    println!(
                        "{}: {} does not exist",
                        kind.plural(),
                        report.root.display()
                    );
                    continue;
                }
                println!(
                    "{}: {} files loaded, {} duplicate ids, {} skipped",
                    kind.plural(),
                    report.files_loaded,
                    report.duplicates,
                    report.skipped.len()
                );
                for skipped in &report.skipped {
                    println!("  SKIP  {} - {}", skipped.path.display(), skipped.reason);
                }
                problems += report.skipped.len();
            }
            Err(e) => {
                println!("{}: {}", kind.plural(), e);
                problems += 1;
            }
        }
    }

    if problems > 0 {
        process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    let cli = Args::parse();
    init_logging(&cli.log_level);

    match cli.cmd {
        Command::Serve(args) => server::run_serve(args).await,
        Command::List { kind, roots } => run_list(kind, &roots),
        Command::Get { kind, id, roots } => run_get(kind, &id, &roots),
        Command::Search { kind, query, roots } => run_search(kind, &query, &roots),
        Command::Categories { kind, roots } => run_categories(kind, &roots),
        Command::Validate { roots } => run_validate(&roots),
    }
}
