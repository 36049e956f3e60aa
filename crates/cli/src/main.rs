use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use kiosk_api::{spawn_fetch, CatalogFile, CatalogSession, MemorySource, PackageSource, PageDelivery};
use kiosk_core::{CatalogRoute, FacetName, FilterState, Item};
use kiosk_store::{PageOutcome, PAGE_SIZE};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kioskctl", version, about = "Kiosk catalog CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Catalog fixture ({"packages": [...], "csvs": [...]})
    #[arg(long = "catalog", env = "KIOSK_CATALOG", global = true)]
    catalog: Option<PathBuf>,

    /// Items per page requested from the source
    #[arg(long = "page-size", env = "KIOSK_PAGE_SIZE", global = true, default_value_t = PAGE_SIZE)]
    page_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a catalog href from facet selections
    Encode {
        #[arg(long = "cluster", default_value = "default")]
        cluster: String,
        #[arg(long = "ns", default_value = "default")]
        namespace: String,
        /// Item kind: Charts or Operators (repeatable)
        #[arg(long = "type")]
        types: Vec<String>,
        #[arg(long = "category")]
        categories: Vec<String>,
        #[arg(long = "repository")]
        repositories: Vec<String>,
        #[arg(long = "provider")]
        providers: Vec<String>,
        #[arg(long = "search")]
        search: Option<String>,
    },
    /// Parse a catalog URL into route and filters
    Decode {
        url: String,
    },
    /// Print facet values and counts for a namespace's catalog
    Facets {
        #[arg(long = "url", default_value = "/c/default/ns/default/catalog")]
        url: String,
    },
    /// Page through the catalog as a scrolling client would and print the filtered view
    Browse {
        #[arg(long = "url", default_value = "/c/default/ns/default/catalog")]
        url: String,
        /// Visibility signals to replay
        #[arg(long = "pages", default_value_t = 1)]
        pages: u32,
        /// Explain filter stages and counts
        #[arg(long = "explain", action = ArgAction::SetTrue)]
        explain: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("KIOSK_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KIOSK_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KIOSK_METRICS_ADDR; expected host:port");
        }
    }
}

fn load_source(path: Option<&PathBuf>) -> Result<Arc<MemorySource>> {
    let path = path.context("no catalog given; pass --catalog or set KIOSK_CATALOG")?;
    Ok(Arc::new(MemorySource::new(CatalogFile::load(path)?)))
}

fn open_session(url: &str, page_size: usize) -> Result<CatalogSession> {
    let (route, filter) = CatalogRoute::parse(url).with_context(|| format!("not a catalog url: {url}"))?;
    Ok(CatalogSession::with_page_size(route, filter, page_size))
}

fn kind_col(item: &Item) -> &'static str { item.kind().label() }

fn origin_col(item: &Item) -> String {
    let v = item.view();
    v.repository.or(v.provider).unwrap_or("-").to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Encode { cluster, namespace, types, categories, repositories, providers, search } => {
            let mut filter = FilterState::new();
            let groups = [
                (FacetName::Type, types),
                (FacetName::Category, categories),
                (FacetName::Repository, repositories),
                (FacetName::OperatorProvider, providers),
            ];
            for (facet, values) in groups {
                for v in values {
                    filter.select(facet, v);
                }
            }
            if let Some(s) = search {
                filter.set_search(s);
            }
            let href = CatalogRoute::new(cluster, namespace).href(&filter);
            match cli.output {
                Output::Human => println!("{}", href),
                Output::Json => println!("{}", serde_json::json!({ "href": href })),
            }
        }
        Commands::Decode { url } => {
            let (route, filter) = CatalogRoute::parse(&url).with_context(|| format!("not a catalog url: {url}"))?;
            match cli.output {
                Output::Human => {
                    println!("cluster: {}", route.cluster);
                    println!("namespace: {}", route.namespace);
                    if filter.is_empty() {
                        println!("filters: (none)");
                    }
                    for label in filter.labels() {
                        println!("  {}", label);
                    }
                    println!("href: {}", route.href(&filter));
                }
                Output::Json => {
                    #[derive(serde::Serialize)]
                    struct Decoded<'a> { route: &'a CatalogRoute, filter: &'a FilterState, href: String }
                    let href = route.href(&filter);
                    println!("{}", serde_json::to_string_pretty(&Decoded { route: &route, filter: &filter, href })?);
                }
            }
        }
        Commands::Facets { url } => {
            let source = load_source(cli.catalog.as_ref())?;
            let mut session = open_session(&url, cli.page_size)?;
            info!(url = %url, "facets invoked");
            session.load_offerings(&*source).await;
            // Vocabulary covers everything loaded, so page to the end.
            while let Some(outcome) = session.load_next(&*source).await {
                if outcome == PageOutcome::Failed { break; }
            }
            let vocab = session.vocabulary();
            let counts = session.counts();
            match cli.output {
                Output::Human => {
                    for (facet, values) in vocab.iter().filter(|(f, _)| vocab.is_visible(*f)) {
                        println!("{}:", facet);
                        for value in values {
                            let n = counts.get(&facet).and_then(|c| c.get(value)).copied().unwrap_or(0);
                            let mark = if session.filter().contains(facet, value) { "x" } else { " " };
                            println!("  [{}] {} ({})", mark, value, n);
                        }
                    }
                }
                Output::Json => {
                    #[derive(serde::Serialize)]
                    struct Facet<'a> { facet: FacetName, param: &'static str, values: Vec<(&'a str, usize, bool)> }
                    let rows: Vec<Facet<'_>> = vocab
                        .iter()
                        .filter(|(f, _)| vocab.is_visible(*f))
                        .map(|(facet, values)| Facet {
                            facet,
                            param: facet.param(),
                            values: values
                                .iter()
                                .map(|v| {
                                    let n = counts.get(&facet).and_then(|c| c.get(v)).copied().unwrap_or(0);
                                    (v.as_str(), n, session.filter().contains(facet, v))
                                })
                                .collect(),
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
            }
        }
        Commands::Browse { url, pages, explain } => {
            let source = load_source(cli.catalog.as_ref())?;
            let mut session = open_session(&url, cli.page_size)?;
            info!(url = %url, pages, page_size = cli.page_size, "browse invoked");
            session.load_offerings(&*source).await;

            let (tx, mut rx) = mpsc::channel::<PageDelivery>(4);
            for _ in 0..pages {
                let Some(req) = session.on_visible(session.version()) else { break };
                let src: Arc<dyn PackageSource> = source.clone();
                spawn_fetch(src, req, tx.clone());
                let delivery = tokio::select! {
                    d = rx.recv() => d,
                    _ = signal::ctrl_c() => {
                        info!("Ctrl-C received; stopping browse");
                        None
                    }
                };
                let Some(delivery) = delivery else { break };
                let outcome = session.on_page(delivery);
                info!(outcome = ?outcome, "page delivered");
            }
            drop(tx);

            let view = session.snapshot();
            metrics::gauge!("catalog_visible_items", view.items.len() as f64);
            match cli.output {
                Output::Human => {
                    println!("KIND       NAME                           FROM                 CATEGORIES");
                    for item in &view.items {
                        let cats = item.view().categories.join(", ");
                        println!("{:<10} {:<30} {:<20} {}", kind_col(item), item.display_name(), origin_col(item), cats);
                    }
                    println!(
                        "pages={} exhausted={} version={} more={}",
                        view.window.pages_loaded, view.window.exhausted, view.window.filter_version, view.has_more
                    );
                    if session.is_empty_catalog() {
                        println!("catalog is empty");
                    }
                    if let Some(err) = &view.error {
                        warn!(error = %err, "last fetch failed");
                        eprintln!("error: {}", err);
                    }
                    if explain {
                        let d = &view.debug;
                        eprintln!(
                            "debug: total={} after_type={} after_category={} after_repository={} after_provider={} after_search={}",
                            d.total, d.after_type, d.after_category, d.after_repository, d.after_provider, d.after_search
                        );
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&view)?),
            }
        }
    }

    Ok(())
}
