//! Collection Pager CLI
//!
//! Operator tool for inspecting how datasets are paged: print translated
//! queries, run mode detection, and list a page the way a view would.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use collection_pager::{
    collection::{CollectionOptions, PagedCollection},
    error::{AppError, Result},
    models::{
        Arity, ColumnFilter, Config, FilterOperator, FilterValue, ModePreference, Operand,
        PaginationState, ResolvedMode, Scalar, SortEntry, TableState,
    },
    services::{
        CollectionClient, HttpCollectionClient, PaginationContext, QueryCache, detect,
    },
};

/// Collection Pager - adaptive paging for REST collections
#[derive(Parser, Debug)]
#[command(name = "pager", version, about = "Adaptive paginated collection fetching")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "pager.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Table state shared by `query` and `list`.
#[derive(clap::Args, Debug)]
struct ViewArgs {
    /// Dataset name from the configuration
    dataset: String,

    /// Zero-based page index
    #[arg(long, default_value_t = 0)]
    page: usize,

    /// Page size (default: engine.default_page_size)
    #[arg(long)]
    size: Option<usize>,

    /// Sort as `field`, `field:asc` or `field:desc`
    #[arg(long)]
    sort: Option<SortEntry>,

    /// Free-text search over the dataset's fields
    #[arg(long)]
    search: Option<String>,

    /// Column filter `field=value`, `field=a,b` or `field:operator=value`
    #[arg(long = "filter", value_name = "FILTER")]
    filters: Vec<String>,

    /// Paging mode: auto, client or server
    #[arg(long)]
    mode: Option<ModePreference>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the detection and data queries for a view
    Query(ViewArgs),

    /// Run mode detection for a dataset
    Detect {
        /// Dataset name from the configuration
        dataset: String,
    },

    /// Fetch and print one page of a dataset
    List(ViewArgs),

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Parse `field[:operator]=value[,value...]`.
///
/// Without an operator, one value is a contains-search and several values
/// are a one-of list.
fn parse_filter(arg: &str) -> Result<ColumnFilter> {
    let (target, raw) = arg
        .split_once('=')
        .ok_or_else(|| AppError::validation(format!("filter '{arg}' is missing '='")))?;
    let (field, operator) = match target.split_once(':') {
        Some((field, op)) => (field, Some(op)),
        None => (target, None),
    };
    if field.trim().is_empty() {
        return Err(AppError::validation(format!("filter '{arg}' has no field")));
    }
    let values: Vec<Scalar> = raw.split(',').map(|v| Scalar::from(v.trim())).collect();

    let value = match operator {
        None if values.len() > 1 => FilterValue::List(values),
        None => FilterValue::text(raw),
        Some(op) => {
            let operator: FilterOperator =
                serde_json::from_value(serde_json::Value::String(op.to_string()))
                    .map_err(|_| AppError::validation(format!("unknown operator '{op}'")))?;
            let operand = match operator.arity() {
                Arity::Nullary => None,
                Arity::Unary => Some(Operand::One(Scalar::from(raw))),
                Arity::Variadic => Some(Operand::Many(values)),
            };
            FilterValue::structured(operator, operand)
        }
    };
    Ok(ColumnFilter::new(field.trim(), value))
}

impl ViewArgs {
    fn table(&self, default_size: usize) -> Result<TableState> {
        let column_filters = self
            .filters
            .iter()
            .map(|f| parse_filter(f))
            .collect::<Result<Vec<_>>>()?;
        Ok(TableState {
            pagination: PaginationState::new(self.page, self.size.unwrap_or(default_size)),
            sorting: self.sort.clone().into_iter().collect(),
            column_filters,
            global_filter: self.search.clone(),
        })
    }

    fn options(&self, config: &Config) -> Result<CollectionOptions> {
        let dataset = config.dataset(&self.dataset)?;
        let options = CollectionOptions::from_config(&config.engine, dataset);
        Ok(match self.mode {
            Some(mode) => options.with_mode(mode),
            None => options,
        })
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    log::debug!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Query(args) => {
            let options = args.options(&config)?;
            let table = args.table(config.engine.default_page_size)?;
            let selection = &options.selection;
            let request = selection.request_for(&table, table.pagination);

            println!("detect  {}", selection.plan_detection().query);
            let modes = match options.mode.explicit() {
                Some(mode) => vec![mode],
                None => vec![ResolvedMode::Client, ResolvedMode::Server],
            };
            for mode in modes {
                let plan = selection.plan_data(mode, &request, None, options.threshold);
                println!("{:<7} {}", mode, plan.query);
            }
        }

        Command::Detect { dataset } => {
            let dataset = config.dataset(&dataset)?;
            let options = CollectionOptions::from_config(&config.engine, dataset);
            let client: Arc<dyn CollectionClient> =
                Arc::new(HttpCollectionClient::new(&config.client)?);
            let plan = options.selection.plan_detection();

            let detection = detect(
                &client,
                &QueryCache::new(),
                &plan,
                options.threshold,
                options.detection_stale,
            )
            .await
            .ok_or_else(|| AppError::config("detection was aborted"))?;

            if let Some(error) = detection.error {
                log::warn!("Detection failed: {}", error);
            }
            match detection.total {
                Some(total) => log::info!(
                    "{}: {} items, threshold {} -> {} paging",
                    dataset.name,
                    total,
                    options.threshold,
                    detection.mode
                ),
                None => log::info!("{}: total unknown -> {} paging", dataset.name, detection.mode),
            }
        }

        Command::List(args) => {
            let options = args.options(&config)?;
            let table = args.table(config.engine.default_page_size)?;
            let client = Arc::new(HttpCollectionClient::new(&config.client)?);
            let context = PaginationContext::Standalone(table.pagination);

            let mut collection = PagedCollection::new(client, QueryCache::new(), options, context);
            let view = collection.settle(&table).await;

            if let Some(error) = view.error.clone() {
                log::error!("Fetching {} failed: {}", args.dataset, error);
                return Err(AppError::from_shared(error));
            }

            let paging = view.extended_pagination;
            log::info!(
                "{} ({} paging): page {}/{}, {} items",
                args.dataset,
                view.resolved_mode.map_or("unresolved", |m| m.as_str()),
                paging.page_index + 1,
                paging.total_pages.max(1),
                paging.total_items
            );
            for row in view.visible_rows() {
                println!("{}", serde_json::to_string(&row)?);
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ Config OK ({} datasets, threshold {})",
                config.datasets.len(),
                config.engine.threshold
            );
        }
    }

    Ok(())
}
