//! Profile querier command line
//!
//! Validates configuration and prints the SQL compiled for a request,
//! without contacting the store.
//!
//! # Configuration
//!
//! Read from:
//! 1. `--config` / `QUERIER_CONFIG` (path to TOML file)
//! 2. `./querier.toml` in current directory
//! 3. Default configuration
//!
//! # Example Usage
//!
//! ```bash
//! querier check-config
//!
//! querier compile series \
//!   --type process_cpu:cpu:nanoseconds:cpu:nanoseconds \
//!   --selector '{service_name="api"}' --group-by env --step 60
//!
//! QUERIER_CLUSTER=main querier compile label-values --name env
//! ```

use clap::{Parser, Subcommand};
use profile_querier::clock::{Clock, SystemClock};
use profile_querier::config::{ApplicationConfig, CONFIG_ENV};
use profile_querier::query::{
    AggregationMode, CompiledQuery, LabelValuesRequest, MergeStacktracesRequest, QueryPlanner,
    QueryResult, SelectSeriesRequest, TimeBounds,
};
use profile_querier::store::util::sanitize_url;
use tracing::info;

/// Profile querier - SQL compiler for profile reads
#[derive(Parser)]
#[command(name = "querier")]
#[command(version)]
#[command(about = "Compiles continuous-profiling reads into column store SQL", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (overrides QUERIER_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and print a summary
    CheckConfig,

    /// Print the SQL for a request
    Compile {
        #[command(subcommand)]
        operation: Operation,

        /// Window start, epoch milliseconds
        #[arg(long, global = true)]
        start: Option<i64>,

        /// Window end, epoch milliseconds
        #[arg(long, global = true)]
        end: Option<i64>,

        /// Also print the typed plan
        #[arg(long, global = true)]
        explain: bool,
    },
}

#[derive(Subcommand)]
enum Operation {
    /// List profile types
    ProfileTypes,

    /// List label names
    LabelNames,

    /// List values of one label
    LabelValues {
        /// Label name
        #[arg(long)]
        name: String,
    },

    /// Merge stacktraces
    Merge {
        /// Five-part profile type id
        #[arg(long = "type")]
        profile_type: String,

        /// Label selector, e.g. {service_name="api"}
        #[arg(long, default_value = "")]
        selector: String,
    },

    /// Select series
    Series {
        /// Five-part profile type id
        #[arg(long = "type")]
        profile_type: String,

        /// Label selector, e.g. {service_name="api"}
        #[arg(long, default_value = "")]
        selector: String,

        /// Labels to group by (repeatable)
        #[arg(long = "group-by")]
        group_by: Vec<String>,

        /// Step in seconds
        #[arg(long, default_value_t = 60)]
        step: i64,

        /// SUM or AVERAGE
        #[arg(long, default_value = "SUM")]
        aggregation: String,
    },
}

fn load_config(cli: &Cli) -> profile_querier::Result<ApplicationConfig> {
    if let Some(config_path) = &cli.config {
        std::env::set_var(CONFIG_ENV, config_path);
    }
    ApplicationConfig::load()
}

/// Validate configuration and print summary
fn cmd_check_config(config: &ApplicationConfig) {
    let tables = config.table_names();

    println!("Configuration is valid!");
    println!();
    println!("Store Settings:");
    println!("  URL: {}", sanitize_url(&config.store.url));
    println!("  Database: {}", config.store.database);
    println!("  Distributed: {}", tables.is_distributed());
    println!();
    println!("Query Settings:");
    println!("  Merge row limit: {}", config.query.merge_row_limit);
    println!(
        "  Discovery lookback: {}s",
        config.query.discovery_lookback_secs
    );
    println!("  Sample lookback: {}s", config.query.sample_lookback_secs);
    println!();
    println!("Log level: {}", config.server.log_level);
}

fn compile(
    planner: &QueryPlanner,
    operation: Operation,
    bounds: TimeBounds,
    now_ms: i64,
) -> QueryResult<CompiledQuery> {
    match operation {
        Operation::ProfileTypes => planner.profile_types(bounds, now_ms),
        Operation::LabelNames => planner.label_names(bounds, now_ms),
        Operation::LabelValues { name } => {
            planner.label_values(&LabelValuesRequest { name, bounds }, now_ms)
        },
        Operation::Merge {
            profile_type,
            selector,
        } => planner.merge_stacktraces(
            &MergeStacktracesRequest {
                profile_type_id: profile_type,
                label_selector: selector,
                bounds,
            },
            now_ms,
        ),
        Operation::Series {
            profile_type,
            selector,
            group_by,
            step,
            aggregation,
        } => {
            let aggregation: AggregationMode = aggregation.parse()?;
            planner.select_series(
                &SelectSeriesRequest {
                    profile_type_id: profile_type,
                    label_selector: selector,
                    group_by,
                    step_secs: step,
                    aggregation,
                    bounds,
                },
                now_ms,
            )
        },
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.server.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::CheckConfig => cmd_check_config(&config),
        Commands::Compile {
            operation,
            start,
            end,
            explain,
        } => {
            let planner = QueryPlanner::with_config(config.table_names(), config.planner_config());
            let bounds = TimeBounds {
                start_ms: start,
                end_ms: end,
            };
            let compiled = compile(&planner, operation, bounds, SystemClock.now_ms())?;
            info!(operation = compiled.plan.operation(), "compiled request");
            if explain {
                println!("-- {}", compiled.plan.explain());
            }
            println!("{}", compiled.sql);
        },
    }

    Ok(())
}
