//! # jsembed CLI Entry Point
//!
//! Runs scripts through the embedded execution engine and prints JSON to
//! stdout. Logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! # Evaluate an expression with bindings
//! jsembed exec 'price * quantity' -b '{"price": 2.5, "quantity": 4}'
//!
//! # Evaluate on top of the bundled libraries
//! jsembed exec --custom 'parseCSV(csv).rowCount' -b '{"csv": "a,b\n1,2"}'
//!
//! # Call a function from a stored script
//! jsembed invoke business-rules calculateAdvancedDiscount \
//!     -p '{"price": 100, "quantity": 15, "customerTier": "gold"}'
//!
//! # Run a built-in business-logic script
//! jsembed logic calculateDiscount -i '{"price": 20, "quantity": 8}'
//!
//! # Benchmark an invocation
//! jsembed bench data-processing parseCSV -p '{"csvText": "a,b\n1,2"}' -n 500
//!
//! # Show a script's source
//! jsembed source math-utils
//!
//! # List scripts, the function catalog and the business-logic scripts
//! jsembed scripts
//! ```
//!
//! Scripts come from the bundled set unless `--scripts-dir` (or the
//! `JSEMBED_SCRIPTS_DIR` environment variable) points at a directory of
//! `<name>.js` files.

use anyhow::Result;
use argh::FromArgs;
use jsembed_common::{Bindings, ExecutionResponse, ExecutionResult, Value};
use jsembed_runtime::{Catalog, Invocation, LogicEntry, ResourceLimits, ScriptService, ServiceConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

const SCRIPTS_DIR_ENV: &str = "JSEMBED_SCRIPTS_DIR";

/// jsembed - embedded JavaScript execution
#[derive(FromArgs)]
struct Cli {
    /// directory of <name>.js scripts to use instead of the bundled set
    #[argh(option, long = "scripts-dir")]
    scripts_dir: Option<String>,

    /// maximum wall-clock time per execution in milliseconds
    ///
    /// Must be between 1 and 3600000 (1 hour).
    #[argh(option, long = "max-execution-time-ms", default = "30000")]
    max_execution_time_ms: u64,

    /// heap limit per execution in MiB
    #[argh(option, long = "memory-limit-mb")]
    memory_limit_mb: Option<usize>,

    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Exec(ExecArgs),
    Invoke(InvokeArgs),
    Logic(LogicArgs),
    Bench(BenchArgs),
    Source(SourceArgs),
    Scripts(ScriptsArgs),
}

/// evaluate JavaScript source
#[derive(FromArgs)]
#[argh(subcommand, name = "exec")]
struct ExecArgs {
    /// source text to evaluate
    #[argh(positional)]
    source: String,

    /// bindings as a JSON object
    #[argh(option, short = 'b', default = "\"{}\".into()")]
    bindings: String,

    /// evaluate after the prelude libraries
    #[argh(switch)]
    custom: bool,
}

/// call a function from a stored script
#[derive(FromArgs)]
#[argh(subcommand, name = "invoke")]
struct InvokeArgs {
    /// script name
    #[argh(positional)]
    script: String,

    /// function name
    #[argh(positional)]
    function: String,

    /// parameters as JSON
    #[argh(option, short = 'p', default = "\"{}\".into()")]
    params: String,

    /// options object for data-processing functions, as JSON
    #[argh(option, short = 'o')]
    options: Option<String>,
}

/// run a built-in business-logic script
#[derive(FromArgs)]
#[argh(subcommand, name = "logic")]
struct LogicArgs {
    /// business-logic script name
    #[argh(positional)]
    name: String,

    /// input data as a JSON object
    #[argh(option, short = 'i', default = "\"{}\".into()")]
    input: String,
}

/// invoke a function repeatedly and report latency
#[derive(FromArgs)]
#[argh(subcommand, name = "bench")]
struct BenchArgs {
    /// script name
    #[argh(positional)]
    script: String,

    /// function name
    #[argh(positional)]
    function: String,

    /// parameters as JSON
    #[argh(option, short = 'p', default = "\"{}\".into()")]
    params: String,

    /// number of iterations
    #[argh(option, short = 'n', default = "100")]
    iterations: u64,
}

/// print the source of a stored or business-logic script
#[derive(FromArgs)]
#[argh(subcommand, name = "source")]
struct SourceArgs {
    /// script name
    #[argh(positional)]
    name: String,
}

/// list available scripts, the function catalog and business-logic scripts
#[derive(FromArgs)]
#[argh(subcommand, name = "scripts")]
struct ScriptsArgs {}

#[derive(Serialize)]
struct ScriptListing {
    scripts: Vec<String>,
    catalog: Catalog,
    business_logic: Vec<LogicEntry>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // stdout carries JSON results only
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let service = build_service(&cli)?;

    match cli.command {
        Commands::Exec(args) => {
            let bindings = parse_bindings(&args.bindings, "bindings")?;
            let result = if args.custom {
                let service = service.clone();
                tokio::task::spawn_blocking(move || service.execute_custom(&args.source, &bindings))
                    .await?
            } else {
                service.execute_async(args.source, bindings).await
            };
            print_result(&result)
        }
        Commands::Invoke(args) => {
            let params = parse_bindings(&args.params, "params")?;
            let mut invocation = Invocation::new(args.script, args.function, params);
            if let Some(options) = &args.options {
                invocation = invocation.with_options(parse_bindings(options, "options")?);
            }
            let result = service.invoke_async(invocation).await;
            print_result(&result)
        }
        Commands::Logic(args) => {
            let input = Value::Object(parse_bindings(&args.input, "input")?);
            let result =
                tokio::task::spawn_blocking(move || service.business_logic(&args.name, input)).await?;
            print_result(&result)
        }
        Commands::Bench(args) => {
            let params = Value::Object(parse_bindings(&args.params, "params")?);
            let report = tokio::task::spawn_blocking(move || {
                service.benchmark(&args.script, &args.function, params, args.iterations)
            })
            .await??;
            print_json(&report)
        }
        Commands::Source(args) => print_json(&service.script_source(&args.name)?),
        Commands::Scripts(ScriptsArgs {}) => {
            let listing = ScriptListing {
                scripts: service.store().available()?,
                catalog: service.catalog(),
                business_logic: service.business_logic_listing(),
            };
            print_json(&listing)
        }
    }
}

/// Builds the service from the global flags.
///
/// `--scripts-dir` wins over `JSEMBED_SCRIPTS_DIR`; with neither, the bundled
/// scripts are used.
fn build_service(cli: &Cli) -> Result<ScriptService> {
    let mut limits = ResourceLimits::new()
        .with_execution_timeout(Duration::from_millis(cli.max_execution_time_ms));
    if let Some(mib) = cli.memory_limit_mb {
        limits = limits.with_memory_limit(mib.saturating_mul(1024 * 1024));
    }
    tracing::info!("Maximum execution time: {}ms", cli.max_execution_time_ms);

    let config = ServiceConfig::new().with_limits(limits);
    let scripts_dir = cli
        .scripts_dir
        .clone()
        .or_else(|| std::env::var(SCRIPTS_DIR_ENV).ok());

    let service = match scripts_dir {
        Some(dir) => {
            tracing::info!("Loading scripts from {}", dir);
            ScriptService::from_directory(PathBuf::from(dir), config)?
        }
        None => ScriptService::with_config(jsembed_runtime::EmbeddedResources, config)?,
    };
    Ok(service)
}

fn parse_json(text: &str, what: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| anyhow::anyhow!("Invalid JSON in {}: {}", what, e))
}

fn parse_bindings(text: &str, what: &str) -> Result<Bindings> {
    match parse_json(text, what)? {
        Value::Object(map) => Ok(map),
        other => Err(anyhow::anyhow!(
            "Invalid {}: expected a JSON object, got {}",
            what,
            jsembed_common::type_name(&other)
        )),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints the response and fails the process when the execution failed.
fn print_result(result: &ExecutionResult) -> Result<()> {
    print_json(&ExecutionResponse::from_result(result))?;
    match result {
        Ok(_) => Ok(()),
        Err(e) => Err(anyhow::anyhow!("{}", e)),
    }
}
