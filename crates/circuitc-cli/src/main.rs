//! circuitc command line renderer.
//!
//! Provides the `circuitc` binary. The `render` subcommand reads a design
//! written as JSON elements, settles it with the render engine and prints
//! the resulting circuit JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use circuitc_core::CoreError;
use circuitc_render::{ComponentRegistry, Element, RenderConfig, RenderEngine, RenderError};

/// Circuit design renderer.
#[derive(Parser)]
#[command(name = "circuitc", about = "Render circuit designs to circuit JSON")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a design and write its circuit JSON.
    Render {
        /// Design file: one element or an array of elements.
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Autorouter server used by boards that ask for remote routing.
        #[arg(long)]
        autorouter_url: Option<String>,

        /// Upper bound on render cycles per settle.
        #[arg(long)]
        max_cycles: Option<usize>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            input,
            output,
            autorouter_url,
            max_cycles,
        } => {
            let mut config = RenderConfig::from_env();
            if let Some(url) = autorouter_url {
                config = config.with_autorouter_url(url);
            }
            if let Some(cycles) = max_cycles {
                config = config.with_max_render_cycles(cycles);
            }
            let exit_code = run_render(&input, output.as_deref(), config);
            process::exit(exit_code);
        }
    }
}

/// Execute the render subcommand.
///
/// Returns exit code: 0 = success, 1 = render error,
/// 2 = invalid design, 3 = I/O error.
fn run_render(input: &Path, output: Option<&Path>, config: RenderConfig) -> i32 {
    let text = match fs::read_to_string(input) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: failed to read '{}': {}", input.display(), e);
            return 3;
        }
    };

    let elements = match parse_design(&text) {
        Ok(elements) => elements,
        Err(e) => {
            eprintln!("Invalid design: {}", e);
            return 2;
        }
    };

    let registry = ComponentRegistry::builtin();
    let tree = match registry.build_tree(&elements) {
        Ok(tree) => tree,
        Err(e) => {
            eprintln!("Invalid design: {}", e);
            return core_exit_code(&e);
        }
    };
    debug!(nodes = tree.len(), "design tree built");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return 3;
        }
    };

    let mut engine = RenderEngine::new(tree, registry, config);
    if let Err(e) = runtime.block_on(engine.settle()) {
        eprintln!("Render failed: {}", e);
        return render_exit_code(&e);
    }
    info!(cycles = engine.cycles(), "design settled");

    let value = match engine.circuit_json_value() {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Error: failed to collect circuit JSON: {}", e);
            return 1;
        }
    };
    let json = match serde_json::to_string_pretty(&value) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error: failed to serialize circuit JSON: {}", e);
            return 1;
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = fs::write(path, json) {
                eprintln!("Error: failed to write '{}': {}", path.display(), e);
                return 3;
            }
        }
        None => println!("{}", json),
    }
    0
}

/// Accepts a single element object or an array of them.
fn parse_design(text: &str) -> Result<Vec<Element>, serde_json::Error> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(items) => items.into_iter().map(serde_json::from_value).collect(),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

fn core_exit_code(err: &CoreError) -> i32 {
    match err {
        CoreError::Validation(_) | CoreError::Selector(_) => 2,
        _ => 1,
    }
}

fn render_exit_code(err: &RenderError) -> i32 {
    if err.is_validation() {
        2
    } else {
        1
    }
}
