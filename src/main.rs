use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use stepwise::compiler::CompiledSubunit;
use stepwise::{DebuggerConfig, FsLoader, Position, SourceUnitIndex};

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

#[derive(Parser)]
#[command(name = "stepwise")]
#[command(about = "Inspect how a debugger sees a source file", long_about = None)]
struct Cli {
    /// Debugger configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format (human, json)
    #[arg(long, global = true, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Log debug events to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the compiled units of a file with their statement lines
    Lines {
        /// Source file
        file: PathBuf,
    },
    /// Resolve requested lines to the lines breakpoints stop at
    Resolve {
        /// Source file
        file: PathBuf,
        /// Requested line numbers
        #[arg(required = true)]
        lines: Vec<u32>,
    },
    /// Print the start line of a function
    Function {
        /// Source file
        file: PathBuf,
        /// Name qualified by its enclosing classes, e.g. `Outer.method`
        name: String,
    },
}

#[derive(Serialize)]
struct Resolution {
    requested: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => match DebuggerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => DebuggerConfig::default(),
    };

    let file = match &cli.command {
        Commands::Lines { file }
        | Commands::Resolve { file, .. }
        | Commands::Function { file, .. } => file,
    };
    let filename =
        stepwise::source::canonic(&file.to_string_lossy(), config.case_insensitive_paths);
    let index = match SourceUnitIndex::parse(&filename, &FsLoader) {
        Ok(index) => index,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, &index) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run a subcommand. Returns whether every request succeeded.
fn run(cli: &Cli, index: &SourceUnitIndex) -> Result<bool, String> {
    let json = cli.format == OutputFormat::Json;
    match &cli.command {
        Commands::Lines { .. } => {
            let Some(root) = index.root() else {
                return Err(format!("{}: no compiled unit", index.filename()));
            };
            if json {
                print_json(root)?;
            } else {
                print_unit(root, 0);
            }
            Ok(true)
        }
        Commands::Resolve { lines, .. } => {
            let results: Vec<Resolution> = lines
                .iter()
                .map(|&requested| match index.resolve(requested) {
                    Ok(position) => Resolution {
                        requested,
                        position: Some(position),
                        error: None,
                    },
                    Err(e) => Resolution {
                        requested,
                        position: None,
                        error: Some(e.to_string()),
                    },
                })
                .collect();
            let all_resolved = results.iter().all(|r| r.error.is_none());

            if json {
                print_json(&results)?;
            } else {
                for result in &results {
                    match (&result.position, &result.error) {
                        (Some(position), _) => println!(
                            "{} -> {} (unit starting at {})",
                            result.requested, position.line, position.subunit_start
                        ),
                        (None, Some(error)) => eprintln!("{}", error),
                        (None, None) => {}
                    }
                }
            }
            Ok(all_resolved)
        }
        Commands::Function { name, .. } => {
            let line = index.function_start_line(name).map_err(|e| e.to_string())?;
            if json {
                print_json(&serde_json::json!({ "name": name, "line": line }))?;
            } else {
                println!("{}", line);
            }
            Ok(true)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

fn print_unit(unit: &CompiledSubunit, depth: usize) {
    let lines: Vec<String> = unit
        .statement_lines()
        .iter()
        .map(|l| l.to_string())
        .collect();
    let resumable = if unit.resumable { " resumable" } else { "" };
    println!(
        "{}{} {:?}{} @{}: {}",
        "  ".repeat(depth),
        unit.name,
        unit.kind,
        resumable,
        unit.start_line,
        lines.join(" ")
    );
    for child in unit.children() {
        print_unit(child, depth + 1);
    }
}
