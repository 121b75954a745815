use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;

use crate::config::Config;
use crate::instrument::instrument;
use crate::runner::{start_run, Bindings, HostFunction, RunOptions};

#[derive(Parser)]
#[command(name = "tempo")]
#[command(about = "Tempo - Run scripts one step at a time", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a script under the step gate
    Run {
        /// Script file to run
        file: PathBuf,

        /// Delay of every step in milliseconds (overrides config)
        #[arg(long)]
        pace_ms: Option<u64>,

        /// Do not print steps
        #[arg(short = 'q', long = "quiet")]
        quiet: bool,
    },

    /// Print the instrumented form of a script
    Instrument {
        /// Script file to instrument
        file: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    let config_path = cli.config.map(PathBuf::from);

    match cli.command {
        Commands::Run {
            file,
            pace_ms,
            quiet,
        } => {
            let config = Config::builder()
                .config_path(config_path)
                .pace_ms(pace_ms)
                .build()?;
            run_script(&file, &config, quiet).await?;
        }

        Commands::Instrument { file } => {
            let source = read_script(&file)?;
            let output = instrument(&source)
                .with_context(|| format!("Failed to instrument {}", file.display()))?;
            println!("{}", output);
        }

        Commands::Config => {
            let config = Config::builder().config_path(config_path).build()?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

async fn run_script(file: &Path, config: &Config, quiet: bool) -> Result<()> {
    let source = read_script(file)?;

    let mut options = RunOptions::from_config(config).bindings(script_bindings());
    if !quiet {
        options = options.on_step(|text| eprintln!("step: {}", text));
    }

    let handle = start_run(&source, options)?;

    tokio::select! {
        result = handle.completion() => result?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Stopping...");
            handle.stop();
            handle.completion().await?;
        }
    }

    Ok(())
}

fn read_script(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

/// `log`/`print` write their arguments to stdout; `sleep(ms)` waits
fn script_bindings() -> Bindings {
    let print = HostFunction::new(|args| {
        println!("{}", format_args_line(&args));
        Ok(JsonValue::Null)
    });

    let sleep = HostFunction::new_async(|args: Vec<JsonValue>| async move {
        let ms = args.first().and_then(JsonValue::as_f64).unwrap_or(0.0);
        tokio::time::sleep(Duration::from_millis(ms.max(0.0) as u64)).await;
        Ok::<_, String>(JsonValue::Null)
    });

    Bindings::new()
        .function("log", print.clone())
        .function("print", print)
        .function("sleep", sleep)
}

fn format_args_line(args: &[JsonValue]) -> String {
    args.iter()
        .map(|arg| match arg {
            JsonValue::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_run_command() {
        let cli = Cli::parse_from(["tempo", "--config", "t.toml", "run", "demo.js", "--pace-ms", "5", "-q"]);
        assert_eq!(cli.config.as_deref(), Some("t.toml"));
        match cli.command {
            Commands::Run {
                file,
                pace_ms,
                quiet,
            } => {
                assert_eq!(file, PathBuf::from("demo.js"));
                assert_eq!(pace_ms, Some(5));
                assert!(quiet);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_formats_arguments_like_console() {
        let line = format_args_line(&[
            JsonValue::from("total:"),
            JsonValue::from(3),
            serde_json::json!({ "a": [1] }),
        ]);
        assert_eq!(line, r#"total: 3 {"a":[1]}"#);
    }
}
