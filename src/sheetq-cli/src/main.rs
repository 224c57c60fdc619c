use std::fs;
use std::io;
use std::path::Path;
use std::process;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::{info, warn};

use sheetq_cli::cli::{Cli, Commands, ConfigCommands, ExecutionArgs};
use sheetq_cli::config::{create_default_config_file, validate_config, Config};
use sheetq_cli::handler::{analyse, AnalysisRequest, Services};
use sheetq_cli::output::write_json;
use sheetq_core::services::parse_plan_text;
use sheetq_core::{build_analysis_prompt, extract_schema, PlanExecutor, TabularStore};
use sheetq_llm::OllamaClient;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_cli(&cli);

    setup_logging(&config);

    match cli.command {
        Commands::Analyse {
            ref file,
            ref query,
            ref execution,
        } => run_analyse(&mut config, file, query, execution, cli.compact),
        Commands::Run {
            ref file,
            ref plan,
            ref execution,
        } => run_plan(&mut config, file, plan, execution, cli.compact),
        Commands::Schema { ref file } => {
            let schema = extract_schema(file, &config.to_load_options())?;
            write_json(&mut io::stdout().lock(), &schema, cli.compact)?;
            Ok(())
        }
        Commands::Prompt { ref file, ref query } => {
            let schema = extract_schema(file, &config.to_load_options())?;
            println!("{}", build_analysis_prompt(&schema, query));
            Ok(())
        }
        Commands::Config { command } => handle_config_command(command, &config),
    }
}

fn setup_logging(config: &Config) {
    let log_level = match config.debug.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new().filter_level(log_level).init();
}

fn run_analyse(
    config: &mut Config,
    file: &Path,
    query: &str,
    execution: &ExecutionArgs,
    compact: bool,
) -> Result<()> {
    config.apply_execution_args(execution)?;
    validate_config(config)?;

    let client = OllamaClient::new(config.to_ollama_config())?;
    let services = Services {
        plan_generator: &client,
        completer: &client,
        load_options: config.to_load_options(),
        executor_options: config.to_executor_options(),
    };
    let request = AnalysisRequest {
        file_path: file.to_path_buf(),
        query: query.to_string(),
    };

    let response = analyse(&request, &services);
    write_json(&mut io::stdout().lock(), &response.body, compact)?;
    if !response.is_success() {
        bail!("analysis failed with status {}", response.status_code);
    }
    Ok(())
}

fn run_plan(
    config: &mut Config,
    file: &Path,
    plan_path: &Path,
    execution: &ExecutionArgs,
    compact: bool,
) -> Result<()> {
    config.apply_execution_args(execution)?;
    validate_config(config)?;

    let text = fs::read_to_string(plan_path)
        .with_context(|| format!("Failed to read plan file {}", plan_path.display()))?;
    let plan = parse_plan_text(&text)?;
    let store = TabularStore::load(file, &config.to_load_options())?;
    info!("Loaded {} sheet(s) from {}", store.len(), file.display());

    let client = OllamaClient::new(config.to_ollama_config())?;
    let execution = PlanExecutor::new(&store)
        .with_completer(&client)
        .with_options(config.to_executor_options())
        .execute(&plan)?;

    for warning in &execution.warnings {
        warn!("{warning}");
        eprintln!("Warning: {warning}");
    }
    write_json(&mut io::stdout().lock(), &execution.output, compact)?;
    Ok(())
}

fn handle_config_command(command: ConfigCommands, config: &Config) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let text = toml::to_string_pretty(config)
                .map_err(|e| anyhow!("Failed to serialize config: {e}"))?;
            println!("{text}");
            Ok(())
        }
        ConfigCommands::Init { path, force } => {
            if path.exists() && !force {
                bail!(
                    "Config file already exists: {}\n\n\
                    Use --force to overwrite:\n  \
                    sheetq config init {} --force",
                    path.display(),
                    path.display()
                );
            }
            create_default_config_file(&path)?;
            println!("Created config file: {}", path.display());
            Ok(())
        }
    }
}
