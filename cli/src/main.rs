//! CLI entrypoint for toolgate
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

mod args;
mod output;

use anyhow::{Context, Result, bail};
use args::{Cli, Command, OutputFormat};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toolgate_application::{
    AggregateToolsUseCase, DispatchOutput, DispatchToolCallUseCase, ToolCatalog,
};
use toolgate_domain::{CallCountTable, ConversationMessage, ToolCallRequest};
use toolgate_infrastructure::{
    ConfigLoader, FileConfig, FileProjectStore, McpClientFactory, http_client,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Command::Config = cli.command {
        return show_config(&cli);
    }

    let config = load_config(&cli)?;

    match &cli.command {
        Command::Tools { project, format } => {
            let catalog = aggregate(&config, project).await?;
            match format {
                OutputFormat::Text => println!("{}", output::format_catalog(&catalog)),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&catalog.function_schemas())?
                ),
            }
            catalog.close().await;
        }
        Command::Call {
            project,
            tool,
            args,
        } => {
            let arguments: serde_json::Value =
                serde_json::from_str(args).context("--args must be valid JSON")?;
            let call = ToolCallRequest::from_arguments(tool.as_str(), &arguments)?;

            let catalog = aggregate(&config, project).await?;
            let dispatch = DispatchToolCallUseCase::new(config.guard.to_limits());
            let history: Vec<ConversationMessage> = Vec::new();
            let result = dispatch
                .execute(project, &catalog, &history, &CallCountTable::new(), &call)
                .await;
            catalog.close().await;

            println!("{}", output::format_dispatch(&result));
            match result {
                DispatchOutput::Denied { .. } => bail!("Tool call was denied"),
                DispatchOutput::Completed { outcome, .. } if outcome.is_error => {
                    bail!("Tool call failed")
                }
                DispatchOutput::Completed { .. } => {}
            }
        }
        Command::Config => {}
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<FileConfig> {
    if cli.no_config {
        info!("Configuration files disabled, using defaults");
        return Ok(ConfigLoader::load_defaults());
    }

    let (config, warnings) = ConfigLoader::load_validated(cli.config.as_ref())?;
    for issue in &warnings {
        warn!("{}", issue);
    }
    Ok(config)
}

fn show_config(cli: &Cli) -> Result<()> {
    ConfigLoader::print_config_sources(cli.config.as_ref());

    if cli.no_config {
        return Ok(());
    }

    let config = ConfigLoader::load(cli.config.as_ref())?;
    println!();
    println!("Projects: {}", config.projects.len());
    for project in &config.projects {
        println!("  {} ({} servers)", project.id, project.servers.len());
    }

    let issues = config.validate();
    if issues.is_empty() {
        println!("No issues found.");
    } else {
        println!();
        for issue in &issues {
            println!("  {}", issue);
        }
    }
    Ok(())
}

async fn aggregate(config: &FileConfig, project_id: &str) -> Result<ToolCatalog> {
    if config.project(project_id).is_none() {
        bail!("Unknown project '{}'", project_id);
    }

    let aggregation = config.aggregation.to_aggregation_config();
    let factory = Arc::new(
        McpClientFactory::new(http_client()?)
            .with_request_timeout(aggregation.request_timeout),
    );
    let store = Arc::new(FileProjectStore::from_config(config));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning outstanding providers");
            on_interrupt.cancel();
        }
    });

    let use_case = AggregateToolsUseCase::new(factory, store)
        .with_config(aggregation)
        .with_cancellation(cancel);
    let catalog = use_case.execute(project_id).await;
    interrupt.abort();

    info!(project = project_id, tools = catalog.len(), "Catalog assembled");
    Ok(catalog)
}
