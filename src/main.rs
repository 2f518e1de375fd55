use anyhow::{anyhow, Result};
use clap::Parser;
use std::io;
use tracing_subscriber::EnvFilter;

mod catalog;
mod cli;
mod completion;
mod config;
mod openai;
mod orchestrator;
mod session;
mod shape;

use catalog::{Catalog, GrammarRule};
use cli::{Command, GlobalArgs, InteractiveArgs, RootArgs, TranslateArgs};
use completion::StructuredClient;
use config::AppConfig;
use openai::OpenAiBackend;
use orchestrator::Orchestrator;
use session::{render_text, Session, EMPTY_INPUT_HINT};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.global.verbose);
    let config = resolve_config(&args.global)?;

    match args.command {
        Command::Grammars => cmd_grammars(&config),
        Command::Translate(translate) => cmd_translate(&config, translate),
        Command::Interactive(interactive) => cmd_interactive(&config, interactive),
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "timeless=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn resolve_config(global: &GlobalArgs) -> Result<AppConfig> {
    let mut config = config::load_config(global.config.as_deref())?;
    if let Some(dir) = &global.prompts_dir {
        config.prompts_dir = dir.clone();
    }
    if let Some(model) = &global.model {
        config.model = model.clone();
    }
    config::validate_config(&config)?;
    Ok(config)
}

/// Credentials are checked before any submission so auth failures block the
/// session up front.
fn build_client(config: &AppConfig) -> Result<StructuredClient<OpenAiBackend>> {
    let api_key = openai::load_api_key()?;
    let backend = OpenAiBackend::new(&config.backend_settings(), api_key);
    Ok(StructuredClient::new(backend, config.temperature))
}

fn select_rule<'a>(catalog: &'a Catalog, name: Option<&str>) -> Result<&'a GrammarRule> {
    match name {
        Some(name) => catalog.require(name),
        None => catalog
            .first()
            .ok_or_else(|| anyhow!("grammar catalog is empty")),
    }
}

fn cmd_grammars(config: &AppConfig) -> Result<()> {
    let catalog = catalog::load_catalog(&config.grammars_dir())?;
    for name in catalog.names() {
        println!("{name}");
    }
    Ok(())
}

fn cmd_translate(config: &AppConfig, args: TranslateArgs) -> Result<()> {
    let catalog = catalog::load_catalog(&config.grammars_dir())?;
    let rule = select_rule(&catalog, args.grammar.as_deref())?;
    let selector = catalog::load_selector_instruction(&config.selector_path())?;
    let client = build_client(config)?;
    let orchestrator = Orchestrator::new(client, &catalog, selector);

    let state = orchestrator.process(&args.sentence, rule)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }
    if args.sentence.trim().is_empty() {
        println!("{EMPTY_INPUT_HINT}");
        return Ok(());
    }
    print!("{}", render_text(&state, &catalog));
    Ok(())
}

fn cmd_interactive(config: &AppConfig, args: InteractiveArgs) -> Result<()> {
    let catalog = catalog::load_catalog(&config.grammars_dir())?;
    let rule = select_rule(&catalog, args.grammar.as_deref())?;
    let selector = catalog::load_selector_instruction(&config.selector_path())?;
    let client = build_client(config)?;
    let orchestrator = Orchestrator::new(client, &catalog, selector);

    let mut session = Session::new(&orchestrator, rule);
    session.run(io::stdin().lock(), io::stdout().lock())
}
