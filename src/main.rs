//! Vellum - render hierarchical text templates from the command line.

mod cli;
mod watch;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Commands, RenderArgs};
use rayon::prelude::*;
use std::{fs, path::Path};
use vellum::{
    Engine, EngineConfig, ExecutedTemplate, RenderFailure, RenderOptions, ValueBag, log, logger,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::set_verbose(cli.verbose);
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Render { args } => {
            let engine = Engine::new(config)?;
            let executed = render(&engine, args)?;
            emit(&executed, args)
        }
        Commands::List => list(&Engine::new(config)?),
        Commands::Check => check(&Engine::new(config)?),
        Commands::Watch { args } => watch::watch_blocking(config, args),
    }
}

/// Load and validate configuration from CLI arguments.
///
/// Without a config file or `--dir`, the project root itself is the
/// template directory.
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = if config_path.exists() {
        EngineConfig::from_path(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    } else {
        EngineConfig::default()
    };

    config.sources.directories.extend(cli.dirs.iter().cloned());
    if config.sources.directories.is_empty() {
        config.sources.directories.push(root.to_path_buf());
    }
    config.resolve_directories(root);

    if cli.wants_generated() {
        config.templates.include_generated_source = true;
    }
    if cli.is_watch() {
        config.sources.watch = true;
    }

    config.validate()?;
    Ok(config)
}

/// Build render options from `--model`, `--data`, `--bag` and `--skip-layout`.
pub(crate) fn render_options(args: &RenderArgs) -> Result<RenderOptions> {
    let model = match (&args.model, &args.data) {
        (Some(path), _) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read model {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?
        }
        (None, Some(data)) => serde_json::from_str(data).context("Invalid JSON in --data")?,
        (None, None) => serde_json::Value::Null,
    };

    let mut options = RenderOptions::new()
        .with_model(model)
        .skip_layout(args.skip_layout);
    if let Some(bag) = &args.bag {
        let value: serde_json::Value = serde_json::from_str(bag).context("Invalid JSON in --bag")?;
        options = options.with_bag(ValueBag::from_serialize(value).context("Invalid --bag")?);
    }
    Ok(options)
}

/// Render once, logging the partial tree on failure.
pub(crate) fn render(engine: &Engine, args: &RenderArgs) -> Result<ExecutedTemplate> {
    let options = render_options(args)?;
    engine.execute(&args.path, options).map_err(|failure| {
        report_failure(&failure, args.tree);
        anyhow::Error::new(failure)
    })
}

pub(crate) fn report_failure(failure: &RenderFailure, show_tree: bool) {
    if show_tree && let Some(tree) = failure.tree() {
        log!("error"; "partial tree:\n{}", tree.outline().trim_end());
    }
}

/// Write the result and the requested diagnostics.
pub(crate) fn emit(executed: &ExecutedTemplate, args: &RenderArgs) -> Result<()> {
    match &args.output {
        Some(path) => fs::write(path, executed.result())
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", executed.result()),
    }

    if args.tree {
        log!("render"; "tree:\n{}", executed.tree().outline().trim_end());
    }
    if args.generated {
        for node in executed.tree().iter() {
            if let Some(source) = node.generated_source() {
                log!("render"; "{}:\n{}", node.virtual_path().display_virtual(), source.trim_end());
            }
        }
    }
    Ok(())
}

fn list(engine: &Engine) -> Result<()> {
    for source in engine.directories()? {
        log!("source"; "{}", source.root().display());
        for address in source.list() {
            println!("{}", address.display_virtual());
        }
    }
    Ok(())
}

/// Compile every template in parallel.
fn check(engine: &Engine) -> Result<()> {
    let addresses: Vec<_> = engine
        .directories()?
        .iter()
        .flat_map(|source| source.list())
        .collect();

    let failures: Vec<_> = addresses
        .par_iter()
        .filter_map(|address| {
            engine
                .precompile(&address.to_string(), true)
                .err()
                .map(|err| (address.display_virtual(), anyhow::Error::new(err)))
        })
        .collect();

    for (address, err) in &failures {
        log!("error"; "{address}: {err:#}");
    }
    if !failures.is_empty() {
        bail!("{} of {} templates failed to compile", failures.len(), addresses.len());
    }
    log!("check"; "{} templates compiled", addresses.len());
    Ok(())
}
