//! apigen - rule-driven header API generator
//!
//! Entry point: loads the configuration and source model, runs the
//! transform, then either emits the target model or patches headers.

mod cli;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use apigen_core::{
    expand_config_paths, load_model, load_transform_spec, model_to_json, patch_file, save_model, transform_api,
    ApiModel, HeaderRenderer, Module, Renderer,
};
use clap::Parser;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ModelArgs, PatchArgs, TransformArgs};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("error: {:#}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Logs go to stderr so stdout stays clean for the emitted model.
/// `RUST_LOG` takes precedence over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Transform(args) => run_transform(args),
        Command::Patch(args) => run_patch(args),
    }
}

/// Load configuration and source, and run the transform
fn build_target(args: &ModelArgs) -> Result<ApiModel> {
    let configs = expand_config_paths(&args.config);
    if configs.is_empty() {
        bail!("no configuration files matched {:?}", args.config);
    }
    debug!(configs = ?configs, "loading configuration");
    let spec = load_transform_spec(&configs).context("loading configuration")?;
    let source = load_model(&args.source)?;
    info!(files = source.files.len(), "loaded source model");
    Ok(transform_api(&source, &spec)?)
}

fn run_transform(args: TransformArgs) -> Result<()> {
    let target = build_target(&args.model)?;

    match &args.output {
        Some(path) => save_model(path, &target)?,
        None if args.render.is_none() => println!("{}", model_to_json(&target)?),
        None => {}
    }

    if let Some(dir) = &args.render {
        let renderer = HeaderRenderer::default();
        let mut positioned = ApiModel::new();
        for (path, module) in &target.files {
            let (text, located) = renderer.render_positioned(module);
            write_header(&dir.join(path), &text)?;
            positioned.files.insert(path.clone(), located);
        }
        info!(files = target.files.len(), dir = %dir.display(), "rendered headers");
        if let Some(positions) = &args.positions {
            save_model(positions, &positioned)?;
        }
    }

    Ok(())
}

fn write_header(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

/// Result of reconciling one target module with its header
struct FileOutcome {
    path: PathBuf,
    changes: usize,
    written: bool,
    /// The target positioned in the header as it now is on disk
    located: Option<Module>,
}

fn patch_one(
    root: &Path,
    key: &str,
    target: &Module,
    current: Option<&Module>,
    renderer: &HeaderRenderer,
    dry_run: bool,
) -> Result<FileOutcome> {
    let path = root.join(key);
    let Some(current) = current else {
        // Not generated yet: render the whole header
        if dry_run {
            return Ok(FileOutcome {
                path,
                changes: 1,
                written: false,
                located: None,
            });
        }
        let (text, located) = renderer.render_positioned(target);
        write_header(&path, &text)?;
        return Ok(FileOutcome {
            path,
            changes: 1,
            written: true,
            located: Some(located),
        });
    };

    let summary = patch_file(&path, current, target, renderer, dry_run)?;
    let on_disk = summary.written || summary.changes.is_empty();
    Ok(FileOutcome {
        path,
        changes: summary.changes.len(),
        written: summary.written,
        located: on_disk.then_some(summary.located),
    })
}

fn run_patch(args: PatchArgs) -> Result<()> {
    let target = build_target(&args.model)?;
    let current = load_model(&args.current)?;

    let concurrency = args.concurrency.unwrap_or_else(num_cpus::get);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .build()
        .context("building worker pool")?;

    let renderer = HeaderRenderer::default();
    let files: Vec<(&String, &Module)> = target.files.iter().collect();
    let outcomes: Vec<(&String, Result<FileOutcome>)> = pool.install(|| {
        files
            .par_iter()
            .map(|(key, module)| {
                let outcome = patch_one(
                    &args.root,
                    key,
                    module,
                    current.files.get(*key),
                    &renderer,
                    args.dry_run,
                );
                (*key, outcome)
            })
            .collect()
    });

    let mut failures = 0;
    let mut positioned = ApiModel::new();
    for (key, outcome) in outcomes {
        match outcome {
            Ok(outcome) => {
                if outcome.changes == 0 {
                    debug!(file = %key, "up to date");
                } else {
                    let verb = if outcome.written { "patched" } else { "would patch" };
                    println!("{}: {} ({} changes)", outcome.path.display(), verb, outcome.changes);
                }
                if let Some(located) = outcome.located {
                    positioned.files.insert(key.clone(), located);
                }
            }
            Err(e) => {
                let error = format!("{:#}", e);
                warn!(file = %key, error = %error, "patch failed");
                failures += 1;
            }
        }
    }

    for key in current.files.keys().filter(|key| !target.files.contains_key(*key)) {
        warn!(file = %key, "header has no target module, left untouched");
    }

    if let Some(path) = &args.positions {
        // Untouched headers keep the positions they came with
        for (key, module) in &current.files {
            if !positioned.files.contains_key(key) {
                positioned.files.insert(key.clone(), module.clone());
            }
        }
        save_model(path, &positioned)?;
        info!(files = positioned.files.len(), path = %path.display(), "saved header positions");
    }

    if failures > 0 {
        bail!("{} of {} files failed to patch", failures, target.files.len());
    }
    Ok(())
}
