use anyhow::{Context, Result};
use clap::Parser;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stratum_core::cleanup::{install_interrupt_handler, INTERRUPTED_EXIT_CODE};
use stratum_core::config::DEFAULT_TREE_DEPTH;
use stratum_core::describe::write_descriptor;
use stratum_core::orchestrator::DEFAULT_WORKERS;
use stratum_core::package::Packager;
use stratum_core::report::RunReport;
use stratum_core::unit::jobs_for;
use stratum_core::{
    create_workdir, size, CleanupGuard, GenerateConfig, GenerationMode, ProgressReporter,
};

#[derive(Parser, Debug)]
#[command(name = "stratum", version, about = "Generate synthetic layer content and package it as an image")]
struct Cli {
    /// Comma-separated unit sizes, e.g. "512KB,1.5MB,2GB"
    #[arg(long, visible_alias = "layer-sizes")]
    sizes: String,

    /// Parent directory for the working directory (default: system temp)
    #[arg(long)]
    tmpdir_prefix: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    max_concurrent: usize,

    /// Generate a nested tree of files per unit instead of one file
    #[arg(long, default_value_t = false)]
    mock_fs: bool,

    #[arg(long, default_value_t = DEFAULT_TREE_DEPTH)]
    max_depth: usize,

    /// Files per tree unit; 0 derives the count from the unit size
    #[arg(long, default_value_t = 0)]
    target_files: usize,

    /// Write buffer size, as a size string
    #[arg(long, default_value = "10MB")]
    chunk_size: String,

    /// Keep the working directory instead of deleting it
    #[arg(long, default_value_t = false)]
    keep: bool,

    /// Stop after writing the Dockerfile
    #[arg(long, default_value_t = false)]
    no_build: bool,

    /// Write a JSON run summary here
    #[arg(long)]
    report: Option<PathBuf>,

    #[arg(short, long, default_value_t = false)]
    quiet: bool,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Image reference, e.g. repo:tag
    #[arg(required_unless_present = "no_build")]
    tag: Option<String>,
}

/// Run stopped by SIGINT/SIGTERM.
#[derive(Debug)]
struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("interrupted")
    }
}

impl std::error::Error for Interrupted {}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = setup_logging(cli.verbose, cli.quiet) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is::<Interrupted>() => ExitCode::from(INTERRUPTED_EXIT_CODE as u8),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let sizes = size::parse_list(&cli.sizes).context("invalid --sizes")?;
    let chunk_size = size::parse(&cli.chunk_size).context("invalid --chunk-size")?;
    let mode = if cli.mock_fs {
        GenerationMode::Tree {
            max_depth: cli.max_depth,
            target_files: (cli.target_files > 0).then_some(cli.target_files),
        }
    } else {
        GenerationMode::SingleFile
    };
    let config = GenerateConfig {
        max_workers: cli.max_concurrent,
        mode,
        chunk_size: usize::try_from(chunk_size).context("--chunk-size too large")?,
        show_progress: !cli.quiet,
    };
    let orchestrator = config.orchestrator().context("invalid configuration")?;

    let root = create_workdir(cli.tmpdir_prefix.as_deref()).context("create working directory")?;
    say(&cli, format!("Working directory: {}", root.display()));

    let guard = Arc::new(CleanupGuard::new(&root));
    install_interrupt_handler(Arc::clone(&guard), orchestrator.cancel_token())
        .context("install signal handler")?;

    let outcome = (|| -> Result<()> {
        say(&cli, format!("Creating {} units (max {} concurrent)...", sizes.len(), config.max_workers));
        let progress = ProgressReporter::with_output(
            sizes.len(),
            sizes.iter().sum(),
            config.show_progress,
        );
        let generated = orchestrator
            .generate(jobs_for(&root, &sizes), &progress)
            .context("generate units")?;

        write_descriptor(&root, sizes.len())?;

        if let Some(tag) = cli.tag.as_deref().filter(|_| !cli.no_build) {
            let packager = Packager::detect()?;
            say(&cli, format!("Building image with {}...", packager.program().display()));
            packager.build(&root, tag)?;
            say(&cli, format!("Successfully built image {}", tag));
        }

        if let Some(path) = &cli.report {
            RunReport::new(&root, mode, &generated).write(path)?;
            info!(path = %path.display(), "report written");
        }
        Ok(())
    })();

    if guard.was_interrupted() {
        // removal runs on the signal thread and must finish before exit
        guard.wait_done();
        return Err(Interrupted.into());
    }
    finish_workdir(&cli, &guard);
    outcome
}

fn finish_workdir(cli: &Cli, guard: &CleanupGuard) {
    if cli.keep {
        if let Some(dir) = guard.release() {
            say(cli, format!("Kept working directory: {}", dir.display()));
        }
    } else {
        guard.complete();
    }
}

fn say(cli: &Cli, msg: impl AsRef<str>) {
    if !cli.quiet {
        println!("{}", msg.as_ref());
    }
}

fn setup_logging(verbose: bool, quiet: bool) -> Result<()> {
    let default = if verbose {
        "stratum=debug,stratum_core=debug,warn"
    } else if quiet {
        "warn"
    } else {
        "stratum=info,stratum_core=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
