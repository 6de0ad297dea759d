use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use unibuild_sdk::recipe::Libav;
use unibuild_sdk::{BuildVariant, CheckoutPolicy, LibraryRecipe, LibraryTask, TaskReport};

use config::{CONFIG_FILE_NAME, UnibuildConfig};

mod config;

/// Builds libav for several architectures and merges the results into universal binaries.
#[derive(Parser, Debug)]
#[command(name = "unibuild", author, version, about = "Pinned multi-architecture libav builds", long_about = None)]
struct Cli {
    /// Show every external command that runs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to unibuild.toml (discovered from the current directory if omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check out, build and merge the debug variant.
    Debug {
        #[arg(long, help = "Discard local modifications in the source tree")]
        force: bool,
    },
    /// Check out, build and merge the release variant.
    Release {
        #[arg(long, help = "Discard local modifications in the source tree")]
        force: bool,
    },
    /// Remove build outputs, merged artifacts and the source tree.
    Clean {
        #[arg(long, help = "Leave the checked-out source tree in place")]
        keep_source: bool,
    },
    /// Only bring the source tree to the pinned tag.
    Checkout {
        #[arg(long, help = "Discard local modifications in the source tree")]
        force: bool,
    },
    /// Print the configure arguments used for each architecture.
    Flags {
        #[arg(long, value_enum, help = "Only show one variant")]
        variant: Option<VariantArg>,
    },
    /// Scaffold a unibuild.toml.
    Init {
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        output: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
#[clap(rename_all = "lowercase")]
enum VariantArg {
    Debug,
    Release,
}

impl From<VariantArg> for BuildVariant {
    fn from(variant: VariantArg) -> Self {
        match variant {
            VariantArg::Debug => BuildVariant::Debug,
            VariantArg::Release => BuildVariant::Release,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// Runs a command; `Ok(false)` means it finished but reported failures.
fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Init { output } => {
            cmd_init(&output)?;
            Ok(true)
        }
        Command::Debug { force } => {
            let session = Session::load(cli.config.as_deref(), force)?;
            cmd_variant(&session, BuildVariant::Debug)
        }
        Command::Release { force } => {
            let session = Session::load(cli.config.as_deref(), force)?;
            cmd_variant(&session, BuildVariant::Release)
        }
        Command::Clean { keep_source } => {
            let session = Session::load(cli.config.as_deref(), false)?;
            cmd_clean(&session, !keep_source)?;
            Ok(true)
        }
        Command::Checkout { force } => {
            let session = Session::load(cli.config.as_deref(), force)?;
            let tree = session.task.checkout()?;
            println!("{} at {} ({})", tree.path.display(), tree.tag, tree.commit);
            Ok(true)
        }
        Command::Flags { variant } => {
            let session = Session::load(cli.config.as_deref(), false)?;
            cmd_flags(&session, variant.map(Into::into));
            Ok(true)
        }
    }
}

/// A task assembled from `unibuild.toml` and CLI flags.
struct Session {
    task: LibraryTask,
}

impl Session {
    fn load(config_path: Option<&Path>, force: bool) -> Result<Self> {
        let cwd = env::current_dir().context("Failed to get current directory")?;
        let (config, base) = match config_path {
            Some(path) => {
                let config = UnibuildConfig::load_from_file(path)?;
                (config, parent_dir(path, &cwd))
            }
            None => match UnibuildConfig::discover_from(&cwd)? {
                Some((config, path)) => {
                    info!(config = %path.display(), "using configuration");
                    let base = parent_dir(&path, &cwd);
                    (config, base)
                }
                None => (UnibuildConfig::default(), cwd.clone()),
            },
        };

        let defaults = Libav::new();
        let recipe = Libav::new()
            .with_repository(config.repository(defaults.repository()))
            .with_feature_overrides(config.feature_overrides()?);

        let mut options = config.task_options()?;
        if options.architectures.is_empty() {
            bail!("No architectures configured. Set [build] architectures in {}", CONFIG_FILE_NAME);
        }
        options.checkout = CheckoutPolicy { force };

        let work_dir = config.work_dir(&base);
        Ok(Self {
            task: LibraryTask::new(recipe, work_dir, options),
        })
    }
}

fn parent_dir(path: &Path, cwd: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => cwd.join(parent),
        _ => cwd.to_path_buf(),
    }
}

fn cmd_variant(session: &Session, variant: BuildVariant) -> Result<bool> {
    let report = session
        .task
        .run_variant(variant)
        .with_context(|| format!("{} build aborted", variant))?;
    print_report(&report);
    Ok(report.is_success())
}

fn print_report(report: &TaskReport) {
    for output in &report.build.outputs {
        println!("built {} {}", report.variant, output.architecture);
    }
    for failure in &report.build.failures {
        error!(
            arch = %failure.architecture,
            stage = failure.error.stage(),
            kind = failure.error.kind(),
            "architecture failed"
        );
        eprintln!("{}", failure.error);
    }
    match (&report.artifact, &report.merge_error) {
        (Some(artifact), _) => println!(
            "universal {} artifacts: {} ({})",
            report.variant,
            artifact.directory.display(),
            artifact
                .architectures
                .iter()
                .map(|a| a.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        (None, Some(err)) => {
            error!(kind = err.kind(), "merge failed");
            eprintln!("{}", err);
        }
        (None, None) => {}
    }
}

fn cmd_clean(session: &Session, remove_source: bool) -> Result<()> {
    let removed = session.task.clean(remove_source).context("Clean failed")?;
    if removed.is_empty() {
        println!("Nothing to clean");
    } else {
        println!("Removed {} path(s)", removed.len());
    }
    Ok(())
}

fn cmd_flags(session: &Session, variant: Option<BuildVariant>) {
    let variants = match variant {
        Some(variant) => vec![variant],
        None => BuildVariant::ALL.to_vec(),
    };
    let recipe = session.task.recipe();
    for variant in variants {
        for arch in &session.task.options().architectures {
            println!("{}-{}: {}", variant, arch, recipe.configure_line(arch, variant));
        }
    }
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        bail!(
            "{} already exists. Remove it first or pass --output to write elsewhere",
            output.display()
        );
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    fs::write(output, UnibuildConfig::generate_starter_toml())
        .with_context(|| format!("Failed to write config file: {:?}", output))?;
    println!("Wrote {}", output.display());
    Ok(())
}
