//! `confine` command line.
//!
//! `build` compiles one or more projects, `lookup` shows the label the
//! system would give a path, `engines` lists backends and `status`
//! reports whether a module is installed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use confine::catalog::Catalog;
use confine::compiler::Compiler;
use confine::context::FileClass;
use confine::diagnostics::Diagnostics;
use confine::engine::{Engine, ENGINES};
use confine::label;
use confine::project::Project;
use confine::settings::Settings;

/// Compile per-application permissions into SELinux policy modules.
#[derive(Parser)]
#[command(name = "confine", version, about)]
struct Cli {
    /// Settings file. Discovered from the environment when omitted.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Also write JSON logs to this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Compile projects into module directories.
    Build {
        /// Project document (JSON). May be repeated.
        #[arg(short = 'p', long = "project", required = true)]
        projects: Vec<PathBuf>,
        /// Output directory; each module gets a subdirectory.
        #[arg(short, long)]
        out: PathBuf,
        /// Emit sources only, skipping `checkmodule` and `semodule_package`.
        #[arg(long)]
        no_package: bool,
        /// Backend to build with.
        #[arg(long, default_value = "selinux")]
        engine: String,
    },
    /// Show the system label of a path.
    Lookup {
        /// Absolute path.
        path: String,
        /// File class keyword (`file`, `dir`, `exec_file`, ...).
        #[arg(long, default_value = "all")]
        class: String,
    },
    /// List available backends.
    Engines,
    /// Report whether a module is installed.
    Status {
        /// Module name.
        module: String,
        /// Backend to query.
        #[arg(long, default_value = "selinux")]
        engine: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _logging_guard = match &cli.log_dir {
        Some(dir) => Some(confine::logging::init_file(dir)?),
        None => {
            confine::logging::init_cli();
            None
        }
    };

    let settings = match &cli.settings {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings {}", path.display()))?,
        None => Settings::discover().context("failed to discover settings")?,
    };

    match cli.command {
        Command::Build {
            projects,
            out,
            no_package,
            engine,
        } => handle_build(settings, projects, out, no_package, &engine).await,
        Command::Lookup { path, class } => handle_lookup(&settings, &path, &class),
        Command::Engines => {
            for engine in ENGINES {
                println!("{}\t{}", engine.name(), engine.description());
            }
            Ok(())
        }
        Command::Status { module, engine } => {
            let engine = find_engine(&engine)?;
            let compiler = Compiler::new(settings, Diagnostics::silent());
            let status = engine
                .status(&compiler, &module)
                .with_context(|| format!("failed to query module {module}"))?;
            println!("{module}: {status}");
            Ok(())
        }
    }
}

fn find_engine(name: &str) -> anyhow::Result<Engine> {
    Engine::find(name).with_context(|| format!("unknown engine {name}"))
}

/// Build every project on its own blocking worker.
async fn handle_build(
    mut settings: Settings,
    projects: Vec<PathBuf>,
    out: PathBuf,
    no_package: bool,
    engine: &str,
) -> anyhow::Result<()> {
    let engine = find_engine(engine)?;
    if no_package {
        settings.toolchain.enabled = false;
    }
    std::fs::create_dir_all(&out)
        .with_context(|| format!("failed to create {}", out.display()))?;

    let (sink, mut rx) = Diagnostics::channel();
    let drain = tokio::spawn(async move {
        while let Some(diagnostic) = rx.recv().await {
            println!("{diagnostic}");
        }
    });

    let mut workers = Vec::with_capacity(projects.len());
    for path in projects {
        let compiler = Compiler::new(settings.clone(), sink.clone());
        let out = out.clone();
        workers.push(tokio::task::spawn_blocking(move || {
            let project = Project::load(&path)
                .with_context(|| format!("failed to load project {}", path.display()))?;
            let report = engine
                .build(&compiler, &project, &out)
                .with_context(|| format!("failed to build project {}", project.name))?;
            anyhow::Ok((project.name, report))
        }));
    }
    drop(sink);

    let mut failed = 0usize;
    for worker in workers {
        match worker.await.context("build worker panicked")? {
            Ok((name, report)) => {
                for module in &report.modules {
                    info!(project = %name, module = %module.name, packaged = module.packaged, "module built");
                }
                if !report.is_success() {
                    failed = failed.saturating_add(1);
                }
            }
            Err(err) => {
                error!(error = %format!("{err:#}"), "build failed");
                failed = failed.saturating_add(1);
            }
        }
    }

    drain.await.context("diagnostics task panicked")?;

    if failed > 0 {
        bail!("{failed} project(s) failed to build");
    }
    Ok(())
}

/// Print the tier, pattern and context that label `path`.
fn handle_lookup(settings: &Settings, path: &str, class: &str) -> anyhow::Result<()> {
    let Some((class, _)) = FileClass::from_keyword(class) else {
        bail!("unknown file class {class}");
    };
    let catalog = Catalog::load(&settings.system).context("failed to load system catalog")?;
    let folded = label::fold(path);
    match catalog.lookup_with_tier(&folded, class) {
        Some((tier, fc)) => {
            println!(
                "{}\t{}\t{}",
                format!("{tier:?}").to_lowercase(),
                fc.pattern,
                fc.context
            );
            Ok(())
        }
        None => bail!("no label covers {path}"),
    }
}
