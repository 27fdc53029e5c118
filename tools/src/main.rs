use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pipeline::PipelineConfig;
use s2demo_tools::{
    collect_demo_entries, collect_stats, dump_entities, format_entities_pretty,
    format_stats_pretty, load_config, EntityFilter,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use wire::DemoSource;

#[derive(Parser)]
#[command(
    name = "s2demo-tools",
    version,
    about = "Source 2 demo inspection tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse demos and report packet, memory and timing statistics.
    Stats {
        /// A demo file, or a directory of demo files.
        path: PathBuf,
        /// Glob filter when `path` is a directory.
        #[arg(long)]
        glob: Option<String>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Dump the entities left at the end of a demo.
    Entities {
        /// Path to the demo file.
        path: PathBuf,
        /// Only entities of this class.
        #[arg(long)]
        class: Option<String>,
        /// Stop after this many entities.
        #[arg(long)]
        limit: Option<usize>,
        /// Include entities that left the PVS.
        #[arg(long)]
        inactive: bool,
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Pipeline config JSON; missing keys keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Decode worker threads (0 decodes inline).
    #[arg(long)]
    workers: Option<usize>,
    /// Input uses broadcast framing instead of the replay file format.
    #[arg(long)]
    broadcast: bool,
    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Pretty)]
    format: Format,
}

impl RunArgs {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path).context("load config")?,
            None => PipelineConfig::default(),
        };
        if let Some(workers) = self.workers {
            config.worker_threads = workers;
            config
                .validate()
                .map_err(|err| anyhow::anyhow!("invalid --workers: {err}"))?;
        }
        Ok(config)
    }

    const fn source(&self) -> DemoSource {
        if self.broadcast {
            DemoSource::Broadcast
        } else {
            DemoSource::Replay
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Json,
    Pretty,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Stats { path, glob, run } => {
            let config = run.pipeline_config()?;
            let entries = collect_demo_entries(&path, glob.as_deref())?;
            if entries.is_empty() {
                anyhow::bail!("no demo files under {}", path.display());
            }
            for entry in entries {
                debug!(path = %entry.path.display(), bytes = entry.size, "parsing demo");
                let file = open(&entry.path)?;
                let report = collect_stats(
                    &entry.path.display().to_string(),
                    entry.size,
                    file,
                    config.clone(),
                    run.source(),
                )?;
                match run.format {
                    Format::Json => {
                        let json =
                            serde_json::to_string_pretty(&report).context("serialize json")?;
                        println!("{json}");
                    }
                    Format::Pretty => print!("{}", format_stats_pretty(&report)),
                }
            }
        }
        Command::Entities {
            path,
            class,
            limit,
            inactive,
            run,
        } => {
            let filter = EntityFilter {
                class,
                limit,
                include_inactive: inactive,
            };
            let dumps = dump_entities(open(&path)?, run.pipeline_config()?, run.source(), &filter)
                .with_context(|| format!("dump entities of {}", path.display()))?;
            match run.format {
                Format::Json => {
                    let json = serde_json::to_string_pretty(&dumps).context("serialize json")?;
                    println!("{json}");
                }
                Format::Pretty => print!("{}", format_entities_pretty(&dumps)),
            }
        }
    }
    Ok(())
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("open demo {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
