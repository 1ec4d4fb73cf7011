//! reggol CLI: create run directories and look at what experiments logged.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use reggol::git::GIT_INFOS_FILE;
use reggol::{storage, GitCli, Logger, LoggerConfig, NoGit};

#[derive(Parser)]
#[command(
    name = "reggol",
    about = "Experiment logger: timestamped run directories, CSV metrics, snapshots",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a run directory and print its path
    New {
        /// Experiment prefix (overrides the one in --config)
        prefix: Option<String>,
        /// YAML file with logger settings and an optional `variant` mapping
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// Root directory for runs
        #[arg(long)]
        base_dir: Option<PathBuf>,
        /// Number of this run within the experiment
        #[arg(long)]
        exp_id: Option<u32>,
        #[arg(long)]
        seed: Option<u64>,
        /// Skip recording git state of the project root
        #[arg(long)]
        no_git: bool,
    },
    /// List experiment prefixes, or the runs under one prefix
    List {
        /// Root directory for runs
        #[arg(default_value = "./data")]
        dir: PathBuf,
        /// Show runs for this experiment prefix
        #[arg(long, short)]
        prefix: Option<String>,
        /// Name of the tabular file inside each run directory
        #[arg(long, default_value = "progress.csv")]
        tabular_file: String,
        /// Field delimiter of the tabular file
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
    /// Show the variant, last metrics row, snapshots and git info of a run
    Inspect {
        /// Path to the run directory
        log_dir: PathBuf,
        /// Name of the tabular file inside the run directory
        #[arg(long, default_value = "progress.csv")]
        tabular_file: String,
        /// Name of the variant file inside the run directory
        #[arg(long, default_value = "variant.json")]
        variant_file: String,
        /// Field delimiter of the tabular file
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
    /// Export the tabular log of a run to CSV or JSON
    Export {
        /// Path to the run directory
        log_dir: PathBuf,
        /// Output format
        #[arg(long, short, default_value = "csv", value_parser = ["csv", "json"])]
        format: String,
        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Name of the tabular file inside the run directory
        #[arg(long, default_value = "progress.csv")]
        tabular_file: String,
        /// Field delimiter of the tabular file
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::New {
            prefix,
            config,
            base_dir,
            exp_id,
            seed,
            no_git,
        } => {
            cmd_new(prefix, config, base_dir, exp_id, seed, no_git)?;
        }
        Commands::List {
            dir,
            prefix,
            tabular_file,
            delimiter,
        } => {
            cmd_list(dir, prefix, &tabular_file, delimiter)?;
        }
        Commands::Inspect {
            log_dir,
            tabular_file,
            variant_file,
            delimiter,
        } => {
            cmd_inspect(log_dir, &tabular_file, &variant_file, delimiter)?;
        }
        Commands::Export {
            log_dir,
            format,
            output,
            tabular_file,
            delimiter,
        } => {
            cmd_export(log_dir, &format, output, &tabular_file, delimiter)?;
        }
    }

    Ok(())
}

// ─── Command implementations ──────────────────────────────────────────────────

fn cmd_new(
    prefix: Option<String>,
    config_path: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    exp_id: Option<u32>,
    seed: Option<u64>,
    no_git: bool,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => LoggerConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LoggerConfig::default(),
    };
    if let Some(prefix) = prefix {
        config.exp_prefix = prefix;
    }
    if config.exp_prefix.is_empty() {
        anyhow::bail!("An experiment prefix is required (argument or `exp_prefix` in --config)");
    }
    if let Some(dir) = base_dir {
        config.base_log_dir = Some(dir);
    }
    if let Some(id) = exp_id {
        config.exp_id = id;
    }
    if seed.is_some() {
        config.seed = seed;
    }
    // stdout carries only the resulting path
    config.log_tabular_only = true;

    let mut logger = if no_git {
        Logger::setup_with_git(config, &NoGit)?
    } else {
        Logger::setup_with_git(config, &GitCli::default())?
    };
    logger.close()?;

    let log_dir = logger
        .log_dir()
        .context("Logger did not create a log directory")?;
    debug!(dir = %log_dir.display(), "run directory created");
    println!("{}", log_dir.display());
    Ok(())
}

fn cmd_list(
    dir: PathBuf,
    prefix: Option<String>,
    tabular_file: &str,
    delimiter: char,
) -> Result<()> {
    let delimiter = delimiter_byte(delimiter)?;
    if let Some(prefix) = prefix {
        // List runs for a single prefix
        let prefix_dir = dir.join(prefix.replace('_', "-"));
        let runs = storage::list_runs(&prefix_dir)?;

        if runs.is_empty() {
            println!("No runs found for prefix '{}'", prefix);
            return Ok(());
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(["Run", "Rows", "Snapshots"]);

        for run_name in &runs {
            let run_dir = prefix_dir.join(run_name);
            let rows = storage::read_tabular(&run_dir.join(tabular_file), delimiter)
                .map(|data| data.rows.len().to_string())
                .unwrap_or_else(|_| "-".to_string());
            let snapshots = storage::list_snapshots(&run_dir)
                .map(|s| s.len().to_string())
                .unwrap_or_else(|_| "-".to_string());
            table.add_row([run_name.clone(), rows, snapshots]);
        }

        println!("Prefix: {}", prefix);
        println!("{}", table);
    } else {
        // List all prefixes
        let prefixes = storage::list_subdirs(&dir)?;

        if prefixes.is_empty() {
            println!("No experiments found in '{}'", dir.display());
            return Ok(());
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(["Prefix", "Runs"]);

        for name in &prefixes {
            let runs = storage::list_runs(&dir.join(name)).unwrap_or_default();
            table.add_row([name.clone(), runs.len().to_string()]);
        }

        println!("Experiments in: {}", dir.display());
        println!("{}", table);
    }

    Ok(())
}

fn cmd_inspect(
    log_dir: PathBuf,
    tabular_file: &str,
    variant_file: &str,
    delimiter: char,
) -> Result<()> {
    let delimiter = delimiter_byte(delimiter)?;
    if !log_dir.is_dir() {
        anyhow::bail!("Log directory not found: {}", log_dir.display());
    }

    let name = log_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| log_dir.display().to_string());
    println!("Run: {}", name);
    println!();

    // Variant
    let variant_path = log_dir.join(variant_file);
    if variant_path.exists() {
        let variant = storage::load_variant(&variant_path)?;
        println!("── Variant ─────────────────────────────");
        println!(
            "{}",
            serde_json::to_string_pretty(&reggol::value::variant_to_json(&variant))?
        );
        println!();
    }

    // Last metrics
    let data = storage::read_tabular(&log_dir.join(tabular_file), delimiter)?;
    if let Some(last) = data.last_row() {
        println!("── Last Metrics ({} total rows) ─────────", data.rows.len());
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(["Metric", "Value"]);
        for (k, v) in last {
            table.add_row([k, v]);
        }
        println!("{}", table);
    }

    // Snapshots
    let snapshots = storage::list_snapshots(&log_dir)?;
    if !snapshots.is_empty() {
        println!("── Snapshots ({}) ──────────────────────", snapshots.len());
        for s in &snapshots {
            println!("  {}", s);
        }
    }

    // Git
    let git_infos = log_dir.join(GIT_INFOS_FILE);
    if git_infos.exists() {
        println!("── Git ─────────────────────────────────");
        print!("{}", fs::read_to_string(&git_infos)?);
    }

    Ok(())
}

fn cmd_export(
    log_dir: PathBuf,
    format: &str,
    output: Option<PathBuf>,
    tabular_file: &str,
    delimiter: char,
) -> Result<()> {
    let path = log_dir.join(tabular_file);
    if !path.exists() {
        anyhow::bail!("No {} found in {}", tabular_file, log_dir.display());
    }
    let delimiter = delimiter_byte(delimiter)?;
    let data = storage::read_tabular(&path, delimiter)?;

    let content = match format {
        "json" => serde_json::to_string_pretty(&data.to_json_rows())? + "\n",
        "csv" => to_csv(&data)?,
        _ => anyhow::bail!("Unknown format: {}", format),
    };

    match output {
        Some(out) => {
            write_output(&out, &content)?;
            println!("Exported {} rows to {}", data.rows.len(), out.display());
        }
        None => print!("{}", content),
    }

    Ok(())
}

// ─── Utilities ────────────────────────────────────────────────────────────────

fn delimiter_byte(delimiter: char) -> Result<u8> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .context("Delimiter must be a single ASCII character")
}

fn to_csv(data: &storage::TabularData) -> Result<String> {
    if data.columns.is_empty() {
        return Ok(String::new());
    }
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(&data.columns)?;
    for row in &data.rows {
        writer.write_record(row)?;
    }
    let bytes = writer.into_inner().context("Failed to finish CSV output")?;
    Ok(String::from_utf8(bytes)?)
}

fn write_output(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        storage::ensure_dir(parent)?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
