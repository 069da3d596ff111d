use clap::{Parser, Subcommand};
use std::path::PathBuf;
use timelapse_align::config::{AlignmentConfig, ConfigFormat};
use timelapse_align::runner::report;
use timelapse_align::{AlignMethod, AlignmentCoordinator};

#[derive(Parser)]
#[command(name = "align")]
#[command(about = "Batch alignment for fixed-scene timelapse photo sequences")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Align every image under a directory against a reference frame
    Run {
        /// Directory of frames to align
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Directory receiving aligned frames
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Alignment method: auto, classical, or learned
        #[arg(short, long)]
        method: Option<String>,

        /// Index of the reference frame in the sorted image list
        #[arg(short, long)]
        reference: Option<usize>,

        /// Config file (TOML, or JSON starting with '{')
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Markdown report location
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Re-render the markdown report from a saved run summary
    Report {
        /// Path to a run's alignment_summary.json
        #[arg(short, long)]
        summary: PathBuf,

        /// Where to write the markdown; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a config file populated with the default settings
    InitConfig {
        /// Destination path; a .json extension switches the format
        #[arg(short, long, default_value = "align.toml")]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .init();

    match cli.command {
        Commands::Run {
            input,
            output,
            method,
            reference,
            config,
            report,
        } => {
            handle_run(input, output, method, reference, config, report)?;
        }
        Commands::Report { summary, output } => {
            handle_report(summary, output)?;
        }
        Commands::InitConfig { output } => {
            handle_init_config(output)?;
        }
    }

    Ok(())
}

fn handle_run(
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    method: Option<String>,
    reference: Option<usize>,
    config_path: Option<PathBuf>,
    report: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = match &config_path {
        Some(path) => AlignmentConfig::load_from_file(path)?,
        None => AlignmentConfig::default(),
    };

    // Command-line flags win over the config file.
    if let Some(input) = input {
        config.input = input;
    }
    if let Some(output) = output {
        config.output = output;
    }
    if let Some(method) = method {
        config.method = method.parse::<AlignMethod>()?;
    }
    if let Some(reference) = reference {
        config.reference_index = reference;
    }
    if let Some(report) = report {
        config.report_path = Some(report);
    }

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("config error: {}", error);
        }
        anyhow::bail!("invalid configuration ({} problems)", errors.len());
    }

    let report_file = config.report_file();
    let summary = AlignmentCoordinator::new(config).run()?;

    println!(
        "Aligned {}/{} images ({} by fallback, {} failed).",
        summary.aligned,
        summary.total_images.saturating_sub(1),
        summary.fallbacks,
        summary.failed
    );
    println!("Report written to {}", report_file.display());
    Ok(())
}

fn handle_report(summary_path: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let summary = report::load_summary(&summary_path)?;
    let markdown = report::render_markdown(&summary);
    match output {
        Some(path) => {
            std::fs::write(&path, markdown)?;
            println!("Report written to {}", path.display());
        }
        None => print!("{}", markdown),
    }
    Ok(())
}

fn handle_init_config(output: PathBuf) -> anyhow::Result<()> {
    let format = match output.extension().and_then(|e| e.to_str()) {
        Some("json") => ConfigFormat::Json,
        _ => ConfigFormat::Toml,
    };
    AlignmentConfig::default().save_to_file(&output, format)?;
    println!("Default configuration written to {}", output.display());
    Ok(())
}
