//! Laplace ROM CLI Tool
//!
//! Generate ROM images and Verilog headers for the hardware Laplace
//! generator, and exercise the software model.
//!
//! Usage:
//!   laplace-rom generate --config <file.toml> --out-dir <dir> [--templates <dir>]
//!   laplace-rom validate --config <file.toml>
//!   laplace-rom sample --config <file.toml> [-n <count>] [--seed <seed>] [--format text|json]
//!   laplace-rom scan --config <file.toml> [--limit <count>] [--format text|json]
//!   laplace-rom example

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use laplace_rom::rng::TableAddress;
use laplace_rom::verilog::HeaderTemplates;
use laplace_rom::{ChaChaSource, LaplaceRng, PrivacyFile, RngConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Scans larger than this need an explicit --limit
const MAX_SCAN: u64 = 1 << 20;

#[derive(Parser)]
#[command(name = "laplace-rom")]
#[command(version = "0.1.0")]
#[command(about = "Laplace noise ROM generator and simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the ICDF table and write ROM images and Verilog headers
    Generate {
        /// Privacy configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory (created if missing)
        #[arg(short, long, default_value = "verilog")]
        out_dir: PathBuf,

        /// Directory holding templ_rng.vh / templ_urng.vh
        #[arg(long)]
        templates: Option<PathBuf>,
    },

    /// Validate a configuration and report table parameters
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Draw Laplace(0, 1) samples through the decoder and table
    Sample {
        #[arg(short, long)]
        config: PathBuf,

        /// Number of samples
        #[arg(short, default_value = "10")]
        n: usize,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Decode every raw value with the top bit clear and show its table lookup
    Scan {
        #[arg(short, long)]
        config: PathBuf,

        /// Only scan the first N raw values
        #[arg(long)]
        limit: Option<u64>,

        /// Seed for extra draws on saturated exponents
        #[arg(long, default_value = "0")]
        seed: u64,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print an example configuration file
    Example,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(serde::Serialize)]
struct SampleOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    scale_exp: i32,
    samples: Vec<f64>,
}

#[derive(serde::Serialize)]
struct ScanRow {
    raw: u64,
    symm: bool,
    part: bool,
    exponent: u64,
    mantissa: u64,
    #[serde(flatten)]
    address: TableAddress,
    rom_addr: usize,
    value: f64,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn load_config(path: &Path) -> Result<RngConfig> {
    let file = PrivacyFile::from_file(path)
        .with_context(|| format!("Failed to load config from {:?}", path))?;
    let config = file
        .into_config()
        .with_context(|| format!("Invalid configuration in {:?}", path))?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            print!("{}", PrivacyFile::example());
        }

        Commands::Validate { config } => {
            let rng_config = load_config(&config)?;
            let table = laplace_rom::IcdfTable::build(&rng_config)
                .context("Failed to build ICDF table")?;
            let summary = table.summary();

            println!("{}", "Configuration is valid".green().bold());
            println!("  Bx / By:          {} / {}", rng_config.bx(), rng_config.by());
            println!(
                "  k / mant_bw:      {} / {}",
                rng_config.k(),
                rng_config.mant_bw()
            );
            println!(
                "  octaves:          {} growing, {} diminishing",
                rng_config.growing_oct(),
                rng_config.diminishing_oct()
            );
            println!("  table length:     {}", summary.length);
            println!("  scale exponent:   {}", summary.scale_exp);
            println!("  max output:       {}", summary.max_out);
            println!("  output LSB:       {:e}", summary.output_lsb);
        }

        Commands::Generate {
            config,
            out_dir,
            templates,
        } => {
            let rng_config = load_config(&config)?;
            let templates = match templates {
                Some(dir) => HeaderTemplates::from_dir(&dir)
                    .with_context(|| format!("Failed to load templates from {:?}", dir))?,
                None => HeaderTemplates::default(),
            };

            fs::create_dir_all(&out_dir)
                .with_context(|| format!("Failed to create {:?}", out_dir))?;

            let table = laplace_rom::IcdfTable::build(&rng_config)
                .context("Failed to build ICDF table")?;
            info!(
                length = table.len(),
                scale_exp = table.scale_exp(),
                "ICDF table built"
            );

            let (c0_path, c1_path) = table
                .save(&out_dir)
                .with_context(|| format!("Failed to write ROM images to {:?}", out_dir))?;
            let (rng_path, urng_path) = templates
                .write_headers(&rng_config, &out_dir)
                .with_context(|| format!("Failed to write headers to {:?}", out_dir))?;

            println!("{}", "Generated".green().bold());
            for path in [c0_path, c1_path, rng_path, urng_path] {
                println!("  {}", path.display());
            }
        }

        Commands::Sample {
            config,
            n,
            seed,
            format,
        } => {
            let rng_config = load_config(&config)?;
            let mut rng = LaplaceRng::new(rng_config, ChaChaSource::new(seed))
                .context("Failed to build sampler")?;
            let samples = (0..n)
                .map(|_| rng.sample())
                .collect::<laplace_rom::Result<Vec<f64>>>()
                .context("Sampling failed")?;

            match format {
                OutputFormat::Text => {
                    for s in &samples {
                        println!("{}", s);
                    }
                }
                OutputFormat::Json => {
                    let output = SampleOutput {
                        seed,
                        scale_exp: rng.table().scale_exp(),
                        samples,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
        }

        Commands::Scan {
            config,
            limit,
            seed,
            format,
        } => {
            let rng_config = load_config(&config)?;
            let total = 1u64 << (rng_config.bx() - 1);
            let count = limit.unwrap_or(total).min(total);
            if count > MAX_SCAN {
                bail!(
                    "Scanning {} values is impractical, pass --limit (at most {})",
                    count,
                    MAX_SCAN
                );
            }

            let mut rng = LaplaceRng::new(rng_config.clone(), ChaChaSource::seeded(seed))
                .context("Failed to build sampler")?;
            let mut rows = Vec::with_capacity(count as usize);
            for raw in 0..count {
                let bf = rng.decode(raw);
                let address = TableAddress::of(&rng_config, &bf);
                let value = rng
                    .lookup(&bf)
                    .with_context(|| format!("Lookup failed for raw value {:#b}", raw))?;
                rows.push(ScanRow {
                    raw,
                    symm: bf.symm(),
                    part: bf.part(),
                    exponent: bf.exponent(),
                    mantissa: bf.mantissa(),
                    address,
                    rom_addr: rng.table().addr(address.section, address.subsection),
                    value,
                });
            }

            match format {
                OutputFormat::Text => {
                    let width = rng_config.bx() as usize;
                    println!(
                        "{}",
                        format!(
                            "{:>w$}  {:>4} {:>4} {:>5} {:>8} {:>6} {:>10}",
                            "raw", "part", "exp", "mant", "section", "sub", "value",
                            w = width
                        )
                        .bold()
                    );
                    for row in &rows {
                        println!(
                            "{:0w$b}  {:>4} {:>4} {:>5} {:>8} {:>6} {:>10}",
                            row.raw,
                            row.part as u8,
                            row.exponent,
                            row.mantissa,
                            row.address.section,
                            row.address.subsection,
                            row.value,
                            w = width
                        );
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
            }
        }
    }

    Ok(())
}
