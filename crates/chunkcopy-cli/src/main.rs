use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

use chunkcopy_lib::{PipelineConfig, DEFAULT_CHUNK_SIZE};

#[derive(Parser)]
#[command(name = "chunkcopy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chunk-parallel file copy through a byte translation table", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a file chunk by chunk
    Copy(CopyArgs),
    /// Write a file of random bytes for testing
    Generate(GenerateArgs),
}

#[derive(Parser)]
struct CopyArgs {
    /// Source file
    #[arg(short, long, value_name = "FILE", required = true)]
    input: PathBuf,

    /// Target file (created or truncated)
    #[arg(short, long, value_name = "FILE", required = true)]
    output: PathBuf,

    /// Bytes per chunk; bytes past the last whole chunk are not copied
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Number of threads (0 = auto-detect)
    #[arg(short = 't', long, default_value = "0")]
    threads: usize,
}

#[derive(Parser)]
struct GenerateArgs {
    /// File to write
    #[arg(short, long, value_name = "FILE", required = true)]
    output: PathBuf,

    /// Number of bytes to write
    #[arg(short, long)]
    size: u64,

    /// RNG seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,
}

impl CopyArgs {
    fn into_config(self) -> Result<PipelineConfig> {
        let config = PipelineConfig::new(self.input, self.output)?
            .with_chunk_size(self.chunk_size)
            .with_threads(self.threads);
        config.validate()?;
        Ok(config)
    }
}

fn generate(args: &GenerateArgs) -> Result<()> {
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {:?}", args.output))?;
    let mut writer = BufWriter::new(file);

    let mut buf = vec![0u8; 64 * 1024];
    let mut remaining = args.size;
    while remaining > 0 {
        let n = remaining.min(buf.len() as u64) as usize;
        for b in &mut buf[..n] {
            *b = rng.gen_range(b'A'..b'z');
        }
        writer
            .write_all(&buf[..n])
            .with_context(|| format!("Failed to write {:?}", args.output))?;
        remaining -= n as u64;
    }
    writer.flush()?;
    info!("Wrote {} random bytes to {:?}", args.size, args.output);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if std::env::var("CHUNKCOPY_NO_BANNER").is_err() {
        eprintln!("chunkcopy v{} - chunk-parallel file copy", env!("CARGO_PKG_VERSION"));
        eprintln!();
    }

    match cli.command {
        Commands::Copy(args) => {
            info!("Starting copy...");
            let config = args.into_config()?;
            let summary = chunkcopy_lib::run(&config)?;
            println!(
                "{} chunks, {} of {} source bytes, {} distinct symbols, {} bytes written in {:.2}s",
                summary.plan.num_chunks,
                summary.bytes_processed(),
                summary.plan.source_len,
                summary.distinct_symbols(),
                summary.output_len,
                summary.elapsed.as_secs_f64()
            );
        }
        Commands::Generate(args) => {
            generate(&args)?;
        }
    }

    Ok(())
}
