/// Benchmark: pipeline throughput across chunk sizes and thread counts
/// Usage: bench_chunk_sizes [INPUT] (generates 64 MB of random data if omitted)

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chunkcopy_lib::{run_with, CancellationToken, IdentityEncoder, NoopSink, PipelineConfig};
use rand::{rngs::StdRng, Rng, SeedableRng};

const GENERATED_SIZE: usize = 64 * 1024 * 1024;
const CHUNK_SIZES: &[usize] = &[1_000, 10_000, 100_000, 1_000_000, 8_000_000];
const THREADS: &[usize] = &[1, 2, 4, 8];

fn main() -> Result<()> {
    let temp_dir = tempfile::TempDir::new()?;

    let source = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let path = temp_dir.path().join("source.bin");
            eprintln!("Generating {} MB of random input", GENERATED_SIZE / (1024 * 1024));
            let mut rng = StdRng::seed_from_u64(42);
            let data: Vec<u8> = (0..GENERATED_SIZE).map(|_| rng.gen_range(b'A'..b'z')).collect();
            std::fs::write(&path, &data).context("Failed to write generated input")?;
            path
        }
    };
    let target = temp_dir.path().join("target.bin");
    let source_len = std::fs::metadata(&source)
        .with_context(|| format!("Cannot stat {:?}", source))?
        .len();

    eprintln!("Input: {:?} ({:.1} MB)\n", source, source_len as f64 / (1024.0 * 1024.0));

    println!(
        "{:>12} {:>8} {:>10} {:>12} {:>12}",
        "Chunk", "Threads", "Chunks", "Time", "Throughput"
    );
    println!("{}", "-".repeat(58));

    for &chunk_size in CHUNK_SIZES {
        for &threads in THREADS {
            let config = PipelineConfig::new(&source, &target)?
                .with_chunk_size(chunk_size)
                .with_threads(threads);
            let t = Instant::now();
            let summary = run_with(&config, &IdentityEncoder, &NoopSink, &CancellationToken::new())?;
            let elapsed = t.elapsed().as_secs_f64();
            println!(
                "{:>10} B {:>8} {:>10} {:>10.1}ms {:>8.1} MB/s",
                chunk_size,
                threads,
                summary.plan.num_chunks,
                elapsed * 1000.0,
                summary.bytes_processed() as f64 / (1024.0 * 1024.0) / elapsed,
            );
        }
    }

    println!("{}", "-".repeat(58));
    Ok(())
}
