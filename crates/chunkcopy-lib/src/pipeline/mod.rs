//! Three-phase orchestration: read, transform, write.
//!
//! Every arrow below is a full barrier; no task of the next phase starts
//! until every task of the current phase has finished.
//!
//! ```text
//! read + count ──▶ freeze ──▶ transform ──▶ offsets ──▶ write
//! ```
//!
//! Per-chunk state is owned by exactly one task at a time and only changes
//! hands at a barrier. The symbol table is the one structure shared by
//! concurrent tasks.

pub mod transform;

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::chunk::{recalculate_offsets, ChunkExtent, ChunkPlan};
use crate::config::PipelineConfig;
use crate::events::{Phase, PipelineEvent, ProgressSink, TracingSink};
use crate::io::{ChunkReader, ChunkWriter, WrittenFile};
use crate::translation::{IdentityEncoder, SymbolEncoder, SymbolInfo, SymbolTableBuilder};

/// What a pipeline run did.
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub plan: ChunkPlan,
    /// Output placement of every chunk, in index order.
    pub chunks: Vec<ChunkExtent>,
    /// Frozen symbol statistics (empty if cancelled before the freeze).
    pub symbols: Vec<SymbolInfo>,
    pub output_len: u64,
    /// The target file, if the write phase ran.
    pub target: Option<WrittenFile>,
    /// Phase in which the run was cancelled.
    pub cancelled: Option<Phase>,
    pub elapsed: Duration,
}

impl PipelineSummary {
    fn new(plan: ChunkPlan) -> Self {
        Self {
            plan,
            chunks: Vec::new(),
            symbols: Vec::new(),
            output_len: 0,
            target: None,
            cancelled: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Source bytes that went through the pipeline (trailing bytes excluded).
    pub fn bytes_processed(&self) -> u64 {
        self.plan.covered_bytes()
    }

    pub fn distinct_symbols(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_complete(&self) -> bool {
        self.cancelled.is_none()
    }
}

/// Copy `config.source` to `config.target` with the identity table, logging
/// progress through `tracing`.
pub fn run(config: &PipelineConfig) -> Result<PipelineSummary> {
    run_with(config, &IdentityEncoder, &TracingSink, &CancellationToken::new())
}

/// Run the full pipeline with a custom encoder, sink and cancellation token.
///
/// Cancellation is observed between task completions. A cancelled phase
/// still waits for its in-flight tasks (so every file handle is closed when
/// this returns) and then stops; later phases never start. A read or
/// transform cancellation leaves the target untouched.
pub fn run_with(
    config: &PipelineConfig,
    encoder: &dyn SymbolEncoder,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<PipelineSummary> {
    config.validate()?;
    let start = Instant::now();
    let num_threads = config.num_threads();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("chunkcopy-{i}"))
        .build()
        .context("Failed to build worker pool")?;

    info!("Using {} threads, chunk size {} bytes", num_threads, config.chunk_size);
    info!("Source: {:?}", config.source);
    info!("Target: {:?}", config.target);

    // Phase 1: read every chunk and count its bytes.
    let table = SymbolTableBuilder::new();
    let reader = ChunkReader::new(&config.source, config.chunk_size);
    let read = reader.read_all(&pool, &table, sink, cancel)?;
    let mut summary = PipelineSummary::new(read.plan);
    if read.plan.trailing_bytes > 0 {
        warn!(
            "Source has {} bytes past the last whole chunk; they are not copied",
            read.plan.trailing_bytes
        );
    }
    if read.cancelled {
        return Ok(cancelled(summary, Phase::Read, start));
    }

    // Barrier: all reads and accounting tasks are done.
    let table = table.freeze(encoder).context("Failed to freeze translation table")?;
    summary.symbols = table.symbols().to_vec();
    sink.on_event(&PipelineEvent::TableFrozen { distinct_symbols: table.distinct_symbols() });

    // Phase 2: transform.
    let transformed = transform::transform_chunks(&pool, &table, read.chunks, sink, cancel)?;
    if transformed.cancelled {
        return Ok(cancelled(summary, Phase::Transform, start));
    }

    // Barrier: every transform is done, so lengths are final.
    let mut chunks = transformed.chunks;
    let output_len = recalculate_offsets(&mut chunks)?;
    summary.output_len = output_len;
    summary.chunks = chunks.iter().filter_map(|c| c.extent()).collect();
    sink.on_event(&PipelineEvent::ProcessingComplete {
        num_chunks: chunks.len(),
        output_len,
    });

    // Phase 3: write.
    let writer = ChunkWriter::new(&config.target);
    let written = writer.write_all(&pool, &chunks, sink, cancel)?;
    summary.target = Some(written.file);
    if written.cancelled {
        return Ok(cancelled(summary, Phase::Write, start));
    }

    summary.elapsed = start.elapsed();
    info!(
        "Copied {} of {} source bytes into {} output bytes in {:.2}s",
        summary.bytes_processed(),
        summary.plan.source_len,
        summary.output_len,
        summary.elapsed.as_secs_f64()
    );
    Ok(summary)
}

fn cancelled(mut summary: PipelineSummary, phase: Phase, start: Instant) -> PipelineSummary {
    summary.cancelled = Some(phase);
    summary.elapsed = start.elapsed();
    summary
}
