//! Chunk-parallel file copy through a frequency-derived byte translation table.
//!
//! The source is split into fixed-size chunks that are read, transformed and
//! written by independent tasks on a worker pool, with a full barrier between
//! phases. See [`pipeline`] for the orchestration.

pub mod cancel;
pub mod chunk;
pub mod config;
pub mod events;
pub mod io;
pub mod pipeline;
pub mod translation;

pub use cancel::CancellationToken;
pub use chunk::{Chunk, ChunkExtent, ChunkPlan};
pub use config::{ConfigError, PipelineConfig, DEFAULT_CHUNK_SIZE};
pub use events::{NoopSink, Phase, PipelineEvent, ProgressSink, TracingSink};
pub use pipeline::{run, run_with, PipelineSummary};
pub use translation::{IdentityEncoder, SymbolEncoder, SymbolInfo, SymbolTableBuilder, TranslationTable};
