//! Progress notifications emitted by the pipeline.
//!
//! Sinks are observers only: the pipeline behaves identically whether the
//! sink records, logs, or ignores events.

use std::fmt;
use tracing::{debug, info, warn};

/// The phase a pipeline run is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Read,
    Transform,
    Write,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Read => "read",
            Phase::Transform => "transform",
            Phase::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    ReadStarted {
        num_chunks: usize,
        chunk_size: usize,
        trailing_bytes: u64,
    },
    ChunkRead {
        index: usize,
        length: usize,
    },
    TableFrozen {
        distinct_symbols: usize,
    },
    ChunkTransformed {
        index: usize,
        length: usize,
    },
    /// Source processing is finished: every chunk is transformed and placed.
    ProcessingComplete {
        num_chunks: usize,
        output_len: u64,
    },
    ChunkWritten {
        index: usize,
        offset: u64,
        length: usize,
    },
    WriteComplete {
        output_len: u64,
    },
    Cancelled {
        phase: Phase,
    },
}

/// Receives pipeline events. Called from worker threads.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_event(&self, _event: &PipelineEvent) {}
}

/// Forwards events to `tracing`: phase-level events at info, per-chunk at debug.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_event(&self, event: &PipelineEvent) {
        match *event {
            PipelineEvent::ReadStarted { num_chunks, chunk_size, trailing_bytes } => {
                info!(
                    "Reading {} chunks of {} bytes ({} trailing bytes skipped)",
                    num_chunks, chunk_size, trailing_bytes
                );
            }
            PipelineEvent::ChunkRead { index, length } => {
                debug!("Read chunk {} ({} bytes)", index, length);
            }
            PipelineEvent::TableFrozen { distinct_symbols } => {
                info!("Translation table frozen: {} distinct symbols", distinct_symbols);
            }
            PipelineEvent::ChunkTransformed { index, length } => {
                debug!("Transformed chunk {} ({} bytes)", index, length);
            }
            PipelineEvent::ProcessingComplete { num_chunks, output_len } => {
                info!("Processing complete: {} chunks, {} output bytes", num_chunks, output_len);
            }
            PipelineEvent::ChunkWritten { index, offset, length } => {
                debug!("Wrote chunk {} ({} bytes at offset {})", index, length, offset);
            }
            PipelineEvent::WriteComplete { output_len } => {
                info!("Write complete: {} bytes", output_len);
            }
            PipelineEvent::Cancelled { phase } => {
                warn!("Cancelled during {} phase", phase);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Sink that keeps every event for later inspection.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) events: Mutex<Vec<PipelineEvent>>,
    }

    impl ProgressSink for RecordingSink {
        fn on_event(&self, event: &PipelineEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    impl RecordingSink {
        pub(crate) fn take(&self) -> Vec<PipelineEvent> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Read.to_string(), "read");
        assert_eq!(Phase::Transform.to_string(), "transform");
        assert_eq!(Phase::Write.to_string(), "write");
    }

    #[test]
    fn test_sinks_accept_every_event() {
        let events = [
            PipelineEvent::ReadStarted { num_chunks: 2, chunk_size: 10, trailing_bytes: 3 },
            PipelineEvent::ChunkRead { index: 0, length: 10 },
            PipelineEvent::TableFrozen { distinct_symbols: 4 },
            PipelineEvent::ChunkTransformed { index: 0, length: 12 },
            PipelineEvent::ProcessingComplete { num_chunks: 2, output_len: 24 },
            PipelineEvent::ChunkWritten { index: 0, offset: 0, length: 12 },
            PipelineEvent::WriteComplete { output_len: 24 },
            PipelineEvent::Cancelled { phase: Phase::Write },
        ];
        let recorder = RecordingSink::default();
        for event in &events {
            NoopSink.on_event(event);
            TracingSink.on_event(event);
            recorder.on_event(event);
        }
        assert_eq!(recorder.take(), events.to_vec());
    }
}
