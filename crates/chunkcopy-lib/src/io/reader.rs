//! Parallel chunked reading of the source file.
//!
//! One task per chunk, each with its own file handle. As each read lands (in
//! whatever order the pool finishes them) an accounting task is dispatched
//! to feed that chunk's bytes into the symbol table. The phase ends only when
//! every read and every accounting task has finished.

use anyhow::{Context, Result};
use rayon::ThreadPool;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Instant;
use tracing::{debug, info};

use crate::cancel::{next_completion, CancellationToken, Completion};
use crate::chunk::{Chunk, ChunkPlan};
use crate::events::{Phase, PipelineEvent, ProgressSink};
use crate::translation::SymbolTableBuilder;

pub struct ChunkReader {
    path: PathBuf,
    chunk_size: usize,
}

/// Source chunks in index order, plus the partitioning they came from.
/// `chunks` is empty if the phase was cancelled.
#[derive(Debug)]
pub struct ReadOutcome {
    pub plan: ChunkPlan,
    pub chunks: Vec<Chunk>,
    pub cancelled: bool,
}

impl ChunkReader {
    pub fn new(path: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            path: path.into(),
            chunk_size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Partition the source as it currently exists on disk.
    pub fn plan(&self) -> Result<ChunkPlan> {
        let metadata = std::fs::metadata(&self.path)
            .with_context(|| format!("Failed to stat source file: {:?}", self.path))?;
        if !metadata.is_file() {
            anyhow::bail!("Source is not a regular file: {:?}", self.path);
        }
        ChunkPlan::new(metadata.len(), self.chunk_size)
    }

    /// Read every chunk on `pool`, counting bytes into `table` as reads complete.
    ///
    /// The first failed read aborts the phase: no further accounting tasks are
    /// dispatched, reads already in flight run to completion, and the error is
    /// returned once they have.
    pub fn read_all(
        &self,
        pool: &ThreadPool,
        table: &SymbolTableBuilder,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ReadOutcome> {
        let plan = self.plan()?;
        let num_chunks = plan.num_chunks;
        let start = Instant::now();

        sink.on_event(&PipelineEvent::ReadStarted {
            num_chunks,
            chunk_size: plan.chunk_size,
            trailing_bytes: plan.trailing_bytes,
        });

        let (counted_tx, counted_rx) = mpsc::channel::<Chunk>();
        let mut first_error: Option<anyhow::Error> = None;
        let mut cancelled = false;

        pool.in_place_scope(|scope| {
            let (read_tx, read_rx) = mpsc::channel::<Result<Chunk>>();
            for index in 0..num_chunks {
                let read_tx = read_tx.clone();
                let path = self.path.as_path();
                scope.spawn(move |_| {
                    let result = read_chunk(path, &plan, index);
                    if let Ok(chunk) = &result {
                        sink.on_event(&PipelineEvent::ChunkRead {
                            index: chunk.index,
                            length: chunk.len(),
                        });
                    }
                    let _ = read_tx.send(result);
                });
            }
            drop(read_tx);

            let mut received = 0;
            while received < num_chunks {
                match next_completion(&read_rx, cancel) {
                    Completion::Done(Ok(chunk)) => {
                        received += 1;
                        let counted_tx = counted_tx.clone();
                        scope.spawn(move |_| {
                            table.observe_all(&chunk.data);
                            let _ = counted_tx.send(chunk);
                        });
                    }
                    Completion::Done(Err(e)) => {
                        first_error = Some(e);
                        break;
                    }
                    Completion::Cancelled => {
                        cancelled = true;
                        break;
                    }
                    Completion::Closed => break,
                }
            }
        });
        drop(counted_tx);

        if let Some(e) = first_error {
            return Err(e);
        }
        if cancelled {
            sink.on_event(&PipelineEvent::Cancelled { phase: Phase::Read });
            return Ok(ReadOutcome { plan, chunks: Vec::new(), cancelled: true });
        }

        let mut slots: Vec<Option<Chunk>> = (0..num_chunks).map(|_| None).collect();
        for chunk in counted_rx.try_iter() {
            let index = chunk.index;
            slots[index] = Some(chunk);
        }
        let chunks = slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| slot.ok_or_else(|| anyhow::anyhow!("chunk {} was never read", i)))
            .collect::<Result<Vec<Chunk>>>()?;

        info!(
            "Read {} chunks ({} bytes) in {:.2}s",
            num_chunks,
            plan.covered_bytes(),
            start.elapsed().as_secs_f64()
        );
        Ok(ReadOutcome { plan, chunks, cancelled: false })
    }
}

/// Read chunk `index` through a dedicated handle.
fn read_chunk(path: &Path, plan: &ChunkPlan, index: usize) -> Result<Chunk> {
    let offset = plan.source_offset(index);
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open source {:?} for chunk {}", path, index))?;
    file.seek(SeekFrom::Start(offset))
        .with_context(|| format!("Failed to seek to {} for chunk {}", offset, index))?;

    let mut data = vec![0u8; plan.chunk_size];
    file.read_exact(&mut data).with_context(|| {
        format!(
            "Failed to read {} bytes at offset {} for chunk {}",
            plan.chunk_size, offset, index
        )
    })?;
    debug!("Chunk {}: read {} bytes at offset {}", index, data.len(), offset);
    Ok(Chunk::new(index, Some(offset), data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::RecordingSink;
    use crate::events::NoopSink;
    use tempfile::TempDir;

    fn pool(threads: usize) -> ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap()
    }

    fn write_source(dir: &TempDir, len: usize) -> PathBuf {
        let path = dir.path().join("source.bin");
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_reads_whole_chunks_in_index_order() {
        let dir = TempDir::new().unwrap();
        let path = write_source(&dir, 1_050);
        let source = std::fs::read(&path).unwrap();

        let table = SymbolTableBuilder::new();
        let outcome = ChunkReader::new(&path, 100)
            .read_all(&pool(4), &table, &NoopSink, &CancellationToken::new())
            .unwrap();

        assert!(!outcome.cancelled);
        assert_eq!(outcome.plan.num_chunks, 10);
        assert_eq!(outcome.plan.trailing_bytes, 50);
        assert_eq!(outcome.chunks.len(), 10);
        for (i, chunk) in outcome.chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.offset, Some(i as u64 * 100));
            assert_eq!(chunk.data, &source[i * 100..(i + 1) * 100]);
        }
        // Trailing bytes are never counted.
        assert_eq!(table.total(), 1_000);
    }

    #[test]
    fn test_counts_match_covered_bytes() {
        let dir = TempDir::new().unwrap();
        let path = write_source(&dir, 777);
        let source = std::fs::read(&path).unwrap();

        let table = SymbolTableBuilder::new();
        ChunkReader::new(&path, 70)
            .read_all(&pool(3), &table, &NoopSink, &CancellationToken::new())
            .unwrap();

        let mut expected = [0u64; 256];
        for &b in &source[..770] {
            expected[b as usize] += 1;
        }
        for b in 0..=255u8 {
            assert_eq!(table.count(b), expected[b as usize]);
        }
    }

    #[test]
    fn test_emits_one_event_per_read() {
        let dir = TempDir::new().unwrap();
        let path = write_source(&dir, 500);
        let sink = RecordingSink::default();
        ChunkReader::new(&path, 100)
            .read_all(&pool(2), &SymbolTableBuilder::new(), &sink, &CancellationToken::new())
            .unwrap();

        let events = sink.take();
        assert_eq!(
            events[0],
            PipelineEvent::ReadStarted { num_chunks: 5, chunk_size: 100, trailing_bytes: 0 }
        );
        let mut read: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::ChunkRead { index, length: 100 } => Some(*index),
                _ => None,
            })
            .collect();
        read.sort_unstable();
        assert_eq!(read, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_source_smaller_than_chunk() {
        let dir = TempDir::new().unwrap();
        let path = write_source(&dir, 99);
        let table = SymbolTableBuilder::new();
        let outcome = ChunkReader::new(&path, 100)
            .read_all(&pool(1), &table, &NoopSink, &CancellationToken::new())
            .unwrap();
        assert!(outcome.chunks.is_empty());
        assert_eq!(table.total(), 0);
    }

    #[test]
    fn test_missing_source_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist.bin");
        let err = ChunkReader::new(&missing, 100)
            .read_all(&pool(1), &SymbolTableBuilder::new(), &NoopSink, &CancellationToken::new())
            .unwrap_err();
        assert!(err.to_string().contains("Failed to stat source file"));
    }

    #[test]
    fn test_short_read_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write_source(&dir, 150);
        // Plan built for a longer file than exists on disk.
        let plan = ChunkPlan::new(200, 100).unwrap();
        assert!(read_chunk(&path, &plan, 0).is_ok());
        let err = read_chunk(&path, &plan, 1).unwrap_err();
        assert!(format!("{:#}", err).contains("chunk 1"));
    }

    #[test]
    fn test_cancelled_before_start_yields_no_chunks() {
        let dir = TempDir::new().unwrap();
        let path = write_source(&dir, 1_000);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let table = SymbolTableBuilder::new();
        let outcome = ChunkReader::new(&path, 100)
            .read_all(&pool(2), &table, &NoopSink, &cancel)
            .unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.chunks.is_empty());
        assert_eq!(table.total(), 0);
    }
}
