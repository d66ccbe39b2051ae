//! Parallel chunked writing into a preallocated target file.

use anyhow::{Context, Result};
use rayon::ThreadPool;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Instant;
use tracing::{debug, info};

use super::range_lock::RangeLock;
use crate::cancel::{next_completion, CancellationToken, Completion};
use crate::chunk::{check_disjoint, Chunk, ChunkExtent};
use crate::events::{Phase, PipelineEvent, ProgressSink};

pub struct ChunkWriter {
    path: PathBuf,
}

/// The completed target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub len: u64,
}

#[derive(Debug)]
pub struct WriteOutcome {
    pub file: WrittenFile,
    /// Extents in the order their writes completed.
    pub completed: Vec<ChunkExtent>,
    pub cancelled: bool,
}

impl ChunkWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write every chunk at its assigned offset, one task per chunk.
    ///
    /// `chunks` must be in index order with offsets assigned. The target is
    /// created (or truncated) and sized to the sum of the chunk lengths before
    /// any task starts. Each task opens its own handle and holds an exclusive
    /// lock over its range while writing.
    pub fn write_all(
        &self,
        pool: &ThreadPool,
        chunks: &[Chunk],
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome> {
        let extents = chunks
            .iter()
            .map(|c| {
                c.extent()
                    .ok_or_else(|| anyhow::anyhow!("chunk {} has no output offset", c.index))
            })
            .collect::<Result<Vec<ChunkExtent>>>()?;
        let total_len = check_disjoint(&extents)?;
        let start = Instant::now();

        let mut main = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .with_context(|| format!("Failed to create target file: {:?}", self.path))?;
        main.set_len(total_len)
            .with_context(|| format!("Failed to preallocate {} bytes for {:?}", total_len, self.path))?;
        info!("Writing {} chunks ({} bytes) to {:?}", chunks.len(), total_len, self.path);

        let mut completed = Vec::with_capacity(chunks.len());
        let mut first_error: Option<anyhow::Error> = None;
        let mut cancelled = false;

        pool.in_place_scope(|scope| {
            let (tx, rx) = mpsc::channel::<Result<ChunkExtent>>();
            for (chunk, extent) in chunks.iter().zip(extents.iter().copied()) {
                let tx = tx.clone();
                let path = self.path.as_path();
                scope.spawn(move |_| {
                    let result = write_chunk(path, chunk, extent);
                    if result.is_ok() {
                        sink.on_event(&PipelineEvent::ChunkWritten {
                            index: extent.index,
                            offset: extent.offset,
                            length: chunk.len(),
                        });
                    }
                    let _ = tx.send(result);
                });
            }
            drop(tx);

            while completed.len() < chunks.len() {
                match next_completion(&rx, cancel) {
                    Completion::Done(Ok(extent)) => completed.push(extent),
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

        if let Some(e) = first_error {
            return Err(e);
        }

        main.flush()
            .with_context(|| format!("Failed to flush target file: {:?}", self.path))?;
        main.sync_data()
            .with_context(|| format!("Failed to sync target file: {:?}", self.path))?;

        let file = WrittenFile { path: self.path.clone(), len: total_len };
        if cancelled {
            sink.on_event(&PipelineEvent::Cancelled { phase: Phase::Write });
            return Ok(WriteOutcome { file, completed, cancelled: true });
        }
        if completed.len() != chunks.len() {
            anyhow::bail!("only {} of {} chunks were written", completed.len(), chunks.len());
        }

        sink.on_event(&PipelineEvent::WriteComplete { output_len: total_len });
        info!("Wrote {} bytes in {:.2}s", total_len, start.elapsed().as_secs_f64());
        Ok(WriteOutcome { file, completed, cancelled: false })
    }
}

/// Write one chunk through a dedicated handle under a byte-range lock.
fn write_chunk(path: &Path, chunk: &Chunk, extent: ChunkExtent) -> Result<ChunkExtent> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("Failed to open target {:?} for chunk {}", path, extent.index))?;
    write_locked(&file, chunk, extent)?;
    debug!("Chunk {}: wrote {} bytes at offset {}", extent.index, extent.length, extent.offset);
    Ok(extent)
}

fn write_locked(file: &File, chunk: &Chunk, extent: ChunkExtent) -> Result<()> {
    // Released on drop, whether or not the write below succeeds.
    let _lock = RangeLock::acquire(file, extent.offset, extent.length).with_context(|| {
        format!(
            "Failed to lock bytes [{}, {}) for chunk {}",
            extent.offset,
            extent.end(),
            extent.index
        )
    })?;
    let mut handle = file;
    handle
        .seek(SeekFrom::Start(extent.offset))
        .with_context(|| format!("Failed to seek to {} for chunk {}", extent.offset, extent.index))?;
    handle
        .write_all(&chunk.data)
        .with_context(|| format!("Failed to write chunk {} at offset {}", extent.index, extent.offset))?;
    handle
        .flush()
        .with_context(|| format!("Failed to flush chunk {}", extent.index))?;
    Ok(())
}
