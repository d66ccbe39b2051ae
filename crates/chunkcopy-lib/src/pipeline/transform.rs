//! Parallel chunk transformation through the frozen translation table.

use anyhow::{Context, Result};
use rayon::ThreadPool;
use std::sync::mpsc;
use std::time::Instant;
use tracing::info;

use crate::cancel::{next_completion, CancellationToken, Completion};
use crate::chunk::Chunk;
use crate::events::{Phase, PipelineEvent, ProgressSink};
use crate::translation::TranslationTable;

/// Transformed chunks in index order; empty if the phase was cancelled.
#[derive(Debug)]
pub struct TransformOutcome {
    pub chunks: Vec<Chunk>,
    pub cancelled: bool,
}

/// Map every source chunk through `table`, one task per chunk.
///
/// Each output chunk keeps its source index, has no offset yet, and is as
/// long as the concatenated translations of its bytes. Results are slotted by
/// index, so completion order never affects the returned order.
pub fn transform_chunks(
    pool: &ThreadPool,
    table: &TranslationTable,
    source: Vec<Chunk>,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<TransformOutcome> {
    let num_chunks = source.len();
    let start = Instant::now();
    let mut slots: Vec<Option<Chunk>> = (0..num_chunks).map(|_| None).collect();
    let mut first_error: Option<anyhow::Error> = None;
    let mut cancelled = false;

    pool.in_place_scope(|scope| {
        let (tx, rx) = mpsc::channel::<Result<Chunk>>();
        for chunk in source {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let result = transform_chunk(table, chunk);
                if let Ok(out) = &result {
                    sink.on_event(&PipelineEvent::ChunkTransformed {
                        index: out.index,
                        length: out.len(),
                    });
                }
                let _ = tx.send(result);
            });
        }
        drop(tx);

        let mut received = 0;
        while received < num_chunks {
            match next_completion(&rx, cancel) {
                Completion::Done(Ok(chunk)) => {
                    received += 1;
                    let index = chunk.index;
                    match slots.get_mut(index) {
                        Some(slot) if slot.is_none() => *slot = Some(chunk),
                        _ => {
                            first_error = Some(anyhow::anyhow!(
                                "transformed chunk {} is out of range or duplicated",
                                index
                            ));
                            break;
                        }
                    }
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

    if let Some(e) = first_error {
        return Err(e);
    }
    if cancelled {
        sink.on_event(&PipelineEvent::Cancelled { phase: Phase::Transform });
        return Ok(TransformOutcome { chunks: Vec::new(), cancelled: true });
    }

    let chunks = slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| slot.ok_or_else(|| anyhow::anyhow!("chunk {} was never transformed", i)))
        .collect::<Result<Vec<Chunk>>>()?;

    info!("Transformed {} chunks in {:.2}s", num_chunks, start.elapsed().as_secs_f64());
    Ok(TransformOutcome { chunks, cancelled: false })
}

fn transform_chunk(table: &TranslationTable, chunk: Chunk) -> Result<Chunk> {
    let mut out = Vec::with_capacity(chunk.data.len());
    table
        .translate_into(&chunk.data, &mut out)
        .with_context(|| format!("Failed to transform chunk {}", chunk.index))?;
    Ok(Chunk::new(chunk.index, None, out))
}
