//! Chunk data model, source partitioning, and output offset assignment.

use anyhow::Result;

/// One index-addressed window of file data.
///
/// `index` is stable across every phase. `offset` is the chunk's position in
/// the file the current phase works against: the source position after a read,
/// `None` after a transform, and the target position once
/// [`recalculate_offsets`] has run. `data.len()` is always the chunk's length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub offset: Option<u64>,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn new(index: usize, offset: Option<u64>, data: Vec<u8>) -> Self {
        Self { index, offset, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Placement of this chunk, if it has an offset.
    pub fn extent(&self) -> Option<ChunkExtent> {
        self.offset.map(|offset| ChunkExtent {
            index: self.index,
            offset,
            length: self.data.len() as u64,
        })
    }
}

/// Where a chunk lives in a file: `[offset, offset + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkExtent {
    pub index: usize,
    pub offset: u64,
    pub length: u64,
}

impl ChunkExtent {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Fixed-size partitioning of a source file.
///
/// Only whole windows are covered: `num_chunks = source_len / chunk_size`.
/// The `source_len % chunk_size` trailing bytes belong to no chunk and are
/// never read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub source_len: u64,
    pub chunk_size: usize,
    pub num_chunks: usize,
    pub trailing_bytes: u64,
}

impl ChunkPlan {
    pub fn new(source_len: u64, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("chunk size must be greater than zero");
        }
        let size = chunk_size as u64;
        let num_chunks = usize::try_from(source_len / size)
            .map_err(|_| anyhow::anyhow!("source of {source_len} bytes has too many chunks"))?;
        Ok(Self {
            source_len,
            chunk_size,
            num_chunks,
            trailing_bytes: source_len % size,
        })
    }

    /// Byte position of chunk `index` in the source file.
    pub fn source_offset(&self, index: usize) -> u64 {
        index as u64 * self.chunk_size as u64
    }

    /// Bytes covered by the chunks (`num_chunks * chunk_size`).
    pub fn covered_bytes(&self) -> u64 {
        self.source_len - self.trailing_bytes
    }
}

/// Assign each chunk its output offset as the running sum of the lengths
/// before it, walking strictly in index order. Returns the total output length.
///
/// Transformed chunks may differ in length from the source window, so the
/// output position of chunk `i` cannot be derived from `i * chunk_size`.
/// `chunks[i]` must carry index `i`.
pub fn recalculate_offsets(chunks: &mut [Chunk]) -> Result<u64> {
    let mut running_total = 0u64;
    for (position, chunk) in chunks.iter_mut().enumerate() {
        if chunk.index != position {
            anyhow::bail!(
                "chunk at position {} carries index {}; offsets require index order",
                position,
                chunk.index
            );
        }
        chunk.offset = Some(running_total);
        running_total += chunk.data.len() as u64;
    }
    Ok(running_total)
}

/// Check that extents tile `[0, total)` without gaps or overlap.
pub fn check_disjoint(extents: &[ChunkExtent]) -> Result<u64> {
    let mut expected = 0u64;
    for extent in extents {
        if extent.offset != expected {
            anyhow::bail!(
                "chunk {} starts at {} but the previous chunk ends at {}",
                extent.index,
                extent.offset,
                expected
            );
        }
        expected = extent.end();
    }
    Ok(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_drops_trailing_bytes() {
        let plan = ChunkPlan::new(25_000, 10_000).unwrap();
        assert_eq!(plan.num_chunks, 2);
        assert_eq!(plan.trailing_bytes, 5_000);
        assert_eq!(plan.covered_bytes(), 20_000);
        assert_eq!(plan.source_offset(1), 10_000);
    }

    #[test]
    fn test_plan_exact_multiple() {
        let plan = ChunkPlan::new(30_000, 10_000).unwrap();
        assert_eq!(plan.num_chunks, 3);
        assert_eq!(plan.trailing_bytes, 0);
    }

    #[test]
    fn test_plan_smaller_than_one_chunk() {
        let plan = ChunkPlan::new(9_999, 10_000).unwrap();
        assert_eq!(plan.num_chunks, 0);
        assert_eq!(plan.trailing_bytes, 9_999);
        assert_eq!(plan.covered_bytes(), 0);
    }

    #[test]
    fn test_plan_floor_for_many_lengths() {
        for len in 0..200u64 {
            for size in 1..17usize {
                let plan = ChunkPlan::new(len, size).unwrap();
                assert_eq!(plan.num_chunks as u64, len / size as u64);
                assert_eq!(plan.trailing_bytes, len % size as u64);
            }
        }
    }

    #[test]
    fn test_plan_rejects_zero_chunk_size() {
        assert!(ChunkPlan::new(100, 0).is_err());
    }

    #[test]
    fn test_offsets_follow_variable_lengths() {
        let mut chunks = vec![
            Chunk::new(0, None, vec![1; 7]),
            Chunk::new(1, None, vec![2; 0]),
            Chunk::new(2, None, vec![3; 12]),
            Chunk::new(3, None, vec![4; 1]),
        ];
        let total = recalculate_offsets(&mut chunks).unwrap();
        assert_eq!(total, 20);
        let offsets: Vec<Option<u64>> = chunks.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![Some(0), Some(7), Some(7), Some(19)]);

        let extents: Vec<ChunkExtent> = chunks.iter().filter_map(Chunk::extent).collect();
        assert_eq!(check_disjoint(&extents).unwrap(), 20);
    }

    #[test]
    fn test_offsets_reject_out_of_order_chunks() {
        let mut chunks = vec![
            Chunk::new(1, None, vec![0; 4]),
            Chunk::new(0, None, vec![0; 4]),
        ];
        assert!(recalculate_offsets(&mut chunks).is_err());
    }

    #[test]
    fn test_offsets_empty() {
        let mut chunks: Vec<Chunk> = Vec::new();
        assert_eq!(recalculate_offsets(&mut chunks).unwrap(), 0);
    }

    #[test]
    fn test_check_disjoint_detects_overlap() {
        let extents = [
            ChunkExtent { index: 0, offset: 0, length: 10 },
            ChunkExtent { index: 1, offset: 5, length: 10 },
        ];
        assert!(check_disjoint(&extents).is_err());
    }
}
