//! Byte translation table: concurrent occurrence counting during the read
//! phase, then a one-shot freeze into an immutable byte -> byte-sequence map.

use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-byte-value statistics and the sequence that value translates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    pub original: u8,
    pub transformed: Vec<u8>,
    pub occurrences: u64,
}

impl SymbolInfo {
    /// Identity-mapped symbol seen `occurrences` times.
    pub fn identity(original: u8, occurrences: u64) -> Self {
        Self {
            original,
            transformed: vec![original],
            occurrences,
        }
    }
}

/// Decides what each observed byte value translates to.
///
/// Called exactly once, when the builder is frozen. Implementations may
/// rewrite `transformed` for any symbol; downstream code only relies on the
/// table being a byte -> byte-sequence mapping.
pub trait SymbolEncoder {
    fn encode(&self, symbols: &mut [SymbolInfo]) -> Result<()>;
}

/// Leaves every symbol mapped to itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityEncoder;

impl SymbolEncoder for IdentityEncoder {
    fn encode(&self, _symbols: &mut [SymbolInfo]) -> Result<()> {
        Ok(())
    }
}

/// Mutable accumulator shared by every accounting task of the read phase.
///
/// Counting is a commutative per-byte sum, so the final counts do not depend
/// on the order chunks are observed in.
pub struct SymbolTableBuilder {
    counts: [AtomicU64; 256],
}

impl SymbolTableBuilder {
    pub fn new() -> Self {
        Self {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Record one occurrence of `byte`. Safe to call from any number of threads.
    pub fn observe(&self, byte: u8) {
        self.counts[byte as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// Record every byte of `bytes`.
    ///
    /// Counts into a local histogram first and merges once per byte value,
    /// which keeps contention on the shared counters to at most 256 atomic adds.
    pub fn observe_all(&self, bytes: &[u8]) {
        let mut local = [0u64; 256];
        for &b in bytes {
            local[b as usize] += 1;
        }
        for (slot, &count) in self.counts.iter().zip(local.iter()) {
            if count > 0 {
                slot.fetch_add(count, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self, byte: u8) -> u64 {
        self.counts[byte as usize].load(Ordering::Relaxed)
    }

    /// Total number of bytes observed.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Snapshot of the observed symbols, sorted by byte value, identity-mapped.
    pub fn symbols(&self) -> Vec<SymbolInfo> {
        self.counts
            .iter()
            .enumerate()
            .filter_map(|(b, c)| {
                let n = c.load(Ordering::Relaxed);
                (n > 0).then(|| SymbolInfo::identity(b as u8, n))
            })
            .collect()
    }

    /// Consume the builder and produce the immutable table.
    ///
    /// Taking `self` by value means nothing can keep observing (or read a
    /// half-built table) once freezing has started.
    pub fn freeze(self, encoder: &dyn SymbolEncoder) -> Result<TranslationTable> {
        let mut symbols = self.symbols();
        encoder.encode(&mut symbols)?;

        let mut entries: Vec<Option<Box<[u8]>>> = vec![None; 256];
        for symbol in &symbols {
            if symbol.occurrences == 0 {
                anyhow::bail!("encoder produced symbol {:#04x} with no occurrences", symbol.original);
            }
            let slot = &mut entries[symbol.original as usize];
            if slot.is_some() {
                anyhow::bail!("encoder produced duplicate symbol {:#04x}", symbol.original);
            }
            *slot = Some(symbol.transformed.clone().into_boxed_slice());
        }

        Ok(TranslationTable { entries, symbols })
    }
}

impl Default for SymbolTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Frozen byte -> byte-sequence mapping, shared read-only by transform tasks.
#[derive(Debug, Clone)]
pub struct TranslationTable {
    entries: Vec<Option<Box<[u8]>>>,
    symbols: Vec<SymbolInfo>,
}

impl TranslationTable {
    /// Translation of `byte`, or `None` if the byte was never observed.
    pub fn get(&self, byte: u8) -> Option<&[u8]> {
        self.entries[byte as usize].as_deref()
    }

    /// Append the translation of every byte of `input` to `out`, in order.
    pub fn translate_into(&self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        for &b in input {
            match self.get(b) {
                Some(seq) => out.extend_from_slice(seq),
                None => anyhow::bail!("byte {:#04x} has no entry in the translation table", b),
            }
        }
        Ok(())
    }

    /// Number of byte values with an entry.
    pub fn distinct_symbols(&self) -> usize {
        self.symbols.len()
    }

    /// Frozen statistics, sorted by byte value.
    pub fn symbols(&self) -> &[SymbolInfo] {
        &self.symbols
    }

    pub fn is_identity(&self) -> bool {
        self.symbols
            .iter()
            .all(|s| s.transformed.as_slice() == [s.original])
    }
}
