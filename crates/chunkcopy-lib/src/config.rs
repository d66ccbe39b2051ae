use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default window size in bytes for partitioning the source file.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("source path is empty")]
    EmptySource,
    #[error("target path is empty")]
    EmptyTarget,
    #[error("source and target refer to the same path: {0:?}")]
    SameSourceAndTarget(PathBuf),
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// File to read chunks from (must exist)
    pub source: PathBuf,
    /// File to write transformed chunks to (created or truncated)
    pub target: PathBuf,
    /// Bytes per chunk; trailing `len % chunk_size` bytes are not copied
    pub chunk_size: usize,
    /// Number of worker threads (0 = auto-detect)
    pub threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            target: PathBuf::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            threads: 0,
        }
    }
}

impl PipelineConfig {
    /// Build a validated config with the default chunk size and thread count.
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self {
            source: source.into(),
            target: target.into(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.source.as_os_str().is_empty() {
            return Err(ConfigError::EmptySource);
        }
        if self.target.as_os_str().is_empty() {
            return Err(ConfigError::EmptyTarget);
        }
        // Creating the target truncates it, so copying onto the source would
        // destroy the input before the read phase starts.
        if same_file(&self.source, &self.target) {
            return Err(ConfigError::SameSourceAndTarget(self.source.clone()));
        }
        Ok(())
    }

    /// Resolved worker count (`threads == 0` means one per available core).
    pub fn num_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus()
        } else {
            self.threads
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new("in.bin", "out.bin").unwrap();
        assert_eq!(config.chunk_size, 10_000);
        assert_eq!(config.threads, 0);
        assert!(config.num_threads() >= 1);
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let config = PipelineConfig::new("in.bin", "out.bin").unwrap().with_chunk_size(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroChunkSize));
    }

    #[test]
    fn test_rejects_empty_paths() {
        assert_eq!(PipelineConfig::new("", "out.bin").unwrap_err(), ConfigError::EmptySource);
        assert_eq!(PipelineConfig::new("in.bin", "").unwrap_err(), ConfigError::EmptyTarget);
    }

    #[test]
    fn test_rejects_same_source_and_target() {
        let err = PipelineConfig::new("data.bin", "data.bin").unwrap_err();
        assert!(matches!(err, ConfigError::SameSourceAndTarget(_)));
    }

    #[test]
    fn test_explicit_threads() {
        let config = PipelineConfig::new("a", "b").unwrap().with_threads(3);
        assert_eq!(config.num_threads(), 3);
    }
}
