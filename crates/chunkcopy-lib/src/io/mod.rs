pub mod range_lock;
pub mod reader;
pub mod writer;

pub use reader::{ChunkReader, ReadOutcome};
pub use writer::{ChunkWriter, WriteOutcome, WrittenFile};
