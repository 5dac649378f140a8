//! Error kinds for the writer (§7).
//!
//! Configuration and layout errors are programmer errors: they indicate the
//! caller violated an invariant (froze a stream and then mutated it, wrote
//! past the super-index capacity, …) and abort the current operation. I/O
//! errors are surfaced directly from the underlying sink and leave the
//! writer unusable beyond a best-effort `close`.

use crate::fourcc::FourCC;

/// All error kinds the writer can produce.
///
/// Public entry points (`AviWriter` methods, encoder wrappers) return
/// `anyhow::Result<T>`; this enum is the concrete error type that flows
/// through those results via `anyhow`'s blanket `From` conversion, so callers
/// that want to match on a specific kind can `downcast_ref::<AviError>()`.
#[derive(Debug, thiserror::Error)]
pub enum AviError {
    #[error("stream {index} is frozen; metadata cannot be changed after the first write")]
    StreamFrozen { index: u8 },

    #[error("cannot add streams after writing has started")]
    WritingAlreadyStarted,

    #[error("stream limit exceeded: at most 100 streams are supported, got index {index}")]
    TooManyStreams { index: u32 },

    #[error("stream {index} super-index is full ({max} entries); no more standard-index chunks can be flushed for it")]
    SuperIndexFull { index: u8, max: usize },

    #[error("unsupported channel count {channels} for this audio encoder (expected 1 or 2)")]
    UnsupportedChannelCount { channels: u16 },

    #[error("unknown codec {0:?} for the requested encoder adapter")]
    UnknownCodec(FourCC),

    #[error("chunk data size {size} exceeds the maximum representable size ({max})")]
    ChunkTooLarge { size: u64, max: u64 },

    #[error("RIFF item closed with actual size {actual} but declared size was {declared}")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("writer has already been closed")]
    AlreadyClosed,

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AviError>;
