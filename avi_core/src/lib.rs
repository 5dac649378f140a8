//! A writer for RIFF/AVI v1 and OpenDML (AVI v2) container files.
//!
//! Frames and audio blocks are pushed in; the writer handles RIFF chunk
//! framing, legacy and OpenDML indices, and segmenting across multiple
//! RIFFs once a file grows past 32-bit offset limits. See [`AviWriter`] for
//! the entry point.

pub mod avi;
pub mod config;
pub mod encoder;
pub mod error;
pub mod format;
pub mod fourcc;
pub mod riff;
pub mod stream;

pub use avi::AviWriter;
pub use config::{AviWriterConfig, AviWriterConfigBuilder, FrameRate};
pub use encoder::{AsyncMuxer, AudioEncoder, EncodingAudioStream, EncodingVideoStream, VideoEncoder};
pub use error::AviError;
pub use fourcc::FourCC;
pub use stream::{
    AudioStreamHandle, AudioStreamParams, VideoStreamHandle, VideoStreamParams, WAVE_FORMAT_MP3,
    WAVE_FORMAT_PCM,
};
