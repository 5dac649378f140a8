//! Stream state (§3, §4.2): per-stream metadata, the mutable/frozen state
//! machine, and the running counters/indices the multiplexer updates as it
//! processes frames and blocks.
//!
//! Per the cyclic-reference collapse in §9, streams don't hold a handle back
//! to the multiplexer: `AviWriter` owns a `Vec<StreamState>` and callers
//! address a stream through an opaque, kind-tagged handle.

use crate::format;
use crate::fourcc::FourCC;

/// Handle to a registered video stream, returned by `AviWriter::add_video_stream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoStreamHandle(pub(crate) usize);

/// Handle to a registered audio stream, returned by `AviWriter::add_audio_stream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioStreamHandle(pub(crate) usize);

impl VideoStreamHandle {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

impl AudioStreamHandle {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Video-specific metadata (§3 VideoStream additions).
#[derive(Debug, Clone)]
pub struct VideoStreamParams {
    pub width: u32,
    pub height: u32,
    /// Must be one of 8, 16, 24, 32.
    pub bits_per_pixel: u16,
    pub codec: FourCC,
}

impl VideoStreamParams {
    pub fn new(width: u32, height: u32, bits_per_pixel: u16, codec: FourCC) -> Self {
        assert!(
            matches!(bits_per_pixel, 8 | 16 | 24 | 32),
            "video bits_per_pixel must be 8, 16, 24, or 32, got {bits_per_pixel}"
        );
        Self {
            width,
            height,
            bits_per_pixel,
            codec,
        }
    }

    /// An uncompressed (`biCompression = 0`) video stream, `"##db"` chunk id.
    pub fn uncompressed(width: u32, height: u32, bits_per_pixel: u16) -> Self {
        Self::new(width, height, bits_per_pixel, FourCC(0))
    }

    pub(crate) fn is_uncompressed(&self) -> bool {
        self.codec.as_u32() == 0
    }
}

/// Audio-specific metadata (§3 AudioStream additions).
#[derive(Debug, Clone)]
pub struct AudioStreamParams {
    pub channels: u16,
    pub samples_per_second: u32,
    pub bits_per_sample: u16,
    pub format_tag: u16,
    pub bytes_per_second: u32,
    /// Granularity / block align.
    pub block_align: u16,
    pub format_specific_data: Vec<u8>,
}

/// `WAVE_FORMAT_PCM`.
pub const WAVE_FORMAT_PCM: u16 = 0x0001;
/// `WAVE_FORMAT_MPEGLAYER3`.
pub const WAVE_FORMAT_MP3: u16 = 0x0055;

impl AudioStreamParams {
    /// PCM defaults per §3: `granularity = ceil(bitsPerSample*channels/8)`,
    /// `bytesPerSecond = granularity*samplesPerSecond`.
    pub fn pcm(channels: u16, samples_per_second: u32, bits_per_sample: u16) -> Self {
        let granularity = ((bits_per_sample as u32 * channels as u32) + 7) / 8;
        let granularity = granularity as u16;
        Self {
            channels,
            samples_per_second,
            bits_per_sample,
            format_tag: WAVE_FORMAT_PCM,
            bytes_per_second: granularity as u32 * samples_per_second,
            block_align: granularity,
            format_specific_data: Vec::new(),
        }
    }
}

/// Tagged stream-kind variant (§9 inheritance-chain collapse): a single
/// descriptor plus a `match` in the multiplexer replaces virtual dispatch.
#[derive(Debug, Clone)]
pub enum StreamKind {
    Video(VideoStreamParams),
    Audio(AudioStreamParams),
}

impl StreamKind {
    pub(crate) fn type_fourcc(&self) -> FourCC {
        match self {
            StreamKind::Video(_) => format::VIDS,
            StreamKind::Audio(_) => format::AUDS,
        }
    }
}

/// One entry in a stream's standard index (§3): offset of a data chunk
/// within the current RIFF, and its size with the high bit marking a
/// non-key frame.
#[derive(Debug, Clone, Copy)]
pub struct StandardIndexEntry {
    pub data_offset: u64,
    /// High bit (`format::INDEX_NONKEY_FLAG`) set when not a key frame.
    pub data_size: u32,
}

/// One entry in a stream's super-index (§3): a pointer to a flushed `ix##`
/// chunk.
#[derive(Debug, Clone, Copy)]
pub struct SuperIndexEntry {
    pub chunk_offset: u64,
    pub chunk_size: u32,
    pub duration: u32,
}

/// One entry in a stream's legacy index, only populated in the first RIFF
/// when `emit_index1` is enabled (§3).
#[derive(Debug, Clone, Copy)]
pub struct LegacyIndexEntry {
    pub chunk_id: FourCC,
    pub is_key: bool,
    pub offset_rel_movi: u32,
    /// With the non-key high bit preserved, per §4.3.9.
    pub data_size: u32,
}

/// Per-stream state owned by the multiplexer: metadata, freeze state, and
/// the running counters/indices (§3 StreamInfo, §4.2).
#[derive(Debug, Clone)]
pub struct StreamState {
    pub index: u8,
    pub name: Option<String>,
    pub kind: StreamKind,
    /// Set exactly once, atomically with freezing, before any data-bearing
    /// write (§3 Invariants).
    pub chunk_id: Option<FourCC>,

    pub frame_count: u64,
    pub max_chunk_data_size: u32,
    pub total_data_size: u64,

    pub standard_index: Vec<StandardIndexEntry>,
    pub super_index: Vec<SuperIndexEntry>,
    pub legacy_index: Vec<LegacyIndexEntry>,
}

impl StreamState {
    pub(crate) fn new(index: u8, name: Option<String>, kind: StreamKind) -> Self {
        Self {
            index,
            name,
            kind,
            chunk_id: None,
            frame_count: 0,
            max_chunk_data_size: 0,
            total_data_size: 0,
            standard_index: Vec::new(),
            super_index: Vec::new(),
            legacy_index: Vec::new(),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.chunk_id.is_some()
    }

    pub(crate) fn freeze(&mut self) {
        if self.chunk_id.is_some() {
            return;
        }
        let suffix: &[u8; 2] = match &self.kind {
            StreamKind::Video(params) => {
                if params.is_uncompressed() {
                    b"db"
                } else {
                    b"dc"
                }
            }
            StreamKind::Audio(_) => b"wb",
        };
        self.chunk_id = Some(crate::fourcc::stream_chunk_id(self.index, suffix));
    }

    pub fn standard_index_chunk_id(&self) -> FourCC {
        crate::fourcc::standard_index_chunk_id(self.index)
    }

    pub fn as_video(&self) -> Option<&VideoStreamParams> {
        match &self.kind {
            StreamKind::Video(p) => Some(p),
            StreamKind::Audio(_) => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioStreamParams> {
        match &self.kind {
            StreamKind::Audio(p) => Some(p),
            StreamKind::Video(_) => None,
        }
    }
}
