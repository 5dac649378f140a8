//! RIFF/AVI tag and layout constants (§6 GLOSSARY, §3, §4.3).
//!
//! Mirrors the teacher's `format.rs`: fixed struct sizes and magic
//! constants, kept free of any I/O so the writer and tests can both depend
//! on it without pulling in a sink type.

use crate::fourcc::FourCC;

// ── RIFF-level tags ─────────────────────────────────────────────────────────

pub const RIFF: FourCC = FourCC::from_bytes(b"RIFF");
pub const LIST: FourCC = FourCC::from_bytes(b"LIST");
pub const AVI_: FourCC = FourCC::from_bytes(b"AVI ");
pub const AVIX: FourCC = FourCC::from_bytes(b"AVIX");

// ── Header list tags ─────────────────────────────────────────────────────────

pub const HDRL: FourCC = FourCC::from_bytes(b"hdrl");
pub const AVIH: FourCC = FourCC::from_bytes(b"avih");
pub const STRL: FourCC = FourCC::from_bytes(b"strl");
pub const STRH: FourCC = FourCC::from_bytes(b"strh");
pub const STRF: FourCC = FourCC::from_bytes(b"strf");
pub const STRN: FourCC = FourCC::from_bytes(b"strn");
pub const INDX: FourCC = FourCC::from_bytes(b"indx");
pub const ODML: FourCC = FourCC::from_bytes(b"odml");
pub const DMLH: FourCC = FourCC::from_bytes(b"dmlh");
pub const JUNK: FourCC = FourCC::from_bytes(b"JUNK");

// ── Movie data ───────────────────────────────────────────────────────────────

pub const MOVI: FourCC = FourCC::from_bytes(b"movi");
pub const IDX1: FourCC = FourCC::from_bytes(b"idx1");

// ── Stream types ─────────────────────────────────────────────────────────────

pub const VIDS: FourCC = FourCC::from_bytes(b"vids");
pub const AUDS: FourCC = FourCC::from_bytes(b"auds");

// ── Struct sizes (bytes on disk) ─────────────────────────────────────────────

/// `AVIMAINHEADER`: 10 scalar fields + `dwReserved[4]`.
pub const AVIH_SIZE: u32 = 56;
/// `AVISTREAMHEADER`: fields through `rcFrame` (4 `i16`s).
pub const STRH_SIZE: u32 = 56;
/// `BITMAPINFOHEADER`.
pub const STRF_VIDEO_SIZE: u32 = 40;
/// Size of the 256-entry grayscale palette appended to `strf` for
/// uncompressed 8bpp video (§4.3.5): 256 `RGBQUAD`s.
pub const STRF_VIDEO_PALETTE_SIZE: u32 = 256 * 4;
/// `WAVEFORMATEX` fixed portion, excluding `cbSize` and trailing bytes.
pub const STRF_AUDIO_FIXED_SIZE: u32 = 16;
/// `dmlh` (`AVIEXTHEADER`): `dwGrandFrames` + 61 reserved `u32`s = 64
/// `u32`s total, per §4.3.3 ("64 reserved bytes zero-filled after that" on
/// top of the leading total-frames field makes for an even 4-byte-aligned
/// OpenDML extension header).
pub const DMLH_SIZE: u32 = 4 + 64;

/// Bytes of one `AVISUPERINDEX` entry: `qwOffset`(8) + `dwSize`(4) +
/// `dwDuration`(4).
pub const SUPER_INDEX_ENTRY_SIZE: u32 = 16;
/// Fixed header of an `indx`/`ix##` chunk: `wLongsPerEntry`(2) +
/// `bIndexSubType`(1) + `bIndexType`(1) + `nEntriesInUse`(4) +
/// `dwChunkId`(4) + `dwReserved[3]`(12).
pub const INDEX_HEADER_SIZE: u32 = 24;
/// Bytes of one standard-index (`ix##`) entry: `offset`(4) + `size`(4).
pub const STANDARD_INDEX_ENTRY_SIZE: u32 = 8;
/// Bytes of one legacy `idx1` entry: `chunkId`+`flags`+`offset`+`size`.
pub const IDX1_ENTRY_SIZE: u32 = 16;

// ── Index type / sub-type bytes (OpenDML) ───────────────────────────────────

pub const AVI_INDEX_OF_INDEXES: u8 = 0x00;
pub const AVI_INDEX_OF_CHUNKS: u8 = 0x01;

// ── avih flags ───────────────────────────────────────────────────────────────

pub const AVIF_HASINDEX: u32 = 0x0000_0010;
pub const AVIF_ISINTERLEAVED: u32 = 0x0000_0100;
pub const AVIF_TRUSTCKTYPE: u32 = 0x0000_0800;

// ── idx1 flags ───────────────────────────────────────────────────────────────

pub const AVIIF_KEYFRAME: u32 = 0x10;
/// High bit of a standard/legacy index `dataSize` field marks a non-key
/// frame (§3).
pub const INDEX_NONKEY_FLAG: u32 = 0x8000_0000;

// ── Invariants / limits (§3, §6) ─────────────────────────────────────────────

pub const MAX_STREAMS: u32 = 100;
pub const MAX_STANDARD_INDEX_ENTRIES: usize = 15_000;
pub const MAX_SUPER_INDEX_ENTRIES: usize = 256;

/// Soft threshold for the first RIFF (§6, §4.3.2): 512 MiB.
pub const FIRST_RIFF_SIZE_THRESHOLD: u64 = 512 * 1024 * 1024;
/// Threshold for subsequent `AVIX` RIFFs (§4.3.2): `INT32_MAX - 1 MiB`.
pub const SUBSEQUENT_RIFF_SIZE_THRESHOLD: u64 = i32::MAX as u64 - 1024 * 1024;

/// 8 bytes for a chunk/list tag+size header.
pub const ITEM_HEADER_SIZE: u64 = 8;
