//! Trivial pass-through encoder adapters.
//!
//! `avi_core` only defines the [`VideoEncoder`]/[`AudioEncoder`] contracts
//! (§4.4); concrete codecs (Motion JPEG, MPEG-4 VCM, MP3/LAME) are out of
//! scope for the core (§1) and implemented elsewhere. This crate exists
//! only so the CLI demo and integration tests have something real to plug
//! into that contract, the way `ancf_codecs`' `PassThroughCodec` exists
//! alongside `ZstdCodec`/`Lz4Codec` to exercise `ancf_core::Codec` without
//! pulling in a real compressor for the trivial case.

mod pcm_passthrough;
mod video_passthrough;

pub use pcm_passthrough::PcmPassthroughEncoder;
pub use video_passthrough::UncompressedVideoEncoder;
