use anyhow::Result;

use avi_core::encoder::VideoEncoder;
use avi_core::FourCC;

/// Stores each frame verbatim as an uncompressed `"##db"` chunk.
///
/// Useful for verifying the container round-trip independently of any real
/// video codec, and as the default encoder behind the CLI demo's `write`
/// subcommand.
pub struct UncompressedVideoEncoder {
    bits_per_pixel: u16,
    frame_bytes: usize,
}

impl UncompressedVideoEncoder {
    pub fn new(width: u32, height: u32, bits_per_pixel: u16) -> Self {
        let frame_bytes = (width as usize) * (height as usize) * (bits_per_pixel as usize) / 8;
        Self {
            bits_per_pixel,
            frame_bytes,
        }
    }
}

impl VideoEncoder for UncompressedVideoEncoder {
    fn codec(&self) -> FourCC {
        FourCC(0)
    }

    fn bits_per_pixel(&self) -> u16 {
        self.bits_per_pixel
    }

    fn max_encoded_size(&self) -> usize {
        self.frame_bytes
    }

    fn encode(&mut self, raw: &[u8], out: &mut Vec<u8>) -> Result<bool> {
        out.extend_from_slice(raw);
        Ok(true)
    }
}
