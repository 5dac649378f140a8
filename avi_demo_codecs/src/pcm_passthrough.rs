use anyhow::Result;

use avi_core::encoder::AudioEncoder;
use avi_core::stream::WAVE_FORMAT_PCM;

/// Stores each audio block verbatim as a PCM `"##wb"` chunk.
///
/// Has nothing to flush at close — PCM has no encoder-side lookahead — so
/// `flush` keeps the trait's default no-op implementation.
pub struct PcmPassthroughEncoder {
    channels: u16,
    samples_per_second: u32,
    bits_per_sample: u16,
    bytes_per_second: u32,
    granularity: u16,
}

impl PcmPassthroughEncoder {
    pub fn new(channels: u16, samples_per_second: u32, bits_per_sample: u16) -> Self {
        let granularity = ((bits_per_sample as u32 * channels as u32) + 7) / 8;
        Self {
            channels,
            samples_per_second,
            bits_per_sample,
            bytes_per_second: granularity * samples_per_second,
            granularity: granularity as u16,
        }
    }
}

impl AudioEncoder for PcmPassthroughEncoder {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn samples_per_second(&self) -> u32 {
        self.samples_per_second
    }

    fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    fn format_tag(&self) -> u16 {
        WAVE_FORMAT_PCM
    }

    fn bytes_per_second(&self) -> u32 {
        self.bytes_per_second
    }

    fn granularity(&self) -> u16 {
        self.granularity
    }

    fn max_encoded_length(&self, src_len: usize) -> usize {
        src_len
    }

    fn encode(&mut self, raw: &[u8], out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granularity_matches_stream_params_defaults() {
        let enc = PcmPassthroughEncoder::new(2, 44_100, 16);
        assert_eq!(enc.granularity(), 4);
        assert_eq!(enc.bytes_per_second(), 4 * 44_100);
    }
}
