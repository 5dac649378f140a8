//! Writer configuration (§6) and the frame-rate rational decomposition
//! (§4.3.2).
//!
//! Mirrors the teacher's constructor-parameter style (`Writer::create(path,
//! codec, block_size)`) with a small builder on top, since the writer here
//! has three independent knobs instead of two.

/// A frame rate expressed as the exact rational the file format wants:
/// `rate = numerator`, `scale = denominator` in `strh`, and
/// `microSecPerFrame = round(1_000_000 / fps)` in `avih`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    /// Decomposes a decimal fps into a rational (§4.3.2): round to 3 decimal
    /// places first to stabilize against floating-point drift, then use a
    /// fixed denominator of 1000 and normalize by the GCD.
    pub fn from_fps(fps: f64) -> Self {
        assert!(fps > 0.0 && fps.is_finite(), "fps must be positive and finite, got {fps}");
        let rounded = (fps * 1000.0).round() / 1000.0;
        let numerator = (rounded * 1000.0).round() as u64;
        let denominator = 1000u64;
        let g = gcd(numerator, denominator).max(1);
        Self {
            numerator: (numerator / g) as u32,
            denominator: (denominator / g) as u32,
        }
    }

    pub fn as_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// `round(1_000_000 / fps)`, stored in `avih.dwMicroSecPerFrame`.
    pub fn microseconds_per_frame(self) -> u32 {
        (1_000_000.0 * self.denominator as f64 / self.numerator as f64).round() as u32
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// The three knobs §6 exposes: frame rate, legacy-index emission, and
/// whether `close()` should leave the underlying sink open.
#[derive(Debug, Clone)]
pub struct AviWriterConfig {
    pub frame_rate: FrameRate,
    pub emit_index1: bool,
    pub leave_open: bool,
}

impl AviWriterConfig {
    pub fn builder(fps: f64) -> AviWriterConfigBuilder {
        AviWriterConfigBuilder {
            frame_rate: FrameRate::from_fps(fps),
            emit_index1: false,
            leave_open: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AviWriterConfigBuilder {
    frame_rate: FrameRate,
    emit_index1: bool,
    leave_open: bool,
}

impl AviWriterConfigBuilder {
    /// Emit the legacy `idx1` chunk in the first RIFF for AVI v1 readers
    /// (§6). Default: `false`.
    pub fn emit_index1(mut self, emit: bool) -> Self {
        self.emit_index1 = emit;
        self
    }

    /// Don't close the underlying sink in `AviWriter::close` (§6). Default:
    /// `false`.
    pub fn leave_open(mut self, leave_open: bool) -> Self {
        self.leave_open = leave_open;
        self
    }

    pub fn build(self) -> AviWriterConfig {
        AviWriterConfig {
            frame_rate: self.frame_rate,
            emit_index1: self.emit_index1,
            leave_open: self.leave_open,
        }
    }
}
