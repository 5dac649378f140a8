use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use avi_core::encoder::{EncodingAudioStream, EncodingVideoStream};
use avi_core::{AviWriter, AviWriterConfig};
use avi_demo_codecs::{PcmPassthroughEncoder, UncompressedVideoEncoder};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "avi",
    about = "Write and inspect AVI v1/OpenDML v2 container files",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic AVI file: an animated checkerboard video stream,
    /// optionally with a PCM sine-tone audio stream alongside it.
    Write {
        /// Destination AVI file
        output: PathBuf,
        /// Frame width in pixels
        #[arg(long, default_value_t = 320)]
        width: u32,
        /// Frame height in pixels
        #[arg(long, default_value_t = 240)]
        height: u32,
        /// Number of video frames to generate
        #[arg(long, default_value_t = 60)]
        frames: u64,
        /// Frame rate (decimal, rounded to 3 places per the container format)
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
        /// Also write a PCM mono 8kHz audio stream (one block per frame)
        #[arg(long)]
        with_audio: bool,
        /// Emit the legacy idx1 index for AVI v1 compatibility
        #[arg(long)]
        emit_index1: bool,
    },
    /// Print the RIFF chunk tree and main-header fields of an AVI file
    Inspect {
        /// AVI file to inspect
        file: PathBuf,
        /// Print every chunk in the movi list, not just the tree summary
        #[arg(long)]
        chunks: bool,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{v:.2} {}", UNITS[unit])
    }
}

/// Deterministic animated checkerboard frame, BGR24 top-down, so `write`
/// doesn't need to depend on an image-decoding crate to produce test data.
fn checkerboard_frame(width: u32, height: u32, tick: u64) -> Vec<u8> {
    let mut frame = Vec::with_capacity((width * height * 3) as usize);
    let phase = (tick % 16) as u32;
    for y in 0..height {
        for x in 0..width {
            let cell = ((x / 16) + (y / 16) + phase) % 2;
            let (b, g, r) = if cell == 0 { (20, 20, 20) } else { (220, 220, 220) };
            frame.extend_from_slice(&[b, g, r]);
        }
    }
    frame
}

/// One block of a deterministic sine tone, 8-bit unsigned PCM mono.
fn tone_block(samples_per_second: u32, samples: u32, tick: u64) -> Vec<u8> {
    let freq = 440.0;
    (0..samples)
        .map(|i| {
            let t = (tick * samples as u64 + i as u64) as f64 / samples_per_second as f64;
            let s = (t * freq * std::f64::consts::TAU).sin();
            (128.0 + 100.0 * s).round() as u8
        })
        .collect()
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_write(
    output: PathBuf,
    width: u32,
    height: u32,
    frames: u64,
    fps: f64,
    with_audio: bool,
    emit_index1: bool,
) -> anyhow::Result<()> {
    let file = File::create(&output).with_context(|| format!("creating output file {output:?}"))?;
    let sink = BufWriter::new(file);

    let config = AviWriterConfig::builder(fps).emit_index1(emit_index1).build();
    let mut writer = AviWriter::new(sink, config).context("initializing AVI writer")?;

    let mut video = EncodingVideoStream::add_to(&mut writer, UncompressedVideoEncoder::new(width, height, 24), width, height)
        .context("registering video stream")?;

    const AUDIO_SAMPLE_RATE: u32 = 8000;
    let mut audio = if with_audio {
        Some(
            EncodingAudioStream::add_to(&mut writer, PcmPassthroughEncoder::new(1, AUDIO_SAMPLE_RATE, 8))
                .context("registering audio stream")?,
        )
    } else {
        None
    };

    let t0 = Instant::now();
    let samples_per_frame = (AUDIO_SAMPLE_RATE as f64 / fps).round() as u32;
    for tick in 0..frames {
        let frame = checkerboard_frame(width, height, tick);
        video.write_frame(&mut writer, &frame).context("writing video frame")?;
        if let Some(audio) = &mut audio {
            let block = tone_block(AUDIO_SAMPLE_RATE, samples_per_frame, tick);
            audio.write_block(&mut writer, &block).context("writing audio block")?;
        }
    }

    if let Some(audio) = &mut audio {
        audio.finish_writing(&mut writer).context("flushing audio encoder")?;
    }

    writer.close().context("closing AVI writer")?;
    let elapsed = t0.elapsed();

    let out_meta = std::fs::metadata(&output)?;
    eprintln!("  frames      : {frames}");
    eprintln!("  dimensions  : {width}x{height}");
    eprintln!("  fps         : {fps}");
    eprintln!("  audio       : {}", if with_audio { "PCM mono 8kHz" } else { "none" });
    eprintln!("  idx1        : {}", if emit_index1 { "yes" } else { "no" });
    eprintln!("  file size   : {}", human_bytes(out_meta.len()));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

// ── Minimal RIFF tree walker (inspect-only; avi_core has no reader, §1) ─────

struct ChunkHeader {
    tag: [u8; 4],
    size: u32,
    /// Absolute offset of the chunk's data (tag+size already consumed).
    data_offset: u64,
}

fn read_chunk_header<R: Read + Seek>(r: &mut R) -> anyhow::Result<Option<ChunkHeader>> {
    let mut tag = [0u8; 4];
    match r.read_exact(&mut tag) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let mut size_buf = [0u8; 4];
    r.read_exact(&mut size_buf)?;
    let size = u32::from_le_bytes(size_buf);
    let data_offset = r.stream_position()?;
    Ok(Some(ChunkHeader { tag, size, data_offset }))
}

fn tag_str(tag: &[u8; 4]) -> String {
    String::from_utf8_lossy(tag).to_string()
}

fn is_list_tag(tag: &[u8; 4]) -> bool {
    tag == b"RIFF" || tag == b"LIST"
}

/// Walks the RIFF tree to `depth`, printing each chunk/list header and
/// (for `movi`) optionally every data chunk inside it.
fn walk<R: Read + Seek>(r: &mut R, end: u64, depth: usize, show_chunks: bool) -> anyhow::Result<()> {
    loop {
        let pos = r.stream_position()?;
        if pos >= end {
            break;
        }
        let Some(hdr) = read_chunk_header(r)? else { break };
        let indent = "  ".repeat(depth);

        if is_list_tag(&hdr.tag) {
            let mut list_type = [0u8; 4];
            r.read_exact(&mut list_type)?;
            println!(
                "{indent}{} '{}' size={} @{}",
                tag_str(&hdr.tag),
                tag_str(&list_type),
                hdr.size,
                hdr.data_offset - 8
            );
            let list_end = hdr.data_offset + hdr.size as u64;
            let is_movi = &list_type == b"movi";
            if is_movi && !show_chunks {
                println!("{indent}  ... {} bytes of stream data (pass --chunks to list)", hdr.size - 4);
                r.seek(SeekFrom::Start(list_end))?;
            } else {
                walk(r, list_end, depth + 1, show_chunks)?;
            }
        } else {
            println!("{indent}{} size={} @{}", tag_str(&hdr.tag), hdr.size, hdr.data_offset - 8);
            let mut next = hdr.data_offset + hdr.size as u64;
            if next % 2 != 0 {
                next += 1;
            }
            r.seek(SeekFrom::Start(next))?;
        }
    }
    Ok(())
}

fn run_inspect(file: PathBuf, show_chunks: bool) -> anyhow::Result<()> {
    let f = File::open(&file).with_context(|| format!("opening {file:?}"))?;
    let file_len = f.metadata()?.len();
    let mut r = BufReader::new(f);

    let Some(riff) = read_chunk_header(&mut r)? else {
        bail!("empty file");
    };
    if &riff.tag != b"RIFF" {
        bail!("not a RIFF file (tag was {:?})", tag_str(&riff.tag));
    }
    let mut form_type = [0u8; 4];
    r.read_exact(&mut form_type)?;
    if &form_type != b"AVI " {
        bail!("not an AVI file (form type was {:?})", tag_str(&form_type));
    }

    println!("=== AVI file: {file:?} ===");
    println!();
    println!("  file size : {}", human_bytes(file_len));
    println!();
    println!("RIFF chunk tree:");
    walk(&mut r, riff.data_offset + riff.size as u64, 0, show_chunks)?;

    // Any further top-level RIFF/AVIX segments (multi-RIFF files, §4.3.7).
    let mut riff_count = 1;
    loop {
        let pos = r.stream_position()?;
        if pos >= file_len {
            break;
        }
        let Some(hdr) = read_chunk_header(&mut r)? else { break };
        if &hdr.tag != b"RIFF" {
            break;
        }
        let mut form_type = [0u8; 4];
        r.read_exact(&mut form_type)?;
        println!(
            "RIFF '{}' size={} @{} (segment #{riff_count})",
            tag_str(&form_type),
            hdr.size,
            hdr.data_offset - 8
        );
        walk(&mut r, hdr.data_offset + hdr.size as u64, 1, show_chunks)?;
        riff_count += 1;
    }

    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("avi_core=info")
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Write {
            output,
            width,
            height,
            frames,
            fps,
            with_audio,
            emit_index1,
        } => run_write(output, width, height, frames, fps, with_audio, emit_index1),
        Commands::Inspect { file, chunks } => run_inspect(file, chunks),
    }
}
