//! End-to-end tests exercising the full multiplexer write path against the
//! scenarios and boundary behaviors in spec §8, driven only through
//! `avi_core`'s public API and checked by parsing the resulting bytes.
//!
//! `avi_core` has no reader (out of scope, §1), so these tests carry their
//! own minimal RIFF tree walker rather than depending on one — the same
//! shape of walker the CLI's `inspect` subcommand uses for display.

use std::io::Cursor;

use avi_core::stream::{AudioStreamParams, VideoStreamParams};
use avi_core::{AviWriter, AviWriterConfig};

// ── RIFF tree walker (test-only, black-box) ─────────────────────────────────

#[derive(Debug, Clone)]
struct Entry {
    tag: String,
    list_type: Option<String>,
    size: u32,
    /// Offset of the first byte after the header (and, for lists, after
    /// the embedded list-type tag) — i.e. where the caller's payload
    /// begins.
    data_offset: usize,
}

fn u32_le(b: &[u8]) -> u32 {
    u32::from_le_bytes(b.try_into().unwrap())
}
fn u16_le(b: &[u8]) -> u16 {
    u16::from_le_bytes(b.try_into().unwrap())
}
fn u64_le(b: &[u8]) -> u64 {
    u64::from_le_bytes(b.try_into().unwrap())
}
fn i16_le(b: &[u8]) -> i16 {
    i16::from_le_bytes(b.try_into().unwrap())
}

fn parse_all(buf: &[u8]) -> Vec<Entry> {
    let mut entries = Vec::new();
    walk(buf, 0, buf.len(), &mut entries);
    entries
}

fn walk(buf: &[u8], mut pos: usize, end: usize, out: &mut Vec<Entry>) {
    while pos + 8 <= end {
        let tag = std::str::from_utf8(&buf[pos..pos + 4]).unwrap().to_string();
        let size = u32_le(&buf[pos + 4..pos + 8]);
        let mut data_offset = pos + 8;
        let mut list_type = None;
        if tag == "RIFF" || tag == "LIST" {
            list_type = Some(std::str::from_utf8(&buf[data_offset..data_offset + 4]).unwrap().to_string());
            data_offset += 4;
        }
        out.push(Entry {
            tag: tag.clone(),
            list_type: list_type.clone(),
            size,
            data_offset,
        });

        let content_end = pos + 8 + size as usize;
        if tag == "RIFF" || tag == "LIST" {
            walk(buf, data_offset, content_end, out);
        }
        pos = content_end;
        if pos % 2 != 0 {
            pos += 1;
        }
    }
}

fn find<'a>(entries: &'a [Entry], tag: &str) -> &'a Entry {
    entries.iter().find(|e| e.tag == tag).unwrap_or_else(|| panic!("no {tag:?} chunk found"))
}

fn find_all<'a>(entries: &'a [Entry], tag: &str) -> Vec<&'a Entry> {
    entries.iter().filter(|e| e.tag == tag).collect()
}

fn find_list<'a>(entries: &'a [Entry], list_type: &str) -> &'a Entry {
    entries
        .iter()
        .find(|e| e.list_type.as_deref() == Some(list_type))
        .unwrap_or_else(|| panic!("no {list_type:?} list found"))
}

// ── Scenario 1: single uncompressed video stream (§8 scenario 1) ───────────

#[test]
fn scenario_1_single_video_stream() {
    let config = AviWriterConfig::builder(10.0).build();
    let mut writer = AviWriter::new(Cursor::new(Vec::new()), config).unwrap();
    let handle = writer.add_video_stream(VideoStreamParams::uncompressed(2, 2, 32)).unwrap();

    for _ in 0..3 {
        writer.write_video_frame(handle, true, &[0u8; 12]).unwrap();
    }
    let buf = writer.close().unwrap().unwrap().into_inner();

    let entries = parse_all(&buf);

    let riff = &entries[0];
    assert_eq!(riff.tag, "RIFF");
    assert_eq!(riff.list_type.as_deref(), Some("AVI "));
    // RIFF's declared size covers everything after its own 8-byte header.
    assert_eq!(riff.size as usize, buf.len() - 8);

    let avih = find(&entries, "avih");
    let a = &buf[avih.data_offset..avih.data_offset + avih.size as usize];
    assert_eq!(u32_le(&a[0..4]), 100_000); // dwMicroSecPerFrame = 1e6/10
    assert_eq!(u32_le(&a[16..20]), 3); // dwTotalFrames
    assert_eq!(u32_le(&a[24..28]), 1); // dwStreams
    assert_eq!(u32_le(&a[32..36]), 2); // dwWidth
    assert_eq!(u32_le(&a[36..40]), 2); // dwHeight

    let strh = find(&entries, "strh");
    let s = &buf[strh.data_offset..strh.data_offset + strh.size as usize];
    assert_eq!(&s[0..4], b"vids");
    assert_eq!(u32_le(&s[20..24]), 1); // dwScale
    assert_eq!(u32_le(&s[24..28]), 10); // dwRate -> 10/1 = 10fps

    let movi = find_list(&entries, "movi");
    let data_chunks: Vec<&Entry> = entries
        .iter()
        .filter(|e| e.data_offset > movi.data_offset && e.tag == "00db")
        .collect();
    assert_eq!(data_chunks.len(), 3);
    for c in &data_chunks {
        assert_eq!(c.size, 12);
    }

    let ix00 = find(&entries, "ix00");
    assert_eq!(ix00.size, 24 + 3 * 8);

    let indx = find(&entries, "indx");
    let nentries = u32_le(&buf[indx.data_offset + 4..indx.data_offset + 8]);
    assert_eq!(nentries, 1); // one ix## chunk flushed

    assert!(entries.iter().all(|e| e.tag != "idx1"));
}

// ── Scenario 2: video + PCM mono audio (§8 scenario 2) ──────────────────────

#[test]
fn scenario_2_video_and_pcm_audio_streams() {
    let config = AviWriterConfig::builder(1.0).build();
    let mut writer = AviWriter::new(Cursor::new(Vec::new()), config).unwrap();
    let video = writer.add_video_stream(VideoStreamParams::uncompressed(4, 4, 24)).unwrap();
    let audio = writer.add_audio_stream(AudioStreamParams::pcm(1, 8000, 8)).unwrap();

    writer.write_video_frame(video, true, &[0u8; 48]).unwrap();
    writer.write_audio_block(audio, &[1, 2, 3, 4]).unwrap();
    let buf = writer.close().unwrap().unwrap().into_inner();

    let entries = parse_all(&buf);
    let strh_chunks = find_all(&entries, "strh");
    assert_eq!(strh_chunks.len(), 2);

    let audio_strh = &buf[strh_chunks[1].data_offset..strh_chunks[1].data_offset + strh_chunks[1].size as usize];
    assert_eq!(&audio_strh[0..4], b"auds");
    assert_eq!(u32_le(&audio_strh[20..24]), 1); // dwScale = granularity
    assert_eq!(u32_le(&audio_strh[24..28]), 8000); // dwRate = bytesPerSecond
    assert_eq!(u32_le(&audio_strh[44..48]), 1); // dwSampleSize = granularity

    assert!(entries.iter().any(|e| e.tag == "01wb"));
}

// ── Scenario 3: legacy idx1 emission (§8 scenario 3) ────────────────────────

#[test]
fn scenario_3_emit_index1_five_frames() {
    let config = AviWriterConfig::builder(30.0).emit_index1(true).build();
    let mut writer = AviWriter::new(Cursor::new(Vec::new()), config).unwrap();
    let handle = writer.add_video_stream(VideoStreamParams::uncompressed(2, 2, 24)).unwrap();

    for _ in 0..5 {
        writer.write_video_frame(handle, true, &[0u8; 12]).unwrap();
    }
    let buf = writer.close().unwrap().unwrap().into_inner();

    let entries = parse_all(&buf);
    let idx1_chunks = find_all(&entries, "idx1");
    assert_eq!(idx1_chunks.len(), 1);

    let idx1 = idx1_chunks[0];
    assert_eq!(idx1.size, 5 * 16);

    let body = &buf[idx1.data_offset..idx1.data_offset + idx1.size as usize];
    let mut last_offset: i64 = -1;
    for entry in body.chunks(16) {
        assert_eq!(&entry[0..4], b"00db");
        let flags = u32_le(&entry[4..8]);
        assert_eq!(flags, 0x10); // uncompressed frames are all key frames here
        let offset = u32_le(&entry[8..12]) as i64;
        assert!(offset > last_offset, "idx1 offsets must be strictly increasing");
        last_offset = offset;
        let size = u32_le(&entry[12..16]);
        assert_eq!(size, 12);
    }
}

// ── Scenario 5: non-key frame marking (§8 scenario 5) ───────────────────────

#[test]
fn scenario_5_non_key_frame_sets_high_bit() {
    let config = AviWriterConfig::builder(30.0).emit_index1(true).build();
    let mut writer = AviWriter::new(Cursor::new(Vec::new()), config).unwrap();
    let handle = writer.add_video_stream(VideoStreamParams::new(
        2,
        2,
        24,
        avi_core::FourCC::from_ascii("MJPG"),
    )).unwrap();

    writer.write_video_frame(handle, true, &[0u8; 10]).unwrap();
    writer.write_video_frame(handle, false, &[0u8; 10]).unwrap();
    let buf = writer.close().unwrap().unwrap().into_inner();

    let entries = parse_all(&buf);

    let ix00 = find(&entries, "ix00");
    let body = &buf[ix00.data_offset..ix00.data_offset + ix00.size as usize];
    let entries_area = &body[24..];
    let first_size = u32_le(&entries_area[4..8]);
    let second_size = u32_le(&entries_area[12..16]);
    assert_eq!(first_size, 10);
    assert_eq!(second_size, 10 | 0x8000_0000);

    let idx1 = find(&entries, "idx1");
    let idx1_body = &buf[idx1.data_offset..idx1.data_offset + idx1.size as usize];
    let first_flags = u32_le(&idx1_body[4..8]);
    let second_flags = u32_le(&idx1_body[20..24]);
    assert_eq!(first_flags, 0x10);
    assert_eq!(second_flags, 0); // flags field is 0 for the non-key entry
    let second_idx1_size = u32_le(&idx1_body[28..32]);
    assert_eq!(second_idx1_size, 10 | 0x8000_0000);
}

// ── Boundary behavior: 15001 frames splits into two ix## chunks (§8) ───────

#[test]
fn boundary_15001_frames_splits_standard_index_into_two_chunks() {
    let config = AviWriterConfig::builder(30.0).build();
    let mut writer = AviWriter::new(Cursor::new(Vec::new()), config).unwrap();
    let handle = writer.add_video_stream(VideoStreamParams::uncompressed(1, 1, 8)).unwrap();

    for _ in 0..15_001 {
        writer.write_video_frame(handle, true, &[0u8; 1]).unwrap();
    }
    let buf = writer.close().unwrap().unwrap().into_inner();

    let entries = parse_all(&buf);
    let ix_chunks = find_all(&entries, "ix00");
    assert_eq!(ix_chunks.len(), 2);
    assert_eq!(ix_chunks[0].size, 24 + 15_000 * 8);
    assert_eq!(ix_chunks[1].size, 24 + 1 * 8);

    let indx = find(&entries, "indx");
    let nentries = u32_le(&buf[indx.data_offset + 4..indx.data_offset + 8]);
    assert_eq!(nentries, 2);
}

// ── Scenario 6: close() with a pending mid-stream flush (§8 scenario 6) ───

#[test]
fn scenario_6_close_rewrites_header_after_mid_stream_flush() {
    let config = AviWriterConfig::builder(30.0).build();
    let mut writer = AviWriter::new(Cursor::new(Vec::new()), config).unwrap();
    let handle = writer.add_video_stream(VideoStreamParams::uncompressed(1, 1, 8)).unwrap();

    for _ in 0..20_000 {
        writer.write_video_frame(handle, true, &[0u8; 1]).unwrap();
    }
    let buf = writer.close().unwrap().unwrap().into_inner();

    let entries = parse_all(&buf);
    let ix_chunks = find_all(&entries, "ix00");
    assert_eq!(ix_chunks.len(), 2);

    let avih = find(&entries, "avih");
    let a = &buf[avih.data_offset..avih.data_offset + avih.size as usize];
    assert_eq!(u32_le(&a[16..20]), 20_000); // dwTotalFrames, single RIFF here

    let strh = find(&entries, "strh");
    let s = &buf[strh.data_offset..strh.data_offset + strh.size as usize];
    assert_eq!(u32_le(&s[32..36]), 20_000); // dwLength

    let indx = find(&entries, "indx");
    let nentries = u32_le(&buf[indx.data_offset + 4..indx.data_offset + 8]);
    assert_eq!(nentries, 2); // 2 of the 256 reserved slots are in use

    // The remaining 254 reserved super-index slots stay zero-filled.
    let entries_area = &buf[indx.data_offset + 24..];
    let third_slot = &entries_area[2 * 16..3 * 16];
    assert!(third_slot.iter().all(|&b| b == 0));
}

// ── FourCC round-trip through the written file ──────────────────────────────

#[test]
fn video_codec_fourcc_round_trips_into_strf_and_strh() {
    let config = AviWriterConfig::builder(25.0).build();
    let mut writer = AviWriter::new(Cursor::new(Vec::new()), config).unwrap();
    let codec = avi_core::FourCC::from_ascii("MJPG");
    let handle = writer.add_video_stream(VideoStreamParams::new(8, 8, 24, codec)).unwrap();
    writer.write_video_frame(handle, true, &[0u8; 4]).unwrap();
    let buf = writer.close().unwrap().unwrap().into_inner();

    let entries = parse_all(&buf);
    let strh = find(&entries, "strh");
    let s = &buf[strh.data_offset..strh.data_offset + strh.size as usize];
    assert_eq!(&s[4..8], b"MJPG");

    let strf = find(&entries, "strf");
    let f = &buf[strf.data_offset..strf.data_offset + strf.size as usize];
    assert_eq!(&f[16..20], b"MJPG"); // biCompression

    assert!(entries.iter().any(|e| e.tag == "00dc")); // compressed chunk id
}

// ── rcFrame / palette sanity on the uncompressed 8bpp path ──────────────────

#[test]
fn uncompressed_8bpp_video_gets_a_grayscale_palette_in_strf() {
    let config = AviWriterConfig::builder(15.0).build();
    let mut writer = AviWriter::new(Cursor::new(Vec::new()), config).unwrap();
    let handle = writer.add_video_stream(VideoStreamParams::uncompressed(4, 4, 8)).unwrap();
    writer.write_video_frame(handle, true, &[0u8; 16]).unwrap();
    let buf = writer.close().unwrap().unwrap().into_inner();

    let entries = parse_all(&buf);
    let strf = find(&entries, "strf");
    // 40-byte BITMAPINFOHEADER + 256 RGBQUAD palette entries.
    assert_eq!(strf.size, 40 + 256 * 4);
    let f = &buf[strf.data_offset..strf.data_offset + strf.size as usize];
    let palette = &f[40..];
    assert_eq!(&palette[0..4], &[0, 0, 0, 0]);
    assert_eq!(&palette[255 * 4..255 * 4 + 4], &[255, 255, 255, 0]);

    let strh = find(&entries, "strh");
    let s = &buf[strh.data_offset..strh.data_offset + strh.size as usize];
    let (left, top, right, bottom) = (
        i16_le(&s[48..50]),
        i16_le(&s[50..52]),
        i16_le(&s[52..54]),
        i16_le(&s[54..56]),
    );
    assert_eq!((left, top, right, bottom), (0, 0, 4, 4));
}

// ── Super-index offsets and durations are byte-exact after close ───────────

#[test]
fn super_index_entries_point_at_their_standard_index_chunks() {
    let config = AviWriterConfig::builder(30.0).build();
    let mut writer = AviWriter::new(Cursor::new(Vec::new()), config).unwrap();
    let handle = writer.add_video_stream(VideoStreamParams::uncompressed(1, 1, 8)).unwrap();
    for _ in 0..15_001 {
        writer.write_video_frame(handle, true, &[0u8; 1]).unwrap();
    }
    let buf = writer.close().unwrap().unwrap().into_inner();
    let entries = parse_all(&buf);

    let ix_chunks = find_all(&entries, "ix00");
    let indx = find(&entries, "indx");
    let super_entries = &buf[indx.data_offset + 24..indx.data_offset + 24 + 2 * 16];

    for (i, ix) in ix_chunks.iter().enumerate() {
        let slot = &super_entries[i * 16..i * 16 + 16];
        let offset = u64_le(&slot[0..8]);
        let size = u32_le(&slot[8..12]);
        let duration = u32_le(&slot[12..16]);
        // qwOffset in AVISUPERINDEXENTRY points at the ix## chunk's own tag.
        assert_eq!(offset, (ix.data_offset - 8) as u64);
        assert_eq!(size, ix.size);
        let expected_duration = if i == 0 { 15_000 } else { 1 };
        assert_eq!(duration, expected_duration);
    }

    // duration sums to the stream's total frame count
    let total: u32 = (0..2)
        .map(|i| u32_le(&super_entries[i * 16 + 12..i * 16 + 16]))
        .sum();
    assert_eq!(total, 15_001);
}
