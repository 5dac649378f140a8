//! The AVI multiplexer (§4.3): file-layout state machine orchestrating the
//! header list, `movi` list(s), per-stream indices, the super-index, and the
//! optional legacy `idx1` index across one or more RIFFs.

use std::io::{Seek, Write};

use tracing::{trace, warn};

use crate::config::AviWriterConfig;
use anyhow::Result;

use crate::error::AviError;
use crate::format;
use crate::riff::{RiffItem, RiffWriter};
use crate::stream::{
    AudioStreamHandle, AudioStreamParams, LegacyIndexEntry, StandardIndexEntry, StreamKind,
    StreamState, SuperIndexEntry, VideoStreamHandle, VideoStreamParams,
};

/// File offsets recorded while writing the header list (§4.3.3), patched
/// in place by [`AviWriter::close`] once final counts are known. Patching
/// in place — rather than re-emitting the whole list — is what keeps the
/// rewrite "bit-exact": every field changed at close occupies exactly the
/// bytes it occupied when first written as a placeholder.
struct HeaderLayout {
    avih_data_start: u64,
    dmlh_data_start: u64,
    stream_layouts: Vec<StreamHeaderLayout>,
}

struct StreamHeaderLayout {
    strh_data_start: u64,
    indx_data_start: u64,
}

/// The AVI v1/OpenDML v2 multiplexer.
///
/// Owns the streams it was given (§9 cyclic-reference collapse): callers
/// address a stream through the opaque [`VideoStreamHandle`]/
/// [`AudioStreamHandle`] returned by `add_*_stream`, never through a
/// reference back into this writer.
pub struct AviWriter<W: Write + Seek> {
    riff: RiffWriter<W>,
    config: AviWriterConfig,
    streams: Vec<StreamState>,

    started: bool,
    closed: bool,

    current_riff: Option<RiffItem>,
    current_movi: Option<RiffItem>,
    is_first_riff: bool,
    riff_threshold: u64,

    header: Option<HeaderLayout>,
    /// Captured when the first RIFF closes (§4.3.9): the frame count `avih`
    /// records, as opposed to the grand total across all RIFFs that `dmlh`
    /// records.
    riff_avi_frame_count: u32,
}

impl<W: Write + Seek> AviWriter<W> {
    pub fn new(sink: W, config: AviWriterConfig) -> Result<Self> {
        Ok(Self {
            riff: RiffWriter::new(sink)?,
            config,
            streams: Vec::new(),
            started: false,
            closed: false,
            current_riff: None,
            current_movi: None,
            is_first_riff: true,
            riff_threshold: format::FIRST_RIFF_SIZE_THRESHOLD,
            header: None,
            riff_avi_frame_count: 0,
        })
    }

    // ── Stream registration (§4.3.1) ─────────────────────────────────────────

    pub fn add_video_stream(&mut self, params: VideoStreamParams) -> Result<VideoStreamHandle> {
        self.add_video_stream_named(params, None)
    }

    pub fn add_video_stream_named(
        &mut self,
        params: VideoStreamParams,
        name: Option<String>,
    ) -> Result<VideoStreamHandle> {
        Ok(VideoStreamHandle(
            self.register_stream(name, StreamKind::Video(params))?,
        ))
    }

    pub fn add_audio_stream(&mut self, params: AudioStreamParams) -> Result<AudioStreamHandle> {
        self.add_audio_stream_named(params, None)
    }

    pub fn add_audio_stream_named(
        &mut self,
        params: AudioStreamParams,
        name: Option<String>,
    ) -> Result<AudioStreamHandle> {
        Ok(AudioStreamHandle(
            self.register_stream(name, StreamKind::Audio(params))?,
        ))
    }

    fn register_stream(&mut self, name: Option<String>, kind: StreamKind) -> Result<usize> {
        if self.started {
            return Err(AviError::WritingAlreadyStarted.into());
        }
        let index = self.streams.len();
        if index as u32 >= format::MAX_STREAMS {
            return Err(AviError::TooManyStreams {
                index: index as u32,
            }
            .into());
        }
        self.streams.push(StreamState::new(index as u8, name, kind));
        Ok(index)
    }

    pub fn video_params_mut(&mut self, handle: VideoStreamHandle) -> Result<&mut VideoStreamParams> {
        if self.started {
            return Err(AviError::StreamFrozen {
                index: self.streams[handle.index()].index,
            }
            .into());
        }
        match &mut self.streams[handle.index()].kind {
            StreamKind::Video(p) => Ok(p),
            StreamKind::Audio(_) => unreachable!("VideoStreamHandle always addresses a video stream"),
        }
    }

    pub fn audio_params_mut(&mut self, handle: AudioStreamHandle) -> Result<&mut AudioStreamParams> {
        if self.started {
            return Err(AviError::StreamFrozen {
                index: self.streams[handle.index()].index,
            }
            .into());
        }
        match &mut self.streams[handle.index()].kind {
            StreamKind::Audio(p) => Ok(p),
            StreamKind::Video(_) => unreachable!("AudioStreamHandle always addresses an audio stream"),
        }
    }

    pub fn frame_count(&self, handle: VideoStreamHandle) -> u64 {
        self.streams[handle.index()].frame_count
    }

    pub fn audio_total_bytes(&self, handle: AudioStreamHandle) -> u64 {
        self.streams[handle.index()].total_data_size
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    // ── First-write transition (§4.3.2) ──────────────────────────────────────

    fn prepare_for_writing(&mut self) -> Result<()> {
        for s in &mut self.streams {
            s.freeze();
        }

        let riff_item = self.riff.open_list(format::AVI_, format::RIFF)?;
        self.current_riff = Some(riff_item);
        self.is_first_riff = true;

        self.header = Some(self.write_header_list()?);

        let movi_item = self.riff.open_std_list(format::MOVI)?;
        self.current_movi = Some(movi_item);

        self.riff_threshold = format::FIRST_RIFF_SIZE_THRESHOLD;
        self.started = true;
        trace!(streams = self.streams.len(), "prepare_for_writing complete");
        Ok(())
    }

    fn first_video_dims(&self) -> (u32, u32) {
        for s in &self.streams {
            if let StreamKind::Video(v) = &s.kind {
                return (v.width, v.height);
            }
        }
        (0, 0)
    }

    fn write_header_list(&mut self) -> Result<HeaderLayout> {
        let hdrl_item = self.riff.open_std_list(format::HDRL)?;

        let avih_item = self.riff.open_chunk(format::AVIH, Some(format::AVIH_SIZE))?;
        let avih_data_start = avih_item.data_start();
        let (width, height) = self.first_video_dims();
        let flags = format::AVIF_ISINTERLEAVED
            | format::AVIF_TRUSTCKTYPE
            | if self.config.emit_index1 {
                format::AVIF_HASINDEX
            } else {
                0
            };
        self.riff
            .write_u32(self.config.frame_rate.microseconds_per_frame())?; // dwMicroSecPerFrame
        self.riff.write_u32(0)?; // dwMaxBytesPerSec, patched at close
        self.riff.write_u32(0)?; // dwPaddingGranularity
        self.riff.write_u32(flags)?; // dwFlags
        self.riff.write_u32(0)?; // dwTotalFrames, patched at close
        self.riff.write_u32(0)?; // dwInitialFrames
        self.riff.write_u32(self.streams.len() as u32)?; // dwStreams
        self.riff.write_u32(0)?; // dwSuggestedBufferSize
        self.riff.write_u32(width)?;
        self.riff.write_u32(height)?;
        self.riff.write_u32(0)?;
        self.riff.write_u32(0)?;
        self.riff.write_u32(0)?;
        self.riff.write_u32(0)?; // dwReserved[4]
        self.riff.close_item(avih_item)?;

        let mut stream_layouts = Vec::with_capacity(self.streams.len());
        for i in 0..self.streams.len() {
            stream_layouts.push(self.write_strl(i)?);
        }

        let odml_item = self.riff.open_std_list(format::ODML)?;
        let dmlh_item = self.riff.open_chunk(format::DMLH, Some(format::DMLH_SIZE))?;
        let dmlh_data_start = dmlh_item.data_start();
        self.riff.write_u32(0)?; // dwGrandFrames, patched at close
        self.riff.skip_bytes(64)?;
        self.riff.close_item(dmlh_item)?;
        self.riff.close_item(odml_item)?;

        // Trailing JUNK placeholder (§4.3.3): the super-index chunks above
        // already reserve their full 256-slot capacity up front, so nothing
        // in the header list ever changes size between the initial write
        // and the close-time rewrite. This chunk exists to keep the layout
        // inventory explicit and to give external tools a conventional,
        // zero-length extension point, matching real AVI files that carry
        // small JUNK padding chunks. See DESIGN.md for why it is zero-length.
        let junk_item = self.riff.open_chunk(format::JUNK, Some(0))?;
        self.riff.close_item(junk_item)?;

        self.riff.close_item(hdrl_item)?;

        Ok(HeaderLayout {
            avih_data_start,
            dmlh_data_start,
            stream_layouts,
        })
    }

    fn write_strl(&mut self, stream_idx: usize) -> Result<StreamHeaderLayout> {
        let strl_item = self.riff.open_std_list(format::STRL)?;

        let strh_item = self.riff.open_chunk(format::STRH, Some(format::STRH_SIZE))?;
        let strh_data_start = strh_item.data_start();
        match &self.streams[stream_idx].kind {
            StreamKind::Video(v) => {
                let codec = v.codec;
                let (w, h) = (v.width, v.height);
                self.riff.write_tag(format::VIDS)?;
                self.riff.write_tag(codec)?;
                self.riff.write_u32(0)?; // dwFlags
                self.riff.write_u16(0)?; // wPriority
                self.riff.write_u16(0)?; // wLanguage
                self.riff.write_u32(0)?; // dwInitialFrames
                self.riff.write_u32(self.config.frame_rate.denominator)?; // dwScale
                self.riff.write_u32(self.config.frame_rate.numerator)?; // dwRate
                self.riff.write_u32(0)?; // dwStart
                self.riff.write_u32(0)?; // dwLength, patched at close
                self.riff.write_u32(0)?; // dwSuggestedBufferSize, patched at close
                self.riff.write_u32(0)?; // dwQuality
                self.riff.write_u32(0)?; // dwSampleSize
                self.riff.write_i16(0)?;
                self.riff.write_i16(0)?;
                self.riff.write_i16(w as i16)?;
                self.riff.write_i16(h as i16)?;
            }
            StreamKind::Audio(a) => {
                let (block_align, bytes_per_second) = (a.block_align, a.bytes_per_second);
                self.riff.write_tag(format::AUDS)?;
                self.riff.write_u32(0)?; // fccHandler
                self.riff.write_u32(0)?; // dwFlags
                self.riff.write_u16(0)?;
                self.riff.write_u16(0)?;
                self.riff.write_u32(0)?; // dwInitialFrames
                self.riff.write_u32(block_align as u32)?; // dwScale = granularity
                self.riff.write_u32(bytes_per_second)?; // dwRate
                self.riff.write_u32(0)?; // dwStart
                self.riff.write_u32(0)?; // dwLength, patched at close (bytes)
                self.riff.write_u32(bytes_per_second / 2)?; // dwSuggestedBufferSize
                self.riff.write_u32(0xFFFF_FFFF)?; // dwQuality = -1
                self.riff.write_u32(block_align as u32)?; // dwSampleSize
                self.riff.write_i16(0)?;
                self.riff.write_i16(0)?;
                self.riff.write_i16(0)?;
                self.riff.write_i16(0)?;
            }
        }
        self.riff.close_item(strh_item)?;

        self.write_strf(stream_idx)?;

        if let Some(name) = self.streams[stream_idx].name.clone() {
            let size = name.len() as u32 + 1;
            let strn_item = self.riff.open_chunk(format::STRN, Some(size))?;
            self.riff.write_bytes(name.as_bytes())?;
            self.riff.write_u8(0)?;
            self.riff.close_item(strn_item)?;
        }

        let indx_size =
            format::INDEX_HEADER_SIZE + format::MAX_SUPER_INDEX_ENTRIES as u32 * format::SUPER_INDEX_ENTRY_SIZE;
        let indx_item = self.riff.open_chunk(format::INDX, Some(indx_size))?;
        let indx_data_start = indx_item.data_start();
        let chunk_id = self.streams[stream_idx].chunk_id.expect("frozen before write_strl");
        self.riff.write_u16(4)?; // wLongsPerEntry (4 DWORDs = 16 bytes/entry)
        self.riff.write_u8(0)?; // bIndexSubType
        self.riff.write_u8(format::AVI_INDEX_OF_INDEXES)?; // bIndexType
        self.riff.write_u32(0)?; // nEntriesInUse, patched at close
        self.riff.write_tag(chunk_id)?; // dwChunkId
        self.riff.write_u32(0)?;
        self.riff.write_u32(0)?;
        self.riff.write_u32(0)?; // dwReserved[3]
        self.riff.skip_bytes(
            format::MAX_SUPER_INDEX_ENTRIES as u64 * format::SUPER_INDEX_ENTRY_SIZE as u64,
        )?;
        self.riff.close_item(indx_item)?;

        self.riff.close_item(strl_item)?;

        Ok(StreamHeaderLayout {
            strh_data_start,
            indx_data_start,
        })
    }

    fn write_strf(&mut self, stream_idx: usize) -> Result<()> {
        match &self.streams[stream_idx].kind {
            StreamKind::Video(v) => {
                let (width, height, bpp, codec) = (v.width, v.height, v.bits_per_pixel, v.codec);
                let palette = bpp == 8 && v.is_uncompressed();
                let size = format::STRF_VIDEO_SIZE
                    + if palette {
                        format::STRF_VIDEO_PALETTE_SIZE
                    } else {
                        0
                    };
                let item = self.riff.open_chunk(format::STRF, Some(size))?;
                self.riff.write_u32(format::STRF_VIDEO_SIZE)?; // biSize
                self.riff.write_u32(width)?;
                self.riff.write_u32(height)?;
                self.riff.write_u16(1)?; // biPlanes
                self.riff.write_u16(bpp)?;
                self.riff.write_u32(codec.as_u32())?; // biCompression
                self.riff
                    .write_u32(width * height * bpp as u32 / 8)?; // biSizeImage
                self.riff.write_u32(0)?; // biXPelsPerMeter
                self.riff.write_u32(0)?; // biYPelsPerMeter
                self.riff.write_u32(0)?; // biClrUsed
                self.riff.write_u32(0)?; // biClrImportant
                if palette {
                    for i in 0..256u32 {
                        self.riff.write_bytes(&[i as u8, i as u8, i as u8, 0])?;
                    }
                }
                self.riff.close_item(item)?;
            }
            StreamKind::Audio(a) => {
                let extra = a.format_specific_data.clone();
                let size = format::STRF_AUDIO_FIXED_SIZE + 2 + extra.len() as u32;
                let item = self.riff.open_chunk(format::STRF, Some(size))?;
                self.riff.write_u16(a.format_tag)?;
                self.riff.write_u16(a.channels)?;
                self.riff.write_u32(a.samples_per_second)?;
                self.riff.write_u32(a.bytes_per_second)?;
                self.riff.write_u16(a.block_align)?;
                self.riff.write_u16(a.bits_per_sample)?;
                self.riff.write_u16(extra.len() as u16)?; // cbSize
                if !extra.is_empty() {
                    self.riff.write_bytes(&extra)?;
                }
                self.riff.close_item(item)?;
            }
        }
        Ok(())
    }

    // ── Writing a data unit (§4.3.6) ─────────────────────────────────────────

    pub fn write_video_frame(
        &mut self,
        handle: VideoStreamHandle,
        is_key_frame: bool,
        data: &[u8],
    ) -> Result<()> {
        self.write_stream_data(handle.index(), is_key_frame, data)
    }

    /// Audio blocks are always key frames (§4.3.6).
    pub fn write_audio_block(&mut self, handle: AudioStreamHandle, data: &[u8]) -> Result<()> {
        self.write_stream_data(handle.index(), true, data)
    }

    fn write_stream_data(&mut self, stream_idx: usize, is_key_frame: bool, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(AviError::AlreadyClosed.into());
        }
        if !self.started {
            self.prepare_for_writing()?;
        }

        // §4.3.6 step 2: the super-index capacity check is unconditional on
        // every write, independent of whether a flush happens to be due
        // this call — a stream that has already exhausted its 256 slots
        // must fail here rather than silently accumulating a tail
        // `standard_index` that would overflow the super-index later,
        // whether at the next flush or at `close()`.
        if self.streams[stream_idx].super_index.len() >= format::MAX_SUPER_INDEX_ENTRIES {
            return Err(AviError::SuperIndexFull {
                index: self.streams[stream_idx].index,
                max: format::MAX_SUPER_INDEX_ENTRIES,
            }
            .into());
        }

        if self.should_flush_stream_index(stream_idx) {
            self.flush_stream_index(stream_idx)?;
        }

        let legacy_due = self.config.emit_index1 && self.is_first_riff;
        let mut approx_next_size = data.len() as u64;
        if legacy_due {
            approx_next_size += format::IDX1_ENTRY_SIZE as u64;
        }
        self.create_new_riff_if_needed(approx_next_size)?;

        let data_len = u32::try_from(data.len()).map_err(|_| AviError::ChunkTooLarge {
            size: data.len() as u64,
            max: u32::MAX as u64,
        })?;
        let chunk_id = self.streams[stream_idx]
            .chunk_id
            .expect("stream frozen by prepare_for_writing");
        let item = self.riff.open_chunk(chunk_id, Some(data_len))?;
        self.riff.write_bytes(data)?;
        self.riff.close_item(item)?;

        let size_with_flag = if is_key_frame {
            data_len
        } else {
            data_len | format::INDEX_NONKEY_FLAG
        };

        {
            let stream = &mut self.streams[stream_idx];
            stream.frame_count += 1;
            stream.max_chunk_data_size = stream.max_chunk_data_size.max(data_len);
            stream.total_data_size += data.len() as u64;
            stream.standard_index.push(StandardIndexEntry {
                data_offset: item.data_start(),
                data_size: size_with_flag,
            });
        }

        if legacy_due {
            let movi_data_start = self.current_movi.expect("movi open").data_start();
            let offset_rel_movi = (item.item_start() - movi_data_start) as u32;
            self.streams[stream_idx].legacy_index.push(LegacyIndexEntry {
                chunk_id,
                is_key: is_key_frame,
                offset_rel_movi,
                data_size: size_with_flag,
            });
        }

        Ok(())
    }

    // ── RIFF segmentation (§4.3.7) ───────────────────────────────────────────

    fn create_new_riff_if_needed(&mut self, approx_next_size: u64) -> Result<()> {
        let riff_item = self.current_riff.expect("writer started");
        let mut estimated = self.riff.position() + approx_next_size - riff_item.item_start();
        if self.is_first_riff && self.config.emit_index1 {
            let legacy_count: u64 = self.streams.iter().map(|s| s.legacy_index.len() as u64).sum();
            estimated += format::ITEM_HEADER_SIZE + legacy_count * format::IDX1_ENTRY_SIZE as u64;
        }

        if estimated <= self.riff_threshold {
            return Ok(());
        }

        trace!(estimated, threshold = self.riff_threshold, "rolling over to a new RIFF");

        let movi_item = self.current_movi.take().expect("movi open");
        self.riff.close_item(movi_item)?;

        if self.is_first_riff {
            self.finish_first_riff()?;
        }

        self.riff.close_item(riff_item)?;

        let new_riff = self.riff.open_list(format::AVIX, format::RIFF)?;
        self.current_riff = Some(new_riff);
        self.is_first_riff = false;
        self.riff_threshold = format::SUBSEQUENT_RIFF_SIZE_THRESHOLD;

        let new_movi = self.riff.open_std_list(format::MOVI)?;
        self.current_movi = Some(new_movi);
        Ok(())
    }

    // ── Standard-index flush policy (§4.3.8) ─────────────────────────────────

    fn should_flush_stream_index(&self, stream_idx: usize) -> bool {
        let s = &self.streams[stream_idx];
        if s.standard_index.len() >= format::MAX_STANDARD_INDEX_ENTRIES {
            return true;
        }
        if let Some(first) = s.standard_index.first() {
            let cur = self.riff.position();
            if cur.saturating_sub(first.data_offset) > u32::MAX as u64 {
                return true;
            }
        }
        false
    }

    fn flush_stream_index(&mut self, stream_idx: usize) -> Result<()> {
        let entries_len = self.streams[stream_idx].standard_index.len();
        if entries_len == 0 {
            return Ok(());
        }
        // §3 invariant "superIndex.size <= 256": guarded here too, not just
        // in the write path (avi.rs write_stream_data), so a tail flush at
        // close() on an already-exhausted super-index fails loudly instead
        // of pushing a 257th entry that `rewrite_header` would later index
        // out of bounds against the fixed 256-slot header reservation.
        if self.streams[stream_idx].super_index.len() >= format::MAX_SUPER_INDEX_ENTRIES {
            return Err(AviError::SuperIndexFull {
                index: self.streams[stream_idx].index,
                max: format::MAX_SUPER_INDEX_ENTRIES,
            }
            .into());
        }
        let index_size = format::INDEX_HEADER_SIZE + entries_len as u32 * format::STANDARD_INDEX_ENTRY_SIZE;
        self.create_new_riff_if_needed(index_size as u64)?;

        let index_chunk_id = self.streams[stream_idx].standard_index_chunk_id();
        let data_chunk_id = self.streams[stream_idx].chunk_id.expect("frozen");
        let base_offset = self.streams[stream_idx].standard_index[0].data_offset;
        let entries = self.streams[stream_idx].standard_index.clone();

        let item = self.riff.open_chunk(index_chunk_id, Some(index_size))?;
        self.riff.write_u16(2)?; // wLongsPerEntry (2 DWORDs = 8 bytes/entry)
        self.riff.write_u8(0)?; // bIndexSubType
        self.riff.write_u8(format::AVI_INDEX_OF_CHUNKS)?; // bIndexType
        self.riff.write_u32(entries.len() as u32)?;
        self.riff.write_tag(data_chunk_id)?;
        self.riff.write_u64(base_offset)?;
        self.riff.write_u32(0)?; // dwReserved
        for e in &entries {
            self.riff.write_u32((e.data_offset - base_offset) as u32)?;
            self.riff.write_u32(e.data_size)?;
        }
        self.riff.close_item(item)?;

        let stream = &mut self.streams[stream_idx];
        stream.super_index.push(SuperIndexEntry {
            chunk_offset: item.item_start(),
            chunk_size: index_size,
            duration: entries.len() as u32,
        });
        stream.standard_index.clear();
        Ok(())
    }

    // ── Legacy idx1 emission (§4.3.9) ────────────────────────────────────────

    fn finish_first_riff(&mut self) -> Result<()> {
        self.riff_avi_frame_count = self
            .streams
            .iter()
            .filter(|s| matches!(s.kind, StreamKind::Video(_)))
            .map(|s| s.frame_count)
            .max()
            .unwrap_or(0) as u32;

        if self.config.emit_index1 {
            self.emit_idx1()?;
        }
        Ok(())
    }

    fn emit_idx1(&mut self) -> Result<()> {
        let mut merged: Vec<LegacyIndexEntry> = self
            .streams
            .iter()
            .flat_map(|s| s.legacy_index.iter().copied())
            .collect();
        // Each stream's own list is already ascending (pushed in write order
        // with monotone offsets); a stable sort over the union is therefore
        // equivalent to a k-way merge.
        merged.sort_by_key(|e| e.offset_rel_movi);

        let size = merged.len() as u32 * format::IDX1_ENTRY_SIZE;
        let item = self.riff.open_chunk(format::IDX1, Some(size))?;
        for e in &merged {
            self.riff.write_tag(e.chunk_id)?;
            let flags = if e.is_key { format::AVIIF_KEYFRAME } else { 0 };
            self.riff.write_u32(flags)?;
            self.riff.write_u32(e.offset_rel_movi)?;
            self.riff.write_u32(e.data_size)?;
        }
        self.riff.close_item(item)?;
        Ok(())
    }

    // ── Close (§4.3.10) ──────────────────────────────────────────────────────

    /// Flushes pending indices, closes the final RIFF, and rewrites the
    /// header in place with final counts. Returns the underlying sink when
    /// `leave_open` is set, `None` otherwise.
    pub fn close(mut self) -> Result<Option<W>> {
        if self.closed {
            return Err(AviError::AlreadyClosed.into());
        }

        if self.started {
            for i in 0..self.streams.len() {
                if !self.streams[i].standard_index.is_empty() {
                    self.flush_stream_index(i)?;
                }
            }

            let movi_item = self.current_movi.take().expect("movi open");
            self.riff.close_item(movi_item)?;

            if self.is_first_riff {
                self.finish_first_riff()?;
            }

            let riff_item = self.current_riff.take().expect("riff open");
            self.riff.close_item(riff_item)?;

            self.rewrite_header()?;
        } else {
            warn!("close() called without writing any frames; producing an empty sink");
        }

        self.closed = true;
        self.riff.flush()?;

        if self.config.leave_open {
            Ok(Some(self.riff.into_inner()))
        } else {
            Ok(None)
        }
    }

    fn rewrite_header(&mut self) -> Result<()> {
        let header = self.header.take().expect("header written during prepare_for_writing");

        let total_max_chunk: u64 = self.streams.iter().map(|s| s.max_chunk_data_size as u64).sum();
        let fps = self.config.frame_rate.as_f64();
        let max_bytes_per_sec = (fps * total_max_chunk as f64).round() as u32;
        self.riff.patch_u32_at(header.avih_data_start + 4, max_bytes_per_sec)?;
        self.riff.patch_u32_at(header.avih_data_start + 16, self.riff_avi_frame_count)?;

        let grand_frames = self
            .streams
            .iter()
            .filter(|s| matches!(s.kind, StreamKind::Video(_)))
            .map(|s| s.frame_count)
            .max()
            .unwrap_or(0) as u32;
        self.riff.patch_u32_at(header.dmlh_data_start, grand_frames)?;

        for (i, layout) in header.stream_layouts.iter().enumerate() {
            let length = match &self.streams[i].kind {
                StreamKind::Video(_) => self.streams[i].frame_count as u32,
                // Audio strh.length is stored in bytes, not blocks, despite
                // sampleSize=granularity — matches observed AVI practice (§9
                // open question); preserved for byte-compatibility.
                StreamKind::Audio(_) => self.streams[i].total_data_size as u32,
            };
            self.riff.patch_u32_at(layout.strh_data_start + 32, length)?;

            let suggested_buffer_size = match &self.streams[i].kind {
                StreamKind::Video(_) => self.streams[i].max_chunk_data_size,
                StreamKind::Audio(a) => a.bytes_per_second / 2,
            };
            self.riff
                .patch_u32_at(layout.strh_data_start + 36, suggested_buffer_size)?;

            self.riff
                .patch_u32_at(layout.indx_data_start + 4, self.streams[i].super_index.len() as u32)?;

            let mut entries_buf = vec![
                0u8;
                format::MAX_SUPER_INDEX_ENTRIES * format::SUPER_INDEX_ENTRY_SIZE as usize
            ];
            for (j, e) in self.streams[i].super_index.iter().enumerate() {
                let off = j * format::SUPER_INDEX_ENTRY_SIZE as usize;
                entries_buf[off..off + 8].copy_from_slice(&e.chunk_offset.to_le_bytes());
                entries_buf[off + 8..off + 12].copy_from_slice(&e.chunk_size.to_le_bytes());
                entries_buf[off + 12..off + 16].copy_from_slice(&e.duration.to_le_bytes());
            }
            self.riff
                .patch_bytes_at(layout.indx_data_start + format::INDEX_HEADER_SIZE as u64, &entries_buf)?;
        }

        Ok(())
    }
}
