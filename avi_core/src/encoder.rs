//! Encoder adapters (§4.4): the traits a caller implements to hand raw
//! frames/samples to the writer, the buffer-owning wrappers built on top of
//! them, and the asynchronous FIFO variant (§9 "a queue and a dedicated
//! worker").
//!
//! Mirrors the teacher's `Codec` trait split between a synchronous
//! implementation and a thin wrapper that owns the scratch buffer, except
//! here encoding produces bytes to hand to the multiplexer rather than
//! bytes to hand to a block writer.

use std::io::{Seek, Write};
use std::sync::mpsc;
use std::thread;

use anyhow::Result;

use crate::avi::AviWriter;
use crate::fourcc::FourCC;
use crate::stream::{
    AudioStreamHandle, AudioStreamParams, VideoStreamHandle, VideoStreamParams,
};

/// Encodes one raw video frame into the bytes that go in its `"##db"`/`"##dc"`
/// chunk (§4.4.1).
///
/// The attribute accessors (`codec`, `bits_per_pixel`, `max_encoded_size`)
/// are what an [`EncodingVideoStream`] reads to build the stream's own
/// metadata, so the two can never disagree about what was declared.
pub trait VideoEncoder: Send {
    /// Codec FourCC recorded in `strh.fccHandler`/`strf.biCompression`.
    fn codec(&self) -> FourCC;
    /// Declared bits-per-pixel; must be one of 8, 16, 24, 32.
    fn bits_per_pixel(&self) -> u16;
    /// Upper bound on `encode`'s output length, for callers that want to
    /// size a destination buffer up front.
    fn max_encoded_size(&self) -> usize;

    /// Encodes `raw` (caller-defined layout, e.g. packed RGB24 or planar
    /// YUV) into `out`, appending rather than clearing it first, and
    /// returns whether the result is a key frame.
    fn encode(&mut self, raw: &[u8], out: &mut Vec<u8>) -> Result<bool>;
}

/// Encodes one raw audio block into the bytes that go in its `"##wb"` chunk
/// (§4.4.2).
pub trait AudioEncoder: Send {
    fn channels(&self) -> u16;
    fn samples_per_second(&self) -> u32;
    fn bits_per_sample(&self) -> u16;
    fn format_tag(&self) -> u16;
    fn bytes_per_second(&self) -> u32;
    /// Granularity / block align.
    fn granularity(&self) -> u16;
    /// Trailing format-specific bytes appended to `strf`, if any.
    fn format_specific_data(&self) -> &[u8] {
        &[]
    }

    /// Upper bound on `encode`'s output length for `src_len` input bytes.
    fn max_encoded_length(&self, src_len: usize) -> usize;

    fn encode(&mut self, raw: &[u8], out: &mut Vec<u8>) -> Result<()>;

    /// Flushes any residual buffered bytes the encoder hasn't emitted yet
    /// (e.g. a partially filled MP3 frame). Called once, at close. Default:
    /// nothing to flush.
    fn flush(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let _ = out;
        Ok(())
    }
}

/// Builds the [`VideoStreamParams`] this encoder declares (§4.4.3: the
/// wrapper's metadata delegates to the encoder rather than being set
/// independently by the caller).
fn video_params_from_encoder(encoder: &impl VideoEncoder, width: u32, height: u32) -> VideoStreamParams {
    VideoStreamParams::new(width, height, encoder.bits_per_pixel(), encoder.codec())
}

fn audio_params_from_encoder(encoder: &impl AudioEncoder) -> AudioStreamParams {
    AudioStreamParams {
        channels: encoder.channels(),
        samples_per_second: encoder.samples_per_second(),
        bits_per_sample: encoder.bits_per_sample(),
        format_tag: encoder.format_tag(),
        bytes_per_second: encoder.bytes_per_second(),
        block_align: encoder.granularity(),
        format_specific_data: encoder.format_specific_data().to_vec(),
    }
}

/// A scratch buffer that grows by doubling (§4.4.3), so steady-state
/// encoding after the first few frames never reallocates.
#[derive(Debug, Default)]
struct GrowBuffer {
    buf: Vec<u8>,
}

impl GrowBuffer {
    fn encode_with<E>(&mut self, raw: &[u8], mut f: impl FnMut(&[u8], &mut Vec<u8>) -> Result<E>) -> Result<E> {
        self.buf.clear();
        if self.buf.capacity() == 0 {
            self.buf.reserve(raw.len().max(64));
        }
        let result = f(raw, &mut self.buf)?;
        Ok(result)
    }

    fn grow_if_needed(&mut self) {
        // Doubling happens implicitly via Vec::push/extend reallocation;
        // this just pre-reserves so a run of same-sized frames settles at
        // a stable capacity after the first reallocation instead of
        // reallocating every call for slowly increasing frame sizes.
        if self.buf.len() * 2 > self.buf.capacity() {
            self.buf.reserve(self.buf.capacity().max(64));
        }
    }
}

/// Owns a [`VideoEncoder`] and the scratch buffer it encodes into, then
/// writes the result straight to an [`AviWriter`] (§4.4.3).
pub struct EncodingVideoStream<E: VideoEncoder> {
    encoder: E,
    handle: VideoStreamHandle,
    scratch: GrowBuffer,
}

impl<E: VideoEncoder> EncodingVideoStream<E> {
    pub fn new(handle: VideoStreamHandle, encoder: E) -> Self {
        Self {
            encoder,
            handle,
            scratch: GrowBuffer::default(),
        }
    }

    /// Registers a video stream on `writer` using the encoder's own
    /// declared attributes (codec, bits-per-pixel) and wraps it, so the
    /// stream's metadata can never drift from what the encoder actually
    /// produces (§4.4.3).
    pub fn add_to<W: Write + Seek>(writer: &mut AviWriter<W>, encoder: E, width: u32, height: u32) -> Result<Self> {
        let params = video_params_from_encoder(&encoder, width, height);
        let handle = writer.add_video_stream(params)?;
        Ok(Self::new(handle, encoder))
    }

    /// Encodes `raw` and writes the result as the next frame of the
    /// underlying stream.
    pub fn write_frame<W: Write + Seek>(&mut self, writer: &mut AviWriter<W>, raw: &[u8]) -> Result<()> {
        let encoder = &mut self.encoder;
        let is_key = self.scratch.encode_with(raw, |raw, out| encoder.encode(raw, out))?;
        self.scratch.grow_if_needed();
        writer.write_video_frame(self.handle, is_key, &self.scratch.buf)
    }

    pub fn handle(&self) -> VideoStreamHandle {
        self.handle
    }
}

/// Owns an [`AudioEncoder`] and the scratch buffer it encodes into (§4.4.3).
pub struct EncodingAudioStream<E: AudioEncoder> {
    encoder: E,
    handle: AudioStreamHandle,
    scratch: GrowBuffer,
}

impl<E: AudioEncoder> EncodingAudioStream<E> {
    pub fn new(handle: AudioStreamHandle, encoder: E) -> Self {
        Self {
            encoder,
            handle,
            scratch: GrowBuffer::default(),
        }
    }

    /// Registers an audio stream on `writer` using the encoder's own
    /// declared attributes and wraps it (§4.4.3).
    pub fn add_to<W: Write + Seek>(writer: &mut AviWriter<W>, encoder: E) -> Result<Self> {
        let params = audio_params_from_encoder(&encoder);
        let handle = writer.add_audio_stream(params)?;
        Ok(Self::new(handle, encoder))
    }

    pub fn write_block<W: Write + Seek>(&mut self, writer: &mut AviWriter<W>, raw: &[u8]) -> Result<()> {
        let encoder = &mut self.encoder;
        self.scratch.encode_with(raw, |raw, out| encoder.encode(raw, out))?;
        self.scratch.grow_if_needed();
        writer.write_audio_block(self.handle, &self.scratch.buf)
    }

    /// Flushes any residual bytes buffered inside the encoder and writes
    /// them as one final block (§4.4.3, §4.3.10's `finishWriting` hook).
    /// Call this for every wrapped audio stream before closing `writer`.
    pub fn finish_writing<W: Write + Seek>(&mut self, writer: &mut AviWriter<W>) -> Result<()> {
        self.scratch.buf.clear();
        self.encoder.flush(&mut self.scratch.buf)?;
        if !self.scratch.buf.is_empty() {
            writer.write_audio_block(self.handle, &self.scratch.buf)?;
        }
        Ok(())
    }

    pub fn handle(&self) -> AudioStreamHandle {
        self.handle
    }
}

/// A raw frame/block handed to the async worker, tagged with which stream
/// it belongs to and whether it is video or audio (§4.4.4, §9
/// SequentialInvoker: one worker thread, one queue, strict FIFO order).
///
/// Each job carries its own one-shot completion channel (`ack`): the worker
/// sends this entry's result down it the instant the entry has been
/// written, which is what lets `write`/`write_async` (§4.4.4) learn that
/// *this specific* entry finished rather than only that the whole queue has
/// drained.
enum Job {
    Video(VideoStreamHandle, Vec<u8>, mpsc::Sender<Result<()>>),
    Audio(AudioStreamHandle, Vec<u8>, mpsc::Sender<Result<()>>),
}

/// A handle to one submitted entry's completion (§4.4.4's `writeAsync`
/// return value): resolves once the worker has written — or failed to
/// write — that specific frame/block.
pub struct WriteHandle {
    rx: mpsc::Receiver<Result<()>>,
}

impl WriteHandle {
    /// Blocks until the entry this handle refers to has been written,
    /// returning its result. This is the "resolves when that entry
    /// completes" half of §4.4.4; `AsyncMuxer::write_video_frame`/
    /// `write_audio_block` call this immediately to get the synchronous
    /// `write` behavior from the same plumbing.
    pub fn wait(self) -> Result<()> {
        self.rx
            .recv()
            .unwrap_or_else(|_| Err(anyhow::anyhow!("async muxer worker stopped before completing this entry")))
    }
}

/// Encodes and writes frames on a dedicated worker thread, so the caller's
/// submission thread never blocks on encode or I/O latency (§4.4.4).
///
/// The worker drains its queue strictly in submission order — encoding two
/// frames out of order would corrupt the monotonically increasing indices
/// the multiplexer relies on, so there is exactly one worker, never a pool.
/// A write error stops the worker entirely (§7: an I/O error leaves the
/// writer unusable), so any job still queued behind a failed one is never
/// drained; its `WriteHandle::wait()` observes that the worker dropped its
/// `ack` sender and reports the same stoppage.
pub struct AsyncMuxer {
    tx: mpsc::Sender<Job>,
    worker: Option<thread::JoinHandle<Result<()>>>,
}

impl AsyncMuxer {
    /// Spawns the worker thread, which owns `writer` and every registered
    /// encoder for the lifetime of the muxer.
    pub fn spawn<W, VE, AE>(mut writer: AviWriter<W>, mut video: Vec<EncodingVideoStream<VE>>, mut audio: Vec<EncodingAudioStream<AE>>) -> Self
    where
        W: Write + Seek + Send + 'static,
        VE: VideoEncoder + 'static,
        AE: AudioEncoder + 'static,
    {
        let (tx, rx) = mpsc::channel::<Job>();
        let worker = thread::spawn(move || -> Result<()> {
            for job in rx {
                let (result, ack) = match job {
                    Job::Video(handle, raw, ack) => {
                        let result = match video.iter_mut().find(|s| s.handle().0 == handle.0) {
                            Some(stream) => stream.write_frame(&mut writer, &raw),
                            None => Ok(()),
                        };
                        (result, ack)
                    }
                    Job::Audio(handle, raw, ack) => {
                        let result = match audio.iter_mut().find(|s| s.handle().0 == handle.0) {
                            Some(stream) => stream.write_block(&mut writer, &raw),
                            None => Ok(()),
                        };
                        (result, ack)
                    }
                };
                let failed = result.is_err();
                let _ = ack.send(result);
                if failed {
                    return Err(anyhow::anyhow!("async muxer worker stopped after a write error"));
                }
            }
            for stream in &mut audio {
                stream.finish_writing(&mut writer)?;
            }
            writer.close()?;
            Ok(())
        });
        Self {
            tx,
            worker: Some(worker),
        }
    }

    /// Enqueues a raw video frame and returns a handle that resolves once
    /// this entry has been written (§4.4.4 `writeAsync`); returns
    /// immediately without blocking the caller.
    pub fn write_video_frame_async(&self, handle: VideoStreamHandle, raw: Vec<u8>) -> WriteHandle {
        let (ack_tx, ack_rx) = mpsc::channel();
        let _ = self.tx.send(Job::Video(handle, raw, ack_tx));
        WriteHandle { rx: ack_rx }
    }

    /// Enqueues a raw video frame and blocks until it has been written
    /// (§4.4.4 `write`).
    pub fn write_video_frame(&self, handle: VideoStreamHandle, raw: Vec<u8>) -> Result<()> {
        self.write_video_frame_async(handle, raw).wait()
    }

    /// Enqueues a raw audio block and returns a handle that resolves once
    /// this entry has been written (§4.4.4 `writeAsync`); returns
    /// immediately without blocking the caller.
    pub fn write_audio_block_async(&self, handle: AudioStreamHandle, raw: Vec<u8>) -> WriteHandle {
        let (ack_tx, ack_rx) = mpsc::channel();
        let _ = self.tx.send(Job::Audio(handle, raw, ack_tx));
        WriteHandle { rx: ack_rx }
    }

    /// Enqueues a raw audio block and blocks until it has been written
    /// (§4.4.4 `write`).
    pub fn write_audio_block(&self, handle: AudioStreamHandle, raw: Vec<u8>) -> Result<()> {
        self.write_audio_block_async(handle, raw).wait()
    }

    /// Drops the sender (closing the queue) and blocks until the worker has
    /// drained every pending job and closed the underlying writer.
    pub fn join(mut self) -> Result<()> {
        self.drop_sender();
        self.worker
            .take()
            .expect("join called at most once")
            .join()
            .expect("worker thread panicked")
    }

    fn drop_sender(&mut self) {
        let (replacement, _rx) = mpsc::channel();
        self.tx = replacement;
    }
}

impl Drop for AsyncMuxer {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.drop_sender();
            if let Some(w) = self.worker.take() {
                let _ = w.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct PassThroughVideo;
    impl VideoEncoder for PassThroughVideo {
        fn codec(&self) -> FourCC {
            FourCC(0)
        }
        fn bits_per_pixel(&self) -> u16 {
            24
        }
        fn max_encoded_size(&self) -> usize {
            usize::MAX
        }
        fn encode(&mut self, raw: &[u8], out: &mut Vec<u8>) -> Result<bool> {
            out.extend_from_slice(raw);
            Ok(true)
        }
    }

    struct PassThroughAudio;
    impl AudioEncoder for PassThroughAudio {
        fn channels(&self) -> u16 {
            1
        }
        fn samples_per_second(&self) -> u32 {
            8000
        }
        fn bits_per_sample(&self) -> u16 {
            8
        }
        fn format_tag(&self) -> u16 {
            crate::stream::WAVE_FORMAT_PCM
        }
        fn bytes_per_second(&self) -> u32 {
            8000
        }
        fn granularity(&self) -> u16 {
            1
        }
        fn max_encoded_length(&self, src_len: usize) -> usize {
            src_len
        }
        fn encode(&mut self, raw: &[u8], out: &mut Vec<u8>) -> Result<()> {
            out.extend_from_slice(raw);
            Ok(())
        }
    }

    #[test]
    fn encoding_video_stream_round_trips_through_a_writer() {
        use crate::config::AviWriterConfig;
        use crate::stream::VideoStreamParams;

        let mut writer = AviWriter::new(Cursor::new(Vec::new()), AviWriterConfig::builder(30.0).build()).unwrap();
        let handle = writer
            .add_video_stream(VideoStreamParams::uncompressed(4, 4, 24))
            .unwrap();
        let mut stream = EncodingVideoStream::new(handle, PassThroughVideo);
        stream.write_frame(&mut writer, &[1, 2, 3, 4]).unwrap();
        assert_eq!(writer.frame_count(handle), 1);
    }

    #[test]
    fn encoding_audio_stream_round_trips_through_a_writer() {
        use crate::config::AviWriterConfig;
        use crate::stream::AudioStreamParams;

        let mut writer = AviWriter::new(Cursor::new(Vec::new()), AviWriterConfig::builder(30.0).build()).unwrap();
        let handle = writer.add_audio_stream(AudioStreamParams::pcm(1, 8000, 8)).unwrap();
        let mut stream = EncodingAudioStream::new(handle, PassThroughAudio);
        stream.write_block(&mut writer, &[9, 9]).unwrap();
        assert_eq!(writer.audio_total_bytes(handle), 2);
    }

    #[test]
    fn add_to_derives_stream_params_from_the_encoder() {
        use crate::config::AviWriterConfig;

        let mut writer = AviWriter::new(Cursor::new(Vec::new()), AviWriterConfig::builder(30.0).build()).unwrap();
        let mut video = EncodingVideoStream::add_to(&mut writer, PassThroughVideo, 4, 4).unwrap();
        video.write_frame(&mut writer, &[0u8; 48]).unwrap();
        assert_eq!(writer.frame_count(video.handle()), 1);

        let mut audio = EncodingAudioStream::add_to(&mut writer, PassThroughAudio).unwrap();
        audio.write_block(&mut writer, &[1, 2]).unwrap();
        assert_eq!(writer.audio_total_bytes(audio.handle()), 2);
    }

    struct FlushingAudio {
        residual: Vec<u8>,
    }
    impl AudioEncoder for FlushingAudio {
        fn channels(&self) -> u16 {
            1
        }
        fn samples_per_second(&self) -> u32 {
            8000
        }
        fn bits_per_sample(&self) -> u16 {
            8
        }
        fn format_tag(&self) -> u16 {
            crate::stream::WAVE_FORMAT_PCM
        }
        fn bytes_per_second(&self) -> u32 {
            8000
        }
        fn granularity(&self) -> u16 {
            1
        }
        fn max_encoded_length(&self, src_len: usize) -> usize {
            src_len
        }
        fn encode(&mut self, _raw: &[u8], _out: &mut Vec<u8>) -> Result<()> {
            // Buffers everything; nothing is emitted until flush.
            Ok(())
        }
        fn flush(&mut self, out: &mut Vec<u8>) -> Result<()> {
            out.extend_from_slice(&self.residual);
            Ok(())
        }
    }

    #[test]
    fn finish_writing_flushes_residual_bytes_as_a_final_block() {
        use crate::config::AviWriterConfig;

        let mut writer = AviWriter::new(Cursor::new(Vec::new()), AviWriterConfig::builder(30.0).build()).unwrap();
        let mut audio = EncodingAudioStream::add_to(
            &mut writer,
            FlushingAudio {
                residual: vec![7, 7, 7],
            },
        )
        .unwrap();
        audio.write_block(&mut writer, &[1, 2, 3]).unwrap();
        assert_eq!(writer.audio_total_bytes(audio.handle()), 0);

        audio.finish_writing(&mut writer).unwrap();
        assert_eq!(writer.audio_total_bytes(audio.handle()), 3);
    }

    #[test]
    fn async_muxer_drains_queue_in_order_and_closes_on_join() {
        use crate::config::AviWriterConfig;
        use crate::stream::VideoStreamParams;

        let mut writer = AviWriter::new(Cursor::new(Vec::new()), AviWriterConfig::builder(30.0).build()).unwrap();
        let handle = writer
            .add_video_stream(VideoStreamParams::uncompressed(2, 2, 8))
            .unwrap();
        let stream = EncodingVideoStream::new(handle, PassThroughVideo);
        let muxer = AsyncMuxer::spawn(writer, vec![stream], Vec::<EncodingAudioStream<PassThroughAudio>>::new());
        let handles: Vec<_> = (0..5).map(|_| muxer.write_video_frame_async(handle, vec![0u8; 4])).collect();
        for h in handles {
            h.wait().unwrap();
        }
        muxer.join().unwrap();
    }

    #[test]
    fn async_muxer_write_blocks_until_entry_is_written() {
        use crate::config::AviWriterConfig;
        use crate::stream::VideoStreamParams;

        let mut writer = AviWriter::new(Cursor::new(Vec::new()), AviWriterConfig::builder(30.0).build()).unwrap();
        let handle = writer
            .add_video_stream(VideoStreamParams::uncompressed(2, 2, 8))
            .unwrap();
        let stream = EncodingVideoStream::new(handle, PassThroughVideo);
        let muxer = AsyncMuxer::spawn(writer, vec![stream], Vec::<EncodingAudioStream<PassThroughAudio>>::new());
        for _ in 0..5 {
            muxer.write_video_frame(handle, vec![0u8; 4]).unwrap();
        }
        muxer.join().unwrap();
    }
}
