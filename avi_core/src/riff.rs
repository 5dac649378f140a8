//! The RIFF writing primitive (§4.1).
//!
//! A thin layer over a seekable byte sink: opens chunks and lists, reserves
//! the 8-byte tag+size header, and back-patches the size on close. Mirrors
//! the teacher's `Writer`/`format` split — this module owns the byte-level
//! mechanics, leaving chunk semantics (what tag goes where) to `avi.rs`.

use std::io::{Seek, SeekFrom, Write};

use tracing::trace;

use crate::error::{AviError, Result};
use crate::format::{self, ITEM_HEADER_SIZE};
use crate::fourcc::FourCC;

/// Handle returned by [`RiffWriter::open_chunk`] / [`RiffWriter::open_list`].
///
/// `item_start` is the absolute offset of the chunk's 4-byte tag; the size
/// field lives at `item_start + 4`. `data_start` is where the caller's own
/// payload begins: for a plain chunk that's `item_start + 8`; for a list
/// it's 4 bytes further, past the embedded list-type tag, since callers
/// (the standard/legacy index bookkeeping) compute offsets relative to a
/// list's *content*, not its list-type tag.
#[derive(Debug, Clone, Copy)]
pub struct RiffItem {
    pub item_start: u64,
    pub data_start: u64,
    declared_size: Option<u32>,
}

impl RiffItem {
    pub fn item_start(&self) -> u64 {
        self.item_start
    }

    pub fn data_start(&self) -> u64 {
        self.data_start
    }
}

/// Owns the byte sink and the append cursor, and provides the chunk/list
/// open-write-close primitives every higher layer is built from.
pub struct RiffWriter<W: Write + Seek> {
    sink: W,
    /// Mirrors the sink's write cursor; avoids a `stream_position()` syscall
    /// on every write.
    pos: u64,
}

impl<W: Write + Seek> RiffWriter<W> {
    pub fn new(mut sink: W) -> Result<Self> {
        let pos = sink.stream_position()?;
        Ok(Self { sink, pos })
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    fn write_raw(&mut self, buf: &[u8]) -> Result<()> {
        self.sink.write_all(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    pub fn write_tag(&mut self, tag: FourCC) -> Result<()> {
        self.write_raw(&tag.to_bytes())
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_raw(&[v])
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        self.write_raw(&v.to_le_bytes())
    }

    pub fn write_i16(&mut self, v: i16) -> Result<()> {
        self.write_raw(&v.to_le_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_raw(&v.to_le_bytes())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        self.write_raw(&v.to_le_bytes())
    }

    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.write_raw(buf)
    }

    /// Writes `n` zero bytes using a reusable 1 KiB buffer (§4.1).
    pub fn skip_bytes(&mut self, mut n: u64) -> Result<()> {
        const BUF_LEN: usize = 1024;
        let buf = [0u8; BUF_LEN];
        while n > 0 {
            let chunk = n.min(BUF_LEN as u64) as usize;
            self.write_raw(&buf[..chunk])?;
            n -= chunk as u64;
        }
        Ok(())
    }

    /// Opens a chunk: writes `tag`, then the size field (`expected_size` if
    /// given, else a zero placeholder patched on close).
    pub fn open_chunk(&mut self, tag: FourCC, expected_size: Option<u32>) -> Result<RiffItem> {
        if let Some(size) = expected_size {
            check_size_fits(size as u64)?;
        }
        let item_start = self.pos;
        self.write_tag(tag)?;
        self.write_u32(expected_size.unwrap_or(0))?;
        let data_start = self.pos;
        trace!(tag = %tag, item_start, "open_chunk");
        Ok(RiffItem {
            item_start,
            data_start,
            declared_size: expected_size,
        })
    }

    /// Opens a list: writes `outer_tag` (`"RIFF"` or `"LIST"`), a size
    /// placeholder, then `content_tag` as the first 4 bytes of the list's
    /// data (§4.1).
    pub fn open_list(&mut self, content_tag: FourCC, outer_tag: FourCC) -> Result<RiffItem> {
        let item_start = self.pos;
        self.write_tag(outer_tag)?;
        self.write_u32(0)?;
        self.write_tag(content_tag)?;
        let data_start = self.pos;
        trace!(content = %content_tag, outer = %outer_tag, item_start, "open_list");
        Ok(RiffItem {
            item_start,
            data_start,
            declared_size: None,
        })
    }

    /// Convenience for the common case of a `"LIST"`-tagged list.
    pub fn open_std_list(&mut self, content_tag: FourCC) -> Result<RiffItem> {
        self.open_list(content_tag, format::LIST)
    }

    /// Closes `item`: computes the actual payload size (from `item_start +
    /// 8`, which for a list includes its 4-byte list-type tag), validates
    /// it against any declared size, or seeks back and patches the size
    /// field. Pads to an even byte count (§4.1).
    pub fn close_item(&mut self, item: RiffItem) -> Result<()> {
        let cur = self.pos;
        let payload_start = item.item_start + ITEM_HEADER_SIZE;
        let actual = cur
            .checked_sub(payload_start)
            .expect("close_item called before item's data start");
        check_size_fits(actual)?;

        match item.declared_size {
            Some(declared) => {
                if cur != item.data_start + declared as u64 {
                    return Err(AviError::SizeMismatch {
                        declared: declared as u64,
                        actual,
                    });
                }
            }
            None => {
                self.patch_u32_at(item.item_start + 4, actual as u32)?;
            }
        }

        if cur % 2 != 0 {
            self.write_raw(&[0u8])?;
        }
        trace!(item_start = item.item_start, actual, "close_item");
        Ok(())
    }

    /// Seeks to `at`, writes `value`, then seeks back to the append cursor.
    pub fn patch_u32_at(&mut self, at: u64, value: u32) -> Result<()> {
        self.sink.seek(SeekFrom::Start(at))?;
        self.sink.write_all(&value.to_le_bytes())?;
        self.sink.seek(SeekFrom::Start(self.pos))?;
        Ok(())
    }

    /// Seeks to `at`, writes `bytes`, then seeks back to the append cursor.
    /// Used for whole-field/whole-array rewrites at close (header counts,
    /// super-index contents) where more than 4 bytes change.
    pub fn patch_bytes_at(&mut self, at: u64, bytes: &[u8]) -> Result<()> {
        self.sink.seek(SeekFrom::Start(at))?;
        self.sink.write_all(bytes)?;
        self.sink.seek(SeekFrom::Start(self.pos))?;
        Ok(())
    }

    pub fn seek_to_append_cursor(&mut self) -> Result<()> {
        self.sink.seek(SeekFrom::Start(self.pos))?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}

fn check_size_fits(size: u64) -> Result<()> {
    let max = u32::MAX as u64 - ITEM_HEADER_SIZE;
    if size > max {
        return Err(AviError::ChunkTooLarge { size, max });
    }
    Ok(())
}
