// src/stream.rs

//! Byte streams and gzip framing
//!
//! The database core reads from [`ByteStream`]: a plain reader that can
//! also report file metadata. [`GzipMultipart`] decodes a sequence of
//! concatenated gzip members from any such stream and reports member
//! boundaries to a [`MultipartHook`], which is how signature verification
//! observes the compressed sections of an archive. A hook may cancel the
//! stream; cancellation surfaces as `io::ErrorKind::Interrupted`.

use std::fs::File;
use std::io::{self, BufRead, Read, Write};
use std::path::Path;
use std::time::SystemTime;

use flate2::Compression;
use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;

/// File times reported by a stream, when known.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamMeta {
    pub mtime: Option<SystemTime>,
    pub atime: Option<SystemTime>,
}

/// A byte source with optional metadata.
pub trait ByteStream: Read {
    fn meta(&self) -> StreamMeta {
        StreamMeta::default()
    }
}

/// Local file source.
pub struct FileStream {
    file: File,
    meta: StreamMeta,
}

impl FileStream {
    pub fn open(path: impl AsRef<Path>) -> io::Result<FileStream> {
        let file = File::open(path)?;
        let meta = file
            .metadata()
            .map(|m| StreamMeta {
                mtime: m.modified().ok(),
                atime: m.accessed().ok(),
            })
            .unwrap_or_default();
        Ok(FileStream { file, meta })
    }
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl ByteStream for FileStream {
    fn meta(&self) -> StreamMeta {
        self.meta
    }
}

impl ByteStream for &[u8] {}

/// Events delivered to a multipart hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpartEvent {
    /// One gzip member ended and another follows
    Boundary,
    /// A run of compressed input was consumed
    Data,
    /// End of the whole stream
    End,
}

/// Hook verdict: keep going or cancel the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpartDecision {
    Continue,
    Cancel,
}

/// Observer of a multipart stream. All compressed bytes of a member are
/// delivered through `Data` events before its `Boundary` (or the final
/// `End`) fires.
pub trait MultipartHook {
    fn on_part(&mut self, event: MpartEvent, data: &[u8]) -> io::Result<MpartDecision>;
}

/// Hook that ignores everything.
pub struct NullHook;

impl MultipartHook for NullHook {
    fn on_part(&mut self, _event: MpartEvent, _data: &[u8]) -> io::Result<MpartDecision> {
        Ok(MpartDecision::Continue)
    }
}

fn canceled() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "stream canceled by multipart hook")
}

const TEE_BUF: usize = 8192;

/// Buffered source that reports every consumed byte range to the hook as
/// `Data`. The gzip decoder consumes exactly the bytes of the member it is
/// decoding, so the hook sees a faithful account of each member's
/// compressed payload.
struct TeeSource<R, H> {
    inner: R,
    hook: H,
    buf: Box<[u8]>,
    pos: usize,
    cap: usize,
    pending: Option<io::Error>,
}

impl<R: Read, H: MultipartHook> TeeSource<R, H> {
    fn new(inner: R, hook: H) -> Self {
        TeeSource {
            inner,
            hook,
            buf: vec![0; TEE_BUF].into_boxed_slice(),
            pos: 0,
            cap: 0,
            pending: None,
        }
    }

    fn take_pending(&mut self) -> Option<io::Error> {
        self.pending.take()
    }

    fn emit(&mut self, event: MpartEvent) -> io::Result<()> {
        match self.hook.on_part(event, &[])? {
            MpartDecision::Continue => Ok(()),
            MpartDecision::Cancel => Err(canceled()),
        }
    }
}

impl<R: Read, H: MultipartHook> Read for TeeSource<R, H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let avail = self.fill_buf()?;
        let n = avail.len().min(buf.len());
        buf[..n].copy_from_slice(&avail[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read, H: MultipartHook> BufRead for TeeSource<R, H> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos >= self.cap {
            self.pos = 0;
            self.cap = self.inner.read(&mut self.buf)?;
        }
        Ok(&self.buf[self.pos..self.cap])
    }

    fn consume(&mut self, amt: usize) {
        let end = (self.pos + amt).min(self.cap);
        if end > self.pos && self.pending.is_none() {
            match self.hook.on_part(MpartEvent::Data, &self.buf[self.pos..end]) {
                Ok(MpartDecision::Continue) => {}
                Ok(MpartDecision::Cancel) => self.pending = Some(canceled()),
                Err(e) => self.pending = Some(e),
            }
        }
        self.pos = end;
    }
}

/// Reader over a sequence of concatenated gzip members.
pub struct GzipMultipart<R, H> {
    decoder: Option<GzDecoder<TeeSource<R, H>>>,
    done: bool,
}

impl<R: Read, H: MultipartHook> GzipMultipart<R, H> {
    pub fn new(inner: R, hook: H) -> Self {
        GzipMultipart {
            decoder: Some(GzDecoder::new(TeeSource::new(inner, hook))),
            done: false,
        }
    }
}

/// Plain multi-member gunzip with no observer.
pub fn gunzip<R: Read>(inner: R) -> GzipMultipart<R, NullHook> {
    GzipMultipart::new(inner, NullHook)
}

impl<R: Read, H: MultipartHook> Read for GzipMultipart<R, H> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.done || out.is_empty() {
            return Ok(0);
        }
        loop {
            let Some(decoder) = self.decoder.as_mut() else {
                return Ok(0);
            };
            let n = decoder.read(out)?;
            if let Some(e) = decoder.get_mut().take_pending() {
                self.done = true;
                return Err(e);
            }
            if n > 0 {
                return Ok(n);
            }

            // Member finished; the remaining bytes (if any) start the
            // next member.
            let Some(taken) = self.decoder.take() else {
                return Ok(0);
            };
            let mut src = taken.into_inner();
            let more = !src.fill_buf()?.is_empty();
            if more {
                src.emit(MpartEvent::Boundary)?;
                self.decoder = Some(GzDecoder::new(src));
            } else {
                self.done = true;
                src.emit(MpartEvent::End)?;
                return Ok(0);
            }
        }
    }
}

impl<R: ByteStream, H: MultipartHook> ByteStream for GzipMultipart<R, H> {
    fn meta(&self) -> StreamMeta {
        self.decoder
            .as_ref()
            .map(|d| d.get_ref().inner.meta())
            .unwrap_or_default()
    }
}

/// Gzip-compressing writer.
pub struct GzipWriter<W: Write> {
    inner: GzEncoder<W>,
}

impl<W: Write> GzipWriter<W> {
    pub fn new(out: W) -> Self {
        GzipWriter {
            inner: GzEncoder::new(out, Compression::default()),
        }
    }

    /// Flush the trailing gzip frame and return the underlying writer.
    pub fn finish(self) -> io::Result<W> {
        self.inner.finish()
    }
}

impl<W: Write> Write for GzipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gz(data: &[u8]) -> Vec<u8> {
        let mut enc = GzipWriter::new(Vec::new());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    /// Records the event sequence; optionally cancels at a given event
    /// count.
    struct RecordingHook {
        events: Vec<(MpartEvent, usize)>,
        cancel_at: Option<usize>,
    }

    impl MultipartHook for &mut RecordingHook {
        fn on_part(&mut self, event: MpartEvent, data: &[u8]) -> io::Result<MpartDecision> {
            self.events.push((event, data.len()));
            if self.cancel_at == Some(self.events.len()) {
                return Ok(MpartDecision::Cancel);
            }
            Ok(MpartDecision::Continue)
        }
    }

    #[test]
    fn test_single_member_round_trip() {
        let compressed = gz(b"hello stream");
        let mut out = Vec::new();
        gunzip(&compressed[..]).read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello stream");
    }

    #[test]
    fn test_multi_member_concatenation() {
        let mut compressed = gz(b"first ");
        compressed.extend(gz(b"second"));
        let mut out = Vec::new();
        gunzip(&compressed[..]).read_to_end(&mut out).unwrap();
        assert_eq!(out, b"first second");
    }

    #[test]
    fn test_boundary_and_end_events() {
        let mut compressed = gz(b"aaaa");
        compressed.extend(gz(b"bbbb"));
        let mut hook = RecordingHook {
            events: Vec::new(),
            cancel_at: None,
        };
        let mut out = Vec::new();
        GzipMultipart::new(&compressed[..], &mut hook)
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"aaaabbbb");

        let kinds: Vec<MpartEvent> = hook.events.iter().map(|(e, _)| *e).collect();
        let boundaries = kinds.iter().filter(|e| **e == MpartEvent::Boundary).count();
        assert_eq!(boundaries, 1);
        assert_eq!(kinds.last(), Some(&MpartEvent::End));
        // All compressed bytes flow through Data events.
        let data_bytes: usize = hook
            .events
            .iter()
            .filter(|(e, _)| *e == MpartEvent::Data)
            .map(|(_, n)| n)
            .sum();
        assert_eq!(data_bytes, compressed.len());
    }

    #[test]
    fn test_cancellation_maps_to_interrupted() {
        let compressed = gz(b"data to cancel");
        let mut hook = RecordingHook {
            events: Vec::new(),
            cancel_at: Some(1),
        };
        let mut out = Vec::new();
        let err = GzipMultipart::new(&compressed[..], &mut hook)
            .read_to_end(&mut out)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    }

    #[test]
    fn test_garbage_input_is_invalid_data() {
        let mut out = Vec::new();
        let err = gunzip(&b"not gzip at all"[..])
            .read_to_end(&mut out)
            .unwrap_err();
        assert_ne!(err.kind(), io::ErrorKind::Interrupted);
    }
}
