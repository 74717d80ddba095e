//! Raw PCM input.
//!
//! [`AudioSource`] owns the reader for the whole feeding session. It is opened once,
//! read sequentially, and closed when the producer that owns it is dropped, which
//! covers every stop path.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};

/// Sequential byte source for headerless PCM.
pub struct AudioSource<R = BufReader<File>> {
    label: String,
    reader: R,
    bytes_read: u64,
    exhausted: bool,
}

impl AudioSource<BufReader<File>> {
    /// Open a raw PCM file for sequential reading.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {:?}", path))?;
        tracing::info!(path = %path.display(), "audio source opened");
        Ok(Self::from_reader(path.display().to_string(), BufReader::new(file)))
    }
}

impl<R: Read> AudioSource<R> {
    pub fn from_reader(label: impl Into<String>, reader: R) -> Self {
        Self {
            label: label.into(),
            reader,
            bytes_read: 0,
            exhausted: false,
        }
    }

    /// Fill `buf` from the stream.
    ///
    /// Keeps reading across short reads until `buf` is full or the stream ends, so a
    /// return value below `buf.len()` always means end of stream.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() && !self.exhausted {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => self.exhausted = true,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.bytes_read += filled as u64;
        Ok(filled)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

}

impl<R> Drop for AudioSource<R> {
    fn drop(&mut self) {
        tracing::debug!(
            source = %self.label,
            bytes_read = self.bytes_read,
            exhausted = self.exhausted,
            "audio source closed"
        );
    }
}
