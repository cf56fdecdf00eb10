//! Synchronous `Read + Seek` view over an async [`RangeReader`].
//!
//! The `tiff` decoder pulls bytes through `std::io::Read`. This adapter turns
//! each read into a range request driven to completion on a captured runtime
//! handle. It must only be used from blocking threads (e.g. inside
//! `tokio::task::spawn_blocking`), never from an async task.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use tokio::runtime::Handle;

use super::RangeReader;

/// Blocking cursor over a shared range reader.
pub struct BlockingReader<R> {
    inner: Arc<R>,
    handle: Handle,
    position: u64,
}

impl<R: RangeReader> BlockingReader<R> {
    /// Create a cursor positioned at the start of the resource.
    pub fn new(inner: Arc<R>, handle: Handle) -> Self {
        Self {
            inner,
            handle,
            position: 0,
        }
    }

    /// Current cursor position.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<R> Clone for BlockingReader<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            handle: self.handle.clone(),
            position: self.position,
        }
    }
}

impl<R: RangeReader> Read for BlockingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.inner.size().saturating_sub(self.position);
        let len = (buf.len() as u64).min(remaining) as usize;
        if len == 0 {
            return Ok(0);
        }

        let bytes = self
            .handle
            .block_on(self.inner.read_exact_at(self.position, len))
            .map_err(io::Error::other)?;

        buf[..bytes.len()].copy_from_slice(&bytes);
        self.position += bytes.len() as u64;
        Ok(bytes.len())
    }
}

impl<R: RangeReader> Seek for BlockingReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.inner.size().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };

        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )),
        }
    }
}
