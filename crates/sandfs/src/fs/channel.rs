//! Seekable byte channels over in-memory file content.

// RwLock.read()/write().unwrap() only panics on lock poisoning (prior panic
// while holding lock). This is intentional - corrupted state should not propagate.
#![allow(clippy::unwrap_used)]

use std::fmt;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use super::memory::NodeData;
use crate::config::DEFAULT_MAX_FILE_SIZE;

/// A readable, writable, seekable channel returned by `new_byte_channel`.
///
/// The caller owns the channel. It is closed by [`SeekableChannel::close`] or
/// when dropped.
pub trait SeekableChannel: Read + Write + Seek + Send + fmt::Debug {
    /// Current size of the underlying file.
    fn size(&self) -> io::Result<u64>;

    /// Shrink the file to `size` bytes. Larger sizes leave it unchanged.
    fn truncate(&mut self, size: u64) -> io::Result<()>;

    /// Current position.
    fn position(&self) -> u64;

    fn is_open(&self) -> bool;

    /// Close the channel. Closing twice is a no-op.
    fn close(&mut self) -> io::Result<()>;
}

type CloseHook = Box<dyn FnOnce() + Send>;

/// Channel over a file node of [`super::MemoryFs`].
pub struct MemoryChannel {
    data: Arc<RwLock<NodeData>>,
    position: u64,
    readable: bool,
    writable: bool,
    append: bool,
    open: bool,
    max_size: u64,
    on_close: Option<CloseHook>,
}

impl MemoryChannel {
    pub(crate) fn new(
        data: Arc<RwLock<NodeData>>,
        readable: bool,
        writable: bool,
        append: bool,
    ) -> Self {
        Self {
            data,
            position: 0,
            readable,
            writable,
            append,
            open: true,
            max_size: DEFAULT_MAX_FILE_SIZE,
            on_close: None,
        }
    }

    /// Refuse writes that would grow the file beyond `bytes`.
    pub(crate) fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    /// Run `hook` once when the channel closes.
    pub(crate) fn on_close(mut self, hook: CloseHook) -> Self {
        self.on_close = Some(hook);
        self
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(io::Error::other("channel is closed"))
        }
    }

    fn ensure_writable(&self) -> io::Result<()> {
        self.ensure_open()?;
        if self.writable {
            Ok(())
        } else {
            Err(io::Error::new(
                ErrorKind::PermissionDenied,
                "channel is not open for writing",
            ))
        }
    }
}

impl fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("position", &self.position)
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .field("append", &self.append)
            .field("open", &self.open)
            .field("max_size", &self.max_size)
            .field("delete_on_close", &self.on_close.is_some())
            .finish()
    }
}

impl Read for MemoryChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_open()?;
        if !self.readable {
            return Err(io::Error::new(
                ErrorKind::PermissionDenied,
                "channel is not open for reading",
            ));
        }
        let mut data = self.data.write().unwrap();
        data.attrs.accessed = SystemTime::now();
        let len = data.content.len() as u64;
        if self.position >= len {
            return Ok(0);
        }
        let start = self.position as usize;
        let n = buf.len().min(data.content.len() - start);
        buf[..n].copy_from_slice(&data.content[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for MemoryChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_writable()?;
        let mut data = self.data.write().unwrap();
        if self.append {
            self.position = data.content.len() as u64;
        }
        let end = self
            .position
            .checked_add(buf.len() as u64)
            .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "write position overflows"))?;
        if end > self.max_size && end > data.content.len() as u64 {
            return Err(io::Error::new(
                ErrorKind::FileTooLarge,
                format!("file size limit exceeded: {end} > {}", self.max_size),
            ));
        }
        let start = usize::try_from(self.position)
            .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "write position overflows"))?;
        let end = start + buf.len();
        if data.content.len() < end {
            let additional = end - data.content.len();
            data.content
                .try_reserve(additional)
                .map_err(|e| io::Error::new(ErrorKind::OutOfMemory, e.to_string()))?;
            data.content.resize(end, 0);
        }
        data.content[start..end].copy_from_slice(buf);
        data.attrs.modified = SystemTime::now();
        self.position = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ensure_open()
    }
}

impl Seek for MemoryChannel {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.ensure_open()?;
        let (base, offset) = match pos {
            SeekFrom::Start(n) => {
                self.position = n;
                return Ok(n);
            }
            SeekFrom::End(offset) => (self.size()?, offset),
            SeekFrom::Current(offset) => (self.position, offset),
        };
        let target = base.checked_add_signed(offset).ok_or_else(|| {
            io::Error::new(ErrorKind::InvalidInput, "seek to a negative position")
        })?;
        self.position = target;
        Ok(target)
    }
}

impl SeekableChannel for MemoryChannel {
    fn size(&self) -> io::Result<u64> {
        self.ensure_open()?;
        Ok(self.data.read().unwrap().content.len() as u64)
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.ensure_writable()?;
        let mut data = self.data.write().unwrap();
        if size < data.content.len() as u64 {
            data.content.truncate(size as usize);
            data.attrs.modified = SystemTime::now();
        }
        self.position = self.position.min(size);
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> io::Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        if let Some(hook) = self.on_close.take() {
            hook();
        }
        Ok(())
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
