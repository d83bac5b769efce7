//! Transfer item implementations.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crc::{CRC_32_ISO_HDLC, Crc};
use log::{debug, info};

use crate::core::TransferItem;

/// CRC-32 used by the `OPT CRC` extension.
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Seconds since the Unix epoch; times before it clamp to 0.
pub(crate) fn unix_seconds(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn check_offset(offset: u64, size: u64) -> io::Result<()> {
    if offset > size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("offset {} beyond end of {} byte item", offset, size),
        ));
    }
    Ok(())
}

/// An item whose content lives in memory.
#[derive(Clone)]
pub struct MemoryItem {
    name: String,
    content: Vec<u8>,
    modified_at: i64,
    cursor: u64,
}

impl MemoryItem {
    /// Create a new memory-backed item.
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>, modified_at: i64) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            modified_at,
            cursor: 0,
        }
    }

    /// Item content.
    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

impl fmt::Debug for MemoryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryItem")
            .field("name", &self.name)
            .field("size", &self.content.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl TransferItem for MemoryItem {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.content.len() as u64
    }

    fn modified_at(&self) -> i64 {
        self.modified_at
    }

    fn cursor(&self) -> u64 {
        self.cursor
    }

    fn read_chunk(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let start = self.cursor as usize;
        let end = start.saturating_add(max).min(self.content.len());
        let chunk = self.content[start..end].to_vec();
        self.cursor = end as u64;
        Ok(chunk)
    }

    fn rewind_to(&mut self, offset: u64) -> io::Result<()> {
        check_offset(offset, self.size())?;
        self.cursor = offset;
        Ok(())
    }

    fn crc32(&mut self) -> io::Result<u32> {
        Ok(CRC32.checksum(&self.content))
    }
}

/// An item backed by a file on disk.
///
/// The file is opened lazily on the first read. With
/// [`FileItem::remove_on_ack`] the file is deleted once the peer confirms it.
#[derive(Debug)]
pub struct FileItem {
    path: PathBuf,
    name: String,
    size: u64,
    modified_at: i64,
    cursor: u64,
    file: Option<File>,
    remove_on_ack: bool,
}

impl FileItem {
    /// Describe the file at `path`, named after its last path component.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().replace(char::is_whitespace, "_"))
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name")
            })?;
        let meta = fs::metadata(&path)?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let modified_at = meta.modified().map(unix_seconds).unwrap_or(0);
        Ok(Self {
            path,
            name,
            size: meta.len(),
            modified_at,
            cursor: 0,
            file: None,
            remove_on_ack: false,
        })
    }

    /// Delete the file once the peer acknowledges it with GOT.
    pub fn remove_on_ack(mut self, remove: bool) -> Self {
        self.remove_on_ack = remove;
        self
    }

    /// Path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            self.file = Some(File::open(&self.path)?);
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("file handle unavailable"))
    }
}

impl TransferItem for FileItem {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn modified_at(&self) -> i64 {
        self.modified_at
    }

    fn cursor(&self) -> u64 {
        self.cursor
    }

    fn read_chunk(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let remaining = self.size.saturating_sub(self.cursor);
        let want = remaining.min(max as u64) as usize;
        if want == 0 {
            return Ok(Vec::new());
        }
        let cursor = self.cursor;
        let file = self.file()?;
        file.seek(SeekFrom::Start(cursor))?;
        let mut chunk = vec![0u8; want];
        file.read_exact(&mut chunk)?;
        self.cursor += want as u64;
        Ok(chunk)
    }

    fn rewind_to(&mut self, offset: u64) -> io::Result<()> {
        check_offset(offset, self.size)?;
        self.cursor = offset;
        Ok(())
    }

    fn crc32(&mut self) -> io::Result<u32> {
        let size = self.size;
        let file = self.file()?;
        file.seek(SeekFrom::Start(0))?;
        let mut digest = CRC32.digest();
        let mut buf = vec![0u8; 8192];
        let mut left = size;
        while left > 0 {
            let want = left.min(buf.len() as u64) as usize;
            file.read_exact(&mut buf[..want])?;
            digest.update(&buf[..want]);
            left -= want as u64;
        }
        Ok(digest.finalize())
    }

    fn acknowledged(&mut self) -> io::Result<()> {
        self.file = None;
        if self.remove_on_ack {
            info!("removing sent file {}", self.path.display());
            fs::remove_file(&self.path)?;
        } else {
            debug!("keeping sent file {}", self.path.display());
        }
        Ok(())
    }
}
