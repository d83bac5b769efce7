//! Inbound side: partial receive buffers and sinks for completed files.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use log::{debug, info};

use super::item::CRC32;
use crate::core::{InboundSink, ReceivedFile};
use crate::frame::args::FileInfo;

/// Bytes of one inbound file collected so far.
#[derive(Debug, Clone)]
pub struct ReceiveBuffer {
    info: FileInfo,
    data: Vec<u8>,
}

impl ReceiveBuffer {
    /// Start receiving the file described by a FILE line.
    pub fn new(info: FileInfo) -> Self {
        let capacity = info.size.min(1 << 20) as usize;
        Self {
            info,
            data: Vec::with_capacity(capacity),
        }
    }

    /// File description.
    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    /// Bytes received so far.
    pub fn received(&self) -> u64 {
        self.data.len() as u64
    }

    /// Bytes still expected.
    pub fn remaining(&self) -> u64 {
        self.info.size.saturating_sub(self.received())
    }

    /// Check if the announced size has been reached.
    pub fn is_complete(&self) -> bool {
        self.received() >= self.info.size
    }

    /// Check if a FILE line describes the same file.
    pub fn matches(&self, info: &FileInfo) -> bool {
        self.info.name == info.name
            && self.info.size == info.size
            && self.info.modified_at == info.modified_at
    }

    /// Append a data fragment.
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Resume at `offset` under a new FILE line. Fails if fewer bytes are held.
    pub fn resume_at(&mut self, info: FileInfo) -> bool {
        if info.offset > self.received() {
            return false;
        }
        self.data.truncate(info.offset as usize);
        self.info = info;
        true
    }

    /// Check the content against the CRC from the FILE line, if any.
    pub fn crc_matches(&self) -> bool {
        match self.info.crc {
            Some(expected) => CRC32.checksum(&self.data) == expected,
            None => true,
        }
    }

    /// Turn the buffer into a delivered file.
    pub fn finish(self) -> ReceivedFile {
        ReceivedFile {
            name: self.info.display_name().into_owned(),
            modified_at: self.info.modified_at,
            content: self.data,
        }
    }
}

/// Keeps completed files in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Vec<ReceivedFile>,
    refused: HashSet<String>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer SKIP for files named `name`.
    pub fn refuse(mut self, name: impl Into<String>) -> Self {
        self.refused.insert(name.into());
        self
    }

    /// Delivered files, in delivery order.
    pub fn files(&self) -> &[ReceivedFile] {
        &self.files
    }

    /// Take the delivered files.
    pub fn into_files(self) -> Vec<ReceivedFile> {
        self.files
    }
}

impl InboundSink for MemorySink {
    fn accepts(&mut self, name: &str, _size: u64, _modified_at: i64) -> bool {
        !self.refused.contains(name)
    }

    fn deliver(&mut self, file: ReceivedFile) -> io::Result<()> {
        debug!("memory sink got {} ({} bytes)", file.name, file.content.len());
        self.files.push(file);
        Ok(())
    }
}

/// Writes completed files into a directory.
///
/// Each file is written as `name.part` and renamed into place once complete,
/// so readers of the directory never see a truncated file.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    delivered: Vec<PathBuf>,
}

impl DirectorySink {
    /// Create a sink for `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            delivered: Vec::new(),
        })
    }

    /// Target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths written so far.
    pub fn delivered(&self) -> &[PathBuf] {
        &self.delivered
    }
}

/// Reduce a remote supplied name to a safe single path component.
pub fn sanitize_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let clean: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if clean.is_empty() || clean.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        clean
    }
}

impl InboundSink for DirectorySink {
    fn deliver(&mut self, file: ReceivedFile) -> io::Result<()> {
        let name = sanitize_name(&file.name);
        let target = self.dir.join(&name);
        let partial = self.dir.join(format!("{}.part", name));

        let mut out = File::create(&partial)?;
        out.write_all(&file.content)?;
        if file.modified_at > 0 {
            let mtime = UNIX_EPOCH + Duration::from_secs(file.modified_at as u64);
            if let Err(e) = out.set_modified(mtime) {
                debug!("cannot set mtime on {}: {}", partial.display(), e);
            }
        }
        out.sync_all()?;
        drop(out);

        fs::rename(&partial, &target)?;
        info!(
            "received {} ({} bytes) into {}",
            file.name,
            file.content.len(),
            target.display()
        );
        self.delivered.push(target);
        Ok(())
    }
}
