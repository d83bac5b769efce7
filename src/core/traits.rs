//! Collaborator traits for binkp sessions.
//!
//! A session never touches an outbound spool or an inbox directly. Files to
//! send arrive as [`TransferItem`]s; completed inbound files leave through an
//! [`InboundSink`].

use std::fmt;
use std::io;

/// A named byte sequence queued for sending.
///
/// The item keeps its own read cursor. The cursor only moves forward as
/// chunks are read; [`TransferItem::rewind_to`] is reserved for a peer `GET`.
///
/// # Example
///
/// ```ignore
/// let mut item = MemoryItem::new("hello.txt", b"Hello, Bink!".to_vec(), 0);
/// let chunk = item.read_chunk(5)?;
/// assert_eq!(chunk, b"Hello");
/// assert_eq!(item.cursor(), 5);
/// ```
pub trait TransferItem: fmt::Debug + Send {
    /// Name announced in the `FILE` line; unique within a queue.
    fn name(&self) -> &str;

    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Modification time, seconds since the Unix epoch.
    fn modified_at(&self) -> i64;

    /// Offset of the next byte `read_chunk` returns.
    fn cursor(&self) -> u64;

    /// Read up to `max` bytes at the cursor and advance it.
    ///
    /// Returns an empty vector once the cursor reaches `size`.
    fn read_chunk(&mut self, max: usize) -> io::Result<Vec<u8>>;

    /// Move the cursor to `offset` on behalf of a peer resume request.
    fn rewind_to(&mut self, offset: u64) -> io::Result<()>;

    /// CRC-32 (ISO-HDLC) of the full content.
    fn crc32(&mut self) -> io::Result<u32>;

    /// Called once the peer confirmed the item with `GOT`.
    fn acknowledged(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Check if every byte has been read.
    fn is_exhausted(&self) -> bool {
        self.cursor() >= self.size()
    }
}

/// A completely received inbound file.
#[derive(Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Name from the `FILE` line.
    pub name: String,
    /// Modification time from the `FILE` line.
    pub modified_at: i64,
    /// File content.
    pub content: Vec<u8>,
}

impl fmt::Debug for ReceivedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedFile")
            .field("name", &self.name)
            .field("modified_at", &self.modified_at)
            .field("len", &self.content.len())
            .finish()
    }
}

/// Destination for completed inbound files.
pub trait InboundSink: Send {
    /// Decide whether to accept an announced file.
    ///
    /// Returning `false` makes the session answer `SKIP`; the sender keeps the
    /// file for a later session.
    fn accepts(&mut self, name: &str, size: u64, modified_at: i64) -> bool {
        let _ = (name, size, modified_at);
        true
    }

    /// Take ownership of a completely received file.
    fn deliver(&mut self, file: ReceivedFile) -> io::Result<()>;
}
