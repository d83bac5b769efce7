//! Outbound transfer queue.

use std::fs;
use std::io;
use std::path::Path;

use log::warn;
use thiserror::Error;

use super::item::FileItem;
use crate::core::TransferItem;

/// Errors raised while building a queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// An item with the same name is already queued.
    #[error("duplicate transfer item name: {0}")]
    Duplicate(String),
}

/// Files waiting to be sent, in insertion order, keyed by unique name.
///
/// An item leaves the queue only when the peer acknowledges it
/// ([`OutboundQueue::remove`]) or refuses it ([`OutboundQueue::skip`]).
/// Skipped items are kept aside and handed back by
/// [`OutboundQueue::into_remaining`] for the next session.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    items: Vec<Box<dyn TransferItem>>,
    skipped: Vec<Box<dyn TransferItem>>,
}

impl OutboundQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue every regular file in `dir`, sorted by name.
    ///
    /// Files are deleted after the peer acknowledges them.
    pub fn from_spool(dir: impl AsRef<Path>) -> io::Result<Self> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut queue = Self::new();
        for path in paths {
            let item = FileItem::open(&path)?.remove_on_ack(true);
            if let Err(e) = queue.push(Box::new(item)) {
                warn!("not queueing {}: {}", path.display(), e);
            }
        }
        Ok(queue)
    }

    /// Append an item.
    pub fn push(&mut self, item: Box<dyn TransferItem>) -> Result<(), QueueError> {
        if self.contains(item.name()) {
            return Err(QueueError::Duplicate(item.name().to_string()));
        }
        self.items.push(item);
        Ok(())
    }

    /// Number of items still to send.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing is left to send.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Check if an item named `name` is queued.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Names of the queued items, in order.
    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|i| i.name().to_string()).collect()
    }

    /// Names of the items skipped by the peer.
    pub fn skipped_names(&self) -> Vec<String> {
        self.skipped.iter().map(|i| i.name().to_string()).collect()
    }

    /// First queued item.
    pub fn head_mut(&mut self) -> Option<&mut Box<dyn TransferItem>> {
        self.items.first_mut()
    }

    /// Queued item by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Box<dyn TransferItem>> {
        let idx = self.position(name)?;
        self.items.get_mut(idx)
    }

    /// Take an acknowledged item out of the queue.
    pub fn remove(&mut self, name: &str) -> Option<Box<dyn TransferItem>> {
        let idx = self.position(name)?;
        Some(self.items.remove(idx))
    }

    /// Move an item into the skipped history. Returns false if not queued.
    pub fn skip(&mut self, name: &str) -> bool {
        match self.remove(name) {
            Some(mut item) => {
                if let Err(e) = item.rewind_to(0) {
                    warn!("cannot rewind skipped item {}: {}", name, e);
                }
                self.skipped.push(item);
                true
            }
            None => false,
        }
    }

    /// Everything not acknowledged: unsent items first, then skipped ones.
    pub fn into_remaining(self) -> Vec<Box<dyn TransferItem>> {
        let mut remaining = self.items;
        remaining.extend(self.skipped);
        remaining
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|item| item.name() == name)
    }
}
