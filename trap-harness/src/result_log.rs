//! Append-only result log ("signature" region).
//!
//! In-band code addresses the log through a virtual pointer while the trap
//! handler uses a physical one. Both are derived from a single write offset,
//! so an append through either view moves both.

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// Width of one log entry in bytes.
pub const WORD_BYTES: u64 = 8;

/// Default capacity: the 4 KiB result region of the test programs.
pub const DEFAULT_CAPACITY_WORDS: usize = 512;

/// Which address space a cursor is reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorView {
    /// Address used by the interrupted program.
    Virtual,
    /// Address used by the trap handler.
    Physical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    Little,
    Big,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLog {
    words: Vec<u64>,
    capacity: usize,
    virtual_base: u64,
    physical_base: u64,
}

impl ResultLog {
    pub fn new(virtual_base: u64, physical_base: u64, capacity: usize) -> Self {
        Self {
            words: Vec::with_capacity(capacity.min(DEFAULT_CAPACITY_WORDS)),
            capacity,
            virtual_base,
            physical_base,
        }
    }

    /// Rebuild a log from saved parts (snapshot restore).
    pub fn from_parts(words: Vec<u64>, capacity: usize, virtual_base: u64, physical_base: u64) -> Self {
        Self {
            words,
            capacity,
            virtual_base,
            physical_base,
        }
    }

    /// Byte offset of the next write from the log base.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.words.len() as u64 * WORD_BYTES
    }

    /// Address of the next write in the requested view.
    pub fn cursor(&self, view: CursorView) -> u64 {
        let base = match view {
            CursorView::Virtual => self.virtual_base,
            CursorView::Physical => self.physical_base,
        };
        base.wrapping_add(self.offset())
    }

    pub fn virtual_base(&self) -> u64 {
        self.virtual_base
    }

    pub fn physical_base(&self) -> u64 {
        self.physical_base
    }

    /// Append one word. Both cursors advance by [`WORD_BYTES`].
    pub fn append(&mut self, word: u64) -> Result<(), HarnessError> {
        if self.words.len() >= self.capacity {
            return Err(HarnessError::LogFull {
                capacity: self.capacity,
            });
        }
        self.words.push(word);
        Ok(())
    }

    /// Move the virtual view so its cursor reads `new_cursor`.
    ///
    /// The write offset and the physical view are unchanged, so both views
    /// still name the same logical slot.
    pub fn rebase_virtual(&mut self, new_cursor: u64) {
        self.virtual_base = new_cursor.wrapping_sub(self.offset());
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Log contents as raw bytes, in the order the compliance checker expects.
    pub fn to_bytes(&self, order: ByteOrder) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.words.len() * WORD_BYTES as usize);
        for &word in &self.words {
            match order {
                ByteOrder::Little => out.extend_from_slice(&word.to_le_bytes()),
                ByteOrder::Big => out.extend_from_slice(&word.to_be_bytes()),
            }
        }
        out
    }

    /// Text signature: one 16-digit hex word per line.
    pub fn signature(&self) -> String {
        let mut out = String::with_capacity(self.words.len() * 17);
        for &word in &self.words {
            out.push_str(&hex::encode(word.to_be_bytes()));
            out.push('\n');
        }
        out
    }
}
