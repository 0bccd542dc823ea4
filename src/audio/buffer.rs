//! Growable contiguous sample store with read/write cursors.
//!
//! Single writer, single reader. Valid data lives between the read and
//! write cursors; `begin_write` hands out a writable region past the write
//! cursor, compacting the valid window to the front when trailing slack is
//! insufficient and reallocating only when total slack is. Consuming the
//! last sample resets both cursors so the allocation is reused.
//!
//! Backing store for encoder input staging, decoder output staging and the
//! audio chunks of the receive queue.

use crate::error::{Result, VoicewireError};

/// A contiguous growable buffer of `f32` samples.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    data: Vec<f32>,
    read_idx: usize,
    write_idx: usize,
}

impl SampleBuffer {
    /// Create an empty buffer. No allocation happens until the first write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered (committed, unconsumed) samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.write_idx - self.read_idx
    }

    /// Whether no samples are buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read_idx == self.write_idx
    }

    /// Current allocation size in samples.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Borrow the buffered samples.
    #[inline]
    pub fn peek(&self) -> &[f32] {
        &self.data[self.read_idx..self.write_idx]
    }

    /// Obtain a writable region of exactly `n` samples.
    ///
    /// May compact the valid window to the front of the allocation or grow
    /// the allocation; previously buffered samples are preserved either way.
    /// The region's contents are unspecified until written and must be made
    /// valid with [`commit`](Self::commit).
    pub fn begin_write(&mut self, n: usize) -> &mut [f32] {
        let len = self.len();
        if self.data.is_empty() {
            self.data.resize(n, 0.0);
            self.read_idx = 0;
            self.write_idx = 0;
        } else if n > self.data.len() - len {
            // Not enough total slack: grow, moving valid data to the front.
            let mut grown = vec![0.0f32; len + n];
            grown[..len].copy_from_slice(&self.data[self.read_idx..self.write_idx]);
            self.data = grown;
            self.read_idx = 0;
            self.write_idx = len;
        } else if self.data.len() - self.write_idx < n {
            // Enough slack overall but not past the write cursor: compact.
            self.data.copy_within(self.read_idx..self.write_idx, 0);
            self.read_idx = 0;
            self.write_idx = len;
        }
        &mut self.data[self.write_idx..self.write_idx + n]
    }

    /// Extend the valid window by `n` samples just written.
    ///
    /// # Errors
    ///
    /// [`VoicewireError::BufferOverflow`] if `n` exceeds the writable slack
    /// past the write cursor.
    pub fn commit(&mut self, n: usize) -> Result<()> {
        let available = self.data.len() - self.write_idx;
        if n > available {
            return Err(VoicewireError::BufferOverflow {
                requested: n,
                available,
            });
        }
        self.write_idx += n;
        Ok(())
    }

    /// Advance the read cursor by `n` samples.
    ///
    /// Resets both cursors to zero when the buffer empties, so the
    /// allocation is reused without compaction.
    ///
    /// # Errors
    ///
    /// [`VoicewireError::BufferUnderflow`] if `n` exceeds the buffered
    /// length.
    pub fn consume(&mut self, n: usize) -> Result<()> {
        let available = self.len();
        if n > available {
            return Err(VoicewireError::BufferUnderflow {
                requested: n,
                available,
            });
        }
        self.read_idx += n;
        if self.read_idx == self.write_idx {
            self.read_idx = 0;
            self.write_idx = 0;
        }
        Ok(())
    }

    /// Copy `samples` in: `begin_write` + `commit` in one call.
    pub fn extend_from_slice(&mut self, samples: &[f32]) {
        self.begin_write(samples.len()).copy_from_slice(samples);
        self.write_idx += samples.len();
    }
}
