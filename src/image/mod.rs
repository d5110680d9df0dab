// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Container-aware image canonicalization hashes.

[`png::PngHash`] and [`gif::GifHash`] parse just enough of their respective
containers to emit a canonical byte sequence into an inner digest; neither
decodes pixels. Both are [`crate::hashing::FallibleHasher`] implementations,
driven incrementally via `update()` the same way every other hasher in this
crate is, and are always reached for through
[`crate::hashing::SuppressingHash`] since a truncated or malformed image must
drop only its own hash, not abort the package. */

pub mod gif;
pub mod png;

/// A small growable byte queue used by the image parsers to accumulate
/// enough input to recognize the next structural unit (a chunk, a
/// sub-block) before consuming it. Bytes are appended as `update()` is
/// called and drained from the front as they're consumed, so the buffer
/// only ever holds the currently-unparsed tail of the stream rather than
/// the whole file.
#[derive(Default)]
pub(crate) struct ByteBuffer {
    data: Vec<u8>,
}

impl ByteBuffer {
    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Look at the next `n` bytes without consuming them. `None` if fewer
    /// than `n` bytes are currently buffered.
    pub(crate) fn peek(&self, n: usize) -> Option<&[u8]> {
        if self.data.len() < n {
            None
        } else {
            Some(&self.data[..n])
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    /// Consume and return the next `n` bytes, or `None` (leaving the buffer
    /// untouched) if fewer than `n` are currently available.
    pub(crate) fn take(&mut self, n: usize) -> Option<Vec<u8>> {
        if self.data.len() < n {
            None
        } else {
            Some(self.data.drain(0..n).collect())
        }
    }
}
