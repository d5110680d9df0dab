// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reader for the Unix `ar(5)` archive format used as the outer container of a
`.deb` package.

Unlike the inner tar layer (handled by the `tar` crate), this reader is
hand-rolled: the format is an 8-byte magic followed by a sequence of fixed
60-byte headers, small enough that owning the parsing here keeps the whole
pipeline non-seekable-stream friendly without pulling in a crate whose API
assumes random access. */

use crate::error::{DedupError, Result};
use std::io::{Read, Take};

const MAGIC: &[u8; 8] = b"!<arch>\n";
const HEADER_LEN: usize = 60;
const TERMINATOR: &[u8; 2] = b"`\n";

/// Iterates the members of an `ar` archive read from a forward-only stream.
///
/// After a successful [`Self::read_entry`], the reader itself implements
/// [`Read`] and exposes exactly the bytes of that member's body. Reading past
/// the member boundary yields `Ok(0)` until the next [`Self::read_entry`]
/// call advances the cursor.
pub struct ArReader<R> {
    inner: Option<R>,
    entry: Option<Take<R>>,
    // Whether the current member's body has an odd byte count and thus a
    // single unread pad byte following it.
    pending_pad: bool,
}

impl<R: Read> ArReader<R> {
    /// Construct a new reader. No bytes are consumed until [`Self::read_magic`]
    /// or [`Self::read_entry`] is called.
    pub fn new(reader: R) -> Self {
        Self {
            inner: Some(reader),
            entry: None,
            pending_pad: false,
        }
    }

    /// Consume and validate the 8-byte `ar` magic.
    pub fn read_magic(&mut self) -> Result<()> {
        let inner = self
            .inner
            .as_mut()
            .expect("read_magic called after archive exhausted");

        let mut magic = [0u8; 8];
        let filled = fill_as_much_as_possible(inner, &mut magic)?;
        if filled != magic.len() {
            return Err(DedupError::FormatError("truncated ar magic".to_string()));
        }

        if &magic != MAGIC {
            return Err(DedupError::FormatError(
                "missing or invalid ar magic".to_string(),
            ));
        }

        Ok(())
    }

    /// Advance past any unconsumed bytes of the previous member (and its pad
    /// byte), then parse the next member header.
    ///
    /// Returns `Ok(None)` when the underlying source reports EOF exactly at a
    /// header boundary (normal end of archive). Returns `Err(FormatError)` on
    /// a truncated header or a non-decimal size field.
    pub fn read_entry(&mut self) -> Result<Option<String>> {
        self.finish_current()?;

        let mut inner = self
            .inner
            .take()
            .expect("read_entry called after archive exhausted");

        let mut header = [0u8; HEADER_LEN];
        let filled = fill_as_much_as_possible(&mut inner, &mut header)?;

        if filled == 0 {
            // Clean end of archive: no bytes available at a header boundary.
            self.inner = Some(inner);
            return Ok(None);
        }

        if filled != HEADER_LEN {
            return Err(DedupError::FormatError("truncated ar header".to_string()));
        }

        let name = parse_name(&header[0..16])?;
        let size = parse_size(&header[48..58])?;
        let terminator = &header[58..60];
        if terminator != TERMINATOR {
            return Err(DedupError::FormatError(format!(
                "bad ar header terminator for member {name:?}"
            )));
        }

        self.pending_pad = size % 2 == 1;
        self.entry = Some(inner.take(size));

        Ok(Some(name))
    }

    /// Finish the current member (if any, draining its unread body and pad
    /// byte) and hand back the underlying reader. Used once the caller is
    /// done iterating ar members and wants to keep reading raw bytes past
    /// the archive (e.g. to drain trailing padding for outer-digest
    /// verification).
    pub fn into_inner(mut self) -> Result<R> {
        self.finish_current()?;
        Ok(self.inner.take().expect("archive exhausted without inner reader"))
    }

    fn finish_current(&mut self) -> Result<()> {
        if let Some(mut take) = self.entry.take() {
            std::io::copy(&mut take, &mut std::io::sink())?;
            let mut inner = take.into_inner();

            if self.pending_pad {
                let mut pad = [0u8; 1];
                inner.read_exact(&mut pad)?;
                self.pending_pad = false;
            }

            self.inner = Some(inner);
        }

        Ok(())
    }
}

impl<R: Read> Read for ArReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.entry.as_mut() {
            Some(take) => take.read(buf),
            None => Ok(0),
        }
    }
}

/// Read into `buf` until it is full or the source hits EOF, returning the
/// number of bytes actually filled. Distinguishes "nothing available"
/// (returns 0) from "truncated partway through" (returns `0 < n < buf.len()`)
/// from "fully read" (returns `buf.len()`).
fn fill_as_much_as_possible(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn parse_name(field: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(field)
        .map_err(|_| DedupError::FormatError("ar member name is not valid UTF-8".to_string()))?;
    Ok(text.trim_end_matches(' ').trim_end_matches('/').to_string())
}

fn parse_size(field: &[u8]) -> Result<u64> {
    let text = std::str::from_utf8(field)
        .map_err(|_| DedupError::FormatError("ar member size is not ASCII".to_string()))?;
    text.trim()
        .parse()
        .map_err(|_| DedupError::FormatError(format!("ar member size {text:?} is not decimal")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn header(name: &str, size: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        write!(&mut buf, "{:<16}", name).unwrap();
        write!(&mut buf, "{:<12}", 0).unwrap(); // mtime
        write!(&mut buf, "{:<6}", 0).unwrap(); // uid
        write!(&mut buf, "{:<6}", 0).unwrap(); // gid
        write!(&mut buf, "{:<8}", "100644").unwrap(); // mode
        write!(&mut buf, "{:<10}", size).unwrap();
        buf.extend_from_slice(TERMINATOR);
        assert_eq!(buf.len(), HEADER_LEN);
        buf
    }

    fn archive(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        for (name, data) in members {
            buf.extend_from_slice(&header(name, data.len() as u64));
            buf.extend_from_slice(data);
            if data.len() % 2 == 1 {
                buf.push(b'\n');
            }
        }
        buf
    }

    #[test]
    fn reads_empty_archive() {
        let data = archive(&[]);
        let mut reader = ArReader::new(std::io::Cursor::new(data));
        reader.read_magic().unwrap();
        assert_eq!(reader.read_entry().unwrap(), None);
    }

    #[test]
    fn reads_members_in_order() {
        let data = archive(&[("debian-binary", b"2.0\n"), ("control.tar.gz", b"abc")]);
        let mut reader = ArReader::new(std::io::Cursor::new(data));
        reader.read_magic().unwrap();

        assert_eq!(
            reader.read_entry().unwrap(),
            Some("debian-binary".to_string())
        );
        let mut body = Vec::new();
        reader.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"2.0\n");

        assert_eq!(
            reader.read_entry().unwrap(),
            Some("control.tar.gz".to_string())
        );
        let mut body = Vec::new();
        reader.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"abc");

        assert_eq!(reader.read_entry().unwrap(), None);
    }

    #[test]
    fn skips_unread_member_body_and_pad() {
        let data = archive(&[("a", b"odd"), ("b", b"even!")]);
        let mut reader = ArReader::new(std::io::Cursor::new(data));
        reader.read_magic().unwrap();

        assert_eq!(reader.read_entry().unwrap(), Some("a".to_string()));
        // Deliberately do not read "a"'s body before advancing.
        assert_eq!(reader.read_entry().unwrap(), Some("b".to_string()));
        let mut body = Vec::new();
        reader.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"even!");
    }

    #[test]
    fn trailing_slash_and_padding_are_stripped() {
        let data = archive(&[("name.txt/", b"x")]);
        let mut reader = ArReader::new(std::io::Cursor::new(data));
        reader.read_magic().unwrap();
        assert_eq!(reader.read_entry().unwrap(), Some("name.txt".to_string()));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut reader = ArReader::new(std::io::Cursor::new(b"not-an-archive-".to_vec()));
        assert!(reader.read_magic().is_err());
    }

    #[test]
    fn rejects_truncated_header() {
        let mut data = archive(&[("a", b"x")]);
        data.truncate(MAGIC.len() + 30);
        let mut reader = ArReader::new(std::io::Cursor::new(data));
        reader.read_magic().unwrap();
        assert!(reader.read_entry().is_err());
    }
}
