// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Composable, streaming content hashers.

Every hasher that ultimately feeds a [`FileRecord`](crate::record::FileRecord)
implements [`FileHasher`] — a tiny object-safe capability that never fails:
`update` takes bytes, `finish` yields an optional hex digest. "Optional"
because a digest can be withdrawn for two independent reasons, each modeled as
its own decorator:

* [`HashBlacklist`] drops digests that equal a known-boring value (an empty
  file, a single newline).
* [`SuppressingHash`] drops the digest entirely when the wrapped
  [`FallibleHasher`] hit a decode error partway through (malformed gzip,
  malformed image container) — one bad file must not abort the whole
  package.

[`DecompressedHash`], [`crate::image::png::PngHash`], and
[`crate::image::gif::GifHash`] are the three [`FallibleHasher`]
implementations in this crate; they are the only hashers that can fail, and
are always reached for through [`SuppressingHash`]. */

use crate::error::{DedupError, Result};
use digest::Digest;
use sha2::Sha512;
use std::collections::HashSet;
use std::io::Write;

/// SHA-512 digests of content so common that recording them would flood a
/// cross-package content index. Verbatim: the hex SHA-512 of the empty byte
/// string, and of a single `"\n"`.
pub fn boring_sha512_hashes() -> &'static HashSet<&'static str> {
    static BORING: once_cell::sync::Lazy<HashSet<&'static str>> = once_cell::sync::Lazy::new(|| {
        HashSet::from_iter([
            "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9c\
             e47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e",
            "be688838ca8686e5c90689bf2ab585cef1137c999b48c70b92f67a5c34dc156\
             97b5d11c982ed6d71be1e1e7f7b4e0733884aa97c3f7a339a8ed03577cf74be09",
        ])
    });
    &BORING
}

/// Capability shared by every hasher that can sit behind a [`MultiHash`]:
/// infallible update, and a `finish` that may come back empty.
pub trait FileHasher {
    fn update(&mut self, data: &[u8]);
    fn finish(self: Box<Self>) -> Option<String>;
}

/// Capability for hashers whose inner decoding can fail partway through a
/// file. Only reached for through [`SuppressingHash`], which converts this
/// into the infallible [`FileHasher`] contract by discarding the digest on
/// error.
pub trait FallibleHasher {
    fn update(&mut self, data: &[u8]) -> Result<()>;
    fn finish(self: Box<Self>) -> Result<Option<String>>;
}

/// A plain running SHA-512 digest with no canonicalization.
pub struct RawSha512 {
    hasher: Sha512,
}

impl RawSha512 {
    pub fn new() -> Self {
        Self {
            hasher: Sha512::new(),
        }
    }
}

impl Default for RawSha512 {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHasher for RawSha512 {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finish(self: Box<Self>) -> Option<String> {
        Some(hex::encode(self.hasher.finalize()))
    }
}

/// Writes every byte it receives into a SHA-512 digest. Used as the sink end
/// of [`DecompressedHash`]'s incremental decompressor.
struct DigestSink {
    hasher: Sha512,
}

impl Write for DigestSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Feeds gzip-compressed bytes into an incremental decompressor and hashes
/// its decompressed output. Canonicalizes away gzip encoder/level
/// differences so two gzip encodings of the same content share a digest.
pub struct DecompressedHash {
    decoder: Option<flate2::write::GzDecoder<DigestSink>>,
}

impl DecompressedHash {
    pub fn new() -> Self {
        Self {
            decoder: Some(flate2::write::GzDecoder::new(DigestSink {
                hasher: Sha512::new(),
            })),
        }
    }
}

impl Default for DecompressedHash {
    fn default() -> Self {
        Self::new()
    }
}

impl FallibleHasher for DecompressedHash {
    fn update(&mut self, data: &[u8]) -> Result<()> {
        let decoder = self
            .decoder
            .as_mut()
            .expect("update called after finish");
        decoder
            .write_all(data)
            .map_err(|e| DedupError::DecodeError(e.to_string()))
    }

    fn finish(mut self: Box<Self>) -> Result<Option<String>> {
        let decoder = self.decoder.take().expect("finish called twice");
        let sink = decoder
            .finish()
            .map_err(|e| DedupError::DecodeError(e.to_string()))?;
        Ok(Some(hex::encode(sink.hasher.finalize())))
    }
}

/// Wraps a [`FallibleHasher`], converting any decode error into a
/// permanently-empty digest rather than propagating it. A single malformed
/// gzip or image in an otherwise-fine package should drop one hash key, not
/// abort the whole package.
pub struct SuppressingHash {
    inner: Option<Box<dyn FallibleHasher>>,
    poisoned: bool,
}

impl SuppressingHash {
    pub fn new(inner: Box<dyn FallibleHasher>) -> Self {
        Self {
            inner: Some(inner),
            poisoned: false,
        }
    }
}

impl FileHasher for SuppressingHash {
    fn update(&mut self, data: &[u8]) {
        if self.poisoned {
            return;
        }
        let inner = self.inner.as_mut().expect("inner hasher missing");
        if inner.update(data).is_err() {
            self.poisoned = true;
        }
    }

    fn finish(self: Box<Self>) -> Option<String> {
        if self.poisoned {
            return None;
        }
        let inner = self.inner.expect("inner hasher missing");
        inner.finish().unwrap_or(None)
    }
}

/// Wraps a [`FileHasher`] and withholds its digest if it equals one of the
/// boring values in `blacklist`.
pub struct HashBlacklist {
    inner: Box<dyn FileHasher>,
    blacklist: &'static HashSet<&'static str>,
}

impl HashBlacklist {
    pub fn new(inner: Box<dyn FileHasher>, blacklist: &'static HashSet<&'static str>) -> Self {
        Self { inner, blacklist }
    }
}

impl FileHasher for HashBlacklist {
    fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    fn finish(self: Box<Self>) -> Option<String> {
        self.inner.finish().filter(|d| !self.blacklist.contains(d.as_str()))
    }
}

/// Fans the bytes of one file out to a fixed set of named hashers.
///
/// `finalize` collects the `(name, digest)` pairs whose digest survived —
/// suppression and blacklisting both manifest as a missing key rather than
/// an empty-string value.
pub struct MultiHash {
    hashers: Vec<(&'static str, Box<dyn FileHasher>)>,
}

impl MultiHash {
    pub fn new(hashers: Vec<(&'static str, Box<dyn FileHasher>)>) -> Self {
        Self { hashers }
    }

    /// The standard four-hasher composition used for every regular file in a
    /// package's data archive: raw SHA-512, gzip-canonicalized SHA-512,
    /// PNG-canonicalized SHA-512, GIF-canonicalized SHA-512.
    pub fn standard() -> Self {
        Self::new(vec![
            ("sha512", Box::new(HashBlacklist::new(
                Box::new(RawSha512::new()),
                boring_sha512_hashes(),
            ))),
            ("gzip_sha512", Box::new(HashBlacklist::new(
                Box::new(SuppressingHash::new(Box::new(DecompressedHash::new()))),
                boring_sha512_hashes(),
            ))),
            ("png_sha512", Box::new(SuppressingHash::new(Box::new(
                crate::image::png::PngHash::new(),
            )))),
            ("gif_sha512", Box::new(SuppressingHash::new(Box::new(
                crate::image::gif::GifHash::new(),
            )))),
        ])
    }

    pub fn update(&mut self, data: &[u8]) {
        for (_, hasher) in &mut self.hashers {
            hasher.update(data);
        }
    }

    /// Consume the instance, returning the digests that survived
    /// suppression and blacklisting.
    pub fn finalize(self) -> Vec<(&'static str, String)> {
        self.hashers
            .into_iter()
            .filter_map(|(name, hasher)| hasher.finish().map(|digest| (name, digest)))
            .collect()
    }
}
