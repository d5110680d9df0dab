// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! PNG container canonicalization.

Parses the chunk framing of a PNG stream (`length(4) | type(4) | data(length)
| crc(4)`) and feeds only the pixel-relevant chunks into an inner digest,
skipping ancillary metadata chunks such as `tEXt` and `tIME`. `IDAT` chunks
are accumulated and hashed as a single concatenated chunk so that rechunking
the compressed image data does not change the digest. */

use super::ByteBuffer;
use crate::error::{DedupError, Result};
use crate::hashing::FallibleHasher;
use digest::Digest;
use sha2::Sha512;

const SIGNATURE: &[u8; 8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

const PIXEL_RELEVANT_CHUNKS: &[&[u8; 4]] = &[
    b"IHDR", b"PLTE", b"IDAT", b"tRNS", b"bKGD", b"gAMA", b"cHRM", b"sRGB", b"iCCP",
];

fn is_pixel_relevant(chunk_type: &[u8]) -> bool {
    PIXEL_RELEVANT_CHUNKS.iter().any(|t| t.as_slice() == chunk_type)
}

pub struct PngHash {
    buf: ByteBuffer,
    inner: Sha512,
    signature_seen: bool,
    idat_accum: Vec<u8>,
    done: bool,
}

impl PngHash {
    pub fn new() -> Self {
        Self {
            buf: ByteBuffer::default(),
            inner: Sha512::new(),
            signature_seen: false,
            idat_accum: Vec::new(),
            done: false,
        }
    }

    fn flush_idat(&mut self) {
        if !self.idat_accum.is_empty() {
            self.inner.update(b"IDAT");
            self.inner.update(&self.idat_accum);
            self.idat_accum.clear();
        }
    }

    /// Consume as many complete structural units (signature, then chunks)
    /// as are currently buffered, feeding pixel-relevant chunk bytes into
    /// the inner digest as they're recognized.
    fn drive(&mut self) -> Result<()> {
        if !self.signature_seen {
            match self.buf.take(SIGNATURE.len()) {
                None => return Ok(()),
                Some(sig) => {
                    if sig.as_slice() != SIGNATURE.as_slice() {
                        return Err(DedupError::DecodeError(
                            "bad PNG signature".to_string(),
                        ));
                    }
                    self.signature_seen = true;
                }
            }
        }

        loop {
            if self.done {
                return Ok(());
            }

            let header = match self.buf.peek(8) {
                Some(h) => h.to_vec(),
                None => return Ok(()),
            };

            let length = u32::from_be_bytes(header[0..4].try_into().unwrap()) as usize;
            let total = 8usize
                .checked_add(length)
                .and_then(|n| n.checked_add(4))
                .ok_or_else(|| DedupError::DecodeError("PNG chunk length overflow".to_string()))?;

            let chunk = match self.buf.take(total) {
                Some(chunk) => chunk,
                None => return Ok(()),
            };

            let chunk_type = &chunk[4..8];
            let data = &chunk[8..8 + length];

            if chunk_type == b"IDAT" {
                self.idat_accum.extend_from_slice(data);
                continue;
            }

            self.flush_idat();

            if is_pixel_relevant(chunk_type) {
                self.inner.update(chunk_type);
                self.inner.update(data);
            }

            if chunk_type == b"IEND" {
                self.done = true;
                return Ok(());
            }
        }
    }
}

impl Default for PngHash {
    fn default() -> Self {
        Self::new()
    }
}

impl FallibleHasher for PngHash {
    fn update(&mut self, data: &[u8]) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.buf.extend(data);
        self.drive()
    }

    fn finish(mut self: Box<Self>) -> Result<Option<String>> {
        if !self.done || self.buf.len() != 0 {
            return Err(DedupError::DecodeError(
                "truncated PNG stream".to_string(),
            ));
        }
        self.flush_idat();
        Ok(Some(hex::encode(self.inner.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crc_placeholder() -> [u8; 4] {
        [0, 0, 0, 0]
    }

    fn chunk(chunk_type: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(chunk_type);
        out.extend_from_slice(data);
        out.extend_from_slice(&crc_placeholder());
        out
    }

    fn minimal_png(extra_chunks: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(SIGNATURE);
        out.extend_from_slice(&chunk(b"IHDR", &[0u8; 13]));
        for (t, d) in extra_chunks {
            out.extend_from_slice(&chunk(t, d));
        }
        out.extend_from_slice(&chunk(b"IDAT", b"pixel-bytes"));
        out.extend_from_slice(&chunk(b"IEND", b""));
        out
    }

    fn hash_all(bytes: &[u8]) -> Result<Option<String>> {
        let mut hasher: Box<dyn FallibleHasher> = Box::new(PngHash::new());
        hasher.update(bytes)?;
        hasher.finish()
    }

    #[test]
    fn ancillary_chunks_do_not_affect_digest() {
        let without_text = minimal_png(&[]);
        let with_text = minimal_png(&[(b"tEXt", b"Comment\0hello")]);

        let d1 = hash_all(&without_text).unwrap().unwrap();
        let d2 = hash_all(&with_text).unwrap().unwrap();
        assert_eq!(d1, d2);
    }

    #[test]
    fn idat_rechunking_does_not_affect_digest() {
        let mut one_chunk = Vec::new();
        one_chunk.extend_from_slice(SIGNATURE);
        one_chunk.extend_from_slice(&chunk(b"IHDR", &[0u8; 13]));
        one_chunk.extend_from_slice(&chunk(b"IDAT", b"abcdefgh"));
        one_chunk.extend_from_slice(&chunk(b"IEND", b""));

        let mut two_chunks = Vec::new();
        two_chunks.extend_from_slice(SIGNATURE);
        two_chunks.extend_from_slice(&chunk(b"IHDR", &[0u8; 13]));
        two_chunks.extend_from_slice(&chunk(b"IDAT", b"abcd"));
        two_chunks.extend_from_slice(&chunk(b"IDAT", b"efgh"));
        two_chunks.extend_from_slice(&chunk(b"IEND", b""));

        assert_eq!(
            hash_all(&one_chunk).unwrap().unwrap(),
            hash_all(&two_chunks).unwrap().unwrap()
        );
    }

    #[test]
    fn bad_signature_fails() {
        let mut hasher: Box<dyn FallibleHasher> = Box::new(PngHash::new());
        assert!(hasher.update(b"not a png at all").is_err());
    }

    #[test]
    fn truncated_stream_fails_on_finish() {
        let mut full = minimal_png(&[]);
        full.truncate(full.len() - 5);
        let mut hasher: Box<dyn FallibleHasher> = Box::new(PngHash::new());
        hasher.update(&full).unwrap();
        assert!(hasher.finish().is_err());
    }

    #[test]
    fn incremental_feed_matches_single_feed() {
        let data = minimal_png(&[(b"tIME", b"xx")]);
        let whole = hash_all(&data).unwrap().unwrap();

        let mut hasher: Box<dyn FallibleHasher> = Box::new(PngHash::new());
        for byte in &data {
            hasher.update(std::slice::from_ref(byte)).unwrap();
        }
        assert_eq!(hasher.finish().unwrap().unwrap(), whole);
    }
}
