// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! GIF container canonicalization.

Consumes the signature, logical screen descriptor and optional global color
table, then walks blocks until the trailer. The logical screen descriptor,
any color tables, and image-descriptor/image-data sub-blocks are fed into an
inner digest; graphics-control and comment/application extensions are
skipped so that two GIFs differing only in those extensions collide. */

use super::ByteBuffer;
use crate::error::{DedupError, Result};
use crate::hashing::FallibleHasher;
use digest::Digest;
use sha2::Sha512;

const SIGNATURE_LEN: usize = 6;
const SCREEN_DESCRIPTOR_LEN: usize = 7;
const TRAILER: u8 = 0x3b;
const EXTENSION_INTRODUCER: u8 = 0x21;
const IMAGE_SEPARATOR: u8 = 0x2c;

#[derive(Clone, Copy)]
enum State {
    Signature,
    ScreenDescriptor,
    GlobalColorTable(usize),
    BlockStart,
    ExtensionLabel,
    ExtensionSubBlock,
    ImageDescriptor,
    LocalColorTable(usize),
    ImageLzwMinCodeSize,
    ImageSubBlock,
    Done,
}

fn color_table_len(packed: u8) -> Option<usize> {
    if packed & 0x80 == 0 {
        None
    } else {
        Some(3 * (1usize << ((packed & 0x07) + 1)))
    }
}

pub struct GifHash {
    buf: ByteBuffer,
    inner: Sha512,
    state: State,
}

impl GifHash {
    pub fn new() -> Self {
        Self {
            buf: ByteBuffer::default(),
            inner: Sha512::new(),
            state: State::Signature,
        }
    }

    /// Attempt to read one GIF "data sub-block": a size byte followed by
    /// that many data bytes, or a lone zero byte for the terminator.
    /// Returns `None` (buffer untouched) if not enough data is buffered yet.
    fn try_take_subblock(&mut self) -> Option<Vec<u8>> {
        let size = *self.buf.peek(1)?.first().unwrap();
        if size == 0 {
            self.buf.take(1)
        } else {
            self.buf.take(1 + size as usize)
        }
    }

    fn drive(&mut self) -> Result<()> {
        loop {
            match self.state {
                State::Signature => match self.buf.take(SIGNATURE_LEN) {
                    None => return Ok(()),
                    Some(sig) => {
                        if sig != b"GIF87a" && sig != b"GIF89a" {
                            return Err(DedupError::DecodeError(
                                "bad GIF signature".to_string(),
                            ));
                        }
                        self.state = State::ScreenDescriptor;
                    }
                },
                State::ScreenDescriptor => match self.buf.take(SCREEN_DESCRIPTOR_LEN) {
                    None => return Ok(()),
                    Some(descriptor) => {
                        self.inner.update(&descriptor);
                        let packed = descriptor[4];
                        self.state = match color_table_len(packed) {
                            Some(n) => State::GlobalColorTable(n),
                            None => State::BlockStart,
                        };
                    }
                },
                State::GlobalColorTable(n) => match self.buf.take(n) {
                    None => return Ok(()),
                    Some(table) => {
                        self.inner.update(&table);
                        self.state = State::BlockStart;
                    }
                },
                State::BlockStart => match self.buf.take(1) {
                    None => return Ok(()),
                    Some(b) => match b[0] {
                        TRAILER => {
                            self.state = State::Done;
                            return Ok(());
                        }
                        EXTENSION_INTRODUCER => self.state = State::ExtensionLabel,
                        IMAGE_SEPARATOR => {
                            // Put the separator back conceptually by hashing
                            // it as the first byte of the image descriptor.
                            self.inner.update(&[IMAGE_SEPARATOR]);
                            self.state = State::ImageDescriptor;
                        }
                        other => {
                            return Err(DedupError::DecodeError(format!(
                                "unexpected GIF block introducer 0x{other:02x}"
                            )))
                        }
                    },
                },
                State::ExtensionLabel => match self.buf.take(1) {
                    None => return Ok(()),
                    Some(_label) => self.state = State::ExtensionSubBlock,
                },
                State::ExtensionSubBlock => match self.try_take_subblock() {
                    None => return Ok(()),
                    Some(block) => {
                        if block.len() == 1 && block[0] == 0 {
                            self.state = State::BlockStart;
                        }
                        // Extension contents are deliberately not hashed.
                    }
                },
                State::ImageDescriptor => match self.buf.take(9) {
                    None => return Ok(()),
                    Some(fields) => {
                        self.inner.update(&fields);
                        let packed = fields[8];
                        self.state = match color_table_len(packed) {
                            Some(n) => State::LocalColorTable(n),
                            None => State::ImageLzwMinCodeSize,
                        };
                    }
                },
                State::LocalColorTable(n) => match self.buf.take(n) {
                    None => return Ok(()),
                    Some(table) => {
                        self.inner.update(&table);
                        self.state = State::ImageLzwMinCodeSize;
                    }
                },
                State::ImageLzwMinCodeSize => match self.buf.take(1) {
                    None => return Ok(()),
                    Some(b) => {
                        self.inner.update(&b);
                        self.state = State::ImageSubBlock;
                    }
                },
                State::ImageSubBlock => match self.try_take_subblock() {
                    None => return Ok(()),
                    Some(block) => {
                        self.inner.update(&block);
                        if block.len() == 1 && block[0] == 0 {
                            self.state = State::BlockStart;
                        }
                    }
                },
                State::Done => return Ok(()),
            }
        }
    }
}

impl Default for GifHash {
    fn default() -> Self {
        Self::new()
    }
}

impl FallibleHasher for GifHash {
    fn update(&mut self, data: &[u8]) -> Result<()> {
        if matches!(self.state, State::Done) {
            return Ok(());
        }
        self.buf.extend(data);
        self.drive()
    }

    fn finish(mut self: Box<Self>) -> Result<Option<String>> {
        if !matches!(self.state, State::Done) {
            return Err(DedupError::DecodeError(
                "truncated GIF stream".to_string(),
            ));
        }
        Ok(Some(hex::encode(self.inner.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subblocks(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in data.chunks(255) {
            out.push(chunk.len() as u8);
            out.extend_from_slice(chunk);
        }
        out.push(0);
        out
    }

    fn minimal_gif(extension: Option<Vec<u8>>) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"GIF89a");
        // screen descriptor: 1x1, no global color table.
        out.extend_from_slice(&[1, 0, 1, 0, 0x00, 0, 0]);
        if let Some(ext) = extension {
            out.extend_from_slice(&ext);
        }
        // Image descriptor: left=0 top=0 width=1 height=1 packed=0.
        out.push(IMAGE_SEPARATOR);
        out.extend_from_slice(&[0, 0, 0, 0, 1, 0, 1, 0, 0]);
        out.push(2); // LZW min code size
        out.extend_from_slice(&subblocks(b"x"));
        out.push(TRAILER);
        out
    }

    fn comment_extension(text: &[u8]) -> Vec<u8> {
        let mut out = vec![EXTENSION_INTRODUCER, 0xFE];
        out.extend_from_slice(&subblocks(text));
        out
    }

    fn hash_all(bytes: &[u8]) -> Result<Option<String>> {
        let mut hasher: Box<dyn FallibleHasher> = Box::new(GifHash::new());
        hasher.update(bytes)?;
        hasher.finish()
    }

    #[test]
    fn comment_extension_does_not_affect_digest() {
        let without = minimal_gif(None);
        let with_a = minimal_gif(Some(comment_extension(b"hello")));
        let with_b = minimal_gif(Some(comment_extension(b"a different comment entirely")));

        let d0 = hash_all(&without).unwrap().unwrap();
        let da = hash_all(&with_a).unwrap().unwrap();
        let db = hash_all(&with_b).unwrap().unwrap();
        assert_eq!(d0, da);
        assert_eq!(da, db);
    }

    #[test]
    fn bad_signature_fails() {
        let mut hasher: Box<dyn FallibleHasher> = Box::new(GifHash::new());
        assert!(hasher.update(b"not-a-gif-").is_err());
    }

    #[test]
    fn truncated_stream_fails_on_finish() {
        let mut data = minimal_gif(None);
        data.pop();
        let mut hasher: Box<dyn FallibleHasher> = Box::new(GifHash::new());
        hasher.update(&data).unwrap();
        assert!(hasher.finish().is_err());
    }

    #[test]
    fn incremental_feed_matches_single_feed() {
        let data = minimal_gif(Some(comment_extension(b"x")));
        let whole = hash_all(&data).unwrap().unwrap();

        let mut hasher: Box<dyn FallibleHasher> = Box::new(GifHash::new());
        for byte in &data {
            hasher.update(std::slice::from_ref(byte)).unwrap();
        }
        assert_eq!(hasher.finish().unwrap().unwrap(), whole);
    }
}
