// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The orchestrator: validates container order, drives per-file extraction
and hashing, and emits the [`Record`] stream.

[`PackageDecoder`] implements `Iterator<Item = Result<Record>>`, mirroring
the `CpioReader`-style pull iterator used for the analogous fixed-header
archive reader elsewhere in this crate's family. Because `tar::Entries`
borrows the `tar::Archive` it iterates, and that archive in turn borrows
the decompression adapter built on top of the `ar` member currently being
read, holding a live `Entries` across separate `next()` calls would make
`PackageDecoder` self-referential. Rather than reach for unsafe code or a
self-referencing-struct crate, decoding is driven to completion — control
parsing, then the entire data archive — the first time `next()` is called,
queuing the resulting records; every subsequent call just pops the queue.
Per-file hashing still never buffers a whole file's bytes (each entry is
streamed through [`crate::hashing::MultiHash`] in fixed-size chunks); only
the small resulting records are queued ahead of time. */

use crate::ar::ArReader;
use crate::compression::{decompressed_reader, Compression};
use crate::control::parse_control;
use crate::error::{DedupError, Result};
use crate::hashing::MultiHash;
use crate::record::{FileRecord, Record};
use digest::Digest;
use sha2::Sha256;
use std::collections::{BTreeMap, VecDeque};
use std::io::Read;

/// Configuration surfaced to the core: the optional outer-digest
/// expectation and which compressions are accepted for `control.tar.*`.
#[derive(Clone, Debug)]
pub struct DecoderConfig {
    expected_outer_sha256: Option<[u8; 32]>,
    accept_control_compression: Vec<Compression>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            expected_outer_sha256: None,
            // Real-world .deb files increasingly ship control.tar.xz; .zst
            // is recognized here too so it's rejected with a precise
            // DecodeError naming zstd rather than silently treated as an
            // unrecognized ar member.
            accept_control_compression: vec![
                Compression::Gzip,
                Compression::Xz,
                Compression::Zstd,
            ],
        }
    }
}

impl DecoderConfig {
    /// Enable verification of the whole input stream's SHA-256 against
    /// `digest`. On mismatch, decoding fails with [`DedupError::HashMismatch`]
    /// and no [`Record::Commit`] is produced.
    pub fn with_expected_sha256(mut self, digest: [u8; 32]) -> Self {
        self.expected_outer_sha256 = Some(digest);
        self
    }

    /// Override which compressions are accepted for the `control.tar.*`
    /// member. Does not affect `data.tar.*`, whose four accepted
    /// compressions are fixed by the binary package format.
    pub fn accepting_control_compressions(mut self, compressions: Vec<Compression>) -> Self {
        self.accept_control_compression = compressions;
        self
    }
}

/// Wraps a `Read` and, when verification is requested, an outer SHA-256
/// digest that every successful read updates with exactly the bytes
/// returned to the caller.
struct HashedPassthrough<R> {
    inner: R,
    hasher: Option<Sha256>,
}

impl<R: Read> HashedPassthrough<R> {
    fn new(inner: R, verify: bool) -> Self {
        Self {
            inner,
            hasher: verify.then(Sha256::new),
        }
    }

    fn hexdigest(self) -> Option<String> {
        self.hasher.map(|h| hex::encode(h.finalize()))
    }
}

impl<R: Read> Read for HashedPassthrough<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            if let Some(hasher) = self.hasher.as_mut() {
                hasher.update(&buf[..n]);
            }
        }
        Ok(n)
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum BuildState {
    Start,
    ControlParsed,
}

enum MemberKind {
    Control(Compression),
    Data(Compression),
    Unknown,
}

fn classify(name: &str, config: &DecoderConfig) -> MemberKind {
    if let Some(c) = Compression::from_member_name(name, "control.tar") {
        if config.accept_control_compression.contains(&c) {
            return MemberKind::Control(c);
        }
    }
    if let Some(c) = Compression::from_member_name(name, "data.tar") {
        if c != Compression::Zstd {
            return MemberKind::Data(c);
        }
    }
    MemberKind::Unknown
}

fn extract_control_bytes<R: Read>(
    ar: &mut ArReader<R>,
    compression: Compression,
) -> Result<Vec<u8>> {
    let decompressed = decompressed_reader(&mut *ar, compression)?;
    let mut archive = tar::Archive::new(decompressed);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path_bytes().as_ref() == b"./control" {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            return Ok(buf);
        }
    }
    Err(DedupError::FormatError(
        "control.tar member has no \"./control\" entry".to_string(),
    ))
}

fn stream_data_entries<R: Read>(
    ar: &mut ArReader<R>,
    compression: Compression,
    records: &mut VecDeque<Record>,
) -> Result<()> {
    let decompressed = decompressed_reader(&mut *ar, compression)?;
    let mut archive = tar::Archive::new(decompressed);

    for entry in archive.entries()? {
        let mut entry = entry?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = match std::str::from_utf8(entry.path_bytes().as_ref()) {
            Ok(name) => name.to_string(),
            Err(_) => {
                log::warn!("skipping tar entry with non-UTF-8 name");
                continue;
            }
        };

        let size = entry.size();
        let mut multi = MultiHash::standard();
        let mut buf = [0u8; 8192];
        loop {
            let n = entry.read(&mut buf)?;
            if n == 0 {
                break;
            }
            multi.update(&buf[..n]);
        }

        let hashes: BTreeMap<String, String> = multi
            .finalize()
            .into_iter()
            .map(|(name, digest)| (name.to_string(), digest))
            .collect();

        log::debug!("hashed entry {name:?} ({size} bytes, {} hashes)", hashes.len());
        records.push_back(Record::File(FileRecord { name, size, hashes }));
    }

    Ok(())
}

fn build<R: Read>(source: R, config: &DecoderConfig) -> Result<VecDeque<Record>> {
    let verify = config.expected_outer_sha256.is_some();
    let hashed = HashedPassthrough::new(source, verify);
    let mut ar = ArReader::new(hashed);
    ar.read_magic()?;

    let mut records = VecDeque::new();
    let mut state = BuildState::Start;

    loop {
        let name = match ar.read_entry()? {
            Some(name) => name,
            None => return Err(DedupError::FormatError("data.tar not found".to_string())),
        };

        match classify(&name, config) {
            MemberKind::Control(compression) => {
                if state != BuildState::Start {
                    return Err(DedupError::FormatError(format!(
                        "duplicate control file member {name:?}"
                    )));
                }
                log::debug!("parsing control member {name:?}");
                let control_bytes = extract_control_bytes(&mut ar, compression)?;
                let metadata = parse_control(&control_bytes)?;
                records.push_back(Record::Metadata(metadata));
                state = BuildState::ControlParsed;
            }
            MemberKind::Data(compression) => {
                if state != BuildState::ControlParsed {
                    return Err(DedupError::FormatError("missing control file".to_string()));
                }
                log::debug!("parsing data member {name:?}");
                stream_data_entries(&mut ar, compression, &mut records)?;
                break;
            }
            MemberKind::Unknown => {
                log::debug!("skipping unrecognized ar member {name:?}");
            }
        }
    }

    if let Some(expected) = config.expected_outer_sha256 {
        let mut hashed = ar.into_inner()?;
        std::io::copy(&mut hashed, &mut std::io::sink())?;
        let actual = hashed
            .hexdigest()
            .expect("verification was requested so the outer hasher is always present");
        let expected_hex = hex::encode(expected);
        if actual != expected_hex {
            return Err(DedupError::HashMismatch {
                expected: expected_hex,
                actual,
            });
        }
    }

    records.push_back(Record::Commit);
    Ok(records)
}

/// Streams a single `.deb` package's extraction-and-multi-hash pipeline.
///
/// A pull-based `Iterator<Item = Result<Record>>`: drive it by calling
/// `next()` until it returns `None`. A consumer that sees `Some(Err(_))`, or
/// exhaustion without having seen [`Record::Commit`], must discard every
/// record already yielded for this package — see the crate-level docs for
/// the partial-output contract.
pub struct PackageDecoder<R> {
    source: Option<R>,
    config: DecoderConfig,
    queue: VecDeque<Record>,
    failed: bool,
}

impl<R: Read> PackageDecoder<R> {
    pub fn new(source: R, config: DecoderConfig) -> Self {
        Self {
            source: Some(source),
            config,
            queue: VecDeque::new(),
            failed: false,
        }
    }
}

impl<R: Read> Iterator for PackageDecoder<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        if let Some(source) = self.source.take() {
            match build(source, &self.config) {
                Ok(records) => self.queue = records,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }

        self.queue.pop_front().map(Ok)
    }
}
