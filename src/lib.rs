// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Streaming extraction and multi-hash pipeline for Debian binary packages.

Given a byte stream holding a `.deb` file (an `ar(5)` archive wrapping a
`control.tar*` and a `data.tar*` member), [`decoder::PackageDecoder`] parses
the nested `ar` → (optionally compressed) `tar` containers without
buffering whole members in memory, and emits a [`record::Record`] for the
package's metadata, one per regular file in its data archive, and a
terminal [`record::Record::Commit`].

Every regular file is tagged with whichever of four content hashes survive:
a plain SHA-512, a gzip-canonicalized SHA-512 (so two gzip encodings of the
same bytes collide), and PNG/GIF-canonicalized SHA-512s (so images that
differ only in ancillary metadata collide). Hashing never aborts the
package: a hasher that hits a decode error just drops its own output key,
via [`hashing::SuppressingHash`].

This crate covers the core pipeline only. Argument parsing, record
serialization, persistence, and the read-side web application that renders
reports are external collaborators — this crate hands a caller a
[`Result<record::Record, error::DedupError>`] stream and nothing else.

Callers that want to verify the input stream's own integrity pass a
[`decoder::DecoderConfig`] built with
[`decoder::DecoderConfig::with_expected_sha256`]; on mismatch, decoding
fails with [`error::DedupError::HashMismatch`] and no
[`record::Record::Commit`] is produced. A consumer that sees records for a
package but never sees `Commit` — because decoding returned `Err` partway
through, or the iterator was abandoned early — MUST NOT persist any of
them.

This crate never installs a logging subscriber; it only emits through the
`log` facade, matching the "libraries emit, binaries initialize" convention
used throughout the Debian tooling this crate is drawn from. */

pub mod ar;
pub mod compression;
pub mod control;
pub mod decoder;
pub mod dependency;
pub mod error;
pub mod hashing;
pub mod image;
pub mod record;

pub use decoder::{DecoderConfig, PackageDecoder};
pub use error::{DedupError, Result};
pub use record::{FileRecord, PackageMetadata, Record};
