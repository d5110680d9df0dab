// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum DedupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed archive: {0}")]
    FormatError(String),

    #[error("failed to decode compressed stream: {0}")]
    DecodeError(String),

    #[error("outer digest mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("control file parse error: {0}")]
    ControlParseError(String),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, DedupError>;
