// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The structured records this crate's pipeline emits.

[`Record`] is the pull-based iterator's item type: a tagged union of
[`PackageMetadata`] (exactly one, emitted first), [`FileRecord`] (zero or
more), and [`Record::Commit`] (exactly one, emitted last). The serializer
and persistence layer downstream of this crate are out of scope here, but
both record types derive `serde::Serialize` since that's the boundary
they're handed across. */

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// One package's identity, extracted from its `./control` member.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PackageMetadata {
    pub package: String,
    pub source: String,
    pub version: String,
    pub architecture: String,
    pub depends: BTreeSet<String>,
}

/// One regular file extracted from the package's data archive.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FileRecord {
    pub name: String,
    pub size: u64,
    pub hashes: BTreeMap<String, String>,
}

/// An item of the record stream a [`crate::decoder::PackageDecoder`] yields.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Record {
    Metadata(PackageMetadata),
    File(FileRecord),
    Commit,
}
