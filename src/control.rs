// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Parsing for the binary package's `./control` member.

Mirrors the two-layer design used elsewhere in this crate's family for
control-file-shaped text: an incremental line parser ([`ControlFileParser`])
that folds continuation lines into the field they belong to and emits a
completed [`ControlParagraph`] at each blank line, fed by a pull iterator
([`ControlParagraphReader`]) driven from a [`std::io::BufRead`]. */

use crate::dependency::DependencyList;
use crate::error::{DedupError, Result};
use crate::record::PackageMetadata;
use std::collections::BTreeSet;
use std::io::BufRead;

/// A single `Key: value` field, with any folded continuation lines already
/// joined (newline-separated, continuation lines keep their original
/// leading whitespace trimmed away by the parser).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ControlField {
    name: String,
    value: String,
}

impl ControlField {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// An ordered set of fields, case-insensitive on lookup, case-preserving on
/// storage. A control file contains exactly one paragraph for this crate's
/// purposes (binary package control files are single-paragraph).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ControlParagraph {
    fields: Vec<ControlField>,
}

impl ControlParagraph {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn set_field(&mut self, name: String, value: String) {
        self.fields.retain(|f| !f.name.eq_ignore_ascii_case(&name));
        self.fields.push(ControlField { name, value });
    }

    pub fn field(&self, name: &str) -> Option<&ControlField> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value())
    }

    fn required_field_str(&self, name: &str) -> Result<&str> {
        self.field_str(name)
            .ok_or_else(|| DedupError::ControlParseError(format!("missing required field {name:?}")))
    }

    fn required_ascii_field(&self, name: &str) -> Result<&str> {
        let value = self.required_field_str(name)?;
        if !value.is_ascii() {
            return Err(DedupError::ControlParseError(format!(
                "field {name:?} is not ASCII"
            )));
        }
        Ok(value)
    }
}

/// Holds parsing state for a control file: fed lines of text, it joins
/// continuation lines into the field they extend and emits a completed
/// [`ControlParagraph`] whenever a blank line terminates one.
#[derive(Clone, Debug, Default)]
struct ControlFileParser {
    paragraph: ControlParagraph,
    field: Option<String>,
}

impl ControlFileParser {
    fn write_line(&mut self, line: &str) -> Result<Option<ControlParagraph>> {
        let is_empty_line = line.trim().is_empty();
        let is_continuation = line.starts_with(' ') || line.starts_with('\t');

        let current_field = self.field.take();

        if is_empty_line {
            if let Some(field) = current_field {
                self.flush_field(&field)?;
            }
            return Ok(if self.paragraph.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.paragraph))
            });
        }

        match (current_field, is_continuation) {
            (Some(v), false) => {
                self.flush_field(&v)?;
                self.field = Some(line.trim_end_matches(['\r', '\n']).to_string());
                Ok(None)
            }
            (None, _) => {
                self.field = Some(line.trim_end_matches(['\r', '\n']).to_string());
                Ok(None)
            }
            (Some(v), true) => {
                self.field = Some(format!(
                    "{v}\n{}",
                    line.trim_end_matches(['\r', '\n']).trim_start()
                ));
                Ok(None)
            }
        }
    }

    fn finish(mut self) -> Result<Option<ControlParagraph>> {
        if let Some(field) = self.field.take() {
            self.flush_field(&field)?;
        }
        Ok(if self.paragraph.is_empty() {
            None
        } else {
            Some(self.paragraph)
        })
    }

    fn flush_field(&mut self, raw: &str) -> Result<()> {
        let mut parts = raw.splitn(2, ':');
        let name = parts
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                DedupError::ControlParseError(format!("line {raw:?} is missing a field name"))
            })?;
        let value = parts.next().ok_or_else(|| {
            DedupError::ControlParseError(format!("line {raw:?} is missing a colon"))
        })?;

        self.paragraph
            .set_field(name.to_string(), value.trim().to_string());
        Ok(())
    }
}

/// Pull iterator over the paragraphs of a control file. A binary package
/// control file has exactly one; this type is kept general because that's
/// how the grammar itself works (blank-line-delimited paragraphs).
pub struct ControlParagraphReader<R> {
    reader: R,
    parser: Option<ControlFileParser>,
}

impl<R: BufRead> ControlParagraphReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: Some(ControlFileParser::default()),
        }
    }

    fn get_next(&mut self) -> Result<Option<ControlParagraph>> {
        let mut parser = self.parser.take().expect("reader exhausted");
        loop {
            let mut line = String::new();
            let bytes_read = self.reader.read_line(&mut line)?;
            if bytes_read != 0 {
                if let Some(paragraph) = parser.write_line(&line)? {
                    self.parser = Some(parser);
                    return Ok(Some(paragraph));
                }
            } else {
                return parser.finish();
            }
        }
    }
}

impl<R: BufRead> Iterator for ControlParagraphReader<R> {
    type Item = Result<ControlParagraph>;

    fn next(&mut self) -> Option<Self::Item> {
        self.parser.as_ref()?;
        match self.get_next() {
            Ok(Some(paragraph)) => Some(Ok(paragraph)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Parse the sole paragraph of a `./control` member into [`PackageMetadata`].
pub fn parse_control(bytes: &[u8]) -> Result<PackageMetadata> {
    let mut reader = ControlParagraphReader::new(std::io::BufReader::new(bytes));
    let paragraph = reader
        .next()
        .transpose()?
        .ok_or_else(|| DedupError::ControlParseError("control file is empty".to_string()))?;

    let package = paragraph.required_ascii_field("Package")?.to_string();
    let version = paragraph.required_ascii_field("Version")?.to_string();
    let architecture = paragraph.required_ascii_field("Architecture")?.to_string();
    let source = match paragraph.field_str("Source") {
        Some(value) => {
            if !value.is_ascii() {
                return Err(DedupError::ControlParseError(
                    "field \"Source\" is not ASCII".to_string(),
                ));
            }
            value
                .split_whitespace()
                .next()
                .unwrap_or(value)
                .to_string()
        }
        None => package.clone(),
    };

    let depends = match paragraph.field_str("Depends") {
        Some(value) => {
            let list = DependencyList::parse(value)?;
            BTreeSet::from_iter(list.single_alternative_names().map(str::to_string))
        }
        None => BTreeSet::new(),
    };

    Ok(PackageMetadata {
        package,
        source,
        version,
        architecture,
        depends,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_control() {
        let control = b"Package: x\nVersion: 1\nArchitecture: all\n\n";
        let metadata = parse_control(control).unwrap();
        assert_eq!(metadata.package, "x");
        assert_eq!(metadata.source, "x");
        assert_eq!(metadata.version, "1");
        assert_eq!(metadata.architecture, "all");
        assert!(metadata.depends.is_empty());
    }

    #[test]
    fn source_defaults_to_package_and_depends_drops_alternation() {
        let control = b"Package: foo\nSource: foo-src extra-token\nVersion: 2\nArchitecture: amd64\nDepends: libc6, default-mta | mail-transport-agent\n\n";
        let metadata = parse_control(control).unwrap();
        assert_eq!(metadata.source, "foo-src");
        assert_eq!(
            metadata.depends,
            BTreeSet::from(["libc6".to_string()])
        );
    }

    #[test]
    fn folded_continuation_lines_are_joined() {
        let control = b"Package: foo\nVersion: 1\nArchitecture: all\nDescription: short summary\n more detail on the next line\n\n";
        let metadata = parse_control(control).unwrap();
        assert_eq!(metadata.package, "foo");
    }

    #[test]
    fn missing_required_field_errors() {
        let control = b"Package: foo\nVersion: 1\n\n";
        assert!(parse_control(control).is_err());
    }

    #[test]
    fn non_ascii_field_errors() {
        let control = "Package: foo\nVersion: 1\nArchitecture: all\nSource: caf\u{e9}\n\n"
            .into_bytes();
        assert!(parse_control(&control).is_err());
    }
}
