// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Parsing for `Depends`-style relationship fields.

See <https://www.debian.org/doc/debian-policy/ch-relationships.html>. Only
as much of the grammar as this crate needs is modeled: a comma-delimited
[`DependencyList`] of `|`-delimited alternative clauses. Version constraints
and architecture restrictions are recognized (so the regex doesn't choke on
real-world `Depends` fields) but discarded, since the only thing downstream
of this parser cares about is: for clauses naming exactly one alternative,
the package name. */

use crate::error::{DedupError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a single dependency alternative: a package name, an optional
/// `(relop version)` constraint, and an optional `[arch]` restriction.
static RE_DEPENDENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        ^\s*
        (?P<package>[^\s\[(]+)
        \s*
        (?:\(
            \s*
            (?:<<|<=|=|>=|>>)
            \s*
            [^\s)]+
            \s*
        \))?
        \s*
        (?:\[
            \s*
            !?
            \s*
            [^\]]+
        \])?
        \s*$
        "#,
    )
    .expect("RE_DEPENDENCY is a fixed literal")
});

/// A parsed `Depends`-style field: an ordered, comma-delimited list of
/// clauses, each of which is a `|`-delimited list of package-name
/// alternatives.
pub struct DependencyList {
    clauses: Vec<Vec<String>>,
}

impl DependencyList {
    /// Parse a dependency list from a control-field value.
    pub fn parse(s: &str) -> Result<Self> {
        let mut clauses = Vec::new();

        for clause in s.split(',') {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }

            let mut alternatives = Vec::new();
            for alt in clause.split('|') {
                let alt = alt.trim();
                let caps = RE_DEPENDENCY.captures(alt).ok_or_else(|| {
                    DedupError::ControlParseError(format!(
                        "failed to parse dependency expression {alt:?}"
                    ))
                })?;
                alternatives.push(caps["package"].to_string());
            }
            clauses.push(alternatives);
        }

        Ok(Self { clauses })
    }

    /// The package names contributed by clauses with exactly one
    /// alternative. Clauses with alternation (`A | B`) contribute nothing.
    pub fn single_alternative_names(&self) -> impl Iterator<Item = &str> {
        self.clauses
            .iter()
            .filter(|alts| alts.len() == 1)
            .map(|alts| alts[0].as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_names_pass_through() {
        let list = DependencyList::parse("libc6, libssl1.1").unwrap();
        let names: Vec<_> = list.single_alternative_names().collect();
        assert_eq!(names, vec!["libc6", "libssl1.1"]);
    }

    #[test]
    fn alternation_is_dropped() {
        let list = DependencyList::parse("libc6, default-mta | mail-transport-agent").unwrap();
        let names: Vec<_> = list.single_alternative_names().collect();
        assert_eq!(names, vec!["libc6"]);
    }

    #[test]
    fn version_constraints_and_arch_restrictions_are_ignored() {
        let list = DependencyList::parse("libfoo (>= 1.2.3) [amd64]").unwrap();
        let names: Vec<_> = list.single_alternative_names().collect();
        assert_eq!(names, vec!["libfoo"]);
    }
}
