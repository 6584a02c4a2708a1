//! Canonical identifiers and display names
//!
//! Free-text drug and disease names are folded into canonical atoms
//! (`"Coronary Artery-Disease"` -> `coronary_artery_disease`) before they
//! reach the knowledge base. A [`NameMap`] translates atoms back into the
//! names shown to clinicians.

use crate::{read_json_file, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Atom returned for input that contains no usable characters
pub const UNKNOWN_ATOM: &str = "unknown";

/// Normalise free text into a canonical identifier
///
/// Lowercases, turns runs of whitespace and hyphens into a single `_`, drops
/// anything outside `[a-z0-9_]` and prefixes `a_` when the result would start
/// with a digit or underscore. A trailing separator is kept (`"beta -"` ->
/// `beta_`) so atoms match facts authored with the same rule.
pub fn canonical_atom(text: &str) -> String {
    let mut atom = String::with_capacity(text.len());
    let mut pending_sep = false;

    for c in text.trim().chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() || c == '-' {
            pending_sep = true;
            continue;
        }
        if pending_sep {
            atom.push('_');
            pending_sep = false;
        }
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            atom.push(c);
        }
    }
    if pending_sep {
        atom.push('_');
    }

    if atom.is_empty() {
        return UNKNOWN_ATOM.to_string();
    }

    if atom.starts_with(|c: char| c.is_ascii_digit() || c == '_') {
        atom.insert_str(0, "a_");
    }

    atom
}

/// Canonical atom -> display name lookup
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameMap {
    names: HashMap<String, String>,
}

impl NameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            what: "name map",
            source,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json_file(path.as_ref(), "name map")
    }

    /// Load a name map, falling back to an empty one (atoms are shown raw)
    pub fn from_file_or_empty(path: impl AsRef<Path>) -> Self {
        match Self::from_file(path.as_ref()) {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!(
                    path = %path.as_ref().display(),
                    error = %err,
                    "name map unavailable, showing raw atoms"
                );
                Self::default()
            }
        }
    }

    pub fn insert(&mut self, atom: impl Into<String>, name: impl Into<String>) {
        self.names.insert(atom.into(), name.into());
    }

    /// Display name for an atom, or the atom itself when unmapped
    pub fn display_name<'a>(&'a self, atom: &'a str) -> &'a str {
        self.names.get(atom).map(String::as_str).unwrap_or(atom)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_atom_basic() {
        assert_eq!(canonical_atom("Aspirin 100mg"), "aspirin_100mg");
        assert_eq!(canonical_atom("  Coronary artery - disease "), "coronary_artery_disease");
        assert_eq!(canonical_atom("Type-2 Diabetes"), "type_2_diabetes");
    }

    #[test]
    fn test_canonical_atom_strips_symbols() {
        assert_eq!(canonical_atom("Co-trimoxazole (oral)"), "co_trimoxazole_oral");
        assert_eq!(canonical_atom("L'Acide"), "lacide");
    }

    #[test]
    fn test_canonical_atom_prefixes_leading_digit() {
        assert_eq!(canonical_atom("5-fluorouracil"), "a_5_fluorouracil");
        assert_eq!(canonical_atom("_hidden"), "a__hidden");
    }

    #[test]
    fn test_canonical_atom_keeps_trailing_separator() {
        assert_eq!(canonical_atom("Vitamin B-"), "vitamin_b_");
        assert_eq!(canonical_atom("insulin glargine -  "), "insulin_glargine_");
        assert_eq!(canonical_atom("hepatitis-b (chronic)"), "hepatitis_b_chronic");
        assert_eq!(canonical_atom(" - "), "a__");
    }

    #[test]
    fn test_canonical_atom_empty_is_unknown() {
        assert_eq!(canonical_atom(""), UNKNOWN_ATOM);
        assert_eq!(canonical_atom("  ()  "), UNKNOWN_ATOM);
    }

    #[test]
    fn test_name_map_falls_back_to_atom() {
        let map =
            NameMap::from_json(r#"{"acetylsalicylic_acid": "acetylsalicylic acid"}"#).unwrap();
        assert_eq!(map.display_name("acetylsalicylic_acid"), "acetylsalicylic acid");
        assert_eq!(map.display_name("warfarin"), "warfarin");
        assert_eq!(map.len(), 1);
    }
}
