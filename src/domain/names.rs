//! Tool-safe variable names
//!
//! The logic toolchain only accepts plain identifiers, so every feature name
//! is mapped to one:
//! - `[A-Za-z_][A-Za-z0-9_]*`
//! - not a connective keyword (`not`, `and`, `or`, `xor`, `mux`, `true`, `false`)
//! - unique within the model
//!
//! Names that already qualify keep their spelling. Others have illegal
//! characters replaced by `_`, get an `f_` prefix when they would start with a
//! digit, and take the first free `_2`, `_3`, ... suffix on collision.

use std::collections::{HashMap, HashSet};

const RESERVED: [&str; 7] = ["not", "and", "or", "xor", "mux", "true", "false"];

/// Returns true if `name` can be used verbatim as a toolchain variable
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = match chars.next() {
        Some(c) => c.is_ascii_alphabetic() || c == '_',
        None => false,
    };

    starts_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !is_reserved(name)
}

fn is_reserved(name: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// Rewrites a name into identifier shape, without collision handling
fn sanitize_base(name: &str) -> String {
    let mut base: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if base.is_empty() || base.starts_with(|c: char| c.is_ascii_digit()) {
        base.insert_str(0, "f_");
    }
    if is_reserved(&base) {
        base.push('_');
    }
    base
}

/// Bijection from original feature names to sanitized variable names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMapping {
    /// (original, sanitized) in declaration order
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl NameMapping {
    /// Builds the mapping for a model's feature names
    pub fn sanitize<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut originals: Vec<&str> = Vec::new();
        let mut seen = HashSet::new();
        for name in names {
            if seen.insert(name) {
                originals.push(name);
            }
        }

        // Valid names are claimed first so they never pick up a suffix
        let mut taken: HashSet<String> = originals
            .iter()
            .filter(|n| is_valid_identifier(n))
            .map(|n| n.to_string())
            .collect();

        let mut mapping = Self::default();
        for original in originals {
            let sanitized = if is_valid_identifier(original) {
                original.to_string()
            } else {
                let base = sanitize_base(original);
                let mut candidate = base.clone();
                let mut suffix = 2;
                while taken.contains(&candidate) {
                    candidate = format!("{}_{}", base, suffix);
                    suffix += 1;
                }
                taken.insert(candidate.clone());
                candidate
            };

            mapping
                .index
                .insert(original.to_string(), mapping.entries.len());
            mapping.entries.push((original.to_string(), sanitized));
        }

        mapping
    }

    /// Returns the sanitized name for an original feature name
    pub fn get(&self, original: &str) -> Option<&str> {
        self.index
            .get(original)
            .map(|idx| self.entries[*idx].1.as_str())
    }

    /// True when the domain and codomain are the same set of names
    pub fn is_identity(&self) -> bool {
        let originals: HashSet<&str> = self.entries.iter().map(|(o, _)| o.as_str()).collect();
        let sanitized: HashSet<&str> = self.entries.iter().map(|(_, s)| s.as_str()).collect();
        originals == sanitized
    }

    /// (original, sanitized) pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(o, s)| (o.as_str(), s.as_str()))
    }

    /// Sanitized names in declaration order
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, s)| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
