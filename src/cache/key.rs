//! Query key definitions.
//!
//! A query identity is an ordered sequence of serializable atoms, e.g.
//! `["stock", 42]`. Keys compare and hash structurally, render to a stable
//! canonical form for logs, and support the positional prefix matching that
//! drives invalidation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One element of a query key.
///
/// The atom set covers every identity the client builds: entity names,
/// numeric ids, filter flags, and `Null` for an id that is not known yet.
/// Serializes untagged, so a key round-trips as a plain JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyAtom {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for KeyAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAtom::Null => f.write_str("null"),
            KeyAtom::Bool(value) => write!(f, "{value}"),
            KeyAtom::Int(value) => write!(f, "{value}"),
            // Quoted with escaping, so `Str("42")` and `Int(42)` stay distinct
            KeyAtom::Str(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<&str> for KeyAtom {
    fn from(value: &str) -> Self {
        KeyAtom::Str(value.to_string())
    }
}

impl From<String> for KeyAtom {
    fn from(value: String) -> Self {
        KeyAtom::Str(value)
    }
}

impl From<i64> for KeyAtom {
    fn from(value: i64) -> Self {
        KeyAtom::Int(value)
    }
}

impl From<i32> for KeyAtom {
    fn from(value: i32) -> Self {
        KeyAtom::Int(value.into())
    }
}

impl From<u32> for KeyAtom {
    fn from(value: u32) -> Self {
        KeyAtom::Int(value.into())
    }
}

impl From<bool> for KeyAtom {
    fn from(value: bool) -> Self {
        KeyAtom::Bool(value)
    }
}

impl<A> From<Option<A>> for KeyAtom
where
    A: Into<KeyAtom>,
{
    fn from(value: Option<A>) -> Self {
        match value {
            Some(atom) => atom.into(),
            None => KeyAtom::Null,
        }
    }
}

/// Normalized query key: an ordered sequence of atoms.
///
/// Equality and hashing are structural, so two keys built independently from
/// the same atoms address the same cache entry. Ordering follows atom order
/// and gives prefix scans a deterministic notification sequence.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeyAtom>);

impl QueryKey {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append an atom, builder style.
    pub fn with(mut self, atom: impl Into<KeyAtom>) -> Self {
        self.0.push(atom.into());
        self
    }

    pub fn push(&mut self, atom: impl Into<KeyAtom>) {
        self.0.push(atom.into());
    }

    pub fn atoms(&self) -> &[KeyAtom] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Positional prefix test: true iff every atom of `self` equals the
    /// corresponding atom of `full` and `self` is no longer than `full`.
    ///
    /// Every key is a prefix of itself; the empty key is a prefix of all.
    pub fn is_prefix_of(&self, full: &QueryKey) -> bool {
        full.0.starts_with(&self.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, atom) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{atom}")?;
        }
        f.write_str("]")
    }
}

impl From<KeyAtom> for QueryKey {
    fn from(atom: KeyAtom) -> Self {
        Self(vec![atom])
    }
}

// Bare scalars promote to one-element keys.
impl From<&str> for QueryKey {
    fn from(value: &str) -> Self {
        Self(vec![value.into()])
    }
}

impl From<String> for QueryKey {
    fn from(value: String) -> Self {
        Self(vec![value.into()])
    }
}

impl From<i64> for QueryKey {
    fn from(value: i64) -> Self {
        Self(vec![value.into()])
    }
}

impl From<Vec<KeyAtom>> for QueryKey {
    fn from(atoms: Vec<KeyAtom>) -> Self {
        Self(atoms)
    }
}

impl<A, const N: usize> From<[A; N]> for QueryKey
where
    A: Into<KeyAtom>,
{
    fn from(atoms: [A; N]) -> Self {
        Self(atoms.into_iter().map(Into::into).collect())
    }
}

impl FromIterator<KeyAtom> for QueryKey {
    fn from_iter<I: IntoIterator<Item = KeyAtom>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
