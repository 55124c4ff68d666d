//! Byte-class pattern matching over raw segment bytes.
//!
//! Gadget terminators are described as short byte patterns where each
//! position is either an exact byte, one of a set of bytes, a byte
//! range, or a wildcard (e.g. `ff [e0|e1|e2|e3] ` for `jmp reg`).
//! Matching checks every offset, so overlapping matches are reported.

/// Constraint on a single byte position of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteClass {
    /// Matches any byte.
    Any,
    /// Matches exactly this byte.
    Exact(u8),
    /// Matches any byte in the set.
    OneOf(Vec<u8>),
    /// Matches any byte in the inclusive range.
    Range(u8, u8),
}

impl ByteClass {
    fn matches(&self, b: u8) -> bool {
        match self {
            ByteClass::Any => true,
            ByteClass::Exact(e) => b == *e,
            ByteClass::OneOf(set) => set.contains(&b),
            ByteClass::Range(lo, hi) => b >= *lo && b <= *hi,
        }
    }
}

/// A fixed-length byte pattern, one class per position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytePattern(Vec<ByteClass>);

impl BytePattern {
    pub fn new(classes: Vec<ByteClass>) -> Self {
        BytePattern(classes)
    }

    /// Pattern of exact bytes only.
    pub fn exact(bytes: &[u8]) -> Self {
        BytePattern(bytes.iter().map(|&b| ByteClass::Exact(b)).collect())
    }

    /// Length of the pattern in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Does the pattern match `data` starting at `offset`?
    pub fn matches_at(&self, data: &[u8], offset: usize) -> bool {
        if offset + self.0.len() > data.len() {
            return false;
        }
        self.0
            .iter()
            .zip(&data[offset..offset + self.0.len()])
            .all(|(class, &b)| class.matches(b))
    }

    /// All match start offsets in `data`, including overlapping ones.
    pub fn find_all(&self, data: &[u8]) -> Vec<usize> {
        if self.0.is_empty() || self.0.len() > data.len() {
            return Vec::new();
        }
        (0..=data.len() - self.0.len())
            .filter(|&off| self.matches_at(data, off))
            .collect()
    }
}
