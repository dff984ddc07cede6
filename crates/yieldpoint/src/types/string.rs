use std::{fmt, ops::Deref, rc::Rc};

use crate::py_hash::hash_str;

/// Immutable shared string.
///
/// Clones share one buffer, so two `Str`s can be compared by identity
/// ([`Str::ptr_eq`]) as well as by content. The locals view uses identity to
/// key its slot cache.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Str(Rc<str>);

impl Str {
    #[must_use]
    pub fn new(value: &str) -> Self {
        Self(Rc::from(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when both handles point at the same buffer.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn py_hash(&self) -> u64 {
        hash_str(&self.0)
    }

    /// Python `repr()` of the string, single-quoted unless it contains a
    /// single quote and no double quote.
    #[must_use]
    pub fn py_repr(&self) -> String {
        let quote = if self.0.contains('\'') && !self.0.contains('"') {
            '"'
        } else {
            '\''
        };
        let mut out = String::with_capacity(self.0.len() + 2);
        out.push(quote);
        for c in self.0.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c == quote => {
                    out.push('\\');
                    out.push(c);
                }
                c => out.push(c),
            }
        }
        out.push(quote);
        out
    }
}

impl Deref for Str {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Str {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Str {
    fn from(value: String) -> Self {
        Self(Rc::from(value))
    }
}

impl fmt::Debug for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
