//! Field selectors and the list shape declared by a trace header.

use std::fmt;

use crate::error::{Error, Result};

/// One of the (at most two) outgoing pointer fields of a heap cell.
///
/// Pointer variables store their value in the [`Field::Next`] slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Field {
    Next,
    Prev,
}

impl Field {
    pub const ALL: [Field; 2] = [Field::Next, Field::Prev];

    pub fn index(self) -> usize {
        match self {
            Field::Next => 0,
            Field::Prev => 1,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Next => write!(f, "next"),
            Field::Prev => write!(f, "prev"),
        }
    }
}

/// Shape of the modeled structure: singly linked (one field) or doubly linked (two).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Layout {
    names: Vec<String>,
}

impl Layout {
    /// Builds a layout from the field names of a trace header.
    ///
    /// The first name maps to [`Field::Next`], the second (if any) to [`Field::Prev`].
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Result<Self> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() || names.len() > 2 {
            return Err(Error::InvalidHeader { fields: names });
        }
        Ok(Self { names })
    }

    pub fn singly(next: &str) -> Self {
        Self {
            names: vec![next.to_string()],
        }
    }

    pub fn doubly(next: &str, prev: &str) -> Self {
        Self {
            names: vec![next.to_string(), prev.to_string()],
        }
    }

    /// Number of modeled fields (1 or 2).
    pub fn arity(&self) -> usize {
        self.names.len()
    }

    /// Fields modeled by this layout.
    pub fn fields(&self) -> &'static [Field] {
        &Field::ALL[..self.arity()]
    }

    pub fn resolve(&self, name: &str) -> Option<Field> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| Field::ALL[i])
    }

    pub fn name(&self, field: Field) -> &str {
        &self.names[field.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_resolve() {
        let layout = Layout::doubly("next", "prev");
        assert_eq!(layout.arity(), 2);
        assert_eq!(layout.resolve("next"), Some(Field::Next));
        assert_eq!(layout.resolve("prev"), Some(Field::Prev));
        assert_eq!(layout.resolve("data"), None);
        assert_eq!(layout.name(Field::Prev), "prev");
    }

    #[test]
    fn test_layout_rejects_bad_header() {
        assert!(Layout::new(Vec::<String>::new()).is_err());
        assert!(Layout::new(["a", "b", "c"]).is_err());
        assert_eq!(Layout::new(["link"]).unwrap().fields(), &[Field::Next]);
    }
}
