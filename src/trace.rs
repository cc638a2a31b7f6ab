//! Decoded trace events, as delivered by a trace decoder.
//!
//! An event names a variable, optionally selects one of the declared fields
//! (`name->field`), and either carries a new value for that location or an
//! operation marker.
//!
//! | event                                         | source form        |
//! |-----------------------------------------------|--------------------|
//! | `name`                                        | `T *p;`            |
//! | `name = Null`                                 | `p = NULL;`        |
//! | `name = Alloc`                                | `p = malloc(..);`  |
//! | `name = Var(q)`                               | `p = q;`           |
//! | `name->f = Field { name: q, field: g }`       | `p->f = q->g;`     |
//! | `op = Free`                                   | `free(p);`         |
//! | `op = NullCheck` / `op = DanglingCheck`       | `if (p == NULL)`   |

use std::fmt;

/// Opaque event identifier, only used for reporting.
pub type TraceId = u64;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Value {
    Null,
    Alloc,
    Var(String),
    Field { name: String, field: String },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Op {
    Free,
    NullCheck,
    DanglingCheck,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Event {
    pub id: TraceId,
    pub name: String,
    pub field: Option<String>,
    pub op: Option<Op>,
    pub value: Option<Value>,
}

impl Event {
    fn base(id: TraceId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            field: None,
            op: None,
            value: None,
        }
    }

    /// `T *name;`
    pub fn declare(id: TraceId, name: &str) -> Self {
        Self::base(id, name)
    }

    /// `name = value;`
    pub fn assign(id: TraceId, name: &str, value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::base(id, name)
        }
    }

    /// `name->field = value;`
    pub fn store(id: TraceId, name: &str, field: &str, value: Value) -> Self {
        Self {
            field: Some(field.to_string()),
            value: Some(value),
            ..Self::base(id, name)
        }
    }

    /// An operation on `name` (or on `name->field`).
    pub fn op(id: TraceId, name: &str, field: Option<&str>, op: Op) -> Self {
        Self {
            field: field.map(str::to_string),
            op: Some(op),
            ..Self::base(id, name)
        }
    }

    /// `free(name);`
    pub fn free(id: TraceId, name: &str) -> Self {
        Self::op(id, name, None, Op::Free)
    }

    /// The location written or inspected, as source text.
    pub fn location(&self) -> String {
        match &self.field {
            Some(field) => format!("{}->{}", self.name, field),
            None => self.name.clone(),
        }
    }
}

impl Value {
    pub fn var(name: &str) -> Self {
        Value::Var(name.to_string())
    }

    pub fn field(name: &str, field: &str) -> Self {
        Value::Field {
            name: name.to_string(),
            field: field.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Alloc => write!(f, "malloc()"),
            Value::Var(name) => write!(f, "{}", name),
            Value::Field { name, field } => write!(f, "{}->{}", name, field),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ", self.id)?;
        match (self.op, &self.value) {
            (Some(Op::Free), _) => write!(f, "free({})", self.location()),
            (Some(Op::NullCheck), _) => write!(f, "{} == NULL?", self.location()),
            (Some(Op::DanglingCheck), _) => write!(f, "use {}", self.location()),
            (None, Some(value)) => write!(f, "{} = {}", self.location(), value),
            (None, None) => write!(f, "decl {}", self.location()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        assert_eq!(Event::declare(1, "p").to_string(), "#1 decl p");
        assert_eq!(Event::assign(2, "p", Value::Alloc).to_string(), "#2 p = malloc()");
        assert_eq!(
            Event::store(3, "p", "next", Value::field("q", "prev")).to_string(),
            "#3 p->next = q->prev"
        );
        assert_eq!(Event::free(4, "p").to_string(), "#4 free(p)");
        assert_eq!(
            Event::op(5, "p", Some("next"), Op::NullCheck).to_string(),
            "#5 p->next == NULL?"
        );
    }
}
