//! PSG to DOT (Graphviz) conversion.
//!
//! The generated DOT output follows these conventions:
//! - The **sentinel** is rendered as a square labeled `NULL`
//! - **Pointer variables** and **cells** use distinct shapes
//! - **Edges**:
//!   - `next` edges use the configured next style (solid by default)
//!   - `prev` edges use the configured prev style (dashed by default)
//!   - Fictitious edges (sentinel to pointer variable) are dotted
//!
//! # Examples
//!
//! ```
//! use psg_rs::layout::Field;
//! use psg_rs::psg::Psg;
//!
//! let mut g = Psg::new(1);
//! let p = g.declare_variable("p");
//! g.link_to_null(p, Field::Next);
//!
//! let dot = g.to_dot().unwrap();
//! assert!(dot.contains("1 -> 0"));
//! ```

use std::fmt::Write as _;

use crate::layout::Field;
use crate::psg::{Psg, NULL};

/// Configuration options for DOT output generation.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for pointer-variable nodes (default: "box")
    pub pointer_shape: &'static str,
    /// Shape for cell nodes (default: "circle")
    pub cell_shape: &'static str,
    /// Shape for the sentinel (default: "square")
    pub null_shape: &'static str,
    /// Style for `next` edges (default: "solid")
    pub next_edge_style: &'static str,
    /// Style for `prev` edges (default: "dashed")
    pub prev_edge_style: &'static str,
    /// Style for fictitious edges (default: "dotted")
    pub fictitious_edge_style: &'static str,
    /// Whether to draw fictitious edges at all (default: true)
    pub show_fictitious: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            pointer_shape: "box",
            cell_shape: "circle",
            null_shape: "square",
            next_edge_style: "solid",
            prev_edge_style: "dashed",
            fictitious_edge_style: "dotted",
            show_fictitious: true,
        }
    }
}

impl Psg {
    /// Converts the graph to DOT format with the default configuration.
    pub fn to_dot(&self) -> Result<String, std::fmt::Error> {
        self.to_dot_with_config(&DotConfig::default())
    }

    /// Converts the graph to DOT format with custom configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use psg_rs::dot::DotConfig;
    /// use psg_rs::psg::Psg;
    ///
    /// let g = Psg::new(2);
    /// let config = DotConfig {
    ///     show_fictitious: false,
    ///     ..DotConfig::default()
    /// };
    /// let dot = g.to_dot_with_config(&config).unwrap();
    /// assert!(dot.starts_with("digraph"));
    /// ```
    pub fn to_dot_with_config(&self, config: &DotConfig) -> Result<String, std::fmt::Error> {
        let mut dot = String::new();
        writeln!(dot, "digraph {{")?;

        writeln!(dot, "{{ rank=sink")?;
        writeln!(dot, "{} [shape={}, label=\"NULL\"];", NULL, config.null_shape)?;
        writeln!(dot, "}}")?;

        for node in 1..=self.node_count() {
            let shape = if self.is_pointer(node) {
                config.pointer_shape
            } else {
                config.cell_shape
            };
            writeln!(dot, "{} [shape={}, label={:?}];", node, shape, self.name(node))?;
        }

        for node in 1..=self.node_count() {
            for &field in self.fields() {
                if let Some(target) = self.target(node, field) {
                    let style = match field {
                        Field::Next => config.next_edge_style,
                        Field::Prev => config.prev_edge_style,
                    };
                    writeln!(dot, "{} -> {} [style={}, label=\"{}\"];", node, target, style, field)?;
                }
            }
        }

        if config.show_fictitious {
            for node in self.pointers().filter(|&p| self.has_fictitious_edge(p)) {
                writeln!(
                    dot,
                    "{} -> {} [style={}, constraint=false];",
                    NULL, node, config.fictitious_edge_style
                )?;
            }
        }

        writeln!(dot, "}}")?;
        Ok(dot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_edges() {
        let mut g = Psg::new(2);
        let p = g.declare_variable("p");
        let c = g.allocate_and_link("c", p, Field::Next);
        g.link_to_null(c, Field::Next);
        g.link_to_null(c, Field::Prev);
        g.refresh_well_formedness();

        let dot = g.to_dot().unwrap();
        assert!(dot.contains("1 [shape=box, label=\"p\"];"));
        assert!(dot.contains("2 [shape=circle, label=\"c\"];"));
        assert!(dot.contains("1 -> 2 [style=solid, label=\"next\"];"));
        assert!(dot.contains("2 -> 0 [style=dashed, label=\"prev\"];"));
        assert!(dot.contains("0 -> 1 [style=dotted"));
    }

    #[test]
    fn test_dot_hides_fictitious() {
        let mut g = Psg::new(1);
        let p = g.declare_variable("p");
        g.link_to_null(p, Field::Next);
        g.refresh_well_formedness();
        let config = DotConfig {
            show_fictitious: false,
            ..DotConfig::default()
        };
        let dot = g.to_dot_with_config(&config).unwrap();
        assert!(!dot.contains("0 -> 1"));
    }
}
