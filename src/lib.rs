//! # psg-rs: Pointer-State Graphs in Rust
//!
//! **`psg-rs`** checks linked-list manipulating code for memory-safety defects
//! by replaying an execution trace against an abstract *points-to* model and
//! handing that model to a SAT solver.
//!
//! ## How it works
//!
//! The heap is abstracted as a collection of **pointer-state graphs** (PSGs).
//! Each PSG holds the `NULL` sentinel, pointer variables and allocated cells,
//! with `next` (and, for doubly-linked lists, `prev`) edges between them.
//! Replaying an event (assignment, field store, `free`, null test) edits the
//! graphs, after which they are re-partitioned so that every PSG is one
//! independent region of the heap.
//!
//! On demand every PSG is compiled into CNF, solved with a small DPLL
//! procedure, and nodes whose variables occur with a single polarity are
//! reported as suspicious (unreachable, always present, always absent),
//! together with the trace event that last touched them.
//!
//! ## Basic Usage
//!
//! ```rust
//! use psg_rs::layout::Layout;
//! use psg_rs::replay::Replayer;
//! use psg_rs::trace::{Event, Value};
//!
//! let mut replayer = Replayer::new(Layout::singly("next"));
//! replayer.step(&Event::assign(1, "p", Value::Alloc)).unwrap();
//! replayer.step(&Event::assign(2, "q", Value::var("p"))).unwrap();
//! replayer.step(&Event::free(3, "p")).unwrap();
//!
//! // `q` now dangles, alone in its own graph.
//! let psg = replayer.graph_of("q").unwrap();
//! assert_eq!(psg.node_count(), 1);
//!
//! let report = replayer.analyze().unwrap();
//! assert!(report.graphs.iter().all(|g| g.satisfiable));
//! ```
//!
//! ## Core Components
//!
//! - **[`bitset`]**: Growable bit vectors storing every edge relation.
//! - **[`psg`]**: The [`Psg`][crate::psg::Psg] graph and its node/edge mutators.
//! - **[`partition`]**: Reachability, component discovery, `divide` and `merge`.
//! - **[`cnf`]** and **[`sat`]**: Encoding into CNF and DPLL solving.
//! - **[`diagnostics`]**: Polarity analysis of the solved formula.
//! - **[`replay`]**: The trace [`Replayer`][crate::replay::Replayer].

pub mod bitset;
pub mod cnf;
pub mod diagnostics;
pub mod dot;
pub mod error;
pub mod layout;
pub mod partition;
pub mod psg;
pub mod replay;
pub mod sat;
pub mod trace;
pub mod types;
