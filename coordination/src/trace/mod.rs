//! Stack-trace understanding
//!
//! Turns free-text error output from many ecosystems into a single
//! [`ErrorDescription`] tagged with the [`Dialect`] that recognized it.
//!
//! # Dialect priority
//!
//! ```text
//! Python ─► JavaScript ─► Java ─► C# ─► PHP ─► Ruby ─► Bare path:line ─► Fallback
//!   │           first signature that matches selects the dialect
//!   ▼
//! frames (text order) + error category/message ─► ErrorDescription
//! ```
//!
//! Zero frames in the selected dialect yields [`NotParseable`].

pub mod dialect;
pub mod parser;
pub mod types;

pub use dialect::{Dialect, GENERIC_ERROR_TYPE};
pub use parser::{parse_structure, NotParseable, TraceParser};
pub use types::{
    file_extension, language_for_extension, normalize_path, relative_to_root, ErrorDescription,
    FileRelation, RelationKind, StackFrame,
};
