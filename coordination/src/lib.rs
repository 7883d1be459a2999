//! timealready core library
//!
//! This library provides:
//! - Multi-dialect stack-trace parsing into structured error descriptions
//! - Call-chain relations read straight off the trace
//! - A fix memory of validated repairs, keyed by error fingerprint
//! - The escalation orchestrator that runs cheap generation, memory replay
//!   and smart generation in cost order
//!
//! # Modules
//!
//! - [`trace`]: dialect detection, frame extraction, failing-file hydration
//! - [`relations`]: caller → callee edges between adjacent frames
//! - [`memory`]: `FixMemory` contract plus in-memory, JSON file and RocksDB stores
//! - [`escalation`]: healing state machine, collaborator traits, prompt and diff
//!
//! # Features
//!
//! - `rocksdb-store`: enables [`memory::RocksFixMemory`]

#![allow(clippy::uninlined_format_args)]

pub mod escalation;
pub mod memory;
pub mod relations;
pub mod trace;

pub use escalation::{
    EscalationConfig, FixGenerator, FixOutcome, FixValidator, GenerationTier, HealingOrchestrator,
    ModelUsed,
};
pub use memory::{FixMemory, InMemoryFixMemory, JsonFileFixMemory, RepairStrategy};
pub use trace::{Dialect, ErrorDescription, NotParseable, StackFrame, TraceParser};
