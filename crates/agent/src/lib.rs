//! # Pagemind Agent
//!
//! The cognition loop: Think → Page → Evaluate → Execute, one phase per
//! model round-trip. Each [`Agent::step`]:
//!
//! 1. composes the request for the current phase ([`composer`]),
//! 2. posts it through a [`ChatProvider`](pagemind_core::ChatProvider),
//! 3. extracts directives from the response ([`parser`]),
//! 4. applies them to memory ([`mutator`]),
//! 5. transitions the phase, paging first when memory overflows.

pub mod composer;
pub mod machine;
pub mod mutator;
pub mod parser;
pub mod state;

pub use machine::Agent;
pub use mutator::MutatorLimits;
pub use parser::parse_response;
pub use state::AgentState;
