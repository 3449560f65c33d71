//! # rocwire-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `HardwareLink` — blocking command execution and event polling on a board
//!   - `EventPublisher` — fan-out of board events
//! - Own the **command dispatcher**: one worker thread holding the link, one
//!   ordered queue, a reply channel per round-trip
//! - Compile automation rules into board rule-slot updates (`RuleBook`)
//! - Expose the **platform** use-case service: rules, direct driver commands,
//!   switch queries, motion, board info
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `rocwire-domain` only (plus `tokio::sync` for channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod dispatcher;
pub mod event_bus;
pub mod ports;
pub mod rule_compiler;
pub mod services;
