//! Deterministic, pure logic shared by the agent.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod backoff;
pub mod branch;
pub mod command;
pub mod context;
pub mod continuation;
pub mod intent;
pub mod key_pool;
pub mod reply;
pub mod types;
pub mod verify;
