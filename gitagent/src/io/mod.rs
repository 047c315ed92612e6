//! I/O for the agent: git subprocesses, persistence, network clients and prompts.

pub mod config;
pub mod confirm;
pub mod entitlement;
pub mod executor;
pub mod git;
pub mod identity;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod session_store;
