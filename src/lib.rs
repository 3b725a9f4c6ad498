//! procdeck: cross-platform process supervision with a shell-style
//! command surface.
//!
//! The [`shell::Supervisor`] is the entry point: it parses commands,
//! spawns and tracks child processes, captures their output, and offers
//! job control (suspend, resume, terminate, interactive input).

pub mod shell;

pub use shell::{
    CommandParser, Environment, ExecutionOptions, ManagedProcess, ParsedCommand, ProcessGuard,
    ProcessInfo, ProcessState, Supervisor,
};
