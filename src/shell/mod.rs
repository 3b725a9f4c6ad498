//! Process supervision engine: a thread-safe environment store, a
//! shell-style command parser, per-process output capture, and a
//! supervisor that spawns, tracks, controls, and reaps child processes.

pub mod builtins;
pub mod environment;
pub mod io;
pub mod parser;
pub mod process;
pub mod supervisor;
pub mod types;

pub use environment::Environment;
pub use parser::{CommandParser, ParsedCommand};
pub use process::ManagedProcess;
pub use supervisor::{ProcessGuard, Supervisor, TerminalSettings};
pub use types::{
    CompletionCallback, ExecutionOptions, OutputCallback, ProcessInfo, ProcessState,
};
