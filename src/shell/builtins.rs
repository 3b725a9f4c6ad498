use crate::shell::parser::ParsedCommand;
use crate::shell::supervisor::Supervisor;
use crate::shell::types::{ProcessInfo, ProcessState, now_millis};
use log::debug;
use regex::Regex;
use std::sync::OnceLock;

/// Commands interpreted by the supervisor instead of being spawned.
/// This set is closed; it is checked before any spawn attempt.
pub const BUILTIN_NAMES: &[&str] = &["cd", "pwd", "echo", "exit", "jobs", "kill", "export"];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Run a builtin and produce a `ProcessInfo` shaped like a spawned
/// process's, for uniform history and reporting. Builtins report
/// success/failure only; rendering their output (`pwd` path, `echo`
/// text, `jobs` table) is the caller's responsibility.
pub fn dispatch(supervisor: &Supervisor, command: &ParsedCommand, raw: &str) -> ProcessInfo {
    let mut info = ProcessInfo::new(
        supervisor.next_id(),
        raw,
        command.arguments.clone(),
        supervisor.current_directory(),
    );
    info.start_time = now_millis();

    let exit_code = match command.executable.as_str() {
        "cd" => run_cd(supervisor, &command.arguments),
        "pwd" | "echo" | "jobs" => 0,
        "exit" => run_exit(&command.arguments),
        "kill" => run_kill(supervisor, &command.arguments),
        "export" => run_export(supervisor, &command.arguments),
        other => {
            debug!("unknown builtin {:?}", other);
            1
        }
    };

    // `exit` reports the requested code without counting as a failure.
    info.exit_code = exit_code;
    info.state = if exit_code == 0 || command.executable == "exit" {
        ProcessState::Completed
    } else {
        ProcessState::Failed
    };
    info.end_time = now_millis();
    info
}

/// `cd [dir]`. Defaults to `$HOME`, falling back to `/`.
fn run_cd(supervisor: &Supervisor, args: &[String]) -> i32 {
    let target = match args.first() {
        Some(dir) => dir.clone(),
        None => {
            let home = supervisor.environment().get("HOME");
            if home.is_empty() { "/".to_string() } else { home }
        }
    };
    if supervisor.set_current_directory(&target) { 0 } else { 1 }
}

/// `exit [code]`. Default 0; a non-numeric argument yields 1.
fn run_exit(args: &[String]) -> i32 {
    match args.first() {
        Some(arg) => arg.parse::<i32>().unwrap_or(1),
        None => 0,
    }
}

/// `kill <id>`. Graceful termination of a tracked process.
fn run_kill(supervisor: &Supervisor, args: &[String]) -> i32 {
    let Some(arg) = args.first() else {
        return 1;
    };
    let Ok(pid) = arg.parse::<i32>() else {
        return 1;
    };
    if supervisor.terminate_process(pid, false) { 0 } else { 1 }
}

fn var_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid pattern"))
}

/// `export NAME=VALUE ...`. Splits on the first `=`; arguments without
/// one, or with an invalid name, are silently skipped.
fn run_export(supervisor: &Supervisor, args: &[String]) -> i32 {
    for arg in args {
        let Some(idx) = arg.find('=') else {
            debug!("export: skipping malformed argument {:?}", arg);
            continue;
        };
        let (name, value) = (&arg[..idx], &arg[idx + 1..]);
        if !var_name_pattern().is_match(name) {
            debug!("export: skipping invalid variable name {:?}", name);
            continue;
        }
        supervisor.environment().set(name, value);
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_set_is_closed() {
        for name in ["cd", "pwd", "echo", "exit", "jobs", "kill", "export"] {
            assert!(is_builtin(name));
        }
        assert!(!is_builtin("ls"));
        assert!(!is_builtin("/bin/echo"));
        assert!(!is_builtin(""));
    }

    #[test]
    fn exit_code_parsing() {
        assert_eq!(run_exit(&[]), 0);
        assert_eq!(run_exit(&["7".into()]), 7);
        assert_eq!(run_exit(&["nope".into()]), 1);
    }

    #[test]
    fn export_name_validation() {
        assert!(var_name_pattern().is_match("HOME"));
        assert!(var_name_pattern().is_match("_private"));
        assert!(var_name_pattern().is_match("V2"));
        assert!(!var_name_pattern().is_match("2V"));
        assert!(!var_name_pattern().is_match("A-B"));
        assert!(!var_name_pattern().is_match(""));
    }
}
