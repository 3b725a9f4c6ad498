use crate::shell::builtins;
use crate::shell::environment::Environment;
use crate::shell::parser::{CommandParser, ParsedCommand, is_executable_file};
use crate::shell::process::ManagedProcess;
use crate::shell::types::{
    CompletionCallback, ExecutionOptions, OutputCallback, ProcessInfo, ProcessState, now_millis,
};
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Engine-assigned ids start here; OS pids are never exposed.
const FIRST_PROCESS_ID: i32 = 1000;

const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(10);

const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(5);

/// Top-level execution engine: owns the process table, the shared
/// reaper thread, the environment store, and shell configuration.
/// All operations are safe for concurrent callers.
pub struct Supervisor {
    shared: Arc<SupervisorShared>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

struct SupervisorShared {
    table: RwLock<HashMap<i32, Arc<ManagedProcess>>>,
    next_id: AtomicI32,
    env: Environment,
    settings: RwLock<ShellSettings>,
    reaper_active: AtomicBool,
    reaper_gate: Mutex<()>,
    reaper_wake: Condvar,
    reaper_interval: Mutex<Duration>,
}

struct ShellSettings {
    shell_path: PathBuf,
    current_dir: PathBuf,
    terminal: TerminalSettings,
}

#[derive(Debug, Clone, Copy)]
pub struct TerminalSettings {
    pub cols: u16,
    pub rows: u16,
    pub echo: bool,
    pub raw_mode: bool,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            echo: true,
            raw_mode: false,
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    /// Build a supervisor seeded from the enclosing process: system
    /// environment, `$SHELL` (or the platform default), current
    /// directory. The reaper does not run until `initialize`.
    pub fn new() -> Self {
        let env = Environment::new();
        env.import_from_system();

        let shell_path = if cfg!(windows) {
            PathBuf::from("cmd.exe")
        } else {
            let shell = env.get("SHELL");
            if shell.is_empty() {
                PathBuf::from("/bin/sh")
            } else {
                PathBuf::from(shell)
            }
        };
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));

        Self {
            shared: Arc::new(SupervisorShared {
                table: RwLock::new(HashMap::new()),
                next_id: AtomicI32::new(FIRST_PROCESS_ID),
                env,
                settings: RwLock::new(ShellSettings {
                    shell_path,
                    current_dir,
                    terminal: TerminalSettings::default(),
                }),
                reaper_active: AtomicBool::new(false),
                reaper_gate: Mutex::new(()),
                reaper_wake: Condvar::new(),
                reaper_interval: Mutex::new(DEFAULT_REAPER_INTERVAL),
            }),
            reaper: Mutex::new(None),
        }
    }

    /// Start the reaper thread. Idempotent; false only if the thread
    /// cannot be created, which leaves the engine unusable but intact.
    pub fn initialize(&self) -> bool {
        let mut reaper = self.reaper.lock().expect("reaper lock poisoned");
        if reaper.is_some() {
            return true;
        }
        self.shared.reaper_active.store(true, Ordering::SeqCst);
        let shared = self.shared.clone();
        match thread::Builder::new()
            .name("deck-reaper".to_string())
            .spawn(move || reaper_loop(shared))
        {
            Ok(handle) => {
                *reaper = Some(handle);
                true
            }
            Err(err) => {
                warn!("failed to start reaper thread: {}", err);
                self.shared.reaper_active.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Force-terminate every tracked process and stop the reaper.
    /// Idempotent and non-throwing.
    pub fn shutdown(&self) {
        {
            // Flip the flag while holding the gate so a reaper between
            // its flag check and its wait cannot miss the wakeup.
            let _gate = self.shared.reaper_gate.lock().expect("reaper gate poisoned");
            self.shared.reaper_active.store(false, Ordering::SeqCst);
            self.shared.reaper_wake.notify_all();
        }
        if let Some(handle) = self.reaper.lock().expect("reaper lock poisoned").take() {
            let _ = handle.join();
        }

        let drained: Vec<Arc<ManagedProcess>> = {
            let mut table = self.shared.table.write().expect("table lock poisoned");
            table.drain().map(|(_, p)| p).collect()
        };
        for process in &drained {
            if process.is_running() {
                process.terminate(true);
            }
        }
        debug!("shutdown complete, {} processes dropped", drained.len());
    }

    /// How often the reaper sweeps completed entries out of the table.
    pub fn set_reaper_interval(&self, interval: Duration) {
        *self.shared.reaper_interval.lock().expect("interval lock poisoned") = interval;
        self.shared.reaper_wake.notify_all();
    }

    pub(crate) fn next_id(&self) -> i32 {
        self.shared.next_id.fetch_add(1, Ordering::SeqCst)
    }

    // Execution

    /// Parse and run a command, blocking the calling thread until it
    /// reaches a terminal state. An invalid command yields a `Failed`
    /// snapshot with exit code -1. Builtins dispatch without spawning.
    /// A background request returns a `Running` snapshot immediately.
    pub fn execute_sync(&self, command: &str, options: &ExecutionOptions) -> ProcessInfo {
        let parsed = CommandParser::parse(command, &self.shared.env);
        if !parsed.is_valid() {
            return self.failed_info(command, -1);
        }
        if builtins::is_builtin(&parsed.executable) {
            return builtins::dispatch(self, &parsed, command);
        }

        let background = options.run_in_background || parsed.run_in_background;
        let (id, process) = self.create_process(&parsed, command, options);
        if !process.start(options, &self.merged_env(options)) {
            return process.info();
        }
        self.insert(id, process.clone());

        if background {
            return process.info();
        }
        while !process.is_complete() {
            thread::sleep(SYNC_POLL_INTERVAL);
        }
        process.info()
    }

    /// Spawn a command and return its id immediately; output and
    /// completion are delivered through the callbacks. -1 on parse or
    /// spawn failure. A builtin dispatches inline and still reports
    /// through the completion callback.
    pub fn execute_async(
        &self,
        command: &str,
        options: &ExecutionOptions,
        on_output: OutputCallback,
        on_complete: CompletionCallback,
    ) -> i32 {
        let parsed = CommandParser::parse(command, &self.shared.env);
        if !parsed.is_valid() {
            return -1;
        }
        if builtins::is_builtin(&parsed.executable) {
            let info = builtins::dispatch(self, &parsed, command);
            let id = info.pid;
            on_complete(info);
            return id;
        }

        let (id, process) = self.create_process(&parsed, command, options);
        process.set_output_callback(on_output);
        process.set_completion_callback(on_complete);
        if !process.start(options, &self.merged_env(options)) {
            return -1;
        }
        self.insert(id, process);
        id
    }

    /// Spawn a command for caller-driven I/O (`send_input`,
    /// `read_output`, `has_output`). -1 on parse or spawn failure.
    pub fn execute_interactive(&self, command: &str, options: &ExecutionOptions) -> i32 {
        let parsed = CommandParser::parse(command, &self.shared.env);
        if !parsed.is_valid() {
            return -1;
        }
        if builtins::is_builtin(&parsed.executable) {
            let info = builtins::dispatch(self, &parsed, command);
            return info.pid;
        }

        let (id, process) = self.create_process(&parsed, command, options);
        if !process.start(options, &self.merged_env(options)) {
            return -1;
        }
        self.insert(id, process);
        id
    }

    fn create_process(
        &self,
        parsed: &ParsedCommand,
        raw: &str,
        options: &ExecutionOptions,
    ) -> (i32, Arc<ManagedProcess>) {
        let id = self.next_id();
        let working_dir = options
            .working_directory
            .clone()
            .unwrap_or_else(|| self.current_directory());
        let process = Arc::new(ManagedProcess::new(
            id,
            raw,
            &parsed.executable,
            parsed.arguments.clone(),
            working_dir,
        ));
        (id, process)
    }

    fn merged_env(&self, options: &ExecutionOptions) -> HashMap<String, String> {
        let mut env = self.shared.env.snapshot();
        env.extend(options.environment.clone());
        env
    }

    fn insert(&self, id: i32, process: Arc<ManagedProcess>) {
        let mut table = self.shared.table.write().expect("table lock poisoned");
        table.insert(id, process);
    }

    fn lookup(&self, id: i32) -> Option<Arc<ManagedProcess>> {
        let table = self.shared.table.read().expect("table lock poisoned");
        table.get(&id).cloned()
    }

    fn failed_info(&self, command: &str, exit_code: i32) -> ProcessInfo {
        let mut info =
            ProcessInfo::new(self.next_id(), command, Vec::new(), self.current_directory());
        let now = now_millis();
        info.state = ProcessState::Failed;
        info.exit_code = exit_code;
        info.start_time = now;
        info.end_time = now;
        info
    }

    // Process queries & control (unknown ids yield defaults, never panic)

    pub fn process_info(&self, id: i32) -> ProcessInfo {
        match self.lookup(id) {
            Some(process) => process.info(),
            None => ProcessInfo::new(id, "", Vec::new(), self.current_directory()),
        }
    }

    pub fn all_processes(&self) -> Vec<ProcessInfo> {
        let table = self.shared.table.read().expect("table lock poisoned");
        let mut infos: Vec<ProcessInfo> = table.values().map(|p| p.info()).collect();
        infos.sort_by_key(|info| info.pid);
        infos
    }

    pub fn terminate_process(&self, id: i32, force: bool) -> bool {
        self.lookup(id).is_some_and(|p| p.terminate(force))
    }

    pub fn suspend_process(&self, id: i32) -> bool {
        self.lookup(id).is_some_and(|p| p.suspend())
    }

    pub fn resume_process(&self, id: i32) -> bool {
        self.lookup(id).is_some_and(|p| p.resume())
    }

    pub fn send_input(&self, id: i32, text: &str) -> bool {
        self.lookup(id).is_some_and(|p| p.send_input(text))
    }

    pub fn read_output(&self, id: i32, max_bytes: usize) -> String {
        self.lookup(id)
            .map(|p| p.read_output(max_bytes))
            .unwrap_or_default()
    }

    pub fn has_output(&self, id: i32) -> bool {
        self.lookup(id).is_some_and(|p| p.has_output())
    }

    pub fn clear_output(&self, id: i32) {
        if let Some(process) = self.lookup(id) {
            process.clear_output();
        }
    }

    // Shell configuration

    pub fn environment(&self) -> &Environment {
        &self.shared.env
    }

    pub fn shell_path(&self) -> PathBuf {
        self.shared
            .settings
            .read()
            .expect("settings lock poisoned")
            .shell_path
            .clone()
    }

    /// Accepts a path to an executable file, or a bare command name
    /// resolved on `PATH`. Prior state is kept on failure.
    pub fn set_shell_path(&self, path: &str) -> bool {
        let candidate = Path::new(path);
        let resolved = if candidate.components().count() > 1 {
            is_executable_file(candidate).then(|| candidate.to_path_buf())
        } else {
            which::which(path).ok()
        };
        match resolved {
            Some(resolved) => {
                self.shared
                    .settings
                    .write()
                    .expect("settings lock poisoned")
                    .shell_path = resolved;
                true
            }
            None => {
                debug!("rejecting shell path {:?}", path);
                false
            }
        }
    }

    pub fn current_directory(&self) -> PathBuf {
        self.shared
            .settings
            .read()
            .expect("settings lock poisoned")
            .current_dir
            .clone()
    }

    /// Change the working directory via the real chdir; on success the
    /// cached path is refreshed from the OS (resolving `..` and links).
    pub fn set_current_directory(&self, path: &str) -> bool {
        if std::env::set_current_dir(path).is_err() {
            return false;
        }
        let Ok(resolved) = std::env::current_dir() else {
            return false;
        };
        self.shared
            .settings
            .write()
            .expect("settings lock poisoned")
            .current_dir = resolved;
        true
    }

    pub fn terminal_settings(&self) -> TerminalSettings {
        self.shared
            .settings
            .read()
            .expect("settings lock poisoned")
            .terminal
    }

    /// Record the terminal geometry and mirror it into `COLUMNS` and
    /// `LINES` so children see the size.
    pub fn set_terminal_size(&self, cols: u16, rows: u16) {
        {
            let mut settings = self.shared.settings.write().expect("settings lock poisoned");
            settings.terminal.cols = cols;
            settings.terminal.rows = rows;
        }
        self.shared.env.set("COLUMNS", cols.to_string());
        self.shared.env.set("LINES", rows.to_string());
    }

    /// Toggle terminal echo. Best-effort: false where the platform or
    /// the controlling terminal does not support it.
    pub fn set_echo(&self, enable: bool) -> bool {
        self.shared
            .settings
            .write()
            .expect("settings lock poisoned")
            .terminal
            .echo = enable;
        apply_echo(enable)
    }

    /// Toggle raw (non-canonical) input mode. Best-effort as above.
    pub fn set_raw_mode(&self, raw: bool) -> bool {
        self.shared
            .settings
            .write()
            .expect("settings lock poisoned")
            .terminal
            .raw_mode = raw;
        apply_raw_mode(raw)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Periodically erase table entries whose process has reached a terminal
/// state; active entries are never touched. Woken early on shutdown or
/// interval change.
fn reaper_loop(shared: Arc<SupervisorShared>) {
    while shared.reaper_active.load(Ordering::SeqCst) {
        let removed = {
            let mut table = shared.table.write().expect("table lock poisoned");
            let before = table.len();
            table.retain(|_, process| !process.is_complete());
            before - table.len()
        };
        if removed > 0 {
            debug!("reaper removed {} completed processes", removed);
        }

        let interval = *shared.reaper_interval.lock().expect("interval lock poisoned");
        let gate = shared.reaper_gate.lock().expect("reaper gate poisoned");
        if !shared.reaper_active.load(Ordering::SeqCst) {
            break;
        }
        let _ = shared.reaper_wake.wait_timeout(gate, interval);
    }
}

#[cfg(unix)]
fn apply_echo(enable: bool) -> bool {
    use nix::sys::termios::{LocalFlags, SetArg, tcgetattr, tcsetattr};

    let stdin = std::io::stdin();
    let Ok(mut term) = tcgetattr(&stdin) else {
        return false;
    };
    if enable {
        term.local_flags |= LocalFlags::ECHO;
    } else {
        term.local_flags &= !LocalFlags::ECHO;
    }
    tcsetattr(&stdin, SetArg::TCSANOW, &term).is_ok()
}

#[cfg(not(unix))]
fn apply_echo(_enable: bool) -> bool {
    false
}

#[cfg(unix)]
fn apply_raw_mode(raw: bool) -> bool {
    use nix::sys::termios::{LocalFlags, SetArg, SpecialCharacterIndices, tcgetattr, tcsetattr};

    let stdin = std::io::stdin();
    let Ok(mut term) = tcgetattr(&stdin) else {
        return false;
    };
    if raw {
        term.local_flags &= !(LocalFlags::ICANON | LocalFlags::ECHO);
        term.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        term.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    } else {
        term.local_flags |= LocalFlags::ICANON | LocalFlags::ECHO;
    }
    tcsetattr(&stdin, SetArg::TCSANOW, &term).is_ok()
}

#[cfg(not(unix))]
fn apply_raw_mode(_raw: bool) -> bool {
    false
}

/// Scoped wrapper that terminates a still-active process when dropped,
/// unless released.
pub struct ProcessGuard<'a> {
    supervisor: &'a Supervisor,
    pid: i32,
    auto_terminate: bool,
}

impl<'a> ProcessGuard<'a> {
    pub fn new(supervisor: &'a Supervisor, pid: i32) -> Self {
        Self {
            supervisor,
            pid,
            auto_terminate: true,
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn info(&self) -> ProcessInfo {
        self.supervisor.process_info(self.pid)
    }

    /// Keep the process running past the guard's scope.
    pub fn release(&mut self) {
        self.auto_terminate = false;
    }
}

impl Drop for ProcessGuard<'_> {
    fn drop(&mut self) {
        if self.auto_terminate && self.pid > 0 && self.info().is_active() {
            self.supervisor.terminate_process(self.pid, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_id_yields_defaults() {
        let sup = Supervisor::new();
        let info = sup.process_info(424242);
        assert_eq!(info.pid, 424242);
        assert_eq!(info.state, ProcessState::NotStarted);
        assert!(!sup.terminate_process(424242, true));
        assert!(!sup.suspend_process(424242));
        assert!(!sup.resume_process(424242));
        assert!(!sup.send_input(424242, "x"));
        assert_eq!(sup.read_output(424242, 0), "");
        assert!(!sup.has_output(424242));
    }

    #[test]
    fn invalid_command_fails_without_spawning() {
        let sup = Supervisor::new();
        let info = sup.execute_sync("", &ExecutionOptions::default());
        assert_eq!(info.state, ProcessState::Failed);
        assert_eq!(info.exit_code, -1);

        let info = sup.execute_sync("echo 'unterminated", &ExecutionOptions::default());
        assert_eq!(info.state, ProcessState::Failed);
        assert_eq!(info.exit_code, -1);

        assert_eq!(
            sup.execute_async(
                "",
                &ExecutionOptions::default(),
                Box::new(|_, _| {}),
                Box::new(|_| {}),
            ),
            -1
        );
        assert_eq!(sup.execute_interactive("", &ExecutionOptions::default()), -1);
    }

    #[test]
    fn ids_are_assigned_from_the_counter() {
        let sup = Supervisor::new();
        let a = sup.next_id();
        let b = sup.next_id();
        assert!(a >= 1000);
        assert_eq!(b, a + 1);
    }

    #[test]
    fn shell_path_rejects_non_executables() {
        let sup = Supervisor::new();
        let original = sup.shell_path();
        assert!(!sup.set_shell_path("/definitely/not/a/real/shell"));
        assert_eq!(sup.shell_path(), original);
    }

    #[test]
    #[cfg(unix)]
    fn shell_path_accepts_real_shell() {
        let sup = Supervisor::new();
        assert!(sup.set_shell_path("/bin/sh"));
        assert_eq!(sup.shell_path(), PathBuf::from("/bin/sh"));
        // Bare names resolve on PATH.
        assert!(sup.set_shell_path("sh"));
    }

    #[test]
    fn terminal_size_mirrors_into_environment() {
        let sup = Supervisor::new();
        sup.set_terminal_size(132, 43);
        let settings = sup.terminal_settings();
        assert_eq!((settings.cols, settings.rows), (132, 43));
        assert_eq!(sup.environment().get("COLUMNS"), "132");
        assert_eq!(sup.environment().get("LINES"), "43");
    }

    #[test]
    fn initialize_and_shutdown_are_idempotent() {
        let sup = Supervisor::new();
        assert!(sup.initialize());
        assert!(sup.initialize());
        sup.shutdown();
        sup.shutdown();
    }

    #[test]
    fn bad_directory_leaves_state_unchanged() {
        let sup = Supervisor::new();
        let before = sup.current_directory();
        assert!(!sup.set_current_directory("/nonexistent/path/xyz"));
        assert_eq!(sup.current_directory(), before);
    }
}
