use std::collections::HashMap;
use std::path::PathBuf;

/// Execution state of a managed process.
///
/// Legal transitions: `NotStarted -> Running`, `Running <-> Suspended`,
/// and `Running -> {Completed, Failed, Terminated}`. The three terminal
/// states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running,
    /// Finished with exit code 0.
    Completed,
    /// Finished with a nonzero exit code, or never spawned successfully.
    Failed,
    /// Killed by a signal (or force-stopped by the engine).
    Terminated,
    /// Stopped via job control; resumable back to Running.
    Suspended,
}

impl ProcessState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessState::Completed | ProcessState::Failed | ProcessState::Terminated
        )
    }
}

/// Point-in-time snapshot of a managed process. Plain data, safe to send
/// across threads; it carries no handle to the process itself.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    /// Engine-assigned id (monotonically increasing, never reused while
    /// the table retains this entry). Not the OS pid.
    pub pid: i32,
    /// OS pid of the supervising process.
    pub parent_pid: i32,
    pub state: ProcessState,
    /// Meaningful only in a terminal state.
    pub exit_code: i32,
    /// Milliseconds since epoch; 0 until started.
    pub start_time: u64,
    /// Milliseconds since epoch; 0 while active.
    pub end_time: u64,
    /// The raw command line this process was created from.
    pub command: String,
    pub arguments: Vec<String>,
    pub working_dir: PathBuf,
}

impl ProcessInfo {
    pub fn new(pid: i32, command: &str, arguments: Vec<String>, working_dir: PathBuf) -> Self {
        Self {
            pid,
            parent_pid: std::process::id() as i32,
            state: ProcessState::NotStarted,
            exit_code: 0,
            start_time: 0,
            end_time: 0,
            command: command.to_string(),
            arguments,
            working_dir,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ProcessState::Running | ProcessState::Suspended)
    }

    /// Execution duration in milliseconds, using the current time while
    /// the process is still active.
    pub fn duration_ms(&self) -> u64 {
        if self.start_time == 0 {
            return 0;
        }
        let end = if self.end_time > 0 {
            self.end_time
        } else {
            now_millis()
        };
        end.saturating_sub(self.start_time)
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Options controlling a single execution.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Working directory; defaults to the supervisor's current directory.
    pub working_directory: Option<PathBuf>,
    /// Overlay merged onto the supervisor environment for this process.
    pub environment: HashMap<String, String>,
    /// When false, output still drains (the child must not block on a
    /// full pipe) but the buffers do not grow.
    pub capture_output: bool,
    /// Deliver stderr into the stdout stream.
    pub merge_stderr: bool,
    /// 0 = unbounded. Past the deadline the process is force-killed.
    pub timeout_ms: u64,
    pub run_in_background: bool,
    /// Niceness hint, clamped to [-20, 19]. Recorded, not applied.
    pub priority: i32,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            working_directory: None,
            environment: HashMap::new(),
            capture_output: true,
            merge_stderr: false,
            timeout_ms: 0,
            run_in_background: false,
            priority: 0,
        }
    }
}

impl ExecutionOptions {
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn timeout(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn background(mut self, bg: bool) -> Self {
        self.run_in_background = bg;
        self
    }

    pub fn priority(mut self, prio: i32) -> Self {
        self.priority = prio.clamp(-20, 19);
        self
    }
}

/// Invoked once per I/O read event with the chunk and whether it came
/// from stderr.
pub type OutputCallback = Box<dyn Fn(&str, bool) + Send + Sync + 'static>;

/// Invoked exactly once when the process reaches a terminal state.
pub type CompletionCallback = Box<dyn FnOnce(ProcessInfo) + Send + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(ProcessState::Completed.is_terminal());
        assert!(ProcessState::Failed.is_terminal());
        assert!(ProcessState::Terminated.is_terminal());
        assert!(!ProcessState::Running.is_terminal());
        assert!(!ProcessState::Suspended.is_terminal());
        assert!(!ProcessState::NotStarted.is_terminal());
    }

    #[test]
    fn active_covers_running_and_suspended() {
        let mut info = ProcessInfo::new(1000, "sleep 1", vec!["1".into()], PathBuf::from("/"));
        assert!(!info.is_active());
        info.state = ProcessState::Running;
        assert!(info.is_active());
        info.state = ProcessState::Suspended;
        assert!(info.is_active());
    }

    #[test]
    fn duration_uses_now_while_active() {
        let mut info = ProcessInfo::new(1000, "x", vec![], PathBuf::from("/"));
        assert_eq!(info.duration_ms(), 0);
        info.start_time = now_millis().saturating_sub(50);
        info.state = ProcessState::Running;
        assert!(info.duration_ms() >= 50);
        info.end_time = info.start_time + 10;
        assert_eq!(info.duration_ms(), 10);
    }

    #[test]
    fn priority_is_clamped() {
        let opts = ExecutionOptions::default().priority(99);
        assert_eq!(opts.priority, 19);
        let opts = ExecutionOptions::default().priority(-99);
        assert_eq!(opts.priority, -20);
    }
}
