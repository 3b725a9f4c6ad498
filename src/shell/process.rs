use crate::shell::io::ProcessIo;
use crate::shell::types::{
    CompletionCallback, ExecutionOptions, OutputCallback, ProcessInfo, ProcessState, now_millis,
};
use log::{debug, warn};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Upper bound on exit-detection latency when the child produces no
/// output.
const EXIT_WAIT_INTERVAL: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 4096;

/// One spawned child process: owns the platform handle, drives the
/// monitor thread, buffers output, and exposes job control.
///
/// The monitor thread is the single writer of terminal state; the
/// completion callback fires exactly once no matter how the process
/// ends (natural exit, signal, timeout, shutdown, drop).
pub struct ManagedProcess {
    shared: Arc<ProcessShared>,
    executable: String,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

struct ProcessShared {
    info: Mutex<ProcessInfo>,
    io: ProcessIo,
    stdin: Mutex<Option<ChildStdin>>,
    /// OS pid of the child; 0 until spawned.
    os_pid: AtomicU32,
    running: AtomicBool,
    monitor_active: AtomicBool,
    finished: AtomicBool,
    /// Set when the engine itself kills the child. Some platforms report
    /// such a kill as a plain exit code rather than a signal.
    kill_requested: AtomicBool,
    output_cb: Mutex<Option<Arc<dyn Fn(&str, bool) + Send + Sync>>>,
    completion_cb: Mutex<Option<CompletionCallback>>,
}

impl ManagedProcess {
    pub fn new(
        pid: i32,
        command: &str,
        executable: &str,
        arguments: Vec<String>,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            shared: Arc::new(ProcessShared {
                info: Mutex::new(ProcessInfo::new(pid, command, arguments, working_dir)),
                io: ProcessIo::new(),
                stdin: Mutex::new(None),
                os_pid: AtomicU32::new(0),
                running: AtomicBool::new(false),
                monitor_active: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                kill_requested: AtomicBool::new(false),
                output_cb: Mutex::new(None),
                completion_cb: Mutex::new(None),
            }),
            executable: executable.to_string(),
            monitor: Mutex::new(None),
        }
    }

    pub fn set_output_callback(&self, callback: OutputCallback) {
        *self.shared.output_cb.lock().expect("callback lock poisoned") = Some(Arc::from(callback));
    }

    pub fn set_completion_callback(&self, callback: CompletionCallback) {
        *self.shared.completion_cb.lock().expect("callback lock poisoned") = Some(callback);
    }

    /// Spawn the child and start the monitor thread. Non-blocking; fails
    /// if the process was already started. On spawn failure the snapshot
    /// lands in `Failed` with a classifying exit code.
    pub fn start(&self, options: &ExecutionOptions, env: &HashMap<String, String>) -> bool {
        if self.state() != ProcessState::NotStarted {
            return false;
        }
        if options.priority != 0 {
            debug!(
                "priority hint {} recorded for {:?} (not applied)",
                options.priority.clamp(-20, 19),
                self.executable
            );
        }

        let (arguments, working_dir) = {
            let info = self.shared.info.lock().expect("info lock poisoned");
            (info.arguments.clone(), info.working_dir.clone())
        };

        let mut command = Command::new(&self.executable);
        command
            .args(&arguments)
            .current_dir(&working_dir)
            .env_clear()
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!("failed to spawn {:?}: {}", self.executable, err);
                self.mark_spawn_failure(spawn_error_code(&err));
                return false;
            }
        };

        self.shared.os_pid.store(child.id(), Ordering::SeqCst);
        {
            let mut info = self.shared.info.lock().expect("info lock poisoned");
            info.state = ProcessState::Running;
            info.start_time = now_millis();
        }
        self.shared.running.store(true, Ordering::SeqCst);
        *self.shared.stdin.lock().expect("stdin lock poisoned") = child.stdin.take();

        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(spawn_reader(self.shared.clone(), out, false, options));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(spawn_reader(self.shared.clone(), err, true, options));
        }

        self.shared.monitor_active.store(true, Ordering::SeqCst);
        let shared = self.shared.clone();
        let deadline = (options.timeout_ms > 0)
            .then(|| Instant::now() + Duration::from_millis(options.timeout_ms));
        let name = format!("deck-monitor-{}", self.shared.os_pid.load(Ordering::SeqCst));
        match thread::Builder::new()
            .name(name)
            .spawn(move || monitor_loop(shared, child, readers, deadline))
        {
            Ok(handle) => {
                *self.monitor.lock().expect("monitor lock poisoned") = Some(handle);
                true
            }
            Err(err) => {
                // Resource exhaustion: nothing is watching the child, so
                // it cannot be tracked. Kill it and report failure.
                warn!("failed to start monitor thread: {}", err);
                self.terminate(true);
                self.mark_spawn_failure(-1);
                false
            }
        }
    }

    fn mark_spawn_failure(&self, exit_code: i32) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.finished.store(true, Ordering::SeqCst);
        let mut info = self.shared.info.lock().expect("info lock poisoned");
        let now = now_millis();
        info.state = ProcessState::Failed;
        info.exit_code = exit_code;
        if info.start_time == 0 {
            info.start_time = now;
        }
        info.end_time = now;
    }

    /// Request termination: SIGTERM when `force` is false, SIGKILL when
    /// true. The monitor thread observes the resulting exit and records
    /// `Terminated`. Returns true if the signal was delivered, or if the
    /// process is already in a terminal state.
    pub fn terminate(&self, force: bool) -> bool {
        if self.is_complete() {
            return true;
        }
        let pid = self.shared.os_pid.load(Ordering::SeqCst);
        if pid == 0 {
            return false;
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            let suspended = self.state() == ProcessState::Suspended;
            let target = Pid::from_raw(pid as i32);
            let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
            let sent = kill(target, signal).is_ok();
            if sent && suspended && !force {
                // A stopped child cannot act on SIGTERM until it runs.
                let _ = kill(target, Signal::SIGCONT);
            }
            sent
        }
        #[cfg(not(unix))]
        {
            // No graceful path: ask the monitor to kill and reap.
            let _ = force;
            self.shared.monitor_active.store(false, Ordering::SeqCst);
            true
        }
    }

    /// Stop the child via job control. Only legal from `Running`.
    pub fn suspend(&self) -> bool {
        if self.state() != ProcessState::Running || !self.shared.running.load(Ordering::SeqCst) {
            return false;
        }
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            let pid = self.shared.os_pid.load(Ordering::SeqCst);
            if pid == 0 {
                return false;
            }
            if kill(Pid::from_raw(pid as i32), Signal::SIGSTOP).is_ok() {
                self.shared.info.lock().expect("info lock poisoned").state =
                    ProcessState::Suspended;
                debug!("suspended process {}", pid);
                return true;
            }
            false
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    /// Resume a suspended child. Only legal from `Suspended`.
    pub fn resume(&self) -> bool {
        if self.state() != ProcessState::Suspended {
            return false;
        }
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            let pid = self.shared.os_pid.load(Ordering::SeqCst);
            if pid == 0 {
                return false;
            }
            if kill(Pid::from_raw(pid as i32), Signal::SIGCONT).is_ok() {
                self.shared.info.lock().expect("info lock poisoned").state = ProcessState::Running;
                debug!("resumed process {}", pid);
                return true;
            }
            false
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    /// Write to the child's stdin. False once the process has exited or
    /// the input pipe has closed.
    pub fn send_input(&self, text: &str) -> bool {
        if !self.shared.running.load(Ordering::SeqCst) {
            return false;
        }
        let mut guard = self.shared.stdin.lock().expect("stdin lock poisoned");
        let Some(stdin) = guard.as_mut() else {
            return false;
        };
        match stdin.write_all(text.as_bytes()).and_then(|_| stdin.flush()) {
            Ok(()) => true,
            Err(err) => {
                debug!("stdin write failed, closing pipe: {}", err);
                guard.take();
                false
            }
        }
    }

    /// Buffered combined output, capped at `max_bytes` (0 = unbounded).
    /// Non-destructive; data persists until `clear_output`.
    pub fn read_output(&self, max_bytes: usize) -> String {
        self.shared.io.combined_capped(max_bytes)
    }

    pub fn has_output(&self) -> bool {
        self.shared.io.has_data()
    }

    pub fn clear_output(&self) {
        self.shared.io.clear();
    }

    pub fn stdout(&self) -> String {
        self.shared.io.stdout()
    }

    pub fn stderr(&self) -> String {
        self.shared.io.stderr()
    }

    pub fn info(&self) -> ProcessInfo {
        self.shared.info.lock().expect("info lock poisoned").clone()
    }

    pub fn state(&self) -> ProcessState {
        self.shared.info.lock().expect("info lock poisoned").state
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.state().is_terminal()
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        // No orphaned children: a still-active process is force-killed.
        if self.is_running() {
            self.terminate(true);
        }
        self.shared.monitor_active.store(false, Ordering::SeqCst);
        if let Some(handle) = self.monitor.lock().expect("monitor lock poisoned").take() {
            let _ = handle.join();
        }
    }
}

fn spawn_error_code(err: &std::io::Error) -> i32 {
    match err.kind() {
        std::io::ErrorKind::NotFound => 127,
        std::io::ErrorKind::PermissionDenied => 126,
        _ => -1,
    }
}

/// Drain one child pipe until EOF, appending to the buffer and firing
/// the output callback once per read event. With `capture_output` off
/// the pipe still drains so the child never blocks on a full pipe.
fn spawn_reader(
    shared: Arc<ProcessShared>,
    mut pipe: impl Read + Send + 'static,
    is_stderr: bool,
    options: &ExecutionOptions,
) -> JoinHandle<()> {
    let capture = options.capture_output;
    // Merged stderr is delivered as stdout.
    let as_stderr = is_stderr && !options.merge_stderr;
    thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = &buf[..n];
                    if capture {
                        if as_stderr {
                            shared.io.append_stderr(chunk);
                        } else {
                            shared.io.append_stdout(chunk);
                        }
                    }
                    // Clone out so the callback runs without the lock
                    // and may replace itself.
                    let cb = shared.output_cb.lock().expect("callback lock poisoned").clone();
                    if let Some(cb) = cb {
                        cb(&String::from_utf8_lossy(chunk), as_stderr);
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    // The stream goes silent; exit is detected separately.
                    debug!("pipe read ended: {}", err);
                    break;
                }
            }
        }
    })
}

/// Wait for the child with a bounded timeout, handling stop requests and
/// the execution deadline, then record the terminal state. Readers are
/// joined before completion fires so all observed output is delivered
/// first.
fn monitor_loop(
    shared: Arc<ProcessShared>,
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    deadline: Option<Instant>,
) {
    let mut killed = false;
    let status = loop {
        match child.wait_timeout(EXIT_WAIT_INTERVAL) {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if !shared.monitor_active.load(Ordering::SeqCst) && !killed {
                    debug!("monitor stop requested, killing child {}", child.id());
                    shared.kill_requested.store(true, Ordering::SeqCst);
                    let _ = child.kill();
                    killed = true;
                } else if let Some(deadline) = deadline
                    && Instant::now() >= deadline
                    && !killed
                {
                    warn!("child {} exceeded its deadline, killing", child.id());
                    shared.kill_requested.store(true, Ordering::SeqCst);
                    let _ = child.kill();
                    killed = true;
                }
            }
            Err(err) => {
                warn!("wait on child {} failed: {}", child.id(), err);
                break None;
            }
        }
    };

    // Close our stdin end so later send_input calls report false.
    shared.stdin.lock().expect("stdin lock poisoned").take();
    for reader in readers {
        let _ = reader.join();
    }
    shared.finish(status);
}

impl ProcessShared {
    /// Record the terminal state and fire the completion callback.
    /// Guarded by `finished` so it runs at most once.
    fn finish(&self, status: Option<ExitStatus>) {
        self.running.store(false, Ordering::SeqCst);
        self.monitor_active.store(false, Ordering::SeqCst);
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }

        let engine_kill = self.kill_requested.load(Ordering::SeqCst);
        let final_info = {
            let mut info = self.info.lock().expect("info lock poisoned");
            info.end_time = now_millis();
            match status {
                Some(status) => {
                    let code = status.code();
                    info.state = classify_exit(code, engine_kill);
                    info.exit_code = match code {
                        Some(code) => code,
                        None => signal_code(&status),
                    };
                }
                None => {
                    info.state = ProcessState::Failed;
                    info.exit_code = -1;
                }
            }
            info.clone()
        };

        debug!(
            "process {} reached {:?} (exit code {})",
            final_info.pid, final_info.state, final_info.exit_code
        );
        let callback = self.completion_cb.lock().expect("callback lock poisoned").take();
        if let Some(callback) = callback {
            callback(final_info);
        }
    }
}

/// Map a reaped exit to a terminal state. `code` is `ExitStatus::code()`;
/// `None` means a signal exit. A kill the engine issued itself counts as
/// `Terminated` even when the platform reports it as a nonzero exit code,
/// unless the child managed a clean exit first.
fn classify_exit(code: Option<i32>, engine_kill: bool) -> ProcessState {
    match code {
        Some(0) => ProcessState::Completed,
        Some(_) if engine_kill => ProcessState::Terminated,
        Some(_) => ProcessState::Failed,
        None => ProcessState::Terminated,
    }
}

#[cfg(unix)]
fn signal_code(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().unwrap_or(-1)
}

#[cfg(not(unix))]
fn signal_code(_status: &ExitStatus) -> i32 {
    -1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn system_env() -> HashMap<String, String> {
        std::env::vars().collect()
    }

    fn wait_complete(process: &ManagedProcess, timeout: Duration) -> ProcessInfo {
        let start = Instant::now();
        while !process.is_complete() {
            assert!(start.elapsed() < timeout, "process did not finish in time");
            thread::sleep(Duration::from_millis(10));
        }
        process.info()
    }

    fn cwd() -> PathBuf {
        std::env::current_dir().unwrap()
    }

    #[test]
    #[cfg(unix)]
    fn echo_completes_with_captured_stdout() {
        let p = ManagedProcess::new(1000, "/bin/echo hello", "/bin/echo", vec!["hello".into()], cwd());
        assert!(p.start(&ExecutionOptions::default(), &system_env()));
        let info = wait_complete(&p, Duration::from_secs(5));
        assert_eq!(info.state, ProcessState::Completed);
        assert_eq!(info.exit_code, 0);
        assert!(info.end_time >= info.start_time);
        assert!(p.stdout().contains("hello"));
    }

    #[test]
    #[cfg(unix)]
    fn nonzero_exit_is_failed() {
        let p = ManagedProcess::new(1001, "false", "false", vec![], cwd());
        assert!(p.start(&ExecutionOptions::default(), &system_env()));
        let info = wait_complete(&p, Duration::from_secs(5));
        assert_eq!(info.state, ProcessState::Failed);
        assert_ne!(info.exit_code, 0);
    }

    #[test]
    fn missing_executable_fails_to_start() {
        let p = ManagedProcess::new(1002, "no-such-binary-xyz", "no-such-binary-xyz", vec![], cwd());
        assert!(!p.start(&ExecutionOptions::default(), &system_env()));
        let info = p.info();
        assert_eq!(info.state, ProcessState::Failed);
        assert_eq!(info.exit_code, 127);
    }

    #[test]
    #[cfg(unix)]
    fn start_twice_fails() {
        let p = ManagedProcess::new(1003, "/bin/echo x", "/bin/echo", vec!["x".into()], cwd());
        assert!(p.start(&ExecutionOptions::default(), &system_env()));
        assert!(!p.start(&ExecutionOptions::default(), &system_env()));
        wait_complete(&p, Duration::from_secs(5));
        // Terminal states cannot be restarted either.
        assert!(!p.start(&ExecutionOptions::default(), &system_env()));
    }

    #[test]
    #[cfg(unix)]
    fn read_output_is_capped_and_persistent() {
        let p = ManagedProcess::new(1004, "/bin/echo 0123456789", "/bin/echo", vec!["0123456789".into()], cwd());
        assert!(p.start(&ExecutionOptions::default(), &system_env()));
        wait_complete(&p, Duration::from_secs(5));
        assert_eq!(p.read_output(4), "0123");
        let full = p.read_output(0);
        assert!(full.contains("0123456789"));
        assert_eq!(p.read_output(0), full);
        p.clear_output();
        assert_eq!(p.read_output(0), "");
        assert!(!p.has_output());
    }

    #[test]
    #[cfg(unix)]
    fn terminate_kills_sleeping_child() {
        let p = ManagedProcess::new(1005, "sleep 30", "sleep", vec!["30".into()], cwd());
        assert!(p.start(&ExecutionOptions::default(), &system_env()));
        assert!(p.terminate(true));
        let info = wait_complete(&p, Duration::from_secs(5));
        assert_eq!(info.state, ProcessState::Terminated);
    }

    #[test]
    #[cfg(unix)]
    fn terminate_is_noop_after_exit() {
        let p = ManagedProcess::new(1006, "/bin/echo x", "/bin/echo", vec!["x".into()], cwd());
        assert!(p.start(&ExecutionOptions::default(), &system_env()));
        wait_complete(&p, Duration::from_secs(5));
        assert!(p.terminate(false));
        assert!(p.terminate(true));
    }

    #[test]
    #[cfg(unix)]
    fn timeout_terminates_child() {
        let p = ManagedProcess::new(1007, "sleep 30", "sleep", vec!["30".into()], cwd());
        let options = ExecutionOptions::default().timeout(200);
        assert!(p.start(&options, &system_env()));
        let info = wait_complete(&p, Duration::from_secs(5));
        assert_eq!(info.state, ProcessState::Terminated);
        assert!(info.duration_ms() < 5_000);
    }

    #[test]
    #[cfg(unix)]
    fn merged_stderr_lands_in_stdout() {
        let p = ManagedProcess::new(
            1008,
            "sh -c",
            "sh",
            vec!["-c".into(), "echo err >&2".into()],
            cwd(),
        );
        let options = ExecutionOptions {
            merge_stderr: true,
            ..Default::default()
        };
        assert!(p.start(&options, &system_env()));
        wait_complete(&p, Duration::from_secs(5));
        assert!(p.stdout().contains("err"));
        assert!(p.stderr().is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn capture_disabled_skips_buffering() {
        let p = ManagedProcess::new(1009, "/bin/echo quiet", "/bin/echo", vec!["quiet".into()], cwd());
        let options = ExecutionOptions {
            capture_output: false,
            ..Default::default()
        };
        assert!(p.start(&options, &system_env()));
        let info = wait_complete(&p, Duration::from_secs(5));
        assert_eq!(info.state, ProcessState::Completed);
        assert!(!p.has_output());
    }

    #[test]
    #[cfg(unix)]
    fn send_input_reaches_child() {
        let p = ManagedProcess::new(1010, "cat", "cat", vec![], cwd());
        assert!(p.start(&ExecutionOptions::default(), &system_env()));
        assert!(p.send_input("ping\n"));
        let start = Instant::now();
        while !p.has_output() && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(p.read_output(0).contains("ping"));
        p.terminate(true);
        wait_complete(&p, Duration::from_secs(5));
        assert!(!p.send_input("late\n"));
    }

    #[test]
    #[cfg(unix)]
    fn output_callback_fires_per_chunk() {
        use std::sync::atomic::AtomicUsize;

        let chunks = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(String::new()));
        let p = ManagedProcess::new(1011, "/bin/echo cb", "/bin/echo", vec!["cb".into()], cwd());
        {
            let chunks = chunks.clone();
            let seen = seen.clone();
            p.set_output_callback(Box::new(move |chunk, is_stderr| {
                assert!(!is_stderr);
                chunks.fetch_add(1, Ordering::SeqCst);
                seen.lock().unwrap().push_str(chunk);
            }));
        }
        assert!(p.start(&ExecutionOptions::default(), &system_env()));
        wait_complete(&p, Duration::from_secs(5));
        assert!(chunks.load(Ordering::SeqCst) >= 1);
        assert!(seen.lock().unwrap().contains("cb"));
    }

    #[test]
    #[cfg(unix)]
    fn completion_fires_once_despite_double_terminate() {
        use std::sync::atomic::AtomicUsize;

        let fired = Arc::new(AtomicUsize::new(0));
        let p = ManagedProcess::new(1012, "sleep 30", "sleep", vec!["30".into()], cwd());
        {
            let fired = fired.clone();
            p.set_completion_callback(Box::new(move |info| {
                assert!(info.state.is_terminal());
                fired.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert!(p.start(&ExecutionOptions::default(), &system_env()));
        assert!(p.terminate(false));
        assert!(p.terminate(true) || p.is_complete());
        wait_complete(&p, Duration::from_secs(5));
        // Give a straggling callback a moment to misfire before checking.
        thread::sleep(Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn engine_kill_classifies_as_terminated() {
        assert_eq!(classify_exit(Some(0), false), ProcessState::Completed);
        // Clean exit wins even over a racing kill request.
        assert_eq!(classify_exit(Some(0), true), ProcessState::Completed);
        assert_eq!(classify_exit(Some(1), false), ProcessState::Failed);
        // A nonzero code from our own kill is not a child failure.
        assert_eq!(classify_exit(Some(1), true), ProcessState::Terminated);
        assert_eq!(classify_exit(None, false), ProcessState::Terminated);
        assert_eq!(classify_exit(None, true), ProcessState::Terminated);
    }

    #[test]
    #[cfg(unix)]
    fn output_callback_may_replace_itself() {
        use std::sync::atomic::AtomicUsize;

        let p = Arc::new(ManagedProcess::new(
            1014,
            "/bin/echo swap",
            "/bin/echo",
            vec!["swap".into()],
            cwd(),
        ));
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let p2 = p.clone();
            let fired = fired.clone();
            p.set_output_callback(Box::new(move |_, _| {
                fired.fetch_add(1, Ordering::SeqCst);
                // Re-entrant registration must not deadlock the reader.
                p2.set_output_callback(Box::new(|_, _| {}));
            }));
        }
        assert!(p.start(&ExecutionOptions::default(), &system_env()));
        wait_complete(&p, Duration::from_secs(5));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[cfg(unix)]
    fn suspend_and_resume_cycle() {
        let p = ManagedProcess::new(1013, "sleep 30", "sleep", vec!["30".into()], cwd());
        assert!(p.start(&ExecutionOptions::default(), &system_env()));
        assert!(p.suspend());
        assert_eq!(p.state(), ProcessState::Suspended);
        assert!(!p.suspend());
        assert!(p.resume());
        assert_eq!(p.state(), ProcessState::Running);
        assert!(!p.resume());
        p.terminate(true);
        wait_complete(&p, Duration::from_secs(5));
    }
}
