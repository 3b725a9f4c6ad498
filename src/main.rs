mod cli;
mod config;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use colored::*;
use procdeck::shell::builtins;
use procdeck::{CommandParser, ExecutionOptions, ProcessInfo, ProcessState, Supervisor};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread;
use std::time::Duration;

const REPL_POLL_INTERVAL: Duration = Duration::from_millis(20);

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("procdeck.toml"));
    let config = config::load_config(&config_path)?;

    let supervisor = Arc::new(Supervisor::new());
    for (key, value) in &config.env {
        supervisor.environment().set(key, value.clone());
    }
    if let Some(shell) = &config.shell
        && !supervisor.set_shell_path(shell)
    {
        eprintln!("{} Ignoring invalid shell {:?}", "warn".yellow(), shell);
    }
    if let Some(secs) = config.reaper_interval_secs {
        supervisor.set_reaper_interval(Duration::from_secs(secs));
    }
    if !supervisor.initialize() {
        anyhow::bail!("Failed to start the supervisor");
    }

    let exit_code = match &cli.command {
        Some(command) => run_one_shot(&supervisor, command, cli.timeout),
        None => run_repl(&supervisor, &config)?,
    };

    supervisor.shutdown();
    std::process::exit(exit_code);
}

fn run_one_shot(supervisor: &Supervisor, command: &str, timeout: Option<u64>) -> i32 {
    let mut options = ExecutionOptions::default();
    if let Some(ms) = timeout {
        options = options.timeout(ms);
    }
    let info = supervisor.execute_sync(command, &options);
    let output = supervisor.read_output(info.pid, 0);
    if !output.is_empty() {
        print!("{}", output);
    }
    render_builtin(supervisor, &info);
    info.exit_code
}

fn run_repl(supervisor: &Arc<Supervisor>, config: &config::DeckConfig) -> Result<i32> {
    let foreground = Arc::new(AtomicI32::new(0));
    {
        let fg = foreground.clone();
        let sup = supervisor.clone();
        ctrlc::set_handler(move || {
            let id = fg.load(Ordering::SeqCst);
            if id > 0 {
                sup.terminate_process(id, false);
            } else {
                println!();
            }
        })?;
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        // A configured prompt is taken verbatim; the default shows the cwd.
        let prompt = config
            .prompt
            .clone()
            .unwrap_or_else(|| format!("{}> ", supervisor.current_directory().display()));
        print!("{}", prompt.cyan().bold());
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            // EOF ends the session like `exit`.
            println!();
            return Ok(0);
        };
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parsed = CommandParser::parse(line, supervisor.environment());
        if !parsed.is_valid() {
            eprintln!("{} Could not parse command", "error".red());
            continue;
        }

        if builtins::is_builtin(&parsed.executable) {
            let info = supervisor.execute_sync(line, &ExecutionOptions::default());
            render_builtin(supervisor, &info);
            if parsed.executable == "exit" {
                return Ok(info.exit_code);
            }
            continue;
        }

        let id = supervisor.execute_interactive(line, &ExecutionOptions::default());
        if id < 0 {
            eprintln!("{} Failed to start: {}", "error".red(), line);
            continue;
        }
        foreground.store(id, Ordering::SeqCst);
        pump_output(supervisor, id);
        foreground.store(0, Ordering::SeqCst);

        let info = supervisor.process_info(id);
        if info.state == ProcessState::Terminated {
            eprintln!("{} [{}] terminated", "job".yellow(), id);
        } else if info.exit_code != 0 {
            eprintln!("{} [{}] exited with {}", "job".yellow(), id, info.exit_code);
        }
    }
}

/// Stream a foreground child's output until it exits, then drain what
/// remains.
fn pump_output(supervisor: &Supervisor, id: i32) {
    loop {
        if supervisor.has_output(id) {
            print!("{}", supervisor.read_output(id, 0));
            supervisor.clear_output(id);
            let _ = io::stdout().flush();
        }
        if !supervisor.process_info(id).is_active() {
            break;
        }
        thread::sleep(REPL_POLL_INTERVAL);
    }
    if supervisor.has_output(id) {
        print!("{}", supervisor.read_output(id, 0));
        supervisor.clear_output(id);
        let _ = io::stdout().flush();
    }
}

/// Builtins report through `ProcessInfo` only; the session decides how
/// to show them.
fn render_builtin(supervisor: &Supervisor, info: &ProcessInfo) {
    match info.command.split_whitespace().next().unwrap_or("") {
        "pwd" => println!("{}", info.working_dir.display()),
        "echo" => println!("{}", info.arguments.join(" ")),
        "jobs" => {
            for job in supervisor.all_processes() {
                println!("[{}] {:?} {}", job.pid, job.state, job.command);
            }
        }
        "cd" if info.state == ProcessState::Failed => {
            eprintln!("{} cd: no such directory", "error".red());
        }
        "kill" if info.state == ProcessState::Failed => {
            eprintln!("{} kill: no such process", "error".red());
        }
        _ => {}
    }
}
