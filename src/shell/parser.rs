use crate::shell::environment::Environment;
use log::{debug, warn};
use std::path::Path;

/// Structured form of a single parsed command.
///
/// Redirection targets are captured but not acted upon by the engine;
/// chaining operators end the parsed segment (see `CommandParser::parse`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCommand {
    pub executable: String,
    pub arguments: Vec<String>,
    pub input_redirections: Vec<String>,
    pub output_redirections: Vec<String>,
    pub append_output: bool,
    pub run_in_background: bool,
}

impl ParsedCommand {
    pub fn is_valid(&self) -> bool {
        !self.executable.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Pipe,
    RedirectIn,
    RedirectOut,
    RedirectAppend,
    Background,
    Semicolon,
    And,
    Or,
}

/// Stateless command-line parser: tokenization with quoting and escapes,
/// inline `$NAME` / `${NAME}` expansion, and classification into a
/// `ParsedCommand`. Safe to call concurrently.
pub struct CommandParser;

impl CommandParser {
    /// Parse a raw command line against an environment.
    ///
    /// Bad input (empty line, unterminated quote, no word before the
    /// first operator) yields a result with an empty executable.
    /// Callers check `is_valid` before spawning. Chaining operators
    /// (`|`, `;`, `&&`, `||`) are not executed; the first segment is
    /// kept and the rest is dropped with a warning.
    pub fn parse(command: &str, env: &Environment) -> ParsedCommand {
        let Some(tokens) = tokenize(command, Some(env)) else {
            debug!("rejecting command with unterminated quote: {:?}", command);
            return ParsedCommand::default();
        };
        classify(tokens, command)
    }

    /// Check that tokenization completes without an unterminated quote.
    pub fn validate(command: &str) -> bool {
        tokenize(command, None).is_some()
    }

    /// Best-effort completion suggestions for the last token of a
    /// partial command line. Ordered and deduplicated; may be empty.
    pub fn completions(partial: &str, env: &Environment) -> Vec<String> {
        let last = partial.rsplit(char::is_whitespace).next().unwrap_or("");
        if last.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        if let Some(prefix) = last.strip_prefix('$') {
            for (name, _) in env.all() {
                if name.starts_with(prefix) {
                    out.push(format!("${}", name));
                }
            }
        } else {
            for name in crate::shell::builtins::BUILTIN_NAMES {
                if name.starts_with(last) {
                    out.push((*name).to_string());
                }
            }
            out.extend(path_executables(last, env));
        }
        out.sort();
        out.dedup();
        out
    }
}

/// Scan `PATH` from the given environment for executables matching a
/// prefix. Capped so a huge PATH cannot produce an unbounded list.
fn path_executables(prefix: &str, env: &Environment) -> Vec<String> {
    const MAX_SUGGESTIONS: usize = 64;
    let mut out = Vec::new();
    for dir in std::env::split_paths(&env.get("PATH")) {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(prefix) && is_executable_file(&entry.path()) {
                out.push(name);
                if out.len() >= MAX_SUGGESTIONS {
                    return out;
                }
            }
        }
    }
    out
}

pub(crate) fn is_executable_file(path: &Path) -> bool {
    let Ok(meta) = path.metadata() else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Tokenize a command line. Returns `None` on an unterminated quote.
///
/// Quoted regions suppress token splitting; single quotes additionally
/// suppress variable expansion. When `env` is `None` (syntax validation
/// only), `$NAME` references are kept verbatim.
fn tokenize(command: &str, env: Option<&Environment>) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escaped = false;
    // Distinguishes an explicitly empty token ("") from plain whitespace.
    let mut token_started = false;

    let mut chars = command.chars().peekable();

    let flush = |tokens: &mut Vec<Token>, current: &mut String, started: &mut bool| {
        if *started {
            tokens.push(Token::Word(std::mem::take(current)));
            *started = false;
        }
    };

    while let Some(c) = chars.next() {
        if escaped {
            current.push(c);
            escaped = false;
            token_started = true;
            continue;
        }

        if c == '\\' && !in_single_quote {
            escaped = true;
            token_started = true;
            continue;
        }

        if c == '\'' && !in_double_quote {
            in_single_quote = !in_single_quote;
            token_started = true;
            continue;
        }

        if c == '"' && !in_single_quote {
            in_double_quote = !in_double_quote;
            token_started = true;
            continue;
        }

        if c == '$' && !in_single_quote {
            token_started = true;
            let mut name = String::new();
            if let Some(&'{') = chars.peek() {
                chars.next();
                let mut closed = false;
                for vc in chars.by_ref() {
                    if vc == '}' {
                        closed = true;
                        break;
                    }
                    name.push(vc);
                }
                if !closed {
                    // `${` without `}`: keep the text as typed.
                    current.push_str("${");
                    current.push_str(&name);
                    continue;
                }
            } else {
                while let Some(&vc) = chars.peek() {
                    if vc.is_alphanumeric() || vc == '_' {
                        name.push(vc);
                        chars.next();
                    } else {
                        break;
                    }
                }
            }

            if name.is_empty() {
                current.push('$');
            } else {
                match env {
                    // Undefined expands to the empty string, not an error.
                    Some(env) => current.push_str(&env.get(&name)),
                    None => {
                        current.push('$');
                        current.push_str(&name);
                    }
                }
            }
            continue;
        }

        if in_single_quote || in_double_quote {
            current.push(c);
            token_started = true;
            continue;
        }

        if c.is_whitespace() {
            flush(&mut tokens, &mut current, &mut token_started);
            continue;
        }

        // Structural operators only apply outside quotes.
        match c {
            '|' => {
                flush(&mut tokens, &mut current, &mut token_started);
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(Token::Or);
                } else {
                    tokens.push(Token::Pipe);
                }
            }
            '&' => {
                flush(&mut tokens, &mut current, &mut token_started);
                if chars.peek() == Some(&'&') {
                    chars.next();
                    tokens.push(Token::And);
                } else {
                    tokens.push(Token::Background);
                }
            }
            ';' => {
                flush(&mut tokens, &mut current, &mut token_started);
                tokens.push(Token::Semicolon);
            }
            '<' => {
                flush(&mut tokens, &mut current, &mut token_started);
                tokens.push(Token::RedirectIn);
            }
            '>' => {
                flush(&mut tokens, &mut current, &mut token_started);
                if chars.peek() == Some(&'>') {
                    chars.next();
                    tokens.push(Token::RedirectAppend);
                } else {
                    tokens.push(Token::RedirectOut);
                }
            }
            _ => {
                current.push(c);
                token_started = true;
            }
        }
    }

    if in_single_quote || in_double_quote {
        return None;
    }
    if escaped {
        // Trailing backslash escapes nothing; drop it.
        debug!("dropping trailing escape in {:?}", command);
    }
    if token_started {
        tokens.push(Token::Word(current));
    }
    Some(tokens)
}

/// Fold a token stream into the single-command subset.
fn classify(tokens: Vec<Token>, original: &str) -> ParsedCommand {
    let mut cmd = ParsedCommand::default();
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
        match token {
            Token::Word(word) => {
                if cmd.executable.is_empty() {
                    cmd.executable = word;
                } else {
                    cmd.arguments.push(word);
                }
            }
            Token::RedirectIn => match iter.next() {
                Some(Token::Word(target)) => cmd.input_redirections.push(target),
                _ => warn!("input redirection without a target in {:?}", original),
            },
            Token::RedirectOut | Token::RedirectAppend => {
                let append = matches!(token, Token::RedirectAppend);
                match iter.next() {
                    Some(Token::Word(target)) => {
                        cmd.output_redirections.push(target);
                        cmd.append_output = append;
                    }
                    _ => warn!("output redirection without a target in {:?}", original),
                }
            }
            Token::Background => {
                if iter.peek().is_none() {
                    cmd.run_in_background = true;
                } else {
                    // `a & b` is chaining; keep the first segment only.
                    warn!(
                        "command chaining is not supported, executing first segment of {:?}",
                        original
                    );
                    break;
                }
            }
            Token::Pipe | Token::Semicolon | Token::And | Token::Or => {
                warn!(
                    "pipelines and chaining are not supported, executing first segment of {:?}",
                    original
                );
                break;
            }
        }
    }

    cmd
}
