use std::sync::Mutex;

/// Append-only output buffers for one process, stdout and stderr kept
/// separately. One lock guards both streams; output volume per process
/// is small enough in practice that per-stream locking buys nothing.
///
/// Reads are non-destructive; data persists until `clear`.
#[derive(Default)]
pub struct ProcessIo {
    streams: Mutex<Streams>,
}

#[derive(Default)]
struct Streams {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ProcessIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_stdout(&self, chunk: &[u8]) {
        let mut s = self.streams.lock().expect("io lock poisoned");
        s.stdout.extend_from_slice(chunk);
    }

    pub fn append_stderr(&self, chunk: &[u8]) {
        let mut s = self.streams.lock().expect("io lock poisoned");
        s.stderr.extend_from_slice(chunk);
    }

    pub fn stdout(&self) -> String {
        let s = self.streams.lock().expect("io lock poisoned");
        String::from_utf8_lossy(&s.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        let s = self.streams.lock().expect("io lock poisoned");
        String::from_utf8_lossy(&s.stderr).into_owned()
    }

    /// Stdout followed by stderr, concatenated.
    pub fn combined(&self) -> String {
        let s = self.streams.lock().expect("io lock poisoned");
        let mut out = Vec::with_capacity(s.stdout.len() + s.stderr.len());
        out.extend_from_slice(&s.stdout);
        out.extend_from_slice(&s.stderr);
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Combined output capped at `max_bytes` (0 = unbounded). The cap
    /// truncates the read, not the buffer.
    pub fn combined_capped(&self, max_bytes: usize) -> String {
        let full = self.combined();
        if max_bytes == 0 || full.len() <= max_bytes {
            return full;
        }
        // Back off to a char boundary so truncation stays valid UTF-8.
        let mut cut = max_bytes;
        while cut > 0 && !full.is_char_boundary(cut) {
            cut -= 1;
        }
        full[..cut].to_string()
    }

    pub fn has_data(&self) -> bool {
        let s = self.streams.lock().expect("io lock poisoned");
        !s.stdout.is_empty() || !s.stderr.is_empty()
    }

    pub fn clear(&self) {
        let mut s = self.streams.lock().expect("io lock poisoned");
        s.stdout.clear();
        s.stderr.clear();
    }
}
