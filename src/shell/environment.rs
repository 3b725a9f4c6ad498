use std::collections::HashMap;
use std::sync::RwLock;

/// Thread-safe store of shell environment variables.
///
/// Reads take a shared lock, writes an exclusive one. No operation
/// fails: `get` on a missing key returns an empty string, matching
/// shell expansion semantics.
#[derive(Default)]
pub struct Environment {
    vars: RwLock<HashMap<String, String>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut vars = self.vars.write().expect("environment lock poisoned");
        vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> String {
        let vars = self.vars.read().expect("environment lock poisoned");
        vars.get(name).cloned().unwrap_or_default()
    }

    pub fn has(&self, name: &str) -> bool {
        let vars = self.vars.read().expect("environment lock poisoned");
        vars.contains_key(name)
    }

    pub fn remove(&self, name: &str) -> bool {
        let mut vars = self.vars.write().expect("environment lock poisoned");
        vars.remove(name).is_some()
    }

    /// All variables as (name, value) pairs, ordered by name.
    pub fn all(&self) -> Vec<(String, String)> {
        let vars = self.vars.read().expect("environment lock poisoned");
        let mut pairs: Vec<_> = vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }

    /// Unordered copy of the map, for merging at the spawn boundary.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.vars.read().expect("environment lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.vars.read().expect("environment lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.vars.write().expect("environment lock poisoned").clear();
    }

    /// Replace the store with a snapshot of the enclosing process
    /// environment.
    pub fn import_from_system(&self) {
        let mut vars = self.vars.write().expect("environment lock poisoned");
        vars.clear();
        vars.extend(std::env::vars());
        log::debug!("imported {} variables from the system environment", vars.len());
    }

    /// Apply every entry to the enclosing process environment. Intended
    /// for the process-spawn boundary only; callers must ensure no other
    /// thread is reading the process environment concurrently.
    pub fn export_to_system(&self) {
        let vars = self.vars.read().expect("environment lock poisoned");
        for (name, value) in vars.iter() {
            // SAFETY: single-threaded access contract stated above.
            unsafe { std::env::set_var(name, value) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn set_get_roundtrip() {
        let env = Environment::new();
        env.set("FOO", "bar");
        assert_eq!(env.get("FOO"), "bar");
        assert!(env.has("FOO"));
    }

    #[test]
    fn missing_key_is_empty_string() {
        let env = Environment::new();
        assert_eq!(env.get("NO_SUCH_VARIABLE"), "");
        assert!(!env.has("NO_SUCH_VARIABLE"));
    }

    #[test]
    fn last_write_wins() {
        let env = Environment::new();
        env.set("K", "1");
        env.set("K", "2");
        assert_eq!(env.get("K"), "2");
    }

    #[test]
    fn remove_reports_presence() {
        let env = Environment::new();
        env.set("K", "v");
        assert!(env.remove("K"));
        assert!(!env.remove("K"));
        assert_eq!(env.get("K"), "");
    }

    #[test]
    fn all_is_ordered() {
        let env = Environment::new();
        env.set("B", "2");
        env.set("A", "1");
        env.set("C", "3");
        let names: Vec<String> = env.all().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn clear_empties_store() {
        let env = Environment::new();
        env.set("K", "v");
        env.clear();
        assert!(env.is_empty());
    }

    #[test]
    fn import_from_system_snapshots() {
        let env = Environment::new();
        env.import_from_system();
        // PATH is about the only portable assumption.
        assert!(env.has("PATH") || !env.is_empty());
    }

    #[test]
    fn export_applies_to_process_environment() {
        let env = Environment::new();
        env.set("PROCDECK_EXPORT_PROBE", "visible");
        env.export_to_system();
        assert_eq!(
            std::env::var("PROCDECK_EXPORT_PROBE").as_deref(),
            Ok("visible")
        );
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let env = Arc::new(Environment::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let env = env.clone();
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    env.set(format!("K{}", i), j.to_string());
                    let _ = env.get("K0");
                    let _ = env.all();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(env.has("K0"));
    }
}
