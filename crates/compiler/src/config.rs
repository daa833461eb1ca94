//! Compiler configuration: how many worker threads the analyzer, IR
//! builder and code generator should fan out onto.
//!
//! Follows the builder pattern the rest of the workspace uses for its
//! configuration types, with one addition: the thread count can be
//! overridden by the `NANOC_WORKER_THREADS` environment variable, and
//! (optionally, for scripted builds) loaded from a small TOML file.

use serde::Deserialize;
use std::env;
use std::path::Path;

/// Thread count and (future) build-wide knobs. Cheap to clone; built once
/// per CLI invocation and shared by reference across the pipeline.
#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    worker_threads: Option<usize>,
}

/// Mirror of `CompilerConfig`'s overridable fields for `toml::from_str`.
/// Kept separate from `CompilerConfig` itself so the in-memory type never
/// has to derive `Deserialize` just to satisfy a file format.
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    worker_threads: Option<usize>,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = Some(n);
        self
    }

    /// Reads `NANOC_WORKER_THREADS` on top of an otherwise-default config.
    /// An unset variable is silent; an unparsable or zero value falls back
    /// to the default pool size and prints a warning to stderr, since a
    /// worker pool of size zero would deadlock every batch submission.
    pub fn from_env() -> Self {
        let mut config = CompilerConfig::default();
        if let Ok(raw) = env::var("NANOC_WORKER_THREADS") {
            match raw.parse::<usize>() {
                Ok(0) | Err(_) => {
                    eprintln!(
                        "warning: NANOC_WORKER_THREADS={raw:?} is not a positive integer, ignoring"
                    );
                }
                Ok(n) => config.worker_threads = Some(n),
            }
        }
        config
    }

    /// Loads overrides from a TOML file, falling back to the given base
    /// config on any missing or unparsable field.
    pub fn from_toml_file(path: &Path, base: CompilerConfig) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;
        let parsed: TomlConfig = toml::from_str(&text)
            .map_err(|e| format!("failed to parse '{}': {e}", path.display()))?;
        let mut config = base;
        if let Some(n) = parsed.worker_threads {
            config.worker_threads = Some(n);
        }
        Ok(config)
    }

    /// The worker count this config resolves to: the explicit override if
    /// one was set, otherwise the hardware's available parallelism.
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_resolves_to_available_parallelism() {
        let config = CompilerConfig::new();
        assert!(config.worker_threads() >= 1);
    }

    #[test]
    fn explicit_override_wins() {
        let config = CompilerConfig::new().with_worker_threads(3);
        assert_eq!(config.worker_threads(), 3);
    }

    #[test]
    fn loads_worker_threads_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nanoc.toml");
        std::fs::write(&path, "worker_threads = 5\n").unwrap();
        let config = CompilerConfig::from_toml_file(&path, CompilerConfig::new()).unwrap();
        assert_eq!(config.worker_threads(), 5);
    }

    #[test]
    fn missing_toml_field_keeps_base_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nanoc.toml");
        std::fs::write(&path, "# no overrides here\n").unwrap();
        let base = CompilerConfig::new().with_worker_threads(2);
        let config = CompilerConfig::from_toml_file(&path, base).unwrap();
        assert_eq!(config.worker_threads(), 2);
    }

    #[test]
    fn unreadable_toml_file_is_an_error() {
        let config = CompilerConfig::from_toml_file(Path::new("/no/such/file.toml"), CompilerConfig::new());
        assert!(config.is_err());
    }
}
