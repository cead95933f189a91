//! System prompt loading
//!
//! `<dir>/<name>.txt` from an override directory wins; otherwise the
//! prompt compiled into the crate is used.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

const BUILTIN: &[(&str, &str)] = &[
    ("orchestrator", include_str!("../prompts/orchestrator.txt")),
    ("searcher", include_str!("../prompts/searcher.txt")),
    ("analyzer", include_str!("../prompts/analyzer.txt")),
    ("writer", include_str!("../prompts/writer.txt")),
];

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt '{0}' not found")]
    NotFound(String),

    #[error("failed to read prompt {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct PromptLoader {
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Built-in prompts only
    pub fn builtin() -> Self {
        Self::default()
    }

    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self { override_dir }
    }

    pub fn override_dir(&self) -> Option<&Path> {
        self.override_dir.as_deref()
    }

    /// Load a prompt by name, trimmed
    pub fn load(&self, name: &str) -> Result<String, PromptError> {
        if let Some(dir) = &self.override_dir {
            let path = dir.join(format!("{}.txt", name));
            if path.is_file() {
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| PromptError::Io { path: path.clone(), source })?;
                debug!(prompt = name, path = %path.display(), "Loaded prompt override");
                return Ok(text.trim().to_string());
            }
        }

        BUILTIN
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, text)| text.trim().to_string())
            .ok_or_else(|| PromptError::NotFound(name.to_string()))
    }

    /// Names of every loadable prompt, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = BUILTIN.iter().map(|(n, _)| n.to_string()).collect();

        if let Some(dir) = &self.override_dir {
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().is_some_and(|e| e == "txt") {
                        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                            names.insert(stem.to_string());
                        }
                    }
                }
            }
        }

        names.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_prompts_load() {
        let loader = PromptLoader::builtin();
        for name in ["orchestrator", "searcher", "analyzer", "writer"] {
            let prompt = loader.load(name).unwrap();
            assert!(!prompt.is_empty());
            assert_eq!(prompt, prompt.trim());
        }
        assert!(matches!(
            loader.load("nope"),
            Err(PromptError::NotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_override_dir_wins_and_falls_back() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("writer.txt"), "\n  Custom writer.  \n").unwrap();
        std::fs::write(dir.path().join("critic.txt"), "Critic.").unwrap();

        let loader = PromptLoader::new(Some(dir.path().to_path_buf()));
        assert_eq!(loader.load("writer").unwrap(), "Custom writer.");
        assert_eq!(
            loader.load("searcher").unwrap(),
            PromptLoader::builtin().load("searcher").unwrap()
        );
        assert_eq!(loader.load("critic").unwrap(), "Critic.");

        let names = loader.list();
        assert_eq!(
            names,
            vec!["analyzer", "critic", "orchestrator", "searcher", "writer"]
        );
    }
}
