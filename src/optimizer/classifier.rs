//! Whitelist and game classification
//!
//! The classification file is line oriented:
//!
//! ```text
//! # comment
//! Steam            # whitelisted (the default section)
//! <Games>
//! javaw
//! <Whitelisted>
//! discord
//! ```

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::constants::{COMMENT_MARKER, DEFAULT_WHITELIST, GAMES_TAG, WHITELISTED_TAG};
use crate::system::ProcessHandle;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classification file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Decides which processes are whitelisted and which are games.
pub trait ProcessClassifier: Send {
    fn is_whitelisted(&self, process: &dyn ProcessHandle) -> bool;

    fn is_game(&self, process: &dyn ProcessHandle) -> bool;

    /// Reloads the backing data. Readers never observe a half-loaded state.
    fn refresh(&mut self) -> Result<(), ClassifierError>;
}

/// Secondary game detection consulted when a process is not listed.
pub trait GameIdentifier: Send {
    fn is_game(&self, process: &dyn ProcessHandle) -> bool;

    fn refresh(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Whitelisted,
    Games,
}

/// Parsed contents of a classification file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessLists {
    pub whitelisted: HashSet<String>,
    pub games: HashSet<String>,
}

impl ProcessLists {
    pub fn parse(contents: &str) -> Self {
        let mut lists = Self::default();
        let mut section = Section::Whitelisted;

        for raw in contents.lines() {
            let line = match raw.find(COMMENT_MARKER) {
                Some(index) => &raw[..index],
                None => raw,
            }
            .trim();

            if line.is_empty() {
                continue;
            }

            if line.starts_with(WHITELISTED_TAG) {
                section = Section::Whitelisted;
            } else if line.starts_with(GAMES_TAG) {
                section = Section::Games;
            } else {
                let target = match section {
                    Section::Whitelisted => &mut lists.whitelisted,
                    Section::Games => &mut lists.games,
                };
                target.insert(line.to_string());
            }
        }

        lists
    }
}

/// Classifier backed by the user-editable classification file.
pub struct ExplicitProcessClassifier {
    path: PathBuf,
    lists: ProcessLists,
    fallback: Option<Box<dyn GameIdentifier>>,
}

impl ExplicitProcessClassifier {
    /// Creates an empty classifier; call [`ProcessClassifier::refresh`] to load it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lists: ProcessLists::default(),
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Box<dyn GameIdentifier>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// Writes the bundled default classification file unless one already exists.
///
/// Returns `true` when the file was created.
pub fn write_default_file(path: &Path) -> Result<bool, ClassifierError> {
    if path.exists() {
        return Ok(false);
    }

    fs::write(path, DEFAULT_WHITELIST).map_err(|source| ClassifierError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("Wrote default classification file to {}", path.display());
    Ok(true)
}

impl ProcessClassifier for ExplicitProcessClassifier {
    fn is_whitelisted(&self, process: &dyn ProcessHandle) -> bool {
        self.lists.whitelisted.contains(process.name())
    }

    fn is_game(&self, process: &dyn ProcessHandle) -> bool {
        self.lists.games.contains(process.name())
            || self
                .fallback
                .as_ref()
                .is_some_and(|fallback| fallback.is_game(process))
    }

    fn refresh(&mut self) -> Result<(), ClassifierError> {
        write_default_file(&self.path)?;

        let contents = fs::read_to_string(&self.path).map_err(|source| ClassifierError::Io {
            path: self.path.clone(),
            source,
        })?;

        // Swap only once the whole file parsed
        self.lists = ProcessLists::parse(&contents);
        if let Some(fallback) = self.fallback.as_mut() {
            fallback.refresh();
        }

        log::debug!(
            "Loaded {} whitelisted and {} game entries from {}",
            self.lists.whitelisted.len(),
            self.lists.games.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::process::fake::FakeProcess;
    use tempfile::TempDir;

    #[test]
    fn test_parse_sections_and_comments() {
        let lists = ProcessLists::parse(
            "# header\n\
             Steam   # trailing comment\n\
             \n\
             <Games>\n\
             javaw\n\
             <Whitelisted> # back again\n\
             discord\n\
             #<Games>\n\
             obs64\n",
        );

        assert!(lists.whitelisted.contains("Steam"));
        assert!(lists.whitelisted.contains("discord"));
        assert!(lists.whitelisted.contains("obs64"));
        assert!(lists.games.contains("javaw"));
        assert_eq!(lists.whitelisted.len(), 3);
        assert_eq!(lists.games.len(), 1);
    }

    #[test]
    fn test_tags_are_case_sensitive() {
        let lists = ProcessLists::parse("<games>\nfoo\n");
        assert!(lists.whitelisted.contains("<games>"));
        assert!(lists.whitelisted.contains("foo"));
        assert!(lists.games.is_empty());
    }

    #[test]
    fn test_refresh_writes_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("whitelist.txt");

        let mut classifier = ExplicitProcessClassifier::new(&path);
        classifier.refresh().unwrap();

        assert!(path.exists());
        assert!(classifier.is_whitelisted(&FakeProcess::new("Steam", 1)));
        assert!(classifier.is_game(&FakeProcess::new("javaw", 1)));
        assert!(!classifier.is_whitelisted(&FakeProcess::new("steam", 1)));
    }

    #[test]
    fn test_refresh_replaces_lists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("whitelist.txt");
        fs::write(&path, "alpha\n<Games>\nbeta\n").unwrap();

        let mut classifier = ExplicitProcessClassifier::new(&path);
        classifier.refresh().unwrap();
        assert!(classifier.is_whitelisted(&FakeProcess::new("alpha", 1)));

        fs::write(&path, "<Games>\nalpha\n").unwrap();
        classifier.refresh().unwrap();
        assert!(!classifier.is_whitelisted(&FakeProcess::new("alpha", 1)));
        assert!(classifier.is_game(&FakeProcess::new("alpha", 1)));
        assert!(!classifier.is_game(&FakeProcess::new("beta", 1)));
    }

    struct NameSuffixIdentifier;

    impl GameIdentifier for NameSuffixIdentifier {
        fn is_game(&self, process: &dyn ProcessHandle) -> bool {
            process.name().ends_with("-Shipping")
        }
    }

    #[test]
    fn test_fallback_identifier() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("whitelist.txt");
        fs::write(&path, "").unwrap();

        let mut classifier =
            ExplicitProcessClassifier::new(&path).with_fallback(Box::new(NameSuffixIdentifier));
        classifier.refresh().unwrap();

        assert!(classifier.is_game(&FakeProcess::new("Game-Win64-Shipping", 1)));
        assert!(!classifier.is_game(&FakeProcess::new("notepad", 1)));
        // fallback games are not whitelisted by the classifier itself
        assert!(!classifier.is_whitelisted(&FakeProcess::new("Game-Win64-Shipping", 1)));
    }
}
