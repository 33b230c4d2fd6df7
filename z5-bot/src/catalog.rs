//! Static registry of playable stories.

use crate::error::{BotError, BotResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use z5_common::StoryConfig;

/// A selectable game bound to an asset file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    /// Display name
    pub name: String,
    /// Short routing code, also part of the log key
    pub abbrev: String,
    /// Game asset (story file) path
    pub path: PathBuf,
}

impl Story {
    pub fn new(name: impl Into<String>, abbrev: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            abbrev: abbrev.into(),
            path: path.into(),
        }
    }
}

/// Immutable set of stories, built once at startup.
#[derive(Debug, Default)]
pub struct Catalog {
    stories: Vec<Arc<Story>>,
    by_abbrev: HashMap<String, usize>,
}

impl Catalog {
    /// Build the catalog from configured entries.
    pub fn load(entries: &[StoryConfig]) -> BotResult<Self> {
        let stories = entries
            .iter()
            .map(|e| Story::new(e.name.clone(), e.abbrev.clone(), e.resolved_path()))
            .collect();
        Self::from_stories(stories)
    }

    /// Build the catalog from already-resolved stories.
    pub fn from_stories(stories: Vec<Story>) -> BotResult<Self> {
        let mut catalog = Self::default();

        for mut story in stories {
            // Select codes arrive lowercased.
            story.abbrev = story.abbrev.to_lowercase();

            if story.abbrev.is_empty() {
                return Err(BotError::Configuration(format!(
                    "story \"{}\" has an empty abbrev",
                    story.name
                )));
            }
            if story.abbrev.chars().any(|c| c.is_whitespace() || c == ':') {
                return Err(BotError::Configuration(format!(
                    "story abbrev \"{}\" must not contain whitespace or ':'",
                    story.abbrev
                )));
            }
            if catalog.by_abbrev.contains_key(&story.abbrev) {
                return Err(BotError::Configuration(format!(
                    "duplicate story abbrev \"{}\"",
                    story.abbrev
                )));
            }

            catalog
                .by_abbrev
                .insert(story.abbrev.clone(), catalog.stories.len());
            catalog.stories.push(Arc::new(story));
        }

        Ok(catalog)
    }

    /// Look up a story by its routing code.
    pub fn by_abbrev(&self, code: &str) -> Option<Arc<Story>> {
        self.by_abbrev
            .get(code)
            .and_then(|&idx| self.stories.get(idx))
            .cloned()
    }

    /// Stories in configuration order.
    pub fn stories(&self) -> &[Arc<Story>] {
        &self.stories
    }

    pub fn len(&self) -> usize {
        self.stories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }

    /// The `/select` help text, one line per story.
    pub fn selection_listing(&self) -> String {
        self.stories
            .iter()
            .map(|s| format!("For \"{}\", write /select {}.", s.name, s.abbrev))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
