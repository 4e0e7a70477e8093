use std::path::Path;
use tracing::{debug, info};

use crate::{Result, VisionError};

/// Class display names indexed by the model's class id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
    names: Vec<String>,
}

impl Labels {
    /// One label per line; entries are trimmed. Blank lines keep their index
    /// so ids stay aligned with the model, but a final newline does not add
    /// an extra class.
    pub fn parse(text: &str) -> Self {
        let body = text.strip_suffix('\n').unwrap_or(text);
        let body = body.strip_suffix('\r').unwrap_or(body);
        if body.is_empty() {
            return Self::default();
        }
        let names: Vec<String> = body.split('\n').map(|l| l.trim().to_string()).collect();
        for (i, n) in names.iter().enumerate() {
            debug!("labels: [{}] '{}' (len {})", i, n, n.len());
        }
        Self { names }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| VisionError::LabelsIo {
            path: path.display().to_string(),
            source,
        })?;
        let labels = Self::parse(&text);
        info!("labels: loaded {} classes from {}", labels.len(), path.display());
        Ok(labels)
    }

    /// Bounds-checked lookup; negative or too-large ids give `None`.
    pub fn get(&self, class_id: i32) -> Option<&str> {
        let idx = usize::try_from(class_id).ok()?;
        self.names.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize { self.names.len() }

    pub fn is_empty(&self) -> bool { self.names.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for Labels {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self { names: iter.into_iter().map(|s| s.as_ref().trim().to_string()).collect() }
    }
}
