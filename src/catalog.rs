// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Class label catalog.

use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;

/// Ordered class labels; the index of a label is its class id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassCatalog {
    labels: Vec<String>,
}

impl ClassCatalog {
    /// Parse one label per line.
    ///
    /// A final line terminator does not add an empty label, but a blank line before it
    /// does. A trailing `\r` on each line is trimmed.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let labels = text
            .lines()
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect();
        Self { labels }
    }

    /// Read a label file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Io`](crate::InferenceError::Io) if the file cannot be read.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_text(&text))
    }

    /// Build a catalog from an id to name map. Missing ids get their number as label.
    #[must_use]
    pub fn from_names(names: &HashMap<usize, String>) -> Self {
        let len = names.keys().max().map_or(0, |&max| max + 1);
        let labels = (0..len)
            .map(|i| names.get(&i).cloned().unwrap_or_else(|| i.to_string()))
            .collect();
        Self { labels }
    }

    /// Build a catalog from labels in class order.
    #[must_use]
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Label of a class id.
    #[must_use]
    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.labels.get(class_id).map(String::as_str)
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the catalog has no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in class order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_newline_adds_no_label() {
        let catalog = ClassCatalog::from_text("person\nbicycle\ncar\n");
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get(2), Some("car"));
        assert_eq!(catalog.get(3), None);

        let catalog = ClassCatalog::from_text("person\nbicycle\ncar");
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_blank_line_is_a_label() {
        let catalog = ClassCatalog::from_text("person\n\n");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(1), Some(""));
    }

    #[test]
    fn test_crlf_trimmed() {
        let catalog = ClassCatalog::from_text("cat\r\ndog\r\n");
        assert_eq!(catalog.labels(), &["cat".to_string(), "dog".to_string()]);
    }

    #[test]
    fn test_empty_text() {
        assert!(ClassCatalog::from_text("").is_empty());
    }

    #[test]
    fn test_from_names_fills_gaps() {
        let names = HashMap::from([(0, "person".to_string()), (2, "car".to_string())]);
        let catalog = ClassCatalog::from_names(&names);
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get(1), Some("1"));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(ClassCatalog::load("/nonexistent/labels.txt").is_err());
    }
}
