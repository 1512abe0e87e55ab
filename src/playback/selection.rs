//! Topic selection algebra
//!
//! A selection starts out implicit: if the user never adds or removes a
//! topic, playback covers every topic in the log's catalog at session start.
//! The first add or remove call makes the selection explicit, whether or not
//! the call matched anything; an explicitly empty selection is a meaningful
//! "play nothing" state. Removing from an implicit selection first
//! materializes the full catalog, so "remove /b" means "everything that
//! would have played, minus /b".

use std::collections::BTreeSet;

use regex::Regex;

use crate::store::Descriptor;

#[derive(Debug, Clone, Default)]
pub(crate) struct TopicSelection {
    explicit: bool,
    names: BTreeSet<String>,
}

impl TopicSelection {
    /// Mark the selection explicit without changing its contents. Called on
    /// every add/remove entry point, including ones that end up failing.
    pub fn touch(&mut self) {
        self.explicit = true;
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Add a topic by exact name. Fails without inserting when the catalog
    /// does not contain it.
    pub fn add_name(&mut self, name: &str, catalog: &Descriptor) -> bool {
        self.explicit = true;
        if !catalog.contains_topic(name) {
            return false;
        }
        self.names.insert(name.to_string());
        true
    }

    /// Add every catalog topic whose whole name matches `pattern`. Returns
    /// the number of matches; topics already selected count too.
    pub fn add_matching(&mut self, pattern: &Regex, catalog: &Descriptor) -> i64 {
        self.explicit = true;
        let anchored = anchor(pattern);
        let mut matches = 0;
        for topic in catalog.topics() {
            if anchored.is_match(topic) {
                self.names.insert(topic.clone());
                matches += 1;
            }
        }
        matches
    }

    /// Remove a topic by exact name, defaulting to the full catalog first if
    /// the selection was implicit. Returns true iff something was erased.
    pub fn remove_name(&mut self, name: &str, catalog: &Descriptor) -> bool {
        self.default_to_all(catalog);
        self.names.remove(name)
    }

    /// Remove every selected topic whose whole name matches `pattern`,
    /// defaulting to the full catalog first. Returns the erased count.
    pub fn remove_matching(&mut self, pattern: &Regex, catalog: &Descriptor) -> i64 {
        self.default_to_all(catalog);
        let anchored = anchor(pattern);
        let before = self.names.len();
        self.names.retain(|name| !anchored.is_match(name));
        (before - self.names.len()) as i64
    }

    /// The effective topic set: the explicit names, or the whole catalog
    /// when the selection is still implicit.
    pub fn resolve(&self, catalog: &Descriptor) -> BTreeSet<String> {
        if self.explicit {
            self.names.clone()
        } else {
            catalog.topics().cloned().collect()
        }
    }

    fn default_to_all(&mut self, catalog: &Descriptor) {
        if !self.explicit {
            self.names = catalog.topics().cloned().collect();
            self.explicit = true;
        }
    }
}

/// Wrap a pattern so it must match a whole topic name, not a substring.
fn anchor(pattern: &Regex) -> Regex {
    match Regex::new(&format!("^(?:{})$", pattern.as_str())) {
        Ok(anchored) => anchored,
        // A valid pattern stays valid inside a non-capturing group.
        Err(_) => pattern.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Descriptor {
        let mut desc = Descriptor::default();
        desc.insert("/a", "T1");
        desc.insert("/b", "T1");
        desc.insert("/c", "T2");
        desc
    }

    fn names(selection: &TopicSelection, catalog: &Descriptor) -> Vec<String> {
        selection.resolve(catalog).into_iter().collect()
    }

    #[test]
    fn test_implicit_selection_resolves_to_all() {
        let catalog = catalog();
        let selection = TopicSelection::default();
        assert!(!selection.is_explicit());
        assert_eq!(names(&selection, &catalog), vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_add_name_requires_catalog_entry() {
        let catalog = catalog();
        let mut selection = TopicSelection::default();
        assert!(selection.add_name("/a", &catalog));
        assert!(!selection.add_name("/missing", &catalog));
        assert_eq!(names(&selection, &catalog), vec!["/a"]);
    }

    #[test]
    fn test_failed_add_still_makes_selection_explicit() {
        let catalog = catalog();
        let mut selection = TopicSelection::default();
        assert!(!selection.add_name("/missing", &catalog));
        assert!(selection.is_explicit());
        // Explicit and empty: play nothing.
        assert!(names(&selection, &catalog).is_empty());
    }

    #[test]
    fn test_add_matching_counts_duplicates() {
        let catalog = catalog();
        let mut selection = TopicSelection::default();
        let re = Regex::new(".*").unwrap();
        assert_eq!(selection.add_matching(&re, &catalog), 3);
        // Already-selected topics still count as matches.
        assert_eq!(selection.add_matching(&re, &catalog), 3);
        assert_eq!(names(&selection, &catalog), vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_matching_is_whole_name() {
        let catalog = catalog();
        let mut selection = TopicSelection::default();
        // "/a" is a substring of every name but a whole match for none.
        let re = Regex::new("a").unwrap();
        assert_eq!(selection.add_matching(&re, &catalog), 0);
        let re = Regex::new("/a").unwrap();
        assert_eq!(selection.add_matching(&re, &catalog), 1);
    }

    #[test]
    fn test_remove_defaults_to_all_first() {
        let catalog = catalog();
        let mut selection = TopicSelection::default();
        assert!(selection.remove_name("/b", &catalog));
        assert!(selection.is_explicit());
        assert_eq!(names(&selection, &catalog), vec!["/a", "/c"]);
    }

    #[test]
    fn test_remove_missing_name_reports_nothing_erased() {
        let catalog = catalog();
        let mut selection = TopicSelection::default();
        assert!(!selection.remove_name("/missing", &catalog));
        assert_eq!(names(&selection, &catalog), vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_remove_matching_counts_erased() {
        let catalog = catalog();
        let mut selection = TopicSelection::default();
        let re = Regex::new("/(a|b)").unwrap();
        assert_eq!(selection.remove_matching(&re, &catalog), 2);
        assert_eq!(names(&selection, &catalog), vec!["/c"]);
        // Second pass erases nothing further.
        assert_eq!(selection.remove_matching(&re, &catalog), 0);
    }

    #[test]
    fn test_explicit_tracks_any_call_sequence() {
        let catalog = catalog();

        let mut untouched = TopicSelection::default();
        assert!(!untouched.is_explicit());
        untouched.touch();
        assert!(untouched.is_explicit());

        let mut removed = TopicSelection::default();
        removed.remove_matching(&Regex::new("nothing-matches").unwrap(), &catalog);
        assert!(removed.is_explicit());
    }
}
