//! The ordered `-I` search path shared by every registered build step

use log::debug;
use serde::Serialize;

/// Ordered set of directories passed to the compiler as `-I` flags
///
/// Each registered build step prepends its root, so roots registered later
/// come first. A directory is never listed twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchPath {
    dirs: Vec<String>,
}

impl SearchPath {
    pub fn new() -> Self {
        SearchPath::default()
    }

    /// Seed a search path from configured include directories, keeping their order
    pub fn from_dirs<I, S>(dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut search_path = SearchPath::new();
        for dir in dirs {
            search_path.append(dir);
        }
        search_path
    }

    /// Put `dir` in front unless it is already present
    pub fn prepend<S: Into<String>>(&mut self, dir: S) -> bool {
        let dir = dir.into();
        if dir.is_empty() || self.contains(&dir) {
            return false;
        }
        debug!("Prepending '{}' to the proto search path", dir);
        self.dirs.insert(0, dir);
        true
    }

    /// Add `dir` at the end unless it is already present
    pub fn append<S: Into<String>>(&mut self, dir: S) -> bool {
        let dir = dir.into();
        if dir.is_empty() || self.contains(&dir) {
            return false;
        }
        self.dirs.push(dir);
        true
    }

    pub fn contains(&self, dir: &str) -> bool {
        self.dirs.iter().any(|d| d == dir)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.dirs.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// `-I<dir>` for every entry, in order
    pub fn include_flags(&self) -> Vec<String> {
        self.dirs.iter().map(|dir| format!("-I{}", dir)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_puts_latest_first() {
        let mut search_path = SearchPath::from_dirs(vec!["/usr/include/proto"]);
        assert!(search_path.prepend("src/a"));
        assert!(search_path.prepend("src/b"));

        assert_eq!(
            search_path.iter().collect::<Vec<_>>(),
            vec!["src/b", "src/a", "/usr/include/proto"]
        );
    }

    #[test]
    fn test_duplicates_keep_original_position() {
        let mut search_path = SearchPath::new();
        search_path.prepend("a");
        search_path.prepend("b");
        assert!(!search_path.prepend("a"));
        assert!(!search_path.append("b"));
        assert!(!search_path.prepend(""));

        assert_eq!(search_path.len(), 2);
        assert_eq!(search_path.include_flags(), vec!["-Ib", "-Ia"]);
    }
}
