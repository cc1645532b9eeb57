//! In-memory bundle of the non-template files shipped with a chart
//!
//! Templates receive the bundle unopened as `Files` and read from it through
//! the accessors exposed by the engine (`Get`, `Glob`, `Lines`, ...). Paths
//! are relative to the chart root and kept in sorted order, so iteration and
//! glob results are deterministic.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Files {
    entries: BTreeMap<String, Arc<[u8]>>,
}

impl Files {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file to the bundle
    pub fn with_file(mut self, path: impl Into<String>, content: impl AsRef<[u8]>) -> Self {
        self.insert(path, content);
        self
    }

    /// Add multiple text files at once
    pub fn with_files<'a>(mut self, files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        for (path, content) in files {
            self.insert(path, content);
        }
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl AsRef<[u8]>) {
        self.entries.insert(path.into(), Arc::from(content.as_ref()));
    }

    /// Raw bytes of a file, `None` when absent
    pub fn get_bytes(&self, path: &str) -> Option<&[u8]> {
        self.entries.get(path).map(|bytes| &bytes[..])
    }

    /// File content as text (invalid UTF-8 is replaced); empty when absent
    pub fn get_string(&self, path: &str) -> String {
        self.get_bytes(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// A new bundle holding the files whose path matches `pattern`
    ///
    /// `*` does not cross directory separators; use `**` for that.
    pub fn glob(&self, pattern: &str) -> Result<Files> {
        let glob_pattern = glob::Pattern::new(pattern).map_err(|e| CoreError::GlobPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        let options = glob::MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        let entries = self
            .entries
            .iter()
            .filter(|(path, _)| glob_pattern.matches_with(path, options))
            .map(|(path, content)| (path.clone(), Arc::clone(content)))
            .collect();

        Ok(Files { entries })
    }

    /// File content split into lines
    ///
    /// A single trailing newline does not produce an empty last line. An
    /// absent or empty file has no lines.
    pub fn lines(&self, path: &str) -> Vec<String> {
        let content = self.get_string(path);
        if content.is_empty() {
            return Vec::new();
        }
        let content = content.strip_suffix('\n').unwrap_or(&content);
        content.split('\n').map(String::from).collect()
    }

    /// Iterate over `(path, bytes)` in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(path, content)| (path.as_str(), &content[..]))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Final segment of a slash-separated path
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> Files {
        Files::new().with_files([
            ("config/app.yaml", "port: 8080\n"),
            ("config/nested/db.yaml", "host: db\n"),
            ("scripts/run.sh", "#!/bin/sh\necho hi\n"),
            ("README.md", "readme"),
        ])
    }

    #[test]
    fn test_get() {
        let files = bundle();
        assert_eq!(files.get_string("README.md"), "readme");
        assert_eq!(files.get_string("missing.txt"), "");
        assert!(files.get_bytes("missing.txt").is_none());
        assert!(files.exists("scripts/run.sh"));
    }

    #[test]
    fn test_glob_star_stays_in_directory() {
        let files = bundle();
        let matched = files.glob("config/*.yaml").unwrap();
        let paths: Vec<_> = matched.iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["config/app.yaml"]);

        let matched = files.glob("config/**/*.yaml").unwrap();
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn test_glob_invalid_pattern() {
        let err = bundle().glob("config/[").unwrap_err();
        assert!(matches!(err, CoreError::GlobPattern { .. }));
    }

    #[test]
    fn test_lines() {
        let files = bundle();
        assert_eq!(files.lines("scripts/run.sh"), vec!["#!/bin/sh", "echo hi"]);
        assert_eq!(files.lines("README.md"), vec!["readme"]);
        assert!(files.lines("missing.txt").is_empty());
    }

    #[test]
    fn test_binary_content_is_lossy() {
        let files = Files::new().with_file("blob.bin", [0x66, 0x6f, 0xff]);
        assert_eq!(files.get_bytes("blob.bin").unwrap(), &[0x66, 0x6f, 0xff]);
        assert_eq!(files.get_string("blob.bin"), "fo\u{fffd}");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("config/nested/db.yaml"), "db.yaml");
        assert_eq!(base_name("README.md"), "README.md");
    }
}
