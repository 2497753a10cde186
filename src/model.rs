use std::path::PathBuf;

/// A `KEY=value` entry extracted from one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
    pub source: Option<PathBuf>,
    /// 1-based line number within the source.
    pub line: usize,
}

/// Summary of the load operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped_lines: usize,
    pub files_read: usize,
    /// Absent files that were tolerated because they were not required.
    pub files_missing: usize,
}
