use std::io::BufRead;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use regex::bytes::Regex as BytesRegex;

use crate::model::Entry;

static LINE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z][a-zA-Z0-9_]+)=(.*)$").expect("line pattern is a valid regex")
});

// Same grammar over raw bytes, for lines that are not valid UTF-8.
static BYTE_LINE_PATTERN: LazyLock<BytesRegex> = LazyLock::new(|| {
    BytesRegex::new(r"(?-u)^([a-zA-Z][a-zA-Z0-9_]+)=(.*)$")
        .expect("byte line pattern is a valid regex")
});

/// Validate a single line and split it into `(key, value)`.
///
/// The line is trimmed first. Blank lines, lines starting with `#` and lines
/// that do not match `^([a-zA-Z][a-zA-Z0-9_]+)=(.*)$` yield `None`. The value
/// is everything after the first `=`, exactly as written: quotes, spaces and
/// `#` are kept.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let captures = LINE_PATTERN.captures(line)?;
    let key = captures.get(1)?.as_str();
    let value = captures.get(2)?.as_str();
    Some((key, value))
}

/// Extract entries from in-memory text.
///
/// Duplicate keys are returned in file order; applying them in order makes
/// the last one win.
pub fn parse_str(input: &str) -> Vec<Entry> {
    input
        .split('\n')
        .zip(1usize..)
        .filter_map(|(line, line_num)| entry_from_line(line, line_num, None))
        .collect()
}

/// Extract entries from a buffered reader.
///
/// A well-formed line whose value is not valid UTF-8 fails with
/// [`std::io::ErrorKind::InvalidData`].
pub fn parse_reader<R: BufRead>(reader: R) -> std::io::Result<Vec<Entry>> {
    let mut scanner = LineScanner::new(reader, None);
    let mut entries = Vec::new();
    while let Some(scanned) = scanner.next_line()? {
        match scanned {
            Scanned::Entry(entry) => entries.push(entry),
            Scanned::Skipped => {}
            Scanned::NonUtf8Value { key, line } => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("value of {key:?} on line {line} is not valid UTF-8"),
                ));
            }
        }
    }
    Ok(entries)
}

/// Outcome of scanning one physical line.
pub(crate) enum Scanned {
    Entry(Entry),
    Skipped,
    /// The line matches the grammar but its value is not valid UTF-8.
    NonUtf8Value { key: String, line: usize },
}

/// Streams lines out of a reader, splitting on `\n` byte-wise.
pub(crate) struct LineScanner<'a, R> {
    reader: R,
    source: Option<&'a Path>,
    buf: Vec<u8>,
    line_num: usize,
}

impl<'a, R: BufRead> LineScanner<'a, R> {
    pub(crate) fn new(reader: R, source: Option<&'a Path>) -> Self {
        Self {
            reader,
            source,
            buf: Vec::new(),
            line_num: 0,
        }
    }

    /// Returns `Ok(None)` once the input is exhausted.
    pub(crate) fn next_line(&mut self) -> std::io::Result<Option<Scanned>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line_num += 1;

        let Ok(line) = std::str::from_utf8(&self.buf) else {
            return Ok(Some(match non_utf8_key(&self.buf) {
                Some(key) => Scanned::NonUtf8Value {
                    key,
                    line: self.line_num,
                },
                None => Scanned::Skipped,
            }));
        };

        Ok(Some(match entry_from_line(line, self.line_num, self.source) {
            Some(entry) => Scanned::Entry(entry),
            None => Scanned::Skipped,
        }))
    }
}

/// Key of a non-UTF-8 line that still matches the grammar.
///
/// The key is ASCII by construction, so any invalid bytes sit in the value.
fn non_utf8_key(line: &[u8]) -> Option<String> {
    let line = line.trim_ascii();
    if line.is_empty() || line.starts_with(b"#") {
        return None;
    }

    let captures = BYTE_LINE_PATTERN.captures(line)?;
    let key = captures.get(1)?.as_bytes();
    std::str::from_utf8(key).ok().map(str::to_owned)
}

fn entry_from_line(line: &str, line_num: usize, source: Option<&Path>) -> Option<Entry> {
    let (key, value) = parse_line(line)?;
    Some(Entry {
        key: key.to_owned(),
        value: value.to_owned(),
        source: source.map(Path::to_path_buf),
        line: line_num,
    })
}
