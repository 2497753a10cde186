use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use crate::env::TargetEnv;
use crate::error::{Error, SetVarReason};
use crate::model::{Entry, LoadReport};
use crate::parser::{LineScanner, Scanned};

/// Load an env file into the process environment.
///
/// A missing file is a no-op unless `fail_if_missing` is set. Entries are
/// applied as they are read, so a failure partway through leaves earlier
/// entries applied.
///
/// # Safety
///
/// The caller must ensure no other threads concurrently read or write the
/// process environment while this runs.
pub unsafe fn load(path: impl AsRef<Path>, fail_if_missing: bool) -> Result<(), Error> {
    // SAFETY: forwarded from this function's contract.
    let target = unsafe { TargetEnv::process() };
    let mut loader = EnvLoader::new()
        .path(path)
        .fail_if_missing(fail_if_missing)
        .target(target);
    loader.load().map(|_| ())
}

/// Read an env file into a map without touching the process environment.
///
/// Later lines win for duplicate keys.
pub fn read_file(
    path: impl AsRef<Path>,
    fail_if_missing: bool,
) -> Result<BTreeMap<String, String>, Error> {
    let mut loader = EnvLoader::new()
        .path(path)
        .fail_if_missing(fail_if_missing)
        .target(TargetEnv::memory());
    loader.load()?;
    Ok(loader.into_target().into_memory().unwrap_or_default())
}

/// Builder-style env file loader.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    paths: Vec<PathBuf>,
    fail_if_missing: bool,
    log_close_errors: bool,
    target: TargetEnv,
}

impl EnvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.paths
            .extend(paths.into_iter().map(|path| path.as_ref().to_path_buf()));
        self
    }

    /// Return [`Error::FileNotFound`] for absent files instead of skipping them.
    pub fn fail_if_missing(mut self, fail_if_missing: bool) -> Self {
        self.fail_if_missing = fail_if_missing;
        self
    }

    /// Emit a `tracing` warning when closing a file fails.
    ///
    /// Close failures are never returned as errors.
    pub fn log_close_errors(mut self, log_close_errors: bool) -> Self {
        self.log_close_errors = log_close_errors;
        self
    }

    pub fn target(mut self, target: TargetEnv) -> Self {
        self.target = target;
        self
    }

    pub fn target_env(&self) -> &TargetEnv {
        &self.target
    }

    /// Mutable access to the target, e.g. to seed or clear an in-memory map
    /// between loads.
    pub fn target_env_mut(&mut self) -> &mut TargetEnv {
        &mut self.target
    }

    pub fn into_target(self) -> TargetEnv {
        self.target
    }

    /// Collect entries from every configured file without applying them.
    pub fn parse_only(&self) -> Result<Vec<Entry>, Error> {
        let mut entries = Vec::new();
        for path in self.effective_paths() {
            scan_file(&path, self.fail_if_missing, self.log_close_errors, |entry| {
                entries.push(entry);
                Ok(())
            })?;
        }
        Ok(entries)
    }

    /// Apply every configured file to the target, in order.
    ///
    /// Stops at the first error; entries applied before it stay applied.
    pub fn load(&mut self) -> Result<LoadReport, Error> {
        let mut report = LoadReport::default();

        for path in self.effective_paths() {
            let target = &mut self.target;
            let outcome = scan_file(&path, self.fail_if_missing, self.log_close_errors, |entry| {
                target.set_var(&entry.key, &entry.value)?;
                report.loaded += 1;
                Ok(())
            })?;

            match outcome {
                FileOutcome::Missing => report.files_missing += 1,
                FileOutcome::Read { skipped_lines } => {
                    report.files_read += 1;
                    report.skipped_lines += skipped_lines;
                }
            }
        }

        tracing::debug!(
            files_read = report.files_read,
            files_missing = report.files_missing,
            loaded = report.loaded,
            skipped_lines = report.skipped_lines,
            "env files loaded"
        );
        Ok(report)
    }

    fn effective_paths(&self) -> Vec<PathBuf> {
        if self.paths.is_empty() {
            vec![PathBuf::from(".env")]
        } else {
            self.paths.clone()
        }
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            fail_if_missing: false,
            log_close_errors: false,
            target: TargetEnv::memory(),
        }
    }
}

enum FileOutcome {
    Missing,
    Read { skipped_lines: usize },
}

fn scan_file<F>(
    path: &Path,
    fail_if_missing: bool,
    log_close_errors: bool,
    mut on_entry: F,
) -> Result<FileOutcome, Error>
where
    F: FnMut(Entry) -> Result<(), Error>,
{
    let Some(file) = open_file(path, fail_if_missing)? else {
        tracing::debug!(path = %path.display(), "env file not found, skipping");
        return Ok(FileOutcome::Missing);
    };

    let result = scan_lines(&file, path, &mut on_entry);
    release_file(file, path, log_close_errors);
    let skipped_lines = result?;
    Ok(FileOutcome::Read { skipped_lines })
}

fn open_file(path: &Path, fail_if_missing: bool) -> Result<Option<File>, Error> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            if fail_if_missing {
                return Err(Error::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            return Ok(None);
        }
        Err(source) => {
            return Err(Error::FileOpen {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    // Unix lets a directory be opened; it only fails on the first read.
    let is_dir = file
        .metadata()
        .map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?
        .is_dir();
    if is_dir {
        return Err(Error::FileOpen {
            path: path.to_path_buf(),
            source: ErrorKind::IsADirectory.into(),
        });
    }

    Ok(Some(file))
}

fn scan_lines<F>(file: &File, path: &Path, on_entry: &mut F) -> Result<usize, Error>
where
    F: FnMut(Entry) -> Result<(), Error>,
{
    let mut scanner = LineScanner::new(BufReader::new(file), Some(path));
    let mut skipped_lines = 0usize;

    while let Some(scanned) = scanner.next_line().map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })? {
        match scanned {
            Scanned::Entry(entry) => on_entry(entry)?,
            Scanned::Skipped => skipped_lines += 1,
            Scanned::NonUtf8Value { key, .. } => {
                return Err(Error::SetVar {
                    key,
                    reason: SetVarReason::ValueNotUtf8,
                });
            }
        }
    }

    Ok(skipped_lines)
}

fn release_file(file: File, path: &Path, log_close_errors: bool) {
    release_file_with(file, path, log_close_errors, close_file);
}

fn release_file_with<C>(file: File, path: &Path, log_close_errors: bool, close: C)
where
    C: FnOnce(File) -> std::io::Result<()>,
{
    if let Err(err) = close(file) {
        report_close_error(&err, path, log_close_errors);
    }
}

fn report_close_error(err: &std::io::Error, path: &Path, log_close_errors: bool) {
    if log_close_errors {
        tracing::warn!(path = %path.display(), error = %err, "error closing env file");
    }
}

#[cfg(unix)]
fn close_file(file: File) -> std::io::Result<()> {
    use std::os::fd::IntoRawFd;

    let fd = file.into_raw_fd();
    // SAFETY: `into_raw_fd` handed over sole ownership of `fd`, closed once here.
    if unsafe { libc::close(fd) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn close_file(file: File) -> std::io::Result<()> {
    drop(file);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use tempfile::TempDir;

    use super::*;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("log buffer poisoned")).into_owned()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .expect("log buffer poisoned")
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn with_captured_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, logs.contents())
    }

    #[test]
    fn close_errors_are_logged_only_when_enabled() {
        let path = Path::new("/etc/app.env");
        let err = std::io::Error::other("disk went away");

        let ((), silent) = with_captured_logs(|| report_close_error(&err, path, false));
        assert!(silent.is_empty(), "unexpected log output: {silent}");

        let ((), logged) = with_captured_logs(|| report_close_error(&err, path, true));
        assert!(logged.contains("error closing env file"), "{logged}");
        assert!(logged.contains("disk went away"), "{logged}");
        assert!(logged.contains("/etc/app.env"), "{logged}");
    }

    #[test]
    fn failing_close_is_swallowed_and_logged_when_enabled() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("app.env");
        std::fs::write(&path, "AA=1\n").expect("failed to write env file");

        let failing_close = |file: File| -> std::io::Result<()> {
            drop(file);
            Err(std::io::Error::other("input/output error"))
        };

        let file = File::open(&path).expect("failed to open env file");
        let ((), silent) =
            with_captured_logs(|| release_file_with(file, &path, false, failing_close));
        assert!(silent.is_empty(), "unexpected log output: {silent}");

        let file = File::open(&path).expect("failed to open env file");
        let ((), logged) =
            with_captured_logs(|| release_file_with(file, &path, true, failing_close));
        assert!(logged.contains("WARN"), "{logged}");
        assert!(logged.contains("error closing env file"), "{logged}");
        assert!(logged.contains("input/output error"), "{logged}");
    }

    #[test]
    fn non_utf8_value_aborts_load_after_earlier_entries() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("app.env");
        std::fs::write(&path, b"AA=1\nCITY=caf\xe9\nBB=2\n").expect("failed to write env file");

        let mut loader = EnvLoader::new().path(&path);
        let err = loader.load().expect_err("Latin-1 value should fail");
        match err {
            Error::SetVar { key, reason } => {
                assert_eq!(key, "CITY");
                assert_eq!(reason, SetVarReason::ValueNotUtf8);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let map = loader.target_env().as_memory().expect("memory target");
        assert_eq!(map.get("AA").map(String::as_str), Some("1"));
        assert!(!map.contains_key("CITY"));
        assert!(!map.contains_key("BB"));
    }

    #[test]
    fn load_logs_never_include_values() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let file = dir.path().join("app.env");
        std::fs::write(&file, "SECRET=hunter2\n").expect("failed to write env file");

        let (result, logs) = with_captured_logs(|| {
            EnvLoader::new()
                .path(&file)
                .log_close_errors(true)
                .load()
        });

        let report = result.expect("load should succeed");
        assert_eq!(report.loaded, 1);
        assert!(logs.contains("env files loaded"), "{logs}");
        assert!(!logs.contains("hunter2"), "value leaked into logs: {logs}");
    }

    #[test]
    fn directory_is_an_open_error() {
        let dir = TempDir::new().expect("failed to create temp dir");

        let err = open_file(dir.path(), false).expect_err("directory should not open");
        match err {
            Error::FileOpen { path, .. } => assert_eq!(path, dir.path()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_file_respects_flag() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let missing = dir.path().join("missing.env");

        assert!(matches!(open_file(&missing, false), Ok(None)));
        assert!(matches!(
            open_file(&missing, true),
            Err(Error::FileNotFound { .. })
        ));
    }

    #[test]
    fn release_closes_the_handle_cleanly() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("app.env");
        std::fs::write(&path, "AA=1\n").expect("failed to write env file");

        let file = File::open(&path).expect("failed to open env file");
        close_file(file).expect("close should succeed");
    }
}
