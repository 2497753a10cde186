use std::collections::BTreeMap;

use crate::error::{Error, SetVarReason};

/// Destination for loaded environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEnv {
    kind: TargetEnvKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TargetEnvKind {
    /// Apply entries to the current process environment.
    ///
    /// This writes through [`std::env::set_var`], which mutates global process
    /// state and is not thread-safe for concurrent environment access.
    Process,
    /// Apply entries to an in-memory map.
    Memory(BTreeMap<String, String>),
}

impl Default for TargetEnv {
    fn default() -> Self {
        Self::memory()
    }
}

impl TargetEnv {
    /// Create a process-environment target.
    ///
    /// # Safety
    ///
    /// The caller must ensure no other threads concurrently read or write the
    /// process environment for the duration of operations that may mutate this
    /// target.
    pub unsafe fn process() -> Self {
        Self {
            kind: TargetEnvKind::Process,
        }
    }

    /// Create an in-memory environment target.
    ///
    /// Use this to avoid mutating the process environment.
    pub fn memory() -> Self {
        Self::from_memory(BTreeMap::new())
    }

    /// Create an in-memory environment target from an existing map.
    pub fn from_memory(map: BTreeMap<String, String>) -> Self {
        Self {
            kind: TargetEnvKind::Memory(map),
        }
    }

    pub fn is_process(&self) -> bool {
        matches!(self.kind, TargetEnvKind::Process)
    }

    pub fn as_memory(&self) -> Option<&BTreeMap<String, String>> {
        match &self.kind {
            TargetEnvKind::Memory(map) => Some(map),
            TargetEnvKind::Process => None,
        }
    }

    /// Mutable access to the in-memory map; `None` for the process target.
    pub fn as_memory_mut(&mut self) -> Option<&mut BTreeMap<String, String>> {
        match &mut self.kind {
            TargetEnvKind::Memory(map) => Some(map),
            TargetEnvKind::Process => None,
        }
    }

    pub fn into_memory(self) -> Option<BTreeMap<String, String>> {
        match self.kind {
            TargetEnvKind::Memory(map) => Some(map),
            TargetEnvKind::Process => None,
        }
    }

    pub fn get_var(&self, key: &str) -> Option<String> {
        match &self.kind {
            TargetEnvKind::Process => {
                std::env::var_os(key).map(|value| value.to_string_lossy().into_owned())
            }
            TargetEnvKind::Memory(map) => map.get(key).cloned(),
        }
    }

    /// Set `key` to `value`.
    ///
    /// The process target rejects keys and values the platform cannot store
    /// instead of letting [`std::env::set_var`] panic.
    pub(crate) fn set_var(&mut self, key: &str, value: &str) -> Result<(), Error> {
        match &mut self.kind {
            TargetEnvKind::Process => {
                if let Some(reason) = process_var_rejection(key, value) {
                    return Err(Error::SetVar {
                        key: key.to_owned(),
                        reason,
                    });
                }
                // SAFETY: `TargetEnv::process` is unsafe and its caller
                // promised exclusive access to the process environment.
                unsafe { std::env::set_var(key, value) };
            }
            TargetEnvKind::Memory(map) => {
                map.insert(key.to_owned(), value.to_owned());
            }
        }
        Ok(())
    }
}

fn process_var_rejection(key: &str, value: &str) -> Option<SetVarReason> {
    if key.is_empty() {
        Some(SetVarReason::EmptyKey)
    } else if key.contains('=') {
        Some(SetVarReason::KeyContainsEquals)
    } else if key.contains('\0') {
        Some(SetVarReason::KeyContainsNul)
    } else if value.contains('\0') {
        Some(SetVarReason::ValueContainsNul)
    } else {
        None
    }
}
