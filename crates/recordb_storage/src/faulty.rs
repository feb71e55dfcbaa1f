//! Failure injection for exercising engine error paths.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Remote control for a [`FaultyBackend`].
///
/// Handles are cheap to clone; flipping a switch affects every backend
/// created from it.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl FaultSwitch {
    /// Creates a switch with every fault disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `read_at` fail.
    pub fn fail_reads(&self, enabled: bool) {
        self.fail_reads.store(enabled, Ordering::SeqCst);
    }

    /// Makes `append`, `flush`, `sync` and `truncate` fail.
    pub fn fail_writes(&self, enabled: bool) {
        self.fail_writes.store(enabled, Ordering::SeqCst);
    }

    fn reads_failing(&self) -> bool {
        self.fail_reads.load(Ordering::SeqCst)
    }

    fn writes_failing(&self) -> bool {
        self.fail_writes.load(Ordering::SeqCst)
    }
}

/// A backend wrapper that fails on demand.
///
/// ```rust
/// use recordb_storage::{FaultSwitch, FaultyBackend, InMemoryBackend, StorageBackend};
///
/// let switch = FaultSwitch::new();
/// let mut backend = FaultyBackend::new(InMemoryBackend::new(), switch.clone());
/// backend.append(b"ok").unwrap();
///
/// switch.fail_reads(true);
/// assert!(backend.read_at(0, 2).is_err());
/// ```
#[derive(Debug)]
pub struct FaultyBackend<B> {
    inner: B,
    switch: FaultSwitch,
}

impl<B: StorageBackend> FaultyBackend<B> {
    /// Wraps `inner`, controlled by `switch`.
    pub fn new(inner: B, switch: FaultSwitch) -> Self {
        Self { inner, switch }
    }

    fn check_write(&self, operation: &'static str) -> StorageResult<()> {
        if self.switch.writes_failing() {
            Err(StorageError::Injected { operation })
        } else {
            Ok(())
        }
    }
}

impl<B: StorageBackend> StorageBackend for FaultyBackend<B> {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        if self.switch.reads_failing() {
            return Err(StorageError::Injected { operation: "read" });
        }
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.check_write("append")?;
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check_write("flush")?;
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check_write("sync")?;
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check_write("truncate")?;
        self.inner.truncate(new_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryBackend;

    #[test]
    fn write_faults_leave_store_untouched() {
        let switch = FaultSwitch::new();
        let memory = InMemoryBackend::new();
        let mut backend = FaultyBackend::new(memory.clone(), switch.clone());

        switch.fail_writes(true);
        assert!(matches!(
            backend.append(b"lost"),
            Err(StorageError::Injected { operation: "append" })
        ));
        assert!(memory.snapshot().is_empty());

        switch.fail_writes(false);
        backend.append(b"kept").unwrap();
        assert_eq!(memory.snapshot(), b"kept");
    }

    #[test]
    fn read_faults_are_reversible() {
        let switch = FaultSwitch::new();
        let mut backend = FaultyBackend::new(InMemoryBackend::new(), switch.clone());
        backend.append(b"abc").unwrap();

        switch.fail_reads(true);
        assert!(backend.read_at(0, 3).is_err());
        assert_eq!(backend.size().unwrap(), 3);

        switch.fail_reads(false);
        assert_eq!(backend.read_at(0, 3).unwrap(), b"abc");
    }
}
