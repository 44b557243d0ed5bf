//! Crash simulation for the byte layer.
//!
//! [`CrashableBackend`] is an in-memory [`StorageBackend`] that can be told
//! to die partway through a write. Once it has crashed it refuses every
//! further mutation, so the bytes left behind are exactly what a killed
//! process would leave on disk. A [`CrashHandle`] kept by the test reads
//! those bytes back and "restarts" from them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (backend, handle) = CrashableBackend::new();
//! let log = LogBackend::with_storage(Box::new(backend), LogConfig::default())?;
//! // ... committed writes ...
//! handle.crash_after(10);
//! assert!(log.insert(record, None).await.is_err());
//! let recovered = LogBackend::with_storage(Box::new(handle.restart()), LogConfig::default())?;
//! ```

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use xidb_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// The process dies partway through appending a frame.
    DuringAppend,
    /// The append lands but the flush fails; the process survives.
    FlushFailure,
}

/// Bytes of a frame that land before a [`CrashPoint::DuringAppend`] crash.
pub const TORN_BYTES: u64 = 9;

#[derive(Default)]
struct CrashState {
    bytes: InMemoryBackend,
    crash_at: Option<u64>,
    fail_next_flush: bool,
    crashed: bool,
}

/// A test's view of a [`CrashableBackend`].
#[derive(Clone, Default)]
pub struct CrashHandle {
    state: Arc<Mutex<CrashState>>,
}

impl CrashHandle {
    /// Arms a crash once `bytes` more bytes have been appended.
    pub fn crash_after(&self, bytes: u64) {
        let mut state = self.state.lock();
        let size = state.bytes.size().unwrap_or(0);
        state.crash_at = Some(size + bytes);
    }

    /// Arms `point` for the next write.
    pub fn arm(&self, point: CrashPoint) {
        match point {
            CrashPoint::DuringAppend => self.crash_after(TORN_BYTES),
            CrashPoint::FlushFailure => self.fail_next_flush(),
        }
    }

    /// Makes the next flush fail without killing the backend.
    pub fn fail_next_flush(&self) {
        self.state.lock().fail_next_flush = true;
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.state.lock().crashed
    }

    /// Returns the bytes currently stored.
    pub fn snapshot(&self) -> Vec<u8> {
        self.state.lock().bytes.snapshot()
    }

    /// Returns a fresh backend holding what survived, as a restarted
    /// process would find it.
    pub fn restart(&self) -> InMemoryBackend {
        InMemoryBackend::with_data(self.snapshot())
    }
}

/// A storage backend that can simulate crashes.
pub struct CrashableBackend {
    state: Arc<Mutex<CrashState>>,
}

impl CrashableBackend {
    /// Creates an empty backend and the handle that controls it.
    pub fn new() -> (Self, CrashHandle) {
        Self::with_data(Vec::new())
    }

    /// Creates a backend holding `data` and the handle that controls it.
    pub fn with_data(data: Vec<u8>) -> (Self, CrashHandle) {
        let handle = CrashHandle {
            state: Arc::new(Mutex::new(CrashState {
                bytes: InMemoryBackend::with_data(data),
                ..CrashState::default()
            })),
        };
        (
            Self {
                state: handle.state.clone(),
            },
            handle,
        )
    }
}

fn crashed(what: &str) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, format!("simulated crash {what}")))
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.state.lock().bytes.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut state = self.state.lock();
        if state.crashed {
            return Err(crashed("(backend is down)"));
        }
        let size = state.bytes.size()?;
        if let Some(crash_at) = state.crash_at {
            let end = size + data.len() as u64;
            if end > crash_at {
                state.crashed = true;
                let partial = usize::try_from(crash_at.saturating_sub(size)).unwrap_or(0);
                if partial > 0 {
                    state.bytes.append(&data[..partial])?;
                }
                return Err(crashed("during append"));
            }
        }
        state.bytes.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        let mut state = self.state.lock();
        if state.crashed {
            return Err(crashed("(backend is down)"));
        }
        if state.fail_next_flush {
            state.fail_next_flush = false;
            return Err(crashed("during flush"));
        }
        state.bytes.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.state.lock().bytes.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        let mut state = self.state.lock();
        if state.crashed {
            return Err(crashed("(backend is down)"));
        }
        state.bytes.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut state = self.state.lock();
        if state.crashed {
            return Err(crashed("(backend is down)"));
        }
        state.bytes.truncate(new_size)
    }

    fn rewrite(&mut self, data: &[u8]) -> StorageResult<()> {
        let mut state = self.state.lock();
        if state.crashed {
            return Err(crashed("(backend is down)"));
        }
        state.bytes.rewrite(data)
    }
}
