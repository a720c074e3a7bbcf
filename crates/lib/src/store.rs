use crate::Clock;
use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::mpsc::{self, Sender},
    thread::{self, JoinHandle},
};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Stored balance `{0}` is not an integer")]
    Corrupt(String),
    #[error("Balance store is unavailable")]
    Unavailable,
}

/// Where the last shown balance survives screen changes and restarts.
///
/// `publish` is called from the animation tick and must return without
/// waiting on slow storage. Stores that block, like [`FileStore`], go behind
/// a [`BackgroundStore`].
pub trait ShownBalanceStore {
    fn load(&self) -> Result<Option<i64>, StoreError>;
    /// Hands `value` over for writing. Must not block.
    fn publish(&mut self, value: i64) -> Result<(), StoreError>;
    fn clear(&mut self) -> Result<(), StoreError>;
}

impl<S: ShownBalanceStore + ?Sized> ShownBalanceStore for Box<S> {
    fn load(&self) -> Result<Option<i64>, StoreError> {
        (**self).load()
    }

    fn publish(&mut self, value: i64) -> Result<(), StoreError> {
        (**self).publish(value)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        (**self).clear()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryStore {
    value: Option<i64>,
    writes: usize,
    unavailable: bool,
}

impl MemoryStore {
    pub fn with_value(value: i64) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }

    /// A store that fails every operation.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn value(&self) -> Option<i64> {
        self.value
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }
}

impl ShownBalanceStore for MemoryStore {
    fn load(&self) -> Result<Option<i64>, StoreError> {
        self.check()?;
        Ok(self.value)
    }

    fn publish(&mut self, value: i64) -> Result<(), StoreError> {
        self.check()?;
        self.value = Some(value);
        self.writes += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.check()?;
        self.value = None;
        Ok(())
    }
}

/// Keeps the value as a decimal integer in a plain text file. Writes block,
/// wrap it in a [`BackgroundStore`] before handing it to a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ShownBalanceStore for FileStore {
    fn load(&self) -> Result<Option<i64>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse()
            .map(Some)
            .map_err(|_| StoreError::Corrupt(raw.to_string()))
    }

    fn publish(&mut self, value: i64) -> Result<(), StoreError> {
        fs::write(&self.path, itoa::Buffer::new().format(value))?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

enum Command {
    Publish(i64),
    Clear,
    Load(Sender<Result<Option<i64>, StoreError>>),
}

/// Runs a blocking store on its own writer thread. `publish` and `clear` only
/// queue the operation, they land in order and failures are logged there.
/// Dropping the store waits for queued writes.
pub struct BackgroundStore<S> {
    commands: Option<Sender<Command>>,
    worker: Option<JoinHandle<S>>,
}

impl<S: ShownBalanceStore + Send + 'static> BackgroundStore<S> {
    pub fn spawn(mut inner: S) -> Result<Self, StoreError> {
        let (commands, queue) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("shown-balance-writer".to_string())
            .spawn(move || {
                for command in queue {
                    match command {
                        Command::Publish(value) => {
                            if let Err(err) = inner.publish(value) {
                                warn!(%err, value, "failed to write shown balance");
                            }
                        }
                        Command::Clear => {
                            if let Err(err) = inner.clear() {
                                warn!(%err, "failed to clear shown balance");
                            }
                        }
                        Command::Load(reply) => {
                            // the caller may have given up waiting
                            let _ = reply.send(inner.load());
                        }
                    }
                }
                inner
            })?;

        Ok(Self {
            commands: Some(commands),
            worker: Some(worker),
        })
    }
}

impl<S> BackgroundStore<S> {
    /// Waits for every queued write and returns the wrapped store.
    pub fn close(mut self) -> Result<S, StoreError> {
        self.shutdown().ok_or(StoreError::Unavailable)
    }

    fn shutdown(&mut self) -> Option<S> {
        drop(self.commands.take());
        self.worker.take()?.join().ok()
    }

    fn send(&self, command: Command) -> Result<(), StoreError> {
        self.commands
            .as_ref()
            .ok_or(StoreError::Unavailable)?
            .send(command)
            .map_err(|_| StoreError::Unavailable)
    }
}

impl<S> Drop for BackgroundStore<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<S> ShownBalanceStore for BackgroundStore<S> {
    /// Waits for queued writes to land first, so it reads what was published.
    fn load(&self) -> Result<Option<i64>, StoreError> {
        let (reply, answer) = mpsc::channel();
        self.send(Command::Load(reply))?;
        answer.recv().map_err(|_| StoreError::Unavailable)?
    }

    fn publish(&mut self, value: i64) -> Result<(), StoreError> {
        self.send(Command::Publish(value))
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.send(Command::Clear)
    }
}

/// Stamps every successful write of the wrapped store with the clock time.
#[derive(Debug, Clone)]
pub struct RecordingStore<S, C> {
    inner: S,
    clock: C,
    log: Vec<(i64, i64)>,
}

impl<S: ShownBalanceStore, C: Clock> RecordingStore<S, C> {
    pub fn new(inner: S, clock: C) -> Self {
        Self {
            inner,
            clock,
            log: Vec::new(),
        }
    }

    /// `(time, value)` of every successful write, oldest first.
    pub fn log(&self) -> &[(i64, i64)] {
        &self.log
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ShownBalanceStore, C: Clock> ShownBalanceStore for RecordingStore<S, C> {
    fn load(&self) -> Result<Option<i64>, StoreError> {
        self.inner.load()
    }

    fn publish(&mut self, value: i64) -> Result<(), StoreError> {
        self.inner.publish(value)?;
        self.log.push((self.clock.now_millis(), value));
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.inner.clear()
    }
}
