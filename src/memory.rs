use crate::client::{ClientError, Entry, LogClient, LogStream};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A client that keeps every submitted entry in memory.
///
/// Useful for tests and for measuring the overhead of the handler
/// without any external I/O.
#[derive(Clone, Default)]
pub struct MemoryClient {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    entries: Mutex<Vec<(String, Entry)>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries submitted so far, tagged with their stream name.
    pub fn entries(&self) -> Vec<(String, Entry)> {
        match self.shared.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Entries submitted to one stream.
    pub fn entries_for(&self, stream: &str) -> Vec<Entry> {
        self.entries()
            .into_iter()
            .filter(|(name, _)| name == stream)
            .map(|(_, entry)| entry)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Number of times `close` was called, successful or not.
    pub fn close_calls(&self) -> usize {
        self.shared.close_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LogClient for MemoryClient {
    fn stream(&self, name: &str) -> Arc<dyn LogStream> {
        Arc::new(MemoryStream {
            name: name.to_string(),
            shared: Arc::clone(&self.shared),
        })
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.shared.close_calls.fetch_add(1, Ordering::Relaxed);
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Err(ClientError::Closed);
        }
        Ok(())
    }
}

struct MemoryStream {
    name: String,
    shared: Arc<Shared>,
}

impl LogStream for MemoryStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, entry: Entry) {
        let mut guard = match self.shared.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push((self.name.clone(), entry));
    }
}
