use std::sync::{Arc, Mutex, PoisonError};

/// Capacity-1 hand-off slot. Offering into an occupied slot replaces the
/// pending item, so the slot always holds the latest undelivered value.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Option<T>,
    dropped: u64,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: None,
            dropped: 0,
        }
    }

    /// Store `item`, returning the undelivered predecessor it displaced.
    pub fn offer(&mut self, item: T) -> Option<T> {
        let displaced = self.slot.replace(item);
        if displaced.is_some() {
            self.dropped += 1;
        }
        displaced
    }

    pub fn take(&mut self) -> Option<T> {
        self.slot.take()
    }

    /// Discard the pending item. Returns true if there was one.
    pub fn clear(&mut self) -> bool {
        let had_item = self.slot.take().is_some();
        if had_item {
            self.dropped += 1;
        }
        had_item
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }

    /// Items that were replaced or cleared before anyone took them.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// A [`Mailbox`] shared between threads.
#[derive(Debug)]
pub struct SharedMailbox<T> {
    inner: Arc<Mutex<Mailbox<T>>>,
}

impl<T> Clone for SharedMailbox<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for SharedMailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SharedMailbox<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Mailbox::new())),
        }
    }

    pub fn offer(&self, item: T) -> Option<T> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .offer(item)
    }

    pub fn take(&self) -> Option<T> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Items replaced before anyone took them.
    pub fn dropped(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dropped()
    }
}
