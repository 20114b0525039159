//! Subscription - cancellable handle over a live query.

use std::marker::PhantomData;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde_json::Value;

use super::{decode, Document, StoreError, Versioned};

type Canceller = Box<dyn FnOnce() + Send>;

/// Live sequence of query results.
///
/// Each item is the full result set at some point after a commit. Unread
/// results are coalesced, so a slow reader sees the newest set rather than
/// every intermediate one. Dropping the handle (or calling `cancel`)
/// unregisters it from the store.
pub struct Subscription<D> {
    id: u64,
    receiver: Receiver<Vec<Versioned<Value>>>,
    canceller: Option<Canceller>,
    _marker: PhantomData<fn() -> D>,
}

impl<D: Document> Subscription<D> {
    /// Build a handle from a result channel and a function that unregisters it.
    pub fn new(
        id: u64,
        receiver: Receiver<Vec<Versioned<Value>>>,
        canceller: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            receiver,
            canceller: Some(Box::new(canceller)),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait up to `timeout` for the next result set.
    pub fn next_timeout(&self, timeout: Duration) -> Result<Option<Vec<Versioned<D>>>, StoreError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(snapshot) => decode_all(snapshot).map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(StoreError::Unavailable("subscription closed".into()))
            }
        }
    }

    /// Take the next result set if one is already waiting.
    pub fn try_next(&self) -> Result<Option<Vec<Versioned<D>>>, StoreError> {
        match self.receiver.try_recv() {
            Ok(snapshot) => decode_all(snapshot).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(StoreError::Unavailable("subscription closed".into()))
            }
        }
    }

    /// Skip to the most recent result set waiting in the channel.
    pub fn latest(&self) -> Result<Option<Vec<Versioned<D>>>, StoreError> {
        let mut last = None;
        while let Ok(snapshot) = self.receiver.try_recv() {
            last = Some(snapshot);
        }
        last.map(decode_all).transpose()
    }

    /// Stop receiving updates.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.canceller.take() {
            cancel();
        }
    }
}

impl<D> Drop for Subscription<D> {
    fn drop(&mut self) {
        if let Some(cancel) = self.canceller.take() {
            cancel();
        }
    }
}

fn decode_all<D: Document>(snapshot: Vec<Versioned<Value>>) -> Result<Vec<Versioned<D>>, StoreError> {
    snapshot.into_iter().map(decode).collect()
}
