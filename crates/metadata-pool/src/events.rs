//! Observer list shared by the file monitor and the pool.
//!
//! Consumers either hold a channel receiver or register a callback.
//! Receivers that were dropped are pruned on the next emit.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

pub struct Subscribers<E> {
    senders: Mutex<Vec<Sender<E>>>,
    callbacks: Mutex<Vec<Callback<E>>>,
}

impl<E: Clone> Subscribers<E> {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = unbounded();
        self.senders.lock().push(tx);
        rx
    }

    /// Registers a callback invoked on the emitting thread.
    pub fn connect<F>(&self, callback: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.callbacks.lock().push(Arc::new(callback));
    }

    pub fn emit(&self, event: E) {
        self.senders
            .lock()
            .retain(|sender| sender.send(event.clone()).is_ok());

        // callbacks may subscribe again, so never call them under the lock
        let callbacks: Vec<Callback<E>> = self.callbacks.lock().clone();
        for callback in callbacks {
            callback(&event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.senders.lock().is_empty() && self.callbacks.lock().is_empty()
    }
}

impl<E: Clone> Default for Subscribers<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_reaches_receivers_and_callbacks() {
        let subscribers = Subscribers::new();
        let rx = subscribers.subscribe();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        subscribers.connect(move |value: &u32| {
            counter.fetch_add(*value as usize, Ordering::SeqCst);
        });

        subscribers.emit(3);
        assert_eq!(rx.try_recv().expect("event"), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let subscribers: Subscribers<u32> = Subscribers::new();
        drop(subscribers.subscribe());
        subscribers.emit(1);
        assert!(subscribers.is_empty());
    }
}
