//! Resolve/reject continuations handed over by the calling runtime.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::oneshot;

type Continuation = Box<dyn FnOnce(Vec<Value>) + Send>;

/// The outcome delivered to the caller of one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Resolved(Vec<Value>),
    Rejected(Vec<Value>),
}

impl Settlement {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Settlement::Resolved(_))
    }

    pub fn args(&self) -> &[Value] {
        match self {
            Settlement::Resolved(args) | Settlement::Rejected(args) => args,
        }
    }
}

/// A pair of continuations of which exactly one runs, exactly once.
///
/// Settling consumes the promise. A promise dropped unsettled rejects with
/// an empty argument list.
pub struct Promise {
    resolve: Option<Continuation>,
    reject: Option<Continuation>,
}

impl std::fmt::Debug for Promise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("settled", &self.reject.is_none())
            .finish()
    }
}

impl Promise {
    pub fn new<R, J>(resolve: R, reject: J) -> Self
    where
        R: FnOnce(Vec<Value>) + Send + 'static,
        J: FnOnce(Vec<Value>) + Send + 'static,
    {
        Self {
            resolve: Some(Box::new(resolve)),
            reject: Some(Box::new(reject)),
        }
    }

    /// A promise whose settlement is delivered on a oneshot channel.
    pub fn channel() -> (Self, oneshot::Receiver<Settlement>) {
        let (tx, rx) = oneshot::channel();
        let on_resolve = Arc::new(Mutex::new(Some(tx)));
        let on_reject = Arc::clone(&on_resolve);

        let promise = Self::new(
            move |args| deliver(&on_resolve, Settlement::Resolved(args)),
            move |args| deliver(&on_reject, Settlement::Rejected(args)),
        );
        (promise, rx)
    }

    pub fn resolve(mut self, args: Vec<Value>) {
        self.reject = None;
        if let Some(resolve) = self.resolve.take() {
            resolve(args);
        }
    }

    pub fn reject(mut self, args: Vec<Value>) {
        self.resolve = None;
        if let Some(reject) = self.reject.take() {
            reject(args);
        }
    }
}

fn deliver(tx: &Mutex<Option<oneshot::Sender<Settlement>>>, settlement: Settlement) {
    let sender = tx.lock().ok().and_then(|mut slot| slot.take());
    if let Some(sender) = sender {
        // The receiver may already be gone; nothing left to notify.
        let _ = sender.send(settlement);
    }
}

impl Drop for Promise {
    fn drop(&mut self) {
        self.resolve = None;
        if let Some(reject) = self.reject.take() {
            tracing::warn!("promise dropped without settlement, rejecting");
            reject(Vec::new());
        }
    }
}
