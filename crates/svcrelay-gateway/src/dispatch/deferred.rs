//! Deferred results.
//!
//! A `Deferred` is the handler-facing half of a single-shot completion cell;
//! the `Completer` is the producer half. Exactly one listener may be
//! attached, and it runs exactly once on whichever thread completes the cell
//! (or inline, if the cell was already complete when the listener attached).
//! Dropping a `Completer` without completing it resolves the cell with
//! `RelayError::Abandoned`, so a waiting caller is never left without an
//! answer.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use svcrelay_core::error::RelayError;

use crate::dispatch::fault::Fault;

/// What a deferred resolves to.
pub type Completion = Result<Value, Fault>;

type Listener = Box<dyn FnOnce(Completion) + Send + 'static>;

enum State {
    Pending(Option<Listener>),
    Done(Completion),
    Delivered,
}

struct Cell {
    state: Mutex<State>,
}

impl Cell {
    fn lock(&self) -> MutexGuard<'_, State> {
        // A listener never runs under the lock, so poisoning cannot leave the
        // state half-written.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn resolve(&self, result: Completion) {
        let listener = {
            let mut st = self.lock();
            match std::mem::replace(&mut *st, State::Delivered) {
                State::Pending(Some(l)) => l,
                State::Pending(None) => {
                    *st = State::Done(result);
                    return;
                }
                prev @ (State::Done(_) | State::Delivered) => {
                    *st = prev;
                    return;
                }
            }
        };
        listener(result);
    }

    fn listen(&self, listener: Listener) {
        let ready = {
            let mut st = self.lock();
            match std::mem::replace(&mut *st, State::Delivered) {
                State::Pending(None) => {
                    *st = State::Pending(Some(listener));
                    return;
                }
                State::Done(result) => result,
                prev @ (State::Pending(Some(_)) | State::Delivered) => {
                    *st = prev;
                    tracing::warn!("deferred already has a listener; ignoring second one");
                    return;
                }
            }
        };
        listener(ready);
    }

    fn is_done(&self) -> bool {
        !matches!(*self.lock(), State::Pending(_))
    }
}

/// Handle to a value not yet available.
pub struct Deferred {
    cell: Arc<Cell>,
}

/// Producer half of a `Deferred`.
pub struct Completer {
    cell: Option<Arc<Cell>>,
}

impl Deferred {
    /// New pending cell and its producer.
    pub fn pending() -> (Completer, Deferred) {
        let cell = Arc::new(Cell {
            state: Mutex::new(State::Pending(None)),
        });
        (
            Completer {
                cell: Some(Arc::clone(&cell)),
            },
            Deferred { cell },
        )
    }

    /// Already-resolved cell.
    pub fn ready(result: Completion) -> Self {
        let (completer, deferred) = Self::pending();
        completer.complete(result);
        deferred
    }

    /// Drive `fut` on the current tokio runtime and resolve with its output.
    ///
    /// Fails when called outside a runtime context.
    pub fn spawn<F>(fut: F) -> Result<Self, Fault>
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Fault::system(RelayError::Runtime(e.to_string())))?;
        let (completer, deferred) = Self::pending();
        handle.spawn(async move {
            completer.complete(fut.await);
        });
        Ok(deferred)
    }

    /// Attach the completion listener. Runs inline if already resolved.
    pub fn on_completion<F>(self, listener: F)
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        self.cell.listen(Box::new(listener));
    }

    pub fn is_done(&self) -> bool {
        self.cell.is_done()
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").field("done", &self.is_done()).finish()
    }
}

impl Completer {
    pub fn complete(mut self, result: Completion) {
        if let Some(cell) = self.cell.take() {
            cell.resolve(result);
        }
    }

    pub fn succeed(self, value: Value) {
        self.complete(Ok(value));
    }

    pub fn fail(self, fault: Fault) {
        self.complete(Err(fault));
    }
}

impl Drop for Completer {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.take() {
            cell.resolve(Err(Fault::system(RelayError::Abandoned)));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use serde_json::json;

    use super::*;

    #[test]
    fn listener_runs_on_completion() {
        let (completer, deferred) = Deferred::pending();
        let (tx, rx) = mpsc::channel();
        deferred.on_completion(move |r| {
            let _ = tx.send(r.map_err(|f| f.to_string()));
        });
        assert!(rx.try_recv().is_err());
        completer.succeed(json!(42));
        assert_eq!(rx.try_recv().ok(), Some(Ok(json!(42))));
    }

    #[test]
    fn listener_runs_inline_when_already_done() {
        let deferred = Deferred::ready(Ok(json!("early")));
        assert!(deferred.is_done());
        let (tx, rx) = mpsc::channel();
        deferred.on_completion(move |r| {
            let _ = tx.send(r.is_ok());
        });
        assert_eq!(rx.try_recv().ok(), Some(true));
    }

    #[test]
    fn dropped_completer_resolves_abandoned() {
        let (completer, deferred) = Deferred::pending();
        let (tx, rx) = mpsc::channel();
        deferred.on_completion(move |r| {
            let _ = tx.send(r.map_err(|f| f.to_string()));
        });
        drop(completer);
        let got = rx.try_recv().ok();
        assert_eq!(
            got,
            Some(Err("deferred result abandoned before completion".to_string()))
        );
    }

    #[test]
    fn failed_completion_carries_fault() {
        let (completer, deferred) = Deferred::pending();
        let (tx, rx) = mpsc::channel();
        deferred.on_completion(move |r| {
            let _ = tx.send(r.map_err(|f| (f.class(), f.to_string())));
        });
        completer.fail(Fault::rejected("quota exceeded"));
        assert_eq!(
            rx.try_recv().ok(),
            Some(Err((crate::dispatch::FaultClass::Processing, "quota exceeded".to_string())))
        );
    }

    #[test]
    fn completion_happens_on_producer_thread() {
        let (completer, deferred) = Deferred::pending();
        let (tx, rx) = mpsc::channel();
        deferred.on_completion(move |_| {
            let _ = tx.send(std::thread::current().id());
        });
        let producer = std::thread::spawn(move || {
            let id = std::thread::current().id();
            completer.succeed(Value::Null);
            id
        });
        let producer_id = producer.join().ok();
        assert_eq!(rx.recv().ok(), producer_id);
    }

    #[tokio::test]
    async fn spawned_future_resolves() {
        let deferred = Deferred::spawn(async {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            Ok(json!(7))
        })
        .ok();
        let (tx, rx) = tokio::sync::oneshot::channel();
        if let Some(d) = deferred {
            d.on_completion(move |r| {
                let _ = tx.send(r.ok());
            });
        }
        assert_eq!(rx.await.ok().flatten(), Some(json!(7)));
    }

    #[test]
    fn spawn_outside_runtime_is_a_fault() {
        assert!(Deferred::spawn(async { Ok(Value::Null) }).is_err());
    }
}
