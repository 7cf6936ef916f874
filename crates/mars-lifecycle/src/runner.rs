//! `DecrefRunner`: a single background OS thread draining a FIFO queue of chunk releases.
//! Ported from `core/entity/executable.py`'s cleanup-callback machinery -- the one place this
//! codebase hands work to a thread outside the actor loops, because a language-level handle's
//! GC callback can fire on any thread, including one that must never block an event loop.

use std::sync::{
    Arc, Weak,
    mpsc::{Receiver, Sender, channel},
};
use std::time::Duration;

use mars_chunk_graph::ChunkKey;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{error::DecrefError, session::SessionDecref};

enum QueueItem {
    Decref {
        key: ChunkKey,
        session: Weak<dyn SessionDecref>,
        completion: oneshot::Sender<Result<(), DecrefError>>,
    },
    Shutdown,
}

/// How long a caller not on the session's own loop thread waits for its decref to land before
/// giving up silently (§4.3's ordering rule; §5's timeout table).
pub const DECREF_WAIT: Duration = Duration::from_millis(500);

pub struct DecrefRunner {
    sender: Sender<QueueItem>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl DecrefRunner {
    pub fn start() -> Self {
        let (sender, receiver): (Sender<QueueItem>, Receiver<QueueItem>) = channel();
        let handle = std::thread::Builder::new()
            .name("mars-decref".into())
            .spawn(move || run(receiver))
            .expect("failed to spawn decref runner thread");
        Self { sender, handle: Some(handle) }
    }

    /// Enqueues a release and returns a future that resolves once it's processed. Dropping the
    /// receiver (not awaiting it) is always safe: the runner still processes the item.
    pub fn enqueue(&self, key: ChunkKey, session: Weak<dyn SessionDecref>) -> oneshot::Receiver<Result<(), DecrefError>> {
        let (completion, receiver) = oneshot::channel();
        if self.sender.send(QueueItem::Decref { key, session, completion }).is_err() {
            // Runner thread is gone (process is tearing down); nothing left to wait for.
        }
        receiver
    }

    /// Implements the ordering rule directly: a GC callback running on the session's own
    /// event-loop thread never blocks on the future (the tileable is already unreferenced from
    /// that thread's point of view); any other caller waits up to [`DECREF_WAIT`], then gives up
    /// silently.
    pub async fn release(&self, key: ChunkKey, session: Weak<dyn SessionDecref>, caller_is_session_loop_thread: bool) {
        let receiver = self.enqueue(key, session);
        if caller_is_session_loop_thread {
            return;
        }
        let _ = tokio::time::timeout(DECREF_WAIT, receiver).await;
    }

    /// Enqueues the shutdown sentinel and joins the worker thread, bounded to 1s -- the
    /// `atexit`-style teardown path.
    pub fn shutdown(mut self) {
        let _ = self.sender.send(QueueItem::Shutdown);
        self.join_with_timeout();
    }

    fn join_with_timeout(&mut self) {
        let Some(handle) = self.handle.take() else { return };
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = handle.join();
            let _ = done_tx.send(());
        });
        let _ = done_rx.recv_timeout(Duration::from_secs(1));
    }
}

impl Drop for DecrefRunner {
    fn drop(&mut self) {
        let _ = self.sender.send(QueueItem::Shutdown);
        self.join_with_timeout();
    }
}

fn run(receiver: Receiver<QueueItem>) {
    while let Ok(item) = receiver.recv() {
        match item {
            QueueItem::Shutdown => break,
            QueueItem::Decref { key, session, completion } => {
                let result = match Weak::upgrade(&session) {
                    None => Err(DecrefError::SessionGone),
                    Some(session) => session.decref(key),
                };
                match &result {
                    Ok(()) => debug!(key, "decref completed"),
                    Err(e) if e.is_swallowed() => debug!(key, error = %e, "decref race swallowed"),
                    Err(e) => warn!(key, error = %e, "decref failed"),
                }
                let _ = completion.send(result);
            }
        }
    }
}

/// Convenience: most sessions are held behind an `Arc`; this lets callers pass `&Arc<T>`
/// directly to [`DecrefRunner::enqueue`]/`release`.
pub fn weak_session<T: SessionDecref + 'static>(session: &Arc<T>) -> Weak<dyn SessionDecref> {
    Arc::downgrade(session)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FakeSession {
        decrefs: AtomicUsize,
        fail_with: Option<DecrefError>,
    }

    impl SessionDecref for FakeSession {
        fn decref(&self, _key: ChunkKey) -> Result<(), DecrefError> {
            self.decrefs.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(DecrefError::SessionGone) => Err(DecrefError::SessionGone),
                Some(_) => Err(DecrefError::AlreadyReleased),
                None => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn successful_decref_resolves_the_completion_future() {
        let runner = DecrefRunner::start();
        let session = Arc::new(FakeSession { decrefs: AtomicUsize::new(0), fail_with: None });
        let receiver = runner.enqueue(42, weak_session(&session));
        let result = receiver.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(session.decrefs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_session_surfaces_as_swallowed_error() {
        let runner = DecrefRunner::start();
        let session = Arc::new(FakeSession { decrefs: AtomicUsize::new(0), fail_with: None });
        let weak = weak_session(&session);
        drop(session);
        let receiver = runner.enqueue(1, weak);
        let result = receiver.await.unwrap();
        assert!(matches!(result, Err(DecrefError::SessionGone)));
    }

    #[tokio::test]
    async fn same_loop_thread_release_does_not_block() {
        let runner = DecrefRunner::start();
        let session = Arc::new(FakeSession { decrefs: AtomicUsize::new(0), fail_with: None });
        // `release` returns immediately regardless of how long processing takes, since the
        // caller claims to be on the session's own loop thread.
        runner.release(1, weak_session(&session), true).await;
    }

    #[tokio::test]
    async fn queue_processes_items_in_fifo_order() {
        let runner = DecrefRunner::start();
        let session = Arc::new(FakeSession { decrefs: AtomicUsize::new(0), fail_with: None });
        let mut receivers = Vec::new();
        for key in 0..10 {
            receivers.push(runner.enqueue(key, weak_session(&session)));
        }
        for receiver in receivers {
            assert!(receiver.await.unwrap().is_ok());
        }
        assert_eq!(session.decrefs.load(Ordering::SeqCst), 10);
    }
}
