// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Producer-side admission into the ingestion queue.
//!
//! Inline dispatch enqueues on the caller's task. Pooled dispatch hands envelopes to a bounded
//! backlog drained by a fixed set of dispatcher tasks, so a full ingestion queue stalls the
//! dispatchers instead of the caller. What happens when the backlog itself is full is decided
//! by [`SaturationPolicy`]; envelopes are never dropped silently.
//!
//! With more than one dispatcher, envelopes from one producer may reach the ingestion queue out
//! of order. Use a single dispatcher when per-producer ordering matters.

use crate::envelope::Envelope;
use crate::errors::Error;
use crate::queue::IngestionQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// What a caller experiences when the dispatch backlog is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaturationPolicy {
    /// Wait for room, bounded by the configured enqueue timeout if any.
    Block,
    /// Fail immediately with [`Error::DispatchSaturated`].
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchMode {
    Inline,
    Pooled {
        dispatchers: usize,
        backlog: usize,
        saturation: SaturationPolicy,
    },
}

#[derive(Debug, Clone)]
enum Route {
    Inline(IngestionQueue),
    Pooled {
        backlog: IngestionQueue,
        saturation: SaturationPolicy,
        // Admitted to the pool and not yet in the ingestion queue, including envelopes a
        // dispatcher holds while waiting for queue space or dropped at shutdown.
        pending: Arc<AtomicUsize>,
    },
}

/// Admission entry point shared by every producer handle.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    route: Route,
    enqueue_timeout: Option<Duration>,
    cancel_token: CancellationToken,
}

impl Dispatcher {
    /// Builds the dispatcher for `mode`. Pooled mode also spawns its dispatcher tasks, which
    /// requires a running tokio runtime.
    pub fn new(
        mode: &DispatchMode,
        queue: IngestionQueue,
        enqueue_timeout: Option<Duration>,
        cancel_token: CancellationToken,
    ) -> (Self, Option<DispatchPool>) {
        match *mode {
            DispatchMode::Inline => (
                Self {
                    route: Route::Inline(queue),
                    enqueue_timeout,
                    cancel_token,
                },
                None,
            ),
            DispatchMode::Pooled {
                dispatchers,
                backlog,
                saturation,
            } => {
                let backlog = IngestionQueue::new(backlog);
                let pending = Arc::new(AtomicUsize::new(0));
                let pool = DispatchPool::spawn(
                    dispatchers,
                    backlog.clone(),
                    queue,
                    Arc::clone(&pending),
                    cancel_token.clone(),
                );
                (
                    Self {
                        route: Route::Pooled {
                            backlog,
                            saturation,
                            pending,
                        },
                        enqueue_timeout,
                        cancel_token,
                    },
                    Some(pool),
                )
            }
        }
    }

    /// Admits an already validated envelope.
    ///
    /// Fails with [`Error::Backpressure`] when the enqueue timeout expires,
    /// [`Error::DispatchSaturated`] when a rejecting pool is full, and [`Error::ShutDown`] once
    /// the pipeline has been shut down.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<(), Error> {
        if self.cancel_token.is_cancelled() {
            return Err(Error::ShutDown);
        }

        let (target, saturation, pending) = match &self.route {
            Route::Inline(queue) => (queue, SaturationPolicy::Block, None),
            Route::Pooled {
                backlog,
                saturation,
                pending,
            } => (backlog, *saturation, Some(pending)),
        };

        // Counted before the send: `backlog_len` must never miss an admitted envelope.
        if let Some(pending) = pending {
            pending.fetch_add(1, Ordering::SeqCst);
        }

        let admit = async {
            match (saturation, self.enqueue_timeout) {
                (SaturationPolicy::Reject, _) => {
                    target.try_enqueue(envelope).map_err(|e| match e {
                        Error::Backpressure { .. } => Error::DispatchSaturated,
                        other => other,
                    })
                }
                (SaturationPolicy::Block, Some(timeout)) => {
                    target.enqueue_timeout(envelope, timeout).await
                }
                (SaturationPolicy::Block, None) => target.enqueue(envelope).await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(Error::ShutDown),
            result = admit => {
                if let Err(Error::Backpressure { waited }) = &result {
                    warn!("Ingestion queue full for {:?}, event rejected", waited);
                }
                result
            }
        };

        if result.is_err() {
            if let Some(pending) = pending {
                pending.fetch_sub(1, Ordering::SeqCst);
            }
        }
        result
    }

    /// Envelopes accepted by the pool but not yet moved to the ingestion queue. This includes
    /// envelopes held by a dispatcher and, after shutdown, those it dropped.
    pub fn backlog_len(&self) -> usize {
        match &self.route {
            Route::Inline(_) => 0,
            Route::Pooled { pending, .. } => pending.load(Ordering::SeqCst),
        }
    }
}

/// Dispatcher tasks moving envelopes from the pool backlog into the ingestion queue.
pub struct DispatchPool {
    tasks: JoinSet<()>,
}

impl DispatchPool {
    fn spawn(
        dispatchers: usize,
        backlog: IngestionQueue,
        queue: IngestionQueue,
        pending: Arc<AtomicUsize>,
        cancel_token: CancellationToken,
    ) -> Self {
        let mut tasks = JoinSet::new();
        for id in 0..dispatchers.max(1) {
            tasks.spawn(forward(
                id,
                backlog.clone(),
                queue.clone(),
                Arc::clone(&pending),
                cancel_token.clone(),
            ));
        }
        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every dispatcher to exit. Dispatchers only exit once cancelled.
    pub async fn join(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                error!("Dispatcher task failed: {}", e);
            }
        }
    }
}

async fn forward(
    id: usize,
    backlog: IngestionQueue,
    queue: IngestionQueue,
    pending: Arc<AtomicUsize>,
    cancel_token: CancellationToken,
) {
    debug!(dispatcher = id, "Dispatcher started");

    loop {
        let envelope = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            next = backlog.dequeue() => match next {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let event = envelope.event().to_string();
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                warn!(dispatcher = id, event = %event, "Shutdown while waiting for queue space, event not delivered");
                break;
            }
            result = queue.enqueue(envelope) => {
                if let Err(e) = result {
                    error!(dispatcher = id, event = %event, "Failed to enqueue event: {}", e);
                    break;
                }
                pending.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    debug!(dispatcher = id, "Dispatcher stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeBuilder;
    use tokio::time::timeout;

    fn envelope(name: &str) -> Envelope {
        EnvelopeBuilder::new("t").event(name, &()).unwrap()
    }

    #[tokio::test]
    async fn test_inline_dispatch_enqueues_directly() {
        let queue = IngestionQueue::new(4);
        let (dispatcher, pool) = Dispatcher::new(
            &DispatchMode::Inline,
            queue.clone(),
            None,
            CancellationToken::new(),
        );
        assert!(pool.is_none());

        dispatcher.dispatch(envelope("a")).await.unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(dispatcher.backlog_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inline_dispatch_times_out_on_full_queue() {
        let queue = IngestionQueue::new(1);
        let (dispatcher, _) = Dispatcher::new(
            &DispatchMode::Inline,
            queue.clone(),
            Some(Duration::from_millis(10)),
            CancellationToken::new(),
        );
        dispatcher.dispatch(envelope("a")).await.unwrap();

        let result = dispatcher.dispatch(envelope("b")).await;

        assert!(matches!(result, Err(Error::Backpressure { .. })));
    }

    #[tokio::test]
    async fn test_pooled_dispatch_forwards_to_queue() {
        let queue = IngestionQueue::new(8);
        let cancel_token = CancellationToken::new();
        let (dispatcher, pool) = Dispatcher::new(
            &DispatchMode::Pooled {
                dispatchers: 1,
                backlog: 4,
                saturation: SaturationPolicy::Block,
            },
            queue.clone(),
            None,
            cancel_token.clone(),
        );
        let pool = pool.unwrap();
        assert_eq!(pool.len(), 1);

        for name in ["a", "b", "c"] {
            dispatcher.dispatch(envelope(name)).await.unwrap();
        }

        let mut names = Vec::new();
        for _ in 0..3 {
            let next = timeout(Duration::from_secs(1), queue.dequeue())
                .await
                .unwrap()
                .unwrap();
            names.push(next.event().to_string());
        }
        assert_eq!(names, vec!["a", "b", "c"]);

        cancel_token.cancel();
        timeout(Duration::from_secs(1), pool.join()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejecting_pool_reports_saturation() {
        // Ingestion queue of one and a backlog of one: the dispatcher holds a third
        // envelope while blocked, so the fourth finds no room anywhere.
        let queue = IngestionQueue::new(1);
        let cancel_token = CancellationToken::new();
        let (dispatcher, pool) = Dispatcher::new(
            &DispatchMode::Pooled {
                dispatchers: 1,
                backlog: 1,
                saturation: SaturationPolicy::Reject,
            },
            queue.clone(),
            None,
            cancel_token.clone(),
        );

        let mut saturated = false;
        for i in 0..4 {
            match dispatcher.dispatch(envelope(&format!("e{i}"))).await {
                Ok(()) => tokio::time::sleep(Duration::from_millis(20)).await,
                Err(Error::DispatchSaturated) => {
                    saturated = true;
                    break;
                }
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        assert!(saturated);

        cancel_token.cancel();
        timeout(Duration::from_secs(1), pool.unwrap().join())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_backlog_len_counts_envelopes_held_by_dispatcher() {
        // No consumer: "a" fills the queue, the dispatcher holds "b" and "c" waits in the backlog.
        let queue = IngestionQueue::new(1);
        let cancel_token = CancellationToken::new();
        let (dispatcher, pool) = Dispatcher::new(
            &DispatchMode::Pooled {
                dispatchers: 1,
                backlog: 4,
                saturation: SaturationPolicy::Block,
            },
            queue.clone(),
            None,
            cancel_token.clone(),
        );

        for name in ["a", "b", "c"] {
            dispatcher.dispatch(envelope(name)).await.unwrap();
        }
        timeout(Duration::from_secs(1), async {
            while queue.len() < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(queue.len(), 1);
        assert_eq!(dispatcher.backlog_len(), 2);

        cancel_token.cancel();
        timeout(Duration::from_secs(1), pool.unwrap().join())
            .await
            .unwrap();

        // The envelope dropped by the dispatcher stays counted.
        assert_eq!(dispatcher.backlog_len(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_after_cancel_fails() {
        let queue = IngestionQueue::new(4);
        let cancel_token = CancellationToken::new();
        let (dispatcher, _) =
            Dispatcher::new(&DispatchMode::Inline, queue.clone(), None, cancel_token.clone());

        cancel_token.cancel();

        assert!(matches!(
            dispatcher.dispatch(envelope("late")).await,
            Err(Error::ShutDown)
        ));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_blocked_dispatch_released_by_cancel() {
        let queue = IngestionQueue::new(1);
        let cancel_token = CancellationToken::new();
        let (dispatcher, _) =
            Dispatcher::new(&DispatchMode::Inline, queue.clone(), None, cancel_token.clone());
        dispatcher.dispatch(envelope("a")).await.unwrap();

        let blocked = tokio::spawn(async move { dispatcher.dispatch(envelope("b")).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_token.cancel();

        let result = timeout(Duration::from_secs(1), blocked).await.unwrap().unwrap();
        assert!(matches!(result, Err(Error::ShutDown)));
    }
}
