// =====================================================================================
// AUDIT SERVICE - SEVERITY-FILTERED, BUFFERED EVENT DELIVERY
// =====================================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::AuditConfig;
use crate::models::{AuditEvent, ViolationSeverity};

/// Destination for flushed audit events, supplied by the caller. The
/// service only ever calls this interface; storage format is the sink's
/// business.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn deliver(&self, events: &[AuditEvent]) -> Result<()>;
}

/// Reference sink forwarding each event into the structured log, one line
/// per event, level chosen from the event severity.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn deliver(&self, events: &[AuditEvent]) -> Result<()> {
        for event in events {
            match event.severity {
                ViolationSeverity::Critical | ViolationSeverity::High => {
                    error!(
                        event_id = %event.event_id,
                        client_id = %event.client_id,
                        endpoint = %event.endpoint,
                        outcome = ?event.outcome,
                        violations = event.violations.len(),
                        "AUDIT: {} security event", event.severity
                    );
                }
                ViolationSeverity::Medium => {
                    warn!(
                        event_id = %event.event_id,
                        client_id = %event.client_id,
                        endpoint = %event.endpoint,
                        outcome = ?event.outcome,
                        violations = event.violations.len(),
                        "AUDIT: {} security event", event.severity
                    );
                }
                ViolationSeverity::Low => {
                    info!(
                        event_id = %event.event_id,
                        client_id = %event.client_id,
                        endpoint = %event.endpoint,
                        outcome = ?event.outcome,
                        "AUDIT: request outcome recorded"
                    );
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditStats {
    pub pending_events: usize,
    pub delivered_events: u64,
    pub dropped_events: u64,
    pub failed_flushes: u64,
}

struct BufferedEvent {
    event: AuditEvent,
    enqueued_at: Instant,
}

struct AuditInner {
    config: AuditConfig,
    sink: Arc<dyn AuditSink>,
    buffer: Mutex<VecDeque<BufferedEvent>>,
    wakeup: Notify,
    shutdown: AtomicBool,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed_flushes: AtomicU64,
    /// Serializes flushes: the background task and manual `flush` calls
    /// never deliver concurrently. Never held across the buffer mutex in
    /// the enqueue path, so producers stay unblocked during delivery.
    flush_gate: tokio::sync::Mutex<()>,
}

/// Buffered audit pipeline: request threads enqueue, one background task
/// flushes. Flushes trigger at `flush_threshold` buffered events or when
/// the oldest entry reaches `max_batch_age`, whichever comes first; with
/// buffering disabled every enqueue is an immediate trigger. Failed
/// deliveries keep the batch for retry; only capacity overflow drops
/// events, oldest first, counted in `dropped_events`.
pub struct AuditService {
    inner: Arc<AuditInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AuditService {
    /// Spawns the flush task; must be called within a Tokio runtime.
    pub fn new(config: AuditConfig, sink: Arc<dyn AuditSink>) -> Self {
        let inner = Arc::new(AuditInner {
            config,
            sink,
            buffer: Mutex::new(VecDeque::new()),
            wakeup: Notify::new(),
            shutdown: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed_flushes: AtomicU64::new(0),
            flush_gate: tokio::sync::Mutex::new(()),
        });
        let worker = tokio::spawn(AuditInner::flush_loop(Arc::clone(&inner)));
        Self {
            inner,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Enqueues one event. Events below the minimum severity are discarded
    /// (filtered, not an error). Never blocks beyond the in-memory enqueue;
    /// delivery happens on the flush task, off the request path.
    #[instrument(skip(self, event), fields(event_id = %event.event_id, severity = %event.severity))]
    pub fn record(&self, event: AuditEvent) {
        if event.severity < self.inner.config.min_severity {
            debug!("audit event below minimum log level, discarded");
            return;
        }

        let trigger = {
            let mut buffer = self.inner.buffer.lock().expect("audit buffer mutex poisoned");
            if buffer.len() >= self.inner.config.max_capacity {
                buffer.pop_front();
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("audit buffer at capacity, dropped oldest event");
            }
            let was_empty = buffer.is_empty();
            buffer.push_back(BufferedEvent {
                event,
                enqueued_at: Instant::now(),
            });
            // Wake the flush task when the batch is due, and on the first
            // event after an empty buffer so it can arm the age deadline.
            was_empty || buffer.len() >= self.inner.due_threshold()
        };

        if trigger {
            self.inner.wakeup.notify_one();
        }
    }

    /// Drains and delivers everything currently buffered. Returns the
    /// delivered count; a failed delivery keeps the batch buffered.
    pub async fn flush(&self) -> Result<usize> {
        self.inner.flush_batch().await
    }

    pub fn stats(&self) -> AuditStats {
        let pending = self
            .inner
            .buffer
            .lock()
            .expect("audit buffer mutex poisoned")
            .len();
        AuditStats {
            pending_events: pending,
            delivered_events: self.inner.delivered.load(Ordering::Relaxed),
            dropped_events: self.inner.dropped.load(Ordering::Relaxed),
            failed_flushes: self.inner.failed_flushes.load(Ordering::Relaxed),
        }
    }

    /// Stops the flush task after a final drain of the buffer.
    pub async fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Relaxed);
        self.inner.wakeup.notify_one();
        let worker = self
            .worker
            .lock()
            .expect("audit worker handle poisoned")
            .take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

impl AuditInner {
    fn due_threshold(&self) -> usize {
        if self.config.buffered {
            self.config.flush_threshold
        } else {
            1
        }
    }

    fn oldest_deadline(&self) -> Option<Instant> {
        let buffer = self.buffer.lock().expect("audit buffer mutex poisoned");
        buffer
            .front()
            .map(|entry| entry.enqueued_at + self.config.max_batch_age)
    }

    fn flush_due(&self) -> bool {
        let buffer = self.buffer.lock().expect("audit buffer mutex poisoned");
        match buffer.front() {
            None => false,
            Some(oldest) => {
                buffer.len() >= self.due_threshold()
                    || oldest.enqueued_at.elapsed() >= self.config.max_batch_age
            }
        }
    }

    async fn flush_loop(inner: Arc<AuditInner>) {
        loop {
            if inner.shutdown.load(Ordering::Relaxed) {
                break;
            }

            let deadline = inner.oldest_deadline();
            tokio::select! {
                _ = inner.wakeup.notified() => {}
                _ = async {
                    match deadline {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {}
            }

            if inner.shutdown.load(Ordering::Relaxed) {
                break;
            }

            // Keep flushing until the buffer is no longer due. A failed
            // delivery requeues the batch, so the loop backs off for the
            // retry delay and tries the same batch again; an enqueue or
            // shutdown cuts the wait short.
            while inner.flush_due() {
                if inner.flush_batch().await.is_ok() {
                    continue;
                }
                tokio::select! {
                    _ = tokio::time::sleep(inner.config.retry_delay) => {}
                    _ = inner.wakeup.notified() => {}
                }
                if inner.shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
        }

        // Final drain so a graceful close does not strand buffered events.
        if let Err(err) = inner.flush_batch().await {
            warn!(error = %err, "final audit flush failed on shutdown");
        }
    }

    async fn flush_batch(&self) -> Result<usize> {
        let _gate = self.flush_gate.lock().await;

        // Copy the batch out before the sink call so a slow sink never
        // blocks request-path enqueues.
        let batch: Vec<BufferedEvent> = {
            let mut buffer = self.buffer.lock().expect("audit buffer mutex poisoned");
            buffer.drain(..).collect()
        };
        if batch.is_empty() {
            return Ok(0);
        }

        let events: Vec<AuditEvent> = batch.iter().map(|entry| entry.event.clone()).collect();
        match tokio::time::timeout(self.config.delivery_timeout, self.sink.deliver(&events)).await {
            Ok(Ok(())) => {
                self.delivered
                    .fetch_add(events.len() as u64, Ordering::Relaxed);
                debug!(count = events.len(), "flushed audit events to sink");
                Ok(events.len())
            }
            Ok(Err(err)) => {
                self.failed_flushes.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, count = batch.len(), "audit sink delivery failed, batch kept for retry");
                self.requeue(batch);
                Err(err)
            }
            Err(_) => {
                self.failed_flushes.fetch_add(1, Ordering::Relaxed);
                warn!(
                    timeout = ?self.config.delivery_timeout,
                    count = batch.len(),
                    "audit sink delivery timed out, batch kept for retry"
                );
                self.requeue(batch);
                Err(anyhow::anyhow!("audit sink delivery timed out"))
            }
        }
    }

    /// Puts a failed batch back at the front of the queue, preserving
    /// oldest-first order ahead of anything enqueued during delivery.
    fn requeue(&self, batch: Vec<BufferedEvent>) {
        let mut buffer = self.buffer.lock().expect("audit buffer mutex poisoned");
        for entry in batch.into_iter().rev() {
            buffer.push_front(entry);
        }
        while buffer.len() > self.config.max_capacity {
            buffer.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}
