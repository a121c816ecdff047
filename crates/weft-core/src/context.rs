//! Inference context: cancellation, deadline and event sinks

use crate::error::CoreError;
use crate::events::{Event, EventSink};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Context passed to every engine, middleware, tool and evaluator call
///
/// Cloning is cheap and clones share the same cancellation token.
#[derive(Clone, Default)]
pub struct InferenceContext {
    cancellation_token: CancellationToken,
    deadline: Option<Instant>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl InferenceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Set a deadline; an earlier existing deadline is kept
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancellation_token.cancelled().await
    }

    /// Derived context cancelled together with this one, but cancellable on its own
    pub fn child(&self) -> Self {
        Self {
            cancellation_token: self.cancellation_token.child_token(),
            deadline: self.deadline,
            sinks: self.sinks.clone(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fails when the context is cancelled or past its deadline
    pub fn check(&self) -> Result<(), CoreError> {
        if self.is_cancelled() {
            return Err(CoreError::Canceled);
        }
        if matches!(self.deadline, Some(d) if Instant::now() >= d) {
            return Err(CoreError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Run a future until it completes, the context is cancelled, or the deadline passes
    pub async fn guard<F, T, E>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<CoreError>,
    {
        self.check()?;
        let deadline = self.deadline;
        tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => Err(CoreError::Canceled.into()),
            _ = sleep_until(deadline) => Err(CoreError::DeadlineExceeded.into()),
            result = fut => result,
        }
    }

    pub fn publish(&self, event: Event) {
        for sink in &self.sinks {
            sink.publish_event(&event);
        }
    }

    pub fn has_sinks(&self) -> bool {
        !self.sinks.is_empty()
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

impl std::fmt::Debug for InferenceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceContext")
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.deadline)
            .field("sinks", &self.sinks.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingSink, EventPayload};

    #[tokio::test]
    async fn test_guard_passes_through_result() {
        let ctx = InferenceContext::new();
        let value: Result<u32, CoreError> = ctx.guard(async { Ok(7) }).await;
        assert_eq!(value.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_guard_on_cancelled_context() {
        let ctx = InferenceContext::new();
        let child = ctx.child();
        ctx.cancel();
        assert!(child.is_cancelled());

        let result: Result<(), CoreError> = child
            .guard(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(CoreError::Canceled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_deadline() {
        let ctx = InferenceContext::new().with_timeout(Duration::from_millis(50));
        let result: Result<(), CoreError> = ctx
            .guard(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(CoreError::DeadlineExceeded)));
    }

    #[test]
    fn test_publish_reaches_all_sinks() {
        let a = Arc::new(CollectingSink::new());
        let b = Arc::new(CollectingSink::new());
        let ctx = InferenceContext::new().with_sink(a.clone()).with_sink(b.clone());
        ctx.publish(Event::new(EventPayload::Info {
            message: "hello".into(),
            data: None,
        }));
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events().len(), 1);
    }
}
