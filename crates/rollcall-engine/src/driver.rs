use crate::recognizer::{CaptureContext, Recognizer};
use rollcall_core::{
    CaptureSession, Method, RecognitionOutcome, ResolveEffect, SessionConfig, SessionSnapshot,
    SessionToken, TickEffect,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Clone-safe handle that runs one capture session at a time.
///
/// Ticks come from a tokio interval task; once progress reaches 100% the
/// recognizer is invoked on its own task. Both tasks are aborted on
/// `cancel()`/`reset()`, and every effect they deliver is checked against the
/// session token, so a late timer or recognizer can never touch a newer
/// session. Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct CaptureDriver {
    session: Arc<Mutex<CaptureSession>>,
    recognizer: Arc<dyn Recognizer>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    updates: Arc<watch::Sender<SessionSnapshot>>,
}

impl CaptureDriver {
    pub fn new(config: SessionConfig, recognizer: Arc<dyn Recognizer>) -> Self {
        let session = CaptureSession::new(config);
        let (updates, _) = watch::channel(session.snapshot());
        Self {
            session: Arc::new(Mutex::new(session)),
            recognizer,
            tasks: Arc::new(Mutex::new(Vec::new())),
            updates: Arc::new(updates),
        }
    }

    /// Start a session. Returns false if one is already in flight or the
    /// previous one has not been reset.
    pub async fn start(&self, method: Method) -> bool {
        let (token, period) = {
            let mut session = self.session.lock().await;
            let Some(token) = session.start() else {
                return false;
            };
            self.publish(&session);
            (token, session.config().tick_interval)
        };
        tracing::info!(%token, %method, ?period, "capture session started");

        let driver = self.clone();
        let handle = tokio::spawn(async move { driver.run_ticks(token, method, period).await });
        self.tasks.lock().await.push(handle);
        true
    }

    /// Cancel the current session. Returns whether the state changed.
    pub async fn cancel(&self) -> bool {
        let cancelled = {
            let mut session = self.session.lock().await;
            let cancelled = session.cancel();
            if cancelled {
                self.publish(&session);
            }
            cancelled
        };
        self.abort_tasks().await;
        if cancelled {
            tracing::info!("capture session cancelled");
        }
        cancelled
    }

    /// Discard the current session and return to idle.
    pub async fn reset(&self) {
        {
            let mut session = self.session.lock().await;
            session.reset();
            self.publish(&session);
        }
        self.abort_tasks().await;
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    /// Receive a snapshot after every state or progress change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    /// Wait until the session is no longer capturing or awaiting an outcome.
    pub async fn wait_for_terminal(&self) -> SessionSnapshot {
        let mut rx = self.subscribe();
        if let Ok(snapshot) = rx.wait_for(|s| !s.state.is_in_flight()).await {
            return snapshot.clone();
        }
        self.snapshot().await
    }

    fn publish(&self, session: &CaptureSession) {
        self.updates.send_replace(session.snapshot());
    }

    async fn abort_tasks(&self) {
        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }
    }

    async fn run_ticks(self, token: SessionToken, method: Method, period: Duration) {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            let effect = {
                let mut session = self.session.lock().await;
                let effect = session.tick(token);
                if !matches!(effect, TickEffect::Ignored(_)) {
                    self.publish(&session);
                }
                effect
            };

            match effect {
                TickEffect::Progressed(progress) => {
                    tracing::debug!(%token, progress, "capture progress");
                }
                TickEffect::AwaitOutcome => {
                    self.spawn_recognition(CaptureContext { token, method }).await;
                    return;
                }
                TickEffect::Ignored(reason) => {
                    tracing::debug!(%token, ?reason, "tick source stopped");
                    return;
                }
            }
        }
    }

    async fn spawn_recognition(&self, ctx: CaptureContext) {
        let driver = self.clone();
        let handle = tokio::spawn(async move {
            let outcome = match driver.recognizer.recognize(ctx).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(token = %ctx.token, error = %err, "recognizer failed");
                    RecognitionOutcome::no_match()
                }
            };

            let mut session = driver.session.lock().await;
            match session.resolve(ctx.token, outcome) {
                ResolveEffect::Ignored(reason) => {
                    tracing::debug!(token = %ctx.token, ?reason, "recognizer outcome dropped");
                }
                _ => driver.publish(&session),
            }
        });
        self.tasks.lock().await.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::FixedRecognizer;
    use rollcall_core::{CaptureState, Identity};
    use tokio::time::{sleep, Instant};

    fn emma(confidence: f64) -> RecognitionOutcome {
        RecognitionOutcome::matched(
            Identity {
                student_id: "ST001234".into(),
                student_name: "Emma Thompson".into(),
                class: "10-A".into(),
            },
            confidence,
        )
    }

    fn driver(config: SessionConfig, recognizer: FixedRecognizer) -> CaptureDriver {
        CaptureDriver::new(config, Arc::new(recognizer))
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_flow_recognizes() {
        let d = driver(
            SessionConfig::quick(),
            FixedRecognizer::new(emma(98.5), Duration::from_millis(500)),
        );
        let began = Instant::now();
        assert!(d.start(Method::Face).await);

        let done = d.wait_for_terminal().await;
        assert_eq!(done.state, CaptureState::Recognized);
        assert_eq!(done.progress_percent, 100);
        assert_eq!(done.outcome.unwrap().confidence, 98.5);
        let elapsed = began.elapsed();
        assert!(elapsed >= Duration::from_millis(10 * 200 + 500), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(10 * 200 + 600), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected_while_in_flight() {
        let d = driver(
            SessionConfig::staged(),
            FixedRecognizer::new(emma(98.5), Duration::from_millis(500)),
        );
        assert!(d.start(Method::Face).await);
        sleep(Duration::from_millis(900)).await;
        let before = d.snapshot().await;
        assert!(!d.start(Method::Motion).await);
        assert_eq!(d.snapshot().await, before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_confidence_fails() {
        let d = driver(
            SessionConfig::staged(),
            FixedRecognizer::new(emma(80.0), Duration::from_millis(500)),
        );
        d.start(Method::Face).await;
        assert_eq!(d.wait_for_terminal().await.state, CaptureState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recognizer_error_fails_session() {
        let d = driver(
            SessionConfig::quick(),
            FixedRecognizer::failing("sensor unplugged", Duration::from_millis(100)),
        );
        d.start(Method::Fingerprint).await;
        let done = d.wait_for_terminal().await;
        assert_eq!(done.state, CaptureState::Failed);
        assert_eq!(done.outcome, Some(RecognitionOutcome::no_match()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_capture_stops_ticks() {
        let d = driver(
            SessionConfig::quick(),
            FixedRecognizer::new(emma(98.5), Duration::from_millis(500)),
        );
        d.start(Method::Face).await;
        sleep(Duration::from_millis(450)).await;
        assert_eq!(d.snapshot().await.progress_percent, 20);

        assert!(d.cancel().await);
        sleep(Duration::from_secs(5)).await;
        let snap = d.snapshot().await;
        assert_eq!(snap.state, CaptureState::Cancelled);
        assert_eq!(snap.progress_percent, 20);
        assert!(snap.outcome.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_awaiting_drops_outcome() {
        let d = driver(
            SessionConfig::quick(),
            FixedRecognizer::new(emma(98.5), Duration::from_secs(10)),
        );
        d.start(Method::Face).await;
        sleep(Duration::from_millis(2100)).await;
        assert_eq!(d.snapshot().await.state, CaptureState::AwaitingOutcome);

        assert!(d.cancel().await);
        sleep(Duration::from_secs(20)).await;
        let snap = d.snapshot().await;
        assert_eq!(snap.state, CaptureState::Cancelled);
        assert!(snap.outcome.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_isolates_new_session_from_old_timer() {
        let d = driver(
            SessionConfig::quick(),
            FixedRecognizer::new(emma(98.5), Duration::from_millis(500)),
        );
        d.start(Method::Face).await;
        sleep(Duration::from_millis(450)).await;
        d.reset().await;
        assert_eq!(d.snapshot().await.state, CaptureState::Idle);

        assert!(d.start(Method::Face).await);
        sleep(Duration::from_millis(250)).await;
        let snap = d.snapshot().await;
        assert_eq!(snap.state, CaptureState::Capturing);
        assert_eq!(snap.progress_percent, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_monotonic_progress() {
        let d = driver(
            SessionConfig::staged(),
            FixedRecognizer::new(emma(99.0), Duration::from_millis(500)),
        );
        let mut rx = d.subscribe();
        d.start(Method::Face).await;

        let mut seen = Vec::new();
        loop {
            rx.changed().await.unwrap();
            let snap = rx.borrow_and_update().clone();
            seen.push(snap.progress_percent);
            if !snap.state.is_in_flight() {
                assert_eq!(snap.state, CaptureState::Recognized);
                break;
            }
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last(), Some(&100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_terminal_requires_reset() {
        let d = driver(
            SessionConfig::quick(),
            FixedRecognizer::new(emma(98.5), Duration::from_millis(10)),
        );
        d.start(Method::Face).await;
        d.wait_for_terminal().await;
        assert!(!d.start(Method::Face).await);
        d.reset().await;
        assert!(d.start(Method::Face).await);
    }
}
