//! Capture/recognition session state machine.
//!
//! A `CaptureSession` is a plain value owned by its caller. Timers and
//! recognizers never touch it directly: they deliver events tagged with the
//! `SessionToken` minted by `start()`, and events carrying a superseded token
//! are ignored.

use crate::types::RecognitionOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Default confidence (percent) required to declare a match.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 95.0;

const STAGED_LABELS: [&str; 6] = [
    "Initializing camera feed...",
    "Detecting faces in frame...",
    "Extracting facial features...",
    "Generating face encoding...",
    "Comparing with database...",
    "Matching complete!",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureState {
    Idle,
    Capturing,
    AwaitingOutcome,
    Recognized,
    Failed,
    Cancelled,
}

impl CaptureState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaptureState::Recognized | CaptureState::Failed | CaptureState::Cancelled
        )
    }

    /// Capturing or awaiting the recognizer.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, CaptureState::Capturing | CaptureState::AwaitingOutcome)
    }
}

/// Identity of one started session. Callbacks carry it back so stale ones can be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(Uuid);

impl SessionToken {
    fn mint() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Ticks needed to go from 0% to 100%.
    pub ticks: u32,
    /// Ordered stage labels, spread evenly across `ticks`.
    pub stages: Vec<String>,
    /// Minimum confidence (percent) for `Recognized`.
    pub match_threshold: f64,
    /// Period of the driving clock.
    pub tick_interval: Duration,
}

impl SessionConfig {
    /// Six labelled stages, one every 800 ms.
    pub fn staged() -> Self {
        Self {
            ticks: 6,
            stages: STAGED_LABELS.iter().map(|s| s.to_string()).collect(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            tick_interval: Duration::from_millis(800),
        }
    }

    /// Ten 10% steps, one every 200 ms.
    pub fn quick() -> Self {
        Self {
            ticks: 10,
            stages: vec!["Capturing...".to_string()],
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            tick_interval: Duration::from_millis(200),
        }
    }

    fn progress_after(&self, ticks: u32) -> u8 {
        let total = self.ticks.max(1);
        (ticks.min(total) * 100 / total) as u8
    }

    fn stage_after(&self, ticks: u32) -> Option<String> {
        if self.stages.is_empty() {
            return None;
        }
        let total = self.ticks.max(1) as usize;
        let idx = (ticks as usize * self.stages.len() / total).min(self.stages.len() - 1);
        Some(self.stages[idx].clone())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::staged()
    }
}

/// Why an event left the session untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// The event belongs to a cancelled, reset or replaced session.
    StaleToken,
    /// Tick delivered outside `Capturing`.
    NotCapturing(CaptureState),
    /// Outcome delivered outside `AwaitingOutcome`.
    NotAwaiting(CaptureState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEffect {
    Progressed(u8),
    /// Progress hit 100%; the recognizer should now be invoked.
    AwaitOutcome,
    Ignored(Ignored),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveEffect {
    Recognized,
    Failed,
    Ignored(Ignored),
}

/// Point-in-time view of a session, suitable for rendering or serializing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: CaptureState,
    pub progress_percent: u8,
    pub stage_label: Option<String>,
    pub outcome: Option<RecognitionOutcome>,
}

#[derive(Debug, Clone)]
pub struct CaptureSession {
    config: SessionConfig,
    state: CaptureState,
    token: Option<SessionToken>,
    ticks: u32,
    progress: u8,
    stage_label: Option<String>,
    outcome: Option<RecognitionOutcome>,
}

impl CaptureSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: CaptureState::Idle,
            token: None,
            ticks: 0,
            progress: 0,
            stage_label: None,
            outcome: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn token(&self) -> Option<SessionToken> {
        self.token
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress
    }

    pub fn stage_label(&self) -> Option<&str> {
        self.stage_label.as_deref()
    }

    /// Set only in `Recognized` and `Failed`.
    pub fn outcome(&self) -> Option<&RecognitionOutcome> {
        self.outcome.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            progress_percent: self.progress,
            stage_label: self.stage_label.clone(),
            outcome: self.outcome.clone(),
        }
    }

    /// Begin capturing. Returns `None` unless the session is `Idle`
    /// (terminal sessions must be `reset()` first).
    pub fn start(&mut self) -> Option<SessionToken> {
        if self.state != CaptureState::Idle {
            tracing::debug!(state = ?self.state, "start rejected");
            return None;
        }
        let token = SessionToken::mint();
        self.state = CaptureState::Capturing;
        self.token = Some(token);
        self.ticks = 0;
        self.progress = 0;
        self.stage_label = self.config.stage_after(0);
        self.outcome = None;
        tracing::debug!(%token, "capture started");
        Some(token)
    }

    pub fn tick(&mut self, token: SessionToken) -> TickEffect {
        if self.token != Some(token) {
            tracing::debug!(%token, "stale tick ignored");
            return TickEffect::Ignored(Ignored::StaleToken);
        }
        if self.state != CaptureState::Capturing {
            return TickEffect::Ignored(Ignored::NotCapturing(self.state));
        }

        self.ticks += 1;
        self.progress = self.config.progress_after(self.ticks);
        if self.progress >= 100 {
            self.progress = 100;
            self.stage_label = None;
            self.state = CaptureState::AwaitingOutcome;
            tracing::debug!(%token, "capture complete, awaiting outcome");
            return TickEffect::AwaitOutcome;
        }
        self.stage_label = self.config.stage_after(self.ticks);
        TickEffect::Progressed(self.progress)
    }

    pub fn resolve(&mut self, token: SessionToken, outcome: RecognitionOutcome) -> ResolveEffect {
        if self.token != Some(token) {
            tracing::debug!(%token, "stale recognizer outcome ignored");
            return ResolveEffect::Ignored(Ignored::StaleToken);
        }
        if self.state != CaptureState::AwaitingOutcome {
            return ResolveEffect::Ignored(Ignored::NotAwaiting(self.state));
        }

        let matched =
            outcome.identity.is_some() && outcome.confidence >= self.config.match_threshold;
        self.state = if matched {
            CaptureState::Recognized
        } else {
            CaptureState::Failed
        };
        tracing::info!(
            %token,
            state = ?self.state,
            confidence = outcome.confidence,
            threshold = self.config.match_threshold,
            "recognition resolved"
        );
        self.outcome = Some(outcome);

        if matched {
            ResolveEffect::Recognized
        } else {
            ResolveEffect::Failed
        }
    }

    /// Cancel from any non-terminal state. Returns whether anything changed.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        tracing::debug!(state = ?self.state, "capture cancelled");
        self.state = CaptureState::Cancelled;
        self.stage_label = None;
        true
    }

    /// Return to `Idle`, invalidating the current token.
    pub fn reset(&mut self) {
        self.state = CaptureState::Idle;
        self.token = None;
        self.ticks = 0;
        self.progress = 0;
        self.stage_label = None;
        self.outcome = None;
    }

    /// Pure `(session, event) -> session'` form of the methods above.
    pub fn apply(mut self, event: SessionEvent) -> (Self, Effect) {
        let effect = match event {
            SessionEvent::Start => Effect::Started(self.start()),
            SessionEvent::Tick(token) => Effect::Tick(self.tick(token)),
            SessionEvent::Resolve(token, outcome) => Effect::Resolve(self.resolve(token, outcome)),
            SessionEvent::Cancel => Effect::Cancelled(self.cancel()),
            SessionEvent::Reset => {
                self.reset();
                Effect::Reset
            }
        };
        (self, effect)
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Start,
    Tick(SessionToken),
    Resolve(SessionToken, RecognitionOutcome),
    Cancel,
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Started(Option<SessionToken>),
    Tick(TickEffect),
    Resolve(ResolveEffect),
    Cancelled(bool),
    Reset,
}
