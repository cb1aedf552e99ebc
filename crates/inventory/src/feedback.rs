//! User-facing signals for scan outcomes.
//!
//! Feedback is observational: it never changes what the accumulator does.

use std::sync::Arc;

use crate::accumulator::ApplyOutcome;
use crate::session::ScanOutcome;

/// Audio cue.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Tone {
    /// Short high-frequency beep.
    Success,
    /// Lower-frequency buzz.
    Failure,
}

/// Toast/notification severity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Audio and notification side effects, provided by the host UI.
pub trait FeedbackSink: Send + Sync {
    fn play_tone(&self, tone: Tone);
    fn show_message(&self, text: &str, severity: Severity);
}

/// Sink that only logs. Useful headless and as a default.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFeedback;

impl FeedbackSink for TracingFeedback {
    fn play_tone(&self, tone: Tone) {
        tracing::trace!(?tone, "feedback tone");
    }

    fn show_message(&self, text: &str, severity: Severity) {
        match severity {
            Severity::Info => tracing::info!(message = text, "feedback"),
            Severity::Warning => tracing::warn!(message = text, "feedback"),
            Severity::Error => tracing::error!(message = text, "feedback"),
        }
    }
}

pub const CAPPED_MESSAGE: &str = "quantity exceeds available stock at this position";

/// Turns scan outcomes into tones and messages.
#[derive(Clone)]
pub struct FeedbackEmitter {
    sink: Arc<dyn FeedbackSink>,
    sound_enabled: bool,
}

impl core::fmt::Debug for FeedbackEmitter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FeedbackEmitter")
            .field("sound_enabled", &self.sound_enabled)
            .finish_non_exhaustive()
    }
}

impl FeedbackEmitter {
    pub fn new(sink: Arc<dyn FeedbackSink>, sound_enabled: bool) -> Self {
        Self {
            sink,
            sound_enabled,
        }
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled
    }

    pub fn set_sound_enabled(&mut self, enabled: bool) {
        self.sound_enabled = enabled;
    }

    fn tone(&self, tone: Tone) {
        if self.sound_enabled {
            self.sink.play_tone(tone);
        }
    }

    pub fn emit(&self, outcome: &ScanOutcome) {
        match outcome {
            ScanOutcome::Ignored => {}
            ScanOutcome::Applied(ApplyOutcome::Added | ApplyOutcome::Incremented) => {
                self.tone(Tone::Success);
            }
            ScanOutcome::Applied(ApplyOutcome::Capped) => {
                self.tone(Tone::Failure);
                self.sink.show_message(CAPPED_MESSAGE, Severity::Warning);
            }
            ScanOutcome::NotFound(err) => {
                self.tone(Tone::Failure);
                self.sink.show_message(&err.reason.message(), Severity::Error);
            }
        }
    }

    /// Surface a free-form message (e.g. a failed save).
    pub fn notify(&self, text: &str, severity: Severity) {
        self.sink.show_message(text, severity);
    }
}
