//! Frame routing
//!
//! Turns raw text frames into state updates. Nothing a server sends can stop
//! the consumer loop: frames that fail to decode are logged and dropped.

use std::fmt;
use std::time::Instant;

use crate::error::Error;
use crate::protocol::{decode_frame, EventKind};
use crate::state::ViewerState;
use crate::types::RunId;

/// Why a frame did not change the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not JSON, no `type`, or a payload that does not match its type
    Malformed,
    /// A `type` this client does not handle
    UnknownType,
    /// A run-scoped event arrived while no run is selected
    NoSelection,
    /// The event belongs to a run other than the selected one
    StaleRun,
    /// The event answers an earlier subscription
    StaleEpoch,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IgnoreReason::Malformed => "malformed",
            IgnoreReason::UnknownType => "unknown type",
            IgnoreReason::NoSelection => "no selection",
            IgnoreReason::StaleRun => "stale run",
            IgnoreReason::StaleEpoch => "stale epoch",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `run_id` is the run the event was applied to (the run itself for
    /// `Run` events).
    Applied { kind: EventKind, run_id: RunId },
    Ignored(IgnoreReason),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }
}

/// Decode one frame and apply it.
pub fn dispatch(state: &mut ViewerState, text: &str, now: Instant) -> Outcome {
    let frame = match decode_frame(text) {
        Ok(frame) => frame,
        Err(Error::UnknownEventType(kind)) => {
            tracing::warn!(kind = %kind, "Ignoring frame with unknown type");
            return Outcome::Ignored(IgnoreReason::UnknownType);
        }
        Err(e) => {
            tracing::warn!(error = %e, frame = %preview(text), "Dropping malformed frame");
            return Outcome::Ignored(IgnoreReason::Malformed);
        }
    };

    let kind = frame.event.kind();
    let outcome = state.apply(frame, now);
    if let Outcome::Ignored(reason) = outcome {
        tracing::debug!(%kind, %reason, "Ignored event");
    }
    outcome
}

fn preview(text: &str) -> &str {
    const LIMIT: usize = 120;
    match text.char_indices().nth(LIMIT) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
