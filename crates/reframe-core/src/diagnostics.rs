//! Structured notices about inputs that did not make it to the sink.

use std::{fmt, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// The input stream a notice refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Records,
    Indices,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Records => f.write_str("records"),
            Self::Indices => f.write_str("indices"),
        }
    }
}

/// Why a buffered message was removed without being emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// The buffer was full and the oldest message made room.
    Overflow,
    /// A newer match was emitted, so the message can no longer be
    /// emitted in order.
    Superseded,
    /// The other stream moved past the message's tolerance window.
    Unmatched,
}

/// The stage of the pipeline a record was aborted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    InputTransform,
    Filter,
    OutputTransform,
}

/// A structured report for the diagnostics sink. Never carries record
/// payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// An input was refused on arrival.
    Rejected {
        stream: StreamKind,
        stamp: Duration,
        reason: String,
    },
    /// A buffered input was dropped before it could be paired.
    Evicted {
        stream: StreamKind,
        stamp: Duration,
        reason: EvictReason,
    },
    /// A synchronized record failed in the pipeline and was not
    /// published.
    Aborted {
        stamp: Duration,
        frame_id: String,
        stage: Stage,
        reason: String,
    },
}

/// Receives [`Notice`]s. Implementations must not block.
pub trait Diagnostics: Send + Sync {
    fn notice(&self, notice: Notice);
}

/// Writes notices to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn notice(&self, notice: Notice) {
        match notice {
            Notice::Rejected {
                stream,
                stamp,
                reason,
            } => {
                warn!(stream = %stream, stamp = ?stamp, reason = %reason, "Rejected input");
            }
            Notice::Evicted {
                stream,
                stamp,
                reason,
            } => {
                debug!(stream = %stream, stamp = ?stamp, reason = ?reason, "Evicted buffered input");
            }
            Notice::Aborted {
                stamp,
                frame_id,
                stage,
                reason,
            } => {
                warn!(
                    stamp = ?stamp,
                    frame_id = %frame_id,
                    stage = ?stage,
                    reason = %reason,
                    "Aborted record"
                );
            }
        }
    }
}

impl Diagnostics for mpsc::UnboundedSender<Notice> {
    fn notice(&self, notice: Notice) {
        let _ = self.send(notice);
    }
}

impl Diagnostics for flume::Sender<Notice> {
    fn notice(&self, notice: Notice) {
        // A full or closed channel loses the notice.
        let _ = self.try_send(notice);
    }
}
