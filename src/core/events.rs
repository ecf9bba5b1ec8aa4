//! Session notifications.
//!
//! Sessions never hold references back to their owner. Every event carries
//! the session id instead, so one receiver loop can serve many sessions.

use uuid::Uuid;

use crate::entities::info::Info;
use crate::entities::sequence::Index;
use crate::error::IoError;

/// Bounded capacity of a session's event channel. Events past it are dropped.
pub const EVENT_CHANNEL_SIZE: usize = 1024;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Source opened and metadata resolved
    InfoReady { session: Uuid, info: Info },
    /// Source could not be opened; the session is unusable
    OpenFailed { session: Uuid, error: IoError },
    /// Queues flushed, decoding resumes at `frame`
    Seeked { session: Uuid, frame: Index },
    /// One frame failed to decode and was skipped
    DecodeError { session: Uuid, frame: Index, error: IoError },
    /// End of an unbounded stream
    Finished { session: Uuid },
    Closed { session: Uuid },
}

impl SessionEvent {
    pub fn session(&self) -> Uuid {
        match self {
            SessionEvent::InfoReady { session, .. }
            | SessionEvent::OpenFailed { session, .. }
            | SessionEvent::Seeked { session, .. }
            | SessionEvent::DecodeError { session, .. }
            | SessionEvent::Finished { session }
            | SessionEvent::Closed { session } => *session,
        }
    }
}
