//! Core engine modules - queues, cache, read and write sessions
//!
//! These modules form the decoding engine, independent of any file format.

pub mod cache;
pub mod events;
pub mod queue;
pub mod session;
pub mod writer;

// Re-exports for convenience
pub use cache::{Direction, FrameCache, InOutPoints};
pub use events::SessionEvent;
pub use queue::{AudioQueue, FrameQueue, VideoQueue};
pub use session::{CancelToken, InfoFuture, ReadSession, SessionState};
pub use writer::{WriteSession, WriteStats};
