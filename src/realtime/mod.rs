//! Real-time layer - event envelopes and the display broadcast fan-out.

/// Connection registry and best-effort fan-out
pub mod broadcast;
/// Event envelope types
pub mod events;

pub use broadcast::{Broadcaster, ChannelSink, ConnectionId, ConnectionState, DisplaySink};
pub use events::BoardEvent;
