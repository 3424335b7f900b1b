/*!
 * Streaming relays.
 *
 * Both WebSocket endpoints share the same shape: a connection joins a key in
 * a `SessionHub`, its inbound messages are handled by a relay, and results
 * are fanned out to the other connections under the same key.
 */

pub mod chat;
pub mod hub;
pub mod prediction;
pub mod protocol;

pub use chat::ChatRelay;
pub use hub::{ConnectionId, SessionHub, Subscription};
pub use prediction::{FrameOutcome, FrameSender, PredictionRelay, RelaySettings};
pub use protocol::{ClientMessage, ServerMessage};
