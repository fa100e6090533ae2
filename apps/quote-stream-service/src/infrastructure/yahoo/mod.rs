//! Yahoo Pricing Stream Adapter
//!
//! Implements the streaming side of the service against Yahoo's pricing
//! WebSocket:
//!
//! - **codec**: base64 protobuf frame decoder
//! - **stream**: connection lifecycle, resubscribe and cache feed
//! - **reconnect** / **keepalive**: backoff and liveness policies

pub mod codec;
pub mod keepalive;
pub mod messages;
pub mod reconnect;
pub mod stream;

pub use codec::YahooFrameDecoder;
pub use keepalive::{Keepalive, KeepaliveAction, KeepaliveConfig};
pub use messages::{ControlFrame, PricingData, PricingEnvelope, SubscribeRequest};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use stream::{StreamConfig, StreamError, StreamManager};
