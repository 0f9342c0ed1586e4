//! StrandMesh -- Layer 2 message routing for the Strand Protocol stack.
//!
//! Two cooperating pieces:
//! - **Router**: resolves each destination of an inbound message to a local
//!   stream handler or the link towards a remote peer, buffers traffic for
//!   streams and links that are not bound yet, and fans out multicast
//!   messages with a single joined completion.
//! - **Receive modes**: per-stream sequence tracking under five policies
//!   (reliable-ordered, unreliable-ordered, reliable-unordered,
//!   unreliable-unordered, tail-reliable), producing the ack/nack summaries
//!   the sender retransmits from.

pub mod ack_frame;
mod broadcast;
pub mod channel;
pub mod driver;
pub mod error;
pub mod message;
pub mod receive_mode;
pub mod router;
pub mod status;
pub mod stream;

// Re-export key public types at crate root.
pub use ack_frame::AckFrame;
pub use channel::{ChannelLink, ChannelStreamHandler, Delivery};
pub use driver::{spawn_eviction, SharedRouter};
pub use error::{Result, StrandMeshError};
pub use message::{Destination, LocalStreamId, Message, NodeId, RoutableMessage, StreamId};
pub use receive_mode::{ParameterizedReceiveMode, ReceiveMode, ReliabilityAndOrdering};
pub use router::{Link, LinkId, Router, RouterConfig, StreamHandler};
pub use status::{Status, StatusCallback, StatusCode};
pub use stream::ReceiveStream;
