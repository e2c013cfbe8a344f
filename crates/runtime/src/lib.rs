//! Channel runtime for driving a browser-automation driver over stdio.
//!
//! Layers, bottom to top:
//! - [`transport`]: length-prefixed JSON framing over the driver pipes
//! - [`connection`]: call correlation, object registry, event dispatch
//! - [`channel_owner`] / [`channel`]: guid-bound proxy base and its call
//!   surface
//! - [`events`]: per-object handlers and one-shot waiters
//! - [`driver`]: locating and running the driver process
//!
//! The API crate builds its typed wrappers (Browser, Page, ...) on top of
//! these pieces; nothing in here knows the concrete wrapper types.

pub mod channel;
pub mod channel_owner;
pub mod connection;
pub mod driver;
pub mod error;
pub mod events;
pub mod transport;

pub use channel::Channel;
pub use channel_owner::{
	BareObject, ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection,
};
pub use connection::{Connection, ConnectionLike, ObjectFactory, ObjectStore};
pub use driver::{DriverProcess, locate_driver};
pub use error::{Error, Result};
pub use events::{EventEmitter, HandlerId, Predicate, Subscription};
pub use transport::{PipeTransport, Transport, TransportParts, TransportReceiver};
