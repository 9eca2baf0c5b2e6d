//! Bus collaborator for the bridge: topic-routed messages carrying typed
//! payload objects, delivered over ZeroMQ PUB/SUB.

pub mod error;
pub mod message;
pub mod pubsub;
pub mod traits;
pub mod transport;

pub use error::BusError;
pub use message::{Message, PayloadObject};
pub use pubsub::{ZmqPublisher, ZmqSubscriber};
pub use traits::{EventPublisher, EventSubscriber};
pub use transport::Transport;
