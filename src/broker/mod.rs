pub mod engine;
pub mod message;
pub mod registry;
pub mod stream;
pub mod topic;

pub use engine::{Broker, DeliveryReport};
pub use message::{Event, EventKind, Frame};
pub use registry::Registry;
pub use stream::ConnectionStream;
