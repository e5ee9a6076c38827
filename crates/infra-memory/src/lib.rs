// Quiver Infrastructure - In-memory broker
// Implements: BrokerClient (visibility, delays, receive counts, redrive)

mod broker;

pub use broker::{BrokerMode, InMemoryBroker};
