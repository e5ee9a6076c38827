// Quiver Infrastructure - AWS SQS Adapter
// Implements: BrokerClient

mod broker;

pub use broker::SqsBroker;
