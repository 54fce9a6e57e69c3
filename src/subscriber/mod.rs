//! Subscriber node (§4.6): registration, lookup, history-frame contract.

mod node;

pub use node::SubscriberNode;
