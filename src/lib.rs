//! A fault-tolerant publish/subscribe fabric over a ZooKeeper-like
//! coordination service: Discovery leader election, a dynamic broker
//! co-leader pool, publisher ownership strength, and subscriber
//! history-depth contracts.

pub mod broker;
pub mod config;
pub mod coord;
pub mod discovery;
pub mod error;
pub mod history;
pub mod model;
pub mod publisher;
pub mod sockets;
pub mod strength;
pub mod subscriber;
pub mod wire;

pub use error::{PubFabricError, Result};
