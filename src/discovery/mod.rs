//! Discovery node (§4.3): leader election, registry, pairing.

mod node;

pub use node::{DiscoveryNode, Registry};
