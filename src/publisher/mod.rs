//! Publisher node (§4.5): registration, dissemination, ownership strength.

mod node;

pub use node::PublisherNode;
