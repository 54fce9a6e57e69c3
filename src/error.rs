use thiserror::Error;

/// Error taxonomy for the fabric (§7): coordination-service failures, control
/// wire-protocol failures, application-level register rejection, and socket
/// I/O failures. Session loss and lost leadership are *not* represented here
/// — they are expected transitions handled by the node state machines.
#[derive(Debug, Error)]
pub enum PubFabricError {
  #[error("coordination service error: {0}")]
  Coordination(#[from] zookeeper::ZkError),

  #[error("control protocol error: {0}")]
  Protocol(String),

  #[error("registration rejected by discovery: {0}")]
  RegisterRejected(String),

  #[error("socket error: {0}")]
  Network(#[from] zmq::Error),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("config error: {0}")]
  Config(String),
}

pub type Result<T> = std::result::Result<T, PubFabricError>;
