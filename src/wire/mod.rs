//! Control-plane wire schema and codec (§4.2).

mod codec;

pub mod proto {
  #![allow(clippy::all)]
  include!(concat!(env!("OUT_DIR"), "/pubfabric.control.rs"));
}

pub use codec::{ControlCodec, ControlRequest, ControlResponse};
