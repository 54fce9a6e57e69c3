use std::time::Duration;

use clap::Parser;
use log::error;

use pubfabric::config::{init_logging, PublisherArgs};
use pubfabric::coord::CoordClient;
use pubfabric::model::Identity;
use pubfabric::publisher::PublisherNode;

fn main() {
  let args = PublisherArgs::parse();
  init_logging(&args.loglevel);

  let identity = Identity::new(args.name, args.addr, args.port);
  let ctx = zmq::Context::new();
  let grace_window = Duration::from_millis(args.grace_window_ms);

  let result = CoordClient::connect(&args.discovery).and_then(|coord| {
    PublisherNode::new(
      identity,
      args.topics,
      args.history,
      args.iters,
      grace_window,
      coord,
      ctx,
    )
  });

  let node = match result {
    Ok(node) => node,
    Err(e) => {
      error!("publisher: {e}");
      std::process::exit(1);
    }
  };

  if let Err(e) = node.run() {
    error!("publisher: {e}");
    std::process::exit(1);
  }
}
