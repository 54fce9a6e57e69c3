use clap::Parser;
use log::error;

use pubfabric::config::{init_logging, SubscriberArgs};
use pubfabric::coord::CoordClient;
use pubfabric::model::Identity;
use pubfabric::subscriber::SubscriberNode;

fn main() {
  let args = SubscriberArgs::parse();
  init_logging(&args.loglevel);

  let identity = Identity::new(args.name, args.addr, args.port);
  let ctx = zmq::Context::new();

  let result = CoordClient::connect(&args.discovery)
    .and_then(|coord| SubscriberNode::new(identity, args.topics, args.history, coord, ctx));

  let node = match result {
    Ok(node) => node,
    Err(e) => {
      error!("subscriber: {e}");
      std::process::exit(1);
    }
  };

  if let Err(e) = node.run() {
    error!("subscriber: {e}");
    std::process::exit(1);
  }
}
