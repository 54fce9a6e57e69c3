use clap::Parser;
use log::error;

use pubfabric::broker::BrokerNode;
use pubfabric::config::{init_logging, BrokerArgs};
use pubfabric::coord::CoordClient;
use pubfabric::model::Identity;

fn main() {
  let args = BrokerArgs::parse();
  init_logging(&args.loglevel);

  let identity = Identity::new(args.name, args.addr, args.port);
  let ctx = zmq::Context::new();

  let result = CoordClient::connect(&args.coordination)
    .and_then(|coord| BrokerNode::new(identity, coord, ctx))
    .and_then(|node| node.run());

  if let Err(e) = result {
    error!("broker: {e}");
    std::process::exit(1);
  }
}
