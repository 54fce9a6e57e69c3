use clap::Parser;
use log::error;

use pubfabric::config::{init_logging, DiscoveryArgs, DisseminationStrategy};
use pubfabric::coord::CoordClient;
use pubfabric::discovery::DiscoveryNode;
use pubfabric::model::Identity;

fn main() {
  let args = DiscoveryArgs::parse();
  init_logging(&args.loglevel);

  let strategy = match DisseminationStrategy::load(&args.config) {
    Ok(s) => s,
    Err(e) => {
      error!("discovery: {e}");
      std::process::exit(1);
    }
  };
  let identity = Identity::new(args.name, args.addr, args.port);
  let ctx = zmq::Context::new();

  let result = CoordClient::connect(&args.coordination)
    .and_then(|coord| DiscoveryNode::new(identity, strategy, coord, &ctx))
    .and_then(|node| node.run());

  if let Err(e) = result {
    error!("discovery: {e}");
    std::process::exit(1);
  }
}
