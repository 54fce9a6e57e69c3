//! Maintenance tool: wipes `/discovery` and `/broker` from the
//! coordination service between manual test runs, since no participant
//! persists state across restarts.

use clap::Parser;
use log::{error, info};

use pubfabric::config::{init_logging, ClearCoordArgs};
use pubfabric::coord::CoordClient;

fn run(args: ClearCoordArgs) -> pubfabric::Result<()> {
  let coord = CoordClient::connect(&args.coordination)?;

  info!("root: {:?}", coord.get_children("/")?);
  if coord.exists("/discovery")? {
    info!("/discovery: {:?}", coord.get_children("/discovery")?);
  }
  if coord.exists("/discovery/pubs")? {
    info!("/discovery/pubs: {:?}", coord.get_children("/discovery/pubs")?);
  }
  if coord.exists("/discovery/subs")? {
    info!("/discovery/subs: {:?}", coord.get_children("/discovery/subs")?);
  }
  if coord.exists("/broker")? {
    info!("/broker: {:?}", coord.get_children("/broker")?);
  } else {
    info!("no /broker to clear");
  }

  coord.delete_recursive("/discovery")?;
  coord.delete_recursive("/broker")?;

  info!("cleared. root: {:?}", coord.get_children("/")?);
  Ok(())
}

fn main() {
  let args = ClearCoordArgs::parse();
  init_logging(&args.loglevel);
  if let Err(e) = run(args) {
    error!("clear-coord: {e}");
    std::process::exit(1);
  }
}
