//! Discovery node state machine (§4.3): leader election over
//! `/discovery/leader`, the `pubs`/`subs`/`brokers`/`paired_pubs` registry,
//! and the request/reply control surface.

use std::{
  sync::{
    mpsc::{sync_channel, Receiver, SyncSender},
    Arc, Mutex,
  },
  thread,
  time::Duration,
};

use log::{info, warn};
use rand::Rng;

use crate::{
  config::DisseminationStrategy,
  coord::CoordClient,
  error::Result,
  model::{self, Identity, RegistrationRecord, Role},
  sockets::ReplySocket,
  wire::{ControlCodec, ControlRequest, ControlResponse},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiscoveryState {
  Standby,
  Leader,
}

/// The in-memory membership lists a lead Discovery node keeps (§3, §4.3).
/// Kept separate from socket/coordination plumbing so the pairing and
/// lookup logic can be exercised without a live cluster.
#[derive(Debug, Default)]
pub struct Registry {
  pubs: Vec<RegistrationRecord>,
  subs: Vec<RegistrationRecord>,
  brokers: Vec<RegistrationRecord>,
  paired_pubs: Vec<RegistrationRecord>,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn pubs(&self) -> &[RegistrationRecord] {
    &self.pubs
  }

  pub fn paired_pubs(&self) -> &[RegistrationRecord] {
    &self.paired_pubs
  }

  pub fn register(&mut self, record: RegistrationRecord) {
    let list = match record.role {
      Role::Publisher => &mut self.pubs,
      Role::Subscriber => &mut self.subs,
      Role::Broker => &mut self.brokers,
    };
    list.push(record);
  }

  pub fn deregister(&mut self, role: Role, name: &str) {
    let list = match role {
      Role::Publisher => &mut self.pubs,
      Role::Subscriber => &mut self.subs,
      Role::Broker => &mut self.brokers,
    };
    list.retain(|r| r.identity.name != name);
  }

  /// `/discovery/pubs` child-watch callback (§4.3): drop any `pubs` entry
  /// no longer present among `children`; `paired_pubs` is untouched here.
  pub fn on_pubs_changed(&mut self, children: &[String]) {
    if children.is_empty() {
      self.pubs.clear();
      return;
    }
    if children.len() < self.pubs.len() {
      self
        .pubs
        .retain(|p| children.contains(&p.identity.znode_child_name()));
    }
  }

  /// `/discovery/subs` child-watch callback (§4.3), symmetrical to pubs.
  pub fn on_subs_changed(&mut self, children: &[String]) {
    if children.is_empty() {
      self.subs.clear();
      return;
    }
    if children.len() < self.subs.len() {
      self
        .subs
        .retain(|s| children.contains(&s.identity.znode_child_name()));
    }
  }

  /// `/broker/leaders/lead-0` data-watch disappearance (§4.3): the
  /// publisher paired to the dead primary returns to the free pool.
  pub fn on_broker_primary_gone(&mut self) {
    if !self.paired_pubs.is_empty() {
      let returned = self.paired_pubs.remove(0);
      self.pubs.push(returned);
    }
  }

  /// Serve `LookupAllPubs` (§4.3): reply with the full current free list,
  /// then atomically pop one publisher (last) into `paired_pubs`. An empty
  /// free list replies empty and does not mutate `paired_pubs`.
  pub fn lookup_all_pubs(&mut self) -> Vec<Identity> {
    let free: Vec<Identity> = self.pubs.iter().map(|r| r.identity.clone()).collect();
    if let Some(record) = self.pubs.pop() {
      self.paired_pubs.push(record);
    }
    free
  }

  /// Serve `LookupPubByTopic` (§4.3, §9 open question 1): broker mode
  /// always returns the current brokers list regardless of the requested
  /// topics; direct mode filters publishers by topic intersection.
  pub fn lookup_pub_by_topic(
    &self,
    strategy: DisseminationStrategy,
    topics: &[String],
  ) -> Vec<Identity> {
    match strategy {
      DisseminationStrategy::Broker => {
        self.brokers.iter().map(|r| r.identity.clone()).collect()
      }
      DisseminationStrategy::Direct => self
        .pubs
        .iter()
        .filter(|r| r.matches_topics(topics))
        .map(|r| r.identity.clone())
        .collect(),
    }
  }
}

enum Event {
  PubsChanged(Vec<String>),
  SubsChanged(Vec<String>),
  BrokerPrimaryGone,
  LeaderGone,
}

pub struct DiscoveryNode {
  identity: Identity,
  strategy: DisseminationStrategy,
  coord: Arc<CoordClient>,
  rep: ReplySocket,
  state: Mutex<DiscoveryState>,
  registry: Mutex<Registry>,
  events_tx: SyncSender<Event>,
  events_rx: Mutex<Receiver<Event>>,
}

impl DiscoveryNode {
  pub fn new(
    identity: Identity,
    strategy: DisseminationStrategy,
    coord: CoordClient,
    ctx: &zmq::Context,
  ) -> Result<Arc<Self>> {
    let rep = ReplySocket::bind(ctx, &identity.tcp_addr())?;
    let (events_tx, events_rx) = sync_channel(256);
    Ok(Arc::new(Self {
      identity,
      strategy,
      coord: Arc::new(coord),
      rep,
      state: Mutex::new(DiscoveryState::Standby),
      registry: Mutex::new(Registry::new()),
      events_tx,
      events_rx: Mutex::new(events_rx),
    }))
  }

  /// Races for `/discovery/leader`, enters LEADER or STANDBY accordingly,
  /// and drives the node forever. Only returns on an unrecoverable
  /// coordination error (§7).
  pub fn run(self: &Arc<Self>) -> Result<()> {
    self.coord.ensure_path(model::discovery_root())?;
    self.coord.ensure_path(model::discovery_pubs_root())?;
    self.coord.ensure_path(model::discovery_subs_root())?;
    self.coord.ensure_path(model::broker_leaders_root())?;

    if self.try_become_leader()? {
      self.enter_leader()?;
    } else {
      self.enter_standby()?;
    }
    self.drive()
  }

  fn try_become_leader(&self) -> Result<bool> {
    self.coord.try_create_ephemeral(
      model::discovery_leader_path(),
      self.identity.addr_port().as_bytes(),
    )
  }

  fn enter_standby(self: &Arc<Self>) -> Result<()> {
    *self.state.lock().unwrap() = DiscoveryState::Standby;
    info!("discovery {}: entering STANDBY", self.identity);
    let backup_path = model::discovery_backup_path(&self.identity.addr_port());
    if !self.coord.try_create_ephemeral(&backup_path, b"discovery-backup")? {
      warn!("discovery {}: backup znode already present", self.identity);
    }
    let this = Arc::clone(self);
    self
      .coord
      .watch_data(model::discovery_leader_path(), move |data| {
        if data.is_none() {
          let _ = this.events_tx.send(Event::LeaderGone);
        }
      })
  }

  fn enter_leader(self: &Arc<Self>) -> Result<()> {
    *self.state.lock().unwrap() = DiscoveryState::Leader;
    info!("discovery {}: entering LEADER", self.identity);

    let this = Arc::clone(self);
    self
      .coord
      .watch_children(model::discovery_pubs_root(), move |children| {
        let _ = this.events_tx.send(Event::PubsChanged(children));
      })?;

    let this = Arc::clone(self);
    self
      .coord
      .watch_children(model::discovery_subs_root(), move |children| {
        let _ = this.events_tx.send(Event::SubsChanged(children));
      })?;

    let this = Arc::clone(self);
    self
      .coord
      .watch_data(&model::broker_lead_path(0), move |data| {
        if data.is_none() {
          let _ = this.events_tx.send(Event::BrokerPrimaryGone);
        }
      })?;

    Ok(())
  }

  fn drive(self: &Arc<Self>) -> Result<()> {
    loop {
      if let Some(bytes) = self.rep.poll_recv(50)? {
        let response = self.handle_request(&bytes);
        self.rep.reply(&ControlCodec::encode_response(&response))?;
      }
      self.drain_events()?;
    }
  }

  fn drain_events(self: &Arc<Self>) -> Result<()> {
    let batch: Vec<Event> = {
      let rx = self.events_rx.lock().unwrap();
      std::iter::from_fn(|| rx.try_recv().ok()).collect()
    };
    for event in batch {
      self.handle_event(event)?;
    }
    Ok(())
  }

  fn handle_event(self: &Arc<Self>, event: Event) -> Result<()> {
    match event {
      Event::LeaderGone => self.on_leader_gone(),
      Event::PubsChanged(children) => {
        self.registry.lock().unwrap().on_pubs_changed(&children);
        Ok(())
      }
      Event::SubsChanged(children) => {
        self.registry.lock().unwrap().on_subs_changed(&children);
        Ok(())
      }
      Event::BrokerPrimaryGone => {
        self.registry.lock().unwrap().on_broker_primary_gone();
        Ok(())
      }
    }
  }

  /// STANDBY → LEADER promotion on leader-znode disappearance (§4.3), with
  /// the anti-thundering-herd `[0, 1)` second jitter.
  fn on_leader_gone(self: &Arc<Self>) -> Result<()> {
    if *self.state.lock().unwrap() == DiscoveryState::Leader {
      return Ok(());
    }
    let jitter = rand::rng().random_range(0.0..1.0);
    thread::sleep(Duration::from_secs_f64(jitter));
    if self.try_become_leader()? {
      self
        .coord
        .delete(&model::discovery_backup_path(&self.identity.addr_port()))?;
      self.enter_leader()?;
    }
    Ok(())
  }

  fn handle_request(&self, bytes: &[u8]) -> ControlResponse {
    match ControlCodec::decode_request(bytes) {
      Ok(req) => self.dispatch(req),
      Err(e) => {
        warn!("discovery {}: malformed request: {e}", self.identity);
        ControlResponse::Register(Err(e.to_string()))
      }
    }
  }

  fn dispatch(&self, req: ControlRequest) -> ControlResponse {
    match req {
      ControlRequest::Register { role, id, topics } => {
        self
          .registry
          .lock()
          .unwrap()
          .register(RegistrationRecord::new(role, id, topics));
        ControlResponse::Register(Ok(()))
      }
      ControlRequest::Deregister { role, id, .. } => {
        self.registry.lock().unwrap().deregister(role, &id.name);
        ControlResponse::Deregister(Ok(()))
      }
      ControlRequest::LookupAllPubs => {
        let identities = self.registry.lock().unwrap().lookup_all_pubs();
        ControlResponse::LookupAllPubs(identities)
      }
      ControlRequest::LookupPubByTopic { topics } => {
        let identities = self
          .registry
          .lock()
          .unwrap()
          .lookup_pub_by_topic(self.strategy, &topics);
        ControlResponse::LookupPubByTopic(identities)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn identity(n: &str) -> Identity {
    Identity::new(n, "10.0.0.1", 5000)
  }

  #[test]
  fn lookup_all_pubs_pops_one_into_paired() {
    let mut registry = Registry::new();
    registry.register(RegistrationRecord::new(
      Role::Publisher,
      identity("pub1"),
      vec!["t1".into()],
    ));
    registry.register(RegistrationRecord::new(
      Role::Publisher,
      identity("pub2"),
      vec!["t2".into()],
    ));
    let free = registry.lookup_all_pubs();
    assert_eq!(free.len(), 2);
    assert_eq!(registry.pubs().len(), 1);
    assert_eq!(registry.paired_pubs().len(), 1);
    assert_eq!(registry.paired_pubs()[0].identity.name, "pub2");
  }

  #[test]
  fn lookup_all_pubs_on_empty_list_does_not_mutate_paired() {
    let mut registry = Registry::new();
    let free = registry.lookup_all_pubs();
    assert!(free.is_empty());
    assert!(registry.paired_pubs().is_empty());
  }

  #[test]
  fn broker_primary_gone_returns_paired_publisher_to_free_pool() {
    let mut registry = Registry::new();
    registry.register(RegistrationRecord::new(
      Role::Publisher,
      identity("pub1"),
      vec!["t1".into()],
    ));
    registry.lookup_all_pubs();
    assert!(registry.pubs().is_empty());
    registry.on_broker_primary_gone();
    assert_eq!(registry.pubs().len(), 1);
    assert!(registry.paired_pubs().is_empty());
  }

  #[test]
  fn pubs_changed_drops_departed_publishers_only() {
    let mut registry = Registry::new();
    registry.register(RegistrationRecord::new(
      Role::Publisher,
      identity("pub1"),
      vec!["t1".into()],
    ));
    registry.register(RegistrationRecord::new(
      Role::Publisher,
      identity("pub2"),
      vec!["t2".into()],
    ));
    registry.on_pubs_changed(&[identity("pub1").znode_child_name()]);
    assert_eq!(registry.pubs().len(), 1);
    assert_eq!(registry.pubs()[0].identity.name, "pub1");
  }

  #[test]
  fn pubs_changed_to_empty_clears_list() {
    let mut registry = Registry::new();
    registry.register(RegistrationRecord::new(
      Role::Publisher,
      identity("pub1"),
      vec!["t1".into()],
    ));
    registry.on_pubs_changed(&[]);
    assert!(registry.pubs().is_empty());
  }

  #[test]
  fn lookup_by_topic_direct_mode_filters_by_intersection() {
    let mut registry = Registry::new();
    registry.register(RegistrationRecord::new(
      Role::Publisher,
      identity("pub1"),
      vec!["t1".into()],
    ));
    registry.register(RegistrationRecord::new(
      Role::Publisher,
      identity("pub2"),
      vec!["t2".into()],
    ));
    let matches = registry.lookup_pub_by_topic(DisseminationStrategy::Direct, &["t2".into()]);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].name, "pub2");
  }

  #[test]
  fn lookup_by_topic_broker_mode_ignores_topics_returns_brokers() {
    let mut registry = Registry::new();
    registry.register(RegistrationRecord::new(
      Role::Broker,
      identity("b1"),
      vec![],
    ));
    registry.register(RegistrationRecord::new(
      Role::Publisher,
      identity("pub1"),
      vec!["t1".into()],
    ));
    let result = registry.lookup_pub_by_topic(DisseminationStrategy::Broker, &["anything".into()]);
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].name, "b1");
  }
}
