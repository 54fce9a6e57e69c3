//! Broker node state machine (§4.4): LEAD(index)/BACKUP, the co-leader
//! scaling rules, and the receive→rewrite→send forwarding loop.

use std::{
  sync::{
    mpsc::{sync_channel, Receiver, SyncSender},
    Arc, Mutex,
  },
  thread,
  time::Duration,
};

use log::{error, info, warn};
use rand::Rng;

use crate::{
  coord::CoordClient,
  error::Result,
  history::HistoryFrame,
  model::{self, Identity},
  sockets::{PublishSocket, RequestSocket, SubscribeSocket},
  wire::{ControlCodec, ControlRequest, ControlResponse},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrokerRole {
  Lead(usize),
  Backup,
}

enum Event {
  DiscoveryLeaderChanged(Option<String>),
  LeadZeroGone,
  PubsChanged(Vec<String>),
}

pub struct BrokerNode {
  identity: Identity,
  coord: Arc<CoordClient>,
  ctx: zmq::Context,
  fan_out: PublishSocket,
  fan_in: SubscribeSocket,
  request: Mutex<Option<RequestSocket>>,
  role: Mutex<BrokerRole>,
  paired_pub: Mutex<Option<Identity>>,
  events_tx: SyncSender<Event>,
  events_rx: Mutex<Receiver<Event>>,
}

impl BrokerNode {
  pub fn new(identity: Identity, coord: CoordClient, ctx: zmq::Context) -> Result<Arc<Self>> {
    let fan_out = PublishSocket::bind(&ctx, &identity.tcp_addr())?;
    let fan_in = SubscribeSocket::new(&ctx)?;
    fan_in.subscribe("")?;
    let (events_tx, events_rx) = sync_channel(256);
    Ok(Arc::new(Self {
      identity,
      coord: Arc::new(coord),
      ctx,
      fan_out,
      fan_in,
      request: Mutex::new(None),
      role: Mutex::new(BrokerRole::Backup),
      paired_pub: Mutex::new(None),
      events_tx,
      events_rx: Mutex::new(events_rx),
    }))
  }

  /// Races for `/broker/leaders/lead-0`, enters LEAD(0) or BACKUP
  /// accordingly, and drives the node forever.
  pub fn run(self: &Arc<Self>) -> Result<()> {
    self.coord.ensure_path(model::broker_leaders_root())?;
    self.coord.ensure_path(model::broker_backups_root())?;

    if self
      .coord
      .try_create_ephemeral(&model::broker_lead_path(0), self.identity.addr_port().as_bytes())?
    {
      self.enter_lead(0)?;
    } else {
      self.enter_backup()?;
    }
    self.drive()
  }

  fn enter_backup(self: &Arc<Self>) -> Result<()> {
    *self.role.lock().unwrap() = BrokerRole::Backup;
    info!("broker {}: entering BACKUP", self.identity);
    let backup_path = model::broker_backup_path(&self.identity.addr_port());
    if !self.coord.try_create_ephemeral(&backup_path, b"broker-backup")? {
      warn!("broker {}: backup znode already present", self.identity);
    }

    let this = Arc::clone(self);
    self
      .coord
      .watch_data(&model::broker_lead_path(0), move |data| {
        if data.is_none() {
          let _ = this.events_tx.send(Event::LeadZeroGone);
        }
      })?;

    let this = Arc::clone(self);
    self
      .coord
      .watch_children(model::discovery_pubs_root(), move |children| {
        let _ = this.events_tx.send(Event::PubsChanged(children));
      })?;

    Ok(())
  }

  fn enter_lead(self: &Arc<Self>, index: usize) -> Result<()> {
    *self.role.lock().unwrap() = BrokerRole::Lead(index);
    info!("broker {}: entering LEAD({index})", self.identity);

    let this = Arc::clone(self);
    self
      .coord
      .watch_data(model::discovery_leader_path(), move |data| {
        let addr = data.and_then(|bytes| String::from_utf8(bytes).ok());
        let _ = this.events_tx.send(Event::DiscoveryLeaderChanged(addr));
      })?;

    let this = Arc::clone(self);
    self
      .coord
      .watch_children(model::discovery_pubs_root(), move |children| {
        let _ = this.events_tx.send(Event::PubsChanged(children));
      })?;

    Ok(())
  }

  fn register_and_listen(&self, discovery_addr: &str) -> Result<()> {
    let req = RequestSocket::connect(&self.ctx, &format!("tcp://{discovery_addr}"))?;
    let resp = req.request(&ControlCodec::encode_request(&ControlRequest::Register {
      role: crate::model::Role::Broker,
      id: self.identity.clone(),
      topics: Vec::new(),
    }))?;
    if let ControlResponse::Register(Err(reason)) = ControlCodec::decode_response(&resp)? {
      warn!("broker {}: register rejected: {reason}", self.identity);
    }

    // Only pair once per promotion to LEAD: re-registering on a Discovery
    // failover must not orphan an already-paired publisher.
    if self.paired_pub.lock().unwrap().is_none() {
      let lookup = req.request(&ControlCodec::encode_request(&ControlRequest::LookupAllPubs))?;
      if let ControlResponse::LookupAllPubs(pubs) = ControlCodec::decode_response(&lookup)? {
        if let Some(assigned) = pubs.into_iter().last() {
          info!("broker {}: paired with {assigned}", self.identity);
          self.fan_in.connect_to(&assigned.tcp_addr())?;
          *self.paired_pub.lock().unwrap() = Some(assigned);
        }
      }
    }

    *self.request.lock().unwrap() = Some(req);
    Ok(())
  }

  fn drive(self: &Arc<Self>) -> Result<()> {
    loop {
      if let Some((_topic, frame)) = self.fan_in.poll_recv(10)? {
        self.forward(&frame)?;
      }
      self.drain_events()?;
    }
  }

  /// Receive→rewrite→send (§4.4 LEAD step 4): history frames get a
  /// `pi-<addr>-` marker inserted before forwarding; data frames pass
  /// through unchanged.
  fn forward(&self, frame: &str) -> Result<()> {
    let topic = HistoryFrame::topic_of(frame).to_string();
    let out = if HistoryFrame::looks_like_history(frame) {
      HistoryFrame::rewrite_for_broker(frame, &self.identity.addr_port())
    } else {
      frame.to_string()
    };
    self.fan_out.publish(&topic, &out)
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
      Event::DiscoveryLeaderChanged(Some(addr)) => {
        if let Err(e) = self.register_and_listen(&addr) {
          error!("broker {}: register_and_listen failed: {e}", self.identity);
        }
        Ok(())
      }
      Event::DiscoveryLeaderChanged(None) => Ok(()),
      Event::LeadZeroGone => self.on_lead_zero_gone(),
      Event::PubsChanged(children) => self.on_pubs_changed(children),
    }
  }

  /// BACKUP promotion to LEAD(0) on primary death (§4.4 BACKUP step 1).
  fn on_lead_zero_gone(self: &Arc<Self>) -> Result<()> {
    if *self.role.lock().unwrap() != BrokerRole::Backup {
      return Ok(());
    }
    let jitter = rand::rng().random_range(0.0..1.0);
    thread::sleep(Duration::from_secs_f64(jitter));
    if !self.coord.exists(&model::broker_lead_path(0))?
      && self
        .coord
        .try_create_ephemeral(&model::broker_lead_path(0), self.identity.addr_port().as_bytes())?
    {
      self
        .coord
        .delete(&model::broker_backup_path(&self.identity.addr_port()))?;
      self.enter_lead(0)?;
    }
    Ok(())
  }

  /// Dispatches a `/discovery/pubs` membership change to whichever scaling
  /// rule applies to this node's current role (§4.4 scaling grow/shrink).
  fn on_pubs_changed(self: &Arc<Self>, children: Vec<String>) -> Result<()> {
    match *self.role.lock().unwrap() {
      BrokerRole::Backup => self.maybe_grow(children.len()),
      BrokerRole::Lead(index) => self.maybe_shrink(index, &children),
    }
  }

  /// Scaling — grow (§4.4): promote from BACKUP to a new co-leader index
  /// when publisher demand exceeds the current lead count.
  fn maybe_grow(self: &Arc<Self>, pub_count: usize) -> Result<()> {
    if *self.role.lock().unwrap() != BrokerRole::Backup {
      return Ok(());
    }
    let current_lead_count = self.coord.get_children(model::broker_leaders_root())?.len();
    if pub_count <= current_lead_count {
      return Ok(());
    }
    let jitter = rand::rng().random_range(0.0..1.0);
    thread::sleep(Duration::from_secs_f64(jitter));
    let candidate_path = model::broker_lead_path(current_lead_count);
    if self.coord.exists(&candidate_path)? {
      return Ok(());
    }
    if self
      .coord
      .try_create_ephemeral(&candidate_path, self.identity.addr_port().as_bytes())?
    {
      self
        .coord
        .delete(&model::broker_backup_path(&self.identity.addr_port()))?;
      self.enter_lead(current_lead_count)?;
    }
    Ok(())
  }

  /// Scaling — shrink (§4.4): a non-primary LEAD demotes back to BACKUP
  /// once its paired publisher departs.
  fn maybe_shrink(self: &Arc<Self>, index: usize, children: &[String]) -> Result<()> {
    if index == 0 {
      return Ok(());
    }
    let Some(paired) = self.paired_pub.lock().unwrap().clone() else {
      return Ok(());
    };
    if children.contains(&paired.znode_child_name()) {
      return Ok(());
    }
    info!(
      "broker {}: paired publisher {paired} departed, demoting to BACKUP",
      self.identity
    );
    self.coord.delete(&model::broker_lead_path(index))?;
    *self.paired_pub.lock().unwrap() = None;
    self.enter_backup()
  }
}
