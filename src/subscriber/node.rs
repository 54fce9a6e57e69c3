//! Subscriber node (§4.6): registration, publisher/broker resolution, and
//! the history-frame accept/reject receive loop.

use std::{
  collections::HashSet,
  sync::{
    mpsc::{sync_channel, Receiver, SyncSender},
    Arc, Mutex,
  },
  thread,
  time::Duration,
};

use log::{info, warn};

use crate::{
  coord::CoordClient,
  error::{PubFabricError, Result},
  history::HistoryFrame,
  model::{self, Identity, Role},
  sockets::{RequestSocket, SubscribeSocket},
  wire::{ControlCodec, ControlRequest, ControlResponse},
};

const DISCOVERY_POLL: Duration = Duration::from_millis(200);

enum Event {
  DiscoveryLeaderChanged(Option<String>),
  PubsChanged,
}

pub struct SubscriberNode {
  identity: Identity,
  topics: Vec<String>,
  min_hist: usize,
  coord: Arc<CoordClient>,
  ctx: zmq::Context,
  fan_in: SubscribeSocket,
  request: Mutex<Option<RequestSocket>>,
  connected: Mutex<HashSet<String>>,
  got_hist: Mutex<HashSet<String>>,
  events_tx: SyncSender<Event>,
  events_rx: Mutex<Receiver<Event>>,
}

impl SubscriberNode {
  pub fn new(
    identity: Identity,
    topics: Vec<String>,
    min_hist: usize,
    coord: CoordClient,
    ctx: zmq::Context,
  ) -> Result<Arc<Self>> {
    let fan_in = SubscribeSocket::new(&ctx)?;
    let (events_tx, events_rx) = sync_channel(64);
    Ok(Arc::new(Self {
      identity,
      topics,
      min_hist,
      coord: Arc::new(coord),
      ctx,
      fan_in,
      request: Mutex::new(None),
      connected: Mutex::new(HashSet::new()),
      got_hist: Mutex::new(HashSet::new()),
      events_tx,
      events_rx: Mutex::new(events_rx),
    }))
  }

  pub fn run(self: &Arc<Self>) -> Result<()> {
    self.await_discovery()?;
    self
      .coord
      .create_ephemeral(&model::discovery_sub_path(&self.identity), b"subscriber-node")?;

    let this = Arc::clone(self);
    self
      .coord
      .watch_data(model::discovery_leader_path(), move |data| {
        let addr = data.and_then(|bytes| String::from_utf8(bytes).ok());
        let _ = this.events_tx.send(Event::DiscoveryLeaderChanged(addr));
      })?;
    // The watch above fires once immediately with the current leader
    // address; drain it synchronously so `request` is ready before the
    // initial lookup.
    self.drain_events()?;

    for topic in &self.topics {
      self.fan_in.subscribe(topic)?;
    }
    let identities = self.lookup_pub_by_topic()?;
    self.connect_new(identities)?;

    let this = Arc::clone(self);
    self
      .coord
      .watch_children(model::discovery_pubs_root(), move |_children| {
        let _ = this.events_tx.send(Event::PubsChanged);
      })?;

    self.drive()
  }

  fn await_discovery(&self) -> Result<()> {
    while !self.coord.exists(model::discovery_root())? {
      thread::sleep(DISCOVERY_POLL);
    }
    Ok(())
  }

  fn register(&self, discovery_addr: &str) -> Result<()> {
    let req = RequestSocket::connect(&self.ctx, &format!("tcp://{discovery_addr}"))?;
    let bytes = req.request(&ControlCodec::encode_request(&ControlRequest::Register {
      role: Role::Subscriber,
      id: self.identity.clone(),
      topics: self.topics.clone(),
    }))?;
    if let ControlResponse::Register(Err(reason)) = ControlCodec::decode_response(&bytes)? {
      warn!("subscriber {}: register rejected: {reason}", self.identity);
    }
    *self.request.lock().unwrap() = Some(req);
    Ok(())
  }

  fn lookup_pub_by_topic(&self) -> Result<Vec<Identity>> {
    let guard = self.request.lock().unwrap();
    let req = guard
      .as_ref()
      .ok_or_else(|| PubFabricError::Protocol("no discovery connection yet".into()))?;
    let bytes = req.request(&ControlCodec::encode_request(
      &ControlRequest::LookupPubByTopic {
        topics: self.topics.clone(),
      },
    ))?;
    match ControlCodec::decode_response(&bytes)? {
      ControlResponse::LookupPubByTopic(ids) => Ok(ids),
      _ => Err(PubFabricError::Protocol(
        "unexpected response to LookupPubByTopic".into(),
      )),
    }
  }

  /// Connect to any returned identity not already subscribed, deduped by
  /// name (§4.6 step 5, step 6).
  fn connect_new(&self, identities: Vec<Identity>) -> Result<()> {
    let mut connected = self.connected.lock().unwrap();
    for id in identities {
      if connected.insert(id.name.clone()) {
        self.fan_in.connect_to(&id.tcp_addr())?;
      }
    }
    Ok(())
  }

  fn drive(self: &Arc<Self>) -> Result<()> {
    loop {
      if let Some((_topic, frame)) = self.fan_in.poll_recv(50)? {
        self.handle_frame(&frame);
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
      match event {
        Event::DiscoveryLeaderChanged(Some(addr)) => {
          if let Err(e) = self.register(&addr) {
            warn!("subscriber {}: register failed: {e}", self.identity);
          }
        }
        Event::DiscoveryLeaderChanged(None) => {}
        Event::PubsChanged => {
          let identities = self.lookup_pub_by_topic()?;
          self.connect_new(identities)?;
        }
      }
    }
    Ok(())
  }

  /// §4.6 receive loop: history frames are accepted (and their items
  /// reported) once, the first time they meet `min_hist`; an
  /// under-qualified history frame triggers a permanent disconnect from
  /// that publisher/broker.
  fn handle_frame(&self, frame: &str) {
    if !HistoryFrame::looks_like_history(frame) {
      info!("subscriber {}: {frame}", self.identity);
      return;
    }
    let parsed = match HistoryFrame::parse(frame) {
      Ok(parsed) => parsed,
      Err(e) => {
        warn!("subscriber {}: {e}", self.identity);
        return;
      }
    };
    if parsed.satisfies(self.min_hist) {
      let mut got_hist = self.got_hist.lock().unwrap();
      if got_hist.insert(parsed.topic.clone()) {
        info!(
          "subscriber {}: accepted history for {} (H={})",
          self.identity, parsed.topic, parsed.history_size
        );
        for item in &parsed.history {
          info!("subscriber {}: historic {item}", self.identity);
        }
      }
      return;
    }
    match &parsed.broker_addr {
      Some(pub_info) => {
        warn!(
          "subscriber {}: insufficient history (H={} < {}) from {pub_info}, disconnecting",
          self.identity, parsed.history_size, self.min_hist
        );
        let _ = self.fan_in.disconnect_from(&format!("tcp://{pub_info}"));
      }
      None => {
        warn!(
          "subscriber {}: insufficient history (H={} < {}) with no traceable address",
          self.identity, parsed.history_size, self.min_hist
        );
      }
    }
  }
}
