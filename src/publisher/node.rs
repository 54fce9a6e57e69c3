//! Publisher node (§4.5): registration, ownership-strength-gated
//! dissemination, and the sliding per-topic history window.

use std::{
  collections::HashMap,
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
  history::Window,
  model::{self, Identity, Role},
  sockets::{PublishSocket, RequestSocket},
  strength::StrengthTable,
  wire::{ControlCodec, ControlRequest, ControlResponse},
};

const DISSEMINATION_PACE: Duration = Duration::from_millis(10);
const DISCOVERY_POLL: Duration = Duration::from_millis(200);

enum Event {
  DiscoveryLeaderChanged(Option<String>),
  PubsChanged(Vec<String>),
}

pub struct PublisherNode {
  identity: Identity,
  topics: Vec<String>,
  history_capacity: usize,
  iters: u32,
  grace_window: Duration,
  coord: Arc<CoordClient>,
  ctx: zmq::Context,
  fan_out: PublishSocket,
  request: Mutex<Option<RequestSocket>>,
  pre_existing_pubs: Mutex<Vec<String>>,
  strengths: Mutex<StrengthTable>,
  windows: Mutex<HashMap<String, Window>>,
  events_tx: SyncSender<Event>,
  events_rx: Mutex<Receiver<Event>>,
}

impl PublisherNode {
  pub fn new(
    identity: Identity,
    topics: Vec<String>,
    history_capacity: usize,
    iters: u32,
    grace_window: Duration,
    coord: CoordClient,
    ctx: zmq::Context,
  ) -> Result<Arc<Self>> {
    let fan_out = PublishSocket::bind(&ctx, &identity.tcp_addr())?;
    let (events_tx, events_rx) = sync_channel(64);
    Ok(Arc::new(Self {
      identity,
      topics,
      history_capacity,
      iters,
      grace_window,
      coord: Arc::new(coord),
      ctx,
      fan_out,
      request: Mutex::new(None),
      pre_existing_pubs: Mutex::new(Vec::new()),
      strengths: Mutex::new(StrengthTable::new()),
      windows: Mutex::new(HashMap::new()),
      events_tx,
      events_rx: Mutex::new(events_rx),
    }))
  }

  pub fn run(self: &Arc<Self>) -> Result<()> {
    self.await_discovery()?;
    self.coord.ensure_path(model::discovery_pubs_root())?;

    let initial_peers = self.coord.get_children(model::discovery_pubs_root())?;
    if initial_peers.is_empty() && !self.grace_window.is_zero() {
      info!(
        "publisher {}: no peers registered yet, waiting {:?} grace window",
        self.identity, self.grace_window
      );
      thread::sleep(self.grace_window);
    }
    *self.pre_existing_pubs.lock().unwrap() =
      self.coord.get_children(model::discovery_pubs_root())?;

    let topics_json = serde_json::to_vec(&self.topics)
      .map_err(|e| PubFabricError::Protocol(format!("encoding topic list: {e}")))?;
    self
      .coord
      .create_ephemeral(&model::discovery_pub_path(&self.identity), &topics_json)?;

    let this = Arc::clone(self);
    self
      .coord
      .watch_data(model::discovery_leader_path(), move |data| {
        let addr = data.and_then(|bytes| String::from_utf8(bytes).ok());
        let _ = this.events_tx.send(Event::DiscoveryLeaderChanged(addr));
      })?;

    self.evaluate_strength()?;

    let this = Arc::clone(self);
    self
      .coord
      .watch_children(model::discovery_pubs_root(), move |children| {
        let _ = this.events_tx.send(Event::PubsChanged(children));
      })?;

    let result = self.disseminate();
    self.teardown()?;
    result
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
      role: Role::Publisher,
      id: self.identity.clone(),
      topics: self.topics.clone(),
    }))?;
    if let ControlResponse::Register(Err(reason)) = ControlCodec::decode_response(&bytes)? {
      warn!("publisher {}: register rejected: {reason}", self.identity);
    }
    *self.request.lock().unwrap() = Some(req);
    Ok(())
  }

  /// Ownership-strength evaluation (§4.5, corrected semantics per §9 open
  /// question 2 — see [`StrengthTable::evaluate`]).
  fn evaluate_strength(&self) -> Result<()> {
    let peers = self.pre_existing_pubs.lock().unwrap().clone();
    let mut peer_topic_lists = Vec::with_capacity(peers.len());
    for child in &peers {
      let path = format!("{}/{child}", model::discovery_pubs_root());
      if let Some(data) = self.coord.get_data(&path)? {
        if let Ok(topics) = serde_json::from_slice::<Vec<String>>(&data) {
          peer_topic_lists.push(topics);
        }
      }
    }
    let borrowed: Vec<&[String]> = peer_topic_lists.iter().map(|v| v.as_slice()).collect();
    self
      .strengths
      .lock()
      .unwrap()
      .evaluate(&self.topics, borrowed);
    Ok(())
  }

  fn disseminate(self: &Arc<Self>) -> Result<()> {
    for _ in 0..self.iters {
      self.drain_events()?;
      for topic in self.topics.clone() {
        if !self.strengths.lock().unwrap().may_emit(&topic) {
          continue;
        }
        let value = rand::random::<u32>();
        let payload = format!("{topic}:{value}");
        self.fan_out.publish(&topic, &payload)?;

        let mut windows = self.windows.lock().unwrap();
        let window = windows
          .entry(topic.clone())
          .or_insert_with(|| Window::new(self.history_capacity));
        window.push(payload);
        let history_frame = window.to_history_frame(&topic);
        drop(windows);
        self.fan_out.publish(&topic, &history_frame)?;

        thread::sleep(DISSEMINATION_PACE);
      }
    }
    Ok(())
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
            warn!("publisher {}: register failed: {e}", self.identity);
          }
        }
        Event::DiscoveryLeaderChanged(None) => {}
        Event::PubsChanged(children) => {
          let mut peers = self.pre_existing_pubs.lock().unwrap();
          peers.retain(|p| children.contains(p));
          drop(peers);
          self.evaluate_strength()?;
        }
      }
    }
    Ok(())
  }

  fn teardown(&self) -> Result<()> {
    thread::sleep(Duration::from_millis(50));
    self
      .coord
      .delete(&model::discovery_pub_path(&self.identity))?;
    if let Some(req) = self.request.lock().unwrap().as_ref() {
      let bytes = req.request(&ControlCodec::encode_request(&ControlRequest::Deregister {
        role: Role::Publisher,
        id: self.identity.clone(),
        topics: self.topics.clone(),
      }))?;
      let _ = ControlCodec::decode_response(&bytes)?;
    }
    Ok(())
  }
}
