//! Thin wrappers over the request/reply and publish/subscribe socket
//! patterns used for the control and data planes (§4.2, §5).

use log::trace;

use crate::error::Result;

/// A strict lock-step REQ socket: every `request` must be answered before
/// another `request` is issued, matching the request/reply discipline of
/// §4.2. The wrapped socket is `zmq::REQ`. Every node reconnects this
/// socket to the current lead Discovery's address on every leader-watch
/// fire (§4.3 step 1, §4.5 step 4, §4.6 step 2), so `reconnect` tears down
/// the previous endpoint first.
pub struct RequestSocket {
  socket: zmq::Socket,
  endpoint: std::sync::Mutex<Option<String>>,
}

impl RequestSocket {
  pub fn new(ctx: &zmq::Context) -> Result<Self> {
    Ok(Self {
      socket: ctx.socket(zmq::REQ)?,
      endpoint: std::sync::Mutex::new(None),
    })
  }

  pub fn connect(ctx: &zmq::Context, endpoint: &str) -> Result<Self> {
    let socket = Self::new(ctx)?;
    socket.reconnect(endpoint)?;
    Ok(socket)
  }

  /// Disconnect from the previous endpoint, if any, and connect to the new
  /// one.
  pub fn reconnect(&self, endpoint: &str) -> Result<()> {
    let mut current = self.endpoint.lock().unwrap();
    if let Some(old) = current.as_deref() {
      if old == endpoint {
        return Ok(());
      }
      let _ = self.socket.disconnect(old);
    }
    self.socket.connect(endpoint)?;
    *current = Some(endpoint.to_string());
    Ok(())
  }

  pub fn request(&self, bytes: &[u8]) -> Result<Vec<u8>> {
    trace!("REQ -> {} bytes", bytes.len());
    self.socket.send(bytes, 0)?;
    let reply = self.socket.recv_bytes(0)?;
    trace!("REQ <- {} bytes", reply.len());
    Ok(reply)
  }
}

/// The server side of the request/reply pattern. The wrapped socket is
/// `zmq::REP`.
pub struct ReplySocket {
  socket: zmq::Socket,
}

impl ReplySocket {
  pub fn bind(ctx: &zmq::Context, endpoint: &str) -> Result<Self> {
    let socket = ctx.socket(zmq::REP)?;
    socket.bind(endpoint)?;
    Ok(Self { socket })
  }

  /// Block until a request arrives.
  pub fn recv(&self) -> Result<Vec<u8>> {
    Ok(self.socket.recv_bytes(0)?)
  }

  /// Poll for a request with a timeout in milliseconds; `Ok(None)` on
  /// timeout so callers can interleave other work in their poll loop.
  pub fn poll_recv(&self, timeout_ms: i64) -> Result<Option<Vec<u8>>> {
    let mut items = [self.socket.as_poll_item(zmq::POLLIN)];
    let ready = zmq::poll(&mut items, timeout_ms)?;
    if ready == 0 || !items[0].is_readable() {
      return Ok(None);
    }
    Ok(Some(self.socket.recv_bytes(0)?))
  }

  pub fn reply(&self, bytes: &[u8]) -> Result<()> {
    self.socket.send(bytes, 0)?;
    Ok(())
  }
}

/// Publish side of the data plane (§5). The wrapped socket is `zmq::PUB`.
pub struct PublishSocket {
  socket: zmq::Socket,
}

impl PublishSocket {
  pub fn bind(ctx: &zmq::Context, endpoint: &str) -> Result<Self> {
    let socket = ctx.socket(zmq::PUB)?;
    socket.bind(endpoint)?;
    Ok(Self { socket })
  }

  /// Used by brokers forwarding a publisher's stream: they connect
  /// upstream rather than bind (§4.4).
  pub fn connect(ctx: &zmq::Context, endpoint: &str) -> Result<Self> {
    let socket = ctx.socket(zmq::PUB)?;
    socket.connect(endpoint)?;
    Ok(Self { socket })
  }

  /// Multipart send: topic frame, then data frame, matching the
  /// subscription-filter convention in §5.
  pub fn publish(&self, topic: &str, frame: &str) -> Result<()> {
    self.socket.send(topic, zmq::SNDMORE)?;
    self.socket.send(frame, 0)?;
    Ok(())
  }
}

/// Subscribe side of the data plane (§5). The wrapped socket is `zmq::SUB`.
pub struct SubscribeSocket {
  socket: zmq::Socket,
}

impl SubscribeSocket {
  pub fn new(ctx: &zmq::Context) -> Result<Self> {
    Ok(Self {
      socket: ctx.socket(zmq::SUB)?,
    })
  }

  pub fn connect(ctx: &zmq::Context, endpoint: &str) -> Result<Self> {
    let socket = Self::new(ctx)?;
    socket.connect_to(endpoint)?;
    Ok(socket)
  }

  /// Add an outgoing connection to `endpoint`; a fan-in socket may have
  /// several of these simultaneously (one per upstream publisher/broker).
  pub fn connect_to(&self, endpoint: &str) -> Result<()> {
    self.socket.connect(endpoint)?;
    Ok(())
  }

  pub fn disconnect_from(&self, endpoint: &str) -> Result<()> {
    self.socket.disconnect(endpoint)?;
    Ok(())
  }

  pub fn subscribe(&self, topic: &str) -> Result<()> {
    self.socket.set_subscribe(topic.as_bytes())?;
    Ok(())
  }

  pub fn unsubscribe(&self, topic: &str) -> Result<()> {
    self.socket.set_unsubscribe(topic.as_bytes())?;
    Ok(())
  }

  /// Blocking receive of a (topic, frame) pair.
  pub fn recv(&self) -> Result<(String, String)> {
    let topic = self.socket.recv_string(0)?.unwrap_or_default();
    let frame = self.socket.recv_string(0)?.unwrap_or_default();
    Ok((topic, frame))
  }

  pub fn poll_recv(&self, timeout_ms: i64) -> Result<Option<(String, String)>> {
    let mut items = [self.socket.as_poll_item(zmq::POLLIN)];
    let ready = zmq::poll(&mut items, timeout_ms)?;
    if ready == 0 || !items[0].is_readable() {
      return Ok(None);
    }
    Ok(Some(self.recv()?))
  }
}
