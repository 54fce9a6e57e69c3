//! Per-topic sliding publication history (§3, §4.5, §4.6) and the three
//! textual frame shapes on the fan-out/fan-in channel (§6):
//!
//! - data frame:                      `<topic>:<payload>`
//! - publisher history frame:         `<topic>:hs-<H>-hw-<history-list>`
//! - broker-rewritten history frame:  `<topic>:pi-<broker_ip>:<broker_port>-hs-<H>-hw-<history-list>`

use crate::error::{PubFabricError, Result};

/// Ordered sequence of the last `capacity` payloads published on one topic,
/// in emission order (§3 invariant 6).
#[derive(Debug, Clone)]
pub struct Window {
  capacity: usize,
  items: Vec<String>,
}

impl Window {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      items: Vec::with_capacity(capacity),
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn items(&self) -> &[String] {
    &self.items
  }

  /// Append a payload, popping the oldest entry first if already at
  /// capacity (§3 invariant 6: `len(history) <= H`). `capacity == 0`
  /// (accepted on the CLI as `--hs 0`) retains nothing rather than
  /// indexing into an empty `Vec`.
  pub fn push(&mut self, payload: String) {
    if self.capacity == 0 {
      return;
    }
    if self.items.len() >= self.capacity {
      self.items.remove(0);
    }
    self.items.push(payload);
  }

  /// Render the `hs-<H>-hw-<history-list>` suffix for this window.
  fn wire_suffix(&self) -> String {
    let joined = self
      .items
      .iter()
      .map(|s| format!("{s:?}"))
      .collect::<Vec<_>>()
      .join(", ");
    format!("hs-{}-hw-[{}]", self.capacity, joined)
  }

  /// Build the publisher-side history frame for `topic` (§6).
  pub fn to_history_frame(&self, topic: &str) -> String {
    format!("{topic}:{}", self.wire_suffix())
  }
}

/// A parsed history frame, decoded once from the brittle
/// `pi-X-hs-Y-hw-Z` wire format (§9 design note) rather than re-parsed by
/// string search at every use site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryFrame {
  pub topic: String,
  /// Present only on broker-rewritten frames (§4.4 step 4).
  pub broker_addr: Option<String>,
  pub history_size: usize,
  pub history: Vec<String>,
}

impl HistoryFrame {
  /// Is this textual frame a history frame at all? A subscriber-side frame
  /// is recognized by `pi-`/`-hs-`/`-hw-` (§4.6); a publisher-side (direct
  /// mode, no broker rewrite) frame only carries `hs-`/`-hw-` (§4.5, §4.4
  /// step 4's rewrite trigger).
  pub fn looks_like_history(frame: &str) -> bool {
    frame.contains("hs-") && frame.contains("-hw-")
  }

  pub fn is_broker_rewritten(frame: &str) -> bool {
    frame.contains("pi-") && frame.contains("-hs-") && frame.contains("-hw-")
  }

  /// Parse a data frame's topic prefix, shared by data and history frames.
  pub fn topic_of(frame: &str) -> &str {
    frame.split(':').next().unwrap_or("")
  }

  /// Insert `pi-<addr>-` immediately before the `hs-` marker, as a lead
  /// broker does when re-emitting a publisher's history frame (§4.4 step 4).
  pub fn rewrite_for_broker(frame: &str, broker_addr_port: &str) -> String {
    match frame.split_once("hs-") {
      Some((prefix, rest)) => format!("{prefix}pi-{broker_addr_port}-hs-{rest}"),
      None => frame.to_string(),
    }
  }

  /// Does this frame's advertised history depth satisfy a subscriber's
  /// `min_hist` requirement (§4.6, §4.7 subscriber state machine)?
  pub fn satisfies(&self, min_hist: usize) -> bool {
    self.history_size >= min_hist
  }

  /// Parse a (possibly broker-rewritten) history frame (§4.6 receive loop).
  pub fn parse(frame: &str) -> Result<Self> {
    let topic = Self::topic_of(frame).to_string();
    let broker_addr = if frame.contains("pi-") {
      Some(
        frame
          .split("pi-")
          .nth(1)
          .and_then(|rest| rest.split("-hs-").next())
          .ok_or_else(|| PubFabricError::Protocol(format!("malformed pi- marker: {frame}")))?
          .to_string(),
      )
    } else {
      None
    };
    let after_hs = frame
      .split("-hs-")
      .nth(1)
      .or_else(|| frame.split("hs-").nth(1))
      .ok_or_else(|| PubFabricError::Protocol(format!("missing hs- marker: {frame}")))?;
    let mut hs_parts = after_hs.splitn(2, "-hw-");
    let history_size: usize = hs_parts
      .next()
      .ok_or_else(|| PubFabricError::Protocol(format!("missing -hw- marker: {frame}")))?
      .parse()
      .map_err(|_| PubFabricError::Protocol(format!("malformed history size: {frame}")))?;
    let history_list = hs_parts
      .next()
      .ok_or_else(|| PubFabricError::Protocol(format!("missing history list: {frame}")))?;
    let history = parse_history_list(history_list);
    Ok(Self {
      topic,
      broker_addr,
      history_size,
      history,
    })
  }
}

/// Parse the bracketed, comma-separated, quoted list emitted by
/// `Window::wire_suffix`.
fn parse_history_list(raw: &str) -> Vec<String> {
  let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
  if trimmed.is_empty() {
    return Vec::new();
  }
  trimmed
    .split("\", \"")
    .map(|s| s.trim_matches('"').to_string())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_capacity_window_never_panics_and_stays_empty() {
    let mut w = Window::new(0);
    for i in 0..5 {
      w.push(format!("t1:{i}"));
    }
    assert!(w.is_empty());
    assert_eq!(w.to_history_frame("t1"), "t1:hs-0-hw-[]");
  }

  #[test]
  fn window_caps_at_capacity() {
    let mut w = Window::new(3);
    for i in 0..5 {
      w.push(format!("t1:{i}"));
    }
    assert_eq!(w.len(), 3);
    assert_eq!(w.items(), &["t1:2", "t1:3", "t1:4"]);
  }

  #[test]
  fn history_frame_roundtrip() {
    let mut w = Window::new(2);
    w.push("t1:a".into());
    w.push("t1:b".into());
    let frame = w.to_history_frame("t1");
    assert!(HistoryFrame::looks_like_history(&frame));
    assert!(!HistoryFrame::is_broker_rewritten(&frame));
    let parsed = HistoryFrame::parse(&frame).unwrap();
    assert_eq!(parsed.topic, "t1");
    assert_eq!(parsed.history_size, 2);
    assert_eq!(parsed.history, vec!["t1:a".to_string(), "t1:b".to_string()]);
    assert!(parsed.broker_addr.is_none());
  }

  #[test]
  fn broker_rewrite_then_parse() {
    let mut w = Window::new(1);
    w.push("t2:x".into());
    let frame = w.to_history_frame("t2");
    let rewritten = HistoryFrame::rewrite_for_broker(&frame, "10.0.0.3:5581");
    assert!(HistoryFrame::is_broker_rewritten(&rewritten));
    let parsed = HistoryFrame::parse(&rewritten).unwrap();
    assert_eq!(parsed.broker_addr.as_deref(), Some("10.0.0.3:5581"));
    assert_eq!(parsed.history_size, 1);
  }

  #[test]
  fn data_frame_is_not_history() {
    assert!(!HistoryFrame::looks_like_history("t1:42"));
  }
}
