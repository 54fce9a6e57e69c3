//! The coordination namespace and participant data model of §3.

use std::fmt;

use crate::error::{PubFabricError, Result};

/// A participant role, mirrored from the wire enum in `wire::codec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
  Publisher,
  Subscriber,
  Broker,
}

/// (name, ip, port) — unique per role. Rendered to/parsed from the
/// `name:ip:port` znode-name convention used under `/discovery/pubs`,
/// `/discovery/subs`, `/broker/backups`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
  pub name: String,
  pub ip: String,
  pub port: u16,
}

impl Identity {
  pub fn new(name: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
    Self {
      name: name.into(),
      ip: ip.into(),
      port,
    }
  }

  /// `tcp://<ip>:<port>` connect string for this identity's socket.
  pub fn tcp_addr(&self) -> String {
    format!("tcp://{}:{}", self.ip, self.port)
  }

  /// `<ip>:<port>` bind string (no scheme), used for `/discovery/leader` and
  /// `/broker/leaders/lead-<i>` znode values.
  pub fn addr_port(&self) -> String {
    format!("{}:{}", self.ip, self.port)
  }

  /// Parse a `name:ip:port` znode child name, as produced by
  /// `znode_child_name`. Used to compare a live child list against an
  /// in-memory registration list (§4.3 membership callbacks).
  pub fn parse_child_name(child: &str) -> Result<Self> {
    let mut parts = child.splitn(3, ':');
    let (name, ip, port) = match (parts.next(), parts.next(), parts.next()) {
      (Some(name), Some(ip), Some(port)) => (name, ip, port),
      _ => {
        return Err(PubFabricError::Protocol(format!(
          "malformed znode child name: {child}"
        )))
      }
    };
    let port: u16 = port
      .parse()
      .map_err(|_| PubFabricError::Protocol(format!("malformed port in child name: {child}")))?;
    Ok(Self::new(name, ip, port))
  }

  /// `name:ip:port`, the znode-child-name encoding of this identity.
  pub fn znode_child_name(&self) -> String {
    format!("{}:{}:{}", self.name, self.ip, self.port)
  }
}

impl fmt::Display for Identity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} - {}:{}", self.name, self.ip, self.port)
  }
}

/// Held only by the current lead Discovery node; never persisted (§3).
#[derive(Debug, Clone)]
pub struct RegistrationRecord {
  pub role: Role,
  pub identity: Identity,
  pub topics: Vec<String>,
}

impl RegistrationRecord {
  pub fn new(role: Role, identity: Identity, topics: Vec<String>) -> Self {
    Self {
      role,
      identity,
      topics,
    }
  }

  pub fn matches_topics(&self, requested: &[String]) -> bool {
    self.topics.iter().any(|t| requested.contains(t))
  }
}

// -- Coordination namespace paths (§3) --------------------------------------

pub fn discovery_root() -> &'static str {
  "/discovery"
}

pub fn discovery_leader_path() -> &'static str {
  "/discovery/leader"
}

pub fn discovery_backup_path(addr_port: &str) -> String {
  format!("/discovery/backup-{addr_port}")
}

pub fn discovery_pubs_root() -> &'static str {
  "/discovery/pubs"
}

pub fn discovery_pub_path(identity: &Identity) -> String {
  format!("/discovery/pubs/{}", identity.znode_child_name())
}

pub fn discovery_subs_root() -> &'static str {
  "/discovery/subs"
}

pub fn discovery_sub_path(identity: &Identity) -> String {
  format!("/discovery/subs/{}", identity.znode_child_name())
}

pub fn broker_leaders_root() -> &'static str {
  "/broker/leaders"
}

pub fn broker_lead_path(index: usize) -> String {
  format!("/broker/leaders/lead-{index}")
}

pub fn broker_backups_root() -> &'static str {
  "/broker/backups"
}

pub fn broker_backup_path(addr_port: &str) -> String {
  format!("/broker/backups/backup-{addr_port}")
}

/// Parse the trailing index out of a `lead-<index>` znode child name.
pub fn parse_lead_index(child: &str) -> Option<usize> {
  child.strip_prefix("lead-").and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn roundtrips_znode_child_name() {
    let id = Identity::new("pub1", "10.0.0.7", 5571);
    let child = id.znode_child_name();
    assert_eq!(child, "pub1:10.0.0.7:5571");
    let parsed = Identity::parse_child_name(&child).unwrap();
    assert_eq!(parsed, id);
  }

  #[test]
  fn rejects_malformed_child_name() {
    assert!(Identity::parse_child_name("pub1:only-ip").is_err());
  }

  #[test]
  fn parses_lead_index() {
    assert_eq!(parse_lead_index("lead-3"), Some(3));
    assert_eq!(parse_lead_index("backup-x"), None);
  }
}
