//! Rust-native request/response types for the control channel, and the
//! length-delimited protobuf codec (§4.2) that (de)serializes them.

use prost::Message;

use super::proto;
use crate::error::{PubFabricError, Result};
use crate::model::{Identity, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
  Register {
    role: Role,
    id: Identity,
    topics: Vec<String>,
  },
  Deregister {
    role: Role,
    id: Identity,
    topics: Vec<String>,
  },
  LookupAllPubs,
  LookupPubByTopic {
    topics: Vec<String>,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlResponse {
  Register(std::result::Result<(), String>),
  Deregister(std::result::Result<(), String>),
  LookupAllPubs(Vec<Identity>),
  LookupPubByTopic(Vec<Identity>),
}

fn role_to_wire(role: Role) -> i32 {
  match role {
    Role::Publisher => proto::Role::Publisher as i32,
    Role::Subscriber => proto::Role::Subscriber as i32,
    Role::Broker => proto::Role::Broker as i32,
  }
}

fn role_from_wire(tag: i32) -> Result<Role> {
  match proto::Role::try_from(tag) {
    Ok(proto::Role::Publisher) => Ok(Role::Publisher),
    Ok(proto::Role::Subscriber) => Ok(Role::Subscriber),
    Ok(proto::Role::Broker) => Ok(Role::Broker),
    Err(_) => Err(PubFabricError::Protocol(format!(
      "unrecognized role tag {tag}"
    ))),
  }
}

fn identity_to_wire(id: &Identity) -> proto::Identity {
  proto::Identity {
    name: id.name.clone(),
    ip: id.ip.clone(),
    port: u32::from(id.port),
  }
}

fn identity_from_wire(id: proto::Identity) -> Result<Identity> {
  let port = u16::try_from(id.port)
    .map_err(|_| PubFabricError::Protocol(format!("port out of range: {}", id.port)))?;
  Ok(Identity::new(id.name, id.ip, port))
}

fn identity_from_wire_required(id: Option<proto::Identity>) -> Result<Identity> {
  identity_from_wire(id.ok_or_else(|| PubFabricError::Protocol("missing identity".into()))?)
}

fn result_to_wire(result: &std::result::Result<(), String>) -> (i32, String) {
  match result {
    Ok(()) => (proto::Result::Success as i32, String::new()),
    Err(reason) => (proto::Result::Failure as i32, reason.clone()),
  }
}

fn result_from_wire(tag: i32, fail_reason: String) -> std::result::Result<(), String> {
  match proto::Result::try_from(tag) {
    Ok(proto::Result::Success) => Ok(()),
    _ => Err(fail_reason),
  }
}

/// Stateless (de)serializer for the control channel. Every request/response
/// crosses the REQ/REP socket length-delimited (§4.2); decode failures
/// become `PubFabricError::Protocol`, never a panic.
pub struct ControlCodec;

impl ControlCodec {
  pub fn encode_request(req: &ControlRequest) -> Vec<u8> {
    let payload = match req {
      ControlRequest::Register { role, id, topics } => {
        proto::control_request::Payload::Register(proto::RegisterReq {
          role: role_to_wire(*role),
          id: Some(identity_to_wire(id)),
          topics: topics.clone(),
        })
      }
      ControlRequest::Deregister { role, id, topics } => {
        proto::control_request::Payload::Deregister(proto::DeregisterReq {
          role: role_to_wire(*role),
          id: Some(identity_to_wire(id)),
          topics: topics.clone(),
        })
      }
      ControlRequest::LookupAllPubs => {
        proto::control_request::Payload::LookupAllPubs(proto::LookupAllPubsReq {})
      }
      ControlRequest::LookupPubByTopic { topics } => {
        proto::control_request::Payload::LookupPubByTopic(proto::LookupPubByTopicReq {
          topics: topics.clone(),
        })
      }
    };
    let envelope = proto::ControlRequest {
      payload: Some(payload),
    };
    let mut buf = Vec::with_capacity(envelope.encoded_len());
    envelope
      .encode(&mut buf)
      .expect("encoding into a Vec<u8> cannot fail");
    buf
  }

  pub fn decode_request(bytes: &[u8]) -> Result<ControlRequest> {
    let envelope = proto::ControlRequest::decode(bytes)
      .map_err(|e| PubFabricError::Protocol(format!("malformed ControlRequest: {e}")))?;
    match envelope.payload {
      Some(proto::control_request::Payload::Register(r)) => Ok(ControlRequest::Register {
        role: role_from_wire(r.role)?,
        id: identity_from_wire_required(r.id)?,
        topics: r.topics,
      }),
      Some(proto::control_request::Payload::Deregister(r)) => Ok(ControlRequest::Deregister {
        role: role_from_wire(r.role)?,
        id: identity_from_wire_required(r.id)?,
        topics: r.topics,
      }),
      Some(proto::control_request::Payload::LookupAllPubs(_)) => Ok(ControlRequest::LookupAllPubs),
      Some(proto::control_request::Payload::LookupPubByTopic(r)) => {
        Ok(ControlRequest::LookupPubByTopic { topics: r.topics })
      }
      None => Err(PubFabricError::Protocol(
        "ControlRequest with empty payload".into(),
      )),
    }
  }

  pub fn encode_response(resp: &ControlResponse) -> Vec<u8> {
    let payload = match resp {
      ControlResponse::Register(result) => {
        let (result, fail_reason) = result_to_wire(result);
        proto::control_response::Payload::Register(proto::RegisterResp {
          result,
          fail_reason,
        })
      }
      ControlResponse::Deregister(result) => {
        let (result, fail_reason) = result_to_wire(result);
        proto::control_response::Payload::Deregister(proto::DeregisterResp {
          result,
          fail_reason,
        })
      }
      ControlResponse::LookupAllPubs(ids) => {
        proto::control_response::Payload::LookupAllPubs(proto::LookupAllPubsResp {
          publishers: ids.iter().map(identity_to_wire).collect(),
        })
      }
      ControlResponse::LookupPubByTopic(ids) => {
        proto::control_response::Payload::LookupPubByTopic(proto::LookupPubByTopicResp {
          publishers: ids.iter().map(identity_to_wire).collect(),
        })
      }
    };
    let envelope = proto::ControlResponse {
      payload: Some(payload),
    };
    let mut buf = Vec::with_capacity(envelope.encoded_len());
    envelope
      .encode(&mut buf)
      .expect("encoding into a Vec<u8> cannot fail");
    buf
  }

  pub fn decode_response(bytes: &[u8]) -> Result<ControlResponse> {
    let envelope = proto::ControlResponse::decode(bytes)
      .map_err(|e| PubFabricError::Protocol(format!("malformed ControlResponse: {e}")))?;
    match envelope.payload {
      Some(proto::control_response::Payload::Register(r)) => Ok(ControlResponse::Register(
        result_from_wire(r.result, r.fail_reason),
      )),
      Some(proto::control_response::Payload::Deregister(r)) => Ok(ControlResponse::Deregister(
        result_from_wire(r.result, r.fail_reason),
      )),
      Some(proto::control_response::Payload::LookupAllPubs(r)) => {
        let ids = r
          .publishers
          .into_iter()
          .map(identity_from_wire)
          .collect::<Result<Vec<_>>>()?;
        Ok(ControlResponse::LookupAllPubs(ids))
      }
      Some(proto::control_response::Payload::LookupPubByTopic(r)) => {
        let ids = r
          .publishers
          .into_iter()
          .map(identity_from_wire)
          .collect::<Result<Vec<_>>>()?;
        Ok(ControlResponse::LookupPubByTopic(ids))
      }
      None => Err(PubFabricError::Protocol(
        "ControlResponse with empty payload".into(),
      )),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn register_request_roundtrips() {
    let req = ControlRequest::Register {
      role: Role::Publisher,
      id: Identity::new("pub1", "10.0.0.5", 5555),
      topics: vec!["weather".into(), "traffic".into()],
    };
    let bytes = ControlCodec::encode_request(&req);
    assert_eq!(ControlCodec::decode_request(&bytes).unwrap(), req);
  }

  #[test]
  fn lookup_all_pubs_roundtrips() {
    let bytes = ControlCodec::encode_request(&ControlRequest::LookupAllPubs);
    assert_eq!(
      ControlCodec::decode_request(&bytes).unwrap(),
      ControlRequest::LookupAllPubs
    );
  }

  #[test]
  fn register_response_failure_carries_reason() {
    let resp = ControlResponse::Register(Err("topic already claimed".into()));
    let bytes = ControlCodec::encode_response(&resp);
    assert_eq!(ControlCodec::decode_response(&bytes).unwrap(), resp);
  }

  #[test]
  fn lookup_pub_by_topic_roundtrips() {
    let resp = ControlResponse::LookupPubByTopic(vec![
      Identity::new("pub1", "10.0.0.5", 5555),
      Identity::new("pub2", "10.0.0.6", 5556),
    ]);
    let bytes = ControlCodec::encode_response(&resp);
    assert_eq!(ControlCodec::decode_response(&bytes).unwrap(), resp);
  }

  #[test]
  fn decode_rejects_garbage() {
    let garbage = vec![0xff, 0x01, 0x02];
    assert!(ControlCodec::decode_request(&garbage).is_err());
  }

  #[test]
  fn decode_rejects_empty_payload() {
    let envelope = proto::ControlRequest { payload: None };
    let mut buf = Vec::new();
    envelope.encode(&mut buf).unwrap();
    assert!(ControlCodec::decode_request(&buf).is_err());
  }
}
