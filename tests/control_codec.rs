use pubfabric::model::{Identity, Role};
use pubfabric::wire::{ControlCodec, ControlRequest, ControlResponse};

#[test]
fn deregister_request_roundtrips() {
  let req = ControlRequest::Deregister {
    role: Role::Subscriber,
    id: Identity::new("sub1", "10.0.0.8", 5601),
    topics: vec!["t1".into()],
  };
  let bytes = ControlCodec::encode_request(&req);
  assert_eq!(ControlCodec::decode_request(&bytes).unwrap(), req);
}

#[test]
fn lookup_all_pubs_empty_response_roundtrips() {
  let resp = ControlResponse::LookupAllPubs(Vec::new());
  let bytes = ControlCodec::encode_response(&resp);
  assert_eq!(ControlCodec::decode_response(&bytes).unwrap(), resp);
}

#[test]
fn broker_role_survives_the_wire() {
  let req = ControlRequest::Register {
    role: Role::Broker,
    id: Identity::new("b1", "10.0.0.4", 5588),
    topics: vec![],
  };
  let bytes = ControlCodec::encode_request(&req);
  match ControlCodec::decode_request(&bytes).unwrap() {
    ControlRequest::Register { role: Role::Broker, id, .. } => {
      assert_eq!(id.name, "b1");
    }
    other => panic!("unexpected decode: {other:?}"),
  }
}

#[test]
fn response_decode_rejects_truncated_bytes() {
  let resp = ControlResponse::Register(Ok(()));
  let mut bytes = ControlCodec::encode_response(&resp);
  bytes.truncate(bytes.len() / 2);
  assert!(ControlCodec::decode_response(&bytes).is_err());
}
