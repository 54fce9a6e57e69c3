use pubfabric::history::{HistoryFrame, Window};

#[test]
fn window_never_exceeds_capacity_across_many_pushes() {
  let mut window = Window::new(4);
  for i in 0..50 {
    window.push(format!("t1:{i}"));
    assert!(window.len() <= 4);
  }
  assert_eq!(window.items(), &["t1:46", "t1:47", "t1:48", "t1:49"]);
}

#[test]
fn history_frame_survives_a_broker_hop_and_back() {
  let mut window = Window::new(3);
  window.push("weather:10".into());
  window.push("weather:20".into());
  let frame = window.to_history_frame("weather");

  let rewritten = HistoryFrame::rewrite_for_broker(&frame, "10.0.0.9:5591");
  let parsed = HistoryFrame::parse(&rewritten).unwrap();

  assert_eq!(parsed.topic, "weather");
  assert_eq!(parsed.broker_addr.as_deref(), Some("10.0.0.9:5591"));
  assert_eq!(parsed.history_size, 3);
  assert_eq!(
    parsed.history,
    vec!["weather:10".to_string(), "weather:20".to_string()]
  );
}

#[test]
fn data_frames_never_misparse_as_history() {
  let frame = "weather:42";
  assert!(!HistoryFrame::looks_like_history(frame));
  assert_eq!(HistoryFrame::topic_of(frame), "weather");
}
