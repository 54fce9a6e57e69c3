use pubfabric::history::{HistoryFrame, Window};

#[test]
fn meets_min_hist_when_advertised_depth_is_at_least_the_requirement() {
  let mut window = Window::new(10);
  for i in 0..10 {
    window.push(format!("t1:{i}"));
  }
  let frame = HistoryFrame::parse(&window.to_history_frame("t1")).unwrap();
  assert!(frame.satisfies(10));
  assert!(frame.satisfies(5));
}

#[test]
fn rejects_when_advertised_depth_is_below_the_requirement() {
  // Mirrors S5: publisher H=5, subscriber min_hist=20.
  let mut window = Window::new(5);
  for i in 0..5 {
    window.push(format!("t1:{i}"));
  }
  let frame = HistoryFrame::parse(&window.to_history_frame("t1")).unwrap();
  assert!(!frame.satisfies(20));
}

#[test]
fn broker_rewritten_frame_exposes_the_origin_for_disconnect() {
  let mut window = Window::new(3);
  window.push("t1:a".into());
  let raw = window.to_history_frame("t1");
  let rewritten = HistoryFrame::rewrite_for_broker(&raw, "10.0.0.2:5580");
  let frame = HistoryFrame::parse(&rewritten).unwrap();

  assert!(!frame.satisfies(10));
  assert_eq!(frame.broker_addr.as_deref(), Some("10.0.0.2:5580"));
}

#[test]
fn direct_mode_frame_has_no_broker_address_to_disconnect_from() {
  let mut window = Window::new(3);
  window.push("t1:a".into());
  let frame = HistoryFrame::parse(&window.to_history_frame("t1")).unwrap();
  assert!(frame.broker_addr.is_none());
}
