use pubfabric::strength::StrengthTable;

#[test]
fn overlapping_publisher_defers_until_the_incumbent_leaves() {
  // Mirrors S4: pubA publishes {t1} first; pubB starts later with {t1, t2}.
  let mut strengths = StrengthTable::new();
  let pub_b_topics = vec!["t1".to_string(), "t2".to_string()];
  let pub_a_topics = vec!["t1".to_string()];

  strengths.evaluate(&pub_b_topics, vec![pub_a_topics.as_slice()]);
  assert!(!strengths.may_emit("t1"), "pubB must defer on t1 while pubA is present");
  assert!(strengths.may_emit("t2"), "pubB has no contention on t2");

  // pubA exits: re-evaluating against an empty peer set lets pubB emit t1.
  strengths.evaluate(&pub_b_topics, std::iter::empty());
  assert!(strengths.may_emit("t1"));
}

#[test]
fn strength_counts_every_peer_advertising_the_topic() {
  let mut strengths = StrengthTable::new();
  let peers = vec![
    vec!["t1".to_string()],
    vec!["t1".to_string(), "t3".to_string()],
    vec!["t2".to_string()],
  ];
  let borrowed: Vec<&[String]> = peers.iter().map(|v| v.as_slice()).collect();
  strengths.evaluate(&["t1".to_string()], borrowed);
  assert_eq!(strengths.strength_of("t1"), 2);
}
