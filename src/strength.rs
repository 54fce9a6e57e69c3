//! Publisher ownership-strength protocol (§3, §4.5, §4.7).
//!
//! This implements the *corrected* semantics from §9 open question 2 (the
//! spec's preferred resolution): strength is recomputed from scratch on
//! every evaluation rather than accumulated, so a peer's return cannot
//! inflate a count that a departure already reduced.

use std::collections::HashMap;

/// `strength[T] = |{p in pre_existing_pubs : T in p.topics}|`, recomputed in
/// full by `evaluate`.
#[derive(Debug, Default, Clone)]
pub struct StrengthTable {
  strengths: HashMap<String, u32>,
}

impl StrengthTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Strength > 0 means "defer to others; do not emit" (§3).
  pub fn strength_of(&self, topic: &str) -> u32 {
    *self.strengths.get(topic).unwrap_or(&0)
  }

  pub fn may_emit(&self, topic: &str) -> bool {
    self.strength_of(topic) == 0
  }

  /// Recompute every topic's strength against the current set of
  /// pre-existing peers and their advertised topic lists.
  pub fn evaluate<'a>(
    &mut self,
    own_topics: &[String],
    peer_topic_lists: impl IntoIterator<Item = &'a [String]>,
  ) {
    let mut fresh: HashMap<String, u32> = own_topics.iter().map(|t| (t.clone(), 0)).collect();
    for peer_topics in peer_topic_lists {
      for topic in peer_topics {
        if let Some(count) = fresh.get_mut(topic) {
          *count += 1;
        }
      }
    }
    self.strengths = fresh;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;

  #[test]
  fn fresh_topics_start_at_zero() {
    let mut table = StrengthTable::new();
    table.evaluate(&["t1".to_string()], std::iter::empty());
    assert!(table.may_emit("t1"));
  }

  #[test_case(&[vec!["t1".to_string()]], 1 ; "single peer publishing t1")]
  #[test_case(&[vec!["t1".to_string()], vec!["t1".to_string(), "t2".to_string()]], 2 ; "two peers publishing t1")]
  #[test_case(&[vec!["t2".to_string()]], 0 ; "peer publishing unrelated topic")]
  fn counts_peers_advertising_topic(peer_lists: &[Vec<String>], expected: u32) {
    let mut table = StrengthTable::new();
    let borrowed: Vec<&[String]> = peer_lists.iter().map(|v| v.as_slice()).collect();
    table.evaluate(&["t1".to_string()], borrowed);
    assert_eq!(table.strength_of("t1"), expected);
  }

  #[test]
  fn re_evaluation_does_not_accumulate() {
    let mut table = StrengthTable::new();
    let peers_with = vec!["t1".to_string()];
    table.evaluate(&["t1".to_string()], vec![peers_with.as_slice()]);
    assert_eq!(table.strength_of("t1"), 1);
    // peer departs: re-evaluating against an empty peer set drops back to 0,
    // rather than staying at 1 (which an accumulate-only counter would do).
    table.evaluate(&["t1".to_string()], std::iter::empty());
    assert_eq!(table.strength_of("t1"), 0);
    assert!(table.may_emit("t1"));
  }
}
