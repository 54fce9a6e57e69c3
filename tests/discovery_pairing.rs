use pubfabric::config::DisseminationStrategy;
use pubfabric::discovery::Registry;
use pubfabric::model::{Identity, RegistrationRecord, Role};

fn pub_record(name: &str, topics: &[&str]) -> RegistrationRecord {
  RegistrationRecord::new(
    Role::Publisher,
    Identity::new(name, "10.0.0.5", 5555),
    topics.iter().map(|t| t.to_string()).collect(),
  )
}

#[test]
fn free_pool_and_paired_pool_partition_all_publishers() {
  let mut registry = Registry::new();
  registry.register(pub_record("pub1", &["t1"]));
  registry.register(pub_record("pub2", &["t2"]));
  registry.register(pub_record("pub3", &["t3"]));

  registry.lookup_all_pubs();
  assert_eq!(registry.pubs().len() + registry.paired_pubs().len(), 3);

  registry.lookup_all_pubs();
  assert_eq!(registry.pubs().len() + registry.paired_pubs().len(), 3);
  assert_eq!(registry.paired_pubs().len(), 2);
}

#[test]
fn a_second_lookup_on_an_exhausted_pool_returns_empty_and_does_not_mutate() {
  let mut registry = Registry::new();
  registry.register(pub_record("pub1", &["t1"]));
  registry.lookup_all_pubs();
  assert!(registry.pubs().is_empty());

  let second = registry.lookup_all_pubs();
  assert!(second.is_empty());
  assert_eq!(registry.paired_pubs().len(), 1);
}

#[test]
fn lead_zero_death_returns_its_pair_to_the_front_of_the_free_pool() {
  let mut registry = Registry::new();
  registry.register(pub_record("pub1", &["t1"]));
  registry.register(pub_record("pub2", &["t2"]));
  registry.lookup_all_pubs();
  registry.lookup_all_pubs();
  assert!(registry.pubs().is_empty());
  assert_eq!(registry.paired_pubs().len(), 2);

  registry.on_broker_primary_gone();
  assert_eq!(registry.pubs().len(), 1);
  assert_eq!(registry.paired_pubs().len(), 1);
}

#[test]
fn direct_mode_never_returns_a_publisher_missing_the_topic() {
  let mut registry = Registry::new();
  registry.register(pub_record("pub1", &["t1", "t2"]));
  registry.register(pub_record("pub2", &["t3"]));

  let result = registry.lookup_pub_by_topic(DisseminationStrategy::Direct, &["t2".to_string()]);
  assert_eq!(result.len(), 1);
  assert_eq!(result[0].name, "pub1");
}
