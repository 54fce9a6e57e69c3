//! Re-arming watch dispatch.
//!
//! The underlying `zookeeper` crate's watches are one-shot: a `Watcher`
//! fires once and must be explicitly re-registered to see the next change.
//! §4.1 requires every data/child watch to observe *every* transition, so
//! [`CoordClient`](super::client::CoordClient) re-arms from inside the fired
//! watch before invoking the caller's callback.

use std::{
  collections::{HashMap, HashSet},
  sync::{Arc, Mutex},
};

use log::{error, warn};
use zookeeper::{WatchedEvent, WatchedEventType, Watcher, ZooKeeper};

pub type DataCallback = dyn Fn(Option<Vec<u8>>) + Send + Sync;
pub type ChildCallback = dyn Fn(Vec<String>) + Send + Sync;

#[derive(Default)]
pub(crate) struct WatchRegistry {
  data: Mutex<HashMap<String, Arc<DataCallback>>>,
  children: Mutex<HashMap<String, Arc<ChildCallback>>>,
  /// Paths with a live zk-level data/children watch already armed, so a
  /// second `watch_data`/`watch_children` call on the same path updates the
  /// callback table instead of registering a second zk watcher that would
  /// dispatch the same callback twice per change.
  data_armed: Mutex<HashSet<String>>,
  children_armed: Mutex<HashSet<String>>,
}

impl WatchRegistry {
  pub(crate) fn set_data(&self, path: &str, callback: Arc<DataCallback>) {
    self.data.lock().unwrap().insert(path.to_string(), callback);
  }

  pub(crate) fn data_callback(&self, path: &str) -> Option<Arc<DataCallback>> {
    self.data.lock().unwrap().get(path).cloned()
  }

  /// Returns `true` the first time `path` is marked (caller should arm the
  /// zk watch), `false` if it was already armed (caller should not).
  pub(crate) fn mark_data_armed(&self, path: &str) -> bool {
    self.data_armed.lock().unwrap().insert(path.to_string())
  }

  pub(crate) fn set_children(&self, path: &str, callback: Arc<ChildCallback>) {
    self
      .children
      .lock()
      .unwrap()
      .insert(path.to_string(), callback);
  }

  pub(crate) fn children_callback(&self, path: &str) -> Option<Arc<ChildCallback>> {
    self.children.lock().unwrap().get(path).cloned()
  }

  pub(crate) fn mark_children_armed(&self, path: &str) -> bool {
    self
      .children_armed
      .lock()
      .unwrap()
      .insert(path.to_string())
  }
}

/// Dispatches a fired watch event back through [`WatchRegistry`], re-arms
/// the watch on the live `ZooKeeper` session, and invokes the callback.
/// Any failure to re-fetch data/children or to re-arm is treated per §7: it
/// is logged and, since it means our view of the coordination namespace can
/// no longer be trusted, the process aborts.
pub(crate) struct RearmingWatcher {
  pub(crate) zk: Arc<ZooKeeper>,
  pub(crate) registry: Arc<WatchRegistry>,
}

impl Watcher for RearmingWatcher {
  fn handle(&self, event: WatchedEvent) {
    let Some(path) = event.path else { return };
    match event.event_type {
      WatchedEventType::NodeDataChanged
      | WatchedEventType::NodeCreated
      | WatchedEventType::NodeDeleted => {
        self.rearm_and_fire_data(&path);
      }
      WatchedEventType::NodeChildrenChanged => {
        self.rearm_and_fire_children(&path);
      }
      _ => {}
    }
  }
}

impl RearmingWatcher {
  /// Re-arms `path`'s data watch via `exists_w` rather than `get_data_w`:
  /// an `exists` watch fires on create, delete, *and* data change, so it is
  /// the only primitive that can be re-armed on a node that is currently
  /// absent and still observe that node's next creation (§4.1's
  /// "re-armed after each fire" requirement holds for every transition,
  /// not just the ones where the node happens to exist right now).
  fn rearm_and_fire_data(&self, path: &str) {
    let Some(cb) = self.registry.data_callback(path) else {
      return;
    };
    let next = Arc::new(RearmingWatcher {
      zk: Arc::clone(&self.zk),
      registry: Arc::clone(&self.registry),
    });
    match self.zk.exists_w(path, (*next).clone_watcher()) {
      Ok(Some(_stat)) => match self.zk.get_data(path, false) {
        Ok((data, _stat)) => cb(Some(data)),
        Err(zookeeper::ZkError::NoNode) => cb(None),
        Err(e) => {
          error!("coord watch: failed to read data on {path} after rearm: {e}");
          std::process::exit(1);
        }
      },
      Ok(None) => cb(None),
      Err(e) => {
        error!("coord watch: failed to re-arm data watch on {path}: {e}");
        std::process::exit(1);
      }
    }
  }

  fn rearm_and_fire_children(&self, path: &str) {
    let Some(cb) = self.registry.children_callback(path) else {
      return;
    };
    let next = Arc::new(RearmingWatcher {
      zk: Arc::clone(&self.zk),
      registry: Arc::clone(&self.registry),
    });
    match self.zk.get_children_w(path, (*next).clone_watcher()) {
      Ok(children) => cb(children),
      Err(e) => {
        warn!("coord watch: failed to re-arm children watch on {path}: {e}");
      }
    }
  }

  /// `zookeeper::Watcher` values are consumed by the register call; this
  /// produces a fresh handle sharing the same registry and session.
  fn clone_watcher(&self) -> RearmingWatcher {
    RearmingWatcher {
      zk: Arc::clone(&self.zk),
      registry: Arc::clone(&self.registry),
    }
  }
}
