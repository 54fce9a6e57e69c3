//! Thin facade over the coordination service (§4.1): ephemeral znodes,
//! child watches, data watches, create/delete/get.

use std::{sync::Arc, time::Duration};

use log::debug;
use zookeeper::{Acl, CreateMode, ZkError, ZooKeeper, ZooKeeperExt};

use super::watch::{ChildCallback, DataCallback, RearmingWatcher, WatchRegistry};
use crate::error::{PubFabricError, Result};

const SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// No-op watcher used only to satisfy the session-level watcher argument
/// `ZooKeeper::connect` requires; all per-path watches are armed
/// individually through [`CoordClient::watch_data`] /
/// [`CoordClient::watch_children`].
struct NullWatcher;
impl zookeeper::Watcher for NullWatcher {
  fn handle(&self, _event: zookeeper::WatchedEvent) {}
}

pub struct CoordClient {
  zk: Arc<ZooKeeper>,
  registry: Arc<WatchRegistry>,
}

impl CoordClient {
  pub fn connect(hosts: &str) -> Result<Self> {
    debug!("CoordClient::connect - {hosts}");
    let zk = ZooKeeper::connect(hosts, SESSION_TIMEOUT, NullWatcher)?;
    Ok(Self {
      zk: Arc::new(zk),
      registry: Arc::new(WatchRegistry::default()),
    })
  }

  /// Recursively create `path`'s ancestors (and `path` itself) as
  /// persistent nodes if they do not already exist.
  pub fn ensure_path(&self, path: &str) -> Result<()> {
    self.zk.ensure_path(path)?;
    Ok(())
  }

  pub fn exists(&self, path: &str) -> Result<bool> {
    Ok(self.zk.exists(path, false)?.is_some())
  }

  /// Create an ephemeral znode at `path` with `data`. Fails with
  /// `ZkError::NodeExists` if another participant has already claimed it —
  /// callers use this to race for leader/lead-broker slots (§4.3, §4.4).
  pub fn create_ephemeral(&self, path: &str, data: &[u8]) -> Result<()> {
    self
      .zk
      .create(path, data.to_vec(), Acl::open_unsafe().clone(), CreateMode::Ephemeral)?;
    Ok(())
  }

  pub fn try_create_ephemeral(&self, path: &str, data: &[u8]) -> Result<bool> {
    match self.create_ephemeral(path, data) {
      Ok(()) => Ok(true),
      Err(PubFabricError::Coordination(ZkError::NodeExists)) => Ok(false),
      Err(e) => Err(e),
    }
  }

  pub fn delete(&self, path: &str) -> Result<()> {
    match self.zk.delete(path, None) {
      Ok(()) | Err(ZkError::NoNode) => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  pub fn get_children(&self, path: &str) -> Result<Vec<String>> {
    Ok(self.zk.get_children(path, false)?)
  }

  /// Recursively delete `path` and everything under it, depth-first. Used
  /// by the maintenance tool that resets coordination state between test
  /// runs; a missing `path` is not an error.
  pub fn delete_recursive(&self, path: &str) -> Result<()> {
    if !self.exists(path)? {
      return Ok(());
    }
    for child in self.get_children(path)? {
      self.delete_recursive(&format!("{path}/{child}"))?;
    }
    self.delete(path)
  }

  /// `(nil, nil)` in §4.1's terms is `None` here: the node has no data
  /// (or does not exist).
  pub fn get_data(&self, path: &str) -> Result<Option<Vec<u8>>> {
    match self.zk.get_data(path, false) {
      Ok((data, _stat)) => Ok(Some(data)),
      Err(ZkError::NoNode) => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  /// Arm a data watch on `path`. `callback` receives `None` when the node
  /// is gone (§4.1's "node gone" sentinel) and `Some(data)` otherwise. The
  /// watch is re-armed after every fire (§4.1).
  ///
  /// Built on `exists_w` rather than `get_data_w`: a data watch armed via
  /// `getData` only fires on a delete or a data change and cannot be set on
  /// a missing node at all (`getData` on an absent node is `NoNode`, with
  /// no watch left behind), so an absent→present transition — e.g. a fresh
  /// Discovery leader watching `/broker/leaders/lead-0` before any broker
  /// has claimed it, or any node watching a path across its own
  /// delete-then-recreate cycle — would otherwise never be observed.
  /// `existsWatch`-style watches fire on create, delete, *and* data change,
  /// so this is the one primitive that covers every transition in §4.1.
  ///
  /// If a zk-level watch is already armed for `path` (from an earlier call
  /// to this method), only the callback table is updated — arming a second
  /// zk watch on the same path would leave two live watchers dispatching
  /// the same callback on every future change.
  pub fn watch_data<F>(&self, path: &str, callback: F) -> Result<()>
  where
    F: Fn(Option<Vec<u8>>) + Send + Sync + 'static,
  {
    let callback: Arc<DataCallback> = Arc::new(callback);
    self.registry.set_data(path, Arc::clone(&callback));
    if !self.registry.mark_data_armed(path) {
      callback(self.get_data(path)?);
      return Ok(());
    }
    let watcher = RearmingWatcher {
      zk: Arc::clone(&self.zk),
      registry: Arc::clone(&self.registry),
    };
    match self.zk.exists_w(path, watcher)? {
      Some(_stat) => callback(self.get_data(path)?),
      None => callback(None),
    }
    Ok(())
  }

  /// Arm a child watch on `path`. The watch is re-armed after every fire
  /// (§4.1). As with `watch_data`, a second call on a path that already
  /// has a live zk watch only updates the callback table rather than
  /// arming a duplicate watcher.
  pub fn watch_children<F>(&self, path: &str, callback: F) -> Result<()>
  where
    F: Fn(Vec<String>) + Send + Sync + 'static,
  {
    let callback: Arc<ChildCallback> = Arc::new(callback);
    self.registry.set_children(path, Arc::clone(&callback));
    if !self.registry.mark_children_armed(path) {
      callback(self.get_children(path)?);
      return Ok(());
    }
    let watcher = RearmingWatcher {
      zk: Arc::clone(&self.zk),
      registry: Arc::clone(&self.registry),
    };
    let children = self.zk.get_children_w(path, watcher)?;
    callback(children);
    Ok(())
  }
}
