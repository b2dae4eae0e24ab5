//! devtmpfs: the `/dev` node table maintained by the driver core.
//!
//! References: <https://elixir.bootlin.com/linux/v6.6/source/drivers/base/devtmpfs.c>

use alloc::{collections::BTreeMap, format, string::String, vec::Vec};
use axerrno::LinuxError;
use kbindings::{S_IFCHR, dev_t, umode_t};
use spin::Mutex;

use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevNode {
    pub name: String,
    pub devt: dev_t,
    /// File type and permission bits.
    pub mode: umode_t,
}

impl DevNode {
    pub fn path(&self) -> String {
        format!("/dev/{}", self.name)
    }

    pub fn permissions(&self) -> umode_t {
        self.mode & 0o7777
    }
}

static NODES: Mutex<BTreeMap<String, DevNode>> = Mutex::new(BTreeMap::new());

pub(crate) fn create_node(name: &str, devt: dev_t, perm: umode_t) -> Result<()> {
    let mut nodes = NODES.lock();
    if nodes.contains_key(name) {
        return Err(LinuxError::EEXIST);
    }
    let node = DevNode {
        name: String::from(name),
        devt,
        mode: S_IFCHR | (perm & 0o7777),
    };
    log::debug!("devtmpfs: create {} mode {:o}", node.path(), node.mode);
    nodes.insert(node.name.clone(), node);
    Ok(())
}

pub(crate) fn delete_node(name: &str) -> Result<()> {
    NODES
        .lock()
        .remove(name)
        .map(|node| log::debug!("devtmpfs: delete {}", node.path()))
        .ok_or(LinuxError::ENOENT)
}

/// Looks up a node by `/dev/<name>` path or bare name.
pub fn lookup(path: &str) -> Option<DevNode> {
    let name = path.strip_prefix("/dev/").unwrap_or(path);
    NODES.lock().get(name).cloned()
}

pub fn nodes() -> Vec<DevNode> {
    NODES.lock().values().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chrdev::mkdev;

    #[test]
    fn test_create_lookup_delete() {
        let _guard = crate::testing::serial();
        create_node("devtmpfs-test", mkdev(240, 1), 0o666).unwrap();
        assert_eq!(create_node("devtmpfs-test", mkdev(240, 2), 0o600), Err(LinuxError::EEXIST));
        let node = lookup("/dev/devtmpfs-test").unwrap();
        assert_eq!(node, lookup("devtmpfs-test").unwrap());
        assert_eq!(node.devt, mkdev(240, 1));
        assert_eq!(node.mode, S_IFCHR | 0o666);
        assert_eq!(node.permissions(), 0o666);
        assert_eq!(node.path(), "/dev/devtmpfs-test");
        delete_node("devtmpfs-test").unwrap();
        assert!(lookup("/dev/devtmpfs-test").is_none());
        assert_eq!(delete_node("devtmpfs-test"), Err(LinuxError::ENOENT));
    }
}
