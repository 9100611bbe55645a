//! Object manager adapter.
//!
//! A two-state machine. While `Active`, every object created or removed at
//! or below the root produces an `InterfacesAdded`/`InterfacesRemoved`
//! notification, and the managed-objects view is recomputed from the
//! registry on every request.

use std::collections::BTreeMap;

use crate::notify::{InterfaceSnapshot, Notification};
use crate::object::MockObject;
use crate::path::ObjectPath;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ObjectManager {
    #[default]
    Inactive,
    Active { root: ObjectPath },
}

impl ObjectManager {
    pub fn is_active(&self) -> bool {
        matches!(self, ObjectManager::Active { .. })
    }

    pub fn root(&self) -> Option<&ObjectPath> {
        match self {
            ObjectManager::Active { root } => Some(root),
            ObjectManager::Inactive => None,
        }
    }

    /// Whether changes at `path` are reported by this manager.
    pub fn covers(&self, path: &ObjectPath) -> bool {
        self.root().is_some_and(|root| path.has_prefix(root))
    }

    pub(crate) fn object_added(&self, object: &MockObject) -> Option<Notification> {
        let root = self.root()?;
        self.covers(object.path())
            .then(|| Notification::InterfacesAdded {
                root: root.clone(),
                object: object.path().clone(),
                interfaces: object.snapshot(),
            })
    }

    pub(crate) fn object_removed(&self, object: &MockObject) -> Option<Notification> {
        let root = self.root()?;
        self.covers(object.path())
            .then(|| Notification::InterfacesRemoved {
                root: root.clone(),
                object: object.path().clone(),
                interfaces: object.snapshot().into_keys().collect(),
            })
    }

    /// The managed-objects view over `objects`; empty while inactive.
    pub fn managed_objects<'a>(
        &self,
        objects: impl IntoIterator<Item = &'a MockObject>,
    ) -> BTreeMap<ObjectPath, InterfaceSnapshot> {
        if !self.is_active() {
            return BTreeMap::new();
        }
        objects
            .into_iter()
            .filter(|object| self.covers(object.path()))
            .map(|object| (object.path().clone(), object.snapshot()))
            .collect()
    }
}
