//! Object registry: every mock object of one server, keyed by path.
//!
//! The registry also owns the object manager state, so the managed-objects
//! view and the add/remove notifications are derived from the same data
//! under the same lock.

use std::collections::BTreeMap;

use crate::manager::ObjectManager;
use crate::notify::{InterfaceSnapshot, Notification};
use crate::object::MockObject;
use crate::path::ObjectPath;
use crate::value::Value;
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct Registry {
    objects: BTreeMap<ObjectPath, MockObject>,
    manager: ObjectManager,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manager(&self) -> &ObjectManager {
        &self.manager
    }

    /// Bind the object manager to `root`, which must exist.
    pub fn enable_object_manager(&mut self, root: ObjectPath) -> Result<()> {
        self.lookup(&root)?;
        self.manager = ObjectManager::Active { root };
        Ok(())
    }

    pub fn disable_object_manager(&mut self) {
        self.manager = ObjectManager::Inactive;
    }

    /// Insert a new object.
    pub fn create(&mut self, object: MockObject) -> Result<Vec<Notification>> {
        if self.objects.contains_key(object.path()) {
            return Err(Error::DuplicatePath(object.path().to_string()));
        }
        let notifications = self.manager.object_added(&object).into_iter().collect();
        self.objects.insert(object.path().clone(), object);
        Ok(notifications)
    }

    /// Remove an object and, with `cascade`, everything below it.
    ///
    /// Descendants go innermost first; notifications follow removal order.
    pub fn remove(&mut self, path: &ObjectPath, cascade: bool) -> Result<Vec<Notification>> {
        self.lookup(path)?;
        let mut doomed: Vec<ObjectPath> = self
            .objects
            .keys()
            .filter(|p| p.is_descendant_of(path))
            .cloned()
            .collect();

        if !doomed.is_empty() && !cascade {
            return Err(Error::HasChildren {
                path: path.to_string(),
                children: doomed.iter().map(ToString::to_string).collect(),
            });
        }

        // deepest first; reverse path order breaks ties deterministically
        doomed.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| b.cmp(a)));
        doomed.push(path.clone());

        let mut notifications = Vec::new();
        for p in doomed {
            if let Some(object) = self.objects.remove(&p) {
                notifications.extend(self.manager.object_removed(&object));
            }
        }
        // the manager cannot outlive its root
        if self.manager.root().is_some_and(|root| !self.objects.contains_key(root)) {
            self.manager = ObjectManager::Inactive;
        }
        Ok(notifications)
    }

    pub fn lookup(&self, path: &ObjectPath) -> Result<&MockObject> {
        self.objects
            .get(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    pub fn lookup_mut(&mut self, path: &ObjectPath) -> Result<&mut MockObject> {
        self.objects
            .get_mut(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    pub fn contains(&self, path: &ObjectPath) -> bool {
        self.objects.contains_key(path)
    }

    /// All paths in order.
    pub fn paths(&self) -> Vec<ObjectPath> {
        self.objects.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Names of the nodes directly below `path`, sorted and unique.
    ///
    /// A node exists for every path that is a prefix of some object, so
    /// `/a/b/c` alone makes `b` a child of `/a`.
    pub fn child_nodes(&self, path: &ObjectPath) -> Vec<String> {
        let mut names: Vec<String> = self
            .objects
            .keys()
            .filter_map(|p| p.child_name_under(path))
            .map(str::to_string)
            .collect();
        names.dedup();
        names
    }

    /// Set a property through the bus `Set` semantics.
    ///
    /// While the object manager covers `path`, the change is always
    /// announced, even if the caller asked for silence.
    pub fn set_property(
        &mut self,
        path: &ObjectPath,
        interface: &str,
        name: &str,
        value: Value,
        notify: bool,
    ) -> Result<Vec<Notification>> {
        let notify = notify || self.manager.covers(path);
        let object = self.lookup_mut(path)?;
        Ok(object
            .set_property(interface, name, value, notify)?
            .into_iter()
            .collect())
    }

    /// Overwrite several existing properties, ignoring access modes.
    pub fn update_properties(
        &mut self,
        path: &ObjectPath,
        interface: &str,
        values: Vec<(String, Value)>,
    ) -> Result<Vec<Notification>> {
        let object = self.lookup_mut(path)?;
        Ok(object
            .update_properties(interface, values, false)?
            .into_iter()
            .collect())
    }

    /// The managed-objects view at this instant.
    pub fn managed_objects(&self) -> BTreeMap<ObjectPath, InterfaceSnapshot> {
        self.manager.managed_objects(self.objects.values())
    }

    /// Drop every object except `keep`, returning the removal notifications.
    pub(crate) fn retain_only(&mut self, keep: &ObjectPath) -> Vec<Notification> {
        let doomed: Vec<ObjectPath> = self
            .objects
            .keys()
            .filter(|p| *p != keep)
            .rev()
            .cloned()
            .collect();
        let mut notifications = Vec::new();
        for p in doomed {
            if let Some(object) = self.objects.remove(&p) {
                notifications.extend(self.manager.object_removed(&object));
            }
        }
        notifications
    }
}
