//! Transient component store used while scanning one location group.
//!
//! The registry owns every component under its data id. The per-id buckets
//! only hold data ids pointing back into the primary map, so a bucket entry
//! can never outlive the component it names.

use std::collections::HashMap;

use crate::component::Component;

#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_data_id: HashMap<String, Component>,
    by_id: HashMap<String, Vec<String>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the entry stored under the component's data id.
    ///
    /// Returns the replaced component, if any.
    pub fn add(&mut self, component: Component) -> Option<Component> {
        let data_id = component.data_id();
        let bucket = self.by_id.entry(component.id.clone()).or_default();
        if !bucket.contains(&data_id) {
            bucket.push(data_id.clone());
        }

        self.by_data_id.insert(data_id, component)
    }

    pub fn lookup(&self, data_id: &str) -> Option<&Component> {
        self.by_data_id.get(data_id)
    }

    pub fn lookup_mut(&mut self, data_id: &str) -> Option<&mut Component> {
        self.by_data_id.get_mut(data_id)
    }

    pub fn remove(&mut self, data_id: &str) -> Option<Component> {
        let removed = self.by_data_id.remove(data_id)?;
        self.unlink(&removed.id, data_id);
        Some(removed)
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Data ids of every entry sharing the logical id.
    pub fn data_ids_for_id(&self, id: &str) -> Vec<String> {
        self.by_id.get(id).cloned().unwrap_or_default()
    }

    pub fn get_by_id(&self, id: &str) -> Vec<&Component> {
        self.by_id
            .get(id)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter_map(|data_id| self.by_data_id.get(data_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of all stored components.
    pub fn contents(&self) -> Vec<Component> {
        self.by_data_id.values().cloned().collect()
    }

    pub fn into_contents(self) -> Vec<Component> {
        self.by_data_id.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.by_data_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_data_id.is_empty()
    }

    fn unlink(&mut self, id: &str, data_id: &str) {
        if let Some(bucket) = self.by_id.get_mut(id) {
            bucket.retain(|entry| entry != data_id);
            if bucket.is_empty() {
                self.by_id.remove(id);
            }
        }
    }
}
