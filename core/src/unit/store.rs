//! Unit storage in registration order

use std::fmt;

use hashbrown::HashMap;
use smallvec::SmallVec;

use super::Unit;

/// Stable handle of a stored unit; never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(u64);

impl UnitId {
    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Presentation row for one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitView {
    pub id: UnitId,
    pub name: String,
    pub target_name: String,
    pub tags: Vec<String>,
    pub state: String,
    pub enabled: bool,
}

/// Owner of every live unit
#[derive(Debug, Default)]
pub struct UnitStore {
    units: HashMap<UnitId, Unit>,
    order: Vec<UnitId>,
    by_target: HashMap<usize, SmallVec<[UnitId; 8]>>,
    next_id: u64,
}

impl UnitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, unit: Unit) -> UnitId {
        let id = UnitId(self.next_id);
        self.next_id += 1;

        if let Some(key) = unit.target_key() {
            self.by_target.entry(key).or_default().push(id);
        }
        self.order.push(id);
        self.units.insert(id, unit);
        id
    }

    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    pub fn remove(&mut self, id: UnitId) -> Option<Unit> {
        let unit = self.units.remove(&id)?;
        self.order.retain(|other| *other != id);
        if let Some(key) = unit.target_key()
            && let Some(ids) = self.by_target.get_mut(&key)
        {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_target.remove(&key);
            }
        }
        Some(unit)
    }

    /// Remove every unit bound to the target at `key`
    pub(crate) fn remove_target(&mut self, key: usize) -> SmallVec<[UnitId; 8]> {
        let ids = self.by_target.remove(&key).unwrap_or_default();
        for id in &ids {
            self.units.remove(id);
        }
        if !ids.is_empty() {
            self.order.retain(|id| !ids.contains(id));
        }
        ids
    }

    /// Units bound to the target at `key`
    pub(crate) fn units_of(&self, key: usize) -> &[UnitId] {
        self.by_target.get(&key).map(|ids| ids.as_slice()).unwrap_or(&[])
    }

    /// Units whose target no longer exists
    pub fn dead_units(&self) -> Vec<UnitId> {
        self.iter()
            .filter(|(_, unit)| !unit.is_alive())
            .map(|(id, _)| id)
            .collect()
    }

    /// Units in registration order
    pub fn iter(&self) -> impl Iterator<Item = (UnitId, &Unit)> {
        self.order
            .iter()
            .filter_map(|id| self.units.get(id).map(|unit| (*id, unit)))
    }

    /// Visit every unit mutably, in registration order
    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(UnitId, &mut Unit)) {
        for id in &self.order {
            if let Some(unit) = self.units.get_mut(id) {
                f(*id, unit);
            }
        }
    }

    /// Unit ids in registration order
    pub fn ids(&self) -> &[UnitId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Presentation rows in registration order
    pub fn views(&self) -> Vec<UnitView> {
        self.iter()
            .map(|(id, unit)| UnitView {
                id,
                name: unit.name().to_string(),
                target_name: unit.target_name().to_string(),
                tags: unit.descriptor().custom_tags.clone(),
                state: unit.state().to_string(),
                enabled: unit.is_enabled(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.units.clear();
        self.order.clear();
        self.by_target.clear();
    }
}
