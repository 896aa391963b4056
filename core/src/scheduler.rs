//! Update scheduling
//!
//! Two cadences share one accumulator: the update tick refreshes every active
//! unit in order, the validation tick runs the registered validators. Both
//! stop entirely while the display is hidden and fire once immediately when
//! it becomes visible again.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use hashbrown::HashSet;
use smallvec::SmallVec;

use crate::error::MonitorError;
use crate::logging::MonitoringLogger;
use crate::settings::GeneralSettings;
use crate::unit::{UnitId, UnitStore};

// ============================================================================
// Active Unit Set
// ============================================================================

/// Units refreshed by the update tick, in tick order
///
/// Adding a unit that is already active is ignored. Removal leaves a
/// tombstone that is compacted away once tombstones dominate; a unit
/// re-added before compaction keeps its original position.
#[derive(Debug, Default)]
pub struct ActiveUnitSet {
    order: Vec<UnitId>,
    members: HashSet<UnitId>,
    tombstones: HashSet<UnitId>,
}

impl ActiveUnitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate a unit, returning false if it was already active
    pub fn add(&mut self, id: UnitId) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        if !self.tombstones.remove(&id) {
            self.order.push(id);
        }
        self.debug_check();
        true
    }

    /// Deactivate a unit, returning false if it was not active
    pub fn remove(&mut self, id: UnitId) -> bool {
        if !self.members.remove(&id) {
            return false;
        }
        self.tombstones.insert(id);
        if self.tombstones.len() * 2 > self.order.len() {
            self.compact();
        }
        self.debug_check();
        true
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.members.contains(&id)
    }

    /// Active units in tick order
    pub fn iter(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.order
            .iter()
            .copied()
            .filter(|id| self.members.contains(id))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
        self.tombstones.clear();
    }

    fn compact(&mut self) {
        let tombstones = &self.tombstones;
        self.order.retain(|id| !tombstones.contains(id));
        self.tombstones.clear();
    }

    fn debug_check(&self) {
        debug_assert_eq!(
            self.order.len(),
            self.members.len() + self.tombstones.len(),
            "active set order out of sync"
        );
        debug_assert!(self.members.is_disjoint(&self.tombstones));
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Validation pass registered by any subsystem
///
/// Validators may disable or destroy units; errors are logged and do not stop
/// the remaining validators.
pub type Validator = Box<dyn FnMut(&mut UnitStore, &mut ActiveUnitSet) -> Result<(), MonitorError>>;

/// Drives the update and validation ticks
pub struct UpdateScheduler {
    interval: Duration,
    accumulated: Duration,
    visible: bool,
    validation_enabled: bool,
    /// Suspended while a manual filter is applied
    validation_suspended: bool,
    active: ActiveUnitSet,
    validators: Vec<(&'static str, Validator)>,
    update_ticks: u64,
    validation_ticks: u64,
    logger: MonitoringLogger,
}

impl UpdateScheduler {
    pub fn new(settings: &GeneralSettings, logger: MonitoringLogger) -> Self {
        Self {
            interval: settings.update_interval(),
            accumulated: Duration::ZERO,
            visible: false,
            validation_enabled: settings.validation_enabled,
            validation_suspended: false,
            active: ActiveUnitSet::new(),
            validators: Vec::new(),
            update_ticks: 0,
            validation_ticks: 0,
            logger,
        }
    }

    /// Register a validator run on every validation tick
    pub fn add_validator(
        &mut self,
        name: &'static str,
        validator: impl FnMut(&mut UnitStore, &mut ActiveUnitSet) -> Result<(), MonitorError> + 'static,
    ) {
        self.validators.push((name, Box::new(validator)));
    }

    pub fn active(&self) -> &ActiveUnitSet {
        &self.active
    }

    pub fn activate(&mut self, id: UnitId) -> bool {
        self.active.add(id)
    }

    pub fn deactivate(&mut self, id: UnitId) -> bool {
        self.active.remove(id)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Visibility input from the presentation layer
    ///
    /// Becoming visible runs one update and one validation tick right away.
    pub fn set_visible(&mut self, visible: bool, units: &mut UnitStore) {
        let was_visible = self.visible;
        self.visible = visible;
        if visible && !was_visible {
            self.accumulated = Duration::ZERO;
            self.run_update(units);
            self.run_validation(units);
        }
    }

    pub fn set_validation_enabled(&mut self, enabled: bool) {
        self.validation_enabled = enabled;
    }

    pub(crate) fn set_validation_suspended(&mut self, suspended: bool) {
        self.validation_suspended = suspended;
    }

    /// Whether validation ticks currently run
    pub fn validation_active(&self) -> bool {
        self.validation_enabled && !self.validation_suspended
    }

    pub fn update_ticks(&self) -> u64 {
        self.update_ticks
    }

    pub fn validation_ticks(&self) -> u64 {
        self.validation_ticks
    }

    /// Advance by one frame; returns whether the ticks fired
    ///
    /// Fires once the accumulated frame time exceeds the interval, then
    /// starts accumulating from zero. Nothing accumulates while hidden.
    pub fn tick(&mut self, dt: Duration, units: &mut UnitStore) -> bool {
        if !self.visible {
            return false;
        }

        self.accumulated += dt;
        if self.accumulated <= self.interval {
            return false;
        }
        self.accumulated = Duration::ZERO;

        self.run_update(units);
        self.run_validation(units);
        true
    }

    fn run_update(&mut self, units: &mut UnitStore) {
        self.update_ticks += 1;

        let mut failed: SmallVec<[(UnitId, MonitorError); 4]> = SmallVec::new();
        for id in self.active.iter() {
            let Some(unit) = units.get_mut(id) else {
                failed.push((id, MonitorError::Unknown(format!("unit {} missing", id))));
                continue;
            };
            let result = catch_unwind(AssertUnwindSafe(|| unit.refresh()))
                .unwrap_or_else(|payload| Err(MonitorError::from_panic(unit.name(), payload.as_ref())));
            if let Err(e) = result {
                failed.push((id, e));
            }
        }

        for (id, error) in failed {
            if !matches!(error, MonitorError::TargetDropped(_)) {
                self.logger.report(&error);
            }
            self.active.remove(id);
            if let Some(unit) = units.get_mut(id) {
                unit.set_enabled(false);
            }
        }
    }

    fn run_validation(&mut self, units: &mut UnitStore) {
        if !self.validation_active() {
            return;
        }
        self.validation_ticks += 1;

        let active = &mut self.active;
        for (name, validator) in self.validators.iter_mut() {
            let result = catch_unwind(AssertUnwindSafe(|| validator(units, active)))
                .unwrap_or_else(|payload| Err(MonitorError::from_panic(name, payload.as_ref())));
            if let Err(e) = result {
                tracing::debug!("Validator {} failed", name);
                self.logger.report(&e);
            }
        }
    }

    /// Drop all active units and reset the counters
    pub fn clear(&mut self) {
        self.active.clear();
        self.accumulated = Duration::ZERO;
        self.update_ticks = 0;
        self.validation_ticks = 0;
    }
}

/// Destroys units whose target no longer exists
pub fn liveness_validator(units: &mut UnitStore, active: &mut ActiveUnitSet) -> Result<(), MonitorError> {
    for id in units.dead_units() {
        active.remove(id);
        if let Some(unit) = units.remove(id) {
            tracing::debug!("{} on {} lost its target", unit.name(), unit.target_name());
        }
    }
    Ok(())
}
