//! Monitoring context
//!
//! [`Monitor`] owns every component of one monitoring session: the reflection
//! cache, the profile registry, the unit store, the scheduler and the filter
//! engine. It is assembled once at startup from explicit settings and torn
//! down with [`Monitor::shutdown`].

use std::any::{Any, TypeId};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use smallvec::SmallVec;

use crate::error::MonitorError;
use crate::filter::FilterEngine;
use crate::logging::MonitoringLogger;
use crate::profile::ProfileRegistry;
use crate::reflection::{
    AccessorTable, Assembly, DiscoveryRules, Instantiation, ProfilingTask, ReflectionCache,
    ScanBatch, ScanStats,
};
use crate::scheduler::{UpdateScheduler, liveness_validator};
use crate::settings::MonitoringSettings;
use crate::unit::{Unit, UnitId, UnitStore, UnitView};
use crate::value::MonitorValue;

/// Lifecycle of the member discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilingStatus {
    /// Profiling has not been started
    Idle,
    /// A background scan is running
    Running,
    /// Profiles are installed
    Ready,
    /// The scan was canceled before completing
    Canceled,
    /// The scan failed with a fatal error
    Failed,
    /// Monitoring is switched off in the settings
    Disabled,
    /// The session was shut down
    ShutDown,
}

/// Target registered before its profiles existed
struct PendingTarget {
    target: Weak<dyn Any>,
    type_id: TypeId,
    name: String,
}

/// One monitoring session
pub struct Monitor {
    settings: Arc<MonitoringSettings>,
    logger: MonitoringLogger,
    cache: ReflectionCache,
    profiles: ProfileRegistry,
    table: AccessorTable,
    stats: ScanStats,
    units: UnitStore,
    scheduler: UpdateScheduler,
    filter: FilterEngine,
    task: Option<ProfilingTask>,
    pending: Vec<PendingTarget>,
    status: ProfilingStatus,
}

impl Monitor {
    /// Create a session with the default discovery rules
    pub fn new(settings: Arc<MonitoringSettings>) -> Self {
        Self::with_rules(settings, DiscoveryRules::default())
    }

    /// Create a session with custom marker handling
    pub fn with_rules(settings: Arc<MonitoringSettings>, rules: DiscoveryRules) -> Self {
        let logger = MonitoringLogger::new(&settings.logging);
        let mut scheduler = UpdateScheduler::new(&settings.general, logger.clone());
        scheduler.add_validator("liveness", liveness_validator);

        Self {
            cache: ReflectionCache::new(settings.clone(), logger.clone(), rules),
            filter: FilterEngine::new(&settings.filtering),
            profiles: ProfileRegistry::new(),
            table: AccessorTable::new(),
            stats: ScanStats::default(),
            units: UnitStore::new(),
            task: None,
            pending: Vec::new(),
            status: ProfilingStatus::Idle,
            scheduler,
            logger,
            settings,
        }
    }

    pub fn settings(&self) -> &Arc<MonitoringSettings> {
        &self.settings
    }

    pub fn logger(&self) -> &MonitoringLogger {
        &self.logger
    }

    pub fn status(&self) -> ProfilingStatus {
        self.status
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    /// Statistics of the installed scan
    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Targets waiting for profiling to complete
    pub fn pending_targets(&self) -> usize {
        self.pending.len()
    }

    /// Closed (declaring type, value type) pairs of every installed accessor
    pub fn instantiations(&self) -> &[Instantiation] {
        self.table.instantiations()
    }

    // ========================================================================
    // Profiling
    // ========================================================================

    /// Discover the monitored members of `assemblies`
    ///
    /// Runs on a background thread when `async_profiling` is set; the result
    /// is installed by a later [`poll_profiling`](Self::poll_profiling) or
    /// [`tick`](Self::tick). Otherwise the scan completes before returning.
    pub fn begin_profiling(&mut self, assemblies: Vec<Assembly>) -> Result<(), MonitorError> {
        match self.status {
            ProfilingStatus::ShutDown => return Ok(()),
            ProfilingStatus::Running => {
                tracing::warn!("Profiling already running");
                return Ok(());
            }
            _ => {}
        }
        if !self.settings.general.enable_monitoring {
            tracing::info!("Monitoring disabled; skipping profiling");
            self.status = ProfilingStatus::Disabled;
            return Ok(());
        }

        if self.settings.general.async_profiling {
            self.task = Some(ProfilingTask::spawn(self.cache.clone(), assemblies)?);
            self.status = ProfilingStatus::Running;
            tracing::debug!("Profiling started in the background");
            Ok(())
        } else {
            let result = self.cache.scan(&assemblies, &AtomicBool::new(false));
            self.finish_profiling(result)
        }
    }

    /// Install the background scan if it has finished
    ///
    /// Returns whether profiles were installed by this call.
    pub fn poll_profiling(&mut self) -> Result<bool, MonitorError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(false);
        };
        let Some(result) = task.poll() else {
            return Ok(false);
        };
        self.task = None;
        self.finish_profiling(result)?;
        Ok(self.status == ProfilingStatus::Ready)
    }

    /// Block until the background scan finishes and install it
    pub fn wait_for_profiling(&mut self) -> Result<(), MonitorError> {
        match self.task.take() {
            Some(task) => {
                let result = task.wait();
                self.finish_profiling(result)
            }
            None => Ok(()),
        }
    }

    /// Request cancellation of a running background scan
    pub fn cancel_profiling(&self) {
        if let Some(task) = &self.task {
            task.cancel();
        }
    }

    /// Install or discard a finished scan
    ///
    /// Targets queued for a scan that did not complete are dropped; a later
    /// `begin_profiling` only serves targets registered after it starts.
    pub(crate) fn finish_profiling(&mut self, result: Result<ScanBatch, MonitorError>) -> Result<(), MonitorError> {
        match result {
            Ok(batch) => {
                self.install(batch);
                Ok(())
            }
            Err(MonitorError::OperationCanceled) => {
                self.logger.report(&MonitorError::OperationCanceled);
                self.status = ProfilingStatus::Canceled;
                self.pending.clear();
                Ok(())
            }
            Err(e) => {
                self.status = ProfilingStatus::Failed;
                self.pending.clear();
                Err(e)
            }
        }
    }

    /// Make a completed scan visible to the tick loop
    fn install(&mut self, batch: ScanBatch) {
        let ScanBatch {
            profiles,
            table,
            stats,
        } = batch;

        // Members installed by an earlier scan already have their static units
        let mut new_statics = Vec::new();
        for profile in profiles {
            if let Some(profile) = self.profiles.insert(profile)
                && profile.is_static()
            {
                new_statics.push(profile);
            }
        }
        self.table.extend(table);
        self.stats = stats;
        self.status = ProfilingStatus::Ready;

        for profile in new_statics {
            let unit = profile.create_unit(None, &profile.descriptor().declaring_type);
            self.add_unit(unit);
        }

        for pending in std::mem::take(&mut self.pending) {
            match pending.target.upgrade() {
                Some(target) => {
                    self.create_units(target, pending.type_id, &pending.name);
                }
                None => tracing::trace!("Pending target {} dropped before profiling finished", pending.name),
            }
        }

        tracing::info!(
            "Monitoring ready: {} profiles, {} units",
            self.profiles.len(),
            self.units.len()
        );

        if self.settings.general.open_display_on_load {
            self.set_visible(true);
        }
    }

    // ========================================================================
    // Targets
    // ========================================================================

    /// Create the units of every instance member declared on `T`
    ///
    /// Before profiling completes the target is queued and receives its units
    /// on install. Registering a target twice returns its existing units.
    pub fn register_target<T: Any>(&mut self, target: &Rc<T>, name: &str) -> SmallVec<[UnitId; 8]> {
        let erased: Rc<dyn Any> = target.clone();
        match self.status {
            ProfilingStatus::Ready => self.create_units(erased, TypeId::of::<T>(), name),
            ProfilingStatus::Idle | ProfilingStatus::Running => {
                self.pending.push(PendingTarget {
                    target: Rc::downgrade(&erased),
                    type_id: TypeId::of::<T>(),
                    name: name.to_string(),
                });
                SmallVec::new()
            }
            _ => SmallVec::new(),
        }
    }

    /// Destroy every unit bound to `target`, returning how many were removed
    pub fn unregister_target<T: Any>(&mut self, target: &Rc<T>) -> usize {
        let key = Rc::as_ptr(target) as *const () as usize;
        self.pending
            .retain(|p| p.target.as_ptr() as *const () as usize != key);

        let removed = self.units.remove_target(key);
        for id in &removed {
            self.scheduler.deactivate(*id);
        }
        removed.len()
    }

    fn create_units(&mut self, target: Rc<dyn Any>, type_id: TypeId, name: &str) -> SmallVec<[UnitId; 8]> {
        let key = Rc::as_ptr(&target) as *const () as usize;
        let existing = self.units.units_of(key);
        if !existing.is_empty() {
            tracing::debug!("{} already registered", name);
            return existing.iter().copied().collect();
        }

        let profiles = self.profiles.instance_profiles(type_id).to_vec();
        profiles
            .iter()
            .map(|profile| self.add_unit(profile.create_unit(Some(&target), name)))
            .collect()
    }

    fn add_unit(&mut self, mut unit: Unit) -> UnitId {
        if let Some(enabled) = self.filter.decide(&unit) {
            unit.set_enabled(enabled);
        }
        let enabled = unit.is_enabled();
        let id = self.units.insert(unit);
        if enabled {
            self.scheduler.activate(id);
        }
        id
    }

    // ========================================================================
    // Frame loop
    // ========================================================================

    /// Advance one frame
    ///
    /// Installs a finished background scan first. Returns whether the update
    /// tick fired.
    pub fn tick(&mut self, dt: Duration) -> bool {
        if self.status == ProfilingStatus::ShutDown {
            return false;
        }
        if let Err(e) = self.poll_profiling() {
            self.logger.report(&e);
        }
        self.scheduler.tick(dt, &mut self.units)
    }

    /// Visibility input from the presentation layer
    pub fn set_visible(&mut self, visible: bool) {
        if self.status == ProfilingStatus::ShutDown {
            return;
        }
        self.scheduler.set_visible(visible, &mut self.units);
    }

    pub fn is_visible(&self) -> bool {
        self.scheduler.is_visible()
    }

    // ========================================================================
    // Filtering
    // ========================================================================

    pub fn apply_filter(&mut self, text: &str) {
        self.filter.apply(text, &mut self.units, &mut self.scheduler);
    }

    pub fn reset_filter(&mut self) {
        self.filter.reset(&mut self.units, &mut self.scheduler);
    }

    pub fn active_filter(&self) -> Option<&str> {
        self.filter.active_filter()
    }

    // ========================================================================
    // Units
    // ========================================================================

    /// Ordered presentation list
    pub fn snapshot(&self) -> Vec<UnitView> {
        self.units.views()
    }

    pub fn units(&self) -> &UnitStore {
        &self.units
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id)
    }

    /// Find a unit by its name and target name
    pub fn find(&self, name: &str, target_name: &str) -> Option<UnitId> {
        self.units
            .iter()
            .find(|(_, unit)| unit.name() == name && unit.target_name() == target_name)
            .map(|(id, _)| id)
    }

    /// Write a settable member through its unit
    pub fn set_value(&mut self, id: UnitId, value: impl Into<MonitorValue>) -> Result<(), MonitorError> {
        let unit = self
            .units
            .get_mut(id)
            .ok_or_else(|| MonitorError::Unknown(format!("no unit {}", id)))?;
        unit.set_value(value.into())
    }

    /// Observe state changes of a unit; returns false if the unit is gone
    pub fn on_value_changed(&mut self, id: UnitId, observer: impl FnMut(&str) + 'static) -> bool {
        match self.units.get_mut(id) {
            Some(unit) => {
                unit.on_value_changed(observer);
                true
            }
            None => false,
        }
    }

    /// Cancel profiling and drop every unit and profile
    ///
    /// Further calls on the session are no-ops.
    pub fn shutdown(&mut self) {
        if self.status == ProfilingStatus::ShutDown {
            return;
        }
        if let Some(task) = self.task.take() {
            task.cancel();
        }
        self.scheduler.set_visible(false, &mut self.units);
        self.scheduler.clear();
        self.units.clear();
        self.pending.clear();
        self.profiles.clear();
        self.table.clear();
        self.status = ProfilingStatus::ShutDown;
        tracing::info!("Monitoring shut down");
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
