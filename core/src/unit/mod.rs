//! Units: live bindings of a profile to one target
//!
//! A unit holds a weak reference to its target. The target going away is not
//! an error by itself; the next refresh reports it and the validation pass
//! destroys the unit.

mod store;

pub use store::{UnitId, UnitStore, UnitView};

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::error::MonitorError;
use crate::event::{EventSource, HandlerId};
use crate::pool;
use crate::profile::{MemberDescriptor, Profile};
use crate::value::MonitorValue;

type ValueObserver = Box<dyn FnMut(&str)>;

/// One profile bound to one target
pub struct Unit {
    profile: Arc<Profile>,
    target: Option<Weak<dyn Any>>,
    /// Address of the target allocation, stable while `target` is held
    target_key: Option<usize>,
    target_name: String,
    state: String,
    value: Option<MonitorValue>,
    enabled: bool,
    /// Invocations seen by the counting handler (events only)
    invocations: Rc<Cell<u64>>,
    subscription: Option<HandlerId>,
    observers: Vec<ValueObserver>,
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("name", &self.name())
            .field("target_name", &self.target_name)
            .field("state", &self.state)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Unit {
    pub(crate) fn new(profile: Arc<Profile>, target: Option<&Rc<dyn Any>>, target_name: &str) -> Self {
        let invocations = Rc::new(Cell::new(0));

        let mut subscription = None;
        let counter = invocations.clone();
        let attached = profile.with_event(target.map(|t| &**t), &mut |source: &dyn EventSource| {
            subscription = Some(source.subscribe_counter(counter.clone()));
        });
        if let Err(e) = attached {
            tracing::warn!("Could not observe {}: {}", profile.descriptor().ident, e);
        }

        Self {
            enabled: profile.descriptor().default_enabled,
            target: target.map(Rc::downgrade),
            target_key: target.map(|t| Rc::as_ptr(t) as *const () as usize),
            target_name: target_name.to_string(),
            state: String::new(),
            value: None,
            invocations,
            subscription,
            observers: Vec::new(),
            profile,
        }
    }

    /// Display name, matched by filters
    pub fn name(&self) -> &str {
        &self.profile.descriptor().label
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn profile(&self) -> &Arc<Profile> {
        &self.profile
    }

    pub fn descriptor(&self) -> &MemberDescriptor {
        self.profile.descriptor()
    }

    /// Last rendered state, without reading the member again
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Value captured by the last refresh
    pub fn value(&self) -> Option<&MonitorValue> {
        self.value.as_ref()
    }

    /// Value captured by the last refresh, converted to `T`
    pub fn value_as<T: TryFrom<MonitorValue>>(&self) -> Option<T> {
        self.value.clone().and_then(|v| T::try_from(v).ok())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_static(&self) -> bool {
        self.target.is_none()
    }

    /// Whether the target still exists (always true for static units)
    pub fn is_alive(&self) -> bool {
        self.target.as_ref().is_none_or(|t| t.strong_count() > 0)
    }

    /// Invocations of the monitored event since the unit was created
    pub fn invocations(&self) -> u64 {
        self.invocations.get()
    }

    pub(crate) fn target_key(&self) -> Option<usize> {
        self.target_key
    }

    /// Register an observer called with the new state whenever it changes
    pub fn on_value_changed(&mut self, observer: impl FnMut(&str) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Read the member and update the state
    ///
    /// Returns whether the rendered state changed; observers run only then.
    /// Method-backed units invoke their method on every call.
    pub fn refresh(&mut self) -> Result<bool, MonitorError> {
        let target = self.upgrade()?;
        let invocations = self.invocations.get();

        let (value, changed) = pool::with_string(|buffer| {
            let value = self.profile.render(target.as_deref(), invocations, buffer)?;
            let changed = *buffer != self.state;
            if changed {
                self.state.clear();
                self.state.push_str(buffer);
            }
            Ok::<_, MonitorError>((value, changed))
        })?;

        self.value = value;
        if changed {
            for observer in &mut self.observers {
                observer(&self.state);
            }
        }
        Ok(changed)
    }

    /// Write a settable field or property, then refresh
    pub fn set_value(&mut self, value: MonitorValue) -> Result<(), MonitorError> {
        let target = self.upgrade()?;
        self.profile.write(target.as_deref(), value)?;
        self.refresh().map(|_| ())
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn upgrade(&self) -> Result<Option<Rc<dyn Any>>, MonitorError> {
        match &self.target {
            None => Ok(None),
            Some(weak) => weak
                .upgrade()
                .map(Some)
                .ok_or_else(|| MonitorError::TargetDropped(self.profile.descriptor().ident.clone())),
        }
    }
}

impl Drop for Unit {
    fn drop(&mut self) {
        let Some(id) = self.subscription.take() else {
            return;
        };
        // A dead target took its event (and our handler) with it
        let Ok(target) = self.upgrade() else {
            return;
        };
        let detached = self
            .profile
            .with_event(target.as_deref(), &mut |source: &dyn EventSource| {
                source.unsubscribe(id);
            });
        if let Err(e) = detached {
            tracing::warn!("Could not detach from {}: {}", self.profile.descriptor().ident, e);
        }
    }
}
