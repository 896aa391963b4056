//! Member profiles
//!
//! A [`Profile`] is created once per (declaring type, member) pair and holds
//! the compiled accessor plus the formatting policy. Units are stamped out
//! from it, one per target.

mod descriptor;
mod registry;

pub use descriptor::MemberDescriptor;
pub use registry::ProfileRegistry;

use std::any::Any;
use std::fmt::{self, Write};
use std::rc::Rc;
use std::sync::Arc;

use crate::error::MonitorError;
use crate::event::EventSource;
use crate::reflection::{Accessor, MemberKey, MemberKind, OutArgs, Processor};
use crate::unit::Unit;
use crate::value::MonitorValue;

/// Compiled, reusable description of one monitored member
pub struct Profile {
    key: MemberKey,
    descriptor: MemberDescriptor,
    accessor: Accessor,
    processor: Option<Processor>,
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("ident", &self.descriptor.ident)
            .field("accessor", &self.accessor)
            .field("processor", &self.processor.is_some())
            .finish()
    }
}

impl Profile {
    pub fn new(
        key: MemberKey,
        descriptor: MemberDescriptor,
        accessor: Accessor,
        processor: Option<Processor>,
    ) -> Self {
        Self {
            key,
            descriptor,
            accessor,
            processor,
        }
    }

    pub fn key(&self) -> &MemberKey {
        &self.key
    }

    pub fn descriptor(&self) -> &MemberDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> MemberKind {
        self.descriptor.kind
    }

    pub fn is_static(&self) -> bool {
        self.descriptor.is_static
    }

    pub fn is_settable(&self) -> bool {
        self.accessor.is_settable()
    }

    /// Bind this profile to a target (`None` for static members)
    pub fn create_unit(self: &Arc<Self>, target: Option<&Rc<dyn Any>>, target_name: &str) -> Unit {
        Unit::new(self.clone(), target, target_name)
    }

    /// Read the member and append its rendered state to `out`
    ///
    /// Methods are invoked with their default arguments. Returns the value
    /// read, or `None` for events.
    pub(crate) fn render(
        &self,
        target: Option<&dyn Any>,
        invocations: u64,
        out: &mut String,
    ) -> Result<Option<MonitorValue>, MonitorError> {
        let d = &self.descriptor;
        match &self.accessor {
            Accessor::Field { get, .. } | Accessor::Property { get, .. } => {
                let value = get(target)?;
                out.push_str(&d.display_label);
                out.push_str(": ");
                self.write_value(out, &value);
                Ok(Some(value))
            }
            Accessor::Method { invoke } | Accessor::MethodWithOut { invoke } => {
                let mut outs = OutArgs::new();
                let value = invoke(target, &d.default_args, &mut outs)?;
                out.push_str(&d.display_label);
                if value != MonitorValue::Unit {
                    out.push_str(": ");
                    self.write_value(out, &value);
                }
                for (label, out_value) in d.out_labels.iter().zip(&outs) {
                    out.push(' ');
                    out.push_str(label);
                    out.push_str(": ");
                    self.write_value(out, out_value);
                }
                Ok(Some(value))
            }
            Accessor::Event { visit } => {
                let mut len = 0;
                visit(target, &mut |source: &dyn EventSource| {
                    len = source.invocation_len()
                })?;
                let count = if d.show_true_count {
                    len
                } else {
                    len.saturating_sub(1)
                };
                let head = match (&d.signature, d.show_signature) {
                    (Some(signature), true) => signature.as_str(),
                    _ => d.display_label.as_str(),
                };
                let _ = write!(out, "{} Subscriber:{} Invokes: {}", head, count, invocations);
                Ok(None)
            }
        }
    }

    fn write_value(&self, out: &mut String, value: &MonitorValue) {
        if let Some(processor) = &self.processor
            && let Some(text) = processor(value)
        {
            out.push_str(&text);
            return;
        }
        self.descriptor.style.write(out, value);
    }

    /// Write a field or property
    pub(crate) fn write(
        &self,
        target: Option<&dyn Any>,
        value: MonitorValue,
    ) -> Result<(), MonitorError> {
        match &self.accessor {
            Accessor::Field { set: Some(set), .. } | Accessor::Property { set: Some(set), .. } => {
                set(target, value)
            }
            _ => Err(MonitorError::NotSettable(self.descriptor.ident.clone())),
        }
    }

    /// Run `f` on the event behind an event member
    ///
    /// Returns `false` without calling `f` for other member kinds.
    pub(crate) fn with_event(
        &self,
        target: Option<&dyn Any>,
        f: &mut dyn FnMut(&dyn EventSource),
    ) -> Result<bool, MonitorError> {
        match &self.accessor {
            Accessor::Event { visit } => visit(target, f).map(|_| true),
            _ => Ok(false),
        }
    }
}
