//! Type-erased member accessors
//!
//! Accessors are plain closures built when a type is declared, so reading a
//! member never needs runtime code generation. The [`AccessorTable`] is the
//! lookup table produced by discovery, keyed by member identity.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use super::member::MemberKind;
use crate::error::MonitorError;
use crate::event::EventSource;
use crate::value::MonitorValue;

/// Values written to `out` parameters by a method
pub type OutArgs = SmallVec<[MonitorValue; 2]>;

/// Reads a field or property; the target is `None` for static members
pub type Getter = Arc<dyn Fn(Option<&dyn Any>) -> Result<MonitorValue, MonitorError> + Send + Sync>;

/// Writes a field or property
pub type Setter =
    Arc<dyn Fn(Option<&dyn Any>, MonitorValue) -> Result<(), MonitorError> + Send + Sync>;

/// Invokes a method with its arguments, collecting `out` values
pub type Invoker = Arc<
    dyn Fn(Option<&dyn Any>, &[MonitorValue], &mut OutArgs) -> Result<MonitorValue, MonitorError>
        + Send
        + Sync,
>;

/// Hands the event behind a member to a visitor
pub type EventVisitor = Arc<
    dyn Fn(Option<&dyn Any>, &mut dyn FnMut(&dyn EventSource)) -> Result<(), MonitorError>
        + Send
        + Sync,
>;

/// Named value processor producing custom display text
pub type Processor = Arc<dyn Fn(&MonitorValue) -> Option<String> + Send + Sync>;

/// Compiled access to one member
#[derive(Clone)]
pub enum Accessor {
    Field { get: Getter, set: Option<Setter> },
    Property { get: Getter, set: Option<Setter> },
    Method { invoke: Invoker },
    MethodWithOut { invoke: Invoker },
    Event { visit: EventVisitor },
}

impl Accessor {
    /// Shape name used in diagnostics
    pub fn shape(&self) -> &'static str {
        match self {
            Accessor::Field { .. } => "field",
            Accessor::Property { .. } => "property",
            Accessor::Method { .. } => "method",
            Accessor::MethodWithOut { .. } => "method-with-out",
            Accessor::Event { .. } => "event",
        }
    }

    /// Whether this shape can serve a member of `kind`
    pub fn fits(&self, kind: MemberKind) -> bool {
        matches!(
            (self, kind),
            (Accessor::Field { .. }, MemberKind::Field)
                | (Accessor::Property { .. }, MemberKind::Property)
                | (Accessor::Method { .. }, MemberKind::Method)
                | (Accessor::MethodWithOut { .. }, MemberKind::Method)
                | (Accessor::Event { .. }, MemberKind::Event)
        )
    }

    pub fn is_settable(&self) -> bool {
        matches!(
            self,
            Accessor::Field { set: Some(_), .. } | Accessor::Property { set: Some(_), .. }
        )
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Accessor::{}", self.shape())
    }
}

/// Resolve the concrete target of an instance accessor
pub(crate) fn downcast<'a, T: Any>(
    target: Option<&'a dyn Any>,
    member: &str,
) -> Result<&'a T, MonitorError> {
    match target {
        Some(target) => target
            .downcast_ref::<T>()
            .ok_or_else(|| MonitorError::TypeMismatch {
                member: member.to_string(),
                expected: std::any::type_name::<T>(),
                found: "another type",
            }),
        None => Err(MonitorError::TypeMismatch {
            member: member.to_string(),
            expected: std::any::type_name::<T>(),
            found: "no target",
        }),
    }
}

/// Identity of a member: declaring type plus member name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub type_id: TypeId,
    pub member: Arc<str>,
}

impl MemberKey {
    pub fn new(type_id: TypeId, member: &str) -> Self {
        Self {
            type_id,
            member: Arc::from(member),
        }
    }
}

/// Closed (declaring type, value type) pair held by the table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instantiation {
    pub declaring_type: String,
    pub value_type: String,
    pub kind: MemberKind,
}

impl fmt::Display for Instantiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}<{}, {}>",
            self.kind, self.declaring_type, self.value_type
        )
    }
}

/// Accessors of every discovered member
#[derive(Debug, Clone, Default)]
pub struct AccessorTable {
    entries: HashMap<MemberKey, Accessor>,
    instantiations: Vec<Instantiation>,
    seen: HashSet<Instantiation>,
}

impl AccessorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an accessor, returning false if the member was already present
    pub fn insert(&mut self, key: MemberKey, accessor: Accessor, inst: Instantiation) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, accessor);
        if self.seen.insert(inst.clone()) {
            self.instantiations.push(inst);
        }
        true
    }

    pub fn get(&self, key: &MemberKey) -> Option<&Accessor> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every distinct instantiation, in discovery order
    pub fn instantiations(&self) -> &[Instantiation] {
        &self.instantiations
    }

    /// Merge another table, keeping existing entries
    pub fn extend(&mut self, other: AccessorTable) {
        let AccessorTable {
            entries,
            instantiations,
            ..
        } = other;
        for (key, accessor) in entries {
            self.entries.entry(key).or_insert(accessor);
        }
        for inst in instantiations {
            if self.seen.insert(inst.clone()) {
                self.instantiations.push(inst);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.instantiations.clear();
        self.seen.clear();
    }
}
