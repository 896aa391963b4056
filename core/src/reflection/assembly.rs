//! Type declarations
//!
//! A host describes its monitored types with a [`TypeBuilder`] and groups them
//! into named [`Assembly`] units. Typed closures are erased into
//! [`Accessor`]s at declaration time.

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use hashbrown::HashMap;

use super::accessor::{
    Accessor, EventVisitor, Getter, Invoker, OutArgs, Processor, Setter, downcast,
};
use super::member::{MarkerKind, MemberDecl, MemberKind, ParamSig, TypeSig};
use crate::error::MonitorError;
use crate::event::{EventSource, MulticastEvent};
use crate::format::short_type_name;
use crate::value::{Monitorable, MonitorValue, ValueType};

/// Named group of types scanned together
#[derive(Debug, Clone)]
pub struct Assembly {
    pub name: String,
    pub types: Vec<TypeDecl>,
    /// Set when the assembly could not be read
    pub load_error: Option<String>,
}

impl Assembly {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            types: Vec::new(),
            load_error: None,
        }
    }

    /// Assembly that fails to load during discovery
    pub fn unreadable(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            types: Vec::new(),
            load_error: Some(reason.to_string()),
        }
    }

    pub fn with_type(mut self, decl: TypeDecl) -> Self {
        self.types.push(decl);
        self
    }

    pub fn add_type(&mut self, decl: TypeDecl) {
        self.types.push(decl);
    }
}

/// Value processor declared on a type
#[derive(Clone)]
pub struct ProcessorDecl {
    /// Value type the processor accepts
    pub input: ValueType,
    pub func: Processor,
}

impl std::fmt::Debug for ProcessorDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorDecl")
            .field("input", &self.input)
            .finish_non_exhaustive()
    }
}

/// Declared type with its members and value processors
#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub type_id: TypeId,
    pub members: Vec<MemberDecl>,
    pub processors: HashMap<String, ProcessorDecl>,
}

/// Marker for handles of instance members
pub struct Instance<T>(PhantomData<fn(&T)>);

/// Marker for handles of static members
pub struct Static;

/// Builder for a [`TypeDecl`] of `T`
///
/// Instance members receive `&T`; units bind to `Rc<T>` targets, so mutable
/// state is expected behind `Cell`/`RefCell`.
pub struct TypeBuilder<T> {
    decl: TypeDecl,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Any> TypeBuilder<T> {
    pub fn new(name: &str) -> Self {
        Self {
            decl: TypeDecl {
                name: name.to_string(),
                type_id: TypeId::of::<T>(),
                members: Vec::new(),
                processors: HashMap::new(),
            },
            _marker: PhantomData,
        }
    }

    fn ident(&self, member: &str) -> Arc<str> {
        Arc::from(format!("{}.{}", self.decl.name, member))
    }

    fn push(&mut self, decl: MemberDecl) -> &mut MemberDecl {
        self.decl.members.push(decl);
        let last = self.decl.members.len() - 1;
        &mut self.decl.members[last]
    }

    fn value_member<V: Monitorable>(
        &mut self,
        name: &str,
        kind: MemberKind,
        get: impl Fn(&T) -> V + Send + Sync + 'static,
    ) -> MemberHandle<'_, Instance<T>, V> {
        let ident = self.ident(name);
        let get: Getter = Arc::new(move |target: Option<&dyn Any>| -> Result<MonitorValue, MonitorError> {
            Ok(get(downcast::<T>(target, &ident)?).into())
        });
        let accessor = match kind {
            MemberKind::Property => Accessor::Property { get, set: None },
            _ => Accessor::Field { get, set: None },
        };

        let mut decl = MemberDecl::new(name, kind, TypeSig::Resolved(V::value_type()));
        decl.accessor = Some(accessor);
        MemberHandle::new(self.push(decl))
    }

    /// Declare a monitored field
    pub fn field<V: Monitorable>(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> V + Send + Sync + 'static,
    ) -> MemberHandle<'_, Instance<T>, V> {
        self.value_member(name, MemberKind::Field, get)
    }

    /// Declare a monitored property
    pub fn property<V: Monitorable>(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> V + Send + Sync + 'static,
    ) -> MemberHandle<'_, Instance<T>, V> {
        self.value_member(name, MemberKind::Property, get)
    }

    /// Declare a monitored method without parameters
    pub fn method<R: Monitorable>(
        &mut self,
        name: &str,
        f: impl Fn(&T) -> R + Send + Sync + 'static,
    ) -> MemberHandle<'_, Instance<T>, R> {
        self.method_with_args(name, &[], move |target, _| Ok(f(target)))
    }

    /// Declare a monitored method taking arguments
    ///
    /// Arguments come from the marker's default args (see
    /// [`MemberHandle::args`]); an `Err` is reported as an access failure.
    pub fn method_with_args<R: Monitorable>(
        &mut self,
        name: &str,
        params: &[(&str, ValueType)],
        f: impl Fn(&T, &[MonitorValue]) -> Result<R, String> + Send + Sync + 'static,
    ) -> MemberHandle<'_, Instance<T>, R> {
        let ident = self.ident(name);
        let invoke: Invoker = Arc::new(
            move |target: Option<&dyn Any>, args: &[MonitorValue], _: &mut OutArgs| -> Result<MonitorValue, MonitorError> {
                let target = downcast::<T>(target, &ident)?;
                f(target, args)
                    .map(R::into)
                    .map_err(|message| MonitorError::Access {
                        member: ident.to_string(),
                        message,
                    })
            },
        );

        let mut decl = MemberDecl::new(name, MemberKind::Method, TypeSig::Resolved(R::value_type()));
        decl.params = params
            .iter()
            .map(|(name, value_type)| ParamSig::input(name, *value_type))
            .collect();
        decl.accessor = Some(Accessor::Method { invoke });
        MemberHandle::new(self.push(decl))
    }

    /// Declare a monitored method with `out` parameters
    ///
    /// `params` lists every parameter in order; the method receives the input
    /// arguments and pushes one value per `out` parameter.
    pub fn method_with_out<R: Monitorable>(
        &mut self,
        name: &str,
        params: Vec<ParamSig>,
        f: impl Fn(&T, &[MonitorValue], &mut OutArgs) -> R + Send + Sync + 'static,
    ) -> MemberHandle<'_, Instance<T>, R> {
        let ident = self.ident(name);
        let invoke: Invoker = Arc::new(
            move |target: Option<&dyn Any>, args: &[MonitorValue], out: &mut OutArgs| -> Result<MonitorValue, MonitorError> {
                Ok(f(downcast::<T>(target, &ident)?, args, out).into())
            },
        );

        let mut decl = MemberDecl::new(name, MemberKind::Method, TypeSig::Resolved(R::value_type()));
        decl.params = params;
        decl.accessor = Some(Accessor::MethodWithOut { invoke });
        MemberHandle::new(self.push(decl))
    }

    /// Declare a monitored event
    pub fn event<A: 'static>(
        &mut self,
        name: &str,
        f: impl Fn(&T) -> &MulticastEvent<A> + Send + Sync + 'static,
    ) -> MemberHandle<'_, Instance<T>, A> {
        let ident = self.ident(name);
        let visit: EventVisitor = Arc::new(
            move |target: Option<&dyn Any>, visitor: &mut dyn FnMut(&dyn EventSource)| -> Result<(), MonitorError> {
                visitor(f(downcast::<T>(target, &ident)?));
                Ok(())
            },
        );

        let mut decl = MemberDecl::new(name, MemberKind::Event, TypeSig::Resolved(ValueType::Unit));
        decl.signature = Some(event_signature::<A>());
        decl.accessor = Some(Accessor::Event { visit });
        MemberHandle::new(self.push(decl))
    }

    /// Declare a monitored static field
    pub fn static_field<V: Monitorable>(
        &mut self,
        name: &str,
        get: impl Fn() -> V + Send + Sync + 'static,
    ) -> MemberHandle<'_, Static, V> {
        let get: Getter = Arc::new(move |_: Option<&dyn Any>| -> Result<MonitorValue, MonitorError> {
            Ok(get().into())
        });

        let mut decl = MemberDecl::new(name, MemberKind::Field, TypeSig::Resolved(V::value_type()));
        decl.is_static = true;
        decl.accessor = Some(Accessor::Field { get, set: None });
        MemberHandle::new(self.push(decl))
    }

    /// Declare a monitored static method without parameters
    pub fn static_method<R: Monitorable>(
        &mut self,
        name: &str,
        f: impl Fn() -> R + Send + Sync + 'static,
    ) -> MemberHandle<'_, Static, R> {
        let invoke: Invoker = Arc::new(
            move |_: Option<&dyn Any>, _: &[MonitorValue], _: &mut OutArgs| -> Result<MonitorValue, MonitorError> {
                Ok(f().into())
            },
        );

        let mut decl = MemberDecl::new(name, MemberKind::Method, TypeSig::Resolved(R::value_type()));
        decl.is_static = true;
        decl.accessor = Some(Accessor::Method { invoke });
        MemberHandle::new(self.push(decl))
    }

    /// Declare a monitored static event
    ///
    /// `f` returns the event instance, typically from thread-local storage.
    pub fn static_event<A: 'static>(
        &mut self,
        name: &str,
        f: impl Fn() -> Rc<MulticastEvent<A>> + Send + Sync + 'static,
    ) -> MemberHandle<'_, Static, A> {
        let visit: EventVisitor = Arc::new(
            move |_: Option<&dyn Any>, visitor: &mut dyn FnMut(&dyn EventSource)| -> Result<(), MonitorError> {
                let event = f();
                visitor(&*event);
                Ok(())
            },
        );

        let mut decl = MemberDecl::new(name, MemberKind::Event, TypeSig::Resolved(ValueType::Unit));
        decl.is_static = true;
        decl.signature = Some(event_signature::<A>());
        decl.accessor = Some(Accessor::Event { visit });
        MemberHandle::new(self.push(decl))
    }

    /// Add a hand-written member declaration
    pub fn member(&mut self, decl: MemberDecl) -> &mut MemberDecl {
        self.push(decl)
    }

    /// Declare a named value processor that members can refer to
    pub fn processor<V>(
        &mut self,
        name: &str,
        f: impl Fn(&V) -> String + Send + Sync + 'static,
    ) -> &mut Self
    where
        V: Monitorable + TryFrom<MonitorValue>,
    {
        let func: Processor = Arc::new(move |value: &MonitorValue| {
            V::try_from(value.clone()).ok().map(|v| f(&v))
        });
        self.decl.processors.insert(
            name.to_string(),
            ProcessorDecl {
                input: V::value_type(),
                func,
            },
        );
        self
    }

    pub fn build(self) -> TypeDecl {
        self.decl
    }
}

fn event_signature<A>() -> String {
    format!("Event<{}>", short_type_name(std::any::type_name::<A>()))
}

/// Configures a member just declared on a [`TypeBuilder`]
pub struct MemberHandle<'a, S, V> {
    decl: &'a mut MemberDecl,
    _marker: PhantomData<(S, fn(V))>,
}

impl<'a, S, V> MemberHandle<'a, S, V> {
    fn new(decl: &'a mut MemberDecl) -> Self {
        Self {
            decl,
            _marker: PhantomData,
        }
    }

    /// Display label replacing the humanized name
    pub fn label(self, label: &str) -> Self {
        self.decl.attrs.label = Some(label.to_string());
        self
    }

    /// Add a custom tag
    pub fn tag(self, tag: &str) -> Self {
        self.decl.attrs.tags.push(tag.to_string());
        self
    }

    /// Use a value processor declared on the same type
    pub fn processor(self, name: &str) -> Self {
        self.decl.attrs.processor = Some(name.to_string());
        self
    }

    /// Float precision for this member
    pub fn precision(self, digits: usize) -> Self {
        self.decl.attrs.precision = Some(digits);
        self
    }

    /// Arguments passed to a method on each refresh
    pub fn args(self, args: Vec<MonitorValue>) -> Self {
        self.decl.attrs.default_args = args;
        self
    }

    /// Units start disabled
    pub fn disabled(self) -> Self {
        self.decl.attrs.enabled = false;
        self
    }

    /// Include the unit's own handler in event counts
    pub fn show_true_count(self) -> Self {
        self.decl.attrs.show_true_count = true;
        self
    }

    /// Show the event signature instead of the label
    pub fn show_signature(self) -> Self {
        self.decl.attrs.show_signature = true;
        self
    }

    /// Replace the marker (`None` leaves the member unmonitored)
    pub fn marker(self, marker: Option<MarkerKind>) -> Self {
        self.decl.marker = marker;
        self
    }
}

impl<'a, T: Any, V> MemberHandle<'a, Instance<T>, V>
where
    V: Monitorable + TryFrom<MonitorValue>,
{
    /// Make a field or property settable
    pub fn setter(self, set: impl Fn(&T, V) + Send + Sync + 'static) -> Self {
        let ident: Arc<str> = Arc::from(self.decl.name.as_str());
        let setter: Setter = Arc::new(move |target: Option<&dyn Any>, value: MonitorValue| -> Result<(), MonitorError> {
            let target = downcast::<T>(target, &ident)?;
            set(target, convert::<V>(&ident, value)?);
            Ok(())
        });
        install_setter(self.decl, setter);
        self
    }
}

impl<'a, V> MemberHandle<'a, Static, V>
where
    V: Monitorable + TryFrom<MonitorValue>,
{
    /// Make a static field settable
    pub fn setter(self, set: impl Fn(V) + Send + Sync + 'static) -> Self {
        let ident: Arc<str> = Arc::from(self.decl.name.as_str());
        let setter: Setter = Arc::new(move |_: Option<&dyn Any>, value: MonitorValue| -> Result<(), MonitorError> {
            set(convert::<V>(&ident, value)?);
            Ok(())
        });
        install_setter(self.decl, setter);
        self
    }
}

fn convert<V: Monitorable + TryFrom<MonitorValue>>(
    member: &str,
    value: MonitorValue,
) -> Result<V, MonitorError> {
    let found = value.value_type().type_name();
    V::try_from(value).map_err(|_| MonitorError::TypeMismatch {
        member: member.to_string(),
        expected: V::value_type().type_name(),
        found,
    })
}

fn install_setter(decl: &mut MemberDecl, setter: Setter) {
    match &mut decl.accessor {
        Some(Accessor::Field { set, .. }) | Some(Accessor::Property { set, .. }) => {
            *set = Some(setter);
        }
        _ => tracing::warn!("{} has no value to set; setter ignored", decl.name),
    }
}
