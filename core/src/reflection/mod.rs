//! Reflection cache
//!
//! Hosts declare their monitored types up front ([`TypeBuilder`]); discovery
//! validates the declarations against the [`DiscoveryRules`] and the assembly
//! denylists, then compiles one profile per member.

mod accessor;
mod assembly;
mod member;
mod scan;

pub use accessor::{
    Accessor, AccessorTable, EventVisitor, Getter, Instantiation, Invoker, MemberKey, OutArgs,
    Processor, Setter,
};
pub use assembly::{Assembly, Instance, MemberHandle, ProcessorDecl, Static, TypeBuilder, TypeDecl};
pub use member::{
    DiscoveryRules, MarkerKind, MarkerRule, MemberDecl, MemberKind, MonitorAttributes, ParamSig,
    TypeSig,
};
pub use scan::{AssemblyFilter, ProfilingTask, ReflectionCache, ScanBatch, ScanStats};
