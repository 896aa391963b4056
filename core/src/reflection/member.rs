//! Member declarations and discovery rules

use std::fmt;

use hashbrown::HashMap;
use smallvec::SmallVec;

use super::accessor::Accessor;
use crate::error::MonitorError;
use crate::value::{MonitorValue, ValueType};

/// Shape of a declared member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Property,
    Method,
    Event,
}

impl MemberKind {
    pub fn name(self) -> &'static str {
        match self {
            MemberKind::Field => "Field",
            MemberKind::Property => "Property",
            MemberKind::Method => "Method",
            MemberKind::Event => "Event",
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Annotation that opts a member into monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// Generic marker accepted on any member kind
    Monitor,
    MonitorField,
    MonitorProperty,
    MonitorMethod,
    MonitorEvent,
}

/// Declared value type of a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSig {
    Resolved(ValueType),
    /// Open generic parameter that was never closed over a concrete type
    Generic(String),
}

/// Method parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSig {
    pub name: String,
    pub value_type: ValueType,
    /// Written by the method instead of passed in
    pub is_out: bool,
}

impl ParamSig {
    pub fn input(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            is_out: false,
        }
    }

    pub fn out(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            is_out: true,
        }
    }
}

/// Options carried by a member's marker
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorAttributes {
    /// Display label replacing the humanized member name
    pub label: Option<String>,
    /// Custom tags, matched by `$tag` filters
    pub tags: Vec<String>,
    /// Name of a value processor declared on the same type
    pub processor: Option<String>,
    /// Float precision override
    pub precision: Option<usize>,
    /// Arguments passed to a monitored method on every refresh
    pub default_args: Vec<MonitorValue>,
    /// Event counts include the unit's own counting handler
    pub show_true_count: bool,
    /// Event units show the handler signature instead of the label
    pub show_signature: bool,
    /// Initial enabled state of units created from this member
    pub enabled: bool,
}

impl Default for MonitorAttributes {
    fn default() -> Self {
        Self {
            label: None,
            tags: Vec::new(),
            processor: None,
            precision: None,
            default_args: Vec::new(),
            show_true_count: false,
            show_signature: false,
            enabled: true,
        }
    }
}

/// One declared member of a type
#[derive(Clone)]
pub struct MemberDecl {
    pub name: String,
    pub kind: MemberKind,
    /// Members without a marker are never profiled
    pub marker: Option<MarkerKind>,
    pub is_static: bool,
    pub sig: TypeSig,
    pub params: Vec<ParamSig>,
    /// `Event<Args>` text for events
    pub signature: Option<String>,
    pub attrs: MonitorAttributes,
    /// `None` when the member cannot be accessed from outside its type
    pub accessor: Option<Accessor>,
}

impl fmt::Debug for MemberDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberDecl")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("marker", &self.marker)
            .field("is_static", &self.is_static)
            .field("sig", &self.sig)
            .field("accessor", &self.accessor.as_ref().map(Accessor::shape))
            .finish()
    }
}

impl MemberDecl {
    /// Marked instance member without an accessor
    pub fn new(name: &str, kind: MemberKind, sig: TypeSig) -> Self {
        Self {
            name: name.to_string(),
            kind,
            marker: Some(MarkerKind::Monitor),
            is_static: false,
            sig,
            params: Vec::new(),
            signature: None,
            attrs: MonitorAttributes::default(),
            accessor: None,
        }
    }

    /// Number of parameters passed in (not `out`)
    pub fn input_count(&self) -> usize {
        self.params.iter().filter(|p| !p.is_out).count()
    }

    /// Names of `out` parameters, in declaration order
    pub fn out_params(&self) -> impl Iterator<Item = &ParamSig> {
        self.params.iter().filter(|p| p.is_out)
    }

    /// Verify the member fits an accessor shape, returning its value type
    pub(crate) fn check(&self, owner: &str) -> Result<ValueType, MonitorError> {
        let incompatible = |reason: String| MonitorError::IncompatibleMember {
            member: format!("{}.{}", owner, self.name),
            reason,
        };

        let value_type = match &self.sig {
            TypeSig::Resolved(value_type) => *value_type,
            TypeSig::Generic(param) => {
                return Err(incompatible(format!(
                    "unresolvable generic argument '{}'",
                    param
                )));
            }
        };

        let Some(accessor) = &self.accessor else {
            return Err(incompatible("member is not accessible".to_string()));
        };

        if !accessor.fits(self.kind) {
            return Err(incompatible(format!(
                "{} accessor does not fit a {}",
                accessor.shape(),
                self.kind
            )));
        }

        if self.kind == MemberKind::Method {
            let has_out = self.out_params().next().is_some();
            if has_out != matches!(accessor, Accessor::MethodWithOut { .. }) {
                return Err(incompatible(format!(
                    "{} accessor does not match its out parameters",
                    accessor.shape()
                )));
            }
            let expected = self.input_count();
            let provided = self.attrs.default_args.len();
            if expected != provided {
                return Err(incompatible(format!(
                    "expects {} argument(s), {} provided",
                    expected, provided
                )));
            }
        }

        Ok(value_type)
    }
}

/// Handling rule for one marker kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerRule {
    /// Member kinds the marker may be placed on
    pub allowed: SmallVec<[MemberKind; 4]>,
}

/// Mapping from marker kind to handling rule
///
/// Members whose marker has no rule are ignored. Members whose marker has a
/// rule that does not allow their kind are incompatible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRules {
    rules: HashMap<MarkerKind, MarkerRule>,
}

impl Default for DiscoveryRules {
    fn default() -> Self {
        use MemberKind::*;

        let mut rules = Self {
            rules: HashMap::new(),
        };
        rules.allow(MarkerKind::Monitor, &[Field, Property, Method, Event]);
        rules.allow(MarkerKind::MonitorField, &[Field]);
        rules.allow(MarkerKind::MonitorProperty, &[Property]);
        rules.allow(MarkerKind::MonitorMethod, &[Method]);
        rules.allow(MarkerKind::MonitorEvent, &[Event]);
        rules
    }
}

impl DiscoveryRules {
    /// Rules that accept nothing
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Set the member kinds a marker applies to
    pub fn allow(&mut self, marker: MarkerKind, kinds: &[MemberKind]) -> &mut Self {
        self.rules.insert(
            marker,
            MarkerRule {
                allowed: kinds.iter().copied().collect(),
            },
        );
        self
    }

    /// Stop handling a marker; members carrying it are ignored
    pub fn ignore(&mut self, marker: MarkerKind) -> &mut Self {
        self.rules.remove(&marker);
        self
    }

    pub fn rule(&self, marker: MarkerKind) -> Option<&MarkerRule> {
        self.rules.get(&marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let rules = DiscoveryRules::default();
        let monitor = rules.rule(MarkerKind::Monitor).unwrap();
        assert_eq!(monitor.allowed.len(), 4);

        let events = rules.rule(MarkerKind::MonitorEvent).unwrap();
        assert_eq!(events.allowed.as_slice(), &[MemberKind::Event]);
    }

    #[test]
    fn test_ignore_marker() {
        let mut rules = DiscoveryRules::default();
        rules.ignore(MarkerKind::MonitorMethod);
        assert!(rules.rule(MarkerKind::MonitorMethod).is_none());
        assert!(DiscoveryRules::empty().rule(MarkerKind::Monitor).is_none());
    }

    #[test]
    fn test_check_rejects_generic_and_inaccessible() {
        let generic = MemberDecl::new("items", MemberKind::Field, TypeSig::Generic("T".into()));
        let err = generic.check("Inventory").unwrap_err();
        assert!(matches!(err, MonitorError::IncompatibleMember { .. }));
        assert!(err.to_string().contains("'T'"));

        let hidden = MemberDecl::new("secret", MemberKind::Field, TypeSig::Resolved(ValueType::I32));
        let err = hidden.check("Vault").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Vault.secret is incompatible: member is not accessible"
        );
    }

    #[test]
    fn test_param_counts() {
        let mut decl = MemberDecl::new("roll", MemberKind::Method, TypeSig::Resolved(ValueType::I32));
        decl.params = vec![
            ParamSig::input("sides", ValueType::I32),
            ParamSig::out("bonus", ValueType::I32),
            ParamSig::input("dice", ValueType::I32),
        ];
        assert_eq!(decl.input_count(), 2);
        assert_eq!(
            decl.out_params().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["bonus"]
        );
    }
}
