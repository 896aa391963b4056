//! Immutable member metadata shared by every unit of a profile

use crate::format::{ValueStyle, colorize, humanize};
use crate::reflection::{MemberDecl, MemberKind, TypeDecl};
use crate::settings::MonitoringSettings;
use crate::value::{MonitorValue, ValueType};

/// Everything about a member that does not depend on a target
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDescriptor {
    /// `Type.member`, used in diagnostics
    pub ident: String,
    pub member_name: String,
    pub declaring_type: String,
    pub kind: MemberKind,
    pub value_type: ValueType,
    pub is_static: bool,
    /// Plain display label; also the unit name the filter matches against
    pub label: String,
    /// Label with markup, used in the rendered state
    pub display_label: String,
    /// Tags matched by `$tag` filter clauses
    pub custom_tags: Vec<String>,
    /// Tags matched by general filter clauses
    pub declared_tags: Vec<String>,
    pub style: ValueStyle,
    /// Initial enabled state of new units
    pub default_enabled: bool,
    pub show_true_count: bool,
    pub show_signature: bool,
    /// `Event<Args>` text for events
    pub signature: Option<String>,
    /// Display labels of `out` parameters, in order
    pub out_labels: Vec<String>,
    /// Arguments passed to a monitored method
    pub default_args: Vec<MonitorValue>,
}

impl MemberDescriptor {
    pub fn new(
        ty: &TypeDecl,
        member: &MemberDecl,
        value_type: ValueType,
        settings: &MonitoringSettings,
    ) -> Self {
        let format = &settings.formatting;
        let colors = &settings.colors;
        let rich = format.rich_text;

        let base = match &member.attrs.label {
            Some(label) => label.clone(),
            None if format.humanize_names => humanize(&member.name, &format.variable_prefixes),
            None => member.name.clone(),
        };

        let kind_color = match member.kind {
            MemberKind::Method => Some(colors.method),
            MemberKind::Event => Some(colors.event),
            _ => None,
        };
        let colored_base = match kind_color {
            Some(color) => colorize(&base, color, rich),
            None => base.clone(),
        };

        let (label, display_label) = if format.add_class_name {
            let sep = format.append_symbol;
            (
                format!("{}{}{}", ty.name, sep, base),
                format!("{}{}{}", colorize(&ty.name, colors.class, rich), sep, colored_base),
            )
        } else {
            (base, colored_base)
        };

        let out_labels = member
            .out_params()
            .map(|p| {
                let name = if format.humanize_names {
                    humanize(&p.name, &format.variable_prefixes)
                } else {
                    p.name.clone()
                };
                colorize(&name, colors.out_param, rich)
            })
            .collect();

        let filtering = &settings.filtering;
        let mut declared_tags = Vec::new();
        if filtering.label {
            declared_tags.push(label.clone());
        }
        if filtering.static_or_instance {
            declared_tags.push(if member.is_static { "Static" } else { "Instance" }.to_string());
        }
        if filtering.value_type {
            declared_tags.push(
                member
                    .signature
                    .clone()
                    .unwrap_or_else(|| value_type.type_name().to_string()),
            );
        }
        if filtering.declaring_type {
            declared_tags.push(ty.name.clone());
        }
        if filtering.member_kind {
            declared_tags.push(member.kind.name().to_string());
        }
        if filtering.tags {
            declared_tags.extend(member.attrs.tags.iter().cloned());
        }

        Self {
            ident: format!("{}.{}", ty.name, member.name),
            member_name: member.name.clone(),
            declaring_type: ty.name.clone(),
            kind: member.kind,
            value_type,
            is_static: member.is_static,
            label,
            display_label,
            custom_tags: member.attrs.tags.clone(),
            declared_tags,
            style: ValueStyle::new(format, colors, member.attrs.precision),
            default_enabled: member.attrs.enabled,
            show_true_count: member.attrs.show_true_count,
            show_signature: member.attrs.show_signature,
            signature: member.signature.clone(),
            out_labels,
            default_args: member.attrs.default_args.clone(),
        }
    }
}
