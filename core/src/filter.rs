//! Filter expressions over unit names and tags
//!
//! A filter is a list of clauses joined by the append symbol. Every clause
//! either enables a unit, disables it or has no opinion; clauses are folded
//! left to right starting from disabled, so later clauses win.
//!
//! ```text
//! Health          units whose name, target or tags contain "Health"
//! !Health         every unit except those
//! @Player         units whose name starts with "Player" (case-sensitive)
//! $boss           units carrying a custom tag containing "boss"
//! Health&!Enemy   both clauses, the second one last
//! ```

use crate::scheduler::UpdateScheduler;
use crate::settings::{FilterSettings, StringComparison};
use crate::unit::{Unit, UnitStore};

/// Outcome of one clause for one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Enable,
    Disable,
    NoMatch,
}

/// Matching mode selected by the clause marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    /// Name, then target name, then declared tags
    General,
    /// Case-sensitive prefix of the unit name
    Absolute,
    /// Custom tags only
    Tag,
}

/// One parsed clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub kind: ClauseKind,
    pub negated: bool,
    /// Text matched against, marker removed
    pub text: String,
}

/// Fields of a unit a filter looks at
#[derive(Debug, Clone, Copy)]
pub struct FilterSubject<'a> {
    pub name: &'a str,
    pub target_name: &'a str,
    pub declared_tags: &'a [String],
    pub custom_tags: &'a [String],
}

impl<'a> From<&'a Unit> for FilterSubject<'a> {
    fn from(unit: &'a Unit) -> Self {
        let descriptor = unit.descriptor();
        Self {
            name: unit.name(),
            target_name: unit.target_name(),
            declared_tags: &descriptor.declared_tags,
            custom_tags: &descriptor.custom_tags,
        }
    }
}

/// Parsed filter expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<Clause>,
    comparison: StringComparison,
}

impl Filter {
    /// Parse `text` with the symbols configured in `settings`
    pub fn parse(text: &str, settings: &FilterSettings) -> Self {
        let clauses = text
            .split(settings.append_symbol)
            .filter_map(|raw| parse_clause(raw, settings))
            .collect();
        Self {
            clauses,
            comparison: settings.comparison,
        }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Whether a unit ends up enabled
    pub fn decide(&self, subject: &FilterSubject<'_>) -> bool {
        self.clauses
            .iter()
            .fold(false, |enabled, clause| match self.evaluate(clause, subject) {
                Decision::Enable => true,
                Decision::Disable => false,
                Decision::NoMatch => enabled,
            })
    }

    /// Outcome of a single clause
    pub fn evaluate(&self, clause: &Clause, subject: &FilterSubject<'_>) -> Decision {
        match clause.kind {
            ClauseKind::Absolute => {
                if subject.name.starts_with(clause.text.as_str()) {
                    Decision::Enable
                } else {
                    Decision::NoMatch
                }
            }
            ClauseKind::Tag => {
                if clause.text.is_empty() {
                    return Decision::Disable;
                }
                let tagged = subject
                    .custom_tags
                    .iter()
                    .any(|tag| self.comparison.contains(tag, &clause.text));
                if tagged {
                    Decision::Enable
                } else {
                    Decision::NoMatch
                }
            }
            ClauseKind::General => {
                let matched = self.general_match(&clause.text, subject);
                match (matched, clause.negated) {
                    (true, false) => Decision::Enable,
                    (true, true) => Decision::Disable,
                    (false, true) => Decision::Enable,
                    (false, false) => Decision::NoMatch,
                }
            }
        }
    }

    /// Names are matched as displayed; only declared tags lose their spaces
    fn general_match(&self, text: &str, subject: &FilterSubject<'_>) -> bool {
        self.comparison.contains(subject.name, text)
            || self.comparison.contains(subject.target_name, text)
            || subject
                .declared_tags
                .iter()
                .any(|tag| self.comparison.contains(&strip_spaces(tag), text))
    }
}

fn parse_clause(raw: &str, settings: &FilterSettings) -> Option<Clause> {
    let compact = strip_spaces(raw);
    let mut chars = compact.chars();
    let first = chars.next()?;
    let rest = chars.as_str();

    let clause = if first == settings.negate_symbol {
        Clause {
            kind: ClauseKind::General,
            negated: true,
            text: letters_only(rest),
        }
    } else if first == settings.absolute_symbol {
        Clause {
            kind: ClauseKind::Absolute,
            negated: false,
            text: rest.to_string(),
        }
    } else if first == settings.tag_symbol {
        Clause {
            kind: ClauseKind::Tag,
            negated: false,
            text: letters_only(rest),
        }
    } else {
        Clause {
            kind: ClauseKind::General,
            negated: false,
            text: letters_only(&compact),
        }
    };
    Some(clause)
}

fn strip_spaces(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Keeps letters, digits and the characters of generic names
fn letters_only(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '<' | '>' | '_'))
        .collect()
}

// ============================================================================
// Engine
// ============================================================================

/// Applies filters to the unit store and keeps the active set in sync
#[derive(Debug)]
pub struct FilterEngine {
    settings: FilterSettings,
    active: Option<(String, Filter)>,
}

impl FilterEngine {
    pub fn new(settings: &FilterSettings) -> Self {
        Self {
            settings: settings.clone(),
            active: None,
        }
    }

    /// Text of the filter currently applied
    pub fn active_filter(&self) -> Option<&str> {
        self.active.as_ref().map(|(text, _)| text.as_str())
    }

    /// Decision of the active filter for a new unit, if a filter is applied
    pub fn decide(&self, unit: &Unit) -> Option<bool> {
        self.active
            .as_ref()
            .map(|(_, filter)| filter.decide(&FilterSubject::from(unit)))
    }

    /// Recompute every unit's enabled flag from `text`
    ///
    /// Validation is suspended until the filter is reset. Blank text resets.
    pub fn apply(&mut self, text: &str, units: &mut UnitStore, scheduler: &mut UpdateScheduler) {
        if text.trim().is_empty() {
            self.reset(units, scheduler);
            return;
        }

        let filter = Filter::parse(text, &self.settings);
        let mut enabled_count = 0;
        units.for_each_mut(|id, unit| {
            let enabled = filter.decide(&FilterSubject::from(&*unit));
            unit.set_enabled(enabled);
            if enabled {
                enabled_count += 1;
                scheduler.activate(id);
            } else {
                scheduler.deactivate(id);
            }
        });
        scheduler.set_validation_suspended(true);

        tracing::debug!(
            "Filter '{}' ({} clauses) enabled {} of {} units",
            text,
            filter.clauses().len(),
            enabled_count,
            units.len()
        );
        self.active = Some((text.to_string(), filter));
    }

    /// Restore every unit to its default enabled state and resume validation
    pub fn reset(&mut self, units: &mut UnitStore, scheduler: &mut UpdateScheduler) {
        if self.active.take().is_none() {
            return;
        }

        units.for_each_mut(|id, unit| {
            let enabled = unit.descriptor().default_enabled;
            unit.set_enabled(enabled);
            if enabled {
                scheduler.activate(id);
            } else {
                scheduler.deactivate(id);
            }
        });
        scheduler.set_validation_suspended(false);
        tracing::debug!("Filter reset");
    }
}
