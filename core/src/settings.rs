//! Monitoring settings (`<config dir>/monitoring.toml`)
//!
//! Handles loading, saving, and providing defaults for every tunable of the
//! monitoring system. The settings object is assembled once at startup and
//! handed to each component explicitly (usually behind an `Arc`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCategory;
use crate::logging::LoggingLevel;
use crate::value::Rgba;

/// File name of the settings file inside the config directory
pub const SETTINGS_FILE: &str = "monitoring.toml";

/// Monitoring configuration, organized into sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MonitoringSettings {
    /// Global switches and tick cadence
    #[serde(default)]
    pub general: GeneralSettings,
    /// Per-category error severities
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Filter syntax and matching
    #[serde(default)]
    pub filtering: FilterSettings,
    /// Label and value formatting
    #[serde(default)]
    pub formatting: FormatSettings,
    /// Rich text colors
    #[serde(default)]
    pub colors: ColorSettings,
    /// Assembly denylists for discovery
    #[serde(default)]
    pub assemblies: AssemblySettings,
}

/// General settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Master switch; when off no profiles or units are ever created (default: true)
    #[serde(default = "default_true")]
    pub enable_monitoring: bool,
    /// Run discovery on a background thread (default: true)
    #[serde(default = "default_true")]
    pub async_profiling: bool,
    /// Make the display visible as soon as profiling completes (default: true)
    #[serde(default = "default_true")]
    pub open_display_on_load: bool,
    /// Minimum time between update ticks in milliseconds (default: 50, i.e. 20 Hz)
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    /// Whether the validation tick runs at all (default: true)
    #[serde(default = "default_true")]
    pub validation_enabled: bool,
}

impl GeneralSettings {
    /// Update interval as a duration
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

/// Severity per error category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingSettings {
    #[serde(default = "default_level_none")]
    pub bad_image: LoggingLevel,
    #[serde(default = "default_level_none")]
    pub operation_canceled: LoggingLevel,
    #[serde(default = "default_level_warning")]
    pub thread_abort: LoggingLevel,
    #[serde(default = "default_level_exception")]
    pub unknown: LoggingLevel,
    #[serde(default = "default_level_warning")]
    pub processor_not_found: LoggingLevel,
    #[serde(default = "default_level_warning")]
    pub invalid_processor_signature: LoggingLevel,
}

impl LoggingSettings {
    /// Configured level of a category
    pub fn level(&self, category: ErrorCategory) -> LoggingLevel {
        match category {
            ErrorCategory::BadImage => self.bad_image,
            ErrorCategory::OperationCanceled => self.operation_canceled,
            ErrorCategory::ThreadAbort => self.thread_abort,
            ErrorCategory::ProcessorNotFound => self.processor_not_found,
            ErrorCategory::InvalidProcessorSignature => self.invalid_processor_signature,
            ErrorCategory::Unknown => self.unknown,
        }
    }
}

/// String comparison used by substring filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringComparison {
    /// Exact byte comparison
    Ordinal,
    /// Case-insensitive comparison over Unicode lowercase forms
    #[default]
    IgnoreCase,
}

impl StringComparison {
    /// Whether `needle` occurs in `haystack`
    pub fn contains(self, haystack: &str, needle: &str) -> bool {
        match self {
            StringComparison::Ordinal => haystack.contains(needle),
            StringComparison::IgnoreCase => {
                if needle.is_empty() {
                    return true;
                }
                haystack.to_lowercase().contains(&needle.to_lowercase())
            }
        }
    }
}

/// Filter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Expose the display label as a tag (default: true)
    #[serde(default = "default_true")]
    pub label: bool,
    /// Expose "Static"/"Instance" as a tag (default: true)
    #[serde(default = "default_true")]
    pub static_or_instance: bool,
    /// Expose the value type name as a tag (default: true)
    #[serde(default = "default_true")]
    pub value_type: bool,
    /// Expose the declaring type name as a tag (default: true)
    #[serde(default = "default_true")]
    pub declaring_type: bool,
    /// Expose the member kind ("Field", "Event", ...) as a tag (default: true)
    #[serde(default = "default_true")]
    pub member_kind: bool,
    /// Expose custom tags to the general filter branch (default: true)
    #[serde(default = "default_true")]
    pub tags: bool,
    /// Comparison used for substring matches; absolute matches are always case-sensitive
    #[serde(default)]
    pub comparison: StringComparison,
    /// Separates independent clauses (default: '&')
    #[serde(default = "default_filter_append")]
    pub append_symbol: char,
    /// Negates a clause (default: '!')
    #[serde(default = "default_filter_negate")]
    pub negate_symbol: char,
    /// Prefix match against the unit name only (default: '@')
    #[serde(default = "default_filter_absolute")]
    pub absolute_symbol: char,
    /// Match against custom tags only (default: '$')
    #[serde(default = "default_filter_tag")]
    pub tag_symbol: char,
}

/// Formatting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatSettings {
    /// Prefix labels with the declaring type name (default: false)
    #[serde(default)]
    pub add_class_name: bool,
    /// Separator between class name and member label (default: '.')
    #[serde(default = "default_format_append")]
    pub append_symbol: char,
    /// Turn `_playerHealth` into `Player Health` (default: true)
    #[serde(default = "default_true")]
    pub humanize_names: bool,
    /// Prefixes stripped before humanizing
    #[serde(default = "default_variable_prefixes")]
    pub variable_prefixes: Vec<String>,
    /// Emit `<color=...>` markup (default: true)
    #[serde(default = "default_true")]
    pub rich_text: bool,
    /// Decimal places for floats and vectors unless a member overrides it (default: 2)
    #[serde(default = "default_float_precision")]
    pub float_precision: usize,
}

/// Rich text colors, packed as `0xRRGGBBAA`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorSettings {
    #[serde(default = "default_true_color")]
    pub true_color: Rgba,
    #[serde(default = "default_false_color")]
    pub false_color: Rgba,
    #[serde(default = "default_x_color")]
    pub x: Rgba,
    #[serde(default = "default_y_color")]
    pub y: Rgba,
    #[serde(default = "default_z_color")]
    pub z: Rgba,
    #[serde(default = "default_w_color")]
    pub w: Rgba,
    #[serde(default = "default_class_color")]
    pub class: Rgba,
    #[serde(default = "default_event_color")]
    pub event: Rgba,
    #[serde(default = "default_method_color")]
    pub method: Rgba,
    #[serde(default = "default_out_param_color")]
    pub out_param: Rgba,
}

/// Assembly denylists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblySettings {
    /// Assemblies whose name starts with one of these are never scanned
    #[serde(default = "default_banned_prefixes")]
    pub banned_prefixes: Vec<String>,
    /// Assemblies with exactly these names are never scanned
    #[serde(default = "default_banned_names")]
    pub banned_names: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_update_interval_ms() -> u64 {
    50
}
fn default_level_none() -> LoggingLevel {
    LoggingLevel::None
}
fn default_level_warning() -> LoggingLevel {
    LoggingLevel::Warning
}
fn default_level_exception() -> LoggingLevel {
    LoggingLevel::Exception
}
fn default_filter_append() -> char {
    '&'
}
fn default_filter_negate() -> char {
    '!'
}
fn default_filter_absolute() -> char {
    '@'
}
fn default_filter_tag() -> char {
    '$'
}
fn default_format_append() -> char {
    '.'
}
fn default_variable_prefixes() -> Vec<String> {
    ["m_", "s_", "r_", "_"].iter().map(|s| s.to_string()).collect()
}
fn default_float_precision() -> usize {
    2
}
fn default_true_color() -> Rgba {
    Rgba(0x00FF00FF)
}
fn default_false_color() -> Rgba {
    Rgba(0xFF0000FF)
}
fn default_x_color() -> Rgba {
    Rgba(0x6961FFFF)
}
fn default_y_color() -> Rgba {
    Rgba(0x7DFF87FF)
}
fn default_z_color() -> Rgba {
    Rgba(0xFF6159FF)
}
fn default_w_color() -> Rgba {
    Rgba(0x9900FFFF)
}
fn default_class_color() -> Rgba {
    Rgba(0x7D7DFFFF)
}
fn default_event_color() -> Rgba {
    Rgba(0xFFEB87FF)
}
fn default_method_color() -> Rgba {
    Rgba(0x8FFA87FF)
}
fn default_out_param_color() -> Rgba {
    Rgba(0xFF4587FF)
}
fn default_banned_prefixes() -> Vec<String> {
    vec!["tracing".to_string(), "serde".to_string()]
}
fn default_banned_names() -> Vec<String> {
    vec!["std".to_string(), "core".to_string(), "alloc".to_string()]
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            enable_monitoring: default_true(),
            async_profiling: default_true(),
            open_display_on_load: default_true(),
            update_interval_ms: default_update_interval_ms(),
            validation_enabled: default_true(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            bad_image: default_level_none(),
            operation_canceled: default_level_none(),
            thread_abort: default_level_warning(),
            unknown: default_level_exception(),
            processor_not_found: default_level_warning(),
            invalid_processor_signature: default_level_warning(),
        }
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            label: true,
            static_or_instance: true,
            value_type: true,
            declaring_type: true,
            member_kind: true,
            tags: true,
            comparison: StringComparison::default(),
            append_symbol: default_filter_append(),
            negate_symbol: default_filter_negate(),
            absolute_symbol: default_filter_absolute(),
            tag_symbol: default_filter_tag(),
        }
    }
}

impl Default for FormatSettings {
    fn default() -> Self {
        Self {
            add_class_name: false,
            append_symbol: default_format_append(),
            humanize_names: default_true(),
            variable_prefixes: default_variable_prefixes(),
            rich_text: default_true(),
            float_precision: default_float_precision(),
        }
    }
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            true_color: default_true_color(),
            false_color: default_false_color(),
            x: default_x_color(),
            y: default_y_color(),
            z: default_z_color(),
            w: default_w_color(),
            class: default_class_color(),
            event: default_event_color(),
            method: default_method_color(),
            out_param: default_out_param_color(),
        }
    }
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            banned_prefixes: default_banned_prefixes(),
            banned_names: default_banned_names(),
        }
    }
}

/// Errors raised while reading or writing a settings file
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("settings could not be serialized: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Returns the platform-specific configuration directory.
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("rs", "lookout", "Lookout")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

impl MonitoringSettings {
    /// Load settings from the platform config directory.
    ///
    /// Returns default values if the file doesn't exist or cannot be parsed.
    pub fn load() -> Self {
        let Some(path) = config_dir().map(|dir| dir.join(SETTINGS_FILE)) else {
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(SettingsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load settings from an explicit path
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save settings to the platform config directory, creating it if needed
    pub fn save(&self) -> Result<(), SettingsError> {
        if let Some(dir) = config_dir() {
            self.save_to(&dir.join(SETTINGS_FILE))?;
        }
        Ok(())
    }

    /// Save settings to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
