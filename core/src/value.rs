//! Monitored value representation
//!
//! Accessors erase the member's concrete type into a [`MonitorValue`]; the
//! matching [`ValueType`] is known up front and stored in the descriptor.

use std::fmt;

use glam::{Quat, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Value type identifier for monitored members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Methods returning nothing
    Unit,
    Bool,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    String,

    // Vector types
    Vec2,
    Vec3,
    Vec4,
    Quat,

    /// Packed 0xRRGGBBAA color
    Color,
    /// Sequence of values
    List,
}

impl ValueType {
    /// Get a human-readable type name
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueType::Unit => "()",
            ValueType::Bool => "bool",
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::U32 => "u32",
            ValueType::U64 => "u64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::String => "String",
            ValueType::Vec2 => "Vec2",
            ValueType::Vec3 => "Vec3",
            ValueType::Vec4 => "Vec4",
            ValueType::Quat => "Quat",
            ValueType::Color => "Color",
            ValueType::List => "List",
        }
    }

    /// Number of colored components for vector types
    pub fn components(&self) -> Option<usize> {
        match self {
            ValueType::Vec2 => Some(2),
            ValueType::Vec3 => Some(3),
            ValueType::Vec4 | ValueType::Quat => Some(4),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Color packed as `0xRRGGBBAA`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rgba(pub u32);

impl Rgba {
    /// Build from 8-bit channels
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self(((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | (a as u32))
    }

    /// Channels as (r, g, b, a)
    pub fn channels(&self) -> (u8, u8, u8, u8) {
        (
            ((self.0 >> 24) & 0xFF) as u8,
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }

    /// `#RRGGBBAA` form used in rich text markup
    pub fn to_hex(&self) -> String {
        format!("#{:08X}", self.0)
    }
}

/// Runtime value of a monitored member
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorValue {
    Unit,
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Quat(Quat),
    Color(Rgba),
    List(Vec<MonitorValue>),
}

impl MonitorValue {
    /// Get the value type for this value
    pub fn value_type(&self) -> ValueType {
        match self {
            MonitorValue::Unit => ValueType::Unit,
            MonitorValue::Bool(_) => ValueType::Bool,
            MonitorValue::I32(_) => ValueType::I32,
            MonitorValue::I64(_) => ValueType::I64,
            MonitorValue::U32(_) => ValueType::U32,
            MonitorValue::U64(_) => ValueType::U64,
            MonitorValue::F32(_) => ValueType::F32,
            MonitorValue::F64(_) => ValueType::F64,
            MonitorValue::String(_) => ValueType::String,
            MonitorValue::Vec2(_) => ValueType::Vec2,
            MonitorValue::Vec3(_) => ValueType::Vec3,
            MonitorValue::Vec4(_) => ValueType::Vec4,
            MonitorValue::Quat(_) => ValueType::Quat,
            MonitorValue::Color(_) => ValueType::Color,
            MonitorValue::List(_) => ValueType::List,
        }
    }

    /// Numeric view of scalar values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MonitorValue::I32(v) => Some(*v as f64),
            MonitorValue::I64(v) => Some(*v as f64),
            MonitorValue::U32(v) => Some(*v as f64),
            MonitorValue::U64(v) => Some(*v as f64),
            MonitorValue::F32(v) => Some(*v as f64),
            MonitorValue::F64(v) => Some(*v),
            MonitorValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Vector components as a padded `Vec4`
    pub fn components(&self) -> Option<[f32; 4]> {
        match self {
            MonitorValue::Vec2(v) => Some([v.x, v.y, 0.0, 0.0]),
            MonitorValue::Vec3(v) => Some([v.x, v.y, v.z, 0.0]),
            MonitorValue::Vec4(v) => Some(v.to_array()),
            MonitorValue::Quat(q) => Some(q.to_array()),
            _ => None,
        }
    }
}

/// Types that can be registered as monitored members
///
/// Implemented for the primitive, vector and string types the formatter
/// understands. The associated value type is used at discovery time to
/// validate processors and pick a formatting policy.
pub trait Monitorable: Into<MonitorValue> + 'static {
    fn value_type() -> ValueType;
}

macro_rules! impl_monitorable {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for MonitorValue {
                fn from(v: $ty) -> Self {
                    MonitorValue::$variant(v)
                }
            }

            impl Monitorable for $ty {
                fn value_type() -> ValueType {
                    ValueType::$variant
                }
            }

            impl TryFrom<MonitorValue> for $ty {
                type Error = MonitorValue;

                fn try_from(value: MonitorValue) -> Result<Self, Self::Error> {
                    match value {
                        MonitorValue::$variant(v) => Ok(v),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

impl_monitorable! {
    bool => Bool,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    String => String,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Quat => Quat,
    Rgba => Color,
}

// Floats widen from any numeric value so `value_as::<f32>()` works on integer members.
impl From<f32> for MonitorValue {
    fn from(v: f32) -> Self {
        MonitorValue::F32(v)
    }
}

impl Monitorable for f32 {
    fn value_type() -> ValueType {
        ValueType::F32
    }
}

impl TryFrom<MonitorValue> for f32 {
    type Error = MonitorValue;

    fn try_from(value: MonitorValue) -> Result<Self, Self::Error> {
        match value {
            MonitorValue::F32(v) => Ok(v),
            MonitorValue::Bool(_) | MonitorValue::Unit => Err(value),
            other => other.as_f64().map(|v| v as f32).ok_or(other),
        }
    }
}

impl From<f64> for MonitorValue {
    fn from(v: f64) -> Self {
        MonitorValue::F64(v)
    }
}

impl Monitorable for f64 {
    fn value_type() -> ValueType {
        ValueType::F64
    }
}

impl TryFrom<MonitorValue> for f64 {
    type Error = MonitorValue;

    fn try_from(value: MonitorValue) -> Result<Self, Self::Error> {
        match value {
            MonitorValue::Bool(_) | MonitorValue::Unit => Err(value),
            other => other.as_f64().ok_or(other),
        }
    }
}

impl From<()> for MonitorValue {
    fn from(_: ()) -> Self {
        MonitorValue::Unit
    }
}

impl Monitorable for () {
    fn value_type() -> ValueType {
        ValueType::Unit
    }
}

impl From<&str> for MonitorValue {
    fn from(v: &str) -> Self {
        MonitorValue::String(v.to_string())
    }
}

impl<T: Monitorable> From<Vec<T>> for MonitorValue {
    fn from(v: Vec<T>) -> Self {
        MonitorValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Monitorable> Monitorable for Vec<T> {
    fn value_type() -> ValueType {
        ValueType::List
    }
}
