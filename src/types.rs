//! Builtin value types, typed variables and concrete values.
//!
//! Integer types follow two's-complement bit-vector semantics of their width,
//! so every arithmetic operation wraps around on overflow.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The small set of builtin types a variable or constant can have.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum BuiltinType {
    SInt8,
    SInt16,
    SInt32,
    SInt64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Bool,
    Float,
    Double,
    Decimal,
}

impl BuiltinType {
    pub const ALL: [BuiltinType; 12] = [
        BuiltinType::SInt8,
        BuiltinType::SInt16,
        BuiltinType::SInt32,
        BuiltinType::SInt64,
        BuiltinType::UInt8,
        BuiltinType::UInt16,
        BuiltinType::UInt32,
        BuiltinType::UInt64,
        BuiltinType::Bool,
        BuiltinType::Float,
        BuiltinType::Double,
        BuiltinType::Decimal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinType::SInt8 => "sint8",
            BuiltinType::SInt16 => "sint16",
            BuiltinType::SInt32 => "sint32",
            BuiltinType::SInt64 => "sint64",
            BuiltinType::UInt8 => "uint8",
            BuiltinType::UInt16 => "uint16",
            BuiltinType::UInt32 => "uint32",
            BuiltinType::UInt64 => "uint64",
            BuiltinType::Bool => "bool",
            BuiltinType::Float => "float",
            BuiltinType::Double => "double",
            BuiltinType::Decimal => "decimal",
        }
    }

    /// Number of bits in the bit-vector encoding, `None` for non-integral types.
    pub fn width(self) -> Option<u32> {
        match self {
            BuiltinType::Bool => Some(1),
            BuiltinType::SInt8 | BuiltinType::UInt8 => Some(8),
            BuiltinType::SInt16 | BuiltinType::UInt16 => Some(16),
            BuiltinType::SInt32 | BuiltinType::UInt32 => Some(32),
            BuiltinType::SInt64 | BuiltinType::UInt64 => Some(64),
            BuiltinType::Float | BuiltinType::Double | BuiltinType::Decimal => None,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            BuiltinType::SInt8 | BuiltinType::SInt16 | BuiltinType::SInt32 | BuiltinType::SInt64
        )
    }

    pub fn is_integer(self) -> bool {
        self.width().is_some() && self != BuiltinType::Bool
    }

    pub fn is_bool(self) -> bool {
        self == BuiltinType::Bool
    }

    /// Value a state variable holds before any transition fired.
    pub fn default_value(self) -> Value {
        match self {
            BuiltinType::Bool => Value::Bool(false),
            BuiltinType::Float | BuiltinType::Double | BuiltinType::Decimal => Value::Real {
                text: "0.0".to_string(),
                ty: self,
            },
            _ => Value::Int { bits: 0, ty: self },
        }
    }

    /// Truncates `value` to the width of this type and sign-extends it back
    /// into an `i64` if the type is signed.
    pub fn wrap(self, value: i128) -> i64 {
        let width = self.width().unwrap_or(64);
        let raw = (value as u64) & mask(width);
        if self.is_signed() && width < 64 && (raw >> (width - 1)) & 1 == 1 {
            (raw | !mask(width)) as i64
        } else {
            raw as i64
        }
    }
}

pub(crate) fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for BuiltinType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        BuiltinType::ALL
            .into_iter()
            .find(|ty| ty.name().eq_ignore_ascii_case(token))
            .ok_or_else(|| Error::UnknownType(token.to_string()))
    }
}

/// A typed symbol. Identity is the pair (name, type).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Variable {
    pub name: String,
    pub ty: BuiltinType,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: BuiltinType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// The next-state counterpart `name'` of this variable.
    pub fn primed(&self) -> Variable {
        Variable::new(format!("{}'", self.name), self.ty)
    }

    pub fn is_primed(&self) -> bool {
        self.name.ends_with('\'')
    }

    /// Strips a trailing prime, if any.
    pub fn unprimed(&self) -> Variable {
        Variable::new(self.name.trim_end_matches('\''), self.ty)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A concrete value of some builtin type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    /// Integer stored as its two's-complement bits, already wrapped to the type width.
    Int { bits: i64, ty: BuiltinType },
    /// Floating point and decimal values are kept in their textual form.
    Real { text: String, ty: BuiltinType },
}

impl Value {
    pub fn int(value: i64, ty: BuiltinType) -> Self {
        Value::Int {
            bits: ty.wrap(value as i128),
            ty,
        }
    }

    /// Builds a value from the raw low `width` bits of a bit-vector model.
    pub fn from_bits(bits: u64, ty: BuiltinType) -> Self {
        match ty {
            BuiltinType::Bool => Value::Bool(bits & 1 == 1),
            _ => Value::Int {
                bits: ty.wrap(bits as i128),
                ty,
            },
        }
    }

    /// Parses the textual form of a value of type `ty`.
    pub fn parse(text: &str, ty: BuiltinType) -> Option<Self> {
        let text = text.trim();
        match ty {
            BuiltinType::Bool => match text.to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            BuiltinType::Float | BuiltinType::Double | BuiltinType::Decimal => {
                text.parse::<f64>().ok().map(|_| Value::Real {
                    text: text.to_string(),
                    ty,
                })
            }
            _ => {
                let parsed = text.parse::<i128>().ok()?;
                Some(Value::Int {
                    bits: ty.wrap(parsed),
                    ty,
                })
            }
        }
    }

    pub fn ty(&self) -> BuiltinType {
        match self {
            Value::Bool(_) => BuiltinType::Bool,
            Value::Int { ty, .. } | Value::Real { ty, .. } => *ty,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int { bits, ty } if ty.is_signed() => write!(f, "{}", bits),
            Value::Int { bits, .. } => write!(f, "{}", *bits as u64),
            Value::Real { text, .. } => write!(f, "{}", text),
        }
    }
}
