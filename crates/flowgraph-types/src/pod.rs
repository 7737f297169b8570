use serde::{Deserialize, Serialize};

use crate::id::Id;

/// A self-describing tagged value (spec §3.1).
///
/// Negotiation (flowgraph-core) works entirely at this level; the core never
/// interprets the inner semantics of unknown `Object` types — it only reads
/// declared properties through `Choice`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pod {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Id(Id),
    /// Index into the message's out-of-band fd array (spec §6.1); never a raw fd.
    FdIndex(u32),
    Rectangle { width: u32, height: u32 },
    Fraction { num: u32, denom: u32 },
    Array(Vec<Pod>),
    Struct(Vec<Pod>),
    /// Object-of-properties: a type id plus a property list keyed by property id.
    Object {
        type_id: Id,
        properties: Vec<(Id, Pod)>,
    },
    Choice(Box<Choice>),
    /// Sequence of timed control changes: `(offset, value)`, used for inline
    /// MIDI / automation carried in a buffer's `Control` meta (spec §3.3).
    Sequence(Vec<(u64, Pod)>),
}

/// A choice wrapper constrains a plain value to a set, range, or stepped
/// series (spec §4.5.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Choice {
    /// `Choice(None, v)` = `v`: no actual choice, just the one value.
    None(Pod),
    /// `[min, max]` inclusive interval, with a preferred default.
    Range { default: Pod, min: Pod, max: Pod },
    /// `{min, min+step, ..., <= max}`.
    Step {
        default: Pod,
        min: Pod,
        max: Pod,
        step: Pod,
    },
    /// The set `{v1, v2, ...}`.
    Enum { default: Pod, alternatives: Vec<Pod> },
    /// Subset relation on bitflags.
    Flags { default: Pod, flags: Vec<Pod> },
}

impl Pod {
    /// Numeric value for the ordered scalar variants, used by range/step
    /// intersection. Returns `None` for non-numeric variants (negotiation
    /// treats those as plain-equality fields instead).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Pod::Int(v) => Some(*v as f64),
            Pod::Long(v) => Some(*v as f64),
            Pod::Float(v) => Some(*v as f64),
            Pod::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Pod::Int(v) => Some(*v as i64),
            Pod::Long(v) => Some(*v),
            Pod::Float(v) => Some(*v as i64),
            Pod::Double(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Rebuild this value as the same numeric variant carrying `value`,
    /// falling back to `Double` if self isn't numeric (used by range-clamp
    /// arithmetic, which always operates through `as_f64`/`from_f64_like`).
    pub fn from_f64_like(&self, value: f64) -> Pod {
        match self {
            Pod::Int(_) => Pod::Int(value as i32),
            Pod::Long(_) => Pod::Long(value as i64),
            Pod::Float(_) => Pod::Float(value as f32),
            _ => Pod::Double(value),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Pod::Int(_) | Pod::Long(_) | Pod::Float(_) | Pod::Double(_))
    }

    pub fn as_object(&self) -> Option<(Id, &[(Id, Pod)])> {
        match self {
            Pod::Object { type_id, properties } => Some((*type_id, properties.as_slice())),
            _ => None,
        }
    }
}

impl Choice {
    /// The default value a fixated (single-value) choice should resolve to.
    pub fn default_value(&self) -> &Pod {
        match self {
            Choice::None(v) => v,
            Choice::Range { default, .. } => default,
            Choice::Step { default, .. } => default,
            Choice::Enum { default, .. } => default,
            Choice::Flags { default, .. } => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_coercion_round_trips() {
        let p = Pod::Int(44100);
        assert_eq!(p.as_f64(), Some(44100.0));
        assert_eq!(p.from_f64_like(48000.0), Pod::Int(48000));
    }

    #[test]
    fn non_numeric_has_no_f64() {
        assert_eq!(Pod::String("x".into()).as_f64(), None);
    }

    #[test]
    fn choice_default_value() {
        let c = Choice::Range {
            default: Pod::Int(48000),
            min: Pod::Int(44100),
            max: Pod::Int(192000),
        };
        assert_eq!(c.default_value(), &Pod::Int(48000));
    }
}
