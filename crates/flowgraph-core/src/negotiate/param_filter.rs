use flowgraph_types::{Choice, Pod};

use crate::error::{CoreError, ErrorCode};

/// Treat a plain Pod as the trivial `Choice::None` wrapper so every value
/// can go through the same intersection code (spec §4.5.1: `Choice(None,
/// v) = v`).
fn as_choice(p: &Pod) -> Choice {
    match p {
        Pod::Choice(c) => (**c).clone(),
        other => Choice::None(other.clone()),
    }
}

fn unwrap_choice(c: Choice) -> Pod {
    match c {
        Choice::None(v) => v,
        other => Pod::Choice(Box::new(other)),
    }
}

fn numeric_satisfies_range(value: &Pod, min: &Pod, max: &Pod) -> bool {
    match (value.as_f64(), min.as_f64(), max.as_f64()) {
        (Some(v), Some(lo), Some(hi)) => v >= lo && v <= hi,
        _ => false,
    }
}

fn numeric_satisfies_step(value: &Pod, min: &Pod, max: &Pod, step: &Pod) -> bool {
    match (value.as_f64(), min.as_f64(), max.as_f64(), step.as_f64()) {
        (Some(v), Some(lo), Some(hi), Some(st)) if st > 0.0 => {
            v >= lo && v <= hi && (((v - lo) / st).round() - (v - lo) / st).abs() < 1e-9
        }
        _ => false,
    }
}

fn flags_union(flags: &[Pod]) -> i64 {
    flags.iter().fold(0i64, |acc, f| acc | f.as_i64().unwrap_or(0))
}

/// Does `value` satisfy the constraint `choice` describes?
fn satisfies(value: &Pod, choice: &Choice) -> bool {
    match choice {
        Choice::None(v) => value == v,
        Choice::Range { min, max, .. } => numeric_satisfies_range(value, min, max),
        Choice::Step { min, max, step, .. } => numeric_satisfies_step(value, min, max, step),
        Choice::Enum { alternatives, .. } => alternatives.contains(value),
        Choice::Flags { flags, .. } => match value.as_i64() {
            Some(v) => v & !flags_union(flags) == 0,
            None => false,
        },
    }
}

/// The param-filter intersection over one property's two `Choice`
/// constraints (spec §4.5.1). `filter_choice(a, b) = filter_choice(b, a)`
/// up to default selection, and associative under repeated intersection
/// (spec §8's round-trip law) because every branch only ever narrows the
/// constraint set.
pub fn filter_choice(a: &Choice, b: &Choice) -> Result<Choice, CoreError> {
    if let Choice::None(v) = a {
        return if satisfies(v, b) {
            Ok(Choice::None(v.clone()))
        } else {
            Err(CoreError::new(ErrorCode::FormatIncompatible, "None value does not satisfy peer constraint"))
        };
    }
    if let Choice::None(v) = b {
        return if satisfies(v, a) {
            Ok(Choice::None(v.clone()))
        } else {
            Err(CoreError::new(ErrorCode::FormatIncompatible, "None value does not satisfy peer constraint"))
        };
    }
    if matches!(a, Choice::Step { .. }) || matches!(b, Choice::Step { .. }) {
        return Err(CoreError::new(ErrorCode::NotSupported, "Step choices cannot be intersected"));
    }
    match (a, b) {
        (Choice::Enum { alternatives: alts_a, .. }, Choice::Enum { alternatives: alts_b, .. }) => {
            let kept: Vec<Pod> = alts_a.iter().filter(|v| alts_b.contains(v)).cloned().collect();
            let default = kept.first().cloned().ok_or_else(|| {
                CoreError::new(ErrorCode::FormatIncompatible, "enum intersection is empty")
            })?;
            Ok(Choice::Enum {
                default,
                alternatives: kept,
            })
        }
        (Choice::Range { min: min_a, max: max_a, .. }, Choice::Range { min: min_b, max: max_b, .. }) => {
            let (lo_a, hi_a, lo_b, hi_b) = match (min_a.as_f64(), max_a.as_f64(), min_b.as_f64(), max_b.as_f64()) {
                (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
                _ => return Err(CoreError::new(ErrorCode::NotSupported, "non-numeric range bounds")),
            };
            let lo = lo_a.max(lo_b);
            let hi = hi_a.min(hi_b);
            if lo > hi {
                return Err(CoreError::new(ErrorCode::FormatIncompatible, "range intersection is empty"));
            }
            let min = min_a.from_f64_like(lo);
            let max = max_a.from_f64_like(hi);
            // Clamp each side's own default into the combined range so a
            // lower-priority endpoint's preference still survives where
            // possible; phase 2 picks the final value.
            let default = min_a.from_f64_like(lo);
            Ok(Choice::Range { default, min, max })
        }
        (Choice::Flags { flags: flags_a, .. }, Choice::Flags { flags: flags_b, .. }) => {
            let kept: Vec<Pod> = flags_a.iter().filter(|v| flags_b.contains(v)).cloned().collect();
            let default = kept.first().cloned().unwrap_or_else(|| Pod::Int(0));
            Ok(Choice::Flags {
                default,
                flags: kept,
            })
        }
        _ => Err(CoreError::new(
            ErrorCode::NotSupported,
            "mismatched choice kinds cannot be intersected",
        )),
    }
}

/// Intersect two property lists belonging to POD objects of the same type
/// id (spec §4.5.1). Missing properties on one side are copied from the
/// other.
pub fn filter_properties(a: &[(flowgraph_types::Id, Pod)], b: &[(flowgraph_types::Id, Pod)]) -> Result<Vec<(flowgraph_types::Id, Pod)>, CoreError> {
    let mut result = Vec::new();
    for (id, value_a) in a {
        match b.iter().find(|(bid, _)| bid == id) {
            Some((_, value_b)) => {
                let merged = filter_choice(&as_choice(value_a), &as_choice(value_b))?;
                result.push((*id, unwrap_choice(merged)));
            }
            None => result.push((*id, value_a.clone())),
        }
    }
    for (id, value_b) in b {
        if !a.iter().any(|(aid, _)| aid == id) {
            result.push((*id, value_b.clone()));
        }
    }
    Ok(result)
}

/// Intersect two POD objects of the same type id (spec §4.5.1).
pub fn filter_pod(a: &Pod, b: &Pod) -> Result<Pod, CoreError> {
    let (type_a, props_a) = a
        .as_object()
        .ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "param filter operates on Object pods"))?;
    let (type_b, props_b) = b
        .as_object()
        .ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "param filter operates on Object pods"))?;
    if type_a != type_b {
        return Err(CoreError::new(ErrorCode::FormatIncompatible, "type id mismatch"));
    }
    let properties = filter_properties(props_a, props_b)?;
    Ok(Pod::Object {
        type_id: type_a,
        properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph_types::Id;

    fn obj(type_id: u32, props: Vec<(u32, Pod)>) -> Pod {
        Pod::Object {
            type_id: Id(type_id),
            properties: props.into_iter().map(|(id, p)| (Id(id), p)).collect(),
        }
    }

    #[test]
    fn enum_intersection_keeps_shared_values_in_order() {
        let a = Choice::Enum {
            default: Pod::Int(1),
            alternatives: vec![Pod::Int(1), Pod::Int(2), Pod::Int(3)],
        };
        let b = Choice::Enum {
            default: Pod::Int(3),
            alternatives: vec![Pod::Int(3), Pod::Int(2)],
        };
        let result = filter_choice(&a, &b).unwrap();
        match result {
            Choice::Enum { default, alternatives } => {
                assert_eq!(alternatives, vec![Pod::Int(2), Pod::Int(3)]);
                assert_eq!(default, Pod::Int(2));
            }
            _ => panic!("expected enum"),
        }
    }

    #[test]
    fn enum_intersection_empty_is_format_incompatible() {
        let a = Choice::Enum {
            default: Pod::Int(1),
            alternatives: vec![Pod::Int(1)],
        };
        let b = Choice::Enum {
            default: Pod::Int(2),
            alternatives: vec![Pod::Int(2)],
        };
        let err = filter_choice(&a, &b).unwrap_err();
        assert_eq!(err.code, ErrorCode::FormatIncompatible);
    }

    #[test]
    fn range_intersection_takes_tighter_bounds() {
        let a = Choice::Range {
            default: Pod::Int(44100),
            min: Pod::Int(44100),
            max: Pod::Int(192000),
        };
        let b = Choice::Range {
            default: Pod::Int(48000),
            min: Pod::Int(8000),
            max: Pod::Int(48000),
        };
        let result = filter_choice(&a, &b).unwrap();
        match result {
            Choice::Range { min, max, .. } => {
                assert_eq!(min, Pod::Int(44100));
                assert_eq!(max, Pod::Int(48000));
            }
            _ => panic!("expected range"),
        }
    }

    #[test]
    fn disjoint_ranges_fail() {
        let a = Choice::Range {
            default: Pod::Int(1),
            min: Pod::Int(0),
            max: Pod::Int(10),
        };
        let b = Choice::Range {
            default: Pod::Int(20),
            min: Pod::Int(20),
            max: Pod::Int(30),
        };
        assert!(filter_choice(&a, &b).is_err());
    }

    #[test]
    fn none_against_range_requires_membership() {
        let a = Choice::None(Pod::Int(48000));
        let b = Choice::Range {
            default: Pod::Int(44100),
            min: Pod::Int(44100),
            max: Pod::Int(192000),
        };
        assert_eq!(filter_choice(&a, &b).unwrap(), Choice::None(Pod::Int(48000)));

        let c = Choice::Range {
            default: Pod::Int(1),
            min: Pod::Int(1),
            max: Pod::Int(2),
        };
        assert!(filter_choice(&a, &c).is_err());
    }

    #[test]
    fn step_is_never_supported() {
        let step = Choice::Step {
            default: Pod::Int(0),
            min: Pod::Int(0),
            max: Pod::Int(10),
            step: Pod::Int(2),
        };
        let other = Choice::Enum {
            default: Pod::Int(0),
            alternatives: vec![Pod::Int(0)],
        };
        let err = filter_choice(&step, &other).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotSupported);
    }

    #[test]
    fn missing_property_is_copied_from_the_other_side() {
        let a = obj(1, vec![(10, Pod::Int(1))]);
        let b = obj(1, vec![(10, Pod::Int(1)), (20, Pod::String("x".into()))]);
        let merged = filter_pod(&a, &b).unwrap();
        let (_, props) = merged.as_object().unwrap();
        assert!(props.iter().any(|(id, v)| *id == Id(20) && *v == Pod::String("x".into())));
    }

    #[test]
    fn filter_is_associative() {
        let a = obj(1, vec![(10, Pod::Int(48000))]);
        let range = |min: i32, max: i32| {
            Pod::Choice(Box::new(Choice::Range {
                default: Pod::Int(min),
                min: Pod::Int(min),
                max: Pod::Int(max),
            }))
        };
        let b = obj(1, vec![(10, range(44100, 192000))]);
        let c = obj(1, vec![(10, range(8000, 48000))]);

        let ab_c = filter_pod(&filter_pod(&a, &b).unwrap(), &c).unwrap();
        let bc = filter_pod(&b, &c).unwrap();
        let a_bc = filter_pod(&a, &bc).unwrap();
        assert_eq!(ab_c, a_bc);
    }
}
