//! The priority-ordering convention.
//!
//! Lower values sort first. An explicit order (a component that reports its
//! own) wins over an `@Order` annotation on its class, which wins over
//! [`LOWEST_PRECEDENCE`]. Sorting is stable: equal orders keep declaration
//! order.

use trellis_common::constants::ORDER;
use trellis_common::types::LOWEST_PRECEDENCE;

use crate::metadata::ClassMetadata;

/// Something that carries a priority.
pub trait Ordered {
    /// The priority; lower sorts first.
    fn order(&self) -> i32;
}

/// Reads `@Order(value)` from class metadata.
#[must_use]
pub fn annotated_order(metadata: &ClassMetadata) -> Option<i32> {
    metadata
        .direct_annotation(ORDER)
        .and_then(|a| a.attributes.int("value"))
        .map(clamp_order)
}

/// Resolves the effective order of a component.
#[must_use]
pub fn resolve_order(explicit: Option<i32>, metadata: Option<&ClassMetadata>) -> i32 {
    explicit
        .or_else(|| metadata.and_then(annotated_order))
        .unwrap_or(LOWEST_PRECEDENCE)
}

/// Stable sort by a priority key.
pub fn sort_by_order<T>(items: &mut [T], order: impl Fn(&T) -> i32) {
    items.sort_by_key(|item| order(item));
}

fn clamp_order(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{AnnotationInstance, AnnotationValue};

    fn ordered(name: &str, order: i64) -> ClassMetadata {
        ClassMetadata::new(name)
            .annotated(AnnotationInstance::new(ORDER).with("value", AnnotationValue::Int(order)))
    }

    #[test]
    fn explicit_beats_annotation_beats_default() {
        let meta = ordered("com.a.X", 5);
        assert_eq!(resolve_order(Some(1), Some(&meta)), 1);
        assert_eq!(resolve_order(None, Some(&meta)), 5);
        assert_eq!(resolve_order(None, None), LOWEST_PRECEDENCE);
    }

    #[test]
    fn sort_is_stable_for_equal_orders() {
        let mut items = vec![("a", 2), ("b", 1), ("c", 2), ("d", 1)];
        sort_by_order(&mut items, |(_, o)| *o);
        let names: Vec<_> = items.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn out_of_range_orders_are_clamped() {
        let meta = ordered("com.a.X", i64::MAX);
        assert_eq!(annotated_order(&meta), Some(i32::MAX));
    }
}
