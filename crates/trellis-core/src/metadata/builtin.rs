//! Metadata of the built-in annotation types.

use trellis_common::constants::{
    BUILTIN_ANNOTATIONS, COMPONENT, CONDITIONAL, CONFIGURATION, CONTROLLER, PROFILE,
    PROFILE_CONDITION, REPOSITORY, SERVICE,
};

use super::{AnnotationInstance, AnnotationValue, ClassKind, ClassMetadata};

/// Returns annotation-type metadata for every built-in annotation.
///
/// Stereotypes and `@Configuration` are meta-annotated with `@Component`;
/// `@Profile` is meta-annotated with `@Conditional(ProfileCondition)`.
#[must_use]
pub fn builtin_annotation_types() -> Vec<ClassMetadata> {
    BUILTIN_ANNOTATIONS
        .iter()
        .map(|(_, type_name)| {
            let meta = ClassMetadata::new(*type_name).with_kind(ClassKind::Annotation);
            match *type_name {
                SERVICE | REPOSITORY | CONTROLLER | CONFIGURATION => {
                    meta.annotated(AnnotationInstance::new(COMPONENT))
                }
                PROFILE => meta.annotated(AnnotationInstance::new(CONDITIONAL).with(
                    "value",
                    AnnotationValue::Array(vec![AnnotationValue::Class(
                        PROFILE_CONDITION.to_string(),
                    )]),
                )),
                _ => meta,
            }
        })
        .collect()
}
