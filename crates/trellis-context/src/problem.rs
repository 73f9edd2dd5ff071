//! Problems detected during traversal and reported as one batch.

use std::fmt;

use trellis_common::error::{Result, TrellisError};

/// A configuration problem with the location it was found at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    /// A class transitively imports itself.
    CircularImport {
        /// Class whose imports closed the cycle.
        class_name: String,
        /// The import chain, e.g. `[A->B->A]`.
        chain: String,
        /// Where the class was read from.
        location: String,
    },
    /// A proxying `@Configuration` class is final.
    FinalConfigurationClass {
        /// The configuration class.
        class_name: String,
        /// Where the class was read from.
        location: String,
    },
    /// A bean method of a proxying `@Configuration` class cannot be overridden.
    NonOverridableBeanMethod {
        /// Declaring class.
        class_name: String,
        /// Method name.
        method: String,
        /// Where the class was read from.
        location: String,
    },
    /// A configuration class declares overloaded bean methods.
    OverloadedBeanMethod {
        /// Declaring class.
        class_name: String,
        /// Method name.
        method: String,
        /// Where the class was read from.
        location: String,
    },
}

impl Problem {
    /// Where the problem was found.
    #[must_use]
    pub fn location(&self) -> &str {
        match self {
            Self::CircularImport { location, .. }
            | Self::FinalConfigurationClass { location, .. }
            | Self::NonOverridableBeanMethod { location, .. }
            | Self::OverloadedBeanMethod { location, .. } => location,
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircularImport {
                class_name, chain, ..
            } => write!(
                f,
                "a circular @Import has been detected: illegal attempt by configuration class '{class_name}' to import a class already present in the current import stack {chain}"
            ),
            Self::FinalConfigurationClass { class_name, .. } => write!(
                f,
                "@Configuration class '{class_name}' may not be final; remove the final modifier or set proxyBeanMethods = false"
            ),
            Self::NonOverridableBeanMethod {
                class_name, method, ..
            } => write!(
                f,
                "@Bean method '{class_name}.{method}' must not be private or final; change the method's modifiers to continue"
            ),
            Self::OverloadedBeanMethod {
                class_name, method, ..
            } => write!(
                f,
                "@Configuration class '{class_name}' contains overloaded @Bean methods with name '{method}'; use unique method names or set enforceUniqueMethods = false"
            ),
        }?;
        write!(f, " (in {})", self.location())
    }
}

/// Collects problems instead of failing at the first one.
#[derive(Debug, Clone, Default)]
pub struct ProblemReporter {
    problems: Vec<Problem>,
}

impl ProblemReporter {
    /// Creates an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a problem.
    pub fn error(&mut self, problem: Problem) {
        tracing::debug!(problem = %problem, "configuration problem recorded");
        self.problems.push(problem);
    }

    /// Problems recorded so far, in detection order.
    #[must_use]
    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// Fails with every recorded problem at once.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::Problems`] if any problem was recorded.
    pub fn check(&self) -> Result<()> {
        if self.problems.is_empty() {
            return Ok(());
        }
        let report = self
            .problems
            .iter()
            .map(|problem| format!("  - {problem}"))
            .collect::<Vec<_>>()
            .join("\n");
        Err(TrellisError::Problems {
            count: self.problems.len(),
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reporter_passes() {
        assert!(ProblemReporter::new().check().is_ok());
    }

    #[test]
    fn all_problems_are_reported_together() {
        let mut reporter = ProblemReporter::new();
        reporter.error(Problem::CircularImport {
            class_name: "com.a.A".into(),
            chain: "[com.a.A->com.a.B->com.a.A]".into(),
            location: "a.tcd#com.a.A".into(),
        });
        reporter.error(Problem::FinalConfigurationClass {
            class_name: "com.a.C".into(),
            location: "a.tcd#com.a.C".into(),
        });
        let err = reporter.check().unwrap_err();
        let TrellisError::Problems { count, report } = err else {
            panic!("expected problems");
        };
        assert_eq!(count, 2);
        assert!(report.contains("[com.a.A->com.a.B->com.a.A]"));
        assert!(report.contains("may not be final"));
        assert_eq!(report.lines().count(), 2);
    }
}
