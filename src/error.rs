use std::borrow::Cow;
use std::fmt;

pub use anyhow::Error as RuntimeError;
use thiserror::Error;

/// Marker line appended to a [`HookFailure`] when the main call succeeded and
/// only the hooks failed.
pub const HOOK_CAUSED_FAILURE: &str = "hook caused failure";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider cannot need and return the same type '{0}'")]
    SelfDependency(&'static str),

    #[error("No provider registered for type '{0}'")]
    UnresolvableType(&'static str),

    #[error("Type '{type_name}' has multiple providers: {}", providers.join(", "))]
    AmbiguousProvider {
        type_name: &'static str,
        providers: Vec<Cow<'static, str>>,
    },

    #[error("Cyclic dependency detected at '{type_name}': {chain}")]
    CyclicDependency {
        type_name: &'static str,
        chain: String,
    },

    #[error("Edge from '{from}' to '{to}' references a vertex missing from the graph")]
    DanglingEdge { from: String, to: String },

    #[error("Target '{target}' returns {outputs} values, expected at most one")]
    InvalidTarget {
        target: &'static str,
        outputs: usize,
    },

    #[error("Argument of type '{0}' was promised to the plan but not supplied")]
    MissingArgument(&'static str),

    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Provider '{provider}':\n{source}")]
    Provider {
        provider: Cow<'static, str>,
        source: RuntimeError,
    },

    #[error(transparent)]
    Target(RuntimeError),

    #[error(transparent)]
    Hook(#[from] HookFailure),
}

impl Error {
    /// Returns `true` when the call itself succeeded and only a hook turned it
    /// into a failure.
    pub fn is_hook_caused(&self) -> bool {
        matches!(self, Error::Hook(failure) if failure.caused_failure())
    }

    /// Returns `true` for errors raised while validating the graph or a plan,
    /// as opposed to errors raised by user code while constructing values.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::SelfDependency(_)
                | Error::UnresolvableType(_)
                | Error::AmbiguousProvider { .. }
                | Error::CyclicDependency { .. }
                | Error::DanglingEdge { .. }
                | Error::InvalidTarget { .. }
        )
    }
}

/// Aggregated failure of one or more hooks, joined with the error of the call
/// they observed (if any).
#[derive(Debug)]
pub struct HookFailure {
    /// The error returned by the call itself, `None` if it succeeded.
    pub original: Option<Box<Error>>,
    /// Every error returned by a hook, in registration order.
    pub errors: Vec<RuntimeError>,
}

impl HookFailure {
    /// The call succeeded, the hooks did not.
    pub fn caused_failure(&self) -> bool {
        self.original.is_none()
    }
}

impl fmt::Display for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::with_capacity(self.errors.len() + 1);

        if let Some(original) = &self.original {
            lines.push(original.to_string());
        }

        lines.extend(self.errors.iter().map(|err| format!("Hook: {err}")));

        if self.caused_failure() {
            lines.push(HOOK_CAUSED_FAILURE.to_string());
        }

        write!(f, "{}", lines.join("\n"))
    }
}

impl std::error::Error for HookFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.original
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_failure_marker() {
        let failure = HookFailure {
            original: None,
            errors: vec![anyhow::anyhow!("audit log unavailable")],
        };

        let err = Error::from(failure);
        assert!(err.is_hook_caused());
        assert_eq!(
            err.to_string(),
            "Hook: audit log unavailable\nhook caused failure"
        );
    }

    #[test]
    fn test_hook_failure_joins_original() {
        let failure = HookFailure {
            original: Some(Box::new(Error::UnresolvableType("u8"))),
            errors: vec![anyhow::anyhow!("first"), anyhow::anyhow!("second")],
        };

        let err = Error::Hook(failure);
        assert!(!err.is_hook_caused());
        assert_eq!(
            err.to_string(),
            "No provider registered for type 'u8'\nHook: first\nHook: second"
        );
    }

    #[test]
    fn test_configuration_classes() {
        assert!(Error::SelfDependency("A").is_configuration());
        assert!(!Error::Target(anyhow::anyhow!("boom")).is_configuration());
        assert!(!Error::MissingArgument("i32").is_configuration());
    }
}
