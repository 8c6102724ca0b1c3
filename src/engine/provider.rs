use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::{Dynamic, Injectable, TypeKey};
use crate::engine::{Handler, Outcome, find_error};
use crate::error::Error;

type CallFn = dyn Fn(&[Dynamic]) -> anyhow::Result<Vec<Dynamic>> + Send + Sync;

static NEXT_PROVIDER: AtomicU64 = AtomicU64::new(0);

/// Identity of a provider, unique within the process so that graphs built by
/// separate `provide` calls can be merged without collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(u64);

impl ProviderId {
    fn next() -> Self {
        Self(NEXT_PROVIDER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

enum Source {
    Value(Dynamic),
    Function(Arc<CallFn>),
}

/// A registered way of obtaining values: either a function whose parameters
/// are resolved from the graph, or a value that was constructed up front.
pub struct ProviderNode {
    id: ProviderId,
    name: Cow<'static, str>,
    params: Vec<TypeKey>,
    outputs: Vec<TypeKey>,
    error_slot: Option<usize>,
    source: Source,
}

impl ProviderNode {
    pub(crate) fn from_handler<Args, H>(handler: H) -> Self
    where
        H: Handler<Args>,
    {
        let name = handler.name();
        let params = handler.params();

        Self {
            id: ProviderId::next(),
            name: name.into(),
            params,
            outputs: <H::Outcome as Outcome>::outputs(),
            error_slot: <H::Outcome as Outcome>::error_slot(),
            source: Source::Function(Arc::new(move |args: &[Dynamic]| {
                find_error(handler.call(args))
            })),
        }
    }

    pub(crate) fn from_value<T: Injectable>(value: T) -> Self {
        Self {
            id: ProviderId::next(),
            name: std::any::type_name::<T>().into(),
            params: vec![],
            outputs: vec![TypeKey::of::<T>()],
            error_slot: None,
            source: Source::Value(Arc::new(value)),
        }
    }

    pub fn id(&self) -> ProviderId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[TypeKey] {
        &self.params
    }

    pub fn outputs(&self) -> &[TypeKey] {
        &self.outputs
    }

    pub fn error_slot(&self) -> Option<usize> {
        self.error_slot
    }

    pub fn is_function(&self) -> bool {
        matches!(self.source, Source::Function(_))
    }

    /// The first parameter type that is also one of the outputs.
    pub(crate) fn self_dependency(&self) -> Option<TypeKey> {
        self.params
            .iter()
            .find(|param| self.outputs.contains(param))
            .copied()
    }

    /// Produces the outputs of this provider, in the order of
    /// [`ProviderNode::outputs`].
    pub(crate) fn invoke(&self, args: &[Dynamic]) -> Result<Vec<Dynamic>, Error> {
        match &self.source {
            Source::Value(value) => Ok(vec![value.clone()]),
            Source::Function(call) => {
                let _span = tracing::trace_span!("provider", name = %self.name).entered();

                let outputs = call(args).map_err(|source| {
                    tracing::warn!("provider {} failed: {}", self.name, source);
                    Error::Provider {
                        provider: self.name.clone(),
                        source,
                    }
                })?;

                if outputs.len() != self.outputs.len() {
                    return Err(Error::InvariantViolation(format!(
                        "provider '{}' returned {} values, declared {}",
                        self.name,
                        outputs.len(),
                        self.outputs.len()
                    )));
                }

                Ok(outputs)
            }
        }
    }
}

impl fmt::Debug for ProviderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("outputs", &self.outputs)
            .field("error_slot", &self.error_slot)
            .field("function", &self.is_function())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Seed(u32);

    #[derive(Clone, Debug, PartialEq)]
    struct Grown(u32);

    crate::injectable!(Seed, Grown);

    #[test]
    fn test_from_handler() {
        let node = ProviderNode::from_handler(|seed: Seed| -> anyhow::Result<Grown> {
            Ok(Grown(seed.0 * 2))
        });

        assert!(node.is_function());
        assert_eq!(node.params(), &[TypeKey::of::<Seed>()]);
        assert_eq!(node.outputs(), &[TypeKey::of::<Grown>()]);
        assert_eq!(node.error_slot(), Some(1));
        assert!(node.self_dependency().is_none());

        let outputs = node.invoke(&[Arc::new(Seed(4))]).unwrap();
        assert_eq!(outputs[0].downcast_ref::<Grown>(), Some(&Grown(8)));
    }

    #[test]
    fn test_from_value() {
        let node = ProviderNode::from_value(Seed(1));

        assert!(!node.is_function());
        assert!(node.params().is_empty());
        assert_eq!(node.outputs(), &[TypeKey::of::<Seed>()]);

        let outputs = node.invoke(&[]).unwrap();
        assert_eq!(outputs[0].downcast_ref::<Seed>(), Some(&Seed(1)));
    }

    #[test]
    fn test_provider_error_is_wrapped() {
        let node = ProviderNode::from_handler(|_: Seed| -> anyhow::Result<Grown> {
            Err(anyhow::anyhow!("drought"))
        });

        match node.invoke(&[Arc::new(Seed(0))]) {
            Err(Error::Provider { source, .. }) => assert_eq!(source.to_string(), "drought"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_detected() {
        let node = ProviderNode::from_handler(|seed: Seed| seed);
        assert_eq!(node.self_dependency(), Some(TypeKey::of::<Seed>()));
    }

    #[test]
    fn test_unique_ids() {
        let a = ProviderNode::from_value(Seed(1));
        let b = ProviderNode::from_value(Seed(1));
        assert_ne!(a.id(), b.id());
    }
}
