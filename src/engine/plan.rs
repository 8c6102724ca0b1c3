use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::core::{Dynamic, TypeKey};
use crate::engine::{Handler, Outcome, ProviderId, ProviderNode};
use crate::error::Error;
use crate::graph::{Graph, Mark};

type TargetFn<T> = dyn Fn(&[Dynamic]) -> anyhow::Result<T> + Send + Sync;

/// A precompiled, reusable recipe for calling one target function.
///
/// A plan holds the providers needed by the target in dependency order, so
/// running it is a straight loop with no graph traversal. It holds no mutable
/// state and can be shared between threads, each call gets its own
/// [`Context`](crate::Context).
pub struct Plan<T> {
    pub(crate) providers: Vec<Arc<ProviderNode>>,
    pub(crate) target: Arc<TargetFn<T>>,
    pub(crate) target_name: &'static str,
    pub(crate) params: Vec<TypeKey>,
    pub(crate) ignored: Vec<TypeKey>,
    /// Largest argument list of any call in the plan.
    pub(crate) max_params: usize,
}

impl<T> Plan<T> {
    /// The providers in the order they will be invoked.
    pub fn providers(&self) -> &[Arc<ProviderNode>] {
        &self.providers
    }

    pub fn params(&self) -> &[TypeKey] {
        &self.params
    }

    /// Types the plan expects to receive as call-time arguments.
    pub fn ignored(&self) -> &[TypeKey] {
        &self.ignored
    }

    pub fn max_params(&self) -> usize {
        self.max_params
    }
}

impl<T> Clone for Plan<T> {
    fn clone(&self) -> Self {
        Self {
            providers: self.providers.clone(),
            target: self.target.clone(),
            target_name: self.target_name,
            params: self.params.clone(),
            ignored: self.ignored.clone(),
            max_params: self.max_params,
        }
    }
}

impl<T> fmt::Debug for Plan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("target", &self.target_name)
            .field(
                "providers",
                &self
                    .providers
                    .iter()
                    .map(|provider| provider.name())
                    .collect::<Vec<_>>(),
            )
            .field("params", &self.params)
            .field("ignored", &self.ignored)
            .field("max_params", &self.max_params)
            .finish()
    }
}

/// Rejects targets producing more than one value. The error slot does not
/// count as a value.
pub(crate) fn validate_target<Args, H>(handler: &H) -> Result<(), Error>
where
    H: Handler<Args>,
{
    let outputs = <H::Outcome as Outcome>::outputs().len();

    if outputs > 1 {
        return Err(Error::InvalidTarget {
            target: handler.name(),
            outputs,
        });
    }

    Ok(())
}

/// Compiles a [`Plan`] for `handler` against `graph`.
///
/// Every type the target needs, directly or through the providers it pulls
/// in, must have exactly one provider or be listed in `ignore`. All of this
/// is checked here so that running the plan cannot fail for configuration
/// reasons.
pub(crate) fn compile<Args, H>(
    graph: &Graph,
    handler: H,
    ignore: &[TypeKey],
) -> Result<Plan<<H::Outcome as Outcome>::Value>, Error>
where
    H: Handler<Args>,
{
    validate_target(&handler)?;

    let params = handler.params();
    let target_name = handler.name();

    for param in &params {
        if !graph.contains_type(param) && !ignore.contains(param) {
            return Err(Error::UnresolvableType(param.name()));
        }
    }

    let mut walk = Walk {
        graph,
        ignore,
        marks: HashMap::new(),
        collected: HashSet::new(),
        providers: Vec::new(),
        max_params: params.len(),
    };

    for param in &params {
        walk.visit(param)?;
    }

    let Walk {
        providers,
        max_params,
        ..
    } = walk;

    tracing::debug!(
        "compiled plan for {} with {} providers, buffer of {}",
        target_name,
        providers.len(),
        max_params
    );

    Ok(Plan {
        providers,
        target: Arc::new(move |args: &[Dynamic]| handler.call(args).into_result()),
        target_name,
        params,
        ignored: ignore.to_vec(),
        max_params,
    })
}

/// Depth-first walk from the target's parameters back through the providers
/// that produce them.
struct Walk<'a> {
    graph: &'a Graph,
    ignore: &'a [TypeKey],
    marks: HashMap<TypeKey, Mark>,
    collected: HashSet<ProviderId>,
    /// Providers in post-order: every provider follows the providers of its
    /// parameters.
    providers: Vec<Arc<ProviderNode>>,
    max_params: usize,
}

impl Walk<'_> {
    fn visit(&mut self, key: &TypeKey) -> Result<(), Error> {
        if self.ignore.contains(key) {
            return Ok(());
        }

        match self.marks.get(key) {
            Some(Mark::Permanent) => return Ok(()),
            Some(Mark::Temporary) => {
                return Err(Error::CyclicDependency {
                    type_name: key.name(),
                    chain: self.chain(key),
                });
            }
            None => {}
        }

        let provider = self.graph.provider_for(key)?.clone();

        self.marks.insert(*key, Mark::Temporary);

        if !self.collected.contains(&provider.id()) {
            for param in provider.params() {
                self.visit(param)?;
            }

            if provider.is_function() {
                self.max_params = self.max_params.max(provider.params().len());
            }

            self.collected.insert(provider.id());
            self.providers.push(provider);
        }

        self.marks.insert(*key, Mark::Permanent);
        Ok(())
    }

    fn chain(&self, key: &TypeKey) -> String {
        let mut open: Vec<_> = self
            .marks
            .iter()
            .filter(|(_, mark)| **mark == Mark::Temporary)
            .map(|(key, _)| key.name())
            .collect();

        open.sort_unstable();
        format!("{} (via {})", key.name(), open.join(", "))
    }
}
