use std::collections::HashSet;
use std::sync::Arc;

use crate::core::{Context, Dynamic, TypeKey};
use crate::engine::plan::validate_target;
use crate::engine::{Handler, Outcome, Plan, ProviderNode};
use crate::error::Error;
use crate::graph::Graph;

/// Ad-hoc execution: resolves every argument of a target on demand by
/// walking the graph backwards from the type it needs.
///
/// Values are cached in the [`Context`], so a provider is invoked at most once
/// per resolver, and a type already present (because the caller supplied it)
/// never reaches its provider.
pub(crate) struct Resolver<'a> {
    graph: &'a Graph,
    context: Context,
    /// Types currently under construction, innermost last.
    resolving: Vec<TypeKey>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(graph: &'a Graph, context: Context) -> Self {
        Self {
            graph,
            context,
            resolving: Vec::new(),
        }
    }

    /// Calls `handler` with resolved arguments. The context is handed back in
    /// all cases so that hooks can inspect whatever was built.
    pub(crate) fn run<Args, H>(
        mut self,
        handler: H,
    ) -> (Context, Result<<H::Outcome as Outcome>::Value, Error>)
    where
        H: Handler<Args>,
    {
        let result = self.call(handler);
        (self.context, result)
    }

    fn call<Args, H>(&mut self, handler: H) -> Result<<H::Outcome as Outcome>::Value, Error>
    where
        H: Handler<Args>,
    {
        validate_target(&handler)?;

        let params = handler.params();
        let mut args = Vec::with_capacity(params.len());

        for param in &params {
            args.push(self.resolve(param)?);
        }

        handler.call(&args).into_result().map_err(Error::Target)
    }

    fn resolve(&mut self, key: &TypeKey) -> Result<Dynamic, Error> {
        if let Some(value) = self.context.get_dynamic(key) {
            tracing::trace!("reusing cached {}", key);
            return Ok(value.clone());
        }

        if self.resolving.contains(key) {
            let chain = self
                .resolving
                .iter()
                .chain(std::iter::once(key))
                .map(TypeKey::name)
                .collect::<Vec<_>>()
                .join(" -> ");

            return Err(Error::CyclicDependency {
                type_name: key.name(),
                chain,
            });
        }

        let provider = self.graph.provider_for(key)?.clone();

        self.resolving.push(*key);
        let mut args = Vec::with_capacity(provider.params().len());
        for param in provider.params() {
            args.push(self.resolve(param)?);
        }
        self.resolving.pop();

        store(&mut self.context, &provider, provider.invoke(&args)?);

        self.context.get_dynamic(key).cloned().ok_or_else(|| {
            tracing::error!("provider {} did not produce {}", provider.name(), key);
            Error::InvariantViolation(format!(
                "provider '{}' did not produce '{}'",
                provider.name(),
                key
            ))
        })
    }
}

/// Runs a compiled plan against a context seeded with the caller's
/// overrides. Like [`Resolver::run`], the context is handed back together
/// with the result.
pub(crate) fn execute_plan<T>(plan: &Plan<T>, mut context: Context) -> (Context, Result<T, Error>) {
    let result = execute(plan, &mut context);
    (context, result)
}

fn execute<T>(plan: &Plan<T>, context: &mut Context) -> Result<T, Error> {
    let mut buffer: Vec<Dynamic> = Vec::with_capacity(plan.max_params);

    let needed = needed_providers(plan, context);

    for (provider, needed) in plan.providers.iter().zip(needed) {
        if !needed {
            tracing::trace!("skipping {}, outputs not needed", provider.name());
            continue;
        }

        gather(plan, context, provider.params(), &mut buffer)?;
        let outputs = provider.invoke(&buffer)?;
        store(context, provider, outputs);
    }

    gather(plan, context, &plan.params, &mut buffer)?;
    (plan.target)(buffer.as_slice()).map_err(Error::Target)
}

/// Marks the providers that still have to run once the overrides are in the
/// context. Walking the plan backwards visits every consumer before the
/// providers it depends on, so a provider is needed only if some type still
/// missing from the context is wanted by the target or by a needed provider.
fn needed_providers<T>(plan: &Plan<T>, context: &Context) -> Vec<bool> {
    let missing = |key: &&TypeKey| !context.contains(key);

    let mut wanted: HashSet<TypeKey> = plan.params.iter().filter(missing).copied().collect();
    let mut needed = vec![false; plan.providers.len()];

    for (index, provider) in plan.providers.iter().enumerate().rev() {
        if provider.outputs().iter().any(|key| wanted.contains(key)) {
            needed[index] = true;
            wanted.extend(provider.params().iter().filter(missing).copied());
        }
    }

    needed
}

/// Fills `buffer` with the values of `params`, in order.
fn gather<T>(
    plan: &Plan<T>,
    context: &Context,
    params: &[TypeKey],
    buffer: &mut Vec<Dynamic>,
) -> Result<(), Error> {
    buffer.clear();

    for param in params {
        match context.get_dynamic(param) {
            Some(value) => buffer.push(value.clone()),
            None if plan.ignored.contains(param) => {
                return Err(Error::MissingArgument(param.name()));
            }
            None => {
                tracing::error!("plan reached {} before it was constructed", param);
                return Err(Error::InvariantViolation(format!(
                    "value of type '{param}' missing during plan execution"
                )));
            }
        }
    }

    Ok(())
}

/// Caches every output of a provider. Values already present are kept.
fn store(context: &mut Context, provider: &Arc<ProviderNode>, outputs: Vec<Dynamic>) {
    for (key, value) in provider.outputs().iter().zip(outputs) {
        context.insert_dynamic(*key, value);
    }
}
