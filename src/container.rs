use std::fmt;

use crate::core::{Context, Injectable, TypeKey};
use crate::engine::{
    Handler, Outcome, Overrides, Plan, ProviderNode, Resolver, compile, execute_plan,
};
use crate::error::Error;
use crate::graph::Graph;
use crate::hooks::Hooks;

/// The dependency injection container.
///
/// `Container` is configured once, typically at start-up, by registering
/// providers with [`Container::provide`] and [`Container::provide_value`].
/// After that it is only read, and can be shared freely between threads.
///
/// # Example
///
/// ```rust
/// use tsunagi::Container;
///
/// #[derive(Clone)]
/// struct Config {
///     url: &'static str,
/// }
///
/// #[derive(Clone)]
/// struct Pool {
///     url: &'static str,
/// }
///
/// tsunagi::injectable!(Config, Pool);
///
/// let mut container = Container::new();
/// container
///     .provide_value(Config { url: "postgres://localhost" })
///     .provide(|config: Config| Pool { url: config.url })?;
///
/// let url = container.run(|pool: Pool| pool.url, ())?;
/// assert_eq!(url, "postgres://localhost");
/// # Ok::<(), tsunagi::Error>(())
/// ```
#[derive(Default)]
pub struct Container {
    graph: Graph,
    hooks: Hooks,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function as the provider of the types it returns.
    ///
    /// The function's parameters are resolved from the container whenever one
    /// of its outputs is needed. It may return `()`, a single value, a tuple
    /// of up to four values, or a `Result` of any of those. A tuple registers
    /// the function as the provider of every type in it. Only targets passed
    /// to [`Container::run`] and [`Container::create_plan`] are limited to a
    /// single value.
    ///
    /// Registering a function that needs one of its own outputs fails with
    /// [`Error::SelfDependency`]. Ambiguity and cycles are reported later, by
    /// [`Container::create_plan`], [`Container::run`] and
    /// [`Container::check_for_cycles`], since the graph may still be
    /// incomplete at this point.
    pub fn provide<Args, H>(&mut self, handler: H) -> Result<&mut Self, Error>
    where
        H: Handler<Args>,
    {
        let provider = ProviderNode::from_handler(handler);
        tracing::debug!(
            "providing {:?} from {}",
            provider.outputs(),
            provider.name()
        );

        self.graph.merge(Graph::from_provider(provider)?);
        Ok(self)
    }

    /// Registers a value that is handed out as is, by clone.
    pub fn provide_value<T: Injectable>(&mut self, value: T) -> &mut Self {
        tracing::debug!("providing value of {}", std::any::type_name::<T>());
        self.graph.merge(Graph::fragment(ProviderNode::from_value(value)));
        self
    }

    /// Registers a hook observing values of type `T`.
    ///
    /// Hooks run after every [`run`](Container::run),
    /// [`create`](Container::create) and [`run_plan`](Container::run_plan)
    /// call, whether it succeeded or not. They receive the per-call
    /// [`Context`], the value of `T` if one was constructed, and the error of
    /// the call if there was one.
    pub fn hook<T, F>(&mut self, hook: F) -> &mut Self
    where
        T: Injectable,
        F: Fn(&Context, Option<&T>, Option<&Error>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.register::<T, F>(hook);
        self
    }

    /// Folds the providers and hooks of `other` into this container.
    pub fn merge(&mut self, other: Container) -> &mut Self {
        let Container { graph, hooks } = other;
        self.graph.merge(graph);
        self.hooks.merge(hooks);
        self
    }

    /// Returns `true` if a provider for `key` is registered.
    pub fn has_type(&self, key: &TypeKey) -> bool {
        !self.graph.providers_of(key).is_empty()
    }

    pub fn has<T: 'static>(&self) -> bool {
        self.has_type(&TypeKey::of::<T>())
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Checks the whole graph for cycles and edges to missing vertices.
    pub fn check_for_cycles(&self) -> Result<(), Error> {
        self.graph.check_for_cycles()
    }

    /// Constructs a single value of type `T`.
    ///
    /// Any value in `overrides` is used instead of constructing its type.
    pub fn create<T, O>(&self, overrides: O) -> Result<T, Error>
    where
        T: Injectable,
        O: Overrides,
    {
        self.run(|value: T| value, overrides)
    }

    /// Calls `handler`, constructing its arguments on demand.
    ///
    /// Every provider involved runs at most once. Values in `overrides` take
    /// precedence over providers, whose functions are then not called at all.
    /// The target may return at most one value, optionally wrapped in a
    /// `Result`.
    pub fn run<Args, H, O>(
        &self,
        handler: H,
        overrides: O,
    ) -> Result<<H::Outcome as Outcome>::Value, Error>
    where
        H: Handler<Args>,
        O: Overrides,
    {
        let context = Context::seeded(overrides.into_entries(), self.graph.vertex_count());
        let (context, result) = Resolver::new(&self.graph, context).run(handler);
        self.hooks.apply(&context, result)
    }

    /// Compiles a reusable [`Plan`] for `handler`.
    ///
    /// Types in `ignore` are not constructed. They must instead be supplied
    /// as overrides to every [`Container::run_plan`] call and need no
    /// provider.
    pub fn create_plan<Args, H>(
        &self,
        handler: H,
        ignore: &[TypeKey],
    ) -> Result<Plan<<H::Outcome as Outcome>::Value>, Error>
    where
        H: Handler<Args>,
    {
        compile(&self.graph, handler, ignore)
    }

    /// Executes a plan created by [`Container::create_plan`].
    ///
    /// This is safe to call from many threads at once with the same plan,
    /// each call gets its own [`Context`].
    pub fn run_plan<T, O>(&self, plan: &Plan<T>, overrides: O) -> Result<T, Error>
    where
        O: Overrides,
    {
        let entries = overrides.into_entries();
        let context = Context::seeded(entries, plan.providers().len() + plan.params().len());
        let (context, result) = execute_plan(plan, context);
        self.hooks.apply(&context, result)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("graph", &self.graph)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
