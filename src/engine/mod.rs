//! Type-erased callables.
//!
//! The container never sees concrete function signatures at run time. Every
//! provider and every target is turned into a closure over a slice of
//! [`Dynamic`] arguments, with its parameter and output types recorded as
//! [`TypeKey`]s when it is registered.
//!
//! ## Core abstractions
//!
//! * [`Handler<Args>`]: implemented for every `Fn(T1, .., Tn) -> R` whose
//!   parameters are [`Injectable`]. It reports the parameter types and knows
//!   how to downcast a slice of erased arguments back into them.
//! * [`Outcome`]: the return convention. A function returns nothing, a value,
//!   a tuple of values, or a `Result` of any of those. The `Err` arm is the
//!   error slot.
//! * [`Overrides`]: values supplied by the caller for a single call, which
//!   take precedence over anything the graph would construct.

mod execute;
mod plan;
mod provider;

use std::sync::Arc;

use crate::core::{Dynamic, Injectable, TypeKey};

pub(crate) use crate::engine::execute::{Resolver, execute_plan};
pub use crate::engine::plan::Plan;
pub(crate) use crate::engine::plan::compile;
pub use crate::engine::provider::{ProviderId, ProviderNode};

/// One or more values produced by a single call.
pub trait Values: Sized {
    fn types() -> Vec<TypeKey>;

    fn erase(self) -> Vec<Dynamic>;
}

impl Values for () {
    fn types() -> Vec<TypeKey> {
        vec![]
    }

    fn erase(self) -> Vec<Dynamic> {
        vec![]
    }
}

impl<T: Injectable> Values for T {
    fn types() -> Vec<TypeKey> {
        vec![TypeKey::of::<T>()]
    }

    fn erase(self) -> Vec<Dynamic> {
        vec![Arc::new(self)]
    }
}

macro_rules! impl_values {
    ($($T:ident),*) => {
        #[allow(non_snake_case)]
        impl<$($T),*> Values for ($($T,)*)
        where
            $($T: Injectable),*
        {
            fn types() -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$T>(),)*]
            }

            fn erase(self) -> Vec<Dynamic> {
                let ($($T,)*) = self;
                vec![$(Arc::new($T) as Dynamic,)*]
            }
        }
    };
}

impl_values!(T1, T2);
impl_values!(T1, T2, T3);
impl_values!(T1, T2, T3, T4);

/// The return convention of providers and targets.
///
/// The error slot, if present, is always the last output: it is the `Err`
/// arm of a `Result`.
pub trait Outcome: Sized {
    type Value: Values;

    fn outputs() -> Vec<TypeKey> {
        Self::Value::types()
    }

    /// Index of the error slot among the raw outputs, `None` if the call
    /// cannot fail.
    fn error_slot() -> Option<usize>;

    fn into_result(self) -> anyhow::Result<Self::Value>;
}

impl<V: Values> Outcome for V {
    type Value = V;

    fn error_slot() -> Option<usize> {
        None
    }

    fn into_result(self) -> anyhow::Result<Self::Value> {
        Ok(self)
    }
}

impl<V, E> Outcome for Result<V, E>
where
    V: Values,
    E: Into<anyhow::Error>,
{
    type Value = V;

    fn error_slot() -> Option<usize> {
        Some(V::types().len())
    }

    fn into_result(self) -> anyhow::Result<Self::Value> {
        self.map_err(Into::into)
    }
}

/// Splits the error slot off an outcome: a failure becomes `Err`, the
/// remaining values are erased in output order.
pub(crate) fn find_error<O: Outcome>(outcome: O) -> anyhow::Result<Vec<Dynamic>> {
    outcome.into_result().map(Values::erase)
}

/// A function the container can call by assembling its arguments from the
/// graph.
///
/// This trait is implemented for closures and function items taking up to
/// twelve [`Injectable`] parameters and returning an [`Outcome`].
pub trait Handler<Args>: Send + Sync + 'static {
    type Outcome: Outcome;

    /// The parameter types, in declaration order.
    fn params(&self) -> Vec<TypeKey>;

    /// Calls the function with already resolved arguments.
    ///
    /// # Panics
    /// This method will panic if `args` does not hold exactly one value of
    /// the right type per parameter. The executors guarantee this by looking
    /// every argument up by its [`TypeKey`].
    fn call(&self, args: &[Dynamic]) -> Self::Outcome;

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

fn downcast<T: Injectable>(value: Option<&Dynamic>) -> T {
    value
        .expect("Argument count mismatch in handler call")
        .downcast_ref::<T>()
        .expect("Type mismatch in argument resolution")
        .clone()
}

macro_rules! impl_handler {
    ($($P:ident),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<Func, Out, $($P),*> Handler<($($P,)*)> for Func
        where
            Func: Fn($($P),*) -> Out + Send + Sync + 'static,
            Out: Outcome,
            $($P: Injectable),*
        {
            type Outcome = Out;

            fn params(&self) -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$P>(),)*]
            }

            fn call(&self, args: &[Dynamic]) -> Out {
                let mut iter = args.iter();
                $(let $P = downcast::<$P>(iter.next());)*
                (self)($($P),*)
            }
        }
    };
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);

/// Values supplied by the caller for one call.
///
/// Implemented for `()`, any single [`Injectable`] value, tuples of up to
/// eight values and [`Arguments`].
pub trait Overrides {
    fn into_entries(self) -> Vec<(TypeKey, Dynamic)>;
}

impl Overrides for () {
    fn into_entries(self) -> Vec<(TypeKey, Dynamic)> {
        vec![]
    }
}

impl<T: Injectable> Overrides for T {
    fn into_entries(self) -> Vec<(TypeKey, Dynamic)> {
        vec![(TypeKey::of::<T>(), Arc::new(self))]
    }
}

macro_rules! impl_overrides {
    ($($T:ident),*) => {
        #[allow(non_snake_case)]
        impl<$($T),*> Overrides for ($($T,)*)
        where
            $($T: Injectable),*
        {
            fn into_entries(self) -> Vec<(TypeKey, Dynamic)> {
                let ($($T,)*) = self;
                vec![$((TypeKey::of::<$T>(), Arc::new($T) as Dynamic),)*]
            }
        }
    };
}

impl_overrides!(T1);
impl_overrides!(T1, T2);
impl_overrides!(T1, T2, T3);
impl_overrides!(T1, T2, T3, T4);
impl_overrides!(T1, T2, T3, T4, T5);
impl_overrides!(T1, T2, T3, T4, T5, T6);
impl_overrides!(T1, T2, T3, T4, T5, T6, T7);
impl_overrides!(T1, T2, T3, T4, T5, T6, T7, T8);

/// A list of override values assembled at run time.
///
/// ```rust
/// use tsunagi::Arguments;
///
/// let args = Arguments::new().with(42_i32).with(String::from("request-id"));
/// assert_eq!(args.len(), 2);
/// ```
#[derive(Default, Clone)]
pub struct Arguments {
    entries: Vec<(TypeKey, Dynamic)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Injectable>(mut self, value: T) -> Self {
        self.push(value);
        self
    }

    pub fn push<T: Injectable>(&mut self, value: T) {
        self.entries.push((TypeKey::of::<T>(), Arc::new(value)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Overrides for Arguments {
    fn into_entries(self) -> Vec<(TypeKey, Dynamic)> {
        self.entries
    }
}

impl std::fmt::Debug for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(key, _)| key))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Port(u16);

    #[derive(Clone, Debug, PartialEq)]
    struct Host(String);

    crate::injectable!(Port, Host);

    fn erased<T: Injectable>(value: T) -> Dynamic {
        Arc::new(value)
    }

    #[test]
    fn test_handler_params_and_call() {
        let handler = |host: Host, port: Port| format!("{}:{}", host.0, port.0);

        assert_eq!(
            Handler::params(&handler),
            vec![TypeKey::of::<Host>(), TypeKey::of::<Port>()]
        );

        let args = [erased(Host("localhost".into())), erased(Port(8080))];
        assert_eq!(Handler::call(&handler, &args), "localhost:8080");
    }

    #[test]
    fn test_outcome_shapes() {
        assert!(<() as Outcome>::outputs().is_empty());
        assert_eq!(<() as Outcome>::error_slot(), None);

        assert_eq!(<Port as Outcome>::outputs(), vec![TypeKey::of::<Port>()]);
        assert_eq!(<Port as Outcome>::error_slot(), None);

        assert_eq!(<Result<(), anyhow::Error> as Outcome>::error_slot(), Some(0));
        assert_eq!(
            <Result<Port, anyhow::Error> as Outcome>::error_slot(),
            Some(1)
        );
        assert_eq!(
            <Result<(Port, Host), std::io::Error> as Outcome>::outputs(),
            vec![TypeKey::of::<Port>(), TypeKey::of::<Host>()]
        );
    }

    #[test]
    fn test_find_error() {
        let ok: Result<Port, anyhow::Error> = Ok(Port(1));
        let values = find_error(ok).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].downcast_ref::<Port>(), Some(&Port(1)));

        let unit: Result<(), anyhow::Error> = Ok(());
        assert!(find_error(unit).unwrap().is_empty());

        let failed: Result<Port, anyhow::Error> = Err(anyhow::anyhow!("no port"));
        assert_eq!(find_error(failed).unwrap_err().to_string(), "no port");
    }

    #[test]
    fn test_overrides() {
        assert!(().into_entries().is_empty());

        let entries = (Port(1), Host("a".into())).into_entries();
        assert_eq!(entries[0].0, TypeKey::of::<Port>());
        assert_eq!(entries[1].0, TypeKey::of::<Host>());

        let entries = Arguments::new().with(Port(2)).into_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.downcast_ref::<Port>(), Some(&Port(2)));

        assert_eq!(7_u8.into_entries()[0].0, TypeKey::of::<u8>());
    }
}
