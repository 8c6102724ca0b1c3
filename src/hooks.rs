use std::fmt;
use std::sync::Arc;

use crate::core::{Context, Injectable, TypeKey};
use crate::error::{Error, HookFailure};

type HookFn = dyn Fn(&Context, Option<&Error>) -> anyhow::Result<()> + Send + Sync;

/// Callbacks invoked after every call of the container, successful or not.
///
/// A hook is keyed by the type it observes and receives the constructed value
/// of that type, if the call got far enough to build one.
#[derive(Default, Clone)]
pub(crate) struct Hooks {
    hooks: Vec<(TypeKey, Arc<HookFn>)>,
}

impl Hooks {
    pub(crate) fn register<T, F>(&mut self, hook: F)
    where
        T: Injectable,
        F: Fn(&Context, Option<&T>, Option<&Error>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let erased: Arc<HookFn> = Arc::new(move |context: &Context, error: Option<&Error>| {
            hook(context, context.get::<T>(), error)
        });

        self.hooks.push((TypeKey::of::<T>(), erased));
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }

    pub(crate) fn merge(&mut self, other: Hooks) {
        self.hooks.extend(other.hooks);
    }

    /// Runs every hook and folds their failures into the result of the call.
    ///
    /// All hooks run even if some fail. When only hooks failed, the error is
    /// marked as hook-caused (see [`HookFailure::caused_failure`]).
    pub(crate) fn apply<V>(&self, context: &Context, result: Result<V, Error>) -> Result<V, Error> {
        if self.hooks.is_empty() {
            return result;
        }

        let errors: Vec<_> = self
            .hooks
            .iter()
            .filter_map(|(key, hook)| {
                hook(context, result.as_ref().err())
                    .inspect_err(|err| tracing::warn!("hook on {} failed: {}", key, err))
                    .err()
            })
            .collect();

        if errors.is_empty() {
            return result;
        }

        let original = result.err().map(Box::new);
        Err(HookFailure { original, errors }.into())
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|(key, _)| key))
            .finish()
    }
}
