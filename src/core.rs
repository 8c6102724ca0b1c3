use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A type-erased, thread-safe container.
pub(crate) type Dynamic = Arc<dyn Any + Send + Sync>;

/// Runtime identity of a type, used as the key for every vertex and every
/// cached value in the container.
///
/// Equality and hashing only look at the [`TypeId`], the name is carried
/// along for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Types that can flow through the container, either as an argument of a
/// provider or as one of its outputs.
///
/// Values are stored once per call and handed to every consumer by clone, so
/// anything expensive to copy should be wrapped in an [`Arc`].
///
/// ```rust
/// #[derive(Clone)]
/// struct Database {
///     url: String,
/// }
///
/// impl tsunagi::Injectable for Database {}
/// ```
pub trait Injectable: Clone + Send + Sync + 'static {}

/// Implements [`Injectable`] for a list of types.
///
/// ```rust
/// #[derive(Clone)]
/// struct Config;
/// #[derive(Clone)]
/// struct Pool;
///
/// tsunagi::injectable!(Config, Pool);
/// ```
#[macro_export]
macro_rules! injectable {
    ($($ty:ty),* $(,)?) => {
        $(impl $crate::Injectable for $ty {})*
    };
}

injectable!(
    bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
    String, &'static str,
    std::time::Duration,
    std::path::PathBuf,
);

impl<T: Injectable> Injectable for Vec<T> {}

impl<T: Injectable> Injectable for Option<T> {}

impl<T: ?Sized + Send + Sync + 'static> Injectable for Arc<T> {}

/// The per-call cache of constructed values.
///
/// A fresh `Context` is created for every `run`, `create` and `run_plan`
/// call, seeded with the caller's overrides. Once a type has a value it is
/// never replaced: the first writer wins.
#[derive(Default)]
pub struct Context {
    values: HashMap<TypeKey, Dynamic>,
}

impl Context {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            values: HashMap::with_capacity(capacity),
        }
    }

    pub(crate) fn seeded(entries: Vec<(TypeKey, Dynamic)>, capacity: usize) -> Self {
        let mut context = Self::with_capacity(capacity.max(entries.len()));

        for (key, value) in entries {
            context.insert_dynamic(key, value);
        }

        context
    }

    /// Stores `value` under `key` unless the type already has a value.
    /// Returns `true` if the value was stored.
    pub(crate) fn insert_dynamic(&mut self, key: TypeKey, value: Dynamic) -> bool {
        if self.values.contains_key(&key) {
            return false;
        }

        self.values.insert(key, value);
        true
    }

    pub(crate) fn get_dynamic(&self, key: &TypeKey) -> Option<&Dynamic> {
        self.values.get(key)
    }

    /// Stores a value, keeping the existing one if the type is already present.
    pub fn insert<T: Injectable>(&mut self, value: T) -> bool {
        self.insert_dynamic(TypeKey::of::<T>(), Arc::new(value))
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeKey::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_key_identity() {
        assert_eq!(TypeKey::of::<u32>(), TypeKey::of::<u32>());
        assert_ne!(TypeKey::of::<u32>(), TypeKey::of::<i32>());
        assert_eq!(TypeKey::of::<String>().name(), "alloc::string::String");
    }

    #[test]
    fn test_context_first_writer_wins() {
        let mut context = Context::default();

        assert!(context.insert(1_i32));
        assert!(!context.insert(2_i32));
        assert_eq!(context.get::<i32>(), Some(&1));
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn test_context_seeded() {
        let context = Context::seeded(
            vec![
                (TypeKey::of::<u8>(), Arc::new(7_u8) as Dynamic),
                (TypeKey::of::<u8>(), Arc::new(9_u8) as Dynamic),
                (TypeKey::of::<bool>(), Arc::new(true) as Dynamic),
            ],
            0,
        );

        assert_eq!(context.get::<u8>(), Some(&7));
        assert_eq!(context.get::<bool>(), Some(&true));
        assert!(!context.contains(&TypeKey::of::<String>()));
        assert!(context.get::<String>().is_none());
    }
}
