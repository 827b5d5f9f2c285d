//! Component registry: the narrow container contract the host depends on.
//!
//! Feature loaders register component instances into a
//! [`ComponentRegistryBuilder`]; the host merges each builder into the shared
//! [`ComponentRegistry`] at phase boundaries. After the compiled-components
//! step the registry is sealed and treated as read-only for the remainder of
//! the process.
//!
//! Registration and resolution are keyed by type; multiple registrations per
//! type are preserved in registration order, which is the stable resolution
//! order (`get_all`).

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::RegistryError;

type BoxedComponent = Box<dyn Any + Send + Sync>;

/// Collects component registrations before they are merged into the registry.
///
/// Builders are short-lived: the host hands a fresh builder to each
/// contribution step and merges it afterwards. The builder itself is not
/// thread-safe; contribution fan-out is strictly sequential.
#[derive(Default)]
pub struct ComponentRegistryBuilder {
    entries: Vec<(TypeId, &'static str, BoxedComponent)>,
}

impl ComponentRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared component instance under type `T`.
    ///
    /// `T` is usually a trait object (`builder.register::<dyn MyService>(arc)`);
    /// registering the same type more than once appends, it does not replace.
    pub fn register<T>(&mut self, component: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.entries
            .push((TypeId::of::<T>(), type_name::<T>(), Box::new(component)));
    }

    /// Register an owned value under its concrete type.
    pub fn register_value<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.register(Arc::new(value));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct RegistryInner {
    slots: HashMap<TypeId, Vec<BoxedComponent>>,
    sealed: bool,
}

/// Type-keyed component container built up during the boot phases.
///
/// The registry is mutated only by the host's sequential contribution
/// fan-out; once sealed it only serves resolutions.
pub struct ComponentRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                slots: HashMap::new(),
                sealed: false,
            }),
        }
    }

    /// Merge a builder's registrations into the registry.
    ///
    /// Returns the number of registrations applied.
    ///
    /// # Errors
    /// Returns [`RegistryError::Sealed`] when the registry has been sealed.
    pub fn apply(&self, builder: ComponentRegistryBuilder) -> Result<usize, RegistryError> {
        let mut inner = self.inner.write();
        if inner.sealed {
            return Err(RegistryError::Sealed);
        }
        let count = builder.entries.len();
        for (type_id, _, component) in builder.entries {
            inner.slots.entry(type_id).or_default().push(component);
        }
        Ok(count)
    }

    /// Seal the registry: all further `apply` calls fail.
    pub fn seal(&self) {
        self.inner.write().sealed = true;
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.inner.read().sealed
    }

    /// Resolve the first registration for type `T`.
    ///
    /// # Errors
    /// Returns [`RegistryError::NotRegistered`] when nothing was registered
    /// under `T`.
    pub fn get<T>(&self) -> Result<Arc<T>, RegistryError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let inner = self.inner.read();
        inner
            .slots
            .get(&TypeId::of::<T>())
            .and_then(|components| components.first())
            .and_then(|component| component.downcast_ref::<Arc<T>>())
            .cloned()
            .ok_or(RegistryError::NotRegistered {
                type_name: type_name::<T>(),
            })
    }

    /// Resolve every registration for type `T`, in registration order.
    ///
    /// An empty result is not an error; callers that require at least one
    /// registration use [`ComponentRegistry::get`].
    #[must_use]
    pub fn get_all<T>(&self) -> Vec<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let inner = self.inner.read();
        inner
            .slots
            .get(&TypeId::of::<T>())
            .map(|components| {
                components
                    .iter()
                    .filter_map(|component| component.downcast_ref::<Arc<T>>())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains<T>(&self) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.inner.read().slots.contains_key(&TypeId::of::<T>())
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ComponentRegistry")
            .field("types", &inner.slots.len())
            .field("sealed", &inner.sealed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: std::fmt::Debug + Send + Sync {
        fn greet(&self) -> String;
    }

    #[derive(Debug)]
    struct EnglishGreeter;
    impl Greeter for EnglishGreeter {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    #[derive(Debug)]
    struct FrenchGreeter;
    impl Greeter for FrenchGreeter {
        fn greet(&self) -> String {
            "bonjour".into()
        }
    }

    #[test]
    fn registers_and_resolves_trait_object() {
        let registry = ComponentRegistry::new();
        let mut builder = ComponentRegistryBuilder::new();
        builder.register::<dyn Greeter>(Arc::new(EnglishGreeter));
        registry.apply(builder).unwrap();

        let greeter = registry.get::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "hello");
    }

    #[test]
    fn get_all_preserves_registration_order() {
        let registry = ComponentRegistry::new();
        let mut builder = ComponentRegistryBuilder::new();
        builder.register::<dyn Greeter>(Arc::new(EnglishGreeter));
        builder.register::<dyn Greeter>(Arc::new(FrenchGreeter));
        registry.apply(builder).unwrap();

        let all = registry.get_all::<dyn Greeter>();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].greet(), "hello");
        assert_eq!(all[1].greet(), "bonjour");
    }

    #[test]
    fn order_is_stable_across_builders() {
        let registry = ComponentRegistry::new();
        for greeting in ["hello", "bonjour"] {
            let mut builder = ComponentRegistryBuilder::new();
            match greeting {
                "hello" => builder.register::<dyn Greeter>(Arc::new(EnglishGreeter)),
                _ => builder.register::<dyn Greeter>(Arc::new(FrenchGreeter)),
            }
            registry.apply(builder).unwrap();
        }

        let all = registry.get_all::<dyn Greeter>();
        assert_eq!(all[0].greet(), "hello");
        assert_eq!(all[1].greet(), "bonjour");
    }

    #[test]
    fn missing_type_is_an_error() {
        let registry = ComponentRegistry::new();
        let err = registry.get::<dyn Greeter>().unwrap_err();
        assert!(matches!(err, RegistryError::NotRegistered { .. }));
    }

    #[test]
    fn sealed_registry_rejects_apply() {
        let registry = ComponentRegistry::new();
        registry.seal();

        let mut builder = ComponentRegistryBuilder::new();
        builder.register_value(42_u32);
        let err = registry.apply(builder).unwrap_err();
        assert!(matches!(err, RegistryError::Sealed));
    }

    #[test]
    fn sealed_registry_still_resolves() {
        let registry = ComponentRegistry::new();
        let mut builder = ComponentRegistryBuilder::new();
        builder.register_value(42_u32);
        registry.apply(builder).unwrap();
        registry.seal();

        assert_eq!(*registry.get::<u32>().unwrap(), 42);
    }
}
