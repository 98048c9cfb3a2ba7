//! The dependency registry.

use crate::error::GraphError;
use crate::key::TypeKey;
use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A type-erased dependency instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// A release action for a resource, run when its scope unwinds.
pub type ReleaseFn = BoxFuture<'static, ()>;

/// What a factory produces.
pub enum Provided {
    /// A plain instance.
    Instance(Instance),
    /// A resource: an instance plus the release action to run on exit.
    Resource {
        /// The constructed instance.
        instance: Instance,
        /// The release action, run when the owning scope unwinds.
        release: ReleaseFn,
    },
}

impl Provided {
    /// Wraps a plain value.
    #[must_use]
    pub fn instance<T: Send + Sync + 'static>(value: T) -> Self {
        Self::Instance(Arc::new(value))
    }

    /// Wraps a resource value with its release action.
    #[must_use]
    pub fn resource<T, Fut>(value: T, release: Fut) -> Self
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::Resource {
            instance: Arc::new(value),
            release: Box::pin(release),
        }
    }
}

/// The dependencies handed to a factory, already resolved.
#[derive(Default)]
pub struct Resolved {
    values: HashMap<TypeKey, Instance>,
}

impl Resolved {
    pub(crate) fn new(values: HashMap<TypeKey, Instance>) -> Self {
        Self { values }
    }

    /// Returns a resolved dependency by type.
    ///
    /// # Errors
    ///
    /// Returns an error when the dependency was not declared or has a
    /// different type.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, crate::ResolveError> {
        let key = TypeKey::of::<T>();
        let instance = self
            .values
            .get(&key)
            .ok_or_else(|| crate::ResolveError::NotRegistered(key.short_name().to_string()))?;
        Arc::clone(instance)
            .downcast::<T>()
            .map_err(|_| crate::ResolveError::TypeMismatch(key.short_name().to_string()))
    }
}

type FactoryFn =
    Arc<dyn Fn(Resolved) -> BoxFuture<'static, Result<Provided, anyhow::Error>> + Send + Sync>;

/// How long a constructed instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// One instance for the application lifetime, built at startup and
    /// released at shutdown.
    Singleton,
    /// Memoized per resolver context: process-wide for non-scoped
    /// endpoints, per-request inside a scope.
    Reused,
    /// A fresh instance on every resolution.
    Transient,
    /// Entered and exited per request; the only lifetime resources other
    /// than singletons may have.
    Scoped,
}

/// One registered dependency node.
#[derive(Clone)]
pub struct DepNode {
    pub(crate) key: TypeKey,
    pub(crate) lifetime: Lifetime,
    pub(crate) deps: Vec<TypeKey>,
    pub(crate) resource: bool,
    pub(crate) factory: FactoryFn,
}

impl DepNode {
    /// Returns the node key.
    #[must_use]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Returns the declared lifetime.
    #[must_use]
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Returns the declared dependencies.
    #[must_use]
    pub fn deps(&self) -> &[TypeKey] {
        &self.deps
    }

    /// Returns `true` when the factory yields a resource requiring release.
    #[must_use]
    pub fn is_resource(&self) -> bool {
        self.resource
    }
}

impl fmt::Debug for DepNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepNode")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("deps", &self.deps)
            .field("resource", &self.resource)
            .finish()
    }
}

/// The registry of dependency factories.
///
/// Frozen after application setup; registrations made anywhere before
/// setup participate everywhere.
///
/// # Example
///
/// ```rust
/// use daedalus_graph::{Graph, Lifetime, TypeKey};
///
/// struct Settings { url: String }
/// struct Engine { url: String }
///
/// let mut graph = Graph::new();
/// graph.factory(Lifetime::Singleton, &[], |_| async {
///     Ok(Settings { url: "db://local".into() })
/// }).unwrap();
/// graph.factory(Lifetime::Reused, &[TypeKey::of::<Settings>()], |deps| async move {
///     let settings = deps.get::<Settings>()?;
///     Ok(Engine { url: settings.url.clone() })
/// }).unwrap();
///
/// assert!(graph.contains(TypeKey::of::<Engine>()));
/// ```
#[derive(Clone, Default)]
pub struct Graph {
    nodes: IndexMap<TypeKey, DepNode>,
}

impl Graph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when a node is registered for the key.
    #[must_use]
    pub fn contains(&self, key: TypeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    /// Returns the node for a key.
    #[must_use]
    pub fn node(&self, key: TypeKey) -> Option<&DepNode> {
        self.nodes.get(&key)
    }

    /// Returns the registered keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.nodes.keys().copied()
    }

    /// Returns the number of registered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` when no nodes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Registers a plain factory for `T`.
    ///
    /// # Errors
    ///
    /// Fails when `T` is already registered with a different factory.
    pub fn factory<T, F, Fut>(
        &mut self,
        lifetime: Lifetime,
        deps: &[TypeKey],
        factory: F,
    ) -> Result<(), GraphError>
    where
        T: Send + Sync + 'static,
        F: Fn(Resolved) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let erased: FactoryFn = Arc::new(move |resolved| {
            let fut = factory(resolved);
            Box::pin(async move { fut.await.map(Provided::instance) })
        });
        self.insert(DepNode {
            key: TypeKey::of::<T>(),
            lifetime,
            deps: deps.to_vec(),
            resource: false,
            factory: erased,
        })
    }

    /// Registers a resource factory for `T`: enter produces the value,
    /// the returned action runs on scope exit.
    ///
    /// The node is scoped; any endpoint that transitively depends on it
    /// becomes scoped.
    ///
    /// # Errors
    ///
    /// Fails when `T` is already registered with a different factory.
    pub fn resource<T, F, Fut>(&mut self, deps: &[TypeKey], factory: F) -> Result<(), GraphError>
    where
        T: Send + Sync + 'static,
        F: Fn(Resolved) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<(T, ReleaseFn)>> + Send + 'static,
    {
        self.resource_with_lifetime(Lifetime::Scoped, deps, factory)
    }

    /// Registers a resource with an explicit lifetime.
    ///
    /// Singleton resources are entered at startup and released at
    /// shutdown; any other lifetime is normalized to scoped.
    ///
    /// # Errors
    ///
    /// Fails when `T` is already registered with a different factory.
    pub fn resource_with_lifetime<T, F, Fut>(
        &mut self,
        lifetime: Lifetime,
        deps: &[TypeKey],
        factory: F,
    ) -> Result<(), GraphError>
    where
        T: Send + Sync + 'static,
        F: Fn(Resolved) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<(T, ReleaseFn)>> + Send + 'static,
    {
        let lifetime = match lifetime {
            Lifetime::Singleton => Lifetime::Singleton,
            _ => Lifetime::Scoped,
        };
        let erased: FactoryFn = Arc::new(move |resolved| {
            let fut = factory(resolved);
            Box::pin(async move {
                let (value, release) = fut.await?;
                Ok(Provided::Resource {
                    instance: Arc::new(value),
                    release,
                })
            })
        });
        self.insert(DepNode {
            key: TypeKey::of::<T>(),
            lifetime,
            deps: deps.to_vec(),
            resource: true,
            factory: erased,
        })
    }

    /// Registers a prebuilt instance as a singleton.
    ///
    /// # Errors
    ///
    /// Fails when `T` is already registered with a different factory.
    pub fn provide<T: Send + Sync + 'static>(&mut self, value: T) -> Result<(), GraphError> {
        let shared: Instance = Arc::new(value);
        let erased: FactoryFn = Arc::new(move |_| {
            let shared = Arc::clone(&shared);
            Box::pin(async move { Ok(Provided::Instance(shared)) })
        });
        self.insert(DepNode {
            key: TypeKey::of::<T>(),
            lifetime: Lifetime::Singleton,
            deps: Vec::new(),
            resource: false,
            factory: erased,
        })
    }

    fn insert(&mut self, node: DepNode) -> Result<(), GraphError> {
        if let Some(existing) = self.nodes.get(&node.key) {
            if Arc::ptr_eq(&existing.factory, &node.factory) {
                return Ok(());
            }
            return Err(GraphError::DuplicateNode(node.key.short_name().to_string()));
        }
        self.nodes.insert(node.key, node);
        Ok(())
    }

    /// Merges another graph into this one.
    ///
    /// A node registered anywhere becomes visible everywhere; the same key
    /// backed by the same factory merges silently, differing factories
    /// fail setup.
    ///
    /// # Errors
    ///
    /// Returns the first duplicate-node error encountered.
    pub fn merge(&mut self, other: Graph) -> Result<(), GraphError> {
        for (_, node) in other.nodes {
            self.insert(node)?;
        }
        Ok(())
    }

    /// Batch registration: merges a collection of part-graphs.
    ///
    /// # Errors
    ///
    /// Returns the first duplicate-node error encountered.
    pub fn register_nodes<I>(&mut self, graphs: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = Graph>,
    {
        for graph in graphs {
            self.merge(graph)?;
        }
        Ok(())
    }

    pub(crate) fn construct(
        &self,
        key: TypeKey,
        resolved: Resolved,
    ) -> BoxFuture<'static, Result<Provided, crate::ResolveError>> {
        let name = key.short_name().to_string();
        match self.nodes.get(&key) {
            Some(node) => {
                let fut = (node.factory)(resolved);
                Box::pin(async move {
                    fut.await
                        .map_err(|source| crate::ResolveError::Factory { name, source })
                })
            }
            None => Box::pin(async move { Err(crate::ResolveError::NotRegistered(name)) }),
        }
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph").field("nodes", &self.nodes.len()).finish()
    }
}
