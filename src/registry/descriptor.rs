//! Declarations consumed by the registry and the route table.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::api::routes::{HandlerMethod, Verb};
use crate::logic::proxy::RepositoryProxy;
use crate::logic::repository::RepositoryMethod;
use crate::model::{Instance, Role, TypeKey};
use crate::registry::error::RegistryError;

type Factory = dyn Fn(&Injector<'_>) -> anyhow::Result<Instance> + Send + Sync;

/// A declared component: its identity, role, dependencies and constructor.
///
/// Dependencies are listed up front so the registry can build them first;
/// the constructor only sees what it declared.
#[derive(Clone)]
pub struct ComponentDescriptor {
    key: TypeKey,
    role: Role,
    dependencies: Vec<TypeKey>,
    factory: Option<Arc<Factory>>,
}

impl ComponentDescriptor {
    pub fn new<T: Any>(role: Role) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            role,
            dependencies: Vec::new(),
            factory: None,
        }
    }

    pub fn service<T: Any>() -> Self {
        Self::new::<T>(Role::Service)
    }

    pub fn component<T: Any>() -> Self {
        Self::new::<T>(Role::Component)
    }

    pub fn controller<T: Any>() -> Self {
        Self::new::<T>(Role::Controller)
    }

    /// A component built with `T::default()`.
    pub fn default_constructed<T: Default + Send + Sync + 'static>(role: Role) -> Self {
        Self::new::<T>(role).with_factory(|_| Ok(T::default()))
    }

    pub fn depends_on<D: Any>(mut self) -> Self {
        let key = TypeKey::of::<D>();
        if !self.dependencies.contains(&key) {
            self.dependencies.push(key);
        }
        self
    }

    /// Sets the constructor. `T` must be the declared type.
    pub fn with_factory<T, F>(mut self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Injector<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.factory = Some(erase(move |injector| {
            let instance: Instance = Arc::new(factory(injector)?);
            Ok(instance)
        }));
        self
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn dependencies(&self) -> &[TypeKey] {
        &self.dependencies
    }

    pub(crate) fn construct(&self, injector: &Injector<'_>) -> Result<Instance, RegistryError> {
        let factory = self
            .factory
            .as_ref()
            .ok_or(RegistryError::MissingFactory { key: self.key })?;
        factory(injector).map_err(|source| RegistryError::Construction {
            key: self.key,
            source: source.into(),
        })
    }
}

fn erase<F>(factory: F) -> Arc<Factory>
where
    F: Fn(&Injector<'_>) -> anyhow::Result<Instance> + Send + Sync + 'static,
{
    Arc::new(factory)
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("key", &self.key)
            .field("role", &self.role)
            .field("dependencies", &self.dependencies)
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

/// The already-built dependencies handed to a constructor.
pub struct Injector<'a> {
    component: TypeKey,
    resolved: &'a HashMap<TypeKey, Instance>,
}

impl<'a> Injector<'a> {
    pub(crate) fn new(component: TypeKey, resolved: &'a HashMap<TypeKey, Instance>) -> Self {
        Self {
            component,
            resolved,
        }
    }

    /// The component being constructed.
    pub fn component(&self) -> TypeKey {
        self.component
    }

    fn instance(&self, dependency: TypeKey) -> Result<&Instance, RegistryError> {
        self.resolved
            .get(&dependency)
            .ok_or(RegistryError::UndeclaredDependency {
                component: self.component,
                dependency,
            })
    }

    /// A declared dependency of type `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, RegistryError> {
        let key = TypeKey::of::<T>();
        self.instance(key)?
            .clone()
            .downcast::<T>()
            .map_err(|_| RegistryError::TypeMismatch {
                key,
                expected: key.name(),
            })
    }

    /// The proxy standing in for repository `R`.
    pub fn repository<R: Any>(&self) -> Result<Arc<RepositoryProxy>, RegistryError> {
        let key = TypeKey::of::<R>();
        self.instance(key)?
            .clone()
            .downcast::<RepositoryProxy>()
            .map_err(|_| RegistryError::TypeMismatch {
                key,
                expected: TypeKey::of::<RepositoryProxy>().name(),
            })
    }
}

/// A repository and the methods it declares.
#[derive(Debug, Clone)]
pub struct RepositoryDescriptor {
    key: TypeKey,
    methods: Vec<RepositoryMethod>,
}

impl RepositoryDescriptor {
    pub fn new<R: Any>() -> Self {
        Self {
            key: TypeKey::of::<R>(),
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, method: RepositoryMethod) -> Self {
        self.methods.push(method);
        self
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn methods(&self) -> &[RepositoryMethod] {
        &self.methods
    }
}

/// One verb/path mapping declared on a controller.
#[derive(Debug, Clone)]
pub struct HandlerMapping {
    pub verb: Verb,
    pub path: String,
    pub handler: HandlerMethod,
}

/// A controller: a component with a base path and handler mappings.
///
/// Each route is registered at `base_path + path`.
#[derive(Debug, Clone)]
pub struct ControllerDescriptor {
    component: ComponentDescriptor,
    base_path: String,
    mappings: Vec<HandlerMapping>,
}

impl ControllerDescriptor {
    pub fn new(component: ComponentDescriptor, base_path: impl Into<String>) -> Self {
        Self {
            component,
            base_path: base_path.into(),
            mappings: Vec::new(),
        }
    }

    pub fn map(mut self, verb: Verb, path: impl Into<String>, handler: HandlerMethod) -> Self {
        self.mappings.push(HandlerMapping {
            verb,
            path: path.into(),
            handler,
        });
        self
    }

    pub fn get(self, path: impl Into<String>, handler: HandlerMethod) -> Self {
        self.map(Verb::Get, path, handler)
    }

    pub fn post(self, path: impl Into<String>, handler: HandlerMethod) -> Self {
        self.map(Verb::Post, path, handler)
    }

    pub fn put(self, path: impl Into<String>, handler: HandlerMethod) -> Self {
        self.map(Verb::Put, path, handler)
    }

    pub fn delete(self, path: impl Into<String>, handler: HandlerMethod) -> Self {
        self.map(Verb::Delete, path, handler)
    }

    pub fn component(&self) -> &ComponentDescriptor {
        &self.component
    }

    pub fn key(&self) -> TypeKey {
        self.component.key()
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn mappings(&self) -> &[HandlerMapping] {
        &self.mappings
    }

    /// `(verb, full path, handler)` for every mapping.
    pub fn routes(&self) -> impl Iterator<Item = (Verb, String, &HandlerMethod)> + '_ {
        self.mappings.iter().map(|mapping| {
            (
                mapping.verb,
                format!("{}{}", self.base_path, mapping.path),
                &mapping.handler,
            )
        })
    }
}
