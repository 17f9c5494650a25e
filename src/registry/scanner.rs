use crate::model::{Role, TypeKey};
use crate::registry::descriptor::{ComponentDescriptor, ControllerDescriptor, RepositoryDescriptor};

/// One declared type, as found by a scanner.
#[derive(Debug, Clone)]
pub enum Declaration {
    /// A service, component or other plain component.
    Component(ComponentDescriptor),
    Controller(ControllerDescriptor),
    Repository(RepositoryDescriptor),
}

impl Declaration {
    pub fn key(&self) -> TypeKey {
        match self {
            Declaration::Component(component) => component.key(),
            Declaration::Controller(controller) => controller.key(),
            Declaration::Repository(repository) => repository.key(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Declaration::Component(component) => component.role(),
            Declaration::Controller(_) => Role::Controller,
            Declaration::Repository(_) => Role::Repository,
        }
    }
}

/// Finds the declared types of a namespace.
///
/// The result is unordered; bootstrap imposes its own order.
pub trait ComponentScanner {
    fn scan(&self, namespace: &str) -> Vec<Declaration>;
}

/// An in-memory scanner filled in by the application.
///
/// A namespace is a Rust module path: scanning `shop::users` returns the
/// declarations whose type lives in that module or below it. An empty
/// namespace returns everything.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    declarations: Vec<Declaration>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(mut self, declaration: Declaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    pub fn component(self, component: ComponentDescriptor) -> Self {
        self.declare(Declaration::Component(component))
    }

    pub fn controller(self, controller: ControllerDescriptor) -> Self {
        self.declare(Declaration::Controller(controller))
    }

    pub fn repository(self, repository: RepositoryDescriptor) -> Self {
        self.declare(Declaration::Repository(repository))
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

impl ComponentScanner for Catalog {
    fn scan(&self, namespace: &str) -> Vec<Declaration> {
        self.declarations
            .iter()
            .filter(|declaration| in_namespace(declaration.key().name(), namespace))
            .cloned()
            .collect()
    }
}

fn in_namespace(type_name: &str, namespace: &str) -> bool {
    if namespace.is_empty() {
        return true;
    }
    type_name
        .strip_prefix(namespace)
        .is_some_and(|rest| rest.starts_with("::"))
}
