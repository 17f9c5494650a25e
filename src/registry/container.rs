use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;

use crate::model::{Instance, TypeKey};
use crate::registry::descriptor::{ComponentDescriptor, Injector};
use crate::registry::error::RegistryError;

#[derive(Default)]
struct State {
    declarations: HashMap<TypeKey, ComponentDescriptor>,
    instances: HashMap<TypeKey, Instance>,
}

/// Holds at most one live instance per declared type.
///
/// Instances are built on first demand, dependencies first, and are only
/// stored once fully constructed. Construction runs under the registry lock,
/// so two threads resolving the same type for the first time still observe a
/// single instance.
#[derive(Default)]
pub struct Registry {
    state: Mutex<State>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a declaration. Existing instances are kept.
    pub fn declare(&self, descriptor: ComponentDescriptor) {
        debug!("Declared {} {}", descriptor.role(), descriptor.key());
        self.state
            .lock()
            .declarations
            .insert(descriptor.key(), descriptor);
    }

    pub fn contains(&self, key: TypeKey) -> bool {
        self.state.lock().instances.contains_key(&key)
    }

    pub fn instance_count(&self) -> usize {
        self.state.lock().instances.len()
    }

    /// Installs a pre-built instance under `key` unless one is already
    /// present. Returns whether it was installed.
    pub fn register_external(&self, key: TypeKey, instance: Instance) -> bool {
        let mut state = self.state.lock();
        if state.instances.contains_key(&key) {
            debug!("{key} already has an instance; external registration ignored");
            return false;
        }
        state.instances.insert(key, instance);
        info!("Registered external instance of {key}");
        true
    }

    /// Returns the instance for `key`, constructing it and any missing
    /// dependencies first.
    pub fn resolve(&self, key: TypeKey) -> Result<Instance, RegistryError> {
        let mut state = self.state.lock();
        if let Some(instance) = state.instances.get(&key) {
            return Ok(instance.clone());
        }

        for pending in construction_order(&state, key)? {
            build(&mut state, pending)?;
        }

        state
            .instances
            .get(&key)
            .cloned()
            .ok_or(RegistryError::Undeclared { key })
    }

    /// Typed [`Registry::resolve`].
    pub fn resolve_as<T: Any + Send + Sync>(&self) -> Result<Arc<T>, RegistryError> {
        let key = TypeKey::of::<T>();
        self.resolve(key)?
            .downcast::<T>()
            .map_err(|_| RegistryError::TypeMismatch {
                key,
                expected: key.name(),
            })
    }
}

fn build(state: &mut State, key: TypeKey) -> Result<(), RegistryError> {
    let descriptor = state
        .declarations
        .get(&key)
        .ok_or(RegistryError::Undeclared { key })?;

    let dependencies: HashMap<TypeKey, Instance> = descriptor
        .dependencies()
        .iter()
        .filter_map(|dep| state.instances.get(dep).map(|instance| (*dep, instance.clone())))
        .collect();

    let instance = descriptor.construct(&Injector::new(key, &dependencies))?;
    if (*instance).type_id() != key.id() {
        return Err(RegistryError::TypeMismatch {
            key,
            expected: key.name(),
        });
    }

    info!("Created instance of {key}");
    state.instances.insert(key, instance);
    Ok(())
}

/// Declared types that must be built for `root`, dependencies first.
fn construction_order(state: &State, root: TypeKey) -> Result<Vec<TypeKey>, RegistryError> {
    let mut order = Vec::new();
    let mut done = HashSet::new();
    let mut path = Vec::new();
    visit(state, root, None, &mut path, &mut done, &mut order)?;
    Ok(order)
}

fn visit(
    state: &State,
    key: TypeKey,
    required_by: Option<TypeKey>,
    path: &mut Vec<TypeKey>,
    done: &mut HashSet<TypeKey>,
    order: &mut Vec<TypeKey>,
) -> Result<(), RegistryError> {
    if done.contains(&key) || state.instances.contains_key(&key) {
        return Ok(());
    }
    if let Some(start) = path.iter().position(|seen| *seen == key) {
        let mut cycle = path[start..].to_vec();
        cycle.push(key);
        return Err(RegistryError::Cycle { path: cycle });
    }

    let descriptor = state.declarations.get(&key).ok_or(match required_by {
        Some(required_by) => RegistryError::MissingDependency { key, required_by },
        None => RegistryError::Undeclared { key },
    })?;

    path.push(key);
    for dependency in descriptor.dependencies() {
        visit(state, *dependency, Some(key), path, done, order)?;
    }
    path.pop();

    done.insert(key);
    order.push(key);
    Ok(())
}
