use thiserror::Error;

use crate::model::TypeKey;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{key} is not declared")]
    Undeclared { key: TypeKey },

    #[error("{key} is not declared but {required_by} depends on it")]
    MissingDependency { key: TypeKey, required_by: TypeKey },

    #[error("{component} asked for {dependency} without declaring it as a dependency")]
    UndeclaredDependency {
        component: TypeKey,
        dependency: TypeKey,
    },

    #[error("{key} has no constructor")]
    MissingFactory { key: TypeKey },

    #[error("failed to construct {key}: {source}")]
    Construction {
        key: TypeKey,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Construction order would revisit a type already being built.
    /// `path` starts and ends with the same type.
    #[error("dependency cycle: {}", render_path(.path))]
    Cycle { path: Vec<TypeKey> },

    #[error("{key} does not hold a {expected}")]
    TypeMismatch { key: TypeKey, expected: &'static str },
}

fn render_path(path: &[TypeKey]) -> String {
    path.iter()
        .map(|key| key.short_name())
        .collect::<Vec<_>>()
        .join(" -> ")
}
