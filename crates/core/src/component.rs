//! Component descriptors and their registration-time validation.

use std::fmt;

use thiserror::Error;

use crate::differ::{DefaultStateCache, EqualityStrategy};
use crate::schema::{PersistentState, Schema, SchemaError};
use crate::storage::{RoamingType, StorageSpec};

/// 元件的生命週期範圍。 / Lifetime scope of a component's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentScope {
    /// Process-wide.
    Application,
    Project,
    Module,
}

impl fmt::Display for ComponentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ComponentScope::Application => "application",
            ComponentScope::Project => "project",
            ComponentScope::Module => "module",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("`{0}` is not a valid component name")]
    InvalidName(String),
    #[error("component `{component}` has an invalid state schema")]
    Schema {
        component: String,
        #[source]
        source: SchemaError,
    },
    #[error("component `{0}` declares no storage")]
    NoStorage(String),
    #[error("component `{component}` ({scope}) cannot store under `{template}`")]
    Placeholder {
        component: String,
        scope: ComponentScope,
        template: String,
    },
    #[error("component `{0}` is already registered")]
    Duplicate(String),
    #[error("component `{component}` is {found}-scoped but this registry holds {expected} components")]
    ScopeMismatch {
        component: String,
        expected: ComponentScope,
        found: ComponentScope,
    },
}

/// Checks the identity and storage declarations shared by every component kind.
pub(crate) fn validate_declaration(
    name: &str,
    scope: ComponentScope,
    storages: &[StorageSpec],
) -> Result<(), RegistrationError> {
    if name.is_empty() || name.trim() != name || name.chars().any(char::is_control) {
        return Err(RegistrationError::InvalidName(name.to_string()));
    }
    if storages.is_empty() {
        return Err(RegistrationError::NoStorage(name.to_string()));
    }
    for spec in storages {
        if !spec.template().placeholder().allowed_in(scope) {
            return Err(RegistrationError::Placeholder {
                component: name.to_string(),
                scope,
                template: spec.template().to_string(),
            });
        }
    }
    Ok(())
}

/// 一個已註冊元件的完整描述。 / Everything the engine knows about one stateful component.
pub struct ComponentDescriptor<S> {
    name: String,
    scope: ComponentScope,
    schema: Schema<S>,
    storages: Vec<StorageSpec>,
    equality: EqualityStrategy<S>,
    defaults: DefaultStateCache<S>,
}

impl<S: PersistentState> ComponentDescriptor<S> {
    pub fn builder(name: impl Into<String>) -> ComponentDescriptorBuilder<S> {
        ComponentDescriptorBuilder {
            name: name.into(),
            scope: ComponentScope::Application,
            storages: Vec::new(),
            supplier: None,
            equality: EqualityStrategy::Structural,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> ComponentScope {
        self.scope
    }

    pub fn schema(&self) -> &Schema<S> {
        &self.schema
    }

    pub fn storages(&self) -> &[StorageSpec] {
        &self.storages
    }

    pub fn is_roaming(&self) -> bool {
        self.storages
            .iter()
            .any(|spec| spec.roaming_type() == RoamingType::Synchronizable)
    }

    /// 快取的預設狀態。 / The memoized default instance.
    pub fn default_state(&self) -> &S {
        self.defaults.get()
    }

    /// Compares two states with the component's equality strategy.
    pub fn equals(&self, left: &S, right: &S) -> bool {
        self.equality.equal(&self.schema, left, right)
    }
}

impl<S> fmt::Debug for ComponentDescriptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("storages", &self.storages)
            .field("equality", &self.equality)
            .finish_non_exhaustive()
    }
}

pub struct ComponentDescriptorBuilder<S> {
    name: String,
    scope: ComponentScope,
    storages: Vec<StorageSpec>,
    supplier: Option<Box<dyn Fn() -> S>>,
    equality: EqualityStrategy<S>,
}

impl<S: PersistentState> ComponentDescriptorBuilder<S> {
    pub fn scope(mut self, scope: ComponentScope) -> Self {
        self.scope = scope;
        self
    }

    /// 新增候選儲存位置；宣告順序即優先順序的次序。 / Adds a storage candidate; declaration order breaks priority ties.
    pub fn storage(mut self, spec: StorageSpec) -> Self {
        self.storages.push(spec);
        self
    }

    /// Overrides `S::default` as the default-state supplier. Must be pure.
    pub fn default_state(mut self, supplier: impl Fn() -> S + 'static) -> Self {
        self.supplier = Some(Box::new(supplier));
        self
    }

    pub fn equality(mut self, compare: impl Fn(&S, &S) -> bool + 'static) -> Self {
        self.equality = EqualityStrategy::Custom(Box::new(compare));
        self
    }

    pub fn build(self) -> Result<ComponentDescriptor<S>, RegistrationError> {
        validate_declaration(&self.name, self.scope, &self.storages)?;
        let schema = Schema::<S>::build().map_err(|source| RegistrationError::Schema {
            component: self.name.clone(),
            source,
        })?;

        let defaults = match self.supplier {
            Some(supplier) => DefaultStateCache::new(supplier),
            None => DefaultStateCache::new(S::default),
        };

        if cfg!(debug_assertions) {
            let first = defaults.fresh();
            let second = defaults.fresh();
            if !self.equality.equal(&schema, &first, &second) {
                tracing::warn!(
                    component = %self.name,
                    "default state supplier is not deterministic; default suppression may misfire"
                );
            }
        }

        tracing::debug!(
            component = %self.name,
            scope = %self.scope,
            fields = schema.fields().count(),
            "component descriptor built"
        );
        Ok(ComponentDescriptor {
            name: self.name,
            scope: self.scope,
            schema,
            storages: self.storages,
            equality: self.equality,
            defaults,
        })
    }
}
