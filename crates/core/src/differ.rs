//! Decides whether a live state differs from its component's default.

use std::fmt;

use once_cell::unsync::OnceCell;

use crate::component::ComponentDescriptor;
use crate::schema::{PersistentState, Schema};

/// 狀態比較策略。 / How two states of a component are compared.
pub enum EqualityStrategy<S> {
    /// Field by field, using each field's [`Persist::same_as`](crate::Persist::same_as).
    Structural,
    /// Caller-supplied comparison; replaces the structural one entirely.
    Custom(Box<dyn Fn(&S, &S) -> bool>),
}

impl<S: PersistentState> EqualityStrategy<S> {
    pub fn equal(&self, schema: &Schema<S>, left: &S, right: &S) -> bool {
        match self {
            EqualityStrategy::Structural => schema.fields_equal(left, right),
            EqualityStrategy::Custom(compare) => compare(left, right),
        }
    }
}

impl<S> Default for EqualityStrategy<S> {
    fn default() -> Self {
        EqualityStrategy::Structural
    }
}

impl<S> fmt::Debug for EqualityStrategy<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EqualityStrategy::Structural => f.write_str("Structural"),
            EqualityStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// 延遲建立並快取的預設狀態。 / Default instance built on first use and kept for the process lifetime.
pub struct DefaultStateCache<S> {
    supplier: Box<dyn Fn() -> S>,
    cell: OnceCell<S>,
}

impl<S> DefaultStateCache<S> {
    pub fn new(supplier: impl Fn() -> S + 'static) -> Self {
        Self {
            supplier: Box::new(supplier),
            cell: OnceCell::new(),
        }
    }

    pub fn get(&self) -> &S {
        self.cell.get_or_init(|| (self.supplier)())
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// A fresh instance straight from the supplier, bypassing the cache.
    pub fn fresh(&self) -> S {
        (self.supplier)()
    }
}

impl<S> fmt::Debug for DefaultStateCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultStateCache")
            .field("initialized", &self.cell.get().is_some())
            .finish()
    }
}

/// 狀態是否等同於預設值。 / Whether `value` is indistinguishable from the component's default state.
pub fn is_default<S: PersistentState>(value: &S, descriptor: &ComponentDescriptor<S>) -> bool {
    let equal = descriptor.equals(value, descriptor.default_state());
    tracing::trace!(component = descriptor.name(), equal, "compared against default state");
    equal
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::schema::SchemaBuilder;
    use crate::storage::StorageSpec;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Counter {
        count: u32,
        history: Vec<String>,
    }

    impl PersistentState for Counter {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field("count", |s| &s.count, |s| &mut s.count);
            schema.field("history", |s| &s.history, |s| &mut s.history);
        }
    }

    fn spec() -> StorageSpec {
        StorageSpec::new("$APP_CONFIG$/counter.xml").unwrap()
    }

    #[test]
    fn supplier_runs_once() {
        let calls = Rc::new(Cell::new(0));
        let counted = Rc::clone(&calls);
        let cache = DefaultStateCache::new(move || {
            counted.set(counted.get() + 1);
            Counter::default()
        });
        assert!(!cache.is_initialized());
        cache.get();
        cache.get();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn structural_comparison_covers_collections() {
        let descriptor = ComponentDescriptor::<Counter>::builder("Counter")
            .storage(spec())
            .build()
            .unwrap();
        assert!(is_default(&Counter::default(), &descriptor));

        let touched = Counter {
            history: vec!["x".into()],
            ..Counter::default()
        };
        assert!(!is_default(&touched, &descriptor));
    }

    #[test]
    fn custom_equality_takes_precedence() {
        let descriptor = ComponentDescriptor::<Counter>::builder("Counter")
            .storage(spec())
            .equality(|a: &Counter, b: &Counter| a.count == b.count)
            .build()
            .unwrap();
        let touched = Counter {
            history: vec!["ignored".into()],
            ..Counter::default()
        };
        assert!(is_default(&touched, &descriptor));
    }
}
