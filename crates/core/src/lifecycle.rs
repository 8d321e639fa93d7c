//! Load, reload and save orchestration across registered components.
//!
//! The manager runs on a single owner thread. Backends report external
//! changes through a channel; [`LifecycleManager::process_external_changes`]
//! drains it on the owner thread before any component hook runs.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

use indexmap::IndexMap;
use thiserror::Error;

use crate::backend::{ChangeEvent, ChangeKind, ChangeSink, StorageBackend, StorageError};
use crate::codec::FieldIssue;
use crate::component::{ComponentDescriptor, ComponentScope, RegistrationError};
use crate::differ::is_default;
use crate::legacy::{Externalizable, LegacyDescriptor, LegacyError};
use crate::router::{BlockUpdate, ProjectScheme, RoutingError, StorageDocument, StorageRouter};
use crate::schema::PersistentState;
use crate::storage::{PathTemplate, RoamingType, StorageSpec};
use crate::tree::StateTree;

/// 可持久化元件。 / A component whose state survives restarts.
pub trait PersistentComponent: 'static {
    type State: PersistentState;

    /// Current state; called on every save trigger.
    fn state(&self) -> Self::State;

    fn load_state(&mut self, state: Self::State);

    /// Called at startup when no block exists for the component.
    fn no_state_loaded(&mut self) {}

    /// Called after an external change was loaded. Propagating the change to
    /// dependents is the component's job; long work must be handed off.
    fn on_reloaded(&mut self, _event: &ReloadEvent) {}
}

/// 外部變更後的重新載入事件。 / Delivered to a component after an external change was loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadEvent {
    pub component: String,
    pub location: PathTemplate,
    pub kind: ChangeKind,
}

/// 元件的生命週期階段。 / Lifecycle phase of a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentPhase {
    Uninitialized,
    Constructed,
    Loaded,
    Running,
    ReloadPending,
}

/// 觸發儲存的原因。 / Why a save cycle runs. Every trigger re-serializes every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    Periodic,
    Deactivation,
    Shutdown,
    Explicit,
}

enum Snapshot {
    Default,
    Block(StateTree, Vec<FieldIssue>),
    Failed(String),
}

trait Managed {
    fn name(&self) -> &str;
    fn scope(&self) -> ComponentScope;
    fn storages(&self) -> &[StorageSpec];
    fn construct(&mut self);
    fn load(&mut self, block: &StateTree) -> Result<Vec<FieldIssue>, LegacyError>;
    fn no_state(&mut self);
    fn reset(&mut self);
    fn snapshot(&self) -> Snapshot;
    fn reloaded(&mut self, event: &ReloadEvent);
    fn component(&self) -> &dyn Any;
    fn component_mut(&mut self) -> &mut dyn Any;
}

struct Stateful<C: PersistentComponent> {
    descriptor: ComponentDescriptor<C::State>,
    component: C,
}

impl<C: PersistentComponent> Managed for Stateful<C> {
    fn name(&self) -> &str {
        self.descriptor.name()
    }

    fn scope(&self) -> ComponentScope {
        self.descriptor.scope()
    }

    fn storages(&self) -> &[StorageSpec] {
        self.descriptor.storages()
    }

    fn construct(&mut self) {
        self.descriptor.default_state();
    }

    fn load(&mut self, block: &StateTree) -> Result<Vec<FieldIssue>, LegacyError> {
        let base = self.descriptor.default_state().clone();
        let outcome = self.descriptor.schema().from_tree(block, base);
        self.component.load_state(outcome.value);
        Ok(outcome.issues)
    }

    fn no_state(&mut self) {
        self.component.no_state_loaded();
    }

    fn reset(&mut self) {
        let state = self.descriptor.default_state().clone();
        self.component.load_state(state);
    }

    fn snapshot(&self) -> Snapshot {
        let state = self.component.state();
        if is_default(&state, &self.descriptor) {
            return Snapshot::Default;
        }
        let outcome = self
            .descriptor
            .schema()
            .to_tree(&state, Some(self.descriptor.default_state()));
        let block = StorageDocument::block(self.descriptor.name(), outcome.value);
        Snapshot::Block(block, outcome.issues)
    }

    fn reloaded(&mut self, event: &ReloadEvent) {
        self.component.on_reloaded(event);
    }

    fn component(&self) -> &dyn Any {
        &self.component
    }

    fn component_mut(&mut self) -> &mut dyn Any {
        &mut self.component
    }
}

struct Legacy<C: Externalizable> {
    descriptor: LegacyDescriptor,
    component: C,
}

impl<C: Externalizable> Managed for Legacy<C> {
    fn name(&self) -> &str {
        self.descriptor.name()
    }

    fn scope(&self) -> ComponentScope {
        self.descriptor.scope()
    }

    fn storages(&self) -> &[StorageSpec] {
        self.descriptor.storages()
    }

    fn construct(&mut self) {}

    fn load(&mut self, block: &StateTree) -> Result<Vec<FieldIssue>, LegacyError> {
        match self.component.read_external(block) {
            Ok(()) => Ok(Vec::new()),
            Err(LegacyError::Fields(issues)) => Ok(issues),
            Err(err) => Err(err),
        }
    }

    fn no_state(&mut self) {}

    fn reset(&mut self) {
        tracing::debug!(
            component = self.descriptor.name(),
            "hand-written component keeps its state when its block disappears"
        );
    }

    fn snapshot(&self) -> Snapshot {
        let mut element = StateTree::new(crate::router::COMPONENT_TAG);
        if let Err(err) = self.component.write_external(&mut element) {
            return Snapshot::Failed(err.to_string());
        }
        if element.is_empty() {
            Snapshot::Default
        } else {
            Snapshot::Block(
                StorageDocument::block(self.descriptor.name(), element),
                Vec::new(),
            )
        }
    }

    fn reloaded(&mut self, _event: &ReloadEvent) {}

    fn component(&self) -> &dyn Any {
        &self.component
    }

    fn component_mut(&mut self) -> &mut dyn Any {
        &mut self.component
    }
}

struct Entry {
    managed: Box<dyn Managed>,
    phase: ComponentPhase,
    /// Last block loaded from or written to the component's location.
    last_block: Option<StateTree>,
    /// Where the loaded block came from, until a save has cleared that copy.
    source: Option<PathTemplate>,
}

/// 元件登錄表。 / Explicit registry of the components of one scope.
pub struct ComponentRegistry {
    scope: ComponentScope,
    entries: Vec<Entry>,
}

impl ComponentRegistry {
    pub fn new(scope: ComponentScope) -> Self {
        Self {
            scope,
            entries: Vec::new(),
        }
    }

    pub fn scope(&self) -> ComponentScope {
        self.scope
    }

    /// 註冊以結構描述持久化的元件。 / Registers a schema-based component.
    pub fn register<C: PersistentComponent>(
        &mut self,
        descriptor: ComponentDescriptor<C::State>,
        component: C,
    ) -> Result<(), RegistrationError> {
        self.check(descriptor.name(), descriptor.scope())?;
        self.insert(Box::new(Stateful {
            descriptor,
            component,
        }));
        Ok(())
    }

    /// 註冊手動讀寫的元件。 / Registers a hand-written component.
    pub fn register_legacy<C: Externalizable>(
        &mut self,
        descriptor: LegacyDescriptor,
        component: C,
    ) -> Result<(), RegistrationError> {
        self.check(descriptor.name(), descriptor.scope())?;
        self.insert(Box::new(Legacy {
            descriptor,
            component,
        }));
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.managed.name())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.managed.name() == name)
    }

    fn check(&self, name: &str, scope: ComponentScope) -> Result<(), RegistrationError> {
        if scope != self.scope {
            return Err(RegistrationError::ScopeMismatch {
                component: name.to_string(),
                expected: self.scope,
                found: scope,
            });
        }
        if self.contains(name) {
            return Err(RegistrationError::Duplicate(name.to_string()));
        }
        Ok(())
    }

    fn insert(&mut self, managed: Box<dyn Managed>) {
        tracing::debug!(component = managed.name(), scope = %self.scope, "component registered");
        self.entries.push(Entry {
            managed,
            phase: ComponentPhase::Uninitialized,
            last_block: None,
            source: None,
        });
    }

    fn find(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.managed.name() == name)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.managed.name() == name)
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("scope", &self.scope)
            .field("components", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// 載入時遇到的非致命問題。 / Non-fatal problem met while loading.
#[derive(Debug)]
pub enum LoadProblem {
    /// The location could not be read or parsed; affected components got their default state.
    Unreadable {
        location: PathTemplate,
        error: StorageError,
    },
    Field {
        component: String,
        issue: FieldIssue,
    },
    Legacy {
        component: String,
        error: LegacyError,
    },
    Routing(RoutingError),
}

/// 載入或重新載入的結果。 / Outcome of a load or reload pass.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Components that received a persisted block.
    pub loaded: Vec<String>,
    /// Components left with (or reset to) their default state.
    pub defaulted: Vec<String>,
    /// Components whose block was unchanged by an external event.
    pub unchanged: Vec<String>,
    pub problems: Vec<LoadProblem>,
}

/// 儲存週期的結果。 / Outcome of a save cycle.
#[derive(Debug)]
pub struct SaveReport {
    pub trigger: SaveTrigger,
    pub written: Vec<PathTemplate>,
    pub deleted: Vec<PathTemplate>,
    /// Locations whose merged document matched the stored one.
    pub unchanged: Vec<PathTemplate>,
    /// Components whose block was left untouched because serialization failed.
    pub skipped: Vec<String>,
    pub issues: Vec<(String, FieldIssue)>,
}

impl SaveReport {
    fn new(trigger: SaveTrigger) -> Self {
        Self {
            trigger,
            written: Vec::new(),
            deleted: Vec::new(),
            unchanged: Vec::new(),
            skipped: Vec::new(),
            issues: Vec::new(),
        }
    }
}

/// 儲存失敗。 / Physical writes failed for some locations; the others were saved.
#[derive(Debug, Error)]
#[error("failed to save {} location(s): {}", .failures.len(), describe_failures(.failures))]
pub struct SaveError {
    pub report: SaveReport,
    pub failures: Vec<(PathTemplate, StorageError)>,
}

fn describe_failures(failures: &[(PathTemplate, StorageError)]) -> String {
    failures
        .iter()
        .map(|(location, error)| format!("{location}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

struct LocationPlan {
    updates: Vec<BlockUpdate>,
    /// Entry index and the block it will have once the write succeeds.
    owners: Vec<(usize, Option<StateTree>)>,
    /// Entries whose previous location no longer holds their block once this commits.
    released: Vec<usize>,
}

/// 生命週期管理器。 / Drives load, reload and save for every registered component.
pub struct LifecycleManager<B> {
    registry: ComponentRegistry,
    backend: B,
    router: StorageRouter,
    changes_tx: Sender<ChangeEvent>,
    changes_rx: Receiver<ChangeEvent>,
    watched: HashSet<PathTemplate>,
}

impl<B: StorageBackend> LifecycleManager<B> {
    pub fn new(registry: ComponentRegistry, backend: B, scheme: ProjectScheme) -> Self {
        let (changes_tx, changes_rx) = mpsc::channel();
        Self {
            registry,
            backend,
            router: StorageRouter::new(scheme),
            changes_tx,
            changes_rx,
            watched: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Components registered later start `Uninitialized` and load on the next [`load_all`](Self::load_all).
    pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn router(&self) -> &StorageRouter {
        &self.router
    }

    /// A sender for change events coming from outside the backend's own watch support.
    pub fn change_sink(&self) -> ChangeSink {
        self.changes_tx.clone()
    }

    pub fn phase(&self, name: &str) -> Option<ComponentPhase> {
        self.registry.find(name).map(|entry| entry.phase)
    }

    pub fn component<C: 'static>(&self, name: &str) -> Option<&C> {
        self.registry
            .find(name)
            .and_then(|entry| entry.managed.component().downcast_ref::<C>())
    }

    pub fn component_mut<C: 'static>(&mut self, name: &str) -> Option<&mut C> {
        self.registry
            .find_mut(name)
            .and_then(|entry| entry.managed.component_mut().downcast_mut::<C>())
    }

    /// 載入所有尚未初始化的元件。 / Loads every `Uninitialized` component and starts watching its locations.
    pub fn load_all(&mut self) -> LoadReport {
        let mut report = LoadReport::default();
        let mut documents: HashMap<PathTemplate, Option<StateTree>> = HashMap::new();
        let scope = self.registry.scope;

        for index in 0..self.registry.entries.len() {
            if self.registry.entries[index].phase != ComponentPhase::Uninitialized {
                continue;
            }
            let entry = &mut self.registry.entries[index];
            entry.managed.construct();
            entry.phase = ComponentPhase::Constructed;
            let name = entry.managed.name().to_string();

            let backend = &self.backend;
            let read = self.router.resolve_read(&name, scope, entry.managed.storages(), |template| {
                backend.exists(template)
            });
            let (location, watch_targets) = match read {
                Ok(spec) => {
                    let mut targets = vec![spec.template().clone()];
                    if let Ok(write) = self.router.resolve_write(&name, scope, entry.managed.storages()) {
                        if write.template() != spec.template() {
                            targets.push(write.template().clone());
                        }
                    }
                    (Some(spec.template().clone()), targets)
                }
                Err(err) => {
                    report.problems.push(LoadProblem::Routing(err));
                    (None, Vec::new())
                }
            };

            let block = location.as_ref().and_then(|location| {
                let document = cached_read(&self.backend, &mut documents, location, &mut report);
                document
                    .as_ref()
                    .and_then(|doc| StorageDocument::find_block(doc, &name))
                    .cloned()
            });

            let entry = &mut self.registry.entries[index];
            match &block {
                Some(block) => {
                    apply_block(entry, &name, block, &mut report);
                    entry.phase = ComponentPhase::Loaded;
                    report.loaded.push(name.clone());
                }
                None => {
                    entry.managed.no_state();
                    report.defaulted.push(name.clone());
                }
            }
            entry.source = block.as_ref().and(location);
            entry.last_block = block;
            entry.phase = ComponentPhase::Running;

            for target in watch_targets {
                self.watch(target);
            }
        }

        tracing::info!(
            loaded = report.loaded.len(),
            defaulted = report.defaulted.len(),
            problems = report.problems.len(),
            "component state loaded"
        );
        report
    }

    fn watch(&mut self, location: PathTemplate) {
        if self.watched.contains(&location) {
            return;
        }
        match self.backend.watch(&location, self.changes_tx.clone()) {
            Ok(true) => {
                self.watched.insert(location);
            }
            Ok(false) => {
                tracing::debug!(%location, "backend cannot watch; state is loaded once");
            }
            Err(err) => {
                tracing::warn!(%location, error = %err, "failed to watch storage location");
            }
        }
    }

    /// 在擁有者執行緒上處理外部變更。 / Drains pending change events and reloads affected components.
    ///
    /// Several events for one location are coalesced. A component whose block
    /// is identical to the one last loaded or written is not reloaded, which
    /// filters out echoes of the manager's own writes.
    pub fn process_external_changes(&mut self) -> LoadReport {
        let mut pending: IndexMap<PathTemplate, ChangeKind> = IndexMap::new();
        for event in self.changes_rx.try_iter() {
            pending.insert(event.location, event.kind);
        }

        let mut report = LoadReport::default();
        let mut documents: HashMap<PathTemplate, Option<StateTree>> = HashMap::new();
        for (location, kind) in pending {
            self.reload_location(&location, kind, &mut documents, &mut report);
        }
        if !report.loaded.is_empty() || !report.defaulted.is_empty() {
            tracing::info!(
                reloaded = report.loaded.len() + report.defaulted.len(),
                "external changes applied"
            );
        }
        report
    }

    fn reload_location(
        &mut self,
        location: &PathTemplate,
        kind: ChangeKind,
        documents: &mut HashMap<PathTemplate, Option<StateTree>>,
        report: &mut LoadReport,
    ) {
        let scope = self.registry.scope;
        for index in 0..self.registry.entries.len() {
            let entry = &self.registry.entries[index];
            if entry.phase != ComponentPhase::Running
                || !entry
                    .managed
                    .storages()
                    .iter()
                    .any(|spec| spec.template() == location)
            {
                continue;
            }
            let name = entry.managed.name().to_string();

            let backend = &self.backend;
            let read = match self.router.resolve_read(&name, scope, entry.managed.storages(), |t| {
                backend.exists(t)
            }) {
                Ok(spec) => spec.template().clone(),
                Err(err) => {
                    report.problems.push(LoadProblem::Routing(err));
                    continue;
                }
            };
            // Only the location the component currently reads from matters,
            // unless that location just vanished.
            if &read != location && kind != ChangeKind::Removed {
                continue;
            }

            let document = cached_read(&self.backend, documents, &read, report);
            let block = document
                .as_ref()
                .and_then(|doc| StorageDocument::find_block(doc, &name))
                .cloned();

            let entry = &mut self.registry.entries[index];
            if block == entry.last_block {
                tracing::debug!(component = %name, %location, "external change left block unchanged");
                report.unchanged.push(name);
                continue;
            }

            entry.phase = ComponentPhase::ReloadPending;
            match &block {
                Some(block) => {
                    apply_block(entry, &name, block, report);
                    report.loaded.push(name.clone());
                }
                None => {
                    entry.managed.reset();
                    report.defaulted.push(name.clone());
                }
            }
            entry.phase = ComponentPhase::Loaded;
            entry.source = block.as_ref().map(|_| read.clone());
            entry.last_block = block;
            entry.managed.reloaded(&ReloadEvent {
                component: name.clone(),
                location: location.clone(),
                kind,
            });
            entry.phase = ComponentPhase::Running;
            tracing::info!(component = %name, %location, "component reloaded after external change");
        }
    }

    /// 執行一次儲存週期。 / Runs a save cycle: one merged atomic write (or delete) per location.
    pub fn save(&mut self, trigger: SaveTrigger) -> Result<SaveReport, SaveError> {
        let scope = self.registry.scope;
        let mut report = SaveReport::new(trigger);
        let mut plans: IndexMap<PathTemplate, LocationPlan> = IndexMap::new();

        for (index, entry) in self.registry.entries.iter().enumerate() {
            if entry.phase != ComponentPhase::Running {
                continue;
            }
            let name = entry.managed.name();
            let specs = entry.managed.storages();
            let target = match self.router.resolve_write(name, entry.managed.scope(), specs) {
                Ok(target) => target,
                Err(err) => {
                    tracing::warn!(component = name, error = %err, "component not saved");
                    report.skipped.push(name.to_string());
                    continue;
                }
            };

            let block = match entry.managed.snapshot() {
                Snapshot::Default => {
                    tracing::trace!(component = name, "state equals default; block removed");
                    None
                }
                Snapshot::Block(block, issues) => {
                    for issue in issues {
                        tracing::warn!(component = name, %issue, "field not saved");
                        report.issues.push((name.to_string(), issue));
                    }
                    Some(block)
                }
                Snapshot::Failed(reason) => {
                    tracing::warn!(component = name, %reason, "serialization failed; keeping stored block");
                    report.skipped.push(name.to_string());
                    continue;
                }
            };

            let plan = plans
                .entry(target.template().clone())
                .or_insert_with(LocationPlan::new);
            plan.updates.push(BlockUpdate {
                component: name.to_string(),
                block: block.clone(),
            });
            plan.owners.push((index, block));

            let obsolete = self.router.obsolete_locations(target, specs);
            for location in &obsolete {
                plans
                    .entry((*location).clone())
                    .or_insert_with(LocationPlan::new)
                    .updates
                    .push(BlockUpdate {
                        component: name.to_string(),
                        block: None,
                    });
            }

            // A block left at a non-target live spec would shadow the target on the next load.
            if let Some(source) = entry.source.as_ref().filter(|source| *source != target.template()) {
                tracing::debug!(component = name, %source, "dropping block from previous location");
                let plan = plans.entry(source.clone()).or_insert_with(LocationPlan::new);
                if !obsolete.contains(&source) {
                    plan.updates.push(BlockUpdate {
                        component: name.to_string(),
                        block: None,
                    });
                }
                plan.released.push(index);
            }
        }

        let mut failures = Vec::new();
        for (location, plan) in plans {
            match self.commit(&location, scope, plan.updates) {
                Ok(outcome) => {
                    match outcome {
                        Commit::Written => report.written.push(location),
                        Commit::Deleted => report.deleted.push(location),
                        Commit::Unchanged => report.unchanged.push(location),
                    }
                    for (index, block) in plan.owners {
                        self.registry.entries[index].last_block = block;
                    }
                    for index in plan.released {
                        self.registry.entries[index].source = None;
                    }
                }
                Err(err) => {
                    tracing::error!(%location, error = %err, "failed to save state document");
                    failures.push((location, err));
                }
            }
        }

        tracing::info!(
            ?trigger,
            written = report.written.len(),
            deleted = report.deleted.len(),
            unchanged = report.unchanged.len(),
            "save cycle finished"
        );
        if failures.is_empty() {
            Ok(report)
        } else {
            Err(SaveError { report, failures })
        }
    }

    fn commit(
        &mut self,
        location: &PathTemplate,
        scope: ComponentScope,
        updates: Vec<BlockUpdate>,
    ) -> Result<Commit, StorageError> {
        let (existing, stored) = match self.backend.read(location) {
            Ok(document) => {
                let stored = document.is_some();
                (document, stored)
            }
            Err(err) => {
                tracing::warn!(%location, error = %err, "replacing unreadable state document");
                (None, true)
            }
        };
        let unchanged = existing.clone();

        match StorageDocument::merge(existing, scope, updates) {
            Some(document) => {
                if unchanged.as_ref() == Some(&document) {
                    tracing::debug!(%location, "document unchanged; write skipped");
                    return Ok(Commit::Unchanged);
                }
                self.backend.write(location, &document)?;
                tracing::info!(%location, "state document written");
                Ok(Commit::Written)
            }
            None if unchanged.is_some() => {
                self.backend.delete(location)?;
                tracing::info!(%location, "state document deleted; no blocks left");
                Ok(Commit::Deleted)
            }
            // Nothing to keep, and either nothing stored or an unreadable file
            // that is better left for an operator to inspect.
            None => {
                if stored {
                    tracing::debug!(%location, "unreadable document left in place");
                }
                Ok(Commit::Unchanged)
            }
        }
    }

    /// 可同步狀態所在的位置。 / Write locations holding synchronizable state, for settings sync.
    pub fn roaming_locations(&self) -> Vec<PathTemplate> {
        let mut locations: Vec<PathTemplate> = Vec::new();
        for entry in &self.registry.entries {
            let Ok(target) = self.router.resolve_write(
                entry.managed.name(),
                entry.managed.scope(),
                entry.managed.storages(),
            ) else {
                continue;
            };
            if target.roaming_type() == RoamingType::Synchronizable
                && !locations.contains(target.template())
            {
                locations.push(target.template().clone());
            }
        }
        locations
    }

    pub fn into_parts(self) -> (ComponentRegistry, B) {
        (self.registry, self.backend)
    }
}

impl<B> fmt::Debug for LifecycleManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("registry", &self.registry)
            .field("router", &self.router)
            .field("watched", &self.watched.len())
            .finish_non_exhaustive()
    }
}

impl LocationPlan {
    fn new() -> Self {
        Self {
            updates: Vec::new(),
            owners: Vec::new(),
            released: Vec::new(),
        }
    }
}

enum Commit {
    Written,
    Deleted,
    Unchanged,
}

fn apply_block(entry: &mut Entry, name: &str, block: &StateTree, report: &mut LoadReport) {
    match entry.managed.load(block) {
        Ok(issues) => {
            for issue in issues {
                tracing::warn!(component = name, %issue, "field not loaded; default kept");
                report.problems.push(LoadProblem::Field {
                    component: name.to_string(),
                    issue,
                });
            }
        }
        Err(error) => {
            tracing::warn!(component = name, %error, "hand-written component rejected its block");
            report.problems.push(LoadProblem::Legacy {
                component: name.to_string(),
                error,
            });
        }
    }
}

fn cached_read<'a, B: StorageBackend>(
    backend: &B,
    documents: &'a mut HashMap<PathTemplate, Option<StateTree>>,
    location: &PathTemplate,
    report: &mut LoadReport,
) -> &'a Option<StateTree> {
    documents
        .entry(location.clone())
        .or_insert_with(|| match backend.read(location) {
            Ok(document) => document,
            Err(error) => {
                tracing::warn!(%location, %error, "unreadable state document; defaults used");
                report.problems.push(LoadProblem::Unreadable {
                    location: location.clone(),
                    error,
                });
                None
            }
        })
}
