//! Chooses physical locations for a component and merges blocks that share one.
//!
//! Writes go to exactly one location per component. Reads may consult every
//! declared location, because state saved under an older layout has to be
//! found again. Several components can share a location; the document there
//! holds one `<component name="…">` block per component.

use std::cmp::Reverse;

use thiserror::Error;

use crate::codec::NAME_ATTR;
use crate::component::ComponentScope;
use crate::storage::{PathTemplate, SchemeFilter, StorageSpec};
use crate::tree::StateTree;

pub const COMPONENT_TAG: &str = "component";

/// 專案儲存配置。 / Active project layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectScheme {
    /// Single project file plus workspace file.
    #[default]
    Default,
    /// Configuration directory with one file per concern.
    DirectoryBased,
}

impl ProjectScheme {
    fn accepts(self, filter: SchemeFilter) -> bool {
        match filter {
            SchemeFilter::Any => true,
            SchemeFilter::DefaultOnly => self == ProjectScheme::Default,
            SchemeFilter::DirectoryOnly => self == ProjectScheme::DirectoryBased,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("component `{0}` has no writable storage")]
    NoWritableStorage(String),
}

/// 儲存路由器。 / Resolves storage specs against the active scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageRouter {
    scheme: ProjectScheme,
}

impl StorageRouter {
    pub fn new(scheme: ProjectScheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> ProjectScheme {
        self.scheme
    }

    /// 解析寫入目標。 / The single location a component's state is written to.
    ///
    /// Deprecated specs are never chosen. Application-scoped specs ignore the
    /// project scheme. When no live spec applies to the scheme, every live spec
    /// is considered, so a component with only a file-based spec keeps using
    /// that file under a directory-based layout. The highest priority wins and
    /// ties go to the earliest declared spec.
    pub fn resolve_write<'a>(
        &self,
        component: &str,
        scope: ComponentScope,
        specs: &'a [StorageSpec],
    ) -> Result<&'a StorageSpec, RoutingError> {
        let live: Vec<&StorageSpec> = specs.iter().filter(|spec| !spec.is_deprecated()).collect();
        let matching: Vec<&StorageSpec> = live
            .iter()
            .copied()
            .filter(|spec| {
                scope == ComponentScope::Application || self.scheme.accepts(spec.scheme_filter())
            })
            .collect();
        let candidates = if matching.is_empty() { live } else { matching };

        let chosen = highest_priority(candidates)
            .ok_or_else(|| RoutingError::NoWritableStorage(component.to_string()))?;
        tracing::debug!(
            component,
            location = %chosen.template(),
            scheme = ?self.scheme,
            "resolved write target"
        );
        Ok(chosen)
    }

    /// 解析讀取來源。 / The location to read from: the first candidate that currently exists.
    ///
    /// Candidates are tried as the write target first, then other live specs by
    /// priority, then deprecated specs. When nothing exists yet the write target
    /// is returned so the caller reads nothing and keeps the default state.
    pub fn resolve_read<'a, F>(
        &self,
        component: &str,
        scope: ComponentScope,
        specs: &'a [StorageSpec],
        mut exists: F,
    ) -> Result<&'a StorageSpec, RoutingError>
    where
        F: FnMut(&PathTemplate) -> bool,
    {
        let target = self.resolve_write(component, scope, specs)?;
        for spec in self.read_order(target, specs) {
            if exists(spec.template()) {
                return Ok(spec);
            }
        }
        Ok(target)
    }

    fn read_order<'a>(&self, target: &'a StorageSpec, specs: &'a [StorageSpec]) -> Vec<&'a StorageSpec> {
        let mut rest: Vec<&StorageSpec> = specs
            .iter()
            .filter(|spec| spec.template() != target.template())
            .collect();
        // Stable sort keeps declaration order within equal keys.
        rest.sort_by_key(|spec| (spec.is_deprecated(), Reverse(spec.priority_value())));
        let mut order = vec![target];
        order.extend(rest);
        order
    }

    /// 需移除舊區塊的位置。 / Deprecated locations whose copy of the block is dropped on save.
    pub fn obsolete_locations<'a>(
        &self,
        target: &StorageSpec,
        specs: &'a [StorageSpec],
    ) -> Vec<&'a PathTemplate> {
        let mut locations: Vec<&PathTemplate> = Vec::new();
        for spec in specs {
            let template = spec.template();
            if template == target.template() || locations.contains(&template) {
                continue;
            }
            if spec.is_deprecated() {
                locations.push(template);
            }
        }
        locations
    }
}

fn highest_priority(candidates: Vec<&StorageSpec>) -> Option<&StorageSpec> {
    let mut best: Option<&StorageSpec> = None;
    for spec in candidates {
        match best {
            Some(current) if current.priority_value() >= spec.priority_value() => {}
            _ => best = Some(spec),
        }
    }
    best
}

/// A replacement (or removal, when `block` is `None`) of one component's block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockUpdate {
    pub component: String,
    pub block: Option<StateTree>,
}

/// 共享文件的合併規則。 / Merge contract for documents holding several component blocks.
pub struct StorageDocument;

impl StorageDocument {
    /// 依範圍決定根節點。 / Root element of a new document for `scope`.
    pub fn root_for(scope: ComponentScope) -> StateTree {
        match scope {
            ComponentScope::Application => StateTree::new("application"),
            ComponentScope::Project => StateTree::new("project").with_attribute("version", "4"),
            ComponentScope::Module => StateTree::new("module"),
        }
    }

    /// Wraps a serialized state as a block for `component`.
    pub fn block(component: &str, state: StateTree) -> StateTree {
        let mut block = StateTree::new(COMPONENT_TAG).with_attribute(NAME_ATTR, component);
        block.absorb(state);
        block.set_attribute(NAME_ATTR, component);
        block
    }

    pub fn find_block<'a>(document: &'a StateTree, component: &str) -> Option<&'a StateTree> {
        document.child_with(COMPONENT_TAG, NAME_ATTR, component)
    }

    /// 文件中的元件名稱。 / Names of the component blocks in document order.
    pub fn component_names(document: &StateTree) -> Vec<String> {
        document
            .children_named(COMPONENT_TAG)
            .filter_map(|block| block.attribute(NAME_ATTR))
            .map(str::to_string)
            .collect()
    }

    /// 合併區塊更新。 / Applies `updates` to `existing`, keeping sibling blocks untouched.
    ///
    /// Replaced blocks keep their position; new blocks are appended. Returns
    /// `None` when the root is left without any child, meaning the location
    /// should be deleted rather than written. Foreign top-level elements keep
    /// the document alive.
    pub fn merge(
        existing: Option<StateTree>,
        scope: ComponentScope,
        updates: Vec<BlockUpdate>,
    ) -> Option<StateTree> {
        let mut document = existing.unwrap_or_else(|| Self::root_for(scope));
        for update in updates {
            let position = document.children().iter().position(|child| {
                child.name() == COMPONENT_TAG
                    && child.attribute(NAME_ATTR) == Some(update.component.as_str())
            });
            match (position, update.block) {
                (Some(index), Some(block)) => document.children_mut()[index] = block,
                (Some(_), None) => {
                    document.remove_children(|child| {
                        child.name() == COMPONENT_TAG
                            && child.attribute(NAME_ATTR) == Some(update.component.as_str())
                    });
                }
                (None, Some(block)) => document.add_child(block),
                (None, None) => {}
            }
        }
        if document.children().is_empty() {
            None
        } else {
            Some(document)
        }
    }
}
