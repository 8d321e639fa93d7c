use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use statekeep_core::{PathTemplate, Placeholder, StorageError};

/// 佔位符對應的實體根目錄。 / Physical roots the placeholders expand to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRoots {
    #[serde(default)]
    pub app_config: Option<PathBuf>,
    #[serde(default)]
    pub project_file: Option<PathBuf>,
    #[serde(default)]
    pub project_config_dir: Option<PathBuf>,
    #[serde(default)]
    pub workspace_file: Option<PathBuf>,
    #[serde(default)]
    pub module_file: Option<PathBuf>,
}

impl PathRoots {
    /// 以單一目錄建立慣用配置。 / Conventional layout below one base directory.
    pub fn under(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            app_config: Some(base.join("options")),
            project_file: Some(base.join("project.xml")),
            project_config_dir: Some(base.join(".statekeep")),
            workspace_file: Some(base.join("workspace.xml")),
            module_file: Some(base.join("module.xml")),
        }
    }

    pub fn root(&self, placeholder: Placeholder) -> Option<&Path> {
        let root = match placeholder {
            Placeholder::AppConfig => &self.app_config,
            Placeholder::ProjectFile => &self.project_file,
            Placeholder::ProjectConfigDir => &self.project_config_dir,
            Placeholder::WorkspaceFile => &self.workspace_file,
            Placeholder::ModuleFile => &self.module_file,
        };
        root.as_deref()
    }

    /// 展開路徑樣板。 / Expands a template into a concrete path.
    pub fn expand(&self, template: &PathTemplate) -> Result<PathBuf, StorageError> {
        let placeholder = template.placeholder();
        let root = self
            .root(placeholder)
            .ok_or_else(|| StorageError::Unresolved {
                location: template.to_string(),
                reason: format!("no root configured for {placeholder}"),
            })?;

        match template.relative() {
            None => Ok(root.to_path_buf()),
            Some(_) if placeholder.is_file() => Err(StorageError::Unresolved {
                location: template.to_string(),
                reason: format!("{placeholder} names a file and cannot have a sub-path"),
            }),
            Some(rest) => Ok(rest.split('/').fold(root.to_path_buf(), |path, segment| path.join(segment))),
        }
    }
}
