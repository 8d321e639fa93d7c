//! Storage specifications: where a component's state may live.
//!
//! Locations are unresolved path templates such as
//! `$PROJECT_CONFIG_DIR$/editor.xml`; expanding the placeholder into a real
//! path is the backend's job.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::component::ComponentScope;

static TEMPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$([A-Z_]+)\$(?:/(.*))?$").expect("template pattern must compile")
});

/// 路徑樣板中的具名佔位符。 / Named root a path template starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Placeholder {
    AppConfig,
    ProjectFile,
    ProjectConfigDir,
    WorkspaceFile,
    ModuleFile,
}

impl Placeholder {
    pub const ALL: [Placeholder; 5] = [
        Placeholder::AppConfig,
        Placeholder::ProjectFile,
        Placeholder::ProjectConfigDir,
        Placeholder::WorkspaceFile,
        Placeholder::ModuleFile,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Placeholder::AppConfig => "APP_CONFIG",
            Placeholder::ProjectFile => "PROJECT_FILE",
            Placeholder::ProjectConfigDir => "PROJECT_CONFIG_DIR",
            Placeholder::WorkspaceFile => "WORKSPACE_FILE",
            Placeholder::ModuleFile => "MODULE_FILE",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.token() == token)
    }

    /// 此佔位符是否可用於指定範圍。 / Whether components of `scope` may store under this root.
    pub fn allowed_in(self, scope: ComponentScope) -> bool {
        match scope {
            ComponentScope::Application => self == Placeholder::AppConfig,
            ComponentScope::Project => matches!(
                self,
                Placeholder::ProjectFile | Placeholder::ProjectConfigDir | Placeholder::WorkspaceFile
            ),
            ComponentScope::Module => self == Placeholder::ModuleFile,
        }
    }

    /// Whether the placeholder names a file rather than a directory.
    pub fn is_file(self) -> bool {
        matches!(
            self,
            Placeholder::ProjectFile | Placeholder::WorkspaceFile | Placeholder::ModuleFile
        )
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}$", self.token())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("`{0}` does not start with a `$NAME$` placeholder")]
    MissingPlaceholder(String),
    #[error("`{template}` uses unknown placeholder `${name}$`")]
    UnknownPlaceholder { template: String, name: String },
    #[error("`{template}` must stay below its placeholder: {reason}")]
    InvalidPath { template: String, reason: &'static str },
}

/// 未展開的路徑樣板。 / Unresolved location: a placeholder plus an optional relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathTemplate {
    placeholder: Placeholder,
    relative: Option<String>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let captures = TEMPLATE
            .captures(template.trim())
            .ok_or_else(|| TemplateError::MissingPlaceholder(template.to_string()))?;
        let name = &captures[1];
        let placeholder =
            Placeholder::from_token(name).ok_or_else(|| TemplateError::UnknownPlaceholder {
                template: template.to_string(),
                name: name.to_string(),
            })?;

        let relative = captures
            .get(2)
            .map(|m| m.as_str().trim_end_matches('/'))
            .filter(|rest| !rest.is_empty());
        if let Some(rest) = relative {
            let invalid = |reason| TemplateError::InvalidPath {
                template: template.to_string(),
                reason,
            };
            if rest.starts_with('/') {
                return Err(invalid("absolute paths are not allowed"));
            }
            if rest.contains('\\') {
                return Err(invalid("use `/` as the separator"));
            }
            if rest.split('/').any(|segment| segment == ".." || segment.is_empty()) {
                return Err(invalid("empty or parent segments are not allowed"));
            }
        }

        Ok(Self {
            placeholder,
            relative: relative.map(str::to_string),
        })
    }

    pub fn placeholder(&self) -> Placeholder {
        self.placeholder
    }

    /// Path below the placeholder root, `/`-separated.
    pub fn relative(&self) -> Option<&str> {
        self.relative.as_deref()
    }
}

impl FromStr for PathTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relative {
            Some(rest) => write!(f, "{}/{}", self.placeholder, rest),
            None => write!(f, "{}", self.placeholder),
        }
    }
}

/// 規格適用的專案配置。 / Project layouts a spec applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeFilter {
    Any,
    DefaultOnly,
    DirectoryOnly,
}

impl SchemeFilter {
    fn infer(placeholder: Placeholder) -> Self {
        match placeholder {
            Placeholder::ProjectConfigDir => SchemeFilter::DirectoryOnly,
            Placeholder::ProjectFile | Placeholder::WorkspaceFile => SchemeFilter::DefaultOnly,
            Placeholder::AppConfig | Placeholder::ModuleFile => SchemeFilter::Any,
        }
    }
}

/// 同步分類。 / Settings-sync classification, carried as metadata only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoamingType {
    #[default]
    Synchronizable,
    LocalOnly,
}

/// 一個候選儲存位置。 / One candidate location for a component's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSpec {
    template: PathTemplate,
    scheme: SchemeFilter,
    roaming: RoamingType,
    priority: i32,
    deprecated: bool,
}

impl StorageSpec {
    /// 解析樣板並推導適用配置。 / Parses `template`; the scheme filter is inferred from its placeholder.
    pub fn new(template: &str) -> Result<Self, TemplateError> {
        let template = PathTemplate::parse(template)?;
        Ok(Self::from_template(template))
    }

    pub fn from_template(template: PathTemplate) -> Self {
        Self {
            scheme: SchemeFilter::infer(template.placeholder()),
            template,
            roaming: RoamingType::default(),
            priority: 0,
            deprecated: false,
        }
    }

    pub fn scheme(mut self, scheme: SchemeFilter) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn roaming(mut self, roaming: RoamingType) -> Self {
        self.roaming = roaming;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Read for migration only; the block is removed from here on save.
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn scheme_filter(&self) -> SchemeFilter {
        self.scheme
    }

    pub fn roaming_type(&self) -> RoamingType {
        self.roaming
    }

    pub fn priority_value(&self) -> i32 {
        self.priority
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }
}
