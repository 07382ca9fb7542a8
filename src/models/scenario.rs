//! Role template (scenario) models
//!
//! 一个场景是一组命名的角色定义及其授权，作为静态配置整体应用。
//! 场景来源由调用方注入：内置场景 + 可选的配置文件。

use crate::config::TemplatesConfig;
use crate::error::{AppError, Result};
use crate::models::grant::{GrantOwner, NewGrant};
use crate::models::role::RoleId;
use config::{Config, File};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use validator::{Validate, ValidationError};

/// section / item / action 标识符格式
static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_/-]*$").unwrap());
/// item 允许为空串（等同于未设置）
static ITEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([a-z][a-z0-9_/-]*)?$").unwrap());

/// 模板中的一条授权定义（总是 allow + active）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_grant_def"))]
pub struct GrantDef {
    #[validate(regex(path = *IDENT_RE, message = "invalid section identifier"))]
    pub section: String,
    #[serde(default)]
    #[validate(regex(path = *ITEM_RE, message = "invalid item identifier"))]
    pub item: Option<String>,
    #[validate(regex(path = *IDENT_RE, message = "invalid action identifier"))]
    pub action: String,
    #[serde(default)]
    #[validate(range(min = 0, message = "item_id must not be negative"))]
    pub item_id: Option<i32>,
}

impl GrantDef {
    pub fn new(section: &str, item: Option<&str>, action: &str) -> Self {
        Self {
            section: section.to_string(),
            item: item.map(str::to_string),
            action: action.to_string(),
            item_id: None,
        }
    }

    pub fn with_item_id(mut self, item_id: i32) -> Self {
        self.item_id = Some(item_id);
        self
    }

    /// 空串 item 视为未设置
    pub fn effective_item(&self) -> Option<&str> {
        self.item.as_deref().filter(|i| !i.is_empty())
    }

    /// item_id 为 0 视为未设置
    pub fn effective_item_id(&self) -> Option<i32> {
        self.item_id.filter(|id| *id != 0)
    }

    /// 转换为角色上的 allow + active 授权
    pub fn to_new_grant(&self, role_id: RoleId) -> NewGrant {
        let grant = NewGrant::new(GrantOwner::Role(role_id), &self.section, &self.action);
        match (self.effective_item(), self.effective_item_id()) {
            (Some(item), Some(item_id)) => grant.on_instance(item, item_id),
            (Some(item), None) => grant.on_item(item),
            _ => grant,
        }
    }
}

impl fmt::Display for GrantDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} / {}",
            self.section,
            self.effective_item().unwrap_or("*"),
            self.action
        )?;
        if let Some(id) = self.effective_item_id() {
            write!(f, " (ID: {})", id)?;
        }
        Ok(())
    }
}

fn validate_grant_def(def: &GrantDef) -> std::result::Result<(), ValidationError> {
    if def.effective_item_id().is_some() && def.effective_item().is_none() {
        return Err(ValidationError::new("item_id_requires_item"));
    }
    Ok(())
}

/// 模板中的角色定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RoleDef {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[serde(default)]
    pub can_login: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    #[validate(nested)]
    pub grants: Vec<GrantDef>,
}

impl RoleDef {
    pub fn new(name: &str, can_login: bool, is_admin: bool, description: &str) -> Self {
        Self {
            name: name.to_string(),
            can_login,
            is_admin,
            description: description.to_string(),
            grants: Vec::new(),
        }
    }

    pub fn grant(mut self, section: &str, item: Option<&str>, action: &str) -> Self {
        self.grants.push(GrantDef::new(section, item, action));
        self
    }
}

/// 命名场景
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_unique_roles"))]
pub struct Scenario {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[validate(nested)]
    pub roles: Vec<RoleDef>,
}

fn validate_unique_roles(scenario: &Scenario) -> std::result::Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for role in &scenario.roles {
        if !seen.insert(role.name.as_str()) {
            let mut err = ValidationError::new("duplicate_role");
            err.message = Some(format!("role {} defined twice", role.name).into());
            return Err(err);
        }
    }
    Ok(())
}

impl Scenario {
    pub fn role(&self, name: &str) -> Option<&RoleDef> {
        self.roles.iter().find(|r| r.name == name)
    }
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    scenarios: Vec<Scenario>,
}

/// 场景目录（按名称排序）
#[derive(Debug, Clone, Default)]
pub struct ScenarioCatalog {
    scenarios: BTreeMap<String, Scenario>,
}

impl ScenarioCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置场景
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for scenario in builtin_scenarios() {
            catalog.scenarios.insert(scenario.name.clone(), scenario);
        }
        catalog
    }

    /// 从文件加载场景（格式由扩展名决定：toml / json / yaml）
    pub fn from_file(path: &Path) -> Result<Self> {
        let file: ScenarioFile = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        let mut catalog = Self::new();
        for scenario in file.scenarios {
            catalog.insert(scenario)?;
        }

        tracing::info!(
            path = %path.display(),
            scenarios = catalog.len(),
            "Loaded role templates from file"
        );
        Ok(catalog)
    }

    /// 内置场景叠加配置文件中的场景，同名时文件优先
    pub fn load(config: &TemplatesConfig) -> Result<Self> {
        let mut catalog = Self::builtin();
        if let Some(path) = &config.path {
            catalog.merge(Self::from_file(Path::new(path))?);
        }
        Ok(catalog)
    }

    /// 校验后加入目录
    pub fn insert(&mut self, scenario: Scenario) -> Result<()> {
        scenario.validate().map_err(|e| {
            AppError::Validation(format!("Scenario {}: {}", scenario.name, e))
        })?;
        self.scenarios.insert(scenario.name.clone(), scenario);
        Ok(())
    }

    pub fn merge(&mut self, other: ScenarioCatalog) {
        for (name, scenario) in other.scenarios {
            if self.scenarios.insert(name.clone(), scenario).is_some() {
                tracing::info!(scenario = %name, "Template file overrides built-in scenario");
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<&Scenario> {
        self.scenarios
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("template {}", name)))
    }

    pub fn names(&self) -> Vec<&str> {
        self.scenarios.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.values()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

fn news_reader(role: RoleDef) -> RoleDef {
    role.grant("news", Some("post"), "see")
        .grant("news", Some("post"), "view")
}

fn faq_reader(role: RoleDef) -> RoleDef {
    role.grant("faq", None, "search")
        .grant("faq", Some("question/answer"), "see")
}

fn news_writer(role: RoleDef) -> RoleDef {
    role.grant("news", Some("post"), "post")
        .grant("news", Some("post"), "edit")
        .grant("news", Some("post"), "reply")
}

fn builtin_scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "default".to_string(),
            description: "Basic setup with minimal news access.".to_string(),
            roles: vec![
                news_reader(RoleDef::new("guest", false, false, "Read-only access to news.")),
                news_reader(RoleDef::new("user", true, false, "Basic user."))
                    .grant("news", Some("post"), "reply"),
                news_writer(news_reader(RoleDef::new(
                    "admin",
                    true,
                    true,
                    "Administrator with news and private forum rights.",
                )))
                .grant("privateforum", Some("topic"), "see")
                .grant("privateforum", Some("topic"), "view")
                .grant("privateforum", Some("topic"), "post"),
            ],
        },
        Scenario {
            name: "simple-community".to_string(),
            description: "Community setup with news, private forums, and labelling.".to_string(),
            roles: vec![
                faq_reader(news_reader(RoleDef::new(
                    "guest",
                    false,
                    false,
                    "Read-only access to public sections.",
                ))),
                faq_reader(
                    news_reader(RoleDef::new(
                        "user",
                        true,
                        false,
                        "Standard user with access to private forums and labelling.",
                    ))
                    .grant("news", Some("post"), "label")
                    .grant("privateforum", Some("topic"), "label")
                    .grant("privateforum", Some("topic"), "see")
                    .grant("privateforum", Some("topic"), "view"),
                ),
                faq_reader(
                    news_reader(news_writer(RoleDef::new(
                        "admin",
                        true,
                        true,
                        "Administrator with full access and content management rights.",
                    )))
                    .grant("news", Some("post"), "label")
                    .grant("privateforum", Some("topic"), "label")
                    .grant("privateforum", Some("topic"), "see")
                    .grant("privateforum", Some("topic"), "view")
                    .grant("privateforum", Some("topic"), "post")
                    .grant("privateforum", Some("topic"), "reply")
                    .grant("privateforum", Some("topic"), "edit"),
                ),
                RoleDef::new("image-uploader", false, false, "Can upload images.").grant(
                    "images",
                    Some("upload"),
                    "post",
                ),
            ],
        },
        Scenario {
            name: "news-only".to_string(),
            description: "Setup focused solely on news publishing and reading.".to_string(),
            roles: vec![
                news_reader(RoleDef::new("guest", false, false, "News reader.")),
                news_reader(news_writer(RoleDef::new(
                    "editor",
                    true,
                    false,
                    "News content creator.",
                ))),
                news_reader(news_writer(RoleDef::new("admin", true, true, "Administrator."))),
            ],
        },
        Scenario {
            name: "read-only".to_string(),
            description: "Restrictive setup where almost everyone is a reader.".to_string(),
            roles: vec![
                news_reader(RoleDef::new("guest", false, false, "Global reader."))
                    .grant("privateforum", Some("topic"), "see")
                    .grant("privateforum", Some("topic"), "view"),
                news_reader(RoleDef::new("admin", true, true, "Administrator."))
                    .grant("privateforum", Some("topic"), "see")
                    .grant("privateforum", Some("topic"), "view"),
            ],
        },
    ]
}
