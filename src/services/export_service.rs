//! 角色授权导出（JSON / CSV）

use crate::{
    catalog,
    error::{AppError, Result},
    models::grant::{Grant, RuleType},
    models::role::{Role, RoleId},
    repository::AuthzStore,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(AppError::Validation(format!("Unknown export format: {}", other))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => f.write_str("json"),
            ExportFormat::Csv => f.write_str("csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportAction {
    pub action: String,
    /// 该动作不在目录中
    pub unsupported: bool,
}

/// 按 (section, item, item_id) 分组的授权
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantGroup {
    pub section: String,
    pub item: Option<String>,
    pub item_id: Option<i32>,
    pub have: Vec<ExportAction>,
    pub disabled: Vec<ExportAction>,
    pub available: Vec<ExportAction>,
    /// (section, item) 不在目录中
    pub unsupported: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleExport {
    pub id: RoleId,
    pub name: String,
    pub can_login: bool,
    pub is_admin: bool,
    pub private_labels: bool,
    pub groups: Vec<GrantGroup>,
}

fn push_unique(list: &mut Vec<String>, action: &str) {
    if !list.iter().any(|a| a == action) {
        list.push(action.to_string());
    }
}

/// 把角色授权与目录交叉比对
///
/// have：有效的 allow；disabled：deny 或已停用；available：目录中不在前两者里的动作。
pub fn build_export(role: &Role, grants: &[Grant]) -> RoleExport {
    type GroupKey = (String, Option<String>, Option<i32>);
    let mut buckets: BTreeMap<GroupKey, (Vec<String>, Vec<String>)> = BTreeMap::new();

    for grant in grants {
        let key = (grant.section.clone(), grant.item.clone(), grant.item_id);
        let (have, disabled) = buckets.entry(key).or_default();
        if grant.active && grant.rule_type == RuleType::Allow {
            push_unique(have, &grant.action);
        } else {
            push_unique(disabled, &grant.action);
        }
    }

    let groups = buckets
        .into_iter()
        .map(|((section, item, item_id), (have, disabled))| {
            let item_ref = item.as_deref();
            let to_actions = |actions: Vec<String>| -> Vec<ExportAction> {
                actions
                    .into_iter()
                    .map(|action| ExportAction {
                        unsupported: !catalog::is_known(&section, item_ref, &action),
                        action,
                    })
                    .collect()
            };
            let available = catalog::actions_for(&section, item_ref)
                .into_iter()
                .filter(|a| !have.iter().any(|h| h == a) && !disabled.iter().any(|d| d == a))
                .map(|a| ExportAction {
                    action: a.to_string(),
                    unsupported: false,
                })
                .collect();

            GrantGroup {
                unsupported: !catalog::is_known_item(&section, item_ref),
                have: to_actions(have),
                disabled: to_actions(disabled),
                available,
                section: section.clone(),
                item: item.clone(),
                item_id,
            }
        })
        .collect();

    RoleExport {
        id: role.id,
        name: role.name.clone(),
        can_login: role.can_login,
        is_admin: role.is_admin,
        private_labels: role.private_labels,
        groups,
    }
}

fn action_names(actions: &[ExportAction]) -> Result<String> {
    let names: Vec<&str> = actions.iter().map(|a| a.action.as_str()).collect();
    Ok(serde_json::to_string(&names)?)
}

/// 渲染导出结果
pub fn render(export: &RoleExport, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(export)?),
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer.write_record([
                "role_id",
                "role_name",
                "role_can_login",
                "role_is_admin",
                "role_private_labels",
                "section",
                "item",
                "item_id",
                "have",
                "disabled",
                "available",
                "unsupported",
            ])?;
            for group in &export.groups {
                writer.write_record([
                    export.id.to_string(),
                    export.name.clone(),
                    export.can_login.to_string(),
                    export.is_admin.to_string(),
                    export.private_labels.to_string(),
                    group.section.clone(),
                    group.item.clone().unwrap_or_default(),
                    group.item_id.map(|id| id.to_string()).unwrap_or_default(),
                    action_names(&group.have)?,
                    action_names(&group.disabled)?,
                    action_names(&group.available)?,
                    group.unsupported.to_string(),
                ])?;
            }
            let bytes = writer
                .into_inner()
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            String::from_utf8(bytes).map_err(|e| AppError::Serialization(e.to_string()))
        }
    }
}

pub struct ExportService {
    store: Arc<dyn AuthzStore>,
}

impl ExportService {
    pub fn new(store: Arc<dyn AuthzStore>) -> Self {
        Self { store }
    }

    pub async fn export_role(&self, role_name: &str) -> Result<RoleExport> {
        let role = self
            .store
            .find_role_by_name(role_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role {}", role_name)))?;
        let grants = self.store.list_grants_by_role(role.id).await?;

        let export = build_export(&role, &grants);
        tracing::debug!(role = %role_name, groups = export.groups.len(), "Built role export");
        Ok(export)
    }

    /// 导出角色并渲染为指定格式
    pub async fn export(&self, role_name: &str, format: ExportFormat) -> Result<String> {
        let export = self.export_role(role_name).await?;
        render(&export, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::grant::{GrantId, GrantOwner, NewGrant};

    fn role() -> Role {
        Role {
            id: RoleId(4),
            name: "moderator".to_string(),
            can_login: true,
            is_admin: false,
            private_labels: true,
            public_profile_allowed_at: None,
        }
    }

    fn owner() -> GrantOwner {
        GrantOwner::Role(RoleId(4))
    }

    fn names(actions: &[ExportAction]) -> Vec<String> {
        actions.iter().map(|a| a.action.clone()).collect()
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_deny_and_inactive_are_disabled() {
        let grants = vec![
            NewGrant::new(owner(), "forum", "see").on_item("topic").into_grant(GrantId(1)),
            NewGrant::new(owner(), "forum", "post")
                .on_item("topic")
                .deny()
                .into_grant(GrantId(2)),
            NewGrant::new(owner(), "forum", "edit")
                .on_item("topic")
                .active(false)
                .into_grant(GrantId(3)),
        ];
        let export = build_export(&role(), &grants);
        assert_eq!(export.groups.len(), 1);
        let group = &export.groups[0];
        assert_eq!(names(&group.have), vec!["see"]);
        assert_eq!(names(&group.disabled), vec!["post", "edit"]);
        assert_eq!(names(&group.available), vec!["view", "reply"]);
        assert!(!group.unsupported);
    }

    #[test]
    fn test_unknown_pairs_are_flagged() {
        let grants = vec![
            NewGrant::new(owner(), "wiki", "edit").on_item("page").into_grant(GrantId(1)),
            NewGrant::new(owner(), "news", "fly").on_item("post").into_grant(GrantId(2)),
        ];
        let export = build_export(&role(), &grants);
        assert_eq!(export.groups.len(), 2);
        assert_eq!(export.groups[0].section, "news");
        assert!(!export.groups[0].unsupported);
        assert!(export.groups[0].have[0].unsupported);
        assert_eq!(export.groups[1].section, "wiki");
        assert!(export.groups[1].unsupported);
        assert!(export.groups[1].available.is_empty());
    }

    #[test]
    fn test_groups_are_split_by_instance() {
        let grants = vec![
            NewGrant::new(owner(), "forum", "see").on_item("topic").into_grant(GrantId(1)),
            NewGrant::new(owner(), "forum", "see")
                .on_instance("topic", 7)
                .into_grant(GrantId(2)),
        ];
        let export = build_export(&role(), &grants);
        assert_eq!(export.groups.len(), 2);
        assert_eq!(export.groups[0].item_id, None);
        assert_eq!(export.groups[1].item_id, Some(7));
    }

    #[test]
    fn test_csv_rendering() {
        let grants = vec![NewGrant::new(owner(), "faq", "search").into_grant(GrantId(1))];
        let csv = render(&build_export(&role(), &grants), ExportFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "role_id,role_name,role_can_login,role_is_admin,role_private_labels,section,item,item_id,have,disabled,available,unsupported"
        );
        assert_eq!(
            lines.next().unwrap(),
            r#"4,moderator,true,false,true,faq,,,"[""search""]",[],[],false"#
        );
        assert!(lines.next().is_none());
    }
}
