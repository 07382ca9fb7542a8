//! 角色模板服务
//!
//! apply 在单个事务中把场景里的每个角色定义落到存储：角色不存在则创建，存在则覆盖标志位；
//! 随后清空该角色的授权并写入模板授权。任何一步失败都会回滚整个事务。

use crate::{
    catalog,
    error::{AppError, Result},
    models::grant::{Grant, RuleType},
    models::role::{CreateRoleRequest, Role, RoleFlags, RoleId, UserId},
    models::scenario::{GrantDef, RoleDef, Scenario, ScenarioCatalog},
    repository::{AuthzStore, StoreTx},
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;
use validator::Validate;

/// 场景摘要（template list）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioSummary {
    pub name: String,
    pub description: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    Created,
    Updated,
}

/// 单个角色的应用结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedRole {
    pub name: String,
    pub id: RoleId,
    pub outcome: ApplyOutcome,
    pub grants_before: usize,
    pub grants_after: usize,
}

/// 角色快照，role 为 None 表示当时不存在
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSnapshot {
    pub name: String,
    pub role: Option<Role>,
    pub grants: Vec<Grant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub run_id: Uuid,
    pub scenario: String,
    pub roles: Vec<AppliedRole>,
    pub before: Vec<RoleSnapshot>,
    pub after: Vec<RoleSnapshot>,
}

/// diff 使用的授权签名：section / item / action / item_id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GrantSignature {
    pub section: String,
    pub item: Option<String>,
    pub action: String,
    pub item_id: Option<i32>,
}

impl From<&GrantDef> for GrantSignature {
    fn from(def: &GrantDef) -> Self {
        Self {
            section: def.section.clone(),
            item: def.effective_item().map(str::to_string),
            action: def.action.clone(),
            item_id: def.effective_item_id(),
        }
    }
}

impl From<&Grant> for GrantSignature {
    fn from(grant: &Grant) -> Self {
        Self {
            section: grant.section.clone(),
            item: grant.item.clone(),
            action: grant.action.clone(),
            item_id: grant.item_id,
        }
    }
}

impl fmt::Display for GrantSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} / {}",
            self.section,
            self.item.as_deref().unwrap_or("*"),
            self.action
        )?;
        if let Some(id) = self.item_id {
            write!(f, " [{}]", id)?;
        }
        Ok(())
    }
}

/// 角色属性变化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "property", rename_all = "snake_case")]
pub enum PropertyChange {
    CanLogin { from: bool, to: bool },
    IsAdmin { from: bool, to: bool },
}

impl fmt::Display for PropertyChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyChange::CanLogin { from, to } => write!(f, "can_login: {} -> {}", from, to),
            PropertyChange::IsAdmin { from, to } => write!(f, "is_admin: {} -> {}", from, to),
        }
    }
}

/// 签名相同、但当前为 deny 或已停用的授权；apply 后会变成有效的 allow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleChange {
    pub signature: GrantSignature,
    pub rule_type: RuleType,
    pub active: bool,
}

impl fmt::Display for RuleChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.active { "active" } else { "inactive" };
        write!(
            f,
            "{}: {} ({}) -> allow (active)",
            self.signature, self.rule_type, state
        )
    }
}

/// 单个角色的差异
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleDiff {
    pub role: String,
    pub is_new: bool,
    pub property_changes: Vec<PropertyChange>,
    pub additions: Vec<GrantSignature>,
    pub removals: Vec<GrantSignature>,
    pub rule_changes: Vec<RuleChange>,
}

impl RoleDiff {
    pub fn is_empty(&self) -> bool {
        !self.is_new
            && self.property_changes.is_empty()
            && self.additions.is_empty()
            && self.removals.is_empty()
            && self.rule_changes.is_empty()
    }
}

fn role_diff(def: &RoleDef, current: Option<(&Role, &[Grant])>) -> RoleDiff {
    let desired: BTreeSet<GrantSignature> = def.grants.iter().map(GrantSignature::from).collect();
    let existing: BTreeSet<GrantSignature> = current
        .map(|(_, grants)| grants.iter().map(GrantSignature::from).collect())
        .unwrap_or_default();

    let mut property_changes = Vec::new();
    if let Some((role, _)) = current {
        if role.can_login != def.can_login {
            property_changes.push(PropertyChange::CanLogin {
                from: role.can_login,
                to: def.can_login,
            });
        }
        if role.is_admin != def.is_admin {
            property_changes.push(PropertyChange::IsAdmin {
                from: role.is_admin,
                to: def.is_admin,
            });
        }
    }

    let mut rule_changes: Vec<RuleChange> = current
        .map(|(_, grants)| grants)
        .unwrap_or_default()
        .iter()
        .filter(|g| g.rule_type == RuleType::Deny || !g.active)
        .map(|g| RuleChange {
            signature: GrantSignature::from(g),
            rule_type: g.rule_type,
            active: g.active,
        })
        .filter(|c| desired.contains(&c.signature))
        .collect();
    rule_changes.sort_by(|a, b| a.signature.cmp(&b.signature));

    RoleDiff {
        role: def.name.clone(),
        is_new: current.is_none(),
        property_changes,
        additions: desired.difference(&existing).cloned().collect(),
        removals: existing.difference(&desired).cloned().collect(),
        rule_changes,
    }
}

/// 单个用户的角色调整
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRoleChange {
    pub user_id: UserId,
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

/// user roles sync 的结果；dry_run 时只是计划
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub scenario: String,
    pub dry_run: bool,
    pub changes: Vec<UserRoleChange>,
}

/// 模板角色按模板中的 (can_login, is_admin) 分类，用于把模板外的角色映射到模板内
struct RoleClasses {
    in_template: BTreeMap<RoleId, String>,
    admin: Vec<String>,
    member: Vec<String>,
    anonymous: Vec<String>,
}

impl RoleClasses {
    fn new(template_roles: &[(&RoleDef, Role)]) -> Self {
        let mut classes = Self {
            in_template: BTreeMap::new(),
            admin: Vec::new(),
            member: Vec::new(),
            anonymous: Vec::new(),
        };
        for (def, role) in template_roles {
            classes.in_template.insert(role.id, role.name.clone());
            match (def.is_admin, def.can_login) {
                (true, _) => classes.admin.push(def.name.clone()),
                (false, true) => classes.member.push(def.name.clone()),
                (false, false) => classes.anonymous.push(def.name.clone()),
            }
        }
        classes
    }

    /// 模板内角色保持不变；模板外角色只有在同类唯一时才映射
    fn target(&self, role: &Role) -> Option<String> {
        if let Some(name) = self.in_template.get(&role.id) {
            return Some(name.clone());
        }
        let class = match (role.is_admin, role.can_login) {
            (true, _) => &self.admin,
            (false, true) => &self.member,
            (false, false) => &self.anonymous,
        };
        match class.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        }
    }
}

/// 目录中不存在的组合只告警
fn warn_unknown_grants(scenario: &Scenario) {
    for role in &scenario.roles {
        for grant in &role.grants {
            if !catalog::is_known(&grant.section, grant.effective_item(), &grant.action) {
                tracing::warn!(
                    scenario = %scenario.name,
                    role = %role.name,
                    grant = %grant,
                    "Template grant does not match any catalog entry"
                );
            }
        }
    }
}

/// 场景摘要列表（按名称排序）
pub fn summarize(scenarios: &ScenarioCatalog) -> Vec<ScenarioSummary> {
    scenarios
        .iter()
        .map(|s| ScenarioSummary {
            name: s.name.clone(),
            description: s.description.clone(),
            roles: s.roles.iter().map(|r| r.name.clone()).collect(),
        })
        .collect()
}

/// 在事务内应用一个角色定义
async fn apply_role(
    tx: &mut dyn StoreTx,
    def: &RoleDef,
) -> Result<(AppliedRole, RoleSnapshot, RoleSnapshot)> {
    let flags = RoleFlags {
        can_login: def.can_login,
        is_admin: def.is_admin,
        private_labels: def.can_login,
    };

    let (role, outcome, before) = match tx.find_role_by_name(&def.name).await? {
        Some(existing) => {
            let grants = tx.list_grants_by_role(existing.id).await?;
            let updated = tx.update_role_flags(existing.id, flags).await?;
            tracing::debug!(role = %def.name, role_id = %existing.id, "Updated role flags");
            let before = RoleSnapshot {
                name: def.name.clone(),
                role: Some(existing),
                grants,
            };
            (updated, ApplyOutcome::Updated, before)
        }
        None => {
            let created = tx
                .insert_role(&CreateRoleRequest {
                    name: def.name.clone(),
                    can_login: flags.can_login,
                    is_admin: flags.is_admin,
                    private_labels: flags.private_labels,
                    public_profile_allowed_at: None,
                })
                .await?;
            tracing::debug!(role = %def.name, role_id = %created.id, "Created role");
            let before = RoleSnapshot {
                name: def.name.clone(),
                role: None,
                grants: Vec::new(),
            };
            (created, ApplyOutcome::Created, before)
        }
    };

    let cleared = tx.delete_grants_for_role(role.id).await?;
    for grant in &def.grants {
        tx.insert_grant(&grant.to_new_grant(role.id)).await?;
    }
    let grants = tx.list_grants_by_role(role.id).await?;

    tracing::debug!(
        role = %def.name,
        cleared,
        inserted = def.grants.len(),
        "Replaced role grants"
    );

    let applied = AppliedRole {
        name: def.name.clone(),
        id: role.id,
        outcome,
        grants_before: before.grants.len(),
        grants_after: grants.len(),
    };
    let after = RoleSnapshot {
        name: def.name.clone(),
        role: Some(role),
        grants,
    };
    Ok((applied, before, after))
}

pub struct TemplateService {
    store: Arc<dyn AuthzStore>,
    scenarios: Arc<ScenarioCatalog>,
}

impl TemplateService {
    pub fn new(store: Arc<dyn AuthzStore>, scenarios: Arc<ScenarioCatalog>) -> Self {
        Self { store, scenarios }
    }

    /// 列出所有场景
    pub fn list(&self) -> Vec<ScenarioSummary> {
        summarize(&self.scenarios)
    }

    /// 场景定义
    pub fn explain(&self, name: &str) -> Result<&Scenario> {
        self.scenarios.get(name)
    }

    /// 按名称应用场景
    pub async fn apply(&self, name: &str) -> Result<ApplyReport> {
        let scenario = self.scenarios.get(name)?;
        self.apply_scenario(scenario).await
    }

    /// 应用场景中的全部角色
    pub async fn apply_scenario(&self, scenario: &Scenario) -> Result<ApplyReport> {
        self.run(scenario, scenario.roles.iter().collect()).await
    }

    /// 只重新应用场景中的单个角色
    pub async fn reset_role(&self, scenario: &str, role: &str) -> Result<ApplyReport> {
        let scenario = self.scenarios.get(scenario)?;
        let def = scenario.role(role).ok_or_else(|| {
            AppError::NotFound(format!("role {} in template {}", role, scenario.name))
        })?;
        self.run(scenario, vec![def]).await
    }

    async fn run(&self, scenario: &Scenario, roles: Vec<&RoleDef>) -> Result<ApplyReport> {
        scenario
            .validate()
            .map_err(|e| AppError::Validation(format!("Scenario {}: {}", scenario.name, e)))?;
        warn_unknown_grants(scenario);

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("apply_template", %run_id, scenario = %scenario.name);

        let result = self
            .run_in_transaction(run_id, scenario, roles)
            .instrument(span)
            .await;

        let outcome = if result.is_ok() { "committed" } else { "rolled_back" };
        metrics::counter!("authz_template_applies_total", "outcome" => outcome).increment(1);
        result
    }

    async fn run_in_transaction(
        &self,
        run_id: Uuid,
        scenario: &Scenario,
        roles: Vec<&RoleDef>,
    ) -> Result<ApplyReport> {
        let mut tx = self.store.begin().await?;
        let mut report = ApplyReport {
            run_id,
            scenario: scenario.name.clone(),
            roles: Vec::with_capacity(roles.len()),
            before: Vec::with_capacity(roles.len()),
            after: Vec::with_capacity(roles.len()),
        };

        for def in roles {
            match apply_role(tx.as_mut(), def).await {
                Ok((applied, before, after)) => {
                    report.roles.push(applied);
                    report.before.push(before);
                    report.after.push(after);
                }
                Err(e) => {
                    tracing::error!(role = %def.name, error = %e, "Template apply failed, rolling back");
                    return Err(e);
                }
            }
        }

        tx.commit().await?;

        tracing::info!(roles = report.roles.len(), "Template applied");
        Ok(report)
    }

    /// 比较场景与当前存储，不做修改
    pub async fn diff(&self, name: &str) -> Result<Vec<RoleDiff>> {
        let scenario = self.scenarios.get(name)?;
        self.diff_scenario(scenario).await
    }

    pub async fn diff_scenario(&self, scenario: &Scenario) -> Result<Vec<RoleDiff>> {
        let mut diffs = Vec::with_capacity(scenario.roles.len());
        for def in &scenario.roles {
            let diff = match self.store.find_role_by_name(&def.name).await? {
                Some(role) => {
                    let grants = self.store.list_grants_by_role(role.id).await?;
                    role_diff(def, Some((&role, grants.as_slice())))
                }
                None => role_diff(def, None),
            };
            diffs.push(diff);
        }
        Ok(diffs)
    }

    /// 把现有用户的角色收敛到场景中的角色
    pub async fn sync_user_roles(&self, name: &str, dry_run: bool) -> Result<SyncReport> {
        let scenario = self.scenarios.get(name)?;
        self.sync_user_roles_scenario(scenario, dry_run).await
    }

    pub async fn sync_user_roles_scenario(
        &self,
        scenario: &Scenario,
        dry_run: bool,
    ) -> Result<SyncReport> {
        let mut template_roles = Vec::with_capacity(scenario.roles.len());
        for def in &scenario.roles {
            let role = self.store.find_role_by_name(&def.name).await?.ok_or_else(|| {
                AppError::NotFound(format!(
                    "role {} (apply template {} first)",
                    def.name, scenario.name
                ))
            })?;
            template_roles.push((def, role));
        }
        let classes = RoleClasses::new(&template_roles);
        let by_name: BTreeMap<String, RoleId> = template_roles
            .iter()
            .map(|(_, r)| (r.name.clone(), r.id))
            .collect();

        let roles: BTreeMap<RoleId, Role> = self
            .store
            .list_roles()
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        let mut assignments: BTreeMap<UserId, Vec<RoleId>> = BTreeMap::new();
        for link in self.store.list_user_roles().await? {
            assignments.entry(link.user_id).or_default().push(link.role_id);
        }

        let mut changes = Vec::new();
        for (user_id, role_ids) in assignments {
            let current: Vec<&Role> = role_ids.iter().filter_map(|id| roles.get(id)).collect();
            let current_names: BTreeSet<String> = current.iter().map(|r| r.name.clone()).collect();
            let desired: BTreeSet<String> =
                current.iter().filter_map(|r| classes.target(r)).collect();

            let change = UserRoleChange {
                user_id,
                add: desired.difference(&current_names).cloned().collect(),
                remove: current_names.difference(&desired).cloned().collect(),
            };
            if change.add.is_empty() && change.remove.is_empty() {
                continue;
            }
            if !dry_run {
                self.apply_user_change(&change, &by_name, &roles).await?;
            }
            changes.push(change);
        }

        tracing::info!(
            scenario = %scenario.name,
            users = changes.len(),
            dry_run,
            "User roles synced"
        );
        Ok(SyncReport {
            scenario: scenario.name.clone(),
            dry_run,
            changes,
        })
    }

    async fn apply_user_change(
        &self,
        change: &UserRoleChange,
        template_ids: &BTreeMap<String, RoleId>,
        roles: &BTreeMap<RoleId, Role>,
    ) -> Result<()> {
        for name in &change.add {
            if let Some(role_id) = template_ids.get(name) {
                self.store.assign_role(change.user_id, *role_id).await?;
                tracing::info!(user_id = %change.user_id, role = %name, "Role assigned by sync");
            }
        }
        for name in &change.remove {
            if let Some(role) = roles.values().find(|r| &r.name == name) {
                self.store.revoke_role(change.user_id, role.id).await?;
                tracing::info!(user_id = %change.user_id, role = %name, "Role revoked by sync");
            }
        }
        Ok(())
    }
}
