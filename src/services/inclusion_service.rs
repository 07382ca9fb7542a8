//! 角色包含关系分析
//!
//! 若角色 B 的每条授权（按结构化签名比较）都出现在角色 A 中，则称 A 包含 B。
//! 仅用于提示，不影响判定。

use crate::{
    error::{AppError, Result},
    models::grant::{Grant, RuleType},
    models::role::{Role, UserId},
    repository::AuthzStore,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// 授权的结构化签名（不含 ID 与所有者）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GrantKey<'a> {
    section: &'a str,
    item: Option<&'a str>,
    rule_type: RuleType,
    item_rule: Option<&'a str>,
    item_id: Option<i32>,
    action: &'a str,
    extra: Option<&'a str>,
    active: bool,
}

impl<'a> From<&'a Grant> for GrantKey<'a> {
    fn from(grant: &'a Grant) -> Self {
        Self {
            section: &grant.section,
            item: grant.item.as_deref(),
            rule_type: grant.rule_type,
            item_rule: grant.item_rule.as_deref(),
            item_id: grant.item_id,
            action: &grant.action,
            extra: grant.extra.as_deref(),
            active: grant.active,
        }
    }
}

/// target 是否包含 candidate 的全部授权；candidate 为空时恒为真
pub fn includes(target: &[Grant], candidate: &[Grant]) -> bool {
    let keys: HashSet<GrantKey<'_>> = target.iter().map(GrantKey::from).collect();
    candidate.iter().all(|g| keys.contains(&GrantKey::from(g)))
}

/// role inspect 视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleInspection {
    pub role: Role,
    pub users: Vec<UserId>,
    pub grants: Vec<Grant>,
    pub includes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct InclusionPair {
    pub includer: String,
    pub included: String,
}

pub struct InclusionService {
    store: Arc<dyn AuthzStore>,
}

impl InclusionService {
    pub fn new(store: Arc<dyn AuthzStore>) -> Self {
        Self { store }
    }

    async fn load_all(&self) -> Result<Vec<(Role, Vec<Grant>)>> {
        let roles = self.store.list_roles().await?;
        let mut out = Vec::with_capacity(roles.len());
        for role in roles {
            let grants = self.store.list_grants_by_role(role.id).await?;
            out.push((role, grants));
        }
        Ok(out)
    }

    fn included_by(target: &Role, target_grants: &[Grant], all: &[(Role, Vec<Grant>)]) -> Vec<String> {
        let mut names: Vec<String> = all
            .iter()
            .filter(|(role, grants)| {
                role.id != target.id && !grants.is_empty() && includes(target_grants, grants)
            })
            .map(|(role, _)| role.name.clone())
            .collect();
        names.sort();
        names
    }

    /// 列出被该角色包含的其他角色（按名称排序）
    pub async fn inclusions(&self, role_name: &str) -> Result<Vec<String>> {
        let all = self.load_all().await?;
        let (target, grants) = all
            .iter()
            .find(|(role, _)| role.name == role_name)
            .ok_or_else(|| AppError::NotFound(format!("role {}", role_name)))?;
        Ok(Self::included_by(target, grants, &all))
    }

    /// 角色属性、成员、授权与包含关系
    pub async fn inspect(&self, role_name: &str) -> Result<RoleInspection> {
        let all = self.load_all().await?;
        let (role, grants) = all
            .iter()
            .find(|(role, _)| role.name == role_name)
            .ok_or_else(|| AppError::NotFound(format!("role {}", role_name)))?;

        let users = self.store.users_for_role(role.id).await?;
        let includes = Self::included_by(role, grants, &all);

        tracing::debug!(
            role = %role_name,
            users = users.len(),
            grants = grants.len(),
            includes = includes.len(),
            "Inspected role"
        );

        Ok(RoleInspection {
            role: role.clone(),
            users,
            grants: grants.clone(),
            includes,
        })
    }

    /// 所有角色两两之间的包含关系
    pub async fn redundancy_matrix(&self) -> Result<Vec<InclusionPair>> {
        let all = self.load_all().await?;
        let mut pairs = Vec::new();
        for (role, grants) in &all {
            for included in Self::included_by(role, grants, &all) {
                pairs.push(InclusionPair {
                    includer: role.name.clone(),
                    included,
                });
            }
        }
        pairs.sort();
        Ok(pairs)
    }
}
