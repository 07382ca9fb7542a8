//! 授权管理服务

use crate::{
    catalog,
    error::{AppError, Result},
    models::grant::{CreateGrantRequest, Grant, GrantId, GrantScopeFilter, NewGrant},
    models::role::{RoleId, UserId},
    repository::AuthzStore,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// 级联清理结果；dry_run 时 deleted 为计划删除的授权
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub dry_run: bool,
    pub deleted: Vec<GrantId>,
    /// 删除时已不存在
    pub skipped: Vec<GrantId>,
    pub failed: Vec<GrantId>,
    /// 持有用户级授权的用户，已排序去重
    pub participants: Vec<UserId>,
}

pub struct GrantService {
    store: Arc<dyn AuthzStore>,
}

impl GrantService {
    pub fn new(store: Arc<dyn AuthzStore>) -> Self {
        Self { store }
    }

    /// 创建授权；不在目录中的组合只记录警告
    pub async fn create_grant(&self, req: CreateGrantRequest) -> Result<GrantId> {
        let grant = NewGrant::try_from(req)?;

        if !catalog::is_known(grant.section(), grant.item(), grant.action()) {
            tracing::warn!(
                section = %grant.section(),
                item = ?grant.item(),
                action = %grant.action(),
                "Grant does not match any catalog entry"
            );
        }

        let id = self.store.create_grant(&grant).await?;

        tracing::info!(
            grant_id = %id,
            owner = ?grant.owner(),
            section = %grant.section(),
            item = ?grant.item(),
            item_id = ?grant.item_id(),
            action = %grant.action(),
            rule_type = %grant.rule_type(),
            "Grant created"
        );
        Ok(id)
    }

    pub async fn find_grant(&self, id: GrantId) -> Result<Grant> {
        self.store
            .find_grant(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("grant {}", id)))
    }

    /// 删除授权
    pub async fn delete_grant(&self, id: GrantId) -> Result<()> {
        if !self.store.delete_grant(id).await? {
            return Err(AppError::NotFound(format!("grant {}", id)));
        }
        tracing::info!(grant_id = %id, "Grant deleted");
        Ok(())
    }

    /// 启用或停用授权
    pub async fn set_grant_active(&self, id: GrantId, active: bool) -> Result<()> {
        if !self.store.set_grant_active(id, active).await? {
            return Err(AppError::NotFound(format!("grant {}", id)));
        }
        tracing::info!(grant_id = %id, active, "Grant active flag changed");
        Ok(())
    }

    /// 按属性移除角色上由模板写入的授权
    pub async fn remove_template_grant(
        &self,
        role_id: RoleId,
        section: &str,
        item: Option<&str>,
        action: &str,
    ) -> Result<u64> {
        let deleted = self
            .store
            .delete_grants_by_properties(role_id, section, item, action)
            .await?;
        tracing::info!(
            role_id = %role_id,
            section = %section,
            item = ?item,
            action = %action,
            deleted,
            "Template grant removed"
        );
        Ok(deleted)
    }

    pub async fn list_by_role(&self, role_id: RoleId) -> Result<Vec<Grant>> {
        self.store.list_grants_by_role(role_id).await
    }

    pub async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Grant>> {
        self.store.list_grants_by_user(user_id).await
    }

    pub async fn list_by_scope(&self, filter: &GrantScopeFilter) -> Result<Vec<Grant>> {
        self.store.list_grants_by_scope(filter).await
    }

    /// 资源被删除时清理其上的授权
    ///
    /// 逐条删除，单条失败记录后继续，不包在事务中。
    pub async fn purge_scope(
        &self,
        section: &str,
        item: &str,
        item_id: i32,
        dry_run: bool,
    ) -> Result<PurgeReport> {
        let filter = GrantScopeFilter::instance(section, item, item_id);
        let grants = self.store.list_grants_by_scope(&filter).await?;

        let participants: BTreeSet<UserId> =
            grants.iter().filter_map(|g| g.owner.user_id()).collect();
        let mut report = PurgeReport {
            dry_run,
            participants: participants.into_iter().collect(),
            ..PurgeReport::default()
        };

        if dry_run {
            report.deleted = grants.iter().map(|g| g.id).collect();
            tracing::info!(
                section = %section,
                item = %item,
                item_id,
                planned = report.deleted.len(),
                "Scope purge dry run"
            );
            return Ok(report);
        }

        for grant in grants {
            match self.store.delete_grant(grant.id).await {
                Ok(true) => report.deleted.push(grant.id),
                Ok(false) => {
                    tracing::debug!(grant_id = %grant.id, "Grant already gone during purge");
                    report.skipped.push(grant.id);
                }
                Err(e) => {
                    tracing::error!(
                        grant_id = %grant.id,
                        section = %section,
                        item = %item,
                        item_id,
                        error = %e,
                        "Failed to delete grant during purge"
                    );
                    metrics::counter!("authz_purge_failures_total").increment(1);
                    report.failed.push(grant.id);
                }
            }
        }

        tracing::info!(
            section = %section,
            item = %item,
            item_id,
            deleted = report.deleted.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Scope purge finished"
        );
        Ok(report)
    }
}
