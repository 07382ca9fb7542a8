//! 权限检查服务
//!
//! 判定规则：取候选授权中最具体的一层，该层内 deny 优先于 allow；没有候选时拒绝。

use crate::{
    error::{AppError, Result},
    models::grant::{Grant, PermissionRequest, RuleType, Specificity, Subject},
    models::role::UserId,
    repository::AuthzStore,
};
use serde::Serialize;
use std::sync::Arc;

/// 判定原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    NoMatchingGrant,
    Allowed { tier: Specificity },
    Denied { tier: Specificity },
}

/// 判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl Decision {
    fn outcome(&self) -> &'static str {
        match self.reason {
            DecisionReason::NoMatchingGrant => "no_match",
            DecisionReason::Allowed { .. } => "allow",
            DecisionReason::Denied { .. } => "deny",
        }
    }
}

/// 对候选授权做出判定（纯函数）
pub fn resolve<'a, I>(candidates: I) -> Decision
where
    I: IntoIterator<Item = &'a Grant>,
{
    let mut top: Option<(Specificity, bool)> = None;

    for grant in candidates {
        let tier = grant.specificity();
        let is_deny = grant.rule_type == RuleType::Deny;
        top = match top {
            Some((best, denied)) if best == tier => Some((best, denied || is_deny)),
            Some((best, denied)) if best > tier => Some((best, denied)),
            _ => Some((tier, is_deny)),
        };
    }

    match top {
        None => Decision {
            allowed: false,
            reason: DecisionReason::NoMatchingGrant,
        },
        Some((tier, true)) => Decision {
            allowed: false,
            reason: DecisionReason::Denied { tier },
        },
        Some((tier, false)) => Decision {
            allowed: true,
            reason: DecisionReason::Allowed { tier },
        },
    }
}

pub struct PermissionService {
    store: Arc<dyn AuthzStore>,
}

impl PermissionService {
    pub fn new(store: Arc<dyn AuthzStore>) -> Self {
        Self { store }
    }

    /// 构造用户主体（用户本身 + 其持有的角色）
    pub async fn subject_for_user(&self, user_id: UserId) -> Result<Subject> {
        let roles = self.store.roles_for_user(user_id).await?;
        Ok(Subject::user(user_id, roles.into_iter().map(|r| r.id).collect()))
    }

    /// 检查主体对请求的判定
    pub async fn check_permission(
        &self,
        subject: &Subject,
        request: &PermissionRequest,
    ) -> Result<Decision> {
        let decision = if subject.is_empty() {
            resolve(std::iter::empty())
        } else {
            let candidates = self.store.matching_grants(subject, request).await?;
            // 存储层的过滤不作为唯一依据
            resolve(
                candidates
                    .iter()
                    .filter(|g| g.is_owned_by(subject) && g.covers(request)),
            )
        };

        tracing::debug!(
            user_id = ?subject.user_id,
            roles = ?subject.role_ids,
            request = %request,
            allowed = decision.allowed,
            reason = ?decision.reason,
            "Permission decision"
        );
        metrics::counter!("authz_decisions_total", "outcome" => decision.outcome()).increment(1);

        Ok(decision)
    }

    /// 检查主体是否拥有权限；查询失败时拒绝
    pub async fn has_permission(&self, subject: &Subject, request: &PermissionRequest) -> bool {
        match self.check_permission(subject, request).await {
            Ok(decision) => decision.allowed,
            Err(e) => {
                tracing::error!(
                    user_id = ?subject.user_id,
                    request = %request,
                    error = %e,
                    "Permission lookup failed, denying"
                );
                metrics::counter!("authz_decisions_total", "outcome" => "error").increment(1);
                false
            }
        }
    }

    /// 检查权限，如果无权限则返回错误
    pub async fn require_permission(
        &self,
        subject: &Subject,
        request: &PermissionRequest,
    ) -> Result<()> {
        if !self.has_permission(subject, request).await {
            tracing::warn!(
                user_id = ?subject.user_id,
                request = %request,
                "Permission denied"
            );
            return Err(AppError::Forbidden);
        }

        Ok(())
    }
}
