//! Grant repository (授权数据访问)

use crate::error::{AppError, Result};
use crate::models::grant::*;
use crate::models::role::{RoleId, UserId};
use sqlx::{Executor, FromRow, Postgres};

/// grants 表的一行；所有者以两个可空列存储
#[derive(Debug, FromRow)]
struct GrantRow {
    id: GrantId,
    role_id: Option<RoleId>,
    user_id: Option<UserId>,
    section: String,
    item: Option<String>,
    item_id: Option<i32>,
    rule_type: String,
    item_rule: Option<String>,
    action: String,
    extra: Option<String>,
    active: bool,
}

impl TryFrom<GrantRow> for Grant {
    type Error = AppError;

    fn try_from(row: GrantRow) -> Result<Self> {
        Ok(Grant {
            id: row.id,
            owner: GrantOwner::from_columns(row.role_id, row.user_id)?,
            section: row.section,
            item: row.item,
            item_id: row.item_id,
            rule_type: row.rule_type.parse()?,
            item_rule: row.item_rule,
            action: row.action,
            extra: row.extra,
            active: row.active,
        })
    }
}

fn into_grants(rows: Vec<GrantRow>) -> Result<Vec<Grant>> {
    rows.into_iter().map(Grant::try_from).collect()
}

pub struct GrantRepository;

impl GrantRepository {
    /// 创建授权
    pub async fn create<'e, E>(executor: E, grant: &NewGrant) -> Result<GrantId>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let owner = grant.owner();
        let id = sqlx::query_scalar::<_, GrantId>(
            r#"
            INSERT INTO grants
                (role_id, user_id, section, item, item_id, rule_type, item_rule, action, extra, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(owner.role_id())
        .bind(owner.user_id())
        .bind(grant.section())
        .bind(grant.item())
        .bind(grant.item_id())
        .bind(grant.rule_type().as_str())
        .bind(grant.item_rule())
        .bind(grant.action())
        .bind(grant.extra())
        .bind(grant.is_active())
        .fetch_one(executor)
        .await?;

        Ok(id)
    }

    /// 根据 ID 查找授权
    pub async fn find_by_id<'e, E>(executor: E, id: GrantId) -> Result<Option<Grant>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, GrantRow>("SELECT * FROM grants WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;

        row.map(Grant::try_from).transpose()
    }

    /// 删除授权
    pub async fn delete<'e, E>(executor: E, id: GrantId) -> Result<bool>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM grants WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 启用或停用授权
    pub async fn set_active<'e, E>(executor: E, id: GrantId, active: bool) -> Result<bool>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("UPDATE grants SET active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 删除角色的所有授权
    pub async fn delete_for_role<'e, E>(executor: E, role_id: RoleId) -> Result<u64>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM grants WHERE role_id = $1")
            .bind(role_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    /// 按属性删除角色的授权
    pub async fn delete_by_properties<'e, E>(
        executor: E,
        role_id: RoleId,
        section: &str,
        item: Option<&str>,
        action: &str,
    ) -> Result<u64>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            DELETE FROM grants
            WHERE role_id = $1
              AND section = $2
              AND item IS NOT DISTINCT FROM $3
              AND action = $4
            "#,
        )
        .bind(role_id)
        .bind(section)
        .bind(item)
        .bind(action)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// 获取角色的所有授权
    pub async fn list_by_role<'e, E>(executor: E, role_id: RoleId) -> Result<Vec<Grant>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, GrantRow>(
            "SELECT * FROM grants WHERE role_id = $1 ORDER BY section, item, item_id, action, id",
        )
        .bind(role_id)
        .fetch_all(executor)
        .await?;

        into_grants(rows)
    }

    /// 获取直接授予用户的授权
    pub async fn list_by_user<'e, E>(executor: E, user_id: UserId) -> Result<Vec<Grant>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, GrantRow>(
            "SELECT * FROM grants WHERE user_id = $1 ORDER BY section, item, item_id, action, id",
        )
        .bind(user_id)
        .fetch_all(executor)
        .await?;

        into_grants(rows)
    }

    /// 按范围列出授权，未设置的条件不参与过滤
    pub async fn list_by_scope<'e, E>(executor: E, filter: &GrantScopeFilter) -> Result<Vec<Grant>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT * FROM grants
            WHERE ($1::TEXT IS NULL OR section = $1)
              AND ($2::TEXT IS NULL OR item = $2)
              AND ($3::INTEGER IS NULL OR item_id = $3)
            ORDER BY id
            "#,
        )
        .bind(&filter.section)
        .bind(&filter.item)
        .bind(filter.item_id)
        .fetch_all(executor)
        .await?;

        into_grants(rows)
    }

    /// 判定候选
    pub async fn matching<'e, E>(
        executor: E,
        subject: &Subject,
        request: &PermissionRequest,
    ) -> Result<Vec<Grant>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let role_ids: Vec<i32> = subject.role_ids.iter().map(|r| r.0).collect();

        let rows = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT * FROM grants
            WHERE (role_id = ANY($1) OR user_id = $2)
              AND section = $3
              AND action = $4
              AND active
              AND (item IS NULL OR item = $5)
              AND (item_id IS NULL OR item_id = $6)
            "#,
        )
        .bind(role_ids)
        .bind(subject.user_id)
        .bind(&request.section)
        .bind(&request.action)
        .bind(&request.item)
        .bind(request.item_id)
        .fetch_all(executor)
        .await?;

        into_grants(rows)
    }
}
