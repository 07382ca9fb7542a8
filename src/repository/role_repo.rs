//! Role repository (角色数据访问)
//!
//! 查询函数对执行器泛型：连接池与事务共用同一份 SQL。

use crate::error::{AppError, Result};
use crate::models::role::*;
use sqlx::{Executor, Postgres};

pub struct RoleRepository;

impl RoleRepository {
    // ==================== Roles ====================

    /// 列出所有角色
    pub async fn list<'e, E>(executor: E) -> Result<Vec<Role>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let roles = sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY name")
            .fetch_all(executor)
            .await?;

        Ok(roles)
    }

    /// 根据名称查找角色
    pub async fn find_by_name<'e, E>(executor: E, name: &str) -> Result<Option<Role>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(executor)
            .await?;

        Ok(role)
    }

    /// 根据 ID 查找角色
    pub async fn find_by_id<'e, E>(executor: E, id: RoleId) -> Result<Option<Role>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(role)
    }

    /// 创建角色，未指定公开资料时间时取当前时间
    pub async fn create<'e, E>(executor: E, req: &CreateRoleRequest) -> Result<Role>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let role = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (name, can_login, is_admin, private_labels, public_profile_allowed_at)
            VALUES ($1, $2, $3, $4, COALESCE($5, NOW()))
            RETURNING *
            "#,
        )
        .bind(&req.name)
        .bind(req.can_login)
        .bind(req.is_admin)
        .bind(req.private_labels)
        .bind(req.public_profile_allowed_at)
        .fetch_one(executor)
        .await?;

        Ok(role)
    }

    /// 更新角色
    pub async fn update<'e, E>(
        executor: E,
        id: RoleId,
        req: &UpdateRoleRequest,
    ) -> Result<Option<Role>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let role = sqlx::query_as::<_, Role>(
            r#"
            UPDATE roles
            SET
                name = COALESCE($2, name),
                can_login = COALESCE($3, can_login),
                is_admin = COALESCE($4, is_admin),
                private_labels = COALESCE($5, private_labels)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&req.name)
        .bind(req.can_login)
        .bind(req.is_admin)
        .bind(req.private_labels)
        .fetch_optional(executor)
        .await?;

        Ok(role)
    }

    /// 整体覆盖角色标志位
    pub async fn update_flags<'e, E>(executor: E, id: RoleId, flags: RoleFlags) -> Result<Role>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Role>(
            r#"
            UPDATE roles
            SET can_login = $2, is_admin = $3, private_labels = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(flags.can_login)
        .bind(flags.is_admin)
        .bind(flags.private_labels)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("role {}", id)))
    }

    // ==================== User Roles ====================

    /// 为用户分配角色
    pub async fn assign_to_user<'e, E>(executor: E, user_id: UserId, role_id: RoleId) -> Result<bool>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 撤销用户的角色
    pub async fn revoke_from_user<'e, E>(
        executor: E,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<bool>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 获取用户持有的角色
    pub async fn roles_for_user<'e, E>(executor: E, user_id: UserId) -> Result<Vec<Role>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.*
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(executor)
        .await?;

        Ok(roles)
    }

    /// 获取持有某角色的用户
    pub async fn users_for_role<'e, E>(executor: E, role_id: RoleId) -> Result<Vec<UserId>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let users = sqlx::query_scalar::<_, UserId>(
            "SELECT user_id FROM user_roles WHERE role_id = $1 ORDER BY user_id",
        )
        .bind(role_id)
        .fetch_all(executor)
        .await?;

        Ok(users)
    }

    /// 列出所有用户-角色关系
    pub async fn list_assignments<'e, E>(executor: E) -> Result<Vec<UserRole>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let assignments = sqlx::query_as::<_, UserRole>(
            "SELECT user_id, role_id FROM user_roles ORDER BY user_id, role_id",
        )
        .fetch_all(executor)
        .await?;

        Ok(assignments)
    }
}
