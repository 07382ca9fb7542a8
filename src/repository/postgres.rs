//! PostgreSQL store

use super::{AuthzStore, GrantRepository, GrantStore, RoleRepository, RoleStore, StoreTx};
use crate::error::Result;
use crate::models::grant::{Grant, GrantId, GrantScopeFilter, NewGrant, PermissionRequest, Subject};
use crate::models::role::{
    CreateRoleRequest, Role, RoleFlags, RoleId, UpdateRoleRequest, UserId, UserRole,
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RoleStore for PostgresStore {
    async fn list_roles(&self) -> Result<Vec<Role>> {
        RoleRepository::list(&self.pool).await
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        RoleRepository::find_by_name(&self.pool, name).await
    }

    async fn find_role_by_id(&self, id: RoleId) -> Result<Option<Role>> {
        RoleRepository::find_by_id(&self.pool, id).await
    }

    async fn create_role(&self, req: &CreateRoleRequest) -> Result<Role> {
        RoleRepository::create(&self.pool, req).await
    }

    async fn update_role(&self, id: RoleId, req: &UpdateRoleRequest) -> Result<Option<Role>> {
        RoleRepository::update(&self.pool, id, req).await
    }

    async fn assign_role(&self, user_id: UserId, role_id: RoleId) -> Result<bool> {
        RoleRepository::assign_to_user(&self.pool, user_id, role_id).await
    }

    async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> Result<bool> {
        RoleRepository::revoke_from_user(&self.pool, user_id, role_id).await
    }

    async fn roles_for_user(&self, user_id: UserId) -> Result<Vec<Role>> {
        RoleRepository::roles_for_user(&self.pool, user_id).await
    }

    async fn users_for_role(&self, role_id: RoleId) -> Result<Vec<UserId>> {
        RoleRepository::users_for_role(&self.pool, role_id).await
    }

    async fn list_user_roles(&self) -> Result<Vec<UserRole>> {
        RoleRepository::list_assignments(&self.pool).await
    }
}

#[async_trait]
impl GrantStore for PostgresStore {
    async fn create_grant(&self, grant: &NewGrant) -> Result<GrantId> {
        GrantRepository::create(&self.pool, grant).await
    }

    async fn find_grant(&self, id: GrantId) -> Result<Option<Grant>> {
        GrantRepository::find_by_id(&self.pool, id).await
    }

    async fn delete_grant(&self, id: GrantId) -> Result<bool> {
        GrantRepository::delete(&self.pool, id).await
    }

    async fn set_grant_active(&self, id: GrantId, active: bool) -> Result<bool> {
        GrantRepository::set_active(&self.pool, id, active).await
    }

    async fn delete_grants_for_role(&self, role_id: RoleId) -> Result<u64> {
        GrantRepository::delete_for_role(&self.pool, role_id).await
    }

    async fn delete_grants_by_properties(
        &self,
        role_id: RoleId,
        section: &str,
        item: Option<&str>,
        action: &str,
    ) -> Result<u64> {
        GrantRepository::delete_by_properties(&self.pool, role_id, section, item, action).await
    }

    async fn list_grants_by_role(&self, role_id: RoleId) -> Result<Vec<Grant>> {
        GrantRepository::list_by_role(&self.pool, role_id).await
    }

    async fn list_grants_by_user(&self, user_id: UserId) -> Result<Vec<Grant>> {
        GrantRepository::list_by_user(&self.pool, user_id).await
    }

    async fn list_grants_by_scope(&self, filter: &GrantScopeFilter) -> Result<Vec<Grant>> {
        GrantRepository::list_by_scope(&self.pool, filter).await
    }

    async fn matching_grants(
        &self,
        subject: &Subject,
        request: &PermissionRequest,
    ) -> Result<Vec<Grant>> {
        GrantRepository::matching(&self.pool, subject, request).await
    }
}

#[async_trait]
impl AuthzStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }
}

/// 数据库事务；Transaction 在 drop 时自动回滚
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn find_role_by_name(&mut self, name: &str) -> Result<Option<Role>> {
        RoleRepository::find_by_name(&mut *self.tx, name).await
    }

    async fn insert_role(&mut self, req: &CreateRoleRequest) -> Result<Role> {
        RoleRepository::create(&mut *self.tx, req).await
    }

    async fn update_role_flags(&mut self, id: RoleId, flags: RoleFlags) -> Result<Role> {
        RoleRepository::update_flags(&mut *self.tx, id, flags).await
    }

    async fn list_grants_by_role(&mut self, role_id: RoleId) -> Result<Vec<Grant>> {
        GrantRepository::list_by_role(&mut *self.tx, role_id).await
    }

    async fn delete_grants_for_role(&mut self, role_id: RoleId) -> Result<u64> {
        GrantRepository::delete_for_role(&mut *self.tx, role_id).await
    }

    async fn insert_grant(&mut self, grant: &NewGrant) -> Result<GrantId> {
        GrantRepository::create(&mut *self.tx, grant).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgStoreTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
