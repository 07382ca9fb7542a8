//! Database repository layer
//!
//! 存储抽象：服务层只依赖这里的 trait，PostgreSQL 与内存实现可互换。

pub mod grant_repo;
pub mod memory;
pub mod postgres;
pub mod role_repo;

pub use grant_repo::GrantRepository;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use role_repo::RoleRepository;

use crate::error::Result;
use crate::models::grant::{Grant, GrantId, GrantScopeFilter, NewGrant, PermissionRequest, Subject};
use crate::models::role::{
    CreateRoleRequest, Role, RoleFlags, RoleId, UpdateRoleRequest, UserId, UserRole,
};
use async_trait::async_trait;

/// 角色与用户-角色关系
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// 列出所有角色（按名称排序）
    async fn list_roles(&self) -> Result<Vec<Role>>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>>;

    async fn find_role_by_id(&self, id: RoleId) -> Result<Option<Role>>;

    async fn create_role(&self, req: &CreateRoleRequest) -> Result<Role>;

    /// 更新角色，角色不存在时返回 None
    async fn update_role(&self, id: RoleId, req: &UpdateRoleRequest) -> Result<Option<Role>>;

    /// 为用户分配角色；已存在时返回 false
    async fn assign_role(&self, user_id: UserId, role_id: RoleId) -> Result<bool>;

    async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> Result<bool>;

    async fn roles_for_user(&self, user_id: UserId) -> Result<Vec<Role>>;

    async fn users_for_role(&self, role_id: RoleId) -> Result<Vec<UserId>>;

    /// 全部用户-角色关系，按 (user_id, role_id) 排序
    async fn list_user_roles(&self) -> Result<Vec<UserRole>>;
}

/// 授权记录
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn create_grant(&self, grant: &NewGrant) -> Result<GrantId>;

    async fn find_grant(&self, id: GrantId) -> Result<Option<Grant>>;

    async fn delete_grant(&self, id: GrantId) -> Result<bool>;

    async fn set_grant_active(&self, id: GrantId, active: bool) -> Result<bool>;

    async fn delete_grants_for_role(&self, role_id: RoleId) -> Result<u64>;

    /// 按 (role, section, item, action) 删除，item 为 None 时只匹配 section 级授权
    async fn delete_grants_by_properties(
        &self,
        role_id: RoleId,
        section: &str,
        item: Option<&str>,
        action: &str,
    ) -> Result<u64>;

    async fn list_grants_by_role(&self, role_id: RoleId) -> Result<Vec<Grant>>;

    async fn list_grants_by_user(&self, user_id: UserId) -> Result<Vec<Grant>>;

    async fn list_grants_by_scope(&self, filter: &GrantScopeFilter) -> Result<Vec<Grant>>;

    /// 判定候选：主体拥有的、与请求匹配的有效授权
    async fn matching_grants(
        &self,
        subject: &Subject,
        request: &PermissionRequest,
    ) -> Result<Vec<Grant>>;
}

/// 完整存储：在角色与授权之外提供事务
#[async_trait]
pub trait AuthzStore: RoleStore + GrantStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;
}

/// 模板应用使用的事务；未提交即丢弃时回滚
#[async_trait]
pub trait StoreTx: Send {
    async fn find_role_by_name(&mut self, name: &str) -> Result<Option<Role>>;

    async fn insert_role(&mut self, req: &CreateRoleRequest) -> Result<Role>;

    async fn update_role_flags(&mut self, id: RoleId, flags: RoleFlags) -> Result<Role>;

    async fn list_grants_by_role(&mut self, role_id: RoleId) -> Result<Vec<Grant>>;

    async fn delete_grants_for_role(&mut self, role_id: RoleId) -> Result<u64>;

    async fn insert_grant(&mut self, grant: &NewGrant) -> Result<GrantId>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
