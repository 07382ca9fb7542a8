//! In-memory store
//!
//! 与 PostgreSQL 实现语义一致，用于测试与离线演练。事务持有写锁并在私有副本上操作，
//! 提交时整体替换共享状态。

use super::{AuthzStore, GrantStore, RoleStore, StoreTx};
use crate::error::{AppError, Result};
use crate::models::grant::{Grant, GrantId, GrantScopeFilter, NewGrant, PermissionRequest, Subject};
use crate::models::role::{
    CreateRoleRequest, Role, RoleFlags, RoleId, UpdateRoleRequest, UserId, UserRole,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    roles: BTreeMap<RoleId, Role>,
    user_roles: BTreeSet<UserRole>,
    grants: BTreeMap<GrantId, Grant>,
    next_role_id: i32,
    next_grant_id: i32,
}

fn sort_grants(grants: &mut [Grant]) {
    grants.sort_by(|a, b| {
        (&a.section, &a.item, a.item_id, &a.action, a.id)
            .cmp(&(&b.section, &b.item, b.item_id, &b.action, b.id))
    });
}

impl MemoryState {
    fn find_role_by_name(&self, name: &str) -> Option<Role> {
        self.roles.values().find(|r| r.name == name).cloned()
    }

    fn insert_role(&mut self, req: &CreateRoleRequest) -> Result<Role> {
        if req.name.trim().is_empty() {
            return Err(AppError::validation("Role name must not be empty"));
        }
        if self.find_role_by_name(&req.name).is_some() {
            return Err(AppError::Validation(format!("Role {} already exists", req.name)));
        }
        self.next_role_id += 1;
        let role = Role {
            id: RoleId(self.next_role_id),
            name: req.name.clone(),
            can_login: req.can_login,
            is_admin: req.is_admin,
            private_labels: req.private_labels,
            public_profile_allowed_at: req.public_profile_allowed_at.or_else(|| Some(Utc::now())),
        };
        self.roles.insert(role.id, role.clone());
        Ok(role)
    }

    fn update_role_flags(&mut self, id: RoleId, flags: RoleFlags) -> Result<Role> {
        let role = self
            .roles
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("role {}", id)))?;
        role.can_login = flags.can_login;
        role.is_admin = flags.is_admin;
        role.private_labels = flags.private_labels;
        Ok(role.clone())
    }

    fn grants_where(&self, pred: impl Fn(&Grant) -> bool) -> Vec<Grant> {
        let mut grants: Vec<Grant> = self.grants.values().filter(|g| pred(g)).cloned().collect();
        sort_grants(&mut grants);
        grants
    }

    fn delete_grants_where(&mut self, pred: impl Fn(&Grant) -> bool) -> u64 {
        let before = self.grants.len();
        self.grants.retain(|_, g| !pred(g));
        (before - self.grants.len()) as u64
    }

    fn insert_grant(&mut self, grant: &NewGrant) -> Result<GrantId> {
        if let Some(role_id) = grant.owner().role_id() {
            if !self.roles.contains_key(&role_id) {
                return Err(AppError::NotFound(format!("role {}", role_id)));
            }
        }
        self.next_grant_id += 1;
        let id = GrantId(self.next_grant_id);
        self.grants.insert(id, grant.clone().into_grant(id));
        Ok(id)
    }
}

/// 进程内存储
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn list_roles(&self) -> Result<Vec<Role>> {
        let state = self.state.read().await;
        let mut roles: Vec<Role> = state.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        Ok(self.state.read().await.find_role_by_name(name))
    }

    async fn find_role_by_id(&self, id: RoleId) -> Result<Option<Role>> {
        Ok(self.state.read().await.roles.get(&id).cloned())
    }

    async fn create_role(&self, req: &CreateRoleRequest) -> Result<Role> {
        self.state.write().await.insert_role(req)
    }

    async fn update_role(&self, id: RoleId, req: &UpdateRoleRequest) -> Result<Option<Role>> {
        let mut state = self.state.write().await;
        if let Some(name) = &req.name {
            if state.roles.values().any(|r| r.id != id && r.name == *name) {
                return Err(AppError::Validation(format!("Role {} already exists", name)));
            }
        }
        let Some(role) = state.roles.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &req.name {
            role.name = name.clone();
        }
        if let Some(can_login) = req.can_login {
            role.can_login = can_login;
        }
        if let Some(is_admin) = req.is_admin {
            role.is_admin = is_admin;
        }
        if let Some(private_labels) = req.private_labels {
            role.private_labels = private_labels;
        }
        Ok(Some(role.clone()))
    }

    async fn assign_role(&self, user_id: UserId, role_id: RoleId) -> Result<bool> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(&role_id) {
            return Err(AppError::NotFound(format!("role {}", role_id)));
        }
        Ok(state.user_roles.insert(UserRole { user_id, role_id }))
    }

    async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> Result<bool> {
        Ok(self
            .state
            .write()
            .await
            .user_roles
            .remove(&UserRole { user_id, role_id }))
    }

    async fn roles_for_user(&self, user_id: UserId) -> Result<Vec<Role>> {
        let state = self.state.read().await;
        let mut roles: Vec<Role> = state
            .user_roles
            .iter()
            .filter(|ur| ur.user_id == user_id)
            .filter_map(|ur| state.roles.get(&ur.role_id).cloned())
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn users_for_role(&self, role_id: RoleId) -> Result<Vec<UserId>> {
        let state = self.state.read().await;
        Ok(state
            .user_roles
            .iter()
            .filter(|ur| ur.role_id == role_id)
            .map(|ur| ur.user_id)
            .collect())
    }

    async fn list_user_roles(&self) -> Result<Vec<UserRole>> {
        Ok(self.state.read().await.user_roles.iter().copied().collect())
    }
}

#[async_trait]
impl GrantStore for MemoryStore {
    async fn create_grant(&self, grant: &NewGrant) -> Result<GrantId> {
        self.state.write().await.insert_grant(grant)
    }

    async fn find_grant(&self, id: GrantId) -> Result<Option<Grant>> {
        Ok(self.state.read().await.grants.get(&id).cloned())
    }

    async fn delete_grant(&self, id: GrantId) -> Result<bool> {
        Ok(self.state.write().await.grants.remove(&id).is_some())
    }

    async fn set_grant_active(&self, id: GrantId, active: bool) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.grants.get_mut(&id) {
            Some(grant) => {
                grant.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_grants_for_role(&self, role_id: RoleId) -> Result<u64> {
        Ok(self
            .state
            .write()
            .await
            .delete_grants_where(|g| g.owner.role_id() == Some(role_id)))
    }

    async fn delete_grants_by_properties(
        &self,
        role_id: RoleId,
        section: &str,
        item: Option<&str>,
        action: &str,
    ) -> Result<u64> {
        Ok(self.state.write().await.delete_grants_where(|g| {
            g.owner.role_id() == Some(role_id)
                && g.section == section
                && g.item.as_deref() == item
                && g.action == action
        }))
    }

    async fn list_grants_by_role(&self, role_id: RoleId) -> Result<Vec<Grant>> {
        Ok(self
            .state
            .read()
            .await
            .grants_where(|g| g.owner.role_id() == Some(role_id)))
    }

    async fn list_grants_by_user(&self, user_id: UserId) -> Result<Vec<Grant>> {
        Ok(self
            .state
            .read()
            .await
            .grants_where(|g| g.owner.user_id() == Some(user_id)))
    }

    async fn list_grants_by_scope(&self, filter: &GrantScopeFilter) -> Result<Vec<Grant>> {
        let mut grants = self.state.read().await.grants_where(|g| filter.matches(g));
        grants.sort_by_key(|g| g.id);
        Ok(grants)
    }

    async fn matching_grants(
        &self,
        subject: &Subject,
        request: &PermissionRequest,
    ) -> Result<Vec<Grant>> {
        Ok(self
            .state
            .read()
            .await
            .grants_where(|g| g.is_owned_by(subject) && g.covers(request)))
    }
}

#[async_trait]
impl AuthzStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.state.clone().write_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

/// 内存事务：未提交时丢弃副本即回滚
pub struct MemoryTx {
    guard: OwnedRwLockWriteGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_role_by_name(&mut self, name: &str) -> Result<Option<Role>> {
        Ok(self.working.find_role_by_name(name))
    }

    async fn insert_role(&mut self, req: &CreateRoleRequest) -> Result<Role> {
        self.working.insert_role(req)
    }

    async fn update_role_flags(&mut self, id: RoleId, flags: RoleFlags) -> Result<Role> {
        self.working.update_role_flags(id, flags)
    }

    async fn list_grants_by_role(&mut self, role_id: RoleId) -> Result<Vec<Grant>> {
        Ok(self
            .working
            .grants_where(|g| g.owner.role_id() == Some(role_id)))
    }

    async fn delete_grants_for_role(&mut self, role_id: RoleId) -> Result<u64> {
        Ok(self
            .working
            .delete_grants_where(|g| g.owner.role_id() == Some(role_id)))
    }

    async fn insert_grant(&mut self, grant: &NewGrant) -> Result<GrantId> {
        self.working.insert_grant(grant)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
