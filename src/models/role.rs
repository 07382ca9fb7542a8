//! Role domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 角色 ID
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct RoleId(pub i32);

/// 用户 ID（用户由站点其他部分管理，这里只引用）
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub i32);

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub can_login: bool,
    pub is_admin: bool,
    pub private_labels: bool,
    pub public_profile_allowed_at: Option<DateTime<Utc>>,
}

/// Create role request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub can_login: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub private_labels: bool,
    pub public_profile_allowed_at: Option<DateTime<Utc>>,
}

impl CreateRoleRequest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            can_login: false,
            is_admin: false,
            private_labels: false,
            public_profile_allowed_at: None,
        }
    }
}

/// Update role request (None 表示保持原值)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub can_login: Option<bool>,
    pub is_admin: Option<bool>,
    pub private_labels: Option<bool>,
}

/// 角色标志位（模板应用时整体覆盖）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleFlags {
    pub can_login: bool,
    pub is_admin: bool,
    pub private_labels: bool,
}

impl Role {
    pub fn flags(&self) -> RoleFlags {
        RoleFlags {
            can_login: self.can_login,
            is_admin: self.is_admin,
            private_labels: self.private_labels,
        }
    }
}

/// User <-> role assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRole {
    pub user_id: UserId,
    pub role_id: RoleId,
}
