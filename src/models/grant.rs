//! Grant domain models
//!
//! 一条授权把一个所有者（角色或单个用户）绑定到 (section, item, item_id, action)
//! 范围上，并给出 allow / deny 结论。

use crate::error::{AppError, Result};
use crate::models::role::{RoleId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 授权 ID
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct GrantId(pub i32);

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 规则类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    #[default]
    Allow,
    Deny,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Allow => "allow",
            RuleType::Deny => "deny",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Ok(RuleType::Allow),
            "deny" => Ok(RuleType::Deny),
            other => Err(AppError::Validation(format!("Unknown rule type: {}", other))),
        }
    }
}

/// 授权所有者：角色或单个用户，二者只能居其一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantOwner {
    Role(RoleId),
    User(UserId),
}

impl GrantOwner {
    /// 从两个可空列构造所有者，同时为空或同时非空都是校验错误
    pub fn from_columns(role_id: Option<RoleId>, user_id: Option<UserId>) -> Result<Self> {
        match (role_id, user_id) {
            (Some(role_id), None) => Ok(GrantOwner::Role(role_id)),
            (None, Some(user_id)) => Ok(GrantOwner::User(user_id)),
            (Some(role_id), Some(user_id)) => Err(AppError::Validation(format!(
                "Grant owner is ambiguous: both role {} and user {} set",
                role_id, user_id
            ))),
            (None, None) => Err(AppError::validation(
                "Grant owner is missing: neither role nor user set",
            )),
        }
    }

    pub fn role_id(&self) -> Option<RoleId> {
        match self {
            GrantOwner::Role(id) => Some(*id),
            GrantOwner::User(_) => None,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            GrantOwner::User(id) => Some(*id),
            GrantOwner::Role(_) => None,
        }
    }
}

/// 授权范围的精确程度，越靠后越具体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Specificity {
    /// 整个 section（无 item / item_id）
    Section,
    /// 某类 item 的所有实例
    Item,
    /// 某个具体实例（item + item_id）
    Instance,
}

impl Specificity {
    pub fn of(item: Option<&str>, item_id: Option<i32>) -> Self {
        match (item, item_id) {
            (Some(_), Some(_)) => Specificity::Instance,
            (Some(_), None) => Specificity::Item,
            _ => Specificity::Section,
        }
    }
}

/// 已持久化的授权记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub id: GrantId,
    pub owner: GrantOwner,
    pub section: String,
    pub item: Option<String>,
    pub item_id: Option<i32>,
    pub rule_type: RuleType,
    pub item_rule: Option<String>,
    pub action: String,
    pub extra: Option<String>,
    pub active: bool,
}

impl Grant {
    pub fn specificity(&self) -> Specificity {
        Specificity::of(self.item.as_deref(), self.item_id)
    }

    pub fn is_owned_by(&self, subject: &Subject) -> bool {
        match self.owner {
            GrantOwner::Role(role_id) => subject.role_ids.contains(&role_id),
            GrantOwner::User(user_id) => subject.user_id == Some(user_id),
        }
    }

    /// 判断该授权是否是请求的候选（不看所有者）
    ///
    /// 未设置 item / item_id 的授权匹配任意值；设置了的必须与请求相等，
    /// 请求未给出 item 时只有 section 级授权能匹配。
    pub fn covers(&self, request: &PermissionRequest) -> bool {
        if !self.active || self.section != request.section || self.action != request.action {
            return false;
        }
        let item_ok = match &self.item {
            None => true,
            Some(item) => request.item.as_deref() == Some(item.as_str()),
        };
        let item_id_ok = match self.item_id {
            None => true,
            Some(id) => request.item_id == Some(id),
        };
        item_ok && item_id_ok
    }
}

/// 待写入的授权。只能通过构造函数得到，保证所有者唯一且 item_id 依附于 item。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGrant {
    owner: GrantOwner,
    section: String,
    item: Option<String>,
    item_id: Option<i32>,
    rule_type: RuleType,
    item_rule: Option<String>,
    action: String,
    extra: Option<String>,
    active: bool,
}

impl NewGrant {
    /// section 级 allow 授权
    pub fn new(owner: GrantOwner, section: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            owner,
            section: section.into(),
            item: None,
            item_id: None,
            rule_type: RuleType::Allow,
            item_rule: None,
            action: action.into(),
            extra: None,
            active: true,
        }
    }

    /// 限定到某类 item
    pub fn on_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self.item_id = None;
        self
    }

    /// 限定到某个具体实例
    pub fn on_instance(mut self, item: impl Into<String>, item_id: i32) -> Self {
        self.item = Some(item.into());
        self.item_id = Some(item_id);
        self
    }

    pub fn with_rule(mut self, rule_type: RuleType) -> Self {
        self.rule_type = rule_type;
        self
    }

    pub fn deny(self) -> Self {
        self.with_rule(RuleType::Deny)
    }

    pub fn with_item_rule(mut self, item_rule: impl Into<String>) -> Self {
        self.item_rule = Some(item_rule.into());
        self
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn owner(&self) -> GrantOwner {
        self.owner
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn item(&self) -> Option<&str> {
        self.item.as_deref()
    }

    pub fn item_id(&self) -> Option<i32> {
        self.item_id
    }

    pub fn rule_type(&self) -> RuleType {
        self.rule_type
    }

    pub fn item_rule(&self) -> Option<&str> {
        self.item_rule.as_deref()
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn extra(&self) -> Option<&str> {
        self.extra.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// 赋予 ID，得到持久化后的记录
    pub fn into_grant(self, id: GrantId) -> Grant {
        Grant {
            id,
            owner: self.owner,
            section: self.section,
            item: self.item,
            item_id: self.item_id,
            rule_type: self.rule_type,
            item_rule: self.item_rule,
            action: self.action,
            extra: self.extra,
            active: self.active,
        }
    }
}

/// Create grant request（管理工具的输入，所有者以两个可空字段给出）
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGrantRequest {
    pub role_id: Option<RoleId>,
    pub user_id: Option<UserId>,
    pub section: String,
    pub item: Option<String>,
    pub item_id: Option<i32>,
    #[serde(default)]
    pub rule_type: RuleType,
    pub item_rule: Option<String>,
    pub action: String,
    pub extra: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl TryFrom<CreateGrantRequest> for NewGrant {
    type Error = AppError;

    fn try_from(req: CreateGrantRequest) -> Result<Self> {
        let owner = GrantOwner::from_columns(req.role_id, req.user_id)?;

        if req.section.trim().is_empty() {
            return Err(AppError::validation("Grant section must not be empty"));
        }
        if req.action.trim().is_empty() {
            return Err(AppError::validation("Grant action must not be empty"));
        }

        let mut grant = NewGrant::new(owner, req.section, req.action)
            .with_rule(req.rule_type)
            .active(req.active);
        grant = match (req.item, req.item_id) {
            (Some(item), Some(item_id)) => grant.on_instance(item, item_id),
            (Some(item), None) => grant.on_item(item),
            (None, Some(item_id)) => {
                return Err(AppError::Validation(format!(
                    "Grant item_id {} requires an item",
                    item_id
                )))
            }
            (None, None) => grant,
        };
        if let Some(item_rule) = req.item_rule {
            grant = grant.with_item_rule(item_rule);
        }
        if let Some(extra) = req.extra {
            grant = grant.with_extra(extra);
        }
        Ok(grant)
    }
}

/// 按范围筛选授权（资源被删除时的级联清理使用）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantScopeFilter {
    pub section: Option<String>,
    pub item: Option<String>,
    pub item_id: Option<i32>,
}

impl GrantScopeFilter {
    pub fn section(section: impl Into<String>) -> Self {
        Self {
            section: Some(section.into()),
            ..Self::default()
        }
    }

    pub fn instance(section: impl Into<String>, item: impl Into<String>, item_id: i32) -> Self {
        Self {
            section: Some(section.into()),
            item: Some(item.into()),
            item_id: Some(item_id),
        }
    }

    pub fn matches(&self, grant: &Grant) -> bool {
        self.section.as_ref().map_or(true, |s| *s == grant.section)
            && self
                .item
                .as_ref()
                .map_or(true, |i| grant.item.as_deref() == Some(i.as_str()))
            && self.item_id.map_or(true, |id| grant.item_id == Some(id))
    }
}

/// 请求授权的主体：用户本身及其持有的角色
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject {
    pub role_ids: Vec<RoleId>,
    pub user_id: Option<UserId>,
}

impl Subject {
    pub fn new(role_ids: Vec<RoleId>, user_id: Option<UserId>) -> Self {
        Self { role_ids, user_id }
    }

    pub fn user(user_id: UserId, role_ids: Vec<RoleId>) -> Self {
        Self {
            role_ids,
            user_id: Some(user_id),
        }
    }

    pub fn roles(role_ids: Vec<RoleId>) -> Self {
        Self {
            role_ids,
            user_id: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.role_ids.is_empty() && self.user_id.is_none()
    }
}

/// 一次权限查询：在 section 的 item（可选实例）上执行 action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    pub section: String,
    pub item: Option<String>,
    pub item_id: Option<i32>,
    pub action: String,
}

impl PermissionRequest {
    pub fn new(section: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            item: None,
            item_id: None,
            action: action.into(),
        }
    }

    pub fn item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    pub fn item_id(mut self, item_id: i32) -> Self {
        self.item_id = Some(item_id);
        self
    }
}

impl fmt::Display for PermissionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
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

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateGrantRequest {
        CreateGrantRequest {
            role_id: Some(RoleId(1)),
            user_id: None,
            section: "news".to_string(),
            item: Some("post".to_string()),
            item_id: None,
            rule_type: RuleType::Allow,
            item_rule: None,
            action: "see".to_string(),
            extra: None,
            active: true,
        }
    }

    #[test]
    fn test_owner_from_columns() {
        assert_eq!(
            GrantOwner::from_columns(Some(RoleId(3)), None).unwrap(),
            GrantOwner::Role(RoleId(3))
        );
        assert_eq!(
            GrantOwner::from_columns(None, Some(UserId(9))).unwrap(),
            GrantOwner::User(UserId(9))
        );
        assert!(matches!(
            GrantOwner::from_columns(Some(RoleId(3)), Some(UserId(9))),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            GrantOwner::from_columns(None, None),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_create_request_rejects_ambiguous_owner() {
        let mut req = request();
        req.user_id = Some(UserId(2));
        assert!(NewGrant::try_from(req).is_err());

        let mut req = request();
        req.role_id = None;
        assert!(NewGrant::try_from(req).is_err());
    }

    #[test]
    fn test_create_request_item_id_requires_item() {
        let mut req = request();
        req.item = None;
        req.item_id = Some(7);
        assert!(matches!(NewGrant::try_from(req), Err(AppError::Validation(_))));

        let mut req = request();
        req.item_id = Some(7);
        let grant = NewGrant::try_from(req).unwrap();
        assert_eq!(grant.item(), Some("post"));
        assert_eq!(grant.item_id(), Some(7));
    }

    #[test]
    fn test_specificity_order() {
        assert!(Specificity::Instance > Specificity::Item);
        assert!(Specificity::Item > Specificity::Section);
        assert_eq!(Specificity::of(Some("post"), Some(1)), Specificity::Instance);
        assert_eq!(Specificity::of(Some("post"), None), Specificity::Item);
        assert_eq!(Specificity::of(None, None), Specificity::Section);
    }

    #[test]
    fn test_grant_covers_request() {
        let grant = NewGrant::new(GrantOwner::Role(RoleId(1)), "forum", "reply")
            .on_item("topic")
            .into_grant(GrantId(1));

        assert!(grant.covers(&PermissionRequest::new("forum", "reply").item("topic").item_id(4)));
        assert!(grant.covers(&PermissionRequest::new("forum", "reply").item("topic")));
        assert!(!grant.covers(&PermissionRequest::new("forum", "reply").item("thread")));
        assert!(!grant.covers(&PermissionRequest::new("forum", "reply")));
        assert!(!grant.covers(&PermissionRequest::new("forum", "post").item("topic")));

        let section_wide =
            NewGrant::new(GrantOwner::Role(RoleId(1)), "forum", "reply").into_grant(GrantId(2));
        assert!(section_wide.covers(&PermissionRequest::new("forum", "reply")));
        assert!(section_wide.covers(&PermissionRequest::new("forum", "reply").item("x").item_id(1)));

        let inactive = NewGrant::new(GrantOwner::Role(RoleId(1)), "forum", "reply")
            .active(false)
            .into_grant(GrantId(3));
        assert!(!inactive.covers(&PermissionRequest::new("forum", "reply")));
    }

    #[test]
    fn test_rule_type_parse() {
        assert_eq!("allow".parse::<RuleType>().unwrap(), RuleType::Allow);
        assert_eq!(" DENY ".parse::<RuleType>().unwrap(), RuleType::Deny);
        assert!("maybe".parse::<RuleType>().is_err());
    }

    #[test]
    fn test_scope_filter() {
        let grant = NewGrant::new(GrantOwner::User(UserId(5)), "privateforum", "see")
            .on_instance("topic", 12)
            .into_grant(GrantId(8));
        assert!(GrantScopeFilter::instance("privateforum", "topic", 12).matches(&grant));
        assert!(!GrantScopeFilter::instance("privateforum", "topic", 13).matches(&grant));
        assert!(GrantScopeFilter::section("privateforum").matches(&grant));
        assert!(!GrantScopeFilter::section("forum").matches(&grant));
    }
}
