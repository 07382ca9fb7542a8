//! Permission catalog entry

use serde::Serialize;

/// 系统可识别的一个 (section, item, action) 组合
///
/// item 为空字符串表示 section 级动作（例如 faq 的 search）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PermissionDefinition {
    pub section: &'static str,
    pub item: &'static str,
    pub action: &'static str,
    pub description: &'static str,
}

/// 按 section / item 分组后的目录（list-available 的 JSON 输出）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogSection {
    pub section: &'static str,
    pub items: Vec<CatalogItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogItem {
    pub item: &'static str,
    pub actions: Vec<CatalogAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogAction {
    pub action: &'static str,
    pub description: &'static str,
}
