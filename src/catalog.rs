//! 权限目录
//! 代码内定义、只读；扩展目录是代码变更而不是数据变更

use crate::models::permission::{CatalogAction, CatalogItem, CatalogSection, PermissionDefinition};
use once_cell::sync::Lazy;

const fn def(
    section: &'static str,
    item: &'static str,
    action: &'static str,
    description: &'static str,
) -> PermissionDefinition {
    PermissionDefinition {
        section,
        item,
        action,
        description,
    }
}

static DEFINITIONS: Lazy<Vec<PermissionDefinition>> = Lazy::new(|| {
    vec![
        // forum
        def("forum", "category", "see", "List a forum category"),
        def("forum", "category", "view", "Open a forum category"),
        def("forum", "topic", "see", "List a forum topic"),
        def("forum", "topic", "view", "Read threads in a forum topic"),
        def("forum", "topic", "reply", "Reply to threads in a forum topic"),
        def("forum", "topic", "post", "Start threads in a forum topic"),
        def("forum", "topic", "edit", "Edit posts in a forum topic"),
        def("forum", "thread", "see", "List a forum thread"),
        def("forum", "thread", "view", "Read a forum thread"),
        def("forum", "thread", "reply", "Reply to a forum thread"),
        def("forum", "thread", "post", "Post to a forum thread"),
        def("forum", "thread", "edit", "Edit posts in a forum thread"),
        // privateforum
        def("privateforum", "topic", "see", "List a private topic"),
        def("privateforum", "topic", "view", "Read a private topic"),
        def("privateforum", "topic", "reply", "Reply in a private topic"),
        def("privateforum", "topic", "post", "Start a private topic"),
        def("privateforum", "topic", "edit", "Edit posts in a private topic"),
        def("privateforum", "topic", "label", "Label private topics"),
        // linker
        def("linker", "category", "see", "List a link category"),
        def("linker", "category", "view", "Open a link category"),
        def("linker", "link", "see", "List a link"),
        def("linker", "link", "view", "Open a link and its comments"),
        // images
        def("images", "upload", "see", "List uploaded images"),
        def("images", "upload", "view", "View uploaded images"),
        def("images", "upload", "post", "Upload images"),
        // imagebbs
        def("imagebbs", "board", "see", "List an image board"),
        def("imagebbs", "board", "view", "Open an image board"),
        def("imagebbs", "board", "post", "Post to an image board"),
        // news
        def("news", "post", "see", "List news posts"),
        def("news", "post", "view", "Read a news post"),
        def("news", "post", "reply", "Comment on a news post"),
        def("news", "post", "post", "Publish news posts"),
        def("news", "post", "edit", "Edit news posts"),
        def("news", "post", "label", "Label news posts"),
        // blogs
        def("blog", "category", "see", "List a blog category"),
        def("blog", "category", "view", "Open a blog category"),
        def("blog", "blog", "see", "List a blog entry"),
        def("blog", "blog", "view", "Read a blog entry"),
        def("blog", "blog", "post", "Write blog entries"),
        def("blog", "blog", "edit", "Edit blog entries"),
        // writings
        def("writings", "category", "see", "List a writing category"),
        def("writings", "category", "view", "Open a writing category"),
        def("writings", "writing", "see", "List a writing"),
        def("writings", "writing", "view", "Read a writing"),
        def("writings", "writing", "post", "Publish writings"),
        def("writings", "writing", "edit", "Edit writings"),
        // faq
        def("faq", "", "search", "Search the FAQ"),
        def("faq", "question/answer", "see", "Read FAQ answers"),
    ]
});

/// 全部目录项（定义顺序）
pub fn definitions() -> &'static [PermissionDefinition] {
    &DEFINITIONS
}

/// 某个 (section, item) 支持的动作；item 为 None 时查 section 级动作
pub fn actions_for(section: &str, item: Option<&str>) -> Vec<&'static str> {
    let item = item.unwrap_or("");
    DEFINITIONS
        .iter()
        .filter(|d| d.section == section && d.item == item)
        .map(|d| d.action)
        .collect()
}

/// (section, item) 组合是否在目录中
pub fn is_known_item(section: &str, item: Option<&str>) -> bool {
    let item = item.unwrap_or("");
    DEFINITIONS
        .iter()
        .any(|d| d.section == section && d.item == item)
}

/// (section, item, action) 三元组是否在目录中
pub fn is_known(section: &str, item: Option<&str>, action: &str) -> bool {
    let item = item.unwrap_or("");
    DEFINITIONS
        .iter()
        .any(|d| d.section == section && d.item == item && d.action == action)
}

/// 按 section → item → action 分组，保持定义顺序
pub fn grouped() -> Vec<CatalogSection> {
    let mut sections: Vec<CatalogSection> = Vec::new();
    for def in DEFINITIONS.iter() {
        let s_idx = match sections.iter().position(|s| s.section == def.section) {
            Some(idx) => idx,
            None => {
                sections.push(CatalogSection {
                    section: def.section,
                    items: Vec::new(),
                });
                sections.len() - 1
            }
        };
        let items = &mut sections[s_idx].items;
        let i_idx = match items.iter().position(|i| i.item == def.item) {
            Some(idx) => idx,
            None => {
                items.push(CatalogItem {
                    item: def.item,
                    actions: Vec::new(),
                });
                items.len() - 1
            }
        };
        items[i_idx].actions.push(CatalogAction {
            action: def.action,
            description: def.description,
        });
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_no_duplicate_definitions() {
        let mut seen = HashSet::new();
        for d in definitions() {
            assert!(
                seen.insert((d.section, d.item, d.action)),
                "duplicate catalog entry {}/{}/{}",
                d.section,
                d.item,
                d.action
            );
        }
    }

    #[test]
    fn test_actions_for_news_post() {
        let actions = actions_for("news", Some("post"));
        assert_eq!(actions, vec!["see", "view", "reply", "post", "edit", "label"]);
        assert!(actions_for("news", Some("nope")).is_empty());
    }

    #[test]
    fn test_section_level_actions() {
        assert_eq!(actions_for("faq", None), vec!["search"]);
        assert!(is_known("faq", None, "search"));
        assert!(is_known_item("faq", Some("question/answer")));
        assert!(!is_known("faq", Some("question/answer"), "search"));
    }

    #[test]
    fn test_grouped_preserves_all_definitions() {
        let grouped = grouped();
        let total: usize = grouped
            .iter()
            .flat_map(|s| s.items.iter())
            .map(|i| i.actions.len())
            .sum();
        assert_eq!(total, definitions().len());
        assert_eq!(grouped[0].section, "forum");
        assert_eq!(grouped[0].items[0].item, "category");
    }
}
