//! 用户角色同步集成测试

use site_authz::{
    error::AppError,
    models::role::{Role, UpdateRoleRequest, UserId},
    repository::{MemoryStore, RoleStore},
    services::template_service::UserRoleChange,
    services::TemplateService,
};
use std::sync::Arc;

mod common;
use common::{builtin_scenarios, create_test_role};

async fn make_admin(store: &MemoryStore, role: &Role) {
    store
        .update_role(
            role.id,
            &UpdateRoleRequest {
                is_admin: Some(true),
                ..UpdateRoleRequest::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
}

async fn role_names(store: &MemoryStore, user_id: UserId) -> Vec<String> {
    let mut names: Vec<String> = store
        .roles_for_user(user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    names.sort();
    names
}

fn change(user_id: i32, add: &[&str], remove: &[&str]) -> UserRoleChange {
    UserRoleChange {
        user_id: UserId(user_id),
        add: add.iter().map(ToString::to_string).collect(),
        remove: remove.iter().map(ToString::to_string).collect(),
    }
}

/// 应用 default 后再加入三个模板外角色，并分配给用户 1..=5
async fn seeded_store(template: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    TemplateService::new(store.clone(), builtin_scenarios())
        .apply(template)
        .await
        .unwrap();

    let moderator = create_test_role(store.as_ref(), "moderator", true).await;
    let visitor = create_test_role(store.as_ref(), "visitor", false).await;
    let superuser = create_test_role(store.as_ref(), "superuser", true).await;
    make_admin(&store, &superuser).await;
    let user = store.find_role_by_name("user").await.unwrap().unwrap();

    store.assign_role(UserId(1), moderator.id).await.unwrap();
    store.assign_role(UserId(2), user.id).await.unwrap();
    store.assign_role(UserId(3), superuser.id).await.unwrap();
    store.assign_role(UserId(4), visitor.id).await.unwrap();
    store.assign_role(UserId(5), user.id).await.unwrap();
    store.assign_role(UserId(5), moderator.id).await.unwrap();
    store
}

#[tokio::test]
async fn test_sync_maps_roles_by_flags() {
    let store = seeded_store("default").await;
    let templates = TemplateService::new(store.clone(), builtin_scenarios());

    let report = templates.sync_user_roles("default", false).await.unwrap();
    assert_eq!(report.scenario, "default");
    assert!(!report.dry_run);
    assert_eq!(
        report.changes,
        vec![
            change(1, &["user"], &["moderator"]),
            change(3, &["admin"], &["superuser"]),
            change(4, &["guest"], &["visitor"]),
            change(5, &[], &["moderator"]),
        ]
    );

    assert_eq!(role_names(&store, UserId(1)).await, vec!["user"]);
    assert_eq!(role_names(&store, UserId(2)).await, vec!["user"]);
    assert_eq!(role_names(&store, UserId(3)).await, vec!["admin"]);
    assert_eq!(role_names(&store, UserId(4)).await, vec!["guest"]);
    assert_eq!(role_names(&store, UserId(5)).await, vec!["user"]);

    // 第二次同步没有变化
    let again = templates.sync_user_roles("default", false).await.unwrap();
    assert!(again.changes.is_empty());
}

#[tokio::test]
async fn test_sync_drops_roles_with_ambiguous_target() {
    let store = seeded_store("simple-community").await;
    let templates = TemplateService::new(store.clone(), builtin_scenarios());

    let report = templates
        .sync_user_roles("simple-community", false)
        .await
        .unwrap();

    // guest 与 image-uploader 都是非登录角色，visitor 无法映射
    let visitor = report
        .changes
        .iter()
        .find(|c| c.user_id == UserId(4))
        .unwrap();
    assert!(visitor.add.is_empty());
    assert_eq!(visitor.remove, vec!["visitor"]);
    assert!(role_names(&store, UserId(4)).await.is_empty());

    assert_eq!(role_names(&store, UserId(1)).await, vec!["user"]);
}

#[tokio::test]
async fn test_sync_dry_run_leaves_assignments() {
    let store = seeded_store("default").await;
    let templates = TemplateService::new(store.clone(), builtin_scenarios());

    let report = templates.sync_user_roles("default", true).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.changes.len(), 4);

    assert_eq!(role_names(&store, UserId(1)).await, vec!["moderator"]);
    assert_eq!(role_names(&store, UserId(5)).await, vec!["moderator", "user"]);
    assert_eq!(store.list_user_roles().await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_sync_requires_template_roles() {
    let store = Arc::new(MemoryStore::new());
    create_test_role(store.as_ref(), "guest", false).await;
    let templates = TemplateService::new(store, builtin_scenarios());

    assert!(matches!(
        templates.sync_user_roles("default", false).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        templates.sync_user_roles("nope", true).await,
        Err(AppError::NotFound(_))
    ));
}
