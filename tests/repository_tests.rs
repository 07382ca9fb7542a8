//! 仓库层测试（需要 PostgreSQL，设置 TEST_DATABASE_URL 后用 --ignored 运行）

use serial_test::serial;
use site_authz::{
    models::grant::{GrantOwner, GrantScopeFilter, NewGrant, Subject},
    models::role::{CreateRoleRequest, RoleFlags, UpdateRoleRequest, UserId, UserRole},
    repository::{AuthzStore, GrantStore, PostgresStore, RoleStore, StoreTx},
    services::{PermissionService, TemplateService},
};
use std::sync::Arc;

mod common;
use common::{builtin_scenarios, create_test_config, create_test_role, grant_role, request, role_owner};

async fn store() -> PostgresStore {
    let config = create_test_config();
    let pool = common::setup_test_db(&config).await;
    PostgresStore::new(pool)
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_role_create_and_find() {
    let store = store().await;

    let role = create_test_role(&store, "moderator", true).await;
    assert!(role.can_login);
    assert!(role.public_profile_allowed_at.is_some());

    let by_name = store.find_role_by_name("moderator").await.unwrap().unwrap();
    assert_eq!(by_name.id, role.id);
    let by_id = store.find_role_by_id(role.id).await.unwrap().unwrap();
    assert_eq!(by_id.name, "moderator");
    assert!(store.find_role_by_name("nobody").await.unwrap().is_none());

    // 名称唯一
    assert!(store
        .create_role(&CreateRoleRequest::named("moderator"))
        .await
        .is_err());
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_role_update_and_assignment() {
    let store = store().await;
    let role = create_test_role(&store, "writer", false).await;

    let updated = store
        .update_role(
            role.id,
            &UpdateRoleRequest {
                name: None,
                can_login: Some(true),
                is_admin: None,
                private_labels: None,
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(updated.can_login);
    assert_eq!(updated.name, "writer");

    assert!(store.assign_role(UserId(3), role.id).await.unwrap());
    assert!(!store.assign_role(UserId(3), role.id).await.unwrap());
    assert_eq!(store.users_for_role(role.id).await.unwrap(), vec![UserId(3)]);
    assert_eq!(store.roles_for_user(UserId(3)).await.unwrap().len(), 1);
    assert_eq!(
        store.list_user_roles().await.unwrap(),
        vec![UserRole {
            user_id: UserId(3),
            role_id: role.id,
        }]
    );

    assert!(store.revoke_role(UserId(3), role.id).await.unwrap());
    assert!(store.roles_for_user(UserId(3)).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_grant_create_and_matching() {
    let store = store().await;
    let role = create_test_role(&store, "user", true).await;
    let section = grant_role(&store, NewGrant::new(role_owner(&role), "forum", "see")).await;
    let item = grant_role(&store, NewGrant::new(role_owner(&role), "forum", "see").on_item("topic")).await;
    let instance = grant_role(
        &store,
        NewGrant::new(role_owner(&role), "forum", "see").on_instance("topic", 4),
    )
    .await;
    grant_role(
        &store,
        NewGrant::new(role_owner(&role), "forum", "see").on_instance("topic", 5),
    )
    .await;
    grant_role(&store, NewGrant::new(role_owner(&role), "forum", "edit").on_item("topic")).await;
    grant_role(&store, NewGrant::new(GrantOwner::User(UserId(8)), "forum", "see").on_item("topic")).await;

    let found = store.find_grant(item).await.unwrap().unwrap();
    assert_eq!(found.owner, role_owner(&role));
    assert_eq!(found.item.as_deref(), Some("topic"));

    let subject = Subject::roles(vec![role.id]);
    let matches = store
        .matching_grants(&subject, &request("forum", Some("topic"), Some(4), "see"))
        .await
        .unwrap();
    let mut ids: Vec<_> = matches.iter().map(|g| g.id).collect();
    ids.sort();
    assert_eq!(ids, vec![section, item, instance]);

    let user_subject = Subject::user(UserId(8), vec![]);
    let matches = store
        .matching_grants(&user_subject, &request("forum", Some("topic"), None, "see"))
        .await
        .unwrap();
    assert_eq!(matches.len(), 1);

    assert!(store.set_grant_active(instance, false).await.unwrap());
    let matches = store
        .matching_grants(&subject, &request("forum", Some("topic"), Some(4), "see"))
        .await
        .unwrap();
    assert_eq!(matches.len(), 2);
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_grant_scope_and_property_deletes() {
    let store = store().await;
    let role = create_test_role(&store, "editor", true).await;
    grant_role(&store, NewGrant::new(role_owner(&role), "news", "edit").on_item("post")).await;
    grant_role(&store, NewGrant::new(role_owner(&role), "news", "edit").on_instance("post", 2)).await;
    grant_role(&store, NewGrant::new(role_owner(&role), "news", "edit")).await;

    let scoped = store
        .list_grants_by_scope(&GrantScopeFilter::instance("news", "post", 2))
        .await
        .unwrap();
    assert_eq!(scoped.len(), 1);

    let deleted = store
        .delete_grants_by_properties(role.id, "news", None, "edit")
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    let deleted = store
        .delete_grants_by_properties(role.id, "news", Some("post"), "edit")
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    assert!(store.list_grants_by_role(role.id).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_transaction_rolls_back_on_drop() {
    let store = store().await;
    let role = create_test_role(&store, "guest", false).await;

    {
        let mut tx = store.begin().await.unwrap();
        tx.update_role_flags(
            role.id,
            RoleFlags {
                can_login: true,
                is_admin: true,
                private_labels: true,
            },
        )
        .await
        .unwrap();
        tx.insert_grant(&NewGrant::new(role_owner(&role), "news", "see")).await.unwrap();
        assert_eq!(tx.list_grants_by_role(role.id).await.unwrap().len(), 1);
    }

    let role = store.find_role_by_id(role.id).await.unwrap().unwrap();
    assert!(!role.is_admin);
    assert!(store.list_grants_by_role(role.id).await.unwrap().is_empty());

    let mut tx = store.begin().await.unwrap();
    tx.insert_grant(&NewGrant::new(role_owner(&role), "news", "see")).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(store.list_grants_by_role(role.id).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_apply_default_against_postgres() {
    let store: Arc<dyn AuthzStore> = Arc::new(store().await);
    let templates = TemplateService::new(store.clone(), builtin_scenarios());

    templates.apply("default").await.unwrap();
    templates.apply("default").await.unwrap();
    assert!(templates
        .diff("default")
        .await
        .unwrap()
        .iter()
        .all(|d| d.is_empty()));

    let admin = store.find_role_by_name("admin").await.unwrap().unwrap();
    let permissions = PermissionService::new(store);
    assert!(
        permissions
            .has_permission(
                &Subject::roles(vec![admin.id]),
                &request("privateforum", Some("topic"), Some(1), "post"),
            )
            .await
    );
}
