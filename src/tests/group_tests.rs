use super::{create_test_service, equal_expense, setup_group, sign_in};
use crate::constants::{GROUP_CREATED, MEMBER_ADDED};
use crate::core::errors::LedgerError;
use crate::core::models::group::Role;
use rust_decimal::Decimal;

#[tokio::test]
async fn test_create_group_makes_creator_admin() {
    let service = create_test_service();
    let group = setup_group(&service, &["A", "B"]).await;

    assert_eq!(group.members.len(), 2);
    assert!(group.is_active_admin("A"));
    assert!(group.is_active_member("B"));
    assert!(!group.is_active_admin("B"));
    assert_eq!(group.currency, "THB");

    let audits = service.get_group_audits(&group.id, "B").await.unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].action, GROUP_CREATED);
}

#[tokio::test]
async fn test_create_group_rejects_unknown_members() {
    let service = create_test_service();
    sign_in(&service, "A").await;
    let err = service
        .create_group("Trip".to_string(), "THB".to_string(), vec!["ghost".to_string()], "A")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::UserNotFound(_)));
}

#[tokio::test]
async fn test_only_admin_adds_members() {
    let service = create_test_service();
    let group = setup_group(&service, &["A", "B"]).await;
    sign_in(&service, "C").await;

    let err = service.add_member(&group.id, "C", "B").await.unwrap_err();
    assert!(matches!(err, LedgerError::NotGroupAdmin(_)));

    let group = service.add_member(&group.id, "C", "A").await.unwrap();
    assert!(group.is_active_member("C"));
    let err = service.add_member(&group.id, "C", "A").await.unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyGroupMember(_)));

    let audits = service.get_group_audits(&group.id, "A").await.unwrap();
    assert_eq!(audits.last().unwrap().action, MEMBER_ADDED);
}

#[tokio::test]
async fn test_last_active_admin_cannot_leave_or_be_demoted() {
    let service = create_test_service();
    let group = setup_group(&service, &["A", "B"]).await;

    let err = service.remove_member(&group.id, "A", "A").await.unwrap_err();
    assert!(matches!(err, LedgerError::LastActiveAdmin(_)));
    let err = service.change_role(&group.id, "A", Role::Member, "A").await.unwrap_err();
    assert!(matches!(err, LedgerError::LastActiveAdmin(_)));

    service.change_role(&group.id, "B", Role::Admin, "A").await.unwrap();
    let group = service.change_role(&group.id, "A", Role::Member, "A").await.unwrap();
    assert_eq!(group.active_admin_count(), 1);
    assert!(group.is_active_admin("B"));
}

#[tokio::test]
async fn test_member_may_leave_but_not_remove_others() {
    let service = create_test_service();
    let group = setup_group(&service, &["A", "B", "C"]).await;

    let err = service.remove_member(&group.id, "C", "B").await.unwrap_err();
    assert!(matches!(err, LedgerError::NotGroupAdmin(_)));

    let group = service.remove_member(&group.id, "B", "B").await.unwrap();
    assert!(!group.is_active_member("B"));
    // Membership is deactivated, not dropped
    assert!(group.member("B").is_some());
    assert!(service.list_groups("B").await.unwrap().is_empty());

    let group = service.add_member(&group.id, "B", "A").await.unwrap();
    assert!(group.is_active_member("B"));
    assert_eq!(group.members.len(), 3);
}

#[tokio::test]
async fn test_deactivated_group_rejects_expenses() {
    let service = create_test_service();
    let group = setup_group(&service, &["A", "B"]).await;

    let err = service.deactivate_group(&group.id, "B").await.unwrap_err();
    assert!(matches!(err, LedgerError::NotGroupAdmin(_)));
    service.deactivate_group(&group.id, "A").await.unwrap();

    let err = service
        .create_expense(equal_expense(&group, "taxi", Decimal::from(100), &["A", "B"]), "A")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::GroupInactive(_)));
    // Reads keep working
    assert!(service.get_group(&group.id, "B").await.is_ok());
}

#[tokio::test]
async fn test_non_member_cannot_read_group() {
    let service = create_test_service();
    let group = setup_group(&service, &["A", "B"]).await;
    sign_in(&service, "X").await;
    let err = service.get_group(&group.id, "X").await.unwrap_err();
    assert!(matches!(err, LedgerError::NotGroupMember(_)));
    let err = service.get_group("missing", "A").await.unwrap_err();
    assert!(matches!(err, LedgerError::GroupNotFound(_)));
}
