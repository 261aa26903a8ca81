use super::{FlakyService, FlakyStorage, create_test_service, equal_expense, flaky_service, pay_equal, setup_group};
use crate::auth::jwt::IdentityProfile;
use crate::core::balances::BalanceAggregator;
use crate::core::errors::LedgerError;
use crate::core::models::group::Group;
use crate::infrastructure::storage::in_memory::InMemoryStorage;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

async fn flaky_group(service: &FlakyService, name: &str, amount: i64) -> Group {
    let group = service
        .create_group(name.to_string(), "THB".to_string(), vec!["B".to_string()], "A")
        .await
        .unwrap();
    service
        .create_expense(equal_expense(&group, name, Decimal::from(amount), &["A", "B"]), "A")
        .await
        .unwrap();
    group
}

#[tokio::test]
async fn test_user_summary_across_groups() {
    let service = create_test_service();
    let trip = setup_group(&service, &["A", "B", "C"]).await;
    let flat = setup_group(&service, &["B", "A"]).await;
    pay_equal(&service, &trip, "A", 300, &["A", "B", "C"]).await;
    pay_equal(&service, &flat, "B", 100, &["A", "B"]).await;

    let summary = service.user_summary("A").await.unwrap();
    assert_eq!(summary.total_owed, Decimal::from(200));
    assert_eq!(summary.total_owing, Decimal::from(50));
    assert_eq!(summary.net, Decimal::from(150));
    assert_eq!(summary.groups.len(), 2);
    assert!(summary.incomplete_groups.is_empty());

    // Cross-group amounts are never netted into a single debt
    assert_eq!(service.net_balance("A", Some(&trip.id)).await.unwrap(), Decimal::from(200));
    assert_eq!(service.net_balance("A", Some(&flat.id)).await.unwrap(), Decimal::from(-50));
}

#[tokio::test]
async fn test_user_summary_skips_unreadable_group() {
    let storage = FlakyStorage::new();
    let service = flaky_service(storage.clone());
    for user in ["A", "B"] {
        service
            .sync_user(IdentityProfile {
                stable_user_id: user.to_string(),
                display_name: user.to_string(),
                avatar_url: None,
            })
            .await
            .unwrap();
    }
    let healthy = flaky_group(&service, "Healthy", 100).await;
    let broken = flaky_group(&service, "Broken", 400).await;
    storage.fail_group(&broken.id);

    let summary = service.user_summary("A").await.unwrap();
    assert_eq!(summary.incomplete_groups, vec![broken.id.clone()]);
    assert_eq!(summary.groups.len(), 1);
    assert_eq!(summary.groups[0].group_id, healthy.id);
    assert_eq!(summary.total_owed, Decimal::from(50));
    assert_eq!(summary.net, Decimal::from(50));

    let err = service.group_summary(&broken.id, "A").await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_group_summary_lists_every_active_member() {
    let service = create_test_service();
    let group = setup_group(&service, &["A", "B", "C"]).await;
    pay_equal(&service, &group, "A", 200, &["A", "B"]).await;

    let summary = service.group_summary(&group.id, "C").await.unwrap();
    let ids: Vec<&str> = summary.members.iter().map(|m| m.user_id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
    assert_eq!(summary.members[0].net, Decimal::from(100));
    assert_eq!(summary.members[1].net, Decimal::from(-100));
    assert_eq!(summary.members[2].net, Decimal::ZERO);
    assert_eq!(summary.members.iter().map(|m| m.net).sum::<Decimal>(), Decimal::ZERO);
}

#[tokio::test]
async fn test_group_summary_requires_membership() {
    let service = create_test_service();
    let group = setup_group(&service, &["A", "B"]).await;
    super::sign_in(&service, "Z").await;
    let err = service.group_summary(&group.id, "Z").await.unwrap_err();
    assert!(matches!(err, LedgerError::NotGroupMember(_)));
}

#[tokio::test]
async fn test_overdue_needs_a_scope() {
    let aggregator = BalanceAggregator::new(Arc::new(InMemoryStorage::new()));
    let err = aggregator.overdue_debts(None, None, Utc::now()).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(ref field, _) if field == "scope"));
}
