mod helpers;

use helpers::{write_fixture, TestDb, RBAC_MODEL, RBAC_POLICY};
use warden::authz::{Adapter, AuthzError, Enforcer, FileAdapter, Model, PolicyRule, RuleSet};

fn rbac_model() -> Model {
    Model::parse(RBAC_MODEL).expect("Failed to parse model")
}

#[tokio::test]
async fn test_file_adapter_loads_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "policy.csv", RBAC_POLICY);

    let e = Enforcer::with_adapter(rbac_model(), FileAdapter::new(path))
        .await
        .unwrap();

    assert!(e.enforce(&["alice", "data2", "write"]).unwrap());
    assert!(e.enforce(&["alice", "data1", "read"]).unwrap());
    assert!(!e.enforce(&["bob", "data1", "read"]).unwrap());
}

#[tokio::test]
async fn test_file_save_then_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "policy.csv", RBAC_POLICY);

    let e = Enforcer::with_adapter(rbac_model(), FileAdapter::new(path.clone()))
        .await
        .unwrap();
    e.remove_policy(&["alice", "data1", "read"]).unwrap();
    e.add_role_for_user("bob", "admin", None).unwrap();
    e.save_policy().await.unwrap();

    let reloaded = Enforcer::with_adapter(rbac_model(), FileAdapter::new(path))
        .await
        .unwrap();
    assert!(!reloaded.enforce(&["alice", "data1", "read"]).unwrap());
    assert!(reloaded.enforce(&["bob", "data2", "write"]).unwrap());
    assert_eq!(reloaded.rules(), e.rules());
}

#[tokio::test]
async fn test_failed_load_leaves_state_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "policy.csv", RBAC_POLICY);

    let e = Enforcer::with_adapter(rbac_model(), FileAdapter::new(path.clone()))
        .await
        .unwrap();
    let before = e.rules();

    // Second row has the wrong arity for `p`.
    std::fs::write(&path, "p, bob, data1, read\np, bob, data1\n").unwrap();
    let err = e.load_policy().await.unwrap_err();
    assert!(matches!(err, AuthzError::RuleArity { .. }));
    assert_eq!(e.rules(), before);
    assert!(!e.enforce(&["bob", "data1", "read"]).unwrap());

    std::fs::remove_file(&path).unwrap();
    let err = e.load_policy().await.unwrap_err();
    assert!(matches!(err, AuthzError::Storage { .. }));
    assert_eq!(e.rules(), before);
    assert!(e.enforce(&["alice", "data2", "write"]).unwrap());
}

#[tokio::test]
async fn test_load_replaces_rather_than_merges() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "policy.csv", RBAC_POLICY);

    let e = Enforcer::with_adapter(rbac_model(), FileAdapter::new(path.clone()))
        .await
        .unwrap();
    e.add_policy(&["carol", "data3", "read"]).unwrap();

    std::fs::write(&path, "p, dave, data4, read\n").unwrap();
    e.load_policy().await.unwrap();

    assert_eq!(e.get_policy(), vec![vec!["dave", "data4", "read"]]);
    assert!(e.get_grouping_policy().is_empty());
    assert!(!e.enforce(&["alice", "data2", "write"]).unwrap());
}

#[tokio::test]
async fn test_db_adapter_round_trip() {
    let db = TestDb::new().await;

    let e = Enforcer::with_adapter(rbac_model(), db.adapter())
        .await
        .unwrap();
    assert!(e.rules().is_empty());

    e.add_policy(&["admin", "data2", "write"]).unwrap();
    e.add_policy(&["alice", "data1", "read"]).unwrap();
    e.add_role_for_user("alice", "admin", None).unwrap();
    e.save_policy().await.unwrap();

    let reloaded = Enforcer::with_adapter(rbac_model(), db.adapter())
        .await
        .unwrap();
    assert!(reloaded.enforce(&["alice", "data2", "write"]).unwrap());
    assert_eq!(
        reloaded.get_policy(),
        vec![vec!["admin", "data2", "write"], vec!["alice", "data1", "read"]]
    );
}

#[tokio::test]
async fn test_db_save_replaces_table() {
    let db = TestDb::new().await;
    let adapter = db.adapter();

    let first: RuleSet = vec![
        PolicyRule::new("p", ["alice", "data1", "read"]),
        PolicyRule::new("g", ["alice", "admin"]),
    ]
    .into_iter()
    .collect();
    adapter.save_policy(&first).await.unwrap();

    let second: RuleSet = vec![PolicyRule::new("p", ["bob", "data2", "write"])]
        .into_iter()
        .collect();
    adapter.save_policy(&second).await.unwrap();

    assert_eq!(adapter.load_policy().await.unwrap(), second);
}

#[tokio::test]
async fn test_file_to_db_migration() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "policy.csv", RBAC_POLICY);
    let db = TestDb::new().await;

    let rules = FileAdapter::new(path).load_policy().await.unwrap();
    db.adapter().save_policy(&rules).await.unwrap();

    let e = Enforcer::with_adapter(rbac_model(), db.adapter())
        .await
        .unwrap();
    assert_eq!(e.rules(), rules);
    assert!(e.enforce(&["alice", "data2", "write"]).unwrap());
}

#[tokio::test]
async fn test_db_saves_large_rule_sets() {
    let db = TestDb::new().await;
    let adapter = db.adapter();

    let mut rules: RuleSet = (0..6000)
        .map(|i| PolicyRule::new("p", [format!("user{i}"), format!("data{}", i % 50), "read".into()]))
        .collect();
    rules.push(PolicyRule::new("g", ["user1", "admin"]));
    adapter.save_policy(&rules).await.unwrap();

    let loaded = adapter.load_policy().await.unwrap();
    assert_eq!(loaded.len(), 6001);
    assert_eq!(loaded, rules);

    let e = Enforcer::with_adapter(rbac_model(), db.adapter())
        .await
        .unwrap();
    assert!(e.enforce(&["user5999", "data49", "read"]).unwrap());
}

#[tokio::test]
async fn test_db_failed_save_keeps_table() {
    let db = TestDb::new().await;
    let adapter = db.adapter();

    let saved: RuleSet = vec![
        PolicyRule::new("p", ["alice", "data1", "read"]),
        PolicyRule::new("g", ["alice", "admin"]),
    ]
    .into_iter()
    .collect();
    adapter.save_policy(&saved).await.unwrap();

    let too_wide: RuleSet = vec![
        PolicyRule::new("p", ["bob", "data2", "write"]),
        PolicyRule::new("p", ["a", "b", "c", "d", "e", "f", "g"]),
    ]
    .into_iter()
    .collect();
    let err = adapter.save_policy(&too_wide).await.unwrap_err();
    assert!(matches!(err, AuthzError::MalformedRow { row: 2, .. }));

    assert_eq!(adapter.load_policy().await.unwrap(), saved);
}

#[tokio::test]
async fn test_file_failed_save_keeps_durable_rules() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "policy.csv", RBAC_POLICY);

    let e = Enforcer::with_adapter(rbac_model(), FileAdapter::new(path.clone()))
        .await
        .unwrap();
    e.add_policy(&["carol", "data3", "read"]).unwrap();

    // A non-empty directory at the target makes the final rename fail.
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("keep"), "old").unwrap();

    let err = e.save_policy().await.unwrap_err();
    assert!(matches!(err, AuthzError::Storage { .. }));
    assert_eq!(std::fs::read_to_string(path.join("keep")).unwrap(), "old");
    assert!(e.has_policy(&["carol", "data3", "read"]));
}
