mod helpers;

use std::path::PathBuf;

use warden::authz::{Enforcer, FileAdapter, Model};

fn shipped(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config").join(name)
}

#[tokio::test]
async fn test_shipped_model_and_policy() {
    let model = Model::from_file(&shipped("model.conf")).expect("Failed to load model");
    let e = Enforcer::with_adapter(model, FileAdapter::new(shipped("policy.csv")))
        .await
        .expect("Failed to load policy");

    assert!(e.enforce(&["zhangsan", "/index", "GET"]).unwrap());
    assert!(!e.enforce(&["zhangsan1", "/index", "GET"]).unwrap());
    assert!(e.enforce(&["zhangsan", "/users/7", "GET"]).unwrap());
    assert!(!e.enforce(&["zhangsan", "/admin/users", "GET"]).unwrap());

    // root -> admin -> member
    assert!(e.enforce(&["root", "/admin/users", "POST"]).unwrap());
    assert!(e.enforce(&["root", "/index", "GET"]).unwrap());
    assert_eq!(
        e.get_implicit_roles_for_user("root", None),
        vec!["admin", "member"]
    );
}
