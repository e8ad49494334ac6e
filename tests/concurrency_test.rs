mod helpers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use helpers::fixtures::DENY_OVERRIDE_MODEL;
use helpers::{EnforcerBuilder, RBAC_MODEL};

/// Readers racing a writer never see a decision that no published state allows.
#[test]
fn test_readers_see_consistent_generations() {
    let e = EnforcerBuilder::new(RBAC_MODEL)
        .with_policy(&["admin", "data2", "write"])
        .build();
    let done = AtomicBool::new(false);

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    // bob is never linked to anything
                    assert!(!e.enforce(&["bob", "data2", "write"]).unwrap());
                    e.enforce(&["alice", "data2", "write"]).unwrap();
                }
            });
        }

        s.spawn(|| {
            for _ in 0..200 {
                e.add_role_for_user("alice", "admin", None).unwrap();
                e.delete_role_for_user("alice", "admin", None).unwrap();
            }
            done.store(true, Ordering::Release);
        });
    });

    assert!(!e.enforce(&["alice", "data2", "write"]).unwrap());
}

/// A grant and its revocation are published as one unit: a reader never sees
/// the allow rule without the matching deny once both were added together.
#[test]
fn test_batch_mutation_is_atomic_for_readers() {
    let e = EnforcerBuilder::new(DENY_OVERRIDE_MODEL).build();
    let done = AtomicBool::new(false);

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    assert!(!e.enforce(&["alice", "data1", "read"]).unwrap());
                }
            });
        }

        s.spawn(|| {
            for _ in 0..200 {
                e.add_policies(&[
                    vec!["alice", "data1", "read", "deny"],
                    vec!["alice", "data1", "read", "allow"],
                ])
                .unwrap();
                e.remove_filtered_policy(0, &["alice"]).unwrap();
            }
            done.store(true, Ordering::Release);
        });
    });
}

/// Concurrent writers on disjoint rules all land.
#[test]
fn test_concurrent_writers() {
    let e = Arc::new(EnforcerBuilder::new(RBAC_MODEL).build());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let e = Arc::clone(&e);
            std::thread::spawn(move || {
                for i in 0..50 {
                    let user = format!("user{t}-{i}");
                    e.add_policy(&[user.as_str(), "data1", "read"]).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(e.get_policy().len(), 400);
    assert!(e.enforce(&["user7-49", "data1", "read"]).unwrap());
}
