//! Integration tests for the durable fix memory

use std::sync::Arc;

use coordination::escalation::{FixOutcome, GenerationTier, ModelUsed};
use coordination::memory::{
    fingerprint, FixMemory, JsonFileFixMemory, DEFAULT_RETRIEVAL_LIMIT,
};
use coordination::trace::{parse_structure, ErrorDescription};

fn error(ty: &str, file: &str, msg: &str) -> ErrorDescription {
    parse_structure(&format!(
        "Traceback (most recent call last):\n  File \"{file}\", line 3, in handler\n{ty}: {msg}"
    ))
    .unwrap()
}

fn validated(code: &str) -> FixOutcome {
    let mut outcome = FixOutcome::success(ModelUsed::from(GenerationTier::Cheap), 0.0002);
    outcome.fixed_code = Some(code.to_string());
    outcome.fix_strategy = Some(format!("rewrite to {code}"));
    outcome
}

/// Test: strategies survive closing and reopening the store
#[tokio::test]
async fn test_json_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/memory.json");
    let err = error("KeyError", "api/users.py", "'id'");

    {
        let memory = JsonFileFixMemory::open(&path).unwrap();
        memory.store(&err, &validated("v1")).await.unwrap();
        memory.store(&err, &validated("v2")).await.unwrap();
    }
    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());

    let reopened = JsonFileFixMemory::open(&path).unwrap();
    let found = reopened.retrieve_similar(&err).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].fingerprint, fingerprint(&err));
    assert_eq!(found[0].success_count, 2);
    assert_eq!(found[0].replacement.as_deref(), Some("v2"));
    assert_eq!(found[0].description, "rewrite to v2");
}

/// Test: lookups never cross error categories and are capped
#[tokio::test]
async fn test_retrieval_filters_and_caps() {
    let dir = tempfile::tempdir().unwrap();
    let memory = JsonFileFixMemory::open(dir.path().join("memory.json")).unwrap();

    for i in 0..8 {
        let err = error("ValueError", &format!("svc/m{i}.py"), "bad literal");
        memory.store(&err, &validated("ok")).await.unwrap();
    }
    memory
        .store(&error("KeyError", "svc/m0.py", "'x'"), &validated("ok"))
        .await
        .unwrap();

    let probe = error("ValueError", "svc/new.py", "bad literal");
    let found = memory.retrieve_similar(&probe).await.unwrap();
    assert_eq!(found.len(), DEFAULT_RETRIEVAL_LIMIT);
    assert!(found.iter().all(|s| s.error_type == "ValueError"));

    let none = memory
        .retrieve_similar(&error("TypeError", "svc/m0.py", "nope"))
        .await
        .unwrap();
    assert!(none.is_empty());
}

/// Test: concurrent stores from several sessions all land
#[tokio::test]
async fn test_concurrent_stores() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.json");
    let memory = Arc::new(JsonFileFixMemory::open(&path).unwrap());

    let mut handles = Vec::new();
    for i in 0..6 {
        let memory = memory.clone();
        handles.push(tokio::spawn(async move {
            let err = error("IndexError", &format!("jobs/j{i}.py"), "out of range");
            memory.store(&err, &validated("fixed")).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(memory.len(), 6);
    assert_eq!(JsonFileFixMemory::open(&path).unwrap().len(), 6);
}
