//! Overwrite and isolation conformance tests.

use std::future::Future;

use super::{make_binding, make_instance, TestResult};
use crate::record::{EntityMap, ServiceBinding, ServiceInstance};
use crate::{Collection, SnapshotStore};

pub(super) async fn run_isolation_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "isolation",
            "save_replaces_previous_document",
            save_replaces_previous_document(factory).await,
        ),
        TestResult::from_result(
            "isolation",
            "save_of_empty_map_clears_collection",
            save_of_empty_map_clears_collection(factory).await,
        ),
        TestResult::from_result(
            "isolation",
            "collections_are_independent",
            collections_are_independent(factory).await,
        ),
    ]
}

async fn save_replaces_previous_document<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut first: EntityMap<ServiceInstance> = EntityMap::new();
    first.insert("i1".to_string(), make_instance("i1"));
    first.insert("i2".to_string(), make_instance("i2"));
    store
        .save(Collection::Instances, &first)
        .await
        .map_err(|e| format!("first save failed: {}", e))?;

    let mut second: EntityMap<ServiceInstance> = EntityMap::new();
    second.insert("i3".to_string(), make_instance("i3"));
    store
        .save(Collection::Instances, &second)
        .await
        .map_err(|e| format!("second save failed: {}", e))?;

    let loaded: EntityMap<ServiceInstance> = store
        .load(Collection::Instances)
        .await
        .map_err(|e| format!("load failed: {}", e))?;
    let keys: Vec<&String> = loaded.keys().collect();
    if keys != vec!["i3"] {
        return Err(format!("expected only [i3] after overwrite, got {:?}", keys));
    }
    Ok(())
}

async fn save_of_empty_map_clears_collection<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut map: EntityMap<ServiceBinding> = EntityMap::new();
    map.insert("b1".to_string(), make_binding("b1", "i1"));
    store
        .save(Collection::Bindings, &map)
        .await
        .map_err(|e| format!("save failed: {}", e))?;

    map.clear();
    store
        .save(Collection::Bindings, &map)
        .await
        .map_err(|e| format!("save of empty map failed: {}", e))?;

    let loaded: EntityMap<ServiceBinding> = store
        .load(Collection::Bindings)
        .await
        .map_err(|e| format!("load failed: {}", e))?;
    if !loaded.is_empty() {
        return Err(format!("expected empty bindings, got {} entries", loaded.len()));
    }
    Ok(())
}

async fn collections_are_independent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut instances: EntityMap<ServiceInstance> = EntityMap::new();
    instances.insert("i1".to_string(), make_instance("i1"));
    store
        .save(Collection::Instances, &instances)
        .await
        .map_err(|e| format!("save failed: {}", e))?;

    let bindings: EntityMap<ServiceBinding> = store
        .load(Collection::Bindings)
        .await
        .map_err(|e| format!("load(bindings) failed: {}", e))?;
    if !bindings.is_empty() {
        return Err("saving instances leaked into bindings".to_string());
    }
    let credentials: EntityMap<serde_json::Value> = store
        .load(Collection::Credentials)
        .await
        .map_err(|e| format!("load(credentials) failed: {}", e))?;
    if !credentials.is_empty() {
        return Err("saving instances leaked into credentials".to_string());
    }
    Ok(())
}
