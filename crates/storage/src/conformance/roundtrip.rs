//! Round-trip conformance tests.
//!
//! Verifies that what is saved is exactly what is loaded, and that an absent
//! document is the empty map rather than an error.

use std::future::Future;

use super::{make_binding, make_credential, make_instance, TestResult};
use crate::record::{Credential, EntityMap, ServiceBinding, ServiceInstance};
use crate::{Collection, SnapshotStore};

pub(super) async fn run_roundtrip_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "roundtrip",
            "missing_collection_loads_empty",
            missing_collection_loads_empty(factory).await,
        ),
        TestResult::from_result(
            "roundtrip",
            "empty_map_roundtrips",
            empty_map_roundtrips(factory).await,
        ),
        TestResult::from_result(
            "roundtrip",
            "instances_roundtrip",
            instances_roundtrip(factory).await,
        ),
        TestResult::from_result(
            "roundtrip",
            "bindings_roundtrip",
            bindings_roundtrip(factory).await,
        ),
        TestResult::from_result(
            "roundtrip",
            "credentials_roundtrip",
            credentials_roundtrip(factory).await,
        ),
    ]
}

async fn missing_collection_loads_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    for collection in Collection::ALL {
        let map: EntityMap<serde_json::Value> = store
            .load(collection)
            .await
            .map_err(|e| format!("load({}) on fresh store failed: {}", collection, e))?;
        if !map.is_empty() {
            return Err(format!(
                "load({}) on fresh store returned {} entries",
                collection,
                map.len()
            ));
        }
    }
    Ok(())
}

async fn empty_map_roundtrips<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let empty: EntityMap<ServiceInstance> = EntityMap::new();
    store
        .save(Collection::Instances, &empty)
        .await
        .map_err(|e| format!("save failed: {}", e))?;
    let loaded: EntityMap<ServiceInstance> = store
        .load(Collection::Instances)
        .await
        .map_err(|e| format!("load failed: {}", e))?;
    if loaded != empty {
        return Err(format!("expected empty map, got {} entries", loaded.len()));
    }
    Ok(())
}

async fn instances_roundtrip<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut map: EntityMap<ServiceInstance> = EntityMap::new();
    for id in ["i1", "i2", "i3"] {
        map.insert(id.to_string(), make_instance(id));
    }
    store
        .save(Collection::Instances, &map)
        .await
        .map_err(|e| format!("save failed: {}", e))?;
    let loaded: EntityMap<ServiceInstance> = store
        .load(Collection::Instances)
        .await
        .map_err(|e| format!("load failed: {}", e))?;
    if loaded != map {
        return Err(format!("loaded map differs: {:?}", loaded.keys()));
    }
    Ok(())
}

async fn bindings_roundtrip<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut map: EntityMap<ServiceBinding> = EntityMap::new();
    map.insert("b1".to_string(), make_binding("b1", "i1"));
    map.insert("b2".to_string(), make_binding("b2", "i1"));
    store
        .save(Collection::Bindings, &map)
        .await
        .map_err(|e| format!("save failed: {}", e))?;
    let loaded: EntityMap<ServiceBinding> = store
        .load(Collection::Bindings)
        .await
        .map_err(|e| format!("load failed: {}", e))?;
    if loaded != map {
        return Err(format!("loaded map differs: {:?}", loaded));
    }
    Ok(())
}

async fn credentials_roundtrip<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: SnapshotStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut map: EntityMap<Credential> = EntityMap::new();
    map.insert("i1".to_string(), make_credential("DB_one"));
    store
        .save(Collection::Credentials, &map)
        .await
        .map_err(|e| format!("save failed: {}", e))?;
    let loaded: EntityMap<Credential> = store
        .load(Collection::Credentials)
        .await
        .map_err(|e| format!("load failed: {}", e))?;
    if loaded != map {
        return Err("loaded credentials differ from saved".to_string());
    }
    Ok(())
}
