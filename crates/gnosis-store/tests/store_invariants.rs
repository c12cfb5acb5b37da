use chrono::Utc;
use gnosis_store::{Concept, Embedding, EmbeddingConfig, Store, StoreConfig, StoreError};

fn embedding_config(id: &str, model: &str, dims: usize, active: bool) -> EmbeddingConfig {
    EmbeddingConfig {
        config_id: id.to_string(),
        provider: "mock".to_string(),
        model_name: model.to_string(),
        dimensions: dims,
        active,
        delete_protected: false,
        change_protected: false,
        created_at: Utc::now(),
    }
}

#[test]
fn dimension_mismatch_search_fails_typed_not_silent() {
    let store = Store::new(StoreConfig::default()).unwrap();
    store.insert_embedding_config(embedding_config("cfg1", "m1", 3, true));

    let err = store.vector_search(&[1.0, 0.0], 5, 0.0).unwrap_err();
    assert!(matches!(err, StoreError::DimensionMismatch { expected: 3, got: 2 }));
}

#[test]
fn activation_without_force_is_refused_on_dimension_change() {
    let store = Store::new(StoreConfig::default()).unwrap();
    store.insert_embedding_config(embedding_config("cfg768", "m768", 768, true));
    store.insert_embedding_config(embedding_config("cfg1536", "m1536", 1536, false));

    let err = store.activate_embedding_config("cfg1536", false).unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));
    assert_eq!(store.active_embedding_config().unwrap().config_id, "cfg768");

    store.activate_embedding_config("cfg1536", true).unwrap();
    assert_eq!(store.active_embedding_config().unwrap().config_id, "cfg1536");
}

#[test]
fn activation_with_force_marks_existing_concepts_incompatible() {
    let store = Store::new(StoreConfig::default()).unwrap();
    store.insert_embedding_config(embedding_config("cfg768", "m768", 2, true));

    let now = Utc::now();
    let mut concept = Concept::new("c1".to_string(), "Engine".to_string(), now);
    concept.embedding = Some(Embedding::new("m768", vec![1.0, 0.0]));
    store
        .with_tx(|tx| {
            tx.graph.upsert_concept(concept.clone());
            Ok(())
        })
        .unwrap();
    store.index_concept_embedding("c1", concept.embedding.as_ref().unwrap());

    store.insert_embedding_config(embedding_config("cfg1536", "m1536", 4, false));
    store.activate_embedding_config("cfg1536", true).unwrap();

    let stored = store.get_concept("c1").unwrap();
    assert!(matches!(
        stored.embedding_status,
        gnosis_store::EmbeddingStatus::Incompatible
    ));
}

#[test]
fn with_tx_rolls_back_graph_mutations_on_error() {
    let store = Store::new(StoreConfig::default()).unwrap();
    let now = Utc::now();
    let result: Result<(), StoreError> = store.with_tx(|tx| {
        tx.graph
            .upsert_concept(Concept::new("c1".to_string(), "Engine".to_string(), now));
        Err(StoreError::Constraint("forced failure".into()))
    });
    assert!(result.is_err());
    assert!(store.get_concept("c1").is_none());
}

#[test]
fn epoch_advances_only_when_a_job_completes() {
    let store = Store::new(StoreConfig::default()).unwrap();
    assert_eq!(store.epoch(), 0);
    store.advance_epoch();
    assert_eq!(store.epoch(), 1);
}

#[test]
fn migrations_applied_on_open() {
    let store = Store::new(StoreConfig::default()).unwrap();
    assert_eq!(store.schema_version(), 1);
}

#[test]
fn change_protected_active_config_refuses_activation_and_deactivation() {
    let store = Store::new(StoreConfig::default()).unwrap();
    store.insert_embedding_config(embedding_config("cfg-a", "m-a", 4, true));
    store.insert_embedding_config(embedding_config("cfg-b", "m-b", 4, false));
    store.protect_embedding_config("cfg-a").unwrap();

    let err = store.activate_embedding_config("cfg-b", false).unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));
    let err = store.deactivate_embedding_config("cfg-a").unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));
    assert_eq!(store.active_embedding_config().unwrap().config_id, "cfg-a");

    store.unprotect_embedding_config("cfg-a").unwrap();
    store.activate_embedding_config("cfg-b", false).unwrap();
    assert_eq!(store.active_embedding_config().unwrap().config_id, "cfg-b");
}

#[test]
fn delete_protected_config_refuses_removal() {
    let store = Store::new(StoreConfig::default()).unwrap();
    store.insert_embedding_config(embedding_config("cfg-a", "m-a", 4, true));
    store.protect_embedding_config("cfg-a").unwrap();

    let err = store.remove_embedding_config("cfg-a").unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));

    store.unprotect_embedding_config("cfg-a").unwrap();
    store.remove_embedding_config("cfg-a").unwrap();
    assert!(store.get_embedding_config("cfg-a").is_none());
}
