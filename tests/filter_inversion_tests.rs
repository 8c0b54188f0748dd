//! S5 (spec §8): filter inversion. `invert=true` returns the complement of a
//! non-empty filter set; an empty filter set stays empty even inverted
//! rather than silently becoming "every row" (spec §4.1).

mod support;

use std::collections::HashMap;

use distil_orchestrator::model::{Dataset, DatasetSource, Filter, FilterMode, FilterParams, Provenance, SemanticType};
use distil_orchestrator::storage::DataStoreGateway;
use serde_json::json;

use support::{data_variable, index_variable, InMemoryStoreGateway};

fn dataset() -> Dataset {
    Dataset {
        id: "iris".into(),
        storage_name: "iris".into(),
        folder: "/data/iris".into(),
        source: DatasetSource::Seed,
        row_count: 4,
        byte_count: 128,
        provenance: Provenance::Catalogue,
        variables: vec![index_variable("d3mIndex"), data_variable("species", SemanticType::Categorical)],
    }
}

fn rows() -> Vec<HashMap<String, serde_json::Value>> {
    [(0, "setosa"), (1, "versicolor"), (2, "setosa"), (3, "virginica")]
        .into_iter()
        .map(|(i, species)| {
            let mut row = HashMap::new();
            row.insert("d3mIndex".to_string(), json!(i));
            row.insert("species".to_string(), json!(species));
            row
        })
        .collect()
}

#[tokio::test]
async fn invert_with_filters_returns_the_complement() {
    let store = InMemoryStoreGateway::new("d3mIndex", rows());
    let dataset = dataset();
    let setosa_only = FilterParams {
        size: 100,
        variables: vec![],
        filters: vec![Filter::Categorical { key: "species".into(), mode: FilterMode::Include, category: vec!["setosa".into()] }],
    };

    let matched = store.fetch_rows(&dataset, &setosa_only, false).await.unwrap();
    let inverted = store.fetch_rows(&dataset, &setosa_only, true).await.unwrap();

    assert_eq!(matched.rows.len(), 2);
    assert_eq!(inverted.rows.len(), 2);
    assert_eq!(matched.rows.len() + inverted.rows.len(), rows().len());
}

#[tokio::test]
async fn invert_with_no_filters_stays_empty_rather_than_becoming_the_universe() {
    let store = InMemoryStoreGateway::new("d3mIndex", rows());
    let dataset = dataset();
    let no_filters = FilterParams { size: 100, variables: vec![], filters: vec![] };

    let inverted = store.fetch_rows(&dataset, &no_filters, true).await.unwrap();
    assert!(inverted.rows.is_empty());

    let not_inverted = store.fetch_rows(&dataset, &no_filters, false).await.unwrap();
    assert_eq!(not_inverted.rows.len(), rows().len());
}
