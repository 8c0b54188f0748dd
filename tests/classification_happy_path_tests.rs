//! S1 (spec §8): classification happy path. Submits a Request, drives it
//! through a scripted two-solution search, and checks it reaches
//! `completed` with both solutions' results persisted. A second test rides
//! the progress bus through the same run and checks every published
//! transition already agrees with what `get_request` returns (persist-
//! before-publish, spec §5).

mod support;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use distil_orchestrator::compute::ComputeBackend;
use distil_orchestrator::engine::SolutionRequestSpec;
use distil_orchestrator::model::{Dataset, DatasetSource, FilterParams, Progress, Provenance, SemanticType, Task};
use serde_json::json;

use support::{build_engine, data_variable, index_variable, wait_for_request_terminal, InMemoryStoreGateway, ScriptedComputeBackend};

fn iris_dataset() -> Dataset {
    Dataset {
        id: "iris".into(),
        storage_name: "iris".into(),
        folder: "/data/iris".into(),
        source: DatasetSource::Seed,
        row_count: 6,
        byte_count: 512,
        provenance: Provenance::Catalogue,
        variables: vec![
            index_variable("d3mIndex"),
            data_variable("petal_length", SemanticType::Float),
            data_variable("species", SemanticType::Categorical),
        ],
    }
}

fn iris_rows() -> Vec<HashMap<String, serde_json::Value>> {
    (0..6)
        .map(|i| {
            let mut row = HashMap::new();
            row.insert("d3mIndex".to_string(), json!(i));
            row.insert("petal_length".to_string(), json!(1.0 + i as f64));
            row.insert("species".to_string(), json!(if i % 2 == 0 { "setosa" } else { "versicolor" }));
            row
        })
        .collect()
}

fn classification_spec() -> SolutionRequestSpec {
    SolutionRequestSpec {
        dataset_id: "iris".into(),
        target: "species".into(),
        task: Task::Classification,
        sub_task: "multiClass".into(),
        metrics: vec!["f1Score".into()],
        max_solutions: 2,
        max_time_seconds: 60,
        filters: FilterParams { size: 100, variables: vec![], filters: vec![] },
    }
}

#[tokio::test]
async fn classification_request_completes_with_both_solutions_persisted() {
    let store = Arc::new(InMemoryStoreGateway::new("d3mIndex", iris_rows()));
    let compute: Arc<dyn ComputeBackend> = Arc::new(ScriptedComputeBackend::new(
        "search-1",
        vec!["sol-a".into(), "sol-b".into()],
        "f1Score",
        0.9,
        "d3mIndex,species\n0,setosa\n1,versicolor\n",
    ));
    let (engine, _progress, _scratch_dir, store) = build_engine(iris_dataset(), compute, store);

    let request_id = engine.submit(classification_spec());
    let request = wait_for_request_terminal(&engine, &request_id, 200).await.expect("request reached a terminal state");
    assert_eq!(request.progress, Progress::Completed);

    let solutions = engine.solutions_for_request(&request_id);
    assert_eq!(solutions.len(), 2);
    for solution in &solutions {
        assert_eq!(solution.progress, Progress::Completed);
        assert!(!solution.scores.is_empty(), "a completed solution must carry at least one score");
        let result = solution.result.as_ref().expect("completed solution carries a result");
        let persisted = store.result_rows(&result.result_id);
        assert_eq!(persisted.len(), 2, "both rows in the produced CSV should have been ingested");
    }
}

#[tokio::test]
async fn progress_bus_transitions_agree_with_the_request_store() {
    let store = Arc::new(InMemoryStoreGateway::new("d3mIndex", iris_rows()));
    let compute: Arc<dyn ComputeBackend> = Arc::new(
        ScriptedComputeBackend::new("search-2", vec!["sol-c".into()], "f1Score", 0.85, "d3mIndex,species\n0,setosa\n")
            .with_emit_delay(Duration::from_millis(20)),
    );
    let mut spec = classification_spec();
    spec.max_solutions = 1;
    let (engine, progress, _scratch_dir, _store) = build_engine(iris_dataset(), compute, store);

    let request_id = engine.submit(spec);

    let mut receiver = loop {
        if let Some(r) = progress.subscribe_request(&request_id) {
            break r;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    let mut seen = vec![receiver.borrow().progress];
    while receiver.changed().await.is_ok() {
        seen.push(receiver.borrow().progress);
        if matches!(seen.last(), Some(Progress::Completed) | Some(Progress::Errored)) {
            break;
        }
    }

    assert_eq!(seen.first(), Some(&Progress::Pending));
    assert_eq!(seen.last(), Some(&Progress::Completed));

    let stored = engine.get_request(&request_id).expect("request must be in the store");
    assert_eq!(stored.progress, Progress::Completed, "the store's final state must match the last published event");
}
