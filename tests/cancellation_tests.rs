//! S3 (spec §8): cancelling a running request stops the search loop but lets
//! an already-dispatched solution run to its own terminal state
//! (spec §4.6 step 9) rather than aborting it mid-flight.

mod support;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use distil_orchestrator::compute::ComputeBackend;
use distil_orchestrator::engine::SolutionRequestSpec;
use distil_orchestrator::model::{Dataset, DatasetSource, FilterParams, Progress, Provenance, SemanticType, Task};
use serde_json::json;

use support::{build_engine, data_variable, index_variable, wait_for_request_progress, wait_for_request_terminal, InMemoryStoreGateway, ScriptedComputeBackend};

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
    (0..4)
        .map(|i| {
            let mut row = HashMap::new();
            row.insert("d3mIndex".to_string(), json!(i));
            row.insert("species".to_string(), json!("setosa"));
            row
        })
        .collect()
}

#[tokio::test]
async fn cancelling_a_running_request_stops_the_search_but_lets_dispatched_solutions_finish() {
    let store = Arc::new(InMemoryStoreGateway::new("d3mIndex", rows()));
    let backend = ScriptedComputeBackend::new("search-cancel", vec!["sol-inflight".into()], "f1Score", 0.5, "d3mIndex,species\n0,setosa\n")
        .hang_after_exhausted();
    let stop_called = backend.stop_called.clone();
    let compute: Arc<dyn ComputeBackend> = Arc::new(backend);
    let (engine, _progress, _scratch_dir, _store) = build_engine(dataset(), compute, store);

    let spec = SolutionRequestSpec {
        dataset_id: "iris".into(),
        target: "species".into(),
        task: Task::Classification,
        sub_task: "multiClass".into(),
        metrics: vec!["f1Score".into()],
        max_solutions: 5,
        max_time_seconds: 60,
        filters: FilterParams { size: 100, variables: vec![], filters: vec![] },
    };
    let request_id = engine.submit(spec);

    assert!(wait_for_request_progress(&engine, &request_id, Progress::Running, 200).await, "request never reached running");
    // Give the already-dispatched solution a head start before cancelling.
    tokio::time::sleep(Duration::from_millis(30)).await;

    let stopped = engine.stop_solution_request(&request_id).await;
    assert!(stopped, "stop_solution_request must find the still-active request");

    let request = wait_for_request_terminal(&engine, &request_id, 300).await.expect("request reached a terminal state");
    assert_eq!(request.progress, Progress::Errored);
    assert!(stop_called.load(Ordering::SeqCst), "stop_search was never issued to the compute backend");

    let solutions = engine.solutions_for_request(&request_id);
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].progress, Progress::Completed, "a solution dispatched before cancellation must still reach its own terminal state");
}
