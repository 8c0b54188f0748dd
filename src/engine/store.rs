//! In-process repository for `Request`/`Solution` state.
//!
//! Spec §4.2 scopes the Data Store Gateway to dataset rows, variable
//! summaries, and result rows — it has no CRUD surface for `Request` or
//! `Solution` records. The persist-before-publish invariant (§5) still needs
//! something durable-within-the-process to persist *to*, so the engine keeps
//! its own authoritative map, guarded the same way [`crate::catalog`] guards
//! its in-memory catalogue. A real deployment would back this with a table;
//! recorded as an open decision in `DESIGN.md`.

use dashmap::DashMap;

use crate::model::{Request, Solution};

#[derive(Default)]
pub struct RequestStore {
    requests: DashMap<String, Request>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, request: Request) {
        self.requests.insert(request.request_id.clone(), request);
    }

    pub fn get(&self, request_id: &str) -> Option<Request> {
        self.requests.get(request_id).map(|r| r.clone())
    }
}

#[derive(Default)]
pub struct SolutionStore {
    solutions: DashMap<String, Solution>,
    by_request: DashMap<String, Vec<String>>,
}

impl SolutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, solution: Solution) {
        if !self.solutions.contains_key(&solution.solution_id) {
            self.by_request.entry(solution.request_id.clone()).or_default().push(solution.solution_id.clone());
        }
        self.solutions.insert(solution.solution_id.clone(), solution);
    }

    pub fn get(&self, solution_id: &str) -> Option<Solution> {
        self.solutions.get(solution_id).map(|s| s.clone())
    }

    /// Scans for the solution owning `result_id` (spec §6's `/distil/*` result
    /// endpoints key off `result_id`, not `solution_id`).
    pub fn get_by_result_id(&self, result_id: &str) -> Option<Solution> {
        self.solutions
            .iter()
            .find(|entry| entry.result.as_ref().is_some_and(|r| r.result_id == result_id))
            .map(|entry| entry.clone())
    }

    pub fn for_request(&self, request_id: &str) -> Vec<Solution> {
        self.by_request
            .get(request_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Progress;
    use chrono::Utc;

    fn solution(request_id: &str, solution_id: &str) -> Solution {
        Solution {
            solution_id: solution_id.to_string(),
            request_id: request_id.to_string(),
            progress: Progress::Pending,
            created_at: Utc::now(),
            scores: Vec::new(),
            fitted_solution_id: None,
            result: None,
        }
    }

    #[test]
    fn solutions_are_indexed_by_their_owning_request() {
        let store = SolutionStore::new();
        store.upsert(solution("r1", "s1"));
        store.upsert(solution("r1", "s2"));
        store.upsert(solution("r2", "s3"));
        let mut ids: Vec<_> = store.for_request("r1").into_iter().map(|s| s.solution_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn re_upserting_a_solution_does_not_duplicate_the_index() {
        let store = SolutionStore::new();
        store.upsert(solution("r1", "s1"));
        let mut updated = solution("r1", "s1");
        updated.progress = Progress::Running;
        store.upsert(updated);
        assert_eq!(store.for_request("r1").len(), 1);
        assert_eq!(store.get("s1").unwrap().progress, Progress::Running);
    }
}
