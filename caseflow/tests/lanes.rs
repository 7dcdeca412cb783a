//! Lane pool over a file store: many cases, ordered turns per case.

use std::sync::Arc;

use caseflow::apply::TurnService;
use caseflow::core::engine::Engine;
use caseflow::io::case_store::FileCaseStore;
use caseflow::io::init::{InitOptions, init_workspace};
use caseflow::lanes::LanePool;
use caseflow::test_support::{UpdateBuilder, draft};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_cases_keep_their_own_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = init_workspace(temp.path(), &InitOptions { force: false }).expect("init");
    let service = Arc::new(
        TurnService::new(
            Engine::default(),
            Arc::new(FileCaseStore::new(&paths.cases_dir)),
        )
        .with_turn_log(&paths.turns_dir),
    );
    let case_ids: Vec<String> = (0..6).map(|n| format!("case-{n}")).collect();
    for id in &case_ids {
        service.open_case(id, "load test").expect("open");
    }

    let pool = Arc::new(LanePool::new(Arc::clone(&service), 3));
    let mut tasks = Vec::new();
    for id in case_ids.clone() {
        let pool = Arc::clone(&pool);
        tasks.push(tokio::spawn(async move {
            for n in 1..=4u32 {
                let update = UpdateBuilder::new()
                    .evidence(draft(&format!("{id} observation {n}"), None))
                    .build();
                let result = pool.submit(&id, update).await.expect("submit");
                assert_eq!(result.case.turn_count, n);
            }
        }));
    }
    for task in tasks {
        task.await.expect("join");
    }

    for id in &case_ids {
        let case = service.load(id).expect("load");
        assert_eq!(case.turn_count, 4);
        let expected: Vec<String> = (1..=4).map(|n| format!("ev-{n}")).collect();
        let ids: Vec<&str> = case.evidence.keys().collect();
        assert_eq!(ids, expected);
        assert!(paths.turns_dir.join(id).join("4").join("record.json").is_file());
    }

    if let Ok(pool) = Arc::try_unwrap(pool) {
        pool.shutdown().await;
    }
}
