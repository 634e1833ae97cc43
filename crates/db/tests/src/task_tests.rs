use std::{collections::BTreeSet, thread, time::Duration};

use committee_db_types::{traits::TaskDatabase, DbError};
use committee_primitives::{BatchId, ExecutorId, Hash, ShardId, TaskId};
use committee_task_types::{Task, TaskEntry, TaskResult, TaskStatus, TaskType};
use tokio_util::sync::CancellationToken;

const EXECUTOR: ExecutorId = ExecutorId(7);
const OTHER_EXECUTOR: ExecutorId = ExecutorId(8);

fn batch_id(seed: u8) -> BatchId {
    BatchId::from_bytes([seed; 16])
}

fn block_proof(batch: BatchId, block_num: u64, parent: TaskId) -> TaskEntry {
    let task = Task::new_block_proof(
        batch,
        ShardId::MAIN,
        block_num,
        Hash::new([block_num as u8; 32]),
        parent,
    );
    TaskEntry::new(task, 0).with_pending_deps(vec![parent])
}

fn ready_aggregate(batch: BatchId, block_num: u64) -> TaskEntry {
    let task = Task::new_aggregate_proofs(batch, block_num, Hash::ZERO, 0);
    TaskEntry::new(task, 0)
}

/// Aggregate waiting on `deps` block proofs, plus those block proofs.
fn proof_tree(batch: BatchId, deps: u32) -> (TaskEntry, Vec<TaskEntry>) {
    let aggregate = TaskEntry::new(
        Task::new_aggregate_proofs(batch, u64::from(deps), Hash::ZERO, deps),
        0,
    );
    let proofs = (0..deps)
        .map(|num| block_proof(batch, u64::from(num), aggregate.id()))
        .collect();
    (aggregate, proofs)
}

fn claim(db: &impl TaskDatabase, executor: ExecutorId, now_ms: u64) -> Option<Task> {
    db.request_task_to_execute(executor, now_ms, &CancellationToken::new())
        .unwrap()
}

pub fn test_add_and_get_entry(db: &impl TaskDatabase) {
    let cancel = CancellationToken::new();
    let entry = ready_aggregate(batch_id(1), 3);

    assert_eq!(db.try_get_task_entry(entry.id()).unwrap(), None);
    db.add_task_entries(vec![entry.clone()], &cancel).unwrap();
    assert_eq!(db.try_get_task_entry(entry.id()).unwrap(), Some(entry.clone()));

    // upserting the same entry again is a no-op
    db.add_task_entries(vec![entry.clone()], &cancel).unwrap();
    assert_eq!(db.get_task_entries().count(), 1);
}

pub fn test_claim_from_empty_queue(db: &impl TaskDatabase) {
    assert_eq!(claim(db, EXECUTOR, 0), None);
}

pub fn test_claim_priority_order(db: &impl TaskDatabase) {
    let cancel = CancellationToken::new();
    let older = batch_id(1);
    let newer = batch_id(2);
    let parent = TaskId::new_random();

    let late_batch = block_proof(newer, 0, parent);
    let aggregate = ready_aggregate(older, 2);
    let second_block = block_proof(older, 2, parent);
    let first_block = block_proof(older, 1, parent);

    db.add_task_entries(
        vec![
            late_batch.clone(),
            aggregate.clone(),
            second_block.clone(),
            first_block.clone(),
        ],
        &cancel,
    )
    .unwrap();

    let order: Vec<TaskId> = std::iter::from_fn(|| claim(db, EXECUTOR, 10))
        .map(|task| task.id)
        .collect();
    assert_eq!(
        order,
        vec![
            first_block.id(),
            second_block.id(),
            aggregate.id(),
            late_batch.id()
        ]
    );
}

pub fn test_claim_marks_running(db: &impl TaskDatabase) {
    let cancel = CancellationToken::new();
    let entry = ready_aggregate(batch_id(1), 1);
    db.add_task_entries(vec![entry.clone()], &cancel).unwrap();

    let task = claim(db, EXECUTOR, 42).unwrap();
    assert_eq!(task, entry.task);

    let stored = db.try_get_task_entry(entry.id()).unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Running);
    assert_eq!(stored.owner, EXECUTOR);
    assert_eq!(stored.started_ms, Some(42));

    assert_eq!(claim(db, OTHER_EXECUTOR, 43), None);
}

pub fn test_dependency_gating(db: &impl TaskDatabase) {
    let cancel = CancellationToken::new();
    let (aggregate, proofs) = proof_tree(batch_id(1), 2);
    let mut entries = vec![aggregate.clone()];
    entries.extend(proofs.iter().cloned());
    db.add_task_entries(entries, &cancel).unwrap();

    let first = claim(db, EXECUTOR, 1).unwrap();
    assert_eq!(first.task_type, TaskType::ProofBlock);
    let result = TaskResult::success(first.id, EXECUTOR, vec![1]);
    let before = db.process_task_result(result, 2, &cancel).unwrap();
    assert_eq!(before.status, TaskStatus::Running);
    assert_eq!(db.try_get_task_entry(first.id).unwrap(), None);

    // one of two results: the aggregate must stay blocked
    let stored = db.try_get_task_entry(aggregate.id()).unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::WaitingForInput);
    assert_eq!(stored.dependencies.len(), 1);

    let second = claim(db, EXECUTOR, 3).unwrap();
    assert_eq!(second.task_type, TaskType::ProofBlock);
    assert_eq!(claim(db, OTHER_EXECUTOR, 3), None);

    let result = TaskResult::success(second.id, EXECUTOR, vec![2]);
    db.process_task_result(result, 4, &cancel).unwrap();

    let stored = db.try_get_task_entry(aggregate.id()).unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::WaitingForExecutor);
    assert_eq!(stored.dependencies.len(), 2);

    let last = claim(db, OTHER_EXECUTOR, 5).unwrap();
    assert_eq!(last.id, aggregate.id());
}

pub fn test_failure_is_terminal(db: &impl TaskDatabase) {
    let cancel = CancellationToken::new();
    let (aggregate, proofs) = proof_tree(batch_id(1), 1);
    db.add_task_entries(vec![aggregate.clone(), proofs[0].clone()], &cancel)
        .unwrap();

    let task = claim(db, EXECUTOR, 1).unwrap();
    let result = TaskResult::failure(task.id, EXECUTOR, "out of memory");
    let updated = db.process_task_result(result, 9, &cancel).unwrap();
    assert_eq!(updated.status, TaskStatus::Failed);

    let stored = db.try_get_task_entry(task.id).unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(stored.finished_ms, Some(9));

    // nothing was propagated and nothing is claimable
    let stored = db.try_get_task_entry(aggregate.id()).unwrap().unwrap();
    assert!(stored.dependencies.is_empty());
    assert_eq!(claim(db, EXECUTOR, 10), None);
}

pub fn test_result_from_wrong_owner(db: &impl TaskDatabase) {
    let cancel = CancellationToken::new();
    let entry = ready_aggregate(batch_id(1), 1);
    db.add_task_entries(vec![entry.clone()], &cancel).unwrap();
    let task = claim(db, EXECUTOR, 1).unwrap();

    let result = TaskResult::success(task.id, OTHER_EXECUTOR, vec![]);
    let err = db.process_task_result(result, 2, &cancel).unwrap_err();
    assert!(matches!(err, DbError::TaskWrongOwner { .. }));

    let stored = db.try_get_task_entry(task.id).unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Running);
    assert_eq!(stored.owner, EXECUTOR);
}

pub fn test_result_for_idle_task(db: &impl TaskDatabase) {
    let cancel = CancellationToken::new();
    let entry = ready_aggregate(batch_id(1), 1);
    db.add_task_entries(vec![entry.clone()], &cancel).unwrap();

    let result = TaskResult::success(entry.id(), EXECUTOR, vec![]);
    let err = db.process_task_result(result, 2, &cancel).unwrap_err();
    assert!(matches!(err, DbError::TaskInvalidStatus { .. }));
}

pub fn test_result_for_unknown_task(db: &impl TaskDatabase) {
    let id = TaskId::new_random();
    let result = TaskResult::success(id, EXECUTOR, vec![]);
    let err = db
        .process_task_result(result, 1, &CancellationToken::new())
        .unwrap_err();
    assert_eq!(err, DbError::TaskNotFound(id));
}

pub fn test_missing_dependent_rolls_back(db: &impl TaskDatabase) {
    let cancel = CancellationToken::new();
    let missing_parent = TaskId::new_random();
    let orphan = block_proof(batch_id(1), 1, missing_parent);
    db.add_task_entries(vec![orphan.clone()], &cancel).unwrap();
    let task = claim(db, EXECUTOR, 1).unwrap();

    let result = TaskResult::success(task.id, EXECUTOR, vec![]);
    let err = db.process_task_result(result, 2, &cancel).unwrap_err();
    assert_eq!(err, DbError::TaskNotFound(missing_parent));

    let stored = db.try_get_task_entry(orphan.id()).unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Running);
}

pub fn test_reschedule_hanging_tasks(db: &impl TaskDatabase) {
    let cancel = CancellationToken::new();
    let timeout = Duration::from_secs(60);
    let entry = ready_aggregate(batch_id(1), 1);
    db.add_task_entries(vec![entry.clone()], &cancel).unwrap();
    claim(db, EXECUTOR, 1_000).unwrap();

    // still within the timeout
    assert_eq!(db.reschedule_hanging_tasks(30_000, timeout, &cancel).unwrap(), 0);

    assert_eq!(db.reschedule_hanging_tasks(62_000, timeout, &cancel).unwrap(), 1);
    assert_eq!(db.reschedule_hanging_tasks(62_000, timeout, &cancel).unwrap(), 0);

    let stored = db.try_get_task_entry(entry.id()).unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::WaitingForExecutor);
    assert_eq!(stored.owner, ExecutorId::UNKNOWN);
    assert_eq!(stored.started_ms, None);

    let task = claim(db, OTHER_EXECUTOR, 63_000).unwrap();
    assert_eq!(task.id, entry.id());

    // the original owner lost the task
    let late = TaskResult::success(entry.id(), EXECUTOR, vec![]);
    assert!(db.process_task_result(late, 64_000, &cancel).is_err());
}

pub fn test_upsert_not_ready_leaves_queue(db: &impl TaskDatabase) {
    let cancel = CancellationToken::new();
    let mut entry = ready_aggregate(batch_id(1), 1);
    db.add_task_entries(vec![entry.clone()], &cancel).unwrap();

    entry.status = TaskStatus::WaitingForInput;
    entry.task.dependency_num = 1;
    db.add_task_entries(vec![entry.clone()], &cancel).unwrap();

    assert_eq!(claim(db, EXECUTOR, 1), None);
}

pub fn test_remove_task_entry(db: &impl TaskDatabase) {
    let cancel = CancellationToken::new();
    let entry = ready_aggregate(batch_id(1), 1);
    db.add_task_entries(vec![entry.clone()], &cancel).unwrap();

    assert!(db.remove_task_entry(entry.id(), &cancel).unwrap());
    assert!(!db.remove_task_entry(entry.id(), &cancel).unwrap());
    assert_eq!(db.try_get_task_entry(entry.id()).unwrap(), None);
    assert_eq!(claim(db, EXECUTOR, 1), None);
}

pub fn test_task_ids_for_batch(db: &impl TaskDatabase) {
    let cancel = CancellationToken::new();
    let (aggregate, proofs) = proof_tree(batch_id(1), 2);
    let other = ready_aggregate(batch_id(2), 1);

    let mut entries = vec![aggregate.clone(), other.clone()];
    entries.extend(proofs.iter().cloned());
    db.add_task_entries(entries, &cancel).unwrap();

    let ids: BTreeSet<TaskId> = db
        .get_task_ids_for_batch(batch_id(1))
        .unwrap()
        .into_iter()
        .collect();
    let expected: BTreeSet<TaskId> = std::iter::once(aggregate.id())
        .chain(proofs.iter().map(TaskEntry::id))
        .collect();
    assert_eq!(ids, expected);

    let all: Vec<TaskEntry> = db.get_task_entries().collect::<Result<_, _>>().unwrap();
    assert_eq!(all.len(), 4);
}

pub fn test_concurrent_claims_single_owner(db: &(impl TaskDatabase + Sync)) {
    let cancel = CancellationToken::new();
    let entry = ready_aggregate(batch_id(1), 1);
    db.add_task_entries(vec![entry.clone()], &cancel).unwrap();

    let claimed: Vec<Option<Task>> = thread::scope(|s| {
        let handles: Vec<_> = (1..=8)
            .map(|n| s.spawn(move || claim(db, ExecutorId(n), 1)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(claimed.iter().filter(|c| c.is_some()).count(), 1);
    let stored = db.try_get_task_entry(entry.id()).unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Running);
}

pub fn test_concurrent_claims_drain_queue(db: &(impl TaskDatabase + Sync)) {
    let cancel = CancellationToken::new();
    let parent = TaskId::new_random();
    let entries: Vec<TaskEntry> = (0..24).map(|n| block_proof(batch_id(1), n, parent)).collect();
    db.add_task_entries(entries.clone(), &cancel).unwrap();

    let claimed: Vec<TaskId> = thread::scope(|s| {
        let handles: Vec<_> = (1..=4)
            .map(|n| {
                s.spawn(move || {
                    std::iter::from_fn(|| claim(db, ExecutorId(n), 1))
                        .map(|task| task.id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let unique: BTreeSet<TaskId> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), entries.len());
    assert_eq!(unique.len(), entries.len());
}

pub fn test_cancelled_operation_is_not_applied(db: &impl TaskDatabase) {
    let cancel = CancellationToken::new();
    let entry = ready_aggregate(batch_id(1), 1);
    db.add_task_entries(vec![entry.clone()], &cancel).unwrap();

    cancel.cancel();
    let err = db
        .request_task_to_execute(EXECUTOR, 1, &cancel)
        .unwrap_err();
    assert_eq!(err, DbError::Cancelled);
    assert!(!err.is_retryable());

    let stored = db.try_get_task_entry(entry.id()).unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::WaitingForExecutor);
}

#[macro_export]
macro_rules! task_db_tests {
    ($setup_expr:expr) => {
        #[test]
        fn test_add_and_get_entry() {
            let db = $setup_expr;
            $crate::task_tests::test_add_and_get_entry(&db);
        }

        #[test]
        fn test_claim_from_empty_queue() {
            let db = $setup_expr;
            $crate::task_tests::test_claim_from_empty_queue(&db);
        }

        #[test]
        fn test_claim_priority_order() {
            let db = $setup_expr;
            $crate::task_tests::test_claim_priority_order(&db);
        }

        #[test]
        fn test_claim_marks_running() {
            let db = $setup_expr;
            $crate::task_tests::test_claim_marks_running(&db);
        }

        #[test]
        fn test_dependency_gating() {
            let db = $setup_expr;
            $crate::task_tests::test_dependency_gating(&db);
        }

        #[test]
        fn test_failure_is_terminal() {
            let db = $setup_expr;
            $crate::task_tests::test_failure_is_terminal(&db);
        }

        #[test]
        fn test_result_from_wrong_owner() {
            let db = $setup_expr;
            $crate::task_tests::test_result_from_wrong_owner(&db);
        }

        #[test]
        fn test_result_for_idle_task() {
            let db = $setup_expr;
            $crate::task_tests::test_result_for_idle_task(&db);
        }

        #[test]
        fn test_result_for_unknown_task() {
            let db = $setup_expr;
            $crate::task_tests::test_result_for_unknown_task(&db);
        }

        #[test]
        fn test_missing_dependent_rolls_back() {
            let db = $setup_expr;
            $crate::task_tests::test_missing_dependent_rolls_back(&db);
        }

        #[test]
        fn test_reschedule_hanging_tasks() {
            let db = $setup_expr;
            $crate::task_tests::test_reschedule_hanging_tasks(&db);
        }

        #[test]
        fn test_upsert_not_ready_leaves_queue() {
            let db = $setup_expr;
            $crate::task_tests::test_upsert_not_ready_leaves_queue(&db);
        }

        #[test]
        fn test_remove_task_entry() {
            let db = $setup_expr;
            $crate::task_tests::test_remove_task_entry(&db);
        }

        #[test]
        fn test_task_ids_for_batch() {
            let db = $setup_expr;
            $crate::task_tests::test_task_ids_for_batch(&db);
        }

        #[test]
        fn test_concurrent_claims_single_owner() {
            let db = $setup_expr;
            $crate::task_tests::test_concurrent_claims_single_owner(&db);
        }

        #[test]
        fn test_concurrent_claims_drain_queue() {
            let db = $setup_expr;
            $crate::task_tests::test_concurrent_claims_drain_queue(&db);
        }

        #[test]
        fn test_cancelled_operation_is_not_applied() {
            let db = $setup_expr;
            $crate::task_tests::test_cancelled_operation_is_not_applied(&db);
        }
    };
}
