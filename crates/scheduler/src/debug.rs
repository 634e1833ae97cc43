//! Read-only views over the task storage, served by the `DebugTasks` RPC namespace.

use std::collections::{BTreeMap, HashMap, HashSet};

use committee_db_types::{DbResult, TaskDatabase};
use committee_primitives::{time::now_millis, TaskId};
use committee_rpc_types::{TaskDebugOrder, TaskDebugRequest, TaskTreeView, TaskView};
use committee_task_types::TaskEntry;

use crate::{SchedulerResult, TaskScheduler};

/// Levels of dependencies expanded below the requested task.
pub const MAX_TREE_DEPTH: usize = 10;

impl<D: TaskDatabase> TaskScheduler<D> {
    /// Lists stored tasks matching the request filters, sorted and truncated as requested.
    pub async fn get_tasks(&self, request: TaskDebugRequest) -> SchedulerResult<Vec<TaskView>> {
        let entries = self.load_entries().await?;
        Ok(select_tasks(&entries, &request, now_millis()))
    }

    /// Dependency tree of a stored task, `None` if there is no such task.
    pub async fn get_task_tree(&self, task_id: TaskId) -> SchedulerResult<Option<TaskTreeView>> {
        let entries = self.load_entries().await?;
        Ok(build_task_tree(&entries, task_id, now_millis()))
    }

    async fn load_entries(&self) -> SchedulerResult<Vec<TaskEntry>> {
        self.run_blocking("get_task_entries", "*".to_string(), |db, _| {
            db.get_task_entries().collect::<DbResult<Vec<_>>>()
        })
        .await
    }
}

fn select_tasks(entries: &[TaskEntry], request: &TaskDebugRequest, now_ms: u64) -> Vec<TaskView> {
    let mut views: Vec<_> = entries
        .iter()
        .filter(|e| request.matches(e))
        .map(|e| TaskView::from_entry(e, now_ms))
        .collect();

    views.sort_by(|a, b| {
        let ord = match request.order {
            TaskDebugOrder::CreatedAt => a.created_ms.cmp(&b.created_ms),
            TaskDebugOrder::StartedAt => a.started_ms.cmp(&b.started_ms),
            TaskDebugOrder::BlockNum => a.block_num.cmp(&b.block_num),
            TaskDebugOrder::ExecutionTime => a.execution_time_ms.cmp(&b.execution_time_ms),
        }
        .then_with(|| a.id.cmp(&b.id));

        if request.ascending {
            ord
        } else {
            ord.reverse()
        }
    });
    views.truncate(request.limit);
    views
}

struct TreeBuilder<'a> {
    by_id: HashMap<TaskId, &'a TaskEntry>,
    /// Stored tasks by the task that waits on them.
    children: HashMap<TaskId, BTreeMap<TaskId, &'a TaskEntry>>,
    visited: HashSet<TaskId>,
    now_ms: u64,
}

fn build_task_tree(entries: &[TaskEntry], root: TaskId, now_ms: u64) -> Option<TaskTreeView> {
    let mut children: HashMap<TaskId, BTreeMap<TaskId, &TaskEntry>> = HashMap::new();
    for entry in entries {
        if let Some(parent) = entry.task.parent_task_id {
            children.entry(parent).or_default().insert(entry.id(), entry);
        }
    }

    let mut builder = TreeBuilder {
        by_id: entries.iter().map(|e| (e.id(), e)).collect(),
        children,
        visited: HashSet::new(),
        now_ms,
    };
    let root = *builder.by_id.get(&root)?;
    Some(builder.expand(root, 0))
}

impl TreeBuilder<'_> {
    fn expand(&mut self, entry: &TaskEntry, depth: usize) -> TaskTreeView {
        self.visited.insert(entry.id());
        let mut node = TaskTreeView::stored(TaskView::from_entry(entry, self.now_ms));
        if depth >= MAX_TREE_DEPTH {
            return node;
        }

        // completed dependencies only survive as results folded into the waiting task
        for (dep_id, result) in &entry.dependencies {
            if self.visited.insert(*dep_id) {
                node.children
                    .push(TaskTreeView::terminated(*dep_id, result.error_text.clone()));
            }
        }

        let pending: Vec<&TaskEntry> = self
            .children
            .get(&entry.id())
            .map(|c| c.values().copied().collect())
            .unwrap_or_default();
        for child in pending {
            if self.visited.contains(&child.id()) {
                continue;
            }
            let view = self.expand(child, depth + 1);
            node.children.push(view);
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use committee_primitives::{BatchId, ExecutorId, Hash, ShardId};
    use committee_task_types::{Task, TaskResult, TaskStatus, TaskType};

    use super::*;

    fn block_entry(batch_id: BatchId, num: u64, parent: TaskId, created_ms: u64) -> TaskEntry {
        let task = Task::new_block_proof(batch_id, ShardId(1), num, Hash::new([num as u8; 32]), parent);
        TaskEntry::new(task, created_ms).with_pending_deps(vec![parent])
    }

    #[test]
    fn test_select_filters_orders_and_limits() {
        let batch_id = BatchId::new_time_ordered();
        let aggregate = TaskEntry::new(
            Task::new_aggregate_proofs(batch_id, 9, Hash::ZERO, 3),
            100,
        );
        let mut entries = vec![aggregate.clone()];
        for (num, created) in [(1, 300), (2, 200), (3, 400)] {
            entries.push(block_entry(batch_id, num, aggregate.id(), created));
        }
        entries[2].start(ExecutorId(7), 500).unwrap();

        let request = TaskDebugRequest {
            task_type: Some(TaskType::ProofBlock),
            order: TaskDebugOrder::CreatedAt,
            ascending: true,
            ..Default::default()
        };
        let nums: Vec<_> = select_tasks(&entries, &request, 1_000)
            .iter()
            .map(|v| v.block_num)
            .collect();
        assert_eq!(nums, vec![2, 1, 3]);

        let request = TaskDebugRequest {
            order: TaskDebugOrder::BlockNum,
            limit: 2,
            ..Default::default()
        };
        let nums: Vec<_> = select_tasks(&entries, &request, 1_000)
            .iter()
            .map(|v| v.block_num)
            .collect();
        assert_eq!(nums, vec![9, 3]);

        let request = TaskDebugRequest {
            status: Some(TaskStatus::Running),
            ..Default::default()
        };
        let running = select_tasks(&entries, &request, 1_000);
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].owner, ExecutorId(7));
        assert_eq!(running[0].execution_time_ms, Some(500));
    }

    #[test]
    fn test_tree_mixes_terminated_and_stored_children() {
        let batch_id = BatchId::new_time_ordered();
        let mut aggregate = TaskEntry::new(
            Task::new_aggregate_proofs(batch_id, 2, Hash::ZERO, 2),
            0,
        );
        let done = block_entry(batch_id, 1, aggregate.id(), 0);
        let pending = block_entry(batch_id, 2, aggregate.id(), 0);
        aggregate
            .add_dependency_result(TaskResult::success(done.id(), ExecutorId(1), vec![]))
            .unwrap();

        let entries = vec![aggregate.clone(), pending.clone()];
        let tree = build_task_tree(&entries, aggregate.id(), 10).unwrap();

        assert_eq!(tree.task_id, aggregate.id());
        assert_eq!(tree.children.len(), 2);
        let terminated = tree
            .children
            .iter()
            .find(|c| c.task_id == done.id())
            .unwrap();
        assert!(terminated.task.is_none());
        assert_eq!(terminated.result_error_text.as_deref(), Some(""));
        let stored = tree
            .children
            .iter()
            .find(|c| c.task_id == pending.id())
            .unwrap();
        assert_eq!(stored.status, TaskStatus::WaitingForExecutor);

        assert!(build_task_tree(&entries, TaskId::new_random(), 10).is_none());
    }

    #[test]
    fn test_tree_depth_is_bounded() {
        let batch_id = BatchId::new_time_ordered();
        let root = TaskEntry::new(
            Task::new_aggregate_proofs(batch_id, 0, Hash::ZERO, 1),
            0,
        );
        let mut entries = vec![root.clone()];
        let mut parent = root.id();
        for num in 1..=(MAX_TREE_DEPTH as u64 + 5) {
            let entry = block_entry(batch_id, num, parent, 0);
            parent = entry.id();
            entries.push(entry);
        }

        let tree = build_task_tree(&entries, root.id(), 0).unwrap();
        assert_eq!(tree.size(), MAX_TREE_DEPTH + 1);
    }
}
