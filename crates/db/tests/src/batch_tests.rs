use committee_batch_types::{test_utils::TestChain, BlockBatch};
use committee_db_types::{traits::BlockBatchDatabase, DbError};
use committee_primitives::{BatchId, Hash, ShardId};
use tokio_util::sync::CancellationToken;

const CHILD: ShardId = ShardId(1);

/// Builds a batch of `mains` main blocks, each committing to one new child block.
fn build_batch(chain: &mut TestChain, parent_id: Option<BatchId>, mains: usize) -> BlockBatch {
    let mut batch = BlockBatch::new(parent_id, 100);
    for _ in 0..mains {
        let (main, children) = chain.next_main(&[(CHILD.0, 1)]);
        batch.append(main, children, 100).unwrap();
    }
    batch
}

fn sealed(mut batch: BlockBatch) -> BlockBatch {
    batch.seal(vec![0xab; 4], 200).unwrap();
    batch
}

/// Points every shard's fetch point at its genesis and the proved root at the main genesis.
fn init_genesis(db: &impl BlockBatchDatabase, chain: &TestChain) {
    let cancel = CancellationToken::new();
    db.set_latest_fetched(chain.tip(ShardId::MAIN), &cancel)
        .unwrap();
    db.set_latest_fetched(chain.tip(CHILD), &cancel).unwrap();
    db.set_proved_state_root(chain.tip(ShardId::MAIN).hash, &cancel)
        .unwrap();
}

pub fn test_put_and_get_batch(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    let mut chain = TestChain::new(&[CHILD.0]);
    let free_before = db.get_free_space_batch_count().unwrap();

    let batch = build_batch(&mut chain, None, 2);
    db.put_block_batch(&batch, 150, &cancel).unwrap();

    assert!(db.batch_exists(batch.id).unwrap());
    assert_eq!(db.try_get_batch(batch.id).unwrap(), Some(batch.clone()));
    assert_eq!(db.try_get_latest_batch_id().unwrap(), Some(batch.id));
    assert_eq!(db.get_free_space_batch_count().unwrap(), free_before - 1);

    let latest = db.get_latest_fetched().unwrap();
    assert_eq!(latest[&ShardId::MAIN], chain.tip(ShardId::MAIN));
    assert_eq!(latest[&CHILD], chain.tip(CHILD));

    let entries: Vec<_> = db.get_batches().collect::<Result<_, _>>().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].block_ids.len(), 4);
    assert!(entries[0].parent_refs.is_empty());
    assert!(!entries[0].is_proved);

    assert_eq!(db.try_get_batch(BatchId::new_time_ordered()).unwrap(), None);
}

pub fn test_put_extends_open_batch(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    let mut chain = TestChain::new(&[CHILD.0]);
    let mut batch = build_batch(&mut chain, None, 1);
    db.put_block_batch(&batch, 150, &cancel).unwrap();

    // re-submitting the same content is accepted
    db.put_block_batch(&batch, 151, &cancel).unwrap();

    let (main, children) = chain.next_main(&[(CHILD.0, 2)]);
    batch.append(main, children, 160).unwrap();
    db.put_block_batch(&batch, 160, &cancel).unwrap();

    let stored = db.try_get_batch(batch.id).unwrap().unwrap();
    assert_eq!(stored.blocks_count(), 5);
    assert_eq!(db.get_latest_fetched().unwrap()[&CHILD], chain.tip(CHILD));
    assert_eq!(db.get_batches().count(), 1);
}

pub fn test_put_rejects_gap(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    let mut chain = TestChain::new(&[CHILD.0]);
    let first = sealed(build_batch(&mut chain, None, 1));
    db.put_block_batch(&first, 150, &cancel).unwrap();

    // a main block never stored
    let _skipped = chain.next_main(&[]);
    let second = build_batch(&mut chain, Some(first.id), 1);

    let err = db.put_block_batch(&second, 160, &cancel).unwrap_err();
    assert!(matches!(err, DbError::BatchMismatch(_)), "{err:?}");
    assert!(!db.batch_exists(second.id).unwrap());
    assert_eq!(db.try_get_latest_batch_id().unwrap(), Some(first.id));
}

pub fn test_put_rejects_fork(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    let mut chain = TestChain::new(&[CHILD.0]);
    let mut fork = chain.clone();

    let first = sealed(build_batch(&mut chain, None, 1));
    db.put_block_batch(&first, 150, &cancel).unwrap();

    // same heights, different hashes
    fork.fork();
    let competing = build_batch(&mut fork, Some(first.id), 1);

    let err = db.put_block_batch(&competing, 160, &cancel).unwrap_err();
    assert!(matches!(err, DbError::BatchMismatch(_)), "{err:?}");
    assert_eq!(db.get_latest_fetched().unwrap()[&ShardId::MAIN], chain.tip(ShardId::MAIN));
}

pub fn test_put_requires_head_as_parent(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    let mut chain = TestChain::new(&[CHILD.0]);
    let first = sealed(build_batch(&mut chain, None, 1));
    db.put_block_batch(&first, 150, &cancel).unwrap();

    let orphan = build_batch(&mut chain, None, 1);
    let err = db.put_block_batch(&orphan, 160, &cancel).unwrap_err();
    assert!(matches!(err, DbError::BatchMismatch(_)));
}

pub fn test_sealed_batch_is_frozen(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    let mut chain = TestChain::new(&[CHILD.0]);
    let batch = sealed(build_batch(&mut chain, None, 1));
    db.put_block_batch(&batch, 150, &cancel).unwrap();
    let free = db.get_free_space_batch_count().unwrap();

    // storing the same content again is a no-op
    db.put_block_batch(&batch, 151, &cancel).unwrap();
    assert_eq!(db.get_free_space_batch_count().unwrap(), free);

    let mut changed = batch.clone();
    changed.data_proofs = vec![0xcd; 4];
    let err = db.put_block_batch(&changed, 152, &cancel).unwrap_err();
    assert!(matches!(err, DbError::BatchMismatch(_)), "{err:?}");

    let stored = db.try_get_batch(batch.id).unwrap().unwrap();
    assert!(stored.is_sealed);
    assert_eq!(stored.data_proofs, batch.data_proofs);
}

pub fn test_resubmit_older_sealed_batch(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    let mut chain = TestChain::new(&[CHILD.0]);
    let first = sealed(build_batch(&mut chain, None, 1));
    db.put_block_batch(&first, 150, &cancel).unwrap();
    let second = build_batch(&mut chain, Some(first.id), 1);
    db.put_block_batch(&second, 250, &cancel).unwrap();
    let fetched = db.get_latest_fetched().unwrap();

    db.put_block_batch(&first, 300, &cancel).unwrap();
    assert_eq!(db.try_get_latest_batch_id().unwrap(), Some(second.id));
    assert_eq!(db.get_latest_fetched().unwrap(), fetched);
}

pub fn test_set_batch_as_proved(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    let mut chain = TestChain::new(&[CHILD.0]);
    let batch = sealed(build_batch(&mut chain, None, 1));
    db.put_block_batch(&batch, 150, &cancel).unwrap();

    assert!(db.set_batch_as_proved(batch.id, &cancel).unwrap());
    assert!(!db.set_batch_as_proved(batch.id, &cancel).unwrap());

    let unknown = BatchId::new_time_ordered();
    assert_eq!(
        db.set_batch_as_proved(unknown, &cancel).unwrap_err(),
        DbError::BatchNotFound(unknown)
    );
}

pub fn test_proposal_flow(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    let mut chain = TestChain::new(&[CHILD.0]);
    init_genesis(db, &chain);
    let genesis_root = chain.tip(ShardId::MAIN).hash;
    let free_before = db.get_free_space_batch_count().unwrap();

    let first = sealed(build_batch(&mut chain, None, 2));
    db.put_block_batch(&first, 150, &cancel).unwrap();
    let first_root = chain.tip(ShardId::MAIN).hash;
    let second = sealed(build_batch(&mut chain, Some(first.id), 1));
    db.put_block_batch(&second, 250, &cancel).unwrap();

    assert_eq!(db.try_get_next_proposal_data().unwrap(), None);

    // proving out of order does not skip the first batch
    db.set_batch_as_proved(second.id, &cancel).unwrap();
    assert_eq!(db.try_get_next_proposal_data().unwrap(), None);
    assert_eq!(
        db.set_batch_as_proposed(second.id, &cancel).unwrap_err(),
        DbError::StateRootMismatch {
            expected: genesis_root,
            actual: first_root,
        }
    );

    db.set_batch_as_proved(first.id, &cancel).unwrap();
    let data = db.try_get_next_proposal_data().unwrap().unwrap();
    assert_eq!(data.batch_id, first.id);
    assert_eq!(data.old_proved_state_root, genesis_root);
    assert_eq!(data.new_proved_state_root, first_root);
    assert_eq!(data.main_block_count, 2);
    assert_eq!(data.first_block_fetched_at_ms, 150);
    assert_eq!(data.data_proofs, first.data_proofs);

    db.set_batch_as_proposed(first.id, &cancel).unwrap();
    assert_eq!(db.try_get_proved_state_root().unwrap(), Some(first_root));
    assert!(!db.batch_exists(first.id).unwrap());
    assert_eq!(db.get_free_space_batch_count().unwrap(), free_before - 1);

    let data = db.try_get_next_proposal_data().unwrap().unwrap();
    assert_eq!(data.batch_id, second.id);
    assert_eq!(data.old_proved_state_root, first_root);
    assert_eq!(data.new_proved_state_root, chain.tip(ShardId::MAIN).hash);
}

pub fn test_propose_requires_proved_batch(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    let mut chain = TestChain::new(&[CHILD.0]);
    init_genesis(db, &chain);

    let batch = sealed(build_batch(&mut chain, None, 1));
    db.put_block_batch(&batch, 150, &cancel).unwrap();

    assert_eq!(
        db.set_batch_as_proposed(batch.id, &cancel).unwrap_err(),
        DbError::BatchNotProved(batch.id)
    );
    assert!(db.batch_exists(batch.id).unwrap());
}

pub fn test_proposal_without_root(db: &impl BlockBatchDatabase) {
    assert_eq!(db.try_get_proved_state_root().unwrap(), None);
    assert_eq!(
        db.try_get_next_proposal_data().unwrap_err(),
        DbError::ProvedStateRootNotInitialized
    );
}

pub fn test_reset_range_restores_state(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    let mut chain = TestChain::new(&[CHILD.0]);
    let free_before = db.get_free_space_batch_count().unwrap();

    let first = sealed(build_batch(&mut chain, None, 1));
    db.put_block_batch(&first, 150, &cancel).unwrap();
    let after_first = db.get_latest_fetched().unwrap();
    let second = build_batch(&mut chain, Some(first.id), 2);
    db.put_block_batch(&second, 160, &cancel).unwrap();

    assert_eq!(db.reset_batches_range(second.id, &cancel).unwrap(), vec![second.id]);
    assert_eq!(db.get_latest_fetched().unwrap(), after_first);
    assert_eq!(db.try_get_latest_batch_id().unwrap(), Some(first.id));

    assert_eq!(db.reset_batches_range(first.id, &cancel).unwrap(), vec![first.id]);
    assert!(db.get_latest_fetched().unwrap().is_empty());
    assert_eq!(db.try_get_latest_batch_id().unwrap(), None);
    assert_eq!(db.get_batches().count(), 0);
    assert_eq!(db.get_free_space_batch_count().unwrap(), free_before);

    // the same blocks can be stored again
    let mut replay = TestChain::new(&[CHILD.0]);
    let again = build_batch(&mut replay, None, 1);
    db.put_block_batch(&again, 170, &cancel).unwrap();
}

pub fn test_reset_range_walks_to_target(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    let mut chain = TestChain::new(&[CHILD.0]);
    init_genesis(db, &chain);
    let genesis = db.get_latest_fetched().unwrap();

    let first = sealed(build_batch(&mut chain, None, 1));
    db.put_block_batch(&first, 150, &cancel).unwrap();
    let second = sealed(build_batch(&mut chain, Some(first.id), 1));
    db.put_block_batch(&second, 160, &cancel).unwrap();
    let third = build_batch(&mut chain, Some(second.id), 1);
    db.put_block_batch(&third, 170, &cancel).unwrap();

    let purged = db.reset_batches_range(first.id, &cancel).unwrap();
    assert_eq!(purged, vec![third.id, second.id, first.id]);
    assert_eq!(db.get_latest_fetched().unwrap(), genesis);
}

pub fn test_reset_range_unknown_target(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    let mut chain = TestChain::new(&[CHILD.0]);
    let batch = build_batch(&mut chain, None, 1);
    db.put_block_batch(&batch, 150, &cancel).unwrap();

    let unknown = BatchId::new_time_ordered();
    assert_eq!(
        db.reset_batches_range(unknown, &cancel).unwrap_err(),
        DbError::BatchNotFound(unknown)
    );
    // rolled back
    assert!(db.batch_exists(batch.id).unwrap());
    assert_eq!(db.try_get_latest_batch_id().unwrap(), Some(batch.id));
}

pub fn test_reset_not_proved(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    let mut chain = TestChain::new(&[CHILD.0]);
    init_genesis(db, &chain);

    let first = sealed(build_batch(&mut chain, None, 1));
    db.put_block_batch(&first, 150, &cancel).unwrap();
    let second = sealed(build_batch(&mut chain, Some(first.id), 1));
    db.put_block_batch(&second, 160, &cancel).unwrap();
    let third = sealed(build_batch(&mut chain, Some(second.id), 1));
    db.put_block_batch(&third, 170, &cancel).unwrap();

    db.set_batch_as_proved(first.id, &cancel).unwrap();
    db.set_batch_as_proved(third.id, &cancel).unwrap();

    // the third batch is proved but built on a purged one
    let purged = db.reset_batches_not_proved(&cancel).unwrap();
    assert_eq!(purged, vec![second.id, third.id]);

    assert!(db.batch_exists(first.id).unwrap());
    assert_eq!(db.try_get_latest_batch_id().unwrap(), Some(first.id));
    assert!(db.get_latest_fetched().unwrap().is_empty());

    let data = db.try_get_next_proposal_data().unwrap().unwrap();
    assert_eq!(data.batch_id, first.id);
}

pub fn test_reset_not_proved_on_empty_storage(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    assert!(db.reset_batches_not_proved(&cancel).unwrap().is_empty());
    assert_eq!(db.try_get_latest_batch_id().unwrap(), None);
}

pub fn test_proved_state_root(db: &impl BlockBatchDatabase) {
    let cancel = CancellationToken::new();
    let root = Hash::new([9; 32]);
    db.set_proved_state_root(root, &cancel).unwrap();
    assert_eq!(db.try_get_proved_state_root().unwrap(), Some(root));
}

#[macro_export]
macro_rules! batch_db_tests {
    ($setup_expr:expr) => {
        #[test]
        fn test_put_and_get_batch() {
            let db = $setup_expr;
            $crate::batch_tests::test_put_and_get_batch(&db);
        }

        #[test]
        fn test_put_extends_open_batch() {
            let db = $setup_expr;
            $crate::batch_tests::test_put_extends_open_batch(&db);
        }

        #[test]
        fn test_put_rejects_gap() {
            let db = $setup_expr;
            $crate::batch_tests::test_put_rejects_gap(&db);
        }

        #[test]
        fn test_put_rejects_fork() {
            let db = $setup_expr;
            $crate::batch_tests::test_put_rejects_fork(&db);
        }

        #[test]
        fn test_put_requires_head_as_parent() {
            let db = $setup_expr;
            $crate::batch_tests::test_put_requires_head_as_parent(&db);
        }

        #[test]
        fn test_sealed_batch_is_frozen() {
            let db = $setup_expr;
            $crate::batch_tests::test_sealed_batch_is_frozen(&db);
        }

        #[test]
        fn test_resubmit_older_sealed_batch() {
            let db = $setup_expr;
            $crate::batch_tests::test_resubmit_older_sealed_batch(&db);
        }

        #[test]
        fn test_set_batch_as_proved() {
            let db = $setup_expr;
            $crate::batch_tests::test_set_batch_as_proved(&db);
        }

        #[test]
        fn test_proposal_flow() {
            let db = $setup_expr;
            $crate::batch_tests::test_proposal_flow(&db);
        }

        #[test]
        fn test_propose_requires_proved_batch() {
            let db = $setup_expr;
            $crate::batch_tests::test_propose_requires_proved_batch(&db);
        }

        #[test]
        fn test_proposal_without_root() {
            let db = $setup_expr;
            $crate::batch_tests::test_proposal_without_root(&db);
        }

        #[test]
        fn test_reset_range_restores_state() {
            let db = $setup_expr;
            $crate::batch_tests::test_reset_range_restores_state(&db);
        }

        #[test]
        fn test_reset_range_walks_to_target() {
            let db = $setup_expr;
            $crate::batch_tests::test_reset_range_walks_to_target(&db);
        }

        #[test]
        fn test_reset_range_unknown_target() {
            let db = $setup_expr;
            $crate::batch_tests::test_reset_range_unknown_target(&db);
        }

        #[test]
        fn test_reset_not_proved() {
            let db = $setup_expr;
            $crate::batch_tests::test_reset_not_proved(&db);
        }

        #[test]
        fn test_reset_not_proved_on_empty_storage() {
            let db = $setup_expr;
            $crate::batch_tests::test_reset_not_proved_on_empty_storage(&db);
        }

        #[test]
        fn test_proved_state_root() {
            let db = $setup_expr;
            $crate::batch_tests::test_proved_state_root(&db);
        }
    };
}
