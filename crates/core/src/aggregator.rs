use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use anyhow::Context;
use committee_batch_types::{BlockBatch, CheckResultKind, ConstraintChecker, ConstraintConfig};
use committee_db_types::{BlockBatchDatabase, DbError, TaskDatabase};
use committee_primitives::{time::now_millis, Block, BlockRef, ShardId};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::{utils::run_blocking, BatchEncoder, BatchResetter, BlockSource};

#[derive(Clone, Debug)]
pub struct AggregatorConfig {
    pub fetch_interval: Duration,
    /// Main-shard blocks requested from the source per tick.
    pub max_fetch_size: u64,
    pub constraints: ConstraintConfig,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            fetch_interval: Duration::from_secs(1),
            max_fetch_size: 100,
            constraints: ConstraintConfig::default(),
        }
    }
}

/// Pulls new blocks from the shards, packs them into batches and plans the proof tasks of
/// every sealed batch.
pub struct Aggregator<B, T> {
    batch_db: Arc<B>,
    task_db: Arc<T>,
    source: Arc<dyn BlockSource>,
    encoder: Arc<dyn BatchEncoder>,
    resetter: Arc<BatchResetter<B, T>>,
    checker: ConstraintChecker,
    config: AggregatorConfig,
    cancel: CancellationToken,
}

impl<B, T> fmt::Debug for Aggregator<B, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// How storing a batch ended, when it did not fail outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StoreOutcome {
    Stored,
    /// The tick must stop; storage is full or was reset.
    Halted,
}

impl<B: BlockBatchDatabase, T: TaskDatabase> Aggregator<B, T> {
    pub fn new(
        batch_db: Arc<B>,
        task_db: Arc<T>,
        source: Arc<dyn BlockSource>,
        encoder: Arc<dyn BatchEncoder>,
        resetter: Arc<BatchResetter<B, T>>,
        config: AggregatorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            batch_db,
            task_db,
            source,
            encoder,
            resetter,
            checker: ConstraintChecker::new(&config.constraints),
            config,
            cancel,
        }
    }

    /// Fetches and aggregates blocks every `fetch_interval` until cancelled.
    pub async fn run(&self) {
        info!(interval = ?self.config.fetch_interval, "aggregator started");
        let mut ticker = interval(self.config.fetch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.process_tick().await {
                Ok(0) => {}
                Ok(count) => debug!(%count, "aggregated main blocks"),
                Err(err) => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    error!(?err, "aggregation tick failed");
                }
            }
        }

        info!("aggregator stopped");
    }

    /// Runs one fetch and aggregation round, returning the number of main blocks that made it
    /// into a batch.
    pub async fn process_tick(&self) -> anyhow::Result<usize> {
        let free = run_blocking(&self.batch_db, |db| db.get_free_space_batch_count())
            .await
            .context("reading batch capacity")?;
        if free == 0 {
            debug!("batch storage is full, skipping fetch");
            return Ok(0);
        }

        self.ensure_head_tasks().await?;

        let Some(mut refs) = self.fetch_point().await? else {
            return Ok(0);
        };
        let Some(main_tip) = refs.get(&ShardId::MAIN).copied() else {
            return Ok(0);
        };

        let from = main_tip.number + 1;
        let main_blocks = self
            .source
            .get_blocks_range(ShardId::MAIN, from, from + self.config.max_fetch_size)
            .await
            .with_context(|| format!("fetching main blocks from #{from}"))?;

        if let Some(first) = main_blocks.first() {
            if first.parent_hash != main_tip.hash {
                warn!(
                    fetched = %first.to_ref(),
                    %main_tip,
                    "source does not extend the fetched chain, dropping the head batch"
                );
                self.reset_head().await?;
                return Ok(0);
            }
        }

        let now = now_millis();
        let mut batch = self.open_batch(now).await?;
        let mut dirty = false;
        let mut aggregated = 0;

        for main_block in main_blocks {
            let number = main_block.number;
            let children = self.fetch_child_blocks(&main_block, &mut refs).await?;

            let mut candidate = batch.clone();
            if let Err(err) = candidate.append(main_block, children, now) {
                warn!(%number, %err, "fetched blocks do not line up, retrying next tick");
                break;
            }

            let check = self.checker.check_constraints(&candidate, now);
            match check.kind {
                CheckResultKind::CanBeExtended => {
                    batch = candidate;
                    dirty = true;
                    aggregated += 1;
                }
                CheckResultKind::ShouldBeSealed => {
                    batch = candidate;
                    debug!(batch_id = %batch.id, details = %check.details, "sealing batch");
                    if self.seal_and_store(&mut batch, now).await? == StoreOutcome::Halted {
                        return Ok(aggregated);
                    }
                    aggregated += 1;
                    batch = BlockBatch::new(Some(batch.id), now);
                    dirty = false;
                }
                CheckResultKind::ShouldBeDiscarded => {
                    error!(
                        batch_id = %batch.id,
                        %number,
                        details = %check.details,
                        "main block does not fit into a batch, dropping it"
                    );
                    if !batch.is_empty() {
                        self.seal_and_store(&mut batch, now).await?;
                    }
                    return Ok(aggregated);
                }
            }
        }

        if batch.is_empty() {
            return Ok(aggregated);
        }

        // also catches open batches that received nothing but timed out
        let check = self.checker.check_constraints(&batch, now);
        if check.kind >= CheckResultKind::ShouldBeSealed {
            debug!(batch_id = %batch.id, details = %check.details, "sealing batch");
            self.seal_and_store(&mut batch, now).await?;
        } else if dirty {
            self.store(&batch, now).await?;
        }

        Ok(aggregated)
    }

    /// Plans the tasks of a sealed head batch that lost them, e.g. to a crash between storing
    /// the batch and its tasks.
    async fn ensure_head_tasks(&self) -> anyhow::Result<()> {
        let Some(head_id) = run_blocking(&self.batch_db, |db| db.try_get_latest_batch_id())
            .await
            .context("reading head batch")?
        else {
            return Ok(());
        };

        let awaiting_proof = run_blocking(&self.batch_db, move |db| {
            for entry in db.get_batches() {
                let entry = entry?;
                if entry.id == head_id {
                    return Ok(entry.is_sealed && !entry.is_proved);
                }
            }
            Ok(false)
        })
        .await
        .context("reading head batch entry")?;
        if !awaiting_proof {
            return Ok(());
        }

        let planned = run_blocking(&self.task_db, move |db| db.get_task_ids_for_batch(head_id))
            .await
            .context("reading head batch tasks")?;
        if !planned.is_empty() {
            return Ok(());
        }

        let Some(batch) = run_blocking(&self.batch_db, move |db| db.try_get_batch(head_id))
            .await
            .context("loading head batch")?
        else {
            return Ok(());
        };
        warn!(batch_id = %head_id, "sealed batch has no proof tasks, planning them");
        self.plan_tasks(&batch, now_millis()).await
    }

    /// Latest block known per shard, initialized from the head batch or the proved state root
    /// when storage has none. `None` while there is nothing to build on.
    async fn fetch_point(&self) -> anyhow::Result<Option<BTreeMap<ShardId, BlockRef>>> {
        let refs = run_blocking(&self.batch_db, |db| db.get_latest_fetched())
            .await
            .context("reading latest fetched blocks")?;
        if refs.contains_key(&ShardId::MAIN) {
            return Ok(Some(refs));
        }

        let Some(anchor) = self.anchor_block().await? else {
            return Ok(None);
        };

        let mut refs = BTreeMap::new();
        refs.insert(ShardId::MAIN, anchor.to_ref());
        for child_ref in &anchor.child_blocks {
            refs.insert(child_ref.shard_id, *child_ref);
        }

        let stored = refs.values().copied().collect::<Vec<_>>();
        let cancel = self.cancel.clone();
        run_blocking(&self.batch_db, move |db| {
            for block_ref in stored {
                db.set_latest_fetched(block_ref, &cancel)?;
            }
            Ok(())
        })
        .await
        .context("initializing latest fetched blocks")?;

        info!(main = %anchor.to_ref(), shards = refs.len(), "fetching resumes from main block");
        Ok(Some(refs))
    }

    async fn anchor_block(&self) -> anyhow::Result<Option<Block>> {
        let head = run_blocking(&self.batch_db, |db| {
            let Some(head_id) = db.try_get_latest_batch_id()? else {
                return Ok(None);
            };
            db.try_get_batch(head_id)
        })
        .await
        .context("loading head batch")?;
        if let Some(block) = head.and_then(|b| b.blocks.latest(ShardId::MAIN).cloned()) {
            return Ok(Some(block));
        }

        let Some(root) = run_blocking(&self.batch_db, |db| db.try_get_proved_state_root())
            .await
            .context("reading proved state root")?
        else {
            debug!("proved state root not initialized yet");
            return Ok(None);
        };

        let block = self
            .source
            .get_block(ShardId::MAIN, root)
            .await
            .with_context(|| format!("fetching main block {root}"))?;
        if block.is_none() {
            warn!(%root, "main block at the proved state root is unknown to the source");
        }
        Ok(block)
    }

    /// Fetches the child blocks `main_block` commits to beyond what was already fetched, and
    /// moves `refs` past them.
    async fn fetch_child_blocks(
        &self,
        main_block: &Block,
        refs: &mut BTreeMap<ShardId, BlockRef>,
    ) -> anyhow::Result<Vec<Block>> {
        let mut blocks = Vec::new();
        for child_ref in &main_block.child_blocks {
            let shard = child_ref.shard_id;
            let from = match refs.get(&shard) {
                Some(latest) => latest.number + 1,
                None => child_ref.number,
            };
            if from > child_ref.number {
                continue;
            }

            let fetched = self
                .source
                .get_blocks_range(shard, from, child_ref.number + 1)
                .await
                .with_context(|| {
                    format!("fetching blocks #{from}..={} of shard {shard}", child_ref.number)
                })?;
            if let Some(last) = fetched.last() {
                refs.insert(shard, last.to_ref());
            }
            blocks.extend(fetched);
        }

        refs.insert(ShardId::MAIN, main_block.to_ref());
        Ok(blocks)
    }

    /// The unsealed head batch, or a fresh batch on top of the head.
    async fn open_batch(&self, now_ms: u64) -> anyhow::Result<BlockBatch> {
        let (head_id, head) = run_blocking(&self.batch_db, |db| {
            let Some(head_id) = db.try_get_latest_batch_id()? else {
                return Ok((None, None));
            };
            Ok((Some(head_id), db.try_get_batch(head_id)?))
        })
        .await
        .context("loading head batch")?;

        match head {
            Some(batch) if !batch.is_sealed => Ok(batch),
            _ => Ok(BlockBatch::new(head_id, now_ms)),
        }
    }

    async fn seal_and_store(
        &self,
        batch: &mut BlockBatch,
        now_ms: u64,
    ) -> anyhow::Result<StoreOutcome> {
        let data_proofs = self
            .encoder
            .encode(batch)
            .with_context(|| format!("encoding batch {}", batch.id))?;
        batch.seal(data_proofs, now_ms)?;

        if self.store(batch, now_ms).await? == StoreOutcome::Halted {
            return Ok(StoreOutcome::Halted);
        }
        self.plan_tasks(batch, now_ms).await?;
        info!(
            batch_id = %batch.id,
            blocks = batch.blocks_count(),
            main_blocks = batch.blocks.main().len(),
            "batch sealed"
        );
        Ok(StoreOutcome::Stored)
    }

    async fn store(&self, batch: &BlockBatch, now_ms: u64) -> anyhow::Result<StoreOutcome> {
        let stored = batch.clone();
        let cancel = self.cancel.clone();
        let res = run_blocking(&self.batch_db, move |db| {
            db.put_block_batch(&stored, now_ms, &cancel)
        })
        .await;

        match res {
            Ok(()) => Ok(StoreOutcome::Stored),
            Err(DbError::CapacityLimitReached(limit)) => {
                info!(%limit, "batch capacity reached, pausing aggregation");
                Ok(StoreOutcome::Halted)
            }
            Err(DbError::BatchMismatch(reason)) => {
                warn!(batch_id = %batch.id, %reason, "fetched blocks conflict with stored batches");
                self.reset_head().await?;
                Ok(StoreOutcome::Halted)
            }
            Err(err) => Err(err).with_context(|| format!("storing batch {}", batch.id)),
        }
    }

    async fn plan_tasks(&self, batch: &BlockBatch, now_ms: u64) -> anyhow::Result<()> {
        let entries = batch.create_proof_tasks(now_ms)?;
        let count = entries.len();
        let cancel = self.cancel.clone();
        run_blocking(&self.task_db, move |db| db.add_task_entries(entries, &cancel))
            .await
            .with_context(|| format!("adding proof tasks of batch {}", batch.id))?;
        debug!(batch_id = %batch.id, %count, "proof tasks planned");
        Ok(())
    }

    /// Drops the head batch so the next tick refetches its range from the source.
    async fn reset_head(&self) -> anyhow::Result<()> {
        let head = run_blocking(&self.batch_db, |db| db.try_get_latest_batch_id())
            .await
            .context("reading head batch")?;
        match head {
            Some(head_id) => {
                self.resetter.reset_from(head_id).await?;
            }
            None => error!("fetch point conflicts with the source, no batch to reset"),
        }
        Ok(())
    }
}
