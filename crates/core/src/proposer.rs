use std::{fmt, sync::Arc, time::Duration};

use anyhow::Context;
use committee_db_types::{BlockBatchDatabase, TaskDatabase};
use committee_primitives::{BatchId, Hash};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::{utils::run_blocking, BatchResetter, L1Contract, UpdateStateParams};

#[derive(Clone, Debug)]
pub struct ProposerConfig {
    pub propose_interval: Duration,
}

impl Default for ProposerConfig {
    fn default() -> Self {
        Self {
            propose_interval: Duration::from_secs(10),
        }
    }
}

/// Hands proved batches to the L1 contract, one per tick, in chain order.
pub struct Proposer<B, T> {
    batch_db: Arc<B>,
    l1: Arc<dyn L1Contract>,
    resetter: Arc<BatchResetter<B, T>>,
    config: ProposerConfig,
    cancel: CancellationToken,
}

impl<B, T> fmt::Debug for Proposer<B, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proposer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<B: BlockBatchDatabase, T: TaskDatabase> Proposer<B, T> {
    pub fn new(
        batch_db: Arc<B>,
        l1: Arc<dyn L1Contract>,
        resetter: Arc<BatchResetter<B, T>>,
        config: ProposerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            batch_db,
            l1,
            resetter,
            config,
            cancel,
        }
    }

    pub async fn run(&self) {
        info!(interval = ?self.config.propose_interval, "proposer started");
        let mut ticker = interval(self.config.propose_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(err) = self.process_tick().await {
                if self.cancel.is_cancelled() {
                    break;
                }
                error!(?err, "proposer tick failed");
            }
        }

        info!("proposer stopped");
    }

    /// Syncs the proved state root with L1 and proposes the next proved batch, if any.
    /// Returns the proposed batch.
    pub async fn process_tick(&self) -> anyhow::Result<Option<BatchId>> {
        let l1_root = self
            .l1
            .finalized_state_root()
            .await
            .context("reading finalized state root from L1")?;

        let stored_root = run_blocking(&self.batch_db, |db| db.try_get_proved_state_root())
            .await
            .context("reading proved state root")?;
        let stored_root = match stored_root {
            Some(root) => root,
            None => {
                self.set_proved_root(l1_root).await?;
                info!(root = %l1_root, "proved state root initialized from L1");
                l1_root
            }
        };

        let next = run_blocking(&self.batch_db, |db| db.try_get_next_proposal_data())
            .await
            .context("loading next proposal")?;

        if stored_root != l1_root {
            // L1 may already hold our next batch if we stopped right after updating it
            if let Some(data) = next.filter(|d| d.new_proved_state_root == l1_root) {
                info!(batch_id = %data.batch_id, "batch already applied on L1, catching up");
                self.mark_proposed(data.batch_id).await?;
                return Ok(Some(data.batch_id));
            }

            warn!(
                stored = %stored_root,
                l1 = %l1_root,
                "L1 state root moved elsewhere, dropping batches that were not proved"
            );
            self.set_proved_root(l1_root).await?;
            let mut purged = self.purge_detached_chain(l1_root).await?;
            purged.extend(self.resetter.reset_not_proved().await?);
            info!(count = purged.len(), "batches reset after L1 root change");
            return Ok(None);
        }

        let Some(data) = next else {
            return Ok(None);
        };
        let batch_id = data.batch_id;

        let commit_tx = self
            .l1
            .commit_batch(batch_id, &data.data_proofs)
            .await
            .with_context(|| format!("committing batch {batch_id} to L1"))?;
        debug!(%batch_id, %commit_tx, "batch data committed");

        let update_tx = self
            .l1
            .update_state(UpdateStateParams {
                batch_id,
                old_state_root: data.old_proved_state_root,
                new_state_root: data.new_proved_state_root,
                data_proofs: data.data_proofs,
                main_block_count: data.main_block_count,
            })
            .await
            .with_context(|| format!("updating L1 state with batch {batch_id}"))?;

        self.mark_proposed(batch_id).await?;
        info!(%batch_id, %update_tx, new_root = %data.new_proved_state_root, "batch proposed");
        Ok(Some(batch_id))
    }

    /// Purges every stored batch when the oldest one does not build on `root`. Such a chain can
    /// never be proposed.
    async fn purge_detached_chain(&self, root: Hash) -> anyhow::Result<Vec<BatchId>> {
        let oldest = run_blocking(&self.batch_db, |db| db.get_batches().next().transpose())
            .await
            .context("loading oldest batch")?;
        let Some(oldest) = oldest else {
            return Ok(Vec::new());
        };
        if oldest.parent_main_ref().map(|r| r.hash) == Some(root) {
            return Ok(Vec::new());
        }

        debug!(batch_id = %oldest.id, "stored chain does not build on the L1 root");
        self.resetter.reset_from(oldest.id).await
    }

    async fn set_proved_root(&self, root: Hash) -> anyhow::Result<()> {
        let cancel = self.cancel.clone();
        run_blocking(&self.batch_db, move |db| db.set_proved_state_root(root, &cancel))
            .await
            .with_context(|| format!("storing proved state root {root}"))
    }

    async fn mark_proposed(&self, batch_id: BatchId) -> anyhow::Result<()> {
        let cancel = self.cancel.clone();
        run_blocking(&self.batch_db, move |db| db.set_batch_as_proposed(batch_id, &cancel))
            .await
            .with_context(|| format!("marking {batch_id} as proposed"))
    }
}
