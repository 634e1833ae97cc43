use committee_db_types::{BatchEntry, BlockEntry};
use committee_primitives::{BatchId, BlockId, BlockRef, Hash, ShardId};

use crate::{define_table, versioned::VersionedValue};

impl VersionedValue for BatchEntry {
    const VERSION: u8 = 1;
}

impl VersionedValue for BlockEntry {
    const VERSION: u8 = 1;
}

impl VersionedValue for BlockRef {
    const VERSION: u8 = 1;
}

define_table!(
    /// Stored batches
    (BatchEntrySchema) BatchId => versioned BatchEntry
);

define_table!(
    /// Fetched blocks, keyed by shard then hash
    (BlockEntrySchema) BlockId => versioned BlockEntry
);

define_table!(
    /// Latest stored block of every shard
    (LatestFetchedSchema) ShardId => versioned BlockRef
);

define_table!(
    /// State root of the last batch accepted by L1
    (ProvedStateRootSchema) () => borsh Hash
);

define_table!(
    /// Head of the batch chain
    (LatestBatchIdSchema) () => borsh BatchId
);

define_table!(
    /// Number of stored batches
    (BatchCountSchema) () => int u32
);
