use alloy_primitives::B256;
use obscuro_sequencer::RollupSubmission;
use obscuro_wire::PeerId;

/// An event emitted by the node manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// A published rollup was verified and stored.
    RollupAccepted {
        /// The hash of the rollup.
        hash: B256,
        /// The number of the rollup.
        number: u64,
    },
    /// A published rollup waits for its missing parent batches.
    RollupQuarantined {
        /// The hash of the rollup.
        hash: B256,
        /// The height of its first batch.
        first_batch: u64,
    },
    /// The sequencer published a rollup.
    RollupSubmitted(RollupSubmission),
    /// A batch produced by the enclave was stored and announced.
    BatchProduced {
        /// The hash of the batch.
        hash: B256,
        /// The number of the batch.
        number: u64,
    },
    /// Batches fetched from a peer were imported.
    BatchesImported {
        /// The peer the batches came from.
        peer: PeerId,
        /// The amount of imported batches.
        applied: usize,
    },
    /// The L1 ingestor caught up with the confirmed L1 head.
    L1Synced,
}
