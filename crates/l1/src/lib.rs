//! A library containing the logic required to interact with the Obscuro contracts on the L1.

pub mod abi;

pub use tx::{
    L1DepositTx, L1InitializeSecretTx, L1RequestSecretTx, L1RollupTx, L1StoreSecretTx, L1Tx,
    L1TxDecodeError, ManagementContract,
};
mod tx;
