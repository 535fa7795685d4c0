use crate::abi::{
    addRollupCall, initializeNetworkSecretCall, requestNetworkSecretCall,
    respondNetworkSecretCall, transferCall,
};

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use obscuro_codec::{Codec, CodecError};
use obscuro_primitives::{ExtRollup, L1Transaction};
use std::collections::HashSet;

/// A transaction relevant to the Obscuro network, decoded from an L1 transaction.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::From, derive_more::Display)]
pub enum L1Tx {
    /// A rollup published by the sequencer.
    #[display("L1RollupTx")]
    Rollup(L1RollupTx),
    /// A deposit of ERC20 tokens into the bridge.
    #[display("L1DepositTx")]
    Deposit(L1DepositTx),
    /// The initialization of the network secret by the first aggregator.
    #[display("L1InitializeSecretTx")]
    InitializeSecret(L1InitializeSecretTx),
    /// The response of an attester to a network secret request.
    #[display("L1StoreSecretTx")]
    StoreSecret(L1StoreSecretTx),
    /// A request for the network secret by a joining node.
    #[display("L1RequestSecretTx")]
    RequestSecret(L1RequestSecretTx),
}

impl L1Tx {
    /// Returns true if the transaction publishes a rollup.
    pub const fn is_rollup(&self) -> bool {
        matches!(self, Self::Rollup(_))
    }
}

/// A rollup publication. The payload is the codec encoding of an [`ExtRollup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L1RollupTx {
    /// The encoded rollup.
    pub rollup: Bytes,
}

impl L1RollupTx {
    /// Returns the publication for the provided rollup.
    pub fn new(rollup: &ExtRollup) -> Self {
        Self { rollup: Codec::encode(rollup).into() }
    }

    /// Decodes the published rollup.
    pub fn decode_rollup(&self) -> Result<ExtRollup, CodecError> {
        Codec::decode(&self.rollup)
    }

    /// Returns the calldata of the `addRollup` call publishing this rollup.
    pub fn calldata(&self) -> Bytes {
        addRollupCall { rollupData: self.rollup.clone() }.abi_encode().into()
    }
}

/// An ERC20 transfer into the management contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L1DepositTx {
    /// The token contract.
    pub token: Address,
    /// The depositor.
    pub sender: Address,
    /// The amount deposited.
    pub amount: U256,
}

/// Initialization of the network secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L1InitializeSecretTx {
    /// The aggregator initializing the network.
    pub aggregator: Address,
    /// The encrypted initial secret.
    pub init_secret: Bytes,
    /// The public address of the aggregator's host.
    pub host_address: String,
}

/// Delivery of the network secret to a requesting node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L1StoreSecretTx {
    /// The node answering the request.
    pub attester: Address,
    /// The node that requested the secret.
    pub requester: Address,
    /// The attester's signature over the response.
    pub attester_sig: Bytes,
    /// The secret encrypted for the requester.
    pub secret: Bytes,
    /// The public address of the attester's host.
    pub host_address: String,
}

/// Request for the network secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L1RequestSecretTx {
    /// The attestation report of the requester.
    pub attestation: String,
}

/// An error decoding a transaction addressed to the management contract.
#[derive(Debug, thiserror::Error)]
pub enum L1TxDecodeError {
    /// The calldata is shorter than a function selector.
    #[error("calldata too short for a selector")]
    MissingSelector,
    /// The selector matches no management contract function.
    #[error("unknown management contract selector 0x{}", alloy_primitives::hex::encode(.0))]
    UnknownSelector([u8; 4]),
    /// The calldata does not match the function's ABI.
    #[error(transparent)]
    Abi(#[from] alloy_sol_types::Error),
}

/// The L1 contracts the data plane listens to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagementContract {
    address: Address,
    erc20_contracts: HashSet<Address>,
}

impl ManagementContract {
    /// Returns a new [`ManagementContract`] watching deposits on the provided ERC20 contracts.
    pub fn new(address: Address, erc20_contracts: impl IntoIterator<Item = Address>) -> Self {
        Self { address, erc20_contracts: erc20_contracts.into_iter().collect() }
    }

    /// Returns the address of the management contract.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Classifies the transaction. Returns `Ok(None)` for transactions that are unrelated to the
    /// network.
    pub fn classify(&self, tx: &L1Transaction) -> Result<Option<L1Tx>, L1TxDecodeError> {
        let Some(to) = tx.to else { return Ok(None) };

        if to == self.address {
            return self.decode_management_call(&tx.input).map(Some)
        }

        if self.erc20_contracts.contains(&to) && tx.input.starts_with(&transferCall::SELECTOR) {
            let transfer = transferCall::abi_decode(&tx.input)?;
            if transfer.to == self.address {
                return Ok(Some(
                    L1DepositTx { token: to, sender: tx.from, amount: transfer.amount }.into(),
                ))
            }
        }

        Ok(None)
    }

    fn decode_management_call(&self, input: &[u8]) -> Result<L1Tx, L1TxDecodeError> {
        let selector: [u8; 4] =
            input.get(..4).and_then(|s| s.try_into().ok()).ok_or(L1TxDecodeError::MissingSelector)?;

        let tx = match selector {
            addRollupCall::SELECTOR => {
                let call = addRollupCall::abi_decode(input)?;
                L1RollupTx { rollup: call.rollupData }.into()
            }
            initializeNetworkSecretCall::SELECTOR => {
                let call = initializeNetworkSecretCall::abi_decode(input)?;
                L1InitializeSecretTx {
                    aggregator: call.aggregatorID,
                    init_secret: call.initSecret,
                    host_address: call.hostAddress,
                }
                .into()
            }
            respondNetworkSecretCall::SELECTOR => {
                let call = respondNetworkSecretCall::abi_decode(input)?;
                L1StoreSecretTx {
                    attester: call.attesterID,
                    requester: call.requesterID,
                    attester_sig: call.attesterSig,
                    secret: call.responseSecret,
                    host_address: call.hostAddress,
                }
                .into()
            }
            requestNetworkSecretCall::SELECTOR => {
                let call = requestNetworkSecretCall::abi_decode(input)?;
                L1RequestSecretTx { attestation: call.requestReport }.into()
            }
            selector => return Err(L1TxDecodeError::UnknownSelector(selector)),
        };

        Ok(tx)
    }
}
