//! The crate exposes the clients of the external systems the host talks to: the L1 chain and the
//! trusted enclave.

mod enclave;
pub use enclave::{
    EnclaveApiClient, EnclaveClient, EnclaveEvent, RpcEnclaveClient, SubscriptionId,
};

mod error;
pub use error::{EnclaveError, L1ProviderError};

mod l1;
pub use l1::{AlloyL1Client, L1Client};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
