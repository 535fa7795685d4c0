//! The ABI of the management contract and of the ERC20 bridge deposits.

use alloy_sol_types::sol;

sol! {
    #[cfg_attr(feature = "test-utils", derive(arbitrary::Arbitrary))]
    #[derive(Debug, PartialEq, Eq)]
    function addRollup(bytes rollupData) external;

    #[cfg_attr(feature = "test-utils", derive(arbitrary::Arbitrary))]
    #[derive(Debug, PartialEq, Eq)]
    function initializeNetworkSecret(
        address aggregatorID,
        bytes initSecret,
        string hostAddress
    ) external;

    #[cfg_attr(feature = "test-utils", derive(arbitrary::Arbitrary))]
    #[derive(Debug, PartialEq, Eq)]
    function requestNetworkSecret(string requestReport) external;

    #[cfg_attr(feature = "test-utils", derive(arbitrary::Arbitrary))]
    #[derive(Debug, PartialEq, Eq)]
    function respondNetworkSecret(
        address attesterID,
        address requesterID,
        bytes attesterSig,
        bytes responseSecret,
        string hostAddress
    ) external;

    #[cfg_attr(feature = "test-utils", derive(arbitrary::Arbitrary))]
    #[derive(Debug, PartialEq, Eq)]
    function transfer(address to, uint256 amount) external returns (bool);
}
