/// Mnemonic anvil derives its default pre-funded accounts from.
pub const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

pub const DEFAULT_CHAIN_ID: u64 = 31337;
pub const DEFAULT_ACCOUNT_COUNT: u32 = 10;
pub const DEFAULT_ACCOUNT_BALANCE_ETH: u64 = 10_000;

/// Gas ceiling used for deployments and transactions when none is given.
pub const DEFAULT_GAS_LIMIT: u64 = 3_000_000;

pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_CONFIRMATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
pub const DEFAULT_CASE_TIMEOUT_MS: u64 = 60_000;

/// Ports tried before falling back to an OS-assigned one, kept away from 8545
/// so a developer's own node is left alone.
pub const PREFERRED_NODE_PORTS: [u16; 5] = [9545, 9546, 9547, 9548, 9549];

pub const ENV_RPC_URL: &str = "CONTRACT_HARNESS_RPC_URL";
pub const ENV_ARTIFACTS_DIR: &str = "CONTRACT_HARNESS_ARTIFACTS_DIR";

/// Marker solc leaves in bytecode for libraries that still need linking.
pub const LINK_PLACEHOLDER_PREFIX: &str = "__$";
