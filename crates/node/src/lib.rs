//! The Obscuro host: configuration, wiring of the data plane components and JSON-RPC surface.

pub mod args;
pub use args::ObscuroNodeArgs;

mod constants;

mod exit;
pub use exit::ExitStatus;

mod node;
pub use node::{NodeComponents, NodeError, ObscuroNode, ObscuroNodeConfig};

mod rpc;
pub use rpc::{start_rpc_server, ObscuroApiServer, ObscuroRpc};
