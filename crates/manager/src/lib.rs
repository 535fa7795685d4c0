//! This library contains the main manager for the Obscuro host.

mod error;
pub use error::NodeManagerError;

mod health;
pub use health::{HealthConfig, HealthDetails, HealthOracle, HealthStatus};

mod manager;
pub use manager::{
    NodeEvent, NodeManager, NodeManagerCommand, NodeManagerConfig, NodeManagerHandle,
};
