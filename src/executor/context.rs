//! Execution context management
//!
//! This module provides the ExecutionContext which carries what every
//! command needs: the cluster handle, the effective configuration and the
//! cancellation token of the running command.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::connection::SearchCluster;
use crate::executor::transfer::TransferCoordinator;

/// Execution context shared by the commands of one invocation
#[derive(Clone)]
pub struct ExecutionContext {
    /// Cluster the commands run against
    cluster: Arc<dyn SearchCluster>,

    /// Effective configuration (file + command line)
    config: Arc<Config>,

    /// Cancellation token for the running command
    cancel_token: CancellationToken,
}

impl ExecutionContext {
    /// Create a new execution context
    ///
    /// # Arguments
    /// * `cluster` - Connected cluster
    /// * `config` - Effective configuration
    ///
    /// # Returns
    /// * `Self` - New execution context
    pub fn new(cluster: Arc<dyn SearchCluster>, config: Config) -> Self {
        Self {
            cluster,
            config: Arc::new(config),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn cluster(&self) -> Arc<dyn SearchCluster> {
        self.cluster.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the cancellation token of the running command
    pub fn get_cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Transfer coordinator bound to this context's cluster, settings and
    /// cancellation token
    pub fn transfer_coordinator(&self) -> TransferCoordinator {
        let config = self.config();
        TransferCoordinator::new(self.cluster(), config.transfer.clone())
            .with_progress(config.display.progress)
            .with_cancellation(self.get_cancel_token())
    }
}
