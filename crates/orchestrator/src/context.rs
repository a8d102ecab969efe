use tokio_util::sync::CancellationToken;

use scalekit_core::host::HostRegistry;

use crate::config::OrchestratorConfig;
use crate::records::RecordStore;

/// State threaded through one orchestrator invocation.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Identifier of the sweep; names the record directory and the remote
    /// run directory.
    pub run_id: String,
    pub hosts: HostRegistry,
    pub records: RecordStore,
    pub config: OrchestratorConfig,
    /// Fired on user abort. Tracking stops between polls; remote jobs keep
    /// running and their records stay in place.
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    /// Context for a new sweep with a fresh, time-ordered run id.
    pub fn new(hosts: HostRegistry, config: OrchestratorConfig) -> Self {
        Self::resume(uuid::Uuid::now_v7().to_string(), hosts, config)
    }

    /// Context for an existing run.
    pub fn resume(
        run_id: impl Into<String>,
        hosts: HostRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        let records = RecordStore::new(config.state_dir.clone());
        Self {
            run_id: run_id.into(),
            hosts,
            records,
            config,
            cancel: CancellationToken::new(),
        }
    }
}
