//! Unit supervisor.
//!
//! Registers, starts, and stops replication units. Exactly one worker task
//! per unit; two units never share a destination table. A failed unit is
//! reported, removed from the running set, and never restarted without
//! operator action.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use siphon_api::destination::{DestinationClient, TableRef};
use siphon_api::source::SourceClient;

use crate::config::UnitConfig;
use crate::error::EngineError;
use crate::replicator::{ReplicationSettings, Replicator};

/// Completion notice of one unit.
pub struct UnitExit {
    pub key: String,
    pub result: Result<(), EngineError>,
}

/// Per-unit stop signal + join handle.
struct UnitSlot {
    table: TableRef,
    handle: JoinHandle<()>,
    token: CancellationToken,
}

pub struct Supervisor {
    source: Arc<dyn SourceClient>,
    destination: Arc<dyn DestinationClient>,
    settings: ReplicationSettings,
    default_database: String,
    units: HashMap<String, UnitSlot>,
    exit_tx: mpsc::UnboundedSender<UnitExit>,
    exit_rx: mpsc::UnboundedReceiver<UnitExit>,
}

impl Supervisor {
    pub fn new(
        source: Arc<dyn SourceClient>,
        destination: Arc<dyn DestinationClient>,
        settings: ReplicationSettings,
        default_database: impl Into<String>,
    ) -> Self {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        Self {
            source,
            destination,
            settings,
            default_database: default_database.into(),
            units: HashMap::new(),
            exit_tx,
            exit_rx,
        }
    }

    /// Register and start one unit. Duplicate unit names and duplicate
    /// destination tables are configuration errors.
    pub fn start_unit(&mut self, cfg: &UnitConfig) -> Result<(), EngineError> {
        if self.units.contains_key(&cfg.name) {
            return Err(EngineError::Config(format!("unit '{}' is already registered", cfg.name)));
        }
        let table = TableRef::new(
            cfg.database.clone().unwrap_or_else(|| self.default_database.clone()),
            cfg.table.clone(),
        );
        if let Some((owner, _)) = self.units.iter().find(|(_, slot)| slot.table == table) {
            return Err(EngineError::Config(format!(
                "destination table '{table}' is already owned by unit '{owner}'"
            )));
        }

        let token = CancellationToken::new();
        let mut replicator = Replicator::new(
            cfg.name.clone(),
            cfg.stream.clone(),
            table.clone(),
            cfg.live,
            self.settings,
            Arc::clone(&self.source),
            Arc::clone(&self.destination),
            token.clone(),
        );
        let key = cfg.name.clone();
        let exit_tx = self.exit_tx.clone();
        let handle = tokio::spawn(async move {
            let result = replicator.run().await;
            match &result {
                Ok(()) => tracing::info!(unit = %key, "unit finished"),
                Err(e) => tracing::error!(unit = %key, error = %e, "unit failed"),
            }
            let _ = exit_tx.send(UnitExit { key, result });
        });

        tracing::info!(unit = %cfg.name, stream = %cfg.stream, table = %table, live = cfg.live, "unit started");
        self.units.insert(cfg.name.clone(), UnitSlot { table, handle, token });
        Ok(())
    }

    pub fn running(&self) -> usize {
        self.units.len()
    }

    /// Wait for the next unit to finish or fail. The unit is removed from
    /// the running set; restarting is an explicit operator action.
    pub async fn next_exit(&mut self) -> Option<UnitExit> {
        if self.units.is_empty() {
            return None;
        }
        let exit = self.exit_rx.recv().await?;
        if let Some(slot) = self.units.remove(&exit.key) {
            let _ = slot.handle.await;
        }
        Some(exit)
    }

    /// Signal every unit to stop and wait for them. In-flight flushes run
    /// to completion; the stop flag is only polled between iterations.
    pub async fn shutdown(mut self) {
        for slot in self.units.values() {
            slot.token.cancel();
        }
        for (_, slot) in self.units.drain() {
            let _ = slot.handle.await;
        }
        tracing::info!("supervisor shut down");
    }
}
