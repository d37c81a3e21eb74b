//! The engine facade: accept a run, spawn its pipeline, hand back the
//! run id and (optionally) an event stream already attached, so no event
//! can be missed between acceptance and subscription.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::data::DataAccess;
use crate::domain::{RunRecord, TriageEvent, TriageStep, UnknownStep};
use crate::store::{RunStore, StoreError};

use super::bus::TriageBus;
use super::orchestrator;
use super::resilience::{BreakerTable, CircuitState};
use super::simulation::SimulationPlan;

/// Failures accepting a run. Once a run is accepted, the pipeline never
/// surfaces an error to the caller; it degrades and finalizes instead.
#[derive(Debug, Error)]
pub enum TriageError {
    #[error(transparent)]
    UnknownStep(#[from] UnknownStep),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Shared state behind the facade. Breakers and the bus outlive any single
/// run; the config is fixed for the engine's lifetime.
pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) data: Arc<dyn DataAccess>,
    pub(crate) store: Arc<dyn RunStore>,
    pub(crate) bus: TriageBus,
    pub(crate) breakers: BreakerTable,
}

/// The triage engine. Cheap to clone; all clones share breaker state and
/// the event bus.
#[derive(Clone)]
pub struct TriageEngine {
    inner: Arc<EngineInner>,
}

impl TriageEngine {
    pub fn new(config: EngineConfig, data: Arc<dyn DataAccess>, store: Arc<dyn RunStore>) -> Self {
        let bus = TriageBus::new(config.bus_linger());
        Self {
            inner: Arc::new(EngineInner {
                config,
                data,
                store,
                bus,
                breakers: BreakerTable::default(),
            }),
        }
    }

    /// Accept a triage run and return its id immediately; the pipeline
    /// runs on a spawned task.
    pub async fn start_run(
        &self,
        alert_id: &str,
        simulation: SimulationPlan,
    ) -> Result<Uuid, TriageError> {
        let (run_id, _events) = self.start_run_streaming(alert_id, simulation).await?;
        Ok(run_id)
    }

    /// Accept a run and return a receiver subscribed before the pipeline
    /// starts, so the caller observes the stream from `plan_built` on.
    pub async fn start_run_streaming(
        &self,
        alert_id: &str,
        simulation: SimulationPlan,
    ) -> Result<(Uuid, broadcast::Receiver<TriageEvent>), TriageError> {
        let plan = self.inner.config.plan()?;
        let run_id = Uuid::new_v4();

        let record = RunRecord::pending(run_id, alert_id);
        self.inner.store.write_record(&record).await?;

        let events = self.inner.bus.create(run_id);
        info!(%run_id, alert_id, "run accepted");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let pipeline = orchestrator::execute(&inner, record, plan, simulation);
            if AssertUnwindSafe(pipeline).catch_unwind().await.is_err() {
                // The pipeline itself contains step panics; this guards the
                // machinery around it. Other runs are unaffected.
                error!(%run_id, "triage pipeline panicked");
                inner.bus.publish(
                    run_id,
                    TriageEvent::fallback_triggered("tool_error: pipeline panicked"),
                );
            }
        });

        Ok((run_id, events))
    }

    /// Attach to a run's event stream; `None` once the channel is reclaimed
    pub fn subscribe(&self, run_id: Uuid) -> Option<broadcast::Receiver<TriageEvent>> {
        self.inner.bus.subscribe(run_id)
    }

    /// Whether a run's stream is still live
    pub fn is_live(&self, run_id: Uuid) -> bool {
        self.inner.bus.is_live(run_id)
    }

    /// Snapshot of a step's circuit-breaker state
    pub fn breaker_state(&self, step: TriageStep) -> CircuitState {
        self.inner.breakers.state(step)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}
