//! Service wiring shared by the binary and the black-box tests.

use std::sync::Arc;

use anyhow::Context;

use sampler_core::{Clock, KvStore, Scheduler, SystemClock};
use sampler_delivery::{DeliveryWorker, Outbox, OutboxStore, RemoteTransport, RetryPolicy};
use sampler_gate::{EventGate, ParticipantRegistry, ReadinessStore, ResetJobs, ThrottleStore};
use sampler_infra::{open_pool, HttpTransport, SamplerConfig, SqliteKvStore, SqliteOutboxStore};

use crate::presenter::TracingPresenter;

/// Everything the handlers need.
pub struct AgentServices {
    pub gate: EventGate,
    pub readiness: ReadinessStore,
    pub participants: ParticipantRegistry,
    pub outbox: Arc<Outbox>,
    pub worker: Arc<DeliveryWorker>,
    pub presenter: Arc<TracingPresenter>,
    pub clock: Arc<dyn Clock>,
}

/// Open storage from `config`, wire every component and register the
/// reset and delivery jobs with `scheduler`.
pub async fn build_services(
    config: &SamplerConfig,
    scheduler: Arc<dyn Scheduler>,
) -> anyhow::Result<Arc<AgentServices>> {
    let pool = open_pool(&config.database_url).await?;
    let transport = HttpTransport::new(&config.collector_url, config.transport_timeout)
        .context("failed to build collector transport")?;

    Ok(AgentServices::assemble(
        config,
        Arc::new(SqliteKvStore::new(pool.clone())),
        Arc::new(SqliteOutboxStore::new(pool)),
        Arc::new(transport),
        scheduler,
        Arc::new(SystemClock),
    )
    .await)
}

impl AgentServices {
    /// Wire components over explicit collaborators.
    pub async fn assemble(
        config: &SamplerConfig,
        kv: Arc<dyn KvStore>,
        outbox_store: Arc<dyn OutboxStore>,
        transport: Arc<dyn RemoteTransport>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let throttle = Arc::new(ThrottleStore::new(kv.clone()));
        let readiness = ReadinessStore::new(kv.clone());
        let presenter = Arc::new(TracingPresenter::new());

        let gate = EventGate::new(
            config.gate.clone(),
            throttle.clone(),
            readiness.clone(),
            presenter.clone(),
            scheduler.clone(),
            clock.clone(),
        );
        ResetJobs::new(scheduler.clone(), throttle, clock.clone())
            .install()
            .await;

        let outbox = Arc::new(Outbox::new(
            outbox_store,
            clock.clone(),
            RetryPolicy::default(),
        ));
        let worker = Arc::new(DeliveryWorker::new(
            outbox.clone(),
            transport,
            config.worker_config(),
        ));
        worker.install(scheduler.as_ref());

        Arc::new(Self {
            gate,
            readiness,
            participants: ParticipantRegistry::new(kv),
            outbox,
            worker,
            presenter,
            clock,
        })
    }
}
