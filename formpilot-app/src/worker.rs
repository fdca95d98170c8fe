//! Wires the running system together: store and queue actors, the worker
//! pool, and the artifact sweeper, all tracked for graceful teardown.
use anyhow::{anyhow, Result};
use formpilot_actors::{
    actor::Addr,
    builder::Builder,
    queue::{QueueActor, QueueMsg},
    store::{self, StoreActor, StoreMsg},
    supervise::supervise,
};
use formpilot_common::StealthLevel;
use formpilot_config::{BrowserConfig, FormpilotConfig};
use formpilot_driver::{ContextPool, StealthSession};
use formpilot_llm::ensure_capability_ready;
use formpilot_pipeline::run::FailureReason;
use formpilot_pipeline::{
    ApplicationRequest, ApplicationRun, CandidateProfile, OutcomeEvent, PipelineEngine, RunState,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const MAILBOX: usize = 1024;
/// Outcome fan-out capacity; slow subscribers lag rather than block workers.
const OUTCOME_CAPACITY: usize = 256;

pub struct PilotSystem {
    pub builder: Builder,
    pub queue: Addr<QueueActor>,
    pub store: Addr<StoreActor>,
    pub outcomes: broadcast::Sender<OutcomeEvent>,
}

/// Build the actor system and worker pool from configuration.
pub async fn build_system(
    cfg: &FormpilotConfig,
    cancel: Arc<CancellationToken>,
) -> Result<PilotSystem> {
    let mut builder = Builder::new();

    // reserve first so addresses exist for cross-wiring
    let r_queue = builder.reserve::<QueueActor>("queue:main", MAILBOX);
    let r_store = builder.reserve::<StoreActor>("store:main", MAILBOX);

    let options = SqliteConnectOptions::from_str(&cfg.store.database_url)
        .map_err(|e| anyhow!("invalid store.database_url: {e}"))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    StoreActor::migrate(&pool).await?;

    builder.start_reserved(r_store, StoreActor::new(pool));
    builder.start_reserved(r_queue, QueueActor::new());

    let queue: Addr<QueueActor> = builder.addr("queue:main").expect("queue addr");
    let store: Addr<StoreActor> = builder.addr("store:main").expect("store addr");

    // periodic TTL sweep beside the store, restarted on crash
    let sweep_store = store.clone();
    let sweep_every = Duration::from_secs(cfg.store.sweep_interval_secs);
    let sweep_shutdown = builder.shutdown_notifier();
    let supervisor_shutdown = builder.shutdown_notifier();
    builder.track(supervise(
        move || store::sweep_loop(sweep_store.clone(), sweep_every, sweep_shutdown.resubscribe()),
        supervisor_shutdown,
    ));

    let capability = ensure_capability_ready(&cfg.capability).await;
    let mut engine = PipelineEngine::new(
        cfg.detection.clone(),
        cfg.mapping.clone(),
        cfg.retries.clone(),
    )?;
    if let Some(capability) = capability {
        engine = engine.with_capability(capability);
    }
    let engine = Arc::new(engine);

    let (outcomes, _) = broadcast::channel(OUTCOME_CAPACITY);
    let contexts = ContextPool::new(cfg.browser.pool_size);

    for index in 0..cfg.browser.pool_size {
        builder.track(worker_loop(WorkerDeps {
            index,
            queue: queue.clone(),
            store: store.clone(),
            engine: engine.clone(),
            contexts: contexts.clone(),
            browser: cfg.browser.clone(),
            artifact_ttl_secs: cfg.store.artifact_ttl_secs,
            outcomes: outcomes.clone(),
            cancel: cancel.clone(),
            shutdown: builder.shutdown_notifier(),
        }));
    }

    Ok(PilotSystem {
        builder,
        queue,
        store,
        outcomes,
    })
}

struct WorkerDeps {
    index: usize,
    queue: Addr<QueueActor>,
    store: Addr<StoreActor>,
    engine: Arc<PipelineEngine>,
    contexts: ContextPool,
    browser: BrowserConfig,
    artifact_ttl_secs: i64,
    outcomes: broadcast::Sender<OutcomeEvent>,
    cancel: Arc<CancellationToken>,
    shutdown: broadcast::Receiver<()>,
}

/// One worker: dequeue, acquire a browser context, execute the run, persist
/// artifacts, emit the outcome, release the run id. A saturated context
/// pool requeues the run instead of failing it.
async fn worker_loop(mut deps: WorkerDeps) -> Result<()> {
    loop {
        let (tx, rx) = oneshot::channel();
        if deps.queue.send(QueueMsg::Dequeue { reply: tx }).await.is_err() {
            return Ok(());
        }
        let request = tokio::select! {
            _ = deps.shutdown.recv() => return Ok(()),
            got = rx => match got {
                Ok(request) => request,
                Err(_) => return Ok(()),
            },
        };

        let permit = deps
            .contexts
            .acquire(Duration::from_secs(deps.browser.acquire_timeout_secs))
            .await;
        let Some(permit) = permit else {
            info!(
                target: "worker",
                worker = deps.index,
                run_id = %request.run_id,
                "no browser context within timeout; requeueing"
            );
            let _ = deps.queue.send(QueueMsg::Requeue(request)).await;
            continue;
        };

        let run_id = request.run_id;
        let event = execute_run(&deps, &request).await;
        drop(permit);

        match event {
            Ok(event) => {
                let _ = deps.outcomes.send(event);
            }
            Err(e) => {
                error!(target: "worker", worker = deps.index, run_id = %run_id, error = %e, "run setup failed");
                let _ = deps.outcomes.send(OutcomeEvent {
                    run_id,
                    final_state: RunState::Failed(FailureReason::Internal),
                    filled_field_count: 0,
                    unresolved_field_count: 0,
                    screenshot_refs: vec![],
                });
            }
        }

        let _ = deps.queue.send(QueueMsg::Complete { run_id }).await;
    }
}

/// Run one application attempt inside a fresh browser context and persist
/// its artifacts with the configured TTL.
async fn execute_run(deps: &WorkerDeps, request: &ApplicationRequest) -> Result<OutcomeEvent> {
    let mut profile = CandidateProfile::from_yaml_file(&request.profile_ref)?;
    for (kind, path) in &request.document_refs {
        profile.documents.insert(*kind, path.clone());
    }

    let mut session = StealthSession::launch(
        &deps.browser.webdriver_url,
        deps.browser.headless,
        stealth_level(&deps.browser.stealth),
    )
    .await?;

    let mut run = ApplicationRun::new(request, deps.artifact_ttl_secs);
    let (event, artifacts) = deps
        .engine
        .execute(&mut session, &mut run, &profile, &deps.cancel)
        .await;

    if let Err(e) = session.close().await {
        warn!(target: "worker", run_id = %run.id, error = %e, "browser context close failed");
    }

    persist_artifacts(deps, &run, &event, artifacts).await;
    Ok(event)
}

async fn persist_artifacts(
    deps: &WorkerDeps,
    run: &ApplicationRun,
    event: &OutcomeEvent,
    artifacts: formpilot_pipeline::RunArtifacts,
) {
    let ttl = run.ttl_secs;
    let mut puts: Vec<(String, String, Vec<u8>)> = Vec::new();

    if let Some(schema) = artifacts.schema_snapshot {
        puts.push((format!("{}/schema.json", run.id), "schema".into(), schema.into_bytes()));
    }
    if let Some(mapping) = artifacts.mapping_log {
        puts.push((format!("{}/mapping.json", run.id), "mapping".into(), mapping.into_bytes()));
    }
    for (key, bytes) in artifacts.screenshots {
        puts.push((key, "screenshot".into(), bytes));
    }
    if let Ok(log) = serde_json::to_vec(run) {
        puts.push((format!("{}/run.json", run.id), "run_log".into(), log));
    }
    if let Ok(outcome) = serde_json::to_vec(event) {
        puts.push((format!("{}/outcome.json", run.id), "outcome".into(), outcome));
    }

    for (key, kind, payload) in puts {
        if deps
            .store
            .send(StoreMsg::PutArtifact {
                key,
                kind,
                payload,
                ttl_secs: ttl,
            })
            .await
            .is_err()
        {
            warn!(target: "worker", run_id = %run.id, "store unavailable; artifact dropped");
            break;
        }
    }
}

fn stealth_level(raw: &str) -> StealthLevel {
    match raw.to_ascii_lowercase().as_str() {
        "lightweight" => StealthLevel::Lightweight,
        "maximum" => StealthLevel::Maximum,
        _ => StealthLevel::Balanced,
    }
}
