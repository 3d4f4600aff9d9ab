//! Engine lifecycle
//!
//! Wires the queue, detectors, handlers, and reconciliation together for
//! one sync session: bootstrap the watermark, then pump the two change
//! channels into their detectors until stopped.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::errors::Result;
use crate::handlers::{register_local_handlers, register_remote_handlers, Stores};
use crate::ignore::IgnoreFilter;
use crate::local::LocalDetector;
use crate::model::{LocalChange, RemoteChange};
use crate::online::OnlineMonitor;
use crate::queue::{EventQueue, Registration};
use crate::reconcile::Reconciler;
use crate::remote::RemoteDetector;
use crate::store::StateStore;

pub struct SyncEngine {
    settings: SyncSettings,
    queue: EventQueue,
    local_detector: Arc<LocalDetector>,
    remote_detector: Arc<RemoteDetector>,
    registrations: Vec<Registration>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncEngine {
    /// Bring a sync session up.
    ///
    /// Registers all handlers, runs the first-time or warm startup
    /// reconciliation, persists the resulting watermark, and spawns the
    /// two detector loops. When `sync_enabled` is false no handlers or
    /// detectors run; the change channels stay open and everything they
    /// deliver is discarded.
    pub async fn start(
        settings: SyncSettings,
        online: OnlineMonitor,
        stores: Stores,
        state: Arc<dyn StateStore>,
        local_rx: mpsc::Receiver<LocalChange>,
        remote_rx: mpsc::Receiver<Vec<RemoteChange>>,
    ) -> Result<Self> {
        let ignores = IgnoreFilter::new(&settings.ignore_patterns)?;
        let queue = EventQueue::new(settings.clone(), online, state.clone()).await;

        let local_detector = Arc::new(LocalDetector::new(
            queue.clone(),
            stores.local.clone(),
            stores.index.clone(),
            ignores.clone(),
            settings.clone(),
        ));
        let remote_detector = Arc::new(
            RemoteDetector::new(
                queue.clone(),
                stores.local.clone(),
                state.clone(),
                ignores,
                settings.clone(),
            )
            .await?,
        );

        if !settings.sync_enabled {
            info!("synchronization is disabled");

            // The channels must stay open for producers; a disabled
            // engine drains them and discards every change.
            let mut tasks = Vec::new();
            tasks.push(tokio::spawn(async move {
                let mut local_rx = local_rx;
                while local_rx.recv().await.is_some() {}
                debug!("local change channel closed");
            }));
            tasks.push(tokio::spawn(async move {
                let mut remote_rx = remote_rx;
                while remote_rx.recv().await.is_some() {}
                debug!("remote change channel closed");
            }));

            return Ok(Self {
                settings,
                queue,
                local_detector,
                remote_detector,
                registrations: Vec::new(),
                tasks,
            });
        }

        let mut registrations =
            register_local_handlers(&queue, stores.clone(), settings.max_retries).await;
        registrations
            .extend(register_remote_handlers(&queue, stores.clone(), settings.max_retries).await);

        let reconciler = Reconciler::new(
            local_detector.clone(),
            remote_detector.clone(),
            stores.local.clone(),
            stores.index.clone(),
            settings.clone(),
        );

        let watermark = state.watermark().await?;
        let watermark = if watermark == 0 {
            info!("starting first-time sync");
            reconciler.first_sync().await?
        } else {
            info!("starting warm sync from watermark {}", watermark);
            reconciler.startup_sync(watermark).await?
        };
        state.set_watermark(watermark).await?;

        let mut tasks = Vec::new();

        tasks.push(tokio::spawn({
            let detector = local_detector.clone();
            let internal = settings.internal_sync_enabled;
            async move {
                let mut local_rx = local_rx;
                while let Some(change) = local_rx.recv().await {
                    if matches!(change, LocalChange::Raw(_)) && !internal {
                        continue;
                    }
                    if let Err(err) = detector.dispatch(change).await {
                        warn!("local change dropped: {}", err);
                    }
                }
                debug!("local change channel closed");
            }
        }));

        tasks.push(tokio::spawn({
            let detector = remote_detector.clone();
            async move {
                let mut remote_rx = remote_rx;
                while let Some(changes) = remote_rx.recv().await {
                    if let Err(err) = detector.handle_changes(changes).await {
                        warn!("remote change batch dropped: {}", err);
                    }
                }
                debug!("remote change channel closed");
            }
        }));

        info!("sync engine started");
        Ok(Self {
            settings,
            queue,
            local_detector,
            remote_detector,
            registrations,
            tasks,
        })
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn local_detector(&self) -> &Arc<LocalDetector> {
        &self.local_detector
    }

    pub fn remote_detector(&self) -> &Arc<RemoteDetector> {
        &self.remote_detector
    }

    /// The live watermark as advanced by the remote detector.
    pub fn watermark(&self) -> i64 {
        self.remote_detector.watermark()
    }

    /// Tear the session down: stop the detector loops, clear handler
    /// registrations, and detach the queue's subscriptions. Persisted
    /// state is left in place for the next start.
    pub async fn stop(self) {
        for task in self.tasks {
            task.abort();
        }
        for registration in self.registrations {
            registration.unsubscribe().await;
        }
        self.queue.destroy().await;
        info!("sync engine stopped");
    }
}
