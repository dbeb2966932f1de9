use mediasoup::worker::{Worker, WorkerSettings};
use mediasoup::worker_manager::WorkerManager;
use std::sync::atomic::{AtomicUsize, Ordering};
use vidmesh_config::MediasoupSettings;

/// Round-robin pool of mediasoup workers, one OS process each. Grounded on
/// the teacher's `services/src/media/worker_pool.rs`; the `on_dead` callback
/// is kept verbatim since a dead worker there means a dead SFU process here
/// too, not something this layer can repair.
pub struct WorkerPool {
    workers: Vec<Worker>,
    next: AtomicUsize,
}

impl WorkerPool {
    pub async fn new(settings: &MediasoupSettings) -> Result<Self, anyhow::Error> {
        let manager = WorkerManager::new();
        let mut workers = Vec::with_capacity(settings.num_workers as usize);
        for _ in 0..settings.num_workers {
            let mut worker_settings = WorkerSettings::default();
            worker_settings.rtc_port_range = settings.rtc_min_port..=settings.rtc_max_port;

            let worker = manager
                .create_worker(worker_settings)
                .await
                .map_err(|e| anyhow::anyhow!("failed to spawn mediasoup worker: {e}"))?;

            worker
                .on_dead(|reason| {
                    // Fatal per spec.md §4.4: a dead worker takes its rooms'
                    // media state with it, and there is no in-process repair.
                    // Exit so an external supervisor restarts the process;
                    // in-flight clients are expected to reconnect.
                    tracing::error!(?reason, "mediasoup worker died; exiting for supervisor restart");
                    tokio::spawn(async {
                        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                        std::process::exit(1);
                    });
                })
                .detach();

            workers.push(worker);
        }

        Ok(Self {
            workers,
            next: AtomicUsize::new(0),
        })
    }

    pub fn get_worker(&self) -> &Worker {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        &self.workers[idx]
    }
}
