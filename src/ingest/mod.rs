// src/ingest/mod.rs
// Scheduled ingestion: runs the pipeline across all configured channels on
// an interval, bounding how many channels are in flight at once.

pub mod pipeline;
pub mod state;

use crate::chat::ChatClient;
use crate::config::SchedulerConfig;
use crate::embedding::EmbeddingClient;
use crate::vector::VectorStore;
use pipeline::{ChannelRunReport, IngestPipeline};
use state::IngestionStateStore;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

pub struct RunReport {
    pub run_id: u64,
    pub channels: Vec<ChannelRunReport>,
}

impl RunReport {
    pub fn total_processed(&self) -> u64 {
        self.channels.iter().map(|c| c.messages_processed).sum()
    }

    pub fn any_failed(&self) -> bool {
        self.channels.iter().any(|c| c.failed)
    }
}

/// Drives the ingestion pipeline on a fixed interval. Fires once immediately
/// on `start`, then every `refresh_interval`, skipping missed ticks instead
/// of bursting to catch up.
pub struct IngestionScheduler {
    pipeline: Arc<IngestPipeline>,
    state: Arc<IngestionStateStore>,
    channels: Vec<String>,
    config: SchedulerConfig,
    handle: Option<JoinHandle<()>>,
}

impl IngestionScheduler {
    pub fn new(
        chat: Arc<ChatClient>,
        embedding: Arc<EmbeddingClient>,
        vector_store: Arc<dyn VectorStore>,
        channels: Vec<String>,
        config: SchedulerConfig,
    ) -> Self {
        let state = Arc::new(IngestionStateStore::load(&config.ingestion_state_path));
        let pipeline = Arc::new(IngestPipeline::new(chat, embedding, vector_store, state.clone()));

        Self {
            pipeline,
            state,
            channels,
            config,
            handle: None,
        }
    }

    /// Runs a single ingestion pass synchronously, across all configured
    /// channels, bounded to `max_concurrent_channels` in flight at once.
    pub async fn run_once(&self) -> RunReport {
        let run_id = self.state.bump_run_id();
        info!("starting ingestion run {} over {} channels", run_id, self.channels.len());

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_channels.max(1)));
        let mut handles = Vec::with_capacity(self.channels.len());

        for channel_id in &self.channels {
            let pipeline = self.pipeline.clone();
            let permit = semaphore.clone();
            let channel_id = channel_id.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore closed");
                pipeline.run_channel(&channel_id).await
            }));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => warn!("channel ingestion task panicked: {}", e),
            }
        }

        let failures = reports.iter().filter(|r| r.failed).count();
        info!(
            "ingestion run {} complete: {} channels, {} failed, {} messages processed",
            run_id,
            reports.len(),
            failures,
            reports.iter().map(|r| r.messages_processed).sum::<u64>()
        );

        RunReport { run_id, channels: reports }
    }

    /// Spawns the background interval loop. Returns immediately; call
    /// `shutdown` to stop it.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }

        let pipeline = self.pipeline.clone();
        let state = self.state.clone();
        let channels = self.channels.clone();
        let max_concurrent = self.config.max_concurrent_channels.max(1);
        let refresh_interval = self.config.refresh_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let run_id = state.bump_run_id();
                info!("ingestion tick: starting run {}", run_id);

                let semaphore = Arc::new(Semaphore::new(max_concurrent));
                let mut handles = Vec::with_capacity(channels.len());

                for channel_id in &channels {
                    let pipeline = pipeline.clone();
                    let permit = semaphore.clone();
                    let channel_id = channel_id.clone();

                    handles.push(tokio::spawn(async move {
                        let _permit = permit.acquire_owned().await.expect("semaphore closed");
                        pipeline.run_channel(&channel_id).await
                    }));
                }

                for handle in handles {
                    if let Err(e) = handle.await {
                        warn!("channel ingestion task panicked during scheduled run: {}", e);
                    }
                }

                info!("ingestion tick: run {} finished", run_id);
            }
        });

        self.handle = Some(handle);
    }

    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn state(&self) -> Arc<IngestionStateStore> {
        self.state.clone()
    }
}

impl Drop for IngestionScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
