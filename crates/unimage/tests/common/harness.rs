//! Test harness for isolated studio execution.
//!
//! Every harness owns a temporary data directory and a scripted
//! [`StubClient`], so runs never touch the network or the user's data.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

use unimage::client::StubReply;
use unimage::{KvStore, NoticeLevel, StubClient, Studio, StudioConfig, StudioEvent};

pub struct TestHarness {
    temp_dir: TempDir,
    pub data_dir: PathBuf,
    pub client: Arc<StubClient>,
    pub studio: Studio,
}

impl TestHarness {
    /// Harness with credentials and no scripted replies.
    pub fn new() -> Self {
        Self::with_client(StubClient::new())
    }

    pub fn with_client(client: StubClient) -> Self {
        Self::with_quota(client, StudioConfig::default().storage.quota_bytes)
    }

    /// Harness whose store rejects writes past `quota_bytes`.
    pub fn with_quota(client: StubClient, quota_bytes: u64) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let data_dir = temp_dir.path().join("data");
        let client = Arc::new(client);
        let studio = build_studio(&data_dir, client.clone(), quota_bytes);
        Self {
            temp_dir,
            data_dir,
            client,
            studio,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A second studio over the same data directory, as after a restart.
    pub fn reopen(&self) -> Studio {
        build_studio(
            &self.data_dir,
            Arc::new(StubClient::new()),
            StudioConfig::default().storage.quota_bytes,
        )
    }

    /// Writes a `width` x `height` PNG into the temp directory.
    pub fn write_png(&self, name: &str, width: u32, height: u32) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]))
            .save(&path)
            .expect("Failed to write test image");
        path
    }

    /// Loads a fresh 16:9 PNG as the source asset.
    pub fn load_source(&self) -> PathBuf {
        let path = self.write_png("source.png", 32, 18);
        self.studio
            .load_asset(&path, None)
            .expect("Failed to load source asset");
        path
    }
}

/// Config with completion delays disabled so runs finish synchronously.
pub fn test_config(data_dir: &Path) -> StudioConfig {
    let mut config = StudioConfig::default();
    config.storage.data_dir = Some(data_dir.to_path_buf());
    config.pipeline.completion_delay_ms = 0;
    config.pipeline.video_completion_delay_ms = 0;
    config
}

fn build_studio(data_dir: &Path, client: Arc<StubClient>, quota_bytes: u64) -> Studio {
    let mut config = test_config(data_dir);
    config.storage.quota_bytes = quota_bytes;
    let kv = KvStore::open(data_dir, quota_bytes).expect("Failed to open store");
    Studio::new(Arc::new(config), client, Arc::new(kv))
}

pub fn chunks(parts: &[&str]) -> StubReply {
    StubReply::Chunks(parts.iter().map(|p| p.to_string()).collect())
}

/// Every event currently queued on `rx`.
pub fn drain(rx: &mut Receiver<StudioEvent>) -> Vec<StudioEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

/// Messages of the notices in `events` at `level`.
pub fn notices(events: &[StudioEvent], level: NoticeLevel) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            StudioEvent::Notice { level: l, message } if *l == level => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// Polls `condition` until it holds or a second has passed.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("Condition not reached in time");
}
