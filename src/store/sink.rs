//! Persistence collaborator for generated pins.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context as _;

use crate::foundation::error::{PinError, PinResult};
use crate::model::campaign::{CampaignStatus, RenderResult, RowOutcome};

/// Progress fields persisted alongside pins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProgressSnapshot {
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

impl ProgressSnapshot {
    pub fn done(&self) -> u64 {
        self.completed + self.failed
    }

    pub fn is_finished(&self) -> bool {
        self.done() >= self.total
    }
}

/// Where finished rows go. Implementations must tolerate concurrent calls
/// from multiple batch workers.
pub trait PinSink: Send + Sync {
    fn persist(&self, campaign_id: &str, result: &RenderResult) -> PinResult<()>;
    fn update_progress(
        &self,
        campaign_id: &str,
        progress: ProgressSnapshot,
        status: CampaignStatus,
    ) -> PinResult<()>;
}

/// Directory sink: one PNG per successful row plus a progress JSON.
pub struct DirPinSink {
    root: PathBuf,
}

impl DirPinSink {
    pub fn new(root: impl Into<PathBuf>) -> PinResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("create output dir '{}'", root.display()))?;
        Ok(Self { root })
    }
}

impl PinSink for DirPinSink {
    fn persist(&self, campaign_id: &str, result: &RenderResult) -> PinResult<()> {
        match &result.outcome {
            RowOutcome::Image(img) => {
                let path = self
                    .root
                    .join(format!("{campaign_id}_{:05}.png", result.row_index));
                image::save_buffer_with_format(
                    &path,
                    &img.data,
                    img.width,
                    img.height,
                    image::ColorType::Rgba8,
                    image::ImageFormat::Png,
                )
                .with_context(|| format!("write png '{}'", path.display()))?;
                Ok(())
            }
            RowOutcome::Error(message) => {
                let path = self
                    .root
                    .join(format!("{campaign_id}_{:05}.error.txt", result.row_index));
                std::fs::write(&path, message)
                    .with_context(|| format!("write error marker '{}'", path.display()))?;
                Ok(())
            }
        }
    }

    fn update_progress(
        &self,
        campaign_id: &str,
        progress: ProgressSnapshot,
        status: CampaignStatus,
    ) -> PinResult<()> {
        #[derive(serde::Serialize)]
        struct ProgressFile {
            campaign_id: String,
            status: CampaignStatus,
            #[serde(flatten)]
            progress: ProgressSnapshot,
        }

        let path = self.root.join(format!("{campaign_id}.progress.json"));
        let body = serde_json::to_vec_pretty(&ProgressFile {
            campaign_id: campaign_id.to_owned(),
            status,
            progress,
        })
        .map_err(|e| PinError::serde(e.to_string()))?;
        std::fs::write(&path, body)
            .with_context(|| format!("write progress '{}'", path.display()))?;
        Ok(())
    }
}

/// In-memory sink for pipeline tests.
#[derive(Default)]
pub struct MemorySink {
    pub results: Mutex<Vec<(String, usize, bool)>>,
    pub progress: Mutex<Vec<(ProgressSnapshot, CampaignStatus)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persisted_rows(&self) -> Vec<usize> {
        self.results.lock().unwrap().iter().map(|r| r.1).collect()
    }
}

impl PinSink for MemorySink {
    fn persist(&self, campaign_id: &str, result: &RenderResult) -> PinResult<()> {
        self.results.lock().unwrap().push((
            campaign_id.to_owned(),
            result.row_index,
            result.is_success(),
        ));
        Ok(())
    }

    fn update_progress(
        &self,
        _campaign_id: &str,
        progress: ProgressSnapshot,
        status: CampaignStatus,
    ) -> PinResult<()> {
        self.progress.lock().unwrap().push((progress, status));
        Ok(())
    }
}
