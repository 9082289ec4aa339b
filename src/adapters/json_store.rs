use crate::adapters::memory_store::StoreState;
use crate::domain::model::{
    AggregateStats, Campaign, CampaignId, Recipient, RecipientId, StatusUpdate,
};
use crate::domain::ports::RecipientStore;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// File-backed store: the whole state lives in one JSON document that is
/// rewritten (temp file + rename) after every change, under the write lock.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl JsonFileStore {
    /// 開啟既有檔案，不存在時從空白狀態開始
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Store file {} not found, starting empty", path.display());
                StoreState::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn create_campaign(&self, name: &str, subject: &str, body: &str) -> Result<Campaign> {
        let mut state = self.state.lock().await;
        let campaign = state.create_campaign(name, subject, body);
        self.save(&state).await?;
        Ok(campaign)
    }

    pub async fn add_recipients(
        &self,
        campaign_id: CampaignId,
        entries: &[(String, Option<String>)],
    ) -> Result<Vec<Recipient>> {
        let mut state = self.state.lock().await;
        let added = state.add_recipients(campaign_id, entries)?;
        self.save(&state).await?;
        Ok(added)
    }

    pub async fn campaign(&self, campaign_id: CampaignId) -> Result<Campaign> {
        self.state.lock().await.campaign(campaign_id)
    }

    pub async fn campaigns(&self) -> Vec<Campaign> {
        self.state.lock().await.campaigns()
    }

    pub async fn recipient(&self, recipient_id: RecipientId) -> Result<Recipient> {
        self.state.lock().await.recipient(recipient_id)
    }

    pub async fn recorded_aggregate(&self, campaign_id: CampaignId) -> Option<AggregateStats> {
        self.state.lock().await.recorded_aggregate(campaign_id)
    }

    async fn save(&self, state: &StoreState) -> Result<()> {
        let data = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RecipientStore for JsonFileStore {
    async fn fetch_recipients(&self, campaign_id: CampaignId) -> Result<Vec<Recipient>> {
        self.state.lock().await.recipients(campaign_id)
    }

    async fn update_status(&self, recipient_id: RecipientId, update: StatusUpdate) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.update_status(recipient_id, &update)? {
            self.save(&state).await?;
        }
        Ok(())
    }

    async fn recompute_aggregate(&self, campaign_id: CampaignId) -> Result<AggregateStats> {
        let mut state = self.state.lock().await;
        let (stats, changed) = state.recompute_aggregate(campaign_id)?;
        if changed {
            self.save(&state).await?;
        }
        Ok(stats)
    }

    async fn mark_responded(&self, recipient_id: RecipientId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.mark_responded(recipient_id)?;
        self.save(&state).await
    }
}
