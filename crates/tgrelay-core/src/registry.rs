use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{domain::RecipientId, errors::Error, Result};

/// On-disk shape of the recipients document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RecipientsFile {
    #[serde(default)]
    recipients: Vec<RecipientId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// The recipient list plus its backing JSON document.
///
/// Mutations hold the lock across the file write, so the in-memory list and
/// the document never disagree once a call returns. A failed write rolls the
/// in-memory change back.
#[derive(Debug)]
pub struct RecipientRegistry {
    path: PathBuf,
    recipients: Mutex<Vec<RecipientId>>,
}

impl RecipientRegistry {
    /// Load the document at `path` (see [`load_recipients`]) and take ownership of it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let recipients = load_recipients(&path);
        Self {
            path,
            recipients: Mutex::new(recipients),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point-in-time snapshot, in insertion order.
    pub async fn list(&self) -> Vec<RecipientId> {
        self.recipients.lock().await.clone()
    }

    pub async fn add(&self, id: RecipientId) -> Result<AddOutcome> {
        let mut recipients = self.recipients.lock().await;
        if recipients.contains(&id) {
            return Ok(AddOutcome::AlreadyPresent);
        }

        recipients.push(id);
        if let Err(e) = self.persist(recipients.clone()).await {
            recipients.pop();
            return Err(e);
        }
        Ok(AddOutcome::Added)
    }

    pub async fn remove(&self, id: RecipientId) -> Result<RemoveOutcome> {
        let mut recipients = self.recipients.lock().await;
        let Some(pos) = recipients.iter().position(|r| *r == id) else {
            return Ok(RemoveOutcome::NotFound);
        };

        recipients.remove(pos);
        if let Err(e) = self.persist(recipients.clone()).await {
            recipients.insert(pos, id);
            return Err(e);
        }
        Ok(RemoveOutcome::Removed)
    }

    /// Write `recipients` off the async workers; the caller still holds the lock.
    async fn persist(&self, recipients: Vec<RecipientId>) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || save_recipients(&path, &recipients))
            .await
            .map_err(|e| Error::External(format!("recipients save task failed: {e}")))?
    }
}

/// Read the recipients document.
///
/// A missing file is created empty. An unreadable or malformed document
/// (including non-integer entries) is logged and treated as empty; it is left
/// on disk untouched until the next successful mutation overwrites it.
/// Repeated ids keep their first occurrence.
pub fn load_recipients(path: &Path) -> Vec<RecipientId> {
    if !path.exists() {
        warn!(path = %path.display(), "recipients file not found, creating an empty one");
        if let Err(e) = save_recipients(path, &[]) {
            error!(path = %path.display(), error = %e, "failed to create recipients file");
        }
        return Vec::new();
    }

    match read_recipients(path) {
        Ok(recipients) => {
            let recipients = dedup_in_order(recipients);
            info!(count = recipients.len(), "loaded recipients");
            recipients
        }
        Err(e) => {
            error!(
                path = %path.display(),
                error = %e,
                "failed to read recipients file, starting with an empty list"
            );
            Vec::new()
        }
    }
}

fn dedup_in_order(recipients: Vec<RecipientId>) -> Vec<RecipientId> {
    let total = recipients.len();
    let mut seen = HashSet::with_capacity(total);
    let unique: Vec<RecipientId> = recipients
        .into_iter()
        .filter(|id| seen.insert(*id))
        .collect();
    if unique.len() != total {
        warn!(
            dropped = total - unique.len(),
            "recipients file lists some ids more than once, keeping the first of each"
        );
    }
    unique
}

fn read_recipients(path: &Path) -> Result<Vec<RecipientId>> {
    let txt = std::fs::read_to_string(path)?;
    let data: RecipientsFile = serde_json::from_str(&txt)?;
    Ok(data.recipients)
}

/// Overwrite the recipients document.
///
/// The JSON is written to a sibling temp file and renamed over the target, so a
/// crash mid-write never leaves a truncated document behind.
pub fn save_recipients(path: &Path, recipients: &[RecipientId]) -> Result<()> {
    let data = RecipientsFile {
        recipients: recipients.to_vec(),
    };
    let mut txt = serde_json::to_string_pretty(&data)?;
    txt.push('\n');

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, txt)?;
    std::fs::rename(&tmp, path)?;

    info!(count = recipients.len(), "recipients saved");
    Ok(())
}
