use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info};

use crate::db::Storage;
use crate::error::AppError;
use crate::models::MessageRecord;

const DAY: u64 = 24 * 60 * 60;
const SESSION: Duration = Duration::from_secs(30 * 60);

/// Which messages a retention purge removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionRange {
    All,
    /// Everything timestamped before `now - duration`.
    OlderThan(Duration),
}

impl RetentionRange {
    /// The cutoff instant, `None` for [`RetentionRange::All`].
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, AppError> {
        match self {
            Self::All => Ok(None),
            Self::OlderThan(age) => {
                let age = chrono::Duration::from_std(*age)
                    .map_err(|_| AppError::validation("Retention range is too large"))?;
                now.checked_sub_signed(age)
                    .map(Some)
                    .ok_or_else(|| AppError::validation("Retention range is too large"))
            }
        }
    }
}

impl FromStr for RetentionRange {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let range = match s.trim() {
            "all" => Self::All,
            "30days" => Self::OlderThan(Duration::from_secs(30 * DAY)),
            "7days" => Self::OlderThan(Duration::from_secs(7 * DAY)),
            "1day" => Self::OlderThan(Duration::from_secs(DAY)),
            "session" => Self::OlderThan(SESSION),
            other => humantime::parse_duration(other)
                .map(Self::OlderThan)
                .map_err(|_| AppError::validation(format!("Unknown range: {}", other)))?,
        };
        Ok(range)
    }
}

pub struct PurgeReport {
    /// Relational count only; zero when that backend is unreachable.
    pub messages_deleted: usize,
    pub message: String,
}

/// Destructive maintenance on the owner's records.
#[derive(Clone)]
pub struct RepairService {
    storage: Storage,
    owner_id: i64,
}

impl RepairService {
    pub fn new(storage: Storage, owner_id: i64) -> Self {
        Self { storage, owner_id }
    }

    pub async fn delete_old(&self, range: RetentionRange) -> Result<PurgeReport, AppError> {
        let cutoff = range.cutoff(Utc::now())?;
        let owner_id = self.owner_id;
        let deleted = self
            .storage
            .run_blocking(move |s| s.purge_messages(owner_id, cutoff))
            .await?;

        info!("Purged {} messages ({:?}) for user {}", deleted, range, owner_id);
        Ok(PurgeReport {
            messages_deleted: deleted,
            message: format!("✅ Deleted {} old messages! Memory is safe 💙", deleted),
        })
    }

    /// Parses `range` and purges; the entry point for callers holding raw text.
    pub async fn delete_old_by_name(&self, range: &str) -> Result<PurgeReport, AppError> {
        self.delete_old(range.parse()?).await
    }

    /// Wipes the owner's messages, state and diary.
    pub async fn clear_user(&self) -> Result<usize, AppError> {
        let owner_id = self.owner_id;
        let deleted = self
            .storage
            .run_blocking(move |s| s.clear_user(owner_id))
            .await?;
        info!("Cleared user {} ({} relational rows)", owner_id, deleted);
        Ok(deleted)
    }

    pub async fn history(&self) -> Vec<MessageRecord> {
        let owner_id = self.owner_id;
        self.storage
            .run_blocking(move |s| s.get_messages(owner_id, None))
            .await
            .unwrap_or_else(|e| {
                error!("Failed to load history: {}", e);
                Vec::new()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Backend, DocumentBackend, SqliteBackend};
    use crate::models::{format_timestamp, UserState};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_parse_ranges() {
        assert_eq!("all".parse::<RetentionRange>().unwrap(), RetentionRange::All);
        assert_eq!(
            "7days".parse::<RetentionRange>().unwrap(),
            RetentionRange::OlderThan(Duration::from_secs(7 * DAY))
        );
        assert_eq!(
            "session".parse::<RetentionRange>().unwrap(),
            RetentionRange::OlderThan(Duration::from_secs(1800))
        );
        assert_eq!(
            "12h".parse::<RetentionRange>().unwrap(),
            RetentionRange::OlderThan(Duration::from_secs(12 * 3600))
        );
        assert!(matches!(
            "forever".parse::<RetentionRange>(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_cutoff() {
        let now = Utc::now();
        assert_eq!(RetentionRange::All.cutoff(now).unwrap(), None);
        let cutoff = RetentionRange::OlderThan(Duration::from_secs(DAY))
            .cutoff(now)
            .unwrap()
            .unwrap();
        assert_eq!(now - cutoff, chrono::Duration::days(1));
    }

    fn service(dir: &TempDir) -> (RepairService, Arc<SqliteBackend>, Arc<DocumentBackend>) {
        let db_path = dir.path().join("primary.db");
        let relational = Arc::new(SqliteBackend::new(db_path.to_str(), Duration::from_secs(1)));
        let embedded = Arc::new(DocumentBackend::open(dir.path().join("db.json")));
        let storage = Storage::new(relational.clone(), embedded.clone());
        assert!(storage.bootstrap("memory_backup", "{}"));
        (RepairService::new(storage, 9), relational, embedded)
    }

    fn aged(age_days: i64, text: &str) -> MessageRecord {
        let mut record = MessageRecord::new(9, text, "ok");
        record.timestamp = format_timestamp(Utc::now() - chrono::Duration::days(age_days));
        record
    }

    #[tokio::test]
    async fn test_delete_old_reports_relational_count() {
        let dir = TempDir::new().unwrap();
        let (service, relational, embedded) = service(&dir);
        for record in [aged(40, "old"), aged(10, "older"), aged(1, "recent")] {
            relational.insert_message(&record).unwrap();
            embedded.insert_message(&record).unwrap();
        }

        let report = service.delete_old_by_name("7days").await.unwrap();
        assert_eq!(report.messages_deleted, 2);
        assert_eq!(report.message, "✅ Deleted 2 old messages! Memory is safe 💙");

        let left = embedded.recent_messages(9, None).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].message, "recent");
        assert_eq!(service.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_range_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let (service, relational, _) = service(&dir);
        relational.insert_message(&aged(40, "old")).unwrap();

        assert!(service.delete_old_by_name("someday").await.is_err());
        assert_eq!(relational.recent_messages(9, None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_user() {
        let dir = TempDir::new().unwrap();
        let (service, relational, embedded) = service(&dir);
        let mut user = UserState::new(9);
        user.memory = "secret".to_string();
        relational.upsert_user(&user).unwrap();
        embedded.upsert_user(&user).unwrap();

        service.clear_user().await.unwrap();
        assert!(relational.get_user(9).unwrap().is_none());
        assert!(embedded.get_user(9).unwrap().is_none());
    }
}
