use serde_json::Value;
use tracing::info;

use crate::db::Storage;
use crate::error::AppError;
use crate::models::DiaryEntry;

#[derive(Clone)]
pub struct DiaryService {
    storage: Storage,
    owner_id: i64,
}

impl DiaryService {
    pub fn new(storage: Storage, owner_id: i64) -> Self {
        Self { storage, owner_id }
    }

    /// The owner's diary; an empty one with the default line when nothing is stored.
    pub async fn get(&self) -> Result<DiaryEntry, AppError> {
        let owner_id = self.owner_id;
        self.storage.run_blocking(move |s| s.get_diary(owner_id)).await
    }

    pub async fn update(
        &self,
        notes: Vec<Value>,
        last_ai_line: &str,
    ) -> Result<DiaryEntry, AppError> {
        let diary = DiaryEntry {
            user_id: self.owner_id,
            notes,
            last_ai_line: last_ai_line.to_string(),
        };
        let saved = diary.clone();
        self.storage.run_blocking(move |s| s.save_diary(&saved)).await?;
        info!("Diary saved for user {}", diary.user_id);
        Ok(diary)
    }

    pub async fn delete(&self) -> Result<(), AppError> {
        let owner_id = self.owner_id;
        self.storage.run_blocking(move |s| s.delete_diary(owner_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DocumentBackend, SqliteBackend};
    use crate::models::DEFAULT_DIARY_LINE;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> DiaryService {
        let storage = Storage::new(
            Arc::new(SqliteBackend::new(None, Duration::from_secs(1))),
            Arc::new(DocumentBackend::open(dir.path().join("db.json"))),
        );
        DiaryService::new(storage, 3)
    }

    #[tokio::test]
    async fn test_diary_lifecycle() {
        let dir = TempDir::new().unwrap();
        let diary = service(&dir);

        let empty = diary.get().await.unwrap();
        assert!(empty.notes.is_empty());
        assert_eq!(empty.last_ai_line, DEFAULT_DIARY_LINE);

        diary
            .update(vec![json!({"text": "picnic"}), json!("rain")], "What a day")
            .await
            .unwrap();
        let stored = diary.get().await.unwrap();
        assert_eq!(stored.notes, vec![json!({"text": "picnic"}), json!("rain")]);
        assert_eq!(stored.last_ai_line, "What a day");

        diary.delete().await.unwrap();
        assert_eq!(diary.get().await.unwrap().last_ai_line, DEFAULT_DIARY_LINE);
    }
}
