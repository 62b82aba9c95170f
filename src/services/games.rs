use tracing::info;

use crate::db::{Storage, GAME_SUBMISSION_LIMIT};
use crate::error::AppError;
use crate::models::GameSubmission;

/// Game type recorded for uploaded files.
pub const FILE_GAME_TYPE: &str = "truth_dare";

#[derive(Clone)]
pub struct GameService {
    storage: Storage,
}

impl GameService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn submit_text(
        &self,
        game_type: Option<&str>,
        content: &str,
    ) -> Result<(), AppError> {
        let submission = GameSubmission::text(game_type.unwrap_or("unknown"), content);
        self.save(submission).await
    }

    /// Records an already stored upload by its path.
    pub async fn submit_file(&self, file_path: &str) -> Result<(), AppError> {
        if file_path.trim().is_empty() {
            return Err(AppError::validation("File path required"));
        }
        self.save(GameSubmission::file(FILE_GAME_TYPE, file_path)).await
    }

    /// Newest first, at most 100.
    pub async fn recent(&self) -> Result<Vec<GameSubmission>, AppError> {
        self.storage
            .run_blocking(|s| s.recent_game_submissions(GAME_SUBMISSION_LIMIT))
            .await
    }

    async fn save(&self, submission: GameSubmission) -> Result<(), AppError> {
        let game_type = submission.game_type.clone();
        self.storage
            .run_blocking(move |s| s.save_game_submission(&submission))
            .await?;
        info!("Game submission saved ({})", game_type);
        Ok(())
    }
}
