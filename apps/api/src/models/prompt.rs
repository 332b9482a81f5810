use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PromptVersionRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub system_prompt: String,
    pub user_prompt_template: String,
    pub is_active: bool,
    pub is_default: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PromptTestRunRow {
    pub id: Uuid,
    pub prompt_version_id: Uuid,
    pub test_input: String,
    pub target_industry: String,
    pub target_role: String,
    pub output: String,
    pub execution_time_ms: i64,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPromptVersion {
    pub name: String,
    pub description: Option<String>,
    pub system_prompt: String,
    pub user_prompt_template: String,
    pub is_default: bool,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPromptTestRun {
    pub prompt_version_id: Uuid,
    pub test_input: String,
    pub target_industry: String,
    pub target_role: String,
    pub output: String,
    pub execution_time_ms: i64,
    pub created_by: String,
}
