use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub user_id: String,
    pub original_filename: String,
    pub file_type: String,
    pub extracted_text: String,
    pub created_at: DateTime<Utc>,
}

/// One tailored output. Written once per successful generation, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RevisionRow {
    pub id: Uuid,
    pub resume_id: Uuid,
    pub user_id: String,
    pub target_industry: String,
    pub target_role: String,
    pub tailored_content: String,
    pub was_free: bool,
    pub prompt_version_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewResume {
    pub user_id: String,
    pub original_filename: String,
    pub file_type: FileType,
    pub extracted_text: String,
}

#[derive(Debug, Clone)]
pub struct NewRevision {
    pub resume_id: Uuid,
    pub user_id: String,
    pub target_industry: String,
    pub target_role: String,
    pub tailored_content: String,
    pub prompt_version_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Pdf,
    Docx,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
        }
    }

    /// Detects the type from a filename extension, falling back to the declared MIME type.
    pub fn detect(filename: &str, content_type: Option<&str>) -> Option<Self> {
        let ext = filename.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => return Some(FileType::Pdf),
            Some("docx") => return Some(FileType::Docx),
            _ => {}
        }
        match content_type {
            Some("application/pdf") => Some(FileType::Pdf),
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document") => {
                Some(FileType::Docx)
            }
            _ => None,
        }
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(FileType::Pdf),
            "docx" => Ok(FileType::Docx),
            other => Err(format!("unsupported file type '{other}'")),
        }
    }
}
