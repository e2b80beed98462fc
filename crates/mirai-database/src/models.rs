//! 数据库模型

use chrono::{DateTime, Utc};
use mirai_core::{DocumentPairRecord, MiraiError};
use sqlx::FromRow;

/// 文档对表，`uploaded_at` 以UTC微秒时间戳存储以保证排序精确
#[derive(Debug, FromRow)]
pub struct DbDocumentPair {
    pub id: i64,
    pub study_name: String,
    pub filename_a: String,
    pub filename_b: String,
    pub uploaded_at: i64,
}

impl TryFrom<DbDocumentPair> for DocumentPairRecord {
    type Error = MiraiError;

    fn try_from(row: DbDocumentPair) -> Result<Self, Self::Error> {
        let uploaded_at = DateTime::<Utc>::from_timestamp_micros(row.uploaded_at).ok_or_else(|| {
            MiraiError::Persistence(format!("Invalid upload time for record {}: {}", row.id, row.uploaded_at))
        })?;

        Ok(DocumentPairRecord {
            id: row.id,
            study_name: row.study_name,
            filename_a: row.filename_a,
            filename_b: row.filename_b,
            uploaded_at,
        })
    }
}
