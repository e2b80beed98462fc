//! 文档对记录仓储

use async_trait::async_trait;
use mirai_core::{DocumentPairRecord, MiraiError, NewDocumentPair, Result};
use tracing::{debug, info};

use crate::connection::DatabasePool;
use crate::models::DbDocumentPair;

/// 文档对记录的持久化接口
#[async_trait]
pub trait StudyRepository: Send + Sync {
    /// 插入一条记录，整条提交或完全不提交
    async fn insert_pair(&self, pair: NewDocumentPair) -> Result<DocumentPairRecord>;

    /// 最近上传的记录：`uploaded_at` 最大，相同时 `id` 最大
    async fn latest_pair(&self) -> Result<Option<DocumentPairRecord>>;

    /// 按 `id` 顺序列出所有记录
    async fn list_pairs(&self) -> Result<Vec<DocumentPairRecord>>;
}

/// 基于SQLite的实现
#[derive(Debug, Clone)]
pub struct SqliteStudyRepository {
    db: DatabasePool,
}

impl SqliteStudyRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pdf_studies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                study_name TEXT NOT NULL,
                filename_a TEXT NOT NULL,
                filename_b TEXT NOT NULL,
                uploaded_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(self.db.pool())
        .await
        .map_err(persistence)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pdf_studies_uploaded_at ON pdf_studies (uploaded_at DESC, id DESC)",
        )
        .execute(self.db.pool())
        .await
        .map_err(persistence)?;

        info!("数据库表创建完成");
        Ok(())
    }
}

#[async_trait]
impl StudyRepository for SqliteStudyRepository {
    async fn insert_pair(&self, pair: NewDocumentPair) -> Result<DocumentPairRecord> {
        let mut tx = self.db.pool().begin().await.map_err(persistence)?;

        let result = sqlx::query(
            r#"
            INSERT INTO pdf_studies (study_name, filename_a, filename_b, uploaded_at)
            VALUES (?, ?, ?, ?)
        "#,
        )
        .bind(&pair.study_name)
        .bind(&pair.filename_a)
        .bind(&pair.filename_b)
        .bind(pair.uploaded_at.timestamp_micros())
        .execute(&mut *tx)
        .await
        .map_err(persistence)?;

        tx.commit().await.map_err(persistence)?;

        let id = result.last_insert_rowid();
        debug!("已保存文档对 {}: {}", id, pair.study_name);

        Ok(DocumentPairRecord {
            id,
            study_name: pair.study_name,
            filename_a: pair.filename_a,
            filename_b: pair.filename_b,
            uploaded_at: pair.uploaded_at,
        })
    }

    async fn latest_pair(&self) -> Result<Option<DocumentPairRecord>> {
        let row = sqlx::query_as::<_, DbDocumentPair>(
            r#"
            SELECT id, study_name, filename_a, filename_b, uploaded_at
            FROM pdf_studies
            ORDER BY uploaded_at DESC, id DESC
            LIMIT 1
        "#,
        )
        .fetch_optional(self.db.pool())
        .await
        .map_err(persistence)?;

        row.map(DocumentPairRecord::try_from).transpose()
    }

    async fn list_pairs(&self) -> Result<Vec<DocumentPairRecord>> {
        let rows = sqlx::query_as::<_, DbDocumentPair>(
            "SELECT id, study_name, filename_a, filename_b, uploaded_at FROM pdf_studies ORDER BY id",
        )
        .fetch_all(self.db.pool())
        .await
        .map_err(persistence)?;

        rows.into_iter().map(DocumentPairRecord::try_from).collect()
    }
}

fn persistence(e: sqlx::Error) -> MiraiError {
    MiraiError::Persistence(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    async fn repository() -> SqliteStudyRepository {
        let repo = SqliteStudyRepository::new(DatabasePool::in_memory().await.unwrap());
        repo.create_tables().await.unwrap();
        repo
    }

    fn pair(name: &str, at: chrono::DateTime<Utc>) -> NewDocumentPair {
        NewDocumentPair {
            study_name: name.to_string(),
            filename_a: format!("{}_a.pdf", name),
            filename_b: format!("{}_b.pdf", name),
            uploaded_at: at,
        }
    }

    #[tokio::test]
    async fn test_empty_store_has_no_latest() {
        let repo = repository().await;
        assert!(repo.latest_pair().await.unwrap().is_none());
        assert!(repo.list_pairs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_by_upload_time() {
        let repo = repository().await;
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let t2 = t1 + Duration::minutes(5);

        // 先插入较晚的记录，确认排序依据是时间而不是插入顺序
        let later = repo.insert_pair(pair("later", t2)).await.unwrap();
        let earlier = repo.insert_pair(pair("earlier", t1)).await.unwrap();
        assert!(earlier.id > later.id);

        let latest = repo.latest_pair().await.unwrap().unwrap();
        assert_eq!(latest.study_name, "later");
        assert_eq!(latest.uploaded_at, t2);
    }

    #[tokio::test]
    async fn test_latest_tie_breaks_on_id() {
        let repo = repository().await;
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        repo.insert_pair(pair("first", at)).await.unwrap();
        let second = repo.insert_pair(pair("second", at)).await.unwrap();

        let latest = repo.latest_pair().await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.filename_a, "second_a.pdf");
    }

    #[tokio::test]
    async fn test_list_in_id_order() {
        let repo = repository().await;
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        repo.insert_pair(pair("a", at + Duration::hours(1))).await.unwrap();
        repo.insert_pair(pair("b", at)).await.unwrap();

        let names: Vec<_> = repo
            .list_pairs()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.study_name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() {
        let repo = repository().await;
        repo.create_tables().await.unwrap();
    }
}
