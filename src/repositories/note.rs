use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{GoalStatus, Note};

/// ノート一覧の検索条件。`viewer_id` の所有ノート（と共有されたノート）のみが対象。
#[derive(Debug, Clone)]
pub struct NoteFilter {
    pub viewer_id: Uuid,
    pub include_shared: bool,
    pub tag_id: Option<Uuid>,
    pub goal_status: Option<GoalStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub search: Option<String>,
    pub offset: u64,
    pub limit: u64,
}

impl NoteFilter {
    pub fn for_viewer(viewer_id: Uuid) -> Self {
        Self {
            viewer_id,
            include_shared: true,
            tag_id: None,
            goal_status: None,
            date_from: None,
            date_to: None,
            search: None,
            offset: 0,
            limit: 20,
        }
    }
}

#[async_trait]
pub trait NoteRepository: Send + Sync {
    async fn find_by_id(&self, note_id: Uuid) -> Result<Option<Note>>;
    /// 該当ページのノートと、条件に一致する総件数を返す
    async fn list(&self, filter: &NoteFilter) -> Result<(Vec<Note>, u64)>;
    async fn create(&self, note: Note) -> Result<Note>;
    async fn update(&self, note: Note) -> Result<Note>;
    async fn delete(&self, note_id: Uuid) -> Result<()>;
    async fn count_by_tag(&self, tag_id: Uuid) -> Result<u64>;
}

const NOTE_COLUMNS: &str = "n.id, n.user_id, n.tag_id, n.original_content, n.summary_text, \
     n.goal_status, n.meeting_date, n.is_ai_generated, n.created_at, n.updated_at";

#[derive(FromRow)]
struct NoteRow {
    id: Uuid,
    user_id: Uuid,
    tag_id: Uuid,
    original_content: String,
    summary_text: Option<String>,
    goal_status: String,
    meeting_date: NaiveDate,
    is_ai_generated: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NoteRow> for Note {
    type Error = AppError;

    fn try_from(row: NoteRow) -> Result<Self> {
        let goal_status = row
            .goal_status
            .parse::<GoalStatus>()
            .map_err(AppError::DatabaseError)?;
        Ok(Note {
            id: row.id,
            user_id: row.user_id,
            tag_id: row.tag_id,
            original_content: row.original_content,
            summary_text: row.summary_text,
            goal_status,
            meeting_date: row.meeting_date,
            is_ai_generated: row.is_ai_generated,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// ILIKE のワイルドカードをエスケープ
pub(crate) fn escape_like(pattern: &str) -> String {
    pattern
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &NoteFilter) {
    qb.push(" WHERE (n.user_id = ");
    qb.push_bind(filter.viewer_id);
    if filter.include_shared {
        qb.push(
            " OR EXISTS (SELECT 1 FROM tag_access ta WHERE ta.tag_id = n.tag_id AND ta.recipient_id = ",
        );
        qb.push_bind(filter.viewer_id);
        qb.push(")");
    }
    qb.push(")");

    if let Some(tag_id) = filter.tag_id {
        qb.push(" AND n.tag_id = ");
        qb.push_bind(tag_id);
    }
    if let Some(status) = filter.goal_status {
        qb.push(" AND n.goal_status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(from) = filter.date_from {
        qb.push(" AND n.meeting_date >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filter.date_to {
        qb.push(" AND n.meeting_date <= ");
        qb.push_bind(to);
    }
    if let Some(search) = filter.search.as_deref() {
        qb.push(" AND n.summary_text ILIKE ");
        qb.push_bind(format!("%{}%", escape_like(search)));
    }
}

pub struct PostgresNoteRepository {
    pool: PgPool,
}

impl PostgresNoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NoteRepository for PostgresNoteRepository {
    async fn find_by_id(&self, note_id: Uuid) -> Result<Option<Note>> {
        let row = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes n WHERE n.id = $1"
        ))
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Note::try_from).transpose()
    }

    async fn list(&self, filter: &NoteFilter) -> Result<(Vec<Note>, u64)> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notes n");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut list_query =
            QueryBuilder::<Postgres>::new(format!("SELECT {NOTE_COLUMNS} FROM notes n"));
        push_filters(&mut list_query, filter);
        list_query.push(" ORDER BY n.meeting_date DESC, n.created_at DESC LIMIT ");
        list_query.push_bind(filter.limit as i64);
        list_query.push(" OFFSET ");
        list_query.push_bind(filter.offset as i64);

        let rows = list_query
            .build_query_as::<NoteRow>()
            .fetch_all(&self.pool)
            .await?;
        let notes = rows
            .into_iter()
            .map(Note::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((notes, total.max(0) as u64))
    }

    async fn create(&self, note: Note) -> Result<Note> {
        sqlx::query(
            "INSERT INTO notes (id, user_id, tag_id, original_content, summary_text, goal_status, \
             meeting_date, is_ai_generated, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(note.id)
        .bind(note.user_id)
        .bind(note.tag_id)
        .bind(&note.original_content)
        .bind(&note.summary_text)
        .bind(note.goal_status.as_str())
        .bind(note.meeting_date)
        .bind(note.is_ai_generated)
        .bind(note.created_at)
        .bind(note.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(note)
    }

    async fn update(&self, note: Note) -> Result<Note> {
        let result = sqlx::query(
            "UPDATE notes SET tag_id = $1, summary_text = $2, goal_status = $3, meeting_date = $4, \
             updated_at = $5 WHERE id = $6",
        )
        .bind(note.tag_id)
        .bind(&note.summary_text)
        .bind(note.goal_status.as_str())
        .bind(note.meeting_date)
        .bind(note.updated_at)
        .bind(note.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Note {} not found", note.id)));
        }
        Ok(note)
    }

    async fn delete(&self, note_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(note_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Note {note_id} not found")));
        }
        Ok(())
    }

    async fn count_by_tag(&self, tag_id: Uuid) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE tag_id = $1")
            .bind(tag_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn filter_sql_includes_shared_clause_only_when_requested() {
        let mut filter = NoteFilter::for_viewer(Uuid::new_v4());
        filter.goal_status = Some(GoalStatus::Achieved);

        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notes n");
        push_filters(&mut qb, &filter);
        let sql = qb.sql().to_string();
        assert!(sql.contains("tag_access"));
        assert!(sql.contains("n.goal_status = $3"));

        filter.include_shared = false;
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notes n");
        push_filters(&mut qb, &filter);
        assert!(!qb.sql().contains("tag_access"));
    }
}
