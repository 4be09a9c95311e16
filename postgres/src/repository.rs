//! [`ProjectRepository`] on `PostgreSQL`.

use async_trait::async_trait;
use cdk_core::error::{StoreError, StoreResult};
use cdk_core::providers::ProjectRepository;
use cdk_core::types::{
    ClaimRecord, DistributionMode, ExploreFilter, Item, ItemId, Page, Paged, Project, ProjectId,
    ProjectListing, ProjectStatus, ReceivedRecord, ReceiverRecord, ReportOutcome, TrustLevel, User,
    UserId,
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, Row};
use std::collections::{HashMap, HashSet};

/// Project columns, qualified with the `p` alias.
const PROJECT_COLUMNS: &str = r"
    p.id, p.name, p.description, p.distribution_mode, p.total_items,
    p.start_time, p.end_time, p.minimum_trust_level, p.allow_same_ip,
    p.risk_level, p.creator_id, p.is_completed, p.status, p.report_count,
    p.hide_from_explore, p.created_at, p.updated_at";

/// Explore gates. `$6` is the tag filter; an empty array keeps every tag.
const EXPLORE_FILTER: &str = r"
    FROM projects p
    WHERE p.end_time > $1
      AND p.is_completed = FALSE
      AND p.status = $2
      AND p.minimum_trust_level <= $3
      AND p.risk_level >= $4
      AND p.hide_from_explore = FALSE
      AND NOT EXISTS (
          SELECT 1 FROM project_items pi
          WHERE pi.project_id = p.id AND pi.receiver_id = $5
      )
      AND (cardinality($6::varchar[]) = 0 OR EXISTS (
          SELECT 1 FROM project_tags pt
          WHERE pt.project_id = p.id AND pt.tag = ANY($6)
      ))";

/// Own projects. `$3` is the tag filter.
const CREATOR_FILTER: &str = r"
    FROM projects p
    WHERE p.creator_id = $1
      AND p.status = $2
      AND (cardinality($3::varchar[]) = 0 OR EXISTS (
          SELECT 1 FROM project_tags pt
          WHERE pt.project_id = p.id AND pt.tag = ANY($3)
      ))";

/// Claim history of `$1`, with `$2` as an optional escaped search term.
const HISTORY_FILTER: &str = r"
    FROM project_items i
    JOIN projects p ON p.id = i.project_id
    JOIN users u ON u.id = p.creator_id
    WHERE i.receiver_id = $1
      AND ($2::text IS NULL
           OR u.username LIKE $2 || '%'
           OR u.nickname LIKE '%' || $2 || '%'
           OR p.name LIKE '%' || $2 || '%')";

/// Claimants of project `$1`, with `$2` as an optional escaped search term.
const RECEIVERS_FILTER: &str = r"
    FROM project_items i
    JOIN users u ON u.id = i.receiver_id
    WHERE i.project_id = $1
      AND ($2::text IS NULL
           OR u.username LIKE $2 || '%'
           OR u.nickname LIKE '%' || $2 || '%'
           OR i.content LIKE '%' || $2 || '%')";

/// `PostgreSQL` project repository.
///
/// Projects, items, tags and reports live in relational tables; every
/// multi-statement write runs in one transaction. Unique violations
/// (`project_items (project_id, receiver_id)`,
/// `project_reports (project_id, reporter_id)`) surface as
/// [`StoreError::Conflict`].
#[derive(Clone)]
pub struct PostgresProjectRepository {
    /// PostgreSQL connection pool.
    pool: PgPool,
}

impl PostgresProjectRepository {
    /// Create a repository on an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if a migration fails.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> StoreResult<sqlx::Transaction<'_, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to begin transaction: {e}")))
    }
}

#[async_trait]
impl ProjectRepository for PostgresProjectRepository {
    async fn find_project(&self, project_id: &ProjectId) -> StoreResult<Option<Project>> {
        let row = sqlx::query(
            r"
            SELECT id, name, description, distribution_mode, total_items,
                   start_time, end_time, minimum_trust_level, allow_same_ip,
                   risk_level, creator_id, is_completed, status, report_count,
                   hide_from_explore, created_at, updated_at
            FROM projects
            WHERE id = $1
            ",
        )
        .bind(project_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error("project", &e))?;

        row.as_ref().map(row_to_project).transpose()
    }

    async fn find_user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query(
            r"
            SELECT id, username, nickname, trust_level, score, is_active
            FROM users
            WHERE id = $1
            ",
        )
        .bind(to_i64(user_id.0, "user id")?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error("user", &e))?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_item(&self, item_id: ItemId) -> StoreResult<Option<Item>> {
        let row = sqlx::query(
            r"
            SELECT id, project_id, content, receiver_id, received_at
            FROM project_items
            WHERE id = $1
            ",
        )
        .bind(to_i64(item_id.0, "item id")?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error("item", &e))?;

        row.as_ref().map(row_to_item).transpose()
    }

    async fn commit_claim(&self, record: &ClaimRecord) -> StoreResult<()> {
        let mut tx = self.begin().await?;

        let updated = sqlx::query(
            r"
            UPDATE project_items
            SET receiver_id = $1, received_at = $2, updated_at = $2
            WHERE id = $3 AND project_id = $4 AND receiver_id IS NULL
            ",
        )
        .bind(to_i64(record.receiver_id.0, "user id")?)
        .bind(record.received_at)
        .bind(to_i64(record.item_id.0, "item id")?)
        .bind(record.project_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error("claim item", &e))?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "item {} already claimed",
                record.item_id
            )));
        }

        if record.complete_project {
            sqlx::query("UPDATE projects SET is_completed = TRUE, updated_at = $2 WHERE id = $1")
                .bind(record.project_id.as_str())
                .bind(record.received_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| write_error("complete project", &e))?;
        }

        tx.commit()
            .await
            .map_err(|e| write_error("commit claim", &e))?;

        tracing::debug!(
            project_id = %record.project_id,
            item_id = %record.item_id,
            user_id = %record.receiver_id,
            completed_project = record.complete_project,
            "Claim committed"
        );
        Ok(())
    }

    async fn reopen_project(&self, project_id: &ProjectId) -> StoreResult<bool> {
        let reopened = sqlx::query(
            "UPDATE projects SET is_completed = FALSE WHERE id = $1 AND is_completed",
        )
        .bind(project_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| write_error("reopen project", &e))?;
        Ok(reopened.rows_affected() > 0)
    }

    async fn received_item(
        &self,
        project_id: &ProjectId,
        user_id: UserId,
    ) -> StoreResult<Option<Item>> {
        let row = sqlx::query(
            r"
            SELECT id, project_id, content, receiver_id, received_at
            FROM project_items
            WHERE project_id = $1 AND receiver_id = $2
            ",
        )
        .bind(project_id.as_str())
        .bind(to_i64(user_id.0, "user id")?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error("received item", &e))?;

        row.as_ref().map(row_to_item).transpose()
    }

    async fn insert_project(
        &self,
        project: &Project,
        tags: &[String],
        items: &[String],
    ) -> StoreResult<Vec<ItemId>> {
        let mut tx = self.begin().await?;

        sqlx::query(
            r"
            INSERT INTO projects (
                id, name, description, distribution_mode, total_items,
                start_time, end_time, minimum_trust_level, allow_same_ip,
                risk_level, creator_id, is_completed, status, report_count,
                hide_from_explore, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ",
        )
        .bind(project.id.as_str())
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.distribution_mode.as_i16())
        .bind(to_i64(project.total_items, "total items")?)
        .bind(project.start_time)
        .bind(project.end_time)
        .bind(i16::from(project.minimum_trust_level.as_u8()))
        .bind(project.allow_same_ip)
        .bind(i16::from(project.risk_level))
        .bind(to_i64(project.creator_id.0, "user id")?)
        .bind(project.is_completed)
        .bind(project.status.as_i16())
        .bind(i32::from(project.report_count))
        .bind(project.hide_from_explore)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error("insert project", &e))?;

        insert_tags(&mut *tx, &project.id, tags).await?;
        let item_ids = insert_items(&mut *tx, &project.id, items).await?;

        tx.commit()
            .await
            .map_err(|e| write_error("commit project", &e))?;

        tracing::info!(
            project_id = %project.id,
            mode = project.distribution_mode.label(),
            items = item_ids.len(),
            "Project inserted"
        );
        Ok(item_ids)
    }

    async fn update_project(
        &self,
        project: &Project,
        tags: &[String],
        new_items: &[String],
    ) -> StoreResult<Vec<ItemId>> {
        let mut tx = self.begin().await?;

        write_project_fields(&mut *tx, project).await?;
        replace_tags(&mut *tx, &project.id, tags).await?;
        let item_ids = insert_items(&mut *tx, &project.id, new_items).await?;

        tx.commit()
            .await
            .map_err(|e| write_error("commit project update", &e))?;
        Ok(item_ids)
    }

    async fn revert_update(
        &self,
        previous: &Project,
        tags: &[String],
        appended: &[ItemId],
    ) -> StoreResult<()> {
        let ids = appended
            .iter()
            .map(|id| to_i64(id.0, "item id"))
            .collect::<StoreResult<Vec<_>>>()?;
        let mut tx = self.begin().await?;

        write_project_fields(&mut *tx, previous).await?;
        replace_tags(&mut *tx, &previous.id, tags).await?;
        let removed = sqlx::query(
            r"
            DELETE FROM project_items
            WHERE project_id = $1 AND id = ANY($2) AND receiver_id IS NULL
            ",
        )
        .bind(previous.id.as_str())
        .bind(&ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error("remove appended items", &e))?;

        tx.commit()
            .await
            .map_err(|e| write_error("commit update revert", &e))?;

        tracing::warn!(
            project_id = %previous.id,
            removed = removed.rows_affected(),
            "Project update reverted"
        );
        Ok(())
    }

    async fn existing_contents(&self, project_id: &ProjectId) -> StoreResult<HashSet<String>> {
        let rows = sqlx::query("SELECT content FROM project_items WHERE project_id = $1")
            .bind(project_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| read_error("item contents", &e))?;

        rows.iter().map(|row| column(row, "content")).collect()
    }

    async fn claimed_count(&self, project_id: &ProjectId) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM project_items WHERE project_id = $1 AND receiver_id IS NOT NULL",
        )
        .bind(project_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| read_error("claimed count", &e))?;

        to_u64(count, "claimed count")
    }

    async fn delete_project(&self, project_id: &ProjectId) -> StoreResult<()> {
        let mut tx = self.begin().await?;

        for statement in [
            "DELETE FROM project_tags WHERE project_id = $1",
            "DELETE FROM project_items WHERE project_id = $1",
            "DELETE FROM project_reports WHERE project_id = $1",
            "DELETE FROM projects WHERE id = $1",
        ] {
            sqlx::query(statement)
                .bind(project_id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| write_error("delete project", &e))?;
        }

        tx.commit()
            .await
            .map_err(|e| write_error("commit project deletion", &e))
    }

    async fn project_tags(&self, project_id: &ProjectId) -> StoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT tag FROM project_tags WHERE project_id = $1 ORDER BY id")
            .bind(project_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| read_error("tags", &e))?;

        rows.iter().map(|row| column(row, "tag")).collect()
    }

    async fn record_report(
        &self,
        project_id: &ProjectId,
        reporter_id: UserId,
        reason: &str,
        hidden_threshold: u16,
        now: DateTime<Utc>,
    ) -> StoreResult<ReportOutcome> {
        let mut tx = self.begin().await?;

        sqlx::query(
            r"
            INSERT INTO project_reports (project_id, reporter_id, reason, created_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(project_id.as_str())
        .bind(to_i64(reporter_id.0, "user id")?)
        .bind(reason)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error("insert report", &e))?;

        // SET expressions see the pre-update row, hence `report_count + 1`.
        let row = sqlx::query(
            r"
            UPDATE projects
            SET report_count = report_count + 1,
                status = CASE WHEN report_count + 1 >= $2 THEN $3 ELSE status END,
                updated_at = $4
            WHERE id = $1
            RETURNING report_count, status
            ",
        )
        .bind(project_id.as_str())
        .bind(i32::from(hidden_threshold))
        .bind(ProjectStatus::Hidden.as_i16())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| write_error("count report", &e))?
        .ok_or_else(|| StoreError::Unavailable(format!("project {project_id} missing")))?;

        let report_count: i32 = column(&row, "report_count")?;
        let status: i16 = column(&row, "status")?;

        tx.commit()
            .await
            .map_err(|e| write_error("commit report", &e))?;

        Ok(ReportOutcome {
            report_count: u16::try_from(report_count).unwrap_or(u16::MAX),
            hidden: status == ProjectStatus::Hidden.as_i16(),
        })
    }

    async fn received_history(
        &self,
        user_id: UserId,
        search: Option<&str>,
        page: Page,
    ) -> StoreResult<Paged<ReceivedRecord>> {
        let receiver = to_i64(user_id.0, "user id")?;
        let pattern = search.map(like_escape);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {HISTORY_FILTER}"))
            .bind(receiver)
            .bind(pattern.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| read_error("received count", &e))?;

        let rows = sqlx::query(&format!(
            r"
            SELECT p.id AS project_id,
                   p.name AS project_name,
                   u.username AS project_creator,
                   COALESCE(NULLIF(u.nickname, ''), u.username) AS project_creator_nickname,
                   i.content,
                   i.received_at
            {HISTORY_FILTER}
            ORDER BY i.received_at DESC, i.id DESC
            LIMIT $3 OFFSET $4
            "
        ))
        .bind(receiver)
        .bind(pattern.as_deref())
        .bind(i64::from(page.size))
        .bind(to_i64(page.offset(), "page offset")?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error("received history", &e))?;

        let results = rows
            .iter()
            .map(|row| {
                Ok(ReceivedRecord {
                    project_id: ProjectId::from_string(column::<String>(row, "project_id")?),
                    project_name: column(row, "project_name")?,
                    project_creator: column(row, "project_creator")?,
                    project_creator_nickname: column(row, "project_creator_nickname")?,
                    content: column(row, "content")?,
                    received_at: column(row, "received_at")?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Paged {
            total: to_u64(total, "received count")?,
            results,
        })
    }

    async fn daily_claim_counts(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<(NaiveDate, u64)>> {
        let rows = sqlx::query(
            r"
            SELECT (received_at AT TIME ZONE 'UTC')::date AS day, COUNT(*) AS count
            FROM project_items
            WHERE receiver_id = $1 AND received_at >= $2 AND received_at < $3
            GROUP BY day
            ORDER BY day
            ",
        )
        .bind(to_i64(user_id.0, "user id")?)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error("daily claims", &e))?;

        rows.iter()
            .map(|row| Ok((column(row, "day")?, to_u64(column(row, "count")?, "claim count")?)))
            .collect()
    }

    async fn explore_projects(
        &self,
        filter: &ExploreFilter,
        page: Page,
    ) -> StoreResult<Paged<ProjectListing>> {
        let trust = i16::from(filter.trust_level.as_u8());
        let viewer = to_i64(filter.viewer_id.0, "user id")?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {EXPLORE_FILTER}"))
            .bind(filter.now)
            .bind(ProjectStatus::Normal.as_i16())
            .bind(trust)
            .bind(filter.risk_level)
            .bind(viewer)
            .bind(&filter.tags)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| read_error("explore count", &e))?;
        if total == 0 {
            return Ok(Paged {
                total: 0,
                results: Vec::new(),
            });
        }

        let rows = sqlx::query(&format!(
            "SELECT {PROJECT_COLUMNS} {EXPLORE_FILTER} ORDER BY p.end_time ASC, p.id LIMIT $7 OFFSET $8"
        ))
        .bind(filter.now)
        .bind(ProjectStatus::Normal.as_i16())
        .bind(trust)
        .bind(filter.risk_level)
        .bind(viewer)
        .bind(&filter.tags)
        .bind(i64::from(page.size))
        .bind(to_i64(page.offset(), "page offset")?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error("explore projects", &e))?;

        Ok(Paged {
            total: to_u64(total, "explore count")?,
            results: self.with_tags(&rows).await?,
        })
    }

    async fn creator_projects(
        &self,
        creator_id: UserId,
        tags: &[String],
        page: Page,
    ) -> StoreResult<Paged<ProjectListing>> {
        let creator = to_i64(creator_id.0, "user id")?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {CREATOR_FILTER}"))
            .bind(creator)
            .bind(ProjectStatus::Normal.as_i16())
            .bind(tags)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| read_error("own project count", &e))?;
        if total == 0 {
            return Ok(Paged {
                total: 0,
                results: Vec::new(),
            });
        }

        let rows = sqlx::query(&format!(
            "SELECT {PROJECT_COLUMNS} {CREATOR_FILTER} ORDER BY p.created_at DESC, p.id LIMIT $4 OFFSET $5"
        ))
        .bind(creator)
        .bind(ProjectStatus::Normal.as_i16())
        .bind(tags)
        .bind(i64::from(page.size))
        .bind(to_i64(page.offset(), "page offset")?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error("own projects", &e))?;

        Ok(Paged {
            total: to_u64(total, "own project count")?,
            results: self.with_tags(&rows).await?,
        })
    }

    async fn active_tags(&self) -> StoreResult<Vec<String>> {
        sqlx::query_scalar(
            r"
            SELECT DISTINCT pt.tag
            FROM project_tags pt
            JOIN projects p ON p.id = pt.project_id
            WHERE p.status = $1
            ORDER BY pt.tag
            ",
        )
        .bind(ProjectStatus::Normal.as_i16())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error("tags", &e))
    }

    async fn project_receivers(
        &self,
        project_id: &ProjectId,
        search: Option<&str>,
        page: Page,
    ) -> StoreResult<Paged<ReceiverRecord>> {
        let pattern = search.map(like_escape);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {RECEIVERS_FILTER}"))
            .bind(project_id.as_str())
            .bind(pattern.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| read_error("receiver count", &e))?;

        let rows = sqlx::query(&format!(
            r"
            SELECT u.username, u.nickname, i.content, i.received_at
            {RECEIVERS_FILTER}
            ORDER BY i.received_at DESC, i.id DESC
            LIMIT $3 OFFSET $4
            "
        ))
        .bind(project_id.as_str())
        .bind(pattern.as_deref())
        .bind(i64::from(page.size))
        .bind(to_i64(page.offset(), "page offset")?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error("receivers", &e))?;

        let results = rows
            .iter()
            .map(|row| {
                Ok(ReceiverRecord {
                    username: column(row, "username")?,
                    nickname: column(row, "nickname")?,
                    content: column(row, "content")?,
                    received_at: column(row, "received_at")?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Paged {
            total: to_u64(total, "receiver count")?,
            results,
        })
    }
}

impl PostgresProjectRepository {
    /// Decode project rows and attach their tags with one extra query.
    async fn with_tags(&self, rows: &[PgRow]) -> StoreResult<Vec<ProjectListing>> {
        let projects = rows
            .iter()
            .map(row_to_project)
            .collect::<StoreResult<Vec<_>>>()?;
        let ids: Vec<&str> = projects.iter().map(|p| p.id.as_str()).collect();

        let tag_rows = sqlx::query(
            "SELECT project_id, tag FROM project_tags WHERE project_id = ANY($1) ORDER BY tag",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error("listing tags", &e))?;

        let mut tags: HashMap<String, Vec<String>> = HashMap::new();
        for row in &tag_rows {
            tags.entry(column(row, "project_id")?)
                .or_default()
                .push(column(row, "tag")?);
        }

        Ok(projects
            .into_iter()
            .map(|project| ProjectListing {
                tags: tags.remove(project.id.as_str()).unwrap_or_default(),
                project,
            })
            .collect())
    }
}

/// Overwrite the editable columns plus `total_items` and `is_completed`.
async fn write_project_fields(conn: &mut PgConnection, project: &Project) -> StoreResult<()> {
    let updated = sqlx::query(
        r"
        UPDATE projects
        SET name = $2,
            description = $3,
            total_items = $4,
            start_time = $5,
            end_time = $6,
            minimum_trust_level = $7,
            allow_same_ip = $8,
            risk_level = $9,
            is_completed = $10,
            hide_from_explore = $11,
            updated_at = $12
        WHERE id = $1
        ",
    )
    .bind(project.id.as_str())
    .bind(&project.name)
    .bind(&project.description)
    .bind(to_i64(project.total_items, "total items")?)
    .bind(project.start_time)
    .bind(project.end_time)
    .bind(i16::from(project.minimum_trust_level.as_u8()))
    .bind(project.allow_same_ip)
    .bind(i16::from(project.risk_level))
    .bind(project.is_completed)
    .bind(project.hide_from_explore)
    .bind(project.updated_at)
    .execute(conn)
    .await
    .map_err(|e| write_error("update project", &e))?;

    if updated.rows_affected() == 0 {
        return Err(StoreError::Unavailable(format!("project {} missing", project.id)));
    }
    Ok(())
}

async fn replace_tags(
    conn: &mut PgConnection,
    project_id: &ProjectId,
    tags: &[String],
) -> StoreResult<()> {
    sqlx::query("DELETE FROM project_tags WHERE project_id = $1")
        .bind(project_id.as_str())
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error("clear tags", &e))?;
    insert_tags(conn, project_id, tags).await
}

/// Escape `LIKE` wildcards so a search term matches literally.
fn like_escape(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

async fn insert_tags(
    conn: &mut PgConnection,
    project_id: &ProjectId,
    tags: &[String],
) -> StoreResult<()> {
    if tags.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r"
        INSERT INTO project_tags (project_id, tag)
        SELECT $1, UNNEST($2::varchar[])
        ON CONFLICT (project_id, tag) DO NOTHING
        ",
    )
    .bind(project_id.as_str())
    .bind(tags)
    .execute(conn)
    .await
    .map_err(|e| write_error("insert tags", &e))?;
    Ok(())
}

/// Insert items in input order. Ids come from a sequence consumed in the
/// `ORDER BY ord` order, so sorting them restores the input order.
async fn insert_items(
    conn: &mut PgConnection,
    project_id: &ProjectId,
    items: &[String],
) -> StoreResult<Vec<ItemId>> {
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query(
        r"
        INSERT INTO project_items (project_id, content)
        SELECT $1, t.content
        FROM UNNEST($2::varchar[]) WITH ORDINALITY AS t(content, ord)
        ORDER BY t.ord
        RETURNING id
        ",
    )
    .bind(project_id.as_str())
    .bind(items)
    .fetch_all(conn)
    .await
    .map_err(|e| write_error("insert items", &e))?;

    let mut ids = rows
        .iter()
        .map(|row| column::<i64>(row, "id").and_then(|id| to_u64(id, "item id")))
        .collect::<StoreResult<Vec<_>>>()?;
    ids.sort_unstable();
    Ok(ids.into_iter().map(ItemId).collect())
}

fn row_to_project(row: &PgRow) -> StoreResult<Project> {
    let mode: i16 = column(row, "distribution_mode")?;
    let status: i16 = column(row, "status")?;
    let report_count: i32 = column(row, "report_count")?;

    Ok(Project {
        id: ProjectId::from_string(column::<String>(row, "id")?),
        name: column(row, "name")?,
        description: column(row, "description")?,
        distribution_mode: DistributionMode::from_i16(mode).ok_or_else(|| {
            StoreError::Serialization(format!("Invalid distribution mode: {mode}"))
        })?,
        total_items: to_u64(column(row, "total_items")?, "total items")?,
        start_time: column(row, "start_time")?,
        end_time: column(row, "end_time")?,
        minimum_trust_level: trust_level(column(row, "minimum_trust_level")?)?,
        allow_same_ip: column(row, "allow_same_ip")?,
        risk_level: u8::try_from(column::<i16>(row, "risk_level")?)
            .map_err(|e| StoreError::Serialization(format!("Invalid risk level: {e}")))?,
        creator_id: UserId(to_u64(column(row, "creator_id")?, "user id")?),
        is_completed: column(row, "is_completed")?,
        status: ProjectStatus::from_i16(status)
            .ok_or_else(|| StoreError::Serialization(format!("Invalid project status: {status}")))?,
        report_count: u16::try_from(report_count).unwrap_or(u16::MAX),
        hide_from_explore: column(row, "hide_from_explore")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn row_to_user(row: &PgRow) -> StoreResult<User> {
    Ok(User {
        id: UserId(to_u64(column(row, "id")?, "user id")?),
        username: column(row, "username")?,
        nickname: column(row, "nickname")?,
        trust_level: trust_level(column(row, "trust_level")?)?,
        score: User::clamp_score(i64::from(column::<i16>(row, "score")?)),
        is_active: column(row, "is_active")?,
    })
}

fn row_to_item(row: &PgRow) -> StoreResult<Item> {
    let receiver: Option<i64> = column(row, "receiver_id")?;
    Ok(Item {
        id: ItemId(to_u64(column(row, "id")?, "item id")?),
        project_id: ProjectId::from_string(column::<String>(row, "project_id")?),
        content: column(row, "content")?,
        receiver_id: receiver
            .map(|id| to_u64(id, "user id").map(UserId))
            .transpose()?,
        received_at: column(row, "received_at")?,
    })
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Serialization(format!("Failed to decode column {name}: {e}")))
}

fn trust_level(raw: i16) -> StoreResult<TrustLevel> {
    u8::try_from(raw)
        .map_err(|e| e.to_string())
        .and_then(TrustLevel::try_from)
        .map_err(StoreError::Serialization)
}

fn to_i64(value: u64, what: &str) -> StoreResult<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("{what} out of range: {value}")))
}

fn to_u64(value: i64, what: &str) -> StoreResult<u64> {
    u64::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("{what} out of range: {value}")))
}

fn read_error(what: &str, e: &sqlx::Error) -> StoreError {
    StoreError::Unavailable(format!("Failed to load {what}: {e}"))
}

fn write_error(action: &str, e: &sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = e {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(format!("Failed to {action}: {db_err}"));
        }
    }
    StoreError::Unavailable(format!("Failed to {action}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_level_decoding_rejects_out_of_range() {
        assert_eq!(trust_level(3), Ok(TrustLevel::ActiveUser));
        assert!(matches!(trust_level(5), Err(StoreError::Serialization(_))));
        assert!(matches!(trust_level(-1), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn id_conversions_are_checked() {
        assert_eq!(to_i64(42, "id"), Ok(42));
        assert!(to_i64(u64::MAX, "id").is_err());
        assert!(to_u64(-1, "id").is_err());
    }

    #[test]
    fn non_database_errors_are_unavailable() {
        let err = write_error("claim item", &sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Unavailable(msg) if msg.starts_with("Failed to claim item")));
    }
}
