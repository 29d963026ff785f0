//! Database layer for gatekeep using Turso.
//!
//! This module provides the on-disk implementation of [`ElementStore`].
//!
//! Architecture:
//!   - Database file: .gatekeep/gatekeep.db
//!   - WAL mode: Write-Ahead Logging for concurrent reads during writes
//!   - Schema: elements, dependencies, blocked_cache tables
//!   - Indexes: Optimized for edge lookups by source and by (target, type)
//!
//! Dependency targets are not foreign keys: an edge may point at an element
//! that lives in another system, and the engine treats such targets as
//! completed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gk_core::{
    BlockedEntry, Complexity, Dependency, DependencyKind, Element, ElementStatus, ElementType,
    Gate, Priority,
};
use std::path::Path;
use tracing::debug;
use turso::{params, Builder, Connection};

use crate::store::{ElementStore, Result, StoreError};

const ELEMENT_COLUMNS: &str =
    "id, type, status, priority, complexity, created_at, updated_at, deleted_at";

const DEPENDENCY_COLUMNS: &str = "source_id, target_id, type, metadata, created_at, created_by";

/// Database connection wrapper for Turso
pub struct Database {
    conn: Connection,
    path: String,
}

impl Database {
    /// Open creates a new database connection at the specified path using Turso.
    ///
    /// If the database doesn't exist, it will be created. Call
    /// [`Database::init_schema`] before first use.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use gk_storage::Database;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::open(".gatekeep/gatekeep.db").await?;
    /// db.init_schema().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let db = Builder::new_local(&path_str).build().await?;
        let conn = db.connect()?;

        // PRAGMA statements may return rows, so they go through query()
        let _ = conn.query("PRAGMA journal_mode=WAL", params![]).await?;
        let _ = conn.query("PRAGMA busy_timeout=5000", params![]).await?;

        debug!(path = %path_str, "opened gatekeep database");

        Ok(Database {
            conn,
            path: path_str,
        })
    }

    /// Returns the database file path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// InitSchema creates the database schema if it doesn't exist.
    ///
    /// This is idempotent - safe to call multiple times.
    pub async fn init_schema(&self) -> Result<()> {
        let statements = vec![
            r#"CREATE TABLE IF NOT EXISTS elements (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                priority INTEGER,
                complexity INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            )"#,
            r#"CREATE TABLE IF NOT EXISTS dependencies (
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                type TEXT NOT NULL,
                metadata TEXT,
                created_at TEXT NOT NULL,
                created_by TEXT,
                PRIMARY KEY (source_id, target_id, type)
            )"#,
            r#"CREATE TABLE IF NOT EXISTS blocked_cache (
                element_id TEXT PRIMARY KEY,
                blocked_by TEXT NOT NULL,
                reason TEXT NOT NULL,
                computed_at TEXT NOT NULL
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_elements_status ON elements(status)",
            "CREATE INDEX IF NOT EXISTS idx_dependencies_source ON dependencies(source_id)",
            "CREATE INDEX IF NOT EXISTS idx_dependencies_target ON dependencies(target_id, type)",
            "CREATE INDEX IF NOT EXISTS idx_blocked_cache_blocker ON blocked_cache(blocked_by)",
        ];

        for stmt in statements {
            self.conn.execute(stmt, params![]).await?;
        }

        Ok(())
    }

    /// Returns the number of elements, including soft-deleted ones.
    pub async fn get_element_count(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM elements").await
    }

    /// Returns the number of dependency edges.
    pub async fn get_dependency_count(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM dependencies").await
    }

    async fn count(&self, query: &str) -> Result<i64> {
        let mut rows = self.conn.query(query, params![]).await?;

        if let Some(row) = rows.next().await? {
            Ok(row.get(0)?)
        } else {
            Ok(0)
        }
    }

    async fn query_elements(
        &self,
        query: &str,
        params_vec: Vec<turso::Value>,
    ) -> Result<Vec<Element>> {
        let mut rows = self.conn.query(query, params_vec).await?;
        let mut elements = Vec::new();

        while let Some(row) = rows.next().await? {
            elements.push(parse_element_row(&row)?);
        }

        Ok(elements)
    }

    async fn query_dependencies(
        &self,
        query: &str,
        params_vec: Vec<turso::Value>,
    ) -> Result<Vec<Dependency>> {
        let mut rows = self.conn.query(query, params_vec).await?;
        let mut deps = Vec::new();

        while let Some(row) = rows.next().await? {
            deps.push(parse_dependency_row(&row)?);
        }

        Ok(deps)
    }
}

#[async_trait(?Send)]
impl ElementStore for Database {
    async fn get_element(&self, id: &str) -> Result<Option<Element>> {
        let query = format!("SELECT {} FROM elements WHERE id = ?", ELEMENT_COLUMNS);
        let mut elements = self.query_elements(&query, vec![id.to_string().into()]).await?;
        Ok(elements.pop())
    }

    async fn dependencies_from(&self, source_id: &str) -> Result<Vec<Dependency>> {
        let query = format!(
            "SELECT {} FROM dependencies
             WHERE source_id = ?
             ORDER BY created_at ASC, target_id ASC",
            DEPENDENCY_COLUMNS
        );
        self.query_dependencies(&query, vec![source_id.to_string().into()]).await
    }

    async fn dependents_of(
        &self,
        target_id: &str,
        kinds: &[DependencyKind],
    ) -> Result<Vec<Dependency>> {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<&str> = kinds.iter().map(|_| "?").collect();
        let query = format!(
            "SELECT {} FROM dependencies
             WHERE target_id = ? AND type IN ({})
             ORDER BY created_at ASC, source_id ASC",
            DEPENDENCY_COLUMNS,
            placeholders.join(",")
        );

        let mut params_vec: Vec<turso::Value> = vec![target_id.to_string().into()];
        params_vec.extend(kinds.iter().map(|k| k.as_str().to_string().into()));

        self.query_dependencies(&query, params_vec).await
    }

    async fn get_dependency(
        &self,
        source_id: &str,
        target_id: &str,
        kind: DependencyKind,
    ) -> Result<Option<Dependency>> {
        let query = format!(
            "SELECT {} FROM dependencies WHERE source_id = ? AND target_id = ? AND type = ?",
            DEPENDENCY_COLUMNS
        );
        let mut deps = self
            .query_dependencies(
                &query,
                vec![
                    source_id.to_string().into(),
                    target_id.to_string().into(),
                    kind.as_str().to_string().into(),
                ],
            )
            .await?;
        Ok(deps.pop())
    }

    async fn blocking_candidates(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT DISTINCT e.id
                 FROM elements e
                 JOIN dependencies d ON d.source_id = e.id
                 WHERE d.type IN ('blocks', 'parent-child', 'awaits')
                   AND e.deleted_at IS NULL
                   AND e.status != 'tombstone'
                 ORDER BY e.id ASC",
                params![],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            ids.push(id);
        }

        Ok(ids)
    }

    async fn list_elements(&self) -> Result<Vec<Element>> {
        let query = format!("SELECT {} FROM elements ORDER BY id ASC", ELEMENT_COLUMNS);
        self.query_elements(&query, Vec::new()).await
    }

    async fn list_dependencies(&self) -> Result<Vec<Dependency>> {
        let query = format!(
            "SELECT {} FROM dependencies ORDER BY created_at ASC, source_id ASC",
            DEPENDENCY_COLUMNS
        );
        self.query_dependencies(&query, Vec::new()).await
    }

    async fn upsert_element(&self, element: &Element) -> Result<()> {
        element.validate()?;

        let query = r#"
            INSERT INTO elements (
                id, type, status, priority, complexity,
                created_at, updated_at, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                type = excluded.type,
                status = excluded.status,
                priority = excluded.priority,
                complexity = excluded.complexity,
                updated_at = excluded.updated_at,
                deleted_at = excluded.deleted_at
        "#;

        self.conn
            .execute(
                query,
                params![
                    element.id.clone(),
                    element.element_type.as_str(),
                    element.status.as_str(),
                    element.priority.map(|p| p.as_i64()),
                    element.complexity.map(|c| c.as_i64()),
                    element.created_at.to_rfc3339(),
                    element.updated_at.to_rfc3339(),
                    element.deleted_at.map(|dt| dt.to_rfc3339()),
                ],
            )
            .await?;

        Ok(())
    }

    async fn set_status(&self, id: &str, status: ElementStatus) -> Result<Option<ElementStatus>> {
        let Some(element) = self.get_element(id).await? else {
            return Ok(None);
        };

        self.conn
            .execute(
                "UPDATE elements SET status = ?, updated_at = ? WHERE id = ?",
                params![status.as_str(), Utc::now().to_rfc3339(), id],
            )
            .await?;

        Ok(Some(element.status))
    }

    async fn soft_delete(&self, id: &str) -> Result<bool> {
        match self.get_element(id).await? {
            Some(element) if !element.is_deleted() => {
                let now = Utc::now().to_rfc3339();
                self.conn
                    .execute(
                        "UPDATE elements SET deleted_at = ?, updated_at = ? WHERE id = ?",
                        params![now.clone(), now, id],
                    )
                    .await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_dependency(&self, dep: &Dependency) -> Result<()> {
        dep.validate()?;

        let metadata = dep.gate.as_ref().map(serde_json::to_string).transpose()?;

        let query = r#"
            INSERT INTO dependencies (source_id, target_id, type, metadata, created_at, created_by)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id, target_id, type) DO UPDATE SET
                metadata = excluded.metadata,
                created_by = excluded.created_by
        "#;

        self.conn
            .execute(
                query,
                params![
                    dep.source_id.clone(),
                    dep.target_id.clone(),
                    dep.kind.as_str(),
                    metadata,
                    dep.created_at.to_rfc3339(),
                    dep.created_by.clone(),
                ],
            )
            .await?;

        Ok(())
    }

    async fn remove_dependency(
        &self,
        source_id: &str,
        target_id: &str,
        kind: DependencyKind,
    ) -> Result<bool> {
        if self.get_dependency(source_id, target_id, kind).await?.is_none() {
            return Ok(false);
        }

        self.conn
            .execute(
                "DELETE FROM dependencies WHERE source_id = ? AND target_id = ? AND type = ?",
                params![source_id, target_id, kind.as_str()],
            )
            .await?;

        Ok(true)
    }

    async fn update_gate(&self, source_id: &str, target_id: &str, gate: &Gate) -> Result<()> {
        if self
            .get_dependency(source_id, target_id, DependencyKind::Awaits)
            .await?
            .is_none()
        {
            return Err(StoreError::DependencyNotFound(format!(
                "{} awaits {}",
                source_id, target_id
            )));
        }

        let metadata = serde_json::to_string(gate)?;
        self.conn
            .execute(
                "UPDATE dependencies SET metadata = ?
                 WHERE source_id = ? AND target_id = ? AND type = 'awaits'",
                params![metadata, source_id, target_id],
            )
            .await?;

        Ok(())
    }

    async fn save_blocked(&self, entry: &BlockedEntry) -> Result<()> {
        let query = r#"
            INSERT INTO blocked_cache (element_id, blocked_by, reason, computed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(element_id) DO UPDATE SET
                blocked_by = excluded.blocked_by,
                reason = excluded.reason,
                computed_at = excluded.computed_at
        "#;

        self.conn
            .execute(
                query,
                params![
                    entry.element_id.clone(),
                    entry.blocked_by.clone(),
                    entry.reason.clone(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await?;

        Ok(())
    }

    async fn delete_blocked(&self, element_id: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM blocked_cache WHERE element_id = ?",
                params![element_id],
            )
            .await?;
        Ok(())
    }

    async fn clear_blocked(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM blocked_cache", params![])
            .await?;
        Ok(())
    }

    async fn load_blocked(&self) -> Result<Vec<BlockedEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT element_id, blocked_by, reason FROM blocked_cache ORDER BY element_id ASC",
                params![],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(BlockedEntry {
                element_id: row.get(0)?,
                blocked_by: row.get(1)?,
                reason: row.get(2)?,
            });
        }

        Ok(entries)
    }
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::MalformedRow(format!("failed to parse {}: {}", column, e)))
}

/// Helper function to parse an element row from query results
fn parse_element_row(row: &turso::Row) -> Result<Element> {
    let type_str: String = row.get(1)?;
    let status_str: String = row.get(2)?;
    let priority: Option<i64> = row.get(3)?;
    let complexity: Option<i64> = row.get(4)?;
    let created_at_str: String = row.get(5)?;
    let updated_at_str: String = row.get(6)?;
    let deleted_at_str: Option<String> = row.get(7)?;

    let priority = priority
        .map(|p| {
            Priority::from_i64(p)
                .ok_or_else(|| StoreError::MalformedRow(format!("priority out of range: {}", p)))
        })
        .transpose()?;
    let complexity = complexity
        .map(|c| {
            Complexity::from_i64(c)
                .ok_or_else(|| StoreError::MalformedRow(format!("complexity out of range: {}", c)))
        })
        .transpose()?;

    Ok(Element {
        id: row.get(0)?,
        element_type: type_str.parse::<ElementType>()?,
        status: status_str.parse::<ElementStatus>()?,
        priority,
        complexity,
        created_at: parse_timestamp(&created_at_str, "created_at")?,
        updated_at: parse_timestamp(&updated_at_str, "updated_at")?,
        deleted_at: deleted_at_str
            .map(|s| parse_timestamp(&s, "deleted_at"))
            .transpose()?,
    })
}

/// Helper function to parse a dependency row from query results
fn parse_dependency_row(row: &turso::Row) -> Result<Dependency> {
    let kind_str: String = row.get(2)?;
    let metadata: Option<String> = row.get(3)?;
    let created_at_str: String = row.get(4)?;

    let gate = match metadata {
        Some(json) if !json.is_empty() && json != "null" => {
            Some(serde_json::from_str::<Gate>(&json)?)
        }
        _ => None,
    };

    Ok(Dependency {
        source_id: row.get(0)?,
        target_id: row.get(1)?,
        kind: kind_str.parse::<DependencyKind>()?,
        gate,
        created_at: parse_timestamp(&created_at_str, "created_at")?,
        created_by: row.get(5)?,
    })
}
