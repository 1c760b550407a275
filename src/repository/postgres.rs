//! PostgreSQL document store (one JSONB row per document)

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{Pool, Postgres};

use super::{precondition_failed, BatchOp, Collection, Document, DocumentStore, Filter, IncrementOutcome, WriteBatch, WriteMode};
use crate::error::AppResult;

const MERGE_SQL: &str = r#"
    INSERT INTO documents (collection, id, data)
    VALUES ($1, $2, $3)
    ON CONFLICT (collection, id)
    DO UPDATE SET data = documents.data || EXCLUDED.data, updated_at = NOW()
"#;

const REPLACE_SQL: &str = r#"
    INSERT INTO documents (collection, id, data)
    VALUES ($1, $2, $3)
    ON CONFLICT (collection, id)
    DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
"#;

const DELETE_SQL: &str = "DELETE FROM documents WHERE collection = $1 AND id = $2";

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: Pool<Postgres>,
}

impl PgDocumentStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn put_sql(mode: WriteMode) -> &'static str {
    match mode {
        WriteMode::Merge => MERGE_SQL,
        WriteMode::Replace => REPLACE_SQL,
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: Collection, id: &str) -> AppResult<Option<Document>> {
        let row = sqlx::query_as::<_, (String, Value)>(
            "SELECT id, data FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, data)| Document { id, data }))
    }

    async fn query(&self, collection: Collection, filters: &[Filter]) -> AppResult<Vec<Document>> {
        // Containment of a flat object is equality on each scalar field
        let containment: Map<String, Value> = filters
            .iter()
            .map(|f| (f.field.clone(), f.value.clone()))
            .collect();

        let rows = sqlx::query_as::<_, (String, Value)>(
            "SELECT id, data FROM documents WHERE collection = $1 AND data @> $2 ORDER BY id",
        )
        .bind(collection.as_str())
        .bind(Value::Object(containment))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id, data)| Document { id, data }).collect())
    }

    async fn put(&self, collection: Collection, id: &str, data: Value, mode: WriteMode) -> AppResult<()> {
        sqlx::query(put_sql(mode))
            .bind(collection.as_str())
            .bind(id)
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create(&self, collection: Collection, id: &str, data: Value) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, collection: Collection, id: &str) -> AppResult<bool> {
        let result = sqlx::query(DELETE_SQL)
            .bind(collection.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> AppResult<IncrementOutcome> {
        // The WHERE clause is re-evaluated on the locked row, so concurrent
        // decrements cannot both pass the floor check.
        let applied = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE documents
            SET data = jsonb_set(data, ARRAY[$3::text], to_jsonb(COALESCE((data->>$3)::bigint, 0) + $4)),
                updated_at = NOW()
            WHERE collection = $1 AND id = $2
              AND ($5::bigint IS NULL OR COALESCE((data->>$3)::bigint, 0) + $4 >= $5)
            RETURNING COALESCE((data->>$3)::bigint, 0)
            "#,
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(field)
        .bind(delta)
        .bind(floor)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(value) = applied {
            return Ok(IncrementOutcome::Applied(value));
        }

        let current = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE((data->>$3)::bigint, 0) FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(field)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match current {
            Some(value) => IncrementOutcome::BelowFloor(value),
            None => IncrementOutcome::Missing,
        })
    }

    async fn commit(&self, batch: WriteBatch) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        for op in batch.ops {
            match op {
                // Row lock holds the checked state until commit; concurrent
                // increments wait on it
                BatchOp::Check {
                    collection,
                    id,
                    condition,
                } => {
                    let current = sqlx::query_scalar::<_, Value>(
                        "SELECT data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
                    )
                    .bind(collection.as_str())
                    .bind(&id)
                    .fetch_optional(&mut *tx)
                    .await?;
                    if !condition.holds(current.as_ref()) {
                        return Err(precondition_failed(collection, &id, &condition));
                    }
                }
                BatchOp::Put {
                    collection,
                    id,
                    data,
                    mode,
                } => {
                    sqlx::query(put_sql(mode))
                        .bind(collection.as_str())
                        .bind(id)
                        .bind(data)
                        .execute(&mut *tx)
                        .await?;
                }
                BatchOp::Delete { collection, id } => {
                    sqlx::query(DELETE_SQL)
                        .bind(collection.as_str())
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
