use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use super::TokenStore;
use crate::config::{is_identifier, DEFAULT_TABLE};
use crate::models::{NewTokenRecord, TokenId, TokenRecord, TokenRecordUpdate};

const COLUMNS: &str = "id, name, package, tokenable_type, tokenable_id, \
    access_token_fingerprint, refresh_token_fingerprint, \
    access_token_expire_at, refresh_token_expire_at, scopes, \
    last_used_at, created_at, updated_at";

/// Token records in Postgres.
///
/// The table name is interpolated into SQL, so it is checked to be a plain
/// identifier at construction.
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
    table: String,
}

impl PgTokenStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self {
            pool,
            table: DEFAULT_TABLE.to_string(),
        })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            table: DEFAULT_TABLE.to_string(),
        }
    }

    pub fn with_table(mut self, table: &str) -> anyhow::Result<Self> {
        if !is_identifier(table) {
            anyhow::bail!("'{}' is not a plain SQL identifier", table);
        }
        self.table = table.to_string();
        Ok(self)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn create(&self, new: NewTokenRecord) -> anyhow::Result<TokenRecord> {
        let sql = format!(
            "INSERT INTO {} (name, package, tokenable_type, tokenable_id, \
                access_token_expire_at, refresh_token_expire_at, scopes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {}",
            self.table, COLUMNS
        );
        let row = sqlx::query_as::<_, TokenRecordRow>(&sql)
            .bind(&new.name)
            .bind(&new.package)
            .bind(&new.tokenable_type)
            .bind(&new.tokenable_id)
            .bind(new.access_token_expire_at)
            .bind(new.refresh_token_expire_at)
            .bind(Json(&new.scopes))
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn find_by_id(&self, id: TokenId) -> anyhow::Result<Option<TokenRecord>> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", COLUMNS, self.table);
        let row = sqlx::query_as::<_, TokenRecordRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn update(&self, id: TokenId, update: TokenRecordUpdate) -> anyhow::Result<Option<TokenRecord>> {
        let sql = format!(
            "UPDATE {} SET \
                access_token_fingerprint = COALESCE($2, access_token_fingerprint), \
                refresh_token_fingerprint = COALESCE($3, refresh_token_fingerprint), \
                last_used_at = COALESCE($4, last_used_at), \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {}",
            self.table, COLUMNS
        );
        let row = sqlx::query_as::<_, TokenRecordRow>(&sql)
            .bind(id)
            .bind(update.access_token_fingerprint)
            .bind(update.refresh_token_fingerprint)
            .bind(update.last_used_at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn delete(&self, id: TokenId) -> anyhow::Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_owner(&self, owner_type: &str, owner_id: &str) -> anyhow::Result<Vec<TokenRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE tokenable_type = $1 AND tokenable_id = $2 \
             ORDER BY created_at DESC, id DESC",
            COLUMNS, self.table
        );
        let rows = sqlx::query_as::<_, TokenRecordRow>(&sql)
            .bind(owner_type)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TokenRecordRow {
    id: i64,
    name: String,
    package: String,
    tokenable_type: String,
    tokenable_id: String,
    access_token_fingerprint: Option<String>,
    refresh_token_fingerprint: Option<String>,
    access_token_expire_at: DateTime<Utc>,
    refresh_token_expire_at: DateTime<Utc>,
    scopes: Json<Vec<String>>,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TokenRecordRow> for TokenRecord {
    fn from(row: TokenRecordRow) -> Self {
        TokenRecord {
            id: row.id,
            name: row.name,
            package: row.package,
            tokenable_type: row.tokenable_type,
            tokenable_id: row.tokenable_id,
            access_token_fingerprint: row.access_token_fingerprint,
            refresh_token_fingerprint: row.refresh_token_fingerprint,
            access_token_expire_at: row.access_token_expire_at,
            refresh_token_expire_at: row.refresh_token_expire_at,
            scopes: row.scopes.0,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
