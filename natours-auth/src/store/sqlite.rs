//! SQLite-backed principal store

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use natours_core::{
    internal_error, storage_error, Email, ErrorContext, NatoursError, NatoursResult,
    PasswordDigest, Principal, PrincipalId, PrincipalRecord, PrincipalStore, Projection,
    SaveCondition, SaveOutcome,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, error, info};

use super::apply_projection;

const COMPONENT: &str = "sqlite_store";

const SELECT_COLUMNS: &str = "SELECT id, name, email, role, password_hash, password_changed_at, \
     reset_token_hash, reset_token_expires_at, created_at FROM principals";

// `password_changed_at` only moves forward; timestamps are fixed-width UTC
// strings so they compare lexicographically.
const UPDATE_PRINCIPAL: &str = r#"
    UPDATE principals SET
        name = ?,
        email = ?,
        role = ?,
        password_hash = COALESCE(?, password_hash),
        password_changed_at = CASE
            WHEN password_changed_at IS NULL OR ? > password_changed_at THEN ?
            ELSE password_changed_at
        END,
        reset_token_hash = ?,
        reset_token_expires_at = ?
    WHERE id = ?
"#;

const UPDATE_CREDENTIALS: &str = r#"
    UPDATE principals SET
        password_hash = COALESCE(?, password_hash),
        password_changed_at = CASE
            WHEN password_changed_at IS NULL OR ? > password_changed_at THEN ?
            ELSE password_changed_at
        END,
        reset_token_hash = ?,
        reset_token_expires_at = ?
    WHERE id = ?
"#;

fn conditional(update: &str, condition: &SaveCondition) -> String {
    match condition {
        SaveCondition::Always => update.to_string(),
        SaveCondition::ResetHashEquals(_) => format!("{} AND reset_token_hash IS ?", update),
    }
}

/// Database principal row
#[derive(Debug, sqlx::FromRow)]
struct PrincipalRow {
    id: String,
    name: String,
    email: String,
    role: String,
    password_hash: String,
    password_changed_at: Option<String>,
    reset_token_hash: Option<String>,
    reset_token_expires_at: Option<String>,
    created_at: String,
}

impl PrincipalRow {
    fn into_record(self) -> NatoursResult<PrincipalRecord> {
        let id = self
            .id
            .parse::<PrincipalId>()
            .map_err(|e| storage_error!("Stored principal id is not a UUID", COMPONENT, e))?;

        Ok(PrincipalRecord {
            id,
            name: self.name,
            email: Email::parse(&self.email)?,
            role: self.role.parse()?,
            password_hash: Some(PasswordDigest::from_phc(self.password_hash)),
            password_changed_at: parse_optional(self.password_changed_at)?,
            reset_token_hash: self.reset_token_hash,
            reset_token_expires_at: parse_optional(self.reset_token_expires_at)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> NatoursResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| storage_error!(format!("Invalid stored timestamp '{}'", value), COMPONENT, e))
}

fn parse_optional(value: Option<String>) -> NatoursResult<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

/// Principal store on a SQLite database. Conditional saves are a single
/// `UPDATE ... WHERE reset_token_hash IS ?`.
#[derive(Debug, Clone)]
pub struct SqlitePrincipalStore {
    pool: SqlitePool,
}

impl SqlitePrincipalStore {
    /// Open (creating if needed) the database at `url` and prepare the schema
    pub async fn connect(url: &str) -> NatoursResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| storage_error!(format!("Invalid database URL '{}'", url), COMPONENT, e))?
            .create_if_missing(true);

        // An in-memory database lives as long as its one connection
        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| storage_error!("Failed to open database", COMPONENT, e))?;

        Self::new(pool).await
    }

    pub async fn new(pool: SqlitePool) -> NatoursResult<Self> {
        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    async fn create_tables(&self) -> NatoursResult<()> {
        let table = r#"
            CREATE TABLE IF NOT EXISTS principals (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                role TEXT NOT NULL DEFAULT 'regular'
                    CHECK (role IN ('regular', 'operator', 'admin')),
                password_hash TEXT NOT NULL,
                password_changed_at TEXT,
                reset_token_hash TEXT,
                reset_token_expires_at TEXT,
                created_at TEXT NOT NULL,
                CHECK ((reset_token_hash IS NULL) = (reset_token_expires_at IS NULL))
            )
        "#;
        let index = "CREATE INDEX IF NOT EXISTS idx_principals_reset_token_hash \
                     ON principals(reset_token_hash)";

        for statement in [table, index] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    error!("Failed to create principals table: {}", e);
                    storage_error!("Failed to create principals table", COMPONENT, e)
                })?;
        }

        info!("Principals table ready");
        Ok(())
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        value: &str,
    ) -> NatoursResult<Option<PrincipalRecord>> {
        let query = format!("{} WHERE {} = ?", SELECT_COLUMNS, clause);
        let row = sqlx::query_as::<_, PrincipalRow>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error!("Failed to load principal", COMPONENT, e))?;

        row.map(PrincipalRow::into_record).transpose()
    }
}

#[async_trait]
impl PrincipalStore for SqlitePrincipalStore {
    async fn insert(&self, principal: &Principal) -> NatoursResult<()> {
        let record = principal.to_record();
        let password_hash = record.password_hash.as_ref().ok_or_else(|| {
            internal_error!("Cannot insert a principal without a password digest", COMPONENT)
        })?;

        let query = r#"
            INSERT INTO principals (id, name, email, role, password_hash, password_changed_at,
                                    reset_token_hash, reset_token_expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        sqlx::query(query)
            .bind(record.id.to_string())
            .bind(&record.name)
            .bind(record.email.as_str())
            .bind(record.role.as_str())
            .bind(password_hash.as_str())
            .bind(record.password_changed_at.map(format_timestamp))
            .bind(&record.reset_token_hash)
            .bind(record.reset_token_expires_at.map(format_timestamp))
            .bind(format_timestamp(record.created_at))
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    NatoursError::Conflict {
                        message: "Email is already registered".to_string(),
                        context: ErrorContext::new(COMPONENT)
                            .with_operation("insert")
                            .with_metadata("email", record.email.as_str()),
                    }
                }
                other => storage_error!("Failed to insert principal", COMPONENT, other),
            })?;

        debug!(principal_id = %record.id, "Principal inserted");
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &PrincipalId,
        projection: Projection,
    ) -> NatoursResult<Option<Principal>> {
        self.fetch_one_where("id", &id.to_string())
            .await?
            .map(|record| apply_projection(record, projection))
            .transpose()
    }

    async fn find_by_email(
        &self,
        email: &Email,
        projection: Projection,
    ) -> NatoursResult<Option<Principal>> {
        self.fetch_one_where("email", email.as_str())
            .await?
            .map(|record| apply_projection(record, projection))
            .transpose()
    }

    async fn find_by_reset_hash(&self, token_hash: &str) -> NatoursResult<Option<Principal>> {
        self.fetch_one_where("reset_token_hash", token_hash)
            .await?
            .map(|record| apply_projection(record, Projection::Default))
            .transpose()
    }

    async fn save(
        &self,
        principal: &Principal,
        condition: SaveCondition,
    ) -> NatoursResult<SaveOutcome> {
        let record = principal.to_record();
        let changed_at = record.password_changed_at.map(format_timestamp);

        let query = conditional(UPDATE_PRINCIPAL, &condition);

        let mut statement = sqlx::query(&query)
            .bind(&record.name)
            .bind(record.email.as_str())
            .bind(record.role.as_str())
            .bind(record.password_hash.as_ref().map(PasswordDigest::as_str))
            .bind(changed_at.clone())
            .bind(changed_at)
            .bind(&record.reset_token_hash)
            .bind(record.reset_token_expires_at.map(format_timestamp))
            .bind(record.id.to_string());

        if let SaveCondition::ResetHashEquals(expected) = &condition {
            statement = statement.bind(expected.clone());
        }

        let result = statement.execute(&self.pool).await.map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => NatoursError::Conflict {
                message: "Email is already registered".to_string(),
                context: ErrorContext::new(COMPONENT).with_operation("save"),
            },
            other => storage_error!("Failed to save principal", COMPONENT, other),
        })?;

        if result.rows_affected() == 0 {
            debug!(principal_id = %record.id, "Conditional save found stale state");
            return Ok(SaveOutcome::Stale);
        }
        Ok(SaveOutcome::Saved)
    }

    async fn save_credentials(
        &self,
        principal: &Principal,
        condition: SaveCondition,
    ) -> NatoursResult<SaveOutcome> {
        let record = principal.to_record();
        let changed_at = record.password_changed_at.map(format_timestamp);
        let query = conditional(UPDATE_CREDENTIALS, &condition);

        let mut statement = sqlx::query(&query)
            .bind(record.password_hash.as_ref().map(PasswordDigest::as_str))
            .bind(changed_at.clone())
            .bind(changed_at)
            .bind(&record.reset_token_hash)
            .bind(record.reset_token_expires_at.map(format_timestamp))
            .bind(record.id.to_string());

        if let SaveCondition::ResetHashEquals(expected) = &condition {
            statement = statement.bind(expected.clone());
        }

        let result = statement
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error!("Failed to save credentials", COMPONENT, e))?;

        if result.rows_affected() == 0 {
            debug!(principal_id = %record.id, "Conditional credential save found stale state");
            return Ok(SaveOutcome::Stale);
        }
        Ok(SaveOutcome::Saved)
    }
}
