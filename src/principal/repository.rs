//! Handle database requests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{Principal, PrincipalKind, PrincipalPatch};
use crate::deadline::bounded;
use crate::error::{Result, ServerError, ToInternal};

/// Port for durable principal records.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Find a record, deleted or not. Missing records yield
    /// [`ServerError::NotFound`].
    async fn find(&self, username: &str) -> Result<Principal>;

    /// Insert a new record. Fails if `username` is already taken.
    async fn insert(&self, principal: &Principal) -> Result<()>;

    /// Apply `patch` and return the number of matched records.
    async fn update(&self, username: &str, patch: &PrincipalPatch) -> Result<u64>;

    /// Remove the record for good.
    async fn purge(&self, username: &str) -> Result<u64>;
}

#[derive(Debug, sqlx::FromRow)]
struct PrincipalRecord {
    username: String,
    full_name: String,
    password: String,
    gender: Option<String>,
    email: Option<String>,
    occupation: Option<String>,
    organization: Option<String>,
    birth_date: Option<NaiveDate>,
    profile_pic_url: Option<String>,
    status: String,
    is_verified: bool,
    is_deleted: bool,
    last_reset_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PrincipalRecord> for Principal {
    type Error = super::UnknownStatus;

    fn try_from(record: PrincipalRecord) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            username: record.username,
            full_name: record.full_name,
            password: record.password,
            gender: record.gender,
            email: record.email,
            occupation: record.occupation,
            organization: record.organization,
            birth_date: record.birth_date,
            profile_pic_url: record.profile_pic_url,
            status: record.status.parse()?,
            is_verified: record.is_verified,
            is_deleted: record.is_deleted,
            last_reset_at: record.last_reset_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// PostgreSQL account repository, one table per [`PrincipalKind`].
#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
    kind: PrincipalKind,
}

impl PgAccountRepository {
    /// Create a new [`PgAccountRepository`].
    pub fn new(pool: PgPool, kind: PrincipalKind) -> Self {
        Self { pool, kind }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find(&self, username: &str) -> Result<Principal> {
        let query = format!(
            r#"SELECT
                username, full_name, password, gender, email, occupation,
                organization, birth_date, profile_pic_url, status,
                is_verified, is_deleted, last_reset_at, created_at, updated_at
            FROM {}
            WHERE username = $1"#,
            self.kind.table()
        );

        let record = bounded(
            sqlx::query_as::<_, PrincipalRecord>(&query)
                .bind(username)
                .fetch_one(&self.pool),
        )
        .await?;

        Principal::try_from(record).catch()
    }

    async fn insert(&self, principal: &Principal) -> Result<()> {
        let query = format!(
            r#"INSERT INTO {} (
                username, full_name, password, gender, email, occupation,
                organization, birth_date, profile_pic_url, status,
                is_verified, is_deleted, last_reset_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"#,
            self.kind.table()
        );

        bounded(
            sqlx::query(&query)
                .bind(&principal.username)
                .bind(&principal.full_name)
                .bind(&principal.password)
                .bind(&principal.gender)
                .bind(&principal.email)
                .bind(&principal.occupation)
                .bind(&principal.organization)
                .bind(principal.birth_date)
                .bind(&principal.profile_pic_url)
                .bind(principal.status.as_str())
                .bind(principal.is_verified)
                .bind(principal.is_deleted)
                .bind(principal.last_reset_at)
                .bind(principal.created_at)
                .bind(principal.updated_at)
                .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn update(&self, username: &str, patch: &PrincipalPatch) -> Result<u64> {
        if patch.is_empty() {
            return Err(ServerError::validation("Nothing to update"));
        }

        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("UPDATE {} SET ", self.kind.table()));
        let mut set = builder.separated(", ");

        if let Some(full_name) = &patch.full_name {
            set.push("full_name = ").push_bind_unseparated(full_name);
        }
        if let Some(gender) = &patch.gender {
            set.push("gender = ").push_bind_unseparated(gender);
        }
        if let Some(email) = &patch.email {
            set.push("email = ").push_bind_unseparated(email);
        }
        if let Some(occupation) = &patch.occupation {
            set.push("occupation = ").push_bind_unseparated(occupation);
        }
        if let Some(organization) = &patch.organization {
            set.push("organization = ").push_bind_unseparated(organization);
        }
        if let Some(birth_date) = patch.birth_date {
            set.push("birth_date = ").push_bind_unseparated(birth_date);
        }
        if let Some(url) = &patch.profile_pic_url {
            set.push("profile_pic_url = ").push_bind_unseparated(url);
        }
        if let Some(password) = &patch.password {
            set.push("password = ").push_bind_unseparated(password);
        }
        if let Some(at) = patch.last_reset_at {
            set.push("last_reset_at = ").push_bind_unseparated(at);
        }
        if let Some(is_deleted) = patch.is_deleted {
            set.push("is_deleted = ").push_bind_unseparated(is_deleted);
        }
        set.push("updated_at = NOW()");

        builder.push(" WHERE username = ").push_bind(username);

        let result = bounded(builder.build().execute(&self.pool)).await?;
        Ok(result.rows_affected())
    }

    async fn purge(&self, username: &str) -> Result<u64> {
        let query = format!("DELETE FROM {} WHERE username = $1", self.kind.table());
        let result =
            bounded(sqlx::query(&query).bind(username).execute(&self.pool)).await?;

        Ok(result.rows_affected())
    }
}

/// In-memory account repository.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryAccountRepository {
    records: tokio::sync::Mutex<std::collections::HashMap<String, Principal>>,
}

#[cfg(test)]
#[async_trait]
impl AccountRepository for MemoryAccountRepository {
    async fn find(&self, username: &str) -> Result<Principal> {
        self.records
            .lock()
            .await
            .get(username)
            .cloned()
            .ok_or(ServerError::NotFound)
    }

    async fn insert(&self, principal: &Principal) -> Result<()> {
        let mut records = self.records.lock().await;
        if records.contains_key(&principal.username) {
            return Err(ServerError::http(
                axum::http::StatusCode::CONFLICT,
                "Resource already exists",
            ));
        }
        records.insert(principal.username.clone(), principal.clone());
        Ok(())
    }

    async fn update(&self, username: &str, patch: &PrincipalPatch) -> Result<u64> {
        if patch.is_empty() {
            return Err(ServerError::validation("Nothing to update"));
        }

        match self.records.lock().await.get_mut(username) {
            Some(principal) => {
                patch.apply(principal);
                principal.updated_at = Utc::now();
                Ok(1)
            },
            None => Ok(0),
        }
    }

    async fn purge(&self, username: &str) -> Result<u64> {
        Ok(self.records.lock().await.remove(username).map_or(0, |_| 1))
    }
}
