//! Address persistence.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{Address, AddressPatch, NewAddress};
use crate::deadline::bounded;
use crate::error::Result;

/// Port for address rows and the owner's primary pointer.
#[async_trait]
pub trait AddressStore: Send + Sync {
    /// Number of non-deleted addresses of `owner`.
    async fn count(&self, owner: &str) -> Result<i64>;

    /// Insert an address. With `claim_primary`, it also becomes primary
    /// unless `owner` already has one.
    async fn insert(
        &self,
        owner: &str,
        address: &NewAddress,
        claim_primary: bool,
    ) -> Result<i64>;

    /// Non-deleted addresses of `owner`, oldest first.
    async fn list(&self, owner: &str) -> Result<Vec<Address>>;

    async fn update(&self, owner: &str, id: i64, patch: &AddressPatch) -> Result<u64>;

    /// Flag as deleted, clearing the primary pointer if it was on `id`.
    async fn soft_delete(&self, owner: &str, id: i64) -> Result<u64>;

    /// Point the owner's primary at `id`. One atomic write, skipped unless
    /// `id` is a live address of `owner`. Returns the number of rows written.
    async fn set_primary(&self, owner: &str, id: i64) -> Result<u64>;
}

/// PostgreSQL address store.
#[derive(Clone)]
pub struct PgAddressStore {
    pool: PgPool,
}

impl PgAddressStore {
    /// Create a new [`PgAddressStore`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AddressStore for PgAddressStore {
    async fn count(&self, owner: &str) -> Result<i64> {
        let count: i64 = bounded(
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM addresses WHERE username = $1 AND is_deleted = FALSE",
            )
            .bind(owner)
            .fetch_one(&self.pool),
        )
        .await?;

        Ok(count)
    }

    async fn insert(
        &self,
        owner: &str,
        address: &NewAddress,
        claim_primary: bool,
    ) -> Result<i64> {
        let mut tx = bounded(self.pool.begin()).await?;

        let id: i64 = bounded(
            sqlx::query_scalar(
                r#"INSERT INTO addresses (
                    username, phone_number, full_name, division, district,
                    sub_district, union_name, division_slug, district_slug,
                    sub_district_slug, union_name_slug, address, longitude, latitude
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                RETURNING id"#,
            )
            .bind(owner)
            .bind(&address.phone_number)
            .bind(&address.full_name)
            .bind(&address.division)
            .bind(&address.district)
            .bind(&address.sub_district)
            .bind(&address.union_name)
            .bind(&address.division_slug)
            .bind(&address.district_slug)
            .bind(&address.sub_district_slug)
            .bind(&address.union_name_slug)
            .bind(&address.address)
            .bind(address.longitude)
            .bind(address.latitude)
            .fetch_one(&mut *tx),
        )
        .await?;

        if claim_primary {
            bounded(
                sqlx::query(
                    r#"INSERT INTO address_books (username, primary_address_id)
                    VALUES ($1, $2)
                    ON CONFLICT (username) DO UPDATE
                    SET primary_address_id = EXCLUDED.primary_address_id
                    WHERE address_books.primary_address_id IS NULL"#,
                )
                .bind(owner)
                .bind(id)
                .execute(&mut *tx),
            )
            .await?;
        }

        bounded(tx.commit()).await?;
        Ok(id)
    }

    async fn list(&self, owner: &str) -> Result<Vec<Address>> {
        let addresses = bounded(
            sqlx::query_as::<_, Address>(
                r#"SELECT
                    a.id, a.username, a.phone_number, a.full_name, a.division,
                    a.district, a.sub_district, a.union_name, a.division_slug,
                    a.district_slug, a.sub_district_slug, a.union_name_slug,
                    a.address, a.longitude, a.latitude,
                    COALESCE(b.primary_address_id = a.id, FALSE) AS is_primary,
                    a.is_deleted
                FROM addresses a
                LEFT JOIN address_books b ON b.username = a.username
                WHERE a.username = $1 AND a.is_deleted = FALSE
                ORDER BY a.id"#,
            )
            .bind(owner)
            .fetch_all(&self.pool),
        )
        .await?;

        Ok(addresses)
    }

    async fn update(&self, owner: &str, id: i64, patch: &AddressPatch) -> Result<u64> {
        if patch.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("UPDATE addresses SET ");
        let mut set = builder.separated(", ");
        for (column, value) in patch.text_fields() {
            if let Some(value) = value {
                set.push(format!("{column} = ")).push_bind_unseparated(value);
            }
        }
        if let Some(longitude) = patch.longitude {
            set.push("longitude = ").push_bind_unseparated(longitude);
        }
        if let Some(latitude) = patch.latitude {
            set.push("latitude = ").push_bind_unseparated(latitude);
        }

        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND username = ")
            .push_bind(owner)
            .push(" AND is_deleted = FALSE");

        let result = bounded(builder.build().execute(&self.pool)).await?;
        Ok(result.rows_affected())
    }

    async fn soft_delete(&self, owner: &str, id: i64) -> Result<u64> {
        let mut tx = bounded(self.pool.begin()).await?;

        let result = bounded(
            sqlx::query(
                "UPDATE addresses SET is_deleted = TRUE WHERE id = $1 AND username = $2 AND is_deleted = FALSE",
            )
            .bind(id)
            .bind(owner)
            .execute(&mut *tx),
        )
        .await?;

        bounded(
            sqlx::query(
                "UPDATE address_books SET primary_address_id = NULL WHERE username = $1 AND primary_address_id = $2",
            )
            .bind(owner)
            .bind(id)
            .execute(&mut *tx),
        )
        .await?;

        bounded(tx.commit()).await?;
        Ok(result.rows_affected())
    }

    async fn set_primary(&self, owner: &str, id: i64) -> Result<u64> {
        let result = bounded(
            sqlx::query(
                r#"INSERT INTO address_books (username, primary_address_id)
                SELECT $1, $2
                WHERE EXISTS (
                    SELECT 1 FROM addresses
                    WHERE id = $2 AND username = $1 AND is_deleted = FALSE
                )
                ON CONFLICT (username) DO UPDATE
                SET primary_address_id = EXCLUDED.primary_address_id"#,
            )
            .bind(owner)
            .bind(id)
            .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected())
    }
}

/// In-memory address store.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryAddressStore {
    state: tokio::sync::Mutex<MemoryState>,
}

#[cfg(test)]
#[derive(Default)]
struct MemoryState {
    next_id: i64,
    rows: Vec<Address>,
    primaries: std::collections::HashMap<String, i64>,
}

#[cfg(test)]
#[async_trait]
impl AddressStore for MemoryAddressStore {
    async fn count(&self, owner: &str) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .iter()
            .filter(|a| a.username == owner && !a.is_deleted)
            .count() as i64)
    }

    async fn insert(
        &self,
        owner: &str,
        address: &NewAddress,
        claim_primary: bool,
    ) -> Result<i64> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;

        state.rows.push(Address {
            id,
            username: owner.to_owned(),
            phone_number: address.phone_number.clone(),
            full_name: address.full_name.clone(),
            division: address.division.clone(),
            district: address.district.clone(),
            sub_district: address.sub_district.clone(),
            union_name: address.union_name.clone(),
            division_slug: address.division_slug.clone(),
            district_slug: address.district_slug.clone(),
            sub_district_slug: address.sub_district_slug.clone(),
            union_name_slug: address.union_name_slug.clone(),
            address: address.address.clone(),
            longitude: address.longitude,
            latitude: address.latitude,
            ..Default::default()
        });
        if claim_primary {
            state.primaries.entry(owner.to_owned()).or_insert(id);
        }

        Ok(id)
    }

    async fn list(&self, owner: &str) -> Result<Vec<Address>> {
        let state = self.state.lock().await;
        let primary = state.primaries.get(owner).copied();

        Ok(state
            .rows
            .iter()
            .filter(|a| a.username == owner && !a.is_deleted)
            .map(|a| Address {
                is_primary: primary == Some(a.id),
                ..a.clone()
            })
            .collect())
    }

    async fn update(&self, owner: &str, id: i64, patch: &AddressPatch) -> Result<u64> {
        if patch.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock().await;
        let Some(row) = state
            .rows
            .iter_mut()
            .find(|a| a.id == id && a.username == owner && !a.is_deleted)
        else {
            return Ok(0);
        };

        let texts = [
            (&mut row.phone_number, &patch.phone_number),
            (&mut row.full_name, &patch.full_name),
            (&mut row.division, &patch.division),
            (&mut row.district, &patch.district),
            (&mut row.sub_district, &patch.sub_district),
            (&mut row.union_name, &patch.union_name),
            (&mut row.division_slug, &patch.division_slug),
            (&mut row.district_slug, &patch.district_slug),
            (&mut row.sub_district_slug, &patch.sub_district_slug),
            (&mut row.union_name_slug, &patch.union_name_slug),
            (&mut row.address, &patch.address),
        ];
        for (field, value) in texts {
            if let Some(value) = value {
                *field = value.clone();
            }
        }
        if let Some(longitude) = patch.longitude {
            row.longitude = longitude;
        }
        if let Some(latitude) = patch.latitude {
            row.latitude = latitude;
        }

        Ok(1)
    }

    async fn soft_delete(&self, owner: &str, id: i64) -> Result<u64> {
        let mut state = self.state.lock().await;
        let Some(row) = state
            .rows
            .iter_mut()
            .find(|a| a.id == id && a.username == owner && !a.is_deleted)
        else {
            return Ok(0);
        };
        row.is_deleted = true;

        if state.primaries.get(owner) == Some(&id) {
            state.primaries.remove(owner);
        }
        Ok(1)
    }

    async fn set_primary(&self, owner: &str, id: i64) -> Result<u64> {
        let mut state = self.state.lock().await;
        if !state
            .rows
            .iter()
            .any(|a| a.id == id && a.username == owner && !a.is_deleted)
        {
            return Ok(0);
        }

        state.primaries.insert(owner.to_owned(), id);
        Ok(1)
    }
}
