//! Postgres-backed store.
//!
//! Rows are written with explicit ids drawn from each table's `BIGSERIAL`
//! sequence, so ids are allocated before the domain entity is built, as with
//! the in-memory store. The schema in `migrations/` is applied by
//! [`PostgresStore::migrate`] and carries the relational rules: the
//! `(issuer_id, invoice_number)` unique key, cascades, set-null for articles
//! and restrict for taxes and statuses still in use.
//!
//! Invoice mutations run in one transaction holding `SELECT ... FOR UPDATE` on
//! the header row, so concurrent edits of one invoice are applied one after
//! the other, also across processes.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` |
//! | Database (foreign key violation) | `23503` | `ReferentialViolation` |
//! | Database (other) | Any other | `Backend` |
//! | RowNotFound | N/A | `Missing` |
//! | PoolClosed, Decode, Io, ... | N/A | `Backend` |

mod catalog;
mod invoices;
mod parties;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgRow;
use tracing::instrument;

use invoicer_core::DomainResult;

use super::{BackOfficeStore, Sequence, StoreError, StoreResult, seed_defaults};

const SCHEMA: &str = include_str!("../../../migrations/0001_back_office.sql");

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect, apply the schema and seed the default taxes and statuses.
    pub async fn connect(database_url: &str) -> DomainResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.migrate().await?;
        seed_defaults(&store).await?;
        tracing::info!("postgres store ready");
        Ok(store)
    }

    /// Apply the schema. Every statement is idempotent.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BackOfficeStore for PostgresStore {
    async fn next_id(&self, sequence: Sequence) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT nextval(pg_get_serial_sequence($1, 'id'))")
            .bind(table_of(sequence))
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("next_id", e))
    }
}

fn table_of(sequence: Sequence) -> &'static str {
    match sequence {
        Sequence::Tenant => "tenants",
        Sequence::User => "users",
        Sequence::Business => "businesses",
        Sequence::BankAccount => "bank_accounts",
        Sequence::Article => "articles",
        Sequence::Tax => "taxes",
        Sequence::InvoiceStatus => "invoice_statuses",
        Sequence::Invoice => "invoices",
        Sequence::InvoiceItem => "invoice_items",
    }
}

/// Messages for the named constraints callers can run into.
fn constraint_message(constraint: &str) -> Option<&'static str> {
    match constraint {
        "users_email_key" => Some("A user with this email already exists"),
        "taxes_rate_key" => Some("Tax with this rate already exists"),
        "invoice_statuses_code_key" => Some("Invoice status with this code already exists"),
        "invoices_issuer_number_key" => Some("Invoice number already exists for this issuer"),
        "tenants_issuer_business_key" => Some("Business is already another tenant's issuer business"),
        "tenants_issuer_business_fk" => {
            Some("Cannot delete issuer business. This business is used for invoice creation.")
        }
        _ => None,
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err
                .constraint()
                .and_then(constraint_message)
                .map(str::to_string)
                .unwrap_or_else(|| format!("database error in {operation}: {}", db_err.message()));
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation(message),
                Some("23503") => StoreError::ReferentialViolation(message),
                _ => StoreError::Backend(message),
            }
        }
        sqlx::Error::RowNotFound => StoreError::Missing(format!("row not found in {operation}")),
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn missing(what: &str, id: impl core::fmt::Display) -> StoreError {
    StoreError::Missing(format!("{what} {id}"))
}

/// A row that does not form a valid entity.
fn corrupt(err: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

type Decoder<T> = fn(&PgRow) -> Result<T, sqlx::Error>;

fn decode_one<T>(operation: &str, row: Option<PgRow>, decode: Decoder<T>) -> StoreResult<Option<T>> {
    row.as_ref()
        .map(decode)
        .transpose()
        .map_err(|e| map_sqlx_error(operation, e))
}

fn decode_all<T>(operation: &str, rows: Vec<PgRow>, decode: Decoder<T>) -> StoreResult<Vec<T>> {
    rows.iter()
        .map(decode)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| map_sqlx_error(operation, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_sequence_names_a_table_with_an_id_column() {
        let all = [
            Sequence::Tenant,
            Sequence::User,
            Sequence::Business,
            Sequence::BankAccount,
            Sequence::Article,
            Sequence::Tax,
            Sequence::InvoiceStatus,
            Sequence::Invoice,
            Sequence::InvoiceItem,
        ];
        for sequence in all {
            let table = table_of(sequence);
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (\n    id ")),
                "{table}"
            );
        }
    }

    #[test]
    fn invoice_numbers_are_unique_per_issuer_in_the_schema() {
        assert!(SCHEMA.contains("CONSTRAINT invoices_issuer_number_key UNIQUE (issuer_id, invoice_number)"));
        for name in ["users_email_key", "taxes_rate_key", "invoice_statuses_code_key", "invoices_issuer_number_key"] {
            assert!(SCHEMA.contains(name), "{name}");
            assert!(constraint_message(name).is_some(), "{name}");
        }
    }

    #[test]
    fn non_database_errors_map_to_store_errors() {
        assert!(matches!(
            map_sqlx_error("load", sqlx::Error::RowNotFound),
            StoreError::Missing(_)
        ));
        assert!(matches!(
            map_sqlx_error("load", sqlx::Error::PoolClosed),
            StoreError::Backend(_)
        ));
    }
}
