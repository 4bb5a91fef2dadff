use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::instrument;

use invoicer_catalog::{Article, ArticleRecord};
use invoicer_core::{ArticleId, BusinessId, Decimal, Entity, InvoiceStatusId, TaxId};
use invoicer_invoicing::{InvoiceStatus, InvoiceStatusRecord, Tax, TaxRecord};

use super::{PostgresStore, decode_all, decode_one, map_sqlx_error, missing};
use crate::store::{CatalogStore, StoreError, StoreResult};

fn article_from_row(row: &PgRow) -> Result<Article, sqlx::Error> {
    Ok(Article::restore(ArticleRecord {
        id: ArticleId::new(row.try_get("id")?),
        business_id: BusinessId::new(row.try_get("business_id")?),
        name: row.try_get("name")?,
        unit_price: row.try_get("unit_price")?,
        unit: row.try_get("unit")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

fn tax_from_row(row: &PgRow) -> Result<Tax, sqlx::Error> {
    Ok(Tax::restore(TaxRecord {
        id: TaxId::new(row.try_get("id")?),
        rate: row.try_get("rate")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

fn status_from_row(row: &PgRow) -> Result<InvoiceStatus, sqlx::Error> {
    Ok(InvoiceStatus::restore(InvoiceStatusRecord {
        id: InvoiceStatusId::new(row.try_get("id")?),
        code: row.try_get("code")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

impl PostgresStore {
    /// Delete `id` from `table` unless `in_use` (a query over `$1`) finds a
    /// reference to it.
    async fn delete_unless_referenced(
        &self,
        operation: &str,
        table: &str,
        in_use: &str,
        id: i64,
        in_use_message: &str,
    ) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let referenced: bool = sqlx::query_scalar(in_use)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        if referenced {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::ReferentialViolation(in_use_message.to_string()));
        }

        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    #[instrument(skip(self, article), fields(article_id = %article.id()), err)]
    async fn insert_article(&self, article: Article) -> StoreResult<Article> {
        sqlx::query(
            r#"
            INSERT INTO articles (id, business_id, name, unit_price, unit, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(article.id().get())
        .bind(article.business_id().get())
        .bind(article.name())
        .bind(article.unit_price())
        .bind(article.unit())
        .bind(article.description())
        .bind(article.created_at())
        .bind(article.updated_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_article", e))?;
        Ok(article)
    }

    #[instrument(skip(self, article), fields(article_id = %article.id()), err)]
    async fn update_article(&self, article: Article) -> StoreResult<Article> {
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET name = $2, unit_price = $3, unit = $4, description = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(article.id().get())
        .bind(article.name())
        .bind(article.unit_price())
        .bind(article.unit())
        .bind(article.description())
        .bind(article.updated_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_article", e))?;
        if result.rows_affected() == 0 {
            return Err(missing("article", article.id()));
        }
        Ok(article)
    }

    async fn article(&self, id: ArticleId) -> StoreResult<Option<Article>> {
        let row = sqlx::query("SELECT * FROM articles WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("article", e))?;
        decode_one("article", row, article_from_row)
    }

    async fn articles(&self, business_id: BusinessId) -> StoreResult<Vec<Article>> {
        let rows = sqlx::query("SELECT * FROM articles WHERE business_id = $1 ORDER BY id")
            .bind(business_id.get())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("articles", e))?;
        decode_all("articles", rows, article_from_row)
    }

    #[instrument(skip(self), err)]
    async fn delete_article(&self, id: ArticleId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("UPDATE invoice_items SET article_id = NULL, updated_at = now() WHERE article_id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_article", e))?;

        let result = sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_article", e))?;
        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(missing("article", id));
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self, tax), fields(tax_id = %tax.id()), err)]
    async fn insert_tax(&self, tax: Tax) -> StoreResult<Tax> {
        sqlx::query("INSERT INTO taxes (id, rate, name, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(tax.id().get())
            .bind(tax.rate())
            .bind(tax.name())
            .bind(tax.created_at())
            .bind(tax.updated_at())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_tax", e))?;
        Ok(tax)
    }

    #[instrument(skip(self, tax), fields(tax_id = %tax.id()), err)]
    async fn update_tax(&self, tax: Tax) -> StoreResult<Tax> {
        let result = sqlx::query("UPDATE taxes SET rate = $2, name = $3, updated_at = $4 WHERE id = $1")
            .bind(tax.id().get())
            .bind(tax.rate())
            .bind(tax.name())
            .bind(tax.updated_at())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_tax", e))?;
        if result.rows_affected() == 0 {
            return Err(missing("tax", tax.id()));
        }
        Ok(tax)
    }

    async fn tax(&self, id: TaxId) -> StoreResult<Option<Tax>> {
        let row = sqlx::query("SELECT * FROM taxes WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("tax", e))?;
        decode_one("tax", row, tax_from_row)
    }

    async fn tax_by_rate(&self, rate: Option<Decimal>) -> StoreResult<Option<Tax>> {
        let row = sqlx::query("SELECT * FROM taxes WHERE rate IS NOT DISTINCT FROM $1")
            .bind(rate)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("tax_by_rate", e))?;
        decode_one("tax_by_rate", row, tax_from_row)
    }

    async fn taxes(&self) -> StoreResult<Vec<Tax>> {
        let rows = sqlx::query("SELECT * FROM taxes ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("taxes", e))?;
        decode_all("taxes", rows, tax_from_row)
    }

    #[instrument(skip(self), err)]
    async fn delete_tax(&self, id: TaxId) -> StoreResult<()> {
        let deleted = self
            .delete_unless_referenced(
                "delete_tax",
                "taxes",
                "SELECT EXISTS (SELECT 1 FROM invoice_items WHERE tax_id = $1)",
                id.get(),
                "Cannot delete tax that is in use by invoice items",
            )
            .await?;
        if deleted == 0 {
            return Err(missing("tax", id));
        }
        Ok(())
    }

    #[instrument(skip(self, status), fields(status_id = %status.id()), err)]
    async fn insert_status(&self, status: InvoiceStatus) -> StoreResult<InvoiceStatus> {
        sqlx::query("INSERT INTO invoice_statuses (id, code, created_at, updated_at) VALUES ($1, $2, $3, $4)")
            .bind(status.id().get())
            .bind(status.code())
            .bind(status.created_at())
            .bind(status.updated_at())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_status", e))?;
        Ok(status)
    }

    #[instrument(skip(self, status), fields(status_id = %status.id()), err)]
    async fn update_status(&self, status: InvoiceStatus) -> StoreResult<InvoiceStatus> {
        let result = sqlx::query("UPDATE invoice_statuses SET code = $2, updated_at = $3 WHERE id = $1")
            .bind(status.id().get())
            .bind(status.code())
            .bind(status.updated_at())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_status", e))?;
        if result.rows_affected() == 0 {
            return Err(missing("invoice status", status.id()));
        }
        Ok(status)
    }

    async fn status(&self, id: InvoiceStatusId) -> StoreResult<Option<InvoiceStatus>> {
        let row = sqlx::query("SELECT * FROM invoice_statuses WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("status", e))?;
        decode_one("status", row, status_from_row)
    }

    async fn status_by_code(&self, code: &str) -> StoreResult<Option<InvoiceStatus>> {
        let row = sqlx::query("SELECT * FROM invoice_statuses WHERE code = $1")
            .bind(code)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("status_by_code", e))?;
        decode_one("status_by_code", row, status_from_row)
    }

    async fn statuses(&self) -> StoreResult<Vec<InvoiceStatus>> {
        let rows = sqlx::query("SELECT * FROM invoice_statuses ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("statuses", e))?;
        decode_all("statuses", rows, status_from_row)
    }

    #[instrument(skip(self), err)]
    async fn delete_status(&self, id: InvoiceStatusId) -> StoreResult<()> {
        let deleted = self
            .delete_unless_referenced(
                "delete_status",
                "invoice_statuses",
                "SELECT EXISTS (SELECT 1 FROM invoices WHERE status_id = $1)",
                id.get(),
                "Cannot delete invoice status that is in use by invoices",
            )
            .await?;
        if deleted == 0 {
            return Err(missing("invoice status", id));
        }
        Ok(())
    }
}
