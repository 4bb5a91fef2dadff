use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use tracing::instrument;

use invoicer_core::{ArticleId, BusinessId, DomainError, DomainResult, Entity, InvoiceId, InvoiceItemId, InvoiceStatusId, TaxId};
use invoicer_invoicing::{Invoice, InvoiceItem, InvoiceItemRecord, InvoiceNumber, InvoiceRecord, InvoiceWithItems};

use super::{PostgresStore, corrupt, decode_all, map_sqlx_error, missing};
use crate::store::{InvoiceFilter, InvoiceMutation, InvoiceStore, StoreResult};

fn invoice_from_row(row: &PgRow) -> Result<Invoice, sqlx::Error> {
    let number: String = row.try_get("invoice_number")?;
    Ok(Invoice::restore(InvoiceRecord {
        id: InvoiceId::new(row.try_get("id")?),
        issuer_id: BusinessId::new(row.try_get("issuer_id")?),
        receiver_id: BusinessId::new(row.try_get("receiver_id")?),
        invoice_number: InvoiceNumber::parse(&number).map_err(corrupt)?,
        invoice_date: row.try_get("invoice_date")?,
        due_date: row.try_get("due_date")?,
        status_id: InvoiceStatusId::new(row.try_get("status_id")?),
        subtotal: row.try_get("subtotal")?,
        total: row.try_get("total")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

fn item_from_row(row: &PgRow) -> Result<InvoiceItem, sqlx::Error> {
    let sort_order: i32 = row.try_get("sort_order")?;
    Ok(InvoiceItem::restore(InvoiceItemRecord {
        id: InvoiceItemId::new(row.try_get("id")?),
        invoice_id: InvoiceId::new(row.try_get("invoice_id")?),
        article_id: row.try_get::<Option<i64>, _>("article_id")?.map(ArticleId::new),
        tax_id: row.try_get::<Option<i64>, _>("tax_id")?.map(TaxId::new),
        tax_rate: row.try_get("tax_rate")?,
        description: row.try_get("description")?,
        quantity: row.try_get("quantity")?,
        unit_price: row.try_get("unit_price")?,
        subtotal: row.try_get("subtotal")?,
        tax_amount: row.try_get("tax_amount")?,
        total: row.try_get("total")?,
        sort_order: u32::try_from(sort_order).map_err(corrupt)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

async fn load_items(conn: &mut PgConnection, id: InvoiceId) -> StoreResult<Vec<InvoiceItem>> {
    let rows = sqlx::query("SELECT * FROM invoice_items WHERE invoice_id = $1 ORDER BY sort_order, id")
        .bind(id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_items", e))?;
    decode_all("load_items", rows, item_from_row)
}

async fn insert_header(conn: &mut PgConnection, invoice: &Invoice) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO invoices (id, issuer_id, receiver_id, invoice_number, invoice_date, due_date,
                              status_id, subtotal, total, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(invoice.id().get())
    .bind(invoice.issuer_id().get())
    .bind(invoice.receiver_id().get())
    .bind(invoice.invoice_number().as_str())
    .bind(invoice.invoice_date())
    .bind(invoice.due_date())
    .bind(invoice.status_id().get())
    .bind(invoice.subtotal())
    .bind(invoice.total())
    .bind(invoice.created_at())
    .bind(invoice.updated_at())
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_invoice", e))?;
    Ok(())
}

async fn update_header(conn: &mut PgConnection, invoice: &Invoice) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE invoices
        SET receiver_id = $2, invoice_number = $3, invoice_date = $4, due_date = $5,
            status_id = $6, subtotal = $7, total = $8, updated_at = $9
        WHERE id = $1
        "#,
    )
    .bind(invoice.id().get())
    .bind(invoice.receiver_id().get())
    .bind(invoice.invoice_number().as_str())
    .bind(invoice.invoice_date())
    .bind(invoice.due_date())
    .bind(invoice.status_id().get())
    .bind(invoice.subtotal())
    .bind(invoice.total())
    .bind(invoice.updated_at())
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("update_invoice", e))?;
    Ok(())
}

/// Make the stored item set equal to the aggregate's.
async fn write_items(conn: &mut PgConnection, aggregate: &InvoiceWithItems) -> StoreResult<()> {
    let invoice_id = aggregate.invoice().id().get();
    let keep: Vec<i64> = aggregate.items().iter().map(|i| i.id().get()).collect();
    sqlx::query("DELETE FROM invoice_items WHERE invoice_id = $1 AND NOT (id = ANY($2))")
        .bind(invoice_id)
        .bind(&keep)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("write_items", e))?;

    for item in aggregate.items() {
        let sort_order = i32::try_from(item.sort_order())
            .map_err(|e| map_sqlx_error("write_items", corrupt(e)))?;
        sqlx::query(
            r#"
            INSERT INTO invoice_items (id, invoice_id, article_id, tax_id, tax_rate, description,
                                       quantity, unit_price, subtotal, tax_amount, total,
                                       sort_order, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE
            SET article_id = EXCLUDED.article_id,
                tax_id = EXCLUDED.tax_id,
                tax_rate = EXCLUDED.tax_rate,
                description = EXCLUDED.description,
                quantity = EXCLUDED.quantity,
                unit_price = EXCLUDED.unit_price,
                subtotal = EXCLUDED.subtotal,
                tax_amount = EXCLUDED.tax_amount,
                total = EXCLUDED.total,
                sort_order = EXCLUDED.sort_order,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(item.id().get())
        .bind(invoice_id)
        .bind(item.article_id().map(ArticleId::get))
        .bind(item.tax_id().map(TaxId::get))
        .bind(item.tax_rate())
        .bind(item.description())
        .bind(item.quantity())
        .bind(item.unit_price())
        .bind(item.subtotal())
        .bind(item.tax_amount())
        .bind(item.total())
        .bind(sort_order)
        .bind(item.created_at())
        .bind(item.updated_at())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("write_items", e))?;
    }
    Ok(())
}

#[async_trait]
impl InvoiceStore for PostgresStore {
    #[instrument(skip(self, aggregate), fields(invoice_id = %aggregate.invoice().id()), err)]
    async fn insert_invoice(&self, aggregate: &InvoiceWithItems) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;
        insert_header(&mut tx, aggregate.invoice()).await?;
        write_items(&mut tx, aggregate).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self, mutation), err)]
    async fn mutate_invoice(&self, id: InvoiceId, mutation: InvoiceMutation<'_>) -> DomainResult<InvoiceWithItems> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Concurrent mutations of this invoice wait here until we commit.
        let row = sqlx::query("SELECT * FROM invoices WHERE id = $1 FOR UPDATE")
            .bind(id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("mutate_invoice", e))?;
        let Some(row) = row else {
            return Err(DomainError::not_found("Invoice not found"));
        };
        let invoice = invoice_from_row(&row).map_err(|e| map_sqlx_error("mutate_invoice", e))?;
        let items = load_items(&mut tx, id).await?;
        let mut aggregate = InvoiceWithItems::new(invoice, items)?;

        if let Err(err) = mutation(&mut aggregate) {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(err);
        }

        update_header(&mut tx, aggregate.invoice()).await?;
        write_items(&mut tx, &aggregate).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(aggregate)
    }

    async fn load_invoice(&self, id: InvoiceId) -> DomainResult<Option<InvoiceWithItems>> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let row = sqlx::query("SELECT * FROM invoices WHERE id = $1 FOR SHARE")
            .bind(id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("load_invoice", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let invoice = invoice_from_row(&row).map_err(|e| map_sqlx_error("load_invoice", e))?;
        let items = load_items(&mut tx, id).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        InvoiceWithItems::new(invoice, items).map(Some)
    }

    async fn invoices(&self, filter: &InvoiceFilter) -> StoreResult<Vec<Invoice>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM invoices
            WHERE ($1::BIGINT IS NULL OR issuer_id = $1)
              AND ($2::BIGINT IS NULL OR status_id = $2)
            ORDER BY id DESC
            "#,
        )
        .bind(filter.issuer_id.map(BusinessId::get))
        .bind(filter.status_id.map(InvoiceStatusId::get))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("invoices", e))?;
        decode_all("invoices", rows, invoice_from_row)
    }

    async fn last_invoice_number(&self, issuer_id: BusinessId) -> StoreResult<Option<InvoiceNumber>> {
        let number: Option<String> = sqlx::query_scalar(
            "SELECT invoice_number FROM invoices WHERE issuer_id = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(issuer_id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("last_invoice_number", e))?;
        number
            .map(|n| InvoiceNumber::parse(&n))
            .transpose()
            .map_err(|e| map_sqlx_error("last_invoice_number", corrupt(e)))
    }

    #[instrument(skip(self), err)]
    async fn delete_invoice(&self, id: InvoiceId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_invoice", e))?;
        if result.rows_affected() == 0 {
            return Err(missing("invoice", id));
        }
        Ok(())
    }
}
