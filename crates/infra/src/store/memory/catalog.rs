use chrono::Utc;

use invoicer_catalog::Article;
use invoicer_core::{ArticleId, BusinessId, Decimal, Entity, InvoiceStatusId, TaxId};
use invoicer_invoicing::{InvoiceStatus, Tax};

use super::{InMemoryStore, StoreError, StoreResult, Tables, missing};

impl Tables {
    fn check_tax_unique(&self, tax: &Tax) -> StoreResult<()> {
        let taken = self
            .taxes
            .values()
            .any(|t| t.id() != tax.id() && t.has_rate(tax.rate()));
        if taken {
            return Err(StoreError::UniqueViolation(
                "Tax with this rate already exists".to_string(),
            ));
        }
        Ok(())
    }

    fn check_status_unique(&self, status: &InvoiceStatus) -> StoreResult<()> {
        let taken = self
            .statuses
            .values()
            .any(|s| s.id() != status.id() && s.code() == status.code());
        if taken {
            return Err(StoreError::UniqueViolation(
                "Invoice status with this code already exists".to_string(),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Articles
// ─────────────────────────────────────────────────────────────────────────────

impl InMemoryStore {
    pub fn insert_article(&self, article: Article) -> StoreResult<Article> {
        let mut tables = self.write()?;
        if !tables.businesses.contains_key(&article.business_id()) {
            return Err(StoreError::ReferentialViolation(format!(
                "business {} does not exist",
                article.business_id()
            )));
        }
        tables.articles.insert(article.id(), article.clone());
        Ok(article)
    }

    pub fn update_article(&self, article: Article) -> StoreResult<Article> {
        let mut tables = self.write()?;
        match tables.articles.get_mut(&article.id()) {
            Some(row) => {
                *row = article.clone();
                Ok(article)
            }
            None => Err(missing("article", article.id())),
        }
    }

    pub fn article(&self, id: ArticleId) -> StoreResult<Option<Article>> {
        Ok(self.read()?.articles.get(&id).cloned())
    }

    pub fn articles(&self, business_id: BusinessId) -> StoreResult<Vec<Article>> {
        Ok(self
            .read()?
            .articles
            .values()
            .filter(|a| a.belongs_to(business_id))
            .cloned()
            .collect())
    }

    /// Delete an article; invoice items that referenced it keep their amounts.
    pub fn delete_article(&self, id: ArticleId) -> StoreResult<()> {
        let mut tables = self.write()?;
        if !tables.articles.contains_key(&id) {
            return Err(missing("article", id));
        }
        tables.delete_article_set_null(id, Utc::now());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Taxes
// ─────────────────────────────────────────────────────────────────────────────

impl InMemoryStore {
    pub fn insert_tax(&self, tax: Tax) -> StoreResult<Tax> {
        let mut tables = self.write()?;
        tables.check_tax_unique(&tax)?;
        tables.taxes.insert(tax.id(), tax.clone());
        Ok(tax)
    }

    pub fn update_tax(&self, tax: Tax) -> StoreResult<Tax> {
        let mut tables = self.write()?;
        if !tables.taxes.contains_key(&tax.id()) {
            return Err(missing("tax", tax.id()));
        }
        tables.check_tax_unique(&tax)?;
        tables.taxes.insert(tax.id(), tax.clone());
        Ok(tax)
    }

    pub fn tax(&self, id: TaxId) -> StoreResult<Option<Tax>> {
        Ok(self.read()?.taxes.get(&id).cloned())
    }

    /// Tax carrying `rate`; `None` looks up the exempted row.
    pub fn tax_by_rate(&self, rate: Option<Decimal>) -> StoreResult<Option<Tax>> {
        Ok(self.read()?.taxes.values().find(|t| t.has_rate(rate)).cloned())
    }

    pub fn taxes(&self) -> StoreResult<Vec<Tax>> {
        Ok(self.read()?.taxes.values().cloned().collect())
    }

    /// Rejected while any invoice item references the tax.
    pub fn delete_tax(&self, id: TaxId) -> StoreResult<()> {
        let mut tables = self.write()?;
        if !tables.taxes.contains_key(&id) {
            return Err(missing("tax", id));
        }
        if tables.items.values().any(|i| i.tax_id() == Some(id)) {
            return Err(StoreError::ReferentialViolation(
                "Cannot delete tax that is in use by invoice items".to_string(),
            ));
        }
        tables.taxes.remove(&id);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Invoice statuses
// ─────────────────────────────────────────────────────────────────────────────

impl InMemoryStore {
    pub fn insert_status(&self, status: InvoiceStatus) -> StoreResult<InvoiceStatus> {
        let mut tables = self.write()?;
        tables.check_status_unique(&status)?;
        tables.statuses.insert(status.id(), status.clone());
        Ok(status)
    }

    pub fn update_status(&self, status: InvoiceStatus) -> StoreResult<InvoiceStatus> {
        let mut tables = self.write()?;
        if !tables.statuses.contains_key(&status.id()) {
            return Err(missing("invoice status", status.id()));
        }
        tables.check_status_unique(&status)?;
        tables.statuses.insert(status.id(), status.clone());
        Ok(status)
    }

    pub fn status(&self, id: InvoiceStatusId) -> StoreResult<Option<InvoiceStatus>> {
        Ok(self.read()?.statuses.get(&id).cloned())
    }

    pub fn status_by_code(&self, code: &str) -> StoreResult<Option<InvoiceStatus>> {
        Ok(self.read()?.statuses.values().find(|s| s.code() == code).cloned())
    }

    pub fn statuses(&self) -> StoreResult<Vec<InvoiceStatus>> {
        Ok(self.read()?.statuses.values().cloned().collect())
    }

    /// Rejected while any invoice references the status.
    pub fn delete_status(&self, id: InvoiceStatusId) -> StoreResult<()> {
        let mut tables = self.write()?;
        if !tables.statuses.contains_key(&id) {
            return Err(missing("invoice status", id));
        }
        if tables.invoices.values().any(|i| i.status_id() == id) {
            return Err(StoreError::ReferentialViolation(
                "Cannot delete invoice status that is in use by invoices".to_string(),
            ));
        }
        tables.statuses.remove(&id);
        Ok(())
    }
}
