use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use tracing::instrument;

use invoicer_auth::{Role, User, UserRecord};
use invoicer_core::{BankAccountId, BusinessId, Entity, TenantId, UserId};
use invoicer_parties::{
    BankAccount, BankAccountRecord, Business, BusinessDraft, BusinessRecord, Tenant, TenantRecord,
};

use super::{PostgresStore, corrupt, decode_all, decode_one, map_sqlx_error, missing};
use crate::store::{PartyStore, StoreError, StoreResult};

const ISSUER_IN_USE: &str = "Cannot delete issuer business. This business is used for invoice creation.";

fn tenant_from_row(row: &PgRow) -> Result<Tenant, sqlx::Error> {
    Ok(Tenant::restore(TenantRecord {
        id: TenantId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        has_paid: row.try_get("has_paid")?,
        is_admin: row.try_get("is_admin")?,
        issuer_business_id: row.try_get::<Option<i64>, _>("issuer_business_id")?.map(BusinessId::new),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    let roles = row
        .try_get::<Vec<String>, _>("roles")?
        .iter()
        .map(|r| Role::from_str(r))
        .collect::<Result<BTreeSet<Role>, _>>()
        .map_err(corrupt)?;
    Ok(User::restore(UserRecord {
        id: UserId::new(row.try_get("id")?),
        tenant_id: TenantId::new(row.try_get("tenant_id")?),
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        roles,
        email_verified: row.try_get("email_verified")?,
        email_verification_token: row.try_get("email_verification_token")?,
        remember_me_token: row.try_get("remember_me_token")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

fn business_from_row(row: &PgRow) -> Result<Business, sqlx::Error> {
    let Json(profile) = row.try_get::<Json<BusinessDraft>, _>("profile")?;
    Ok(Business::restore(BusinessRecord {
        id: BusinessId::new(row.try_get("id")?),
        tenant_id: TenantId::new(row.try_get("tenant_id")?),
        created_by: UserId::new(row.try_get("created_by")?),
        profile,
        logo: row.try_get("logo")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

fn bank_account_from_row(row: &PgRow) -> Result<BankAccount, sqlx::Error> {
    Ok(BankAccount::restore(BankAccountRecord {
        id: BankAccountId::new(row.try_get("id")?),
        business_id: BusinessId::new(row.try_get("business_id")?),
        bank_account_number: row.try_get("bank_account_number")?,
        swift: row.try_get("swift")?,
        iban: row.try_get("iban")?,
        bank_name: row.try_get("bank_name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

fn role_names(user: &User) -> Vec<String> {
    user.roles().iter().map(|r| r.as_str().to_string()).collect()
}

#[async_trait]
impl PartyStore for PostgresStore {
    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id()), err)]
    async fn insert_tenant(&self, tenant: Tenant) -> StoreResult<Tenant> {
        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, has_paid, is_admin, issuer_business_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(tenant.id().get())
        .bind(tenant.name())
        .bind(tenant.has_paid())
        .bind(tenant.is_admin())
        .bind(tenant.issuer_business_id().map(BusinessId::get))
        .bind(tenant.created_at())
        .bind(tenant.updated_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_tenant", e))?;
        Ok(tenant)
    }

    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id()), err)]
    async fn update_tenant(&self, tenant: Tenant) -> StoreResult<Tenant> {
        let row = sqlx::query(
            r#"
            UPDATE tenants
            SET name = $2, has_paid = $3, is_admin = $4, updated_at = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(tenant.id().get())
        .bind(tenant.name())
        .bind(tenant.has_paid())
        .bind(tenant.is_admin())
        .bind(tenant.updated_at())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_tenant", e))?;
        decode_one("update_tenant", row, tenant_from_row)?.ok_or_else(|| missing("tenant", tenant.id()))
    }

    #[instrument(skip(self), err)]
    async fn assign_issuer_if_unset(
        &self,
        tenant_id: TenantId,
        business_id: BusinessId,
        at: DateTime<Utc>,
    ) -> StoreResult<Tenant> {
        sqlx::query(
            r#"
            UPDATE tenants
            SET issuer_business_id = $2, updated_at = $3
            WHERE id = $1
              AND issuer_business_id IS NULL
              AND EXISTS (SELECT 1 FROM businesses WHERE id = $2 AND tenant_id = $1)
            "#,
        )
        .bind(tenant_id.get())
        .bind(business_id.get())
        .bind(at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("assign_issuer_if_unset", e))?;

        let tenant = self.tenant(tenant_id).await?.ok_or_else(|| missing("tenant", tenant_id))?;
        if tenant.issuer_business_id().is_none() {
            return Err(StoreError::ReferentialViolation(format!(
                "business {business_id} does not belong to tenant {tenant_id}"
            )));
        }
        Ok(tenant)
    }

    async fn tenant(&self, id: TenantId) -> StoreResult<Option<Tenant>> {
        let row = sqlx::query("SELECT * FROM tenants WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("tenant", e))?;
        decode_one("tenant", row, tenant_from_row)
    }

    async fn tenants(&self) -> StoreResult<Vec<Tenant>> {
        let rows = sqlx::query("SELECT * FROM tenants ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("tenants", e))?;
        decode_all("tenants", rows, tenant_from_row)
    }

    async fn tenant_by_issuer(&self, business_id: BusinessId) -> StoreResult<Option<Tenant>> {
        let row = sqlx::query("SELECT * FROM tenants WHERE issuer_business_id = $1")
            .bind(business_id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("tenant_by_issuer", e))?;
        decode_one("tenant_by_issuer", row, tenant_from_row)
    }

    #[instrument(skip(self), err)]
    async fn delete_tenant(&self, id: TenantId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_tenant", e))?;
        if result.rows_affected() == 0 {
            return Err(missing("tenant", id));
        }
        tracing::info!(tenant_id = %id, "tenant deleted with dependents");
        Ok(())
    }

    #[instrument(skip(self, user), fields(user_id = %user.id()), err)]
    async fn insert_user(&self, user: User) -> StoreResult<User> {
        sqlx::query(
            r#"
            INSERT INTO users (id, tenant_id, email, password_hash, roles, email_verified,
                               email_verification_token, remember_me_token, is_active,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.id().get())
        .bind(user.tenant_id().get())
        .bind(user.email())
        .bind(user.password_hash())
        .bind(role_names(&user))
        .bind(user.email_verified())
        .bind(user.email_verification_token())
        .bind(user.remember_me_token())
        .bind(user.is_active())
        .bind(user.created_at())
        .bind(user.updated_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(user)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id()), err)]
    async fn update_user(&self, user: User) -> StoreResult<User> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, password_hash = $3, roles = $4, email_verified = $5,
                email_verification_token = $6, remember_me_token = $7, is_active = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(user.id().get())
        .bind(user.email())
        .bind(user.password_hash())
        .bind(role_names(&user))
        .bind(user.email_verified())
        .bind(user.email_verification_token())
        .bind(user.remember_me_token())
        .bind(user.is_active())
        .bind(user.updated_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_user", e))?;
        if result.rows_affected() == 0 {
            return Err(missing("user", user.id()));
        }
        Ok(user)
    }

    async fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user", e))?;
        decode_one("user", row, user_from_row)
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_by_email", e))?;
        decode_one("user_by_email", row, user_from_row)
    }

    async fn user_by_verification_token(&self, token: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email_verification_token = $1")
            .bind(token)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_by_verification_token", e))?;
        decode_one("user_by_verification_token", row, user_from_row)
    }

    async fn user_by_remember_me_token(&self, token: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE remember_me_token = $1")
            .bind(token)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_by_remember_me_token", e))?;
        decode_one("user_by_remember_me_token", row, user_from_row)
    }

    async fn users(&self, tenant_id: Option<TenantId>) -> StoreResult<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users WHERE $1::BIGINT IS NULL OR tenant_id = $1 ORDER BY id")
            .bind(tenant_id.map(TenantId::get))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("users", e))?;
        decode_all("users", rows, user_from_row)
    }

    #[instrument(skip(self), err)]
    async fn delete_user(&self, id: UserId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?;
        if result.rows_affected() == 0 {
            return Err(missing("user", id));
        }
        Ok(())
    }

    #[instrument(skip(self, business), fields(business_id = %business.id()), err)]
    async fn insert_business(&self, business: Business) -> StoreResult<Business> {
        sqlx::query(
            r#"
            INSERT INTO businesses (id, tenant_id, created_by, profile, logo, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(business.id().get())
        .bind(business.tenant_id().get())
        .bind(business.created_by().get())
        .bind(Json(business.profile()))
        .bind(business.logo())
        .bind(business.created_at())
        .bind(business.updated_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_business", e))?;
        Ok(business)
    }

    #[instrument(skip(self, business), fields(business_id = %business.id()), err)]
    async fn update_business(&self, business: Business) -> StoreResult<Business> {
        let result = sqlx::query("UPDATE businesses SET profile = $2, logo = $3, updated_at = $4 WHERE id = $1")
            .bind(business.id().get())
            .bind(Json(business.profile()))
            .bind(business.logo())
            .bind(business.updated_at())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_business", e))?;
        if result.rows_affected() == 0 {
            return Err(missing("business", business.id()));
        }
        Ok(business)
    }

    async fn business(&self, id: BusinessId) -> StoreResult<Option<Business>> {
        let row = sqlx::query("SELECT * FROM businesses WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("business", e))?;
        decode_one("business", row, business_from_row)
    }

    async fn businesses(&self, tenant_id: Option<TenantId>) -> StoreResult<Vec<Business>> {
        let rows = sqlx::query("SELECT * FROM businesses WHERE $1::BIGINT IS NULL OR tenant_id = $1 ORDER BY id")
            .bind(tenant_id.map(TenantId::get))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("businesses", e))?;
        decode_all("businesses", rows, business_from_row)
    }

    #[instrument(skip(self), err)]
    async fn delete_business(&self, id: BusinessId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let is_issuer: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tenants WHERE issuer_business_id = $1)")
                .bind(id.get())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_business", e))?;
        if is_issuer {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::ReferentialViolation(ISSUER_IN_USE.to_string()));
        }

        sqlx::query(
            "UPDATE invoice_items SET article_id = NULL, updated_at = now() \
             WHERE article_id IN (SELECT id FROM articles WHERE business_id = $1)",
        )
        .bind(id.get())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_business", e))?;

        let result = sqlx::query("DELETE FROM businesses WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_business", e))?;
        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(missing("business", id));
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self, account), fields(bank_account_id = %account.id()), err)]
    async fn insert_bank_account(&self, account: BankAccount) -> StoreResult<BankAccount> {
        sqlx::query(
            r#"
            INSERT INTO bank_accounts (id, business_id, bank_account_number, swift, iban, bank_name,
                                       created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(account.id().get())
        .bind(account.business_id().get())
        .bind(account.bank_account_number())
        .bind(account.swift())
        .bind(account.iban())
        .bind(account.bank_name())
        .bind(account.created_at())
        .bind(account.updated_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_bank_account", e))?;
        Ok(account)
    }

    #[instrument(skip(self, account), fields(bank_account_id = %account.id()), err)]
    async fn update_bank_account(&self, account: BankAccount) -> StoreResult<BankAccount> {
        let result = sqlx::query(
            r#"
            UPDATE bank_accounts
            SET bank_account_number = $2, swift = $3, iban = $4, bank_name = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(account.id().get())
        .bind(account.bank_account_number())
        .bind(account.swift())
        .bind(account.iban())
        .bind(account.bank_name())
        .bind(account.updated_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_bank_account", e))?;
        if result.rows_affected() == 0 {
            return Err(missing("bank account", account.id()));
        }
        Ok(account)
    }

    async fn bank_account(&self, id: BankAccountId) -> StoreResult<Option<BankAccount>> {
        let row = sqlx::query("SELECT * FROM bank_accounts WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("bank_account", e))?;
        decode_one("bank_account", row, bank_account_from_row)
    }

    async fn bank_accounts(&self, business_id: BusinessId) -> StoreResult<Vec<BankAccount>> {
        let rows = sqlx::query("SELECT * FROM bank_accounts WHERE business_id = $1 ORDER BY id")
            .bind(business_id.get())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("bank_accounts", e))?;
        decode_all("bank_accounts", rows, bank_account_from_row)
    }

    #[instrument(skip(self), err)]
    async fn delete_bank_account(&self, id: BankAccountId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM bank_accounts WHERE id = $1")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_bank_account", e))?;
        if result.rows_affected() == 0 {
            return Err(missing("bank account", id));
        }
        Ok(())
    }
}
