use chrono::{DateTime, Utc};

use invoicer_auth::User;
use invoicer_core::{BankAccountId, BusinessId, Entity, TenantId, UserId};
use invoicer_parties::{BankAccount, Business, Tenant, TenantRecord};

use super::{InMemoryStore, StoreError, StoreResult, Tables, missing};

impl Tables {
    fn check_tenant_unique(&self, tenant: &Tenant) -> StoreResult<()> {
        let Some(issuer) = tenant.issuer_business_id() else {
            return Ok(());
        };
        if !self.businesses.contains_key(&issuer) {
            return Err(StoreError::ReferentialViolation(format!(
                "issuer business {issuer} does not exist"
            )));
        }
        let taken = self
            .tenants
            .values()
            .any(|t| t.id() != tenant.id() && t.issuer_business_id() == Some(issuer));
        if taken {
            return Err(StoreError::UniqueViolation(format!(
                "Business {issuer} is already another tenant's issuer business"
            )));
        }
        Ok(())
    }

    fn check_user_unique(&self, user: &User) -> StoreResult<()> {
        if !self.tenants.contains_key(&user.tenant_id()) {
            return Err(StoreError::ReferentialViolation(format!(
                "tenant {} does not exist",
                user.tenant_id()
            )));
        }
        let taken = self
            .users
            .values()
            .any(|u| u.id() != user.id() && u.email() == user.email());
        if taken {
            return Err(StoreError::UniqueViolation(
                "A user with this email already exists".to_string(),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tenants
// ─────────────────────────────────────────────────────────────────────────────

impl InMemoryStore {
    pub fn insert_tenant(&self, tenant: Tenant) -> StoreResult<Tenant> {
        let mut tables = self.write()?;
        tables.check_tenant_unique(&tenant)?;
        tables.tenants.insert(tenant.id(), tenant.clone());
        Ok(tenant)
    }

    /// Write the tenant's settings. The stored issuer business is kept, so a
    /// caller holding a stale copy can neither clear nor move it.
    pub fn update_tenant(&self, tenant: Tenant) -> StoreResult<Tenant> {
        let mut tables = self.write()?;
        let stored = tables
            .tenants
            .get(&tenant.id())
            .ok_or_else(|| missing("tenant", tenant.id()))?;
        let updated = Tenant::restore(TenantRecord {
            issuer_business_id: stored.issuer_business_id(),
            created_at: stored.created_at(),
            ..tenant.to_record()
        });
        tables.tenants.insert(updated.id(), updated.clone());
        Ok(updated)
    }

    /// Make `business_id` the issuer of `tenant_id` unless the tenant already
    /// has one. The business must belong to the tenant.
    pub fn assign_issuer_if_unset(
        &self,
        tenant_id: TenantId,
        business_id: BusinessId,
        at: DateTime<Utc>,
    ) -> StoreResult<Tenant> {
        let mut tables = self.write()?;
        let mut tenant = tables
            .tenants
            .get(&tenant_id)
            .cloned()
            .ok_or_else(|| missing("tenant", tenant_id))?;
        if tenant.issuer_business_id().is_some() {
            return Ok(tenant);
        }
        match tables.businesses.get(&business_id) {
            Some(b) if b.tenant_id() == tenant_id => {}
            Some(_) => {
                return Err(StoreError::ReferentialViolation(format!(
                    "business {business_id} belongs to another tenant"
                )));
            }
            None => {
                return Err(StoreError::ReferentialViolation(format!(
                    "issuer business {business_id} does not exist"
                )));
            }
        }
        tenant
            .assign_issuer(business_id, at)
            .map_err(|e| StoreError::UniqueViolation(e.to_string()))?;
        tables.check_tenant_unique(&tenant)?;
        tables.tenants.insert(tenant_id, tenant.clone());
        Ok(tenant)
    }

    pub fn tenant(&self, id: TenantId) -> StoreResult<Option<Tenant>> {
        Ok(self.read()?.tenants.get(&id).cloned())
    }

    pub fn tenants(&self) -> StoreResult<Vec<Tenant>> {
        Ok(self.read()?.tenants.values().cloned().collect())
    }

    /// Tenant whose issuer business is `business_id`, if any.
    pub fn tenant_by_issuer(&self, business_id: BusinessId) -> StoreResult<Option<Tenant>> {
        Ok(self
            .read()?
            .tenants
            .values()
            .find(|t| t.is_issuer(business_id))
            .cloned())
    }

    /// Delete a tenant with its users and businesses (and everything the
    /// businesses own).
    pub fn delete_tenant(&self, id: TenantId) -> StoreResult<()> {
        let mut tables = self.write()?;
        if tables.tenants.remove(&id).is_none() {
            return Err(missing("tenant", id));
        }
        tables.users.retain(|_, u| u.tenant_id() != id);
        let businesses: Vec<BusinessId> = tables
            .businesses
            .values()
            .filter(|b| b.tenant_id() == id)
            .map(|b| b.id())
            .collect();
        for business_id in businesses {
            tables.delete_business_cascade(business_id);
        }
        tracing::info!(tenant_id = %id, "tenant deleted with dependents");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

impl InMemoryStore {
    pub fn insert_user(&self, user: User) -> StoreResult<User> {
        let mut tables = self.write()?;
        tables.check_user_unique(&user)?;
        tables.users.insert(user.id(), user.clone());
        Ok(user)
    }

    pub fn update_user(&self, user: User) -> StoreResult<User> {
        let mut tables = self.write()?;
        if !tables.users.contains_key(&user.id()) {
            return Err(missing("user", user.id()));
        }
        tables.check_user_unique(&user)?;
        tables.users.insert(user.id(), user.clone());
        Ok(user)
    }

    pub fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    pub fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.values().find(|u| u.email() == email).cloned())
    }

    pub fn user_by_verification_token(&self, token: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.email_verification_token() == Some(token))
            .cloned())
    }

    pub fn user_by_remember_me_token(&self, token: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.remember_me_token() == Some(token))
            .cloned())
    }

    /// Users of one tenant, or of every tenant when `tenant_id` is `None`.
    pub fn users(&self, tenant_id: Option<TenantId>) -> StoreResult<Vec<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .filter(|u| tenant_id.is_none_or(|t| u.tenant_id() == t))
            .cloned()
            .collect())
    }

    pub fn delete_user(&self, id: UserId) -> StoreResult<()> {
        self.write()?
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| missing("user", id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Businesses
// ─────────────────────────────────────────────────────────────────────────────

impl InMemoryStore {
    pub fn insert_business(&self, business: Business) -> StoreResult<Business> {
        let mut tables = self.write()?;
        if !tables.tenants.contains_key(&business.tenant_id()) {
            return Err(StoreError::ReferentialViolation(format!(
                "tenant {} does not exist",
                business.tenant_id()
            )));
        }
        tables.businesses.insert(business.id(), business.clone());
        Ok(business)
    }

    pub fn update_business(&self, business: Business) -> StoreResult<Business> {
        let mut tables = self.write()?;
        match tables.businesses.get_mut(&business.id()) {
            Some(row) => {
                *row = business.clone();
                Ok(business)
            }
            None => Err(missing("business", business.id())),
        }
    }

    pub fn business(&self, id: BusinessId) -> StoreResult<Option<Business>> {
        Ok(self.read()?.businesses.get(&id).cloned())
    }

    /// Businesses of one tenant, or of every tenant when `tenant_id` is `None`.
    pub fn businesses(&self, tenant_id: Option<TenantId>) -> StoreResult<Vec<Business>> {
        Ok(self
            .read()?
            .businesses
            .values()
            .filter(|b| tenant_id.is_none_or(|t| b.tenant_id() == t))
            .cloned()
            .collect())
    }

    /// Delete a business. Rejected while it is any tenant's issuer business;
    /// otherwise cascades to its articles, bank accounts and invoices.
    pub fn delete_business(&self, id: BusinessId) -> StoreResult<()> {
        let mut tables = self.write()?;
        if !tables.businesses.contains_key(&id) {
            return Err(missing("business", id));
        }
        if tables.tenants.values().any(|t| t.is_issuer(id)) {
            return Err(StoreError::ReferentialViolation(
                "Cannot delete issuer business. This business is used for invoice creation.".to_string(),
            ));
        }
        tables.delete_business_cascade(id);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bank accounts
// ─────────────────────────────────────────────────────────────────────────────

impl InMemoryStore {
    pub fn insert_bank_account(&self, account: BankAccount) -> StoreResult<BankAccount> {
        let mut tables = self.write()?;
        if !tables.businesses.contains_key(&account.business_id()) {
            return Err(StoreError::ReferentialViolation(format!(
                "business {} does not exist",
                account.business_id()
            )));
        }
        tables.bank_accounts.insert(account.id(), account.clone());
        Ok(account)
    }

    pub fn update_bank_account(&self, account: BankAccount) -> StoreResult<BankAccount> {
        let mut tables = self.write()?;
        match tables.bank_accounts.get_mut(&account.id()) {
            Some(row) => {
                *row = account.clone();
                Ok(account)
            }
            None => Err(missing("bank account", account.id())),
        }
    }

    pub fn bank_account(&self, id: BankAccountId) -> StoreResult<Option<BankAccount>> {
        Ok(self.read()?.bank_accounts.get(&id).cloned())
    }

    pub fn bank_accounts(&self, business_id: BusinessId) -> StoreResult<Vec<BankAccount>> {
        Ok(self
            .read()?
            .bank_accounts
            .values()
            .filter(|a| a.business_id() == business_id)
            .cloned()
            .collect())
    }

    pub fn delete_bank_account(&self, id: BankAccountId) -> StoreResult<()> {
        self.write()?
            .bank_accounts
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| missing("bank account", id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use invoicer_auth::NewUser;
    use invoicer_parties::{BusinessDraft, NewTenant, TenantPatch};
    use std::collections::BTreeSet;

    use super::*;

    fn tenant_with_issuer(store: &InMemoryStore) -> (Tenant, Business) {
        let now = Utc::now();
        let tenant = store
            .insert_tenant(Tenant::create(store.next_tenant_id(), NewTenant::regular("Acme"), now).unwrap())
            .unwrap();
        let business = store
            .insert_business(
                Business::create(
                    store.next_business_id(),
                    tenant.id(),
                    UserId::new(1),
                    BusinessDraft::named("Acme LLC"),
                    now,
                )
                .unwrap(),
            )
            .unwrap();
        let tenant = store.assign_issuer_if_unset(tenant.id(), business.id(), now).unwrap();
        (tenant, business)
    }

    fn user(store: &InMemoryStore, tenant_id: TenantId, email: &str) -> User {
        User::create(
            store.next_user_id(),
            tenant_id,
            NewUser {
                email: email.to_string(),
                password_hash: "hash".to_string(),
                roles: BTreeSet::new(),
                email_verified: true,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn duplicate_email_is_a_unique_violation() {
        let store = InMemoryStore::new();
        let (tenant, _) = tenant_with_issuer(&store);
        store.insert_user(user(&store, tenant.id(), "a@example.com")).unwrap();
        let err = store.insert_user(user(&store, tenant.id(), "A@example.com")).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[test]
    fn issuer_business_cannot_be_deleted() {
        let store = InMemoryStore::new();
        let (_, business) = tenant_with_issuer(&store);
        let err = store.delete_business(business.id()).unwrap_err();
        assert!(matches!(err, StoreError::ReferentialViolation(_)));
        assert!(store.business(business.id()).unwrap().is_some());
    }

    #[test]
    fn another_tenants_business_cannot_become_issuer() {
        let store = InMemoryStore::new();
        let (_, business) = tenant_with_issuer(&store);
        let other = store
            .insert_tenant(Tenant::create(store.next_tenant_id(), NewTenant::regular("Other"), Utc::now()).unwrap())
            .unwrap();
        assert!(matches!(
            store.assign_issuer_if_unset(other.id(), business.id(), Utc::now()),
            Err(StoreError::ReferentialViolation(_))
        ));
        assert_eq!(store.tenant(other.id()).unwrap().unwrap().issuer_business_id(), None);
    }

    #[test]
    fn issuer_is_assigned_once() {
        let store = InMemoryStore::new();
        let (tenant, first) = tenant_with_issuer(&store);
        let second = store
            .insert_business(
                Business::create(
                    store.next_business_id(),
                    tenant.id(),
                    UserId::new(1),
                    BusinessDraft::named("Second"),
                    Utc::now(),
                )
                .unwrap(),
            )
            .unwrap();

        let after = store.assign_issuer_if_unset(tenant.id(), second.id(), Utc::now()).unwrap();
        assert_eq!(after.issuer_business_id(), Some(first.id()));
    }

    #[test]
    fn stale_tenant_update_keeps_the_stored_issuer() {
        let store = InMemoryStore::new();
        let stale = store
            .insert_tenant(Tenant::create(store.next_tenant_id(), NewTenant::regular("Acme"), Utc::now()).unwrap())
            .unwrap();
        let business = store
            .insert_business(
                Business::create(
                    store.next_business_id(),
                    stale.id(),
                    UserId::new(1),
                    BusinessDraft::named("Acme LLC"),
                    Utc::now(),
                )
                .unwrap(),
            )
            .unwrap();
        store.assign_issuer_if_unset(stale.id(), business.id(), Utc::now()).unwrap();

        // `stale` was read before the issuer existed.
        let mut renamed = stale;
        renamed
            .apply(
                TenantPatch {
                    name: Some("Acme Group".to_string()),
                    ..TenantPatch::default()
                },
                Utc::now(),
            )
            .unwrap();
        let saved = store.update_tenant(renamed).unwrap();
        assert_eq!(saved.name(), "Acme Group");
        assert_eq!(saved.issuer_business_id(), Some(business.id()));
        assert_eq!(store.tenant(saved.id()).unwrap().unwrap().issuer_business_id(), Some(business.id()));
    }

    #[test]
    fn deleting_a_tenant_removes_its_users_and_businesses() {
        let store = InMemoryStore::new();
        let (tenant, business) = tenant_with_issuer(&store);
        store.insert_user(user(&store, tenant.id(), "a@example.com")).unwrap();

        store.delete_tenant(tenant.id()).unwrap();
        assert!(store.users(None).unwrap().is_empty());
        assert!(store.business(business.id()).unwrap().is_none());
    }
}
