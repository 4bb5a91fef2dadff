//! Tenant administration.

use std::collections::BTreeSet;

use invoicer_auth::user::normalize_email;
use invoicer_auth::{
    AccessRequest, Action, Actor, NewUser, ResourceKind, Role, Scope, User, require_admin_tenant, validate_password,
};
use invoicer_core::{DomainError, DomainResult, Entity, TenantId};
use invoicer_infra::{PartyStore, Sequence};
use invoicer_parties::{NewTenant, Tenant, TenantPatch};

use super::{BackOffice, check, now};

impl BackOffice {
    pub async fn list_tenants(&self, actor: &Actor) -> DomainResult<Vec<Tenant>> {
        if actor.tenant_is_admin {
            check(actor, AccessRequest::new(Action::Read, ResourceKind::Tenant, Scope::AllTenants))?;
            return Ok(self.store.tenants().await?);
        }
        check(actor, AccessRequest::read(ResourceKind::Tenant, actor.tenant_id))?;
        Ok(vec![self.load_tenant(actor.tenant_id).await?])
    }

    pub async fn get_tenant(&self, actor: &Actor, id: TenantId) -> DomainResult<Tenant> {
        let tenant = self.load_tenant(id).await?;
        check(actor, AccessRequest::read(ResourceKind::Tenant, id))?;
        Ok(tenant)
    }

    #[tracing::instrument(skip(self, actor, new), fields(user_id = %actor.user_id))]
    pub async fn create_tenant(&self, actor: &Actor, new: NewTenant) -> DomainResult<Tenant> {
        check(actor, AccessRequest::global(Action::Create, ResourceKind::Tenant))?;
        let tenant = Tenant::create(self.next_id(Sequence::Tenant).await?, new, now())?;
        let tenant = self.store.insert_tenant(tenant).await?;
        tracing::info!(tenant_id = %tenant.id(), is_admin = tenant.is_admin(), "tenant created");
        Ok(tenant)
    }

    /// Settings only; the stored issuer business is never touched here.
    #[tracing::instrument(skip(self, actor, patch), fields(user_id = %actor.user_id))]
    pub async fn update_tenant(&self, actor: &Actor, id: TenantId, patch: TenantPatch) -> DomainResult<Tenant> {
        let mut tenant = self.load_tenant(id).await?;
        check(actor, AccessRequest::write(Action::Update, ResourceKind::Tenant, id))?;
        if patch.is_admin.is_some_and(|flag| flag != tenant.is_admin()) {
            require_admin_tenant(actor, "change admin status")?;
        }
        tenant.apply(patch, now())?;
        let tenant = self.store.update_tenant(tenant).await?;
        tracing::info!(tenant_id = %id, "tenant updated");
        Ok(tenant)
    }

    /// Delete a tenant with its users, businesses and everything they own.
    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete_tenant(&self, actor: &Actor, id: TenantId) -> DomainResult<()> {
        self.load_tenant(id).await?;
        check(actor, AccessRequest::write(Action::Delete, ResourceKind::Tenant, id))?;
        if id == actor.tenant_id {
            return Err(DomainError::validation("id", "You cannot delete your own tenant"));
        }
        for user in self.store.users(Some(id)).await? {
            self.sessions.revoke_user(user.id())?;
        }
        self.store.delete_tenant(id).await?;
        Ok(())
    }

    /// Create an admin tenant with a verified `ROLE_ADMIN` user and an issuer
    /// business. A no-op returning the existing user when the email is taken.
    #[tracing::instrument(skip(self, password))]
    pub async fn provision_platform_admin(&self, email: &str, password: &str) -> DomainResult<User> {
        let email = normalize_email(email)?;
        if let Some(existing) = self.store.user_by_email(&email).await? {
            tracing::info!(user_id = %existing.id(), "platform admin already present");
            return Ok(existing);
        }
        validate_password(password, self.config.min_password_len)?;

        let at = now();
        let tenant = Tenant::create(
            self.next_id(Sequence::Tenant).await?,
            NewTenant {
                name: "Platform".to_string(),
                has_paid: true,
                is_admin: true,
            },
            at,
        )?;
        let tenant = self.store.insert_tenant(tenant).await?;
        let user = User::create(
            self.next_id(Sequence::User).await?,
            tenant.id(),
            NewUser {
                email,
                password_hash: self.hasher.hash(password)?,
                roles: BTreeSet::from([Role::User, Role::Admin]),
                email_verified: true,
            },
            at,
        )?;
        let user = self.store.insert_user(user).await?;
        self.bootstrap_issuer(&tenant, user.id(), at).await?;
        tracing::info!(user_id = %user.id(), tenant_id = %user.tenant_id(), "platform admin provisioned");
        Ok(user)
    }
}
