//! User management inside a tenant, plus invitations.

use std::collections::BTreeSet;

use invoicer_auth::user::normalize_email;
use invoicer_auth::{
    AccessRequest, Action, Actor, NewUser, ResourceKind, Role, Scope, User, UserPatch, generate_token,
    require_admin_tenant, validate_password,
};
use invoicer_core::{DomainError, DomainResult, Entity, TenantId, UserId};
use invoicer_infra::external::EmailMessage;
use invoicer_infra::{PartyStore, Sequence};

use super::{BackOffice, best_effort, check, now};

#[derive(Debug, Clone, Default)]
pub struct NewUserInput {
    pub email: String,
    pub password: String,
    pub roles: BTreeSet<Role>,
    /// Defaults to the caller's tenant.
    pub tenant_id: Option<TenantId>,
    pub email_verified: bool,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub password: Option<String>,
    pub roles: Option<BTreeSet<Role>>,
    pub is_active: Option<bool>,
    pub tenant_id: Option<TenantId>,
}

impl BackOffice {
    /// Users visible to the caller. Admin tenants see every tenant's users and
    /// may narrow the list to one tenant.
    pub async fn list_users(&self, actor: &Actor, tenant_filter: Option<TenantId>) -> DomainResult<Vec<User>> {
        if actor.tenant_is_admin {
            check(actor, AccessRequest::new(Action::Read, ResourceKind::User, Scope::AllTenants))?;
            if let Some(tenant_id) = tenant_filter {
                self.load_tenant(tenant_id).await?;
            }
            return Ok(self.store.users(tenant_filter).await?);
        }
        check(actor, AccessRequest::read(ResourceKind::User, actor.tenant_id))?;
        Ok(self.store.users(Some(actor.tenant_id)).await?)
    }

    pub async fn get_user(&self, actor: &Actor, id: UserId) -> DomainResult<User> {
        let user = self.load_user(id).await?;
        check(actor, AccessRequest::read(ResourceKind::User, user.tenant_id()))?;
        Ok(user)
    }

    #[tracing::instrument(skip(self, actor, input), fields(user_id = %actor.user_id))]
    pub async fn create_user(&self, actor: &Actor, input: NewUserInput) -> DomainResult<User> {
        let tenant_id = input.tenant_id.unwrap_or(actor.tenant_id);
        check(actor, AccessRequest::write(Action::Create, ResourceKind::User, tenant_id))?;
        self.load_tenant(tenant_id).await?;

        let email = normalize_email(&input.email)?;
        self.ensure_email_free(&email).await?;
        validate_password(&input.password, self.config.min_password_len)?;

        let at = now();
        let mut user = User::create(
            self.next_id(Sequence::User).await?,
            tenant_id,
            NewUser {
                email,
                password_hash: self.hasher.hash(&input.password)?,
                roles: input.roles,
                email_verified: input.email_verified,
            },
            at,
        )?;
        if !input.email_verified {
            user.issue_verification_token(generate_token(), at);
        }
        if let Some(is_active) = input.is_active {
            user.apply(
                UserPatch {
                    is_active: Some(is_active),
                    ..UserPatch::default()
                },
                at,
            )?;
        }

        let user = self.store.insert_user(user).await?;
        tracing::info!(created = %user.id(), tenant_id = %tenant_id, "user created");
        Ok(user)
    }

    /// Create an unverified user in the caller's tenant and email them a link
    /// to choose a password.
    #[tracing::instrument(skip(self, actor, roles), fields(user_id = %actor.user_id))]
    pub async fn invite_user(&self, actor: &Actor, email: &str, roles: BTreeSet<Role>) -> DomainResult<User> {
        check(actor, AccessRequest::write(Action::Create, ResourceKind::User, actor.tenant_id))?;
        let email = normalize_email(email)?;
        self.ensure_email_free(&email).await?;

        // Nobody knows this password; the invitee replaces it on acceptance.
        let placeholder = self.hasher.hash(&generate_token())?;
        let at = now();
        let mut user = User::create(
            self.next_id(Sequence::User).await?,
            actor.tenant_id,
            NewUser {
                email,
                password_hash: placeholder,
                roles,
                email_verified: false,
            },
            at,
        )?;
        user.issue_verification_token(generate_token(), at);
        let user = self.store.insert_user(user).await?;

        if let Some(token) = user.email_verification_token() {
            let message = EmailMessage::invitation(user.email(), &self.config.invitation_link(token));
            best_effort("invitation email", self.email.send(message)).await;
        }
        tracing::info!(invited = %user.id(), "user invited");
        Ok(user)
    }

    /// Set the invitee's password and mark the email verified.
    #[tracing::instrument(skip_all)]
    pub async fn accept_invitation(&self, token: &str, password: &str) -> DomainResult<User> {
        let mut user = self
            .store
            .user_by_verification_token(token.trim())
            .await?
            .ok_or_else(|| DomainError::validation("token", "Invitation token is invalid or has expired"))?;
        validate_password(password, self.config.min_password_len)?;
        user.accept_invitation(self.hasher.hash(password)?, now());
        let user = self.store.update_user(user).await?;
        tracing::info!(user_id = %user.id(), "invitation accepted");
        Ok(user)
    }

    #[tracing::instrument(skip(self, actor, update), fields(user_id = %actor.user_id))]
    pub async fn update_user(&self, actor: &Actor, id: UserId, update: UserUpdate) -> DomainResult<User> {
        let mut user = self.load_user(id).await?;
        check(actor, AccessRequest::write(Action::Update, ResourceKind::User, user.tenant_id()))?;

        if let Some(tenant_id) = update.tenant_id.filter(|t| *t != user.tenant_id()) {
            require_admin_tenant(actor, "change user tenant")?;
            self.load_tenant(tenant_id).await?;
        }
        let email = match update.email {
            Some(raw) => {
                let email = normalize_email(&raw)?;
                if email != user.email() {
                    self.ensure_email_free(&email).await?;
                }
                Some(email)
            }
            None => None,
        };
        let password_hash = match update.password {
            Some(password) => {
                validate_password(&password, self.config.min_password_len)?;
                Some(self.hasher.hash(&password)?)
            }
            None => None,
        };
        let deactivating = update.is_active == Some(false) && user.is_active();

        user.apply(
            UserPatch {
                email,
                password_hash,
                roles: update.roles,
                is_active: update.is_active,
                tenant_id: update.tenant_id,
            },
            now(),
        )?;
        let user = self.store.update_user(user).await?;

        if deactivating {
            let closed = self.sessions.revoke_user(user.id())?;
            tracing::info!(updated = %user.id(), sessions = closed, "user deactivated");
        } else {
            tracing::info!(updated = %user.id(), "user updated");
        }
        Ok(user)
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete_user(&self, actor: &Actor, id: UserId) -> DomainResult<()> {
        if id == actor.user_id {
            return Err(DomainError::validation("id", "You cannot delete your own account"));
        }
        let user = self.load_user(id).await?;
        check(actor, AccessRequest::write(Action::Delete, ResourceKind::User, user.tenant_id()))?;
        self.store.delete_user(id).await?;
        self.sessions.revoke_user(id)?;
        tracing::info!(deleted = %id, "user deleted");
        Ok(())
    }

    async fn load_user(&self, id: UserId) -> DomainResult<User> {
        self.store
            .user(id)
            .await?
            .ok_or_else(|| DomainError::not_found("User not found"))
    }

    pub(super) async fn ensure_email_free(&self, email: &str) -> DomainResult<()> {
        if self.store.user_by_email(email).await?.is_some() {
            return Err(DomainError::conflict("A user with this email already exists"));
        }
        Ok(())
    }
}
