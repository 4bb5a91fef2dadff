//! Registration, email verification, login and sessions.

use std::collections::BTreeSet;

use serde::Serialize;

use invoicer_auth::user::normalize_email;
use invoicer_auth::{Actor, NewUser, Role, User, generate_token, validate_password};
use invoicer_core::{DomainError, DomainResult, Entity, TenantId, UserId};
use invoicer_infra::{PartyStore, Sequence};
use invoicer_infra::external::EmailMessage;
use invoicer_parties::{Business, BusinessDraft, NewTenant, Tenant};

use super::{BackOffice, best_effort, now};

/// The caller as shown to clients: user, tenant and the tenant's issuer.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: User,
    pub tenant: Tenant,
    pub issuer_business: Option<Business>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub remember_me_token: Option<String>,
    pub profile: Profile,
}

fn invalid_credentials() -> DomainError {
    DomainError::access_denied("Invalid credentials")
}

impl BackOffice {
    /// Register a user. Without `tenant_id` a new regular tenant is created
    /// together with a first business that becomes its issuer.
    #[tracing::instrument(skip(self, password), fields(user_id))]
    pub async fn register(&self, email: &str, password: &str, tenant_id: Option<TenantId>) -> DomainResult<User> {
        let email = normalize_email(email)?;
        validate_password(password, self.config.min_password_len)?;
        self.ensure_email_free(&email).await?;

        let at = now();
        let (tenant, is_new_tenant) = match tenant_id {
            Some(id) => {
                let tenant = self
                    .store
                    .tenant(id)
                    .await?
                    .ok_or_else(|| DomainError::validation("tenant_id", "Tenant not found"))?;
                (tenant, false)
            }
            None => {
                let tenant = Tenant::create(
                    self.next_id(Sequence::Tenant).await?,
                    NewTenant::regular(format!("Tenant for {email}")),
                    at,
                )?;
                (tenant, true)
            }
        };

        let mut user = User::create(
            self.next_id(Sequence::User).await?,
            tenant.id(),
            NewUser {
                email,
                password_hash: self.hasher.hash(password)?,
                roles: BTreeSet::from([Role::User]),
                email_verified: false,
            },
            at,
        )?;
        user.issue_verification_token(generate_token(), at);

        // Staged: tenant and user first, then the business that references
        // both, then the issuer link back from the tenant.
        if is_new_tenant {
            self.store.insert_tenant(tenant.clone()).await?;
        }
        let user = self.store.insert_user(user).await?;
        tracing::Span::current().record("user_id", tracing::field::display(user.id()));

        if is_new_tenant {
            self.bootstrap_issuer(&tenant, user.id(), at).await?;
        }

        if let Some(token) = user.email_verification_token() {
            let message = EmailMessage::verification(user.email(), &self.config.verification_link(token));
            best_effort("verification email", self.email.send(message)).await;
        }

        tracing::info!(tenant_id = %user.tenant_id(), new_tenant = is_new_tenant, "user registered");
        Ok(user)
    }

    /// Create the first business of a tenant and make it the issuer.
    pub(super) async fn bootstrap_issuer(
        &self,
        tenant: &Tenant,
        created_by: UserId,
        at: chrono::DateTime<chrono::Utc>,
    ) -> DomainResult<Business> {
        let business = Business::create(
            self.next_id(Sequence::Business).await?,
            tenant.id(),
            created_by,
            BusinessDraft::named(tenant.name()),
            at,
        )?;
        let business = self.store.insert_business(business).await?;
        self.store.assign_issuer_if_unset(tenant.id(), business.id(), at).await?;
        Ok(business)
    }

    /// Returns the user and whether this call changed anything.
    #[tracing::instrument(skip_all)]
    pub async fn verify_email(&self, token: &str) -> DomainResult<(User, bool)> {
        let mut user = self
            .store
            .user_by_verification_token(token.trim())
            .await?
            .ok_or_else(|| DomainError::validation("token", "Verification token is invalid or has expired"))?;
        if user.email_verified() {
            return Ok((user, false));
        }
        user.verify_email(now());
        let user = self.store.update_user(user).await?;
        tracing::info!(user_id = %user.id(), "email verified");
        Ok((user, true))
    }

    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str, remember_me: bool) -> DomainResult<LoginOutcome> {
        let email = normalize_email(email).map_err(|_| invalid_credentials())?;
        let mut user = self
            .store
            .user_by_email(&email)
            .await?
            .ok_or_else(invalid_credentials)?;
        if !self.hasher.verify(password, user.password_hash())? {
            tracing::warn!(user_id = %user.id(), "login rejected: wrong password");
            return Err(invalid_credentials());
        }
        user.ensure_can_login()?;

        let remember_me_token = if remember_me {
            let token = generate_token();
            user.set_remember_me_token(Some(token.clone()), now());
            user = self.store.update_user(user).await?;
            Some(token)
        } else {
            None
        };

        let token = self.sessions.issue(user.id())?;
        tracing::info!(user_id = %user.id(), remember_me, "user logged in");
        Ok(LoginOutcome {
            token,
            remember_me_token,
            profile: self.profile_of(user).await?,
        })
    }

    /// Open a new session from a remember-me token.
    #[tracing::instrument(skip_all)]
    pub async fn resume(&self, remember_me_token: &str) -> DomainResult<LoginOutcome> {
        let user = self
            .store
            .user_by_remember_me_token(remember_me_token)
            .await?
            .ok_or_else(invalid_credentials)?;
        user.ensure_can_login()?;
        let token = self.sessions.issue(user.id())?;
        Ok(LoginOutcome {
            token,
            remember_me_token: Some(remember_me_token.to_string()),
            profile: self.profile_of(user).await?,
        })
    }

    pub fn logout(&self, actor: &Actor, token: &str) -> DomainResult<()> {
        if self.sessions.revoke(token)? {
            tracing::debug!(user_id = %actor.user_id, "session closed");
        }
        Ok(())
    }

    /// The caller's profile. Deactivated accounts are refused.
    pub async fn profile(&self, actor: &Actor) -> DomainResult<Profile> {
        let user = self
            .store
            .user(actor.user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("User not found"))?;
        user.ensure_active()?;
        self.profile_of(user).await
    }

    async fn profile_of(&self, user: User) -> DomainResult<Profile> {
        let tenant = self.load_tenant(user.tenant_id()).await?;
        let issuer_business = match tenant.issuer_business_id() {
            Some(id) => self.store.business(id).await?,
            None => None,
        };
        Ok(Profile {
            user,
            tenant,
            issuer_business,
        })
    }
}
