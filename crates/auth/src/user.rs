//! User entity: credentials, verification and session tokens.
//!
//! Users belong to exactly one tenant. Password hashing happens outside this
//! module; the entity only ever holds the hash.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use invoicer_core::{DomainError, DomainResult, Entity, TenantId, UserId};

use crate::{Actor, Role};

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// # Invariants
/// - `email` is non-blank and normalized to lowercase.
/// - `roles` always contains `ROLE_USER`.
/// - A verified user carries no verification token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    id: UserId,
    tenant_id: TenantId,
    email: String,
    #[serde(skip_serializing)]
    password_hash: String,
    roles: BTreeSet<Role>,
    email_verified: bool,
    #[serde(skip_serializing)]
    email_verification_token: Option<String>,
    #[serde(skip_serializing)]
    remember_me_token: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Input for creating a user (registration, admin creation, invitation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub roles: BTreeSet<Role>,
    pub email_verified: bool,
}

/// Partial update applied by user management.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub roles: Option<BTreeSet<Role>>,
    pub is_active: Option<bool>,
    pub tenant_id: Option<TenantId>,
}

impl User {
    pub fn create(
        id: UserId,
        tenant_id: TenantId,
        new: NewUser,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let email = normalize_email(&new.email)?;
        Ok(Self {
            id,
            tenant_id,
            email,
            password_hash: new.password_hash,
            roles: with_user_role(new.roles),
            email_verified: new.email_verified,
            email_verification_token: None,
            remember_me_token: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    pub fn email_verified(&self) -> bool {
        self.email_verified
    }

    pub fn email_verification_token(&self) -> Option<&str> {
        self.email_verification_token.as_deref()
    }

    pub fn remember_me_token(&self) -> Option<&str> {
        self.remember_me_token.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Build the policy actor for this user.
    pub fn actor(&self, tenant_is_admin: bool) -> Actor {
        Actor {
            user_id: self.id,
            tenant_id: self.tenant_id,
            tenant_is_admin,
            roles: self.roles.clone(),
            is_active: self.is_active,
        }
    }

    /// Attach a pending verification (or invitation) token.
    pub fn issue_verification_token(&mut self, token: String, now: DateTime<Utc>) {
        self.email_verification_token = Some(token);
        self.updated_at = now;
    }

    /// Mark the email as verified and clear the token.
    ///
    /// Returns `false` when the user was already verified.
    pub fn verify_email(&mut self, now: DateTime<Utc>) -> bool {
        let changed = !self.email_verified;
        self.email_verified = true;
        self.email_verification_token = None;
        self.updated_at = now;
        changed
    }

    /// Complete an invitation: set the chosen password and verify.
    pub fn accept_invitation(&mut self, password_hash: String, now: DateTime<Utc>) {
        self.password_hash = password_hash;
        self.verify_email(now);
    }

    pub fn set_remember_me_token(&mut self, token: Option<String>, now: DateTime<Utc>) {
        self.remember_me_token = token;
        self.updated_at = now;
    }

    /// Check a login attempt after the password matched.
    pub fn ensure_can_login(&self) -> DomainResult<()> {
        if !self.email_verified {
            return Err(DomainError::access_denied(
                "Please verify your email address before logging in",
            ));
        }
        self.ensure_active()
    }

    pub fn ensure_active(&self) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::access_denied(
                "Your account is deactivated. Please contact the administrator.",
            ));
        }
        Ok(())
    }

    pub fn apply(&mut self, patch: UserPatch, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(email) = patch.email {
            self.email = normalize_email(&email)?;
        }
        if let Some(hash) = patch.password_hash {
            self.password_hash = hash;
        }
        if let Some(roles) = patch.roles {
            self.roles = with_user_role(roles);
        }
        if let Some(active) = patch.is_active {
            self.is_active = active;
        }
        if let Some(tenant_id) = patch.tenant_id {
            self.tenant_id = tenant_id;
        }
        self.updated_at = now;
        Ok(())
    }
}

/// A user row exactly as stored, secrets included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub password_hash: String,
    pub roles: BTreeSet<Role>,
    pub email_verified: bool,
    pub email_verification_token: Option<String>,
    pub remember_me_token: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Rebuild a user from a stored row. `ROLE_USER` is added back if the row
    /// lost it.
    pub fn restore(record: UserRecord) -> Self {
        Self {
            id: record.id,
            tenant_id: record.tenant_id,
            email: record.email,
            password_hash: record.password_hash,
            roles: with_user_role(record.roles),
            email_verified: record.email_verified,
            email_verification_token: record.email_verification_token,
            remember_me_token: record.remember_me_token,
            is_active: record.is_active,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

pub fn normalize_email(raw: &str) -> DomainResult<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(DomainError::validation("email", "Email is required"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(DomainError::validation("email", "Email is not valid")),
    }
}

fn with_user_role(mut roles: BTreeSet<Role>) -> BTreeSet<Role> {
    roles.insert(Role::User);
    roles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            roles: BTreeSet::new(),
            email_verified: false,
        }
    }

    fn test_user() -> User {
        User::create(UserId::new(1), TenantId::new(1), new_user(" Ana@Example.com "), now()).unwrap()
    }

    #[test]
    fn create_normalizes_email_and_grants_user_role() {
        let user = test_user();
        assert_eq!(user.email(), "ana@example.com");
        assert!(user.roles().contains(&Role::User));
        assert!(user.is_active());
        assert!(!user.email_verified());
    }

    #[test]
    fn create_rejects_blank_or_malformed_email() {
        for bad in ["  ", "no-at-sign", "@example.com", "a@localhost"] {
            let err = User::create(UserId::new(1), TenantId::new(1), new_user(bad), now()).unwrap_err();
            match err {
                DomainError::Validation { field, .. } => assert_eq!(field, "email"),
                other => panic!("expected validation error for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn unverified_user_cannot_log_in() {
        let mut user = test_user();
        assert!(matches!(user.ensure_can_login(), Err(DomainError::AccessDenied(_))));

        user.issue_verification_token("tok".to_string(), now());
        assert!(user.verify_email(now()));
        assert_eq!(user.email_verification_token(), None);
        assert!(user.ensure_can_login().is_ok());

        // Verifying twice is harmless.
        assert!(!user.verify_email(now()));
    }

    #[test]
    fn deactivated_user_cannot_log_in() {
        let mut user = test_user();
        user.verify_email(now());
        user.apply(
            UserPatch {
                is_active: Some(false),
                ..UserPatch::default()
            },
            now(),
        )
        .unwrap();
        assert!(matches!(user.ensure_can_login(), Err(DomainError::AccessDenied(_))));
        assert!(!user.actor(false).is_active);
    }

    #[test]
    fn roles_patch_keeps_the_user_role() {
        let mut user = test_user();
        user.apply(
            UserPatch {
                roles: Some(BTreeSet::from([Role::Admin])),
                ..UserPatch::default()
            },
            now(),
        )
        .unwrap();
        assert!(user.is_admin());
        assert!(user.roles().contains(&Role::User));
    }

    #[test]
    fn accepting_an_invitation_sets_password_and_verifies() {
        let mut user = test_user();
        user.issue_verification_token("invite".to_string(), now());
        user.accept_invitation("new-hash".to_string(), now());
        assert_eq!(user.password_hash(), "new-hash");
        assert!(user.email_verified());
        assert_eq!(user.email_verification_token(), None);
    }

    #[test]
    fn serialized_user_hides_secrets() {
        let mut user = test_user();
        user.set_remember_me_token(Some("secret".to_string()), now());
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("remember_me_token").is_none());
        assert_eq!(json["email"], "ana@example.com");
    }
}
