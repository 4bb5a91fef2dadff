#![allow(dead_code)]

use std::sync::Arc;

use invoicer_api::app::BackOffice;
use invoicer_api::app::services::Collaborators;
use invoicer_auth::{Actor, PasswordHasher, Role, User};
use invoicer_core::{BusinessId, DomainResult, Entity};
use invoicer_infra::{BackOfficeConfig, PartyStore};
use invoicer_infra::external::{InMemoryLogoStore, RecordingEmailSender};

pub const PASSWORD: &str = "correct-horse";

/// Reversible stand-in so tests do not pay for Argon2 on every login.
pub struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, password: &str) -> DomainResult<String> {
        Ok(format!("plain${password}"))
    }

    fn verify(&self, password: &str, hash: &str) -> DomainResult<bool> {
        Ok(hash == format!("plain${password}"))
    }
}

pub struct Harness {
    pub services: Arc<BackOffice>,
    pub email: Arc<RecordingEmailSender>,
    pub logos: Arc<InMemoryLogoStore>,
}

pub fn harness() -> Harness {
    harness_with(RecordingEmailSender::new())
}

pub fn harness_with(email: RecordingEmailSender) -> Harness {
    let email = Arc::new(email);
    let logos = Arc::new(InMemoryLogoStore::new());
    let collaborators = Collaborators {
        hasher: Arc::new(PlainHasher),
        email: email.clone(),
        logos: logos.clone(),
        ..Collaborators::default()
    };
    let services = BackOffice::new(BackOfficeConfig::default(), collaborators).unwrap();
    Harness {
        services: Arc::new(services),
        email,
        logos,
    }
}

/// Register, verify and resolve a self-service user with a fresh tenant.
pub async fn tenant_user(services: &BackOffice, email: &str) -> (Actor, User) {
    let user = services.register(email, PASSWORD, None).await.unwrap();
    let token = user.email_verification_token().unwrap().to_string();
    let (user, _) = services.verify_email(&token).await.unwrap();
    (services.actor_for(user.id()).await.unwrap(), user)
}

/// Promote a registered user to `ROLE_ADMIN` directly in the store.
pub async fn promote(services: &BackOffice, user: &User) -> Actor {
    let mut user = user.clone();
    user.apply(
        invoicer_auth::UserPatch {
            roles: Some([Role::User, Role::Admin].into()),
            ..Default::default()
        },
        chrono::Utc::now(),
    )
    .unwrap();
    services.store().update_user(user.clone()).await.unwrap();
    services.actor_for(user.id()).await.unwrap()
}

pub async fn platform_admin(services: &BackOffice) -> Actor {
    let user = services
        .provision_platform_admin("admin@platform.test", PASSWORD)
        .await
        .unwrap();
    services.actor_for(user.id()).await.unwrap()
}

/// A verified admin-tenant member without `ROLE_ADMIN`.
pub async fn platform_staff(services: &BackOffice, admin: &Actor) -> Actor {
    let user = services
        .create_user(
            admin,
            invoicer_api::app::services::NewUserInput {
                email: "staff@platform.test".to_string(),
                password: PASSWORD.to_string(),
                email_verified: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    services.actor_for(user.id()).await.unwrap()
}

pub async fn issuer_of(services: &BackOffice, actor: &Actor) -> BusinessId {
    services.profile(actor).await.unwrap().issuer_business.unwrap().id()
}
