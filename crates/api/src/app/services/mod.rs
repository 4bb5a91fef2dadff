//! Use-case services: the entry points of the back office.
//!
//! Every operation takes the authenticated [`Actor`] explicitly, asks the
//! policy engine before touching data and returns a [`DomainResult`]. Routes
//! are thin wrappers around these.

mod authz;
mod businesses;
mod catalog;
mod identity;
mod invoices;
mod tenants;
mod users;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use invoicer_auth::{AccessRequest, Action, Actor, Argon2PasswordHasher, PasswordHasher, ResourceKind, Scope, authorize};
use invoicer_core::{BusinessId, DomainError, DomainResult, TenantId, UserId};
use invoicer_infra::external::{
    EmailSender, InMemoryLogoStore, JsonDocumentRenderer, LogEmailSender, LogoStore, PdfRenderer, SheetExporter,
    TsvSheetExporter,
};
use invoicer_infra::{
    BackOfficeConfig, BackOfficeStore, InMemoryStore, InvoiceNumberAllocator, PartyStore, Sequence, SessionStore,
};
use invoicer_parties::{Business, Tenant};

pub use identity::{LoginOutcome, Profile};
pub use invoices::{InvoiceInput, InvoiceUpdate, ItemChange, ItemInput, ItemPatchInput, TaxRef};
pub use users::{NewUserInput, UserUpdate};

/// Outbound collaborators the services call into.
#[derive(Clone)]
pub struct Collaborators {
    pub hasher: Arc<dyn PasswordHasher>,
    pub email: Arc<dyn EmailSender>,
    pub pdf: Arc<dyn PdfRenderer>,
    pub sheets: Arc<dyn SheetExporter>,
    pub logos: Arc<dyn LogoStore>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            hasher: Arc::new(Argon2PasswordHasher),
            email: Arc::new(LogEmailSender),
            pdf: Arc::new(JsonDocumentRenderer),
            sheets: Arc::new(TsvSheetExporter),
            logos: Arc::new(InMemoryLogoStore::new()),
        }
    }
}

pub struct BackOffice {
    store: Arc<dyn BackOfficeStore>,
    allocator: InvoiceNumberAllocator,
    sessions: SessionStore,
    config: BackOfficeConfig,
    hasher: Arc<dyn PasswordHasher>,
    email: Arc<dyn EmailSender>,
    pdf: Arc<dyn PdfRenderer>,
    sheets: Arc<dyn SheetExporter>,
    logos: Arc<dyn LogoStore>,
}

impl BackOffice {
    /// Fresh back office over an in-memory store seeded with the default
    /// taxes and invoice statuses.
    pub fn new(config: BackOfficeConfig, collaborators: Collaborators) -> DomainResult<Self> {
        Ok(Self::with_store(Arc::new(InMemoryStore::with_defaults()?), config, collaborators))
    }

    /// Back office over an already seeded store.
    pub fn with_store(
        store: Arc<dyn BackOfficeStore>,
        config: BackOfficeConfig,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            store,
            allocator: InvoiceNumberAllocator::new(config.number_max_attempts),
            sessions: SessionStore::new(),
            config,
            hasher: collaborators.hasher,
            email: collaborators.email,
            pdf: collaborators.pdf,
            sheets: collaborators.sheets,
            logos: collaborators.logos,
        }
    }

    pub fn store(&self) -> &dyn BackOfficeStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &BackOfficeConfig {
        &self.config
    }

    /// Resolve a bearer token to the caller. `None` for unknown tokens and
    /// for sessions whose user no longer exists or was deactivated.
    pub async fn authenticate(&self, token: &str) -> DomainResult<Option<Actor>> {
        let Some(user_id) = self.sessions.resolve(token)? else {
            return Ok(None);
        };
        match self.actor_for(user_id).await {
            Ok(actor) => Ok(Some(actor)),
            Err(DomainError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Build the policy actor for a stored, active user.
    pub async fn actor_for(&self, user_id: UserId) -> DomainResult<Actor> {
        let user = self
            .store
            .user(user_id)
            .await?
            .filter(|u| u.is_active())
            .ok_or_else(|| DomainError::not_found("User not found"))?;
        let tenant = self.load_tenant(user.tenant_id()).await?;
        Ok(user.actor(tenant.is_admin()))
    }

    /// Next id of `sequence`, typed by the caller.
    async fn next_id<T: From<i64>>(&self, sequence: Sequence) -> DomainResult<T> {
        Ok(T::from(self.store.next_id(sequence).await?))
    }

    async fn load_tenant(&self, id: TenantId) -> DomainResult<Tenant> {
        self.store
            .tenant(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Tenant not found"))
    }

    async fn load_business(&self, id: BusinessId) -> DomainResult<Business> {
        self.store
            .business(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Business not found"))
    }

    /// Load a business and check `action` on `resource` inside its tenant.
    async fn business_for(
        &self,
        actor: &Actor,
        id: BusinessId,
        action: Action,
        resource: ResourceKind,
    ) -> DomainResult<Business> {
        let business = self.load_business(id).await?;
        check(actor, AccessRequest::new(action, resource, Scope::Tenant(business.tenant_id())))?;
        Ok(business)
    }

    /// Scope for a listing: every tenant for admin tenants, otherwise the
    /// actor's own.
    fn listing_scope(actor: &Actor) -> Scope {
        if actor.tenant_is_admin {
            Scope::AllTenants
        } else {
            Scope::Tenant(actor.tenant_id)
        }
    }
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn check(actor: &Actor, req: AccessRequest) -> DomainResult<()> {
    authorize(actor, &req).map_err(DomainError::from)
}

/// Run a side effect whose failure must not undo the mutation that already
/// succeeded. Failures are logged at `error`.
async fn best_effort<F>(what: &'static str, effect: F)
where
    F: Future<Output = DomainResult<()>>,
{
    if let Err(err) = effect.await {
        tracing::error!(what, error = %err, "side effect failed");
    }
}
