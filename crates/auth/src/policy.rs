//! Tenant authorization policy.
//!
//! One decision function answers every access question in the system. Entry
//! points describe what they are about to do as an [`AccessRequest`] and ask
//! [`authorize`]; [`explain`] runs the same decision and reports why.
//!
//! Rules, evaluated in order:
//! 1. inactive actors are denied everything;
//! 2. resource gates (taxes, invoice statuses, user management, tenant
//!    provisioning) demand `ROLE_ADMIN` and/or an admin tenant;
//! 3. reads inside another tenant need an admin tenant;
//! 4. writes inside another tenant need an admin tenant *and* `ROLE_ADMIN`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use invoicer_core::{BusinessId, DomainError, TenantId, UserId};

use crate::Actor;

/// What the caller wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn is_write(self) -> bool {
        !matches!(self, Action::Read)
    }
}

/// Kind of resource being touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Tenant,
    User,
    Business,
    BankAccount,
    Article,
    Invoice,
    InvoiceItem,
    Tax,
    InvoiceStatus,
}

impl ResourceKind {
    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Tenant => "tenant",
            ResourceKind::User => "user",
            ResourceKind::Business => "business",
            ResourceKind::BankAccount => "bank account",
            ResourceKind::Article => "article",
            ResourceKind::Invoice => "invoice",
            ResourceKind::InvoiceItem => "invoice item",
            ResourceKind::Tax => "tax",
            ResourceKind::InvoiceStatus => "invoice status",
        }
    }

    fn plural(self) -> &'static str {
        match self {
            ResourceKind::Tenant => "tenants",
            ResourceKind::User => "users",
            ResourceKind::Business => "businesses",
            ResourceKind::BankAccount => "bank accounts",
            ResourceKind::Article => "articles",
            ResourceKind::Invoice => "invoices",
            ResourceKind::InvoiceItem => "invoice items",
            ResourceKind::Tax => "taxes",
            ResourceKind::InvoiceStatus => "invoice statuses",
        }
    }
}

/// Which tenant's data the request reaches into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "tenant_id")]
pub enum Scope {
    /// Not tenant-owned (taxes, invoice statuses).
    Global,
    /// Data owned by exactly one tenant.
    Tenant(TenantId),
    /// Unfiltered listing across every tenant.
    AllTenants,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub action: Action,
    pub resource: ResourceKind,
    pub scope: Scope,
}

impl AccessRequest {
    pub fn new(action: Action, resource: ResourceKind, scope: Scope) -> Self {
        Self {
            action,
            resource,
            scope,
        }
    }

    pub fn read(resource: ResourceKind, tenant_id: TenantId) -> Self {
        Self::new(Action::Read, resource, Scope::Tenant(tenant_id))
    }

    pub fn write(action: Action, resource: ResourceKind, tenant_id: TenantId) -> Self {
        Self::new(action, resource, Scope::Tenant(tenant_id))
    }

    pub fn global(action: Action, resource: ResourceKind) -> Self {
        Self::new(action, resource, Scope::Global)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    InactiveUser,
    AdminRoleRequired,
    AdminTenantRequired,
    CrossTenantAccess,
    IssuerMismatch,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("{reason}")]
    AccessDenied { kind: DenialKind, reason: String },
}

impl AuthzError {
    pub fn kind(&self) -> DenialKind {
        match self {
            AuthzError::AccessDenied { kind, .. } => *kind,
        }
    }
}

impl From<AuthzError> for DomainError {
    fn from(err: AuthzError) -> Self {
        DomainError::access_denied(err.to_string())
    }
}

enum Decision {
    Granted(String),
    Denied(DenialKind, String),
}

fn denied(kind: DenialKind, reason: impl Into<String>) -> Decision {
    Decision::Denied(kind, reason.into())
}

fn decide(actor: &Actor, req: &AccessRequest) -> Decision {
    if !actor.is_active {
        return denied(DenialKind::InactiveUser, "User account is inactive");
    }

    if let Some(gate) = resource_gate(actor, req) {
        return gate;
    }

    let resource = req.resource;
    match req.scope {
        Scope::Global => Decision::Granted(format!("{} are not tenant-owned", resource.plural())),
        Scope::AllTenants => {
            if !actor.tenant_is_admin {
                denied(
                    DenialKind::AdminTenantRequired,
                    format!("Only admin tenants can access {} across tenants", resource.plural()),
                )
            } else if req.action.is_write() && !actor.is_admin_user() {
                denied(
                    DenialKind::AdminRoleRequired,
                    format!("Only admin users can modify {} across tenants", resource.plural()),
                )
            } else {
                Decision::Granted("admin tenant has cross-tenant visibility".to_string())
            }
        }
        Scope::Tenant(owner) if owner == actor.tenant_id => {
            Decision::Granted("resource belongs to the actor's own tenant".to_string())
        }
        Scope::Tenant(_) => {
            if !actor.tenant_is_admin {
                denied(
                    DenialKind::CrossTenantAccess,
                    format!("You do not have access to this {}", resource.label()),
                )
            } else if !req.action.is_write() {
                Decision::Granted("admin tenant may read across tenants".to_string())
            } else if !actor.is_admin_user() {
                denied(
                    DenialKind::AdminRoleRequired,
                    "You do not have permission to modify this tenant's entities",
                )
            } else {
                Decision::Granted("admin user of an admin tenant may write across tenants".to_string())
            }
        }
    }
}

fn resource_gate(actor: &Actor, req: &AccessRequest) -> Option<Decision> {
    let write = req.action.is_write();
    match req.resource {
        ResourceKind::Tax | ResourceKind::InvoiceStatus if write => {
            let what = req.resource.plural();
            if !actor.is_admin_user() {
                Some(denied(
                    DenialKind::AdminRoleRequired,
                    format!("Only admin users can manage {what}"),
                ))
            } else if !actor.tenant_is_admin {
                Some(denied(
                    DenialKind::AdminTenantRequired,
                    format!("Only admins of admin tenants can manage {what}"),
                ))
            } else {
                None
            }
        }
        ResourceKind::InvoiceStatus if !actor.tenant_is_admin => Some(denied(
            DenialKind::AdminTenantRequired,
            "Only admin tenants can view invoice statuses",
        )),
        ResourceKind::User if !actor.is_admin_user() => Some(denied(
            DenialKind::AdminRoleRequired,
            "Only admin users can manage other users",
        )),
        ResourceKind::Tenant
            if matches!(req.action, Action::Create | Action::Delete) && !actor.tenant_is_admin =>
        {
            let verb = if req.action == Action::Create { "create" } else { "delete" };
            Some(denied(
                DenialKind::AdminTenantRequired,
                format!("Only admin tenants can {verb} tenants"),
            ))
        }
        _ => None,
    }
}

/// Authorize `actor` for `req`.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(actor: &Actor, req: &AccessRequest) -> Result<(), AuthzError> {
    match decide(actor, req) {
        Decision::Granted(_) => Ok(()),
        Decision::Denied(kind, reason) => {
            tracing::warn!(
                user_id = %actor.user_id,
                tenant_id = %actor.tenant_id,
                action = ?req.action,
                resource = ?req.resource,
                scope = ?req.scope,
                kind = ?kind,
                "access denied"
            );
            Err(AuthzError::AccessDenied { kind, reason })
        }
    }
}

/// Authorize creating or updating an invoice issued by `issuer`.
///
/// Regular tenants may only issue from their own issuer business. Admin
/// tenants may issue from any business, subject to write scoping against the
/// issuer's tenant.
pub fn authorize_issuer(
    actor: &Actor,
    action: Action,
    issuer: BusinessId,
    issuer_tenant: TenantId,
    own_issuer: Option<BusinessId>,
) -> Result<(), AuthzError> {
    authorize(
        actor,
        &AccessRequest::write(action, ResourceKind::Invoice, issuer_tenant),
    )?;

    if actor.tenant_is_admin || own_issuer == Some(issuer) {
        return Ok(());
    }

    tracing::warn!(
        user_id = %actor.user_id,
        tenant_id = %actor.tenant_id,
        issuer = %issuer,
        "invoice issuer does not match tenant issuer business"
    );
    Err(AuthzError::AccessDenied {
        kind: DenialKind::IssuerMismatch,
        reason: "Invoices can only be issued by your tenant's issuer business".to_string(),
    })
}

/// Gate an operation that only admin-tenant members may perform regardless of
/// the target tenant (changing a tenant's admin flag, moving a user).
pub fn require_admin_tenant(actor: &Actor, what: &str) -> Result<(), AuthzError> {
    if !actor.is_active {
        return Err(AuthzError::AccessDenied {
            kind: DenialKind::InactiveUser,
            reason: "User account is inactive".to_string(),
        });
    }
    if actor.tenant_is_admin {
        return Ok(());
    }
    tracing::warn!(user_id = %actor.user_id, tenant_id = %actor.tenant_id, what, "admin tenant required");
    Err(AuthzError::AccessDenied {
        kind: DenialKind::AdminTenantRequired,
        reason: format!("Only admin tenants can {what}"),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub request: AccessRequest,
    pub granted: bool,
    /// Human-readable reason for the decision.
    pub reason: String,
    pub actor: ActorState,
    /// If denied, this explains what was missing.
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActorState {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub tenant_is_admin: bool,
    pub roles: Vec<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

/// Explain why an authorization decision was made (or would be made).
pub fn explain(actor: &Actor, req: &AccessRequest) -> AuthorizationExplanation {
    let state = ActorState {
        user_id: actor.user_id,
        tenant_id: actor.tenant_id,
        tenant_is_admin: actor.tenant_is_admin,
        roles: actor.roles.iter().map(|r| r.as_str().to_string()).collect(),
        is_active: actor.is_active,
    };

    match decide(actor, req) {
        Decision::Granted(reason) => AuthorizationExplanation {
            request: *req,
            granted: true,
            reason,
            actor: state,
            denial_reason: None,
        },
        Decision::Denied(kind, message) => AuthorizationExplanation {
            request: *req,
            granted: false,
            reason: message.clone(),
            actor: state,
            denial_reason: Some(DenialReason {
                kind,
                message,
                suggestions: suggestions(kind),
            }),
        },
    }
}

fn suggestions(kind: DenialKind) -> Vec<String> {
    let hints: &[&str] = match kind {
        DenialKind::InactiveUser => &["Ask an administrator to reactivate the account"],
        DenialKind::AdminRoleRequired => &[
            "Ask an administrator to grant ROLE_ADMIN",
            "Perform the change from an account that already holds ROLE_ADMIN",
        ],
        DenialKind::AdminTenantRequired => &["Perform this operation from an admin tenant account"],
        DenialKind::CrossTenantAccess => {
            &["Use an account that belongs to the tenant owning this resource"]
        }
        DenialKind::IssuerMismatch => &["Use the tenant's issuer business as the invoice issuer"],
    };
    hints.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;
    use crate::Role;

    const OWN: TenantId = TenantId::new(1);
    const OTHER: TenantId = TenantId::new(2);

    fn actor(tenant_is_admin: bool, admin_role: bool) -> Actor {
        let mut roles = BTreeSet::from([Role::User]);
        if admin_role {
            roles.insert(Role::Admin);
        }
        Actor {
            user_id: UserId::new(10),
            tenant_id: OWN,
            tenant_is_admin,
            roles,
            is_active: true,
        }
    }

    fn kind_of(result: Result<(), AuthzError>) -> DenialKind {
        result.expect_err("expected denial").kind()
    }

    #[test]
    fn inactive_user_is_denied_even_for_own_tenant_reads() {
        let mut a = actor(true, true);
        a.is_active = false;
        let req = AccessRequest::read(ResourceKind::Business, OWN);
        assert_eq!(kind_of(authorize(&a, &req)), DenialKind::InactiveUser);
    }

    #[test]
    fn regular_tenant_is_confined_to_its_own_tenant() {
        let a = actor(false, true);
        assert!(authorize(&a, &AccessRequest::read(ResourceKind::Business, OWN)).is_ok());
        assert!(
            authorize(
                &a,
                &AccessRequest::write(Action::Update, ResourceKind::Business, OWN)
            )
            .is_ok()
        );

        let err = authorize(&a, &AccessRequest::read(ResourceKind::Business, OTHER)).unwrap_err();
        assert_eq!(err.kind(), DenialKind::CrossTenantAccess);
        assert_eq!(err.to_string(), "You do not have access to this business");

        let err = authorize(
            &a,
            &AccessRequest::write(Action::Delete, ResourceKind::BankAccount, OTHER),
        )
        .unwrap_err();
        assert_eq!(err.kind(), DenialKind::CrossTenantAccess);
    }

    #[test]
    fn admin_tenant_without_admin_role_reads_broadly_but_writes_narrowly() {
        let a = actor(true, false);
        assert!(authorize(&a, &AccessRequest::read(ResourceKind::Invoice, OTHER)).is_ok());
        assert!(
            authorize(
                &a,
                &AccessRequest::write(Action::Create, ResourceKind::Invoice, OWN)
            )
            .is_ok()
        );

        let err = authorize(
            &a,
            &AccessRequest::write(Action::Update, ResourceKind::Business, OTHER),
        )
        .unwrap_err();
        assert_eq!(err.kind(), DenialKind::AdminRoleRequired);
        assert_eq!(
            err.to_string(),
            "You do not have permission to modify this tenant's entities"
        );
    }

    #[test]
    fn platform_admin_writes_across_tenants() {
        let a = actor(true, true);
        for resource in [
            ResourceKind::Business,
            ResourceKind::BankAccount,
            ResourceKind::Article,
            ResourceKind::Invoice,
            ResourceKind::InvoiceItem,
        ] {
            assert!(authorize(&a, &AccessRequest::write(Action::Delete, resource, OTHER)).is_ok());
        }
    }

    #[test]
    fn tax_reads_are_open_and_writes_need_both_admin_flags() {
        let read = AccessRequest::global(Action::Read, ResourceKind::Tax);
        let write = AccessRequest::global(Action::Create, ResourceKind::Tax);

        assert!(authorize(&actor(false, false), &read).is_ok());

        let err = authorize(&actor(true, false), &write).unwrap_err();
        assert_eq!(err.to_string(), "Only admin users can manage taxes");

        let err = authorize(&actor(false, true), &write).unwrap_err();
        assert_eq!(err.kind(), DenialKind::AdminTenantRequired);
        assert_eq!(err.to_string(), "Only admins of admin tenants can manage taxes");

        assert!(authorize(&actor(true, true), &write).is_ok());
    }

    #[test]
    fn invoice_status_reads_need_an_admin_tenant() {
        let read = AccessRequest::global(Action::Read, ResourceKind::InvoiceStatus);
        assert_eq!(
            kind_of(authorize(&actor(false, true), &read)),
            DenialKind::AdminTenantRequired
        );
        assert!(authorize(&actor(true, false), &read).is_ok());

        let write = AccessRequest::global(Action::Update, ResourceKind::InvoiceStatus);
        assert_eq!(
            kind_of(authorize(&actor(true, false), &write)),
            DenialKind::AdminRoleRequired
        );
    }

    #[test]
    fn user_management_requires_admin_role_even_in_own_tenant() {
        let req = AccessRequest::read(ResourceKind::User, OWN);
        assert_eq!(
            kind_of(authorize(&actor(false, false), &req)),
            DenialKind::AdminRoleRequired
        );
        assert!(authorize(&actor(false, true), &req).is_ok());
        assert_eq!(
            kind_of(authorize(
                &actor(false, true),
                &AccessRequest::read(ResourceKind::User, OTHER)
            )),
            DenialKind::CrossTenantAccess
        );
    }

    #[test]
    fn tenant_provisioning_and_deletion_need_an_admin_tenant() {
        let create = AccessRequest::new(Action::Create, ResourceKind::Tenant, Scope::Global);
        assert_eq!(
            kind_of(authorize(&actor(false, true), &create)),
            DenialKind::AdminTenantRequired
        );
        assert!(authorize(&actor(true, true), &create).is_ok());

        let delete_own = AccessRequest::write(Action::Delete, ResourceKind::Tenant, OWN);
        let err = authorize(&actor(false, true), &delete_own).unwrap_err();
        assert_eq!(err.to_string(), "Only admin tenants can delete tenants");
    }

    #[test]
    fn all_tenant_listing_is_reserved_for_admin_tenants() {
        let req = AccessRequest::new(Action::Read, ResourceKind::Invoice, Scope::AllTenants);
        assert_eq!(
            kind_of(authorize(&actor(false, true), &req)),
            DenialKind::AdminTenantRequired
        );
        assert!(authorize(&actor(true, false), &req).is_ok());
    }

    #[test]
    fn regular_tenant_must_issue_from_its_issuer_business() {
        let a = actor(false, false);
        let own_issuer = Some(BusinessId::new(5));

        assert!(authorize_issuer(&a, Action::Create, BusinessId::new(5), OWN, own_issuer).is_ok());

        let err = authorize_issuer(&a, Action::Create, BusinessId::new(6), OWN, own_issuer)
            .unwrap_err();
        assert_eq!(err.kind(), DenialKind::IssuerMismatch);

        let err = authorize_issuer(&a, Action::Create, BusinessId::new(6), OTHER, own_issuer)
            .unwrap_err();
        assert_eq!(err.kind(), DenialKind::CrossTenantAccess);
    }

    #[test]
    fn admin_tenant_issuer_is_checked_against_the_issuer_tenant() {
        let issuer = BusinessId::new(99);
        assert!(authorize_issuer(&actor(true, true), Action::Create, issuer, OTHER, None).is_ok());
        assert!(authorize_issuer(&actor(true, false), Action::Create, issuer, OWN, None).is_ok());
        assert_eq!(
            kind_of(authorize_issuer(&actor(true, false), Action::Update, issuer, OTHER, None)),
            DenialKind::AdminRoleRequired
        );
    }

    #[test]
    fn admin_flag_changes_need_an_admin_tenant() {
        let err = require_admin_tenant(&actor(false, true), "change admin status").unwrap_err();
        assert_eq!(err.to_string(), "Only admin tenants can change admin status");
        assert!(require_admin_tenant(&actor(true, false), "change admin status").is_ok());
    }

    #[test]
    fn explanation_matches_the_decision() {
        let a = actor(true, false);
        let req = AccessRequest::write(Action::Update, ResourceKind::Article, OTHER);
        let explanation = explain(&a, &req);
        assert!(!explanation.granted);
        let denial = explanation.denial_reason.expect("denial reason");
        assert_eq!(denial.kind, DenialKind::AdminRoleRequired);
        assert!(!denial.suggestions.is_empty());
        assert_eq!(explanation.actor.roles, vec!["ROLE_USER".to_string()]);

        let json = serde_json::to_value(explain(&a, &AccessRequest::read(ResourceKind::Article, OTHER)))
            .unwrap();
        assert_eq!(json["granted"], true);
        assert_eq!(json["request"]["scope"]["kind"], "tenant");
    }

    fn any_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            Just(Action::Read),
            Just(Action::Create),
            Just(Action::Update),
            Just(Action::Delete),
        ]
    }

    fn any_resource() -> impl Strategy<Value = ResourceKind> {
        prop_oneof![
            Just(ResourceKind::Tenant),
            Just(ResourceKind::User),
            Just(ResourceKind::Business),
            Just(ResourceKind::BankAccount),
            Just(ResourceKind::Article),
            Just(ResourceKind::Invoice),
            Just(ResourceKind::InvoiceItem),
            Just(ResourceKind::Tax),
            Just(ResourceKind::InvoiceStatus),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn inactive_actors_are_always_denied(
            action in any_action(),
            resource in any_resource(),
            tenant_is_admin in any::<bool>(),
            admin_role in any::<bool>(),
            owner in 1i64..4,
        ) {
            let mut a = actor(tenant_is_admin, admin_role);
            a.is_active = false;
            let req = AccessRequest::write(action, resource, TenantId::new(owner));
            prop_assert_eq!(kind_of(authorize(&a, &req)), DenialKind::InactiveUser);
        }

        #[test]
        fn regular_tenants_never_reach_other_tenants(
            action in any_action(),
            resource in any_resource(),
            admin_role in any::<bool>(),
            owner in 2i64..100,
        ) {
            let a = actor(false, admin_role);
            let req = AccessRequest::new(action, resource, Scope::Tenant(TenantId::new(owner)));
            prop_assert!(authorize(&a, &req).is_err());
        }

        #[test]
        fn authorize_and_explain_agree(
            action in any_action(),
            resource in any_resource(),
            tenant_is_admin in any::<bool>(),
            admin_role in any::<bool>(),
            owner in 1i64..3,
        ) {
            let a = actor(tenant_is_admin, admin_role);
            let req = AccessRequest::write(action, resource, TenantId::new(owner));
            prop_assert_eq!(authorize(&a, &req).is_ok(), explain(&a, &req).granted);
        }
    }
}
