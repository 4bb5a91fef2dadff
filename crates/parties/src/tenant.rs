use chrono::{DateTime, Utc};
use serde::Serialize;

use invoicer_core::{BusinessId, DomainError, DomainResult, Entity, TenantId};

use crate::text;

/// An isolated customer account.
///
/// # Invariants
/// - `issuer_business_id` is assigned at most once; afterwards it never changes.
/// - A tenant without an issuer business is a valid transient state left by
///   staged bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tenant {
    id: TenantId,
    name: String,
    has_paid: bool,
    is_admin: bool,
    issuer_business_id: Option<BusinessId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTenant {
    pub name: String,
    pub has_paid: bool,
    pub is_admin: bool,
}

impl NewTenant {
    pub fn regular(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            has_paid: false,
            is_admin: false,
        }
    }
}

/// Fields a caller may send when updating a tenant.
///
/// `issuer_business_id` is accepted only so that an attempt to change it can be
/// rejected explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantPatch {
    pub name: Option<String>,
    pub has_paid: Option<bool>,
    pub is_admin: Option<bool>,
    pub issuer_business_id: Option<BusinessId>,
}

impl Tenant {
    pub fn create(id: TenantId, new: NewTenant, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id,
            name: text::required("name", &new.name, "Tenant name is required")?,
            has_paid: new.has_paid,
            is_admin: new.is_admin,
            issuer_business_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_paid(&self) -> bool {
        self.has_paid
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn issuer_business_id(&self) -> Option<BusinessId> {
        self.issuer_business_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_issuer(&self, business_id: BusinessId) -> bool {
        self.issuer_business_id == Some(business_id)
    }

    /// Set the issuer business. Re-assigning the same business is a no-op.
    pub fn assign_issuer(&mut self, business_id: BusinessId, now: DateTime<Utc>) -> DomainResult<()> {
        match self.issuer_business_id {
            Some(current) if current == business_id => Ok(()),
            Some(_) => Err(DomainError::conflict(
                "Issuer business cannot be changed after creation",
            )),
            None => {
                self.issuer_business_id = Some(business_id);
                self.updated_at = now;
                Ok(())
            }
        }
    }

    /// Apply an update. Whether the caller may flip `is_admin` is a policy
    /// question answered before this is called.
    pub fn apply(&mut self, patch: TenantPatch, now: DateTime<Utc>) -> DomainResult<()> {
        if patch.issuer_business_id.is_some() {
            return Err(DomainError::validation(
                "issuer_business_id",
                "Issuer business cannot be changed after creation",
            ));
        }

        let name = match patch.name {
            Some(name) => text::required("name", &name, "Tenant name is required")?,
            None => self.name.clone(),
        };

        self.name = name;
        if let Some(has_paid) = patch.has_paid {
            self.has_paid = has_paid;
        }
        if let Some(is_admin) = patch.is_admin {
            self.is_admin = is_admin;
        }
        self.updated_at = now;
        Ok(())
    }
}

/// A tenant row exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRecord {
    pub id: TenantId,
    pub name: String,
    pub has_paid: bool,
    pub is_admin: bool,
    pub issuer_business_id: Option<BusinessId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Rebuild a tenant from a stored row. No validation is applied.
    pub fn restore(record: TenantRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            has_paid: record.has_paid,
            is_admin: record.is_admin,
            issuer_business_id: record.issuer_business_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    pub fn to_record(&self) -> TenantRecord {
        TenantRecord {
            id: self.id,
            name: self.name.clone(),
            has_paid: self.has_paid,
            is_admin: self.is_admin,
            issuer_business_id: self.issuer_business_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Entity for Tenant {
    type Id = TenantId;

    fn id(&self) -> Self::Id {
        self.id
    }
}
