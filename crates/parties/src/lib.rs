//! Parties domain module: tenants, their businesses and bank accounts.
//!
//! Pure, deterministic domain logic (no IO, no HTTP, no storage). Entities
//! reference each other by id only.

pub mod bank_account;
pub mod business;
pub mod tenant;

mod text;

pub use bank_account::{BankAccount, BankAccountDraft, BankAccountPatch, BankAccountRecord};
pub use business::{
    Business, BusinessDraft, BusinessPatch, BusinessRecord, LOGO_EXTENSIONS, LOGO_MAX_BYTES, logo_path, validate_logo,
};
pub use tenant::{NewTenant, Tenant, TenantPatch, TenantRecord};
