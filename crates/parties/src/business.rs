use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use invoicer_core::{BusinessId, Decimal, DomainError, DomainResult, Entity, TenantId, UserId};

use crate::text;

/// Image types accepted as business logos.
pub const LOGO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "svg", "webp"];

/// Default upper bound for a logo upload (5 MiB).
pub const LOGO_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Identity and contact details of a business.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessDraft {
    pub business_name: String,
    pub trade_name: Option<String>,
    pub business_type: Option<String>,
    pub unique_identifier_number: Option<String>,
    pub business_number: Option<String>,
    pub fiscal_number: Option<String>,
    pub vat_number: Option<String>,
    pub number_of_employees: Option<i32>,
    pub registration_date: Option<NaiveDate>,
    pub municipality: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub capital: Option<Decimal>,
    pub arbk_status: Option<String>,
}

impl BusinessDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            business_name: name.into(),
            ..Self::default()
        }
    }

    fn validated(self) -> DomainResult<Self> {
        let email = text::optional("email", self.email, 255)?;
        if let Some(email) = &email {
            match email.split_once('@') {
                Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
                _ => {
                    return Err(DomainError::validation(
                        "email",
                        "The email is not a valid email.",
                    ));
                }
            }
        }
        if matches!(self.number_of_employees, Some(n) if n < 0) {
            return Err(DomainError::validation(
                "number_of_employees",
                "Number of employees cannot be negative",
            ));
        }
        if matches!(self.capital, Some(c) if c.is_sign_negative() && !c.is_zero()) {
            return Err(DomainError::validation("capital", "Capital cannot be negative"));
        }

        Ok(Self {
            business_name: text::required(
                "business_name",
                &self.business_name,
                "Business name is required",
            )?,
            trade_name: text::optional("trade_name", self.trade_name, 255)?,
            business_type: text::optional("business_type", self.business_type, 255)?,
            unique_identifier_number: text::optional(
                "unique_identifier_number",
                self.unique_identifier_number,
                255,
            )?,
            business_number: text::optional("business_number", self.business_number, 255)?,
            fiscal_number: text::optional("fiscal_number", self.fiscal_number, 255)?,
            vat_number: text::optional("vat_number", self.vat_number, 255)?,
            number_of_employees: self.number_of_employees,
            registration_date: self.registration_date,
            municipality: text::optional("municipality", self.municipality, 255)?,
            address: text::optional("address", self.address, usize::MAX)?,
            phone: text::optional("phone", self.phone, 255)?,
            email,
            capital: self.capital,
            arbk_status: text::optional("arbk_status", self.arbk_status, 255)?,
        })
    }
}

/// Partial update: `Some` replaces the field, a blank string clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BusinessPatch {
    pub business_name: Option<String>,
    pub trade_name: Option<String>,
    pub business_type: Option<String>,
    pub unique_identifier_number: Option<String>,
    pub business_number: Option<String>,
    pub fiscal_number: Option<String>,
    pub vat_number: Option<String>,
    pub number_of_employees: Option<i32>,
    pub registration_date: Option<NaiveDate>,
    pub municipality: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub capital: Option<Decimal>,
    pub arbk_status: Option<String>,
}

/// A business owned by a tenant. Whether it is an issuer is derived from the
/// owning tenant, never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Business {
    id: BusinessId,
    tenant_id: TenantId,
    created_by: UserId,
    #[serde(flatten)]
    profile: BusinessDraft,
    logo: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Business {
    pub fn create(
        id: BusinessId,
        tenant_id: TenantId,
        created_by: UserId,
        draft: BusinessDraft,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id,
            tenant_id,
            created_by,
            profile: draft.validated()?,
            logo: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn name(&self) -> &str {
        &self.profile.business_name
    }

    pub fn profile(&self) -> &BusinessDraft {
        &self.profile
    }

    pub fn logo(&self) -> Option<&str> {
        self.logo.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn apply(&mut self, patch: BusinessPatch, now: DateTime<Utc>) -> DomainResult<()> {
        let current = self.profile.clone();
        let merged = BusinessDraft {
            business_name: patch.business_name.unwrap_or(current.business_name),
            trade_name: patch.trade_name.or(current.trade_name),
            business_type: patch.business_type.or(current.business_type),
            unique_identifier_number: patch
                .unique_identifier_number
                .or(current.unique_identifier_number),
            business_number: patch.business_number.or(current.business_number),
            fiscal_number: patch.fiscal_number.or(current.fiscal_number),
            vat_number: patch.vat_number.or(current.vat_number),
            number_of_employees: patch.number_of_employees.or(current.number_of_employees),
            registration_date: patch.registration_date.or(current.registration_date),
            municipality: patch.municipality.or(current.municipality),
            address: patch.address.or(current.address),
            phone: patch.phone.or(current.phone),
            email: patch.email.or(current.email),
            capital: patch.capital.or(current.capital),
            arbk_status: patch.arbk_status.or(current.arbk_status),
        };
        self.profile = merged.validated()?;
        self.updated_at = now;
        Ok(())
    }

    /// Replace the stored logo path, returning the previous one so the caller
    /// can remove the old file.
    pub fn set_logo(&mut self, path: Option<String>, now: DateTime<Utc>) -> Option<String> {
        self.updated_at = now;
        std::mem::replace(&mut self.logo, path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessRecord {
    pub id: BusinessId,
    pub tenant_id: TenantId,
    pub created_by: UserId,
    pub profile: BusinessDraft,
    pub logo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Business {
    /// Rebuild a business from a stored row. No validation is applied.
    pub fn restore(record: BusinessRecord) -> Self {
        Self {
            id: record.id,
            tenant_id: record.tenant_id,
            created_by: record.created_by,
            profile: record.profile,
            logo: record.logo,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl Entity for Business {
    type Id = BusinessId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Validate an uploaded logo and return its normalized extension.
pub fn validate_logo(file_name: &str, size: u64, max_bytes: u64) -> DomainResult<String> {
    if size == 0 {
        return Err(DomainError::validation("logo", "No file uploaded"));
    }
    if size > max_bytes {
        return Err(DomainError::validation(
            "logo",
            format!("File size exceeds the maximum allowed size of {} bytes", max_bytes),
        ));
    }
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !LOGO_EXTENSIONS.contains(&ext.as_str()) {
        return Err(DomainError::validation(
            "logo",
            "Invalid file type. Allowed types: JPEG, PNG, GIF, SVG, WebP",
        ));
    }
    Ok(ext)
}

/// Storage key for a business logo.
pub fn logo_path(business_id: BusinessId, uploaded_at: DateTime<Utc>, ext: &str) -> String {
    format!(
        "uploads/logos/business-{}-{}.{}",
        business_id,
        uploaded_at.timestamp(),
        ext
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_business() -> Business {
        Business::create(
            BusinessId::new(3),
            TenantId::new(1),
            UserId::new(1),
            BusinessDraft {
                trade_name: Some("  Acme Trade ".to_string()),
                capital: Some(dec!(1000.00)),
                ..BusinessDraft::named("Acme LLC")
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn create_trims_fields_and_requires_a_name() {
        let business = test_business();
        assert_eq!(business.name(), "Acme LLC");
        assert_eq!(business.profile().trade_name.as_deref(), Some("Acme Trade"));

        let err = Business::create(
            BusinessId::new(4),
            TenantId::new(1),
            UserId::new(1),
            BusinessDraft::named(" "),
            Utc::now(),
        )
        .unwrap_err();
        match err {
            DomainError::Validation { message, .. } => assert_eq!(message, "Business name is required"),
            _ => panic!("Expected Validation error"),
        }
    }

    #[test]
    fn invalid_email_is_rejected() {
        let err = Business::create(
            BusinessId::new(4),
            TenantId::new(1),
            UserId::new(1),
            BusinessDraft {
                email: Some("not-an-email".to_string()),
                ..BusinessDraft::named("X")
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "email"));
    }

    #[test]
    fn patch_merges_and_blank_clears() {
        let mut business = test_business();
        business
            .apply(
                BusinessPatch {
                    phone: Some("+383 44 000 000".to_string()),
                    trade_name: Some("".to_string()),
                    ..BusinessPatch::default()
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(business.profile().phone.as_deref(), Some("+383 44 000 000"));
        assert_eq!(business.profile().trade_name, None);
        assert_eq!(business.name(), "Acme LLC");
    }

    #[test]
    fn failed_patch_leaves_business_unchanged() {
        let mut business = test_business();
        let before = business.clone();
        let err = business.apply(
            BusinessPatch {
                business_name: Some(String::new()),
                ..BusinessPatch::default()
            },
            Utc::now(),
        );
        assert!(err.is_err());
        assert_eq!(business, before);
    }

    #[test]
    fn logo_rules() {
        assert_eq!(validate_logo("Logo.PNG", 10, LOGO_MAX_BYTES).unwrap(), "png");
        assert!(validate_logo("logo.exe", 10, LOGO_MAX_BYTES).is_err());
        assert!(validate_logo("logo", 10, LOGO_MAX_BYTES).is_err());
        assert!(validate_logo("logo.png", LOGO_MAX_BYTES + 1, LOGO_MAX_BYTES).is_err());

        let mut business = test_business();
        assert_eq!(business.set_logo(Some("a.png".to_string()), Utc::now()), None);
        assert_eq!(
            business.set_logo(Some("b.png".to_string()), Utc::now()).as_deref(),
            Some("a.png")
        );
    }

    #[test]
    fn serialized_business_is_flat() {
        let json = serde_json::to_value(test_business()).unwrap();
        assert_eq!(json["business_name"], "Acme LLC");
        assert_eq!(json["capital"], "1000.00");
        assert_eq!(json["tenant_id"], 1);
    }
}
