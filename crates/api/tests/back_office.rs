mod support;

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use invoicer_api::app::services::{
    InvoiceInput, InvoiceUpdate, ItemInput, ItemPatchInput, NewUserInput, TaxRef, UserUpdate,
};
use invoicer_core::{DomainError, Entity};
use invoicer_infra::PartyStore;
use invoicer_infra::external::RecordingEmailSender;
use invoicer_parties::{BankAccountDraft, BusinessDraft, NewTenant, TenantPatch};

use support::*;

fn date(d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2025, 3, d)
}

fn line(description: &str, quantity: rust_decimal::Decimal, price: rust_decimal::Decimal, tax: Option<TaxRef>) -> ItemInput {
    ItemInput {
        description: description.to_string(),
        quantity,
        unit_price: price,
        article_id: None,
        tax,
    }
}

fn invoice_to(receiver: invoicer_core::BusinessId, items: Vec<ItemInput>) -> InvoiceInput {
    InvoiceInput {
        receiver_id: Some(receiver),
        invoice_date: date(1),
        due_date: date(31),
        status: None,
        items,
    }
}

#[tokio::test]
async fn registration_bootstraps_tenant_with_issuer_and_first_invoice_totals() {
    let h = harness();
    let (actor, _) = tenant_user(&h.services, "owner@t1.test").await;

    let profile = h.services.profile(&actor).await.unwrap();
    assert_eq!(profile.tenant.name(), "Tenant for owner@t1.test");
    let issuer = profile.issuer_business.unwrap();
    assert_eq!(issuer.name(), "Tenant for owner@t1.test");
    assert!(profile.tenant.is_issuer(issuer.id()));

    let receiver = h
        .services
        .create_business(&actor, None, BusinessDraft::named("Client"))
        .await
        .unwrap();

    let invoice = h
        .services
        .create_invoice(
            &actor,
            issuer.id(),
            invoice_to(
                receiver.id(),
                vec![
                    line("Consulting", dec!(2), dec!(50.00), Some(TaxRef::Rate(Some(dec!(19))))),
                    line("Stamp", dec!(1), dec!(10.00), Some(TaxRef::Rate(None))),
                ],
            ),
        )
        .await
        .unwrap();

    let items = invoice.items();
    assert_eq!(items[0].subtotal(), dec!(100.00));
    assert_eq!(items[0].tax_amount(), dec!(19.00));
    assert_eq!(items[0].total(), dec!(119.00));
    assert_eq!(items[1].subtotal(), dec!(10.00));
    assert_eq!(items[1].tax_amount(), dec!(0.00));
    assert_eq!(items[1].total(), dec!(10.00));
    assert_eq!(invoice.invoice().subtotal(), dec!(110.00));
    assert_eq!(invoice.invoice().total(), dec!(129.00));
    assert_eq!(
        invoice.invoice().invoice_number().as_str(),
        format!("INV-{}-1", issuer.id())
    );
}

#[tokio::test]
async fn failed_verification_email_does_not_fail_registration() {
    let h = harness_with(RecordingEmailSender::failing());
    let user = h.services.register("quiet@t.test", PASSWORD, None).await.unwrap();
    assert!(h.email.sent().is_empty());
    assert!(h.services.store().user(user.id()).await.unwrap().is_some());
}

#[tokio::test]
async fn login_requires_a_verified_email_and_the_right_password() {
    let h = harness();
    let user = h.services.register("new@t.test", PASSWORD, None).await.unwrap();
    assert_eq!(h.email.sent().len(), 1);

    let err = h.services.login("new@t.test", PASSWORD, false).await.unwrap_err();
    assert!(matches!(err, DomainError::AccessDenied(_)));

    let token = user.email_verification_token().unwrap().to_string();
    assert!(h.services.verify_email(&token).await.unwrap().1);

    let err = h.services.login("new@t.test", "wrong-password", false).await.unwrap_err();
    assert_eq!(err, DomainError::access_denied("Invalid credentials"));

    let outcome = h.services.login("NEW@t.test", PASSWORD, true).await.unwrap();
    let actor = h.services.authenticate(&outcome.token).await.unwrap().unwrap();
    assert_eq!(actor.user_id, user.id());

    let resumed = h
        .services
        .resume(outcome.remember_me_token.as_deref().unwrap())
        .await
        .unwrap();
    assert_ne!(resumed.token, outcome.token);

    h.services.logout(&actor, &outcome.token).unwrap();
    assert!(h.services.authenticate(&outcome.token).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let h = harness();
    tenant_user(&h.services, "dup@t.test").await;
    let err = h.services.register("Dup@T.test", PASSWORD, None).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invoice_creation_never_reuses_a_number() {
    let h = harness();
    let (actor, _) = tenant_user(&h.services, "busy@t.test").await;
    let issuer = issuer_of(&h.services, &actor).await;
    let receiver = h
        .services
        .create_business(&actor, None, BusinessDraft::named("Client"))
        .await
        .unwrap()
        .id();

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let services = Arc::clone(&h.services);
            let actor = actor.clone();
            tokio::spawn(async move {
                services
                    .create_invoice(&actor, issuer, invoice_to(receiver, Vec::new()))
                    .await
                    .map(|i| i.invoice().invoice_number().to_string())
            })
        })
        .collect();

    let mut numbers = Vec::new();
    for task in tasks {
        numbers.push(task.await.unwrap().unwrap());
    }
    numbers.sort();
    numbers.dedup();
    assert_eq!(numbers.len(), 12);
    for n in 1..=12 {
        assert!(numbers.contains(&format!("INV-{issuer}-{n}")));
    }
}

#[tokio::test]
async fn regular_tenants_cannot_see_each_other() {
    let h = harness();
    let (alice, _) = tenant_user(&h.services, "alice@a.test").await;
    let (bob, _) = tenant_user(&h.services, "bob@b.test").await;
    let bobs_business = issuer_of(&h.services, &bob).await;

    let err = h.services.get_business(&alice, bobs_business).await.unwrap_err();
    assert!(matches!(err, DomainError::AccessDenied(_)));
    assert!(h.services.list_bank_accounts(&alice, bobs_business).await.is_err());

    let listed = h.services.list_businesses(&alice).await.unwrap();
    assert!(listed.iter().all(|b| b.tenant_id() == alice.tenant_id));
}

#[tokio::test]
async fn admin_tenant_staff_read_everywhere_but_write_only_at_home() {
    let h = harness();
    let admin = platform_admin(&h.services).await;
    let staff = platform_staff(&h.services, &admin).await;
    let (owner, _) = tenant_user(&h.services, "owner@c.test").await;
    let business = issuer_of(&h.services, &owner).await;

    assert!(h.services.get_business(&staff, business).await.is_ok());
    assert!(h.services.list_bank_accounts(&staff, business).await.is_ok());

    let err = h
        .services
        .create_bank_account(
            &staff,
            business,
            BankAccountDraft {
                bank_account_number: "1110000000000000".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::AccessDenied(_)));

    // The admin-role admin may write there.
    assert!(
        h.services
            .create_bank_account(
                &admin,
                business,
                BankAccountDraft {
                    bank_account_number: "1110000000000000".to_string(),
                    ..Default::default()
                },
            )
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn issuer_business_cannot_be_deleted_or_reassigned() {
    let h = harness();
    let (actor, _) = tenant_user(&h.services, "keep@t.test").await;
    let issuer = issuer_of(&h.services, &actor).await;

    let err = h.services.delete_business(&actor, issuer).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));

    let other = h
        .services
        .create_business(&actor, None, BusinessDraft::named("Second"))
        .await
        .unwrap();
    let err = h
        .services
        .update_tenant(
            &actor,
            actor.tenant_id,
            TenantPatch {
                issuer_business_id: Some(other.id()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { .. }));

    h.services.delete_business(&actor, other.id()).await.unwrap();
}

#[tokio::test]
async fn item_mutations_keep_totals_and_sort_order_consistent() {
    let h = harness();
    let (actor, _) = tenant_user(&h.services, "items@t.test").await;
    let issuer = issuer_of(&h.services, &actor).await;
    let receiver = h
        .services
        .create_business(&actor, None, BusinessDraft::named("Client"))
        .await
        .unwrap()
        .id();
    let invoice = h
        .services
        .create_invoice(&actor, issuer, invoice_to(receiver, Vec::new()))
        .await
        .unwrap();
    let id = invoice.invoice().id();
    let vat = Some(TaxRef::Rate(Some(dec!(19))));

    let a = h.services.add_item(&actor, id, line("A", dec!(1), dec!(100), vat)).await.unwrap();
    let b = h.services.add_item(&actor, id, line("B", dec!(3), dec!(0.333), None)).await.unwrap();
    assert_eq!(b.item.sort_order(), 1);
    assert_eq!(b.invoice.total(), dec!(119.99));

    let changed = h
        .services
        .update_item(
            &actor,
            id,
            a.item.id(),
            ItemPatchInput {
                quantity: Some(dec!(2)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    // Tax is kept when the patch does not name one.
    assert_eq!(changed.item.tax_amount(), dec!(38.00));
    assert_eq!(changed.invoice.total(), dec!(238.99));

    let reordered = h.services.reorder_items(&actor, id, &[b.item.id(), a.item.id()]).await.unwrap();
    assert_eq!(reordered.items()[0].id(), b.item.id());

    let header = h.services.delete_item(&actor, id, b.item.id()).await.unwrap();
    assert_eq!(header.total(), dec!(238.00));
    let remaining = h.services.list_items(&actor, id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].sort_order(), 0);
}

#[tokio::test]
async fn unknown_references_are_validation_errors() {
    let h = harness();
    let (actor, _) = tenant_user(&h.services, "refs@t.test").await;
    let issuer = issuer_of(&h.services, &actor).await;
    let receiver = h
        .services
        .create_business(&actor, None, BusinessDraft::named("Client"))
        .await
        .unwrap()
        .id();

    let mut input = invoice_to(receiver, vec![line("x", dec!(1), dec!(1), Some(TaxRef::Rate(Some(dec!(7)))))]);
    let err = h.services.create_invoice(&actor, issuer, input.clone()).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation { .. }));

    input.items.clear();
    input.status = Some("archived".to_string());
    let err = h.services.create_invoice(&actor, issuer, input).await.unwrap_err();
    assert_eq!(err, DomainError::validation("status", "Invalid invoice status: archived"));
}

#[tokio::test]
async fn regular_tenant_cannot_move_an_invoice_to_another_issuer() {
    let h = harness();
    let (actor, _) = tenant_user(&h.services, "move@t.test").await;
    let issuer = issuer_of(&h.services, &actor).await;
    let receiver = h
        .services
        .create_business(&actor, None, BusinessDraft::named("Client"))
        .await
        .unwrap()
        .id();
    let invoice = h
        .services
        .create_invoice(&actor, issuer, invoice_to(receiver, Vec::new()))
        .await
        .unwrap();

    let err = h
        .services
        .update_invoice(
            &actor,
            issuer,
            invoice.invoice().id(),
            InvoiceUpdate {
                issuer_id: Some(receiver),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::access_denied("You cannot change the issuer business"));

    let updated = h
        .services
        .update_invoice(
            &actor,
            issuer,
            invoice.invoice().id(),
            InvoiceUpdate {
                status: Some("PAID".to_string()),
                items: Some(vec![line("Fee", dec!(1), dec!(50), Some(TaxRef::Rate(Some(dec!(8)))))]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.invoice().total(), dec!(54.00));
}

#[tokio::test]
async fn exports_and_documents_carry_computed_figures() {
    let h = harness();
    let (actor, _) = tenant_user(&h.services, "docs@t.test").await;
    let issuer = issuer_of(&h.services, &actor).await;
    let receiver = h
        .services
        .create_business(&actor, None, BusinessDraft::named("Client"))
        .await
        .unwrap()
        .id();
    let invoice = h
        .services
        .create_invoice(
            &actor,
            issuer,
            invoice_to(receiver, vec![line("Work", dec!(1), dec!(100), Some(TaxRef::Rate(Some(dec!(19)))))]),
        )
        .await
        .unwrap();

    let pdf = h
        .services
        .invoice_pdf(&actor, issuer, invoice.invoice().id())
        .await
        .unwrap();
    let document: serde_json::Value = serde_json::from_slice(&pdf.bytes).unwrap();
    assert_eq!(document["tax_total"], "19.00");
    assert_eq!(pdf.file_name, format!("invoice-INV-{issuer}-1.pdf"));

    let sheet = h.services.export_invoices(&actor, issuer, Some("draft")).await.unwrap();
    let text = String::from_utf8(sheet.bytes).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.contains("Client"));

    let err = h.services.export_all_invoices(&actor, None, None).await.unwrap_err();
    assert!(matches!(err, DomainError::AccessDenied(_)));
}

#[tokio::test]
async fn invitations_and_user_management() {
    let h = harness();
    let (owner, owner_user) = tenant_user(&h.services, "boss@t.test").await;

    // Plain users cannot manage users.
    assert!(h.services.list_users(&owner, None).await.is_err());
    let boss = promote(&h.services, &owner_user).await;

    let invited = h
        .services
        .invite_user(&boss, "hire@t.test", Default::default())
        .await
        .unwrap();
    let link = h.email.sent().last().unwrap().body.clone();
    let token = invited.email_verification_token().unwrap();
    assert!(link.contains(token));

    let accepted = h.services.accept_invitation(token, "brand-new-pass").await.unwrap();
    assert!(accepted.email_verified());
    h.services.login("hire@t.test", "brand-new-pass", false).await.unwrap();

    let err = h.services.delete_user(&boss, boss.user_id).await.unwrap_err();
    assert_eq!(err, DomainError::validation("id", "You cannot delete your own account"));

    let err = h
        .services
        .update_user(
            &boss,
            invited.id(),
            UserUpdate {
                tenant_id: Some(invoicer_core::TenantId::new(999)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::AccessDenied(_)));

    let login = h.services.login("hire@t.test", "brand-new-pass", false).await.unwrap();
    let hire = h.services.authenticate(&login.token).await.unwrap().unwrap();
    h.services
        .update_user(
            &boss,
            invited.id(),
            UserUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(h.services.authenticate(&login.token).await.unwrap().is_none());
    assert!(h.services.actor_for(invited.id()).await.is_err());

    let err = h.services.profile(&hire).await.unwrap_err();
    assert_eq!(
        err,
        DomainError::access_denied("Your account is deactivated. Please contact the administrator.")
    );
}

#[tokio::test]
async fn logo_replacement_removes_the_previous_file() {
    let h = harness();
    let (actor, _) = tenant_user(&h.services, "logo@t.test").await;
    let issuer = issuer_of(&h.services, &actor).await;

    let err = h
        .services
        .upload_logo(&actor, issuer, "logo.exe", vec![1, 2, 3])
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { .. }));

    let first = h
        .services
        .upload_logo(&actor, issuer, "logo.png", vec![1, 2, 3])
        .await
        .unwrap();
    let first_path = first.logo().unwrap().to_string();
    assert!(h.logos.contains(&first_path));

    let cleared = h.services.remove_logo(&actor, issuer).await.unwrap();
    assert_eq!(cleared.logo(), None);
    assert!(h.logos.is_empty());
}

#[tokio::test]
async fn created_users_must_have_a_free_email() {
    let h = harness();
    let admin = platform_admin(&h.services).await;
    tenant_user(&h.services, "taken@t.test").await;

    let err = h
        .services
        .create_user(
            &admin,
            NewUserInput {
                email: " TAKEN@t.test ".to_string(),
                password: PASSWORD.to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));

    let staff = platform_staff(&h.services, &admin).await;
    let err = h
        .services
        .update_user(
            &admin,
            staff.user_id,
            UserUpdate {
                email: Some("taken@t.test".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_item_edits_are_all_kept() {
    let h = harness();
    let (actor, _) = tenant_user(&h.services, "crowd@t.test").await;
    let issuer = issuer_of(&h.services, &actor).await;
    let receiver = h
        .services
        .create_business(&actor, None, BusinessDraft::named("Client"))
        .await
        .unwrap()
        .id();
    let invoice = h
        .services
        .create_invoice(
            &actor,
            issuer,
            invoice_to(receiver, vec![line("Base", dec!(1), dec!(10), None)]),
        )
        .await
        .unwrap();
    let invoice_id = invoice.invoice().id();
    let base = invoice.items()[0].id();

    let adds: Vec<_> = (1..=16)
        .map(|n| {
            let services = Arc::clone(&h.services);
            let actor = actor.clone();
            tokio::spawn(async move {
                services
                    .add_item(
                        &actor,
                        invoice_id,
                        line(&format!("Line {n}"), dec!(1), dec!(5), Some(TaxRef::Rate(Some(dec!(19))))),
                    )
                    .await
            })
        })
        .collect();
    let bumps: Vec<_> = (2..=9)
        .map(|q| {
            let services = Arc::clone(&h.services);
            let actor = actor.clone();
            tokio::spawn(async move {
                services
                    .update_item(
                        &actor,
                        invoice_id,
                        base,
                        ItemPatchInput {
                            quantity: Some(rust_decimal::Decimal::from(q)),
                            ..Default::default()
                        },
                    )
                    .await
            })
        })
        .collect();

    for task in adds.into_iter().chain(bumps) {
        task.await.unwrap().unwrap();
    }

    let items = h.services.list_items(&actor, invoice_id).await.unwrap();
    assert_eq!(items.len(), 17);
    let mut positions: Vec<u32> = items.iter().map(|i| i.sort_order()).collect();
    positions.sort_unstable();
    positions.dedup();
    assert_eq!(positions.len(), 17);

    let stored = h.services.get_invoice(&actor, issuer, invoice_id).await.unwrap();
    let subtotal: rust_decimal::Decimal = items.iter().map(|i| i.subtotal()).sum();
    let total: rust_decimal::Decimal = items.iter().map(|i| i.total()).sum();
    assert_eq!(stored.invoice().subtotal(), subtotal);
    assert_eq!(stored.invoice().total(), total);
    // 16 lines of 5.95 on top of the base line.
    assert_eq!(total - items.iter().find(|i| i.id() == base).unwrap().total(), dec!(95.20));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn first_business_of_a_tenant_becomes_its_only_issuer() {
    let h = harness();
    let admin = platform_admin(&h.services).await;
    let tenant = h
        .services
        .create_tenant(
            &admin,
            NewTenant {
                name: "Fresh".to_string(),
                has_paid: false,
                is_admin: false,
            },
        )
        .await
        .unwrap();
    let tenant_id = tenant.id();
    let stale = h.services.store().tenant(tenant_id).await.unwrap().unwrap();
    assert_eq!(stale.issuer_business_id(), None);

    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let services = Arc::clone(&h.services);
            let admin = admin.clone();
            tokio::spawn(async move {
                services
                    .create_business(&admin, Some(tenant_id), BusinessDraft::named(format!("Shop {n}")))
                    .await
                    .map(|b| b.id())
            })
        })
        .collect();
    let mut created = Vec::new();
    for task in tasks {
        created.push(task.await.unwrap().unwrap());
    }

    let issuer = h
        .services
        .get_tenant(&admin, tenant_id)
        .await
        .unwrap()
        .issuer_business_id()
        .unwrap();
    assert!(created.contains(&issuer));

    // Writing back a copy read before the issuer existed keeps the issuer.
    h.services.store().update_tenant(stale).await.unwrap();
    let renamed = h
        .services
        .update_tenant(
            &admin,
            tenant_id,
            TenantPatch {
                name: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name(), "Renamed");
    assert_eq!(renamed.issuer_business_id(), Some(issuer));

    let reread = h.services.store().tenant(tenant_id).await.unwrap().unwrap();
    assert_eq!(reread.issuer_business_id(), Some(issuer));
}
