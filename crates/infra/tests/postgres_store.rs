//! Runs against a live database named by `INVOICER_TEST_DATABASE_URL`; every
//! test returns early when it is unset.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal_macros::dec;

use invoicer_core::{BusinessId, Entity, InvoiceId, UserId};
use invoicer_infra::{
    BackOfficeStore, CatalogStore, InvoiceStore, PartyStore, PostgresStore, Sequence, StoreError,
};
use invoicer_invoicing::{Invoice, InvoiceDraft, InvoiceItem, InvoiceNumber, InvoiceWithItems, ItemDraft};
use invoicer_parties::{Business, BusinessDraft, NewTenant, Tenant};

async fn store() -> Option<PostgresStore> {
    let url = std::env::var("INVOICER_TEST_DATABASE_URL").ok()?;
    Some(PostgresStore::connect(&url).await.unwrap())
}

struct Parties {
    tenant: Tenant,
    issuer: BusinessId,
    receiver: BusinessId,
}

async fn parties(store: &PostgresStore) -> Parties {
    let now = Utc::now();
    let id = store.next_id(Sequence::Tenant).await.unwrap();
    let tenant = store
        .insert_tenant(Tenant::create(id.into(), NewTenant::regular(format!("T{id}")), now).unwrap())
        .await
        .unwrap();
    let mut businesses = Vec::new();
    for name in ["Issuer", "Receiver"] {
        let id = store.next_id(Sequence::Business).await.unwrap();
        let business = Business::create(id.into(), tenant.id(), UserId::new(1), BusinessDraft::named(name), now)
            .unwrap();
        businesses.push(store.insert_business(business).await.unwrap().id());
    }
    Parties {
        tenant,
        issuer: businesses[0],
        receiver: businesses[1],
    }
}

async fn new_invoice(store: &PostgresStore, p: &Parties, number: InvoiceNumber) -> InvoiceWithItems {
    let date = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
    let status = store.status_by_code("draft").await.unwrap().unwrap();
    let id: InvoiceId = store.next_id(Sequence::Invoice).await.unwrap().into();
    let header = Invoice::create(
        id,
        number,
        InvoiceDraft {
            issuer_id: p.issuer,
            receiver_id: p.receiver,
            invoice_date: date,
            due_date: date,
            status_id: status.id(),
        },
        Utc::now(),
    );
    InvoiceWithItems::new(header, Vec::new()).unwrap()
}

async fn line(store: &PostgresStore, invoice_id: InvoiceId) -> InvoiceItem {
    let vat = store.tax_by_rate(Some(dec!(19))).await.unwrap().unwrap();
    InvoiceItem::create(
        store.next_id(Sequence::InvoiceItem).await.unwrap().into(),
        invoice_id,
        0,
        ItemDraft {
            description: "Work".to_string(),
            quantity: dec!(1),
            unit_price: dec!(100),
            article_id: None,
        },
        Some(&vat),
        Utc::now(),
    )
    .unwrap()
}

#[tokio::test]
async fn invoice_numbers_are_unique_per_issuer() {
    let Some(store) = store().await else { return };
    let p = parties(&store).await;

    let first = new_invoice(&store, &p, InvoiceNumber::format(p.issuer, 1)).await;
    store.insert_invoice(&first).await.unwrap();
    let again = new_invoice(&store, &p, InvoiceNumber::format(p.issuer, 1)).await;
    let err = store.insert_invoice(&again).await.unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(_)));

    let last = store.last_invoice_number(p.issuer).await.unwrap().unwrap();
    assert_eq!(last, InvoiceNumber::format(p.issuer, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mutations_are_serialized_per_invoice() {
    let Some(store) = store().await else { return };
    let store = Arc::new(store);
    let p = parties(&store).await;
    let aggregate = new_invoice(&store, &p, InvoiceNumber::format(p.issuer, 1)).await;
    store.insert_invoice(&aggregate).await.unwrap();
    let id = aggregate.invoice().id();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..5 {
                    let item = line(&store, id).await;
                    store
                        .mutate_invoice(
                            id,
                            Box::new(move |aggregate: &mut InvoiceWithItems| {
                                aggregate.add_item(item, Utc::now()).map(|_| ())
                            }),
                        )
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let loaded = store.load_invoice(id).await.unwrap().unwrap();
    assert_eq!(loaded.items().len(), 40);
    assert_eq!(loaded.invoice().total(), dec!(4760.00));
}

#[tokio::test]
async fn issuer_is_assigned_once_and_survives_stale_writes() {
    let Some(store) = store().await else { return };
    let p = parties(&store).await;
    let stale = p.tenant.clone();

    let tenant = store.assign_issuer_if_unset(stale.id(), p.issuer, Utc::now()).await.unwrap();
    assert_eq!(tenant.issuer_business_id(), Some(p.issuer));
    let tenant = store.assign_issuer_if_unset(stale.id(), p.receiver, Utc::now()).await.unwrap();
    assert_eq!(tenant.issuer_business_id(), Some(p.issuer));

    let written = store.update_tenant(stale).await.unwrap();
    assert_eq!(written.issuer_business_id(), Some(p.issuer));

    let err = store.delete_business(p.issuer).await.unwrap_err();
    assert!(matches!(err, StoreError::ReferentialViolation(_)));
}
