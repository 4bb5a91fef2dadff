use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::{NaiveDate, Utc};
use invoicer_core::{BusinessId, Decimal, InvoiceId, InvoiceItemId, InvoiceStatusId, TaxId};
use invoicer_invoicing::{
    calculate_line, tax_breakdown, Invoice, InvoiceDraft, InvoiceItem, InvoiceNumber, InvoiceWithItems,
    ItemDraft, ItemPatch, Tax, TaxDraft,
};

fn vat() -> Tax {
    Tax::create(
        TaxId::new(1),
        TaxDraft {
            rate: Some(Decimal::from(19)),
            name: None,
        },
        Utc::now(),
    )
    .unwrap()
}

fn invoice_with(lines: usize, tax: &Tax) -> InvoiceWithItems {
    let header = Invoice::create(
        InvoiceId::new(1),
        InvoiceNumber::format(BusinessId::new(1), 1),
        InvoiceDraft {
            issuer_id: BusinessId::new(1),
            receiver_id: BusinessId::new(2),
            invoice_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            status_id: InvoiceStatusId::new(1),
        },
        Utc::now(),
    );
    let items = (0..lines)
        .map(|i| {
            InvoiceItem::create(
                InvoiceItemId::new(i as i64 + 1),
                InvoiceId::new(1),
                i as u32,
                ItemDraft {
                    description: format!("Line {i}"),
                    quantity: Decimal::new(i as i64 % 7 + 1, 0),
                    unit_price: Decimal::new(12_345 + i as i64, 2),
                    article_id: None,
                },
                Some(tax),
                Utc::now(),
            )
            .unwrap()
        })
        .collect();
    InvoiceWithItems::new(header, items).unwrap()
}

fn bench_line_calculation(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_calculation");
    group.sample_size(1000);

    group.bench_function("taxed_line", |b| {
        let quantity = Decimal::new(3, 0);
        let price = Decimal::new(3333, 3);
        let rate = Some(Decimal::from(19));
        b.iter(|| black_box(calculate_line(black_box(quantity), black_box(price), rate).unwrap()));
    });

    group.finish();
}

fn bench_item_update(c: &mut Criterion) {
    let tax = vat();
    let mut group = c.benchmark_group("item_update_reaggregate");

    for lines in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &lines, |b, &lines| {
            let mut aggregate = invoice_with(lines, &tax);
            let target = InvoiceItemId::new(lines as i64 / 2 + 1);
            b.iter(|| {
                let patch = ItemPatch {
                    quantity: Some(Decimal::new(2, 0)),
                    ..ItemPatch::default()
                };
                aggregate.update_item(target, patch, Some(&tax), Utc::now()).unwrap();
                black_box(aggregate.invoice().total());
            });
        });
    }

    group.finish();
}

fn bench_tax_breakdown(c: &mut Criterion) {
    let tax = vat();
    let mut group = c.benchmark_group("tax_breakdown");

    for lines in [10usize, 1000] {
        let aggregate = invoice_with(lines, &tax);
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &aggregate, |b, aggregate| {
            b.iter(|| black_box(tax_breakdown(aggregate.items()).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_line_calculation, bench_item_update, bench_tax_breakdown);
criterion_main!(benches);
