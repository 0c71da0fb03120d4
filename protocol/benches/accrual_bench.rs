// Accrual benchmarks for the Accrue ledger.
//
// Covers the pure balance derivation and the mint/transfer hot paths, each
// of which materializes every account it touches.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use accrue_protocol::config::DEFAULT_INITIAL_RATE;
use accrue_protocol::ledger::{
    accrued_balance, AccountId, AccrualLedger, AmountRequest, Capability, CapabilityRegistry,
    ManualClock,
};

fn bench_accrued_balance(c: &mut Criterion) {
    c.bench_function("accrual/accrued_balance", |b| {
        b.iter(|| accrued_balance(1_000_000_000_000, DEFAULT_INITIAL_RATE, 0, 31_536_000));
    });
}

fn bench_transfers(c: &mut Criterion) {
    let mut group = c.benchmark_group("accrual/transfer_chain");

    for &accounts in &[10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(accounts as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(accounts),
            &accounts,
            |b, &accounts| {
                let ids: Vec<AccountId> = (0..accounts)
                    .map(|i| AccountId::from(format!("acct-{i}").as_str()))
                    .collect();
                b.iter(|| {
                    let clock = Arc::new(ManualClock::new(0));
                    let registry = Arc::new(CapabilityRegistry::new());
                    let vault = AccountId::from("vault");
                    registry.grant(&vault, Capability::MintBurn);
                    let mut ledger = AccrualLedger::new(
                        AccountId::from("ledger"),
                        DEFAULT_INITIAL_RATE,
                        clock.clone(),
                        registry,
                    );
                    ledger
                        .mint(&vault, &ids[0], 1_000_000_000, DEFAULT_INITIAL_RATE)
                        .unwrap();
                    for pair in ids.windows(2) {
                        clock.advance(60);
                        ledger
                            .transfer(&pair[0], &pair[1], AmountRequest::All)
                            .unwrap();
                    }
                    ledger
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_accrued_balance, bench_transfers);
criterion_main!(benches);
