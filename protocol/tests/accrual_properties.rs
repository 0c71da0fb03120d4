use std::sync::Arc;

use proptest::prelude::*;

use accrue_protocol::config::PRECISION;
use accrue_protocol::ledger::{
    accrued_balance, accrued_interest, AccountAccrual, AccountId, AccrualLedger, AmountRequest, Capability,
    CapabilityRegistry, ManualClock,
};

/// 1e12 whole tokens at 18 decimals.
const MAX_PRINCIPAL: u128 = 1_000_000_000_000 * PRECISION;

fn ledger_with_clock(start: u64) -> (AccrualLedger, Arc<ManualClock>, AccountId) {
    let clock = Arc::new(ManualClock::new(start));
    let registry = Arc::new(CapabilityRegistry::new());
    let vault = AccountId::from("vault");
    registry.grant(&vault, Capability::MintBurn);
    let ledger = AccrualLedger::new(AccountId::from("ledger"), 0, clock.clone(), registry);
    (ledger, clock, vault)
}

proptest! {
    /// Materializing after t1 and again after t2 lands within one unit of
    /// materializing once after t1 + t2.
    #[test]
    fn split_materialization_matches_single(
        principal in 1u128..1_000_000,
        rate in 0u128..10_000_000_000,
        t1 in 0u64..10_000,
        t2 in 0u64..10_000,
    ) {
        let start = AccountAccrual::new(principal, rate, 0);

        let (once, _) = start.materialized(t1 + t2).unwrap();
        let (mid, _) = start.materialized(t1).unwrap();
        let (twice, _) = mid.materialized(t1 + t2).unwrap();

        prop_assert!(once.principal.abs_diff(twice.principal) <= 1);
    }

    /// At 18-decimal magnitudes splitting only adds the interest earned on
    /// the first leg's interest, plus rounding.
    #[test]
    fn split_materialization_bounded_at_scale(
        principal in PRECISION..MAX_PRINCIPAL,
        rate in 0u128..100_000_000_000,
        t1 in 0u64..10_000_000,
        t2 in 0u64..10_000_000,
    ) {
        let start = AccountAccrual::new(principal, rate, 0);

        let (once, _) = start.materialized(t1 + t2).unwrap();
        let (mid, first_leg) = start.materialized(t1).unwrap();
        let (twice, _) = mid.materialized(t1 + t2).unwrap();

        let compounding = accrued_interest(first_leg, rate, t2).unwrap();
        prop_assert!(twice.principal.abs_diff(once.principal) <= compounding + 2);
    }

    /// Second materialization at the same instant is a no-op.
    #[test]
    fn zero_time_idempotence(
        principal in 0u128..MAX_PRINCIPAL,
        rate in 0u128..1_000_000_000_000,
        last in 0u64..1_000_000,
        dt in 0u64..1_000_000,
    ) {
        let record = AccountAccrual::new(principal, rate, last);
        let (first, _) = record.materialized(last + dt).unwrap();
        let (second, delta) = first.materialized(last + dt).unwrap();
        prop_assert_eq!(delta, 0);
        prop_assert_eq!(first, second);
    }

    /// Balance never decreases with time and equals principal at dt = 0.
    #[test]
    fn balance_is_monotonic_in_time(
        principal in 0u128..MAX_PRINCIPAL,
        rate in 0u128..1_000_000_000_000,
        a in 0u64..10_000_000,
        b in 0u64..10_000_000,
    ) {
        let (early, late) = if a <= b { (a, b) } else { (b, a) };
        prop_assert_eq!(accrued_balance(principal, rate, 0, 0).unwrap(), principal);
        let at_early = accrued_balance(principal, rate, 0, early).unwrap();
        let at_late = accrued_balance(principal, rate, 0, late).unwrap();
        prop_assert!(principal <= at_early);
        prop_assert!(at_early <= at_late);
    }

    /// Transfers neither create nor destroy value, and an empty recipient
    /// always ends up with the sender's rate.
    #[test]
    fn transfer_conserves_and_inherits(
        sender_principal in 1u128..MAX_PRINCIPAL,
        sender_rate in 0u128..100_000_000_000,
        recipient_rate in 0u128..100_000_000_000,
        elapsed in 0u64..5_000_000,
        share in 0u32..=100,
    ) {
        let (mut ledger, clock, vault) = ledger_with_clock(1_000);
        let from = AccountId::from("from");
        let to = AccountId::from("to");

        ledger.mint(&vault, &from, sender_principal, sender_rate).unwrap();
        // Give the recipient a stale rate, then drain it.
        ledger.mint(&vault, &to, 1, recipient_rate).unwrap();
        ledger.burn(&vault, &to, AmountRequest::All).unwrap();
        clock.advance(elapsed);

        let before = ledger.balance_of(&from).unwrap() + ledger.balance_of(&to).unwrap();
        let amount = ledger.balance_of(&from).unwrap() * share as u128 / 100;
        ledger.transfer(&from, &to, AmountRequest::Exact(amount)).unwrap();
        let after = ledger.balance_of(&from).unwrap() + ledger.balance_of(&to).unwrap();

        prop_assert_eq!(before, after);
        prop_assert_eq!(ledger.account(&to).unwrap().personal_rate, sender_rate);
    }
}
