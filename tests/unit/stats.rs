//! Score-distribution behavior.

use promer::stats::{exponential, gumbel, logsum::logsum, nats_to_bits, LN2};

use super::helpers::assert_close;

#[test]
fn gumbel_survival_is_a_probability() {
    for x in [-100.0, -5.0, 0.0, 3.0, 10.0, 100.0] {
        let p = gumbel::surv(x, 2.0, 0.693);
        assert!((0.0..=1.0).contains(&p), "surv({x}) = {p}");
    }
}

#[test]
fn gumbel_deep_tail_stays_positive() {
    // Far right tail must not underflow to an exact zero too early
    let p = gumbel::surv(60.0, 0.0, 0.693);
    assert!(p > 0.0 && p < 1e-15);
}

#[test]
fn exponential_tail_base_point() {
    assert_close(exponential::surv(3.0, 3.0, 0.7), 1.0, 1e-12, "at tau");
    let one_bit_up = exponential::surv(4.0, 3.0, LN2 as f64);
    assert_close(one_bit_up, 0.5, 1e-6, "one bit past tau");
}

#[test]
fn logsum_is_commutative_and_monotone() {
    assert_close(logsum(-1.0, -2.0) as f64, logsum(-2.0, -1.0) as f64, 1e-7, "commutes");
    assert!(logsum(0.0, 0.0) > 0.0);
}

#[test]
fn nat_bit_conversion() {
    assert_close(nats_to_bits(LN2) as f64, 1.0, 1e-6, "ln2 nats is one bit");
}
