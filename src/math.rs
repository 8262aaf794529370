//! Canadian mortgage payment math.
//!
//! Canadian mortgage rates compound semi-annually regardless of payment
//! frequency: the annual nominal rate converts first to a semi-annual
//! effective rate and from there to the rate per payment period. Accelerated
//! frequencies keep the ordinary periodic rate and derive their amount from
//! the monthly payment instead (half for biweekly, a quarter for weekly),
//! which is what produces the extra monthly payment per year.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

use crate::decimal::{Money, Rate};
use crate::types::PaymentFrequency;

/// effective rate per payment period under semi-annual compounding
pub fn periodic_rate(annual: Rate, frequency: PaymentFrequency) -> Decimal {
    let nominal = annual.as_decimal();
    if nominal.is_zero() {
        return Decimal::ZERO;
    }

    let semi_annual = nominal / dec!(2);
    let effective_annual = (Decimal::ONE + semi_annual).powi(2) - Decimal::ONE;

    let periods = Decimal::from(frequency.periods_per_year());
    (Decimal::ONE + effective_annual).powd(Decimal::ONE / periods) - Decimal::ONE
}

/// level payment amount for a balance amortized over `amortization_months`
///
/// Accelerated frequencies divide a freshly computed monthly payment by 2 or
/// 4 rather than re-running the annuity at the accelerated period count.
/// Rounded once, to the cent, at the boundary.
pub fn calculate_payment(
    balance: Money,
    annual: Rate,
    amortization_months: u32,
    frequency: PaymentFrequency,
) -> Money {
    let raw = match frequency {
        PaymentFrequency::AcceleratedBiweekly => {
            monthly_payment_raw(balance, annual, amortization_months) / dec!(2)
        }
        PaymentFrequency::AcceleratedWeekly => {
            monthly_payment_raw(balance, annual, amortization_months) / dec!(4)
        }
        _ => {
            let rate = periodic_rate(annual, frequency);
            let total_payments = Decimal::from(amortization_months)
                * Decimal::from(frequency.periods_per_year())
                / dec!(12);
            annuity_payment(balance.as_decimal(), rate, total_payments)
        }
    };
    Money::from_decimal(raw)
}

/// monthly payment before rounding, used as the accelerated base
fn monthly_payment_raw(balance: Money, annual: Rate, amortization_months: u32) -> Decimal {
    let rate = periodic_rate(annual, PaymentFrequency::Monthly);
    annuity_payment(
        balance.as_decimal(),
        rate,
        Decimal::from(amortization_months),
    )
}

/// standard annuity formula P = r * PV / (1 - (1 + r)^-n)
fn annuity_payment(principal: Decimal, rate: Decimal, total_payments: Decimal) -> Decimal {
    if total_payments.is_zero() {
        return principal;
    }
    if rate.is_zero() {
        return principal / total_payments;
    }
    let discount = Decimal::ONE - (Decimal::ONE + rate).powd(-total_payments);
    rate * principal / discount
}

/// interest portion of a single payment against the current balance
pub fn interest_portion(balance: Money, annual: Rate, frequency: PaymentFrequency) -> Money {
    Money::from_decimal(balance.as_decimal() * periodic_rate(annual, frequency))
}

/// principal portion of a payment
pub fn principal_portion(payment: Money, interest: Money) -> Money {
    payment - interest
}

/// balance after applying a principal payment and any prepayment
pub fn remaining_balance(balance: Money, principal: Money, prepayment: Money) -> Money {
    (balance - principal - prepayment).max(Money::ZERO)
}

/// remaining amortization in months at the current payment amount
///
/// Closed form: n = -ln(1 - r * B / P) / ln(1 + r). Returns `None` when the
/// payment no longer covers the periodic interest, in which case the
/// amortization is undefined (trigger condition).
pub fn remaining_amortization_months(
    balance: Money,
    payment: Money,
    annual: Rate,
    frequency: PaymentFrequency,
) -> Option<u32> {
    if balance.is_zero() {
        return Some(0);
    }
    if !payment.is_positive() {
        return None;
    }

    let periods = Decimal::from(frequency.periods_per_year());
    let rate = periodic_rate(annual, frequency);

    if rate.is_zero() {
        let remaining_payments = balance.as_decimal() / payment.as_decimal();
        return months_from_payments(remaining_payments, periods);
    }

    let interest_only = balance.as_decimal() * rate;
    if payment.as_decimal() <= interest_only {
        return None;
    }

    let inner = Decimal::ONE - rate * balance.as_decimal() / payment.as_decimal();
    let remaining_payments = -inner.ln() / (Decimal::ONE + rate).ln();
    months_from_payments(remaining_payments, periods)
}

fn months_from_payments(remaining_payments: Decimal, periods_per_year: Decimal) -> Option<u32> {
    (remaining_payments / periods_per_year * dec!(12)).round().to_u32()
}

/// annual nominal rate at which a fixed payment covers exactly zero principal
///
/// The inverse of `periodic_rate`: the interest-only periodic rate
/// `payment / balance` converted back through effective-annual and
/// semi-annual form to a nominal semi-annually-compounded rate.
pub fn calculate_trigger_rate(
    payment: Money,
    balance: Money,
    frequency: PaymentFrequency,
) -> Rate {
    if balance.is_zero() {
        return Rate::ZERO;
    }
    let periodic = payment.as_decimal() / balance.as_decimal();
    let periods = Decimal::from(frequency.periods_per_year());

    let effective_annual = (Decimal::ONE + periodic).powd(periods) - Decimal::ONE;
    let semi_annual = (Decimal::ONE + effective_annual).sqrt().unwrap_or(Decimal::ONE) - Decimal::ONE;
    Rate::from_decimal(semi_annual * dec!(2))
}

/// true when the periodic interest at the effective rate meets or exceeds
/// the fixed payment amount
pub fn is_trigger_rate_hit(
    effective_annual: Rate,
    payment: Money,
    balance: Money,
    frequency: PaymentFrequency,
) -> bool {
    let interest = balance.as_decimal() * periodic_rate(effective_annual, frequency);
    interest >= payment.as_decimal()
}

/// split a month count into whole years and leftover months for display
pub fn months_to_years_and_months(months: u32) -> (u32, u32) {
    (months / 12, months % 12)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(p: &str) -> Rate {
        Rate::from_percent(p.parse().unwrap())
    }

    #[test]
    fn test_periodic_rate_semi_annual_compounding() {
        // 5.49% nominal: EAR = (1.02745)^2 - 1 = 5.565%, monthly ≈ 0.4524%
        let monthly = periodic_rate(pct("5.490"), PaymentFrequency::Monthly);
        assert!(monthly > dec!(0.00451) && monthly < dec!(0.00453), "got {monthly}");

        // accelerated frequencies share their ordinary counterpart's rate
        let biweekly = periodic_rate(pct("5.490"), PaymentFrequency::Biweekly);
        let accel = periodic_rate(pct("5.490"), PaymentFrequency::AcceleratedBiweekly);
        assert_eq!(biweekly, accel);

        assert_eq!(periodic_rate(Rate::ZERO, PaymentFrequency::Monthly), Decimal::ZERO);
    }

    #[test]
    fn test_monthly_payment_amount() {
        // $600k at 5.49% over 25 years lands near $3,659/month under
        // semi-annual compounding (US-style monthly compounding would give ~$3,682)
        let payment = calculate_payment(
            Money::from_major(600_000),
            pct("5.490"),
            300,
            PaymentFrequency::Monthly,
        );
        assert!(
            payment > Money::from_major(3_650) && payment < Money::from_major(3_670),
            "got {payment}"
        );
    }

    #[test]
    fn test_accelerated_is_half_of_monthly() {
        let balance = Money::from_major(500_000);
        let rate = pct("4.890");
        let monthly = calculate_payment(balance, rate, 300, PaymentFrequency::Monthly);
        let accel_bw = calculate_payment(balance, rate, 300, PaymentFrequency::AcceleratedBiweekly);
        let accel_w = calculate_payment(balance, rate, 300, PaymentFrequency::AcceleratedWeekly);

        // rounding happens once on each amount, so allow a cent of drift
        assert!((accel_bw * dec!(2) - monthly).abs() <= Money::from_cents(1));
        assert!((accel_w * dec!(4) - monthly).abs() <= Money::from_cents(2));

        // ordinary biweekly is smaller than the accelerated amount
        let biweekly = calculate_payment(balance, rate, 300, PaymentFrequency::Biweekly);
        assert!(biweekly < accel_bw);
    }

    #[test]
    fn test_zero_rate_payment() {
        let payment = calculate_payment(
            Money::from_major(120_000),
            Rate::ZERO,
            120,
            PaymentFrequency::Monthly,
        );
        assert_eq!(payment, Money::from_major(1_000));
    }

    #[test]
    fn test_amortization_round_trip() {
        // paying the computed amount every period for the full amortization
        // should drive the balance to (approximately) zero
        let ordinary = [
            PaymentFrequency::Monthly,
            PaymentFrequency::SemiMonthly,
            PaymentFrequency::Biweekly,
            PaymentFrequency::Weekly,
        ];
        let principal = Money::from_major(400_000);
        let rate = pct("5.190");
        let months = 300u32;

        for frequency in ordinary {
            let payment = calculate_payment(principal, rate, months, frequency);
            let r = periodic_rate(rate, frequency);
            let total = months * frequency.periods_per_year() / 12;

            let mut balance = principal.as_decimal();
            for _ in 0..total {
                let interest = balance * r;
                balance -= payment.as_decimal() - interest;
            }
            assert!(
                balance.abs() < payment.as_decimal(),
                "{frequency:?}: residual {balance}"
            );
        }
    }

    #[test]
    fn test_accelerated_pays_off_early() {
        let principal = Money::from_major(400_000);
        let rate = pct("5.190");
        let months = 300u32;
        let frequency = PaymentFrequency::AcceleratedBiweekly;

        let payment = calculate_payment(principal, rate, months, frequency);
        let r = periodic_rate(rate, frequency);
        let scheduled = months * frequency.periods_per_year() / 12;

        let mut balance = principal.as_decimal();
        let mut periods = 0u32;
        while balance > Decimal::ZERO && periods < scheduled {
            let interest = balance * r;
            balance -= payment.as_decimal() - interest;
            periods += 1;
        }
        assert!(
            periods < scheduled,
            "accelerated schedule should finish early, used all {periods} periods"
        );
    }

    #[test]
    fn test_interest_and_principal_split() {
        let balance = Money::from_major(600_000);
        let interest = interest_portion(balance, pct("5.490"), PaymentFrequency::Monthly);
        assert!(interest > Money::from_major(2_700) && interest < Money::from_major(2_720));

        let payment = Money::from_str_exact("3500.00").unwrap();
        let principal = principal_portion(payment, interest);
        assert_eq!(principal + interest, payment);

        let after = remaining_balance(balance, principal, Money::from_major(10_000));
        assert_eq!(after, balance - principal - Money::from_major(10_000));
    }

    #[test]
    fn test_remaining_balance_floors_at_zero() {
        let after = remaining_balance(
            Money::from_major(1_000),
            Money::from_major(800),
            Money::from_major(500),
        );
        assert_eq!(after, Money::ZERO);
    }

    #[test]
    fn test_remaining_amortization() {
        let balance = Money::from_major(600_000);
        let rate = pct("5.490");
        let payment = calculate_payment(balance, rate, 300, PaymentFrequency::Monthly);

        let months =
            remaining_amortization_months(balance, payment, rate, PaymentFrequency::Monthly)
                .unwrap();
        assert!((299..=301).contains(&months), "got {months}");

        // a larger payment shortens the schedule
        let bigger = payment + Money::from_major(1_000);
        let shorter =
            remaining_amortization_months(balance, bigger, rate, PaymentFrequency::Monthly)
                .unwrap();
        assert!(shorter < months);
    }

    #[test]
    fn test_remaining_amortization_undefined_past_trigger() {
        // $2,000 against $600k at 5.49% doesn't cover the ~$2,714 interest
        let months = remaining_amortization_months(
            Money::from_major(600_000),
            Money::from_major(2_000),
            pct("5.490"),
            PaymentFrequency::Monthly,
        );
        assert_eq!(months, None);
    }

    #[test]
    fn test_trigger_rate() {
        let payment = Money::from_major(3_500);
        let balance = Money::from_major(600_000);
        let trigger = calculate_trigger_rate(payment, balance, PaymentFrequency::Monthly);

        // periodic 3500/600000 ≈ 0.5833% converts back to roughly 7.1% nominal
        assert!(
            trigger.as_percent() > dec!(7.0) && trigger.as_percent() < dec!(7.2),
            "got {trigger}"
        );

        // below the trigger the payment still covers interest
        assert!(!is_trigger_rate_hit(pct("5.490"), payment, balance, PaymentFrequency::Monthly));
        // above it the payment no longer does
        assert!(is_trigger_rate_hit(pct("8.000"), payment, balance, PaymentFrequency::Monthly));
        // a basis point past the trigger the payment is underwater
        let just_past = Rate::from_decimal(trigger.as_decimal() + dec!(0.0001));
        assert!(is_trigger_rate_hit(just_past, payment, balance, PaymentFrequency::Monthly));
    }

    #[test]
    fn test_months_display_split() {
        assert_eq!(months_to_years_and_months(300), (25, 0));
        assert_eq!(months_to_years_and_months(287), (23, 11));
        assert_eq!(months_to_years_and_months(7), (0, 7));
    }
}
