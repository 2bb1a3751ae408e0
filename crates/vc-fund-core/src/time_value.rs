use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::error::FundModelError;
use crate::types::{Money, Multiple};
use crate::FundModelResult;

const CONVERGENCE_THRESHOLD: f64 = 1e-9;
const MAX_IRR_ITERATIONS: u32 = 100;
const MAX_BISECTION_ITERATIONS: u32 = 200;
const IRR_LOWER_BOUND: f64 = -0.9999;
const IRR_UPPER_BOUND: f64 = 100.0;

/// Net present value of periodic cash flows, first flow undiscounted.
pub fn npv(rate: f64, cash_flows: &[f64]) -> f64 {
    let one_plus_r = 1.0 + rate;
    let mut discount = 1.0;
    let mut total = 0.0;
    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount *= one_plus_r;
        }
        total += cf / discount;
    }
    total
}

fn dnpv(rate: f64, cash_flows: &[f64]) -> f64 {
    let one_plus_r = 1.0 + rate;
    cash_flows
        .iter()
        .enumerate()
        .skip(1)
        .map(|(t, cf)| -(t as f64) * cf / one_plus_r.powi(t as i32 + 1))
        .sum()
}

/// Periodic internal rate of return of annual cash flows.
///
/// Money stays in Decimal up to this boundary; the root search runs in f64
/// because `(1 + r)^t` overflows 128-bit decimals for the rates a venture
/// trial can produce. Newton-Raphson from 10% first, bisection on
/// `[-99.99%, 10000%]` when Newton leaves the domain or stalls.
///
/// Returns `InsufficientData` when the flows have no sign change and
/// `ConvergenceFailure` when no root could be bracketed.
pub fn irr(cash_flows: &[Money]) -> FundModelResult<f64> {
    let flows: Vec<f64> = cash_flows
        .iter()
        .map(|cf| cf.to_f64().unwrap_or(0.0))
        .collect();

    let has_negative = flows.iter().any(|cf| *cf < 0.0);
    let has_positive = flows.iter().any(|cf| *cf > 0.0);
    if flows.len() < 2 || !has_negative || !has_positive {
        return Err(FundModelError::InsufficientData(
            "IRR requires at least one negative and one positive cash flow".into(),
        ));
    }

    let mut rate = 0.1;
    for _ in 0..MAX_IRR_ITERATIONS {
        let value = npv(rate, &flows);
        if value.abs() < CONVERGENCE_THRESHOLD {
            return Ok(rate);
        }
        let slope = dnpv(rate, &flows);
        if slope == 0.0 || !slope.is_finite() {
            break;
        }
        let next = rate - value / slope;
        if !next.is_finite() || next <= IRR_LOWER_BOUND || next >= IRR_UPPER_BOUND {
            break;
        }
        if (next - rate).abs() < CONVERGENCE_THRESHOLD {
            return Ok(next);
        }
        rate = next;
    }

    bisect_irr(&flows)
}

fn bisect_irr(flows: &[f64]) -> FundModelResult<f64> {
    let mut lo = IRR_LOWER_BOUND;
    let mut hi = IRR_UPPER_BOUND;
    let mut f_lo = npv(lo, flows);
    let f_hi = npv(hi, flows);

    if !f_lo.is_finite() || !f_hi.is_finite() || f_lo.signum() == f_hi.signum() {
        return Err(FundModelError::ConvergenceFailure {
            function: "IRR".into(),
            iterations: MAX_IRR_ITERATIONS,
            last_delta: Decimal::from_f64(f_hi).unwrap_or_default(),
        });
    }

    let mut mid = 0.5 * (lo + hi);
    for _ in 0..MAX_BISECTION_ITERATIONS {
        mid = 0.5 * (lo + hi);
        let f_mid = npv(mid, flows);
        if f_mid.abs() < CONVERGENCE_THRESHOLD || (hi - lo) < CONVERGENCE_THRESHOLD {
            return Ok(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }
    Ok(mid)
}

/// Distributions over contributions. `DivisionByZero` when nothing was
/// contributed.
pub fn multiple(distributed: Money, contributed: Money) -> FundModelResult<Multiple> {
    if contributed.is_zero() {
        return Err(FundModelError::DivisionByZero {
            context: "multiple denominator (contributed capital)".into(),
        });
    }
    Ok(distributed / contributed)
}
