use rand::rngs::StdRng;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use statrs::distribution::LogNormal;

use crate::error::FundModelError;
use crate::fund::parameters::MomentDistribution;
use crate::types::{Money, Years, MONEY_DP};
use crate::FundModelResult;

/// Decimal places kept on event times (well below a second).
const TIME_DP: u32 = 6;

/// `(mu, sigma)` of the log-normal whose mean and standard deviation match
/// `dist`.
pub fn lognormal_params(dist: &MomentDistribution) -> (f64, f64) {
    let variance_ratio = (dist.std_dev / dist.mean).powi(2);
    let sigma_sq = (1.0 + variance_ratio).ln();
    let mu = dist.mean.ln() - sigma_sq / 2.0;
    (mu, sigma_sq.sqrt())
}

/// Draw from the moment-matched log-normal. A zero standard deviation is a
/// point mass at the mean and consumes no randomness.
pub fn sample_moment(
    rng: &mut StdRng,
    dist: &MomentDistribution,
    field: &str,
) -> FundModelResult<f64> {
    if dist.std_dev == 0.0 {
        return Ok(dist.mean);
    }
    let (mu, sigma) = lognormal_params(dist);
    let ln = LogNormal::new(mu, sigma).map_err(|e| FundModelError::InvalidConfiguration {
        field: field.into(),
        reason: format!("Invalid LogNormal parameters: {e}"),
    })?;
    Ok(rng.sample(ln))
}

/// Uniform draw on [0, 1).
pub fn uniform(rng: &mut StdRng) -> f64 {
    rng.gen::<f64>()
}

/// Convert a sampled amount to cents.
pub fn to_money(value: f64, field: &str) -> FundModelResult<Money> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(MONEY_DP))
        .ok_or_else(|| FundModelError::InvalidInput {
            field: field.into(),
            reason: format!("Sampled value {value} is not representable"),
        })
}

/// Convert a sampled duration to fractional years.
pub fn to_years(value: f64, field: &str) -> FundModelResult<Years> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(TIME_DP))
        .ok_or_else(|| FundModelError::InvalidInput {
            field: field.into(),
            reason: format!("Sampled duration {value} is not representable"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    const SEED: u64 = 42;

    #[test]
    fn test_lognormal_params_match_moments() {
        let (mu, sigma) = lognormal_params(&MomentDistribution::new(2.0, 1.0));
        let mean = (mu + sigma * sigma / 2.0).exp();
        let var = ((sigma * sigma).exp() - 1.0) * (2.0 * mu + sigma * sigma).exp();
        assert!((mean - 2.0).abs() < 1e-12);
        assert!((var.sqrt() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_mean_converges() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let dist = MomentDistribution::new(2.5, 1.0);
        let n = 50_000;
        let mut total = 0.0;
        for _ in 0..n {
            let x = sample_moment(&mut rng, &dist, "step_up").unwrap();
            assert!(x > 0.0);
            total += x;
        }
        let mean = total / n as f64;
        assert!((mean - 2.5).abs() < 0.03, "mean={mean}");
    }

    #[test]
    fn test_zero_std_dev_is_point_mass() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let dist = MomentDistribution::new(1.75, 0.0);
        assert_eq!(sample_moment(&mut rng, &dist, "x").unwrap(), 1.75);
    }

    #[test]
    fn test_to_money_rounds_to_cents() {
        assert_eq!(to_money(1234.5678, "x").unwrap(), dec!(1234.57));
        assert!(to_money(f64::NAN, "x").is_err());
    }
}
