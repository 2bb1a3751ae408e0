use rand::rngs::StdRng;
use rust_decimal::prelude::ToPrimitive;

use crate::error::FundModelError;
use crate::fund::company::{Company, CompanyStatus, FailureReason, FinancingRound};
use crate::fund::distributions::{sample_moment, to_money, to_years, uniform};
use crate::fund::events::CashFlowEvent;
use crate::fund::parameters::StageDefinition;
use crate::types::*;
use crate::FundModelResult;

/// What happened at a milestone.
#[derive(Debug, Clone, PartialEq)]
pub enum MilestoneOutcome {
    /// Raised the next round; the fund may follow on
    Advanced(FinancingRound),
    Exited { proceeds: Money, multiple: f64 },
    Failed(FailureReason),
    NoEvent,
}

/// Result of one call to [`advance`].
#[derive(Debug, Clone)]
pub struct Advance {
    pub company: Company,
    pub outcome: MilestoneOutcome,
    pub events: Vec<CashFlowEvent>,
    /// Time of the next milestone while the company stays active
    pub next_milestone: Option<Years>,
}

/// Draw how long a company spends in `stage` before its next milestone.
pub fn draw_time_in_stage(stage: &StageDefinition, rng: &mut StdRng) -> FundModelResult<Years> {
    let years = sample_moment(rng, &stage.time_in_stage, "time_in_stage")?;
    to_years(years, "time_in_stage")
}

/// Advance one company through the milestone due at `now`.
///
/// Draws are made in a fixed order (outcome, then step-up or exit multiple,
/// then the next time-in-stage) so a seeded trial replays exactly. The final
/// stage cannot advance: success there is an exit.
pub fn advance(
    company: &Company,
    stages: &[StageDefinition],
    max_company_life: Option<Years>,
    now: Years,
    rng: &mut StdRng,
) -> FundModelResult<Advance> {
    if !company.is_active() {
        return Err(FundModelError::InvalidInput {
            field: "company".into(),
            reason: format!("Company {} is already terminated", company.id),
        });
    }
    let stage = stages
        .get(company.stage)
        .ok_or_else(|| FundModelError::InvalidInput {
            field: "company.stage".into(),
            reason: format!("Stage index {} out of range", company.stage),
        })?;

    let mut next = company.clone();

    if max_company_life.is_some_and(|max_life| now - company.entry_time > max_life) {
        fail(&mut next, FailureReason::LifespanExceeded, now);
        return Ok(Advance {
            company: next,
            outcome: MilestoneOutcome::Failed(FailureReason::LifespanExceeded),
            events: Vec::new(),
            next_milestone: None,
        });
    }

    let is_final = company.stage + 1 >= stages.len();
    let u = uniform(rng);
    let success = stage.success_probability;
    let exit = success + stage.exit_probability;
    let failure = exit + stage.failure_probability;

    let outcome = if u < success && !is_final {
        let step_up = sample_moment(rng, &stage.step_up, "step_up")?;
        let post_money = to_money(
            company.post_money.to_f64().unwrap_or(0.0) * step_up,
            "post_money",
        )?;
        let new_money = (post_money * stage.round_dilution).round_dp(MONEY_DP);
        let round = FinancingRound {
            pre_money: post_money - new_money,
            post_money,
            new_money,
            step_up,
        };
        next.stage += 1;
        next.post_money = post_money;
        next.prior_kpi = company.kpi;
        next.kpi = step_up;
        next.kpi_as_of = now;
        MilestoneOutcome::Advanced(round)
    } else if u < exit {
        let multiple = sample_moment(rng, &stage.exit_multiple, "exit_multiple")?;
        let proceeds = to_money(
            company.invested.to_f64().unwrap_or(0.0) * multiple,
            "exit_proceeds",
        )?;
        next.status = CompanyStatus::Exited;
        next.exit_multiple = Some(multiple);
        next.exit_proceeds = proceeds;
        next.terminated_at = Some(now);
        MilestoneOutcome::Exited { proceeds, multiple }
    } else if u < failure {
        fail(&mut next, FailureReason::Probabilistic, now);
        MilestoneOutcome::Failed(FailureReason::Probabilistic)
    } else {
        MilestoneOutcome::NoEvent
    };

    let events = match &outcome {
        MilestoneOutcome::Exited { proceeds, .. } => {
            vec![CashFlowEvent::exit(company.id, *proceeds, now)]
        }
        _ => Vec::new(),
    };

    let next_milestone = if next.is_active() {
        let stage_now = &stages[next.stage];
        Some(now + draw_time_in_stage(stage_now, rng)?)
    } else {
        None
    };

    Ok(Advance {
        company: next,
        outcome,
        events,
        next_milestone,
    })
}

fn fail(company: &mut Company, reason: FailureReason, now: Years) {
    company.status = CompanyStatus::Failed;
    company.failure_reason = Some(reason);
    company.terminated_at = Some(now);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fund::parameters::MomentDistribution;
    use rand::SeedableRng;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn stage(name: &str, success: f64, failure: f64, exit: f64) -> StageDefinition {
        StageDefinition {
            name: name.into(),
            success_probability: success,
            failure_probability: failure,
            exit_probability: exit,
            time_in_stage: MomentDistribution::new(1.0, 0.0),
            step_up: MomentDistribution::new(2.0, 0.0),
            exit_multiple: MomentDistribution::new(3.0, 0.0),
            round_dilution: dec!(0.2),
            entry: None,
        }
    }

    fn company() -> Company {
        Company::new(7, 0, dec!(0), dec!(1000000), dec!(0.1), dec!(10000000))
    }

    #[test]
    fn test_certain_success_advances_with_step_up() {
        let stages = vec![stage("Seed", 1.0, 0.0, 0.0), stage("A", 0.0, 0.0, 1.0)];
        let mut rng = StdRng::seed_from_u64(1);
        let adv = advance(&company(), &stages, None, dec!(1.5), &mut rng).unwrap();

        match adv.outcome {
            MilestoneOutcome::Advanced(round) => {
                assert_eq!(round.post_money, dec!(20000000));
                assert_eq!(round.new_money, dec!(4000000));
                assert_eq!(round.pre_money, dec!(16000000));
            }
            other => panic!("expected advance, got {other:?}"),
        }
        assert_eq!(adv.company.stage, 1);
        assert_eq!(adv.company.kpi, 2.0);
        assert_eq!(adv.company.prior_kpi, 1.0);
        assert_eq!(adv.company.kpi_as_of, dec!(1.5));
        assert!(adv.events.is_empty());
        assert_eq!(adv.next_milestone, Some(dec!(2.5)));
    }

    #[test]
    fn test_exit_emits_one_positive_event() {
        let stages = vec![stage("Seed", 0.0, 0.0, 1.0)];
        let mut rng = StdRng::seed_from_u64(1);
        let adv = advance(&company(), &stages, None, dec!(3), &mut rng).unwrap();
        assert_eq!(adv.company.status, CompanyStatus::Exited);
        assert_eq!(adv.events.len(), 1);
        assert_eq!(adv.events[0].amount, dec!(3000000));
        assert_eq!(adv.events[0].time, dec!(3));
        assert_eq!(adv.next_milestone, None);
    }

    #[test]
    fn test_success_on_final_stage_is_exit() {
        let stages = vec![stage("Growth", 1.0, 0.0, 0.0)];
        let mut rng = StdRng::seed_from_u64(1);
        let adv = advance(&company(), &stages, None, dec!(2), &mut rng).unwrap();
        assert!(matches!(adv.outcome, MilestoneOutcome::Exited { .. }));
        assert_eq!(adv.company.exit_proceeds, dec!(3000000));
    }

    #[test]
    fn test_failure_is_write_off_without_cash() {
        let stages = vec![stage("Seed", 0.0, 1.0, 0.0)];
        let mut rng = StdRng::seed_from_u64(1);
        let adv = advance(&company(), &stages, None, dec!(2), &mut rng).unwrap();
        assert_eq!(adv.company.status, CompanyStatus::Failed);
        assert_eq!(adv.company.failure_reason, Some(FailureReason::Probabilistic));
        assert!(adv.events.is_empty());
        assert_eq!(adv.company.exit_proceeds, Decimal::ZERO);
    }

    #[test]
    fn test_remainder_probability_is_no_event() {
        let stages = vec![stage("Seed", 0.0, 0.0, 0.0), stage("A", 0.0, 0.0, 0.0)];
        let mut rng = StdRng::seed_from_u64(1);
        let adv = advance(&company(), &stages, None, dec!(2), &mut rng).unwrap();
        assert_eq!(adv.outcome, MilestoneOutcome::NoEvent);
        assert!(adv.company.is_active());
        assert_eq!(adv.company.stage, 0);
        assert_eq!(adv.next_milestone, Some(dec!(3)));
    }

    #[test]
    fn test_lifespan_overrun_is_forced_failure() {
        let stages = vec![stage("Seed", 1.0, 0.0, 0.0), stage("A", 0.0, 0.0, 1.0)];
        let mut rng = StdRng::seed_from_u64(1);
        let adv = advance(&company(), &stages, Some(dec!(5)), dec!(5.5), &mut rng).unwrap();
        assert_eq!(
            adv.outcome,
            MilestoneOutcome::Failed(FailureReason::LifespanExceeded)
        );
        assert!(!adv.company.is_active());
    }

    #[test]
    fn test_terminated_company_rejected() {
        let stages = vec![stage("Seed", 1.0, 0.0, 0.0)];
        let mut c = company();
        c.status = CompanyStatus::Exited;
        let mut rng = StdRng::seed_from_u64(1);
        assert!(advance(&c, &stages, None, dec!(1), &mut rng).is_err());
    }

    #[test]
    fn test_seeded_advance_is_reproducible() {
        let mut stages = vec![stage("Seed", 0.4, 0.3, 0.1), stage("A", 0.5, 0.2, 0.0)];
        stages[0].step_up = MomentDistribution::new(2.0, 1.0);
        stages[0].time_in_stage = MomentDistribution::new(1.5, 0.5);
        let a = advance(&company(), &stages, None, dec!(1), &mut StdRng::seed_from_u64(9)).unwrap();
        let b = advance(&company(), &stages, None, dec!(1), &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a.outcome, b.outcome);
        assert_eq!(a.company, b.company);
        assert_eq!(a.next_milestone, b.next_milestone);
    }
}
