use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::fund::parameters::StageDefinition;
use crate::types::*;

/// Index of a company within its trial's portfolio.
pub type CompanyId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyStatus {
    Active,
    Exited,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Drew a failure at a milestone
    Probabilistic,
    /// Still private past the maximum company life
    LifespanExceeded,
}

/// A priced round raised when a company advances a stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinancingRound {
    pub pre_money: Money,
    pub post_money: Money,
    pub new_money: Money,
    pub step_up: f64,
}

/// One portfolio company as the fund sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub entry_stage: usize,
    pub stage: usize,
    pub status: CompanyStatus,
    /// False once the fund has passed on a round; no further follow-ons
    pub supported: bool,
    /// Cumulative capital the fund has put in
    pub invested: Money,
    /// Fund ownership after the latest round
    pub ownership: Rate,
    /// Post-money valuation of the latest round
    pub post_money: Money,
    /// Step-up of the latest round (1.0 before any round)
    pub kpi: f64,
    /// When `kpi` was observed
    pub kpi_as_of: Years,
    /// KPI held before the latest observation
    pub prior_kpi: f64,
    pub entry_time: Years,
    pub rounds: u32,
    pub exit_multiple: Option<f64>,
    pub exit_proceeds: Money,
    pub terminated_at: Option<Years>,
    pub failure_reason: Option<FailureReason>,
}

impl Company {
    pub fn new(
        id: CompanyId,
        stage: usize,
        entry_time: Years,
        check: Money,
        ownership: Rate,
        post_money: Money,
    ) -> Self {
        Company {
            id,
            entry_stage: stage,
            stage,
            status: CompanyStatus::Active,
            supported: true,
            invested: check,
            ownership,
            post_money,
            kpi: 1.0,
            kpi_as_of: entry_time,
            prior_kpi: 1.0,
            entry_time,
            rounds: 0,
            exit_multiple: None,
            exit_proceeds: Decimal::ZERO,
            terminated_at: None,
            failure_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CompanyStatus::Active
    }

    /// KPI a peer could observe strictly before `now`.
    pub fn kpi_before(&self, now: Years) -> f64 {
        if self.kpi_as_of < now {
            self.kpi
        } else {
            self.prior_kpi
        }
    }

    /// Pro-rata entitlement in `round`: current ownership of the new money.
    pub fn pro_rata(&self, round: &FinancingRound) -> Money {
        (self.ownership * round.new_money).round_dp(MONEY_DP)
    }

    /// Apply the fund's participation in `round`. `amount` of zero is a
    /// pass: the fund is diluted and stops supporting the company.
    pub fn participate(&mut self, round: &FinancingRound, amount: Money) {
        if !round.post_money.is_zero() {
            self.ownership = (self.ownership * round.pre_money + amount) / round.post_money;
        }
        self.invested += amount;
        self.rounds += 1;
        if amount.is_zero() {
            self.supported = false;
        }
    }

    /// Mark-to-model value of an open position. Zero once terminated.
    pub fn residual_value(&self) -> Money {
        if self.is_active() {
            (self.post_money * self.ownership).round_dp(MONEY_DP)
        } else {
            Decimal::ZERO
        }
    }

    pub fn outcome(&self, stages: &[StageDefinition]) -> CompanyOutcome {
        let stage_name = |i: usize| {
            stages
                .get(i)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| format!("stage {i}"))
        };
        CompanyOutcome {
            id: self.id,
            entry_stage: stage_name(self.entry_stage),
            final_stage: stage_name(self.stage),
            final_stage_index: self.stage,
            status: self.status,
            invested: self.invested,
            proceeds: self.exit_proceeds,
            exit_multiple: self.exit_multiple,
            residual_value: self.residual_value(),
            rounds: self.rounds,
            failure_reason: self.failure_reason,
        }
    }
}

/// Terminal (or horizon) summary of one company, kept per trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyOutcome {
    pub id: CompanyId,
    pub entry_stage: String,
    pub final_stage: String,
    pub final_stage_index: usize,
    pub status: CompanyStatus,
    pub invested: Money,
    pub proceeds: Money,
    pub exit_multiple: Option<f64>,
    pub residual_value: Money,
    pub rounds: u32,
    pub failure_reason: Option<FailureReason>,
}
