use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::fund::company::{Company, CompanyId};
use crate::fund::parameters::FollowOnStrategy;
use crate::types::*;

/// Performance tier under a tiered conviction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvictionTier {
    Tier1,
    Tier2,
    Tier3,
}

impl ConvictionTier {
    fn index(self) -> usize {
        match self {
            ConvictionTier::Tier1 => 0,
            ConvictionTier::Tier2 => 1,
            ConvictionTier::Tier3 => 2,
        }
    }
}

/// KPI of one ranked company.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeerKpi {
    pub id: CompanyId,
    pub kpi: f64,
}

/// Read-only view of the portfolio used to rank a follow-on request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Ranked companies in portfolio insertion order
    pub peers: Vec<PeerKpi>,
}

impl PortfolioSnapshot {
    pub fn from_kpis(peers: Vec<PeerKpi>) -> Self {
        Self { peers }
    }

    /// Snapshot at milestone time `now` for `requester`. Terminated
    /// companies are left out. Peers contribute the KPI they held strictly
    /// before `now`; the requester contributes the KPI realized at this
    /// milestone.
    pub fn at(companies: &[Company], requester: CompanyId, now: Years) -> Self {
        let peers = companies
            .iter()
            .filter(|c| c.is_active())
            .map(|c| PeerKpi {
                id: c.id,
                kpi: if c.id == requester {
                    c.kpi
                } else {
                    c.kpi_before(now)
                },
            })
            .collect();
        Self { peers }
    }

    /// Midpoint percentile rank of `id` in `[0, 1)`, highest KPI ranked
    /// highest. Ties keep insertion order.
    pub fn percentile_rank(&self, id: CompanyId) -> Option<f64> {
        let mut order: Vec<&PeerKpi> = self.peers.iter().collect();
        order.sort_by(|a, b| {
            b.kpi
                .partial_cmp(&a.kpi)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let n = order.len() as f64;
        order
            .iter()
            .position(|p| p.id == id)
            .map(|i| (n - i as f64 - 0.5) / n)
    }
}

/// Tier for a percentile rank. Cutoffs partition `[0, 1)`.
pub fn conviction_tier(rank: f64, top_cutoff: f64, bottom_cutoff: f64) -> ConvictionTier {
    if rank >= top_cutoff {
        ConvictionTier::Tier1
    } else if rank >= bottom_cutoff {
        ConvictionTier::Tier2
    } else {
        ConvictionTier::Tier3
    }
}

/// Sizing decision for one follow-on request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FollowOnDecision {
    pub amount: Money,
    pub rate: Rate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<ConvictionTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,
}

/// Size a follow-on for `company` given its pro-rata `round_size`.
///
/// Pure: depends only on the snapshot, the request and the strategy. A
/// requester missing from the snapshot gets nothing under a tiered strategy.
pub fn decide_followon(
    snapshot: &PortfolioSnapshot,
    company: CompanyId,
    round_size: Money,
    strategy: &FollowOnStrategy,
) -> FollowOnDecision {
    match strategy {
        FollowOnStrategy::Flat { rate } => FollowOnDecision {
            amount: (round_size * rate).round_dp(MONEY_DP),
            rate: *rate,
            tier: None,
            percentile: None,
        },
        FollowOnStrategy::Tiered {
            top_cutoff,
            bottom_cutoff,
            tier_rates,
        } => match snapshot.percentile_rank(company) {
            Some(rank) => {
                let tier = conviction_tier(rank, *top_cutoff, *bottom_cutoff);
                let rate = tier_rates[tier.index()];
                FollowOnDecision {
                    amount: (round_size * rate).round_dp(MONEY_DP),
                    rate,
                    tier: Some(tier),
                    percentile: Some(rank),
                }
            }
            None => FollowOnDecision {
                amount: Decimal::ZERO,
                rate: Decimal::ZERO,
                tier: None,
                percentile: None,
            },
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
