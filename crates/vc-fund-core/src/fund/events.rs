use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::fund::company::CompanyId;
use crate::types::{Money, Years};

/// What produced a cash flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CashFlowSource {
    ManagementFee,
    CapitalCall,
    Investment { company: CompanyId },
    Exit { company: CompanyId },
    /// Exit proceeds held back in the fund for reinvestment
    Recycled { company: CompanyId },
}

/// One timestamped, signed cash flow. Negative amounts are outflows: fees
/// and investments leave the fund, capital calls leave the LPs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowEvent {
    pub amount: Money,
    /// Fractional years since fund inception
    pub time: Years,
    pub source: CashFlowSource,
}

impl CashFlowEvent {
    pub fn capital_call(amount: Money, time: Years) -> Self {
        Self {
            amount: -amount,
            time,
            source: CashFlowSource::CapitalCall,
        }
    }

    pub fn management_fee(amount: Money, time: Years) -> Self {
        Self {
            amount: -amount,
            time,
            source: CashFlowSource::ManagementFee,
        }
    }

    pub fn investment(company: CompanyId, amount: Money, time: Years) -> Self {
        Self {
            amount: -amount,
            time,
            source: CashFlowSource::Investment { company },
        }
    }

    pub fn exit(company: CompanyId, proceeds: Money, time: Years) -> Self {
        Self {
            amount: proceeds,
            time,
            source: CashFlowSource::Exit { company },
        }
    }

    /// Proceeds of an exit that stay in fund cash. The exit itself is still
    /// reported in full; this entry withholds `amount` from distribution.
    pub fn recycled(company: CompanyId, amount: Money, time: Years) -> Self {
        Self {
            amount: -amount,
            time,
            source: CashFlowSource::Recycled { company },
        }
    }

    /// The company this flow belongs to, if any.
    pub fn company(&self) -> Option<CompanyId> {
        match self.source {
            CashFlowSource::Investment { company }
            | CashFlowSource::Exit { company }
            | CashFlowSource::Recycled { company } => Some(company),
            _ => None,
        }
    }

    /// True for flows between the fund and its companies.
    pub fn is_company_flow(&self) -> bool {
        matches!(
            self.source,
            CashFlowSource::Investment { .. } | CashFlowSource::Exit { .. }
        )
    }

    /// Fund year (1-based) the event falls in.
    pub fn fund_year(&self) -> u32 {
        fund_year(self.time)
    }
}

/// Fund year (1-based) containing time `t`. Year `n` covers `(n-1, n]`;
/// inception belongs to year 1.
pub fn fund_year(t: Years) -> u32 {
    t.ceil().to_u32().unwrap_or(0).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fund_year_boundaries() {
        assert_eq!(fund_year(dec!(0)), 1);
        assert_eq!(fund_year(dec!(0.999)), 1);
        assert_eq!(fund_year(dec!(1)), 1);
        assert_eq!(fund_year(dec!(1.000001)), 2);
        assert_eq!(fund_year(dec!(2)), 2);
        assert_eq!(fund_year(dec!(9.5)), 10);
    }

    #[test]
    fn test_year_end_flow_stays_in_closing_year() {
        let fee = CashFlowEvent::management_fee(dec!(2), dec!(3));
        assert_eq!(fee.fund_year(), 3);
    }

    #[test]
    fn test_recycled_entry_is_not_a_company_flow() {
        let r = CashFlowEvent::recycled(4, dec!(9), dec!(2.5));
        assert_eq!(r.amount, dec!(-9));
        assert_eq!(r.company(), Some(4));
        assert!(!r.is_company_flow());
        assert!(CashFlowEvent::exit(4, dec!(9), dec!(2.5)).is_company_flow());
    }

    #[test]
    fn test_constructors_sign_amounts() {
        assert_eq!(CashFlowEvent::capital_call(dec!(10), dec!(0)).amount, dec!(-10));
        assert_eq!(CashFlowEvent::investment(3, dec!(5), dec!(0)).amount, dec!(-5));
        assert_eq!(CashFlowEvent::exit(3, dec!(7), dec!(2)).amount, dec!(7));
        assert_eq!(CashFlowEvent::exit(3, dec!(7), dec!(2)).company(), Some(3));
        assert_eq!(CashFlowEvent::management_fee(dec!(1), dec!(0)).company(), None);
    }
}
