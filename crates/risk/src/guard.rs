// In crates/risk/src/guard.rs

use crate::portfolio::PortfolioState;
use crate::types::RiskProfile;
use crate::{Error, Result};
use rust_decimal::Decimal;

/// Account-level admission control.
///
/// Runs four checks in a fixed order and stops at the first failure:
/// 1. concurrent trades,
/// 2. trades opened today,
/// 3. realized loss today,
/// 4. trailing weekly drawdown.
///
/// The guard only reads the state it is given. Serializing calls per user
/// is the caller's job.
#[derive(Debug, Default, Clone, Copy)]
pub struct PortfolioRiskGuard;

impl PortfolioRiskGuard {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, state: &PortfolioState, profile: &RiskProfile) -> Result<()> {
        if state.active_trades >= profile.max_concurrent_trades {
            return Err(Error::ConcurrentTradeLimitExceeded {
                active: state.active_trades,
                max: profile.max_concurrent_trades,
            });
        }

        if state.trades_today >= profile.max_daily_trades {
            return Err(Error::DailyTradeLimitExceeded {
                today: state.trades_today,
                max: profile.max_daily_trades,
            });
        }

        let daily_limit = profile.budget * profile.max_daily_loss_percent / Decimal::ONE_HUNDRED;
        if state.realized_pnl_today <= -daily_limit {
            return Err(Error::DailyLossLimitExceeded {
                pnl: state.realized_pnl_today,
                limit: daily_limit,
            });
        }

        if state.weekly_drawdown_percent >= profile.max_weekly_drawdown_percent {
            return Err(Error::WeeklyDrawdownExceeded {
                drawdown_percent: state.weekly_drawdown_percent,
                limit_percent: profile.max_weekly_drawdown_percent,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn state(active: u32, today: u32, pnl: Decimal, dd: Decimal) -> PortfolioState {
        PortfolioState {
            active_trades: active,
            trades_today: today,
            realized_pnl_today: pnl,
            weekly_equity: vec![(Utc::now(), dec!(1000))],
            weekly_drawdown_percent: dd,
        }
    }

    fn profile() -> RiskProfile {
        RiskProfile::with_budget(dec!(1000))
    }

    #[test]
    fn fourth_concurrent_trade_is_rejected() {
        let err = PortfolioRiskGuard::new()
            .check(&state(3, 3, Decimal::ZERO, Decimal::ZERO), &profile())
            .unwrap_err();
        assert_eq!(err, Error::ConcurrentTradeLimitExceeded { active: 3, max: 3 });
    }

    #[test]
    fn checks_short_circuit_in_order() {
        // Every limit is breached; only the first is reported.
        let err = PortfolioRiskGuard::new()
            .check(&state(5, 9, dec!(-500), dec!(50)), &profile())
            .unwrap_err();
        assert_eq!(err.code(), "concurrent_trade_limit_exceeded");

        let err = PortfolioRiskGuard::new()
            .check(&state(0, 5, dec!(-500), dec!(50)), &profile())
            .unwrap_err();
        assert_eq!(err.code(), "daily_trade_limit_exceeded");

        let err = PortfolioRiskGuard::new()
            .check(&state(0, 0, dec!(-50), dec!(50)), &profile())
            .unwrap_err();
        assert_eq!(err, Error::DailyLossLimitExceeded { pnl: dec!(-50), limit: dec!(50) });

        let err = PortfolioRiskGuard::new()
            .check(&state(0, 0, dec!(-49.99), dec!(15)), &profile())
            .unwrap_err();
        assert_eq!(err.code(), "weekly_drawdown_exceeded");
    }

    #[test]
    fn healthy_portfolio_passes() {
        assert!(PortfolioRiskGuard::new()
            .check(&state(2, 4, dec!(-10), dec!(14.9)), &profile())
            .is_ok());
    }
}
