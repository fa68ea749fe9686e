// In crates/risk/src/sizer.rs

use crate::types::{LeverageTable, RiskProfile};
use crate::{Error, Result};
use core_types::{Signal, Sizing, TradingPair};
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Fixed-fractional position sizing with leverage caps.
///
/// The sizer risks a fixed percentage of the budget per trade and derives the
/// position notional from the signal's stop distance. It is stateless.
#[derive(Debug, Clone)]
pub struct RiskSizer {
    leverage: Arc<LeverageTable>,
}

impl RiskSizer {
    pub fn new(leverage: Arc<LeverageTable>) -> Self {
        Self { leverage }
    }

    /// The highest leverage allowed for `pair` under `profile`.
    pub fn leverage_cap(&self, pair: &TradingPair, profile: &RiskProfile) -> u32 {
        profile
            .max_leverage
            .min(self.leverage.multiplier(pair.volatility_tier))
            .min(pair.max_leverage)
    }

    /// Sizes a qualified signal.
    ///
    /// # Returns
    ///
    /// * `Ok(Sizing)`: risk amount, position notional and quantity, leverage and margin.
    /// * `Err(Error::InsufficientBudget)`: the notional is below the pair's minimum trade size.
    /// * `Err(Error::LeverageExceeded)`: holding the notional on the budget needs more
    ///   leverage than the effective cap.
    pub fn size(&self, signal: &Signal, pair: &TradingPair, profile: &RiskProfile) -> Result<Sizing> {
        let stop_fraction = signal.stop_fraction();
        if stop_fraction <= Decimal::ZERO {
            return Err(Error::InvalidParameters("signal has no stop distance".into()));
        }
        if profile.budget <= Decimal::ZERO {
            return Err(Error::InvalidParameters("budget must be positive".into()));
        }

        // --- Position Sizing Logic ---
        let risk_amount = profile.budget * profile.risk_per_trade_percent / Decimal::ONE_HUNDRED;
        let position_size = risk_amount / stop_fraction;

        if position_size < pair.min_trade_size {
            return Err(Error::InsufficientBudget {
                notional: position_size,
                minimum: pair.min_trade_size,
            });
        }

        // --- Leverage Logic ---
        let cap = self.leverage_cap(pair, profile);
        let required = (position_size / profile.budget)
            .ceil()
            .to_u32()
            .unwrap_or(u32::MAX)
            .max(1);
        if required > cap {
            return Err(Error::LeverageExceeded { required, cap });
        }
        let leverage = profile.default_leverage.clamp(required, cap);

        let sizing = Sizing {
            risk_amount,
            risk_percent: profile.risk_per_trade_percent,
            position_size,
            quantity: position_size / signal.entry_price,
            leverage,
            margin: position_size / Decimal::from(leverage),
        };

        tracing::debug!(
            symbol = %signal.symbol,
            risk_amount = %sizing.risk_amount,
            position_size = %sizing.position_size,
            leverage = sizing.leverage,
            "Signal sized."
        );

        Ok(sizing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::{
        AssetClass, ConfluenceFactor, MarketStructure, SetupType, Side, SignalId, Symbol,
        TimeFrame, UserId, VolatilityTier,
    };
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn pair(tier: VolatilityTier, max_leverage: u32, min_trade_size: Decimal) -> TradingPair {
        TradingPair {
            symbol: Symbol::from("SOLUSDT"),
            base_currency: "SOL".into(),
            quote_currency: "USDT".into(),
            asset_class: AssetClass::MidCap,
            volatility_tier: tier,
            liquidity_tier: 1,
            min_trade_size,
            max_leverage,
            maker_fee: dec!(0.02),
            taker_fee: dec!(0.05),
            is_active: true,
            stats: Default::default(),
        }
    }

    fn signal(entry: Decimal, stop: Decimal) -> Signal {
        let now = Utc::now();
        Signal {
            id: SignalId::new(),
            user_id: UserId(1),
            symbol: Symbol::from("SOLUSDT"),
            timeframe: TimeFrame::M15,
            setup_type: SetupType::OrderBlockReversal,
            side: if stop < entry { Side::Long } else { Side::Short },
            entry_price: entry,
            stop_loss: stop,
            take_profit: entry,
            confluence_factors: vec![ConfluenceFactor::OrderBlockBullish],
            market_structure: MarketStructure::Undefined,
            target_hint: None,
            created_at: now,
            valid_until: now,
            is_active: true,
            trade_id: None,
            rejection: None,
        }
    }

    fn sizer() -> RiskSizer {
        RiskSizer::new(Arc::new(LeverageTable::default()))
    }

    #[test]
    fn scenario_sizing_matches_fixed_fraction() {
        let profile = RiskProfile::with_budget(dec!(1000));
        let sizing = sizer()
            .size(&signal(dec!(100), dec!(98)), &pair(VolatilityTier::Low, 20, dec!(5)), &profile)
            .unwrap();
        assert_eq!(sizing.risk_amount, dec!(20));
        assert_eq!(sizing.position_size, dec!(1000));
        assert_eq!(sizing.quantity, dec!(10));
        assert_eq!(sizing.leverage, 10);
        assert_eq!(sizing.margin, dec!(100));
    }

    #[test]
    fn tiny_position_is_insufficient_budget() {
        let profile = RiskProfile::with_budget(dec!(10));
        let err = sizer()
            .size(&signal(dec!(100), dec!(98)), &pair(VolatilityTier::Low, 20, dec!(50)), &profile)
            .unwrap_err();
        assert_eq!(err, Error::InsufficientBudget { notional: dec!(10), minimum: dec!(50) });
    }

    #[test]
    fn tight_stop_on_volatile_pair_exceeds_leverage() {
        let mut profile = RiskProfile::with_budget(dec!(1000));
        profile.risk_per_trade_percent = dec!(10);
        // 100 at risk over a 1% stop is 10_000 notional: 10x on a 5x tier.
        let err = sizer()
            .size(&signal(dec!(100), dec!(99)), &pair(VolatilityTier::Extreme, 20, dec!(5)), &profile)
            .unwrap_err();
        assert_eq!(err, Error::LeverageExceeded { required: 10, cap: 5 });
    }

    #[test]
    fn leverage_cap_is_the_tightest_of_three() {
        let mut profile = RiskProfile::with_budget(dec!(1000));
        profile.max_leverage = 12;
        assert_eq!(sizer().leverage_cap(&pair(VolatilityTier::Low, 50, dec!(5)), &profile), 12);
        assert_eq!(sizer().leverage_cap(&pair(VolatilityTier::High, 50, dec!(5)), &profile), 10);
        assert_eq!(sizer().leverage_cap(&pair(VolatilityTier::Low, 3, dec!(5)), &profile), 3);
    }

    proptest! {
        #[test]
        fn sizing_identity_and_leverage_cap_hold(
            budget in 100u32..1_000_000,
            risk_bp in 10u32..500,
            stop_bp in 50u32..2_000,
            entry_cents in 100u32..10_000_000,
            tier_idx in 0usize..4,
            pair_cap in 1u32..125,
            user_cap in 1u32..125,
            default_lev in 1u32..50,
        ) {
            let tier = [VolatilityTier::Low, VolatilityTier::Medium, VolatilityTier::High, VolatilityTier::Extreme][tier_idx];
            let mut profile = RiskProfile::with_budget(Decimal::from(budget));
            profile.risk_per_trade_percent = Decimal::from(risk_bp) / dec!(100);
            profile.max_leverage = user_cap;
            profile.default_leverage = default_lev;
            let entry = Decimal::from(entry_cents) / dec!(100);
            let stop = entry - entry * Decimal::from(stop_bp) / dec!(10000);
            let pair = pair(tier, pair_cap, dec!(1));
            let sizer = sizer();

            if let Ok(sizing) = sizer.size(&signal(entry, stop), &pair, &profile) {
                let implied_risk = sizing.position_size * signal(entry, stop).stop_fraction();
                prop_assert!((implied_risk - sizing.risk_amount).abs() < dec!(0.0001));
                let cap = user_cap.min(LeverageTable::default().multiplier(tier)).min(pair_cap);
                prop_assert!(sizing.leverage <= cap);
                prop_assert!(sizing.leverage >= 1);
            }
        }
    }
}
