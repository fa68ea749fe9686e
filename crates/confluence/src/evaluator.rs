// In crates/confluence/src/evaluator.rs

use crate::types::{ConfluenceTables, IndicatorSnapshot};
use crate::{Error, Result};
use core_types::{ConfluenceFactor, SetupType, Side, Signal, SignalId, TradingPair, UserId};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Per-call inputs that come from the user and the pair rather than the
/// static tables.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub user_id: UserId,
    pub pair: &'a TradingPair,
    pub enabled_setups: &'a [SetupType],
    /// The user's floor on reward ratio. Zero disables it.
    pub min_rr_ratio: Decimal,
    /// The user's floor on confluence. The stricter of this and the setup's minimum applies.
    pub min_confluence: usize,
}

impl<'a> EvaluationContext<'a> {
    /// A context with no user-level floors.
    pub fn new(user_id: UserId, pair: &'a TradingPair, enabled_setups: &'a [SetupType]) -> Self {
        Self { user_id, pair, enabled_setups, min_rr_ratio: Decimal::ZERO, min_confluence: 0 }
    }
}

/// Turns an indicator snapshot into a qualified `Signal` or a rejection.
///
/// The evaluator holds no mutable state. The same instance can be shared
/// across tasks analysing different pairs and timeframes.
#[derive(Debug, Clone)]
pub struct ConfluenceEvaluator {
    tables: Arc<ConfluenceTables>,
}

impl ConfluenceEvaluator {
    pub fn new(tables: Arc<ConfluenceTables>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &ConfluenceTables {
        &self.tables
    }

    /// Runs the full qualification pipeline on `snapshot`.
    pub fn evaluate(&self, snapshot: &IndicatorSnapshot, ctx: EvaluationContext<'_>) -> Result<Signal> {
        let factors: BTreeSet<ConfluenceFactor> = snapshot.factors.iter().copied().collect();

        // 1. Pick the setup.
        let setup = self.match_setup(&factors, ctx.enabled_setups).ok_or(Error::NoSetup)?;
        let rule = self.tables.setups.rule(setup);

        // 2. Count the evidence.
        let required = rule.min_confluence.max(ctx.min_confluence);
        if factors.len() < required {
            return Err(Error::InsufficientConfluence { setup, found: factors.len(), required });
        }
        if rule.rr_ratio < ctx.min_rr_ratio {
            return Err(Error::RrBelowMinimum { setup, rr_ratio: rule.rr_ratio, minimum: ctx.min_rr_ratio });
        }

        // 3. Check the stop distance against the asset-class band.
        if snapshot.entry <= Decimal::ZERO || snapshot.stop <= Decimal::ZERO {
            return Err(Error::InvalidLevels(format!(
                "entry {} and stop {} must be positive",
                snapshot.entry, snapshot.stop
            )));
        }
        let distance = (snapshot.entry - snapshot.stop).abs();
        let stop_percent = distance / snapshot.entry * Decimal::ONE_HUNDRED;
        let band = self.tables.stop_bands.band(ctx.pair.asset_class);
        if distance.is_zero() || !band.contains(stop_percent) {
            return Err(Error::StopOutOfBand {
                stop_percent,
                min: band.min_percent,
                max: band.max_percent,
                asset_class: ctx.pair.asset_class,
            });
        }

        // 4. Derive the target from the setup's fixed ratio.
        let side = if snapshot.stop < snapshot.entry { Side::Long } else { Side::Short };
        let take_profit = snapshot.entry + side.sign() * distance * rule.rr_ratio;

        // 5. Emit, valid for a fixed number of candles.
        let validity = snapshot.timeframe.duration() * self.tables.validity_candles as i32;
        let signal = Signal {
            id: SignalId::new(),
            user_id: ctx.user_id,
            symbol: snapshot.symbol.clone(),
            timeframe: snapshot.timeframe,
            setup_type: setup,
            side,
            entry_price: snapshot.entry,
            stop_loss: snapshot.stop,
            take_profit,
            confluence_factors: factors.into_iter().collect(),
            market_structure: snapshot.market_structure,
            target_hint: snapshot.target,
            created_at: snapshot.timestamp,
            valid_until: snapshot.timestamp + validity,
            is_active: true,
            trade_id: None,
            rejection: None,
        };

        tracing::debug!(
            symbol = %signal.symbol,
            timeframe = %signal.timeframe,
            setup = %setup,
            side = %side,
            entry = %signal.entry_price,
            stop = %signal.stop_loss,
            take_profit = %signal.take_profit,
            "Snapshot qualified as a signal."
        );

        Ok(signal)
    }

    /// Returns the strongest enabled setup whose signature is present.
    /// Strength is the setup's required confluence; ties go to the first in
    /// `SetupType::ALL`.
    pub fn match_setup(
        &self,
        factors: &BTreeSet<ConfluenceFactor>,
        enabled: &[SetupType],
    ) -> Option<SetupType> {
        let mut best: Option<(SetupType, usize)> = None;
        for setup in SetupType::ALL {
            if !enabled.contains(&setup) || !signature_present(setup, factors) {
                continue;
            }
            let strength = self.tables.setups.rule(setup).min_confluence;
            match best {
                Some((_, current)) if current >= strength => {}
                _ => best = Some((setup, strength)),
            }
        }
        best.map(|(setup, _)| setup)
    }
}

fn signature_present(setup: SetupType, factors: &BTreeSet<ConfluenceFactor>) -> bool {
    match setup {
        SetupType::OrderBlockReversal => {
            factors.contains(&ConfluenceFactor::OrderBlockBullish)
                || factors.contains(&ConfluenceFactor::OrderBlockBearish)
        }
        SetupType::LiquidityGrab => factors.contains(&ConfluenceFactor::LiquidityGrab),
        SetupType::PocBounce => factors.contains(&ConfluenceFactor::PocBounce),
    }
}
