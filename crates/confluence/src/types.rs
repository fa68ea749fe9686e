// In crates/confluence/src/types.rs

use chrono::{DateTime, Utc};
use core_types::{AssetClass, ConfluenceFactor, MarketStructure, SetupType, Symbol, TimeFrame};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Indicator output for one (pair, timeframe) at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: Symbol,
    pub timeframe: TimeFrame,
    pub timestamp: DateTime<Utc>,
    pub factors: Vec<ConfluenceFactor>,
    #[serde(default)]
    pub market_structure: MarketStructure,
    pub entry: Decimal,
    pub stop: Decimal,
    #[serde(default)]
    pub target: Option<Decimal>,
}

/// Fixed reward ratio and minimum evidence for one setup type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupRule {
    pub rr_ratio: Decimal,
    pub min_confluence: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupTable {
    pub order_block_reversal: SetupRule,
    pub liquidity_grab: SetupRule,
    pub poc_bounce: SetupRule,
}

impl SetupTable {
    pub fn rule(&self, setup: SetupType) -> &SetupRule {
        match setup {
            SetupType::OrderBlockReversal => &self.order_block_reversal,
            SetupType::LiquidityGrab => &self.liquidity_grab,
            SetupType::PocBounce => &self.poc_bounce,
        }
    }
}

impl Default for SetupTable {
    fn default() -> Self {
        Self {
            order_block_reversal: SetupRule { rr_ratio: dec!(4.0), min_confluence: 3 },
            liquidity_grab: SetupRule { rr_ratio: dec!(5.0), min_confluence: 4 },
            poc_bounce: SetupRule { rr_ratio: dec!(3.0), min_confluence: 3 },
        }
    }
}

/// Inclusive range of allowed stop distances, in percent of entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StopBand {
    pub min_percent: Decimal,
    pub max_percent: Decimal,
}

impl StopBand {
    pub fn contains(&self, percent: Decimal) -> bool {
        percent >= self.min_percent && percent <= self.max_percent
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopBandTable {
    pub major: StopBand,
    pub mid_cap: StopBand,
    pub small_cap: StopBand,
    pub meme: StopBand,
}

impl StopBandTable {
    pub fn band(&self, class: AssetClass) -> StopBand {
        match class {
            AssetClass::Major => self.major,
            AssetClass::MidCap => self.mid_cap,
            AssetClass::SmallCap => self.small_cap,
            AssetClass::Meme => self.meme,
        }
    }
}

impl Default for StopBandTable {
    fn default() -> Self {
        Self {
            major: StopBand { min_percent: dec!(2.0), max_percent: dec!(3.0) },
            mid_cap: StopBand { min_percent: dec!(4.0), max_percent: dec!(6.0) },
            small_cap: StopBand { min_percent: dec!(8.0), max_percent: dec!(12.0) },
            meme: StopBand { min_percent: dec!(15.0), max_percent: dec!(20.0) },
        }
    }
}

/// The immutable lookup tables the evaluator works from. Built once when the
/// engine starts and shared by reference afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceTables {
    #[serde(default)]
    pub setups: SetupTable,
    #[serde(default)]
    pub stop_bands: StopBandTable,
    /// How many candles of the signal's timeframe it stays valid for.
    #[serde(default = "default_validity_candles")]
    pub validity_candles: u32,
}

fn default_validity_candles() -> u32 { 3 }

impl Default for ConfluenceTables {
    fn default() -> Self {
        Self {
            setups: SetupTable::default(),
            stop_bands: StopBandTable::default(),
            validity_candles: default_validity_candles(),
        }
    }
}

impl ConfluenceTables {
    /// Checks the tables for values that would make the evaluator misbehave.
    pub fn validate(&self) -> std::result::Result<(), String> {
        for setup in SetupType::ALL {
            let rule = self.setups.rule(setup);
            if rule.rr_ratio <= Decimal::ZERO {
                return Err(format!("rr_ratio for {setup} must be positive"));
            }
            if rule.min_confluence == 0 {
                return Err(format!("min_confluence for {setup} must be at least 1"));
            }
        }
        for class in [AssetClass::Major, AssetClass::MidCap, AssetClass::SmallCap, AssetClass::Meme] {
            let band = self.stop_bands.band(class);
            if band.min_percent <= Decimal::ZERO || band.min_percent > band.max_percent {
                return Err(format!("stop band for {class:?} is not a positive, ordered range"));
            }
        }
        if self.validity_candles == 0 {
            return Err("validity_candles must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ConfluenceTables::default().validate().is_ok());
    }

    #[test]
    fn inverted_band_is_rejected() {
        let mut tables = ConfluenceTables::default();
        tables.stop_bands.meme = StopBand { min_percent: dec!(20), max_percent: dec!(15) };
        assert!(tables.validate().is_err());
    }

    #[test]
    fn band_is_inclusive() {
        let band = StopBandTable::default().band(AssetClass::Major);
        assert!(band.contains(dec!(2)));
        assert!(band.contains(dec!(3)));
        assert!(!band.contains(dec!(3.01)));
        assert!(!band.contains(dec!(1.99)));
    }
}
