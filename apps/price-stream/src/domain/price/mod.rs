//! Price Record Types
//!
//! Domain types for normalized price observations. Every accepted stream
//! tick or poll result is reduced to a [`PriceUpdate`], then merged with
//! the previously cached record for the symbol into a fresh immutable
//! [`PriceRecord`]. Records are superseded, never mutated.
//!
//! # Merge rules
//!
//! - 24h change / percent change come from the update when present,
//!   otherwise they are diffed against the previous record's price
//!   (zero when no previous record exists).
//! - 24h high/low come from the update when present, otherwise they are
//!   the running max/min of the previous high/low and the new price.
//!   Within a subscription session they only widen, never narrow.
//! - Volume carries forward from the previous record when the update
//!   lacks it.
//! - The timestamp is the update's own when present, otherwise the local
//!   observation time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A symbol string (market identifier, e.g. a trading pair like `BTC-USD`).
pub type Symbol = String;

// =============================================================================
// Price Update
// =============================================================================

/// A single normalized inbound price observation.
///
/// Produced by the tick codec for stream messages and by the REST client
/// for poll results. Only `symbol` and `price` are guaranteed; both
/// transports may omit the 24h statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceUpdate {
    /// Market symbol this observation pertains to.
    pub symbol: Symbol,
    /// Observed price.
    pub price: Decimal,
    /// 24h absolute price change, when the source provides it.
    pub change_24h: Option<Decimal>,
    /// 24h percentage price change, when the source provides it.
    pub change_percent_24h: Option<Decimal>,
    /// 24h high, when the source provides it.
    pub high_24h: Option<Decimal>,
    /// 24h low, when the source provides it.
    pub low_24h: Option<Decimal>,
    /// 24h traded volume, when the source provides it.
    pub volume_24h: Option<Decimal>,
    /// Source timestamp of the observation, when the source provides it.
    pub timestamp: Option<DateTime<Utc>>,
}

impl PriceUpdate {
    /// Create an update carrying only a symbol and price.
    #[must_use]
    pub const fn bare(symbol: Symbol, price: Decimal) -> Self {
        Self {
            symbol,
            price,
            change_24h: None,
            change_percent_24h: None,
            high_24h: None,
            low_24h: None,
            volume_24h: None,
            timestamp: None,
        }
    }

    /// Whether the observed price is usable (strictly positive).
    #[must_use]
    pub fn has_positive_price(&self) -> bool {
        self.price > Decimal::ZERO
    }
}

// =============================================================================
// Price Record
// =============================================================================

/// The most recent complete price observation for a symbol.
///
/// Immutable once constructed; the next accepted observation for the same
/// symbol produces a new record via [`PriceRecord::next`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Market symbol.
    pub symbol: Symbol,
    /// Last observed price.
    pub price: Decimal,
    /// 24h absolute price change.
    pub change_24h: Decimal,
    /// 24h percentage price change.
    pub change_percent_24h: Decimal,
    /// 24h high (running max within the session when the source omits it).
    pub high_24h: Decimal,
    /// 24h low (running min within the session when the source omits it).
    pub low_24h: Decimal,
    /// 24h traded volume.
    pub volume_24h: Decimal,
    /// Point in time of the observation.
    pub timestamp: DateTime<Utc>,
}

impl PriceRecord {
    /// Merge an inbound observation with the previously cached record.
    ///
    /// `observed_at` is the local receive time, used when the update
    /// carries no timestamp of its own.
    #[must_use]
    pub fn next(prev: Option<&Self>, update: &PriceUpdate, observed_at: DateTime<Utc>) -> Self {
        let price = update.price;

        let change_24h = update
            .change_24h
            .unwrap_or_else(|| prev.map_or(Decimal::ZERO, |p| price - p.price));

        let change_percent_24h = update
            .change_percent_24h
            .unwrap_or_else(|| prev.map_or(Decimal::ZERO, |p| percent_change(p.price, price)));

        let high_24h = update
            .high_24h
            .unwrap_or_else(|| prev.map_or(price, |p| p.high_24h.max(price)));

        let low_24h = update
            .low_24h
            .unwrap_or_else(|| prev.map_or(price, |p| p.low_24h.min(price)));

        let volume_24h = update
            .volume_24h
            .unwrap_or_else(|| prev.map_or(Decimal::ZERO, |p| p.volume_24h));

        Self {
            symbol: update.symbol.clone(),
            price,
            change_24h,
            change_percent_24h,
            high_24h,
            low_24h,
            volume_24h,
            timestamp: update.timestamp.unwrap_or(observed_at),
        }
    }
}

/// Percentage change from `previous` to `current`.
///
/// Returns zero when `previous` is zero or negative (no meaningful base).
#[must_use]
pub fn percent_change(previous: Decimal, current: Decimal) -> Decimal {
    if previous <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (current - previous) / previous * Decimal::ONE_HUNDRED
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn first_record_has_zero_change_and_price_bounds() {
        let update = PriceUpdate::bare("BTC-USD".to_string(), dec(50_000));
        let record = PriceRecord::next(None, &update, at(1));

        assert_eq!(record.symbol, "BTC-USD");
        assert_eq!(record.price, dec(50_000));
        assert_eq!(record.change_24h, Decimal::ZERO);
        assert_eq!(record.change_percent_24h, Decimal::ZERO);
        assert_eq!(record.high_24h, dec(50_000));
        assert_eq!(record.low_24h, dec(50_000));
        assert_eq!(record.volume_24h, Decimal::ZERO);
        assert_eq!(record.timestamp, at(1));
    }

    #[test]
    fn second_record_diffs_against_previous() {
        let first = PriceRecord::next(
            None,
            &PriceUpdate::bare("BTC-USD".to_string(), dec(50_000)),
            at(1),
        );
        let second = PriceRecord::next(
            Some(&first),
            &PriceUpdate::bare("BTC-USD".to_string(), dec(51_000)),
            at(2),
        );

        assert_eq!(second.change_24h, dec(1_000));
        assert_eq!(second.change_percent_24h, dec(2));
        assert_eq!(second.high_24h, dec(51_000));
        assert_eq!(second.low_24h, dec(50_000));
    }

    #[test]
    fn update_provided_stats_win_over_running_values() {
        let first = PriceRecord::next(
            None,
            &PriceUpdate::bare("ETH-USD".to_string(), dec(3_000)),
            at(1),
        );
        let update = PriceUpdate {
            symbol: "ETH-USD".to_string(),
            price: dec(3_100),
            change_24h: Some(dec(50)),
            change_percent_24h: Some(Decimal::new(164, 2)),
            high_24h: Some(dec(3_200)),
            low_24h: Some(dec(2_900)),
            volume_24h: Some(dec(1_234)),
            timestamp: Some(at(10)),
        };
        let second = PriceRecord::next(Some(&first), &update, at(99));

        assert_eq!(second.change_24h, dec(50));
        assert_eq!(second.change_percent_24h, Decimal::new(164, 2));
        assert_eq!(second.high_24h, dec(3_200));
        assert_eq!(second.low_24h, dec(2_900));
        assert_eq!(second.volume_24h, dec(1_234));
        assert_eq!(second.timestamp, at(10));
    }

    #[test]
    fn volume_carries_forward_when_update_lacks_it() {
        let mut update = PriceUpdate::bare("BTC-USD".to_string(), dec(50_000));
        update.volume_24h = Some(dec(777));
        let first = PriceRecord::next(None, &update, at(1));

        let second = PriceRecord::next(
            Some(&first),
            &PriceUpdate::bare("BTC-USD".to_string(), dec(50_500)),
            at(2),
        );
        assert_eq!(second.volume_24h, dec(777));
    }

    #[test]
    fn observation_time_used_when_update_has_no_timestamp() {
        let update = PriceUpdate::bare("BTC-USD".to_string(), dec(1));
        let record = PriceRecord::next(None, &update, at(42));
        assert_eq!(record.timestamp, at(42));
    }

    #[test]
    fn percent_change_zero_base_is_zero() {
        assert_eq!(percent_change(Decimal::ZERO, dec(100)), Decimal::ZERO);
        assert_eq!(percent_change(dec(-5), dec(100)), Decimal::ZERO);
    }

    #[test]
    fn percent_change_matches_formula() {
        assert_eq!(percent_change(dec(50_000), dec(51_000)), dec(2));
        assert_eq!(percent_change(dec(200), dec(150)), dec(-25));
    }

    #[test]
    fn non_positive_price_detected() {
        let update = PriceUpdate::bare("BTC-USD".to_string(), Decimal::ZERO);
        assert!(!update.has_positive_price());
        let update = PriceUpdate::bare("BTC-USD".to_string(), dec(1));
        assert!(update.has_positive_price());
    }

    proptest! {
        /// High/low only widen across a session of bare ticks.
        #[test]
        fn high_low_bound_every_price_seen(prices in prop::collection::vec(1u64..10_000_000, 1..50)) {
            let mut record: Option<PriceRecord> = None;
            let mut seen = Vec::new();

            for (i, raw) in prices.iter().enumerate() {
                let price = Decimal::from(*raw);
                seen.push(price);
                let update = PriceUpdate::bare("BTC-USD".to_string(), price);
                #[allow(clippy::cast_possible_wrap)]
                let next = PriceRecord::next(record.as_ref(), &update, at(i as i64));
                record = Some(next);
            }

            let record = record.unwrap();
            for price in &seen {
                prop_assert!(record.high_24h >= *price);
                prop_assert!(record.low_24h <= *price);
            }
        }

        /// Percent change between consecutive ticks matches (p1-p0)/p0*100.
        #[test]
        fn percent_change_between_ticks(p0 in 1u64..1_000_000, p1 in 1u64..1_000_000) {
            let first = PriceRecord::next(
                None,
                &PriceUpdate::bare("BTC-USD".to_string(), Decimal::from(p0)),
                at(1),
            );
            let second = PriceRecord::next(
                Some(&first),
                &PriceUpdate::bare("BTC-USD".to_string(), Decimal::from(p1)),
                at(2),
            );

            let expected = (Decimal::from(p1) - Decimal::from(p0)) / Decimal::from(p0)
                * Decimal::ONE_HUNDRED;
            prop_assert_eq!(second.change_percent_24h, expected);
        }
    }
}
