//! Sanity checks for liquidation and market data.
//!
//! Warnings are logged and the record is kept; errors drop the record
//! before it can corrupt downstream aggregates.

/// Sanity bounds per asset. Assets not listed fall back to
/// `DEFAULT_PRICE_BOUNDS`.
const PRICE_BOUNDS: &[(&str, (f64, f64))] = &[
    ("BTC", (10_000.0, 500_000.0)),
    ("ETH", (500.0, 50_000.0)),
    ("SOL", (5.0, 1_000.0)),
    ("DOGE", (0.01, 5.0)),
    ("ARB", (0.1, 50.0)),
    ("OP", (0.1, 50.0)),
    ("AVAX", (5.0, 500.0)),
    ("LINK", (1.0, 500.0)),
    ("SUI", (0.1, 50.0)),
    ("APT", (1.0, 100.0)),
    ("INJ", (1.0, 200.0)),
    ("TIA", (1.0, 100.0)),
    ("SEI", (0.01, 10.0)),
    ("WLD", (0.1, 50.0)),
];

const DEFAULT_PRICE_BOUNDS: (f64, f64) = (0.0001, 1_000_000.0);

/// Result of a validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Logs warnings and errors through tracing and returns validity.
    pub fn log(&self) -> bool {
        for warning in &self.warnings {
            tracing::warn!("validation warning: {}", warning);
        }
        for error in &self.errors {
            tracing::error!("validation error: {}", error);
        }
        self.is_valid()
    }
}

pub struct DataValidator;

impl DataValidator {
    /// Clusters above this are treated as corrupt and dropped.
    pub const MAX_CLUSTER_SIZE_USD: f64 = 10_000_000_000.0;
    /// Clusters below this are suspicious but kept.
    pub const MIN_CLUSTER_SIZE_USD: f64 = 10_000.0;
    pub const MAX_POSITION_SIZE_USD: f64 = 1_000_000_000.0;
    pub const MIN_LEVERAGE: f64 = 1.0;
    pub const MAX_LEVERAGE: f64 = 200.0;
    /// Hourly funding beyond this is extreme.
    pub const EXTREME_FUNDING_HOURLY: f64 = 0.01;

    #[must_use]
    pub fn price_bounds(asset: &str) -> (f64, f64) {
        PRICE_BOUNDS
            .iter()
            .find(|(name, _)| *name == asset)
            .map_or(DEFAULT_PRICE_BOUNDS, |(_, bounds)| *bounds)
    }

    /// Checks a price against the per-asset sanity bounds.
    #[must_use]
    pub fn validate_price(asset: &str, price: f64) -> ValidationReport {
        let mut report = ValidationReport::default();

        if !price.is_finite() || price <= 0.0 {
            report
                .errors
                .push(format!("{asset}: invalid price {price} (must be positive)"));
            return report;
        }

        let (min_price, max_price) = Self::price_bounds(asset);
        if price < min_price {
            report.warnings.push(format!(
                "{asset}: price {price} below expected minimum {min_price}"
            ));
        }
        if price > max_price {
            report.warnings.push(format!(
                "{asset}: price {price} above expected maximum {max_price}"
            ));
        }

        report
    }

    /// Checks a position before it becomes a liquidation level.
    #[must_use]
    pub fn validate_position(
        asset: &str,
        size_usd: f64,
        leverage: f64,
        liquidation_price: f64,
        current_price: f64,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        if size_usd > Self::MAX_POSITION_SIZE_USD {
            report.errors.push(format!(
                "{asset}: position size ${size_usd:.0} exceeds realistic maximum"
            ));
            return report;
        }

        if !(Self::MIN_LEVERAGE..=Self::MAX_LEVERAGE).contains(&leverage) {
            report.errors.push(format!(
                "{asset}: invalid leverage {leverage}x (expected {}-{}x)",
                Self::MIN_LEVERAGE,
                Self::MAX_LEVERAGE
            ));
            return report;
        }

        if liquidation_price <= 0.0 {
            report.errors.push(format!(
                "{asset}: invalid liquidation price {liquidation_price}"
            ));
            return report;
        }

        if current_price > 0.0 {
            let distance_pct = (liquidation_price - current_price).abs() / current_price * 100.0;
            if distance_pct < 0.1 {
                report.warnings.push(format!(
                    "{asset}: liquidation very close to current price ({distance_pct:.2}%)"
                ));
            }
            if distance_pct > 90.0 {
                report.warnings.push(format!(
                    "{asset}: liquidation very far from current price ({distance_pct:.1}%)"
                ));
            }
        }

        report
    }

    /// Checks an aggregated cluster against size and distance bounds.
    #[must_use]
    pub fn validate_cluster(
        asset: &str,
        price_center: f64,
        size_usd: f64,
        current_price: f64,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        if size_usd < Self::MIN_CLUSTER_SIZE_USD {
            report.warnings.push(format!(
                "{asset}: cluster size ${size_usd:.0} below minimum ${:.0}",
                Self::MIN_CLUSTER_SIZE_USD
            ));
        }

        if size_usd > Self::MAX_CLUSTER_SIZE_USD {
            report.errors.push(format!(
                "{asset}: cluster size ${size_usd:.0} exceeds maximum ${:.0}",
                Self::MAX_CLUSTER_SIZE_USD
            ));
            return report;
        }

        // Distance is suspicious but never grounds for dropping; the
        // venue-reported liquidation price is trusted.
        if current_price > 0.0 {
            let distance_pct = (price_center - current_price).abs() / current_price * 100.0;
            if distance_pct > 50.0 {
                report.warnings.push(format!(
                    "{asset}: cluster at {price_center} is {distance_pct:.1}% from current price"
                ));
            }
        }

        report
    }

    /// Checks a funding rate; beyond 1%/hr is flagged, never dropped.
    #[must_use]
    pub fn validate_funding(asset: &str, hourly_rate: f64) -> ValidationReport {
        let mut report = ValidationReport::default();
        if hourly_rate.abs() > Self::EXTREME_FUNDING_HOURLY {
            report.warnings.push(format!(
                "{asset}: extreme funding rate {:.4}%/hr",
                hourly_rate * 100.0
            ));
        }
        report
    }
}
