//! Application configuration.
//!
//! Runtime settings come from environment variables (a `.env` file is read
//! first). The venue/asset/protocol/strategy catalogue comes from an optional
//! TOML file named by `CATALOGUE_PATH`, falling back to built-in defaults.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::arbitrage::calculator::{
    AssetClass, FeeModel, FlashLoanProtocol, GasTier, StrategyConfig, StrategyKind,
};
use crate::arbitrage::Thresholds;
use crate::error::ConfigError;
use crate::market::{VenueId, VenueKind};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Profit Thresholds (fractions, net of fees) ===
    /// Minimum net profit for direct two-venue opportunities.
    #[serde(default = "default_min_profit_direct")]
    pub min_profit_direct: Decimal,

    /// Minimum net profit for triangular opportunities.
    #[serde(default = "default_min_profit_triangular")]
    pub min_profit_triangular: Decimal,

    /// Minimum net profit for flash-loan opportunities.
    #[serde(default = "default_min_profit_flash_loan")]
    pub min_profit_flash_loan: Decimal,

    // === Execution ===
    /// Maximum operations executing at once, across all assets.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_operations: usize,

    /// Notional committed to a direct or triangular operation, in USD.
    #[serde(default = "default_trade_size")]
    pub trade_size_usd: Decimal,

    /// Maximum quote age at execution time.
    #[serde(default = "default_freshness_ms")]
    pub quote_freshness_ms: u64,

    /// Timeout for each leg.
    #[serde(default = "default_leg_timeout_ms")]
    pub leg_timeout_ms: u64,

    /// Maximum adverse move of a fill against its expected price.
    #[serde(default = "default_slippage_tolerance")]
    pub slippage_tolerance: Decimal,

    // === Market Data ===
    /// Timeout for each venue quote request.
    #[serde(default = "default_venue_timeout_ms")]
    pub venue_timeout_ms: u64,

    /// Poll interval when every venue is centralized.
    #[serde(default = "default_cex_poll_ms")]
    pub cex_poll_interval_ms: u64,

    /// Poll interval when any venue is on-chain.
    #[serde(default = "default_dex_poll_ms")]
    pub dex_poll_interval_ms: u64,

    // === Gas ===
    /// USD price of the chain's native asset, for gas costs.
    #[serde(default = "default_native_asset_usd")]
    pub native_asset_usd: Decimal,

    /// Gas price used until the oracle answers.
    #[serde(default = "default_fallback_gas")]
    pub fallback_gas_price_gwei: Decimal,

    // === Server Configuration ===
    /// HTTP server port for health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Optional TOML catalogue file.
    #[serde(default)]
    pub catalogue_path: Option<String>,

    /// Venues, assets, flash-loan protocols and strategies.
    #[serde(skip)]
    pub catalogue: Catalogue,
}

fn default_min_profit_direct() -> Decimal {
    dec!(0.005)
}

fn default_min_profit_triangular() -> Decimal {
    dec!(0.005)
}

fn default_min_profit_flash_loan() -> Decimal {
    dec!(0.001)
}

fn default_max_concurrent() -> usize {
    5
}

fn default_trade_size() -> Decimal {
    dec!(1000)
}

fn default_freshness_ms() -> u64 {
    3_000
}

fn default_leg_timeout_ms() -> u64 {
    5_000
}

fn default_slippage_tolerance() -> Decimal {
    dec!(0.005)
}

fn default_venue_timeout_ms() -> u64 {
    1_500
}

fn default_cex_poll_ms() -> u64 {
    2_000
}

fn default_dex_poll_ms() -> u64 {
    5_000
}

fn default_native_asset_usd() -> Decimal {
    dec!(3000)
}

fn default_fallback_gas() -> Decimal {
    dec!(30)
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_profit_direct: default_min_profit_direct(),
            min_profit_triangular: default_min_profit_triangular(),
            min_profit_flash_loan: default_min_profit_flash_loan(),
            max_concurrent_operations: default_max_concurrent(),
            trade_size_usd: default_trade_size(),
            quote_freshness_ms: default_freshness_ms(),
            leg_timeout_ms: default_leg_timeout_ms(),
            slippage_tolerance: default_slippage_tolerance(),
            venue_timeout_ms: default_venue_timeout_ms(),
            cex_poll_interval_ms: default_cex_poll_ms(),
            dex_poll_interval_ms: default_dex_poll_ms(),
            native_asset_usd: default_native_asset_usd(),
            fallback_gas_price_gwei: default_fallback_gas(),
            port: default_port(),
            rust_log: default_log_level(),
            catalogue_path: None,
            catalogue: Catalogue::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> crate::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config: Config = envy::from_env()?;

        if let Some(path) = &config.catalogue_path {
            config.catalogue = Catalogue::from_file(path)?;
        }

        Ok(config)
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [
            ("MIN_PROFIT_DIRECT", self.min_profit_direct),
            ("MIN_PROFIT_TRIANGULAR", self.min_profit_triangular),
            ("MIN_PROFIT_FLASH_LOAN", self.min_profit_flash_loan),
        ];
        for (name, value) in thresholds {
            if value < Decimal::ZERO {
                return Err(ConfigError::Invalid(format!("{name} must not be negative")));
            }
        }

        if self.max_concurrent_operations == 0 {
            return Err(ConfigError::Invalid(
                "MAX_CONCURRENT_OPERATIONS must be at least 1".to_string(),
            ));
        }

        if self.trade_size_usd <= Decimal::ZERO {
            return Err(ConfigError::Invalid("TRADE_SIZE_USD must be positive".to_string()));
        }

        if self.slippage_tolerance < Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "SLIPPAGE_TOLERANCE must not be negative".to_string(),
            ));
        }

        if self.venue_timeout_ms == 0 || self.leg_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }

        if self.native_asset_usd <= Decimal::ZERO || self.fallback_gas_price_gwei <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "NATIVE_ASSET_USD and FALLBACK_GAS_PRICE_GWEI must be positive".to_string(),
            ));
        }

        self.catalogue.validate()
    }

    /// Per-type profit thresholds.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            direct: self.min_profit_direct,
            triangular: self.min_profit_triangular,
            flash_loan: self.min_profit_flash_loan,
        }
    }

    /// Fee model built from the catalogue's venue fees.
    pub fn fee_model(&self) -> FeeModel {
        let venue_fees: HashMap<VenueId, Decimal> = self
            .catalogue
            .venues
            .iter()
            .map(|v| (VenueId::new(&v.name), v.fee))
            .collect();
        FeeModel::new(venue_fees, self.native_asset_usd)
    }

    /// Poll interval for asset loops: the slowest venue kind in use sets it.
    pub fn poll_interval(&self) -> Duration {
        let any_dex = self
            .catalogue
            .venues
            .iter()
            .any(|v| v.kind == VenueKind::Decentralized);
        if any_dex {
            Duration::from_millis(self.dex_poll_interval_ms)
        } else {
            Duration::from_millis(self.cex_poll_interval_ms)
        }
    }

    /// Per-venue quote timeout.
    pub fn venue_timeout(&self) -> Duration {
        Duration::from_millis(self.venue_timeout_ms)
    }

    /// Per-leg execution timeout.
    pub fn leg_timeout(&self) -> Duration {
        Duration::from_millis(self.leg_timeout_ms)
    }

    /// Freshness window applied before the first leg runs.
    pub fn freshness_window(&self) -> Duration {
        Duration::from_millis(self.quote_freshness_ms)
    }
}

/// A supported venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Venue name.
    pub name: String,
    /// Centralized or on-chain.
    #[serde(default)]
    pub kind: VenueKind,
    /// Taker fee as a fraction.
    pub fee: Decimal,
}

/// A tracked asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Ticker symbol.
    pub symbol: String,
    /// Liquidity class.
    #[serde(default)]
    pub class: AssetClass,
    /// Reference USD price for the simulated feed.
    pub reference_price: Decimal,
}

/// Static catalogue of venues, assets, flash-loan protocols and strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalogue {
    /// Supported venues.
    pub venues: Vec<VenueConfig>,
    /// Tracked assets.
    pub assets: Vec<AssetConfig>,
    /// Flash-loan providers.
    #[serde(default)]
    pub flash_loan_protocols: Vec<FlashLoanProtocol>,
    /// Flash-loan strategy catalogue.
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

impl Default for Catalogue {
    fn default() -> Self {
        let venue = |name: &str, kind, fee| VenueConfig {
            name: name.to_string(),
            kind,
            fee,
        };
        let asset = |symbol: &str, class, reference_price| AssetConfig {
            symbol: symbol.to_string(),
            class,
            reference_price,
        };
        let protocol = |name: &str, fee, max_loan| FlashLoanProtocol {
            name: name.to_string(),
            fee,
            max_loan,
            chain: "ethereum".to_string(),
        };
        let strategy = |kind, expected_profit_pct, gas_tier| StrategyConfig {
            kind,
            expected_profit_pct,
            gas_tier,
        };

        Self {
            venues: vec![
                venue("binance", VenueKind::Centralized, dec!(0.001)),
                venue("kraken", VenueKind::Centralized, dec!(0.0026)),
                venue("coinbase", VenueKind::Centralized, dec!(0.004)),
                venue("uniswap", VenueKind::Decentralized, dec!(0.003)),
            ],
            assets: vec![
                asset("ETH", AssetClass::Major, dec!(3000)),
                asset("BTC", AssetClass::Major, dec!(60000)),
                asset("SOL", AssetClass::Alt, dec!(150)),
                asset("USDC", AssetClass::Stable, dec!(1)),
            ],
            flash_loan_protocols: vec![
                protocol("aave_v3", dec!(0.0005), dec!(1000000)),
                protocol("balancer", dec!(0), dec!(500000)),
            ],
            strategies: vec![
                strategy(StrategyKind::DexToDex, dec!(0.003), GasTier::Medium),
                strategy(StrategyKind::CrossChain, dec!(0.006), GasTier::VeryHigh),
                strategy(StrategyKind::Triangular, dec!(0.004), GasTier::High),
                strategy(StrategyKind::Liquidation, dec!(0.008), GasTier::High),
                strategy(StrategyKind::Sandwich, dec!(0.002), GasTier::Medium),
            ],
        }
    }
}

impl Catalogue {
    /// Read a catalogue from a TOML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse a catalogue from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Check catalogue entries for obviously wrong values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.venues.is_empty() {
            return Err(ConfigError::Invalid("at least one venue is required".to_string()));
        }
        if self.assets.is_empty() {
            return Err(ConfigError::Invalid("at least one asset is required".to_string()));
        }

        for venue in &self.venues {
            if venue.fee < Decimal::ZERO || venue.fee >= Decimal::ONE {
                return Err(ConfigError::Invalid(format!(
                    "venue {} fee must be in [0, 1)",
                    venue.name
                )));
            }
        }

        for asset in &self.assets {
            if asset.reference_price <= Decimal::ZERO {
                return Err(ConfigError::Invalid(format!(
                    "asset {} reference price must be positive",
                    asset.symbol
                )));
            }
        }

        for protocol in &self.flash_loan_protocols {
            if protocol.fee < Decimal::ZERO || protocol.fee >= Decimal::ONE {
                return Err(ConfigError::Invalid(format!(
                    "protocol {} fee must be in [0, 1)",
                    protocol.name
                )));
            }
            if protocol.max_loan <= Decimal::ZERO {
                return Err(ConfigError::Invalid(format!(
                    "protocol {} max loan must be positive",
                    protocol.name
                )));
            }
        }

        Ok(())
    }

    /// Supported venue ids, in catalogue order.
    pub fn venue_ids(&self) -> Vec<VenueId> {
        self.venues.iter().map(|v| VenueId::new(&v.name)).collect()
    }

    /// Tracked asset symbols, upper-cased, in catalogue order.
    pub fn asset_symbols(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.symbol.to_uppercase()).collect()
    }

    /// Liquidity class of `symbol`; unknown assets count as alts.
    pub fn asset_class(&self, symbol: &str) -> AssetClass {
        self.assets
            .iter()
            .find(|a| a.symbol.eq_ignore_ascii_case(symbol))
            .map(|a| a.class)
            .unwrap_or(AssetClass::Alt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_sensible() {
        let config = Config::default();

        assert_eq!(config.min_profit_direct, dec!(0.005));
        assert!(config.min_profit_flash_loan < config.min_profit_direct);
        assert_eq!(config.max_concurrent_operations, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let config = Config {
            max_concurrent_operations: 0,
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_negative_threshold() {
        let config = Config {
            min_profit_triangular: dec!(-0.01),
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_protocol() {
        let mut config = Config::default();
        config.catalogue.flash_loan_protocols[0].max_loan = Decimal::ZERO;

        assert!(config.validate().is_err());
    }

    #[test]
    fn poll_interval_follows_slowest_venue_kind() {
        let mut config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(5_000));

        config
            .catalogue
            .venues
            .retain(|v| v.kind == VenueKind::Centralized);
        assert_eq!(config.poll_interval(), Duration::from_millis(2_000));
    }

    #[test]
    fn catalogue_parses_from_toml() {
        let catalogue = Catalogue::from_toml(
            r#"
            [[venues]]
            name = "binance"
            fee = "0.001"

            [[venues]]
            name = "uniswap"
            kind = "decentralized"
            fee = "0.003"

            [[assets]]
            symbol = "eth"
            class = "major"
            reference_price = "3000"

            [[flash_loan_protocols]]
            name = "aave_v3"
            fee = "0.0005"
            max_loan = "1000000"
            chain = "ethereum"

            [[strategies]]
            kind = "cross_chain"
            expected_profit_pct = "0.006"
            gas_tier = "very_high"
            "#,
        )
        .unwrap();

        assert_eq!(catalogue.venues.len(), 2);
        assert_eq!(catalogue.venues[1].kind, VenueKind::Decentralized);
        assert_eq!(catalogue.asset_symbols(), vec!["ETH".to_string()]);
        assert_eq!(catalogue.strategies[0].gas_tier, GasTier::VeryHigh);
        assert!(catalogue.validate().is_ok());
    }

    #[test]
    fn catalogue_rejects_malformed_toml() {
        assert!(matches!(
            Catalogue::from_toml("venues = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_catalogue_file_is_reported() {
        assert!(matches!(
            Catalogue::from_file("/nonexistent/catalogue.toml"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn fee_model_uses_catalogue_fees() {
        let config = Config::default();
        let fees = config.fee_model();

        assert_eq!(fees.venue_fee(&VenueId::from("kraken")), Some(dec!(0.0026)));
        assert_eq!(fees.venue_fee(&VenueId::from("unknown")), None);
    }

    #[test]
    fn unknown_assets_are_alts() {
        let catalogue = Catalogue::default();
        assert_eq!(catalogue.asset_class("usdc"), AssetClass::Stable);
        assert_eq!(catalogue.asset_class("DOGE"), AssetClass::Alt);
    }
}
