//! Engine configuration: snapshot location/interval, the `WITH_SNAPSHOT`
//! restore flag, and the markets/balances to seed an empty engine with
//! (spec §6 "Configuration"). Loaded the way the donor's `AppConfig::load`
//! layers the `config` crate over environment variables read through
//! `dotenvy`.

use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::engine::MarketConfig;
use crate::model::order::StpMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedBalance {
    pub user_id: String,
    pub asset: String,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Where the snapshot file is written (temp-and-rename, spec §9).
    pub snapshot_path: String,
    /// Fixed at 3s by spec §4.4, but kept configurable for tests.
    pub snapshot_interval_secs: u64,
    /// The `WITH_SNAPSHOT` flag of spec §6: attempt restore on start.
    pub with_snapshot: bool,
    pub markets: Vec<MarketConfig>,
    pub seed_balances: Vec<SeedBalance>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_path: "./data/engine_snapshot.json".to_string(),
            snapshot_interval_secs: 3,
            with_snapshot: false,
            markets: vec![MarketConfig {
                symbol: "TATA_INR".to_string(),
                base_asset: "TATA".to_string(),
                quote_asset: "INR".to_string(),
                stp_mode: StpMode::CancelNewest,
            }],
            seed_balances: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load config layered `ENGINE_*` environment variables over the
    /// compiled-in defaults above; an optional `ENGINE_CONFIG_FILE`
    /// (JSON) supplies markets/seed balances for demos and integration
    /// tests, matching the donor's file-plus-env layering.
    pub fn load() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("snapshot_path", defaults.snapshot_path.clone())?
            .set_default("snapshot_interval_secs", defaults.snapshot_interval_secs)?
            .set_default("with_snapshot", defaults.with_snapshot)?;

        if let Ok(file) = std::env::var("ENGINE_CONFIG_FILE") {
            builder = builder.add_source(config::File::with_name(&file));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ENGINE").try_parsing(true).separator("__"),
        );

        let raw = builder.build()?;

        let snapshot_path: String = raw.get("snapshot_path").unwrap_or(defaults.snapshot_path);
        let snapshot_interval_secs: u64 =
            raw.get("snapshot_interval_secs").unwrap_or(defaults.snapshot_interval_secs);
        let with_snapshot: bool = raw.get("with_snapshot").unwrap_or(defaults.with_snapshot);
        let markets: Vec<MarketConfig> = raw.get("markets").unwrap_or(defaults.markets);
        let seed_balances: Vec<SeedBalance> = raw.get("seed_balances").unwrap_or(defaults.seed_balances);

        Ok(Self { snapshot_path, snapshot_interval_secs, with_snapshot, markets, seed_balances })
    }

    /// Seed balances parsed into `Decimal`, ready for [`crate::engine::Engine::seed`].
    pub fn parsed_seed_balances(&self) -> anyhow::Result<Vec<(String, String, Decimal)>> {
        self.seed_balances
            .iter()
            .map(|b| {
                let amount = Decimal::parse(&b.amount)?;
                Ok((b.user_id.clone(), b.asset.clone(), amount))
            })
            .collect()
    }
}
