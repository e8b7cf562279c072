use crate::types::Money;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoanConfig {
    /// Smallest principal a requester may propose (inclusive).
    pub min_principal: Money,
    /// Largest principal a requester may propose (inclusive).
    pub max_principal: Money,
    /// Fraction of principal every single investment must meet.
    pub min_investment_ratio: Decimal,
    /// Upper bound on waiting for a loan's funding lock or the store handle.
    pub lock_timeout_ms: u64,
    /// SQLite busy timeout for file-backed stores.
    pub busy_timeout_ms: u64,
    /// Prefix for links to generated agreements in notifications.
    pub agreement_base_url: String,
    /// Directory the bundled document service writes agreements into.
    pub artifact_dir: String,
}

impl Default for LoanConfig {
    fn default() -> Self {
        Self {
            min_principal:        dec!(1_000_000),
            max_principal:        dec!(100_000_000),
            min_investment_ratio: dec!(0.10),
            lock_timeout_ms:      5_000,
            busy_timeout_ms:      5_000,
            agreement_base_url:   "https://localhost:8000".into(),
            artifact_dir:         "uploads".into(),
        }
    }
}

impl LoanConfig {
    /// Load from a JSON file. Missing keys fall back to the defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: LoanConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Config for unit and integration tests: short timeouts, artifacts
    /// under the system temp directory.
    pub fn default_test() -> Self {
        Self {
            lock_timeout_ms: 2_000,
            busy_timeout_ms: 2_000,
            // One directory per call so parallel tests never share files.
            artifact_dir: std::env::temp_dir()
                .join("loanflow-test-artifacts")
                .join(uuid::Uuid::new_v4().to_string())
                .to_string_lossy()
                .into_owned(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.min_principal <= Decimal::ZERO {
            anyhow::bail!("min_principal must be positive, got {}", self.min_principal);
        }
        if self.min_principal > self.max_principal {
            anyhow::bail!(
                "min_principal {} exceeds max_principal {}",
                self.min_principal,
                self.max_principal
            );
        }
        if self.min_investment_ratio <= Decimal::ZERO || self.min_investment_ratio > Decimal::ONE {
            anyhow::bail!(
                "min_investment_ratio must be in (0, 1], got {}",
                self.min_investment_ratio
            );
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
