use anyhow::Context;
use clap::Parser;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub mod scoring;

pub use scoring::{ScoringConfig, ScoringWeights, WeightProfile};

pub const AUTHORIZING_CONTRACT_ENV: &str = "AUTHORIZING_CONTRACT";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const KEY_PROVIDER_ENV: &str = "KEY_PROVIDER";
pub const AGENT_PRIVATE_KEY_ENV: &str = "AGENT_PRIVATE_KEY";

/* =======================
CLI ARGS
======================= */

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Sale and bid feed (JSON) produced by the chain scanner
    #[arg(short, long, default_value = "bids.json")]
    pub input: PathBuf,

    /// Keep sweeping the feed instead of settling once and exiting
    #[arg(long)]
    pub watch: bool,
}

/* =======================
MAIN CONFIG
======================= */

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub contract: ContractConfig,
    pub scoring: ScoringConfig,
    pub pitch_evaluator: PitchEvaluatorConfig,
    pub keys: KeyConfig,
    pub store: StoreConfig,
    pub monitor: MonitorConfig,
}

/* =======================
CONTRACT CONFIG
======================= */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Contract address bound into every settlement signature.
    pub authorizing_contract: Option<String>,
    pub chain_id: u64,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            authorizing_contract: None,
            chain_id: 23295, // Sapphire testnet
        }
    }
}

/* =======================
PITCH EVALUATOR CONFIG
======================= */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitchEvaluatorConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout_ms: u64,

    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for PitchEvaluatorConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            timeout_ms: 5_000,
            api_key: None,
        }
    }
}

impl PitchEvaluatorConfig {
    /// A usable credential, or None for missing and development placeholders.
    pub fn usable_api_key(&self) -> Option<&str> {
        let key = self.api_key.as_deref()?.trim();
        if key.is_empty() || key == "dummy_key" || key.starts_with("sk-development") {
            return None;
        }
        Some(key)
    }
}

/* =======================
KEY CONFIG
======================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyProviderKind {
    #[default]
    Auto,
    Local,
    Enclave,
}

impl FromStr for KeyProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "local" => Ok(Self::Local),
            "enclave" | "tee" => Ok(Self::Enclave),
            other => anyhow::bail!("invalid key provider {:?}; expected auto, local or enclave", other),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyConfig {
    pub provider: KeyProviderKind,
    /// Where to write the agent address for contract deployment scripts.
    pub public_key_export: Option<PathBuf>,
}

/* =======================
STORE / MONITOR CONFIG
======================= */

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Settlements survive restarts only when this is set.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 30_000,
        }
    }
}

/* =======================
LOAD / CREATE CONFIG
======================= */

impl Config {
    pub fn load(path: &PathBuf) -> anyhow::Result<Self> {
        let mut cfg = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            let cfg = Config::default();
            let content = serde_json::to_string_pretty(&cfg)?;
            std::fs::write(path, content)?;
            cfg
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Secrets and mode switches come from the environment, never the file.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Ok(addr) = env::var(AUTHORIZING_CONTRACT_ENV) {
            self.contract.authorizing_contract = Some(addr);
        }
        if let Ok(key) = env::var(OPENAI_API_KEY_ENV) {
            self.pitch_evaluator.api_key = Some(key);
        }
        if let Ok(kind) = env::var(KEY_PROVIDER_ENV) {
            self.keys.provider = kind.parse()?;
        }
        Ok(())
    }

    pub fn authorizing_contract(&self) -> anyhow::Result<Address> {
        let raw = self
            .contract
            .authorizing_contract
            .as_deref()
            .context("authorizing contract address missing (config or AUTHORIZING_CONTRACT)")?;
        Address::from_str(raw).with_context(|| format!("invalid contract address {}", raw))
    }
}
