// 7.0 config.rs: every protocol knob in one place. fee schedule, trade floor, bootstrap size.
// 7.1 ProtocolConfig is the static, serializable setup. FeeConfig is the live fee state the
// admin setters mutate after start.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::pricing::BOOTSTRAP_SCALE;
use crate::types::{AccountId, Bps, BPS_DENOMINATOR};

// inclusive range a fee may be set to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBounds {
    pub min: Bps,
    pub max: Bps,
}

impl FeeBounds {
    pub const fn new(min: u16, max: u16) -> Self {
        Self {
            min: Bps(min),
            max: Bps(max),
        }
    }

    pub fn contains(&self, fee: Bps) -> bool {
        fee >= self.min && fee <= self.max
    }

    pub fn check(&self, fee: Bps) -> Result<Bps, ValidationError> {
        if self.contains(fee) {
            Ok(fee)
        } else {
            Err(ValidationError::FeeOutOfBounds {
                fee,
                min: self.min,
                max: self.max,
            })
        }
    }
}

pub const BUY_FEE_BOUNDS: FeeBounds = FeeBounds::new(80, 250);
pub const SELL_FEE_BOUNDS: FeeBounds = FeeBounds::new(80, 250);
pub const LEVERAGE_FEE_BOUNDS: FeeBounds = FeeBounds::new(0, 250);

/** 7.2: static protocol setup. amounts in reserve units, fees in bps. */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    // buys, sells, borrows and leverage below this are rejected
    pub min_trade: u64,
    // share of every fee paid out to the fee recipient. the rest stays in the pool
    pub protocol_share_bp: Bps,
    // exact deposit `start` expects
    pub bootstrap_reserve: u64,
    pub buy_fee_bp: Bps,
    pub sell_fee_bp: Bps,
    pub leverage_fee_bp: Bps,
    pub fee_recipient: AccountId,
    // cap on events kept by the in-memory collector
    pub max_events: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            min_trade: 1_000,
            protocol_share_bp: Bps(3_000), // 30%
            bootstrap_reserve: 1_000_000,
            buy_fee_bp: Bps(250),
            sell_fee_bp: Bps(250),
            leverage_fee_bp: Bps(100),
            fee_recipient: AccountId(0),
            max_events: 100_000,
        }
    }
}

impl ProtocolConfig {
    // cheap fees and a tiny floor so scripted runs can use small numbers
    pub fn testnet() -> Self {
        Self {
            min_trade: 1,
            buy_fee_bp: BUY_FEE_BOUNDS.min,
            sell_fee_bp: SELL_FEE_BOUNDS.min,
            leverage_fee_bp: Bps(50),
            max_events: 10_000,
            ..Self::default()
        }
    }

    pub fn mainnet() -> Self {
        Self {
            min_trade: 10_000,
            max_events: 1_000_000,
            ..Self::default()
        }
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_trade == 0 {
            return Err(ConfigError::InvalidLimits {
                reason: "min trade must be positive".to_string(),
            });
        }

        if self.bootstrap_reserve == 0 {
            return Err(ConfigError::InvalidBootstrap {
                reason: "bootstrap reserve must be positive".to_string(),
            });
        }
        // the bootstrap mint is bootstrap_reserve * BOOTSTRAP_SCALE tokens
        if self.bootstrap_reserve.checked_mul(BOOTSTRAP_SCALE).is_none() {
            return Err(ConfigError::InvalidBootstrap {
                reason: "bootstrap mint overflows token supply".to_string(),
            });
        }

        if self.protocol_share_bp.value() as u64 > BPS_DENOMINATOR {
            return Err(ConfigError::InvalidFees {
                reason: format!("protocol share {} above 100%", self.protocol_share_bp),
            });
        }
        for (name, fee, bounds) in [
            ("buy", self.buy_fee_bp, BUY_FEE_BOUNDS),
            ("sell", self.sell_fee_bp, SELL_FEE_BOUNDS),
            ("leverage", self.leverage_fee_bp, LEVERAGE_FEE_BOUNDS),
        ] {
            if !bounds.contains(fee) {
                return Err(ConfigError::InvalidFees {
                    reason: format!("{name} fee {fee} outside [{}, {}]", bounds.min, bounds.max),
                });
            }
        }

        if self.max_events == 0 {
            return Err(ConfigError::InvalidLimits {
                reason: "event buffer needs room for at least one event".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid fees: {reason}")]
    InvalidFees { reason: String },

    #[error("invalid bootstrap: {reason}")]
    InvalidBootstrap { reason: String },

    #[error("invalid limits: {reason}")]
    InvalidLimits { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> ProtocolConfig {
        match self {
            Environment::Development => ProtocolConfig::default(),
            Environment::Testnet => ProtocolConfig::testnet(),
            Environment::Mainnet => ProtocolConfig::mainnet(),
        }
    }
}

/** 7.3: live fee state. setters enforce the published bounds, `started` only ever flips on. */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    buy_fee_bp: Bps,
    sell_fee_bp: Bps,
    leverage_fee_bp: Bps,
    fee_recipient: AccountId,
    started: bool,
}

impl FeeConfig {
    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self {
            buy_fee_bp: config.buy_fee_bp,
            sell_fee_bp: config.sell_fee_bp,
            leverage_fee_bp: config.leverage_fee_bp,
            fee_recipient: config.fee_recipient,
            started: false,
        }
    }

    pub fn buy_fee_bp(&self) -> Bps {
        self.buy_fee_bp
    }

    pub fn sell_fee_bp(&self) -> Bps {
        self.sell_fee_bp
    }

    pub fn leverage_fee_bp(&self) -> Bps {
        self.leverage_fee_bp
    }

    pub fn fee_recipient(&self) -> AccountId {
        self.fee_recipient
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub(crate) fn mark_started(&mut self) {
        self.started = true;
    }

    pub(crate) fn set_buy_fee(&mut self, fee: Bps) -> Result<(), ValidationError> {
        self.buy_fee_bp = BUY_FEE_BOUNDS.check(fee)?;
        Ok(())
    }

    pub(crate) fn set_sell_fee(&mut self, fee: Bps) -> Result<(), ValidationError> {
        self.sell_fee_bp = SELL_FEE_BOUNDS.check(fee)?;
        Ok(())
    }

    pub(crate) fn set_leverage_fee(&mut self, fee: Bps) -> Result<(), ValidationError> {
        self.leverage_fee_bp = LEVERAGE_FEE_BOUNDS.check(fee)?;
        Ok(())
    }

    pub(crate) fn set_fee_recipient(&mut self, recipient: AccountId) {
        self.fee_recipient = recipient;
    }
}
