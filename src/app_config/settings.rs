//! 应用配置
//!
//! 从环境变量加载风控参数与影子账户参数，进程内只初始化一次。

use once_cell::sync::OnceCell;

use crate::app_config::env::{env_f64, env_i64, env_list, env_or_default, env_u32};

/// 风控参数
#[derive(Debug, Clone)]
pub struct RiskParams {
    /// 账户允许的最大杠杆
    pub max_leverage: u32,
    /// 总保证金占用上限（占总资金比例）
    pub max_total_exposure_fraction: f64,
    /// 单笔仓位比例上限
    pub position_size_ceiling: f64,
    /// 空头趋势锁定下放行所需的置信度
    pub bear_trend_confidence_override: f64,
    /// 开仓所需的最低置信度
    pub min_confidence: f64,
    /// 信号未给出止损时的默认止损偏移
    pub default_stop_loss_pct: f64,
    /// 信号未给出止盈时的默认止盈偏移
    pub default_take_profit_pct: f64,
    /// 交易所最小下单名义价值（美元）
    pub min_order_notional_usd: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            max_leverage: 20,
            max_total_exposure_fraction: 0.8,
            position_size_ceiling: 0.75,
            bear_trend_confidence_override: 0.65,
            min_confidence: 0.6,
            default_stop_loss_pct: 0.02,
            default_take_profit_pct: 0.05,
            min_order_notional_usd: 12.0,
        }
    }
}

impl RiskParams {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_leverage: env_u32("RISK_MAX_LEVERAGE", d.max_leverage),
            max_total_exposure_fraction: env_f64(
                "RISK_MAX_TOTAL_EXPOSURE_FRACTION",
                d.max_total_exposure_fraction,
            ),
            position_size_ceiling: env_f64("RISK_POSITION_SIZE_CEILING", d.position_size_ceiling),
            bear_trend_confidence_override: env_f64(
                "RISK_BEAR_TREND_CONFIDENCE_OVERRIDE",
                d.bear_trend_confidence_override,
            ),
            min_confidence: env_f64("RISK_MIN_CONFIDENCE", d.min_confidence),
            default_stop_loss_pct: env_f64("RISK_DEFAULT_SL_PCT", d.default_stop_loss_pct),
            default_take_profit_pct: env_f64("RISK_DEFAULT_TP_PCT", d.default_take_profit_pct),
            min_order_notional_usd: env_f64("RISK_MIN_ORDER_NOTIONAL_USD", d.min_order_notional_usd),
        }
    }
}

/// 影子账户模拟参数
#[derive(Debug, Clone)]
pub struct ShadowParams {
    /// 往返手续费率（开仓+平仓，平仓时一次性计提）
    pub fee_rate: f64,
    /// 单边滑点率（成交价逆向偏移）
    pub slippage_rate: f64,
    /// 推理断言失败时的最大重试次数
    pub retry_limit: u32,
    /// 净收益超过该阈值的平仓交易会被保留为优化样本
    pub optimization_example_pnl_threshold: f64,
    /// 无止盈止损仓位的最大持有时长（分钟），0 表示不自动平仓
    pub max_trade_age_minutes: i64,
    /// 影子账户ID
    pub account_id: String,
}

impl Default for ShadowParams {
    fn default() -> Self {
        Self {
            fee_rate: 0.0006,
            slippage_rate: 0.0001,
            retry_limit: 2,
            optimization_example_pnl_threshold: 0.0,
            max_trade_age_minutes: 0,
            account_id: "shadow-main".to_string(),
        }
    }
}

impl ShadowParams {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            fee_rate: env_f64("SHADOW_FEE_RATE", d.fee_rate),
            slippage_rate: env_f64("SHADOW_SLIPPAGE_RATE", d.slippage_rate),
            retry_limit: env_u32("SHADOW_RETRY_LIMIT", d.retry_limit),
            optimization_example_pnl_threshold: env_f64(
                "SHADOW_EXAMPLE_PNL_THRESHOLD",
                d.optimization_example_pnl_threshold,
            ),
            max_trade_age_minutes: env_i64("SHADOW_MAX_TRADE_AGE_MINUTES", d.max_trade_age_minutes),
            account_id: env_or_default("SHADOW_ACCOUNT_ID", &d.account_id),
        }
    }
}

/// 主配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 需要交易的产品
    pub instruments: Vec<String>,
    /// 决策周期间隔（秒）
    pub cycle_interval_seconds: u64,
    /// 推理模型
    pub analyst_model: String,
    /// OpenRouter 接口地址
    pub openrouter_base_url: String,
    /// OpenRouter API Key
    pub openrouter_api_key: String,
    pub risk: RiskParams,
    pub shadow: ShadowParams,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            instruments: env_list("INST_IDS", &["BTC-USDT-SWAP"]),
            cycle_interval_seconds: env_i64("CYCLE_INTERVAL_SECONDS", 180) as u64,
            analyst_model: env_or_default("ANALYST_MODEL", "anthropic/claude-sonnet-4"),
            openrouter_base_url: env_or_default(
                "OPENROUTER_BASE_URL",
                "https://openrouter.ai/api/v1",
            ),
            openrouter_api_key: env_or_default("OPENROUTER_API_KEY", ""),
            risk: RiskParams::from_env(),
            shadow: ShadowParams::from_env(),
        }
    }
}

static APP_CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 获取全局配置（首次调用时从环境变量初始化）
pub fn get_config() -> &'static AppConfig {
    APP_CONFIG.get_or_init(AppConfig::from_env)
}
