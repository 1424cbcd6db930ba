//! 通知服务
//!
//! 开平仓事件与风控/错误告警统一走这个接口，
//! 具体投递方式（邮件、日志）由实现决定，通知失败不影响交易周期。

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::app_config::email;

/// 告警级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// 开仓事件
#[derive(Debug, Clone, Serialize)]
pub struct ShadowOpenEvent {
    pub instrument: String,
    pub side: String,
    pub confidence: f64,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub account_equity: f64,
    pub open_position_count: usize,
}

/// 平仓事件
#[derive(Debug, Clone, Serialize)]
pub struct ShadowCloseEvent {
    pub instrument: String,
    pub side: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl_usd: f64,
    pub fees_usd: f64,
    pub exit_reason: String,
    pub updated_equity: f64,
}

/// 通知接口
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn shadow_trade_opened(&self, event: &ShadowOpenEvent);
    async fn shadow_trade_closed(&self, event: &ShadowCloseEvent);
    /// 拒绝与失败的告警，与成交事件区分且带级别
    async fn cycle_alert(&self, severity: Severity, message: &str);
}

/// 日志通知器：只写 tracing 日志
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn shadow_trade_opened(&self, event: &ShadowOpenEvent) {
        info!(
            "shadow open: {} {} conf={:.0}% entry={:.2} sl={:?} tp={:?} equity={:.2} open={}",
            event.instrument,
            event.side,
            event.confidence * 100.0,
            event.entry_price,
            event.stop_loss,
            event.take_profit,
            event.account_equity,
            event.open_position_count
        );
    }

    async fn shadow_trade_closed(&self, event: &ShadowCloseEvent) {
        info!(
            "shadow close: {} {} ({}) entry={:.2} exit={:.2} net={:+.2} fees={:.2} equity={:.2}",
            event.instrument,
            event.side,
            event.exit_reason,
            event.entry_price,
            event.exit_price,
            event.pnl_usd,
            event.fees_usd,
            event.updated_equity
        );
    }

    async fn cycle_alert(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => info!("{}", message),
            Severity::Warning => warn!("{}", message),
            Severity::Error => error!("{}", message),
        }
    }
}

/// 邮件通知器：重要事件走邮件，同时落日志
pub struct EmailNotifier;

#[async_trait]
impl Notifier for EmailNotifier {
    async fn shadow_trade_opened(&self, event: &ShadowOpenEvent) {
        LogNotifier.shadow_trade_opened(event).await;
        let body = format!(
            "{} {}\nConfidence: {:.0}%\nEntry: {:.2}\nStop Loss: {:?}\nTake Profit: {:?}\nEquity: {:.2}\nOpen Positions: {}",
            event.instrument,
            event.side,
            event.confidence * 100.0,
            event.entry_price,
            event.stop_loss,
            event.take_profit,
            event.account_equity,
            event.open_position_count
        );
        email::send_email("影子开仓", body).await;
    }

    async fn shadow_trade_closed(&self, event: &ShadowCloseEvent) {
        LogNotifier.shadow_trade_closed(event).await;
        let body = format!(
            "{} {} ({})\nEntry: {:.2}\nExit: {:.2}\nNet PnL: {:+.2}\nFees: {:.2}\nEquity: {:.2}",
            event.instrument,
            event.side,
            event.exit_reason,
            event.entry_price,
            event.exit_price,
            event.pnl_usd,
            event.fees_usd,
            event.updated_equity
        );
        email::send_email("影子平仓", body).await;
    }

    async fn cycle_alert(&self, severity: Severity, message: &str) {
        LogNotifier.cycle_alert(severity, message).await;
        if severity == Severity::Error {
            email::send_email("决策周期告警", message.to_string()).await;
        }
    }
}
