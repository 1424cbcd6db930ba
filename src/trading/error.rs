//! 决策管线错误类型
//!
//! 风控拒绝不是错误，通过 `RiskDecision::rejection_reason` 表达；
//! 这里只定义会中断单个决策周期的失败。每个周期相互独立，
//! 任何一类失败都不会使调度循环退出。

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// 输入信号不合法（置信度越界、价格顺序错误、缺少产品等）
    #[error("信号校验失败: {reason}")]
    Validation { reason: String },

    /// 内部一致性被破坏（例如止损落在盈利一侧），当前周期终止
    #[error("价格不变量被破坏: {reason}")]
    Invariant { reason: String },

    /// 对终态实体的非法操作（例如重复平仓），操作被丢弃，账本不变
    #[error("交易状态不允许此操作: {reason}")]
    State { reason: String },

    /// 推理断言重试耗尽，影子周期跳过，不产生半成品交易
    #[error("推理断言在 {attempts} 次尝试后仍未通过: {reason}")]
    InferenceAssertion { attempts: u32, reason: String },
}

impl PipelineError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn invariant(reason: impl Into<String>) -> Self {
        Self::Invariant {
            reason: reason.into(),
        }
    }

    pub fn state(reason: impl Into<String>) -> Self {
        Self::State {
            reason: reason.into(),
        }
    }
}
