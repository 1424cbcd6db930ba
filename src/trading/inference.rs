//! 推理协作方接口与断言重试
//!
//! 推理调用委托给外部供应商；这里负责拼装上下文、
//! 对输出做正确性断言，断言失败时带着失败说明进行有限次重试。

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::trading::error::PipelineError;
use crate::trading::market::TrendClass;
use crate::trading::signal::{Direction, RawSignal};

/// 推理上下文
///
/// `amendments` 保存此前尝试中未通过的断言说明，
/// 随重试一并注入提示词，引导模型自我修正。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptContext {
    pub instrument: String,
    pub market_structure: String,
    pub risk_environment: String,
    pub account_context: String,
    pub last_trade_outcome: String,
    pub amendments: Vec<String>,
}

/// 信号推理接口（外部协作方）
#[async_trait]
pub trait SignalProvider: Send + Sync {
    async fn infer(&self, ctx: &PromptContext) -> Result<RawSignal>;
}

/// 对模型输出做正确性断言，返回违规说明（为空即通过）
pub fn assertion_violations(
    raw: &RawSignal,
    trend: TrendClass,
    bear_override_confidence: f64,
) -> Vec<String> {
    let mut violations = Vec::new();

    if raw.direction != Direction::Flat && raw.confidence > 0.5 {
        if raw.entry_price.filter(|p| *p > 0.0).is_none() {
            violations
                .push("Confidence above 50% implies a setup was found; define an entry price.".to_string());
        }
        if raw.stop_loss.is_none() {
            violations.push("Trades must define a stop loss.".to_string());
        }
    }

    if trend == TrendClass::Bear
        && raw.direction == Direction::Long
        && raw.confidence < bear_override_confidence
    {
        violations.push(format!(
            "Counter-trend longs require conviction above {:.0}%.",
            bear_override_confidence * 100.0
        ));
    }

    violations
}

/// 带断言的推理调用
///
/// 断言未通过时把违规说明追加进上下文并重试，最多 `retry_limit` 次；
/// 耗尽后返回断言错误，当前影子周期被跳过。
pub async fn infer_with_assertions(
    provider: &dyn SignalProvider,
    mut ctx: PromptContext,
    trend: TrendClass,
    bear_override_confidence: f64,
    retry_limit: u32,
) -> Result<RawSignal, PipelineError> {
    let attempts = retry_limit + 1;
    let mut failures: Vec<String> = Vec::new();

    for attempt in 1..=attempts {
        let raw = match provider.infer(&ctx).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("inference attempt {}/{} failed: {}", attempt, attempts, e);
                failures.push(format!("attempt {}: provider error: {}", attempt, e));
                continue;
            }
        };

        let violations = assertion_violations(&raw, trend, bear_override_confidence);
        if violations.is_empty() {
            return Ok(raw);
        }

        warn!(
            "inference attempt {}/{} violated assertions: {:?}",
            attempt, attempts, violations
        );
        failures.push(format!("attempt {}: {}", attempt, violations.join(" ")));
        ctx.amendments.extend(violations);
    }

    Err(PipelineError::InferenceAssertion {
        attempts,
        reason: failures.join("; "),
    })
}

// ============================================================================
// OpenRouter 客户端
// ============================================================================

/// OpenRouter 推理客户端
pub struct OpenRouterProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// 模型返回的 JSON 计划
#[derive(Debug, Deserialize)]
struct PlanJson {
    signal: String,
    confidence: f64,
    entry_price: Option<f64>,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    reasoning: Option<String>,
}

impl OpenRouterProvider {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
        }
    }

    pub fn from_config(cfg: &crate::app_config::AppConfig) -> Self {
        Self::new(
            cfg.openrouter_base_url.clone(),
            cfg.openrouter_api_key.clone(),
            cfg.analyst_model.clone(),
        )
    }

    fn build_prompt(ctx: &PromptContext) -> String {
        let mut prompt = format!(
            "You are a crypto futures analyst for {inst}.\n\
             ## MARKET STRUCTURE\n{structure}\n\
             ## RISK ENVIRONMENT\n{risk}\n\
             ## ACCOUNT\n{account}\n\
             ## LAST TRADE\n{last}\n\n\
             Respond with ONLY a JSON object:\n\
             {{\"signal\": \"LONG|SHORT|HOLD|CLOSE\", \"confidence\": 0.0-1.0, \
             \"entry_price\": float|null, \"stop_loss\": float|null, \
             \"take_profit\": float|null, \"reasoning\": \"...\"}}",
            inst = ctx.instrument,
            structure = ctx.market_structure,
            risk = ctx.risk_environment,
            account = ctx.account_context,
            last = ctx.last_trade_outcome,
        );
        if !ctx.amendments.is_empty() {
            prompt.push_str("\n\n## CORRECTIONS FROM PREVIOUS ATTEMPT\n");
            for a in &ctx.amendments {
                prompt.push_str("- ");
                prompt.push_str(a);
                prompt.push('\n');
            }
        }
        prompt
    }
}

/// 从模型回复中提取 JSON 片段（容忍 ``` 代码块包裹）
pub fn extract_json(content: &str) -> Option<&str> {
    if let Some(idx) = content.find("```json") {
        let rest = &content[idx + 7..];
        return rest.split("```").next().map(str::trim);
    }
    if let Some(idx) = content.find("```") {
        let rest = &content[idx + 3..];
        return rest.split("```").next().map(str::trim);
    }
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end > start {
        Some(content[start..=end].trim())
    } else {
        None
    }
}

fn parse_direction(signal: &str) -> Direction {
    match signal.to_uppercase().as_str() {
        "LONG" => Direction::Long,
        "SHORT" => Direction::Short,
        // CLOSE/CUT_LOSS/HOLD 都归并为平仓/观望
        _ => Direction::Flat,
    }
}

#[async_trait]
impl SignalProvider for OpenRouterProvider {
    async fn infer(&self, ctx: &PromptContext) -> Result<RawSignal> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: Self::build_prompt(ctx),
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;

        let content = response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| anyhow::anyhow!("empty completion"))?;

        let json_str =
            extract_json(content).ok_or_else(|| anyhow::anyhow!("no JSON found in response"))?;
        let plan: PlanJson = serde_json::from_str(json_str)?;

        Ok(RawSignal {
            instrument: ctx.instrument.clone(),
            direction: parse_direction(&plan.signal),
            confidence: plan.confidence,
            entry_price: plan.entry_price,
            stop_loss: plan.stop_loss,
            take_profit: plan.take_profit,
            reasoning: plan
                .reasoning
                .unwrap_or_else(|| "No reasoning provided".to_string()),
        })
    }
}
