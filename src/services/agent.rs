//! Paid model calls: credit precheck, bounded call, cost and settlement.

use std::sync::Arc;
use std::time::Duration;

use bigdecimal::{BigDecimal, Zero};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{AppError, AppResult};
use crate::external::{ChatMessage, ChatModel, ChatRequest};
use crate::repositories::WorkflowStore;
use crate::services::credit::{CreditLedger, PricingTable};

const REASON_MARKER: &str = "\nReason: ";

/// Which step of a run a model call belongs to. Only aggregate calls pay channel fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPhase {
    Channel,
    Aggregate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput {
    pub content: String,
    pub confidence: BigDecimal,
    pub reason: String,
    pub cost: BigDecimal,
}

/// Confidence of a completion: 80 when the model stopped on its own, else 50.
pub fn confidence_for(finish_reason: Option<&str>) -> BigDecimal {
    match finish_reason {
        Some("stop") => BigDecimal::from(80),
        _ => BigDecimal::from(50),
    }
}

/// First line after the last `Reason:` marker, or the first line of the whole text.
pub fn extract_reason(content: &str) -> String {
    let tail = content.rsplit(REASON_MARKER).next().unwrap_or(content);
    tail.lines().next().unwrap_or_default().to_string()
}

#[derive(Clone)]
pub struct AgentService {
    model: Arc<dyn ChatModel>,
    ledger: CreditLedger,
    workflows: Arc<dyn WorkflowStore>,
    pricing: PricingTable,
    default_model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl AgentService {
    pub fn new(
        model: Arc<dyn ChatModel>,
        ledger: CreditLedger,
        workflows: Arc<dyn WorkflowStore>,
        config: &LlmConfig,
    ) -> Self {
        Self {
            model,
            ledger,
            workflows,
            pricing: PricingTable::from_config(config),
            default_model: config.default_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// Runs one prompt for `user_id` and settles its cost.
    ///
    /// Aggregate calls of a workflow with paid channels settle through the
    /// multi-party path; everything else is a standard deduction.
    pub async fn complete(
        &self,
        user_id: &str,
        prompt: String,
        model: &str,
        workflow_id: &str,
        phase: CompletionPhase,
    ) -> AppResult<AgentOutput> {
        let balance = self.ledger.balance(user_id).await?;
        if balance < BigDecimal::zero() {
            return Err(AppError::insufficient_credits(format!(
                "balance of {user_id} is {balance}"
            )));
        }

        let model = if model.trim().is_empty() {
            self.default_model.as_str()
        } else {
            model
        };
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let completion = tokio::time::timeout(self.timeout, self.model.complete(request))
            .await
            .map_err(|_| {
                AppError::external(
                    "llm",
                    format!("model call timed out after {}s", self.timeout.as_secs()),
                )
            })??;

        let cost = self.pricing.cost(
            model,
            completion.prompt_tokens,
            completion.completion_tokens,
        );
        debug!(
            user_id,
            workflow_definition_id = workflow_id,
            model,
            prompt_tokens = completion.prompt_tokens,
            completion_tokens = completion.completion_tokens,
            cost = %cost,
            "Model call finished"
        );

        let paid_channels = match phase {
            CompletionPhase::Aggregate => self.workflows.paid_channels(workflow_id).await?,
            CompletionPhase::Channel => Vec::new(),
        };
        if paid_channels.is_empty() {
            self.ledger
                .deduct(user_id, &cost, model, Some(workflow_id).filter(|w| !w.is_empty()))
                .await
                .inspect_err(|e| warn!(user_id, error = %e, "Credit deduction failed"))?;
        } else {
            self.ledger
                .settle_workflow(user_id, workflow_id, model, &cost, &paid_channels)
                .await?;
        }

        Ok(AgentOutput {
            confidence: confidence_for(completion.finish_reason.as_deref()),
            reason: extract_reason(&completion.content),
            content: completion.content,
            cost,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::external::ChatCompletion;

    /// Chat model returning scripted answers in call order.
    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<AppResult<ChatCompletion>>>,
        pub prompts: Mutex<Vec<String>>,
        pub delay: Option<Duration>,
    }

    impl ScriptedModel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, content: &str, prompt_tokens: u64, completion_tokens: u64) -> Self {
            self.replies.lock().unwrap().push_back(Ok(ChatCompletion {
                content: content.to_string(),
                finish_reason: Some("stop".to_string()),
                prompt_tokens,
                completion_tokens,
            }));
            self
        }

        pub fn fail(self, message: &str) -> Self {
            self.replies
                .lock()
                .unwrap()
                .push_back(Err(AppError::external("llm", message)));
            self
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, request: ChatRequest) -> AppResult<ChatCompletion> {
            self.prompts
                .lock()
                .unwrap()
                .push(request.messages[0].content.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChatCompletion::default()))
        }
    }
}
