//! Complete: the terminal stage. It only answers, it never advances.

use async_trait::async_trait;
use std::sync::Arc;
use waypoint_core::error::StageError;
use waypoint_core::provider::Provider;

use crate::context::ConversationContext;
use crate::stage::{Stage, StageId, StageResult};

pub struct CompleteStage;

#[async_trait]
impl Stage for CompleteStage {
    fn id(&self) -> StageId {
        StageId::Complete
    }

    async fn process(
        &self,
        context: &ConversationContext,
        _input: &str,
        _model: &Arc<dyn Provider>,
    ) -> Result<StageResult, StageError> {
        let title = context
            .artifact()
            .and_then(|a| a.get("title"))
            .and_then(|t| t.as_str());
        let message = match title {
            Some(title) => format!(
                "The design for \"{title}\" is complete. Start a new conversation to design something else."
            ),
            None => "This conversation is complete. Start a new conversation to design something else."
                .to_string(),
        };
        Ok(StageResult::reply(message))
    }

    fn can_advance(&self, _result: &StageResult) -> bool {
        false
    }
}
