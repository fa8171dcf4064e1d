//! Request and response handlers wiring the exchange processors to the
//! command registry and the correlation registry.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::processor::{MessageHandler, Processor};
use super::registry::ExchangeRegistry;
use crate::execution::CommandRegistry;
use crate::logging::log_exchange_operation;
use crate::messaging::CommandMessage;

/// Executes the command carried by a request and forwards the response
pub struct RequestHandler {
    commands: Arc<CommandRegistry>,
    registry: Arc<ExchangeRegistry>,
    responses: Arc<Processor<CommandMessage>>,
}

impl RequestHandler {
    pub fn new(
        commands: Arc<CommandRegistry>,
        registry: Arc<ExchangeRegistry>,
        responses: Arc<Processor<CommandMessage>>,
    ) -> Self {
        Self {
            commands,
            registry,
            responses,
        }
    }

    async fn execute(&self, message: &mut CommandMessage) {
        match self.commands.resolve(&message.command_id) {
            Ok(command) => command.do_command(&mut message.context).await,
            Err(error) => {
                warn!(
                    correlation_id = %message.correlation_id,
                    command_id = %message.command_id,
                    "No command registered for request"
                );
                message.fail(error);
            }
        }
    }
}

#[async_trait]
impl MessageHandler<CommandMessage> for RequestHandler {
    async fn handle(&self, mut message: CommandMessage) {
        self.execute(&mut message).await;
        log_exchange_operation(
            "request_executed",
            &message.correlation_id,
            &message.command_id,
            &message.context.state().to_string(),
            None,
        );

        let mut response = message.into_response();
        response.record_attempt();

        if let Err(rejected) = self.responses.accept(response).await {
            // Degraded delivery: the caller still gets the real result.
            let mut response = rejected.message;
            response.mark_degraded();
            warn!(
                correlation_id = %response.correlation_id,
                error = %rejected.error,
                "Response queue refused message, completing watchdog directly"
            );
            let correlation_id = response.correlation_id.clone();
            self.registry.complete(&correlation_id, response);
        }
    }
}

/// Completes the watchdog matching a response
pub struct ResponseHandler {
    registry: Arc<ExchangeRegistry>,
}

impl ResponseHandler {
    pub fn new(registry: Arc<ExchangeRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl MessageHandler<CommandMessage> for ResponseHandler {
    async fn handle(&self, message: CommandMessage) {
        let correlation_id = message.correlation_id.clone();
        if self.registry.complete(&correlation_id, message) {
            debug!(correlation_id = %correlation_id, "Response delivered");
        }
    }
}
