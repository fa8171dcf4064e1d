//! # Command Exchange Executor
//!
//! Decouples command submission from command completion. A caller submits a
//! [`CommandMessage`]; the executor admits its correlation id, hands it to
//! the request processor and waits on the correlation's watchdog. The request
//! side runs the command on the worker pool and forwards the response to the
//! response processor, which completes the watchdog.
//!
//! ```text
//! caller ─admit─▶ ExchangeRegistry
//!   │                  ▲ complete
//!   └─accept─▶ requests ─do_command─▶ responses ─┘
//! ```

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;
use tracing::{info, warn};

use super::handlers::{RequestHandler, ResponseHandler};
use super::processor::{DispatchMode, Processor};
use super::registry::ExchangeRegistry;
use crate::config::ExchangeConfig;
use crate::constants::components;
use crate::error::{CommandError, CommandResult};
use crate::execution::{CommandRegistry, Input, WorkerPool};
use crate::logging::{log_error, log_exchange_operation};
use crate::messaging::CommandMessage;
use crate::state_machine::ContextState;

/// Resources that live from `start` to `shutdown`
struct ExchangeRuntime {
    pool: Arc<WorkerPool>,
    requests: Arc<Processor<CommandMessage>>,
    responses: Arc<Processor<CommandMessage>>,
}

/// Point-in-time exchange statistics
#[derive(Debug, Clone, Default)]
pub struct ExchangeStats {
    pub running: bool,
    pub in_flight: usize,
    pub requests_processed: u64,
    pub responses_processed: u64,
    pub pool_in_flight: usize,
}

pub struct CommandExchangeExecutor {
    config: ExchangeConfig,
    commands: Arc<CommandRegistry>,
    registry: Arc<ExchangeRegistry>,
    service_active: Arc<AtomicBool>,
    runtime: RwLock<Option<Arc<ExchangeRuntime>>>,
}

impl CommandExchangeExecutor {
    pub fn new(config: ExchangeConfig, commands: Arc<CommandRegistry>) -> Self {
        Self {
            config,
            commands,
            registry: Arc::new(ExchangeRegistry::new()),
            service_active: Arc::new(AtomicBool::new(false)),
            runtime: RwLock::new(None),
        }
    }

    /// Start both processors and wait until they report started
    pub async fn start(&self) -> CommandResult<()> {
        if self
            .service_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CommandError::concurrency("exchange is already running"));
        }

        let pool = Arc::new(WorkerPool::new(
            components::EXCHANGE_POOL,
            self.config.dispatch_workers + components::PROCESSOR_LOOPS,
        ));

        let responses = Arc::new(Processor::new(
            components::RESPONSE_PROCESSOR,
            self.config.response_queue_capacity,
            Arc::new(ResponseHandler::new(Arc::clone(&self.registry))),
            DispatchMode::Inline,
            Arc::clone(&self.service_active),
        ));

        let requests = Arc::new(Processor::new(
            components::REQUEST_PROCESSOR,
            self.config.request_queue_capacity,
            Arc::new(RequestHandler::new(
                Arc::clone(&self.commands),
                Arc::clone(&self.registry),
                Arc::clone(&responses),
            )),
            DispatchMode::Spawned(Arc::clone(&pool)),
            Arc::clone(&self.service_active),
        ));

        let barrier = Arc::new(Barrier::new(components::PROCESSOR_LOOPS + 1));
        let runtime = Arc::new(ExchangeRuntime {
            pool: Arc::clone(&pool),
            requests: Arc::clone(&requests),
            responses: Arc::clone(&responses),
        });

        for processor in [&requests, &responses] {
            let processor = Arc::clone(processor);
            let start_barrier = Arc::clone(&barrier);
            let launched = pool.spawn(async move {
                if let Err(error) = processor.run(Some(start_barrier)).await {
                    log_error(components::EXCHANGE, "processor_run", &error.to_string(), None);
                }
            });
            if let Err(error) = launched {
                self.abort_start(&runtime).await;
                return Err(error.into());
            }
        }

        if tokio::time::timeout(self.config.start_timeout(), barrier.wait())
            .await
            .is_err()
        {
            self.abort_start(&runtime).await;
            return Err(CommandError::concurrency(format!(
                "exchange processors did not start within {}ms",
                self.config.start_timeout_ms
            )));
        }

        *self.runtime.write() = Some(runtime);
        info!(
            dispatch_workers = self.config.dispatch_workers,
            commands = self.commands.len(),
            "🚀 Command exchange started"
        );
        Ok(())
    }

    async fn abort_start(&self, runtime: &ExchangeRuntime) {
        runtime.requests.shutdown(self.config.shutdown_timeout()).await;
        runtime.responses.shutdown(self.config.shutdown_timeout()).await;
        if let Err(error) = runtime.pool.shutdown(self.config.shutdown_timeout()).await {
            warn!(error = %error, "Exchange pool did not drain after failed start");
        }
        self.service_active.store(false, Ordering::Release);
    }

    /// Submit a message and wait for its completed counterpart
    ///
    /// Admission failures (invalid message, duplicate correlation id,
    /// exchange not running, request refused) are returned as errors. Once
    /// admitted, command failures come back inside the returned message.
    pub async fn process_action_command(
        &self,
        mut message: CommandMessage,
    ) -> CommandResult<CommandMessage> {
        validate_message(&message)?;

        // Nothing to execute; the creation failure is the answer
        if message.is_failed() {
            return Ok(message.into_response());
        }

        let runtime = self
            .current_runtime()
            .ok_or_else(|| CommandError::concurrency("exchange is not running"))?;

        let correlation_id = message.correlation_id.clone();
        if !self.registry.admit(&correlation_id) {
            log_exchange_operation(
                "admission_rejected",
                &correlation_id,
                &message.command_id,
                "duplicate",
                None,
            );
            return Err(CommandError::concurrency(format!(
                "correlation {correlation_id} is already in progress"
            )));
        }

        message.record_attempt();
        if let Err(rejected) = runtime.requests.accept(message).await {
            self.registry.remove(&correlation_id);
            warn!(
                correlation_id = %correlation_id,
                error = %rejected.error,
                "Request not accepted, submission cancelled"
            );
            return Err(CommandError::concurrency(format!(
                "submission {correlation_id} cancelled: {}",
                rejected.error
            )));
        }

        self.registry
            .await_completion(&correlation_id, self.config.completion_timeout())
            .await
    }

    /// Build a message for a registered command and process it
    pub async fn submit(
        &self,
        command_id: &str,
        input: Input,
        correlation_id: Option<String>,
    ) -> CommandResult<CommandMessage> {
        let command = self.commands.resolve(command_id)?;
        let message = CommandMessage::for_command(correlation_id, command.as_ref(), input).await;
        self.process_action_command(message).await
    }

    /// Stop both processors, tear down the pool and interrupt pending waiters
    pub async fn shutdown(&self) -> CommandResult<()> {
        let runtime = self.runtime.write().take();
        let Some(runtime) = runtime else {
            return Ok(());
        };
        let timeout = self.config.shutdown_timeout();

        info!(in_flight = self.registry.len(), "Shutting down command exchange");

        if !runtime.requests.shutdown(timeout).await {
            warn!("Request processor still active after shutdown timeout");
        }
        if !runtime.responses.shutdown(timeout).await {
            warn!("Response processor still active after shutdown timeout");
        }
        if let Err(error) = runtime.pool.shutdown(timeout).await {
            warn!(error = %error, "Exchange pool did not drain in time");
        }

        let interrupted = self.registry.interrupt_all("exchange shut down");
        self.service_active.store(false, Ordering::Release);

        info!(interrupted = interrupted, "Command exchange stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.service_active.load(Ordering::Acquire) && self.runtime.read().is_some()
    }

    pub fn registry(&self) -> &Arc<ExchangeRegistry> {
        &self.registry
    }

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn stats(&self) -> ExchangeStats {
        let runtime = self.current_runtime();
        ExchangeStats {
            running: self.is_running(),
            in_flight: self.registry.len(),
            requests_processed: runtime
                .as_ref()
                .map_or(0, |runtime| runtime.requests.processed_count()),
            responses_processed: runtime
                .as_ref()
                .map_or(0, |runtime| runtime.responses.processed_count()),
            pool_in_flight: runtime.as_ref().map_or(0, |runtime| runtime.pool.in_flight()),
        }
    }

    fn current_runtime(&self) -> Option<Arc<ExchangeRuntime>> {
        self.runtime.read().clone()
    }
}

fn validate_message(message: &CommandMessage) -> CommandResult<()> {
    if message.correlation_id.trim().is_empty() {
        return Err(CommandError::validation("correlation id must not be empty"));
    }
    if message.command_id.trim().is_empty() {
        return Err(CommandError::validation("command id must not be empty"));
    }
    if message.context.command_id() != message.command_id {
        return Err(CommandError::validation(format!(
            "message for {} carries a context for {}",
            message.command_id,
            message.context.command_id()
        )));
    }
    match message.context.state() {
        ContextState::Ready | ContextState::Fail => Ok(()),
        state => Err(CommandError::validation(format!(
            "context for {} must be ready, found {state}",
            message.command_id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{Command, Context};
    use async_trait::async_trait;
    use serde_json::json;

    struct DoubleCommand;

    #[async_trait]
    impl Command for DoubleCommand {
        fn command_id(&self) -> &str {
            "math:double"
        }

        async fn execute_do(&self, context: &mut Context) -> CommandResult<()> {
            let value = context
                .redo_input()
                .as_value()
                .and_then(|v| v.as_i64())
                .ok_or_else(|| CommandError::validation("number expected"))?;
            context.set_undo_input(Input::value(value));
            context.set_result(Some(json!(value * 2)));
            Ok(())
        }

        async fn execute_undo(&self, _context: &mut Context) -> CommandResult<()> {
            Ok(())
        }
    }

    fn executor() -> CommandExchangeExecutor {
        let commands = Arc::new(CommandRegistry::new());
        commands.register(Arc::new(DoubleCommand));
        CommandExchangeExecutor::new(ExchangeConfig::default(), commands)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_submit_round_trip() {
        let executor = executor();
        executor.start().await.unwrap();
        assert!(executor.is_running());

        let response = executor
            .submit("math:double", Input::value(21), Some("c-1".into()))
            .await
            .unwrap();

        assert_eq!(response.correlation_id, "c-1");
        assert!(response.context.is_done());
        assert_eq!(response.result(), Some(&json!(42)));
        assert!(executor.registry().is_empty());

        executor.shutdown().await.unwrap();
        assert!(!executor.is_running());
    }

    #[tokio::test]
    async fn test_not_running_rejects() {
        let executor = executor();
        let error = executor
            .submit("math:double", Input::value(1), None)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), "concurrency");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_double_start_is_rejected() {
        let executor = executor();
        executor.start().await.unwrap();
        assert!(executor.start().await.is_err());
        executor.shutdown().await.unwrap();
    }

    #[test]
    fn test_validate_message_rejects_mismatched_context() {
        let mut message = CommandMessage::new("c-1", Context::with_input("a", Input::value(1)));
        message.command_id = "b".to_string();
        assert!(validate_message(&message).is_err());

        let message = CommandMessage::new("", Context::with_input("a", Input::value(1)));
        assert!(validate_message(&message).is_err());

        let message = CommandMessage::new("c-1", Context::new("a"));
        assert!(validate_message(&message).is_err());
    }
}
