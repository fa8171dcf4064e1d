use command_core::config::{ExchangeConfig, MacroCommandConfig};
use command_core::error::{CommandError, CommandResult};
use command_core::exchange::CommandExchangeExecutor;
use command_core::execution::{
    Command, CommandRegistry, Context, Input, MacroMember, ParallelMacroCommand,
    SequentialMacroCommand,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::sync::Arc;

struct Increment(&'static str);

#[async_trait::async_trait]
impl Command for Increment {
    fn command_id(&self) -> &str {
        self.0
    }

    async fn execute_do(&self, context: &mut Context) -> CommandResult<()> {
        let value = context
            .redo_input()
            .as_value()
            .and_then(|v| v.as_i64())
            .ok_or_else(|| CommandError::validation("number expected"))?;
        context.set_undo_input(Input::value(value));
        context.set_result(Some(json!(value + 1)));
        Ok(())
    }

    async fn execute_undo(&self, _context: &mut Context) -> CommandResult<()> {
        Ok(())
    }
}

fn members(count: usize) -> Vec<MacroMember> {
    (0..count)
        .map(|_| Arc::new(Increment("math:inc")) as MacroMember)
        .collect()
}

fn benchmark_single_command(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let command = Increment("math:inc");

    c.bench_function("command_do", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let mut context = command.create_context(Input::value(black_box(1))).await;
                command.do_command(&mut context).await;
                context
            })
        })
    });
}

fn benchmark_macro_commands(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let sequential = SequentialMacroCommand::new("math:chain", members(8));
    let parallel = runtime.block_on(async {
        ParallelMacroCommand::with_config(
            "math:fan-out",
            members(8),
            &MacroCommandConfig::default(),
        )
    });

    c.bench_function("sequential_macro_8", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let mut context = sequential.create_context(Input::value(0)).await;
                sequential.do_command(&mut context).await;
                context
            })
        })
    });

    c.bench_function("parallel_macro_8", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let mut context = parallel.create_context(Input::value(0)).await;
                parallel.do_command(&mut context).await;
                context
            })
        })
    });
}

fn benchmark_exchange_round_trip(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let commands = Arc::new(CommandRegistry::new());
    commands.register(Arc::new(Increment("math:inc")));
    let executor = CommandExchangeExecutor::new(ExchangeConfig::default(), commands);
    runtime.block_on(executor.start()).unwrap();

    c.bench_function("exchange_submit", |b| {
        b.iter(|| {
            runtime
                .block_on(executor.submit("math:inc", Input::value(black_box(1)), None))
                .unwrap()
        })
    });

    runtime.block_on(executor.shutdown()).unwrap();
}

criterion_group!(
    benches,
    benchmark_single_command,
    benchmark_macro_commands,
    benchmark_exchange_round_trip
);
criterion_main!(benches);
