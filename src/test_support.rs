//! Builders and sinks shared by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::bus::{CollectingSink, MessageSink, RunnerMessage};
use crate::config::ExecutionConfig;
use crate::model::{
    Failure, RunSummary, TestAssembly, TestCase, TestClass, TestCollection, TestMethod,
};
use crate::ordering::MetadataResolver;
use crate::runner::{AssemblyRunner, EngineError};

pub(crate) fn assembly(id: &str) -> Arc<TestAssembly> {
    Arc::new(TestAssembly::new(id, format!("{id} tests")))
}

pub(crate) fn collection(id: &str, assembly: &Arc<TestAssembly>) -> Arc<TestCollection> {
    Arc::new(TestCollection::new(id, id.to_string(), assembly.clone()))
}

pub(crate) fn class(id: &str, name: &str, collection: &Arc<TestCollection>) -> Arc<TestClass> {
    Arc::new(TestClass::new(id, name, collection.clone()))
}

pub(crate) fn method(id: &str, name: &str, class: &Arc<TestClass>) -> Arc<TestMethod> {
    Arc::new(TestMethod::new(id, name, class.clone()))
}

pub(crate) fn passing_case(id: &str, method: &Arc<TestMethod>) -> Arc<TestCase> {
    Arc::new(TestCase::new(id, method.clone(), |_| {
        Box::pin(async { Ok(String::new()) })
    }))
}

pub(crate) fn failing_case(id: &str, method: &Arc<TestMethod>, message: &str) -> Arc<TestCase> {
    let message = message.to_string();
    Arc::new(TestCase::new(id, method.clone(), move |_| {
        let message = message.clone();
        Box::pin(async move { Err(Failure::assertion(message)) })
    }))
}

/// A case whose body records that it ran; used to prove skipped bodies are
/// never invoked.
pub(crate) fn tracking_case(
    id: &str,
    method: &Arc<TestMethod>,
    invoked: Arc<AtomicBool>,
) -> Arc<TestCase> {
    Arc::new(TestCase::new(id, method.clone(), move |_| {
        let invoked = invoked.clone();
        Box::pin(async move {
            invoked.store(true, Ordering::SeqCst);
            Err(Failure::assertion("should never run"))
        })
    }))
}

/// Serial, synchronous configuration for deterministic message ordering
pub(crate) fn serial_config() -> ExecutionConfig {
    ExecutionConfig {
        disable_parallelization: true,
        synchronous_message_reporting: true,
        ..ExecutionConfig::default()
    }
}

pub(crate) struct RecordedRun {
    pub result: Result<RunSummary, EngineError>,
    pub messages: Vec<RunnerMessage>,
}

impl RecordedRun {
    pub fn summary(&self) -> RunSummary {
        match &self.result {
            Ok(summary) => *summary,
            Err(error) => panic!("run failed: {error}"),
        }
    }

    pub fn count(&self, type_name: &str) -> usize {
        self.messages
            .iter()
            .filter(|m| m.type_name() == type_name)
            .count()
    }

    pub fn types(&self) -> Vec<&'static str> {
        self.messages.iter().map(|m| m.type_name()).collect()
    }
}

pub(crate) async fn run(
    assembly: Arc<TestAssembly>,
    cases: Vec<Arc<TestCase>>,
    config: ExecutionConfig,
) -> RecordedRun {
    let sink = Arc::new(CollectingSink::new());
    let result = AssemblyRunner::new(assembly, cases, sink.clone())
        .with_config(config)
        .run()
        .await;
    RecordedRun {
        result,
        messages: sink.messages(),
    }
}

pub(crate) async fn run_with_resolver(
    assembly: Arc<TestAssembly>,
    cases: Vec<Arc<TestCase>>,
    config: ExecutionConfig,
    resolver: Arc<dyn MetadataResolver>,
) -> RecordedRun {
    let sink = Arc::new(CollectingSink::new());
    let result = AssemblyRunner::new(assembly, cases, sink.clone())
        .with_config(config)
        .with_resolver(resolver)
        .run()
        .await;
    RecordedRun {
        result,
        messages: sink.messages(),
    }
}

/// Sink that rejects the first message of a given type and records the rest
pub(crate) struct FailingSink {
    pub fail_on: &'static str,
    pub seen: CollectingSink,
}

impl FailingSink {
    pub fn new(fail_on: &'static str) -> Self {
        Self {
            fail_on,
            seen: CollectingSink::new(),
        }
    }
}

impl MessageSink for FailingSink {
    fn on_message(&self, message: &RunnerMessage) -> anyhow::Result<bool> {
        if message.type_name() == self.fail_on {
            anyhow::bail!("sink rejected {}", self.fail_on);
        }
        self.seen.on_message(message)
    }
}

/// Sink that records everything and signals "stop" once it has seen a
/// message of the given type
pub(crate) struct StoppingSink {
    pub stop_after: &'static str,
    pub seen: CollectingSink,
}

impl StoppingSink {
    pub fn new(stop_after: &'static str) -> Self {
        Self {
            stop_after,
            seen: CollectingSink::new(),
        }
    }
}

impl MessageSink for StoppingSink {
    fn on_message(&self, message: &RunnerMessage) -> anyhow::Result<bool> {
        self.seen.on_message(message)?;
        Ok(message.type_name() != self.stop_after)
    }
}
