//! End-to-end tests driving the full runner pipeline through a collecting
//! sink.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use crate::bus::RunnerMessage;
use crate::fixtures::ConstructorArg;
use crate::config::{ExecutionConfig, ParallelAlgorithm};
use crate::fixtures::{FixtureSource, TestFixture, TestInstance};
use crate::model::{
    ClassConstructor, Failure, OrdererReference, ParameterDescriptor, RunSummary, TestAssembly,
    TestCase, TestClass, TestCollection, TestHook, TestMethod,
};
use crate::ordering::{RegistryResolver, TestCaseOrderer};
use crate::runner::AssemblyRunner;
use crate::test_support::{
    assembly, class, collection, failing_case, method, passing_case, run, run_with_resolver,
    serial_config, tracking_case, FailingSink, RecordedRun, StoppingSink,
};

fn push(log: &Arc<Mutex<Vec<String>>>, entry: impl Into<String>) {
    log.lock().unwrap_or_else(|e| e.into_inner()).push(entry.into());
}

fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

fn collection_finished(run: &RecordedRun) -> Vec<(String, RunSummary)> {
    run.messages
        .iter()
        .filter_map(|message| match message {
            RunnerMessage::CollectionFinished { owners, summary } => Some((
                owners.collection_id.clone().unwrap_or_default(),
                *summary,
            )),
            _ => None,
        })
        .collect()
}

fn test_starting_names(run: &RecordedRun) -> Vec<String> {
    run.messages
        .iter()
        .filter_map(|message| match message {
            RunnerMessage::TestStarting { display_name, .. } => Some(display_name.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn two_collections_aggregate_counts_and_per_collection_summaries() {
    let assembly = assembly("asm");
    let col_a = collection("col-a", &assembly);
    let col_b = collection("col-b", &assembly);
    let cls_a = class("cls-a", "AlphaTests", &col_a);
    let cls_b = class("cls-b", "BetaTests", &col_b);
    let met_a1 = method("met-a1", "first", &cls_a);
    let met_a2 = method("met-a2", "second", &cls_a);
    let met_b1 = method("met-b1", "first", &cls_b);
    let met_b2 = method("met-b2", "second", &cls_b);

    let cases = vec![
        passing_case("case-a1", &met_a1),
        passing_case("case-a2", &met_a2),
        passing_case("case-b1", &met_b1),
        failing_case("case-b2", &met_b2, "beta broke"),
    ];

    let run = run(assembly, cases, serial_config()).await;
    let summary = run.summary();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 0);

    let finished = collection_finished(&run);
    assert_eq!(finished.len(), 2);
    let a = finished.iter().find(|(id, _)| id == "col-a").unwrap();
    assert_eq!((a.1.total, a.1.failed), (2, 0));
    let b = finished.iter().find(|(id, _)| id == "col-b").unwrap();
    assert_eq!((b.1.total, b.1.failed), (2, 1));
}

#[tokio::test]
async fn lifecycle_pairs_nest_for_a_single_case() {
    let assembly = assembly("asm");
    let col = collection("col", &assembly);
    let cls = class("cls", "SmokeTests", &col);
    let met = method("met", "works", &cls);

    let run = run(assembly, vec![passing_case("case", &met)], serial_config()).await;
    assert_eq!(
        run.types(),
        vec![
            "assembly_starting",
            "collection_starting",
            "class_starting",
            "method_starting",
            "case_starting",
            "test_starting",
            "test_passed",
            "test_finished",
            "case_finished",
            "method_finished",
            "class_finished",
            "collection_finished",
            "assembly_finished",
        ]
    );
}

#[tokio::test]
async fn summaries_are_additive_up_the_hierarchy() {
    let assembly = assembly("asm");
    let col_a = collection("col-a", &assembly);
    let col_b = collection("col-b", &assembly);
    let cls_a = class("cls-a", "A", &col_a);
    let cls_b = class("cls-b", "B", &col_b);
    let met_a = method("met-a", "one", &cls_a);
    let met_b = method("met-b", "two", &cls_b);

    let cases = vec![
        passing_case("a1", &met_a),
        failing_case("b1", &met_b, "x"),
        passing_case("b2", &met_b),
    ];
    let run = run(assembly, cases, serial_config()).await;

    let mut summed = RunSummary::default();
    for (_, summary) in collection_finished(&run) {
        summed.aggregate(&summary);
    }
    let top = run.summary();
    assert_eq!((summed.total, summed.failed, summed.skipped), (top.total, top.failed, top.skipped));
    assert_eq!(summed.time, top.time);
}

#[tokio::test]
async fn skipped_test_never_invokes_the_body() {
    let assembly = assembly("asm");
    let col = collection("col", &assembly);
    let cls = class("cls", "SkipTests", &col);
    let met = method("met", "doomed", &cls);

    let invoked = Arc::new(AtomicBool::new(false));
    let case = Arc::new(
        TestCase::new("case", met.clone(), {
            let invoked = invoked.clone();
            move |_| {
                let invoked = invoked.clone();
                Box::pin(async move {
                    invoked.store(true, Ordering::SeqCst);
                    Err(Failure::assertion("would have failed"))
                })
            }
        })
        .with_skip_reason("Please don't run me"),
    );

    let run = run(assembly, vec![case], serial_config()).await;
    let summary = run.summary();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert!(!invoked.load(Ordering::SeqCst));

    let skipped = run
        .messages
        .iter()
        .find_map(|message| match message {
            RunnerMessage::TestSkipped {
                reason,
                execution_time,
                ..
            } => Some((reason.clone(), *execution_time)),
            _ => None,
        })
        .unwrap();
    assert_eq!(skipped.0, "Please don't run me");
    assert_eq!(skipped.1, 0.0);
    assert_eq!(run.count("test_passed"), 0);
    assert_eq!(run.count("test_failed"), 0);
}

#[tokio::test]
async fn failed_collection_starting_runs_nothing_and_unwinds() {
    let asm = assembly("asm");
    let col = collection("col", &asm);
    let cls = class("cls", "NeverRuns", &col);
    let met = method("met", "never", &cls);

    let invoked = Arc::new(AtomicBool::new(false));
    let cases = vec![tracking_case("case", &met, invoked.clone())];

    let sink = Arc::new(FailingSink::new("collection_starting"));
    let result = AssemblyRunner::new(asm, cases, sink.clone())
        .with_config(serial_config())
        .run()
        .await;

    let error = result.unwrap_err();
    assert_eq!(error.partial, RunSummary::default());
    assert!(!invoked.load(Ordering::SeqCst));

    let seen: Vec<&'static str> = sink.seen.messages().iter().map(|m| m.type_name()).collect();
    assert!(seen.contains(&"assembly_starting"));
    assert!(!seen.contains(&"collection_finished"));
    assert!(!seen.contains(&"test_starting"));
    // The assembly's own Finished is also lost to the unwind.
    assert!(!seen.contains(&"assembly_finished"));
}

#[tokio::test]
async fn stop_signal_cancels_not_yet_started_collections() {
    let asm = assembly("asm");
    let col_a = collection("col-a", &asm);
    let col_b = collection("col-b", &asm);
    let cls_a = class("cls-a", "A", &col_a);
    let cls_b = class("cls-b", "B", &col_b);
    let met_a = method("met-a", "one", &cls_a);
    let met_b = method("met-b", "two", &cls_b);

    let cases = vec![passing_case("a1", &met_a), passing_case("b1", &met_b)];

    let sink = Arc::new(StoppingSink::new("test_finished"));
    let result = AssemblyRunner::new(asm, cases, sink.clone())
        .with_config(serial_config())
        .run()
        .await;

    let summary = result.unwrap();
    assert_eq!(summary.total, 1);

    let seen: Vec<&'static str> = sink.seen.messages().iter().map(|m| m.type_name()).collect();
    assert_eq!(seen.iter().filter(|t| **t == "collection_starting").count(), 1);
    assert_eq!(seen.iter().filter(|t| **t == "test_starting").count(), 1);
    // The already-running chain still tears down completely.
    assert!(seen.contains(&"collection_finished"));
    assert!(seen.contains(&"assembly_finished"));
}

struct GrumpyFixture {
    log: Arc<Mutex<Vec<String>>>,
}

impl TestFixture for GrumpyFixture {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dispose(&self) -> Result<(), Failure> {
        push(&self.log, "grumpy disposed");
        Err(Failure::new("DisposeError", "dispose boom"))
    }
}

#[tokio::test]
async fn cleanup_failure_excludes_starting_phase_failures() {
    let asm = assembly("asm");
    let log = Arc::new(Mutex::new(Vec::new()));
    let grumpy_log = log.clone();
    let col = Arc::new(
        TestCollection::new("col", "col", asm.clone())
            .with_fixture(FixtureSource::new("BrokenFixture", || {
                Err(Failure::new("IoError", "creation boom"))
            }))
            .with_fixture(FixtureSource::new("GrumpyFixture", move || {
                Ok(Arc::new(GrumpyFixture {
                    log: grumpy_log.clone(),
                }) as Arc<dyn TestFixture>)
            })),
    );
    let cls = class("cls", "FixtureTests", &col);
    let met = method("met", "uses_fixture", &cls);

    let run = run(asm, vec![passing_case("case", &met)], serial_config()).await;
    let summary = run.summary();
    assert_eq!(summary.failed, 1);

    // The seeded construction failure fails the test...
    let test_failure = run
        .messages
        .iter()
        .find_map(|message| match message {
            RunnerMessage::TestFailed { failure, .. } => Some(failure.clone()),
            _ => None,
        })
        .unwrap();
    assert!(test_failure.messages.iter().any(|m| m.contains("creation boom")));

    // ...while the cleanup-failure message carries only the disposal
    // failure.
    let cleanup = run
        .messages
        .iter()
        .find_map(|message| match message {
            RunnerMessage::CollectionCleanupFailure { failure, .. } => Some(failure.clone()),
            _ => None,
        })
        .unwrap();
    assert!(cleanup.messages.iter().any(|m| m.contains("dispose boom")));
    assert!(!cleanup.messages.iter().any(|m| m.contains("creation boom")));
    assert_eq!(entries(&log), vec!["grumpy disposed"]);
}

struct DatabaseFixture {
    name: &'static str,
}

impl TestFixture for DatabaseFixture {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct ServiceInstance {
    db_name: String,
}

impl TestInstance for ServiceInstance {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[tokio::test]
async fn constructor_injection_resolves_collection_fixture() {
    let asm = assembly("asm");
    let col = Arc::new(TestCollection::new("col", "col", asm.clone()).with_fixture(
        FixtureSource::new("DatabaseFixture", || {
            Ok(Arc::new(DatabaseFixture { name: "db-1" }) as Arc<dyn TestFixture>)
        }),
    ));
    let cls = Arc::new(
        TestClass::new("cls", "DbTests", col).with_constructor(ClassConstructor::new(
            vec![ParameterDescriptor::new("DatabaseFixture", "db")],
            |args| {
                let db = args[0]
                    .downcast_fixture::<DatabaseFixture>()
                    .ok_or_else(|| Failure::new("CastError", "expected DatabaseFixture"))?;
                Ok(Arc::new(ServiceInstance {
                    db_name: db.name.to_string(),
                }) as Arc<dyn TestInstance>)
            },
        )),
    );
    let met = method("met", "reads_db", &cls);
    let case = Arc::new(TestCase::new("case", met, |instance| {
        Box::pin(async move {
            let instance =
                instance.ok_or_else(|| Failure::new("MissingInstance", "no class instance"))?;
            let service = instance
                .as_any()
                .downcast_ref::<ServiceInstance>()
                .ok_or_else(|| Failure::new("CastError", "expected ServiceInstance"))?;
            if service.db_name == "db-1" {
                Ok("checked db-1".to_string())
            } else {
                Err(Failure::assertion("wrong database"))
            }
        })
    }));

    let run = run(asm, vec![case], serial_config()).await;
    assert_eq!(run.summary().failed, 0);

    let output = run
        .messages
        .iter()
        .find_map(|message| match message {
            RunnerMessage::TestPassed { output, .. } => Some(output.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(output, "checked db-1");
}

#[tokio::test]
async fn unresolved_constructor_arguments_name_type_and_parameter() {
    let asm = assembly("asm");
    let col = collection("col", &asm);
    let cls = Arc::new(
        TestClass::new("cls", "NeedyTests", col).with_constructor(ClassConstructor::new(
            vec![ParameterDescriptor::new(
                "DependentCollectionFixture",
                "collectionFixture",
            )],
            |_args| Err(Failure::new("Unreachable", "factory should not run")),
        )),
    );
    let met = method("met", "wants_fixture", &cls);

    let run = run(asm, vec![passing_case("case", &met)], serial_config()).await;
    assert_eq!(run.summary().failed, 1);

    let failure = run
        .messages
        .iter()
        .find_map(|message| match message {
            RunnerMessage::TestFailed { failure, .. } => Some(failure.clone()),
            _ => None,
        })
        .unwrap();
    assert!(failure.messages.iter().any(|m| m
        .contains("unresolved constructor arguments: DependentCollectionFixture collectionFixture")));
}

#[tokio::test]
async fn ambiguous_constructors_fail_the_class() {
    let asm = assembly("asm");
    let col = collection("col", &asm);
    fn noop_factory(_args: &[ConstructorArg]) -> Result<Arc<dyn TestInstance>, Failure> {
        Err(Failure::new("Unreachable", "factory should not run"))
    }
    let cls = Arc::new(
        TestClass::new("cls", "Ambiguous", col)
            .with_constructor(ClassConstructor::new(Vec::new(), noop_factory))
            .with_constructor(ClassConstructor::new(Vec::new(), noop_factory)),
    );
    let met = method("met", "any", &cls);

    let run = run(asm, vec![passing_case("case", &met)], serial_config()).await;
    assert_eq!(run.summary().failed, 1);

    let failure = run
        .messages
        .iter()
        .find_map(|message| match message {
            RunnerMessage::TestFailed { failure, .. } => Some(failure.clone()),
            _ => None,
        })
        .unwrap();
    assert!(failure
        .messages
        .iter()
        .any(|m| m.contains("has 2 public constructors")));
}

struct RecordingHook {
    label: &'static str,
    fail_before: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl TestHook for RecordingHook {
    fn name(&self) -> &str {
        self.label
    }

    fn before(&self, _test: &str) -> Result<(), Failure> {
        push(&self.log, format!("before:{}", self.label));
        if self.fail_before {
            Err(Failure::new("HookError", format!("{} before failed", self.label)))
        } else {
            Ok(())
        }
    }

    fn after(&self, _test: &str) -> Result<(), Failure> {
        push(&self.log, format!("after:{}", self.label));
        Ok(())
    }
}

fn hook(
    label: &'static str,
    fail_before: bool,
    log: &Arc<Mutex<Vec<String>>>,
) -> Arc<dyn TestHook> {
    Arc::new(RecordingHook {
        label,
        fail_before,
        log: log.clone(),
    })
}

#[tokio::test]
async fn after_hooks_run_in_reverse_declaration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let asm = Arc::new(TestAssembly::new("asm", "asm").with_hook(hook("assembly", false, &log)));
    let col = Arc::new(TestCollection::new("col", "col", asm.clone()));
    let cls = Arc::new(TestClass::new("cls", "Hooked", col).with_hook(hook("class", false, &log)));
    let met = Arc::new(
        TestMethod::new("met", "hooked", cls).with_hook(hook("method", false, &log)),
    );

    let run = run(asm, vec![passing_case("case", &met)], serial_config()).await;
    assert_eq!(run.summary().failed, 0);
    assert_eq!(
        entries(&log),
        vec![
            "before:assembly",
            "before:class",
            "before:method",
            "after:method",
            "after:class",
            "after:assembly",
        ]
    );
}

#[tokio::test]
async fn failing_before_hook_skips_body_and_later_hooks() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let asm = Arc::new(TestAssembly::new("asm", "asm").with_hook(hook("outer", false, &log)));
    let col = Arc::new(TestCollection::new("col", "col", asm.clone()));
    let cls = Arc::new(
        TestClass::new("cls", "Hooked", col).with_hook(hook("broken", true, &log)),
    );
    let met = Arc::new(TestMethod::new("met", "hooked", cls).with_hook(hook("inner", false, &log)));

    let invoked = Arc::new(AtomicBool::new(false));
    let run = run(
        asm,
        vec![tracking_case("case", &met, invoked.clone())],
        serial_config(),
    )
    .await;

    assert_eq!(run.summary().failed, 1);
    assert!(!invoked.load(Ordering::SeqCst));
    // "broken" never succeeded, "inner" never ran; only "outer" unwinds.
    assert_eq!(entries(&log), vec!["before:outer", "before:broken", "after:outer"]);
}

struct ReverseCaseOrderer;

impl TestCaseOrderer for ReverseCaseOrderer {
    fn name(&self) -> &str {
        "ReverseCaseOrderer"
    }

    fn order_test_cases(&self, cases: &[Arc<TestCase>]) -> Vec<Arc<TestCase>> {
        let mut out = cases.to_vec();
        out.reverse();
        out
    }
}

struct PanickingCaseOrderer;

impl TestCaseOrderer for PanickingCaseOrderer {
    fn name(&self) -> &str {
        "PanickingCaseOrderer"
    }

    fn order_test_cases(&self, _cases: &[Arc<TestCase>]) -> Vec<Arc<TestCase>> {
        panic!("cannot decide")
    }
}

#[tokio::test]
async fn class_orderer_reorders_cases() {
    let reference = OrdererReference::new("ReverseCaseOrderer", "tests");
    let asm = assembly("asm");
    let col = collection("col", &asm);
    let cls = Arc::new(
        TestClass::new("cls", "Ordered", col).with_case_orderer(reference.clone()),
    );
    let met_one = method("met-1", "one", &cls);
    let met_two = method("met-2", "two", &cls);

    let resolver = Arc::new(
        RegistryResolver::new().register_case_orderer(reference, Arc::new(ReverseCaseOrderer)),
    );
    let run = run_with_resolver(
        asm,
        vec![passing_case("first", &met_one), passing_case("second", &met_two)],
        serial_config(),
        resolver,
    )
    .await;

    assert_eq!(run.summary().total, 2);
    assert_eq!(test_starting_names(&run), vec!["Ordered.two", "Ordered.one"]);
}

#[tokio::test]
async fn throwing_orderer_degrades_to_discovery_order_with_diagnostic() {
    let reference = OrdererReference::new("PanickingCaseOrderer", "tests");
    let asm = assembly("asm");
    let col = collection("col", &asm);
    let cls = Arc::new(
        TestClass::new("cls", "Ordered", col).with_case_orderer(reference.clone()),
    );
    let met_one = method("met-1", "one", &cls);
    let met_two = method("met-2", "two", &cls);

    let resolver = Arc::new(
        RegistryResolver::new().register_case_orderer(reference, Arc::new(PanickingCaseOrderer)),
    );
    let run = run_with_resolver(
        asm,
        vec![passing_case("first", &met_one), passing_case("second", &met_two)],
        serial_config(),
        resolver,
    )
    .await;

    // Tests are neither lost nor duplicated, and a diagnostic names the
    // orderer.
    assert_eq!(run.summary().total, 2);
    assert_eq!(test_starting_names(&run), vec!["Ordered.one", "Ordered.two"]);
    let diagnostic = run
        .messages
        .iter()
        .find_map(|message| match message {
            RunnerMessage::Diagnostic { message } => Some(message.clone()),
            _ => None,
        })
        .unwrap();
    assert!(diagnostic.contains("PanickingCaseOrderer"));
    assert!(diagnostic.contains("cannot decide"));
}

#[tokio::test]
async fn unknown_collection_orderer_is_non_fatal() {
    let asm = Arc::new(
        TestAssembly::new("asm", "asm")
            .with_collection_orderer(OrdererReference::new("Missing", "nowhere")),
    );
    let col = collection("col", &asm);
    let cls = class("cls", "Plain", &col);
    let met = method("met", "works", &cls);

    let run = run(asm, vec![passing_case("case", &met)], serial_config()).await;
    assert_eq!(run.summary().total, 1);
    assert_eq!(run.summary().failed, 0);
    assert!(run.count("diagnostic") >= 1);
}

#[tokio::test]
async fn parameter_count_mismatch_is_a_descriptive_failure() {
    let asm = assembly("asm");
    let col = collection("col", &asm);
    let cls = class("cls", "Parameterized", &col);
    let met = Arc::new(
        TestMethod::new("met", "takes_two", cls.clone()).with_parameter_count(2),
    );
    let case = Arc::new(
        TestCase::new("case", met, |_| Box::pin(async { Ok(String::new()) }))
            .with_arguments(vec![serde_json::json!(1)]),
    );

    let run = run(asm, vec![case], serial_config()).await;
    assert_eq!(run.summary().failed, 1);

    let failure = run
        .messages
        .iter()
        .find_map(|message| match message {
            RunnerMessage::TestFailed { failure, .. } => Some(failure.clone()),
            _ => None,
        })
        .unwrap();
    assert!(failure.messages.iter().any(|m| {
        m.contains("expected 2 parameter value(s), but 1 parameter value(s) were provided")
    }));
}

struct TidyInstance {
    log: Arc<Mutex<Vec<String>>>,
}

impl TestInstance for TidyInstance {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dispose(&self) -> Result<(), Failure> {
        push(&self.log, "dispose:sync");
        Ok(())
    }

    fn dispose_async(&self) -> BoxFuture<'_, Result<(), Failure>> {
        Box::pin(async {
            push(&self.log, "dispose:async");
            Ok(())
        })
    }
}

#[tokio::test]
async fn instance_async_disposal_precedes_sync_disposal() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let asm = assembly("asm");
    let col = collection("col", &asm);
    let instance_log = log.clone();
    let cls = Arc::new(
        TestClass::new("cls", "Tidy", col).with_constructor(ClassConstructor::new(
            Vec::new(),
            move |_args| {
                Ok(Arc::new(TidyInstance {
                    log: instance_log.clone(),
                }) as Arc<dyn TestInstance>)
            },
        )),
    );
    let met = method("met", "works", &cls);

    let run = run(asm, vec![passing_case("case", &met)], serial_config()).await;
    assert_eq!(run.summary().failed, 0);
    assert_eq!(entries(&log), vec!["dispose:async", "dispose:sync"]);
}

struct LeakyInstance;

impl TestInstance for LeakyInstance {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dispose(&self) -> Result<(), Failure> {
        Err(Failure::new("DisposeError", "handle leaked"))
    }
}

#[tokio::test]
async fn instance_disposal_failure_reports_test_cleanup_failure() {
    let asm = assembly("asm");
    let col = collection("col", &asm);
    let cls = Arc::new(
        TestClass::new("cls", "Leaky", col).with_constructor(ClassConstructor::new(
            Vec::new(),
            |_args| Ok(Arc::new(LeakyInstance) as Arc<dyn TestInstance>),
        )),
    );
    let met = method("met", "works", &cls);

    let run = run(asm, vec![passing_case("case", &met)], serial_config()).await;
    // The test itself still passed; only the cleanup is reported broken.
    assert_eq!(run.summary().failed, 0);
    assert_eq!(run.count("test_passed"), 1);

    let cleanup = run
        .messages
        .iter()
        .find_map(|message| match message {
            RunnerMessage::TestCleanupFailure { failure, .. } => Some(failure.clone()),
            _ => None,
        })
        .unwrap();
    assert!(cleanup.messages.iter().any(|m| m.contains("handle leaked")));
}

fn many_collections(asm: &Arc<TestAssembly>, count: usize) -> Vec<Arc<TestCase>> {
    (0..count)
        .map(|i| {
            let col = collection(&format!("col-{i}"), asm);
            let cls = class(&format!("cls-{i}"), &format!("Class{i}"), &col);
            let met = method(&format!("met-{i}"), "works", &cls);
            passing_case(&format!("case-{i}"), &met)
        })
        .collect()
}

#[tokio::test]
async fn conservative_parallel_run_completes_every_collection() {
    let asm = assembly("asm");
    let cases = many_collections(&asm, 6);

    let config = ExecutionConfig {
        max_parallel_threads: 2,
        parallel_algorithm: ParallelAlgorithm::Conservative,
        ..ExecutionConfig::default()
    };
    let run = run(asm, cases, config).await;
    let summary = run.summary();
    assert_eq!(summary.total, 6);
    assert_eq!(summary.failed, 0);
    assert_eq!(run.count("collection_finished"), 6);
}

#[tokio::test]
async fn aggressive_pool_completes_every_collection() {
    let asm = assembly("asm");
    let cases = many_collections(&asm, 5);

    let config = ExecutionConfig {
        max_parallel_threads: 2,
        parallel_algorithm: ParallelAlgorithm::Aggressive,
        ..ExecutionConfig::default()
    };
    let run = run(asm, cases, config).await;
    assert_eq!(run.summary().total, 5);
    assert_eq!(run.count("collection_finished"), 5);
}

#[tokio::test]
async fn single_worker_aggressive_pool_is_deterministically_serial() {
    let asm = assembly("asm");
    let cases = many_collections(&asm, 3);

    let config = ExecutionConfig {
        max_parallel_threads: 1,
        parallel_algorithm: ParallelAlgorithm::Aggressive,
        synchronous_message_reporting: true,
        ..ExecutionConfig::default()
    };
    let run = run(asm, cases, config).await;
    assert_eq!(run.summary().total, 3);

    let starting: Vec<String> = run
        .messages
        .iter()
        .filter_map(|message| match message {
            RunnerMessage::CollectionStarting { owners, .. } => owners.collection_id.clone(),
            _ => None,
        })
        .collect();
    assert_eq!(starting, vec!["col-0", "col-1", "col-2"]);
}

#[tokio::test]
async fn async_bus_sink_failure_surfaces_as_engine_error() {
    let asm = assembly("asm");
    let col = collection("col", &asm);
    let cls = class("cls", "Doomed", &col);
    let met = method("met", "works", &cls);

    let sink = Arc::new(FailingSink::new("test_passed"));
    let result = AssemblyRunner::new(asm, vec![passing_case("case", &met)], sink)
        .with_config(ExecutionConfig::default())
        .run()
        .await;

    let error = result.unwrap_err();
    assert!(matches!(error.source, crate::bus::BusError::Sink { .. }));
}

#[tokio::test]
async fn diagnostic_sink_injection_publishes_through_the_bus() {
    let asm = assembly("asm");
    let col = collection("col", &asm);
    let cls = Arc::new(
        TestClass::new("cls", "Noisy", col).with_constructor(ClassConstructor::new(
            vec![ParameterDescriptor::new("DiagnosticSink", "diagnostics")],
            |args| {
                let sink = args[0]
                    .as_diagnostic_sink()
                    .ok_or_else(|| Failure::new("CastError", "expected DiagnosticSink"))?;
                sink.send("hello from the constructor");
                Ok(Arc::new(ServiceInstance {
                    db_name: String::new(),
                }) as Arc<dyn TestInstance>)
            },
        )),
    );
    let met = method("met", "works", &cls);
    let case = Arc::new(TestCase::new("case", met, |_| {
        Box::pin(async { Ok(String::new()) })
    }));

    let run = run(asm, vec![case], serial_config()).await;
    assert_eq!(run.summary().failed, 0);
    assert!(run.messages.iter().any(|message| matches!(
        message,
        RunnerMessage::Diagnostic { message } if message == "hello from the constructor"
    )));
}
