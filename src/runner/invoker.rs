//! Leaf invocation: class instance, hooks, the test body, disposal.

use std::sync::Arc;
use std::time::Duration;

use crate::aggregator::ExceptionAggregator;
use crate::fixtures::TestInstance;
use crate::model::{Failure, TestCase, TestHook};
use crate::runner::InstanceFactory;
use crate::utils::Timer;

/// Everything the invoker observed for one test
pub(crate) struct InvocationOutcome {
    /// Wall-clock seconds from instance construction through disposal
    pub elapsed: f64,
    pub output: String,
    /// Failure attributed to the test itself (construction, hooks, body)
    pub failure: Option<Failure>,
    /// Failure attributed to instance disposal, reported separately as a
    /// test cleanup failure
    pub cleanup_failure: Option<Failure>,
}

/// Construct the test-class instance, wrap the body in before/after hooks,
/// invoke it, and dispose the instance regardless of outcome.
///
/// After-hooks run in strict reverse of before-hooks and only for hooks
/// whose before succeeded. The body runs only when construction and every
/// before-hook succeeded.
pub(crate) async fn invoke_test(
    case: &Arc<TestCase>,
    display_name: &str,
    hooks: &[Arc<dyn TestHook>],
    factory: Option<&InstanceFactory>,
) -> InvocationOutcome {
    let mut aggregator = ExceptionAggregator::new();
    let timer = Timer::start(display_name.to_string());
    let mut output = String::new();

    let instance: Option<Arc<dyn TestInstance>> = match factory {
        Some(factory) => aggregator.run(|| factory.construct()),
        None => None,
    };
    let construction_failed = factory.is_some() && instance.is_none();

    if !construction_failed {
        let mut succeeded_befores: Vec<&Arc<dyn TestHook>> = Vec::new();
        for hook in hooks {
            if aggregator.run(|| hook.before(display_name)).is_some() {
                succeeded_befores.push(hook);
            } else {
                break;
            }
        }

        if !aggregator.has_failures() {
            if case.arguments.len() != case.method.parameter_count {
                aggregator.add(Failure::configuration(format!(
                    "the test method expected {} parameter value(s), but {} parameter value(s) were provided",
                    case.method.parameter_count,
                    case.arguments.len()
                )));
            } else if let Some(captured) =
                aggregator.run_async(case.invoke(instance.clone())).await
            {
                output = captured;
            }
        }

        for hook in succeeded_befores.iter().rev() {
            aggregator.run(|| hook.after(display_name));
        }
    }

    let mut cleanup = ExceptionAggregator::new();
    if let Some(instance) = &instance {
        cleanup.run_async(instance.dispose_async()).await;
        cleanup.run(|| instance.dispose());
    }

    let elapsed = timer.stop().as_secs_f64();
    InvocationOutcome {
        elapsed,
        output,
        failure: aggregator.to_failure(),
        cleanup_failure: cleanup.to_failure(),
    }
}

/// Summary time for one invocation
pub(crate) fn elapsed_duration(seconds: f64) -> Duration {
    Duration::from_secs_f64(seconds.max(0.0))
}
