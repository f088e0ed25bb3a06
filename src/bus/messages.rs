//! Lifecycle messages reported over the message bus.
//!
//! Every unit of work emits a `*Starting`/`*Finished` pair; leaf tests add
//! `TestPassed`/`TestFailed`/`TestSkipped`, and composite levels report
//! finishing-phase problems through their `*CleanupFailure` variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{FailureInfo, RunSummary};

/// Identities up the parent chain, populated to the depth of the reporting
/// level.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerChain {
    pub assembly_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
}

impl OwnerChain {
    pub fn assembly(assembly_id: impl Into<String>) -> Self {
        Self {
            assembly_id: assembly_id.into(),
            ..Self::default()
        }
    }

    pub fn collection(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_id = Some(collection_id.into());
        self
    }

    pub fn class(mut self, class_id: impl Into<String>) -> Self {
        self.class_id = Some(class_id.into());
        self
    }

    pub fn method(mut self, method_id: impl Into<String>) -> Self {
        self.method_id = Some(method_id.into());
        self
    }

    pub fn case(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }
}

/// The strictly-typed lifecycle event stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunnerMessage {
    AssemblyStarting {
        owners: OwnerChain,
        display_name: String,
        /// Engine name, version and parallelization mode description
        environment: String,
        started_at: DateTime<Utc>,
    },
    AssemblyFinished {
        owners: OwnerChain,
        summary: RunSummary,
    },
    AssemblyCleanupFailure {
        owners: OwnerChain,
        failure: FailureInfo,
    },

    CollectionStarting {
        owners: OwnerChain,
        display_name: String,
    },
    CollectionFinished {
        owners: OwnerChain,
        summary: RunSummary,
    },
    CollectionCleanupFailure {
        owners: OwnerChain,
        failure: FailureInfo,
    },

    ClassStarting {
        owners: OwnerChain,
        class_name: String,
    },
    ClassFinished {
        owners: OwnerChain,
        summary: RunSummary,
    },
    ClassCleanupFailure {
        owners: OwnerChain,
        failure: FailureInfo,
    },

    MethodStarting {
        owners: OwnerChain,
        method_name: String,
    },
    MethodFinished {
        owners: OwnerChain,
        summary: RunSummary,
    },
    MethodCleanupFailure {
        owners: OwnerChain,
        failure: FailureInfo,
    },

    CaseStarting {
        owners: OwnerChain,
        display_name: String,
    },
    CaseFinished {
        owners: OwnerChain,
        summary: RunSummary,
    },
    CaseCleanupFailure {
        owners: OwnerChain,
        failure: FailureInfo,
    },

    TestStarting {
        owners: OwnerChain,
        display_name: String,
    },
    TestPassed {
        owners: OwnerChain,
        display_name: String,
        /// Seconds
        execution_time: f64,
        output: String,
    },
    TestFailed {
        owners: OwnerChain,
        display_name: String,
        execution_time: f64,
        output: String,
        failure: FailureInfo,
    },
    TestSkipped {
        owners: OwnerChain,
        display_name: String,
        reason: String,
        /// Always zero; a skipped body is never invoked
        execution_time: f64,
    },
    TestFinished {
        owners: OwnerChain,
        display_name: String,
        execution_time: f64,
        output: String,
    },
    TestCleanupFailure {
        owners: OwnerChain,
        display_name: String,
        failure: FailureInfo,
    },

    /// Out-of-band engine diagnostics (orderer failures, resolution fallbacks)
    Diagnostic {
        message: String,
    },
}

impl RunnerMessage {
    /// Stable name of the message variant, used in error reporting
    pub fn type_name(&self) -> &'static str {
        match self {
            RunnerMessage::AssemblyStarting { .. } => "assembly_starting",
            RunnerMessage::AssemblyFinished { .. } => "assembly_finished",
            RunnerMessage::AssemblyCleanupFailure { .. } => "assembly_cleanup_failure",
            RunnerMessage::CollectionStarting { .. } => "collection_starting",
            RunnerMessage::CollectionFinished { .. } => "collection_finished",
            RunnerMessage::CollectionCleanupFailure { .. } => "collection_cleanup_failure",
            RunnerMessage::ClassStarting { .. } => "class_starting",
            RunnerMessage::ClassFinished { .. } => "class_finished",
            RunnerMessage::ClassCleanupFailure { .. } => "class_cleanup_failure",
            RunnerMessage::MethodStarting { .. } => "method_starting",
            RunnerMessage::MethodFinished { .. } => "method_finished",
            RunnerMessage::MethodCleanupFailure { .. } => "method_cleanup_failure",
            RunnerMessage::CaseStarting { .. } => "case_starting",
            RunnerMessage::CaseFinished { .. } => "case_finished",
            RunnerMessage::CaseCleanupFailure { .. } => "case_cleanup_failure",
            RunnerMessage::TestStarting { .. } => "test_starting",
            RunnerMessage::TestPassed { .. } => "test_passed",
            RunnerMessage::TestFailed { .. } => "test_failed",
            RunnerMessage::TestSkipped { .. } => "test_skipped",
            RunnerMessage::TestFinished { .. } => "test_finished",
            RunnerMessage::TestCleanupFailure { .. } => "test_cleanup_failure",
            RunnerMessage::Diagnostic { .. } => "diagnostic",
        }
    }
}
