//! Analysis orchestration: concurrent tool execution and result merging.

mod aggregator;

pub use aggregator::Aggregator;

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::models::AnalysisResult;

/// Runs a set of analysis tools against an artifact and merges their
/// findings into one [`AnalysisResult`].
///
/// The fix orchestrator depends on this seam rather than on the concrete
/// [`Aggregator`], so reanalysis can be scripted in tests.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyzes the artifact with the requested tools.
    ///
    /// `timeout` overrides each tool's default timeout when set. The
    /// cancellation token propagates to every in-flight tool worker.
    async fn analyze(
        &self,
        artifact: &str,
        artifact_id: &str,
        tools: &[String],
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> AnalysisResult;
}
