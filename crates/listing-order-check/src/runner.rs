//! One complete check run: launch, collect, validate, report, clean up.

use std::time::Instant;

use listing_order::{validate_with, LabelParser};

use crate::collect::collect;
use crate::config::CheckConfig;
use crate::error::CheckError;
use crate::page::{self, ListingPage, Renderer};
use crate::report::{capture_artifact, ArtifactContext, RunFailure, RunReport};

/// Run a check with the engine the configuration selects.
///
/// The engine is shut down on every path out of this function.
pub async fn run(config: &CheckConfig) -> Result<RunReport, RunFailure> {
    let started = Instant::now();
    let fail = |error: CheckError| RunFailure {
        error,
        elapsed: started.elapsed(),
        artifact: None,
    };

    config.validate().map_err(fail)?;
    let mut renderer = page::launch(config)
        .await
        .map_err(|e| fail(CheckError::Page(e)))?;

    let outcome = run_with_renderer(renderer.as_ref(), config, started).await;

    if let Err(e) = renderer.shutdown().await {
        tracing::warn!("engine shutdown failed: {e:#}");
    }
    outcome
}

/// Open one page on `renderer`, check it, and always close it.
pub async fn run_with_renderer(
    renderer: &dyn Renderer,
    config: &CheckConfig,
    started: Instant,
) -> Result<RunReport, RunFailure> {
    let page = renderer.open_page().await.map_err(|e| RunFailure {
        error: CheckError::Page(e),
        elapsed: started.elapsed(),
        artifact: None,
    })?;

    // Captured once; every label in the run is measured against it.
    let parser = LabelParser::starting_now();
    let outcome = check_page(page.as_ref(), config, &parser, started).await;

    if let Err(e) = page.close().await {
        tracing::warn!("page close failed: {e:#}");
    }
    outcome
}

/// Collect and validate on an already open page.
///
/// A failed validation captures a `validation_failed` screenshot; an error
/// captures a `runtime_error` screenshot before being returned.
pub async fn check_page(
    page: &dyn ListingPage,
    config: &CheckConfig,
    parser: &LabelParser,
    started: Instant,
) -> Result<RunReport, RunFailure> {
    match collect(page, config, parser).await {
        Ok(collection) => {
            let verdict = validate_with(&collection.entries, config.scan_mode);
            let artifact = if verdict.sorted {
                None
            } else {
                capture_artifact(page, &config.artifact_dir, ArtifactContext::ValidationFailed)
                    .await
            };

            if verdict.sorted {
                tracing::info!("{} entries are ordered newest first", collection.entries.len());
            } else {
                tracing::warn!(
                    "ordering violated: {} inversion(s)",
                    verdict.inversions.len()
                );
            }

            Ok(RunReport::new(
                &config.url,
                &collection,
                verdict,
                artifact,
                started.elapsed(),
            ))
        }
        Err(error) => {
            tracing::error!("run failed: {error:?}");
            let artifact =
                capture_artifact(page, &config.artifact_dir, ArtifactContext::RuntimeError).await;
            Err(RunFailure {
                error,
                elapsed: started.elapsed(),
                artifact,
            })
        }
    }
}
