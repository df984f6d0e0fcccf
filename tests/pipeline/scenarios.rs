//! BDD scenarios for the migration pipeline.

use rstest_bdd_macros::scenario;

use super::test_helpers::{PipelineContext, pipeline_context};

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Stream failures are reported without stopping other streams"
)]
fn scenario_stream_failures_reported(pipeline_context: PipelineContext) {
    let _ = pipeline_context;
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Provisioning failure aborts the run"
)]
fn scenario_provisioning_failure(pipeline_context: PipelineContext) {
    let _ = pipeline_context;
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Healthy agents pass the gate without waiting"
)]
fn scenario_healthy_agents(pipeline_context: PipelineContext) {
    let _ = pipeline_context;
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Offline agents hold back the launch"
)]
fn scenario_offline_agents(pipeline_context: PipelineContext) {
    let _ = pipeline_context;
}
