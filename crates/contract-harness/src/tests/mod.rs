mod artifact_tests;
mod scripted_node;

use std::path::PathBuf;
use std::sync::Arc;

use alloy::dyn_abi::DynSolValue;

use crate::artifacts::{Artifact, ArtifactLoader};
use crate::config::HarnessConfig;
use crate::session::TestSession;
use scripted_node::ScriptedNode;

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures").join("artifacts")
}

pub fn inbox_artifact() -> Artifact {
    Artifact::from_json("Inbox", include_str!("../../fixtures/artifacts/Inbox.json")).unwrap()
}

pub fn string_arg(value: &str) -> DynSolValue {
    DynSolValue::String(value.to_string())
}

/// Config with short timeouts so failures surface quickly.
pub fn fast_config() -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.session.confirmation_timeout_ms = 300;
    config.session.poll_interval_ms = 10;
    config.session.case_timeout_ms = 2_000;
    config
}

pub fn scripted_node() -> Arc<ScriptedNode> {
    Arc::new(ScriptedNode::new(inbox_artifact()))
}

pub async fn scripted_session(node: Arc<ScriptedNode>) -> TestSession<ScriptedNode> {
    let mut artifacts = ArtifactLoader::new();
    artifacts.insert(inbox_artifact());
    TestSession::init(node, fast_config()).await.unwrap().with_artifacts(artifacts)
}
