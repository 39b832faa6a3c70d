use std::fs;

use test_case::test_case;

use super::fixtures_dir;
use crate::artifacts::{Artifact, ArtifactLoader};
use crate::errors::HarnessError;

#[test_case("Inbox", 2, true ; "solc compile output")]
#[test_case("Store", 2, true ; "hardhat artifact")]
#[test_case("Reverter", 0, true ; "foundry artifact")]
fn fixture_artifacts_load(name: &str, functions: usize, has_constructor: bool) {
    let loader = ArtifactLoader::from_dir(fixtures_dir()).unwrap();
    let artifact = loader.load(name).unwrap();
    assert_eq!(artifact.name, name);
    assert_eq!(artifact.abi.functions().count(), functions);
    assert_eq!(artifact.abi.constructor.is_some(), has_constructor);
    assert!(!artifact.bytecode.is_empty());
}

#[test]
fn unknown_artifact_is_not_found() {
    let loader = ArtifactLoader::from_dir(fixtures_dir()).unwrap();
    let error = loader.load("Lottery").unwrap_err();
    assert_eq!(error.current_context(), &HarnessError::ArtifactNotFound("Lottery".into()));
    assert!(format!("{:?}", error).contains("Known artifacts: Inbox, Reverter, Store"));
}

#[test]
fn scan_skips_debug_files_and_build_info() {
    let dir = tempfile::tempdir().unwrap();
    let contract_dir = dir.path().join("contracts").join("Store.sol");
    fs::create_dir_all(&contract_dir).unwrap();
    fs::create_dir_all(dir.path().join("build-info")).unwrap();

    fs::copy(fixtures_dir().join("Store.json"), contract_dir.join("Store.json")).unwrap();
    fs::write(
        contract_dir.join("Store.dbg.json"),
        r#"{"_format":"hh-sol-dbg-1","buildInfo":"../../build-info/abc.json"}"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("build-info").join("abc.json"),
        r#"{"contractName":"Shadow","abi":[],"bytecode":"0x6080"}"#,
    )
    .unwrap();
    fs::write(dir.path().join("notes.json"), r#"{"hello":"world"}"#).unwrap();

    let loader = ArtifactLoader::from_dir(dir.path()).unwrap();
    assert_eq!(loader.names().collect::<Vec<_>>(), vec!["Store"]);
    assert!(!loader.contains("Shadow"));
}

#[test]
fn unlinked_bytecode_is_invalid_on_load() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("Vault.json"),
        r#"{"abi":[],"bytecode":{"object":"0x6080__$1234567890abcdef1234567890abcdef12$__6040"}}"#,
    )
    .unwrap();

    let loader = ArtifactLoader::from_dir(dir.path()).unwrap();
    assert!(loader.contains("Vault"));
    let error = loader.load("Vault").unwrap_err();
    match error.current_context() {
        HarnessError::InvalidArtifact { name, reason } => {
            assert_eq!(name, "Vault");
            assert!(reason.contains("unlinked"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn interface_does_not_shadow_implementation() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("a")).unwrap();
    fs::create_dir_all(dir.path().join("b")).unwrap();
    fs::write(
        dir.path().join("a").join("Token.json"),
        r#"{"abi":[],"bytecode":{"object":"0x6080"}}"#,
    )
    .unwrap();
    fs::write(dir.path().join("b").join("Token.json"), r#"{"abi":[],"bytecode":{"object":"0x"}}"#)
        .unwrap();

    let loader = ArtifactLoader::from_dir(dir.path()).unwrap();
    assert_eq!(loader.load("Token").unwrap().bytecode.len(), 2);
}

#[test]
fn missing_directory_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let error = ArtifactLoader::from_dir(dir.path().join("out")).unwrap_err();
    assert!(matches!(error.current_context(), HarnessError::Config(_)));
}

#[test]
fn inserted_artifacts_replace_scanned_ones() {
    let mut loader = ArtifactLoader::from_dir(fixtures_dir()).unwrap();
    let reverter = loader.load("Reverter").unwrap();
    loader.insert(Artifact::new("Store", reverter.abi.clone(), reverter.bytecode.clone()));
    assert_eq!(loader.load("Store").unwrap().bytecode, reverter.bytecode);
    assert_eq!(loader.len(), 3);
}

#[test]
fn malformed_json_is_invalid_artifact() {
    let error = Artifact::from_json("Broken", "{ not json").unwrap_err();
    assert!(matches!(
        error.current_context(),
        HarnessError::InvalidArtifact { name, .. } if name == "Broken"
    ));
}
