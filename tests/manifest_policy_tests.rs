#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests.
//!
//! Verifies that Cargo.toml keeps the panic-free lint set, the feature layout
//! the demos rely on and an MSRV that the README agrees with. Synchronous
//! filesystem reads only.

use std::path::PathBuf;

fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn read_project_file(relative_path: &str) -> String {
    let path = project_root().join(relative_path);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read '{}': {e}", path.display()))
}

fn manifest() -> toml::Table {
    read_project_file("Cargo.toml")
        .parse::<toml::Table>()
        .expect("Cargo.toml must parse")
}

mod panic_policy {
    use super::*;

    const DENIED: &[&str] = &[
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ];

    #[test]
    fn panic_prone_lints_are_denied() {
        let manifest = manifest();
        let clippy = manifest["lints"]["clippy"]
            .as_table()
            .expect("Cargo.toml needs a [lints.clippy] table");
        for lint in DENIED {
            assert_eq!(
                clippy.get(*lint).and_then(toml::Value::as_str),
                Some("deny"),
                "clippy::{lint} must be set to deny"
            );
        }
    }
}

mod feature_policy {
    use super::*;

    #[test]
    fn default_features_enable_network_surfaces() {
        let manifest = manifest();
        let default: Vec<&str> = manifest["features"]["default"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(toml::Value::as_str)
            .collect();
        assert!(default.contains(&"transport-websocket"));
        assert!(default.contains(&"lobby-api"));
    }

    #[test]
    fn optional_dependencies_are_feature_gated() {
        let manifest = manifest();
        let deps = manifest["dependencies"].as_table().unwrap();
        for (name, spec) in deps {
            let optional = spec
                .get("optional")
                .and_then(toml::Value::as_bool)
                .unwrap_or(false);
            if !optional {
                continue;
            }
            let gated = manifest["features"]
                .as_table()
                .unwrap()
                .values()
                .filter_map(toml::Value::as_array)
                .flatten()
                .filter_map(toml::Value::as_str)
                .any(|entry| entry == format!("dep:{name}"));
            assert!(gated, "optional dependency '{name}' is not enabled by any feature");
        }
    }

    #[test]
    fn optional_dependencies_are_not_dev_dependencies() {
        let manifest = manifest();
        let deps = manifest["dependencies"].as_table().unwrap();
        let dev = manifest["dev-dependencies"].as_table().unwrap();
        for (name, spec) in deps {
            let optional = spec
                .get("optional")
                .and_then(toml::Value::as_bool)
                .unwrap_or(false);
            assert!(
                !(optional && dev.contains_key(name)),
                "optional dependency '{name}' is also a dev-dependency, which hides a missing feature gate"
            );
        }
    }

    #[test]
    fn network_demo_requires_websocket_feature() {
        let manifest = manifest();
        let examples = manifest["example"].as_array().unwrap();
        let play = examples
            .iter()
            .find(|e| e["name"].as_str() == Some("play_session"))
            .expect("play_session demo must be declared");
        let required: Vec<&str> = play["required-features"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(toml::Value::as_str)
            .collect();
        assert!(required.contains(&"transport-websocket"));
    }

    #[test]
    fn declared_demos_exist() {
        let manifest = manifest();
        for example in manifest["example"].as_array().unwrap() {
            let path = example["path"].as_str().unwrap();
            assert!(project_root().join(path).is_file(), "demo '{path}' is missing");
        }
    }
}

mod msrv_policy {
    use super::*;

    #[test]
    fn readme_states_the_manifest_msrv() {
        let manifest = manifest();
        let version = manifest["package"]["rust-version"]
            .as_str()
            .expect("Cargo.toml must declare a rust-version");
        let readme = read_project_file("README.md");
        assert!(
            readme.contains(version),
            "README.md does not mention the MSRV '{version}' from Cargo.toml"
        );
    }
}
