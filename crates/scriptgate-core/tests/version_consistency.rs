//! Every workspace member inherits the workspace version, and internal
//! crates are pinned to it in `[workspace.dependencies]`.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap()
        .to_path_buf()
}

fn read_toml(path: &Path) -> toml::Value {
    let raw = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    raw.parse()
        .unwrap_or_else(|e| panic!("invalid TOML in {}: {e}", path.display()))
}

fn members() -> Vec<String> {
    let doc = read_toml(&workspace_root().join("Cargo.toml"));
    doc["workspace"]["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap().to_string())
        .collect()
}

#[test]
fn members_inherit_workspace_version() {
    let members = members();
    assert!(members.iter().any(|m| m.ends_with("scriptgate-core")));

    for member in members {
        let doc = read_toml(&workspace_root().join(&member).join("Cargo.toml"));
        let inherits = doc["package"]["version"]
            .get("workspace")
            .and_then(|v| v.as_bool())
            == Some(true);
        assert!(inherits, "{member} should use version.workspace = true");
    }
}

#[test]
fn internal_crates_pin_the_workspace_version() {
    let doc = read_toml(&workspace_root().join("Cargo.toml"));
    let ws_version = doc["workspace"]["package"]["version"].as_str().unwrap();
    assert_eq!(ws_version, env!("CARGO_PKG_VERSION"));

    let deps = doc["workspace"]["dependencies"].as_table().unwrap();
    for name in ["scriptgate-core", "scriptgate-state"] {
        let dep = &deps[name];
        assert_eq!(
            dep["version"].as_str(),
            Some(ws_version),
            "{name} entry in [workspace.dependencies] is out of date"
        );
        assert!(dep.get("path").is_some());
    }
}
