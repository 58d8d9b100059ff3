use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use atlas_runtime::normalize::build_worlds;
use atlas_runtime::AtlasStore;
use serde_json::Value;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn load_fixture(name: &str) -> Result<Value> {
    let path = fixture_path(name);
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("missing fixture at {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("invalid fixture {}", name))
}

/// Store with the fixture worlds loaded and the overworld's flat map selected.
#[allow(dead_code)]
pub fn store_on_overworld() -> Result<AtlasStore> {
    let configuration = load_fixture("configuration.json")?;
    let mut store = AtlasStore::new();
    store.set_worlds(build_worlds(&configuration));
    store.set_current_map("world", "flat", "world")?;
    Ok(store)
}
