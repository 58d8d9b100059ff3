mod common;

use std::collections::{HashSet, VecDeque};

use atlas_runtime::normalize::{build_marker_set, build_marker_sets, build_update_response};
use atlas_runtime::raw::RawRecord;
use atlas_runtime::{classify_updates, ChatEvent, MarkerSetUpdates, Player, UpdateOp};
use serde_json::json;

const WATERMARK: i64 = 2000;

fn snapshot_store() -> atlas_runtime::AtlasStore {
    let mut store = common::store_on_overworld().unwrap();
    let snapshot = common::load_fixture("markers_world.json").unwrap();
    store.set_marker_sets(build_marker_sets(&snapshot));
    store.set_update_timestamp(WATERMARK);
    store
}

fn apply_players(store: &mut atlas_runtime::AtlasStore, players: Vec<Player>) {
    let keep: HashSet<String> = players.iter().map(|player| player.account.clone()).collect();
    let mut incoming: VecDeque<Player> = players.into();
    while store.set_players_batch(&mut incoming) > 0 {}
    store.sync_players(&keep);
}

#[test]
fn update_feed_classifies_against_watermark() {
    let raw = common::load_fixture("update_feed.json").unwrap();
    let classified = classify_updates(raw["updates"].as_array().unwrap(), WATERMARK);

    assert_eq!(classified.accepted, 7);
    let rejections = classified.rejections;
    assert_eq!(rejections.stale, 3);
    assert_eq!(rejections.unknown_component_type, 1);
    assert_eq!(rejections.unsupported_source, 1);
    assert_eq!(rejections.incomplete, 1);
    assert_eq!(rejections.unknown_entry_type, 1);
    assert_eq!(rejections.total(), 7);

    let updates = &classified.updates;
    let sets: Vec<&str> = updates.marker_sets.keys().map(String::as_str).collect();
    assert_eq!(sets, vec!["ghosts", "portals", "shops", "towns"]);
    assert!(updates.marker_sets["portals"].removed);
    assert_eq!(updates.marker_sets["shops"].payload.as_ref().unwrap().label, "Shops");

    // Nothing older than the watermark survives.
    let towns = &updates.marker_sets["towns"];
    assert!(towns.markers.iter().all(|op| op.id() != "ancient"));
    assert_eq!(updates.tiles.len(), 1);
    assert!(updates.chat.iter().all(|message| message.timestamp >= WATERMARK));

    let stamps: Vec<i64> = updates.chat.iter().map(|message| message.timestamp).collect();
    assert_eq!(stamps, vec![2990, 2950, 2900]);
    assert!(matches!(updates.chat[0].event, ChatEvent::PlayerJoin { .. }));
}

#[test]
fn update_cycle_reconciles_into_store() {
    let mut store = snapshot_store();
    let raw = common::load_fixture("update_feed.json").unwrap();
    let update = build_update_response(&raw, store.update_timestamp());

    store.add_marker_set_updates(update.updates.marker_sets);
    store.add_tile_updates(update.updates.tiles);
    store.add_chat(update.updates.chat);
    apply_players(&mut store, update.players);
    store.set_world_state(update.world_state);
    store.set_update_timestamp(update.timestamp);

    let towns = store.marker_set("towns").unwrap();
    assert_eq!(towns.markers.len(), 1);
    assert_eq!(towns.markers["spawn"].label, "New Spawn");
    assert_eq!(towns.areas.len(), 1);
    assert_eq!(store.pending_set_updates("towns").unwrap().markers.len(), 2);

    let shops = store.marker_set("shops").unwrap();
    assert_eq!(shops.info.label, "Shops");
    assert_eq!(shops.markers["bakery"].label, "Bakery");

    assert!(store.marker_set("portals").is_none());
    assert!(store.pending_set_updates("portals").is_none());
    assert!(store.marker_set("ghosts").is_none());

    assert_eq!(store.pending_tile_updates().len(), 1);
    assert_eq!(store.chat_messages().len(), 3);
    assert_eq!(store.update_timestamp(), 3000);
    assert!(store.world_state().raining);
    assert_eq!(store.world_state().time_of_day, 12000);

    let order: Vec<&str> = store.sorted_players().map(|player| player.account.as_str()).collect();
    assert_eq!(order, vec!["c", "a", "b"]);
    let hidden = store.player("c").unwrap();
    assert!(hidden.hidden);
    assert!(hidden.location.world.is_none());
}

#[test]
fn missing_set_without_payload_leaves_store_unchanged() {
    let mut store = snapshot_store();
    let before = store.marker_sets().clone();

    let diff = MarkerSetUpdates {
        markers: vec![UpdateOp::Remove {
            id: "spawn".to_string(),
        }],
        ..MarkerSetUpdates::default()
    };
    store.add_marker_set_updates(vec![("nowhere".to_string(), diff)]);

    assert_eq!(store.marker_sets(), &before);
    assert!(store.pending_set_updates("nowhere").is_none());
}

#[test]
fn repeated_diff_is_idempotent_but_queued_each_time() {
    let mut store = snapshot_store();
    let feed = json!([
        {"type": "component", "ctype": "markers", "msg": "markerupdated", "set": "towns", "id": "spawn", "label": "Moved", "x": 99, "timestamp": 2100}
    ]);
    let entries = feed.as_array().unwrap();

    store.add_marker_set_updates(classify_updates(entries, WATERMARK).updates.marker_sets);
    let once = store.marker_set("towns").unwrap().clone();
    store.add_marker_set_updates(classify_updates(entries, WATERMARK).updates.marker_sets);

    assert_eq!(store.marker_set("towns").unwrap(), &once);
    assert_eq!(once.markers["spawn"].location.x, 99.0);
    assert_eq!(store.pending_set_updates("towns").unwrap().markers.len(), 2);

    let popped = store.pop_marker_updates("towns", 5);
    assert_eq!(popped.len(), 2);
    assert!(store.pending_set_updates("towns").unwrap().is_empty());
}

#[test]
fn built_set_is_removed_with_its_queue() {
    let mut store = common::store_on_overworld().unwrap();
    let raw = json!({"label": "Claims", "markers": {"home": {"label": "Home"}}});
    store.set_marker_sets(vec![build_marker_set("claims", RawRecord::new(&raw))]);
    assert_eq!(store.marker_set("claims").unwrap().markers.len(), 1);
    assert!(store.pending_set_updates("claims").is_some());

    let removal = MarkerSetUpdates {
        removed: true,
        ..MarkerSetUpdates::default()
    };
    store.add_marker_set_updates(vec![("claims".to_string(), removal)]);

    assert!(store.marker_set("claims").is_none());
    assert!(store.pending_set_updates("claims").is_none());
}

#[test]
fn tile_update_respects_watermark() {
    const T: i64 = 5_000;
    let feed = json!([{"type": "tile", "name": "world/0_0", "timestamp": T}]);
    let entries = feed.as_array().unwrap();
    let mut store = common::store_on_overworld().unwrap();

    let fresh = classify_updates(entries, T - 1);
    assert_eq!(fresh.rejections.total(), 0);
    store.add_tile_updates(fresh.updates.tiles);
    assert_eq!(store.pending_tile_updates().len(), 1);
    assert_eq!(store.pending_tile_updates()[0].name, "world/0_0");

    let stale = classify_updates(entries, T + 1);
    assert_eq!(stale.rejections.stale, 1);
    store.add_tile_updates(stale.updates.tiles);
    assert_eq!(store.pending_tile_updates().len(), 1);
}

#[test]
fn switching_real_world_drops_marker_and_tile_state() {
    let mut store = snapshot_store();
    store.add_tile_updates(vec![atlas_runtime::TileUpdate {
        name: "world/flat/0_0.png".to_string(),
        timestamp: 2500,
    }]);
    assert!(store.map("world_flat__world_nether").is_some());

    // Same display world, but content comes from the nether.
    store
        .set_current_map("world", "flat__world_nether", "world_nether")
        .unwrap();

    assert!(store.marker_sets().is_empty());
    assert!(store.pending_tile_updates().is_empty());
    assert_eq!(store.current_world().unwrap().name, "world_nether");
    assert_eq!(store.current_map().unwrap().display_name, "flat");
    assert_eq!(store.current_map_ref().unwrap().world, "world");
}
