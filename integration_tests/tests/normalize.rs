mod common;

use atlas_runtime::normalize::{build_configuration, build_marker_sets, build_server_config};
use atlas_runtime::MessageBundle;
use serde_json::json;

#[test]
fn configuration_fixture_normalizes() {
    let raw = common::load_fixture("configuration.json").unwrap();
    let mut bundle = MessageBundle::new();
    bundle.insert("chatTitle".to_string(), "Chat".to_string());
    bundle.insert("chatPlayerJoin".to_string(), "someone joined".to_string());

    let response = build_configuration(&raw, &bundle);

    let config = &response.config;
    assert_eq!(config.title, "Server");
    assert_eq!(config.version, "3.0");
    assert_eq!(config.update_interval, 2000);
    assert!(!config.show_layer_control);
    assert!(config.expand_ui);
    assert_eq!(config.max_players, 20);
    assert_eq!(config.hash, 184467);
    assert_eq!(config.default_world.as_deref(), Some("world"));

    let messages = &response.messages;
    assert_eq!(messages.chat_title, "Chat");
    assert_eq!(messages.chat_player_join, "%playername% joined");
    assert_eq!(
        messages.chat_error_cooldown,
        "You may only chat once every %interval% seconds."
    );
    assert_eq!(messages.chat_player_quit, "");

    let components = &response.components;
    assert!(components.markers.show_labels);
    assert!(components.player_markers.as_ref().unwrap().show_health);
    let chat = components.chat_sending.unwrap();
    assert_eq!(chat.cooldown, 10);
    assert_eq!(chat.max_length, 256);
    let chat_box = components.chat_box.unwrap();
    assert_eq!(chat_box.message_lifetime, Some(5));
    assert_eq!(chat_box.message_history, Some(100));
    let clock = components.clock_control.unwrap();
    assert!(clock.show_time_of_day && clock.show_weather);
    assert!(!components.link_control);
}

#[test]
fn colliding_map_names_get_source_world_suffix() {
    let raw = common::load_fixture("configuration.json").unwrap();
    let response = build_configuration(&raw, &MessageBundle::new());

    let names: Vec<&str> = response.worlds.iter().map(|world| world.name.as_str()).collect();
    assert_eq!(names, vec!["world", "world_nether", "world_the_end"]);

    let overworld = &response.worlds[0];
    let keys: Vec<&str> = overworld.maps.iter().map(|map| map.name.as_str()).collect();
    assert_eq!(keys, vec!["flat", "surface", "flat__world_nether"]);
    assert_eq!(overworld.sea_level, 63);
    assert_eq!(overworld.center.y, 64.0);

    let borrowed = overworld.map("flat__world_nether").unwrap();
    assert_eq!(borrowed.display_name, "flat");
    assert_eq!(borrowed.world, "world_nether");
    assert_eq!(borrowed.append_to_world, "world");
    assert_eq!(borrowed.prefix, "nflat");

    let native = overworld.map("flat").unwrap();
    assert_eq!(native.native_zoom_levels, 6);
    assert_eq!(native.image_format, "png");
    assert_eq!(native.map_to_world, [0.0; 9]);

    let nether = &response.worlds[1];
    assert_eq!(nether.sea_level, 64);
    assert_eq!(nether.height, 256);
    assert_eq!(nether.maps.len(), 1);
    assert_eq!(nether.maps[0].name, "cave");

    // Owner world does not exist.
    assert!(response.worlds[2].maps.is_empty());
}

#[test]
fn minimal_configuration_takes_defaults() {
    let raw = json!({"title": "§4Server§r", "dynmapversion": "3.0", "worlds": []});
    let response = build_configuration(&raw, &MessageBundle::new());

    assert_eq!(response.config.title, "Server");
    assert_eq!(response.config.version, "3.0");
    assert_eq!(response.config.update_interval, 3000);
    assert_eq!(response.config.default_zoom, 0);
    assert!(response.config.default_map.is_none());
    assert!(!response.logged_in);
    assert!(response.worlds.is_empty());
    assert!(response.components.chat_sending.is_none());
}

#[test]
fn layer_control_flag_accepts_string_booleans() {
    let flag = |value: serde_json::Value| build_server_config(&json!({"showlayercontrol": value})).show_layer_control;
    assert!(!flag(json!("false")));
    assert!(flag(json!("true")));
    assert!(flag(json!(true)));
    assert!(!flag(json!(false)));
    assert!(!build_server_config(&json!({})).show_layer_control);
}

#[test]
fn chat_component_requires_web_chat() {
    let raw = json!({"components": [{"type": "chat"}]});
    let response = build_configuration(&raw, &MessageBundle::new());
    assert!(response.components.chat_sending.is_none());
}

#[test]
fn marker_snapshot_fixture_normalizes() {
    let raw = common::load_fixture("markers_world.json").unwrap();
    let mut sets = build_marker_sets(&raw);
    sets.sort_by(|a, b| a.id().cmp(b.id()));

    let portals = &sets[0];
    assert_eq!(portals.id(), "portals");
    assert_eq!(portals.info.label, "Unnamed set");
    assert!(portals.info.hidden);
    assert_eq!(portals.circles["nether"].radius, [3.0, 3.0]);
    assert_eq!(portals.circles["nether"].style.color, "#ff0000");

    let towns = &sets[1];
    assert_eq!(towns.info.label, "Towns");
    assert_eq!(towns.info.priority, 2);
    assert_eq!(towns.info.show_labels, Some(true));
    assert_eq!(towns.shape_count(), 4);

    let spawn = &towns.markers["spawn"];
    assert_eq!(spawn.icon, "house");
    assert_eq!(spawn.location.z, -5.0);
    assert_eq!(spawn.dimensions, [16, 16]);
    assert_eq!(spawn.min_zoom, None);
    assert_eq!(towns.markers["market"].min_zoom, Some(2));
    assert_eq!(towns.markers["market"].icon, "default");

    let plaza = &towns.areas["plaza"];
    assert_eq!(plaza.y, [60.0, 80.0]);
    assert_eq!(plaza.x.len(), 4);
    assert_eq!(plaza.style.color, "#00ff00");
    assert_eq!(plaza.style.fill_opacity, 0.0);

    assert_eq!(towns.lines["road"].z, vec![0.0, 50.0]);
}
