//! Builders that turn raw server payloads into typed records.
//!
//! Builders never fail. Each field falls back to a fixed default through
//! [`RawRecord`], so a truncated or partially typed payload still yields a
//! fully populated record.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::raw::RawRecord;
use crate::updates::classify_updates;
use crate::{
    Area, ChatBoxComponent, ChatSendingComponent, Circle, ClockComponent, ComponentConfig,
    ConfigurationResponse, Coordinate, CoordinatesComponent, Line, LineStyle, LogoComponent,
    Marker, MarkerSet, MarkerSetInfo, MarkersComponent, MessageConfig, Player, PlayerLocation,
    PlayerMarkersComponent, ServerConfig, ShapeStyle, UpdateResponse, World, WorldMap,
    WorldState,
};

/// Static strings supplied alongside the server's own messages, keyed by the
/// camelCase field names of [`MessageConfig`].
pub type MessageBundle = BTreeMap<String, String>;

/// Legacy colour and formatting codes embedded in server titles.
static TITLE_CODES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)§[0-9a-fk-or]").expect("title code pattern should compile"));

const DEFAULT_COLOR: &str = "#ff0000";
const DEFAULT_BACKGROUND: &str = "#000000";
const HIDDEN_PLAYER_WORLD: &str = "-some-other-bogus-world-";

/// Server message keys and the [`MessageConfig`] field each one feeds.
const SERVER_MESSAGE_KEYS: &[(&str, &str)] = &[
    ("chatPlayerJoin", "joinmessage"),
    ("chatPlayerQuit", "quitmessage"),
    ("chatAnonymousJoin", "msg-hiddennamejoin"),
    ("chatAnonymousQuit", "msg-hiddennamequit"),
    ("chatErrorNotAllowed", "msg-chatnotallowed"),
    ("chatErrorRequiresLogin", "msg-chatrequireslogin"),
    ("chatErrorCooldown", "spammessage"),
    ("worldsHeading", "msg-maptypes"),
    ("playersHeading", "msg-players"),
];

pub fn strip_title_codes(title: &str) -> String {
    TITLE_CODES.replace_all(title, "").into_owned()
}

pub fn build_configuration(raw: &Value, bundle: &MessageBundle) -> ConfigurationResponse {
    ConfigurationResponse {
        config: build_server_config(raw),
        messages: build_messages(raw, bundle),
        worlds: build_worlds(raw),
        components: build_components(raw),
        logged_in: RawRecord::new(raw).truthy("loggedin"),
    }
}

pub fn build_server_config(raw: &Value) -> ServerConfig {
    let record = RawRecord::new(raw);
    let title = record
        .string("title")
        .map(|title| strip_title_codes(&title))
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| "Dynmap".to_string());

    ServerConfig {
        version: record.str_or("dynmapversion", ""),
        gray_hidden_players: record.truthy("grayplayerswhenhidden"),
        default_map: record.string("defaultmap"),
        default_world: record.string("defaultworld"),
        default_zoom: record.i32_or("defaultzoom", 0),
        follow_map: record.string("followmap"),
        follow_zoom: record.i32_or("followzoom", 0),
        update_interval: record.int_or("updaterate", 3000).max(0) as u64,
        show_layer_control: record.flag("showlayercontrol"),
        title,
        login_enabled: record.truthy("login-enabled"),
        max_players: record.u32_or("maxcount", 0),
        expand_ui: record.flag("sidebaropened"),
        hash: record.int_or("confighash", 0),
    }
}

/// Server-provided strings take precedence; the bundle fills everything else.
pub fn build_messages(raw: &Value, bundle: &MessageBundle) -> MessageConfig {
    let record = RawRecord::new(raw);
    let mut merged = serde_json::Map::new();

    for (key, text) in bundle {
        if !text.is_empty() {
            merged.insert(key.clone(), Value::String(text.clone()));
        }
    }
    for (field, server_key) in SERVER_MESSAGE_KEYS {
        if let Some(text) = record.string(server_key) {
            merged.insert((*field).to_string(), Value::String(text));
        }
    }

    serde_json::from_value(Value::Object(merged)).unwrap_or_default()
}

pub fn build_worlds(raw: &Value) -> Vec<World> {
    let record = RawRecord::new(raw);
    let entries = record.array("worlds");
    let mut worlds: Vec<World> = Vec::with_capacity(entries.len());

    // All worlds must exist before maps are attached so `append_to_world`
    // can point forward.
    for entry in entries {
        let world = build_world(RawRecord::new(entry));
        match worlds.iter_mut().find(|existing| existing.name == world.name) {
            Some(existing) => *existing = world,
            None => worlds.push(world),
        }
    }

    for entry in entries {
        let source = RawRecord::new(entry);
        let source_name = source.str_or("name", "");

        for map_entry in source.array("maps") {
            let map = RawRecord::new(map_entry);
            let owner_name = map
                .string("append_to_world")
                .unwrap_or_else(|| source_name.clone());
            let display_name = map.str_or("name", "(Unnamed map)");

            let Some(owner) = worlds.iter_mut().find(|world| world.name == owner_name) else {
                warn!(
                    target: "atlas::normalize",
                    map = %display_name,
                    world = %owner_name,
                    "map.skipped=unknown_world"
                );
                continue;
            };

            let name = unique_map_name(owner, &display_name, &source_name);
            let built = build_world_map(map, name, display_name, &source_name, &owner_name);
            owner.maps.push(built);
        }
    }

    worlds
}

fn unique_map_name(owner: &World, display_name: &str, source_world: &str) -> String {
    if !owner.has_map(display_name) {
        return display_name.to_string();
    }
    let base = format!("{}__{}", display_name, source_world);
    let mut candidate = base.clone();
    let mut counter = 2;
    while owner.has_map(&candidate) {
        candidate = format!("{}_{}", base, counter);
        counter += 1;
    }
    candidate
}

fn build_world(world: RawRecord<'_>) -> World {
    let center = world.record("center");
    World {
        name: world.str_or("name", ""),
        title: world.str_or("title", ""),
        sea_level: world.i32_or("sealevel", 64),
        height: world.i32_or("height", 256),
        protected: world.truthy("protected"),
        center: Coordinate::new(
            center.f64_or("x", 0.0),
            center.f64_or("y", 0.0),
            center.f64_or("z", 0.0),
        ),
        maps: Vec::new(),
    }
}

fn build_world_map(
    map: RawRecord<'_>,
    name: String,
    display_name: String,
    source_world: &str,
    owner_world: &str,
) -> WorldMap {
    WorldMap {
        name,
        display_name,
        world: source_world.to_string(),
        append_to_world: owner_world.to_string(),
        background: map.str_or("background", DEFAULT_BACKGROUND),
        background_day: map.str_or("backgroundday", DEFAULT_BACKGROUND),
        background_night: map.str_or("backgroundnight", DEFAULT_BACKGROUND),
        icon: map.string("icon"),
        image_format: map.str_or("image-format", "png"),
        prefix: map.str_or("prefix", ""),
        protected: map.truthy("protected"),
        night_and_day: map.truthy("nightandday"),
        title: map.str_or("title", ""),
        map_to_world: map.matrix("maptoworld"),
        world_to_map: map.matrix("worldtomap"),
        native_zoom_levels: map.u32_or("mapzoomout", 1),
        extra_zoom_levels: map.u32_or("mapzoomin", 0),
    }
}

/// Optional UI components the server can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Markers,
    PlayerMarkers,
    Coordinates,
    Link,
    DigitalClock,
    TimeOfDayClock,
    Logo,
    Chat,
    ChatBox,
    ChatBalloon,
}

impl ComponentKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "markers" => Some(ComponentKind::Markers),
            "playermarkers" => Some(ComponentKind::PlayerMarkers),
            "coord" => Some(ComponentKind::Coordinates),
            "link" => Some(ComponentKind::Link),
            "digitalclock" => Some(ComponentKind::DigitalClock),
            "timeofdayclock" => Some(ComponentKind::TimeOfDayClock),
            "logo" => Some(ComponentKind::Logo),
            "chat" => Some(ComponentKind::Chat),
            "chatbox" => Some(ComponentKind::ChatBox),
            "chatballoon" => Some(ComponentKind::ChatBalloon),
            _ => None,
        }
    }
}

pub fn build_components(raw: &Value) -> ComponentConfig {
    let response = RawRecord::new(raw);
    let mut components = ComponentConfig::default();

    for entry in response.array("components") {
        let component = RawRecord::new(entry);
        let Some(kind) = component
            .string("type")
            .and_then(|kind| ComponentKind::parse(&kind))
        else {
            continue;
        };

        match kind {
            ComponentKind::Markers => {
                components.markers = MarkersComponent {
                    show_labels: component.truthy("showlabel"),
                };
            }
            ComponentKind::PlayerMarkers => {
                components.player_markers = Some(PlayerMarkersComponent {
                    hide_by_default: component.truthy("hidebydefault"),
                    layer_name: component.str_or("label", "Players"),
                    layer_priority: component.i32_or("layerprio", 0),
                    show_bodies: component.truthy("showplayerbody"),
                    show_skin_faces: component.truthy("showplayerfaces"),
                    show_health: component.truthy("showplayerhealth"),
                    small_faces: component.truthy("smallplayerfaces"),
                });
            }
            ComponentKind::Coordinates => {
                components.coordinates_control = Some(CoordinatesComponent {
                    show_y: !component.truthy("hidey"),
                    label: component.str_or("label", "Location: "),
                    show_region: component.truthy("show-mcr"),
                    show_chunk: component.truthy("show-chunk"),
                });
            }
            ComponentKind::Link => components.link_control = true,
            ComponentKind::DigitalClock => {
                components.clock_control = Some(ClockComponent {
                    show_time_of_day: false,
                    show_digital_clock: true,
                    show_weather: false,
                });
            }
            ComponentKind::TimeOfDayClock => {
                components.clock_control = Some(ClockComponent {
                    show_time_of_day: true,
                    show_digital_clock: component.truthy("showdigitalclock"),
                    show_weather: component.truthy("showweather"),
                });
            }
            ComponentKind::Logo => {
                let position = component
                    .string("position")
                    .map(|position| position.replacen('-', "", 1))
                    .filter(|position| !position.is_empty())
                    .unwrap_or_else(|| "topleft".to_string());
                components.logo_controls.push(LogoComponent {
                    text: component.str_or("text", ""),
                    url: component.string("linkurl"),
                    position,
                    image: component.string("logourl"),
                });
            }
            ComponentKind::Chat => {
                if response.truthy("allowwebchat") {
                    components.chat_sending = Some(ChatSendingComponent {
                        login_required: response.truthy("webchat-requires-login"),
                        max_length: response.u32_or("chatlengthlimit", 256),
                        cooldown: response.u32_or("webchat-interval", 5),
                    });
                }
            }
            ComponentKind::ChatBox => {
                components.chat_box = Some(ChatBoxComponent {
                    allow_url_name: component.truthy("allowurlname"),
                    show_player_faces: component.truthy("showplayerfaces"),
                    message_lifetime: component
                        .integer("messagettl")
                        .filter(|ttl| *ttl > 0)
                        .map(|ttl| ttl as u64),
                    message_history: component
                        .integer("scrollback")
                        .filter(|lines| *lines > 0)
                        .map(|lines| lines as usize),
                });
            }
            ComponentKind::ChatBalloon => components.chat_balloons = true,
        }
    }

    components
}

pub fn build_marker_set_info(id: &str, raw: RawRecord<'_>) -> MarkerSetInfo {
    MarkerSetInfo {
        id: id.to_string(),
        label: raw.str_or("label", "Unnamed set"),
        hidden: raw.truthy("hide"),
        priority: raw.i32_or("layerprio", 0),
        show_labels: raw.truthy("showlabels").then_some(true),
        min_zoom: raw.zoom_bound("minzoom"),
        max_zoom: raw.zoom_bound("maxzoom"),
    }
}

/// Full marker set including every shape, as found in a marker snapshot.
pub fn build_marker_set(id: &str, raw: RawRecord<'_>) -> MarkerSet {
    let mut set = MarkerSet::empty(build_marker_set_info(id, raw));
    for (key, marker) in raw.entries("markers") {
        set.markers.insert(key.to_string(), build_marker(marker));
    }
    for (key, area) in raw.entries("areas") {
        set.areas.insert(key.to_string(), build_area(area));
    }
    for (key, circle) in raw.entries("circles") {
        set.circles.insert(key.to_string(), build_circle(circle));
    }
    for (key, line) in raw.entries("lines") {
        set.lines.insert(key.to_string(), build_line(line));
    }
    set
}

/// Every set in a marker snapshot response.
pub fn build_marker_sets(raw: &Value) -> Vec<MarkerSet> {
    RawRecord::new(raw)
        .entries("sets")
        .map(|(id, set)| build_marker_set(id, set))
        .collect()
}

pub fn build_marker(raw: RawRecord<'_>) -> Marker {
    Marker {
        label: raw.str_or("label", ""),
        location: Coordinate::new(
            raw.f64_or("x", 0.0),
            raw.f64_or("y", 0.0),
            raw.f64_or("z", 0.0),
        ),
        dimensions: [16, 16],
        icon: raw.str_or("icon", "default"),
        is_html: raw.truthy("markup"),
        min_zoom: raw.zoom_bound("minzoom"),
        max_zoom: raw.zoom_bound("maxzoom"),
        popup_content: raw.string("desc"),
    }
}

fn build_shape_style(raw: RawRecord<'_>) -> ShapeStyle {
    ShapeStyle {
        color: raw.str_or("color", DEFAULT_COLOR),
        opacity: raw.f64_or("opacity", 1.0),
        weight: raw.f64_or("weight", 1.0),
        fill_color: raw.str_or("fillcolor", DEFAULT_COLOR),
        fill_opacity: raw.f64_or("fillopacity", 0.0),
    }
}

pub fn build_area(raw: RawRecord<'_>) -> Area {
    Area {
        style: build_shape_style(raw),
        label: raw.str_or("label", ""),
        is_html: raw.truthy("markup"),
        x: raw.numbers_or("x", &[0.0, 0.0]),
        y: [raw.f64_or("ybottom", 0.0), raw.f64_or("ytop", 0.0)],
        z: raw.numbers_or("z", &[0.0, 0.0]),
        min_zoom: raw.zoom_bound("minzoom"),
        max_zoom: raw.zoom_bound("maxzoom"),
        popup_content: raw.string("desc"),
    }
}

pub fn build_line(raw: RawRecord<'_>) -> Line {
    Line {
        x: raw.numbers_or("x", &[0.0, 0.0]),
        y: raw.numbers_or("y", &[0.0, 0.0]),
        z: raw.numbers_or("z", &[0.0, 0.0]),
        style: LineStyle {
            color: raw.str_or("color", DEFAULT_COLOR),
            opacity: raw.f64_or("opacity", 1.0),
            weight: raw.f64_or("weight", 1.0),
        },
        label: raw.str_or("label", ""),
        is_html: raw.truthy("markup"),
        min_zoom: raw.zoom_bound("minzoom"),
        max_zoom: raw.zoom_bound("maxzoom"),
        popup_content: raw.string("desc"),
    }
}

pub fn build_circle(raw: RawRecord<'_>) -> Circle {
    Circle {
        location: Coordinate::new(
            raw.f64_or("x", 0.0),
            raw.f64_or("y", 0.0),
            raw.f64_or("z", 0.0),
        ),
        radius: [raw.f64_or("xr", 0.0), raw.f64_or("zr", 0.0)],
        style: build_shape_style(raw),
        label: raw.str_or("label", ""),
        is_html: raw.truthy("markup"),
        min_zoom: raw.zoom_bound("minzoom"),
        max_zoom: raw.zoom_bound("maxzoom"),
        popup_content: raw.string("desc"),
    }
}

pub fn build_player(raw: RawRecord<'_>) -> Player {
    let world = raw
        .string("world")
        .filter(|world| world != HIDDEN_PLAYER_WORLD);

    Player {
        account: raw.str_or("account", ""),
        name: raw.str_or("name", ""),
        health: raw.f64_or("health", 0.0),
        armor: raw.f64_or("armor", 0.0),
        sort: raw.i32_or("sort", 0),
        hidden: world.is_none(),
        // Half-block offsets centre the player on the block.
        location: PlayerLocation {
            x: raw.finite("x").map_or(0.0, |x| x + 0.5),
            y: raw.finite("y").unwrap_or(0.0),
            z: raw.finite("z").map_or(0.0, |z| z + 0.5),
            world,
        },
    }
}

pub fn build_world_state(raw: &Value) -> WorldState {
    let record = RawRecord::new(raw);
    WorldState {
        time_of_day: record.int_or("servertime", 0),
        raining: record.truthy("hasStorm"),
        thundering: record.truthy("isThundering"),
    }
}

/// Normalize a full update poll response. `watermark` is the store's last
/// applied update timestamp and gates staleness of the embedded feed.
pub fn build_update_response(raw: &Value, watermark: i64) -> UpdateResponse {
    let record = RawRecord::new(raw);
    let classified = classify_updates(record.array("updates"), watermark);

    UpdateResponse {
        world_state: build_world_state(raw),
        player_count: record.u32_or("count", 0),
        config_hash: record.int_or("confighash", 0),
        timestamp: record.int_or("timestamp", 0),
        players: record
            .array("players")
            .iter()
            .map(|player| build_player(RawRecord::new(player)))
            .collect(),
        updates: classified.updates,
        rejections: classified.rejections,
    }
}
