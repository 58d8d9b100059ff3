use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Id-keyed collection used for every shape type inside a marker set.
pub type ShapeMap<T> = HashMap<String, T, RandomState>;

pub fn shape_map<T>() -> ShapeMap<T> {
    HashMap::with_hasher(RandomState::new())
}

/// Global key under which a map is indexed: `worldName_mapName`.
pub fn map_key(world: &str, map: &str) -> String {
    format!("{}_{}", world, map)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub version: String,
    pub gray_hidden_players: bool,
    pub default_map: Option<String>,
    pub default_world: Option<String>,
    pub default_zoom: i32,
    pub follow_map: Option<String>,
    pub follow_zoom: i32,
    /// Poll interval in milliseconds.
    pub update_interval: u64,
    pub show_layer_control: bool,
    pub title: String,
    pub login_enabled: bool,
    pub max_players: u32,
    pub expand_ui: bool,
    pub hash: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: String::new(),
            gray_hidden_players: false,
            default_map: None,
            default_world: None,
            default_zoom: 0,
            follow_map: None,
            follow_zoom: 0,
            update_interval: 3000,
            show_layer_control: false,
            title: "Dynmap".to_string(),
            login_enabled: false,
            max_players: 0,
            expand_ui: false,
            hash: 0,
        }
    }
}

/// User-facing strings. Keys serialize in camelCase so a static message
/// bundle can be written as a plain JSON object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageConfig {
    pub chat_player_join: String,
    pub chat_player_quit: String,
    pub chat_anonymous_join: String,
    pub chat_anonymous_quit: String,
    pub chat_title: String,
    pub chat_login: String,
    pub chat_login_link: String,
    pub chat_no_messages: String,
    pub chat_send: String,
    pub chat_placeholder: String,
    pub chat_error_not_allowed: String,
    pub chat_error_requires_login: String,
    pub chat_error_cooldown: String,
    pub chat_error_disabled: String,
    pub chat_error_unknown: String,
    pub servers_heading: String,
    pub worlds_heading: String,
    pub worlds_skeleton: String,
    pub players_heading: String,
    pub players_skeleton: String,
    pub players_title: String,
    pub players_title_hidden: String,
    pub players_title_other_world: String,
    pub following_heading: String,
    pub following_hidden: String,
    pub following_unfollow: String,
    pub following_title_unfollow: String,
    pub link_title: String,
    pub loading_title: String,
    pub location_region: String,
    pub location_chunk: String,
    pub context_menu_copy_link: String,
    pub context_menu_center_here: String,
    pub toggle_title: String,
    pub map_title: String,
    pub layers_title: String,
    pub copy_to_clipboard_success: String,
    pub copy_to_clipboard_error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct World {
    pub name: String,
    pub title: String,
    pub sea_level: i32,
    pub height: i32,
    pub protected: bool,
    pub center: Coordinate,
    /// Insertion ordered; names are unique within the world.
    pub maps: Vec<WorldMap>,
}

impl World {
    pub fn map(&self, name: &str) -> Option<&WorldMap> {
        self.maps.iter().find(|map| map.name == name)
    }

    pub fn has_map(&self, name: &str) -> bool {
        self.map(name).is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldMap {
    /// Unique key within the owning world. Differs from `display_name` after
    /// a name collision.
    pub name: String,
    pub display_name: String,
    /// Real world the map content is sourced from.
    pub world: String,
    /// World the map is listed under.
    pub append_to_world: String,
    pub background: String,
    pub background_day: String,
    pub background_night: String,
    pub icon: Option<String>,
    pub image_format: String,
    pub prefix: String,
    pub protected: bool,
    pub night_and_day: bool,
    pub title: String,
    pub map_to_world: [f64; 9],
    pub world_to_map: [f64; 9],
    pub native_zoom_levels: u32,
    pub extra_zoom_levels: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorldState {
    pub time_of_day: i64,
    pub raining: bool,
    pub thundering: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentConfig {
    pub markers: MarkersComponent,
    pub chat_box: Option<ChatBoxComponent>,
    pub chat_balloons: bool,
    pub chat_sending: Option<ChatSendingComponent>,
    pub player_markers: Option<PlayerMarkersComponent>,
    pub coordinates_control: Option<CoordinatesComponent>,
    pub link_control: bool,
    pub clock_control: Option<ClockComponent>,
    pub logo_controls: Vec<LogoComponent>,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            markers: MarkersComponent { show_labels: false },
            chat_box: None,
            chat_balloons: false,
            chat_sending: None,
            player_markers: None,
            coordinates_control: None,
            link_control: false,
            clock_control: None,
            logo_controls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarkersComponent {
    pub show_labels: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatBoxComponent {
    pub allow_url_name: bool,
    pub show_player_faces: bool,
    /// `None` keeps messages forever.
    pub message_lifetime: Option<u64>,
    /// `None` keeps an unbounded history.
    pub message_history: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSendingComponent {
    pub login_required: bool,
    pub max_length: u32,
    /// Seconds between messages.
    pub cooldown: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerMarkersComponent {
    pub hide_by_default: bool,
    pub layer_name: String,
    pub layer_priority: i32,
    pub show_bodies: bool,
    pub show_skin_faces: bool,
    pub show_health: bool,
    pub small_faces: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinatesComponent {
    pub show_y: bool,
    pub label: String,
    pub show_region: bool,
    pub show_chunk: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClockComponent {
    pub show_time_of_day: bool,
    pub show_digital_clock: bool,
    pub show_weather: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogoComponent {
    pub text: String,
    pub url: Option<String>,
    pub position: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineStyle {
    pub color: String,
    pub opacity: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShapeStyle {
    pub color: String,
    pub opacity: f64,
    pub weight: f64,
    pub fill_color: String,
    pub fill_opacity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Marker {
    pub label: String,
    pub location: Coordinate,
    pub dimensions: [u32; 2],
    pub icon: String,
    pub is_html: bool,
    pub min_zoom: Option<i32>,
    pub max_zoom: Option<i32>,
    pub popup_content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Area {
    pub style: ShapeStyle,
    pub label: String,
    pub is_html: bool,
    pub x: Vec<f64>,
    /// Bottom and top.
    pub y: [f64; 2],
    pub z: Vec<f64>,
    pub min_zoom: Option<i32>,
    pub max_zoom: Option<i32>,
    pub popup_content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Line {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub style: LineStyle,
    pub label: String,
    pub is_html: bool,
    pub min_zoom: Option<i32>,
    pub max_zoom: Option<i32>,
    pub popup_content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Circle {
    pub location: Coordinate,
    /// X and Z radii.
    pub radius: [f64; 2],
    pub style: ShapeStyle,
    pub label: String,
    pub is_html: bool,
    pub min_zoom: Option<i32>,
    pub max_zoom: Option<i32>,
    pub popup_content: Option<String>,
}

/// Set-level fields shared by snapshots and incremental set updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkerSetInfo {
    pub id: String,
    pub label: String,
    pub hidden: bool,
    pub priority: i32,
    pub show_labels: Option<bool>,
    pub min_zoom: Option<i32>,
    pub max_zoom: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkerSet {
    pub info: MarkerSetInfo,
    pub markers: ShapeMap<Marker>,
    pub areas: ShapeMap<Area>,
    pub circles: ShapeMap<Circle>,
    pub lines: ShapeMap<Line>,
}

impl MarkerSet {
    pub fn empty(info: MarkerSetInfo) -> Self {
        Self {
            info,
            markers: shape_map(),
            areas: shape_map(),
            circles: shape_map(),
            lines: shape_map(),
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn shape_count(&self) -> usize {
        self.markers.len() + self.areas.len() + self.circles.len() + self.lines.len()
    }
}

/// A single shape mutation carried by the update feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum UpdateOp<T> {
    Upsert { id: String, payload: T },
    Remove { id: String },
}

impl<T> UpdateOp<T> {
    pub fn id(&self) -> &str {
        match self {
            UpdateOp::Upsert { id, .. } | UpdateOp::Remove { id } => id,
        }
    }

    /// Apply the operation to an id-keyed collection.
    pub fn apply_to(&self, target: &mut ShapeMap<T>)
    where
        T: Clone,
    {
        match self {
            UpdateOp::Upsert { id, payload } => {
                target.insert(id.clone(), payload.clone());
            }
            UpdateOp::Remove { id } => {
                target.remove(id);
            }
        }
    }
}

/// Diff for one marker set produced from a single update batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MarkerSetUpdates {
    pub payload: Option<MarkerSetInfo>,
    pub removed: bool,
    pub markers: Vec<UpdateOp<Marker>>,
    pub areas: Vec<UpdateOp<Area>>,
    pub circles: Vec<UpdateOp<Circle>>,
    pub lines: Vec<UpdateOp<Line>>,
}

impl MarkerSetUpdates {
    pub fn op_count(&self) -> usize {
        self.markers.len() + self.areas.len() + self.circles.len() + self.lines.len()
    }
}

/// Operations already committed to a set but not yet drained by a renderer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PendingSetUpdates {
    pub markers: VecDeque<UpdateOp<Marker>>,
    pub areas: VecDeque<UpdateOp<Area>>,
    pub circles: VecDeque<UpdateOp<Circle>>,
    pub lines: VecDeque<UpdateOp<Line>>,
}

impl PendingSetUpdates {
    pub fn len(&self) -> usize {
        self.markers.len() + self.areas.len() + self.circles.len() + self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TileUpdate {
    pub name: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatSource {
    Player,
    Web,
}

impl ChatSource {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "player" => Some(ChatSource::Player),
            "web" => Some(ChatSource::Web),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub timestamp: i64,
    #[serde(flatten)]
    pub event: ChatEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    Chat {
        source: ChatSource,
        player_account: Option<String>,
        player_name: Option<String>,
        message: String,
        channel: Option<String>,
    },
    PlayerJoin {
        player_account: String,
        player_name: String,
    },
    PlayerLeave {
        player_account: String,
        player_name: String,
    },
}

impl ChatMessage {
    pub fn player_account(&self) -> Option<&str> {
        match &self.event {
            ChatEvent::Chat { player_account, .. } => player_account.as_deref(),
            ChatEvent::PlayerJoin { player_account, .. }
            | ChatEvent::PlayerLeave { player_account, .. } => Some(player_account),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PlayerLocation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub world: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub account: String,
    pub name: String,
    pub health: f64,
    pub armor: f64,
    pub sort: i32,
    pub hidden: bool,
    pub location: PlayerLocation,
}

/// Structured diff produced by the update classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Updates {
    pub marker_sets: BTreeMap<String, MarkerSetUpdates>,
    pub tiles: Vec<TileUpdate>,
    pub chat: Vec<ChatMessage>,
}

/// Per-reason count of update entries the classifier refused.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RejectionTally {
    pub stale: u32,
    pub missing_set: u32,
    pub missing_id: u32,
    pub unknown_entry_type: u32,
    pub unknown_component_type: u32,
    pub incomplete: u32,
    pub unsupported_source: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UpdateRejection {
    Stale,
    MissingSet,
    MissingId,
    UnknownEntryType,
    UnknownComponentType,
    Incomplete,
    UnsupportedSource,
}

impl RejectionTally {
    pub fn record(&mut self, reason: UpdateRejection) {
        let slot = match reason {
            UpdateRejection::Stale => &mut self.stale,
            UpdateRejection::MissingSet => &mut self.missing_set,
            UpdateRejection::MissingId => &mut self.missing_id,
            UpdateRejection::UnknownEntryType => &mut self.unknown_entry_type,
            UpdateRejection::UnknownComponentType => &mut self.unknown_component_type,
            UpdateRejection::Incomplete => &mut self.incomplete,
            UpdateRejection::UnsupportedSource => &mut self.unsupported_source,
        };
        *slot += 1;
    }

    pub fn total(&self) -> u32 {
        self.stale
            + self.missing_set
            + self.missing_id
            + self.unknown_entry_type
            + self.unknown_component_type
            + self.incomplete
            + self.unsupported_source
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationResponse {
    pub config: ServerConfig,
    pub messages: MessageConfig,
    pub worlds: Vec<World>,
    pub components: ComponentConfig,
    pub logged_in: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResponse {
    pub world_state: WorldState,
    pub player_count: u32,
    pub config_hash: i64,
    pub timestamp: i64,
    pub players: Vec<Player>,
    pub updates: Updates,
    pub rejections: RejectionTally,
}

/// URL templates for one map server. `update` carries `{world}` and
/// `{timestamp}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerEndpoints {
    pub configuration: String,
    pub update: String,
    pub markers: String,
    pub sendmessage: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerDefinition {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    pub endpoints: ServerEndpoints,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SidebarSection {
    Servers,
    Players,
    Maps,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_serializes_with_kind_tag() {
        let message = ChatMessage {
            timestamp: 42,
            event: ChatEvent::PlayerLeave {
                player_account: "alex".to_string(),
                player_name: "Alex".to_string(),
            },
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "playerleave");
        assert_eq!(value["timestamp"], 42);
        assert_eq!(message.player_account(), Some("alex"));
    }

    #[test]
    fn update_op_applies_upsert_and_remove() {
        let mut target: ShapeMap<u32> = shape_map();
        UpdateOp::Upsert {
            id: "a".to_string(),
            payload: 1,
        }
        .apply_to(&mut target);
        UpdateOp::Upsert {
            id: "a".to_string(),
            payload: 2,
        }
        .apply_to(&mut target);
        assert_eq!(target.get("a"), Some(&2));

        let removal: UpdateOp<u32> = UpdateOp::Remove { id: "a".to_string() };
        removal.apply_to(&mut target);
        removal.apply_to(&mut target);
        assert!(target.is_empty());
    }

    #[test]
    fn world_map_lookup_uses_unique_key() {
        assert_eq!(map_key("world", "flat"), "world_flat");
        let world = World {
            name: "world".to_string(),
            title: String::new(),
            sea_level: 64,
            height: 256,
            protected: false,
            center: Coordinate::default(),
            maps: Vec::new(),
        };
        assert!(!world.has_map("flat"));
    }
}
