//! Reconciliation store.
//!
//! [`AtlasStore`] owns every collection the viewer renders from. It is built
//! explicitly by the application root and mutated only through the named
//! operations below; readers get shared references.
//!
//! Marker-set diffs are applied in two places at once: the committed set
//! (upsert/remove by id) and the set's pending queue, which records every
//! operation in arrival order until a renderer pops it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::sidebar::{SidebarState, SidebarStateError};
use crate::{
    map_key, ChatMessage, ComponentConfig, Coordinate, MarkerSet, MarkerSetUpdates,
    MessageConfig, PendingSetUpdates, Player, ServerConfig, ServerDefinition, ShapeMap,
    SidebarSection, TileUpdate, UpdateOp, World, WorldMap, WorldState,
};
use crate::{Area, Circle, Line, Marker};

/// Upper bound on players reconciled per [`AtlasStore::set_players_batch`] call.
pub const PLAYER_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Unknown world {0}")]
    UnknownWorld(String),
    #[error("Unknown real world {0}")]
    UnknownRealWorld(String),
    #[error("Unknown map {0}")]
    UnknownMap(String),
    #[error("Unknown server {0}")]
    UnknownServer(String),
}

/// Reference to a map by the world it is listed under and its key there.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MapRef {
    pub world: String,
    pub map: String,
}

#[derive(Debug, Default)]
struct SortedPlayers {
    accounts: Vec<String>,
    dirty: bool,
}

#[derive(Debug, Default)]
pub struct AtlasStore {
    servers: Vec<ServerDefinition>,
    current_server: Option<String>,
    configuration: ServerConfig,
    configuration_hash: Option<i64>,
    messages: MessageConfig,
    components: ComponentConfig,
    logged_in: bool,

    worlds: Vec<World>,
    maps: HashMap<String, MapRef>,
    current_world: Option<String>,
    current_map: Option<MapRef>,
    world_state: WorldState,
    current_location: Coordinate,
    current_zoom: i32,

    marker_sets: HashMap<String, MarkerSet>,
    pending_set_updates: HashMap<String, PendingSetUpdates>,
    pending_tile_updates: VecDeque<TileUpdate>,
    chat: VecDeque<ChatMessage>,

    players: HashMap<String, Player>,
    sorted_players: SortedPlayers,
    follow_target: Option<String>,
    pan_target: Option<String>,

    update_timestamp: i64,
    update_request_id: u64,
    sidebar: SidebarState,
}

impl AtlasStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore persisted UI state. Failures are logged and leave the
    /// defaults in place.
    pub fn init(&mut self, state_path: Option<&Path>) {
        let Some(path) = state_path else {
            return;
        };
        match SidebarState::load(path) {
            Ok(state) => {
                self.sidebar = state;
                debug!(target: "atlas::store", path = %path.display(), "sidebar_state.restored");
            }
            Err(err) => {
                warn!(
                    target: "atlas::store",
                    path = %path.display(),
                    error = %err,
                    "sidebar_state.restore_failed"
                );
            }
        }
    }

    // Servers and configuration

    pub fn set_servers(&mut self, servers: Vec<ServerDefinition>) {
        self.servers = servers;
        let still_known = self
            .current_server
            .as_ref()
            .map_or(true, |current| self.servers.iter().any(|server| &server.id == current));
        if !still_known {
            self.current_server = None;
        }
    }

    pub fn set_current_server(&mut self, id: &str) -> Result<(), StoreError> {
        if !self.servers.iter().any(|server| server.id == id) {
            return Err(StoreError::UnknownServer(id.to_string()));
        }
        self.current_server = Some(id.to_string());
        Ok(())
    }

    pub fn servers(&self) -> &[ServerDefinition] {
        &self.servers
    }

    pub fn current_server(&self) -> Option<&ServerDefinition> {
        let current = self.current_server.as_ref()?;
        self.servers.iter().find(|server| &server.id == current)
    }

    pub fn set_configuration(&mut self, config: ServerConfig) {
        self.configuration_hash = Some(config.hash);
        self.configuration = config;
    }

    pub fn configuration(&self) -> &ServerConfig {
        &self.configuration
    }

    pub fn set_configuration_hash(&mut self, hash: i64) {
        self.configuration_hash = Some(hash);
    }

    pub fn clear_configuration_hash(&mut self) {
        self.configuration_hash = None;
    }

    pub fn configuration_hash(&self) -> Option<i64> {
        self.configuration_hash
    }

    pub fn set_messages(&mut self, messages: MessageConfig) {
        self.messages = messages;
    }

    pub fn messages(&self) -> &MessageConfig {
        &self.messages
    }

    pub fn set_components(&mut self, components: ComponentConfig) {
        self.components = components;
    }

    pub fn components(&self) -> &ComponentConfig {
        &self.components
    }

    pub fn set_logged_in(&mut self, logged_in: bool) {
        self.logged_in = logged_in;
    }

    pub fn logged_in(&self) -> bool {
        self.logged_in
    }

    // Worlds and maps

    /// Replace every world. The current world and map survive only when a
    /// world or map with the same name still exists.
    pub fn set_worlds(&mut self, worlds: Vec<World>) {
        self.reset_world_scoped_state();

        for world in &worlds {
            for map in &world.maps {
                self.maps.insert(
                    map_key(&world.name, &map.name),
                    MapRef {
                        world: world.name.clone(),
                        map: map.name.clone(),
                    },
                );
            }
        }
        self.worlds = worlds;

        if let Some(current) = &self.current_world {
            if self.world(current).is_none() {
                self.current_world = None;
            }
        }
        let map_survives = match (&self.current_world, &self.current_map) {
            (Some(_), Some(current)) => self.maps.contains_key(&map_key(&current.world, &current.map)),
            _ => false,
        };
        if !map_survives {
            self.current_map = None;
        }
    }

    pub fn clear_worlds(&mut self) {
        self.reset_world_scoped_state();
    }

    fn reset_world_scoped_state(&mut self) {
        self.worlds.clear();
        self.maps.clear();
        self.follow_target = None;
        self.pan_target = None;
        self.world_state = WorldState::default();
    }

    /// Add or replace a single world without touching the others.
    pub fn add_world(&mut self, world: World) {
        self.maps.retain(|_, map_ref| map_ref.world != world.name);
        for map in &world.maps {
            self.maps.insert(
                map_key(&world.name, &map.name),
                MapRef {
                    world: world.name.clone(),
                    map: map.name.clone(),
                },
            );
        }
        match self.worlds.iter_mut().find(|existing| existing.name == world.name) {
            Some(existing) => *existing = world,
            None => self.worlds.push(world),
        }
    }

    pub fn worlds(&self) -> &[World] {
        &self.worlds
    }

    pub fn world(&self, name: &str) -> Option<&World> {
        self.worlds.iter().find(|world| world.name == name)
    }

    /// Look a map up by its global `worldName_mapName` key.
    pub fn map(&self, key: &str) -> Option<&WorldMap> {
        let map_ref = self.maps.get(key)?;
        self.world(&map_ref.world)?.map(&map_ref.map)
    }

    /// Select the active map. `world_name` is the world the map is listed
    /// under; `real_world_name` is the world its content comes from. Moving to
    /// a different real world drops all marker and tile state.
    pub fn set_current_map(
        &mut self,
        world_name: &str,
        map_name: &str,
        real_world_name: &str,
    ) -> Result<(), StoreError> {
        let world = self
            .world(world_name)
            .ok_or_else(|| StoreError::UnknownWorld(world_name.to_string()))?;
        if self.world(real_world_name).is_none() {
            return Err(StoreError::UnknownRealWorld(real_world_name.to_string()));
        }
        if !world.has_map(map_name) {
            return Err(StoreError::UnknownMap(map_name.to_string()));
        }

        if self.current_world.as_deref() != Some(real_world_name) {
            self.current_world = Some(real_world_name.to_string());
            self.marker_sets.clear();
            self.pending_set_updates.clear();
            self.pending_tile_updates.clear();
        }
        self.current_map = Some(MapRef {
            world: world_name.to_string(),
            map: map_name.to_string(),
        });

        info!(
            target: "atlas::store",
            world = world_name,
            map = map_name,
            real_world = real_world_name,
            "current_map.selected"
        );
        Ok(())
    }

    pub fn clear_current_map(&mut self) {
        self.marker_sets.clear();
        self.pending_set_updates.clear();
        self.pending_tile_updates.clear();
        self.current_world = None;
        self.current_map = None;
    }

    /// The real world marker and tile state belongs to.
    pub fn current_world(&self) -> Option<&World> {
        self.world(self.current_world.as_deref()?)
    }

    pub fn current_map(&self) -> Option<&WorldMap> {
        let current = self.current_map.as_ref()?;
        self.world(&current.world)?.map(&current.map)
    }

    pub fn current_map_ref(&self) -> Option<&MapRef> {
        self.current_map.as_ref()
    }

    pub fn set_world_state(&mut self, state: WorldState) {
        self.world_state = state;
    }

    pub fn world_state(&self) -> &WorldState {
        &self.world_state
    }

    pub fn set_current_location(&mut self, location: Coordinate) {
        self.current_location = location;
    }

    pub fn current_location(&self) -> Coordinate {
        self.current_location
    }

    pub fn set_current_zoom(&mut self, zoom: i32) {
        self.current_zoom = zoom;
    }

    pub fn current_zoom(&self) -> i32 {
        self.current_zoom
    }

    // Update bookkeeping

    pub fn set_update_timestamp(&mut self, timestamp: i64) {
        self.update_timestamp = timestamp;
    }

    /// Watermark below which incoming updates are stale.
    pub fn update_timestamp(&self) -> i64 {
        self.update_timestamp
    }

    pub fn increment_request_id(&mut self) -> u64 {
        self.update_request_id += 1;
        self.update_request_id
    }

    pub fn update_request_id(&self) -> u64 {
        self.update_request_id
    }

    // Marker sets

    /// Replace every marker set with a fresh snapshot. Pending queues start
    /// empty.
    pub fn set_marker_sets(&mut self, sets: impl IntoIterator<Item = MarkerSet>) {
        self.marker_sets.clear();
        self.pending_set_updates.clear();
        for set in sets {
            let id = set.id().to_string();
            self.pending_set_updates
                .insert(id.clone(), PendingSetUpdates::default());
            self.marker_sets.insert(id, set);
        }
    }

    pub fn clear_marker_sets(&mut self) {
        self.marker_sets.clear();
        self.pending_set_updates.clear();
    }

    pub fn add_marker_set_updates(
        &mut self,
        updates: impl IntoIterator<Item = (String, MarkerSetUpdates)>,
    ) {
        for (id, diff) in updates {
            if !self.marker_sets.contains_key(&id) {
                let Some(info) = diff.payload.clone() else {
                    // The set's creation was missed or arrived out of order.
                    warn!(
                        target: "atlas::store",
                        set = %id,
                        ops = diff.op_count(),
                        "marker_sets.update_skipped=unknown_set"
                    );
                    continue;
                };
                self.marker_sets.insert(id.clone(), MarkerSet::empty(info));
                self.pending_set_updates
                    .insert(id.clone(), PendingSetUpdates::default());
            }

            if diff.removed {
                self.marker_sets.remove(&id);
                self.pending_set_updates.remove(&id);
                continue;
            }

            let Some(set) = self.marker_sets.get_mut(&id) else {
                continue;
            };
            if let Some(info) = diff.payload {
                set.info = info;
            }
            apply_ops(&mut set.markers, &diff.markers);
            apply_ops(&mut set.areas, &diff.areas);
            apply_ops(&mut set.circles, &diff.circles);
            apply_ops(&mut set.lines, &diff.lines);

            let pending = self.pending_set_updates.entry(id).or_default();
            pending.markers.extend(diff.markers);
            pending.areas.extend(diff.areas);
            pending.circles.extend(diff.circles);
            pending.lines.extend(diff.lines);
        }
    }

    pub fn marker_sets(&self) -> &HashMap<String, MarkerSet> {
        &self.marker_sets
    }

    pub fn marker_set(&self, id: &str) -> Option<&MarkerSet> {
        self.marker_sets.get(id)
    }

    pub fn pending_set_updates(&self, id: &str) -> Option<&PendingSetUpdates> {
        self.pending_set_updates.get(id)
    }

    pub fn pop_marker_updates(&mut self, set: &str, amount: usize) -> Vec<UpdateOp<Marker>> {
        self.pending_for(set, "pop_marker_updates")
            .map(|pending| drain_front(&mut pending.markers, amount))
            .unwrap_or_default()
    }

    pub fn pop_area_updates(&mut self, set: &str, amount: usize) -> Vec<UpdateOp<Area>> {
        self.pending_for(set, "pop_area_updates")
            .map(|pending| drain_front(&mut pending.areas, amount))
            .unwrap_or_default()
    }

    pub fn pop_circle_updates(&mut self, set: &str, amount: usize) -> Vec<UpdateOp<Circle>> {
        self.pending_for(set, "pop_circle_updates")
            .map(|pending| drain_front(&mut pending.circles, amount))
            .unwrap_or_default()
    }

    pub fn pop_line_updates(&mut self, set: &str, amount: usize) -> Vec<UpdateOp<Line>> {
        self.pending_for(set, "pop_line_updates")
            .map(|pending| drain_front(&mut pending.lines, amount))
            .unwrap_or_default()
    }

    fn pending_for(&mut self, set: &str, operation: &'static str) -> Option<&mut PendingSetUpdates> {
        if !self.marker_sets.contains_key(set) {
            warn!(target: "atlas::store", set, operation, "marker_sets.pop_skipped=unknown_set");
            return None;
        }
        Some(self.pending_set_updates.entry(set.to_string()).or_default())
    }

    // Tiles and chat

    pub fn add_tile_updates(&mut self, updates: impl IntoIterator<Item = TileUpdate>) {
        self.pending_tile_updates.extend(updates);
    }

    pub fn pop_tile_updates(&mut self, amount: usize) -> Vec<TileUpdate> {
        drain_front(&mut self.pending_tile_updates, amount)
    }

    pub fn pending_tile_updates(&self) -> &VecDeque<TileUpdate> {
        &self.pending_tile_updates
    }

    /// Prepend a batch to the history, keeping the batch's own order. Callers
    /// sort each batch newest first before submitting it.
    pub fn add_chat(&mut self, batch: Vec<ChatMessage>) {
        for message in batch.into_iter().rev() {
            self.chat.push_front(message);
        }
    }

    /// Drop the oldest messages beyond `limit`.
    pub fn trim_chat(&mut self, limit: usize) {
        self.chat.truncate(limit);
    }

    pub fn chat_messages(&self) -> &VecDeque<ChatMessage> {
        &self.chat
    }

    // Players

    /// Reconcile at most [`PLAYER_BATCH_SIZE`] players from the front of
    /// `incoming`, returning how many are left. The sorted view is rebuilt
    /// only once `incoming` is empty, so callers keep calling until this
    /// returns zero.
    pub fn set_players_batch(&mut self, incoming: &mut VecDeque<Player>) -> usize {
        let take = incoming.len().min(PLAYER_BATCH_SIZE);

        for player in incoming.drain(..take) {
            match self.players.get_mut(&player.account) {
                Some(existing) => {
                    if existing.name != player.name || existing.sort != player.sort {
                        self.sorted_players.dirty = true;
                    }
                    existing.health = player.health;
                    existing.armor = player.armor;
                    existing.location = player.location;
                    existing.hidden = player.hidden;
                    existing.name = player.name;
                    existing.sort = player.sort;
                }
                None => {
                    self.sorted_players.dirty = true;
                    self.players.insert(player.account.clone(), player);
                }
            }
        }

        if incoming.is_empty() && self.sorted_players.dirty {
            self.resort_players();
        }
        incoming.len()
    }

    fn resort_players(&mut self) {
        let players = &self.players;
        let mut accounts: Vec<String> = players.keys().cloned().collect();
        accounts.sort_by(|a, b| {
            players[a]
                .sort
                .cmp(&players[b].sort)
                .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        });
        self.sorted_players = SortedPlayers {
            accounts,
            dirty: false,
        };
    }

    /// Drop every player whose account is not in `keep`.
    pub fn sync_players(&mut self, keep: &HashSet<String>) {
        self.players.retain(|account, _| keep.contains(account));
        self.sorted_players
            .accounts
            .retain(|account| keep.contains(account));
    }

    pub fn clear_players(&mut self) {
        self.follow_target = None;
        self.pan_target = None;
        self.players.clear();
        self.sorted_players = SortedPlayers::default();
    }

    pub fn players(&self) -> &HashMap<String, Player> {
        &self.players
    }

    pub fn player(&self, account: &str) -> Option<&Player> {
        self.players.get(account)
    }

    pub fn sorted_players(&self) -> impl Iterator<Item = &Player> {
        self.sorted_players
            .accounts
            .iter()
            .filter_map(|account| self.players.get(account))
    }

    pub fn sorted_players_dirty(&self) -> bool {
        self.sorted_players.dirty
    }

    pub fn set_follow_target(&mut self, account: &str) {
        self.follow_target = Some(account.to_string());
    }

    pub fn clear_follow_target(&mut self) {
        self.follow_target = None;
    }

    pub fn follow_target(&self) -> Option<&Player> {
        self.players.get(self.follow_target.as_deref()?)
    }

    pub fn set_pan_target(&mut self, account: &str) {
        self.pan_target = Some(account.to_string());
    }

    pub fn clear_pan_target(&mut self) {
        self.pan_target = None;
    }

    pub fn pan_target(&self) -> Option<&Player> {
        self.players.get(self.pan_target.as_deref()?)
    }

    // Sidebar

    pub fn toggle_sidebar_section(&mut self, section: SidebarSection) {
        self.sidebar.toggle(section);
    }

    pub fn set_sidebar_section_collapsed(&mut self, section: SidebarSection, collapsed: bool) {
        self.sidebar.set_collapsed(section, collapsed);
    }

    pub fn sidebar(&self) -> &SidebarState {
        &self.sidebar
    }

    pub fn save_sidebar_state(&self, path: &Path) -> Result<(), SidebarStateError> {
        self.sidebar.save(path)
    }
}

fn apply_ops<T: Clone>(target: &mut ShapeMap<T>, ops: &[UpdateOp<T>]) {
    for op in ops {
        op.apply_to(target);
    }
}

fn drain_front<T>(queue: &mut VecDeque<T>, amount: usize) -> Vec<T> {
    let count = amount.min(queue.len());
    queue.drain(..count).collect()
}
