use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use atlas_runtime::{AtlasStore, Player, RejectionTally, UpdateResponse};
use color_eyre::eyre::{eyre, Result};
use tracing::{debug, info, warn};

use crate::api::{ChatError, MapApi};
use crate::config::ViewerConfig;
use crate::fetch::Transport;

/// What a single poll cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Applied(CycleReport),
    /// The server's configuration hash changed and everything was reloaded.
    Reloaded,
    /// A newer request on the update lane replaced this one.
    Superseded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub request_id: u64,
    pub marker_sets_touched: usize,
    pub tiles: usize,
    pub chat: usize,
    pub players: usize,
    pub rejections: RejectionTally,
    pub drained: usize,
}

pub struct ViewerApp {
    api: MapApi,
    store: AtlasStore,
    config: ViewerConfig,
}

impl ViewerApp {
    pub fn new(config: ViewerConfig, server: Option<&str>, transport: Arc<dyn Transport>) -> Result<Self> {
        let definition = config
            .initial_server(server)
            .cloned()
            .ok_or_else(|| eyre!("Unknown server {}", server.unwrap_or("<default>")))?;

        let mut store = AtlasStore::new();
        store.init(config.sidebar_state_path.as_deref());
        store.set_servers(config.servers.clone());
        store.set_current_server(&definition.id)?;

        let api = MapApi::new(transport, definition.endpoints, config.messages.clone());
        Ok(Self { api, store, config })
    }

    pub fn store(&self) -> &AtlasStore {
        &self.store
    }

    pub fn api(&self) -> &MapApi {
        &self.api
    }

    /// Fetch the server configuration, select a map and load its markers.
    pub async fn bootstrap(&mut self) -> Result<()> {
        let response = self.api.get_configuration().await?;

        self.store.set_configuration(response.config);
        self.store.set_messages(response.messages);
        self.store.set_components(response.components);
        self.store.set_logged_in(response.logged_in);
        self.store.set_worlds(response.worlds);

        if self.store.current_map().is_none() {
            self.select_initial_map()?;
        }
        self.reload_marker_sets().await?;

        info!(
            target: "atlas::viewer",
            title = %self.store.configuration().title,
            worlds = self.store.worlds().len(),
            world = self.store.current_world().map(|world| world.name.as_str()),
            map = self.store.current_map().map(|map| map.name.as_str()),
            "viewer.bootstrapped"
        );
        Ok(())
    }

    fn select_initial_map(&mut self) -> Result<()> {
        let target = {
            let config = self.store.configuration();
            let world = config
                .default_world
                .as_deref()
                .and_then(|name| self.store.world(name))
                .filter(|world| !world.maps.is_empty())
                .or_else(|| self.store.worlds().iter().find(|world| !world.maps.is_empty()));
            world.map(|world| {
                let map = config
                    .default_map
                    .as_deref()
                    .and_then(|name| world.map(name))
                    .unwrap_or(&world.maps[0]);
                (world.name.clone(), map.name.clone(), map.world.clone())
            })
        };

        let (world, map, real_world) = target.ok_or_else(|| eyre!("server lists no maps"))?;
        self.store.set_current_map(&world, &map, &real_world)?;
        Ok(())
    }

    async fn reload_marker_sets(&mut self) -> Result<()> {
        let world = self.current_world_name()?;
        let sets = self.api.get_marker_sets(&world).await?;
        debug!(target: "atlas::viewer", world = %world, sets = sets.len(), "marker_sets.loaded");
        self.store.set_marker_sets(sets);
        Ok(())
    }

    fn current_world_name(&self) -> Result<String> {
        self.store
            .current_world()
            .map(|world| world.name.clone())
            .ok_or_else(|| eyre!("no map selected"))
    }

    /// Run one update cycle against the current world.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let world = self.current_world_name()?;
        let request_id = self.store.increment_request_id();

        let update = match self.api.get_update(&world, self.store.update_timestamp()).await {
            Ok(update) => update,
            Err(err) if err.is_cancelled() => return Ok(PollOutcome::Superseded),
            Err(err) => return Err(err.into()),
        };

        let known_hash = self.store.configuration_hash();
        if update.config_hash != 0 && known_hash.is_some_and(|hash| hash != update.config_hash) {
            info!(
                target: "atlas::viewer",
                previous = known_hash,
                current = update.config_hash,
                "configuration.changed"
            );
            self.store.clear_configuration_hash();
            self.bootstrap().await?;
            return Ok(PollOutcome::Reloaded);
        }

        let mut report = self.apply_update(update).await;
        report.request_id = request_id;
        report.drained = self.drain_pending();
        Ok(PollOutcome::Applied(report))
    }

    async fn apply_update(&mut self, update: UpdateResponse) -> CycleReport {
        let UpdateResponse {
            world_state,
            timestamp,
            players,
            updates,
            rejections,
            ..
        } = update;

        let mut report = CycleReport {
            marker_sets_touched: updates.marker_sets.len(),
            tiles: updates.tiles.len(),
            chat: updates.chat.len(),
            players: players.len(),
            rejections,
            ..CycleReport::default()
        };

        self.store.add_marker_set_updates(updates.marker_sets);
        self.store.add_tile_updates(updates.tiles);
        self.store.add_chat(updates.chat);
        let scrollback = self
            .store
            .components()
            .chat_box
            .and_then(|chat_box| chat_box.message_history);
        if let Some(history) = scrollback {
            self.store.trim_chat(history);
        }

        let keep: HashSet<String> = players.iter().map(|player| player.account.clone()).collect();
        let mut incoming: VecDeque<Player> = players.into();
        while self.store.set_players_batch(&mut incoming) > 0 {
            tokio::task::yield_now().await;
        }
        self.store.sync_players(&keep);

        self.store.set_world_state(world_state);
        self.store.set_update_timestamp(timestamp);

        report.players = self.store.players().len();
        report
    }

    /// Consume pending operations the way a renderer would, a bounded
    /// number per queue per cycle.
    fn drain_pending(&mut self) -> usize {
        let amount = self.config.render_batch_size;
        let set_ids: Vec<String> = self.store.marker_sets().keys().cloned().collect();

        let mut drained = 0;
        for id in &set_ids {
            drained += self.store.pop_marker_updates(id, amount).len();
            drained += self.store.pop_area_updates(id, amount).len();
            drained += self.store.pop_circle_updates(id, amount).len();
            drained += self.store.pop_line_updates(id, amount).len();
        }
        drained + self.store.pop_tile_updates(amount).len()
    }

    pub fn log_status(&self, outcome: &PollOutcome) {
        match outcome {
            PollOutcome::Applied(report) => info!(
                target: "atlas::viewer",
                request = report.request_id,
                players = report.players,
                online = self.store.sorted_players().filter(|player| !player.hidden).count(),
                sets = self.store.marker_sets().len(),
                touched = report.marker_sets_touched,
                tiles = report.tiles,
                chat = report.chat,
                history = self.store.chat_messages().len(),
                rejected = report.rejections.total(),
                drained = report.drained,
                watermark = self.store.update_timestamp(),
                "poll.cycle"
            ),
            PollOutcome::Reloaded => info!(target: "atlas::viewer", "poll.cycle=reloaded"),
            PollOutcome::Superseded => debug!(target: "atlas::viewer", "poll.cycle=superseded"),
        }
    }

    pub async fn send_chat(&self, message: &str) -> Result<(), ChatError> {
        self.api
            .send_chat_message(message, self.store.components(), self.store.messages())
            .await
    }

    /// Poll until the task is dropped. With `once`, stop after one cycle.
    pub async fn run(&mut self, once: bool) -> Result<()> {
        loop {
            match self.poll_once().await {
                Ok(outcome) => self.log_status(&outcome),
                Err(err) => warn!(target: "atlas::viewer", error = %err, "poll.failed"),
            }
            if once {
                return Ok(());
            }
            let interval = Duration::from_millis(self.store.configuration().update_interval);
            tokio::time::sleep(interval).await;
        }
    }

    /// Abort in-flight requests and persist UI state.
    pub fn shutdown(&self) {
        self.api.fetch().cancel_all();
        if let Some(path) = &self.config.sidebar_state_path {
            if let Err(err) = self.store.save_sidebar_state(path) {
                warn!(target: "atlas::viewer", error = %err, "sidebar_state.save_failed");
            }
        }
    }
}
