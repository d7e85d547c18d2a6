// demo.rs — scene command replay into a render world

use std::sync::Arc;

use log::{info, warn};

use arclight_common::map_source::MapSource;
use arclight_common::scene::{QHandle, RenderEntityDesc, RenderLightDesc, RenderView};

use crate::world::RenderWorld;

/// One recorded scene mutation. Handles are the recording session's own
/// values, replay places defs at those exact slots so later commands keep
/// referring to the right ones.
#[derive(Clone)]
pub enum DemoCommand {
    LoadMap(Arc<MapSource>),
    UpdateEntity {
        handle: QHandle,
        desc: RenderEntityDesc,
    },
    FreeEntity {
        handle: QHandle,
    },
    UpdateLight {
        handle: QHandle,
        desc: RenderLightDesc,
    },
    FreeLight {
        handle: QHandle,
    },
    SetView(RenderView),
}

/// Replays recorded commands into a world. View times are rebased so the
/// first view after a map load plays at time zero regardless of when the
/// recording was made.
pub struct DemoPlayer {
    time_offset: i32,
    rebase_time: bool,
}

impl DemoPlayer {
    pub fn new() -> Self {
        Self {
            time_offset: 0,
            rebase_time: true,
        }
    }

    /// Applies one command. Returns the rebased view for SetView commands,
    /// which mark a complete frame, and None for everything else.
    pub fn advance(&mut self, world: &mut RenderWorld, command: &DemoCommand) -> Option<RenderView> {
        match command {
            DemoCommand::LoadMap(source) => {
                info!("demo: loading map '{}'", source.name);
                if !world.init_from_map(Some(source)) {
                    warn!("demo: map '{}' loaded degraded", source.name);
                }
                self.rebase_time = true;
                None
            }
            DemoCommand::UpdateEntity { handle, desc } => {
                if !world.restore_entity_def(*handle, desc) {
                    warn!("demo: could not place entity at handle {}", handle);
                }
                None
            }
            DemoCommand::FreeEntity { handle } => {
                world.free_entity_def(*handle);
                None
            }
            DemoCommand::UpdateLight { handle, desc } => {
                if !world.restore_light_def(*handle, desc) {
                    warn!("demo: could not place light at handle {}", handle);
                }
                None
            }
            DemoCommand::FreeLight { handle } => {
                world.free_light_def(*handle);
                None
            }
            DemoCommand::SetView(recorded) => {
                if self.rebase_time {
                    self.time_offset = recorded.time;
                    self.rebase_time = false;
                }
                let mut view = recorded.clone();
                view.time -= self.time_offset;
                world.set_render_view(&view);
                Some(view)
            }
        }
    }
}

impl Default for DemoPlayer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
