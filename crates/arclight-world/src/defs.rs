// defs.rs — entity and light def storage, lifecycle, and area references

use arclight_common::math::Bounds;
use arclight_common::scene::{
    AreaLock, DeferredOutcome, ModelSource, PortalBlock, QHandle, RenderEntityDesc,
    RenderLightDesc, RenderView, HANDLE_NONE,
};

use log::{debug, warn};

use crate::handles::HandleSlots;
use crate::models::ModelRegistry;
use crate::portals::AreaPortalGraph;

/// A registered renderable object and the state derived from its descriptor.
#[derive(Debug, Clone)]
pub struct EntityDef {
    pub desc: RenderEntityDesc,
    /// World space bounds derived from the model or descriptor bounds.
    pub world_bounds: Bounds,
    /// Areas the def is referenced into, honoring the area lock.
    pub areas: Vec<i32>,
    /// Concrete model produced by a deferred callback, HANDLE_NONE until one
    /// has been generated.
    pub resolved_model: QHandle,
    /// The callback answered Resolved and must not be invoked again until
    /// the next update.
    pub callback_done: bool,
    /// Written to the demo stream already.
    pub archived: bool,
}

#[derive(Debug, Clone)]
pub struct LightDef {
    pub desc: RenderLightDesc,
    pub world_bounds: Bounds,
    /// Areas light flow can reach, flooded from the origin area through
    /// portals that do not block view, restricted to the volume bounds.
    pub areas: Vec<i32>,
    pub archived: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefCounters {
    pub entity_updates: u32,
    pub light_updates: u32,
    pub deferred_callbacks: u32,
}

#[derive(Debug, Default)]
pub struct SceneDefRegistry {
    entities: HandleSlots<EntityDef>,
    lights: HandleSlots<LightDef>,
    pub counters: DefCounters,
}

// ============================================================
// Derived state helpers
// ============================================================

fn entity_local_bounds(
    desc: &RenderEntityDesc,
    resolved_model: QHandle,
    models: &ModelRegistry,
) -> Bounds {
    let from_model = |handle: QHandle| {
        models
            .model_bounds(handle)
            .filter(|b| !b.is_cleared())
    };
    match desc.model {
        ModelSource::Model(handle) => from_model(handle).unwrap_or(desc.bounds),
        ModelSource::Deferred(_) => {
            if resolved_model != HANDLE_NONE {
                from_model(resolved_model).unwrap_or(desc.bounds)
            } else {
                desc.bounds
            }
        }
        ModelSource::None => desc.bounds,
    }
}

fn entity_world_bounds(
    desc: &RenderEntityDesc,
    resolved_model: QHandle,
    models: &ModelRegistry,
) -> Bounds {
    let local = entity_local_bounds(desc, resolved_model, models);
    if local.is_cleared() {
        return Bounds::from_point(&desc.origin);
    }
    local.transformed(&desc.origin, &desc.axis)
}

fn locked_area(graph: &AreaPortalGraph, point: &arclight_common::math::Vec3) -> Vec<i32> {
    let area = graph.area_at_point(point);
    if area < 0 {
        Vec::new()
    } else {
        vec![area]
    }
}

fn entity_areas(graph: &AreaPortalGraph, desc: &RenderEntityDesc, world_bounds: &Bounds) -> Vec<i32> {
    match desc.area_lock {
        AreaLock::Origin => locked_area(graph, &desc.origin),
        AreaLock::Center => locked_area(graph, &world_bounds.center()),
        AreaLock::None => graph.areas_touching_bounds(world_bounds),
    }
}

fn light_areas(graph: &AreaPortalGraph, desc: &RenderLightDesc, world_bounds: &Bounds) -> Vec<i32> {
    match desc.area_lock {
        AreaLock::Origin => locked_area(graph, &desc.origin),
        AreaLock::Center => locked_area(graph, &world_bounds.center()),
        AreaLock::None => {
            let touched = graph.areas_touching_bounds(world_bounds);
            let origin_area = graph.area_at_point(&desc.origin);
            if origin_area < 0 || !touched.contains(&origin_area) {
                // light origin sits inside geometry, fall back to the
                // volume's areas without flow
                return touched;
            }
            graph.flood_connected_areas(origin_area, PortalBlock::VIEW, Some(&touched))
        }
    }
}

impl SceneDefRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.lights.clear();
        self.counters = DefCounters::default();
    }

    // ============================================================
    // Entity defs
    // ============================================================

    pub fn add_entity_def(
        &mut self,
        desc: &RenderEntityDesc,
        graph: &AreaPortalGraph,
        models: &ModelRegistry,
    ) -> QHandle {
        let world_bounds = entity_world_bounds(desc, HANDLE_NONE, models);
        let areas = entity_areas(graph, desc, &world_bounds);
        let handle = self.entities.alloc(EntityDef {
            desc: desc.clone(),
            world_bounds,
            areas,
            resolved_model: HANDLE_NONE,
            callback_done: false,
            archived: false,
        });
        debug!("add_entity_def: handle {}", handle);
        handle
    }

    /// Replaces the stored descriptor and rederives bounds and areas. The
    /// caller purges dependent interactions. Unknown handles are diagnosed
    /// and ignored.
    pub fn update_entity_def(
        &mut self,
        handle: QHandle,
        desc: &RenderEntityDesc,
        graph: &AreaPortalGraph,
        models: &ModelRegistry,
    ) -> bool {
        let def = match self.entities.get_mut(handle) {
            Some(def) => def,
            None => {
                warn!("update_entity_def: unknown handle {}", handle);
                return false;
            }
        };
        def.desc = desc.clone();
        def.resolved_model = HANDLE_NONE;
        def.callback_done = false;
        def.world_bounds = entity_world_bounds(desc, HANDLE_NONE, models);
        def.areas = entity_areas(graph, desc, &def.world_bounds);
        self.counters.entity_updates += 1;
        true
    }

    /// Double frees are tolerated as no-ops.
    pub fn free_entity_def(&mut self, handle: QHandle) -> bool {
        self.entities.free(handle).is_some()
    }

    pub fn render_entity(&self, handle: QHandle) -> Option<&RenderEntityDesc> {
        self.entities.get(handle).map(|def| &def.desc)
    }

    pub fn entity_def(&self, handle: QHandle) -> Option<&EntityDef> {
        self.entities.get(handle)
    }

    pub fn entity_def_mut(&mut self, handle: QHandle) -> Option<&mut EntityDef> {
        self.entities.get_mut(handle)
    }

    pub fn entity_handles(&self) -> Vec<QHandle> {
        self.entities.handles()
    }

    pub fn entities(&self) -> impl Iterator<Item = (QHandle, &EntityDef)> {
        self.entities.iter()
    }

    pub fn num_entity_defs(&self) -> usize {
        self.entities.active_count()
    }

    /// Demo playback places defs at exact handle values.
    pub fn restore_entity_def(
        &mut self,
        handle: QHandle,
        desc: &RenderEntityDesc,
        graph: &AreaPortalGraph,
        models: &ModelRegistry,
    ) -> bool {
        let world_bounds = entity_world_bounds(desc, HANDLE_NONE, models);
        let areas = entity_areas(graph, desc, &world_bounds);
        self.entities.set_at(
            handle,
            EntityDef {
                desc: desc.clone(),
                world_bounds,
                areas,
                resolved_model: HANDLE_NONE,
                callback_done: false,
                archived: true,
            },
        )
    }

    /// Returns the concrete model for the entity, running the deferred
    /// callback when one is pending. The view is passed through to the
    /// callback and may be None for non-view invocations (traces, decals).
    pub fn resolve_entity_model(
        &mut self,
        handle: QHandle,
        view: Option<&RenderView>,
        models: &ModelRegistry,
        graph: &AreaPortalGraph,
    ) -> QHandle {
        let deferred = match self.entities.get(handle) {
            None => return HANDLE_NONE,
            Some(def) => match def.desc.model {
                ModelSource::Model(model) => return model,
                ModelSource::None => return HANDLE_NONE,
                ModelSource::Deferred(deferred) => {
                    if def.callback_done {
                        return def.resolved_model;
                    }
                    deferred
                }
            },
        };

        self.counters.deferred_callbacks += 1;
        let outcome = (deferred.generate)(deferred.data, view);

        let def = match self.entities.get_mut(handle) {
            Some(def) => def,
            None => return HANDLE_NONE,
        };
        match outcome {
            DeferredOutcome::Pending => HANDLE_NONE,
            DeferredOutcome::Resolved(model) => {
                def.resolved_model = model;
                def.callback_done = true;
                def.world_bounds = entity_world_bounds(&def.desc, model, models);
                def.areas = entity_areas(graph, &def.desc, &def.world_bounds);
                model
            }
            DeferredOutcome::Regenerated(model) => {
                def.resolved_model = model;
                def.world_bounds = entity_world_bounds(&def.desc, model, models);
                def.areas = entity_areas(graph, &def.desc, &def.world_bounds);
                model
            }
        }
    }

    // ============================================================
    // Light defs
    // ============================================================

    pub fn add_light_def(
        &mut self,
        desc: &RenderLightDesc,
        graph: &AreaPortalGraph,
    ) -> QHandle {
        let world_bounds = desc.derived_bounds();
        let areas = light_areas(graph, desc, &world_bounds);
        let handle = self.lights.alloc(LightDef {
            desc: desc.clone(),
            world_bounds,
            areas,
            archived: false,
        });
        debug!("add_light_def: handle {}", handle);
        handle
    }

    pub fn update_light_def(
        &mut self,
        handle: QHandle,
        desc: &RenderLightDesc,
        graph: &AreaPortalGraph,
    ) -> bool {
        let def = match self.lights.get_mut(handle) {
            Some(def) => def,
            None => {
                warn!("update_light_def: unknown handle {}", handle);
                return false;
            }
        };
        def.desc = desc.clone();
        def.world_bounds = desc.derived_bounds();
        def.areas = light_areas(graph, desc, &def.world_bounds);
        self.counters.light_updates += 1;
        true
    }

    pub fn free_light_def(&mut self, handle: QHandle) -> bool {
        self.lights.free(handle).is_some()
    }

    pub fn render_light(&self, handle: QHandle) -> Option<&RenderLightDesc> {
        self.lights.get(handle).map(|def| &def.desc)
    }

    pub fn light_def(&self, handle: QHandle) -> Option<&LightDef> {
        self.lights.get(handle)
    }

    pub fn light_def_mut(&mut self, handle: QHandle) -> Option<&mut LightDef> {
        self.lights.get_mut(handle)
    }

    pub fn light_handles(&self) -> Vec<QHandle> {
        self.lights.handles()
    }

    pub fn lights(&self) -> impl Iterator<Item = (QHandle, &LightDef)> {
        self.lights.iter()
    }

    pub fn num_light_defs(&self) -> usize {
        self.lights.active_count()
    }

    pub fn restore_light_def(
        &mut self,
        handle: QHandle,
        desc: &RenderLightDesc,
        graph: &AreaPortalGraph,
    ) -> bool {
        let world_bounds = desc.derived_bounds();
        let areas = light_areas(graph, desc, &world_bounds);
        self.lights.set_at(
            handle,
            LightDef {
                desc: desc.clone(),
                world_bounds,
                areas,
                archived: true,
            },
        )
    }

    /// Recomputes light flow after portal state changes. Returns the lights
    /// whose area sets changed so their interactions can be purged.
    pub fn refresh_light_areas(&mut self, graph: &AreaPortalGraph) -> Vec<QHandle> {
        let mut changed = Vec::new();
        for (handle, def) in self.lights.iter_mut() {
            let areas = light_areas(graph, &def.desc, &def.world_bounds);
            if areas != def.areas {
                def.areas = areas;
                changed.push(handle);
            }
        }
        changed
    }

    pub fn clear_all_archived(&mut self) {
        for (_, def) in self.entities.iter_mut() {
            def.archived = false;
        }
        for (_, def) in self.lights.iter_mut() {
            def.archived = false;
        }
    }
}
