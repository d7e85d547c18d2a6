// world.rs — the render world context: areas, defs, interactions, queries

use log::{info, warn};

use arclight_common::map_source::{
    MapAreaSource, MapNodeSource, MapSource, MaterialDecl, MAP_FILE_ID,
};
use arclight_common::math::{Bounds, Plane, Vec3};
use arclight_common::scene::{
    MaterialFlags, MaterialId, ModelTrace, PortalBlock, QHandle, RenderEntityDesc,
    RenderLightDesc, RenderView,
};
use arclight_common::winding::Winding;

use crate::decals::{DecalFragment, DecalSystem};
use crate::defs::SceneDefRegistry;
use crate::interactions::{Interaction, InteractionTable};
use crate::light_queries::{LightQueryId, LightQueryQueue, LightSample, MAX_PENDING_LIGHT_QUERIES};
use crate::models::{ModelRegistry, RenderModel};
use crate::portals::{AreaPortalGraph, ExitPortal, PointInAreaStatus};
use crate::trace::{self, TraceContext, TraceFilter};

#[derive(Debug, Clone, Copy)]
pub struct RenderWorldConfig {
    /// Treat every pair of valid areas as connected, ignoring portal state.
    pub no_area_flow: bool,
    /// Backlog limit for asynchronous light sample queries.
    pub light_query_capacity: usize,
}

impl Default for RenderWorldConfig {
    fn default() -> Self {
        Self {
            no_area_flow: false,
            light_query_capacity: MAX_PENDING_LIGHT_QUERIES,
        }
    }
}

/// Everything a view needs drawn: the areas reachable from the eye through
/// view-open portals and the defs referenced into them, filtered by the
/// view id suppress / allow fields.
#[derive(Debug, Clone)]
pub struct ViewScene {
    pub view: RenderView,
    pub areas: Vec<i32>,
    pub entities: Vec<QHandle>,
    pub lights: Vec<QHandle>,
}

/// One loaded map and the dynamic scene registered into it. `init_from_map`
/// is always safe to call again on a live instance, it fully resets every
/// piece of state.
pub struct RenderWorld {
    config: RenderWorldConfig,
    graph: AreaPortalGraph,
    models: ModelRegistry,
    defs: SceneDefRegistry,
    interactions: InteractionTable,
    decals: DecalSystem,
    light_queries: LightQueryQueue,
    materials: Vec<MaterialDecl>,
    /// Model handle backing each area's static geometry.
    area_models: Vec<QHandle>,
    /// Per area, set when any surface material wants portal sky compositing.
    portal_sky: Vec<bool>,
    map_name: String,
    map_checksum: u32,
    primary_view: Option<RenderView>,
}

/// All source geometry folded into one area with no portals, used when a
/// precompiled map cannot be accepted as-is. The tree is kept for solid
/// classification with every open leaf remapped to the single area.
fn merge_into_single_area(source: &MapSource) -> MapSource {
    let mut area = MapAreaSource::default();
    for src_area in &source.areas {
        area.surfaces.extend(src_area.surfaces.iter().cloned());
    }
    let remap = |child: i32| if child < 0 { -1 } else { child };
    let nodes = source
        .nodes
        .iter()
        .map(|n| MapNodeSource {
            plane: n.plane,
            children: [remap(n.children[0]), remap(n.children[1])],
        })
        .collect();
    MapSource {
        format_id: MAP_FILE_ID.to_string(),
        name: source.name.clone(),
        materials: source.materials.clone(),
        areas: vec![area],
        portals: Vec::new(),
        nodes,
    }
}

fn surface_allowed_in_view(desc: &RenderEntityDesc, view: &RenderView) -> bool {
    if desc.suppress_surface_in_view_id != 0 && desc.suppress_surface_in_view_id == view.view_id {
        return false;
    }
    if desc.allow_surface_in_view_id != 0 && desc.allow_surface_in_view_id != view.view_id {
        return false;
    }
    true
}

impl RenderWorld {
    pub fn new(config: RenderWorldConfig) -> Self {
        let mut world = Self {
            light_queries: LightQueryQueue::with_capacity(config.light_query_capacity),
            config,
            graph: AreaPortalGraph::default(),
            models: ModelRegistry::new(),
            defs: SceneDefRegistry::new(),
            interactions: InteractionTable::new(),
            decals: DecalSystem::new(),
            materials: Vec::new(),
            area_models: Vec::new(),
            portal_sky: Vec::new(),
            map_name: String::new(),
            map_checksum: 0,
            primary_view: None,
        };
        world.load(&MapSource::empty("_emptyMap"));
        world
    }

    // ============================================================
    // Lifecycle
    // ============================================================

    /// Rebuilds the whole world from decoded map data, dropping every
    /// registered def, interaction, decal and pending light query. Passing
    /// None loads the empty single area world. Returns false when the
    /// source could not be used as-is: a wrong format tag degrades to a
    /// single merged area, a structurally broken source to the empty world.
    pub fn init_from_map(&mut self, source: Option<&MapSource>) -> bool {
        let source = match source {
            Some(s) => s,
            None => {
                self.load(&MapSource::empty("_emptyMap"));
                return true;
            }
        };
        if source.format_id != MAP_FILE_ID {
            warn!(
                "map '{}' has format id '{}', expected '{}', rebuilding as a single area",
                source.name, source.format_id, MAP_FILE_ID
            );
            let merged = merge_into_single_area(source);
            self.load(&merged);
            return false;
        }
        if let Err(err) = source.validate() {
            warn!("map '{}' rejected: {}", source.name, err);
            self.load(&MapSource::empty("_emptyMap"));
            return false;
        }
        self.load(source);
        true
    }

    fn load(&mut self, source: &MapSource) {
        self.defs.clear();
        self.interactions.clear();
        self.decals.clear();
        self.light_queries.clear();
        self.models.clear();
        self.primary_view = None;

        self.graph = AreaPortalGraph::from_map_source(source);
        self.materials = source.materials.clone();
        self.area_models = source
            .areas
            .iter()
            .enumerate()
            .map(|(i, area)| self.models.add_model(RenderModel::from_map_area(i, area)))
            .collect();
        self.portal_sky = source
            .areas
            .iter()
            .map(|area| {
                area.surfaces.iter().any(|surf| {
                    surf.material >= 0
                        && source
                            .materials
                            .get(surf.material as usize)
                            .map_or(false, |m| m.flags.contains(MaterialFlags::PORTAL_SKY))
                })
            })
            .collect();
        self.map_name = source.name.clone();
        self.map_checksum = source.checksum();
        info!(
            "render world '{}': {} areas, {} portals, checksum {:#010x}",
            self.map_name,
            self.graph.num_areas(),
            self.graph.num_portals(),
            self.map_checksum
        );
    }

    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    pub fn map_checksum(&self) -> u32 {
        self.map_checksum
    }

    /// The primary view set by the game or demo playback, used for material
    /// time evaluation.
    pub fn set_render_view(&mut self, view: &RenderView) {
        self.primary_view = Some(view.clone());
    }

    pub fn render_view(&self) -> Option<&RenderView> {
        self.primary_view.as_ref()
    }

    fn ctx(&self) -> TraceContext<'_> {
        TraceContext {
            graph: &self.graph,
            models: &self.models,
            defs: &self.defs,
            materials: &self.materials,
            area_models: &self.area_models,
        }
    }

    // ============================================================
    // Areas and portals
    // ============================================================

    pub fn num_areas(&self) -> i32 {
        self.graph.num_areas()
    }

    pub fn num_portals(&self) -> i32 {
        self.graph.num_portals()
    }

    pub fn find_portal(&self, bounds: &Bounds) -> QHandle {
        self.graph.find_portal(bounds)
    }

    /// Changing portal state also refloods light areas, purging the
    /// interactions of any light whose reach changed.
    pub fn set_portal_state(&mut self, portal: QHandle, blocking: PortalBlock) {
        self.graph.set_portal_state(portal, blocking);
        for light in self.defs.refresh_light_areas(&self.graph) {
            self.interactions.purge_light(light);
        }
    }

    pub fn get_portal_state(&self, portal: QHandle) -> PortalBlock {
        self.graph.get_portal_state(portal)
    }

    pub fn get_portal_plane(&self, portal: QHandle) -> Plane {
        self.graph.get_portal_plane(portal)
    }

    pub fn set_portal_player_loss(&mut self, portal: QHandle, loss: f32) {
        self.graph.set_portal_player_loss(portal, loss);
    }

    pub fn areas_are_connected(&self, area1: i32, area2: i32, connection: PortalBlock) -> bool {
        if self.config.no_area_flow {
            let num = self.graph.num_areas();
            return area1 >= 0 && area1 < num && area2 >= 0 && area2 < num;
        }
        self.graph.areas_are_connected(area1, area2, connection)
    }

    pub fn get_area_at_point(&self, point: &Vec3) -> i32 {
        self.graph.area_at_point(point)
    }

    pub fn get_point_in_area(&self, area: i32) -> (Vec3, PointInAreaStatus) {
        self.graph.point_in_area(area)
    }

    pub fn find_areas_in_bounds(&self, bounds: &Bounds, areas_out: &mut [i32]) -> usize {
        self.graph.find_areas_in_bounds(bounds, areas_out)
    }

    pub fn num_portals_in_area(&self, area: i32) -> i32 {
        self.graph.num_portals_in_area(area)
    }

    pub fn get_portal(&self, area: i32, portal_num: i32) -> Option<ExitPortal> {
        self.graph.get_portal(area, portal_num)
    }

    /// Whether the area's static geometry requires portal sky compositing.
    /// Cached from material flags at load time.
    pub fn check_area_for_portal_sky(&self, area: i32) -> bool {
        if area < 0 {
            return false;
        }
        self.portal_sky.get(area as usize).copied().unwrap_or(false)
    }

    // ============================================================
    // Entity and light defs
    // ============================================================

    pub fn add_entity_def(&mut self, desc: &RenderEntityDesc) -> QHandle {
        self.defs.add_entity_def(desc, &self.graph, &self.models)
    }

    pub fn update_entity_def(&mut self, handle: QHandle, desc: &RenderEntityDesc) {
        if self.defs.update_entity_def(handle, desc, &self.graph, &self.models) {
            self.interactions.purge_entity(handle);
            self.decals.mark_entity_stale(handle);
        }
    }

    pub fn free_entity_def(&mut self, handle: QHandle) {
        if self.defs.free_entity_def(handle) {
            self.interactions.purge_entity(handle);
            self.decals.remove_decals(handle);
        }
    }

    pub fn get_render_entity(&self, handle: QHandle) -> Option<&RenderEntityDesc> {
        self.defs.render_entity(handle)
    }

    pub fn add_light_def(&mut self, desc: &RenderLightDesc) -> QHandle {
        self.defs.add_light_def(desc, &self.graph)
    }

    pub fn update_light_def(&mut self, handle: QHandle, desc: &RenderLightDesc) {
        if self.defs.update_light_def(handle, desc, &self.graph) {
            self.interactions.purge_light(handle);
        }
    }

    pub fn free_light_def(&mut self, handle: QHandle) {
        if self.defs.free_light_def(handle) {
            self.interactions.purge_light(handle);
        }
    }

    pub fn get_render_light(&self, handle: QHandle) -> Option<&RenderLightDesc> {
        self.defs.render_light(handle)
    }

    pub fn num_entity_defs(&self) -> usize {
        self.defs.num_entity_defs()
    }

    pub fn num_light_defs(&self) -> usize {
        self.defs.num_light_defs()
    }

    /// Demo playback places a def at an exact historical handle value.
    pub fn restore_entity_def(&mut self, handle: QHandle, desc: &RenderEntityDesc) -> bool {
        let placed = self
            .defs
            .restore_entity_def(handle, desc, &self.graph, &self.models);
        if placed {
            self.interactions.purge_entity(handle);
            self.decals.mark_entity_stale(handle);
        }
        placed
    }

    pub fn restore_light_def(&mut self, handle: QHandle, desc: &RenderLightDesc) -> bool {
        let placed = self.defs.restore_light_def(handle, desc, &self.graph);
        if placed {
            self.interactions.purge_light(handle);
        }
        placed
    }

    // ============================================================
    // Interactions
    // ============================================================

    /// Whole scene eager pass, run once at the end of a level load. Deferred
    /// models count interaction generation as a trigger, pending light
    /// queries are serviced afterwards.
    pub fn generate_all_interactions(&mut self) {
        for handle in self.defs.entity_handles() {
            self.defs
                .resolve_entity_model(handle, None, &self.models, &self.graph);
        }
        self.interactions.generate_all(&self.defs);
        self.process_light_queries();
    }

    /// Purges every cached interaction and regenerates the whole scene.
    pub fn regenerate_world(&mut self) {
        self.interactions.clear();
        self.generate_all_interactions();
    }

    /// Cached state for one pair, computed on first use.
    pub fn interaction(&mut self, light: QHandle, entity: QHandle) -> Option<Interaction> {
        self.interactions.ensure(light, entity, &self.defs)
    }

    pub fn num_interactions(&self) -> usize {
        self.interactions.len()
    }

    /// Floods the view-open areas from the eye, collects the defs referenced
    /// into them past the view id filters, resolves deferred models for the
    /// visible entities, and fills in any missing interactions between the
    /// visible lights and entities. An eye outside every area sees the whole
    /// map.
    pub fn prepare_view(&mut self, view: &RenderView) -> ViewScene {
        let eye_area = self.graph.area_at_point(&view.vieworg);
        let areas: Vec<i32> = if eye_area >= 0 {
            self.graph
                .flood_connected_areas(eye_area, PortalBlock::VIEW, None)
        } else {
            (0..self.graph.num_areas()).collect()
        };

        let mut entities = Vec::new();
        for handle in self.defs.entity_handles() {
            let def = match self.defs.entity_def(handle) {
                Some(d) => d,
                None => continue,
            };
            if !surface_allowed_in_view(&def.desc, view) {
                continue;
            }
            if !def.areas.iter().any(|a| areas.contains(a)) {
                continue;
            }
            entities.push(handle);
        }
        for &handle in &entities {
            self.defs
                .resolve_entity_model(handle, Some(view), &self.models, &self.graph);
        }

        let mut lights = Vec::new();
        for (handle, def) in self.defs.lights() {
            if def.desc.suppress_light_in_view_id != 0
                && def.desc.suppress_light_in_view_id == view.view_id
            {
                continue;
            }
            if def.desc.allow_light_in_view_id != 0
                && def.desc.allow_light_in_view_id != view.view_id
            {
                continue;
            }
            if !def.areas.iter().any(|a| areas.contains(a)) {
                continue;
            }
            lights.push(handle);
        }

        for &light in &lights {
            for &entity in &entities {
                self.interactions.ensure(light, entity, &self.defs);
            }
        }

        ViewScene {
            view: view.clone(),
            areas,
            entities,
            lights,
        }
    }

    // ============================================================
    // Tracing
    // ============================================================

    pub fn fast_world_trace(&self, start: &Vec3, end: &Vec3) -> ModelTrace {
        trace::fast_world_trace(&self.ctx(), start, end)
    }

    pub fn trace_all(
        &self,
        start: &Vec3,
        end: &Vec3,
        fast_world: bool,
        radius: f32,
        filter: Option<&TraceFilter>,
    ) -> ModelTrace {
        trace::trace_all(&self.ctx(), start, end, fast_world, radius, filter)
    }

    pub fn trace(
        &self,
        start: &Vec3,
        end: &Vec3,
        radius: f32,
        skip_dynamic: bool,
        skip_player: bool,
    ) -> ModelTrace {
        trace::trace(&self.ctx(), start, end, radius, skip_dynamic, skip_player)
    }

    /// Single entity trace. The entity's deferred model is instantiated
    /// first when one is pending.
    pub fn model_trace(
        &mut self,
        entity: QHandle,
        start: &Vec3,
        end: &Vec3,
        radius: f32,
    ) -> ModelTrace {
        self.defs
            .resolve_entity_model(entity, None, &self.models, &self.graph);
        trace::model_trace(&self.ctx(), entity, start, end, radius)
    }

    pub fn material_trace(&self, point: &Vec3, material: MaterialId) -> Option<String> {
        trace::material_trace(&self.ctx(), point, material)
    }

    // ============================================================
    // Decals and overlays
    // ============================================================

    pub fn project_decal_onto_world(
        &mut self,
        winding: &Winding,
        projection_origin: &Vec3,
        parallel: bool,
        fade_depth: f32,
        material: MaterialId,
        start_time: i32,
    ) {
        let ctx = TraceContext {
            graph: &self.graph,
            models: &self.models,
            defs: &self.defs,
            materials: &self.materials,
            area_models: &self.area_models,
        };
        self.decals.project_decal_onto_world(
            &ctx,
            winding,
            projection_origin,
            parallel,
            fade_depth,
            material,
            start_time,
        );
    }

    pub fn project_decal(
        &mut self,
        entity: QHandle,
        winding: &Winding,
        projection_origin: &Vec3,
        parallel: bool,
        fade_depth: f32,
        material: MaterialId,
        start_time: i32,
    ) {
        self.defs
            .resolve_entity_model(entity, None, &self.models, &self.graph);
        let ctx = TraceContext {
            graph: &self.graph,
            models: &self.models,
            defs: &self.defs,
            materials: &self.materials,
            area_models: &self.area_models,
        };
        self.decals.project_decal(
            &ctx,
            entity,
            winding,
            projection_origin,
            parallel,
            fade_depth,
            material,
            start_time,
        );
    }

    pub fn project_overlay(
        &mut self,
        entity: QHandle,
        texture_axes: &[Plane; 2],
        material: MaterialId,
    ) {
        self.defs
            .resolve_entity_model(entity, None, &self.models, &self.graph);
        let ctx = TraceContext {
            graph: &self.graph,
            models: &self.models,
            defs: &self.defs,
            materials: &self.materials,
            area_models: &self.area_models,
        };
        self.decals
            .project_overlay(&ctx, entity, texture_axes, material);
    }

    pub fn remove_decals(&mut self, entity: QHandle) {
        self.decals.remove_decals(entity);
    }

    pub fn world_decal_fragments(&self) -> &[DecalFragment] {
        self.decals.world_fragments()
    }

    pub fn entity_decal_fragments(&mut self, entity: QHandle) -> &[DecalFragment] {
        let ctx = TraceContext {
            graph: &self.graph,
            models: &self.models,
            defs: &self.defs,
            materials: &self.materials,
            area_models: &self.area_models,
        };
        self.decals.entity_fragments(&ctx, entity)
    }

    // ============================================================
    // Models
    // ============================================================

    pub fn add_model(&mut self, model: RenderModel) -> QHandle {
        self.models.add_model(model)
    }

    pub fn find_model(&self, name: &str) -> QHandle {
        self.models.find_model(name)
    }

    // ============================================================
    // Light queries
    // ============================================================

    pub fn add_light_query(
        &self,
        on_entity: QHandle,
        point: &Vec3,
        ignored: &[QHandle],
    ) -> LightQueryId {
        self.light_queries.add_query(on_entity, point, ignored)
    }

    pub fn check_light_query(&self, id: LightQueryId) -> Option<LightSample> {
        self.light_queries.check_result(id)
    }

    pub fn forget_light_query(&self, id: LightQueryId) {
        self.light_queries.forget(id)
    }

    /// Drains the light query backlog against the current scene.
    pub fn process_light_queries(&self) {
        self.light_queries.process_pending(&self.ctx());
    }
}

impl Default for RenderWorld {
    fn default() -> Self {
        Self::new(RenderWorldConfig::default())
    }
}

// ============================================================
