// light_queries.rs — asynchronous light sampling at world or model points

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, warn};
use parking_lot::Mutex;

use arclight_common::math::{
    axis_project, axis_rotate, axis_transform, vector_add, vector_length, vector_subtract, Vec3,
    ON_EPSILON,
};
use arclight_common::scene::{
    LightDefFlags, QHandle, RenderLightDesc, HANDLE_NONE, SHADERPARM_BLUE, SHADERPARM_GREEN,
    SHADERPARM_RED,
};

use crate::defs::LightDef;
use crate::trace::{segment_open, TraceContext};

/// Queries waiting to be processed beyond this are dropped at enqueue time.
pub const MAX_PENDING_LIGHT_QUERIES: usize = 256;

// shadow rays per light, the first one unjittered
const SHADOW_SAMPLES: u32 = 4;
const SHADOW_JITTER: f32 = 4.0;

pub type LightQueryId = i32;

/// Answer to a light query. `position` is the sample point resolved to world
/// space, after riding the owning entity's transform when one was given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSample {
    pub value: Vec3,
    pub position: Vec3,
}

struct PendingQuery {
    id: LightQueryId,
    on_entity: QHandle,
    point: Vec3,
    ignored: Vec<QHandle>,
}

enum QueryState {
    Pending,
    Ready(LightSample),
}

/// Bounded producer side with a polled result store. Game code enqueues from
/// anywhere without blocking, results appear once the world drains the queue
/// during its next processing step.
pub struct LightQueryQueue {
    next_id: AtomicI32,
    sender: Sender<PendingQuery>,
    receiver: Receiver<PendingQuery>,
    states: Mutex<HashMap<LightQueryId, QueryState>>,
}

impl LightQueryQueue {
    pub fn new() -> Self {
        Self::with_capacity(MAX_PENDING_LIGHT_QUERIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        LightQueryQueue {
            next_id: AtomicI32::new(1),
            sender,
            receiver,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Ids are issued monotonically and never reused, a stale one can at
    /// worst read as not ready. When the backlog is full the query is still
    /// assigned an id but will never resolve.
    pub fn add_query(&self, on_entity: QHandle, point: &Vec3, ignored: &[QHandle]) -> LightQueryId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.states.lock().insert(id, QueryState::Pending);
        let pending = PendingQuery {
            id,
            on_entity,
            point: *point,
            ignored: ignored.to_vec(),
        };
        if self.sender.try_send(pending).is_err() {
            warn!("light query backlog full, query {} will not resolve", id);
        }
        id
    }

    /// Non blocking poll. The result stays readable until the id is
    /// forgotten.
    pub fn check_result(&self, id: LightQueryId) -> Option<LightSample> {
        match self.states.lock().get(&id) {
            Some(QueryState::Ready(sample)) => Some(*sample),
            _ => None,
        }
    }

    /// Releases a query in any state. A query still sitting in the backlog
    /// keeps its slot in the channel but its result is discarded when it
    /// finally processes.
    pub fn forget(&self, id: LightQueryId) {
        self.states.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Drains the backlog and samples the scene for each query.
    pub fn process_pending(&self, ctx: &TraceContext) {
        while let Ok(query) = self.receiver.try_recv() {
            if !self.states.lock().contains_key(&query.id) {
                // forgotten while it waited
                continue;
            }
            let sample = resolve_query(ctx, &query);
            if let Some(state) = self.states.lock().get_mut(&query.id) {
                *state = QueryState::Ready(sample);
            }
        }
    }

    /// Map teardown. Queued queries and results are dropped wholesale, the
    /// id counter keeps running.
    pub fn clear(&self) {
        while self.receiver.try_recv().is_ok() {}
        self.states.lock().clear();
    }
}

impl Default for LightQueryQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// Sampling
// ============================================================

fn resolve_query(ctx: &TraceContext, query: &PendingQuery) -> LightSample {
    let mut position = query.point;
    let mut occluder_skip = query.ignored.clone();
    if query.on_entity != HANDLE_NONE {
        match ctx.defs.entity_def(query.on_entity) {
            Some(def) => {
                position = axis_transform(&def.desc.origin, &def.desc.axis, &query.point);
            }
            None => {
                debug!(
                    "light query {}: entity {} is gone, sampling the raw point",
                    query.id, query.on_entity
                );
            }
        }
        // the sampled entity must not shadow itself
        if !occluder_skip.contains(&query.on_entity) {
            occluder_skip.push(query.on_entity);
        }
    }

    let area = ctx.graph.area_at_point(&position);
    let mut value: Vec3 = [0.0, 0.0, 0.0];
    for handle in ctx.defs.light_handles() {
        let def = match ctx.defs.light_def(handle) {
            Some(d) => d,
            None => continue,
        };
        if !def.world_bounds.contains_point(&position) {
            continue;
        }
        // light flow has to reach the sample's area through open portals
        if area >= 0 && !def.areas.contains(&area) {
            continue;
        }
        let atten = envelope_attenuation(def, &position);
        if atten <= 0.0 {
            continue;
        }
        let open = if def.desc.flags.contains(LightDefFlags::NO_SHADOWS) {
            1.0
        } else {
            shadow_openness(ctx, &emit_point(&def.desc), &position, &occluder_skip)
        };
        if open <= 0.0 {
            continue;
        }
        let scale = atten * open;
        value[0] += def.desc.shader_parms[SHADERPARM_RED] * scale;
        value[1] += def.desc.shader_parms[SHADERPARM_GREEN] * scale;
        value[2] += def.desc.shader_parms[SHADERPARM_BLUE] * scale;
    }

    LightSample { value, position }
}

/// Shadows are cast from the shading origin, which light_center offsets in
/// light space.
fn emit_point(desc: &RenderLightDesc) -> Vec3 {
    vector_add(&desc.origin, &axis_rotate(&desc.axis, &desc.light_center))
}

/// Point lights fall off linearly toward their radius ellipsoid. Projected
/// lights use the radius of their derived volume instead.
fn envelope_attenuation(def: &LightDef, point: &Vec3) -> f32 {
    if def.desc.point_light {
        let local = axis_project(&def.desc.origin, &def.desc.axis, point);
        let mut d = 0.0f32;
        for i in 0..3 {
            let r = def.desc.light_radius[i].abs();
            if r <= ON_EPSILON {
                return 0.0;
            }
            let n = local[i] / r;
            d += n * n;
        }
        (1.0 - d.sqrt()).max(0.0)
    } else {
        let radius = def.world_bounds.radius();
        if radius <= ON_EPSILON {
            return 0.0;
        }
        let dist = vector_length(&vector_subtract(point, &def.desc.origin));
        (1.0 - dist / radius).max(0.0)
    }
}

/// Fraction of shadow rays that reach the sample, jittered to soften hard
/// occluder edges.
fn shadow_openness(ctx: &TraceContext, from: &Vec3, to: &Vec3, ignored: &[QHandle]) -> f32 {
    let mut open = 0;
    for sample in 0..SHADOW_SAMPLES {
        let mut target = *to;
        if sample > 0 {
            for axis in &mut target {
                *axis += (rand::random::<f32>() - 0.5) * SHADOW_JITTER;
            }
        }
        if segment_open(ctx, from, &target, ignored) {
            open += 1;
        }
    }
    open as f32 / SHADOW_SAMPLES as f32
}

// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::SceneDefRegistry;
    use crate::models::{ModelRegistry, RenderModel};
    use crate::portals::AreaPortalGraph;
    use crate::test_support::{box_model, two_room_map};
    use approx::assert_relative_eq;
    use arclight_common::map_source::MaterialDecl;
    use arclight_common::math::Bounds;
    use arclight_common::scene::{ModelSource, PortalBlock, RenderEntityDesc};

    struct Fixture {
        graph: AreaPortalGraph,
        models: ModelRegistry,
        defs: SceneDefRegistry,
        materials: Vec<MaterialDecl>,
        area_models: Vec<QHandle>,
    }

    impl Fixture {
        fn new() -> Self {
            let map = two_room_map();
            let graph = AreaPortalGraph::from_map_source(&map);
            let mut models = ModelRegistry::new();
            let mut area_models = Vec::new();
            for (i, area) in map.areas.iter().enumerate() {
                area_models.push(models.add_model(RenderModel::from_map_area(i, area)));
            }
            Fixture {
                graph,
                models,
                defs: SceneDefRegistry::new(),
                materials: map.materials,
                area_models,
            }
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

        fn add_box_entity(&mut self, origin: Vec3, half: f32) -> QHandle {
            let model = self.models.add_model(box_model("box", half));
            let desc = RenderEntityDesc {
                model: ModelSource::Model(model),
                origin,
                ..Default::default()
            };
            self.defs.add_entity_def(&desc, &self.graph, &self.models)
        }

        fn add_point_light(&mut self, origin: Vec3, radius: f32, rgb: [f32; 3]) -> QHandle {
            let mut desc = RenderLightDesc {
                point_light: true,
                origin,
                light_radius: [radius; 3],
                ..Default::default()
            };
            desc.shader_parms[SHADERPARM_RED] = rgb[0];
            desc.shader_parms[SHADERPARM_GREEN] = rgb[1];
            desc.shader_parms[SHADERPARM_BLUE] = rgb[2];
            self.defs.add_light_def(&desc, &self.graph)
        }
    }

    #[test]
    fn test_ids_are_monotone_from_one() {
        let queue = LightQueryQueue::new();
        let p = [-64.0, 0.0, 24.0];
        assert_eq!(queue.add_query(HANDLE_NONE, &p, &[]), 1);
        assert_eq!(queue.add_query(HANDLE_NONE, &p, &[]), 2);
        assert_eq!(queue.add_query(HANDLE_NONE, &p, &[]), 3);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_result_lifecycle() {
        let mut fix = Fixture::new();
        fix.add_point_light([-32.0, 0.0, 24.0], 100.0, [2.0, 1.0, 0.5]);
        let queue = LightQueryQueue::new();

        let id = queue.add_query(HANDLE_NONE, &[-64.0, 0.0, 24.0], &[]);
        assert!(queue.check_result(id).is_none());

        queue.process_pending(&fix.ctx());
        assert!(queue.is_empty());

        // distance 32 of radius 100 leaves 68 percent
        let sample = queue.check_result(id).unwrap();
        assert_relative_eq!(sample.value[0], 1.36, epsilon = 1e-4);
        assert_relative_eq!(sample.value[1], 0.68, epsilon = 1e-4);
        assert_relative_eq!(sample.value[2], 0.34, epsilon = 1e-4);
        assert_eq!(sample.position, [-64.0, 0.0, 24.0]);

        // polling again keeps answering until the id is forgotten
        assert!(queue.check_result(id).is_some());
        queue.forget(id);
        assert!(queue.check_result(id).is_none());
        queue.forget(id);
    }

    #[test]
    fn test_forget_pending_discards_late_result() {
        let fix = Fixture::new();
        let queue = LightQueryQueue::new();
        let id = queue.add_query(HANDLE_NONE, &[-64.0, 0.0, 24.0], &[]);
        queue.forget(id);
        queue.process_pending(&fix.ctx());
        assert!(queue.check_result(id).is_none());
    }

    #[test]
    fn test_backlog_overflow_never_resolves() {
        let fix = Fixture::new();
        let queue = LightQueryQueue::new();
        let p = [-64.0, 0.0, 24.0];

        let first = queue.add_query(HANDLE_NONE, &p, &[]);
        for _ in 1..MAX_PENDING_LIGHT_QUERIES {
            queue.add_query(HANDLE_NONE, &p, &[]);
        }
        assert_eq!(queue.len(), MAX_PENDING_LIGHT_QUERIES);
        let overflow = queue.add_query(HANDLE_NONE, &p, &[]);

        queue.process_pending(&fix.ctx());
        assert!(queue.check_result(first).is_some());
        assert!(queue.check_result(overflow).is_none());
    }

    #[test]
    fn test_sample_outside_envelope_is_dark() {
        let mut fix = Fixture::new();
        fix.add_point_light([-32.0, 0.0, 24.0], 20.0, [1.0, 1.0, 1.0]);
        let queue = LightQueryQueue::new();
        let id = queue.add_query(HANDLE_NONE, &[-90.0, 0.0, 24.0], &[]);
        queue.process_pending(&fix.ctx());

        // resolved, just unlit
        let sample = queue.check_result(id).unwrap();
        assert_eq!(sample.value, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_closed_portal_blocks_light_flow() {
        let mut fix = Fixture::new();
        let light = fix.add_point_light([-32.0, 0.0, 24.0], 300.0, [1.0, 1.0, 1.0]);
        let queue = LightQueryQueue::new();

        let lit = queue.add_query(HANDLE_NONE, &[32.0, 0.0, 24.0], &[]);
        queue.process_pending(&fix.ctx());
        let sample = queue.check_result(lit).unwrap();
        assert_relative_eq!(sample.value[0], 1.0 - 64.0 / 300.0, epsilon = 1e-4);

        let portal = fix
            .graph
            .find_portal(&Bounds::new([-1.0, -16.0, 0.0], [1.0, 16.0, 48.0]));
        fix.graph.set_portal_state(portal, PortalBlock::VIEW);
        assert_eq!(fix.defs.refresh_light_areas(&fix.graph), vec![light]);

        let dark = queue.add_query(HANDLE_NONE, &[32.0, 0.0, 24.0], &[]);
        queue.process_pending(&fix.ctx());
        assert_eq!(queue.check_result(dark).unwrap().value, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_on_entity_query_rides_the_transform() {
        let mut fix = Fixture::new();
        let h = fix.add_box_entity([64.0, 0.0, 16.0], 8.0);
        fix.add_point_light([32.0, 0.0, 16.0], 100.0, [1.0, 1.0, 1.0]);
        let queue = LightQueryQueue::new();

        // sampled at the entity center, inside its own model, which must not
        // shadow the query
        let id = queue.add_query(h, &[0.0, 0.0, 0.0], &[]);
        queue.process_pending(&fix.ctx());
        let sample = queue.check_result(id).unwrap();
        assert_eq!(sample.position, [64.0, 0.0, 16.0]);
        assert_relative_eq!(sample.value[0], 0.68, epsilon = 1e-4);
    }

    #[test]
    fn test_ignored_entities_do_not_occlude() {
        let mut fix = Fixture::new();
        let blocker = fix.add_box_entity([0.0, 0.0, 24.0], 12.0);
        fix.add_point_light([-48.0, 0.0, 24.0], 150.0, [1.0, 1.0, 1.0]);
        let queue = LightQueryQueue::new();

        let shadowed = queue.add_query(HANDLE_NONE, &[48.0, 0.0, 24.0], &[]);
        let open = queue.add_query(HANDLE_NONE, &[48.0, 0.0, 24.0], &[blocker]);
        queue.process_pending(&fix.ctx());

        assert_eq!(queue.check_result(shadowed).unwrap().value, [0.0, 0.0, 0.0]);
        let lit = queue.check_result(open).unwrap();
        assert_relative_eq!(lit.value[0], 1.0 - 96.0 / 150.0, epsilon = 1e-4);
    }

    #[test]
    fn test_shadowless_light_ignores_occluders() {
        let mut fix = Fixture::new();
        fix.add_box_entity([0.0, 0.0, 24.0], 12.0);
        let light = fix.add_point_light([-48.0, 0.0, 24.0], 150.0, [1.0, 1.0, 1.0]);
        if let Some(def) = fix.defs.light_def_mut(light) {
            def.desc.flags = LightDefFlags::NO_SHADOWS;
        }
        let queue = LightQueryQueue::new();

        let id = queue.add_query(HANDLE_NONE, &[48.0, 0.0, 24.0], &[]);
        queue.process_pending(&fix.ctx());
        let sample = queue.check_result(id).unwrap();
        assert_relative_eq!(sample.value[0], 1.0 - 96.0 / 150.0, epsilon = 1e-4);
    }

    #[test]
    fn test_projected_light_uses_volume_radius() {
        let mut fix = Fixture::new();
        let mut desc = RenderLightDesc {
            point_light: false,
            origin: [-32.0, 0.0, 48.0],
            target: [0.0, 0.0, -48.0],
            right: [16.0, 0.0, 0.0],
            up: [0.0, 16.0, 0.0],
            ..Default::default()
        };
        desc.shader_parms[SHADERPARM_RED] = 1.0;
        desc.shader_parms[SHADERPARM_GREEN] = 1.0;
        desc.shader_parms[SHADERPARM_BLUE] = 1.0;
        fix.defs.add_light_def(&desc, &fix.graph);
        let queue = LightQueryQueue::new();

        let id = queue.add_query(HANDLE_NONE, &[-32.0, 0.0, 24.0], &[]);
        queue.process_pending(&fix.ctx());
        let sample = queue.check_result(id).unwrap();
        // 24 units below the emitter, volume radius sqrt(1088)
        assert_relative_eq!(
            sample.value[0],
            1.0 - 24.0 / 1088.0f32.sqrt(),
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_query_on_missing_entity_resolves_at_raw_point() {
        let fix = Fixture::new();
        let queue = LightQueryQueue::new();
        let id = queue.add_query(42, &[-64.0, 0.0, 24.0], &[]);
        queue.process_pending(&fix.ctx());
        let sample = queue.check_result(id).unwrap();
        assert_eq!(sample.position, [-64.0, 0.0, 24.0]);
        assert_eq!(sample.value, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_clear_keeps_ids_monotone() {
        let fix = Fixture::new();
        let queue = LightQueryQueue::new();
        let before = queue.add_query(HANDLE_NONE, &[-64.0, 0.0, 24.0], &[]);
        queue.clear();
        assert!(queue.is_empty());
        queue.process_pending(&fix.ctx());
        assert!(queue.check_result(before).is_none());

        let after = queue.add_query(HANDLE_NONE, &[-64.0, 0.0, 24.0], &[]);
        assert!(after > before);
    }
}
