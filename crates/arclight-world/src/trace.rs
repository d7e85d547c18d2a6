// trace.rs — ray and segment clipping against area and entity geometry

use arclight_common::map_source::MaterialDecl;
use arclight_common::math::{
    axis_project, axis_rotate, cross_product, dot_product, joint_mat_translation,
    vector_compare, vector_length_squared, vector_ma, vector_negate, vector_normalize,
    vector_subtract, Bounds, JointMat, Vec3,
};
use arclight_common::scene::{
    EntityDefFlags, MaterialFlags, ModelSource, ModelTrace, QHandle, RenderEntityDesc, HANDLE_NONE,
    MATERIAL_NONE, VIEW_ID_PLAYER,
};

use crate::defs::{EntityDef, SceneDefRegistry};
use crate::models::{ModelRegistry, RenderModel};
use crate::portals::AreaPortalGraph;

// barycentric rejection epsilon for near parallel rays
const TRI_EPSILON: f32 = 1e-6;

// a surface is "at" a point if the point sits this far in front of or
// behind its plane
const MATERIAL_TRACE_FRONT: f32 = 0.25;
const MATERIAL_TRACE_BEHIND: f32 = -8.0;

/// Per candidate veto for traces. Receives the entity descriptor (None for
/// area geometry), the model being tested, and the surface material when one
/// is registered. Returning false skips the surface.
pub type TraceFilter<'a> =
    dyn Fn(Option<&RenderEntityDesc>, &RenderModel, Option<&MaterialDecl>) -> bool + 'a;

/// Read-only borrow of everything a trace needs. Deferred entity models must
/// be resolved before building one of these, a still pending callback is
/// simply not clipped against.
pub struct TraceContext<'a> {
    pub graph: &'a AreaPortalGraph,
    pub models: &'a ModelRegistry,
    pub defs: &'a SceneDefRegistry,
    pub materials: &'a [MaterialDecl],
    /// Model handle backing each area, indexed by area number.
    pub area_models: &'a [QHandle],
}

impl<'a> TraceContext<'a> {
    pub(crate) fn material_decl(&self, id: i32) -> Option<&MaterialDecl> {
        if id < 0 || id >= self.materials.len() as i32 {
            return None;
        }
        Some(&self.materials[id as usize])
    }

    pub(crate) fn material_flags(&self, id: i32) -> MaterialFlags {
        self.material_decl(id).map_or(MaterialFlags::empty(), |m| m.flags)
    }

    pub(crate) fn area_model(&self, area: i32) -> Option<&RenderModel> {
        if area < 0 || area >= self.area_models.len() as i32 {
            return None;
        }
        self.models.model(self.area_models[area as usize])
    }
}

// ============================================================
// Triangle intersection
// ============================================================

struct TriangleHit {
    fraction: f32,
    normal: Vec3,
}

/// Moeller-Trumbore segment versus triangle. `dir` is end - start,
/// unnormalized, so the returned fraction is parametric over the segment.
/// One sided unless `two_sided`, back hits get their normal flipped toward
/// the start.
///
/// A positive `radius` pulls the hit fraction back so a sphere of that
/// radius rests on the triangle plane. Edge and vertex contacts are not
/// rounded.
fn intersect_triangle(
    start: &Vec3,
    dir: &Vec3,
    tri: &[Vec3; 3],
    radius: f32,
    two_sided: bool,
) -> Option<TriangleHit> {
    let edge1 = vector_subtract(&tri[1], &tri[0]);
    let edge2 = vector_subtract(&tri[2], &tri[0]);

    let pvec = cross_product(dir, &edge2);
    let det = dot_product(&edge1, &pvec);

    // det > 0 when the segment approaches the front face of a CCW triangle
    if two_sided {
        if det > -TRI_EPSILON && det < TRI_EPSILON {
            return None;
        }
    } else if det < TRI_EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;

    let tvec = vector_subtract(start, &tri[0]);
    let u = dot_product(&tvec, &pvec) * inv_det;
    if u < 0.0 || u > 1.0 {
        return None;
    }

    let qvec = cross_product(&tvec, &edge1);
    let v = dot_product(dir, &qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let mut t = dot_product(&edge2, &qvec) * inv_det;
    if t < 0.0 || t > 1.0 {
        return None;
    }

    let mut normal = cross_product(&edge1, &edge2);
    vector_normalize(&mut normal);
    if dot_product(&normal, dir) > 0.0 {
        normal = vector_negate(&normal);
    }

    if radius > 0.0 {
        let approach = -dot_product(&normal, dir);
        if approach > TRI_EPSILON {
            t -= radius / approach;
            if t < 0.0 {
                t = 0.0;
            }
        }
    }

    Some(TriangleHit { fraction: t, normal })
}

/// Clips a local space segment against every triangle of a model, honoring
/// the per surface filter, and keeps the nearest hit. Returns the surface
/// index alongside the hit so callers can fill in identity.
fn clip_model_segment(
    ctx: &TraceContext,
    model: &RenderModel,
    entity: Option<&RenderEntityDesc>,
    start: &Vec3,
    end: &Vec3,
    radius: f32,
    filter: Option<&TraceFilter>,
) -> Option<(TriangleHit, usize)> {
    let dir = vector_subtract(end, start);
    let mut best: Option<(TriangleHit, usize)> = None;

    for (surf_idx, surf) in model.surfaces.iter().enumerate() {
        let decl = ctx.material_decl(surf.material);
        if let Some(f) = filter {
            if !f(entity, model, decl) {
                continue;
            }
        }
        let two_sided = ctx
            .material_flags(surf.material)
            .contains(MaterialFlags::TWO_SIDED);

        for tri_num in 0..surf.num_triangles() {
            let tri = surf.triangle(tri_num);
            if let Some(hit) = intersect_triangle(start, &dir, &tri, radius, two_sided) {
                let nearer = match &best {
                    Some((b, _)) => hit.fraction < b.fraction,
                    None => true,
                };
                if nearer {
                    best = Some((hit, surf_idx));
                }
            }
        }
    }

    best
}

// ============================================================
// World clipping
// ============================================================

fn clip_area_geometry(
    ctx: &TraceContext,
    area: i32,
    start: &Vec3,
    end: &Vec3,
    radius: f32,
    filter: Option<&TraceFilter>,
    trace: &mut ModelTrace,
) {
    let model = match ctx.area_model(area) {
        Some(m) => m,
        None => return,
    };

    if let Some((hit, surf_idx)) = clip_model_segment(ctx, model, None, start, end, radius, filter)
    {
        if hit.fraction < trace.fraction {
            trace.fraction = hit.fraction;
            trace.point = vector_ma(start, hit.fraction, &vector_subtract(end, start));
            trace.normal = hit.normal;
            trace.material = model.surfaces[surf_idx].material;
            trace.entity = HANDLE_NONE;
            trace.model = ctx.area_models[area as usize];
            trace.surface_index = surf_idx as i32;
        }
    }
}

/// Near to far traversal that stops the segment where it enters a solid
/// leaf. No triangles are tested, the hit normal comes from the node plane
/// that was crossed.
fn recursive_bsp_trace(
    ctx: &TraceContext,
    node_index: usize,
    p1f: f32,
    p2f: f32,
    p1: &Vec3,
    p2: &Vec3,
    trace: &mut ModelTrace,
) {
    if trace.fraction <= p1f {
        // already hit something nearer
        return;
    }

    let node = &ctx.graph.bsp_nodes()[node_index];
    let t1 = node.plane.distance_to(p1);
    let t2 = node.plane.distance_to(p2);

    if t1 >= 0.0 && t2 >= 0.0 {
        bsp_trace_child(ctx, node.children[0], node_index, p1f, p2f, p1, p2, trace);
        return;
    }
    if t1 < 0.0 && t2 < 0.0 {
        bsp_trace_child(ctx, node.children[1], node_index, p1f, p2f, p1, p2, trace);
        return;
    }

    // straddles the node plane, near side first
    let side = if t1 < t2 { 1 } else { 0 };
    let frac = t1 / (t1 - t2);
    let midf = p1f + (p2f - p1f) * frac;
    let mid = vector_ma(p1, frac, &vector_subtract(p2, p1));

    bsp_trace_child(ctx, node.children[side], node_index, p1f, midf, p1, &mid, trace);
    bsp_trace_child(ctx, node.children[side ^ 1], node_index, midf, p2f, &mid, p2, trace);
}

#[allow(clippy::too_many_arguments)]
fn bsp_trace_child(
    ctx: &TraceContext,
    child: i32,
    from_node: usize,
    p1f: f32,
    p2f: f32,
    p1: &Vec3,
    p2: &Vec3,
    trace: &mut ModelTrace,
) {
    if trace.fraction <= p1f {
        return;
    }
    if child > 0 {
        recursive_bsp_trace(ctx, child as usize, p1f, p2f, p1, p2, trace);
        return;
    }
    if child < 0 {
        // open area, the segment passes through
        return;
    }
    // solid leaf, the segment stops where it entered
    trace.fraction = p1f;
    trace.point = *p1;
    trace.normal = ctx.graph.bsp_nodes()[from_node].plane.normal;
}

/// World only clip using the tree alone. Considerably cheaper than a full
/// trace but the result carries no material, model or surface identity, and
/// maps without a compiled tree never report a hit.
pub fn fast_world_trace(ctx: &TraceContext, start: &Vec3, end: &Vec3) -> ModelTrace {
    let mut trace = ModelTrace {
        point: *end,
        ..Default::default()
    };
    if vector_compare(start, end) || ctx.graph.bsp_nodes().is_empty() {
        return trace;
    }
    recursive_bsp_trace(ctx, 0, 0.0, 1.0, start, end, &mut trace);
    trace
}

// ============================================================
// Entity clipping
// ============================================================

pub(crate) fn entity_model_handle(def: &EntityDef) -> QHandle {
    match def.desc.model {
        ModelSource::Model(h) => h,
        ModelSource::Deferred(_) => def.resolved_model,
        ModelSource::None => HANDLE_NONE,
    }
}

fn segment_bounds(start: &Vec3, end: &Vec3, radius: f32) -> Bounds {
    let mut b = Bounds::from_point(start);
    b.add_point(end);
    b.expand(radius)
}

/// Joint whose translation sits closest to the local space point.
fn nearest_joint(joints: &[JointMat], point: &Vec3) -> i32 {
    let mut best = -1;
    let mut best_dist = f32::MAX;
    for (i, joint) in joints.iter().enumerate() {
        let d = vector_length_squared(&vector_subtract(point, &joint_mat_translation(joint)));
        if d < best_dist {
            best_dist = d;
            best = i as i32;
        }
    }
    best
}

#[allow(clippy::too_many_arguments)]
fn clip_entities(
    ctx: &TraceContext,
    start: &Vec3,
    end: &Vec3,
    radius: f32,
    only_entity: Option<QHandle>,
    filter: Option<&TraceFilter>,
    trace: &mut ModelTrace,
) {
    let seg = segment_bounds(start, end, radius);

    for handle in ctx.defs.entity_handles() {
        if let Some(only) = only_entity {
            if handle != only {
                continue;
            }
        }
        let def = match ctx.defs.entity_def(handle) {
            Some(d) => d,
            None => continue,
        };

        let model_handle = entity_model_handle(def);
        let model = match ctx.models.model(model_handle) {
            Some(m) => m,
            None => continue,
        };
        if model.is_empty() {
            continue;
        }

        let world_bounds = def.world_bounds.expand(radius);
        if !world_bounds.intersects(&seg) {
            continue;
        }
        if !world_bounds.intersects_segment(start, end) {
            continue;
        }

        let local_start = axis_project(&def.desc.origin, &def.desc.axis, start);
        let local_end = axis_project(&def.desc.origin, &def.desc.axis, end);

        if let Some((hit, surf_idx)) = clip_model_segment(
            ctx,
            model,
            Some(&def.desc),
            &local_start,
            &local_end,
            radius,
            filter,
        ) {
            // strict compare keeps earlier hits, world geometry and lower
            // handles win exact ties
            if hit.fraction < trace.fraction {
                trace.fraction = hit.fraction;
                trace.point = vector_ma(start, hit.fraction, &vector_subtract(end, start));
                trace.normal = axis_rotate(&def.desc.axis, &hit.normal);
                trace.material = if def.desc.custom_material != MATERIAL_NONE {
                    def.desc.custom_material
                } else {
                    model.surfaces[surf_idx].material
                };
                trace.entity = handle;
                trace.model = model_handle;
                trace.surface_index = surf_idx as i32;
                trace.joint = match &def.desc.joints {
                    Some(joints) => {
                        let local_hit = vector_ma(
                            &local_start,
                            hit.fraction,
                            &vector_subtract(&local_end, &local_start),
                        );
                        nearest_joint(joints, &local_hit)
                    }
                    None => -1,
                };
            }
        }
    }
}

// ============================================================
// Entry points
// ============================================================

/// Clips a segment against area geometry and every registered entity.
/// `fast_world` swaps the exhaustive world pass for the tree walk, dropping
/// world surface identity in exchange for speed. Entities are clipped either
/// way. The filter is consulted once per candidate surface.
pub fn trace_all(
    ctx: &TraceContext,
    start: &Vec3,
    end: &Vec3,
    fast_world: bool,
    radius: f32,
    filter: Option<&TraceFilter>,
) -> ModelTrace {
    let mut trace = ModelTrace {
        point: *end,
        ..Default::default()
    };
    if vector_compare(start, end) {
        return trace;
    }

    if fast_world {
        trace = fast_world_trace(ctx, start, end);
    } else {
        let seg = segment_bounds(start, end, radius);
        for area in ctx.graph.areas_touching_bounds(&seg) {
            clip_area_geometry(ctx, area, start, end, radius, filter, &mut trace);
        }
    }

    clip_entities(ctx, start, end, radius, None, filter, &mut trace);
    trace
}

/// Game facing trace with the two common skip switches baked in.
/// `skip_dynamic` drops entities whose model comes from a callback,
/// `skip_player` drops first person models and anything suppressed in the
/// player's own view.
pub fn trace(
    ctx: &TraceContext,
    start: &Vec3,
    end: &Vec3,
    radius: f32,
    skip_dynamic: bool,
    skip_player: bool,
) -> ModelTrace {
    let filter = move |ent: Option<&RenderEntityDesc>,
                       _model: &RenderModel,
                       _mat: Option<&MaterialDecl>|
          -> bool {
        if let Some(desc) = ent {
            if skip_dynamic && matches!(desc.model, ModelSource::Deferred(_)) {
                return false;
            }
            if skip_player
                && (desc.flags.contains(EntityDefFlags::WEAPON_DEPTH_HACK)
                    || desc.suppress_surface_in_view_id == VIEW_ID_PLAYER)
            {
                return false;
            }
        }
        true
    };
    trace_all(ctx, start, end, false, radius, Some(&filter))
}

/// Clips a segment against a single entity's model, ignoring the world.
pub fn model_trace(
    ctx: &TraceContext,
    entity: QHandle,
    start: &Vec3,
    end: &Vec3,
    radius: f32,
) -> ModelTrace {
    let mut trace = ModelTrace {
        point: *end,
        ..Default::default()
    };
    if vector_compare(start, end) {
        return trace;
    }
    clip_entities(ctx, start, end, radius, Some(entity), None, &mut trace);
    trace
}

/// Visibility test between two points for light sampling. World geometry is
/// tested with the tree walk, entities triangle by triangle. Handles in
/// `ignored` never occlude, nor do entities that cast no shadow or whose
/// surfaces are translucent.
pub fn segment_open(ctx: &TraceContext, start: &Vec3, end: &Vec3, ignored: &[QHandle]) -> bool {
    if vector_compare(start, end) {
        return true;
    }
    if fast_world_trace(ctx, start, end).fraction < 1.0 {
        return false;
    }

    let pass_light = |_ent: Option<&RenderEntityDesc>,
                      _model: &RenderModel,
                      mat: Option<&MaterialDecl>|
          -> bool {
        !mat.map_or(false, |m| m.flags.contains(MaterialFlags::TRANSLUCENT))
    };

    let seg = segment_bounds(start, end, 0.0);
    for handle in ctx.defs.entity_handles() {
        if ignored.contains(&handle) {
            continue;
        }
        let def = match ctx.defs.entity_def(handle) {
            Some(d) => d,
            None => continue,
        };
        if def.desc.flags.contains(EntityDefFlags::NO_SHADOW) {
            continue;
        }
        if def.desc.custom_material != MATERIAL_NONE
            && ctx
                .material_flags(def.desc.custom_material)
                .contains(MaterialFlags::TRANSLUCENT)
        {
            continue;
        }
        let model = match ctx.models.model(entity_model_handle(def)) {
            Some(m) => m,
            None => continue,
        };
        if model.is_empty() || !def.world_bounds.intersects(&seg) {
            continue;
        }
        if !def.world_bounds.intersects_segment(start, end) {
            continue;
        }

        let local_start = axis_project(&def.desc.origin, &def.desc.axis, start);
        let local_end = axis_project(&def.desc.origin, &def.desc.axis, end);
        let blocked = clip_model_segment(
            ctx,
            model,
            Some(&def.desc),
            &local_start,
            &local_end,
            0.0,
            Some(&pass_light),
        );
        if blocked.is_some() {
            return false;
        }
    }
    true
}

/// Looks for an area surface with the given material whose plane passes
/// close to `point` in the area containing it, and returns the material name
/// on a match. Used for footstep and impact effect lookups.
pub fn material_trace(ctx: &TraceContext, point: &Vec3, material: i32) -> Option<String> {
    let area = ctx.graph.area_at_point(point);
    if area < 0 {
        return None;
    }
    let model = ctx.area_model(area)?;

    for surf in &model.surfaces {
        if surf.material != material {
            continue;
        }
        for tri_num in 0..surf.num_triangles() {
            let tri = surf.triangle(tri_num);
            let mut normal = cross_product(
                &vector_subtract(&tri[1], &tri[0]),
                &vector_subtract(&tri[2], &tri[0]),
            );
            if vector_normalize(&mut normal) < TRI_EPSILON {
                continue;
            }
            let dist = dot_product(&normal, &vector_subtract(point, &tri[0]));
            if dist > MATERIAL_TRACE_FRONT || dist < MATERIAL_TRACE_BEHIND {
                continue;
            }
            let projected = vector_ma(point, -dist, &normal);
            if point_in_triangle(&projected, &tri, &normal) {
                return ctx.material_decl(material).map(|m| m.name.clone());
            }
        }
    }
    None
}

fn point_in_triangle(p: &Vec3, tri: &[Vec3; 3], normal: &Vec3) -> bool {
    for i in 0..3 {
        let edge = vector_subtract(&tri[(i + 1) % 3], &tri[i]);
        let to_point = vector_subtract(p, &tri[i]);
        let cross = cross_product(&edge, &to_point);
        if dot_product(&cross, normal) < 0.0 {
            return false;
        }
    }
    true
}

// ============================================================
