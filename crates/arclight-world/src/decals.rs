// decals.rs — projected decals and overlays clipped onto world and entity geometry

use std::collections::HashMap;

use log::warn;

use arclight_common::math::{
    axis_project, cross_product, dot_product, vector_ma, vector_normalize, vector_subtract,
    Bounds, Plane, Vec3, ON_EPSILON,
};
use arclight_common::scene::{MaterialFlags, MaterialId, QHandle, MATERIAL_NONE};
use arclight_common::winding::Winding;

use crate::defs::EntityDef;
use crate::models::RenderModel;
use crate::trace::{entity_model_handle, TraceContext};

// keep triangles up to this far past facing away from the projection
const DECAL_BACKFACE_EPSILON: f32 = 0.1;

/// One clipped polygon of a decal or overlay, with per vertex texture
/// coordinates and fade. World fragments are in world space, entity fragments
/// in the entity's local space so they follow it.
#[derive(Debug, Clone)]
pub struct DecalFragment {
    pub points: Vec<Vec3>,
    pub sts: Vec<[f32; 2]>,
    /// 1.0 through the middle of the projection volume, dropping to zero on
    /// its boundary planes so clipped edges feather out instead of popping.
    pub alphas: Vec<f32>,
    pub material: MaterialId,
    pub start_time: i32,
}

/// Projection parameters retained per entity so the fragments can be rebuilt
/// whenever the entity's geometry changes.
#[derive(Debug, Clone)]
enum StoredProjection {
    Decal {
        /// Winding and origin in entity local space.
        winding: Winding,
        origin: Vec3,
        parallel: bool,
        fade_depth: f32,
        material: MaterialId,
        start_time: i32,
        /// Entities with a custom material receive fragments even on
        /// surfaces whose own material forbids overlays.
        force: bool,
    },
    Overlay {
        /// Local planes evaluating to the s and t coordinate of a point.
        axes: [Plane; 2],
        material: MaterialId,
    },
}

#[derive(Debug, Default)]
struct EntityDecals {
    projections: Vec<StoredProjection>,
    fragments: Vec<DecalFragment>,
    stale: bool,
}

// ============================================================
// Projection volume
// ============================================================

/// The convex volume a decal winding sweeps toward its projection origin,
/// with the texture frame spanning the winding.
struct ProjectionVolume {
    /// Inward facing clip planes: one per winding edge, then the winding
    /// plane, then the plane through the projection origin.
    planes: Vec<Plane>,
    /// Normal points from the winding toward the projection origin.
    winding_plane: Plane,
    origin: Vec3,
    depth: f32,
    parallel: bool,
    fade_depth: f32,
    bounds: Bounds,
    tex_origin: Vec3,
    tex_x: Vec3,
    tex_y: Vec3,
    st_base: [f32; 2],
    st_scale: [f32; 2],
}

impl ProjectionVolume {
    /// None when the winding is degenerate or the origin is not in front of
    /// the winding plane.
    fn new(winding: &Winding, origin: &Vec3, parallel: bool, fade_depth: f32) -> Option<Self> {
        let wp = winding.plane()?;
        let depth = wp.distance_to(origin);
        if depth <= ON_EPSILON {
            return None;
        }

        let mut bounds = winding.bounds();
        if parallel {
            bounds = bounds.expand(depth);
        } else {
            bounds.add_point(origin);
        }

        let center = winding.center();
        let num = winding.num_points();
        let mut planes = Vec::with_capacity(num + 2);
        for i in 0..num {
            let p1 = winding.points[i];
            let p2 = winding.points[(i + 1) % num];
            let mut side = if parallel {
                let mut normal = cross_product(&wp.normal, &vector_subtract(&p2, &p1));
                if vector_normalize(&mut normal) == 0.0 {
                    return None;
                }
                Plane::new(normal, dot_product(&normal, &p1))
            } else {
                Plane::from_points(origin, &p1, &p2)?
            };
            if side.distance_to(&center) < 0.0 {
                side = side.flipped();
            }
            planes.push(side);
        }
        planes.push(wp);
        planes.push(Plane::new(wp.normal, wp.dist + depth).flipped());

        // texture frame along the first winding edge, normalized so the
        // winding itself spans [0, 1] on both axes
        let tex_origin = winding.points[0];
        let mut tex_x = vector_subtract(&winding.points[1], &tex_origin);
        if vector_normalize(&mut tex_x) == 0.0 {
            return None;
        }
        let mut tex_y = cross_product(&wp.normal, &tex_x);
        vector_normalize(&mut tex_y);

        let mut s_min = f32::MAX;
        let mut s_max = f32::MIN;
        let mut t_min = f32::MAX;
        let mut t_max = f32::MIN;
        for p in &winding.points {
            let d = vector_subtract(p, &tex_origin);
            let s = dot_product(&d, &tex_x);
            let t = dot_product(&d, &tex_y);
            s_min = s_min.min(s);
            s_max = s_max.max(s);
            t_min = t_min.min(t);
            t_max = t_max.max(t);
        }
        if s_max - s_min <= f32::EPSILON || t_max - t_min <= f32::EPSILON {
            return None;
        }

        Some(Self {
            planes,
            winding_plane: wp,
            origin: *origin,
            depth,
            parallel,
            fade_depth: fade_depth.max(1e-6),
            bounds,
            tex_origin,
            tex_x,
            tex_y,
            st_base: [s_min, t_min],
            st_scale: [1.0 / (s_max - s_min), 1.0 / (t_max - t_min)],
        })
    }

    /// Texture coordinates and fade for a clipped winding that survived the
    /// volume planes.
    fn fragment(&self, w: &Winding, material: MaterialId, start_time: i32) -> DecalFragment {
        let mut sts = Vec::with_capacity(w.num_points());
        let mut alphas = Vec::with_capacity(w.num_points());

        for p in &w.points {
            let dist = self.winding_plane.distance_to(p);
            let d_winding = dist.max(0.0);
            let d_origin = (self.depth - dist).max(0.0);
            alphas.push((d_winding.min(d_origin) / self.fade_depth).clamp(0.0, 1.0));

            let on_plane = if self.parallel {
                vector_ma(p, -dist, &self.winding_plane.normal)
            } else {
                let denom = self.depth - dist;
                if denom.abs() < f32::EPSILON {
                    *p
                } else {
                    let dir = vector_subtract(p, &self.origin);
                    vector_ma(&self.origin, self.depth / denom, &dir)
                }
            };
            let d = vector_subtract(&on_plane, &self.tex_origin);
            sts.push([
                (dot_product(&d, &self.tex_x) - self.st_base[0]) * self.st_scale[0],
                (dot_product(&d, &self.tex_y) - self.st_base[1]) * self.st_scale[1],
            ]);
        }

        DecalFragment {
            points: w.points.clone(),
            sts,
            alphas,
            material,
            start_time,
        }
    }
}

fn clip_model_fragments(
    ctx: &TraceContext,
    model: &RenderModel,
    volume: &ProjectionVolume,
    material: MaterialId,
    start_time: i32,
    force: bool,
    out: &mut Vec<DecalFragment>,
) {
    for surf in &model.surfaces {
        if !force
            && ctx
                .material_flags(surf.material)
                .contains(MaterialFlags::NO_OVERLAYS)
        {
            continue;
        }

        for tri_num in 0..surf.num_triangles() {
            let tri = surf.triangle(tri_num);
            let mut tri_normal = cross_product(
                &vector_subtract(&tri[1], &tri[0]),
                &vector_subtract(&tri[2], &tri[0]),
            );
            if vector_normalize(&mut tri_normal) == 0.0 {
                continue;
            }
            if dot_product(&tri_normal, &volume.winding_plane.normal) < -DECAL_BACKFACE_EPSILON {
                continue;
            }

            let mut w = Winding::from_triangle(tri[0], tri[1], tri[2]);
            let mut clipped_away = false;
            for plane in &volume.planes {
                if !w.clip_in_place(plane, ON_EPSILON) {
                    clipped_away = true;
                    break;
                }
            }
            if clipped_away || w.is_empty() {
                continue;
            }
            out.push(volume.fragment(&w, material, start_time));
        }
    }
}

fn overlay_fragments(
    ctx: &TraceContext,
    model: &RenderModel,
    axes: &[Plane; 2],
    material: MaterialId,
    out: &mut Vec<DecalFragment>,
) {
    for surf in &model.surfaces {
        if ctx
            .material_flags(surf.material)
            .contains(MaterialFlags::NO_OVERLAYS)
        {
            continue;
        }

        for tri_num in 0..surf.num_triangles() {
            let tri = surf.triangle(tri_num);
            let mut s = [0.0f32; 3];
            let mut t = [0.0f32; 3];
            for i in 0..3 {
                s[i] = axes[0].distance_to(&tri[i]);
                t[i] = axes[1].distance_to(&tri[i]);
            }
            // triangles are kept whole, only dropped when fully off one side
            if s.iter().all(|&v| v < 0.0)
                || s.iter().all(|&v| v > 1.0)
                || t.iter().all(|&v| v < 0.0)
                || t.iter().all(|&v| v > 1.0)
            {
                continue;
            }
            out.push(DecalFragment {
                points: tri.to_vec(),
                sts: vec![[s[0], t[0]], [s[1], t[1]], [s[2], t[2]]],
                alphas: vec![1.0; 3],
                material,
                start_time: 0,
            });
        }
    }
}

fn apply_projection(
    ctx: &TraceContext,
    def: &EntityDef,
    projection: &StoredProjection,
    out: &mut Vec<DecalFragment>,
) {
    let model = match ctx.models.model(entity_model_handle(def)) {
        Some(m) if !m.is_empty() => m,
        _ => return,
    };

    match projection {
        StoredProjection::Decal {
            winding,
            origin,
            parallel,
            fade_depth,
            material,
            start_time,
            force,
        } => {
            let volume = match ProjectionVolume::new(winding, origin, *parallel, *fade_depth) {
                Some(v) => v,
                None => return,
            };
            if !volume.bounds.intersects(&model.bounds()) {
                return;
            }
            clip_model_fragments(ctx, model, &volume, *material, *start_time, *force, out);
        }
        StoredProjection::Overlay { axes, material } => {
            overlay_fragments(ctx, model, axes, *material, out);
        }
    }
}

// ============================================================
// Decal storage
// ============================================================

/// Decal fragments stuck to area geometry plus per entity decal and overlay
/// projections. Entity fragments are rebuilt lazily after the entity's
/// geometry changes.
#[derive(Debug, Default)]
pub struct DecalSystem {
    world_fragments: Vec<DecalFragment>,
    entity_decals: HashMap<QHandle, EntityDecals>,
}

impl DecalSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clips the winding's projection volume against the static geometry of
    /// every touched area. The projection origin must be in front of the
    /// winding plane; geometry between the winding plane and the origin
    /// receives fragments.
    pub fn project_decal_onto_world(
        &mut self,
        ctx: &TraceContext,
        winding: &Winding,
        projection_origin: &Vec3,
        parallel: bool,
        fade_depth: f32,
        material: MaterialId,
        start_time: i32,
    ) {
        let volume = match ProjectionVolume::new(winding, projection_origin, parallel, fade_depth)
        {
            Some(v) => v,
            None => {
                warn!("project_decal_onto_world: degenerate projection, ignored");
                return;
            }
        };

        for area in ctx.graph.areas_touching_bounds(&volume.bounds) {
            let model = match ctx.area_model(area) {
                Some(m) if !m.is_empty() => m,
                _ => continue,
            };
            if !volume.bounds.intersects(&model.bounds()) {
                continue;
            }
            clip_model_fragments(
                ctx,
                model,
                &volume,
                material,
                start_time,
                false,
                &mut self.world_fragments,
            );
        }
    }

    /// Same projection against a single entity's model. The projection is
    /// stored in the entity's local space and reapplied whenever the
    /// entity's geometry changes.
    pub fn project_decal(
        &mut self,
        ctx: &TraceContext,
        entity: QHandle,
        winding: &Winding,
        projection_origin: &Vec3,
        parallel: bool,
        fade_depth: f32,
        material: MaterialId,
        start_time: i32,
    ) {
        let def = match ctx.defs.entity_def(entity) {
            Some(d) => d,
            None => {
                warn!("project_decal: entity {} is not registered", entity);
                return;
            }
        };

        let local_winding = Winding::new(
            winding
                .points
                .iter()
                .map(|p| axis_project(&def.desc.origin, &def.desc.axis, p))
                .collect(),
        );
        let local_origin = axis_project(&def.desc.origin, &def.desc.axis, projection_origin);
        if ProjectionVolume::new(&local_winding, &local_origin, parallel, fade_depth).is_none() {
            warn!("project_decal: degenerate projection on entity {}, ignored", entity);
            return;
        }

        let projection = StoredProjection::Decal {
            winding: local_winding,
            origin: local_origin,
            parallel,
            fade_depth,
            material,
            start_time,
            force: def.desc.custom_material != MATERIAL_NONE,
        };
        let record = self.entity_decals.entry(entity).or_default();
        apply_projection(ctx, def, &projection, &mut record.fragments);
        record.projections.push(projection);
    }

    /// Attaches an overlay to an entity. The texture planes evaluate to the
    /// s and t coordinate of a local point, triangles fully outside the
    /// [0, 1] range on one side are dropped.
    pub fn project_overlay(
        &mut self,
        ctx: &TraceContext,
        entity: QHandle,
        texture_axes: &[Plane; 2],
        material: MaterialId,
    ) {
        let def = match ctx.defs.entity_def(entity) {
            Some(d) => d,
            None => {
                warn!("project_overlay: entity {} is not registered", entity);
                return;
            }
        };

        let projection = StoredProjection::Overlay {
            axes: *texture_axes,
            material,
        };
        let record = self.entity_decals.entry(entity).or_default();
        apply_projection(ctx, def, &projection, &mut record.fragments);
        record.projections.push(projection);
    }

    /// Drops everything projected onto the entity.
    pub fn remove_decals(&mut self, entity: QHandle) {
        self.entity_decals.remove(&entity);
    }

    /// Queues the entity's fragments for a rebuild from the stored
    /// projections the next time they are fetched.
    pub fn mark_entity_stale(&mut self, entity: QHandle) {
        if let Some(record) = self.entity_decals.get_mut(&entity) {
            record.stale = true;
        }
    }

    pub fn world_fragments(&self) -> &[DecalFragment] {
        &self.world_fragments
    }

    /// Fragments in the entity's local space, rebuilt first if the entity's
    /// geometry changed since they were projected.
    pub fn entity_fragments(&mut self, ctx: &TraceContext, entity: QHandle) -> &[DecalFragment] {
        let record = match self.entity_decals.get_mut(&entity) {
            Some(r) => r,
            None => return &[],
        };
        if record.stale {
            record.fragments.clear();
            if let Some(def) = ctx.defs.entity_def(entity) {
                for projection in &record.projections {
                    apply_projection(ctx, def, projection, &mut record.fragments);
                }
            }
            record.stale = false;
        }
        &record.fragments
    }

    pub fn clear(&mut self) {
        self.world_fragments.clear();
        self.entity_decals.clear();
    }
}

// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::SceneDefRegistry;
    use crate::models::ModelRegistry;
    use crate::portals::AreaPortalGraph;
    use crate::test_support::{box_model, two_room_map};
    use approx::assert_relative_eq;
    use arclight_common::map_source::{MapSource, MaterialDecl};
    use arclight_common::scene::{ModelSource, RenderEntityDesc};

    struct Fixture {
        graph: AreaPortalGraph,
        models: ModelRegistry,
        defs: SceneDefRegistry,
        materials: Vec<MaterialDecl>,
        area_models: Vec<QHandle>,
    }

    impl Fixture {
        fn from_map(map: MapSource) -> Self {
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

        fn new() -> Self {
            Self::from_map(two_room_map())
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
    }

    /// Square winding of the given half size in a z plane, normal up.
    fn flat_winding(center: [f32; 2], half: f32, z: f32) -> Winding {
        Winding::new(vec![
            [center[0] - half, center[1] - half, z],
            [center[0] + half, center[1] - half, z],
            [center[0] + half, center[1] + half, z],
            [center[0] - half, center[1] + half, z],
        ])
    }

    fn total_area(fragments: &[DecalFragment]) -> f32 {
        fragments
            .iter()
            .map(|f| Winding::new(f.points.clone()).area())
            .sum()
    }

    #[test]
    fn test_parallel_world_decal_covers_floor_patch() {
        let fix = Fixture::new();
        let mut decals = DecalSystem::new();

        // impact on the floor at [-64, -16, 0], winding sunk below, origin
        // mirrored above
        decals.project_decal_onto_world(
            &fix.ctx(),
            &flat_winding([-64.0, -16.0], 16.0, -8.0),
            &[-64.0, -16.0, 8.0],
            true,
            4.0,
            0,
            100,
        );
        let frags = decals.world_fragments();
        assert!(!frags.is_empty());
        assert_relative_eq!(total_area(frags), 32.0 * 32.0, epsilon = 1e-2);
        for f in frags {
            assert_eq!(f.material, 0);
            assert_eq!(f.start_time, 100);
            for (i, p) in f.points.iter().enumerate() {
                assert_relative_eq!(p[2], 0.0, epsilon = 1e-3);
                // floor sits mid volume, well clear of both fade planes
                assert_relative_eq!(f.alphas[i], 1.0, epsilon = 1e-4);
                assert!(f.sts[i][0] >= -1e-3 && f.sts[i][0] <= 1.0 + 1e-3);
                assert!(f.sts[i][1] >= -1e-3 && f.sts[i][1] <= 1.0 + 1e-3);
            }
        }

        // a second projection appends rather than replaces
        let before = decals.world_fragments().len();
        decals.project_decal_onto_world(
            &fix.ctx(),
            &flat_winding([-96.0, 32.0], 8.0, -8.0),
            &[-96.0, 32.0, 8.0],
            true,
            4.0,
            0,
            200,
        );
        assert!(decals.world_fragments().len() > before);
    }

    #[test]
    fn test_point_projection_narrows_toward_origin() {
        let fix = Fixture::new();
        let mut decals = DecalSystem::new();

        // apex 8 above the floor, winding 8 below: the floor cross section
        // is the winding scaled by half
        decals.project_decal_onto_world(
            &fix.ctx(),
            &flat_winding([-64.0, -16.0], 16.0, -8.0),
            &[-64.0, -16.0, 8.0],
            false,
            4.0,
            0,
            0,
        );
        let frags = decals.world_fragments();
        assert_relative_eq!(total_area(frags), 16.0 * 16.0, epsilon = 1e-2);

        // the fragment corner under the winding corner maps to st (1, 1)
        let mut found_corner = false;
        for f in frags {
            for (i, p) in f.points.iter().enumerate() {
                if (p[0] + 56.0).abs() < 1e-3 && (p[1] + 8.0).abs() < 1e-3 {
                    assert_relative_eq!(f.sts[i][0], 1.0, epsilon = 1e-3);
                    assert_relative_eq!(f.sts[i][1], 1.0, epsilon = 1e-3);
                    found_corner = true;
                }
            }
        }
        assert!(found_corner);
    }

    #[test]
    fn test_fade_softens_volume_boundaries() {
        let fix = Fixture::new();
        let mut decals = DecalSystem::new();

        // fade depth spans the whole half volume, the floor at depth 8 of 16
        // lands halfway up the ramp
        decals.project_decal_onto_world(
            &fix.ctx(),
            &flat_winding([-64.0, -16.0], 16.0, -8.0),
            &[-64.0, -16.0, 8.0],
            true,
            16.0,
            0,
            0,
        );
        let frags = decals.world_fragments();
        assert!(!frags.is_empty());
        for f in frags {
            for alpha in &f.alphas {
                assert_relative_eq!(*alpha, 0.5, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_no_overlays_material_rejects_decals() {
        let mut map = two_room_map();
        map.materials.push(MaterialDecl {
            name: "textures/glass/clear".to_string(),
            flags: MaterialFlags::NO_OVERLAYS,
        });
        map.areas[0].surfaces[0].material = 2;
        let fix = Fixture::from_map(map);

        let mut decals = DecalSystem::new();
        decals.project_decal_onto_world(
            &fix.ctx(),
            &flat_winding([-64.0, -16.0], 16.0, -8.0),
            &[-64.0, -16.0, 8.0],
            true,
            4.0,
            0,
            0,
        );
        assert!(decals.world_fragments().is_empty());
    }

    #[test]
    fn test_backfacing_surfaces_are_skipped() {
        let fix = Fixture::new();
        let mut decals = DecalSystem::new();

        // projected up from below the floor, the floor faces away
        decals.project_decal_onto_world(
            &fix.ctx(),
            &flat_winding([-64.0, -16.0], 16.0, 8.0).reversed(),
            &[-64.0, -16.0, -8.0],
            true,
            4.0,
            0,
            0,
        );
        assert!(decals.world_fragments().is_empty());
    }

    #[test]
    fn test_degenerate_projections_are_ignored() {
        let fix = Fixture::new();
        let mut decals = DecalSystem::new();

        // origin on the winding plane
        decals.project_decal_onto_world(
            &fix.ctx(),
            &flat_winding([-64.0, -16.0], 16.0, -8.0),
            &[-64.0, -16.0, -8.0],
            true,
            4.0,
            0,
            0,
        );
        // origin behind the winding plane
        decals.project_decal_onto_world(
            &fix.ctx(),
            &flat_winding([-64.0, -16.0], 16.0, -8.0),
            &[-64.0, -16.0, -24.0],
            false,
            4.0,
            0,
            0,
        );
        // not enough points for a plane
        decals.project_decal_onto_world(
            &fix.ctx(),
            &Winding::new(vec![[0.0; 3], [1.0, 0.0, 0.0]]),
            &[0.0, 0.0, 8.0],
            false,
            4.0,
            0,
            0,
        );
        assert!(decals.world_fragments().is_empty());
    }

    #[test]
    fn test_entity_decal_reprojects_after_geometry_change() {
        let mut fix = Fixture::new();
        let h = fix.add_box_entity([64.0, 0.0, 16.0], 8.0);
        let mut decals = DecalSystem::new();

        // shallow volume over the top face of the box at world z = 24, too
        // narrow to wrap onto the side faces
        decals.project_decal(
            &fix.ctx(),
            h,
            &flat_winding([64.0, 0.0], 6.0, 22.0),
            &[64.0, 0.0, 30.0],
            true,
            2.0,
            3,
            500,
        );
        let frags = decals.entity_fragments(&fix.ctx(), h);
        assert!(!frags.is_empty());
        assert_relative_eq!(total_area(frags), 12.0 * 12.0, epsilon = 1e-2);
        for f in frags {
            assert_eq!(f.material, 3);
            assert_eq!(f.start_time, 500);
            for (i, p) in f.points.iter().enumerate() {
                // local space, top face of the half 8 box
                assert_relative_eq!(p[2], 8.0, epsilon = 1e-3);
                assert_relative_eq!(f.alphas[i], 1.0, epsilon = 1e-4);
            }
        }

        // shrink the box in place, the top face drops below the stored
        // projection volume
        fix.models.add_model(box_model("box", 4.0));
        decals.mark_entity_stale(h);
        assert!(decals.entity_fragments(&fix.ctx(), h).is_empty());
    }

    #[test]
    fn test_overlay_maps_and_culls_by_texture_range() {
        let mut fix = Fixture::new();
        let h = fix.add_box_entity([64.0, 0.0, 16.0], 8.0);
        let mut decals = DecalSystem::new();

        // s and t cover the box exactly
        let axes = [
            Plane::new([1.0 / 16.0, 0.0, 0.0], -0.5),
            Plane::new([0.0, 1.0 / 16.0, 0.0], -0.5),
        ];
        decals.project_overlay(&fix.ctx(), h, &axes, 5);
        let frags = decals.entity_fragments(&fix.ctx(), h);
        // every triangle of the box is inside the texture range
        assert_eq!(frags.len(), 12);
        let mut found_corner = false;
        for f in frags {
            assert_eq!(f.material, 5);
            assert!(f.alphas.iter().all(|&a| a == 1.0));
            for (i, p) in f.points.iter().enumerate() {
                if (p[0] - 8.0).abs() < 1e-6 && (p[1] - 8.0).abs() < 1e-6 {
                    assert_relative_eq!(f.sts[i][0], 1.0, epsilon = 1e-5);
                    assert_relative_eq!(f.sts[i][1], 1.0, epsilon = 1e-5);
                    found_corner = true;
                }
            }
        }
        assert!(found_corner);

        // axes far off the model cull everything
        let mut far = DecalSystem::new();
        let off_axes = [
            Plane::new([1.0 / 16.0, 0.0, 0.0], 100.0),
            Plane::new([0.0, 1.0 / 16.0, 0.0], -0.5),
        ];
        far.project_overlay(&fix.ctx(), h, &off_axes, 5);
        assert!(far.entity_fragments(&fix.ctx(), h).is_empty());
    }

    #[test]
    fn test_remove_decals_detaches_entity_only() {
        let mut fix = Fixture::new();
        let h = fix.add_box_entity([64.0, 0.0, 16.0], 8.0);
        let mut decals = DecalSystem::new();

        decals.project_decal_onto_world(
            &fix.ctx(),
            &flat_winding([-64.0, -16.0], 16.0, -8.0),
            &[-64.0, -16.0, 8.0],
            true,
            4.0,
            0,
            0,
        );
        decals.project_decal(
            &fix.ctx(),
            h,
            &flat_winding([64.0, 0.0], 12.0, 16.0),
            &[64.0, 0.0, 32.0],
            true,
            4.0,
            0,
            0,
        );
        assert!(!decals.entity_fragments(&fix.ctx(), h).is_empty());

        decals.remove_decals(h);
        assert!(decals.entity_fragments(&fix.ctx(), h).is_empty());
        assert!(!decals.world_fragments().is_empty());
    }

    #[test]
    fn test_projection_on_missing_entity_is_ignored() {
        let fix = Fixture::new();
        let mut decals = DecalSystem::new();
        decals.project_decal(
            &fix.ctx(),
            42,
            &flat_winding([0.0, 0.0], 8.0, 0.0),
            &[0.0, 0.0, 8.0],
            true,
            4.0,
            0,
            0,
        );
        assert!(decals.entity_fragments(&fix.ctx(), 42).is_empty());
    }
}
