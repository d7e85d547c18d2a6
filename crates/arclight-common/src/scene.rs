// scene.rs — descriptors passed between the game code and the render world

use std::sync::Arc;

use crate::math::{Bounds, JointMat, Mat3, Vec3, MAT3_IDENTITY, VEC3_ORIGIN};

// ============================================================
// Handles
// ============================================================

/// Index-style handle into a render world registry. Valid handles start at 1;
/// 0 means "no handle".
pub type QHandle = i32;

pub const HANDLE_NONE: QHandle = 0;

/// Index into the world's material table, -1 for none.
pub type MaterialId = i32;

pub const MATERIAL_NONE: MaterialId = -1;

// ============================================================
// View ids
// ============================================================

// View ids of 0 and above are drawn on screen, negative ids are offscreen
// diagnostic renders. Player views are 1 and up, subviews (mirrors, cameras,
// reflections) always use 0.
pub const VIEW_ID_DIAGNOSTIC: i32 = -1;
pub const VIEW_ID_SUBVIEW: i32 = 0;
pub const VIEW_ID_PLAYER: i32 = 1;

// ============================================================
// Shader parms
// ============================================================

pub const MAX_ENTITY_SHADER_PARMS: usize = 12;
pub const MAX_GLOBAL_SHADER_PARMS: usize = 12;

pub const SHADERPARM_RED: usize = 0;
pub const SHADERPARM_GREEN: usize = 1;
pub const SHADERPARM_BLUE: usize = 2;
pub const SHADERPARM_ALPHA: usize = 3;
pub const SHADERPARM_TIMESCALE: usize = 3;
pub const SHADERPARM_TIMEOFFSET: usize = 4;
pub const SHADERPARM_DIVERSITY: usize = 5;
pub const SHADERPARM_MODE: usize = 7;

// ============================================================
// Flags
// ============================================================

bitflags::bitflags! {
    /// What a closed portal blocks from passing between its two areas.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PortalBlock: u32 {
        const VIEW     = 0x01;
        const LOCATION = 0x02;
        const AIR      = 0x04;
        const SOUND    = 0x08;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MaterialFlags: u32 {
        const SKY         = 0x01;
        const PORTAL_SKY  = 0x02;
        const TRANSLUCENT = 0x04;
        const NO_OVERLAYS = 0x08;
        const TWO_SIDED   = 0x10;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EntityDefFlags: u32 {
        /// No shadow at all.
        const NO_SHADOW                  = 0x01;
        /// Cast shadows onto other objects, but not self.
        const NO_SELF_SHADOW             = 0x02;
        /// Squash depth range so view weapons don't poke into walls.
        /// Implies NO_SHADOW.
        const WEAPON_DEPTH_HACK          = 0x04;
        /// Don't create any light interactions after level load completes.
        const NO_DYNAMIC_INTERACTIONS    = 0x08;
        const NO_FOG                     = 0x10;
        /// Cast shadows regardless of whether light flow can reach the entity.
        const FORCE_SHADOW_BEHIND_OPAQUE = 0x20;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct LightDefFlags: u32 {
        const NO_SHADOWS      = 0x01;
        const NO_SPECULAR     = 0x02;
        const NO_FOG_BOUNDARY = 0x04;
    }
}

/// Pins a def to the area containing its origin or bounds center instead of
/// letting it reference every area its bounds touch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AreaLock {
    #[default]
    None,
    Origin,
    Center,
}

// ============================================================
// Deferred model generation
// ============================================================

/// What a deferred model callback produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeferredOutcome {
    /// Nothing could be generated, try again later.
    Pending,
    /// Model is valid until the next update of the def, drop the callback.
    Resolved(QHandle),
    /// View-dependent model, call again for every view that needs it.
    Regenerated(QHandle),
}

/// Entities that are expensive to generate can defer model creation until
/// their bounds are found to be in view or contacted by a trace. The view is
/// None when the callback is issued for a non-view source.
pub type DeferredModelFn = fn(data: u64, view: Option<&RenderView>) -> DeferredOutcome;

#[derive(Clone, Copy, Debug)]
pub struct DeferredModel {
    pub generate: DeferredModelFn,
    pub data: u64,
}

/// Where an entity's geometry comes from.
#[derive(Clone, Copy, Debug, Default)]
pub enum ModelSource {
    #[default]
    None,
    Model(QHandle),
    Deferred(DeferredModel),
}

impl ModelSource {
    pub fn is_none(&self) -> bool {
        matches!(self, ModelSource::None)
    }
}

// ============================================================
// Entity def descriptor
// ============================================================

#[derive(Clone, Debug)]
pub struct RenderEntityDesc {
    pub model: ModelSource,

    pub entity_num: i32,
    pub body_id: i32,

    /// Local bounds, only needs to be set for deferred models.
    pub bounds: Bounds,

    /// Skinning pose shared with the animation side, which keeps ownership.
    /// Freeing the def only drops this reference.
    pub joints: Option<Arc<[JointMat]>>,

    // player bodies should be suppressed in views from that player's eyes,
    // but still show up in mirrors and other subviews
    pub suppress_surface_in_view_id: i32,
    pub suppress_shadow_in_view_id: i32,
    pub suppress_shadow_in_light_id: i32,
    pub allow_surface_in_view_id: i32,

    // axis rotation vectors must be unit length, don't scale models
    pub origin: Vec3,
    pub axis: Mat3,

    /// If valid, all surfaces use this material.
    pub custom_material: MaterialId,
    /// Used so flares can reference the proper light material.
    pub reference_material: MaterialId,
    pub shader_parms: [f32; MAX_ENTITY_SHADER_PARMS],

    /// Squash depth range so particle effects don't clip into walls.
    pub model_depth_hack: f32,

    pub flags: EntityDefFlags,
    pub spectrum: i32,
    pub area_lock: AreaLock,
    pub sort_offset: i32,
    pub time_group: i32,
    pub force_update: bool,
}

impl Default for RenderEntityDesc {
    fn default() -> Self {
        Self {
            model: ModelSource::None,
            entity_num: -1,
            body_id: 0,
            bounds: Bounds::default(),
            joints: None,
            suppress_surface_in_view_id: 0,
            suppress_shadow_in_view_id: 0,
            suppress_shadow_in_light_id: 0,
            allow_surface_in_view_id: 0,
            origin: VEC3_ORIGIN,
            axis: MAT3_IDENTITY,
            custom_material: MATERIAL_NONE,
            reference_material: MATERIAL_NONE,
            shader_parms: [0.0; MAX_ENTITY_SHADER_PARMS],
            model_depth_hack: 0.0,
            flags: EntityDefFlags::empty(),
            spectrum: 0,
            area_lock: AreaLock::None,
            sort_offset: 0,
            time_group: 0,
            force_update: false,
        }
    }
}

// ============================================================
// Light def descriptor
// ============================================================

#[derive(Clone, Debug)]
pub struct RenderLightDesc {
    /// Index of the owning game entity, for debugging.
    pub entity_num: i32,

    pub origin: Vec3,
    pub axis: Mat3,

    /// If non-zero, the light will not show up in the specific view.
    pub suppress_light_in_view_id: i32,
    /// If non-zero, the light will only show up in the specific view.
    pub allow_light_in_view_id: i32,

    pub flags: LightDefFlags,

    /// Otherwise a projected light.
    pub point_light: bool,
    /// light_center gives the direction to the light at infinity.
    pub parallel: bool,
    /// xyz radius for point lights
    pub light_radius: Vec3,
    /// Offsets the lighting direction for shading and shadows, relative to origin.
    pub light_center: Vec3,

    // frustum definition for projected lights, all relative to origin
    pub target: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub start: Vec3,
    pub end: Vec3,

    /// Optimized shadow volume generated offline. Ignored if the light has
    /// been moved after initial creation.
    pub prelight_model: QHandle,

    /// Muzzle flash lights will not cast shadows from player and weapon world
    /// models carrying the matching suppress id.
    pub light_id: i32,

    pub material: MaterialId,
    pub shader_parms: [f32; MAX_ENTITY_SHADER_PARMS],

    pub spectrum: i32,
    pub area_lock: AreaLock,
}

impl Default for RenderLightDesc {
    fn default() -> Self {
        Self {
            entity_num: -1,
            origin: VEC3_ORIGIN,
            axis: MAT3_IDENTITY,
            suppress_light_in_view_id: 0,
            allow_light_in_view_id: 0,
            flags: LightDefFlags::empty(),
            point_light: false,
            parallel: false,
            light_radius: VEC3_ORIGIN,
            light_center: VEC3_ORIGIN,
            target: VEC3_ORIGIN,
            right: VEC3_ORIGIN,
            up: VEC3_ORIGIN,
            start: VEC3_ORIGIN,
            end: VEC3_ORIGIN,
            prelight_model: HANDLE_NONE,
            light_id: 0,
            material: MATERIAL_NONE,
            shader_parms: [0.0; MAX_ENTITY_SHADER_PARMS],
            spectrum: 0,
            area_lock: AreaLock::None,
        }
    }
}

impl RenderLightDesc {
    /// Conservative world bounds of the light volume. Point lights cover the
    /// axis-rotated radius box, projected lights the frustum from the origin
    /// to the target rectangle.
    pub fn derived_bounds(&self) -> Bounds {
        if self.point_light {
            let r = [
                self.light_radius[0].abs(),
                self.light_radius[1].abs(),
                self.light_radius[2].abs(),
            ];
            let local = Bounds::new([-r[0], -r[1], -r[2]], r);
            return local.transformed(&self.origin, &self.axis);
        }

        let mut b = Bounds::cleared();
        b.add_point(&crate::math::axis_transform(&self.origin, &self.axis, &VEC3_ORIGIN));
        for sr in [-1.0f32, 1.0] {
            for su in [-1.0f32, 1.0] {
                let corner = [
                    self.target[0] + sr * self.right[0] + su * self.up[0],
                    self.target[1] + sr * self.right[1] + su * self.up[1],
                    self.target[2] + sr * self.right[2] + su * self.up[2],
                ];
                b.add_point(&crate::math::axis_transform(&self.origin, &self.axis, &corner));
            }
        }
        b
    }
}

// ============================================================
// Render view
// ============================================================

#[derive(Clone, Debug)]
pub struct RenderView {
    /// Player views set this to a non-zero id for model suppress / allow,
    /// subviews always clear it to zero.
    pub view_id: i32,

    // sized from 0 to the virtual screen size, not actual resolution
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,

    pub fov_x: f32,
    pub fov_y: f32,
    pub vieworg: Vec3,
    /// View looks down the positive X axis.
    pub viewaxis: Mat3,

    /// For cinematics the near plane is pulled much closer.
    pub cram_z_near: bool,
    pub force_update: bool,
    /// Rendered on top of previous color contents, don't clear.
    pub is_overlay: bool,

    /// Time in milliseconds for time dependent effects.
    pub time: i32,
    pub shader_parms: [f32; MAX_GLOBAL_SHADER_PARMS],
    pub global_material: MaterialId,
}

impl Default for RenderView {
    fn default() -> Self {
        Self {
            view_id: VIEW_ID_PLAYER,
            x: 0,
            y: 0,
            width: 640,
            height: 480,
            fov_x: 90.0,
            fov_y: 74.0,
            vieworg: VEC3_ORIGIN,
            viewaxis: MAT3_IDENTITY,
            cram_z_near: false,
            force_update: false,
            is_overlay: false,
            time: 0,
            shader_parms: [0.0; MAX_GLOBAL_SHADER_PARMS],
            global_material: MATERIAL_NONE,
        }
    }
}

// ============================================================
// Trace result
// ============================================================

/// Result of a trace against visual geometry.
#[derive(Clone, Copy, Debug)]
pub struct ModelTrace {
    /// Fraction of the trace completed, 1.0 when nothing was hit.
    pub fraction: f32,
    /// End point of the trace in global space.
    pub point: Vec3,
    /// Hit triangle normal in global space.
    pub normal: Vec3,
    pub material: MaterialId,
    /// Entity def that was hit, HANDLE_NONE for world geometry.
    pub entity: QHandle,
    pub model: QHandle,
    /// Index of the surface that was hit within its area or model.
    pub surface_index: i32,
    /// Joint of the hit entity's pose nearest to the hit, -1 when the
    /// entity carries no pose.
    pub joint: i32,
}

impl Default for ModelTrace {
    fn default() -> Self {
        Self {
            fraction: 1.0,
            point: VEC3_ORIGIN,
            normal: VEC3_ORIGIN,
            material: MATERIAL_NONE,
            entity: HANDLE_NONE,
            model: HANDLE_NONE,
            surface_index: -1,
            joint: -1,
        }
    }
}

impl ModelTrace {
    pub fn hit(&self) -> bool {
        self.fraction < 1.0
    }
}
