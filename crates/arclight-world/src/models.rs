// models.rs — triangle model storage referenced by handle

use std::collections::HashMap;

use arclight_common::map_source::MapAreaSource;
use arclight_common::math::{Bounds, Vec3};
use arclight_common::scene::{MaterialId, QHandle, HANDLE_NONE};

use crate::handles::HandleSlots;

/// One triangle soup with a single material.
#[derive(Debug, Clone, Default)]
pub struct ModelSurface {
    pub material: MaterialId,
    pub verts: Vec<Vec3>,
    /// Triangle list, three indices per triangle.
    pub indices: Vec<i32>,
}

impl ModelSurface {
    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangle(&self, n: usize) -> [Vec3; 3] {
        [
            self.verts[self.indices[n * 3] as usize],
            self.verts[self.indices[n * 3 + 1] as usize],
            self.verts[self.indices[n * 3 + 2] as usize],
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderModel {
    pub name: String,
    pub surfaces: Vec<ModelSurface>,
    bounds: Bounds,
}

impl RenderModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            surfaces: Vec::new(),
            bounds: Bounds::cleared(),
        }
    }

    pub fn add_surface(&mut self, surface: ModelSurface) {
        for v in &surface.verts {
            self.bounds.add_point(v);
        }
        self.surfaces.push(surface);
    }

    /// Local bounds over all surface vertices. Cleared for an empty model.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.iter().all(|s| s.indices.is_empty())
    }

    /// Builds the static geometry model of one map area. Areas are stored as
    /// ordinary models named "_area0", "_area1", ...
    pub fn from_map_area(area_index: usize, source: &MapAreaSource) -> Self {
        let mut model = Self::new(&format!("_area{}", area_index));
        for surf in &source.surfaces {
            model.add_surface(ModelSurface {
                material: surf.material,
                verts: surf.verts.clone(),
                indices: surf.indices.clone(),
            });
        }
        model
    }
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    slots: HandleSlots<RenderModel>,
    by_name: HashMap<String, QHandle>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model. A model with the same name replaces the old one in
    /// place, keeping its handle, so entity defs referencing it pick up the
    /// new geometry.
    pub fn add_model(&mut self, model: RenderModel) -> QHandle {
        if let Some(&existing) = self.by_name.get(&model.name) {
            if let Some(slot) = self.slots.get_mut(existing) {
                *slot = model;
                return existing;
            }
        }
        let name = model.name.clone();
        let handle = self.slots.alloc(model);
        self.by_name.insert(name, handle);
        handle
    }

    pub fn find_model(&self, name: &str) -> QHandle {
        self.by_name.get(name).copied().unwrap_or(HANDLE_NONE)
    }

    pub fn model(&self, handle: QHandle) -> Option<&RenderModel> {
        self.slots.get(handle)
    }

    pub fn model_bounds(&self, handle: QHandle) -> Option<Bounds> {
        self.slots.get(handle).map(|m| m.bounds())
    }

    pub fn free_model(&mut self, handle: QHandle) {
        if let Some(model) = self.slots.free(handle) {
            self.by_name.remove(&model.name);
        }
    }

    pub fn num_models(&self) -> usize {
        self.slots.active_count()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.by_name.clear();
    }
}
