// map_source.rs — compiled map data handed to the render world

use crc::{Crc, CRC_32_ISO_HDLC};
use thiserror::Error;

use crate::math::{Plane, Vec3};
use crate::scene::{MaterialFlags, MATERIAL_NONE};

/// Format tag a compiled map must carry to be accepted.
pub const MAP_FILE_ID: &str = "mapProcFile003";

const MAP_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Debug, Error)]
pub enum MapSourceError {
    #[error("map '{name}' has format id '{found}', expected '{expected}'")]
    FormatId {
        name: String,
        found: String,
        expected: &'static str,
    },
    #[error("portal {portal} references area {area} out of {num_areas}")]
    PortalArea {
        portal: usize,
        area: i32,
        num_areas: usize,
    },
    #[error("portal {portal} winding has {points} points")]
    PortalWinding { portal: usize, points: usize },
    #[error("node {node} child {child} out of range")]
    NodeChild { node: usize, child: i32 },
    #[error("area {area} surface {surface} material {material} out of {num_materials}")]
    SurfaceMaterial {
        area: usize,
        surface: usize,
        material: i32,
        num_materials: usize,
    },
    #[error("area {area} surface {surface} has bad index data")]
    SurfaceIndices { area: usize, surface: usize },
}

/// Material table entry. The full material system lives outside this crate,
/// the render world only needs the flags that change visibility behavior.
#[derive(Debug, Clone, Default)]
pub struct MaterialDecl {
    pub name: String,
    pub flags: MaterialFlags,
}

/// One triangle soup of a single material inside an area.
#[derive(Debug, Clone, Default)]
pub struct MapSurfaceSource {
    pub material: i32,
    pub verts: Vec<Vec3>,
    /// Triangle list, three indices per triangle.
    pub indices: Vec<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct MapAreaSource {
    pub surfaces: Vec<MapSurfaceSource>,
}

/// Doorway between two areas. Winding points are wound counter-clockwise as
/// seen from area_front.
#[derive(Debug, Clone, Default)]
pub struct MapPortalSource {
    pub area_front: i32,
    pub area_back: i32,
    pub points: Vec<Vec3>,
}

/// BSP node used for point-in-area lookups. A child > 0 is another node
/// index, a child <= 0 encodes area (-1 - child), with area -1 meaning the
/// opaque void.
#[derive(Debug, Clone, Default)]
pub struct MapNodeSource {
    pub plane: Plane,
    pub children: [i32; 2],
}

#[derive(Debug, Clone, Default)]
pub struct MapSource {
    pub format_id: String,
    pub name: String,
    pub materials: Vec<MaterialDecl>,
    pub areas: Vec<MapAreaSource>,
    pub portals: Vec<MapPortalSource>,
    pub nodes: Vec<MapNodeSource>,
}

impl MapSource {
    /// Single area, no portals, no geometry. Used when no map is loaded.
    pub fn empty(name: &str) -> Self {
        Self {
            format_id: MAP_FILE_ID.to_string(),
            name: name.to_string(),
            materials: Vec::new(),
            areas: vec![MapAreaSource::default()],
            portals: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), MapSourceError> {
        if self.format_id != MAP_FILE_ID {
            return Err(MapSourceError::FormatId {
                name: self.name.clone(),
                found: self.format_id.clone(),
                expected: MAP_FILE_ID,
            });
        }

        let num_areas = self.areas.len();
        for (i, portal) in self.portals.iter().enumerate() {
            for area in [portal.area_front, portal.area_back] {
                if area < 0 || area as usize >= num_areas {
                    return Err(MapSourceError::PortalArea {
                        portal: i,
                        area,
                        num_areas,
                    });
                }
            }
            if portal.points.len() < 3 {
                return Err(MapSourceError::PortalWinding {
                    portal: i,
                    points: portal.points.len(),
                });
            }
        }

        for (i, node) in self.nodes.iter().enumerate() {
            for child in node.children {
                // area -1 (child 0) is the opaque void
                let bad = if child > 0 {
                    child as usize >= self.nodes.len()
                } else {
                    -1 - child >= num_areas as i32
                };
                if bad {
                    return Err(MapSourceError::NodeChild { node: i, child });
                }
            }
        }

        for (ai, area) in self.areas.iter().enumerate() {
            for (si, surf) in area.surfaces.iter().enumerate() {
                if surf.material != MATERIAL_NONE
                    && (surf.material < 0 || surf.material as usize >= self.materials.len())
                {
                    return Err(MapSourceError::SurfaceMaterial {
                        area: ai,
                        surface: si,
                        material: surf.material,
                        num_materials: self.materials.len(),
                    });
                }
                if surf.indices.len() % 3 != 0 {
                    return Err(MapSourceError::SurfaceIndices {
                        area: ai,
                        surface: si,
                    });
                }
                for &idx in &surf.indices {
                    if idx < 0 || idx as usize >= surf.verts.len() {
                        return Err(MapSourceError::SurfaceIndices {
                            area: ai,
                            surface: si,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// CRC over everything that affects visibility, so demos can verify they
    /// replay against the same map.
    pub fn checksum(&self) -> u32 {
        let mut digest = MAP_CRC.digest();

        digest.update(self.name.as_bytes());
        digest.update(&(self.areas.len() as u32).to_le_bytes());
        digest.update(&(self.portals.len() as u32).to_le_bytes());
        digest.update(&(self.nodes.len() as u32).to_le_bytes());

        for mat in &self.materials {
            digest.update(mat.name.as_bytes());
            digest.update(&mat.flags.bits().to_le_bytes());
        }
        for area in &self.areas {
            digest.update(&(area.surfaces.len() as u32).to_le_bytes());
            for surf in &area.surfaces {
                digest.update(&surf.material.to_le_bytes());
                for v in &surf.verts {
                    for c in v {
                        digest.update(&c.to_le_bytes());
                    }
                }
                for idx in &surf.indices {
                    digest.update(&idx.to_le_bytes());
                }
            }
        }
        for portal in &self.portals {
            digest.update(&portal.area_front.to_le_bytes());
            digest.update(&portal.area_back.to_le_bytes());
            for p in &portal.points {
                for c in p {
                    digest.update(&c.to_le_bytes());
                }
            }
        }
        for node in &self.nodes {
            for c in &node.plane.normal {
                digest.update(&c.to_le_bytes());
            }
            digest.update(&node.plane.dist.to_le_bytes());
            digest.update(&node.children[0].to_le_bytes());
            digest.update(&node.children[1].to_le_bytes());
        }

        digest.finalize()
    }
}
