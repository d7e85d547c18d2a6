// test_support.rs — shared fixtures for unit tests

use arclight_common::map_source::{
    MapAreaSource, MapNodeSource, MapPortalSource, MapSource, MapSurfaceSource, MaterialDecl,
    MAP_FILE_ID,
};
use arclight_common::math::Plane;
use arclight_common::scene::{MaterialFlags, MaterialId};

use crate::models::{ModelSurface, RenderModel};

/// Call at the top of a test to see log output when RUST_LOG is set.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two box rooms side by side on the x axis, sharing a doorway at x=0.
/// Area 0 is x < 0, area 1 is x > 0. Each room has a floor quad and the
/// dividing wall (minus the doorway) belongs to area 0. Everything below
/// the floor plane is solid in the tree.
pub fn two_room_map() -> MapSource {
    let mut map = MapSource::empty("two_rooms");
    map.materials = vec![
        MaterialDecl {
            name: "textures/base_wall/plain".to_string(),
            flags: MaterialFlags::empty(),
        },
        MaterialDecl {
            name: "textures/skies/city".to_string(),
            flags: MaterialFlags::SKY | MaterialFlags::PORTAL_SKY,
        },
    ];
    map.areas = vec![
        MapAreaSource {
            surfaces: vec![
                // floor, facing up
                MapSurfaceSource {
                    material: 0,
                    verts: vec![
                        [-128.0, -64.0, 0.0],
                        [0.0, -64.0, 0.0],
                        [0.0, 64.0, 0.0],
                        [-128.0, 64.0, 0.0],
                    ],
                    indices: vec![0, 1, 2, 0, 2, 3],
                },
                // wall segment beside the doorway, facing area 0
                MapSurfaceSource {
                    material: 0,
                    verts: vec![
                        [-0.5, 16.0, 0.0],
                        [-0.5, 64.0, 0.0],
                        [-0.5, 64.0, 64.0],
                        [-0.5, 16.0, 64.0],
                    ],
                    indices: vec![0, 2, 1, 0, 3, 2],
                },
            ],
        },
        MapAreaSource {
            surfaces: vec![MapSurfaceSource {
                material: 0,
                verts: vec![
                    [0.0, -64.0, 0.0],
                    [128.0, -64.0, 0.0],
                    [128.0, 64.0, 0.0],
                    [0.0, 64.0, 0.0],
                ],
                indices: vec![0, 1, 2, 0, 2, 3],
            }],
        },
    ];
    map.portals = vec![MapPortalSource {
        area_front: 0,
        area_back: 1,
        points: vec![
            [0.0, -16.0, 0.0],
            [0.0, 16.0, 0.0],
            [0.0, 16.0, 48.0],
            [0.0, -16.0, 48.0],
        ],
    }];
    map.nodes = vec![
        // above the floor on the front side, solid below
        MapNodeSource {
            plane: Plane::new([0.0, 0.0, 1.0], 0.0),
            children: [1, 0],
        },
        MapNodeSource {
            plane: Plane::new([1.0, 0.0, 0.0], 0.0),
            children: [-2, -1],
        },
    ];
    map.format_id = MAP_FILE_ID.to_string();
    map
}

/// Horizontal quad of the given half size at height z, two triangles.
pub fn quad_surface(material: MaterialId, z: f32, size: f32) -> ModelSurface {
    ModelSurface {
        material,
        verts: vec![
            [-size, -size, z],
            [size, -size, z],
            [size, size, z],
            [-size, size, z],
        ],
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}

/// Axis aligned box model centered on the origin, all six faces wound
/// outward.
pub fn box_model(name: &str, half: f32) -> RenderModel {
    let h = half;
    let verts = vec![
        [-h, -h, -h],
        [h, -h, -h],
        [h, h, -h],
        [-h, h, -h],
        [-h, -h, h],
        [h, -h, h],
        [h, h, h],
        [-h, h, h],
    ];
    let indices = vec![
        0, 2, 1, 0, 3, 2, // bottom
        4, 5, 6, 4, 6, 7, // top
        0, 1, 5, 0, 5, 4, // front
        2, 3, 7, 2, 7, 6, // back
        1, 2, 6, 1, 6, 5, // right
        3, 0, 4, 3, 4, 7, // left
    ];
    let mut model = RenderModel::new(name);
    model.add_surface(ModelSurface {
        material: 0,
        verts,
        indices,
    });
    model
}
