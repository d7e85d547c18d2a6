// portals.rs — area adjacency, portal state, and spatial classification

use std::collections::VecDeque;

use arclight_common::map_source::{MapNodeSource, MapSource};
use arclight_common::math::{
    box_on_plane_side, vector_ma, Bounds, Plane, Vec3, ON_EPSILON, SIDE_BACK, SIDE_CROSS,
    SIDE_FRONT, VEC3_ORIGIN,
};
use arclight_common::scene::{PortalBlock, QHandle, HANDLE_NONE};
use arclight_common::winding::Winding;

use log::warn;
use rand::Rng;

// random interior candidates tried by point_in_area before falling back
const POINT_IN_AREA_SAMPLES: usize = 64;

/// Portal descriptor returned by enumeration queries. Winding points are
/// wound counter-clockwise as seen from areas[0].
#[derive(Debug, Clone)]
pub struct ExitPortal {
    pub areas: [i32; 2],
    pub winding: Winding,
    pub blocking_bits: PortalBlock,
    /// Sound loss in dB for player-heard sounds, stored for the audio system.
    pub player_loss: f32,
    pub portal_handle: QHandle,
}

/// Outcome of interior point sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointInAreaStatus {
    /// Point classified back into the requested area.
    Found,
    /// Fell back to the center of the area's bounding box.
    Approximate,
    InvalidArea,
}

// Both directions of a doorway share one PortalPair for blocking state.
#[derive(Debug, Clone)]
struct PortalPair {
    areas: [i32; 2],
    winding: Winding,
    plane: Plane,
    bounds: Bounds,
    blocking: PortalBlock,
    player_loss: f32,
}

#[derive(Debug, Clone, Copy)]
struct AreaPortal {
    pair: usize,
    /// Which end of the pair this area is.
    side: usize,
}

#[derive(Debug, Clone, Default)]
struct Area {
    portals: Vec<AreaPortal>,
    bounds: Bounds,
}

#[derive(Debug, Default)]
pub struct AreaPortalGraph {
    areas: Vec<Area>,
    pairs: Vec<PortalPair>,
    nodes: Vec<MapNodeSource>,
}

impl AreaPortalGraph {
    pub fn from_map_source(source: &MapSource) -> Self {
        let mut areas: Vec<Area> = vec![Area::default(); source.areas.len()];

        for (i, area) in source.areas.iter().enumerate() {
            let mut bounds = Bounds::cleared();
            for surf in &area.surfaces {
                for v in &surf.verts {
                    bounds.add_point(v);
                }
            }
            areas[i].bounds = bounds;
        }

        let mut pairs = Vec::new();
        for (i, portal) in source.portals.iter().enumerate() {
            let winding = Winding::new(portal.points.clone());
            let plane = match winding.plane() {
                Some(p) => p,
                None => {
                    warn!("portal {} has a degenerate winding, dropped", i);
                    continue;
                }
            };
            let pair_index = pairs.len();
            let bounds = winding.bounds();
            pairs.push(PortalPair {
                areas: [portal.area_front, portal.area_back],
                winding,
                plane,
                bounds,
                blocking: PortalBlock::empty(),
                player_loss: 0.0,
            });

            for (side, &area) in [portal.area_front, portal.area_back].iter().enumerate() {
                areas[area as usize].portals.push(AreaPortal {
                    pair: pair_index,
                    side,
                });
                areas[area as usize].bounds.add_bounds(&pairs[pair_index].bounds);
            }
        }

        Self {
            areas,
            pairs,
            nodes: source.nodes.clone(),
        }
    }

    pub fn num_areas(&self) -> i32 {
        self.areas.len() as i32
    }

    pub fn num_portals(&self) -> i32 {
        self.pairs.len() as i32
    }

    fn pair(&self, portal: QHandle) -> Option<&PortalPair> {
        if portal <= 0 {
            return None;
        }
        self.pairs.get((portal - 1) as usize)
    }

    // ============================================================
    // Portal state
    // ============================================================

    /// Returns any single portal contacting the bounds, or HANDLE_NONE. Used
    /// to map door objects onto the portal they close off. The bounds must
    /// overlap the winding and straddle or touch the portal plane, a box
    /// floating off to one side of the plane is not a contact.
    pub fn find_portal(&self, bounds: &Bounds) -> QHandle {
        let probe = bounds.expand(ON_EPSILON);
        for (i, pair) in self.pairs.iter().enumerate() {
            if !probe.intersects(&pair.bounds) {
                continue;
            }
            if box_on_plane_side(&probe.mins, &probe.maxs, &pair.plane) != SIDE_CROSS {
                continue;
            }
            return i as QHandle + 1;
        }
        HANDLE_NONE
    }

    /// Multiple bits can be set to block multiple things at once.
    pub fn set_portal_state(&mut self, portal: QHandle, blocking: PortalBlock) {
        if portal <= 0 || portal as usize > self.pairs.len() {
            warn!("set_portal_state: invalid portal handle {}", portal);
            return;
        }
        self.pairs[(portal - 1) as usize].blocking = blocking;
    }

    pub fn get_portal_state(&self, portal: QHandle) -> PortalBlock {
        self.pair(portal).map(|p| p.blocking).unwrap_or_default()
    }

    /// Plane of the portal, oriented arbitrarily.
    pub fn get_portal_plane(&self, portal: QHandle) -> Plane {
        self.pair(portal).map(|p| p.plane).unwrap_or_default()
    }

    pub fn set_portal_player_loss(&mut self, portal: QHandle, loss: f32) {
        if portal <= 0 || portal as usize > self.pairs.len() {
            warn!("set_portal_player_loss: invalid portal handle {}", portal);
            return;
        }
        self.pairs[(portal - 1) as usize].player_loss = loss;
    }

    // ============================================================
    // Connectivity
    // ============================================================

    /// True only if a chain of portals with none of the given connection bits
    /// set exists between the two areas. Walked breadth-first against current
    /// portal state on every call.
    pub fn areas_are_connected(&self, area1: i32, area2: i32, connection: PortalBlock) -> bool {
        let num_areas = self.areas.len() as i32;
        if area1 < 0 || area1 >= num_areas || area2 < 0 || area2 >= num_areas {
            return false;
        }
        if area1 == area2 {
            return true;
        }

        let mut visited = vec![false; self.areas.len()];
        let mut queue = VecDeque::new();
        visited[area1 as usize] = true;
        queue.push_back(area1);

        while let Some(area) = queue.pop_front() {
            for ap in &self.areas[area as usize].portals {
                let pair = &self.pairs[ap.pair];
                if pair.blocking.intersects(connection) {
                    continue;
                }
                let other = pair.areas[ap.side ^ 1];
                if other == area2 {
                    return true;
                }
                if !visited[other as usize] {
                    visited[other as usize] = true;
                    queue.push_back(other);
                }
            }
        }
        false
    }

    /// All areas reachable from start_area across portals that have none of
    /// the given bits set, restricted to areas whose index passes the limit
    /// filter. Includes start_area itself.
    pub fn flood_connected_areas(
        &self,
        start_area: i32,
        connection: PortalBlock,
        limit: Option<&[i32]>,
    ) -> Vec<i32> {
        if start_area < 0 || start_area >= self.areas.len() as i32 {
            return Vec::new();
        }
        let allowed = |area: i32| match limit {
            Some(list) => list.contains(&area),
            None => true,
        };
        if !allowed(start_area) {
            return Vec::new();
        }

        let mut visited = vec![false; self.areas.len()];
        let mut queue = VecDeque::new();
        let mut out = Vec::new();
        visited[start_area as usize] = true;
        queue.push_back(start_area);

        while let Some(area) = queue.pop_front() {
            out.push(area);
            for ap in &self.areas[area as usize].portals {
                let pair = &self.pairs[ap.pair];
                if pair.blocking.intersects(connection) {
                    continue;
                }
                let other = pair.areas[ap.side ^ 1];
                if !visited[other as usize] && allowed(other) {
                    visited[other as usize] = true;
                    queue.push_back(other);
                }
            }
        }
        out
    }

    // ============================================================
    // Spatial classification
    // ============================================================

    /// Area containing the point, or -1 when the point is in the void.
    pub fn area_at_point(&self, point: &Vec3) -> i32 {
        if self.nodes.is_empty() {
            // no tree was compiled, single area maps cover everything
            if self.areas.len() == 1 {
                return 0;
            }
            for (i, area) in self.areas.iter().enumerate() {
                if !area.bounds.is_cleared() && area.bounds.contains_point(point) {
                    return i as i32;
                }
            }
            return -1;
        }

        let mut node_index = 0usize;
        loop {
            let node = &self.nodes[node_index];
            let child = if node.plane.distance_to(point) >= 0.0 {
                node.children[0]
            } else {
                node.children[1]
            };
            if child > 0 {
                node_index = child as usize;
                continue;
            }
            return -1 - child;
        }
    }

    /// Fills areas_out with areas the bounds cover and returns the true
    /// count, which may exceed the slice capacity.
    pub fn find_areas_in_bounds(&self, bounds: &Bounds, areas_out: &mut [i32]) -> usize {
        let found = self.areas_touching_bounds(bounds);
        for (i, &area) in found.iter().enumerate() {
            if i >= areas_out.len() {
                break;
            }
            areas_out[i] = area;
        }
        found.len()
    }

    pub(crate) fn areas_touching_bounds(&self, bounds: &Bounds) -> Vec<i32> {
        let mut out = Vec::new();
        if self.nodes.is_empty() {
            for (i, area) in self.areas.iter().enumerate() {
                if self.areas.len() == 1
                    || (!area.bounds.is_cleared() && area.bounds.intersects(bounds))
                {
                    out.push(i as i32);
                }
            }
            return out;
        }

        let mut seen = vec![false; self.areas.len()];
        self.bounds_areas_r(0, bounds, &mut seen, &mut out);
        out
    }

    fn bounds_areas_r(&self, node_index: usize, bounds: &Bounds, seen: &mut [bool], out: &mut Vec<i32>) {
        let node = &self.nodes[node_index];
        let side = box_on_plane_side(&bounds.mins, &bounds.maxs, &node.plane);

        for (child_slot, child) in node.children.iter().enumerate() {
            if child_slot == 0 && side == SIDE_BACK {
                continue;
            }
            if child_slot == 1 && side == SIDE_FRONT {
                continue;
            }
            if *child > 0 {
                self.bounds_areas_r(*child as usize, bounds, seen, out);
            } else {
                let area = -1 - child;
                if area >= 0 && !seen[area as usize] {
                    seen[area as usize] = true;
                    out.push(area);
                }
            }
        }
    }

    /// Best-effort interior point of an area, distant from its boundary when
    /// possible. Slow, meant for tooling rather than per-frame use.
    pub fn point_in_area(&self, area: i32) -> (Vec3, PointInAreaStatus) {
        if area < 0 || area >= self.areas.len() as i32 {
            return (VEC3_ORIGIN, PointInAreaStatus::InvalidArea);
        }

        let bounds = &self.areas[area as usize].bounds;
        if bounds.is_cleared() {
            return (VEC3_ORIGIN, PointInAreaStatus::Approximate);
        }
        let center = bounds.center();
        if self.area_at_point(&center) == area {
            return (center, PointInAreaStatus::Found);
        }

        // random candidates inside the bounds, keep the one farthest from
        // the bounding faces
        let mut rng = rand::thread_rng();
        let mut best: Option<(Vec3, f32)> = None;
        for _ in 0..POINT_IN_AREA_SAMPLES {
            let mut p = VEC3_ORIGIN;
            for i in 0..3 {
                p[i] = rng.gen_range(bounds.mins[i]..=bounds.maxs[i]);
            }
            if self.area_at_point(&p) != area {
                continue;
            }
            let mut clearance = f32::MAX;
            for i in 0..3 {
                clearance = clearance.min(p[i] - bounds.mins[i]);
                clearance = clearance.min(bounds.maxs[i] - p[i]);
            }
            if best.map_or(true, |(_, c)| clearance > c) {
                best = Some((p, clearance));
            }
        }
        if let Some((p, _)) = best {
            return (p, PointInAreaStatus::Found);
        }

        // probe inward from each portal of the area
        for ap in &self.areas[area as usize].portals {
            let pair = &self.pairs[ap.pair];
            let portal_center = pair.winding.center();
            for step in [8.0f32, 32.0, 128.0] {
                for dir in [1.0f32, -1.0] {
                    let probe = vector_ma(&portal_center, dir * step, &pair.plane.normal);
                    if self.area_at_point(&probe) == area {
                        return (probe, PointInAreaStatus::Found);
                    }
                }
            }
        }

        (center, PointInAreaStatus::Approximate)
    }

    // ============================================================
    // Portal enumeration
    // ============================================================

    /// Portals bordering an area, 0 for an invalid area index.
    pub fn num_portals_in_area(&self, area: i32) -> i32 {
        if area < 0 || area >= self.areas.len() as i32 {
            return 0;
        }
        self.areas[area as usize].portals.len() as i32
    }

    /// One portal of an area. The winding facing is flipped so its front side
    /// always faces out of the requested area.
    pub fn get_portal(&self, area: i32, portal_num: i32) -> Option<ExitPortal> {
        if area < 0 || area >= self.areas.len() as i32 {
            return None;
        }
        let ap = self.areas[area as usize].portals.get(portal_num as usize)?;
        let pair = &self.pairs[ap.pair];

        let winding = if ap.side == 0 {
            pair.winding.clone()
        } else {
            pair.winding.reversed()
        };
        Some(ExitPortal {
            areas: [area, pair.areas[ap.side ^ 1]],
            winding,
            blocking_bits: pair.blocking,
            player_loss: pair.player_loss,
            portal_handle: ap.pair as QHandle + 1,
        })
    }

    pub fn area_bounds(&self, area: i32) -> Option<Bounds> {
        if area < 0 || area >= self.areas.len() as i32 {
            return None;
        }
        Some(self.areas[area as usize].bounds)
    }

    pub(crate) fn bsp_nodes(&self) -> &[MapNodeSource] {
        &self.nodes
    }
}
