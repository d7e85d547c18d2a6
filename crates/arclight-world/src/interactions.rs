// interactions.rs — cached light/entity interaction table

use std::collections::HashMap;

use log::debug;
use rayon::prelude::*;

use arclight_common::scene::{EntityDefFlags, LightDefFlags, QHandle};

use crate::defs::{EntityDef, LightDef, SceneDefRegistry};

// pairs are computed in parallel above this many light x entity candidates
const PARALLEL_PAIR_THRESHOLD: usize = 256;

/// Cached relationship between one light def and one entity def. Entries
/// only exist for pairs whose world bounds overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interaction {
    /// Light flow through open portals cannot reach any area the entity
    /// is in, so its surfaces receive no light.
    pub culled: bool,
    /// The entity throws a shadow from this light. Can be true on a culled
    /// pair when the entity forces shadows from behind opaque geometry.
    pub cast_shadow: bool,
}

/// One pair. None when the bounds do not even overlap.
pub fn compute_interaction(light: &LightDef, entity: &EntityDef) -> Option<Interaction> {
    if !light.world_bounds.intersects(&entity.world_bounds) {
        return None;
    }

    let flow_reaches = entity.areas.iter().any(|a| light.areas.contains(a));

    let suppressed_in_light = entity.desc.suppress_shadow_in_light_id != 0
        && entity.desc.suppress_shadow_in_light_id == light.desc.light_id;
    let shadow_ok = !light.desc.flags.contains(LightDefFlags::NO_SHADOWS)
        && !entity.desc.flags.contains(EntityDefFlags::NO_SHADOW)
        && !entity.desc.flags.contains(EntityDefFlags::WEAPON_DEPTH_HACK)
        && !suppressed_in_light;
    let force_shadow = entity
        .desc
        .flags
        .contains(EntityDefFlags::FORCE_SHADOW_BEHIND_OPAQUE);

    Some(Interaction {
        culled: !flow_reaches,
        cast_shadow: shadow_ok && (flow_reaches || force_shadow),
    })
}

#[derive(Debug, Default)]
pub struct InteractionTable {
    table: HashMap<(QHandle, QHandle), Interaction>,
    /// Once the whole scene has been generated, entities flagged as having
    /// no dynamic interactions stop pairing with lights they have not
    /// already met.
    all_generated: bool,
}

impl InteractionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, light: QHandle, entity: QHandle) -> Option<Interaction> {
        self.table.get(&(light, entity)).copied()
    }

    /// Cached state for a pair, computing and storing it on first use.
    /// None when the pair cannot interact at all: disjoint bounds, dead
    /// handles, or a static-only entity after the load pass.
    pub fn ensure(
        &mut self,
        light: QHandle,
        entity: QHandle,
        defs: &SceneDefRegistry,
    ) -> Option<Interaction> {
        if let Some(&state) = self.table.get(&(light, entity)) {
            return Some(state);
        }
        let light_def = defs.light_def(light)?;
        let entity_def = defs.entity_def(entity)?;
        if self.all_generated
            && entity_def
                .desc
                .flags
                .contains(EntityDefFlags::NO_DYNAMIC_INTERACTIONS)
        {
            return None;
        }
        let state = compute_interaction(light_def, entity_def)?;
        self.table.insert((light, entity), state);
        Some(state)
    }

    /// Whole scene eager pass, normally run once at the end of a level load
    /// so the cost is not paid as a spike on the first frames.
    pub fn generate_all(&mut self, defs: &SceneDefRegistry) {
        let lights = defs.light_handles();
        let entities = defs.entity_handles();
        let pair_count = lights.len() * entities.len();

        if pair_count >= PARALLEL_PAIR_THRESHOLD {
            let computed: Vec<((QHandle, QHandle), Interaction)> = lights
                .par_iter()
                .flat_map_iter(|&light| {
                    let light_def = defs.light_def(light);
                    entities.iter().filter_map(move |&entity| {
                        let light_def = light_def?;
                        let entity_def = defs.entity_def(entity)?;
                        compute_interaction(light_def, entity_def)
                            .map(|state| ((light, entity), state))
                    })
                })
                .collect();
            self.table.extend(computed);
        } else {
            for &light in &lights {
                for &entity in &entities {
                    self.ensure(light, entity, defs);
                }
            }
        }

        self.all_generated = true;
        debug!(
            "generate_all_interactions: {} pairs considered, {} active",
            pair_count,
            self.table.len()
        );
    }

    pub fn purge_entity(&mut self, entity: QHandle) {
        self.table.retain(|&(_, e), _| e != entity);
    }

    pub fn purge_light(&mut self, light: QHandle) {
        self.table.retain(|&(l, _), _| l != light);
    }

    pub fn all_generated(&self) -> bool {
        self.all_generated
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn clear(&mut self) {
        self.table.clear();
        self.all_generated = false;
    }
}

// ============================================================
