use std::collections::HashSet;

use crate::directory::Directory;
use crate::model::{ElementRef, MapId};

/// Returns true when placing an element targeting map `target` inside map
/// `candidate` would close a containment cycle, i.e. `candidate` is
/// reachable from `target` through MAP-type elements (or is `target`
/// itself).
///
/// Enforced at configuration time; the render-time map resolver carries its
/// own visited set as defense in depth.
pub fn would_create_cycle(directory: &dyn Directory, candidate: MapId, target: MapId) -> bool {
    let mut seen = HashSet::new();
    reachable(directory, candidate, target, &mut seen)
}

fn reachable(
    directory: &dyn Directory,
    candidate: MapId,
    current: MapId,
    seen: &mut HashSet<MapId>,
) -> bool {
    if current == candidate {
        return true;
    }
    // Already-visited maps can't add new reachable descendants.
    if !seen.insert(current) {
        return false;
    }

    let Some(map) = directory.map(current) else {
        return false;
    };

    map.elements.iter().any(|element| match element.target {
        ElementRef::Map(child) => reachable(directory, candidate, child, seen),
        _ => false,
    })
}
