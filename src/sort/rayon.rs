use bevy::math::{
    Mat4,
    Vec3,
};
use rayon::prelude::*;

use crate::{
    gaussian::data::Position,
    sort::{
        depth_key,
        SortEntry,
        SortOrder,
    },
};


/// host-side depth sort of the first `count` splats, returning draw order.
///
/// the key is the same one the depth-key compute stage writes, so this order
/// matches the gpu path up to ties.
pub fn rayon_sort(
    positions: &[Position],
    world_view: Mat4,
    order: SortOrder,
) -> Vec<u32> {
    let mut entries: Vec<SortEntry> = positions.par_iter()
        .enumerate()
        .map(|(idx, position)| {
            let view_z = world_view.transform_point3(Vec3::from_array(*position)).z;

            SortEntry {
                key: depth_key(view_z, order),
                index: idx as u32,
            }
        })
        .collect();

    entries.par_sort_by_key(|entry| entry.key);

    entries.into_par_iter()
        .map(|entry| entry.index)
        .collect()
}
