//! Draw items and the range container they share
//!
//! All draw items of a prim address one [`SharedData`] through a
//! [`DrawingCoord`]: a set of slot indices saying which range plays which
//! part for that item. Items of different reprs differ only in their
//! topology slot.

use std::sync::Arc;

use super::change_tracker::ChangeTracker;
use crate::buffer::{is_valid_range, RangeHandle};
use crate::sync::shader_selector::GeometricShader;

/// Slot indices into [`SharedData`]
pub mod slot {
    /// Constant primvars, transform and prim id
    pub const CONSTANT_PRIMVAR: usize = 0;
    /// Vertex and varying primvars
    pub const VERTEX_PRIMVAR: usize = 1;
    /// Full (triangle, quad or refined) indices
    pub const TOPOLOGY: usize = 2;
    /// Uniform primvars
    pub const ELEMENT_PRIMVAR: usize = 3;
    /// Face-varying primvars
    pub const FACE_VARYING_PRIMVAR: usize = 4;
    /// Coarse face indices
    pub const HULL_TOPOLOGY: usize = 5;
    /// Point indices
    pub const POINTS_TOPOLOGY: usize = 6;
    /// Instance primvars
    pub const INSTANCE_PRIMVAR: usize = 7;
    /// Number of slots
    pub const COUNT: usize = 8;
}

/// Which shared slot holds each range of one draw item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawingCoord {
    /// Constant primvar slot
    pub constant_primvar: usize,
    /// Vertex primvar slot
    pub vertex_primvar: usize,
    /// Topology slot; differs between hull, points and full items
    pub topology: usize,
    /// Element primvar slot
    pub element_primvar: usize,
    /// Face-varying primvar slot
    pub face_varying_primvar: usize,
    /// Instance primvar slot
    pub instance_primvar: usize,
}

impl Default for DrawingCoord {
    fn default() -> Self {
        Self {
            constant_primvar: slot::CONSTANT_PRIMVAR,
            vertex_primvar: slot::VERTEX_PRIMVAR,
            topology: slot::TOPOLOGY,
            element_primvar: slot::ELEMENT_PRIMVAR,
            face_varying_primvar: slot::FACE_VARYING_PRIMVAR,
            instance_primvar: slot::INSTANCE_PRIMVAR,
        }
    }
}

impl DrawingCoord {
    /// Coord using `topology` as its topology slot
    pub fn with_topology(topology: usize) -> Self {
        Self { topology, ..Self::default() }
    }
}

/// Ranges and state shared by every draw item of a prim
#[derive(Debug, Clone)]
pub struct SharedData {
    ranges: Vec<Option<RangeHandle>>,
    /// Material tag used for batching
    pub material_tag: String,
    /// Prim visibility
    pub visible: bool,
}

impl Default for SharedData {
    fn default() -> Self {
        Self {
            ranges: vec![None; slot::COUNT],
            material_tag: crate::scene::material::DEFAULT_MATERIAL_TAG.to_string(),
            visible: true,
        }
    }
}

impl SharedData {
    /// Range in `slot`
    pub fn range(&self, slot: usize) -> Option<&RangeHandle> {
        self.ranges.get(slot).and_then(Option::as_ref)
    }

    /// Replace the range in `slot`
    ///
    /// Swapping out a valid range changes what existing batches draw, so the
    /// tracker's batch version is bumped.
    pub fn update_range(&mut self, slot: usize, range: Option<RangeHandle>, tracker: &ChangeTracker) {
        let Some(entry) = self.ranges.get_mut(slot) else {
            log::error!("Range slot {} out of bounds", slot);
            return;
        };
        let unchanged = match (entry.as_ref(), range.as_ref()) {
            (Some(current), Some(new)) => Arc::ptr_eq(current, new),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        if is_valid_range(entry.as_ref()) {
            tracker.mark_batches_dirty();
        }
        *entry = range;
    }
}

/// One drawable piece of a repr
#[derive(Debug, Clone, Default)]
pub struct DrawItem {
    coord: DrawingCoord,
    geometric_shader: Option<Arc<GeometricShader>>,
}

impl DrawItem {
    /// Draw item reading ranges through `coord`
    pub fn new(coord: DrawingCoord) -> Self {
        Self { coord, geometric_shader: None }
    }

    /// Slot layout
    pub fn coord(&self) -> DrawingCoord {
        self.coord
    }

    /// Topology (index) range
    pub fn topology_range<'a>(&self, shared: &'a SharedData) -> Option<&'a RangeHandle> {
        shared.range(self.coord.topology)
    }

    /// Vertex primvar range
    pub fn vertex_primvar_range<'a>(&self, shared: &'a SharedData) -> Option<&'a RangeHandle> {
        shared.range(self.coord.vertex_primvar)
    }

    /// Element primvar range
    pub fn element_primvar_range<'a>(&self, shared: &'a SharedData) -> Option<&'a RangeHandle> {
        shared.range(self.coord.element_primvar)
    }

    /// Face-varying primvar range
    pub fn face_varying_primvar_range<'a>(&self, shared: &'a SharedData) -> Option<&'a RangeHandle> {
        shared.range(self.coord.face_varying_primvar)
    }

    /// Constant primvar range
    pub fn constant_primvar_range<'a>(&self, shared: &'a SharedData) -> Option<&'a RangeHandle> {
        shared.range(self.coord.constant_primvar)
    }

    /// Instance primvar range
    pub fn instance_primvar_range<'a>(&self, shared: &'a SharedData) -> Option<&'a RangeHandle> {
        shared.range(self.coord.instance_primvar)
    }

    /// Current geometric shader
    pub fn geometric_shader(&self) -> Option<&Arc<GeometricShader>> {
        self.geometric_shader.as_ref()
    }

    /// Replace the geometric shader
    pub fn set_geometric_shader(&mut self, shader: Arc<GeometricShader>) {
        self.geometric_shader = Some(shader);
    }
}

/// Draw items of one repr
#[derive(Debug, Clone, Default)]
pub struct Repr {
    draw_items: Vec<DrawItem>,
}

impl Repr {
    /// Empty repr
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a draw item
    pub fn add_draw_item(&mut self, item: DrawItem) {
        self.draw_items.push(item);
    }

    /// All draw items
    pub fn draw_items(&self) -> &[DrawItem] {
        &self.draw_items
    }

    /// Draw item `index`
    pub fn draw_item(&self, index: usize) -> Option<&DrawItem> {
        self.draw_items.get(index)
    }

    /// Mutable draw item `index`
    pub fn draw_item_mut(&mut self, index: usize) -> Option<&mut DrawItem> {
        self.draw_items.get_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{MemoryBufferArrayRange, RangeRole, UsageHint};

    fn range(id: u64) -> RangeHandle {
        Arc::new(MemoryBufferArrayRange::new(id, RangeRole::VertexPrimvar, Vec::new(), UsageHint::empty()))
    }

    #[test]
    fn test_coords_share_all_but_topology() {
        let hull = DrawingCoord::with_topology(slot::HULL_TOPOLOGY);
        let full = DrawingCoord::default();
        assert_ne!(hull.topology, full.topology);
        assert_eq!(hull.vertex_primvar, full.vertex_primvar);
    }

    #[test]
    fn test_replacing_valid_range_dirties_batches() {
        let tracker = ChangeTracker::new();
        let mut shared = SharedData::default();
        let first = range(1);
        shared.update_range(slot::VERTEX_PRIMVAR, Some(Arc::clone(&first)), &tracker);
        assert_eq!(tracker.batch_version(), 0);

        shared.update_range(slot::VERTEX_PRIMVAR, Some(Arc::clone(&first)), &tracker);
        assert_eq!(tracker.batch_version(), 0);

        shared.update_range(slot::VERTEX_PRIMVAR, Some(range(2)), &tracker);
        assert_eq!(tracker.batch_version(), 1);

        let item = DrawItem::new(DrawingCoord::default());
        assert_eq!(item.vertex_primvar_range(&shared).map(|r| r.id()), Some(2));
        assert!(item.topology_range(&shared).is_none());
    }
}
