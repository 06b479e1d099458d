//! # Dirty State Tracking
//!
//! Per-prim dirty bits and the implication rules that expand raw scene edits
//! into everything that has to be re-synced.
//!
//! Scene bits occupy the low 24 bits and are cleared after every sync pass.
//! Custom bits (derived indices and normals) live above them and are cleared
//! by the stage that consumes them. A custom bit is only ever set once the
//! prim has declared it in use, so prims configured differently never see
//! each other's derived state.

use bitflags::bitflags;

use crate::tokens;

bitflags! {
    /// Dirty state of one prim
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyBits: u64 {
        /// Draw items for the requested repr must be created
        const INIT_REPR = 1 << 0;
        /// The prim changed more than once since it was added
        const VARYING = 1 << 1;
        /// Prim id
        const DIRTY_PRIM_ID = 1 << 2;
        /// Bounding extent
        const DIRTY_EXTENT = 1 << 3;
        /// Refine level, flat shading, displacement
        const DIRTY_DISPLAY_STYLE = 1 << 4;
        /// The `points` primvar
        const DIRTY_POINTS = 1 << 5;
        /// Any primvar other than points, normals and widths
        const DIRTY_PRIMVAR = 1 << 6;
        /// Material binding
        const DIRTY_MATERIAL_ID = 1 << 7;
        /// Face layout, scheme, orientation, holes
        const DIRTY_TOPOLOGY = 1 << 8;
        /// Prim transform
        const DIRTY_TRANSFORM = 1 << 9;
        /// Visibility
        const DIRTY_VISIBILITY = 1 << 10;
        /// The authored `normals` primvar
        const DIRTY_NORMALS = 1 << 11;
        /// Double-sided flag
        const DIRTY_DOUBLE_SIDED = 1 << 12;
        /// Cull style
        const DIRTY_CULL_STYLE = 1 << 13;
        /// Creases, corners, interpolation rules
        const DIRTY_SUBDIV_TAGS = 1 << 14;
        /// The `widths` primvar
        const DIRTY_WIDTHS = 1 << 15;
        /// Instancer binding
        const DIRTY_INSTANCER = 1 << 16;
        /// Instance indices
        const DIRTY_INSTANCE_INDEX = 1 << 17;
        /// Repr selection
        const DIRTY_REPR = 1 << 18;
        /// A repr was created this pass; its ranges may change
        const NEW_REPR = 1 << 19;

        /// Full index range (custom)
        const DIRTY_INDICES = 1 << 24;
        /// Hull index range (custom)
        const DIRTY_HULL_INDICES = 1 << 25;
        /// Points index range (custom)
        const DIRTY_POINTS_INDICES = 1 << 26;
        /// Generated smooth normals (custom)
        const DIRTY_SMOOTH_NORMALS = 1 << 27;
        /// Generated flat normals (custom)
        const DIRTY_FLAT_NORMALS = 1 << 28;

        /// Every scene-origin bit, cleared at the end of a sync pass
        const ALL_SCENE_DIRTY_BITS = Self::INIT_REPR.bits()
            | Self::DIRTY_PRIM_ID.bits()
            | Self::DIRTY_EXTENT.bits()
            | Self::DIRTY_DISPLAY_STYLE.bits()
            | Self::DIRTY_POINTS.bits()
            | Self::DIRTY_PRIMVAR.bits()
            | Self::DIRTY_MATERIAL_ID.bits()
            | Self::DIRTY_TOPOLOGY.bits()
            | Self::DIRTY_TRANSFORM.bits()
            | Self::DIRTY_VISIBILITY.bits()
            | Self::DIRTY_NORMALS.bits()
            | Self::DIRTY_DOUBLE_SIDED.bits()
            | Self::DIRTY_CULL_STYLE.bits()
            | Self::DIRTY_SUBDIV_TAGS.bits()
            | Self::DIRTY_WIDTHS.bits()
            | Self::DIRTY_INSTANCER.bits()
            | Self::DIRTY_INSTANCE_INDEX.bits()
            | Self::DIRTY_REPR.bits()
            | Self::NEW_REPR.bits();

        /// Derived index bits
        const CUSTOM_INDEX_BITS = Self::DIRTY_INDICES.bits()
            | Self::DIRTY_HULL_INDICES.bits()
            | Self::DIRTY_POINTS_INDICES.bits();

        /// Derived normals bits
        const CUSTOM_NORMALS_BITS = Self::DIRTY_SMOOTH_NORMALS.bits() | Self::DIRTY_FLAT_NORMALS.bits();

        /// Every custom bit
        const ALL_CUSTOM_BITS = Self::CUSTOM_INDEX_BITS.bits() | Self::CUSTOM_NORMALS_BITS.bits();

        /// Bits that make any primvar dirty
        const ANY_PRIMVAR = Self::DIRTY_POINTS.bits()
            | Self::DIRTY_NORMALS.bits()
            | Self::DIRTY_WIDTHS.bits()
            | Self::DIRTY_PRIMVAR.bits();
    }
}

impl DirtyBits {
    /// Whether anything besides the variability marker is set
    pub fn is_dirty(self) -> bool {
        !self.difference(Self::VARYING).is_empty()
    }

    /// Whether the primvar `name` needs to be pulled again
    pub fn is_primvar_dirty(self, name: &str) -> bool {
        let bit = match name {
            tokens::POINTS => Self::DIRTY_POINTS,
            tokens::NORMALS => Self::DIRTY_NORMALS,
            tokens::WIDTHS => Self::DIRTY_WIDTHS,
            _ => Self::DIRTY_PRIMVAR,
        };
        self.intersects(bit)
    }

    /// Whether any primvar needs to be pulled again
    pub fn is_any_primvar_dirty(self) -> bool {
        self.intersects(Self::ANY_PRIMVAR)
    }
}

/// When a rule fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Any of these bits is set
    Any(DirtyBits),
    /// Any of the first set is set and none of the second
    AnyUnless(DirtyBits, DirtyBits),
    /// Any of these bits is set and normals are computed on the CPU
    AnyWithCpuNormals(DirtyBits),
}

/// What a rule adds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Implied {
    /// These scene bits
    Scene(DirtyBits),
    /// These custom bits, limited to the ones in use
    CustomInUse(DirtyBits),
}

/// One implication: when `trigger` fires, add `implied`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationRule {
    /// Short description for logs and tests
    pub name: &'static str,
    /// Condition on the bits accumulated so far
    pub trigger: Trigger,
    /// Bits added when the condition holds
    pub implied: Implied,
}

/// Implication rules, evaluated in order against the accumulated bits
pub const PROPAGATION_RULES: [PropagationRule; 6] = [
    PropagationRule {
        name: "subdiv tags re-pull all data",
        trigger: Trigger::Any(DirtyBits::DIRTY_SUBDIV_TAGS),
        implied: Implied::Scene(DirtyBits::DIRTY_POINTS
            .union(DirtyBits::DIRTY_NORMALS)
            .union(DirtyBits::DIRTY_PRIMVAR)
            .union(DirtyBits::DIRTY_TOPOLOGY)
            .union(DirtyBits::DIRTY_DISPLAY_STYLE)),
    },
    PropagationRule {
        name: "topology re-pulls tags and display style",
        trigger: Trigger::AnyUnless(DirtyBits::DIRTY_TOPOLOGY, DirtyBits::DIRTY_SUBDIV_TAGS),
        implied: Implied::Scene(DirtyBits::DIRTY_SUBDIV_TAGS.union(DirtyBits::DIRTY_DISPLAY_STYLE)),
    },
    PropagationRule {
        name: "material re-evaluates quadrangulation",
        trigger: Trigger::Any(DirtyBits::DIRTY_MATERIAL_ID),
        implied: Implied::Scene(DirtyBits::DIRTY_POINTS
            .union(DirtyBits::DIRTY_NORMALS)
            .union(DirtyBits::DIRTY_PRIMVAR)
            .union(DirtyBits::DIRTY_TOPOLOGY)),
    },
    PropagationRule {
        name: "points, display style or topology recompute normals",
        trigger: Trigger::Any(DirtyBits::DIRTY_POINTS
            .union(DirtyBits::DIRTY_DISPLAY_STYLE)
            .union(DirtyBits::DIRTY_TOPOLOGY)),
        implied: Implied::CustomInUse(DirtyBits::CUSTOM_NORMALS_BITS),
    },
    PropagationRule {
        name: "topology rebuilds index ranges",
        trigger: Trigger::Any(DirtyBits::DIRTY_TOPOLOGY),
        implied: Implied::CustomInUse(DirtyBits::CUSTOM_INDEX_BITS),
    },
    PropagationRule {
        name: "cpu normals need points",
        trigger: Trigger::AnyWithCpuNormals(DirtyBits::CUSTOM_NORMALS_BITS),
        implied: Implied::Scene(DirtyBits::DIRTY_POINTS),
    },
];

/// Custom bits a prim has declared in use, plus propagation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyStateTracker {
    custom_in_use: DirtyBits,
}

impl DirtyStateTracker {
    /// Tracker with no custom bits in use
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom bits in use
    pub fn custom_in_use(&self) -> DirtyBits {
        self.custom_in_use
    }

    /// Declare custom `bits` in use; returns the ones that were not yet
    pub fn declare_in_use(&mut self, bits: DirtyBits) -> DirtyBits {
        let bits = bits & DirtyBits::ALL_CUSTOM_BITS;
        let newly = bits - self.custom_in_use;
        self.custom_in_use |= bits;
        newly
    }

    /// Declare `bit` in use and, if it was not yet, mark it dirty
    pub fn declare_and_mark(&mut self, bit: DirtyBits, dirty: &mut DirtyBits) {
        let newly = self.declare_in_use(bit);
        *dirty |= newly;
    }

    /// Set custom `bits` on `dirty`, limited to the ones in use
    pub fn mark_custom_dirty(&self, dirty: &mut DirtyBits, bits: DirtyBits) {
        *dirty |= bits & self.custom_in_use;
    }

    /// Expand raw scene edits into the full set of bits to sync
    ///
    /// Pure with respect to `bits`; `gpu_normals` selects whether normals are
    /// computed against the range instead of from the points source.
    pub fn propagate(&self, mut bits: DirtyBits, gpu_normals: bool) -> DirtyBits {
        for rule in &PROPAGATION_RULES {
            let fires = match rule.trigger {
                Trigger::Any(trigger) => bits.intersects(trigger),
                Trigger::AnyUnless(trigger, unless) => bits.intersects(trigger) && !bits.intersects(unless),
                Trigger::AnyWithCpuNormals(trigger) => !gpu_normals && bits.intersects(trigger),
            };
            if !fires {
                continue;
            }
            match rule.implied {
                Implied::Scene(implied) => bits |= implied,
                Implied::CustomInUse(implied) => self.mark_custom_dirty(&mut bits, implied),
            }
        }
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(bits: DirtyBits) -> DirtyStateTracker {
        let mut tracker = DirtyStateTracker::new();
        tracker.declare_in_use(bits);
        tracker
    }

    #[test]
    fn test_scene_and_custom_bits_are_disjoint() {
        assert!(!DirtyBits::ALL_SCENE_DIRTY_BITS.intersects(DirtyBits::ALL_CUSTOM_BITS));
        assert!(!DirtyBits::ALL_SCENE_DIRTY_BITS.contains(DirtyBits::VARYING));
    }

    #[test]
    fn test_subdiv_tags_imply_everything() {
        let bits = DirtyStateTracker::new().propagate(DirtyBits::DIRTY_SUBDIV_TAGS, true);
        assert!(bits.contains(
            DirtyBits::DIRTY_POINTS
                | DirtyBits::DIRTY_NORMALS
                | DirtyBits::DIRTY_PRIMVAR
                | DirtyBits::DIRTY_TOPOLOGY
                | DirtyBits::DIRTY_DISPLAY_STYLE
        ));
    }

    #[test]
    fn test_topology_implies_tags_and_display_style() {
        let bits = DirtyStateTracker::new().propagate(DirtyBits::DIRTY_TOPOLOGY, true);
        assert!(bits.contains(DirtyBits::DIRTY_SUBDIV_TAGS | DirtyBits::DIRTY_DISPLAY_STYLE));
        assert!(!bits.contains(DirtyBits::DIRTY_POINTS));
    }

    #[test]
    fn test_material_reevaluates_geometry() {
        let bits = DirtyStateTracker::new().propagate(DirtyBits::DIRTY_MATERIAL_ID, true);
        assert!(bits.contains(DirtyBits::DIRTY_POINTS | DirtyBits::DIRTY_PRIMVAR | DirtyBits::DIRTY_TOPOLOGY));
        // topology from the material rule comes after the topology rule
        assert!(!bits.contains(DirtyBits::DIRTY_SUBDIV_TAGS));
    }

    #[test]
    fn test_custom_bits_only_when_in_use() {
        let unused = DirtyStateTracker::new().propagate(DirtyBits::DIRTY_TOPOLOGY, true);
        assert!(!unused.intersects(DirtyBits::ALL_CUSTOM_BITS));

        let tracker = tracker_with(DirtyBits::DIRTY_HULL_INDICES | DirtyBits::DIRTY_FLAT_NORMALS);
        let bits = tracker.propagate(DirtyBits::DIRTY_TOPOLOGY, true);
        assert!(bits.contains(DirtyBits::DIRTY_HULL_INDICES | DirtyBits::DIRTY_FLAT_NORMALS));
        assert!(!bits.intersects(DirtyBits::DIRTY_INDICES | DirtyBits::DIRTY_SMOOTH_NORMALS));
    }

    #[test]
    fn test_points_dirty_normals_but_not_indices() {
        let tracker = tracker_with(DirtyBits::ALL_CUSTOM_BITS);
        let bits = tracker.propagate(DirtyBits::DIRTY_POINTS, true);
        assert!(bits.contains(DirtyBits::CUSTOM_NORMALS_BITS));
        assert!(!bits.intersects(DirtyBits::CUSTOM_INDEX_BITS));
    }

    #[test]
    fn test_cpu_normals_pull_points() {
        let tracker = tracker_with(DirtyBits::DIRTY_SMOOTH_NORMALS);
        let cpu = tracker.propagate(DirtyBits::DIRTY_DISPLAY_STYLE, false);
        assert!(cpu.contains(DirtyBits::DIRTY_POINTS | DirtyBits::DIRTY_SMOOTH_NORMALS));
        let gpu = tracker.propagate(DirtyBits::DIRTY_DISPLAY_STYLE, true);
        assert!(!gpu.contains(DirtyBits::DIRTY_POINTS));
    }

    #[test]
    fn test_propagation_is_pure() {
        let tracker = tracker_with(DirtyBits::ALL_CUSTOM_BITS);
        let once = tracker.propagate(DirtyBits::DIRTY_TOPOLOGY, false);
        assert_eq!(once, tracker.propagate(DirtyBits::DIRTY_TOPOLOGY, false));
        assert_eq!(tracker.propagate(DirtyBits::empty(), false), DirtyBits::empty());
    }

    #[test]
    fn test_declare_returns_new_bits_only() {
        let mut tracker = DirtyStateTracker::new();
        let mut dirty = DirtyBits::empty();
        tracker.declare_and_mark(DirtyBits::DIRTY_INDICES, &mut dirty);
        assert_eq!(dirty, DirtyBits::DIRTY_INDICES);

        dirty = DirtyBits::empty();
        tracker.declare_and_mark(DirtyBits::DIRTY_INDICES, &mut dirty);
        assert!(dirty.is_empty());
        assert!(tracker.declare_in_use(DirtyBits::DIRTY_TOPOLOGY).is_empty());
    }

    #[test]
    fn test_primvar_dirtiness_by_name() {
        let bits = DirtyBits::DIRTY_POINTS;
        assert!(bits.is_primvar_dirty("points"));
        assert!(!bits.is_primvar_dirty("displayColor"));
        assert!(DirtyBits::DIRTY_PRIMVAR.is_primvar_dirty("displayColor"));
        assert!(DirtyBits::DIRTY_WIDTHS.is_any_primvar_dirty());
        assert!(!DirtyBits::VARYING.is_dirty());
    }
}
