//! 3-D spatial index over radio positions.
//!
//! Testing all O(n^2) radio pairs at every timestep of a large
//! constellation is prohibitive; the k-d tree reduces candidate generation
//! to near-linear. The tree is rebuilt from scratch whenever the builder
//! advances its clock: node positions change continuously and incremental
//! maintenance is not attempted.

use std::cmp::Ordering;
use std::collections::HashMap;

use nalgebra::Vector3;

use contact_plan::NodeId;
use link_physics::calc_geom_constr_radius;

use crate::{RadioNode, Result};

/// Relative inflation applied to every search radius.
pub const SEARCH_RADIUS_INFLATION: f64 = 0.01;
/// Fixed inflation offset (km). Together with the 1% above this absorbs
/// rounding in the geometric radius calculation; candidates are re-checked
/// against the exact pairwise radius afterwards.
pub const SEARCH_RADIUS_OFFSET_KM: f64 = 1.0;

/// One radio in the index: current position plus identity.
#[derive(Debug, Clone)]
pub struct RadioPoint {
    pub node_id: NodeId,
    /// ECI position (km)
    pub position_km: Vector3<f64>,
}

#[derive(Debug)]
struct TreeNode {
    point: RadioPoint,
    left: Option<usize>,
    right: Option<usize>,
}

/// The k-d tree itself. Axes cycle x, y, z by depth.
#[derive(Debug, Default)]
pub struct RadioTree {
    nodes: Vec<TreeNode>,
    root: Option<usize>,
    index_of: HashMap<NodeId, usize>,
}

impl RadioTree {
    /// Build a fresh tree from the current position of every radio,
    /// discarding any previous tree. Median-split construction, O(n log n).
    pub fn build(mut points: Vec<RadioPoint>) -> Self {
        let mut tree = Self {
            nodes: Vec::with_capacity(points.len()),
            root: None,
            index_of: HashMap::with_capacity(points.len()),
        };
        tree.root = tree.build_recursive(&mut points, 0);
        tree
    }

    fn build_recursive(&mut self, points: &mut [RadioPoint], depth: usize) -> Option<usize> {
        if points.is_empty() {
            return None;
        }
        let axis = depth % 3;
        let mid = points.len() / 2;
        points.select_nth_unstable_by(mid, |a, b| {
            a.position_km[axis]
                .partial_cmp(&b.position_km[axis])
                .unwrap_or(Ordering::Equal)
        });

        let point = points[mid].clone();
        let node_index = self.nodes.len();
        self.index_of.insert(point.node_id, node_index);
        self.nodes.push(TreeNode {
            point,
            left: None,
            right: None,
        });

        let (left_half, rest) = points.split_at_mut(mid);
        let left = self.build_recursive(left_half, depth + 1);
        let right = self.build_recursive(&mut rest[1..], depth + 1);
        self.nodes[node_index].left = left;
        self.nodes[node_index].right = right;
        Some(node_index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn position_of(&self, node_id: NodeId) -> Option<Vector3<f64>> {
        self.index_of
            .get(&node_id)
            .map(|&i| self.nodes[i].point.position_km)
    }

    /// All radios within `search_radius_km` of the given radio, with their
    /// squared distances (km^2). Unsorted: callers only need the candidate
    /// set and the sorting cost is saved. The radius is inflated by 1% plus
    /// a fixed 1 km offset; see the module constants.
    pub fn unsorted_radius_search(
        &self,
        node_id: NodeId,
        search_radius_km: f64,
    ) -> Vec<(NodeId, f64)> {
        let Some(&idx) = self.index_of.get(&node_id) else {
            return Vec::new();
        };
        let center = self.nodes[idx].point.position_km;
        let inflated =
            search_radius_km * (1.0 + SEARCH_RADIUS_INFLATION) + SEARCH_RADIUS_OFFSET_KM;
        let mut hits = Vec::new();
        self.search_recursive(
            self.root,
            0,
            &center,
            inflated,
            inflated * inflated,
            node_id,
            &mut hits,
        );
        hits
    }

    #[allow(clippy::too_many_arguments)]
    fn search_recursive(
        &self,
        node: Option<usize>,
        depth: usize,
        center: &Vector3<f64>,
        radius: f64,
        radius_sq: f64,
        skip_id: NodeId,
        out: &mut Vec<(NodeId, f64)>,
    ) {
        let Some(i) = node else { return };
        let n = &self.nodes[i];

        let distance_sq = (n.point.position_km - center).norm_squared();
        if distance_sq <= radius_sq && n.point.node_id != skip_id {
            out.push((n.point.node_id, distance_sq));
        }

        let axis = depth % 3;
        let delta = center[axis] - n.point.position_km[axis];
        let (near, far) = if delta <= 0.0 {
            (n.left, n.right)
        } else {
            (n.right, n.left)
        };
        self.search_recursive(near, depth + 1, center, radius, radius_sq, skip_id, out);
        // the far side can only contain hits when the splitting plane is
        // within the search radius
        if delta.abs() <= radius {
            self.search_recursive(far, depth + 1, center, radius, radius_sq, skip_id, out);
        }
    }
}

/// Maximum distance at which `a` could possibly reach `b` at time `sim_s`:
/// the smaller of the physical link-budget range and the geometric
/// line-of-sight bound, so a link never reaches through the Earth even if
/// the budget alone would allow it. Without a noise floor the physical
/// model is unavailable and the geometric bound stands alone.
pub fn compute_comm_radius(a: &RadioNode, b: &RadioNode, sim_s: f64) -> Result<f64> {
    let physical = a.radio.max_comm_range_km(&b.radio);
    let geometric = geometric_bound(a, b, sim_s)?;
    Ok(match physical {
        Some(p) => p.min(geometric),
        None => geometric,
    })
}

/// Line-of-sight bound for the pair: the larger single-ended horizon of the
/// two endpoints, doubled for inter-satellite links (both ends may be near
/// apogee simultaneously).
fn geometric_bound(a: &RadioNode, b: &RadioNode, sim_s: f64) -> Result<f64> {
    let is_isl = !a.is_ground_station && !b.is_ground_station;
    let bound_a = endpoint_bound(a, sim_s, is_isl)?;
    let bound_b = endpoint_bound(b, sim_s, is_isl)?;
    Ok(bound_a.max(bound_b))
}

fn endpoint_bound(node: &RadioNode, sim_s: f64, is_isl: bool) -> Result<f64> {
    let (a_km, e) = match node.propagator.kepler_shape() {
        Some(shape) => shape,
        None => {
            // no Kepler model: derive instantaneous elements from the state
            // via vis-viva and the eccentricity vector
            let state = node.propagator.state_at(sim_s)?;
            (state.semi_major_axis_km(), state.eccentricity())
        }
    };
    Ok(calc_geom_constr_radius(a_km, e, is_isl))
}
