use anyhow::Result;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::glide::{EffectiveGlide, effective_glide, effective_wind_angle, travel_bearing};
use crate::grid::{HeightGrid, height_at_point, height_data_around_point, linspace};
use crate::pqueue::IndexedPriorityQueue;
use crate::tiles::TileStore;

/// Cell address in a height grid: `(row, col)` with row 0 at the south.
pub type GridIndex = (usize, usize);

/// One explored or frontier cell of the glide search.
///
/// `reference` names the anchor of the straight glide segment that ends at
/// this cell; following references leads back to the start cell. Nodes are
/// finalized when popped from the queue and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    /// Arrival altitude MSL in meters.
    pub height: f64,
    pub ix: GridIndex,
    /// Anchor of the straight segment ending here; `None` only for the
    /// start cell and for sentinel closures.
    pub reference: Option<GridIndex>,
    /// Cumulative path length from the start in meters.
    pub distance: f64,
    /// Whether the arrival altitude clears the ground at this cell.
    pub reachable: bool,
    /// Glide ratio used on the final segment, for diagnostics.
    pub effective_glide_ratio: f64,
}

/// Mutable state of one search run.
pub struct SearchState {
    pub explored: HashMap<GridIndex, Node>,
    pub queue: IndexedPriorityQueue<Node, GridIndex>,
    /// Per-cell count of line-of-sight terrain probes, for diagnostics.
    pub intersection_checks: Vec<u64>,
    cols: usize,
}

impl SearchState {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            explored: HashMap::new(),
            queue: IndexedPriorityQueue::new(),
            intersection_checks: vec![0; rows * cols],
            cols,
        }
    }

    pub fn checks_at(&self, ix: GridIndex) -> u64 {
        self.intersection_checks[ix.0 * self.cols + ix.1]
    }

    fn add_checks(&mut self, ix: GridIndex, count: u64) {
        self.intersection_checks[ix.0 * self.cols + ix.1] += count;
    }
}

/// Immutable parameters of one search run.
pub struct SearchConfig {
    pub grid: HeightGrid,
    /// Still-air altitude lost per meter of ground track.
    pub glide_ratio: f64,
    /// Airspeed at best-glide trim, m/s.
    pub trim_speed: f64,
    /// Direction the wind comes from, radians clockwise from north.
    pub wind_direction: f64,
    pub wind_speed: f64,
}

impl SearchConfig {
    /// Glide performance for the segment whose anchor is `to`, evaluated
    /// in the `from → to` direction.
    pub fn effective_glide_between(&self, from: GridIndex, to: GridIndex) -> EffectiveGlide {
        if self.wind_speed == 0.0 {
            return EffectiveGlide {
                speed: self.trim_speed,
                glide_ratio: self.glide_ratio,
            };
        }
        let angle = effective_wind_angle(self.wind_direction, travel_bearing(from, to));
        effective_glide(angle, self.wind_speed, self.trim_speed, self.glide_ratio)
    }
}

/// Search parameters as supplied by a caller.
#[derive(Debug, Clone)]
pub struct GlideQuery {
    pub glide_ratio: f64,
    pub trim_speed: f64,
    /// Radians, meteorological convention.
    pub wind_direction: f64,
    pub wind_speed: f64,
    /// Meters added to the ground elevation at the start.
    pub additional_height: f64,
}

pub fn neighbor_indices(ix: GridIndex, rows: usize, cols: usize) -> Vec<GridIndex> {
    let (row, col) = (ix.0 as isize, ix.1 as isize);
    [(1, 0), (-1, 0), (0, 1), (0, -1)]
        .iter()
        .map(|(dr, dc)| (row + dr, col + dc))
        .filter(|&(r, c)| r >= 0 && (r as usize) < rows && c >= 0 && (c as usize) < cols)
        .map(|(r, c)| (r as usize, c as usize))
        .collect()
}

pub fn l2_distance(a: GridIndex, b: GridIndex) -> f64 {
    let dr = a.0 as f64 - b.0 as f64;
    let dc = a.1 as f64 - b.1 as f64;
    (dr * dr + dc * dc).sqrt()
}

fn l2_diff(a: GridIndex, b: GridIndex) -> (isize, isize) {
    (a.0 as isize - b.0 as isize, a.1 as isize - b.1 as isize)
}

fn is_straight(diff: (isize, isize)) -> bool {
    diff.0 == 0 || diff.1 == 0
}

/// Whether `point` lies on the cardinal segment between `start` and `end`.
fn is_in_line(point: GridIndex, start: GridIndex, end: GridIndex) -> bool {
    if point.0 == start.0 && point.0 == end.0 {
        point.1 >= start.1.min(end.1) && point.1 <= start.1.max(end.1)
    } else if point.1 == start.1 && point.1 == end.1 {
        point.0 >= start.0.min(end.0) && point.0 <= start.0.max(end.0)
    } else {
        false
    }
}

/// Walk the reference chain backwards while it stays on the cardinal line
/// through `ix`, collapsing staircases of cell-by-cell propagations into a
/// single straight segment.
///
/// A hop is only taken when the current node itself lies between `ix` and
/// the ancestor, so every compressed step was already validated when the
/// chain was built; ancestors merely sharing a row or column with `ix` are
/// not adopted.
fn straight_line_ref(
    ix: GridIndex,
    node: &Node,
    explored: &HashMap<GridIndex, Node>,
) -> Node {
    let mut current = *node;
    while let Some(reference) = current.reference {
        if is_straight(l2_diff(reference, ix)) && is_in_line(current.ix, ix, reference) {
            current = explored[&reference];
        } else {
            break;
        }
    }
    current
}

/// Common anchor of two reference paths, if their segments meet.
///
/// The paths intersect when both neighbors share a reference, or when one
/// neighbor's segment is cardinal and the other's reference lies on it.
fn ref_paths_intersection(
    ix_1: GridIndex,
    ref_1: Option<GridIndex>,
    ix_2: GridIndex,
    ref_2: Option<GridIndex>,
) -> Option<GridIndex> {
    if ref_1 == ref_2 {
        return ref_1;
    }
    let (r1, r2) = match (ref_1, ref_2) {
        (Some(r1), Some(r2)) => (r1, r2),
        _ => return None,
    };

    if is_straight(l2_diff(ix_1, r1)) && is_in_line(r2, ix_1, r1) {
        return Some(r2);
    }
    if is_straight(l2_diff(ix_2, r2)) && is_in_line(r1, ix_2, r2) {
        return Some(r1);
    }
    None
}

/// Line-of-sight test from the anchor `to` down to `ix`.
///
/// The terrain is sampled at one point per cell of segment length and
/// compared against the straight glide line from the anchor's altitude.
/// Returns whether any sample pokes above the glide line, plus the number
/// of probes taken. An unflyable direction counts as intersecting.
fn is_line_intersecting(
    to: &Node,
    ix: GridIndex,
    config: &SearchConfig,
    glide_ratio: f64,
) -> (bool, u64) {
    if !glide_ratio.is_finite() {
        return (true, 0);
    }

    let length = l2_distance(to.ix, ix);
    let samples = length.ceil() as usize;

    let rows = linspace(ix.0 as f64, to.ix.0 as f64, samples);
    let cols = linspace(ix.1 as f64, to.ix.1 as f64, samples);
    let glide_heights = linspace(
        to.height - length * config.grid.cell_size * glide_ratio,
        to.height,
        samples,
    );

    let mut intersecting = false;
    for k in 0..samples {
        let terrain = config.grid.get(rows[k] as usize, cols[k] as usize);
        if glide_heights[k] < terrain {
            intersecting = true;
            break;
        }
    }
    (intersecting, samples as u64)
}

/// Propagate a candidate for `ix` from a single explored neighbor.
///
/// When the wind is strong enough to make glide performance directional,
/// or when the caller forces it, the neighbor's anchor is adopted directly
/// after a line-of-sight check; otherwise the segment extends cell by cell
/// and staircases are collapsed through `straight_line_ref`.
fn update_one_neighbor(
    neighbor: &Node,
    ix: GridIndex,
    check_intersection: bool,
    config: &SearchConfig,
    state: &mut SearchState,
) {
    if !neighbor.reachable {
        return;
    }

    let mut anchor = *neighbor;
    if let Some(reference) = neighbor.reference {
        if check_intersection || config.wind_speed >= config.trim_speed {
            // A pending candidate already anchored there cannot improve.
            if let Some(pending) = state.queue.get(&ix) {
                if pending.item.reference == Some(reference) {
                    return;
                }
            }
            let reference_node = state.explored[&reference];
            let glide = config.effective_glide_between(ix, reference);
            let (intersecting, probes) =
                is_line_intersecting(&reference_node, ix, config, glide.glide_ratio);
            state.add_checks(ix, probes);
            if !intersecting {
                anchor = reference_node;
            }
        }
    }

    let glide = config.effective_glide_between(ix, anchor.ix);
    if !glide.is_reachable() {
        return;
    }

    let segment = l2_distance(ix, anchor.ix) * config.grid.cell_size;
    let height = anchor.height - segment * glide.glide_ratio;
    let reachable = config.grid.height_at(ix) < height;
    let back_reference = straight_line_ref(ix, &anchor, &state.explored).ix;

    state.queue.update_if_less(
        ix,
        Node {
            height,
            ix,
            reference: Some(back_reference),
            distance: segment + anchor.distance,
            reachable,
            effective_glide_ratio: glide.glide_ratio,
        },
        -height,
    );
}

/// Propagate a candidate for `ix` from two explored neighbors.
fn update_two_neighbors(
    neighbor_1: Node,
    neighbor_2: Node,
    ix: GridIndex,
    config: &SearchConfig,
    state: &mut SearchState,
) {
    if neighbor_1.reachable && neighbor_2.reachable {
        let intersection = ref_paths_intersection(
            neighbor_1.ix,
            neighbor_1.reference,
            neighbor_2.ix,
            neighbor_2.reference,
        );
        if let Some(anchor_ix) = intersection {
            let anchor = state.explored[&anchor_ix];
            let glide = config.effective_glide_between(ix, anchor_ix);
            if !glide.is_reachable() {
                return;
            }
            let segment = l2_distance(ix, anchor_ix) * config.grid.cell_size;
            let height = anchor.height - segment * glide.glide_ratio;
            let reachable = config.grid.height_at(ix) < height;

            state.queue.update_if_less(
                ix,
                Node {
                    height,
                    ix,
                    reference: Some(anchor_ix),
                    distance: segment + anchor.distance,
                    reachable,
                    effective_glide_ratio: glide.glide_ratio,
                },
                -height,
            );
        } else {
            // Distinct reference paths: try both anchors, validating each
            // against the terrain.
            update_one_neighbor(&neighbor_1, ix, true, config, state);
            update_one_neighbor(&neighbor_2, ix, true, config, state);
        }
    } else if neighbor_1.reachable {
        update_one_neighbor(&neighbor_1, ix, false, config, state);
    } else if neighbor_2.reachable {
        update_one_neighbor(&neighbor_2, ix, false, config, state);
    }
}

fn reachable_nodes(
    explored_neighbors: &[GridIndex],
    state: &SearchState,
) -> Vec<Node> {
    explored_neighbors
        .iter()
        .map(|ix| state.explored[ix])
        .filter(|node| node.reachable)
        .collect()
}

fn distinct_references(nodes: &[Node]) -> usize {
    nodes
        .iter()
        .map(|node| node.reference)
        .collect::<HashSet<_>>()
        .len()
}

fn update_three_neighbors(
    explored_neighbors: &[GridIndex],
    ix: GridIndex,
    config: &SearchConfig,
    state: &mut SearchState,
) {
    let mut reachable = reachable_nodes(explored_neighbors, state);
    match reachable.len() {
        0 => {}
        1 => update_one_neighbor(&reachable[0], ix, false, config, state),
        2 => update_two_neighbors(reachable[0], reachable[1], ix, config, state),
        _ => match distinct_references(&reachable) {
            3 => {
                // Three independent paths meet here; closest first.
                reachable.sort_by(|a, b| a.distance.total_cmp(&b.distance));
                for node in &reachable {
                    update_one_neighbor(node, ix, false, config, state);
                }
            }
            2 => {
                let mut groups: HashMap<Option<GridIndex>, Vec<Node>> = HashMap::new();
                for node in &reachable {
                    groups.entry(node.reference).or_default().push(*node);
                }
                for group in groups.values() {
                    match group.as_slice() {
                        [single] => update_one_neighbor(single, ix, false, config, state),
                        [first, second] => {
                            update_two_neighbors(*first, *second, ix, config, state)
                        }
                        _ => {}
                    }
                }
            }
            // All three share an anchor: the two-neighbor case already
            // produced the dominating candidate.
            _ => {}
        },
    }
}

fn update_four_neighbors(
    explored_neighbors: &[GridIndex],
    ix: GridIndex,
    config: &SearchConfig,
    state: &mut SearchState,
) {
    let mut reachable = reachable_nodes(explored_neighbors, state);
    if reachable.is_empty() {
        // Fully enclosed by unreachable cells; close the cell so the
        // frontier can never revisit it.
        state.queue.update_if_less(
            ix,
            Node {
                height: 0.0,
                ix,
                reference: None,
                distance: 0.0,
                reachable: false,
                effective_glide_ratio: f64::INFINITY,
            },
            -0.0,
        );
    } else if reachable.len() < 4 {
        update_three_neighbors(explored_neighbors, ix, config, state);
    } else if distinct_references(&reachable) == 4 {
        // Four independent paths; only the lowest arrival can still gain
        // from a fresh propagation.
        reachable.sort_by(|a, b| a.height.total_cmp(&b.height));
        update_one_neighbor(&reachable[0], ix, false, config, state);
    }
    // Shared-reference mixes were already covered by earlier expansions.
}

fn update_node(ix: GridIndex, config: &SearchConfig, state: &mut SearchState) {
    let explored_neighbors: Vec<GridIndex> =
        neighbor_indices(ix, config.grid.rows, config.grid.cols)
            .into_iter()
            .filter(|neighbor| state.explored.contains_key(neighbor))
            .collect();

    match explored_neighbors.len() {
        1 => {
            let neighbor = state.explored[&explored_neighbors[0]];
            update_one_neighbor(&neighbor, ix, false, config, state);
        }
        2 => {
            let neighbor_1 = state.explored[&explored_neighbors[0]];
            let neighbor_2 = state.explored[&explored_neighbors[1]];
            update_two_neighbors(neighbor_1, neighbor_2, ix, config, state);
        }
        3 => update_three_neighbors(&explored_neighbors, ix, config, state),
        4 => update_four_neighbors(&explored_neighbors, ix, config, state),
        _ => {}
    }
}

/// Run the reachability search from `start` at altitude `start_height`.
///
/// Best-first expansion over the 4-connected grid: the frontier cell with
/// the highest arrival altitude is finalized next, and each finalization
/// re-proposes candidates for its unexplored neighbors. Terminates when
/// the frontier empties; every cell is finalized at most once.
pub fn search(start: GridIndex, start_height: f64, config: &SearchConfig) -> SearchState {
    let mut state = SearchState::new(config.grid.rows, config.grid.cols);
    state
        .queue
        .put(
            start,
            Node {
                height: start_height,
                ix: start,
                reference: None,
                distance: 0.0,
                reachable: true,
                effective_glide_ratio: config.glide_ratio,
            },
            -start_height,
        )
        .expect("queue starts empty");

    let mut iterations = 0u64;
    while let Some(entry) = state.queue.pop() {
        if iterations % 500 == 0 {
            debug!(
                "explored {} cells, queue size {}",
                state.explored.len(),
                state.queue.len()
            );
        }
        state.explored.insert(entry.key, entry.item);

        for neighbor in neighbor_indices(entry.key, config.grid.rows, config.grid.cols) {
            if !state.explored.contains_key(&neighbor) {
                update_node(neighbor, config, &mut state);
            }
        }
        iterations += 1;
    }
    state
}

/// Crop the search result to the bounding box of reachable cells,
/// translating every cell index and reference into the cropped frame.
///
/// With no reachable cells the result is an empty grid; callers must
/// tolerate that.
pub fn reindex(state: SearchState, grid: HeightGrid) -> (SearchState, HeightGrid) {
    let mut bounds: Option<(usize, usize, usize, usize)> = None;
    for node in state.explored.values().filter(|node| node.reachable) {
        let (row, col) = node.ix;
        bounds = Some(match bounds {
            None => (row, row, col, col),
            Some((r0, r1, c0, c1)) => (r0.min(row), r1.max(row), c0.min(col), c1.max(col)),
        });
    }

    let Some((r0, r1, c0, c1)) = bounds else {
        let empty = HeightGrid::new(
            Vec::new(),
            0,
            0,
            grid.cell_size,
            grid.latitudes,
            grid.longitudes,
        );
        return (SearchState::new(0, 0), empty);
    };

    let cropped = grid.crop((r0, r1), (c0, c1));
    let mut out = SearchState::new(cropped.rows, cropped.cols);

    let translate = |ix: GridIndex| -> Option<GridIndex> {
        if ix.0 >= r0 && ix.0 <= r1 && ix.1 >= c0 && ix.1 <= c1 {
            Some((ix.0 - r0, ix.1 - c0))
        } else {
            None
        }
    };

    for (ix, node) in &state.explored {
        if let Some(new_ix) = translate(*ix) {
            out.explored.insert(
                new_ix,
                Node {
                    ix: new_ix,
                    reference: node.reference.and_then(translate),
                    ..*node
                },
            );
        }
    }

    for row in r0..=r1 {
        for col in c0..=c1 {
            let count = state.checks_at((row, col));
            out.intersection_checks[(row - r0) * cropped.cols + (col - c0)] = count;
        }
    }

    (out, cropped)
}

/// Run a glide reachability search around a geographic point.
///
/// Samples the ground at the start, estimates the furthest possible reach
/// from the best-case glide ratio, assembles a height grid of that radius,
/// resamples it to the requested cell size, searches from the grid center,
/// and crops the result to the reachable set.
pub fn search_from_point(
    store: &TileStore,
    latitude: f64,
    longitude: f64,
    cell_size: f64,
    query: &GlideQuery,
) -> Result<(SearchState, HeightGrid)> {
    let start_height = height_at_point(store, latitude, longitude)? + query.additional_height;

    // Altitude over ground far away is unknown, so assume the best case:
    // a full tailwind all the way down to sea level.
    let best_case_ratio =
        query.glide_ratio / ((query.wind_speed + query.trim_speed) / query.trim_speed);
    let max_distance = start_height / best_case_ratio;

    let grid = height_data_around_point(store, latitude, longitude, max_distance + 1.0)?;

    let mut target_cell_size = cell_size;
    if cell_size < grid.cell_size {
        warn!(
            "requested cell size {:.1} m is below the native resolution {:.1} m, clamping",
            cell_size, grid.cell_size
        );
        target_cell_size = grid.cell_size;
    }
    let grid = grid.downsample(grid.cell_size / target_cell_size);

    let start = (grid.rows / 2, grid.cols / 2);
    let config = SearchConfig {
        grid,
        glide_ratio: query.glide_ratio,
        trim_speed: query.trim_speed,
        wind_direction: query.wind_direction,
        wind_speed: query.wind_speed,
    };

    let state = search(start, start_height, &config);
    let SearchConfig { grid, .. } = config;
    Ok(reindex(state, grid))
}

/// The piecewise-linear glide path from `ix` back to the start cell.
pub fn path(ix: GridIndex, explored: &HashMap<GridIndex, Node>) -> Vec<Node> {
    let mut node = explored[&ix];
    let mut result = vec![node];
    while let Some(reference) = node.reference {
        node = explored[&reference];
        result.push(node);
    }
    result
}

/// Length of the glide path to `ix` in grid-cell units.
pub fn path_length(ix: GridIndex, explored: &HashMap<GridIndex, Node>) -> f64 {
    let nodes = path(ix, explored);
    nodes
        .windows(2)
        .map(|pair| l2_distance(pair[0].ix, pair[1].ix))
        .sum()
}
