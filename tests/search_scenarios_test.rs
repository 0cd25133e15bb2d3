use flightcone::search::{SearchConfig, SearchState, l2_distance, path, reindex, search};
use flightcone::{HeightGrid, Node};
use std::f64::consts::FRAC_PI_2;

const CELL: f64 = 100.0;

fn grid_from_fn(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> HeightGrid {
    let mut heights = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            heights.push(f(r, c));
        }
    }
    HeightGrid::new(heights, rows, cols, CELL, (47.0, 48.0), (11.0, 12.0))
}

fn config(grid: HeightGrid, glide_ratio: f64, wind_direction: f64, wind_speed: f64) -> SearchConfig {
    SearchConfig {
        grid,
        glide_ratio,
        trim_speed: 10.0,
        wind_direction,
        wind_speed,
    }
}

fn is_reachable(state: &SearchState, ix: (usize, usize)) -> bool {
    state.explored.get(&ix).is_some_and(|node| node.reachable)
}

/// Line-of-sight re-check using the same sampling discipline as the
/// search: one probe per cell of segment length, indices floored.
fn sampled_segment_clears(node: &Node, reference: &Node, grid: &HeightGrid) -> bool {
    let length = l2_distance(node.ix, reference.ix);
    let samples = length.ceil() as usize;
    for k in 0..samples {
        let t = if samples > 1 {
            k as f64 / (samples - 1) as f64
        } else {
            0.0
        };
        let row = node.ix.0 as f64 + (reference.ix.0 as f64 - node.ix.0 as f64) * t;
        let col = node.ix.1 as f64 + (reference.ix.1 as f64 - node.ix.1 as f64) * t;
        let altitude = node.height + (reference.height - node.height) * t;
        if altitude < grid.get(row as usize, col as usize) {
            return false;
        }
    }
    true
}

#[test]
fn flat_terrain_cone_is_a_disk() {
    let grid = grid_from_fn(100, 100, |_, _| 0.0);
    let config = config(grid, 0.125, 0.0, 0.0);
    let start = (50, 50);
    let state = search(start, 500.0, &config);

    // Altitude budget of 500 m at 12.5 m per cell gives a 40-cell radius.
    for r in (0..100).step_by(7) {
        for c in (0..100).step_by(7) {
            let distance = l2_distance((r, c), start);
            if distance <= 38.0 {
                assert!(
                    is_reachable(&state, (r, c)),
                    "cell ({}, {}) at distance {:.1} should be reachable",
                    r,
                    c,
                    distance
                );
            } else if distance >= 41.0 {
                assert!(
                    !is_reachable(&state, (r, c)),
                    "cell ({}, {}) at distance {:.1} should be out of reach",
                    r,
                    c,
                    distance
                );
            }
        }
    }

    // Arrival altitude tracks the Euclidean glide line to within one cell
    // of descent.
    for (ix, node) in state.explored.iter().filter(|(_, n)| n.reachable) {
        let expected = 500.0 - l2_distance(*ix, start) * CELL * 0.125;
        assert!(
            (node.height - expected).abs() <= CELL * 0.125 + 1e-9,
            "cell {:?} arrived at {:.2}, expected {:.2}",
            ix,
            node.height,
            expected
        );
    }
}

#[test]
fn flat_terrain_cone_is_rotationally_symmetric() {
    let grid = grid_from_fn(61, 61, |_, _| 0.0);
    let config = config(grid, 0.125, 0.0, 0.0);
    let state = search((30, 30), 300.0, &config);

    for r in 0..61 {
        for c in 0..61 {
            let reachable = is_reachable(&state, (r, c));
            assert_eq!(reachable, is_reachable(&state, (60 - r, c)));
            assert_eq!(reachable, is_reachable(&state, (r, 60 - c)));
            assert_eq!(reachable, is_reachable(&state, (c, r)));
        }
    }
}

#[test]
fn wind_at_trim_speed_collapses_cone_to_downwind_half_plane() {
    let grid = grid_from_fn(41, 41, |_, _| 0.0);
    // Wind from the east at exactly trim speed.
    let config = config(grid, 0.125, FRAC_PI_2, 10.0);
    let start = (20, 20);
    let state = search(start, 500.0, &config);

    // Downwind (west) cells ride the doubled ground speed.
    assert!(is_reachable(&state, (20, 15)));
    assert!(is_reachable(&state, (20, 5)));

    // Due east is a dead headwind; due north and south are pure crosswind
    // that trim speed cannot crab against.
    for ix in [(20, 25), (20, 35), (25, 20), (35, 20), (15, 20), (5, 20)] {
        assert!(
            !is_reachable(&state, ix),
            "cell {:?} should not be reachable against the wind",
            ix
        );
    }

    // Quartering downwind directions stay open.
    assert!(is_reachable(&state, (25, 15)));
    assert!(is_reachable(&state, (15, 15)));
}

#[test]
fn sloped_terrain_limits_uphill_reach() {
    // Ground rising 2 m per cell eastward.
    let grid = grid_from_fn(21, 81, |_, c| 2.0 * c as f64);
    let config = config(grid, 0.1, 0.0, 0.0);
    let start = (10, 40);
    // 200 m above the 80 m ground at the start.
    let state = search(start, 280.0, &config);

    // Uphill: the 10 m/cell glide loss meets the rising ground near c=57.
    assert!(is_reachable(&state, (10, 50)));
    assert!(!is_reachable(&state, (10, 60)));

    // Downhill: the budget runs out near c=15.
    assert!(is_reachable(&state, (10, 30)));
    assert!(!is_reachable(&state, (10, 12)));
}

#[test]
fn terrain_wall_shadows_cells_behind_it() {
    let mut grid = grid_from_fn(21, 21, |_, _| 0.0);
    for c in 0..21 {
        let ix = 14 * 21 + c;
        grid.heights[ix] = 1000.0;
    }
    let config = config(grid, 0.125, 0.0, 0.0);
    let start = (10, 10);
    let state = search(start, 300.0, &config);

    // Everything on the launch side of the wall is in easy reach.
    assert!(is_reachable(&state, (13, 10)));
    assert!(is_reachable(&state, (2, 10)));

    // The wall itself towers above the glide line.
    assert!(!is_reachable(&state, (14, 10)));

    // Cells behind the wall have no terrain-clearing route at all.
    for c in [0, 5, 10, 15, 20] {
        for r in [15, 16, 18, 20] {
            assert!(
                !is_reachable(&state, (r, c)),
                "cell ({}, {}) is shadowed by the wall",
                r,
                c
            );
        }
    }
}

#[test]
fn straight_references_collapse_to_the_earliest_anchor() {
    let grid = grid_from_fn(41, 41, |_, _| 0.0);
    let config = config(grid, 0.125, 0.0, 0.0);
    let start = (20, 20);
    let state = search(start, 300.0, &config);

    // Cells along a cardinal axis anchor directly at the start, not at
    // their immediate neighbor.
    for c in 21..=30 {
        assert_eq!(state.explored[&(20, c)].reference, Some(start));
    }
    for r in 10..=19 {
        assert_eq!(state.explored[&(r, 20)].reference, Some(start));
    }
}

#[test]
fn isolated_start_yields_single_cell_grid() {
    let mut grid = grid_from_fn(15, 15, |_, _| 800.0);
    grid.heights[7 * 15 + 7] = 100.0;
    let config = config(grid, 0.125, 0.0, 0.0);
    let state = search((7, 7), 110.0, &config);

    let (state, grid) = reindex(state, config.grid);
    assert_eq!(grid.rows, 1);
    assert_eq!(grid.cols, 1);
    assert_eq!(state.explored.len(), 1);
    assert!(state.explored[&(0, 0)].reachable);
}

#[test]
fn explored_nodes_satisfy_search_invariants() {
    let grid = grid_from_fn(41, 41, |r, c| {
        // Gentle bumps so the terrain is not trivial.
        20.0 * ((r as f64 / 5.0).sin() + (c as f64 / 7.0).cos() + 2.0)
    });
    let config = config(grid, 0.125, 0.3, 4.0);
    let start = (20, 20);
    let state = search(start, 400.0, &config);

    assert_eq!(state.queue.len(), 0, "frontier must drain");

    for (ix, node) in &state.explored {
        assert_eq!(*ix, node.ix);

        // Reachability is exactly "arrival clears the ground".
        assert_eq!(node.reachable, node.height > config.grid.height_at(*ix));

        if let Some(reference) = node.reference {
            let anchor = state.explored[&reference];
            // Altitude monotonicity along the reference segment.
            assert!(node.height <= anchor.height + 1e-9);
            let segment = l2_distance(*ix, reference) * config.grid.cell_size;
            let expected = anchor.height - segment * node.effective_glide_ratio;
            assert!(
                (node.height - expected).abs() < 1e-6,
                "cell {:?}: height {:.3} does not match anchor-derived {:.3}",
                ix,
                node.height,
                expected
            );
        }
    }

    // Every reachable node's reference chain closes at the start without
    // cycling.
    for (ix, node) in state.explored.iter().filter(|(_, n)| n.reachable) {
        let mut hops = 0;
        let mut current = *node;
        while let Some(reference) = current.reference {
            current = state.explored[&reference];
            hops += 1;
            assert!(hops <= 41 * 41, "reference cycle at {:?}", ix);
        }
        assert_eq!(current.ix, start);
    }
}

#[test]
fn reachable_segments_clear_the_terrain() {
    // Sloped terrain: altitude margin is linear along any segment, so a
    // clear pair of endpoints guarantees a clear segment, and the sampled
    // re-check must agree with the search.
    let slope = grid_from_fn(21, 81, |_, c| 2.0 * c as f64);
    let slope_config = config(slope, 0.1, 0.0, 0.0);
    let slope_state = search((10, 40), 280.0, &slope_config);

    // Walled terrain: anchors and targets share the launch side, so no
    // segment can touch the wall.
    let mut walled = grid_from_fn(21, 21, |_, _| 0.0);
    for c in 0..21 {
        walled.heights[14 * 21 + c] = 1000.0;
    }
    let wall_config = config(walled, 0.125, 0.0, 0.0);
    let wall_state = search((10, 10), 300.0, &wall_config);

    for (state, grid) in [
        (&slope_state, &slope_config.grid),
        (&wall_state, &wall_config.grid),
    ] {
        for node in state.explored.values().filter(|n| n.reachable) {
            if let Some(reference) = node.reference {
                let anchor = state.explored[&reference];
                assert!(
                    sampled_segment_clears(node, &anchor, grid),
                    "segment into {:?} passes through terrain",
                    node.ix
                );
            }
        }
    }
}

#[test]
fn reindex_crops_to_reachable_bounding_box() {
    let grid = grid_from_fn(61, 61, |_, _| 0.0);
    let config = config(grid, 0.125, 0.0, 0.0);
    let state = search((30, 30), 250.0, &config);
    let (state, cropped) = reindex(state, config.grid);

    // 250 m at 12.5 m/cell reaches just under 20 cells out.
    assert!(cropped.rows < 61);
    assert!(cropped.rows >= 39);
    assert_eq!(cropped.rows, cropped.cols);

    let start = (cropped.rows / 2, cropped.cols / 2);
    assert!(state.explored[&start].reference.is_none());

    // Paths still resolve in the cropped frame.
    let edge = (start.0, cropped.cols - 1);
    if state.explored.contains_key(&edge) {
        let nodes = path(edge, &state.explored);
        assert_eq!(nodes.last().unwrap().ix, start);
    }
}
