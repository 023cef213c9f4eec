// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

use itertools::Itertools;
use netsim_topology::config::{TopologyConfig, TopologyKind};
use netsim_topology::torus::Torus;
use netsim_topology::{RoutingPath, StructuredTopology, Topology};

fn torus(dims: &[usize]) -> Torus {
    Torus::new(dims, &[], 1).unwrap()
}

/// Walk a route, returning the coordinates reached and the (outport, vc) used
/// for every hop.
fn walk(torus: &Torus, src: &[usize], dst: &[usize]) -> Vec<(Vec<usize>, usize, usize)> {
    let src = torus.switch_number(src).unwrap();
    let dst = torus.switch_number(dst).unwrap();
    let mut hops = Vec::new();
    let mut path = RoutingPath::default();
    let mut current = src;
    while current != dst {
        torus.minimal_route_to_switch(current, dst, &mut path);
        let next = torus.neighbor_at_port(current, path.outport).unwrap();
        current = torus.switch_number(&next).unwrap();
        hops.push((next, path.outport, path.vc));
        assert!(hops.len() <= torus.num_switches(), "routing loop");
    }
    hops
}

#[test]
fn coordinates_bijection() {
    let dims = [3, 4, 2];
    let t = torus(&dims);
    assert_eq!(t.num_switches(), 24);
    for id in 0..t.num_switches() {
        assert_eq!(t.switch_number(&t.compute_switch_coords(id)).unwrap(), id);
    }
    for coords in dims.iter().map(|&d| 0..d).multi_cartesian_product() {
        let id = t.switch_number(&coords).unwrap();
        assert_eq!(t.compute_switch_coords(id), coords);
    }
}

#[test]
fn bad_coordinates() {
    let t = torus(&[4, 4]);
    assert!(t.switch_number(&[4, 0]).is_err());
    assert!(t.switch_number(&[1]).is_err());
    assert!(t.switch_number(&[1, 1, 0]).is_err());
}

/// (0,0) -> (2,2) on a 4x4 torus: both dimensions are a tie so both are
/// travelled in the positive direction, dimension 0 first, without wrapping.
#[test]
fn four_by_four_tie() {
    let t = torus(&[4, 4]);
    let src = t.switch_number(&[0, 0]).unwrap();
    let dst = t.switch_number(&[2, 2]).unwrap();
    assert_eq!(t.minimal_distance(src, dst), 4);

    let hops = walk(&t, &[0, 0], &[2, 2]);
    assert_eq!(
        hops,
        vec![
            (vec![1, 0], 0, 0),
            (vec![2, 0], 0, 0),
            (vec![2, 1], 2, 0),
            (vec![2, 2], 2, 0),
        ]
    );
}

/// Crossing the positive wrap-around link moves to VC 1 up to and including
/// the hop that reaches the destination coordinate.
#[test]
fn positive_wrap_uses_escape_channel() {
    let t = torus(&[4, 4]);
    let hops = walk(&t, &[3, 0], &[1, 3]);
    assert_eq!(
        hops,
        vec![
            (vec![0, 0], 0, 1),
            (vec![1, 0], 0, 1),
            (vec![1, 3], 3, 1),
        ]
    );
}

/// The negative direction wraps when leaving coordinate 0.
#[test]
fn negative_wrap_uses_escape_channel() {
    let t = torus(&[5]);
    let hops = walk(&t, &[1], &[4]);
    assert_eq!(hops, vec![(vec![0], 1, 0), (vec![4], 1, 1)]);
}

/// The flags of one dimension do not leak into the next.
#[test]
fn flags_reset_per_dimension() {
    let t = torus(&[3, 3]);
    let hops = walk(&t, &[2, 0], &[0, 1]);
    assert_eq!(hops, vec![(vec![0, 0], 0, 1), (vec![0, 1], 2, 0)]);
}

/// Routes are minimal, dimension-ordered and only use VC 1 after a wrap.
#[test]
fn all_pairs_three_dimensions() {
    let dims = [3, 4, 2];
    let t = torus(&dims);
    for src in 0..t.num_switches() {
        for dst in 0..t.num_switches() {
            if src == dst {
                continue;
            }
            let hops = walk(
                &t,
                &t.compute_switch_coords(src),
                &t.compute_switch_coords(dst),
            );
            assert_eq!(hops.len(), t.minimal_distance(src, dst));

            let dims_used: Vec<_> = hops.iter().map(|(_, port, _)| port / 2).collect();
            assert!(dims_used.windows(2).all(|w| w[0] <= w[1]), "{dims_used:?}");

            let mut previous = t.compute_switch_coords(src);
            for (coords, port, vc) in &hops {
                let dim = port / 2;
                let size = dims[dim];
                let crossed = (port % 2 == 0 && previous[dim] == size - 1)
                    || (port % 2 == 1 && previous[dim] == 0);
                if crossed {
                    assert_eq!(*vc, 1);
                }
                previous = coords.clone();
            }
        }
    }
}

#[test]
fn connections() {
    let t = torus(&[4, 1, 2]);
    let c = t.connected_outports(0);
    // Dimension 1 has size 1 and no links
    assert_eq!(c.len(), 4);
    assert!(c.iter().all(|c| c.src_outport / 2 != 1));
    for link in &c {
        let coords = t.neighbor_at_port(0, link.src_outport).unwrap();
        assert_eq!(t.switch_number(&coords).unwrap(), link.dst);
        assert_eq!(link.dst_inport, link.src_outport ^ 1);
    }
    assert!(t.neighbor_at_port(0, 2).is_err());
    assert!(t.neighbor_at_port(0, 6).is_err());
}

#[test]
fn redundancy_scales_ports() {
    let t = Torus::new(&[4, 4], &[2, 1], 2).unwrap();
    assert_eq!(t.port_scale(0, 0), 2.0);
    assert_eq!(t.port_scale(0, 1), 2.0);
    assert_eq!(t.port_scale(0, 3), 1.0);
    assert_eq!(t.port_scale(0, 4), 1.0);
    assert_eq!(t.num_endpoints(), 32);
    assert_eq!(t.endpoint_to_switch(5), (2, 5));
}

#[test]
fn bad_geometry() {
    assert!(Torus::new(&[], &[], 1).is_err());
    assert!(Torus::new(&[4, 0], &[], 1).is_err());
    assert!(Torus::new(&[4, 4], &[1], 1).is_err());
    assert!(Torus::new(&[4, 4], &[1, 0], 1).is_err());

    let config = TopologyConfig {
        kind: TopologyKind::Torus,
        geometry: vec![4, 4],
        concentration: 0,
        ..Default::default()
    };
    assert!(Topology::from_config(&config).is_err());
}

#[test]
#[should_panic(expected = "to itself")]
fn route_to_self() {
    let t = torus(&[4, 4]);
    let mut path = RoutingPath::default();
    t.minimal_route_to_switch(5, 5, &mut path);
}
