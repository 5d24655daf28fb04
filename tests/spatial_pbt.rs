use proptest::prelude::*;
use spark_common::{LayerParams, Neighborhood, Shape, SpaceParams, Vector};
use spark_engine::node::shapes_intersect;
use spark_engine::{DataLayer, NodeId, NodeSpec, Space};

const SIZE: f64 = 50.0;

fn space(wrap: bool, cell_size: f64) -> Space {
    Space::new(SpaceParams::from_bounds("pbt", &[0.0, 0.0], &[SIZE, SIZE], &[wrap, wrap], cell_size).unwrap())
}

prop_compose! {
    fn arb_position()(
        x in 0.0f64..SIZE,
        y in 0.0f64..SIZE
    ) -> Vector {
        Vector::xy(x, y)
    }
}

// Query centres may fall well outside the domain.
prop_compose! {
    fn arb_center()(
        x in -20.0f64..SIZE + 20.0,
        y in -20.0f64..SIZE + 20.0
    ) -> Vector {
        Vector::xy(x, y)
    }
}

fn arb_node() -> impl Strategy<Value = NodeSpec> {
    (arb_position(), 0.0f64..1.5, any::<bool>()).prop_map(|(p, r, square)| {
        if square {
            NodeSpec::square(p, r)
        } else {
            NodeSpec::circle(p, r)
        }
    })
}

#[derive(Debug, Clone)]
enum Op {
    Add(Vector, f64),
    Move(usize, Vector),
    Translate(usize, Vector),
    Remove(usize),
    Commit,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (arb_position(), 0.0f64..2.0).prop_map(|(p, r)| Op::Add(p, r)),
        2 => (any::<usize>(), arb_position()).prop_map(|(i, p)| Op::Move(i, p)),
        2 => (any::<usize>(), -30.0f64..30.0, -30.0f64..30.0).prop_map(|(i, dx, dy)| Op::Translate(i, Vector::xy(dx, dy))),
        1 => any::<usize>().prop_map(Op::Remove),
        2 => Just(Op::Commit),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn proximity_query_matches_brute_force(
        nodes in prop::collection::vec(arb_node(), 0..60),
        center in arb_center(),
        radius in 0.0f64..12.0,
        wrap in any::<bool>(),
        cell_size in 1.0f64..8.0
    ) {
        let mut s = space(wrap, cell_size);
        let ids: Vec<NodeId> = nodes.into_iter().map(|spec| s.add(spec)).collect();

        let mut found = s.agents_near(center, radius, |_| true);
        found.sort();

        let origin = if wrap { s.normalize(center) } else { center };
        let mut expected: Vec<NodeId> = ids
            .iter()
            .copied()
            .filter(|&id| {
                let n = s.node(id);
                let d = s.get_vector(origin, n.position());
                shapes_intersect(d, Shape::Circle, radius, n.shape(), n.radius())
            })
            .collect();
        expected.sort();

        prop_assert_eq!(found, expected);
    }

    #[test]
    fn intersecting_matches_brute_force(
        nodes in prop::collection::vec(arb_node(), 1..60),
        wrap in any::<bool>(),
        cell_size in 1.0f64..8.0
    ) {
        let mut s = space(wrap, cell_size);
        let ids: Vec<NodeId> = nodes.into_iter().map(|spec| s.add(spec)).collect();

        for &id in &ids {
            let me = s.node(id);
            let mut found = s.intersecting(id, |_| true);
            found.sort();
            let mut expected: Vec<NodeId> = ids
                .iter()
                .copied()
                .filter(|&other| other != id)
                .filter(|&other| {
                    let n = s.node(other);
                    let d = s.get_vector(me.position(), n.position());
                    shapes_intersect(d, me.shape(), me.radius(), n.shape(), n.radius())
                })
                .collect();
            expected.sort();
            prop_assert_eq!(found, expected, "around {:?}", id);
        }
    }

    #[test]
    fn index_stays_consistent_under_random_edits(
        ops in prop::collection::vec(arb_op(), 1..120),
        wrap in any::<bool>()
    ) {
        let mut s = space(wrap, 5.0);
        let mut live: Vec<NodeId> = Vec::new();
        for op in ops {
            match op {
                Op::Add(p, r) => live.push(s.add(NodeSpec::circle(p, r))),
                Op::Move(i, p) if !live.is_empty() => s.stage_move(live[i % live.len()], p),
                Op::Translate(i, d) if !live.is_empty() => s.stage_translate(live[i % live.len()], d),
                Op::Remove(i) if !live.is_empty() => {
                    let id = live.swap_remove(i % live.len());
                    s.remove(id);
                    prop_assert!(!s.contains(id));
                }
                Op::Commit => {
                    s.commit();
                }
                _ => {}
            }
            prop_assert_eq!(s.len(), live.len());
            prop_assert!(s.verify_index().is_ok(), "{:?}", s.verify_index());
        }
        s.commit();
        prop_assert!(!s.has_staged());
        prop_assert!(s.verify_index().is_ok());
        for id in live {
            let p = s.node(id).position();
            prop_assert!((0.0..=SIZE).contains(&p.x) && (0.0..=SIZE).contains(&p.y), "{:?}", p);
            if wrap {
                prop_assert!(p.x < SIZE && p.y < SIZE);
            }
        }
    }

    #[test]
    fn wrapped_displacement_is_at_most_half_the_domain(
        a in arb_position(),
        b in arb_position()
    ) {
        let s = space(true, 5.0);
        let d = s.get_vector(a, b);
        prop_assert!(d.x.abs() <= SIZE * 0.5 + 1e-9);
        prop_assert!(d.y.abs() <= SIZE * 0.5 + 1e-9);
        let back = s.normalize(a + d);
        prop_assert!(s.distance(back, b) < 1e-9);
    }

    #[test]
    fn diffusion_conserves_mass(
        drops in prop::collection::vec((arb_position(), 0.0f64..100.0), 1..40),
        rate in 0.0f64..1.0,
        rounds in 1usize..5,
        wrap in any::<bool>(),
        von_neumann in any::<bool>()
    ) {
        let space = SpaceParams::from_bounds("pbt", &[0.0, 0.0], &[SIZE, SIZE], &[wrap, wrap], 5.0).unwrap();
        let neighborhood = if von_neumann { Neighborhood::VonNeumann } else { Neighborhood::Moore };
        let params = LayerParams::over_space("field", &space, &[2.0], rate, 1.0, neighborhood, 0.0).unwrap();
        let mut layer = DataLayer::new(params);
        for (p, v) in drops {
            layer.add_value(p, v);
        }
        let before = layer.total();
        layer.diffuse(rounds);
        let after = layer.total();
        prop_assert!((before - after).abs() <= 1e-9 * before.max(1.0), "{} -> {}", before, after);
        prop_assert!(layer.min() >= -1e-12);
    }
}
