//! Property tests: undo bit-identity and merge idempotence under random
//! edit sequences and fragments.

use proptest::prelude::*;
use surveyor::{
    Body, Command, Coord, Draft, Entity, EntityKey, EntityNum, Fragment, Workspace,
};

fn num(n: u64) -> EntityNum {
    EntityNum::assigned(n).unwrap()
}

const SEEDED_POINTS: u64 = 6;

fn seeded() -> Workspace {
    let mut ws = Workspace::new();
    let mut children: Vec<Command> = (1..=SEEDED_POINTS)
        .map(|n| {
            Command::add_entity(
                Entity::point(num(n), Coord::new(n as f64, 0.0)).at_version(1),
            )
        })
        .collect();
    children.push(Command::add_entity(
        Entity::path(num(10), vec![num(1), num(2), num(3)]).at_version(1),
    ));
    ws.apply(Command::sequence("seed", children)).unwrap();
    ws
}

#[derive(Clone, Debug)]
enum Op {
    AddPoint(f64, f64),
    MovePoint(u64, f64, f64),
    TagPoint(u64, String),
    DeletePoint(u64),
    Reroute(Vec<u64>),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let coord = -80.0..80.0f64;
    let target = 1..=SEEDED_POINTS;
    prop_oneof![
        (coord.clone(), coord.clone()).prop_map(|(a, b)| Op::AddPoint(a, b)),
        (target.clone(), coord.clone(), coord.clone())
            .prop_map(|(n, a, b)| Op::MovePoint(n, a, b)),
        (target.clone(), "[a-z]{1,6}").prop_map(|(n, v)| Op::TagPoint(n, v)),
        target.clone().prop_map(Op::DeletePoint),
        proptest::collection::vec(1..=SEEDED_POINTS, 0..4).prop_map(Op::Reroute),
    ]
}

fn command_for(op: &Op) -> Command {
    match op {
        Op::AddPoint(lat, lon) => Command::add(Draft::new(Body::Point(Coord::new(*lat, *lon)))),
        Op::MovePoint(n, lat, lon) => Command::change(
            Entity::point(num(*n), Coord::new(*lat, *lon)).at_version(1),
        ),
        Op::TagPoint(n, value) => Command::change(
            Entity::point(num(*n), Coord::new(*n as f64, 0.0))
                .at_version(1)
                .with_tag("name", value.clone()),
        ),
        Op::DeletePoint(n) => Command::delete([EntityKey::point(num(*n))], true),
        Op::Reroute(points) => Command::change(
            Entity::path(num(10), points.iter().map(|n| num(*n)).collect()).at_version(1),
        ),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Undoing everything restores the seeded state bit-identically, and
    /// redoing everything reproduces the final state, over repeated cycles.
    #[test]
    fn undo_redo_cycling_is_bit_identical(ops in proptest::collection::vec(op_strategy(), 1..16)) {
        let mut ws = seeded();
        let initial = ws.store().all();

        for op in &ops {
            let command = command_for(op);
            // A refused command records nothing and changes nothing.
            let _ = ws.apply(command);
        }
        let fin = ws.store().all();

        for _ in 0..3 {
            while ws.undo().unwrap() {}
            // The seed sequence is the first undo step; one redo brings it back.
            prop_assert!(ws.store().all().is_empty());
            prop_assert!(ws.redo().unwrap());
            prop_assert_eq!(&ws.store().all(), &initial);
            while ws.redo().unwrap() {}
            prop_assert_eq!(&ws.store().all(), &fin);
        }
    }

    /// Merging any fragment into an unmodified store twice is idempotent
    /// and never produces a conflict.
    #[test]
    fn merge_into_unmodified_store_is_idempotent(
        coords in proptest::collection::vec((-80.0..80.0f64, -80.0..80.0f64, 1..5u64), 1..8),
        refs in proptest::collection::vec(1..20u64, 0..6),
    ) {
        let mut fragment = Fragment::default();
        for (i, (lat, lon, version)) in coords.iter().enumerate() {
            fragment.push(
                Entity::point(num(i as u64 + 1), Coord::new(*lat, *lon)).at_version(*version),
            );
        }
        // Paths must not list a point twice; keep first occurrences only.
        let mut seen = std::collections::BTreeSet::new();
        let points = refs
            .iter()
            .filter(|n| seen.insert(**n))
            .map(|n| num(*n))
            .collect();
        fragment.push(Entity::path(num(100), points).at_version(1));

        let mut ws = Workspace::new();
        let first = ws.merge_fragment(fragment.clone()).unwrap();
        prop_assert!(first.is_clean());
        let snapshot = ws.store().all();

        let second = ws.merge_fragment(fragment).unwrap();
        prop_assert!(second.is_empty());
        prop_assert_eq!(ws.store().all(), snapshot);
        prop_assert!(!ws.has_conflicts());
    }
}
