use skirmish_core::{
    AgentId, AllocationConfig, CandidatePoint, Command, EncounterConfig, Event, PointIndex, Vec3,
};
use skirmish_system_position_allocation::PositionAllocation;
use skirmish_world::{self as world, query, World};

fn apply(world: &mut World, command: Command) -> Vec<Event> {
    let mut events = Vec::new();
    world::apply(world, command, &mut events);
    events
}

/// Populates a world with points along the x axis and installs the given
/// scores, which must already be in descending order.
fn scored_world(scores: &[(f32, f32)]) -> World {
    let mut world = World::new(EncounterConfig::default());
    let points = scores.iter().map(|(x, _)| Vec3::new(*x, 0.0, 0.0)).collect();
    let _ = apply(&mut world, Command::PopulateCandidates { points });

    let ranking = scores
        .iter()
        .enumerate()
        .map(|(index, (x, score))| CandidatePoint {
            index: PointIndex::new(index as u32),
            position: Vec3::new(*x, 0.0, 0.0),
            score: *score,
        })
        .collect();
    let _ = apply(&mut world, Command::ApplyScores { ranking });
    world
}

fn occupy(world: &mut World, agent: u32, point: u32) {
    let events = apply(
        world,
        Command::ReservePoint {
            agent: AgentId::new(agent),
            point: PointIndex::new(point),
        },
    );
    assert!(matches!(events.as_slice(), [Event::PointReserved { .. }]));
}

#[test]
fn falls_back_to_lower_threshold_when_top_points_are_taken() {
    let mut world = scored_world(&[(0.0, 0.95), (100.0, 0.85), (200.0, 0.7), (300.0, 0.1)]);
    occupy(&mut world, 1, 0);
    occupy(&mut world, 2, 1);

    let allocation = PositionAllocation::default();
    let selection = allocation
        .select(query::candidates(&world), query::occupancy(&world), Vec3::ZERO)
        .expect("a free point remains");
    assert_eq!(selection.point, PointIndex::new(2));
    assert!((selection.threshold - 0.6).abs() < 1e-5);
}

#[test]
fn exhausted_ladder_returns_none() {
    let mut world = scored_world(&[(0.0, 0.9), (100.0, 0.5), (200.0, -0.5)]);
    occupy(&mut world, 1, 0);
    occupy(&mut world, 2, 1);

    let allocation = PositionAllocation::default();
    assert_eq!(
        allocation.select(query::candidates(&world), query::occupancy(&world), Vec3::ZERO),
        None
    );
}

#[test]
fn closeness_breaks_near_ties_in_score() {
    let world = scored_world(&[(2000.0, 0.9), (100.0, 0.88)]);
    let allocation = PositionAllocation::default();
    let selection = allocation
        .select(query::candidates(&world), query::occupancy(&world), Vec3::ZERO)
        .expect("points are free");
    assert_eq!(selection.point, PointIndex::new(1));
    assert!((selection.rank - (0.88 * 0.85 + 0.15)).abs() < 1e-5);
}

#[test]
fn equal_ranks_keep_the_first_point() {
    let world = scored_world(&[(100.0, 0.9), (-100.0, 0.9)]);
    let allocation = PositionAllocation::default();
    let selection = allocation
        .select(query::candidates(&world), query::occupancy(&world), Vec3::ZERO)
        .expect("points are free");
    assert_eq!(selection.point, PointIndex::new(0));
    assert!((selection.rank - (0.9 * 0.85 + 0.15)).abs() < 1e-5);
}

#[test]
fn pure_score_weight_ignores_distance() {
    let world = scored_world(&[(5000.0, 0.9), (10.0, 0.85)]);
    let allocation = PositionAllocation::new(AllocationConfig {
        score_weight: 1.0,
        ..AllocationConfig::default()
    });
    let selection = allocation
        .select(query::candidates(&world), query::occupancy(&world), Vec3::ZERO)
        .expect("points are free");
    assert_eq!(selection.point, PointIndex::new(0));
}

#[test]
fn unpopulated_store_yields_nothing() {
    let world = World::new(EncounterConfig::default());
    let allocation = PositionAllocation::default();
    assert!(allocation
        .select(query::candidates(&world), query::occupancy(&world), Vec3::ZERO)
        .is_none());
}
