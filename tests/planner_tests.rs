mod fixtures;

use std::sync::Arc;

use fixtures::*;
use route_planner::config::PlannerConfig;
use route_planner::error::Error;
use route_planner::geo::Coord;
use route_planner::matrix::DEFAULT_MATRIX_STORE_FILE;
use route_planner::pair_cache::DEFAULT_PAIR_CACHE_FILE;
use route_planner::planner::RoutePlanner;
use route_planner::result_cache::TourResultCache;
use route_planner::solver::Heuristic;
use route_planner::traits::RoutingBackend;

fn config(dir: &tempfile::TempDir) -> PlannerConfig {
    PlannerConfig {
        backends: Vec::new(),
        cache_dir: dir.path().to_path_buf(),
        retry_delay_ms: 1,
        workers: 2,
        ..PlannerConfig::default()
    }
}

fn table_planner(
    dir: &tempfile::TempDir,
    max_daily_km: f64,
) -> (RoutePlanner, Arc<MockBackend>, Vec<Coord>) {
    let (coords, rows) = four_city_table();
    let backend = Arc::new(MockBackend::new("table", Behavior::Table(rows)));
    let backends: Vec<Arc<dyn RoutingBackend>> =
        vec![Arc::clone(&backend) as Arc<dyn RoutingBackend>];

    let config = PlannerConfig {
        max_daily_km,
        ..config(dir)
    };
    let planner = RoutePlanner::with_backends(config, backends).expect("planner");
    (planner, backend, coords)
}

#[test]
fn test_four_city_scenario() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (planner, backend, coords) = table_planner(&dir, 40.0);

    let result = planner.plan(coords[0], &coords[1..], false).expect("plan");
    assert!(!result.from_cache);
    assert_eq!(backend.calls(), 6);

    let best = result.best().expect("best route");
    assert_eq!(result.plan.best, Heuristic::TwoOptNearestNeighbor);
    assert_eq!(best.candidate.tour.stops(), &[0, 1, 3, 2, 0]);
    assert_eq!(best.candidate.distance_km, 80.0);

    let days: Vec<f64> = best.days.iter().map(|day| day.distance_km).collect();
    assert_eq!(days, vec![35.0, 30.0, 15.0]);

    let mst = result
        .plan
        .routes
        .iter()
        .find(|route| route.candidate.heuristic == Heuristic::MstPreorder)
        .expect("mst route");
    assert_eq!(mst.candidate.distance_km, 95.0);
    assert_eq!(mst.candidate.tour.stops(), &[0, 1, 2, 3, 0]);

    assert!(dir.path().join(DEFAULT_PAIR_CACHE_FILE).exists());
    assert!(dir.path().join(DEFAULT_MATRIX_STORE_FILE).exists());
    assert!(dir.path().join(TourResultCache::file_for(&result.plan.key)).exists());
}

#[test]
fn test_repeat_run_uses_stored_plan_unless_forced() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (planner, backend, coords) = table_planner(&dir, 40.0);

    let first = planner.plan(coords[0], &coords[1..], false).expect("plan");
    let second = planner.plan(coords[0], &coords[1..], false).expect("repeat");
    assert!(second.from_cache);
    assert_eq!(second.plan, first.plan);

    let forced = planner.plan(coords[0], &coords[1..], true).expect("forced");
    assert!(!forced.from_cache);
    assert_eq!(forced.plan.best, first.plan.best);
    assert_eq!(backend.calls(), 6);
}

#[test]
fn test_every_candidate_is_segmented_consistently() {
    let dir = tempfile::tempdir().expect("tempdir");
    let planner = RoutePlanner::with_backends(
        PlannerConfig {
            fallback_only: true,
            max_daily_km: 600.0,
            ..config(&dir)
        },
        Vec::new(),
    )
    .expect("planner");

    let result = planner.plan(WARSAW, DELIVERY_STOPS, false).expect("plan");
    assert_eq!(result.plan.node_count, DELIVERY_STOPS.len() + 1);
    assert_eq!(result.plan.routes.len(), 3);

    for route in &result.plan.routes {
        let edges: Vec<(usize, usize)> = route
            .days
            .iter()
            .flat_map(|day| day.edges.iter().map(|edge| (edge.from, edge.to)))
            .collect();
        assert_eq!(edges, route.candidate.tour.edges().collect::<Vec<_>>());

        let total: f64 = route.days.iter().map(|day| day.distance_km).sum();
        assert!((total - route.candidate.distance_km).abs() < 1e-6);

        for day in &route.days {
            assert!(day.distance_km <= 600.0 || day.edges.len() == 1);
        }
    }

    let best = result.best().expect("best");
    let shortest = best.candidate.distance_km;
    assert!(result.plan.routes.iter().all(|route| shortest <= route.candidate.distance_km));
}

#[test]
fn test_offline_planner_reuses_matrix_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let (planner, _, coords) = table_planner(&dir, 40.0);
        planner.plan(coords[0], &coords[1..], false).expect("plan");
    }

    let offline = RoutePlanner::with_backends(
        PlannerConfig {
            offline: true,
            max_daily_km: 40.0,
            ..config(&dir)
        },
        Vec::new(),
    )
    .expect("offline planner");

    let (coords, _) = four_city_table();
    let result = offline.plan(coords[0], &coords[1..], false).expect("cached plan");
    assert_eq!(result.best().map(|route| route.candidate.distance_km), Some(80.0));

    let missing = offline.plan(coords[0], &[KRAKOW], false);
    assert!(matches!(missing, Err(Error::MatrixUnavailable { .. })));
}

#[test]
fn test_report_and_maintenance() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (planner, _, coords) = table_planner(&dir, 40.0);
    planner.plan(coords[0], &coords[1..], false).expect("plan");

    let report = planner.report().expect("report written");
    assert!(report.exists());
    assert!(report.starts_with(dir.path()));

    std::fs::write(dir.path().join("cached_routes.json_tmp_orphan"), b"{}").expect("orphan");
    assert!(planner.maintain() >= 1);
    assert!(!dir.path().join("cached_routes.json_tmp_orphan").exists());
    assert!(report.exists());
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = RoutePlanner::with_backends(
        PlannerConfig {
            workers: 0,
            ..config(&dir)
        },
        Vec::new(),
    );
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}
