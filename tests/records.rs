use stockflow_core::ops::{interpolate, min, piecewise};
use stockflow_core::store::ModelRecord;
use stockflow_core::*;

fn plant() -> Model {
    let mut tank = Model::new("tank").with_doc("holding tank");
    let level = tank.add("level", Reference::stock().init(10.0).doc("litres")).unwrap();
    let mut pump = Model::new("pump");
    let speed = pump.add("speed", Reference::free(Distribution::uniform(1.0, 2.0))).unwrap();
    let drain = pump.add("drain", Reference::flow().max(5.0)).unwrap();

    let mut plant = Model::new("plant").with_steps(6);
    plant.add_model("tank", tank).unwrap();
    plant.add_model("pump", pump).unwrap();
    let t = plant.add("t", Reference::time()).unwrap();
    plant
        .bind(drain, min(level, interpolate(t, vec![0.0, 6.0], vec![1.0, 3.0]).mul(speed)))
        .unwrap();
    plant.outflow(level, drain).unwrap();
    plant.add("alarm", Reference::variable(piecewise([(1.0, level.expr().lt(2.0))]))).unwrap();
    plant.add("lowest", Reference::metric(level.series_min())).unwrap();
    plant
}

#[test]
fn record_round_trip_preserves_behaviour() {
    let original = plant();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plant.json");
    original.save_json(&path).unwrap();
    let loaded = Model::load_json(&path).unwrap();

    assert_eq!(loaded.to_record().unwrap(), original.to_record().unwrap());
    assert_eq!(loaded.steps(), Some(6));
    assert_eq!(loaded.submodel("tank").and_then(|m| m.doc()), Some("holding tank"));

    let config = RunConfig { steps: None, ..RunConfig::new(0, 8).seed(21) };
    assert_eq!(loaded.simulate_with(&config).unwrap(), original.simulate_with(&config).unwrap());
}

#[test]
fn record_names_are_qualified_from_the_root() {
    let record = plant().to_record().unwrap();
    let json = record.to_json().unwrap();
    assert!(json.contains("\"tank.level\""));
    assert!(json.contains("\"pump.drain\""));
    assert_eq!(ModelRecord::from_json(&json).unwrap(), record);
}

#[test]
fn unknown_name_in_record_is_reported() {
    let mut record = plant().to_record().unwrap();
    record.wires[0].stock = "tank.nope".into();
    assert!(matches!(Model::from_record(&record), Err(DefinitionError::UnknownReference { ref name }) if name == "tank.nope"));
}

#[test]
fn trace_survives_json() {
    let mut m = Model::new("counter");
    let count = m.add("count", Reference::stock().init(1.0)).unwrap();
    let tick = m.add("tick", Reference::flow_eq(2.0)).unwrap();
    m.inflow(count, tick).unwrap();
    m.add("total", Reference::metric(count.series_sum())).unwrap();
    let trace = m.simulate(4, 2).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.json");
    trace.save_json(&path).unwrap();
    assert_eq!(Trace::load_json(&path).unwrap(), trace);
}

#[test]
fn config_snapshot_restores_free_values() {
    let mut m = plant();
    let snapshot = m.config();
    assert_eq!(m.free_refs(true), vec!["tank.level.init", "pump.speed"]);

    m.set_free("pump.speed", 1.5).unwrap();
    m.set_free("tank.level.init", Distribution::normal(10.0, 1.0)).unwrap();
    assert_eq!(m.config()["pump.speed"], FreeValue::from(1.5));

    m.apply_config(&snapshot).unwrap();
    assert_eq!(m.config(), snapshot);
}
