use stockflow_core::compute::{NumericFault, RuntimeError};
use stockflow_core::ops::{log, min, repeated_pulse};
use stockflow_core::*;

fn tub() -> Model {
    let mut m = Model::new("tub");
    let level = m.add("level", Reference::stock()).unwrap();
    let fill = m.add("fill", Reference::flow_eq(5.0)).unwrap();
    let drain = m.add("drain", Reference::flow()).unwrap();
    m.bind(drain, min(level, 2.0)).unwrap();
    m.chain(&[fill, level, drain]).unwrap();
    m
}

#[test]
fn bathtub_fills_at_net_rate() {
    let trace = tub().simulate(5, 1).unwrap();
    assert_eq!(trace.series("tub.level", 0), None);
    assert_eq!(trace.series("level", 0).unwrap(), vec![0.0, 5.0, 8.0, 11.0, 14.0, 17.0]);
    assert_eq!(trace.series("drain", 0).unwrap(), vec![0.0, 2.0, 2.0, 2.0, 2.0, 2.0]);
}

#[test]
fn stock_without_flows_holds_its_init() {
    let mut m = Model::new("m");
    m.add("level", Reference::stock().init(4.0)).unwrap();
    let trace = m.simulate(3, 2).unwrap();
    assert_eq!(trace.samples, 2);
    assert_eq!(trace.series("level", 1).unwrap(), vec![4.0; 4]);
}

#[test]
fn flow_bounds_clamp_min_then_max() {
    let mut m = Model::new("m");
    m.add("high", Reference::flow_eq(10.0).min(0.0).max(3.0)).unwrap();
    m.add("low", Reference::flow_eq(-5.0).min(0.0).max(3.0)).unwrap();
    // max wins when the bounds cross
    m.add("crossed", Reference::flow_eq(0.0).min(5.0).max(3.0)).unwrap();
    let trace = m.simulate(1, 1).unwrap();
    assert_eq!(trace.series("high", 0).unwrap(), vec![3.0, 3.0]);
    assert_eq!(trace.series("low", 0).unwrap(), vec![0.0, 0.0]);
    assert_eq!(trace.series("crossed", 0).unwrap(), vec![3.0, 3.0]);
}

#[test]
fn pulse_fires_on_schedule() {
    let mut m = Model::new("m");
    m.add("beat", Reference::variable(repeated_pulse(2.0, 3.0))).unwrap();
    let trace = m.simulate(9, 1).unwrap();
    let beat = trace.series("beat", 0).unwrap();
    let on: Vec<usize> = beat.iter().enumerate().filter(|(_, v)| **v == 1.0).map(|(t, _)| t).collect();
    assert_eq!(on, vec![2, 5, 8]);
}

#[test]
fn time_reference_counts_steps() {
    let mut m = Model::new("m");
    let t = m.add("t", Reference::time()).unwrap();
    m.add("twice", Reference::variable(t.expr().mul(2.0))).unwrap();
    let trace = m.simulate(3, 1).unwrap();
    assert_eq!(trace.series("twice", 0).unwrap(), vec![0.0, 2.0, 4.0, 6.0]);
}

#[test]
fn metrics_read_series_after_the_run() {
    let mut m = tub();
    let level = m.lookup("level").unwrap();
    m.add("last", Reference::metric(level.index(-1))).unwrap();
    m.add("first", Reference::metric(level.index(0))).unwrap();
    m.add("peak", Reference::metric(level.series_max())).unwrap();
    m.add("final", Reference::metric(level)).unwrap();
    let trace = m.simulate(5, 1).unwrap();
    assert_eq!(trace.scalar("last", 0, 0), Some(17.0));
    assert_eq!(trace.scalar("first", 0, 0), Some(0.0));
    assert_eq!(trace.scalar("peak", 0, 0), Some(17.0));
    assert_eq!(trace.scalar("final", 0, 0), Some(17.0));
}

#[test]
fn out_of_range_index_is_a_runtime_error() {
    let mut m = tub();
    let level = m.lookup("level").unwrap();
    m.add("bad", Reference::metric(level.index(-100))).unwrap();
    let err = m.simulate(5, 1).unwrap_err();
    assert!(
        matches!(
            err,
            SimulationError::Runtime(RuntimeError { ref name, fault: NumericFault::IndexOutOfRange { index: -100, len: 6 }, .. })
                if name == "bad"
        ),
        "{:?}",
        err
    );
}

#[test]
fn delay_reads_history_with_default() {
    let mut m = Model::new("m");
    let t = m.add("t", Reference::time()).unwrap();
    m.add("late", Reference::variable(t.delay(2, -1.0))).unwrap();
    let trace = m.simulate(4, 1).unwrap();
    assert_eq!(trace.series("late", 0).unwrap(), vec![-1.0, -1.0, 0.0, 1.0, 2.0]);
}

#[test]
fn seeded_runs_are_reproducible_and_independent_of_threads() {
    let mut m = Model::new("m");
    m.add("noise", Reference::free(Distribution::normal(0.0, 1.0))).unwrap();
    m.add("coin", Reference::free(Distribution::bernoulli(0.5))).unwrap();

    let parallel = RunConfig::new(3, 50).seed(7);
    let mut sequential = parallel.clone();
    sequential.parallel = false;

    let a = m.simulate_with(&parallel).unwrap();
    let b = m.simulate_with(&parallel).unwrap();
    let c = m.simulate_with(&sequential).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, c);

    let other = m.simulate_with(&RunConfig::new(3, 50).seed(8)).unwrap();
    assert_ne!(a.get("noise"), other.get("noise"));
}

#[test]
fn priors_are_drawn_once_per_repetition() {
    let mut m = Model::new("m");
    m.add("noise", Reference::free(Distribution::uniform(0.0, 1.0))).unwrap();
    let trace = m.simulate(4, 3).unwrap();
    for rep in 0..3 {
        let series = trace.series("noise", rep).unwrap();
        assert!(series.iter().all(|v| *v == series[0]));
    }
}

fn fragile(always: bool) -> Model {
    let mut m = Model::new("m");
    let rate = m.add("rate", Reference::free(Distribution::normal(0.0, 1.0))).unwrap();
    let arg = if always { ops::abs(rate).neg().sub(1.0) } else { rate.expr() };
    m.add("logged", Reference::variable(log(arg))).unwrap();
    m
}

#[test]
fn abort_policy_fails_on_first_fault() {
    let err = fragile(false).simulate_with(&RunConfig::new(2, 20).seed(1)).unwrap_err();
    assert!(matches!(err, SimulationError::Runtime(RuntimeError { fault: NumericFault::OutOfDomain { .. }, .. })));
}

#[test]
fn skip_policy_drops_failed_repetitions() {
    let config = RunConfig::new(2, 20).seed(1).failure_policy(FailurePolicy::Skip);
    let trace = fragile(false).simulate_with(&config).unwrap();
    assert!(!trace.skipped.is_empty());
    assert_eq!(trace.samples + trace.skipped.len(), 20);
    assert_eq!(trace.repetitions.len(), trace.samples);
    assert!(trace.get("logged").unwrap().data.iter().all(|v| v.is_finite()));
}

#[test]
fn skip_policy_still_fails_when_nothing_survives() {
    let config = RunConfig::new(2, 5).failure_policy(FailurePolicy::Skip);
    let err = fragile(true).simulate_with(&config).unwrap_err();
    assert!(matches!(err, SimulationError::AllRepetitionsFailed { ref failures } if failures.len() == 5));
}

#[test]
fn submodels_compose_through_handles() {
    let mut tank = Model::new("tank");
    let level = tank.add("level", Reference::stock().init(10.0)).unwrap();
    let mut pump = Model::new("pump");
    let drain = pump.add("drain", Reference::flow()).unwrap();

    let mut plant = Model::new("plant");
    plant.add_model("tank", tank).unwrap();
    plant.add_model("pump", pump).unwrap();
    plant.bind(drain, min(level, 3.0)).unwrap();
    plant.outflow(level, drain).unwrap();

    let trace = plant.simulate(5, 1).unwrap();
    assert_eq!(trace.series("tank.level", 0).unwrap(), vec![10.0, 7.0, 4.0, 1.0, 0.0, 0.0]);
    assert_eq!(trace.series("pump.drain", 0).unwrap(), vec![3.0, 3.0, 3.0, 1.0, 0.0, 0.0]);
}

#[test]
fn same_step_cycle_is_rejected_with_every_member() {
    let mut m = Model::new("m");
    let x = m.add("x", Reference::unbound_variable()).unwrap();
    let y = m.add("y", Reference::unbound_variable()).unwrap();
    m.bind(x, y.expr().add(1.0)).unwrap();
    m.bind(y, x.expr().mul(2.0)).unwrap();
    assert_eq!(m.flatten().unwrap_err(), DefinitionError::Cycle { names: vec!["x".into(), "y".into()] });
    assert!(matches!(m.simulate(1, 1), Err(SimulationError::Definition(DefinitionError::Cycle { .. }))));
}

#[test]
fn stock_feedback_is_not_a_cycle() {
    let mut m = Model::new("growth");
    let pop = m.add("pop", Reference::stock().init(100.0)).unwrap();
    let births = m.add("births", Reference::flow()).unwrap();
    m.bind(births, pop.expr().mul(0.1)).unwrap();
    m.inflow(pop, births).unwrap();
    let trace = m.simulate(2, 1).unwrap();
    let pop = trace.series("pop", 0).unwrap();
    assert_eq!(pop[0], 100.0);
    assert!((pop[1] - 110.0).abs() < 1e-9);
    assert!((pop[2] - 121.0).abs() < 1e-9);
}

#[test]
fn vector_references_broadcast() {
    let mut m = Model::new("m");
    let base = m.add("base", Reference::variable(vec![1.0, 2.0, 3.0]).dim(3)).unwrap();
    m.add("total", Reference::variable(ops::sum(base)).dim(1)).unwrap();
    m.add("scaled", Reference::variable(base.expr().mul(2.0)).dim(3)).unwrap();
    let trace = m.simulate(0, 1).unwrap();
    assert_eq!(trace.get("scaled").unwrap().data, vec![2.0, 4.0, 6.0]);
    assert_eq!(trace.get("total").unwrap().data, vec![6.0]);
}

#[test]
fn integer_dtype_rounds() {
    let mut m = Model::new("m");
    m.add("count", Reference::variable(2.6).dtype(Dtype::Int)).unwrap();
    let trace = m.simulate(0, 1).unwrap();
    assert_eq!(trace.series("count", 0).unwrap(), vec![3.0]);
}

#[test]
fn flow_bounds_follow_live_references() {
    let mut m = Model::new("tub");
    let level = m.add("level", Reference::stock().init(4.0)).unwrap();
    let fill = m.add("fill", Reference::flow_eq(1.0)).unwrap();
    let drain = m.add("drain", Reference::flow_eq(3.0).min(0.0).max(level)).unwrap();
    m.chain(&[fill, level, drain]).unwrap();

    let trace = m.simulate(3, 1).unwrap();
    let level = trace.series("level", 0).unwrap();
    let drain = trace.series("drain", 0).unwrap();
    assert_eq!(level, vec![4.0, 2.0, 1.0, 1.0]);
    assert_eq!(drain, vec![3.0, 2.0, 1.0, 1.0]);
    assert!(drain.iter().zip(&level).all(|(d, l)| d <= l));
}

#[test]
fn vector_stock_carries_each_element() {
    let mut m = Model::new("m");
    let s = m.add("s", Reference::stock().init(vec![0.0, 0.0, 0.0]).dim(3)).unwrap();
    let f = m.add("f", Reference::flow_eq(vec![1.0, 2.0, 3.0]).dim(3)).unwrap();
    m.inflow(s, f).unwrap();
    let trace = m.simulate(2, 1).unwrap();
    let s = trace.get("s").unwrap();
    assert_eq!(s.shape, vec![1, 3, 3]);
    assert_eq!(s.data, vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 2.0, 4.0, 6.0]);
}

#[test]
fn pulse_with_zero_interval_divides_by_zero() {
    let mut m = Model::new("m");
    m.add("beat", Reference::variable(repeated_pulse(0.0, 0.0))).unwrap();
    let err = m.simulate(2, 1).unwrap_err();
    assert!(
        matches!(
            err,
            SimulationError::Runtime(RuntimeError { ref name, step: 0, fault: NumericFault::DivisionByZero, .. })
                if name == "beat"
        ),
        "{:?}",
        err
    );
}

#[test]
fn zero_lag_delay_reads_the_current_step_in_any_order() {
    let mut m = Model::new("m");
    let reader = m.add("reader", Reference::unbound_variable()).unwrap();
    let src = m.add("src", Reference::variable(3.0)).unwrap();
    m.bind(reader, src.delay(0, -1.0)).unwrap();
    let trace = m.simulate(2, 1).unwrap();
    assert_eq!(trace.series("reader", 0).unwrap(), vec![3.0; 3]);
}

#[test]
fn zero_lag_self_delay_is_a_cycle() {
    let mut m = Model::new("m");
    let x = m.add("x", Reference::unbound_variable()).unwrap();
    m.bind(x, x.delay(0, 1.0)).unwrap();
    assert_eq!(m.flatten().unwrap_err(), DefinitionError::Cycle { names: vec!["x".into()] });
}

#[test]
fn overflow_is_a_runtime_fault() {
    let mut m = Model::new("m");
    m.add("big", Reference::variable(ops::exp(1000.0))).unwrap();
    let err = m.simulate(1, 1).unwrap_err();
    assert!(
        matches!(
            err,
            SimulationError::Runtime(RuntimeError { ref name, fault: NumericFault::NonFinite, .. }) if name == "big"
        ),
        "{:?}",
        err
    );
}
