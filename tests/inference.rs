use stockflow_core::solver::{self, InferenceError};
use stockflow_core::*;

/// `rate ~ prior`, poured into a stock for ten steps; `final` is the level.
fn accumulator(prior: Distribution) -> Model {
    let mut m = Model::new("acc").with_steps(10);
    let rate = m.add("rate", Reference::free(prior)).unwrap();
    let level = m.add("level", Reference::stock()).unwrap();
    let pour = m.add("pour", Reference::flow_eq(rate)).unwrap();
    m.inflow(level, pour).unwrap();
    m.add("final", Reference::metric(level)).unwrap();
    m
}

#[test]
fn prior_predictive_matches_simulation() {
    let m = accumulator(Distribution::uniform(0.0, 1.0));
    let simulated = m.simulate_with(&RunConfig::new(10, 4000).seed(11)).unwrap();
    let config = InferConfig { draws: 4000, seed: 5, ..InferConfig::default() };
    let sampled = m.infer(&[], true, &config).unwrap();

    let sim_mean = simulated.mean("final").unwrap()[0];
    let prior_mean = sampled.mean("final").unwrap()[0];
    assert!((sim_mean - 5.0).abs() < 0.3, "simulated mean {}", sim_mean);
    assert!((prior_mean - 5.0).abs() < 0.3, "prior predictive mean {}", prior_mean);
    assert_eq!(sampled.samples, 4000);
    assert_eq!(sampled.get("level").unwrap().dims, vec!["draw", "t", "dim"]);
    assert_eq!(simulated.get("level").unwrap().dims, vec!["rep", "t", "dim"]);
}

#[test]
fn posterior_concentrates_on_observed_rate() {
    let m = accumulator(Distribution::uniform(0.0, 10.0));
    let final_ref = m.lookup("final").unwrap();
    let observation = m.observe(final_ref, vec![50.0], 1.0).unwrap();
    let config = InferConfig { draws: 2000, tune: 1000, seed: 3, ..InferConfig::default() };
    let trace = m.infer(&[observation], false, &config).unwrap();

    // rate is constant over time; step 0 is enough
    let rate = trace.get("rate").unwrap();
    let mean = (0..trace.samples).filter_map(|d| rate.get(&[d, 0, 0])).sum::<f64>() / trace.samples as f64;
    assert!((mean - 5.0).abs() < 0.3, "posterior mean {}", mean);
}

#[test]
fn prior_only_ignores_observations() {
    let m = accumulator(Distribution::uniform(0.0, 1.0));
    let observation = Observation::new("final", vec![1000.0], 0.1);
    let config = InferConfig { draws: 500, ..InferConfig::default() };
    let trace = m.infer(&[observation], true, &config).unwrap();
    let mean = trace.mean("final").unwrap()[0];
    assert!(mean < 10.0);
}

#[test]
fn cancelled_inference_returns_cancelled() {
    let flat = accumulator(Distribution::uniform(0.0, 1.0)).flatten().unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = solver::infer(&flat, &[], false, &InferConfig::default(), &cancel).unwrap_err();
    assert_eq!(err, InferenceError::Cancelled);
}

#[test]
fn malformed_observations_are_rejected() {
    let m = accumulator(Distribution::uniform(0.0, 1.0));
    let config = InferConfig { draws: 10, tune: 10, ..InferConfig::default() };
    let cases = [
        Observation::new("missing", vec![1.0], 1.0),
        Observation::new("level", vec![1.0], 1.0),
        Observation::new("final", vec![1.0], 0.0),
        Observation::new("final", vec![], 1.0),
        Observation::new("final", vec![f64::NAN], 1.0),
    ];
    for observation in cases {
        let err = m.infer(&[observation.clone()], false, &config).unwrap_err();
        assert!(matches!(err, InferenceError::MalformedObservation { .. }), "{:?} -> {:?}", observation, err);
    }
}

#[test]
fn definition_errors_surface_before_compiling() {
    let mut m = Model::new("m");
    m.add("orphan", Reference::flow()).unwrap();
    let err = m.infer(&[], true, &InferConfig::default()).unwrap_err();
    assert!(matches!(err, InferenceError::Definition(DefinitionError::MissingEquation { .. })));
}

#[test]
fn stock_init_prior_is_sampled() {
    let mut m = Model::new("m").with_steps(2);
    m.add("level", Reference::stock().init_prior(Distribution::discrete_uniform(1, 3))).unwrap();
    let config = InferConfig { draws: 300, seed: 9, ..InferConfig::default() };
    let trace = m.infer(&[], true, &config).unwrap();
    let level = trace.get("level").unwrap();
    for draw in 0..trace.samples {
        let v = level.get(&[draw, 0, 0]).unwrap();
        assert!([1.0, 2.0, 3.0].contains(&v), "{}", v);
        assert_eq!(level.get(&[draw, 2, 0]), Some(v));
    }
    assert_eq!(m.free_refs(true), vec!["level.init"]);
}

#[test]
fn compiled_vector_stock_matches_simulation() {
    let mut m = Model::new("m");
    let s = m.add("s", Reference::stock().init(vec![0.0, 0.0, 0.0]).dim(3)).unwrap();
    let f = m.add("f", Reference::flow_eq(vec![1.0, 2.0, 3.0]).dim(3)).unwrap();
    m.inflow(s, f).unwrap();

    let simulated = m.simulate(2, 1).unwrap();
    let config = InferConfig { draws: 4, steps: Some(2), ..InferConfig::default() };
    let sampled = m.infer(&[], true, &config).unwrap();

    let s = sampled.get("s").unwrap();
    assert_eq!(s.shape, vec![4, 3, 3]);
    for d in 0..3 {
        assert_eq!(s.series(0, d), simulated.get("s").unwrap().series(0, d));
    }
    assert_eq!(s.series(3, 2).unwrap(), vec![0.0, 3.0, 6.0]);
}
