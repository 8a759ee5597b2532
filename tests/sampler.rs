mod common;

use alterproj::prior::{self, Precision};
use alterproj::{
    sample_posterior, AlternatingProjection, DataSource, ParameterSet, SamplerConfig, SamplerError,
};
use approx::assert_relative_eq;
use common::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("alterproj=debug")
        .try_init();
}

fn config(seed: u64) -> SamplerConfig {
    SamplerConfig {
        seed: Some(seed),
        max_epochs: 200,
        tolerance: 1e-12,
        ..SamplerConfig::default()
    }
}

#[test]
fn prior_variance_matches_precision() {
    let template = ParameterSet::new().with("p", ndarray::arr0(0.0).into_dyn());
    let mut rng = StdRng::seed_from_u64(2024);
    let draws = prior::draw_many(&mut rng, &template, &Precision::Scalar(4.0), 10_000).expect("draws");
    let values: Vec<f64> = draws.iter().flat_map(|d| d.flatten()).collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sd = (values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
    assert!(mean.abs() < 0.02, "mean {mean}");
    assert_relative_eq!(sd, 0.5, max_relative = 0.03);
}

#[test]
fn two_planes_converge_to_their_intersection() {
    init_tracing();
    let params = linear_params([0.5, 0.5, 0.5]);
    let data = two_plane_data();
    let prepared = AlternatingProjection::new(config(0))
        .expect("valid config")
        .prepare(&LinearSquared, &params, &data)
        .expect("prepares");

    let sample = prepared
        .project_sample(0, &linear_params([1.0, 2.0, 3.0]))
        .expect("projects");
    assert!(sample.converged);
    assert_eq!(sample.epochs, sample.deltas.len());
    assert!(sample.epochs < 100);
    // The angle between the planes halves the in-plane error each epoch.
    for pair in sample.deltas.windows(2).take(20) {
        assert!(pair[1] < pair[0], "deltas {:?}", sample.deltas);
    }

    let w = sample.params.get("w").expect("w");
    assert!(w[0].abs() < 1e-10);
    assert!(w[1].abs() < 1e-10);
    assert_eq!(w[2], 3.0);

    let absolute = sample.params_around(&params).expect("same layout");
    assert_relative_eq!(absolute.get("w").expect("w")[2], 3.5);
}

#[test]
fn posterior_samples_satisfy_every_batch() {
    let params = linear_params([0.5, 0.5, 0.5]);
    let data = two_plane_data();
    let samples = sample_posterior(5, &LinearSquared, &params, &Precision::Scalar(1.0), &data, config(11))
        .expect("samples");
    assert_eq!(samples.len(), 5);

    let prepared = AlternatingProjection::new(config(11))
        .expect("valid config")
        .prepare(&LinearSquared, &params, &data)
        .expect("prepares");
    for s in &samples {
        assert!(s.converged);
        for batch in data.batches() {
            for r in prepared.projector().residual(&s.params, &batch).expect("residual") {
                assert!(r.abs() < 1e-9, "residual {r}");
            }
        }
    }
    // Distinct prior draws keep distinct free components.
    assert_ne!(samples[0].params, samples[1].params);
}

#[test]
fn fixed_seed_is_reproducible_and_order_independent() {
    let params = mlp_params();
    let data = mlp_data(12, 4);
    let cfg = SamplerConfig {
        seed: Some(3),
        max_epochs: 5,
        ..SamplerConfig::default()
    };
    let a = sample_posterior(4, &TanhMlp, &params, &Precision::Scalar(2.0), &data, cfg.clone())
        .expect("samples");
    let b = sample_posterior(4, &TanhMlp, &params, &Precision::Scalar(2.0), &data, cfg.clone())
        .expect("samples");
    assert_eq!(a, b);

    let serial = SamplerConfig {
        parallel_samples: false,
        ..cfg
    };
    let c = sample_posterior(4, &TanhMlp, &params, &Precision::Scalar(2.0), &data, serial)
        .expect("samples");
    assert_eq!(a, c);
}

#[test]
fn projection_never_grows_the_prior_draw() {
    let params = mlp_params();
    let data = mlp_data(12, 4);
    let precision = Precision::Scalar(1.0);
    let prepared = AlternatingProjection::new(SamplerConfig {
        max_epochs: 10,
        tolerance: 0.0,
        ..SamplerConfig::default()
    })
    .expect("valid config")
    .prepare(&TanhMlp, &params, &data)
    .expect("prepares");

    let samples = prepared
        .sample_with_rng(3, &precision, &mut StdRng::seed_from_u64(5))
        .expect("samples");
    let priors = prior::draw_many(&mut StdRng::seed_from_u64(5), &params, &precision, 3)
        .expect("draws");

    let last = data.batches().last().expect("batches").into_owned();
    let jnorm = prepared.projector().batched().jacobian(&last).norm();
    for (s, p) in samples.iter().zip(&priors) {
        assert_eq!(s.epochs, 10);
        assert!(!s.converged);
        assert!(s.params.norm() <= p.norm() * (1.0 + 1e-12));
        // The sweep ends on the last batch, whose constraint holds exactly.
        for r in prepared.projector().residual(&s.params, &last).expect("residual") {
            assert!(r.abs() < 1e-9 * jnorm * p.norm(), "residual {r}");
        }
        s.params.check_compatible(&params).expect("shaped like params");
    }
}

#[test]
fn persisted_cache_gives_identical_samples() {
    let dir = TempDir::new().expect("tempdir");
    let params = mlp_params();
    let data = mlp_data(8, 4);
    let cfg = SamplerConfig {
        seed: Some(9),
        max_epochs: 3,
        cache_dir: Some(dir.path().to_path_buf()),
        ..SamplerConfig::default()
    };
    let sampler = AlternatingProjection::new(cfg).expect("valid config");

    let first = sampler.prepare(&TanhMlp, &params, &data).expect("builds");
    let files = std::fs::read_dir(dir.path()).expect("dir").count();
    assert_eq!(files, 1);
    let second = sampler.prepare(&TanhMlp, &params, &data).expect("loads");
    assert_eq!(first.cache(), second.cache());

    let precision = Precision::Scalar(1.0);
    assert_eq!(
        first.sample(2, &precision).expect("samples"),
        second.sample(2, &precision).expect("samples")
    );
}

#[test]
fn per_entry_precision_pins_entries() {
    let params = linear_params([0.5, 0.5, 0.5]);
    let data = two_plane_data();
    // Near-infinite precision on every entry: draws are essentially zero.
    let tau = ParameterSet::new().with("w", ndarray::arr1(&[1e12, 1e12, 1e12]).into_dyn());
    let samples = sample_posterior(3, &LinearSquared, &params, &Precision::PerEntry(tau), &data, config(1))
        .expect("samples");
    for s in samples {
        assert!(s.params.norm() < 1e-4);
    }
}

#[test]
fn degenerate_prior_is_reported() {
    let params = linear_params([0.5, 0.5, 0.5]);
    let data = two_plane_data();
    let err = sample_posterior(2, &LinearSquared, &params, &Precision::Scalar(0.0), &data, config(4))
        .expect_err("infinite prior scale");
    assert!(matches!(err, SamplerError::NonFinite { .. }));
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let cfg = SamplerConfig {
        max_epochs: 0,
        ..SamplerConfig::default()
    };
    assert!(matches!(
        AlternatingProjection::new(cfg),
        Err(SamplerError::Config(_))
    ));
}

#[test]
fn changing_the_cutoff_does_not_reuse_a_stored_cache() {
    let dir = TempDir::new().expect("tempdir");
    let params = mlp_params();
    let data = mlp_data(8, 4);
    let with_rtol = |pinv_rtol| SamplerConfig {
        cache_dir: Some(dir.path().to_path_buf()),
        pinv_rtol,
        ..SamplerConfig::default()
    };

    let default = AlternatingProjection::new(with_rtol(None))
        .expect("valid config")
        .prepare(&TanhMlp, &params, &data)
        .expect("builds");
    let loose = AlternatingProjection::new(with_rtol(Some(0.9)))
        .expect("valid config")
        .prepare(&TanhMlp, &params, &data)
        .expect("builds");
    assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 2);
    assert_ne!(default.cache().entries(), loose.cache().entries());

    let fresh = TempDir::new().expect("tempdir");
    let rebuilt = AlternatingProjection::new(SamplerConfig {
        cache_dir: Some(fresh.path().to_path_buf()),
        pinv_rtol: Some(0.9),
        ..SamplerConfig::default()
    })
    .expect("valid config")
    .prepare(&TanhMlp, &params, &data)
    .expect("builds");
    assert_eq!(loose.cache(), rebuilt.cache());
}
