use std::cell::Cell;

use approx::assert_relative_eq;
use rand::Rng;
use weft_core::Mode;

use super::*;

/// Distinct nonzero values on the pattern, row-major.
fn values_on(pattern: &Pattern) -> Vec<f64> {
    let (nrows, ncols) = pattern.shape();
    let mut values = vec![0.0; nrows * ncols];
    for (r, c) in pattern.entries() {
        #[allow(clippy::cast_precision_loss)]
        let v = 1.0 + r as f64 * 0.37 + c as f64 * 1.91;
        values[r * ncols + c] = v;
    }
    values
}

/// Compressed products of `values` for every group of the coloring.
fn products(coloring: &Coloring, values: &[f64]) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let (nrows, ncols) = coloring.pattern().shape();
    let fwd = coloring
        .groups(Mode::Fwd)
        .iter()
        .map(|cols| (0..nrows).map(|r| cols.iter().map(|&c| values[r * ncols + c]).sum()).collect())
        .collect();
    let rev = coloring
        .groups(Mode::Rev)
        .iter()
        .map(|rows| (0..ncols).map(|c| rows.iter().map(|&r| values[r * ncols + c]).sum()).collect())
        .collect();
    (fwd, rev)
}

fn assert_recovers(coloring: &Coloring) {
    let values = values_on(coloring.pattern());
    let (fwd, rev) = products(coloring, &values);
    let recovered = coloring.recover(&fwd, &rev).unwrap();
    for (a, e) in recovered.iter().zip(&values) {
        assert_relative_eq!(*a, *e, epsilon = 1e-12);
    }
}

fn config(direction: Direction) -> ColoringConfig {
    ColoringConfig {
        direction,
        ..ColoringConfig::default()
    }
}

fn diagonal(n: usize) -> Pattern {
    Pattern::new(n, n, (0..n).map(|i| (i, i))).unwrap()
}

fn tridiagonal(n: usize) -> Pattern {
    let entries = (0..n).flat_map(|i| {
        [i.checked_sub(1), Some(i), Some(i + 1).filter(|&j| j < n)]
            .into_iter()
            .flatten()
            .map(move |j| (i, j))
    });
    Pattern::new(n, n, entries).unwrap()
}

/// Dense first row and column plus the diagonal.
fn arrowhead(n: usize) -> Pattern {
    let entries = (0..n).flat_map(|i| [(0, i), (i, 0), (i, i)]);
    Pattern::new(n, n, entries).unwrap()
}

/// Dense first row plus the diagonal.
fn dense_row(n: usize) -> Pattern {
    let entries = (0..n).flat_map(|i| [(0, i), (i, i)]);
    Pattern::new(n, n, entries).unwrap()
}

#[test]
fn pattern_basics() {
    let pattern = tridiagonal(4);
    assert_eq!(pattern.shape(), (4, 4));
    assert_eq!(pattern.nnz(), 10);
    assert!(pattern.contains(1, 2));
    assert!(!pattern.contains(0, 3));
    assert_eq!(pattern.row(3), &[2, 3]);
    assert_eq!(pattern.transpose(), pattern);
    assert_relative_eq!(pattern.density(), 10.0 / 16.0);

    assert!(matches!(
        Pattern::new(2, 2, [(0, 2)]),
        Err(Error::OutOfBounds { row: 0, col: 2, .. })
    ));
}

#[test]
fn diagonal_needs_one_solve() {
    let coloring = Coloring::compute(&diagonal(6), &ColoringConfig::default()).unwrap();
    let summary = coloring.summary();

    assert_eq!(summary.total_solves(), 1);
    assert_eq!(summary.naive_solves, 6);
    assert_recovers(&coloring);
}

#[test]
fn dense_matrix_needs_every_column() {
    let pattern = Pattern::new(3, 4, (0..3).flat_map(|r| (0..4).map(move |c| (r, c)))).unwrap();

    let fwd = Coloring::compute(&pattern, &config(Direction::Fwd)).unwrap();
    assert_eq!(fwd.summary().fwd_solves, 4);

    let auto = Coloring::compute(&pattern, &ColoringConfig::default()).unwrap();
    assert_eq!(auto.summary().rev_solves, 3);
    assert_eq!(auto.summary().fwd_solves, 0);
    assert_recovers(&auto);
}

#[test]
fn tridiagonal_needs_three_colors() {
    let coloring = Coloring::compute(&tridiagonal(8), &config(Direction::Fwd)).unwrap();
    assert_eq!(coloring.summary().fwd_solves, 3);

    // Columns sharing a color never share a row.
    for group in coloring.groups(Mode::Fwd) {
        for r in 0..8 {
            let hits = group.iter().filter(|&&c| coloring.pattern().contains(r, c)).count();
            assert!(hits <= 1, "row {r} hit {hits} times in {group:?}");
        }
    }
    assert_recovers(&coloring);
}

#[test]
fn auto_picks_the_cheaper_direction() {
    let pattern = dense_row(5);

    let fwd = Coloring::compute(&pattern, &config(Direction::Fwd)).unwrap();
    let auto = Coloring::compute(&pattern, &config(Direction::Auto)).unwrap();

    assert_eq!(fwd.summary().total_solves(), 5);
    assert_eq!(auto.summary().rev_solves, 2);
    assert_eq!(auto.summary().fwd_solves, 0);
    assert_recovers(&auto);
}

#[test]
fn bidirectional_beats_either_direction_on_arrowhead() {
    let pattern = arrowhead(6);

    let fwd = Coloring::compute(&pattern, &config(Direction::Fwd)).unwrap();
    let rev = Coloring::compute(&pattern, &config(Direction::Rev)).unwrap();
    let bidir = Coloring::compute(&pattern, &config(Direction::Bidirectional)).unwrap();

    assert_eq!(fwd.summary().total_solves(), 6);
    assert_eq!(rev.summary().total_solves(), 6);
    let summary = bidir.summary();
    assert_eq!(summary.fwd_solves, 2);
    assert_eq!(summary.rev_solves, 1);
    assert_recovers(&bidir);
}

#[test]
fn substitution_never_needs_more_solves() {
    let patterns = [arrowhead(7), tridiagonal(7), dense_row(6), {
        let entries = [(0, 0), (0, 1), (0, 2), (0, 3), (1, 0), (1, 1), (1, 2), (1, 3), (2, 2), (3, 3), (2, 0)];
        Pattern::new(4, 4, entries).unwrap()
    }];

    for pattern in &patterns {
        let direct = Coloring::compute(pattern, &config(Direction::Bidirectional)).unwrap();
        let substitution = Coloring::compute(
            pattern,
            &ColoringConfig {
                recovery: Recovery::Substitution,
                ..config(Direction::Bidirectional)
            },
        )
        .unwrap();

        assert!(substitution.summary().total_solves() <= direct.summary().total_solves());
        assert_recovers(&direct);
        assert_recovers(&substitution);
    }
}

#[test]
fn recover_checks_products() {
    let coloring = Coloring::compute(&tridiagonal(4), &config(Direction::Fwd)).unwrap();

    let err = coloring.recover(&[vec![0.0; 4]], &[]).unwrap_err();
    assert!(matches!(
        err,
        Error::Products {
            mode: Mode::Fwd,
            expected: 3,
            found: 1
        }
    ));

    let short = vec![vec![0.0; 3]; 3];
    assert!(matches!(
        coloring.recover(&short, &[]),
        Err(Error::Length { expected: 4, found: 3 })
    ));
}

#[test]
fn detect_keeps_entries_that_vanish_at_one_sample() {
    let mut calls = 0;
    let pattern = Pattern::detect(2, 2, &ColoringConfig::default(), |rng| {
        calls += 1;
        let a: f64 = rng.gen_range(1.0..2.0);
        // (0, 1) is zero at the first sample only; (1, 0) is numerically zero.
        let b = if calls == 1 { 0.0 } else { a };
        Ok::<_, std::convert::Infallible>(vec![a, b, 1e-30, a * a])
    })
    .unwrap();

    assert_eq!(calls, 3);
    assert!(pattern.contains(0, 0));
    assert!(pattern.contains(0, 1));
    assert!(!pattern.contains(1, 0));
    assert!(pattern.contains(1, 1));
}

#[test]
fn detect_reports_failed_samples() {
    let err = Pattern::detect(1, 1, &ColoringConfig::default(), |_| {
        Err::<Vec<f64>, _>(std::io::Error::other("model failed"))
    })
    .unwrap_err();
    assert!(matches!(err, Error::Sample(_)));

    let err = Pattern::detect(2, 2, &ColoringConfig::default(), |_| {
        Ok::<_, std::convert::Infallible>(vec![1.0])
    })
    .unwrap_err();
    assert!(matches!(err, Error::Length { expected: 4, found: 1 }));
}

#[test]
fn json_round_trip_checks_signature() {
    let config = ColoringConfig::default();
    let signature = Signature::new((6, 6), 42, &config);
    let coloring = Coloring::compute(&arrowhead(6), &config)
        .unwrap()
        .with_signature(signature.clone());

    let json = coloring.to_json().unwrap();
    let loaded = Coloring::from_json(&json, &signature).unwrap();
    assert_eq!(loaded, coloring);

    let changed = Signature::new((6, 6), 43, &config);
    assert!(matches!(
        Coloring::from_json(&json, &changed),
        Err(Error::StaleSignature)
    ));

    let retuned = Signature::new(
        (6, 6),
        42,
        &ColoringConfig {
            tol: 1e-12,
            ..config
        },
    );
    assert!(!coloring.is_valid_for(&retuned));
}

#[test]
fn signature_tolerance_is_exact_after_json() {
    for tol in [1e-25, 1e-12, 0.1, 3.0e-7] {
        let signature = Signature::new((4, 4), 5, &ColoringConfig { tol, ..ColoringConfig::default() });
        let json = serde_json::to_string(&signature).unwrap();
        let parsed: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, signature);
        assert_eq!(parsed.tol().to_bits(), tol.to_bits());
    }
}

#[test]
fn fingerprint_is_fixed_fnv1a() {
    assert_eq!(Fingerprint::new().finish(), 0xcbf2_9ce4_8422_2325);
    assert_eq!(Fingerprint::new().indices(&[1, 2, 3]).finish(), 0xb981_0813_92b0_3a26);
    assert_ne!(
        Fingerprint::new().indices(&[1, 2]).finish(),
        Fingerprint::new().indices(&[2, 1]).finish()
    );
    assert_ne!(
        Fingerprint::new().indices(&[1]).indices(&[]).finish(),
        Fingerprint::new().indices(&[]).indices(&[1]).finish()
    );
}

#[test]
fn changing_direction_or_recovery_forces_a_recompute() {
    let path = std::env::temp_dir().join(format!("weft-coloring-settings-{}.json", std::process::id()));
    let substitution = ColoringConfig {
        direction: Direction::Bidirectional,
        recovery: Recovery::Substitution,
        tol: 1e-12,
        ..ColoringConfig::default()
    };
    let fwd_direct = ColoringConfig {
        direction: Direction::Fwd,
        recovery: Recovery::Direct,
        ..substitution
    };
    let bidirectional_direct = ColoringConfig {
        recovery: Recovery::Direct,
        ..substitution
    };

    let first = Signature::new((6, 6), 9, &substitution);
    let mut cache = ColoringCache::with_file(&path);
    let stored = cache
        .get_or_compute(&first, || Coloring::compute(&arrowhead(6), &substitution))
        .unwrap();
    assert_eq!(stored.recovery(), Recovery::Substitution);

    for config in [fwd_direct, bidirectional_direct] {
        let signature = Signature::new((6, 6), 9, &config);
        assert_ne!(signature, first);

        let mut restarted = ColoringCache::with_file(&path);
        let mut recomputed = false;
        let coloring = restarted
            .get_or_compute(&signature, || {
                recomputed = true;
                Coloring::compute(&arrowhead(6), &config)
            })
            .unwrap();
        assert!(recomputed);
        assert_eq!(coloring.recovery(), Recovery::Direct);
    }

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn cache_recomputes_only_on_structural_change() {
    let config = ColoringConfig::default();
    let computed = Cell::new(0);
    let compute = |pattern: Pattern| {
        computed.set(computed.get() + 1);
        Coloring::compute(&pattern, &config)
    };

    let mut cache = ColoringCache::new();
    let first = Signature::new((5, 5), 1, &config);
    let second = Signature::new((5, 5), 2, &config);

    cache.get_or_compute(&first, || compute(diagonal(5))).unwrap();
    cache.get_or_compute(&first, || compute(diagonal(5))).unwrap();
    assert_eq!(computed.get(), 1);

    let coloring = cache.get_or_compute(&second, || compute(tridiagonal(5))).unwrap();
    assert_eq!(coloring.summary().fwd_solves, 3);
    assert_eq!(computed.get(), 2);

    cache.invalidate();
    assert!(cache.current().is_none());
    cache.get_or_compute(&second, || compute(tridiagonal(5))).unwrap();
    assert_eq!(computed.get(), 3);
}

#[test]
fn file_cache_survives_a_restart() {
    let path = std::env::temp_dir().join(format!("weft-coloring-{}.json", std::process::id()));
    let config = ColoringConfig::default();
    let signature = Signature::new((6, 6), 7, &config);

    let mut cache = ColoringCache::with_file(&path);
    let saved = cache
        .get_or_compute(&signature, || Coloring::compute(&arrowhead(6), &config))
        .unwrap()
        .clone();

    let mut restarted = ColoringCache::with_file(&path);
    let loaded = restarted
        .get_or_compute(&signature, || panic!("should load from file"))
        .unwrap();
    assert_eq!(*loaded, saved);

    let stale = Signature::new((6, 6), 8, &config);
    let mut recomputed = false;
    restarted
        .get_or_compute(&stale, || {
            recomputed = true;
            Coloring::compute(&arrowhead(6), &config)
        })
        .unwrap();
    assert!(recomputed);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn config_deserializes_from_toml() {
    let config: ColoringConfig = toml::from_str(
        r#"
        direction = "bidirectional"
        recovery = "substitution"
        num_full_jacs = 5
        "#,
    )
    .unwrap();

    assert_eq!(config.direction, Direction::Bidirectional);
    assert_eq!(config.recovery, Recovery::Substitution);
    assert_eq!(config.num_full_jacs, 5);
    assert_relative_eq!(config.tol, 1e-25);

    let bad = ColoringConfig {
        num_full_jacs: 0,
        ..config
    };
    assert!(matches!(
        Coloring::compute(&diagonal(2), &bad),
        Err(Error::InvalidConfig(ConfigError::Samples))
    ));
}
