// End-to-end runs of the background model on simulated Gamma-Poisson count tables.

#[cfg(test)]
mod integration_tests {
    use ndarray::Array2;
    use rand::distributions::Distribution;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use single_gampois::{
        CountTable, GammaPoissonParams, fit_gamma_poisson, gamma_poisson_model, mlxp_ceiling,
    };
    use statrs::distribution::{Gamma, Poisson};

    fn simulate(n_rows: usize, n_cols: usize, alpha: f64, beta: f64, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let prior = Gamma::new(alpha, beta).unwrap();
        let mut counts = Array2::<f64>::zeros((n_rows, n_cols));
        for i in 0..n_rows {
            let rate: f64 = prior.sample(&mut rng);
            let draws = Poisson::new(rate).unwrap();
            for j in 0..n_cols {
                let count: f64 = draws.sample(&mut rng);
                counts[[i, j]] = count;
            }
        }
        counts
    }

    fn labeled(values: Array2<f64>) -> CountTable<f64> {
        let (n_rows, n_cols) = values.dim();
        CountTable::new(
            values,
            (0..n_rows).map(|i| format!("clone_{}", i)).collect(),
            (0..n_cols).map(|j| format!("sample_{}", j)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn recovers_prior_and_flags_spiked_cells() {
        let mut values = simulate(400, 8, 4.0, 0.4, 7);
        let spikes = [(10, 2), (123, 5), (301, 7)];
        for &(i, j) in &spikes {
            values[[i, j]] = 250.0;
        }
        let counts = labeled(values);

        let fit = fit_gamma_poisson(&counts, &GammaPoissonParams::default()).unwrap();
        println!(
            "alpha={:.3} beta={:.3} prior mean={:.3} upper bound={:.1}",
            fit.alpha(),
            fit.beta(),
            fit.prior.mean(),
            fit.upper_bound
        );

        // Row means of 8 Poisson draws are a noisy proxy for the rates, so only the
        // prior mean is expected to be close.
        assert!((fit.prior.mean() - 10.0).abs() < 1.5, "prior mean {}", fit.prior.mean());

        for &(i, j) in &spikes {
            assert!(
                fit.mlxp.values[[i, j]] > 20.0,
                "spike at ({}, {}) scored {}",
                i,
                j,
                fit.mlxp.values[[i, j]]
            );
        }

        let background_hits = fit
            .mlxp
            .cells_above(6.0)
            .into_iter()
            .filter(|cell| !spikes.contains(cell))
            .count();
        assert!(background_hits <= 10, "{} background cells above 6", background_hits);

        let flagged = fit.significant_cells(20.0);
        assert!(flagged.contains(&("clone_10", "sample_2")));
        assert!(flagged.contains(&("clone_123", "sample_5")));
        assert!(flagged.contains(&("clone_301", "sample_7")));
    }

    #[test]
    fn output_is_finite_and_bounded_below() {
        let mut values = simulate(50, 6, 2.0, 0.5, 11);
        values[[0, 0]] = 1.0e6;
        let counts = labeled(values);

        let (_, _, rates, mlxp) = gamma_poisson_model(&counts, 99.9).unwrap();

        assert!(rates.iter().all(|r| r.is_finite() && *r > 0.0));
        assert!(mlxp.values.iter().all(|v| v.is_finite() && *v >= 0.0));
        assert!(mlxp.values[[0, 0]] > mlxp_ceiling());
        assert_eq!(mlxp.shape(), counts.shape());
    }
}
