// tests/assignment.rs

use polyspectra::particles::assignment::{assign_mass, deconvolve_window, particles_to_grid};
use polyspectra::{DensityAssignment, FourierField, Grid, GridConfig, GridGeometry, ParticleContainer, Particles, SpectraError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::f64::consts::PI;

const METHODS: [DensityAssignment; 4] =
    [DensityAssignment::Ngp, DensityAssignment::Cic, DensityAssignment::Tsc, DensityAssignment::Pcs];

fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps
}

#[test]
fn method_names_round_trip() {
    for m in METHODS {
        assert_eq!(m.to_string().parse::<DensityAssignment>().unwrap(), m);
        assert_eq!(m.to_string().to_lowercase().parse::<DensityAssignment>().unwrap(), m);
    }
    assert!(matches!("SPH".parse::<DensityAssignment>(), Err(SpectraError::UnknownAssignment(_))));
    assert_eq!(DensityAssignment::Tsc.order(), 3);
    assert_eq!(DensityAssignment::Cic.slices_needed(), (0, 1));
    assert_eq!(DensityAssignment::Pcs.slices_needed(), (1, 2));
}

#[test]
fn kernel_weights_sum_to_one() {
    for m in METHODS {
        for u in [0.0, 0.3, 3.5, 7.99] {
            let mut w = [0.0; 4];
            m.axis_weights(u, &mut w);
            let total: f64 = w[..m.order()].iter().sum();
            assert!(approx_eq(total, 1.0, 1e-14), "{m} at u={u}: {total}");
        }
    }
}

#[test]
fn assignment_conserves_mass_across_the_boundary() {
    let particles = Particles::<3>::from_points(vec![[0.0, 0.0, 0.0], [0.99, 0.5, 0.01], [0.5, 0.999, 0.25]]);
    let geometry = GridGeometry::new(3, 8).unwrap();
    for m in METHODS {
        let mass = assign_mass(&particles, &geometry, m, 0.0).unwrap();
        let total: f64 = mass.iter().sum();
        assert!(approx_eq(total, 3.0, 1e-12), "{m}: {total}");
        assert!(mass.iter().all(|&w| w >= -1e-15));
    }
}

#[test]
fn ngp_puts_a_particle_on_its_nearest_node() {
    let particles = Particles::<2>::from_points(vec![[0.26, 0.74]]);
    let geometry = GridGeometry::new(2, 4).unwrap();
    let mass = assign_mass(&particles, &geometry, DensityAssignment::Ngp, 0.0).unwrap();
    // (0.26·4, 0.74·4) = (1.04, 2.96) → node (1, 3)
    assert_eq!(mass[1 * 4 + 3], 1.0);
    assert_eq!(mass.iter().sum::<f64>(), 1.0);
}

#[test]
fn offset_shifts_without_touching_positions() {
    let particles = Particles::<1>::from_points(vec![[0.1]]);
    let before = particles.clone();
    let geometry = GridGeometry::new(1, 10).unwrap();
    let mass = assign_mass(&particles, &geometry, DensityAssignment::Ngp, 0.12).unwrap();
    assert_eq!(mass[2], 1.0);
    assert_eq!(particles, before);
}

#[test]
fn density_contrast_has_zero_mean() {
    let mut rng = StdRng::seed_from_u64(7);
    let particles = Particles::<3>::random_uniform(500, &mut rng).unwrap();
    for m in METHODS {
        let mut grid = Grid::new(GridConfig::new(3, 8)).unwrap();
        particles_to_grid(&particles, &mut grid, m, 0.0).unwrap();
        let mean = grid.real_values().iter().sum::<f64>() / 512.0;
        assert!(approx_eq(mean, 0.0, 1e-12), "{m}: mean {mean}");
    }
}

#[test]
fn dimension_mismatch_is_reported() {
    let particles = Particles::<2>::from_points(vec![[0.1, 0.2]]);
    let geometry = GridGeometry::new(3, 4).unwrap();
    assert!(matches!(
        assign_mass(&particles, &geometry, DensityAssignment::Cic, 0.0),
        Err(SpectraError::DimensionMismatch { expected: 3, actual: 2 })
    ));
}

#[test]
fn window_is_a_power_of_sinc() {
    let w = DensityAssignment::Cic.window(&[4, 0], 8);
    let s = (PI / 2.0).sin() / (PI / 2.0);
    assert!(approx_eq(w, s * s, 1e-15));
    assert_eq!(DensityAssignment::Pcs.window(&[0, 0, 0], 8), 1.0);
}

#[test]
fn deconvolution_divides_by_the_window() {
    let mut rng = StdRng::seed_from_u64(3);
    let particles = Particles::<2>::random_uniform(200, &mut rng).unwrap();
    let mut grid = Grid::new(GridConfig::new(2, 8)).unwrap();
    particles_to_grid(&particles, &mut grid, DensityAssignment::Tsc, 0.0).unwrap();
    assert!(matches!(deconvolve_window(&mut grid, DensityAssignment::Tsc), Err(SpectraError::GridStatus { .. })));

    grid.forward_transform().unwrap();
    let before = grid.fourier_values().to_vec();
    deconvolve_window(&mut grid, DensityAssignment::Tsc).unwrap();

    let g = *grid.geometry();
    let mut modes = vec![0isize; 2];
    for (idx, (a, b)) in before.iter().zip(grid.fourier_values()).enumerate() {
        g.mode_numbers(idx, &mut modes);
        let w = DensityAssignment::Tsc.window(&modes, 8);
        assert!((*b * w - *a).norm() < 1e-12);
    }
}

#[test]
fn random_particles_stay_in_the_unit_box() {
    let mut rng = StdRng::seed_from_u64(21);
    let mut particles = Particles::<3>::random_uniform(1000, &mut rng)
        .unwrap()
        .with_gaussian_velocities(2.0, &mut rng)
        .unwrap();
    assert_eq!(particles.num_local(), 1000);
    assert!((0..3).any(|d| particles.velocities(d).iter().any(|&v| v != 0.0)));

    particles.displace_along_axis(1, 0.37);
    for d in 0..3 {
        assert!(particles.positions(d).iter().all(|&x| (0.0..1.0).contains(&x)));
    }
}

#[test]
fn particles_round_trip_through_json() {
    let mut rng = StdRng::seed_from_u64(5);
    let particles = Particles::<2>::random_uniform(7, &mut rng).unwrap().with_gaussian_velocities(1.0, &mut rng).unwrap();
    let text = serde_json::to_string(&particles).unwrap();
    let back: Particles<2> = serde_json::from_str(&text).unwrap();
    assert_eq!(back, particles);

    let wrong_rank = r#"{"positions":[[0.1],[0.2],[0.3]],"velocities":[[0.0],[0.0],[0.0]],"num_total":1}"#;
    assert!(serde_json::from_str::<Particles<2>>(wrong_rank).is_err());
    let ragged = r#"{"positions":[[0.1,0.2],[0.3]],"velocities":[[0.0,0.0],[0.0,0.0]],"num_total":2}"#;
    assert!(serde_json::from_str::<Particles<2>>(ragged).is_err());
}
