// tests/fields.rs

use num_complex::Complex64;
use polyspectra::field::smoothing::{smoothing_filter_fourier_space, SmoothingFilter};
use polyspectra::{FourierField, Grid, GridConfig, GridGeometry, GridStatus, SpectraError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps
}

fn approx_eq_slice(a: &[f64], b: &[f64], eps: f64) {
    assert_eq!(a.len(), b.len(), "len mismatch: {} vs {}", a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        assert!(approx_eq(*x, *y, eps), "idx {}: {} != {} (eps={})", i, x, y, eps);
    }
}

fn random_grid(ndim: usize, nmesh: usize, seed: u64) -> Grid {
    let mut rng = StdRng::seed_from_u64(seed);
    let geometry = GridGeometry::new(ndim, nmesh).unwrap();
    let values: Vec<f64> = (0..geometry.num_real_cells()).map(|_| rng.random_range(-1.0..1.0)).collect();
    Grid::from_real_values(geometry, values).unwrap()
}

//===================================================================
// ---------------------------- Geometry -----------------------------
//===================================================================

#[test]
fn geometry_shapes_and_modes() {
    let g = GridGeometry::new(3, 8).unwrap();
    assert_eq!(g.real_shape(), vec![8, 8, 8]);
    assert_eq!(g.fourier_shape(), vec![8, 8, 5]);
    assert_eq!(g.num_fourier_cells(), 320);

    let mut modes = vec![0isize; 3];
    // (x=5, y=2, z=3): x folds to 5-8 = -3
    g.mode_numbers((5 * 8 + 2) * 5 + 3, &mut modes);
    assert_eq!(modes, vec![-3, 2, 3]);

    let (kvec, kmag) = g.wavevector_and_norm((1 * 8 + 0) * 5 + 0);
    assert!(approx_eq(kvec[0], 2.0 * PI, 1e-14));
    assert!(approx_eq(kmag, 2.0 * PI, 1e-14));
}

#[test]
fn hermitian_weights_sum_to_cell_count() {
    for (ndim, nmesh) in [(1, 8), (2, 6), (2, 7), (3, 8), (3, 5)] {
        let g = GridGeometry::new(ndim, nmesh).unwrap();
        let total: f64 = (0..g.num_fourier_cells()).map(|i| g.hermitian_weight(i)).sum();
        assert_eq!(total, g.num_cells_total() as f64, "ndim={ndim}, nmesh={nmesh}");
    }
}

#[test]
fn slab_geometry_offsets_axis_zero() {
    let g = GridGeometry::slab(2, 8, 4, 2).unwrap();
    let mut coord = vec![0usize; 2];
    g.real_coords(3, &mut coord);
    assert_eq!(coord, vec![4, 3]);
    assert_eq!(g.local_real_index(&[5, -1]), Some(8 + 7));
    assert_eq!(g.local_real_index(&[-1, 0]), None);

    assert!(matches!(GridGeometry::slab(2, 8, 6, 4), Err(SpectraError::InvalidGrid(_))));
    assert!(matches!(GridGeometry::slab(1, 8, 0, 4), Err(SpectraError::InvalidGrid(_))));
}

//===================================================================
// ---------------------------- Transforms ---------------------------
//===================================================================

#[test]
fn forward_then_inverse_is_identity() {
    for (ndim, nmesh, seed) in [(1, 16, 1), (2, 6, 2), (2, 5, 3), (3, 8, 4), (3, 7, 5)] {
        let mut grid = random_grid(ndim, nmesh, seed);
        let original = grid.real_values().to_vec();
        grid.forward_transform().unwrap();
        assert_eq!(grid.status(), GridStatus::Fourier);
        assert_eq!(grid.fourier_values().len(), grid.geometry().num_fourier_cells());
        grid.inverse_transform().unwrap();
        approx_eq_slice(grid.real_values(), &original, 1e-12);
    }
}

#[test]
fn forward_transform_is_normalized_by_cell_count() {
    let geometry = GridGeometry::new(3, 4).unwrap();
    let mut grid = Grid::from_real_values(geometry, vec![2.5; 64]).unwrap();
    grid.forward_transform().unwrap();
    let f = grid.fourier_values();
    assert!(approx_eq(f[0].re, 2.5, 1e-14));
    assert!(f[1..].iter().all(|c| c.norm() < 1e-14));
}

#[test]
fn single_cosine_lands_on_one_mode() {
    let n = 8;
    let geometry = GridGeometry::new(2, n).unwrap();
    let values: Vec<f64> = (0..n * n)
        .map(|i| {
            let y = (i % n) as f64 / n as f64;
            (2.0 * PI * 3.0 * y).cos()
        })
        .collect();
    let mut grid = Grid::from_real_values(geometry, values).unwrap();
    grid.forward_transform().unwrap();
    let f = grid.fourier_values();
    // (n_x = 0, n_y = 3) carries half of the amplitude, its conjugate is implicit
    assert!(approx_eq(f[3].re, 0.5, 1e-14));
    let rest: f64 = f.iter().enumerate().filter(|(i, _)| *i != 3).map(|(_, c)| c.norm()).sum();
    assert!(rest < 1e-12);
}

#[test]
fn wrong_representation_and_slabs_are_errors() {
    let mut grid = Grid::new(GridConfig::new(2, 4)).unwrap();
    assert!(matches!(
        grid.inverse_transform(),
        Err(SpectraError::GridStatus { expected: GridStatus::Fourier, actual: GridStatus::Real })
    ));
    let mut slab = Grid::slab(GridConfig::new(2, 4), 0, 2).unwrap();
    assert!(matches!(slab.forward_transform(), Err(SpectraError::Unsupported(_))));

    grid.forward_transform().unwrap();
    let part = grid.extract_slab(2, 2).unwrap();
    assert_eq!(part.status(), GridStatus::Fourier);
    assert_eq!(part.fourier_values().len(), 2 * 3);
}

#[test]
fn grid_saves_as_json() {
    let grid = random_grid(2, 4, 9);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grid.json");
    grid.save(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["status"], "Real");
    assert_eq!(json["values"].as_array().map(Vec::len), Some(16));
}

//===================================================================
// ---------------------------- Smoothing ----------------------------
//===================================================================

#[test]
fn filter_names_parse_case_insensitively() {
    assert_eq!("sharpk".parse::<SmoothingFilter>().unwrap(), SmoothingFilter::SharpK);
    assert_eq!("Gaussian".parse::<SmoothingFilter>().unwrap(), SmoothingFilter::Gaussian);
    assert_eq!("TOPHAT".parse::<SmoothingFilter>().unwrap(), SmoothingFilter::TopHat);
    assert!(matches!("boxcar".parse::<SmoothingFilter>(), Err(SpectraError::UnknownFilter(_))));
}

#[test]
fn filter_windows() {
    assert_eq!(SmoothingFilter::SharpK.window(0.99, 3).unwrap(), 1.0);
    assert_eq!(SmoothingFilter::SharpK.window(1.0, 3).unwrap(), 0.0);
    assert!(approx_eq(SmoothingFilter::Gaussian.window(2.0, 3).unwrap(), (-2.0f64).exp(), 1e-15));
    assert_eq!(SmoothingFilter::TopHat.window(0.0, 3).unwrap(), 1.0);
    assert!(approx_eq(SmoothingFilter::TopHat.window(1e-3, 3).unwrap(), 1.0, 1e-6));
    assert!(approx_eq(SmoothingFilter::TopHat.window(1e-3, 2).unwrap(), 1.0, 1e-6));
    assert!(matches!(SmoothingFilter::TopHat.window(1.0, 1), Err(SpectraError::Unsupported(_))));
}

#[test]
fn sharpk_smoothing_removes_high_modes() {
    let mut grid = random_grid(3, 8, 11);
    grid.forward_transform().unwrap();
    let scale = 1.0 / (2.0 * PI * 2.5);
    smoothing_filter_fourier_space(&mut grid, scale, SmoothingFilter::SharpK).unwrap();

    let g = *grid.geometry();
    for (idx, value) in grid.fourier_values().iter().enumerate() {
        let (_, kmag) = g.wavevector_and_norm(idx);
        if kmag * scale >= 1.0 {
            assert_eq!(*value, Complex64::new(0.0, 0.0));
        }
    }

    let mut line = Grid::new(GridConfig::new(1, 8)).unwrap();
    line.forward_transform().unwrap();
    assert!(matches!(
        smoothing_filter_fourier_space(&mut line, 0.1, SmoothingFilter::TopHat),
        Err(SpectraError::Unsupported(_))
    ));
}

#[test]
fn tophat_smoothing_multiplies_each_cell_by_its_window() {
    let mut grid = random_grid(2, 8, 17);
    grid.forward_transform().unwrap();
    let before = grid.fourier_values().to_vec();
    let scale = 0.05;
    smoothing_filter_fourier_space(&mut grid, scale, SmoothingFilter::TopHat).unwrap();

    let g = *grid.geometry();
    for (idx, (a, b)) in before.iter().zip(grid.fourier_values()).enumerate() {
        let (_, kmag) = g.wavevector_and_norm(idx);
        let w = SmoothingFilter::TopHat.window(kmag * scale, 2).unwrap();
        assert!((*a * w - *b).norm() <= 1e-14 * a.norm().max(1e-300), "cell {idx}");
    }

    // a rejected filter leaves every cell untouched
    let mut line = random_grid(1, 8, 18);
    line.forward_transform().unwrap();
    let untouched = line.fourier_values().to_vec();
    assert!(smoothing_filter_fourier_space(&mut line, scale, SmoothingFilter::TopHat).is_err());
    assert_eq!(line.fourier_values(), &untouched[..]);
}
