// tests/power_spectrum.rs

use num_complex::Complex64;
use polyspectra::estimators::{
    bin_up_power_spectrum, compute_power_spectrum, compute_power_spectrum_direct_summation,
    compute_power_spectrum_interlacing,
};
use polyspectra::{
    Communicator, DensityAssignment, FourierField, Grid, GridGeometry, Particles, PowerSpectrumBinning, SerialComm,
    SpectraError, ThreadGroupComm,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::thread;

fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps
}

fn approx_eq_slice(a: &[f64], b: &[f64], eps: f64) {
    assert_eq!(a.len(), b.len(), "len mismatch: {} vs {}", a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        assert!(approx_eq(*x, *y, eps), "idx {}: {} != {} (eps={})", i, x, y, eps);
    }
}

fn random_fourier_grid(nmesh: usize, seed: u64) -> Grid {
    let mut rng = StdRng::seed_from_u64(seed);
    let geometry = GridGeometry::new(3, nmesh).unwrap();
    let values: Vec<f64> = (0..geometry.num_real_cells()).map(|_| rng.random_range(-1.0..1.0)).collect();
    let mut grid = Grid::from_real_values(geometry, values).unwrap();
    grid.forward_transform().unwrap();
    grid
}

/// Run `f(rank, comm)` on every member of a thread group and collect the results by rank.
fn on_thread_group<T, F>(world_size: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize, &dyn Communicator) -> T + Sync,
{
    let comms = ThreadGroupComm::group(world_size);
    thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                let f = &f;
                s.spawn(move || {
                    let comm: &dyn Communicator = &comm;
                    f(rank, comm)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

//===================================================================
// ------------------------- Grid estimator --------------------------
//===================================================================

#[test]
fn single_mode_lands_in_one_bin() {
    let geometry = GridGeometry::new(3, 8).unwrap();
    let mut values = vec![Complex64::new(0.0, 0.0); geometry.num_fourier_cells()];
    // n = (1, 2, 3), an interior cell of the half-complex axis
    let idx = (1 * 8 + 2) * 5 + 3;
    let amplitude = Complex64::new(0.3, -0.4);
    values[idx] = amplitude;
    let grid = Grid::from_fourier_values(geometry, values).unwrap();
    assert_eq!(geometry.hermitian_weight(idx), 2.0);

    let mut pofk = PowerSpectrumBinning::linear(4, 0.0, 40.0).unwrap();
    bin_up_power_spectrum(&grid, &mut pofk, &SerialComm).unwrap();

    let kmag = 2.0 * PI * 14f64.sqrt();
    let target = pofk.bin_index(kmag).unwrap();
    for i in 0..4 {
        let total = pofk.pofk[i] * pofk.count[i];
        if i == target {
            assert!(approx_eq(total, 2.0 * amplitude.norm_sqr(), 1e-14));
        } else {
            assert_eq!(total, 0.0);
        }
    }
}

#[test]
fn binning_requires_fourier_space() {
    let grid = Grid::from_real_values(GridGeometry::new(2, 4).unwrap(), vec![0.0; 16]).unwrap();
    let mut pofk = PowerSpectrumBinning::linear(2, 0.0, 10.0).unwrap();
    assert!(matches!(
        bin_up_power_spectrum(&grid, &mut pofk, &SerialComm),
        Err(SpectraError::GridStatus { .. })
    ));
}

#[test]
fn replicated_grid_is_process_count_invariant() {
    let grid = random_fourier_grid(8, 42);
    let template = PowerSpectrumBinning::linear(6, 0.0, 2.0 * PI * 6.0).unwrap();

    let mut serial = template.clone();
    bin_up_power_spectrum(&grid, &mut serial, &SerialComm).unwrap();

    for world_size in [2, 3] {
        let results = on_thread_group(world_size, |_, comm| {
            let mut pofk = template.clone();
            bin_up_power_spectrum(&grid, &mut pofk, comm).unwrap();
            pofk
        });
        for r in &results {
            approx_eq_slice(&r.count, &serial.count, 1e-9);
            approx_eq_slice(&r.pofk, &serial.pofk, 1e-12);
            approx_eq_slice(&r.kbin, &serial.kbin, 1e-9);
        }
    }
}

#[test]
fn slab_decomposition_matches_serial() {
    let grid = random_fourier_grid(8, 5);
    let template = PowerSpectrumBinning::log(5, 2.0 * PI, 2.0 * PI * 7.0).unwrap();

    let mut serial = template.clone();
    bin_up_power_spectrum(&grid, &mut serial, &SerialComm).unwrap();

    let slabs = [(0, 3), (3, 3), (6, 2)];
    let results = on_thread_group(3, |rank, comm| {
        let (start, nx) = slabs[rank];
        let slab = grid.extract_slab(start, nx).unwrap();
        let mut pofk = template.clone();
        bin_up_power_spectrum(&slab, &mut pofk, comm).unwrap();
        pofk
    });
    for r in &results {
        approx_eq_slice(&r.count, &serial.count, 1e-9);
        approx_eq_slice(&r.pofk, &serial.pofk, 1e-12);
    }
}

//===================================================================
// ------------------------ Particle pipelines -----------------------
//===================================================================

#[test]
fn ngp_scenario_16_cubed() {
    let mut rng = StdRng::seed_from_u64(2024);
    let particles = Particles::<3>::random_uniform(1000, &mut rng).unwrap();
    let mut pofk = PowerSpectrumBinning::log(8, 2.0 * PI, 2.0 * PI * 8.0).unwrap();
    compute_power_spectrum(16, &particles, &mut pofk, DensityAssignment::Ngp, &SerialComm).unwrap();

    assert_eq!(pofk.pofk.len(), 8);
    assert!(pofk.pofk.iter().all(|p| p.is_finite()));
    // every bin is noise dominated; after subtraction it scatters around zero
    assert!(pofk.pofk.iter().all(|&p| p > -1.0 / 1000.0 && p < 2e-2));

    // number of modes with 1 <= |n| < 8 on the full 16³ mesh
    let mut expected = 0usize;
    for x in -8i64..8 {
        for y in -8i64..8 {
            for z in -8i64..8 {
                let n2 = x * x + y * y + z * z;
                if (1..64).contains(&n2) {
                    expected += 1;
                }
            }
        }
    }
    assert_eq!(pofk.count.iter().sum::<f64>(), expected as f64);
}

#[test]
fn distributed_particles_match_serial() {
    let mut rng = StdRng::seed_from_u64(99);
    let all = Particles::<3>::random_uniform(600, &mut rng).unwrap();
    let points = all.position_list().to_points();
    let template = PowerSpectrumBinning::linear(4, 2.0 * PI, 2.0 * PI * 5.0).unwrap();

    let mut serial = template.clone();
    compute_power_spectrum(8, &all, &mut serial, DensityAssignment::Cic, &SerialComm).unwrap();

    let results = on_thread_group(2, |rank, comm| {
        let share = points[rank * 300..(rank + 1) * 300].to_vec();
        let local = Particles::<3>::from_points(share).with_total(600);
        let mut pofk = template.clone();
        compute_power_spectrum(8, &local, &mut pofk, DensityAssignment::Cic, comm).unwrap();
        pofk
    });
    for r in &results {
        approx_eq_slice(&r.pofk, &serial.pofk, 1e-12);
        approx_eq_slice(&r.count, &serial.count, 1e-9);
    }
}

#[test]
fn interlacing_leaves_positions_untouched() {
    let mut rng = StdRng::seed_from_u64(17);
    let particles = Particles::<3>::random_uniform(400, &mut rng).unwrap();
    let before = particles.clone();

    let mut pofk = PowerSpectrumBinning::linear(4, 2.0 * PI, 2.0 * PI * 4.0).unwrap();
    compute_power_spectrum_interlacing(8, &particles, &mut pofk, DensityAssignment::Cic, &SerialComm).unwrap();

    assert_eq!(particles, before);
    assert!(pofk.pofk.iter().all(|p| p.is_finite()));
}

#[test]
fn interlaced_lattice_has_only_the_shot_noise_offset() {
    // a regular lattice has no power below its own wavenumber, on either interlaced grid
    let n = 8;
    let mut points = Vec::new();
    for i in 0..n {
        for j in 0..n {
            points.push([(i as f64 + 0.5) / n as f64, (j as f64 + 0.5) / n as f64]);
        }
    }
    let particles = Particles::<2>::from_points(points);
    let template = PowerSpectrumBinning::linear(3, 2.0 * PI, 2.0 * PI * 4.0).unwrap();

    let mut interlaced = template.clone();
    compute_power_spectrum_interlacing(16, &particles, &mut interlaced, DensityAssignment::Cic, &SerialComm).unwrap();
    let shot = 1.0 / 64.0;
    for p in &interlaced.pofk {
        assert!(approx_eq(*p, -shot, 1e-10), "interlaced {p}");
    }
}

#[test]
fn direct_summation_is_alias_free() {
    // same lattice: every non-zero mode below the lattice wavenumber vanishes exactly
    let n = 4;
    let mut points = Vec::new();
    for i in 0..n {
        for j in 0..n {
            points.push([i as f64 / n as f64, j as f64 / n as f64]);
        }
    }
    let particles = Particles::<2>::from_points(points);
    let mut pofk = PowerSpectrumBinning::linear(2, 2.0 * PI, 2.0 * PI * 3.0).unwrap();
    compute_power_spectrum_direct_summation(8, &particles, &mut pofk, &SerialComm).unwrap();
    for p in &pofk.pofk {
        assert!(approx_eq(*p, -1.0 / 16.0, 1e-12));
    }

    let empty = Particles::<2>::from_points(Vec::new());
    assert!(compute_power_spectrum_direct_summation(8, &empty, &mut pofk, &SerialComm).is_err());
}

#[test]
fn poisson_shot_noise_is_removed_on_average() {
    let m = 300;
    let realizations = 12;
    let mut rng = StdRng::seed_from_u64(1234);
    let mut sum = 0.0;
    let mut weight = 0.0;
    for _ in 0..realizations {
        let particles = Particles::<3>::random_uniform(m, &mut rng).unwrap();
        let mut pofk = PowerSpectrumBinning::linear(3, 2.0 * PI, 2.0 * PI * 4.0).unwrap();
        compute_power_spectrum_direct_summation(8, &particles, &mut pofk, &SerialComm).unwrap();
        for (p, c) in pofk.pofk.iter().zip(&pofk.count) {
            sum += p * c;
            weight += c;
        }
    }
    let mean = sum / weight;
    // raw power is Exp(1/M) per mode; the mean over ~3000 modes is within a few percent
    assert!(mean.abs() * (m as f64) < 0.15, "mean residual {}", mean * m as f64);
}
