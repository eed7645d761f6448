#![allow(dead_code)]

use pencil_spectrum::config::{Decomposition, Grid, Output, Run};
use pencil_spectrum::{Config, EngineKind, FieldKind, Precision};

pub fn setup_config(size: [usize; 3], ranks: usize) -> Config {
    // A small run that is quick enough to repeat over many rank counts.
    Config {
        grid: Grid {
            size_x: size[0],
            size_y: size[1],
            size_z: size[2],
        },
        decomposition: Decomposition { ndim: 2, dims: None },
        run: Run {
            repetitions: 1,
            ranks,
            precision: Precision::Double,
            field: FieldKind::Sine,
            seed: 0,
            overwrite_input: false,
            engine: EngineKind::Pencil,
        },
        output: Output {
            write_output: false,
            path: "output/spectrum.npy".into(),
        },
    }
}

pub fn assert_close(a: &[f64], b: &[f64], rel: f64) {
    assert_eq!(a.len(), b.len());
    let scale = b.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1e-300);
    for (k, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        assert!(
            (x - y).abs() <= rel * scale,
            "shell {}: {} vs {}",
            k,
            x,
            y
        );
    }
}
