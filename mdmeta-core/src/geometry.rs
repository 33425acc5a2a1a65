use ndarray::{Array1, ArrayView2, Zip};
use serde::Serialize;

/// How far a cell angle may sit from 90 degrees before the box counts as
/// triclinic.
pub const ORTHOGONAL_ANGLE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BoxShape {
    Orthogonal,
    Triclinic,
}

impl BoxShape {
    pub fn from_angles(angles: &[f64]) -> Self {
        if angles
            .iter()
            .any(|a| (a - 90.0).abs() > ORTHOGONAL_ANGLE_TOLERANCE)
        {
            BoxShape::Triclinic
        } else {
            BoxShape::Orthogonal
        }
    }
}

/// A periodic cell as reported by a restart or topology file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodicBox {
    pub lengths: [f64; 3],
    pub angles: [f64; 3],
    pub volume: f64,
}

impl PeriodicBox {
    pub fn new(lengths: [f64; 3], angles: [f64; 3]) -> Self {
        let volume = triclinic_volume(lengths, angles);
        Self {
            lengths,
            angles,
            volume,
        }
    }

    pub fn shape(&self) -> BoxShape {
        BoxShape::from_angles(&self.angles)
    }
}

///
/// Volume of a triclinic cell from edge lengths (Å) and angles (degrees).
///
/// `V = abc · sqrt(1 − cos²α − cos²β − cos²γ + 2·cosα·cosβ·cosγ)`, with the
/// radicand clamped to zero for degenerate (flat) cells.
///
pub fn triclinic_volume(lengths: [f64; 3], angles: [f64; 3]) -> f64 {
    let [a, b, c] = lengths;
    let [ca, cb, cg] = angles.map(|x| x.to_radians().cos());
    let term = 1.0 - ca * ca - cb * cb - cg * cg + 2.0 * ca * cb * cg;
    a * b * c * term.max(0.0).sqrt()
}

///
/// Per-frame volumes for an `(n_frames, 3)` array of cell lengths and an
/// optional matching array of cell angles. Missing angles mean an
/// orthogonal box (`V = a·b·c`).
///
pub fn frame_volumes(lengths: ArrayView2<f64>, angles: Option<ArrayView2<f64>>) -> Array1<f64> {
    let mut vols = Array1::<f64>::zeros(lengths.nrows());
    match angles {
        None => {
            Zip::from(&mut vols)
                .and(lengths.rows())
                .for_each(|v, row| *v = row.product());
        }
        Some(angles) => {
            Zip::from(&mut vols)
                .and(lengths.rows())
                .and(angles.rows())
                .for_each(|v, l, a| {
                    *v = triclinic_volume([l[0], l[1], l[2]], [a[0], a[1], a[2]]);
                });
        }
    }
    vols
}
