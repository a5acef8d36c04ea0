//! Constant-velocity Kalman filter over box state
//!
//! State `x = [cx, cy, s, r, vx, vy, vs]` where `s` is the box area and `r`
//! its aspect ratio (w/h). The aspect ratio carries no velocity term.
//! Measurements are `z = [cx, cy, s, r]`.

use anyhow::{anyhow, Result};
use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};

pub const DIM_X: usize = 7;
pub const DIM_Z: usize = 4;

pub type StateVector = SVector<f32, DIM_X>;
pub type StateMatrix = SMatrix<f32, DIM_X, DIM_X>;
pub type Measurement = SVector<f32, DIM_Z>;

/// Diagonal noise terms of the filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Diagonal of R, uncertainty of the (cx, cy, s, r) measurement
    pub measurement: [f32; DIM_Z],
    /// Diagonal of Q, uncertainty added by each transition
    pub process: [f32; DIM_X],
    /// Diagonal of the initial state covariance P0
    pub initial_covariance: [f32; DIM_X],
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            measurement: [1.0; DIM_Z],
            process: [0.01; DIM_X],
            initial_covariance: [10.0; DIM_X],
        }
    }
}

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    x: StateVector,
    p: StateMatrix,
    f: StateMatrix,
    h: SMatrix<f32, DIM_Z, DIM_X>,
    r: SMatrix<f32, DIM_Z, DIM_Z>,
    q: StateMatrix,
}

impl KalmanFilter {
    /// Filter initialised at observation `z` with zero velocity
    pub fn constant_velocity(z: [f32; DIM_Z], noise: &NoiseConfig) -> Self {
        let x = StateVector::from_column_slice(&[z[0], z[1], z[2], z[3], 0.0, 0.0, 0.0]);

        #[rustfmt::skip]
        let f = StateMatrix::from_row_slice(&[
            1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, // cx' = cx + vx
            0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, // cy' = cy + vy
            0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, // s' = s + vs
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, // r' = r
            0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        ]);

        #[rustfmt::skip]
        let h = SMatrix::<f32, DIM_Z, DIM_X>::from_row_slice(&[
            1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0,
        ]);

        Self {
            x,
            p: StateMatrix::from_diagonal(&StateVector::from_column_slice(
                &noise.initial_covariance,
            )),
            f,
            h,
            r: SMatrix::<f32, DIM_Z, DIM_Z>::from_diagonal(&Measurement::from_column_slice(
                &noise.measurement,
            )),
            q: StateMatrix::from_diagonal(&StateVector::from_column_slice(&noise.process)),
        }
    }

    /// x = F x, P = F P Fᵀ + Q
    pub fn predict(&mut self) {
        // keep the projected area non-negative
        if self.x[2] + self.x[6] <= 0.0 {
            self.x[6] = 0.0;
        }

        self.x = self.f * self.x;
        self.p = self.f * self.p * self.f.transpose() + self.q;
    }

    /// Correct the state with observation `z`
    pub fn update(&mut self, z: [f32; DIM_Z]) -> Result<()> {
        let z = Measurement::from_column_slice(&z);
        let y = z - self.h * self.x;
        let s = self.h * self.p * self.h.transpose() + self.r;
        let s_inv = s
            .try_inverse()
            .ok_or_else(|| anyhow!("failed to invert innovation covariance"))?;
        let k = self.p * self.h.transpose() * s_inv;

        self.x += k * y;
        self.p = (StateMatrix::identity() - k * self.h) * self.p;
        Ok(())
    }

    pub fn state(&self) -> &StateVector {
        &self.x
    }

    pub fn covariance(&self) -> &StateMatrix {
        &self.p
    }

    /// Observed part of the state, [cx, cy, s, r]
    pub fn observed_state(&self) -> [f32; DIM_Z] {
        [self.x[0], self.x[1], self.x[2], self.x[3]]
    }
}
