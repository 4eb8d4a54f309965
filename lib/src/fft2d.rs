//! Two-dimensional FFT on image-shaped arrays
//!
//! Row transforms followed by column transforms using planned rustfft
//! instances, plus the quadrant shift helpers that move zero frequency
//! between the corner and the geometric centre.

use crate::error::DemodError;
use crate::Result;
use ndarray::{Array2, ArrayViewMut1, Axis};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Planned forward and inverse transforms for one image shape
pub struct Fft2D {
    height: usize,
    width: usize,
    row_forward: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl Fft2D {
    /// Plan transforms for images of `height` x `width`
    pub fn new(height: usize, width: usize) -> Result<Self> {
        if height == 0 || width == 0 {
            return Err(DemodError::mismatch(format!(
                "cannot plan a 2D FFT for a {}x{} image",
                height, width
            )));
        }

        let mut planner = FftPlanner::<f64>::new();
        Ok(Self {
            height,
            width,
            row_forward: planner.plan_fft_forward(width),
            col_forward: planner.plan_fft_forward(height),
            row_inverse: planner.plan_fft_inverse(width),
            col_inverse: planner.plan_fft_inverse(height),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Forward transform of a real image, zero frequency at `[0, 0]`
    pub fn forward_real(&self, image: &Array2<f64>) -> Result<Array2<Complex64>> {
        let mut data = image.mapv(|v| Complex64::new(v, 0.0));
        self.forward(&mut data)?;
        Ok(data)
    }

    /// In-place forward transform
    pub fn forward(&self, data: &mut Array2<Complex64>) -> Result<()> {
        self.check_shape(data)?;
        transform_lanes(data, Axis(1), self.row_forward.as_ref());
        transform_lanes(data, Axis(0), self.col_forward.as_ref());
        Ok(())
    }

    /// In-place inverse transform, normalised by `1 / (height * width)`
    pub fn inverse(&self, data: &mut Array2<Complex64>) -> Result<()> {
        self.check_shape(data)?;
        transform_lanes(data, Axis(1), self.row_inverse.as_ref());
        transform_lanes(data, Axis(0), self.col_inverse.as_ref());

        let scale = 1.0 / (self.height * self.width) as f64;
        data.mapv_inplace(|v| v * scale);
        Ok(())
    }

    fn check_shape<T>(&self, data: &Array2<T>) -> Result<()> {
        if data.dim() != (self.height, self.width) {
            return Err(DemodError::mismatch(format!(
                "FFT planned for {}x{}, got {}x{}",
                self.height,
                self.width,
                data.nrows(),
                data.ncols()
            )));
        }
        Ok(())
    }
}

/// Run `fft` over every lane of `data` along `axis`
///
/// `Axis(1)` transforms rows, `Axis(0)` transforms columns.
fn transform_lanes(data: &mut Array2<Complex64>, axis: Axis, fft: &dyn Fft<f64>) {
    let len = data.len_of(axis);
    let mut buffer = vec![Complex64::new(0.0, 0.0); len];
    let mut scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];

    for mut lane in data.lanes_mut(axis) {
        copy_from_lane(&lane, &mut buffer);
        fft.process_with_scratch(&mut buffer, &mut scratch);
        copy_to_lane(&buffer, &mut lane);
    }
}

fn copy_from_lane(lane: &ArrayViewMut1<Complex64>, buffer: &mut [Complex64]) {
    for (dst, src) in buffer.iter_mut().zip(lane.iter()) {
        *dst = *src;
    }
}

fn copy_to_lane(buffer: &[Complex64], lane: &mut ArrayViewMut1<Complex64>) {
    for (dst, src) in lane.iter_mut().zip(buffer.iter()) {
        *dst = *src;
    }
}

/// Circularly move element `origin` of `data` to index `[0, 0]`
pub fn roll_to_origin<T: Clone>(data: &Array2<T>, origin: (usize, usize)) -> Array2<T> {
    let (h, w) = data.dim();
    let (r0, c0) = (origin.0 % h, origin.1 % w);
    Array2::from_shape_fn((h, w), |(r, c)| data[[(r + r0) % h, (c + c0) % w]].clone())
}

/// Move zero frequency from `[0, 0]` to `[h / 2, w / 2]`
pub fn fftshift<T: Clone>(data: &Array2<T>) -> Array2<T> {
    let (h, w) = data.dim();
    // fftshift(x)[k] = x[(k - n/2) mod n] = x[(k + n - n/2) mod n]
    roll_to_origin(data, (h - h / 2, w - w / 2))
}

/// Inverse of [`fftshift`], also correct for odd sizes
pub fn ifftshift<T: Clone>(data: &Array2<T>) -> Array2<T> {
    let (h, w) = data.dim();
    roll_to_origin(data, (h / 2, w / 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_forward_single_tone() {
        let (h, w) = (8, 16);
        let fft = Fft2D::new(h, w).unwrap();
        let image = Array2::from_shape_fn((h, w), |(r, c)| {
            (2.0 * PI * (3.0 * c as f64 / w as f64 + 2.0 * r as f64 / h as f64)).cos()
        });

        let spectrum = fft.forward_real(&image).unwrap();
        let expected = (h * w) as f64 / 2.0;

        assert!((spectrum[[2, 3]].norm() - expected).abs() < 1e-9);
        assert!((spectrum[[h - 2, w - 3]].norm() - expected).abs() < 1e-9);
        assert!(spectrum[[0, 0]].norm() < 1e-9);
    }

    #[test]
    fn test_forward_inverse_identity() {
        let (h, w) = (6, 10);
        let fft = Fft2D::new(h, w).unwrap();
        let image = Array2::from_shape_fn((h, w), |(r, c)| ((r * 7 + c * 3) % 5) as f64);

        let mut data = fft.forward_real(&image).unwrap();
        fft.inverse(&mut data).unwrap();

        for ((r, c), value) in data.indexed_iter() {
            assert!(
                (value.re - image[[r, c]]).abs() < 1e-10 && value.im.abs() < 1e-10,
                "Mismatch at ({}, {}): {}",
                r,
                c,
                value
            );
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let fft = Fft2D::new(4, 4).unwrap();
        let mut data = Array2::from_elem((4, 5), Complex64::new(0.0, 0.0));
        assert!(matches!(
            fft.forward(&mut data),
            Err(DemodError::DimensionMismatch(_))
        ));
        assert!(Fft2D::new(0, 4).is_err());
    }

    #[test]
    fn test_shift_places_dc_at_centre() {
        for &(h, w) in &[(4usize, 6usize), (5, 7)] {
            let mut data = Array2::<f64>::zeros((h, w));
            data[[0, 0]] = 1.0;

            let shifted = fftshift(&data);
            assert_eq!(shifted[[h / 2, w / 2]], 1.0, "shape {}x{}", h, w);

            let restored = ifftshift(&shifted);
            assert_eq!(restored, data, "shape {}x{}", h, w);
        }
    }

    #[test]
    fn test_roll_to_origin() {
        let data = Array2::from_shape_fn((3, 4), |(r, c)| r * 10 + c);
        let rolled = roll_to_origin(&data, (1, 2));
        assert_eq!(rolled[[0, 0]], 12);
        assert_eq!(rolled[[2, 3]], 1);
    }
}
