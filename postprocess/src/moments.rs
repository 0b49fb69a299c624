//! Image moments of postage stamps.
//!
//! Moments follow the `[row, column]` convention: `m_pq` weights each pixel
//! by `(row - center_row)^p * (col - center_col)^q`.

use ndarray::ArrayView2;

/// Low-order central moments about a fixed center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentralMoments {
    pub m10: f64,
    pub m01: f64,
    pub m20: f64,
    pub m02: f64,
    pub m11: f64,
}

/// Geometric center of an image, `((rows - 1) / 2, (cols - 1) / 2)`.
pub fn geometric_center(image: ArrayView2<f64>) -> (f64, f64) {
    let (rows, cols) = image.dim();
    (
        (rows as f64 - 1.0) / 2.0,
        (cols as f64 - 1.0) / 2.0,
    )
}

/// Central moments of `image` about `center`, unnormalised.
pub fn central_moments(image: ArrayView2<f64>, center: (f64, f64)) -> CentralMoments {
    let (center_row, center_col) = center;
    let mut moments = CentralMoments {
        m10: 0.0,
        m01: 0.0,
        m20: 0.0,
        m02: 0.0,
        m11: 0.0,
    };

    for ((r, c), &value) in image.indexed_iter() {
        let dr = r as f64 - center_row;
        let dc = c as f64 - center_col;
        moments.m10 += dr * value;
        moments.m01 += dc * value;
        moments.m20 += dr * dr * value;
        moments.m02 += dc * dc * value;
        moments.m11 += dr * dc * value;
    }

    moments
}

/// Distance of the brightest pixel from `center` along each axis.
///
/// When several pixels share the maximum, each axis reports the largest
/// distance among them. Returns `None` for an empty image.
pub fn peak_offset(image: ArrayView2<f64>, center: (f64, f64)) -> Option<(f64, f64)> {
    let max = image.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if image.is_empty() || max.is_nan() {
        return None;
    }

    let (center_row, center_col) = center;
    let mut offset = (0.0f64, 0.0f64);
    for ((r, c), &value) in image.indexed_iter() {
        if value == max {
            offset.0 = offset.0.max((r as f64 - center_row).abs());
            offset.1 = offset.1.max((c as f64 - center_col).abs());
        }
    }
    Some(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_single_pixel_moments() {
        let mut image = Array2::zeros((5, 5));
        image[[3, 1]] = 2.0;
        let m = central_moments(image.view(), (2.0, 2.0));
        assert_relative_eq!(m.m10, 2.0);
        assert_relative_eq!(m.m01, -2.0);
        assert_relative_eq!(m.m20, 2.0);
        assert_relative_eq!(m.m02, 2.0);
        assert_relative_eq!(m.m11, -2.0);
    }

    #[test]
    fn test_symmetric_image_has_no_odd_moments() {
        let image = Array2::from_shape_fn((7, 7), |(r, c)| {
            let dr = r as f64 - 3.0;
            let dc = c as f64 - 3.0;
            (-(dr * dr + dc * dc) / 4.0).exp()
        });
        let center = geometric_center(image.view());
        assert_eq!(center, (3.0, 3.0));

        let m = central_moments(image.view(), center);
        assert_relative_eq!(m.m10, 0.0, epsilon = 1e-12);
        assert_relative_eq!(m.m01, 0.0, epsilon = 1e-12);
        assert_relative_eq!(m.m11, 0.0, epsilon = 1e-12);
        assert_relative_eq!(m.m20, m.m02, epsilon = 1e-12);
    }

    #[test]
    fn test_peak_ties_take_farthest() {
        let mut image = Array2::zeros((21, 21));
        image[[10, 10]] = 5.0;
        image[[13, 9]] = 5.0;
        let offset = peak_offset(image.view(), (10.0, 10.0)).unwrap();
        assert_eq!(offset, (3.0, 1.0));
    }

    #[test]
    fn test_peak_offset_of_empty_image() {
        let image = Array2::<f64>::zeros((0, 0));
        assert!(peak_offset(image.view(), (0.0, 0.0)).is_none());
    }
}
