//! Projective transform fitting via the normalized direct linear transform.
//!
//! Points are Hartley-normalized (zero mean, average distance sqrt(2)) before
//! building the 2n x 9 design matrix; `A h = 0` is solved by SVD and the
//! result de-normalized. Without normalization the system is poorly
//! conditioned for pixel-scale coordinates.

use nalgebra::{DMatrix, Matrix3};

/// A 3x3 projective matrix mapping source pixel coordinates into the
/// reference frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Homography {
    pub matrix: Matrix3<f64>,
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// Pure-translation transform, the shape produced by the template
    /// fallback.
    pub fn translation(dx: f64, dy: f64) -> Self {
        let mut matrix = Matrix3::identity();
        matrix[(0, 2)] = dx;
        matrix[(1, 2)] = dy;
        Self { matrix }
    }

    /// Map a source point into the reference frame. `None` when the point
    /// projects to infinity.
    pub fn project(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let m = &self.matrix;
        let w = m[(2, 0)] * x + m[(2, 1)] * y + m[(2, 2)];
        if w.abs() < 1e-12 {
            return None;
        }
        let px = (m[(0, 0)] * x + m[(0, 1)] * y + m[(0, 2)]) / w;
        let py = (m[(1, 0)] * x + m[(1, 1)] * y + m[(1, 2)]) / w;
        Some((px, py))
    }

    /// Pixel distance between the projected source point and the observed
    /// reference point.
    pub fn reprojection_error(&self, source: (f64, f64), reference: (f64, f64)) -> f64 {
        match self.project(source.0, source.1) {
            Some((px, py)) => {
                let dx = px - reference.0;
                let dy = py - reference.1;
                (dx * dx + dy * dy).sqrt()
            }
            None => f64::INFINITY,
        }
    }

    pub fn inverse(&self) -> Option<Homography> {
        self.matrix.try_inverse().map(|matrix| Homography { matrix })
    }

    pub fn is_invertible(&self) -> bool {
        self.matrix.determinant().abs() > 1e-10
    }
}

/// Least-squares homography from at least 4 correspondences. `None` when the
/// point configuration is degenerate or the linear system cannot be solved.
pub fn fit_homography(source: &[(f64, f64)], reference: &[(f64, f64)]) -> Option<Homography> {
    let n = source.len();
    if n < 4 || reference.len() != n {
        return None;
    }

    let (source_n, t_src) = normalize_points(source)?;
    let (reference_n, t_ref) = normalize_points(reference)?;

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (ps, pr)) in source_n.iter().zip(reference_n.iter()).enumerate() {
        let (x, y) = *ps;
        let (u, v) = *pr;
        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // The null vector lives in the full V; pad the matrix square so the thin
    // SVD still exposes all nine right singular vectors.
    let mut a_work = a;
    if a_work.nrows() < a_work.ncols() {
        let (rows, cols) = (a_work.nrows(), a_work.ncols());
        let mut padded = DMatrix::<f64>::zeros(cols, cols);
        padded.view_mut((0, 0), (rows, cols)).copy_from(&a_work);
        a_work = padded;
    }

    let svd = a_work.svd(true, true);
    let v_t = svd.v_t?;
    let h_vec = v_t.row(v_t.nrows() - 1);

    let mut h = Matrix3::<f64>::zeros();
    for r in 0..3 {
        for c in 0..3 {
            h[(r, c)] = h_vec[3 * r + c];
        }
    }

    let t_ref_inv = t_ref.try_inverse()?;
    let mut h = t_ref_inv * h * t_src;

    let scale = h[(2, 2)];
    if scale.abs() < f64::EPSILON {
        return None;
    }
    h /= scale;

    Some(Homography { matrix: h })
}

/// Hartley normalization: translate the centroid to the origin and scale so
/// the mean distance from it is sqrt(2). Returns the normalized points and
/// the similarity transform that produced them.
fn normalize_points(points: &[(f64, f64)]) -> Option<(Vec<(f64, f64)>, Matrix3<f64>)> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f64>() / n;

    let mean_dist = points
        .iter()
        .map(|p| ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < 1e-12 {
        return None;
    }
    let scale = std::f64::consts::SQRT_2 / mean_dist;

    let normalized = points
        .iter()
        .map(|p| ((p.0 - cx) * scale, (p.1 - cy) * scale))
        .collect();

    let mut t = Matrix3::identity();
    t[(0, 0)] = scale;
    t[(1, 1)] = scale;
    t[(0, 2)] = -cx * scale;
    t[(1, 2)] = -cy * scale;

    Some((normalized, t))
}

/// True when any three of the points are nearly collinear; such a sample
/// cannot constrain a projective transform.
pub fn sample_degenerate(points: &[(f64, f64)]) -> bool {
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            for k in (j + 1)..points.len() {
                let (ax, ay) = points[i];
                let (bx, by) = points[j];
                let (cx, cy) = points[k];
                let area = ((bx - ax) * (cy - ay) - (cx - ax) * (by - ay)).abs();
                if area < 1e-9 {
                    return true;
                }
            }
        }
    }
    false
}
