use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};

pub fn centroid(points: &[Point3<f64>]) -> Option<Point3<f64>> {
    if points.is_empty() {
        return None;
    }
    let sum = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Some(Point3::from(sum / points.len() as f64))
}

pub fn calculate_rmsd(coords1: &[Point3<f64>], coords2: &[Point3<f64>]) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    let n = coords1.len() as f64;
    let squared_dist_sum: f64 = coords1
        .iter()
        .zip(coords2.iter())
        .map(|(p1, p2)| (p1 - p2).norm_squared())
        .sum();
    Some((squared_dist_sum / n).sqrt())
}

/// Optimal rigid-body transform (Kabsch) that maps `mobile` onto `target`.
///
/// Both slices must be paired point-by-point. Reflections are excluded by
/// correcting the sign of the smallest singular direction.
pub fn kabsch(mobile: &[Point3<f64>], target: &[Point3<f64>]) -> Option<Isometry3<f64>> {
    if mobile.len() != target.len() || mobile.is_empty() {
        return None;
    }
    let c_mobile = centroid(mobile)?;
    let c_target = centroid(target)?;

    let mut covariance = Matrix3::zeros();
    for (p, q) in mobile.iter().zip(target) {
        covariance += (p - c_mobile) * (q - c_target).transpose();
    }

    let svd = covariance.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut correction = Matrix3::identity();
    if (v_t.transpose() * u.transpose()).determinant() < 0.0 {
        correction[(2, 2)] = -1.0;
    }
    let rotation_matrix = v_t.transpose() * correction * u.transpose();
    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(
        rotation_matrix,
    ));

    let translation = c_target.coords - rotation * c_mobile.coords;
    Some(Isometry3::from_parts(Translation3::from(translation), rotation))
}

/// RMSD between two paired point sets after optimal superposition.
pub fn superposed_rmsd(mobile: &[Point3<f64>], target: &[Point3<f64>]) -> Option<f64> {
    let transform = kabsch(mobile, target)?;
    let moved: Vec<Point3<f64>> = mobile.iter().map(|p| transform * p).collect();
    calculate_rmsd(&moved, target)
}

/// Distance of `p` from the infinite line through `a` and `b`.
pub fn distance_from_line(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    let axis = b - a;
    let norm = axis.norm();
    if norm < f64::EPSILON {
        return (p - a).norm();
    }
    (p - a).cross(&axis).norm() / norm
}
