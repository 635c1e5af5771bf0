//! Rigid transforms between named frames and their application to
//! records.

use crate::types::Record;
use eyre::{Result, bail, ensure};
use std::time::Duration;

/// A rigid transform that re-expresses points given in `source_frame`
/// in `target_frame`: `p_target = R * p_source + t`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub source_frame: String,
    pub target_frame: String,
    /// The time the transform was queried at.
    pub stamp: Duration,
    /// Unit quaternion in `[x, y, z, w]` order.
    pub rotation: [f64; 4],
    pub translation: [f64; 3],
}

impl Transform {
    /// Create a transform. The rotation is normalized.
    pub fn new(
        source_frame: impl Into<String>,
        target_frame: impl Into<String>,
        stamp: Duration,
        rotation: [f64; 4],
        translation: [f64; 3],
    ) -> Self {
        Self {
            source_frame: source_frame.into(),
            target_frame: target_frame.into(),
            stamp,
            rotation: normalize(rotation),
            translation,
        }
    }

    pub fn identity(frame: impl Into<String>, stamp: Duration) -> Self {
        let frame = frame.into();
        Self::new(frame.clone(), frame, stamp, [0.0, 0.0, 0.0, 1.0], [0.0; 3])
    }

    /// A pure translation.
    pub fn from_translation(
        source_frame: impl Into<String>,
        target_frame: impl Into<String>,
        translation: [f64; 3],
    ) -> Self {
        Self::new(
            source_frame,
            target_frame,
            Duration::ZERO,
            [0.0, 0.0, 0.0, 1.0],
            translation,
        )
    }

    /// A rotation of `yaw` radians about the z axis followed by a
    /// translation.
    pub fn from_yaw(
        source_frame: impl Into<String>,
        target_frame: impl Into<String>,
        yaw: f64,
        translation: [f64; 3],
    ) -> Self {
        let half = yaw / 2.0;
        Self::new(
            source_frame,
            target_frame,
            Duration::ZERO,
            [0.0, 0.0, half.sin(), half.cos()],
            translation,
        )
    }

    /// The same transform stamped at another time.
    pub fn at(mut self, stamp: Duration) -> Self {
        self.stamp = stamp;
        self
    }

    /// The transform from `target_frame` back to `source_frame`.
    pub fn inverse(&self) -> Self {
        let [x, y, z, w] = self.rotation;
        let conjugate = [-x, -y, -z, w];
        let [tx, ty, tz] = rotate(conjugate, self.translation);

        Self {
            source_frame: self.target_frame.clone(),
            target_frame: self.source_frame.clone(),
            stamp: self.stamp,
            rotation: conjugate,
            translation: [-tx, -ty, -tz],
        }
    }

    /// Chain `self` (a → b) with `next` (b → c) into a → c.
    pub fn then(&self, next: &Transform) -> Result<Self> {
        ensure!(
            self.target_frame == next.source_frame,
            "cannot chain transform into '{}' with transform from '{}'",
            self.target_frame,
            next.source_frame
        );

        let rotated = rotate(next.rotation, self.translation);
        let translation = [
            rotated[0] + next.translation[0],
            rotated[1] + next.translation[1],
            rotated[2] + next.translation[2],
        ];

        Ok(Self {
            source_frame: self.source_frame.clone(),
            target_frame: next.target_frame.clone(),
            stamp: self.stamp,
            rotation: normalize(multiply(next.rotation, self.rotation)),
            translation,
        })
    }

    pub fn apply_point(&self, point: [f64; 3]) -> [f64; 3] {
        let [x, y, z] = rotate(self.rotation, point);
        [
            x + self.translation[0],
            y + self.translation[1],
            z + self.translation[2],
        ]
    }

    pub fn apply_vector(&self, vector: [f64; 3]) -> [f64; 3] {
        rotate(self.rotation, vector)
    }

    /// Re-express `record` in the target frame.
    ///
    /// Points are read from the `x`/`y`/`z` fields; `normal_x`/`normal_y`/
    /// `normal_z` are rotated when present. All other fields, the layout
    /// and the timestamp are copied. Points with a non-finite coordinate
    /// are left as they are.
    pub fn apply(&self, record: &Record) -> Result<Record> {
        ensure!(
            record.header.frame_id == self.source_frame,
            "transform from '{}' cannot be applied to a record in '{}'",
            self.source_frame,
            record.header.frame_id
        );

        let (Some(ix), Some(iy), Some(iz)) = (
            record.field_index("x"),
            record.field_index("y"),
            record.field_index("z"),
        ) else {
            bail!(
                "record in '{}' has no x/y/z fields",
                record.header.frame_id
            );
        };

        let normals = match (
            record.field_index("normal_x"),
            record.field_index("normal_y"),
            record.field_index("normal_z"),
        ) {
            (Some(nx), Some(ny), Some(nz)) => Some((nx, ny, nz)),
            _ => None,
        };

        let step = record.fields.len();
        let mut data = record.data.clone();

        for point in data.chunks_exact_mut(step) {
            let xyz = [point[ix], point[iy], point[iz]];
            if xyz.iter().all(|v| v.is_finite()) {
                let [x, y, z] = self.apply_point(xyz);
                point[ix] = x;
                point[iy] = y;
                point[iz] = z;
            }

            if let Some((nx, ny, nz)) = normals {
                let normal = [point[nx], point[ny], point[nz]];
                if normal.iter().all(|v| v.is_finite()) {
                    let [x, y, z] = self.apply_vector(normal);
                    point[nx] = x;
                    point[ny] = y;
                    point[nz] = z;
                }
            }
        }

        let mut output = record.clone();
        output.data = data;
        output.header.frame_id = self.target_frame.clone();
        Ok(output)
    }
}

fn normalize(q: [f64; 4]) -> [f64; 4] {
    let norm = q.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return [0.0, 0.0, 0.0, 1.0];
    }
    q.map(|v| v / norm)
}

/// Hamilton product `a * b`, both in `[x, y, z, w]` order.
fn multiply(a: [f64; 4], b: [f64; 4]) -> [f64; 4] {
    let [ax, ay, az, aw] = a;
    let [bx, by, bz, bw] = b;
    [
        aw * bx + ax * bw + ay * bz - az * by,
        aw * by - ax * bz + ay * bw + az * bx,
        aw * bz + ax * by - ay * bx + az * bw,
        aw * bw - ax * bx - ay * by - az * bz,
    ]
}

fn rotate(q: [f64; 4], v: [f64; 3]) -> [f64; 3] {
    let [qx, qy, qz, w] = q;
    // v' = v + 2w(q × v) + 2 q × (q × v)
    let c1 = cross([qx, qy, qz], v);
    let c2 = cross([qx, qy, qz], c1);
    [
        v[0] + 2.0 * (w * c1[0] + c2[0]),
        v[1] + 2.0 * (w * c1[1] + c2[1]),
        v[2] + 2.0 * (w * c1[2] + c2[2]),
    ]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Header;
    use std::f64::consts::FRAC_PI_2;

    const EPS: f64 = 1e-9;

    fn assert_close(a: [f64; 3], b: [f64; 3]) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < EPS, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn test_translation() {
        let tf = Transform::from_translation("a", "b", [1.0, 2.0, 3.0]);
        assert_close(tf.apply_point([1.0, 1.0, 1.0]), [2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_yaw_rotation() {
        let tf = Transform::from_yaw("a", "b", FRAC_PI_2, [0.0; 3]);
        assert_close(tf.apply_point([1.0, 0.0, 0.0]), [0.0, 1.0, 0.0]);
        assert_close(tf.apply_vector([0.0, 1.0, 0.0]), [-1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_inverse_round_trip() {
        let tf = Transform::from_yaw("a", "b", 0.7, [1.0, -2.0, 0.5]);
        let inv = tf.inverse();

        assert_eq!(inv.source_frame, "b");
        assert_eq!(inv.target_frame, "a");

        let p = [3.0, 4.0, 5.0];
        assert_close(inv.apply_point(tf.apply_point(p)), p);
    }

    #[test]
    fn test_then_chains_frames() {
        let ab = Transform::from_yaw("a", "b", FRAC_PI_2, [1.0, 0.0, 0.0]);
        let bc = Transform::from_translation("b", "c", [0.0, 0.0, 2.0]);
        let ac = ab.then(&bc).unwrap();

        assert_eq!(ac.source_frame, "a");
        assert_eq!(ac.target_frame, "c");
        let p = [1.0, 0.0, 0.0];
        assert_close(ac.apply_point(p), bc.apply_point(ab.apply_point(p)));

        assert!(bc.then(&ab).is_err());
    }

    #[test]
    fn test_apply_record() {
        let header = Header::new(Duration::from_millis(100), "a");
        let record = Record::from_xyz(header, &[[1.0, 0.0, 0.0], [f64::NAN, 0.0, 0.0]]);
        let tf = Transform::from_translation("a", "b", [0.0, 1.0, 0.0]);

        let output = tf.apply(&record).unwrap();
        assert_eq!(output.header.frame_id, "b");
        assert_eq!(output.header.stamp, Duration::from_millis(100));
        assert_close(output.point(0).unwrap().try_into().unwrap(), [1.0, 1.0, 0.0]);
        assert!(output.point(1).unwrap()[0].is_nan());
    }

    #[test]
    fn test_apply_rotates_normals_only() {
        let header = Header::new(Duration::from_millis(100), "a");
        let fields = ["x", "y", "z", "normal_x", "normal_y", "normal_z", "intensity"]
            .map(String::from)
            .to_vec();
        let record = Record::new(header, fields, vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 42.0]);
        let tf = Transform::from_yaw("a", "b", FRAC_PI_2, [5.0, 0.0, 0.0]);

        let output = tf.apply(&record).unwrap();
        let point = output.point(0).unwrap();
        assert_close([point[0], point[1], point[2]], [5.0, 1.0, 0.0]);
        assert_close([point[3], point[4], point[5]], [0.0, 1.0, 0.0]);
        assert_eq!(point[6], 42.0);
    }

    #[test]
    fn test_apply_rejects_wrong_frame_or_missing_fields() {
        let header = Header::new(Duration::from_millis(100), "a");
        let record = Record::from_xyz(header.clone(), &[[1.0, 0.0, 0.0]]);
        let tf = Transform::from_translation("other", "b", [0.0; 3]);
        assert!(tf.apply(&record).is_err());

        let record = Record::new(header, vec!["intensity".into()], vec![1.0]);
        let tf = Transform::from_translation("a", "b", [0.0; 3]);
        assert!(tf.apply(&record).is_err());
    }
}
