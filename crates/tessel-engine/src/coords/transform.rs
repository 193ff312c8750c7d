/// 3×3 projective transform acting on column vectors `(x, y, 1)`.
///
/// Pictures use it to map destination space into source pixel space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    m: [[f64; 3]; 3],
}

const EPSILON: f64 = 1e-12;

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    #[inline]
    pub const fn from_rows(m: [[f64; 3]; 3]) -> Self {
        Self { m }
    }

    #[inline]
    pub const fn translate(tx: f64, ty: f64) -> Self {
        Self::from_rows([[1.0, 0.0, tx], [0.0, 1.0, ty], [0.0, 0.0, 1.0]])
    }

    #[inline]
    pub const fn scale(sx: f64, sy: f64) -> Self {
        Self::from_rows([[sx, 0.0, 0.0], [0.0, sy, 0.0], [0.0, 0.0, 1.0]])
    }

    pub fn rotate(radians: f64) -> Self {
        let (s, c) = radians.sin_cos();
        Self::from_rows([[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]])
    }

    #[inline]
    pub const fn rows(&self) -> [[f64; 3]; 3] {
        self.m
    }

    /// Applies `self` first, then `next`.
    pub fn then(&self, next: &Transform) -> Transform {
        let a = &next.m;
        let b = &self.m;
        let mut m = [[0.0; 3]; 3];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
            }
        }
        Transform { m }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Pure translation: identity linear part and no perspective.
    pub fn is_translation(&self) -> bool {
        let m = &self.m;
        m[0][0] == 1.0
            && m[0][1] == 0.0
            && m[1][0] == 0.0
            && m[1][1] == 1.0
            && m[2] == [0.0, 0.0, 1.0]
    }

    /// Maps a point; `None` when it lands on the line at infinity.
    pub fn map_point(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let m = &self.m;
        let w = m[2][0] * x + m[2][1] * y + m[2][2];
        if w.abs() < EPSILON {
            return None;
        }
        let tx = m[0][0] * x + m[0][1] * y + m[0][2];
        let ty = m[1][0] * x + m[1][1] * y + m[1][2];
        Some((tx / w, ty / w))
    }

    pub fn inverse(&self) -> Option<Transform> {
        let m = &self.m;
        let c00 = m[1][1] * m[2][2] - m[1][2] * m[2][1];
        let c01 = m[1][2] * m[2][0] - m[1][0] * m[2][2];
        let c02 = m[1][0] * m[2][1] - m[1][1] * m[2][0];
        let det = m[0][0] * c00 + m[0][1] * c01 + m[0][2] * c02;
        if det.abs() < EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        Some(Transform::from_rows([
            [
                c00 * inv,
                (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv,
                (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv,
            ],
            [
                c01 * inv,
                (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv,
                (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv,
            ],
            [
                c02 * inv,
                (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv,
                (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv,
            ],
        ]))
    }

    /// Rows packed as three `vec4` uniform slots.
    pub fn to_uniform_rows(&self) -> [[f32; 4]; 3] {
        let m = &self.m;
        [
            [m[0][0] as f32, m[0][1] as f32, m[0][2] as f32, 0.0],
            [m[1][0] as f32, m[1][1] as f32, m[1][2] as f32, 0.0],
            [m[2][0] as f32, m[2][1] as f32, m[2][2] as f32, 0.0],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
    }

    #[test]
    fn then_applies_left_operand_first() {
        let t = Transform::scale(2.0, 2.0).then(&Transform::translate(10.0, 0.0));
        assert!(close(t.map_point(1.0, 1.0).unwrap(), (12.0, 2.0)));
    }

    #[test]
    fn inverse_round_trips_points() {
        let t = Transform::rotate(0.3)
            .then(&Transform::scale(1.5, 0.5))
            .then(&Transform::translate(-7.0, 3.0));
        let inv = t.inverse().unwrap();
        let p = t.map_point(4.0, -2.0).unwrap();
        assert!(close(inv.map_point(p.0, p.1).unwrap(), (4.0, -2.0)));
    }

    #[test]
    fn singular_has_no_inverse() {
        assert!(Transform::scale(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn translation_detection() {
        assert!(Transform::translate(3.0, 4.0).is_translation());
        assert!(!Transform::scale(2.0, 1.0).is_translation());
        assert!(Transform::IDENTITY.is_identity());
    }

    #[test]
    fn point_at_infinity_is_none() {
        let t = Transform::from_rows([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]);
        assert!(t.map_point(0.0, 5.0).is_none());
    }
}
