use std::collections::HashMap;

use super::{BoneInfluence, Point};
use crate::codecs::{PackedNormal, Vector3};

/// Deduplicates vertex positions into [`Point`]s.
///
/// A vertex joins an existing point when the positions are exactly equal and every
/// signed normal byte is within the weld tolerance of the point's normal. Candidates are
/// tried in creation order, so the first qualifying point wins just as a linear scan
/// would pick it.
#[derive(Debug, Default)]
pub struct PointWelder {
    points: Vec<Point>,
    buckets: HashMap<[u32; 3], Vec<u32>>,
}

/// Hash key of a position. Both zeros share a key since they compare equal; NaN never
/// equals anything and gets no key.
fn position_key(v: Vector3) -> Option<[u32; 3]> {
    let bits = |f: f32| if f == 0.0 { 0 } else { f.to_bits() };
    if v.x.is_nan() || v.y.is_nan() || v.z.is_nan() {
        return None;
    }
    Some([bits(v.x), bits(v.y), bits(v.z)])
}

impl PointWelder {
    pub fn with_capacity(capacity: usize) -> Self {
        PointWelder {
            points: Vec::with_capacity(capacity),
            buckets: HashMap::with_capacity(capacity),
        }
    }

    /// Index of the point `position` welds to, creating one when none matches. The
    /// influences are only built for new points.
    pub fn weld(
        &mut self,
        position: Vector3,
        normal: PackedNormal,
        influences: impl FnOnce() -> Vec<BoneInfluence>,
    ) -> u32 {
        let key = position_key(position);
        if let Some(candidates) = key.and_then(|key| self.buckets.get(&key)) {
            let found = candidates
                .iter()
                .copied()
                .find(|&index| self.points[index as usize].normal.is_close(&normal));
            if let Some(index) = found {
                return index;
            }
        }

        let index = self.points.len() as u32;
        self.points.push(Point {
            position,
            normal,
            influences: influences(),
        });
        if let Some(key) = key {
            self.buckets.entry(key).or_default().push(index);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Point> {
        self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal(x: u8, y: u8, z: u8) -> PackedNormal {
        PackedNormal::from_bytes(x, y, z, 0)
    }

    #[test]
    fn tolerance_boundary() {
        let p = Vector3::new(1.0, 2.0, 3.0);
        let mut welder = PointWelder::default();
        let a = welder.weld(p, normal(20, 30, 40), Vec::new);
        assert_eq!(welder.weld(p, normal(30, 40, 50), Vec::new), a);
        let c = welder.weld(p, normal(31, 40, 50), Vec::new);
        assert_ne!(c, a);
        assert_eq!(welder.len(), 2);
    }

    #[test]
    fn signed_zero_welds_and_nan_does_not() {
        let mut welder = PointWelder::default();
        let n = normal(0, 0, 127);
        let a = welder.weld(Vector3::new(0.0, 1.0, 0.0), n, Vec::new);
        assert_eq!(welder.weld(Vector3::new(-0.0, 1.0, 0.0), n, Vec::new), a);

        let nan = Vector3::new(f32::NAN, 0.0, 0.0);
        let b = welder.weld(nan, n, Vec::new);
        assert_ne!(welder.weld(nan, n, Vec::new), b);
    }

    #[test]
    fn first_matching_point_wins() {
        let p = Vector3::new(5.0, 5.0, 5.0);
        let mut welder = PointWelder::default();
        let a = welder.weld(p, normal(0, 0, 0), Vec::new);
        let b = welder.weld(p, normal(20, 0, 0), Vec::new);
        assert_ne!(a, b);
        // within tolerance of both; the older point is chosen
        assert_eq!(welder.weld(p, normal(10, 0, 0), Vec::new), a);
    }

    #[test]
    fn rewelding_points_is_idempotent() {
        let mut welder = PointWelder::default();
        for i in 0..20u8 {
            let p = Vector3::new((i % 5) as f32, 0.0, 0.0);
            welder.weld(p, normal(i * 3, 0, 0), Vec::new);
        }
        let first_pass = welder.points().to_vec();

        let mut again = PointWelder::default();
        for point in &first_pass {
            again.weld(point.position, point.normal, Vec::new);
        }
        assert_eq!(again.len(), first_pass.len());
    }

    #[test]
    fn influences_are_built_only_for_new_points() {
        let mut welder = PointWelder::default();
        let p = Vector3::ZERO;
        let n = normal(1, 2, 3);
        welder.weld(p, n, || vec![BoneInfluence { bone: 1, weight: 1.0 }]);
        welder.weld(p, n, || panic!("influences of a welded vertex are not needed"));
        assert_eq!(welder.points()[0].influences.len(), 1);
    }
}
