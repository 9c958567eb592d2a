//! Fixed-point math utilities for deterministic simulation.
//!
//! All unit behavior uses fixed-point arithmetic so that every replica of a
//! lockstep game computes bit-identical positions, rotations and speeds.
//! Square roots and trigonometry are evaluated with integer-only algorithms
//! (exact integer square root on the raw bits, CORDIC for angles), so no
//! floating-point instruction is ever executed on the simulation path.
//!
//! Angles are in degrees. Rotation `0` faces towards negative y (map "north"),
//! `90` faces positive x, and rotations grow clockwise.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// Full circle in degrees.
pub const FULL_CIRCLE: Fixed = Fixed::const_from_int(360);

/// Half circle in degrees.
pub const HALF_CIRCLE: Fixed = Fixed::const_from_int(180);

/// CORDIC gain compensation, `prod(1 / sqrt(1 + 2^-2i))` for 32 iterations.
const CORDIC_GAIN: Fixed = Fixed::from_bits(2_608_131_496);

/// `atan(2^-i)` in degrees.
const CORDIC_ANGLES: [Fixed; 32] = [
    Fixed::from_bits(193_273_528_320),
    Fixed::from_bits(114_096_026_022),
    Fixed::from_bits(60_285_206_653),
    Fixed::from_bits(30_601_712_202),
    Fixed::from_bits(15_360_239_180),
    Fixed::from_bits(7_687_607_525),
    Fixed::from_bits(3_844_741_810),
    Fixed::from_bits(1_922_488_225),
    Fixed::from_bits(961_258_780),
    Fixed::from_bits(480_631_223),
    Fixed::from_bits(240_315_841),
    Fixed::from_bits(120_157_949),
    Fixed::from_bits(60_078_978),
    Fixed::from_bits(30_039_490),
    Fixed::from_bits(15_019_745),
    Fixed::from_bits(7_509_872),
    Fixed::from_bits(3_754_936),
    Fixed::from_bits(1_877_468),
    Fixed::from_bits(938_734),
    Fixed::from_bits(469_367),
    Fixed::from_bits(234_684),
    Fixed::from_bits(117_342),
    Fixed::from_bits(58_671),
    Fixed::from_bits(29_335),
    Fixed::from_bits(14_668),
    Fixed::from_bits(7_334),
    Fixed::from_bits(3_667),
    Fixed::from_bits(1_833),
    Fixed::from_bits(917),
    Fixed::from_bits(458),
    Fixed::from_bits(229),
    Fixed::from_bits(115),
];

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Fixed-point 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec3Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
    /// Z coordinate (altitude).
    #[serde(with = "fixed_serde")]
    pub z: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_int(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Chebyshev distance, the metric used for weapon and follow ranges.
    #[must_use]
    pub fn chebyshev_distance(self, other: Self) -> Fixed {
        let dx = (self.x - other.x).abs();
        let dy = (self.y - other.y).abs();
        dx.max(dy)
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    /// Scale both components.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Cell containing this point (cells are one unit wide).
    #[must_use]
    pub fn cell(self) -> (i32, i32) {
        (
            self.x.floor().to_num::<i32>(),
            self.y.floor().to_num::<i32>(),
        )
    }

    /// Center point of the given cell.
    #[must_use]
    pub fn cell_center(x: i32, y: i32) -> Self {
        let half = Fixed::from_bits(1 << 31);
        Self::new(Fixed::from_num(x) + half, Fixed::from_num(y) + half)
    }
}

impl Vec3Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed, z: Fixed) -> Self {
        Self { x, y, z }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
        z: Fixed::ZERO,
    };

    /// Projection onto the ground plane.
    #[must_use]
    pub const fn xy(self) -> Vec2Fixed {
        Vec2Fixed::new(self.x, self.y)
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.x * self.x + self.y * self.y + self.z * self.z)
    }

    /// Whether all components are zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

/// Square root of a fixed-point number.
///
/// Computed as the integer square root of the raw bits shifted by the
/// fraction width, so perfect squares come out exact and every other value
/// is the floor of the true root at full precision. Negative input yields 0.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }
    let bits = u128::from(value.to_bits().unsigned_abs()) << 32;
    let root = isqrt_u128(bits);
    Fixed::from_bits(i64::try_from(root).unwrap_or(i64::MAX))
}

fn isqrt_u128(n: u128) -> u128 {
    let mut rem = n;
    let mut root = 0u128;
    let mut bit = 1u128 << 126;
    while bit > rem {
        bit >>= 2;
    }
    while bit != 0 {
        if rem >= root + bit {
            rem -= root + bit;
            root = (root >> 1) + bit;
        } else {
            root >>= 1;
        }
        bit >>= 2;
    }
    root
}

/// Wrap an angle into `[0, 360)`.
#[must_use]
pub fn normalize_rotation(angle: Fixed) -> Fixed {
    let wrapped = angle % FULL_CIRCLE;
    if wrapped < Fixed::ZERO {
        wrapped + FULL_CIRCLE
    } else {
        wrapped
    }
}

/// Smallest turn from `from` to `to`.
///
/// Returns the absolute angle (0..=180) and whether the turn is clockwise.
#[must_use]
pub fn rotation_delta(from: Fixed, to: Fixed) -> (Fixed, bool) {
    let mut delta = from - to;
    let mut clockwise = false;
    if delta < Fixed::ZERO {
        delta = delta.abs();
        clockwise = true;
    }
    if delta > HALF_CIRCLE {
        delta = FULL_CIRCLE - delta;
        clockwise = !clockwise;
    }
    (delta, clockwise)
}

/// Sine and cosine of an angle in degrees.
#[must_use]
pub fn sin_cos(degrees: Fixed) -> (Fixed, Fixed) {
    let mut angle = normalize_rotation(degrees);
    if angle > HALF_CIRCLE {
        angle -= FULL_CIRCLE;
    }
    // CORDIC converges for |angle| <= ~99 degrees; fold the rest.
    let ninety = Fixed::const_from_int(90);
    let mut negate = false;
    if angle > ninety {
        angle -= HALF_CIRCLE;
        negate = true;
    } else if angle < -ninety {
        angle += HALF_CIRCLE;
        negate = true;
    }

    let mut x = CORDIC_GAIN;
    let mut y = Fixed::ZERO;
    let mut z = angle;
    for (i, step) in CORDIC_ANGLES.iter().enumerate() {
        let (dx, dy) = (y >> i, x >> i);
        if z >= Fixed::ZERO {
            x -= dx;
            y += dy;
            z -= *step;
        } else {
            x += dx;
            y -= dy;
            z += *step;
        }
    }

    if negate {
        (-y, -x)
    } else {
        (y, x)
    }
}

/// `atan2(y, x)` in degrees, in `(-180, 180]`.
#[must_use]
pub fn atan2_degrees(y: Fixed, x: Fixed) -> Fixed {
    if x == Fixed::ZERO && y == Fixed::ZERO {
        return Fixed::ZERO;
    }
    let (mut vx, mut vy, base) = if x < Fixed::ZERO {
        (-x, -y, HALF_CIRCLE)
    } else {
        (x, y, Fixed::ZERO)
    };

    let mut z = Fixed::ZERO;
    for (i, step) in CORDIC_ANGLES.iter().enumerate() {
        let (dx, dy) = (vy >> i, vx >> i);
        if vy > Fixed::ZERO {
            vx += dx;
            vy -= dy;
            z += *step;
        } else {
            vx -= dx;
            vy += dy;
            z -= *step;
        }
    }

    let angle = z + base;
    if angle > HALF_CIRCLE {
        angle - FULL_CIRCLE
    } else {
        angle
    }
}

/// Rotation a unit needs to face along `(dx, dy)`.
///
/// Axis-aligned and diagonal directions resolve to exact multiples of 45.
#[must_use]
pub fn rotation_to_point(dx: Fixed, dy: Fixed) -> Fixed {
    let zero = Fixed::ZERO;
    if dx == zero && dy == zero {
        return zero;
    }
    if dx == zero {
        return if dy < zero {
            zero
        } else {
            HALF_CIRCLE
        };
    }
    if dy == zero {
        return if dx > zero {
            Fixed::const_from_int(90)
        } else {
            Fixed::const_from_int(270)
        };
    }
    if dx.abs() == dy.abs() {
        return match (dx > zero, dy > zero) {
            (true, false) => Fixed::const_from_int(45),
            (true, true) => Fixed::const_from_int(135),
            (false, true) => Fixed::const_from_int(225),
            (false, false) => Fixed::const_from_int(315),
        };
    }
    normalize_rotation(atan2_degrees(dy, dx) + Fixed::const_from_int(90))
}

/// Unit vector a unit with the given rotation moves along.
#[must_use]
pub fn direction_from_rotation(rotation: Fixed) -> Vec2Fixed {
    let (sin, cos) = sin_cos(rotation);
    Vec2Fixed::new(sin, -cos)
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Add for Vec3Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Fixed, b: Fixed, eps: Fixed) -> bool {
        (a - b).abs() <= eps
    }

    #[test]
    fn test_vec2_distance_squared() {
        let a = Vec2Fixed::from_int(3, 0);
        let b = Vec2Fixed::from_int(0, 4);
        assert_eq!(a.distance_squared(b), Fixed::from_num(25));
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a, b);
        assert_eq!(a * Fixed::from_num(7), b * Fixed::from_num(7));
    }

    #[test]
    fn test_sqrt_exact_for_squares() {
        assert_eq!(fixed_sqrt(Fixed::from_num(25)), Fixed::from_num(5));
        assert_eq!(fixed_sqrt(Fixed::from_num(0.25)), Fixed::from_num(0.5));
        assert_eq!(fixed_sqrt(Fixed::from_num(-4)), Fixed::ZERO);
        assert_eq!(Vec2Fixed::from_int(3, 4).length(), Fixed::from_num(5));
    }

    #[test]
    fn test_sqrt_two_is_floor() {
        // Compare exact 128-bit squares; a Fixed product would truncate.
        let two = 2u128 << 64;
        let bits = u128::try_from(fixed_sqrt(Fixed::from_num(2)).to_bits()).unwrap();
        assert!(bits * bits <= two);
        assert!((bits + 1) * (bits + 1) > two);
    }

    #[test]
    fn test_chebyshev_distance() {
        let a = Vec2Fixed::from_int(1, 1);
        let b = Vec2Fixed::from_int(4, -1);
        assert_eq!(a.chebyshev_distance(b), Fixed::from_num(3));
    }

    #[test]
    fn test_normalize_rotation_wraps() {
        assert_eq!(normalize_rotation(Fixed::from_num(370)), Fixed::from_num(10));
        assert_eq!(normalize_rotation(Fixed::from_num(-10)), Fixed::from_num(350));
        assert_eq!(normalize_rotation(Fixed::from_num(360)), Fixed::ZERO);
    }

    #[test]
    fn test_rotation_delta_takes_short_way() {
        let (delta, cw) = rotation_delta(Fixed::from_num(350), Fixed::from_num(10));
        assert_eq!(delta, Fixed::from_num(20));
        assert!(cw);
        let (delta, cw) = rotation_delta(Fixed::from_num(90), Fixed::from_num(45));
        assert_eq!(delta, Fixed::from_num(45));
        assert!(!cw);
    }

    #[test]
    fn test_sin_cos_known_angles() {
        let eps = Fixed::from_num(0.000_01);
        let (s, c) = sin_cos(Fixed::from_num(30));
        assert!(close(s, Fixed::from_num(0.5), eps), "sin 30 = {s}");
        assert!(close(c, Fixed::from_num(0.866_025_4), eps), "cos 30 = {c}");

        let (s, c) = sin_cos(Fixed::from_num(180));
        assert!(close(s, Fixed::ZERO, eps));
        assert!(close(c, Fixed::from_num(-1), eps));

        let (s, c) = sin_cos(Fixed::from_num(-135));
        assert!(close(s, Fixed::from_num(-0.707_106_8), eps));
        assert!(close(c, Fixed::from_num(-0.707_106_8), eps));
    }

    #[test]
    fn test_atan2_quadrants() {
        let eps = Fixed::from_num(0.001);
        assert!(close(atan2_degrees(Fixed::from_num(1), Fixed::from_num(1)), Fixed::from_num(45), eps));
        assert!(close(atan2_degrees(Fixed::from_num(1), Fixed::from_num(-1)), Fixed::from_num(135), eps));
        assert!(close(atan2_degrees(Fixed::from_num(-1), Fixed::from_num(-1)), Fixed::from_num(-135), eps));
        assert!(close(atan2_degrees(Fixed::from_num(-2), Fixed::from_num(1)), Fixed::from_num(-63.434_95), eps));
    }

    #[test]
    fn test_rotation_to_point_compass() {
        let one = Fixed::ONE;
        let zero = Fixed::ZERO;
        assert_eq!(rotation_to_point(zero, -one), Fixed::ZERO);
        assert_eq!(rotation_to_point(one, zero), Fixed::from_num(90));
        assert_eq!(rotation_to_point(zero, one), Fixed::from_num(180));
        assert_eq!(rotation_to_point(-one, zero), Fixed::from_num(270));
        assert_eq!(rotation_to_point(one, one), Fixed::from_num(135));
        assert_eq!(rotation_to_point(-one, -one), Fixed::from_num(315));

        let rot = rotation_to_point(Fixed::from_num(2), Fixed::from_num(-1));
        assert!(close(rot, Fixed::from_num(63.434_95), Fixed::from_num(0.001)));
    }

    #[test]
    fn test_direction_matches_rotation() {
        let eps = Fixed::from_num(0.000_01);
        let east = direction_from_rotation(Fixed::from_num(90));
        assert!(close(east.x, Fixed::ONE, eps) && close(east.y, Fixed::ZERO, eps));
        let north = direction_from_rotation(Fixed::ZERO);
        assert!(close(north.x, Fixed::ZERO, eps) && close(north.y, -Fixed::ONE, eps));
    }

    #[test]
    fn test_cell_and_center() {
        let p = Vec2Fixed::new(Fixed::from_num(3.75), Fixed::from_num(0.5));
        assert_eq!(p.cell(), (3, 0));
        assert_eq!(
            Vec2Fixed::cell_center(3, 0),
            Vec2Fixed::new(Fixed::from_num(3.5), Fixed::from_num(0.5))
        );
    }
}
