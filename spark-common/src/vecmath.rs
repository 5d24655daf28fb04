use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// A 3D vector with value semantics. 2D spaces keep `z` at zero.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector {
    pub const ZERO: Vector = Vector { x: 0.0, y: 0.0, z: 0.0 };

    /// Creates a new Vector.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vector { x, y, z }
    }

    /// Creates a vector in the z = 0 plane.
    pub fn xy(x: f64, y: f64) -> Self {
        Vector { x, y, z: 0.0 }
    }

    pub fn zero() -> Self {
        Self::ZERO
    }

    /// Component by axis index (0 = x, 1 = y, 2 = z).
    pub fn axis(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn with_axis(mut self, axis: usize, value: f64) -> Self {
        match axis {
            0 => self.x = value,
            1 => self.y = value,
            _ => self.z = value,
        }
        self
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn from_slice(values: &[f64]) -> Self {
        Vector {
            x: values.first().copied().unwrap_or(0.0),
            y: values.get(1).copied().unwrap_or(0.0),
            z: values.get(2).copied().unwrap_or(0.0),
        }
    }

    pub fn length_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Returns a unit vector, or zero if the length is (nearly) zero.
    pub fn normalize_or_zero(&self) -> Self {
        let len_sq = self.length_squared();
        if len_sq > 1e-24 {
            *self / len_sq.sqrt()
        } else {
            Vector::ZERO
        }
    }

    /// Shortens the vector to `max_length` if it is longer; keeps direction.
    pub fn truncate(&self, max_length: f64) -> Self {
        let len_sq = self.length_squared();
        if len_sq > max_length * max_length && len_sq > 0.0 {
            *self * (max_length / len_sq.sqrt())
        } else {
            *self
        }
    }

    pub fn dot(&self, other: Vector) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn distance_squared(&self, other: Vector) -> f64 {
        (*self - other).length_squared()
    }

    pub fn distance(&self, other: Vector) -> f64 {
        self.distance_squared(other).sqrt()
    }

    pub fn scale(&self, scalar: f64) -> Self {
        *self * scalar
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vector {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Vector::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl AddAssign for Vector {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for Vector {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Vector::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl SubAssign for Vector {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl Mul<f64> for Vector {
    type Output = Self;
    fn mul(self, scalar: f64) -> Self {
        Vector::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

impl Div<f64> for Vector {
    type Output = Self;
    fn div(self, scalar: f64) -> Self {
        Vector::new(self.x / scalar, self.y / scalar, self.z / scalar)
    }
}

impl Neg for Vector {
    type Output = Self;
    fn neg(self) -> Self {
        Vector::new(-self.x, -self.y, -self.z)
    }
}

/// RGBA colour, components in [0, 1].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);
    pub const RED: Rgba = Rgba::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Rgba = Rgba::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Rgba = Rgba::new(0.0, 0.0, 1.0, 1.0);
    pub const YELLOW: Rgba = Rgba::new(1.0, 1.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Rgba { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Rgba { r, g, b, a: 1.0 }
    }

    /// Linear blend; `t = 0` gives `self`, `t = 1` gives `other`.
    pub fn lerp(&self, other: Rgba, t: f32) -> Rgba {
        let t = clamp(t as f64, 0.0, 1.0) as f32;
        Rgba::new(
            self.r + (other.r - self.r) * t,
            self.g + (other.g - self.g) * t,
            self.b + (other.b - self.b) * t,
            self.a + (other.a - self.a) * t,
        )
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Rgba::WHITE
    }
}

/// Converts an angle (radians) to a unit vector in the xy plane.
pub fn angle_to_vec(angle_rad: f64) -> Vector {
    Vector::xy(angle_rad.cos(), angle_rad.sin())
}

/// Heading of a vector in the xy plane.
pub fn vec_to_angle(vec: Vector) -> f64 {
    vec.y.atan2(vec.x)
}

pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_direction_and_caps_length() {
        let v = Vector::xy(3.0, 4.0);
        let t = v.truncate(2.5);
        assert!((t.length() - 2.5).abs() < 1e-12);
        assert!((t.x / t.y - 0.75).abs() < 1e-12);
        assert_eq!(Vector::xy(0.3, 0.4).truncate(2.5), Vector::xy(0.3, 0.4));
    }

    #[test]
    fn operations_return_new_values() {
        let a = Vector::xy(1.0, 2.0);
        let b = a + Vector::xy(1.0, 1.0);
        assert_eq!(a, Vector::xy(1.0, 2.0));
        assert_eq!(b, Vector::xy(2.0, 3.0));
        assert_eq!(Vector::ZERO.normalize_or_zero(), Vector::ZERO);
    }

    #[test]
    fn colour_lerp_clamps() {
        let c = Rgba::BLACK.lerp(Rgba::WHITE, 2.0);
        assert_eq!(c, Rgba::WHITE);
    }
}
