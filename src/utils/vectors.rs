use std::fmt::Display;

use auto_ops::{impl_op_ex, impl_op_ex_commutative};
use serde::{Deserialize, Serialize};

/// A Cartesian 3-vector.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// The x-component.
    pub x: f64,
    /// The y-component.
    pub y: f64,
    /// The z-component.
    pub z: f64,
}

impl Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:6.3}, {:6.3}, {:6.3}]", self.x, self.y, self.z)
    }
}

impl Vec3 {
    /// Create a new 3-vector from its components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
    /// Build a four-momentum with this 3-momentum and the given mass.
    pub fn with_mass(&self, mass: f64) -> Vec4 {
        let e = f64::sqrt(mass.powi(2) + self.mag2());
        Vec4::new(self.x, self.y, self.z, e)
    }
    /// Build a four-momentum with this 3-momentum and the given energy.
    pub fn with_energy(&self, energy: f64) -> Vec4 {
        Vec4::new(self.x, self.y, self.z, energy)
    }
    /// The Euclidean dot product.
    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }
    /// The squared magnitude.
    pub fn mag2(&self) -> f64 {
        self.dot(self)
    }
    /// The magnitude.
    pub fn mag(&self) -> f64 {
        self.mag2().sqrt()
    }
}

impl_op_ex!(+ |a: &Vec3, b: &Vec3| -> Vec3 { Vec3::new(a.x + b.x, a.y + b.y, a.z + b.z) });
impl_op_ex!(-|a: &Vec3, b: &Vec3| -> Vec3 { Vec3::new(a.x - b.x, a.y - b.y, a.z - b.z) });
impl_op_ex!(-|a: &Vec3| -> Vec3 { Vec3::new(-a.x, -a.y, -a.z) });
impl_op_ex_commutative!(*|a: &Vec3, b: &f64| -> Vec3 { Vec3::new(a.x * b, a.y * b, a.z * b) });
impl_op_ex!(/ |a: &Vec3, b: &f64| -> Vec3 { Vec3::new(a.x / b, a.y / b, a.z / b) });

/// A four-momentum, stored as a 3-momentum plus an energy (`t`) and using the $`(+---)`$ metric.
///
/// Components are in whatever unit the input used (MeV for simulation truth). Nothing here
/// rescales; conversions to GeV happen in [`variables`](crate::utils::variables).
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec4 {
    /// The x-component of the momentum.
    pub x: f64,
    /// The y-component of the momentum.
    pub y: f64,
    /// The z-component of the momentum.
    pub z: f64,
    /// The energy.
    pub t: f64,
}

impl Display for Vec4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:6.3}, {:6.3}, {:6.3}; {:6.3}]",
            self.x, self.y, self.z, self.t
        )
    }
}

impl Vec4 {
    /// Create a new four-momentum from its momentum components and energy.
    pub const fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self {
            x: px,
            y: py,
            z: pz,
            t: e,
        }
    }
    /// The x-component of the momentum.
    pub fn px(&self) -> f64 {
        self.x
    }
    /// The y-component of the momentum.
    pub fn py(&self) -> f64 {
        self.y
    }
    /// The z-component of the momentum.
    pub fn pz(&self) -> f64 {
        self.z
    }
    /// The energy.
    pub fn e(&self) -> f64 {
        self.t
    }
    /// The 3-momentum.
    pub fn momentum(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
    /// The velocity $`\vec{\beta} = \vec{p}/E`$ of the frame in which this four-momentum is at rest.
    pub fn beta(&self) -> Vec3 {
        self.momentum() / self.t
    }
    /// The Lorentz factor $`\gamma = E/m`$.
    pub fn gamma(&self) -> f64 {
        self.t / self.m()
    }
    /// The Minkowski dot product.
    pub fn dot(&self, other: &Self) -> f64 {
        self.t * other.t - self.momentum().dot(&other.momentum())
    }
    /// The invariant mass squared, $`E^2 - |\vec{p}|^2`$.
    pub fn m2(&self) -> f64 {
        self.dot(self)
    }
    /// The invariant mass. Slightly negative $`m^2`$ from rounding is clamped to zero.
    pub fn m(&self) -> f64 {
        self.m2().max(0.0).sqrt()
    }
    /// Lorentz-boost this four-momentum by the velocity `beta` (in units of $`c`$).
    ///
    /// Passing `-p.beta()` yields the four-momentum as seen in the rest frame of `p`.
    ///
    /// <div class="warning">
    ///
    /// `beta` must satisfy $`|\vec{\beta}| < 1`$. This is not checked: a superluminal velocity
    /// (for example from corrupted truth information) produces NaN or meaningless components.
    ///
    /// </div>
    pub fn boost(&self, beta: &Vec3) -> Self {
        let b2 = beta.mag2();
        if b2 == 0.0 {
            return *self;
        }
        let gamma = 1.0 / f64::sqrt(1.0 - b2);
        let p3 = self.momentum();
        let bp = beta.dot(&p3);
        let p3_boosted = p3 + beta * ((gamma - 1.0) * bp / b2 + gamma * self.t);
        p3_boosted.with_energy(gamma * (self.t + bp))
    }
    /// A compact string representation used in event printouts.
    pub fn to_p4_string(&self) -> String {
        format!(
            "[e = {:.5}; p = ({:.5}, {:.5}, {:.5}); m = {:.5}]",
            self.t,
            self.x,
            self.y,
            self.z,
            self.m()
        )
    }
}

impl_op_ex!(+ |a: &Vec4, b: &Vec4| -> Vec4 { Vec4::new(a.x + b.x, a.y + b.y, a.z + b.z, a.t + b.t) });
impl_op_ex!(-|a: &Vec4, b: &Vec4| -> Vec4 { Vec4::new(a.x - b.x, a.y - b.y, a.z - b.z, a.t - b.t) });
impl_op_ex!(-|a: &Vec4| -> Vec4 { Vec4::new(-a.x, -a.y, -a.z, -a.t) });

impl std::iter::Sum<Vec4> for Vec4 {
    fn sum<I: Iterator<Item = Vec4>>(iter: I) -> Self {
        iter.fold(Vec4::default(), |acc, p4| acc + p4)
    }
}

impl<'a> std::iter::Sum<&'a Vec4> for Vec4 {
    fn sum<I: Iterator<Item = &'a Vec4>>(iter: I) -> Self {
        iter.fold(Vec4::default(), |acc, p4| acc + p4)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_vec_sums() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);
        let c = a + b;
        assert_eq!(c.x, 5.0);
        assert_eq!(c.y, 7.0);
        assert_eq!(c.z, 9.0);
        let total: Vec4 = [Vec4::new(1.0, 0.0, 0.0, 2.0), Vec4::new(-1.0, 0.0, 0.0, 2.0)]
            .iter()
            .sum();
        assert_eq!(total, Vec4::new(0.0, 0.0, 0.0, 4.0));
    }

    #[test]
    fn test_three_to_four_momentum_conversion() {
        let p3 = Vec3::new(1.0, 2.0, 3.0);
        let target_p4 = Vec4::new(1.0, 2.0, 3.0, 10.0);
        let p4_from_mass = p3.with_mass(target_p4.m());
        assert_relative_eq!(target_p4.e(), p4_from_mass.e());
        assert_relative_eq!(target_p4.px(), p4_from_mass.px());
        assert_relative_eq!(target_p4.py(), p4_from_mass.py());
        assert_relative_eq!(target_p4.pz(), p4_from_mass.pz());
        assert_eq!(p3.with_energy(10.0), target_p4);
    }

    #[test]
    fn test_four_momentum_basics() {
        let p = Vec4::new(3.0, 4.0, 5.0, 10.0);
        assert_eq!(p.e(), 10.0);
        assert_eq!(p.momentum(), Vec3::new(3.0, 4.0, 5.0));
        assert_relative_eq!(p.beta().x, 0.3);
        assert_relative_eq!(p.beta().y, 0.4);
        assert_relative_eq!(p.beta().z, 0.5);
        assert_relative_eq!(p.m(), 50.0_f64.sqrt());
        assert_relative_eq!(p.m2(), 50.0);
        assert_relative_eq!(p.gamma(), 2.0_f64.sqrt());
    }

    #[test]
    fn test_mass_of_on_shell_momentum() {
        let p = Vec3::new(120.0, -340.0, 2500.0).with_mass(1869.66);
        assert_relative_eq!(p.m2(), 1869.66_f64.powi(2), max_relative = 1e-12);
    }

    #[test]
    fn test_boost_com() {
        let p = Vec4::new(3.0, 4.0, 5.0, 10.0);
        let zero = p.boost(&-p.beta());
        assert_relative_eq!(zero.px(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(zero.py(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(zero.pz(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(zero.e(), p.m(), epsilon = 1e-12);
    }

    #[test]
    fn test_boost() {
        let pa = Vec4::new(3.0, 4.0, 5.0, 10.0);
        let pb = Vec4::new(3.4, 2.3, 1.2, 9.0);
        let boosted = pa.boost(&-pb.beta());
        assert_relative_eq!(boosted.e(), 8.157632144622882, epsilon = 1e-12);
        assert_relative_eq!(boosted.px(), -0.6489200627053444, epsilon = 1e-12);
        assert_relative_eq!(boosted.py(), 1.5316128987581492, epsilon = 1e-12);
        assert_relative_eq!(boosted.pz(), 3.712145860221643, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_velocity_boost_is_identity() {
        let at_rest = Vec4::new(0.0, 0.0, 0.0, 5279.65);
        assert_eq!(at_rest.boost(&Vec3::default()), at_rest);
        let moving = Vec4::new(10.0, -20.0, 30.0, 200.0);
        assert_eq!(moving.boost(&Vec3::default()), moving);
    }

    #[test]
    fn test_boost_preserves_mass() {
        let p = Vec3::new(100.0, 200.0, -300.0).with_mass(105.66);
        let boosted = p.boost(&Vec3::new(0.1, -0.4, 0.6));
        assert_relative_eq!(boosted.m2(), p.m2(), max_relative = 1e-9);
    }
}
