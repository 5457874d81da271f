use std::{fmt::Display, str::FromStr};

use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};

use crate::FfrwError;

/// A universal form-factor shape, evaluated as a function of the recoil $`w = v_B \cdot v_{D^*}`$.
///
/// Shapes are normalised to unity at zero recoil ($`w = 1`$), so the ratio of two shapes only
/// carries the difference in kinematic dependence.
pub trait FormFactor: DynClone + Send + Sync + std::fmt::Debug {
    /// The name this model is registered under.
    fn name(&self) -> &str;
    /// The value of the shape at recoil `w`.
    fn value(&self, w: f64) -> f64;
}
dyn_clone::clone_trait_object!(FormFactor);

/// The Caprini-Lellouch-Neubert dispersive parameterisation,
///
/// ```math
/// h(w) = 1 - 8\rho^2 z + (53\rho^2 - 15) z^2 - (231\rho^2 - 91) z^3,\quad z = \frac{\sqrt{w+1} - \sqrt{2}}{\sqrt{w+1} + \sqrt{2}}
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cln {
    /// The slope parameter $`\rho^2`$.
    pub rho2: f64,
}

impl Default for Cln {
    fn default() -> Self {
        Self { rho2: 1.207 }
    }
}

impl FormFactor for Cln {
    fn name(&self) -> &str {
        "CLN"
    }

    fn value(&self, w: f64) -> f64 {
        let a = f64::sqrt(w + 1.0);
        let z = (a - std::f64::consts::SQRT_2) / (a + std::f64::consts::SQRT_2);
        1.0 - 8.0 * self.rho2 * z + (53.0 * self.rho2 - 15.0) * z.powi(2)
            - (231.0 * self.rho2 - 91.0) * z.powi(3)
    }
}

/// The ISGW2 quark-model Isgur-Wise function, $`\xi(w) = \left(1 + \frac{\rho^2}{3}(w - 1)\right)^{-3}`$.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Isgw2 {
    /// The slope parameter $`\rho^2`$.
    pub rho2: f64,
}

impl Default for Isgw2 {
    fn default() -> Self {
        Self { rho2: 0.70 }
    }
}

impl FormFactor for Isgw2 {
    fn name(&self) -> &str {
        "ISGW2"
    }

    fn value(&self, w: f64) -> f64 {
        (1.0 + self.rho2 * (w - 1.0) / 3.0).powi(-3)
    }
}

/// The built-in form-factor models, selectable by name.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FormFactorModel {
    /// See [`Cln`].
    Cln,
    /// See [`Isgw2`].
    Isgw2,
}

impl FormFactorModel {
    /// Instantiate the model with its default parameters.
    pub fn build(&self) -> Box<dyn FormFactor> {
        match self {
            FormFactorModel::Cln => Box::new(Cln::default()),
            FormFactorModel::Isgw2 => Box::new(Isgw2::default()),
        }
    }
}

impl Display for FormFactorModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormFactorModel::Cln => write!(f, "CLN"),
            FormFactorModel::Isgw2 => write!(f, "ISGW2"),
        }
    }
}

impl FromStr for FormFactorModel {
    type Err = FfrwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CLN" => Ok(Self::Cln),
            "ISGW2" => Ok(Self::Isgw2),
            _ => Err(FfrwError::ParseError {
                name: s.to_string(),
                object: "FormFactorModel".to_string(),
            }),
        }
    }
}
