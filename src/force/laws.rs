/// Maps a squared projected distance and class agreement to a signed force magnitude.
///
/// Positive values pull two points together, negative values push them apart. The
/// `Linear` law lets attraction grow with r² while repulsion falls off as 1/r², so the
/// system has no stable equilibrium radius of its own; boundedness comes entirely from
/// renormalizing the anchors after each sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForceLaw {
    /// same class: 150·attractG·r², different class: −repelG/r²
    #[default]
    Linear,
    /// same class: attractG·r², different class: −repelG/r
    Square,
    /// same class: attractG·(1 − e^(−r²/σ)), different class: −repelG·e^(−r²/σ)
    Gaussian,
    /// same class: attractG·r, different class: −repelG/r, only between k nearest neighbours
    Knn,
    /// `Linear` plus a constant repulsion of repelG between different classes
    LinearPlus,
}

impl ForceLaw {
    pub fn attraction(self, r2: f64, attract_g: f64, sigma: f64) -> f64 {
        match self {
            ForceLaw::Linear | ForceLaw::LinearPlus => 150.0 * attract_g * r2,
            ForceLaw::Square => attract_g * r2,
            ForceLaw::Gaussian => attract_g * (1.0 - (-r2 / sigma.max(f64::EPSILON)).exp()),
            ForceLaw::Knn => attract_g * r2.sqrt(),
        }
    }

    pub fn repulsion(self, r2: f64, repel_g: f64, sigma: f64) -> f64 {
        match self {
            ForceLaw::Linear => -repel_g / r2,
            ForceLaw::Square | ForceLaw::Knn => -repel_g / r2.sqrt(),
            ForceLaw::Gaussian => -repel_g * (-r2 / sigma.max(f64::EPSILON)).exp(),
            ForceLaw::LinearPlus => -repel_g / r2 - repel_g,
        }
    }

    pub fn magnitude(
        self,
        r2: f64,
        same_class: bool,
        attract_g: f64,
        repel_g: f64,
        sigma: f64,
    ) -> f64 {
        if same_class {
            self.attraction(r2, attract_g, sigma)
        } else {
            self.repulsion(r2, repel_g, sigma)
        }
    }
}
