//! Psi/phi curve pairs and the quantities derived from them.

use serde::{Deserialize, Serialize};

use crate::error::RefineError;

/// Numerator (psi) and denominator (phi) statistics sampled at each epoch
/// along one trajectory.
///
/// A phi value of exactly zero marks an epoch without information (masked),
/// not a zero flux.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvePair {
    pub psi: Vec<f64>,
    pub phi: Vec<f64>,
}

impl CurvePair {
    pub fn new(psi: Vec<f64>, phi: Vec<f64>) -> Self {
        Self { psi, phi }
    }

    /// Number of epochs, as given by the psi curve.
    pub fn len(&self) -> usize {
        self.psi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.psi.is_empty()
    }

    /// Fail unless psi and phi have the same number of samples.
    pub fn check_lengths(&self, ordinal: usize) -> Result<(), RefineError> {
        if self.psi.len() != self.phi.len() {
            return Err(RefineError::CurveLengthMismatch {
                ordinal,
                psi: self.psi.len(),
                phi: self.phi.len(),
            });
        }
        Ok(())
    }

    /// Whether the epoch at `index` carries no information.
    pub fn is_masked(&self, index: usize) -> bool {
        self.phi[index] == 0.0
    }

    /// Phi with masked entries replaced by `masked_phi`.
    pub fn masked_phi(&self, masked_phi: f64) -> Vec<f64> {
        self.phi
            .iter()
            .map(|&p| if p == 0.0 { masked_phi } else { p })
            .collect()
    }

    /// Per-epoch flux estimate `psi / phi`.
    ///
    /// Masked epochs divide by `masked_phi` instead of zero, so they come out
    /// near zero rather than infinite.
    pub fn light_curve(&self, masked_phi: f64) -> Vec<f64> {
        self.psi
            .iter()
            .zip(self.masked_phi(masked_phi))
            .map(|(psi, phi)| psi / phi)
            .collect()
    }

    /// Likelihood `sum(psi) / sqrt(sum(phi))` over the given epochs.
    pub fn likelihood_at(&self, indices: &[usize]) -> f64 {
        let psi_sum: f64 = indices.iter().map(|&i| self.psi[i]).sum();
        let phi_sum: f64 = indices.iter().map(|&i| self.phi[i]).sum();
        psi_sum / phi_sum.sqrt()
    }

    /// Likelihood over every epoch.
    pub fn likelihood(&self) -> f64 {
        let psi_sum: f64 = self.psi.iter().sum();
        let phi_sum: f64 = self.phi.iter().sum();
        psi_sum / phi_sum.sqrt()
    }
}
