//! Generación de configuración de hardware.
//!
//! Cada back end traduce un [`Program`] a los objetos de su pipeline de
//! función fija y administra su ciclo de vida: activación por cada draw,
//! carga de constantes y liberación final. Ambos implementan [`Pipeline`]
//! y se agrupan en [`Backend`], sobre el cual se despacha con
//! `dispatch_backend!()`.

use crate::{
    arch::{Arch, Device},
    constants::{ConstantTable, VariableLookup},
    ir::Program,
};

pub mod ati;
pub mod nv;

pub use ati::{Ati, AtiError};
pub use nv::{Nv, NvError};

/// Límites de recursos de hardware.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    /// `GL_MAX_GENERAL_COMBINERS_NV`
    pub max_general_combiners: u32,
    /// Unidades de textura direccionables por el texture shader.
    pub texture_units: u8,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_general_combiners: 8,
            texture_units: 4,
        }
    }
}

/// Programa compilado para un pipeline específico.
pub trait Pipeline: Sized {
    type Error: std::error::Error + 'static;

    /// Traduce un programa. Ante un error no queda ningún objeto de
    /// hardware reservado.
    fn compile(
        program: &Program,
        limits: &Limits,
        device: &mut dyn Device,
    ) -> Result<Self, Self::Error>;

    fn activate(&self, device: &mut dyn Device) -> Result<(), Self::Error>;

    fn deactivate(&self, device: &mut dyn Device);

    /// Carga estado previo a un draw, principalmente constantes.
    fn setup_state(
        &mut self,
        device: &mut dyn Device,
        constants: &ConstantTable,
        lookup: &dyn VariableLookup,
    ) -> Result<(), Self::Error>;

    fn reset_state(&mut self, _device: &mut dyn Device) {}

    /// Libera los objetos de hardware.
    fn release(self, device: &mut dyn Device);
}

pub enum Backend {
    Ati(Ati),
    Nv(Nv),
}

impl Backend {
    pub fn arch(&self) -> Arch {
        match self {
            Backend::Ati(_) => Arch::Ati,
            Backend::Nv(_) => Arch::Nv,
        }
    }
}

impl From<Ati> for Backend {
    fn from(ati: Ati) -> Self {
        Backend::Ati(ati)
    }
}

impl From<Nv> for Backend {
    fn from(nv: Nv) -> Self {
        Backend::Nv(nv)
    }
}
