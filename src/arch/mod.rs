//! Detalles específicos para cada pipeline de hardware objetivo.
//!
//! Este módulo expone el vocabulario de configuración de cada familia
//! de GPU y el trait [`Device`], a través del cual los back ends
//! configuran el hardware. En general, debe utilizarse la macro
//! `dispatch_backend!()` para acceder a las implementaciones por
//! arquitectura.

use std::fmt::{self, Display};
use thiserror::Error;

use crate::ir::Vector4;

pub mod ati;
pub mod nv;

mod recorder;

pub use recorder::{Call, Recorder};

/// Familia de pipeline de función fija.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Arch {
    /// `ATI_fragment_shader`
    Ati,
    /// `NV_register_combiners` y `NV_texture_shader`
    Nv,
}

impl Display for Arch {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Arch::Ati => "ati",
            Arch::Nv => "nv",
        })
    }
}

/// Extensiones disponibles en el contexto actual.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub ati_fragment_shader: bool,
    pub nv_texture_shader: bool,
}

impl Capabilities {
    /// Elige una arquitectura. Se prefiere ATI si ambas están presentes.
    pub fn select(self) -> Option<Arch> {
        if self.ati_fragment_shader {
            Some(Arch::Ati)
        } else if self.nv_texture_shader {
            Some(Arch::Nv)
        } else {
            None
        }
    }
}

impl From<Arch> for Capabilities {
    fn from(arch: Arch) -> Self {
        Capabilities {
            ati_fragment_shader: arch == Arch::Ati,
            nv_texture_shader: arch == Arch::Nv,
        }
    }
}

/// Equivalente a un valor de `glGetError()` distinto de `GL_NO_ERROR`.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum HardwareError {
    #[error("GL_INVALID_OPERATION")]
    InvalidOperation,

    #[error("GL_INVALID_VALUE")]
    InvalidValue,

    #[error("GL_OUT_OF_MEMORY")]
    OutOfMemory,
}

/// Estados de `glEnable()`/`glDisable()` utilizados por los back ends.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Capability {
    FragmentShaderAti,
    TextureShaderNv,
    RegisterCombinersNv,
    PerStageConstantsNv,
}

impl Display for Capability {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Capability::FragmentShaderAti => "GL_FRAGMENT_SHADER_ATI",
            Capability::TextureShaderNv => "GL_TEXTURE_SHADER_NV",
            Capability::RegisterCombinersNv => "GL_REGISTER_COMBINERS_NV",
            Capability::PerStageConstantsNv => "GL_PER_STAGE_CONSTANTS_NV",
        })
    }
}

/// Contexto de hardware.
///
/// Cada método corresponde a un punto de entrada de GL. Los que pueden
/// fallar retornan el error que `glGetError()` reportaría inmediatamente
/// después de la llamada.
pub trait Device {
    fn enable(&mut self, capability: Capability);

    fn disable(&mut self, capability: Capability);

    /// `glGenFragmentShadersATI(1)`
    fn gen_fragment_shader(&mut self) -> Result<u32, HardwareError>;

    fn bind_fragment_shader(&mut self, shader: u32) -> Result<(), HardwareError>;

    fn delete_fragment_shader(&mut self, shader: u32);

    fn begin_fragment_shader(&mut self) -> Result<(), HardwareError>;

    fn end_fragment_shader(&mut self) -> Result<(), HardwareError>;

    fn pass_tex_coord(
        &mut self,
        dst: ati::Register,
        coord: ati::Register,
        swizzle: ati::Swizzle,
    ) -> Result<(), HardwareError>;

    fn sample_map(
        &mut self,
        dst: ati::Register,
        interp: ati::Register,
        swizzle: ati::Swizzle,
    ) -> Result<(), HardwareError>;

    /// `glColorFragmentOp{1,2,3}ATI`, según la cantidad de argumentos.
    fn color_fragment_op(
        &mut self,
        op: ati::Op,
        dst: ati::Destination,
        args: ati::Args,
    ) -> Result<(), HardwareError>;

    /// `glAlphaFragmentOp{1,2,3}ATI`. La máscara del destino se ignora.
    fn alpha_fragment_op(
        &mut self,
        op: ati::Op,
        dst: ati::Destination,
        args: ati::Args,
    ) -> Result<(), HardwareError>;

    fn set_fragment_shader_constant(
        &mut self,
        register: u8,
        value: Vector4,
    ) -> Result<(), HardwareError>;

    /// Reserva `range` display lists consecutivas y retorna la primera.
    fn gen_lists(&mut self, range: u32) -> Result<u32, HardwareError>;

    /// `glNewList(list, GL_COMPILE)`
    fn new_list(&mut self, list: u32) -> Result<(), HardwareError>;

    fn end_list(&mut self) -> Result<(), HardwareError>;

    fn call_list(&mut self, list: u32);

    fn delete_lists(&mut self, list: u32, range: u32);

    fn combiner_parameter(&mut self, parameter: nv::CombinerParameter)
        -> Result<(), HardwareError>;

    fn combiner_input(
        &mut self,
        stage: u32,
        portion: nv::Portion,
        variable: nv::Variable,
        input: nv::Input,
    ) -> Result<(), HardwareError>;

    fn combiner_output(
        &mut self,
        stage: u32,
        portion: nv::Portion,
        output: &nv::Output,
    ) -> Result<(), HardwareError>;

    fn final_combiner_input(
        &mut self,
        variable: nv::FinalVariable,
        input: nv::Input,
    ) -> Result<(), HardwareError>;

    /// `glCombinerStageParameterfvNV(stage, GL_CONSTANT_COLOR{slot}_NV, value)`
    fn combiner_stage_constant(
        &mut self,
        stage: u32,
        slot: u8,
        value: Vector4,
    ) -> Result<(), HardwareError>;

    fn active_texture(&mut self, unit: u32) -> Result<(), HardwareError>;

    fn texture_shader_operation(
        &mut self,
        operation: nv::TextureOperation,
    ) -> Result<(), HardwareError>;

    fn previous_texture_input(&mut self, unit: u32) -> Result<(), HardwareError>;

    fn rgba_dot_product_mapping(&mut self, mapping: nv::Mapping) -> Result<(), HardwareError>;

    fn const_eye(&mut self, eye: Vector4) -> Result<(), HardwareError>;

    /// Objetivo de textura habilitado en una unidad, si hay alguno.
    fn bound_texture_target(&mut self, unit: u32) -> Option<nv::TextureTarget>;
}
