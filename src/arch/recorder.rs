//! Dispositivo que registra llamadas en vez de ejecutarlas.
//!
//! Las llamadas emitidas entre `new_list()` y `end_list()` se guardan en
//! la display list correspondiente y no en el registro principal, de la
//! misma forma en que `GL_COMPILE` difiere su ejecución.

use std::fmt::{self, Display};

use super::{ati, nv, Capability, Device, HardwareError};
use crate::ir::Vector4;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Enable(Capability),
    Disable(Capability),
    GenFragmentShader(u32),
    BindFragmentShader(u32),
    DeleteFragmentShader(u32),
    BeginFragmentShader,
    EndFragmentShader,
    PassTexCoord {
        dst: ati::Register,
        coord: ati::Register,
        swizzle: ati::Swizzle,
    },
    SampleMap {
        dst: ati::Register,
        interp: ati::Register,
        swizzle: ati::Swizzle,
    },
    ColorFragmentOp {
        op: ati::Op,
        dst: ati::Destination,
        args: ati::Args,
    },
    AlphaFragmentOp {
        op: ati::Op,
        dst: ati::Destination,
        args: ati::Args,
    },
    SetFragmentShaderConstant {
        register: u8,
        value: Vector4,
    },
    GenLists {
        first: u32,
        range: u32,
    },
    NewList(u32),
    EndList,
    CallList(u32),
    DeleteLists {
        list: u32,
        range: u32,
    },
    CombinerParameter(nv::CombinerParameter),
    CombinerInput {
        stage: u32,
        portion: nv::Portion,
        variable: nv::Variable,
        input: nv::Input,
    },
    CombinerOutput {
        stage: u32,
        portion: nv::Portion,
        output: nv::Output,
    },
    FinalCombinerInput {
        variable: nv::FinalVariable,
        input: nv::Input,
    },
    CombinerStageConstant {
        stage: u32,
        slot: u8,
        value: Vector4,
    },
    ActiveTexture(u32),
    TextureShaderOperation(nv::TextureOperation),
    PreviousTextureInput(u32),
    RgbaDotProductMapping(nv::Mapping),
    ConstEye(Vector4),
}

/// Implementación de [`Device`] para pruebas y para la CLI.
#[derive(Debug, Default)]
pub struct Recorder {
    calls: Vec<Call>,
    lists: Vec<(u32, Vec<Call>)>,
    compiling: Option<usize>,
    shaders: u32,
    next_list: u32,
    fallible: usize,
    fail_at: Option<usize>,
    targets: Vec<(u32, nv::TextureTarget)>,
    enabled: Vec<Capability>,
}

impl Recorder {
    pub fn new() -> Self {
        Recorder::default()
    }

    /// Llamadas ejecutadas inmediatamente, en orden.
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    /// Contenido de una display list compilada.
    pub fn list(&self, list: u32) -> Option<&[Call]> {
        self.lists
            .iter()
            .find(|(id, _)| *id == list)
            .map(|(_, calls)| calls.as_slice())
    }

    /// Todas las display lists vigentes, en orden de identificador.
    pub fn lists(&self) -> Vec<(u32, &[Call])> {
        let mut lists: Vec<_> = self
            .lists
            .iter()
            .map(|(id, calls)| (*id, calls.as_slice()))
            .collect();

        lists.sort_by_key(|&(id, _)| id);
        lists
    }

    /// Hace fallar la `n`-ésima llamada falible a partir de ahora, desde cero.
    pub fn fail_at(&mut self, n: usize) {
        self.fail_at = Some(self.fallible + n);
    }

    /// Simula una textura habilitada en una unidad.
    pub fn set_texture_target(&mut self, unit: u32, target: nv::TextureTarget) {
        self.targets.retain(|&(bound, _)| bound != unit);
        self.targets.push((unit, target));
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.enabled.contains(&capability)
    }

    fn check(&mut self) -> Result<(), HardwareError> {
        let call = self.fallible;
        self.fallible += 1;

        if self.fail_at == Some(call) {
            self.fail_at = None;
            Err(HardwareError::InvalidOperation)
        } else {
            Ok(())
        }
    }

    fn record(&mut self, call: Call) {
        match self.compiling {
            Some(index) => self.lists[index].1.push(call),
            None => self.calls.push(call),
        }
    }

    fn checked(&mut self, call: Call) -> Result<(), HardwareError> {
        self.check()?;
        self.record(call);

        Ok(())
    }
}

impl Device for Recorder {
    fn enable(&mut self, capability: Capability) {
        if !self.enabled.contains(&capability) {
            self.enabled.push(capability);
        }

        self.record(Call::Enable(capability));
    }

    fn disable(&mut self, capability: Capability) {
        self.enabled.retain(|&enabled| enabled != capability);
        self.record(Call::Disable(capability));
    }

    fn gen_fragment_shader(&mut self) -> Result<u32, HardwareError> {
        self.check()?;

        self.shaders += 1;
        self.calls.push(Call::GenFragmentShader(self.shaders));

        Ok(self.shaders)
    }

    fn bind_fragment_shader(&mut self, shader: u32) -> Result<(), HardwareError> {
        self.checked(Call::BindFragmentShader(shader))
    }

    fn delete_fragment_shader(&mut self, shader: u32) {
        self.record(Call::DeleteFragmentShader(shader));
    }

    fn begin_fragment_shader(&mut self) -> Result<(), HardwareError> {
        self.checked(Call::BeginFragmentShader)
    }

    fn end_fragment_shader(&mut self) -> Result<(), HardwareError> {
        self.checked(Call::EndFragmentShader)
    }

    fn pass_tex_coord(
        &mut self,
        dst: ati::Register,
        coord: ati::Register,
        swizzle: ati::Swizzle,
    ) -> Result<(), HardwareError> {
        self.checked(Call::PassTexCoord {
            dst,
            coord,
            swizzle,
        })
    }

    fn sample_map(
        &mut self,
        dst: ati::Register,
        interp: ati::Register,
        swizzle: ati::Swizzle,
    ) -> Result<(), HardwareError> {
        self.checked(Call::SampleMap {
            dst,
            interp,
            swizzle,
        })
    }

    fn color_fragment_op(
        &mut self,
        op: ati::Op,
        dst: ati::Destination,
        args: ati::Args,
    ) -> Result<(), HardwareError> {
        self.checked(Call::ColorFragmentOp { op, dst, args })
    }

    fn alpha_fragment_op(
        &mut self,
        op: ati::Op,
        dst: ati::Destination,
        args: ati::Args,
    ) -> Result<(), HardwareError> {
        self.checked(Call::AlphaFragmentOp { op, dst, args })
    }

    fn set_fragment_shader_constant(
        &mut self,
        register: u8,
        value: Vector4,
    ) -> Result<(), HardwareError> {
        self.checked(Call::SetFragmentShaderConstant { register, value })
    }

    fn gen_lists(&mut self, range: u32) -> Result<u32, HardwareError> {
        if range == 0 {
            return Err(HardwareError::InvalidValue);
        }

        self.check()?;

        let first = self.next_list + 1;
        self.next_list += range;
        self.calls.push(Call::GenLists { first, range });

        Ok(first)
    }

    fn new_list(&mut self, list: u32) -> Result<(), HardwareError> {
        if self.compiling.is_some() {
            return Err(HardwareError::InvalidOperation);
        } else if list == 0 {
            return Err(HardwareError::InvalidValue);
        }

        self.check()?;
        self.calls.push(Call::NewList(list));

        // Compilar sobre una lista existente la reemplaza
        self.lists.retain(|(id, _)| *id != list);
        self.lists.push((list, Vec::new()));
        self.compiling = Some(self.lists.len() - 1);

        Ok(())
    }

    fn end_list(&mut self) -> Result<(), HardwareError> {
        if self.compiling.take().is_none() {
            return Err(HardwareError::InvalidOperation);
        }

        self.check()?;
        self.calls.push(Call::EndList);

        Ok(())
    }

    fn call_list(&mut self, list: u32) {
        self.record(Call::CallList(list));
    }

    fn delete_lists(&mut self, list: u32, range: u32) {
        self.lists.retain(|(id, _)| *id < list || *id >= list + range);
        self.record(Call::DeleteLists { list, range });
    }

    fn combiner_parameter(
        &mut self,
        parameter: nv::CombinerParameter,
    ) -> Result<(), HardwareError> {
        self.checked(Call::CombinerParameter(parameter))
    }

    fn combiner_input(
        &mut self,
        stage: u32,
        portion: nv::Portion,
        variable: nv::Variable,
        input: nv::Input,
    ) -> Result<(), HardwareError> {
        self.checked(Call::CombinerInput {
            stage,
            portion,
            variable,
            input,
        })
    }

    fn combiner_output(
        &mut self,
        stage: u32,
        portion: nv::Portion,
        output: &nv::Output,
    ) -> Result<(), HardwareError> {
        self.checked(Call::CombinerOutput {
            stage,
            portion,
            output: *output,
        })
    }

    fn final_combiner_input(
        &mut self,
        variable: nv::FinalVariable,
        input: nv::Input,
    ) -> Result<(), HardwareError> {
        self.checked(Call::FinalCombinerInput { variable, input })
    }

    fn combiner_stage_constant(
        &mut self,
        stage: u32,
        slot: u8,
        value: Vector4,
    ) -> Result<(), HardwareError> {
        self.checked(Call::CombinerStageConstant { stage, slot, value })
    }

    fn active_texture(&mut self, unit: u32) -> Result<(), HardwareError> {
        self.checked(Call::ActiveTexture(unit))
    }

    fn texture_shader_operation(
        &mut self,
        operation: nv::TextureOperation,
    ) -> Result<(), HardwareError> {
        self.checked(Call::TextureShaderOperation(operation))
    }

    fn previous_texture_input(&mut self, unit: u32) -> Result<(), HardwareError> {
        self.checked(Call::PreviousTextureInput(unit))
    }

    fn rgba_dot_product_mapping(&mut self, mapping: nv::Mapping) -> Result<(), HardwareError> {
        self.checked(Call::RgbaDotProductMapping(mapping))
    }

    fn const_eye(&mut self, eye: Vector4) -> Result<(), HardwareError> {
        self.checked(Call::ConstEye(eye))
    }

    fn bound_texture_target(&mut self, unit: u32) -> Option<nv::TextureTarget> {
        self.targets
            .iter()
            .find(|&&(bound, _)| bound == unit)
            .map(|&(_, target)| target)
    }
}

fn vector(value: &Vector4) -> String {
    format!("{{{}, {}, {}, {}}}", value[0], value[1], value[2], value[3])
}

impl Display for Call {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Call::Enable(capability) => write!(fmt, "glEnable({})", capability),
            Call::Disable(capability) => write!(fmt, "glDisable({})", capability),
            Call::GenFragmentShader(id) => write!(fmt, "glGenFragmentShadersATI(1) = {}", id),
            Call::BindFragmentShader(id) => write!(fmt, "glBindFragmentShaderATI({})", id),
            Call::DeleteFragmentShader(id) => write!(fmt, "glDeleteFragmentShaderATI({})", id),
            Call::BeginFragmentShader => fmt.write_str("glBeginFragmentShaderATI()"),
            Call::EndFragmentShader => fmt.write_str("glEndFragmentShaderATI()"),

            Call::PassTexCoord {
                dst,
                coord,
                swizzle,
            } => write!(fmt, "glPassTexCoordATI({}, {}, {})", dst, coord, swizzle),

            Call::SampleMap {
                dst,
                interp,
                swizzle,
            } => write!(fmt, "glSampleMapATI({}, {}, {})", dst, interp, swizzle),

            Call::ColorFragmentOp { op, dst, args } => write!(
                fmt,
                "glColorFragmentOp{}ATI({}, {}, {}, {}, {})",
                args.len(),
                op,
                dst.register,
                dst.mask,
                dst.modifiers,
                args
            ),

            Call::AlphaFragmentOp { op, dst, args } => write!(
                fmt,
                "glAlphaFragmentOp{}ATI({}, {}, {}, {})",
                args.len(),
                op,
                dst.register,
                dst.modifiers,
                args
            ),

            Call::SetFragmentShaderConstant { register, value } => write!(
                fmt,
                "glSetFragmentShaderConstantATI(GL_CON_{}_ATI, {})",
                register,
                vector(value)
            ),

            Call::GenLists { first, range } => write!(fmt, "glGenLists({}) = {}", range, first),
            Call::NewList(list) => write!(fmt, "glNewList({}, GL_COMPILE)", list),
            Call::EndList => fmt.write_str("glEndList()"),
            Call::CallList(list) => write!(fmt, "glCallList({})", list),
            Call::DeleteLists { list, range } => write!(fmt, "glDeleteLists({}, {})", list, range),

            Call::CombinerParameter(parameter) => {
                write!(fmt, "glCombinerParameteriNV({})", parameter)
            }

            Call::CombinerInput {
                stage,
                portion,
                variable,
                input,
            } => write!(
                fmt,
                "glCombinerInputNV(GL_COMBINER{}_NV, {}, {}, {})",
                stage, portion, variable, input
            ),

            Call::CombinerOutput {
                stage,
                portion,
                output,
            } => write!(
                fmt,
                "glCombinerOutputNV(GL_COMBINER{}_NV, {}, {})",
                stage, portion, output
            ),

            Call::FinalCombinerInput { variable, input } => {
                write!(fmt, "glFinalCombinerInputNV({}, {})", variable, input)
            }

            Call::CombinerStageConstant { stage, slot, value } => write!(
                fmt,
                "glCombinerStageParameterfvNV(GL_COMBINER{}_NV, GL_CONSTANT_COLOR{}_NV, {})",
                stage,
                slot,
                vector(value)
            ),

            Call::ActiveTexture(unit) => write!(fmt, "glActiveTextureARB(GL_TEXTURE{}_ARB)", unit),

            Call::TextureShaderOperation(operation) => write!(
                fmt,
                "glTexEnvi(GL_TEXTURE_SHADER_NV, GL_SHADER_OPERATION_NV, {})",
                operation
            ),

            Call::PreviousTextureInput(unit) => write!(
                fmt,
                "glTexEnvi(GL_TEXTURE_SHADER_NV, GL_PREVIOUS_TEXTURE_INPUT_NV, GL_TEXTURE{}_ARB)",
                unit
            ),

            Call::RgbaDotProductMapping(mapping) => write!(
                fmt,
                "glTexEnvi(GL_TEXTURE_SHADER_NV, GL_RGBA_UNSIGNED_DOT_PRODUCT_MAPPING_NV, {})",
                mapping
            ),

            Call::ConstEye(eye) => write!(
                fmt,
                "glTexEnvfv(GL_TEXTURE_SHADER_NV, GL_CONST_EYE_NV, {})",
                vector(eye)
            ),
        }
    }
}
