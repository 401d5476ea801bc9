//! Back end para `NV_register_combiners` y `NV_texture_shader`.
//!
//! # Fases
//! Un programa PS1.1-PS1.3 se divide en una serie inicial de
//! instrucciones de direccionamiento de texturas, seguida de una serie de
//! instrucciones aritméticas. La primera fase se traduce a etapas de
//! texture shader, una por unidad de textura. La segunda se traduce a
//! combinadores generales, donde cada instrucción ocupa una porción RGB,
//! una de alfa, o ambas.
//!
//! # Display lists
//! Se reservan dos listas consecutivas. La primera configura los
//! combinadores y se compila junto al programa. La segunda configura el
//! texture shader y se compila hasta la primera carga de estado, ya que
//! depende de los objetivos de textura habilitados en ese momento y de
//! los valores de constantes.
//!
//! # Constantes
//! Cada combinador tiene dos registros de constantes propios
//! (`GL_PER_STAGE_CONSTANTS_NV`). Una instrucción puede leer a lo sumo
//! dos constantes distintas, que se asignan en orden de aparición.

use thiserror::Error;

use super::{Limits, Pipeline};
use crate::{
    arch::{
        nv::{
            CombinerParameter, CombinerRegister, Component, FinalVariable, Input, Mapping, Output,
            Portion, Scale, TextureOperation, Variable,
        },
        Capability, Device, HardwareError,
    },
    constants::{ConstantTable, VariableLookup},
    ir::{self, InstructionModifiers, Program, RegisterClass, SourceModifiers, Vector4},
    opcode::Opcode,
};

#[derive(Error, Debug)]
pub enum NvError {
    #[error("Register combiners cannot express ps.1.4 programs")]
    Ps14Unsupported,

    #[error("Register combiner configuration failed: {0}")]
    Hardware(#[from] HardwareError),

    #[error("`{0}` appears after the first arithmetic instruction")]
    TextureAfterArithmetic(Opcode),

    #[error("`{0}` has no register combiner or texture shader equivalent")]
    Unsupported(Opcode),

    #[error("`{0}` carries an unsupported instruction modifier")]
    InstructionModifier(Opcode),

    #[error("`{0}` is scaled without a bias")]
    ScaleWithoutBias(ir::Register),

    #[error("Unsupported source modifier combination on `{0}`")]
    SourceModifier(ir::Register),

    #[error("`{0}` cannot replicate blue in an RGB portion")]
    BlueReplicate(ir::Register),

    #[error("The condition of `cnd` must be `r0.a`, found `{0}`")]
    CndCondition(ir::Register),

    #[error("The interpolant of `lrp` cannot carry modifiers")]
    LerpModifier,

    #[error("Texture unit {unit} is out of range, there are {limit} units")]
    TextureUnit { unit: u8, limit: u8 },

    #[error("An instruction may read at most two distinct constants")]
    TooManyConstants,

    #[error("`dp3` cannot write only the alpha channel")]
    AlphaDotProduct,

    #[error("Program needs {needed} general combiners, hardware has {limit}")]
    TooManyCombiners { needed: usize, limit: u32 },

    #[error("Program has no arithmetic instructions")]
    NoArithmetic,

    #[error("`{register}` is not a valid operand for `{opcode}`")]
    IllegalOperand {
        opcode: Opcode,
        register: ir::Register,
    },

    #[error("`{0}` is missing operands")]
    MissingOperand(Opcode),
}

/// Operación de una etapa de texture shader.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TextureKind {
    /// El objetivo se consulta al dispositivo.
    Texture,
    OffsetTexture2D,
    OffsetTexture2DScale,
    PassThrough,
    CullFragment,
    DotProduct,
    DotProductTexture2D,
    DotProductTextureCubeMap,
    DotProductReflectCubeMap,
    DotProductConstEyeReflectCubeMap,
    DependentAr,
    DependentGb,
}

impl TextureKind {
    fn from_opcode(opcode: Opcode) -> Option<Self> {
        use TextureKind::*;

        let kind = match opcode {
            Opcode::Tex => Texture,
            Opcode::Texbem => OffsetTexture2D,
            Opcode::Texbeml => OffsetTexture2DScale,
            Opcode::Texcoord => PassThrough,
            Opcode::Texkill => CullFragment,
            Opcode::Texm3x2pad | Opcode::Texm3x3pad => DotProduct,
            Opcode::Texm3x2tex => DotProductTexture2D,
            Opcode::Texm3x3tex => DotProductTextureCubeMap,
            Opcode::Texm3x3spec => DotProductConstEyeReflectCubeMap,
            Opcode::Texm3x3vspec => DotProductReflectCubeMap,
            Opcode::Texreg2ar => DependentAr,
            Opcode::Texreg2gb => DependentGb,
            _ => return None,
        };

        Some(kind)
    }

    /// Lee el resultado de una unidad anterior.
    fn uses_previous(self) -> bool {
        !matches!(
            self,
            TextureKind::Texture | TextureKind::PassThrough | TextureKind::CullFragment
        )
    }

    fn is_dot_product(self) -> bool {
        matches!(
            self,
            TextureKind::DotProduct
                | TextureKind::DotProductTexture2D
                | TextureKind::DotProductTextureCubeMap
                | TextureKind::DotProductReflectCubeMap
                | TextureKind::DotProductConstEyeReflectCubeMap
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TextureStage {
    pub unit: u8,
    pub kind: TextureKind,
    pub previous: u8,
    pub signed_scale: bool,
    /// Registro de constantes para `texm3x3spec`.
    pub parameter: u8,
}

/// Constantes leídas por un combinador, en `GL_CONSTANT_COLOR0_NV` y
/// `GL_CONSTANT_COLOR1_NV` respectivamente.
pub type ConstantPair = [Option<u8>; 2];

/// Una porción de un combinador general.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CombinerStage {
    pub portion: Portion,
    /// Entradas A, B, C y D.
    pub inputs: [Input; 4],
    pub output: Output,
    pub constants: ConstantPair,
}

/// Un par de display lists compilado.
#[derive(Debug)]
pub struct Nv {
    lists: u32,
    texture_units: u8,
    texture_stages: Vec<TextureStage>,
    constant_pairs: Vec<ConstantPair>,
    texture_list_built: bool,
}

impl Nv {
    pub fn combiner_list(&self) -> u32 {
        self.lists
    }

    pub fn texture_list(&self) -> u32 {
        self.lists + 1
    }

    pub fn texture_stages(&self) -> &[TextureStage] {
        &self.texture_stages
    }

    /// Constantes por cada combinador general.
    pub fn constant_pairs(&self) -> &[ConstantPair] {
        &self.constant_pairs
    }

    fn build_texture_list(
        &self,
        device: &mut dyn Device,
        constants: &ConstantTable,
        lookup: &dyn VariableLookup,
    ) -> Result<(), NvError> {
        compile_list(device, self.texture_list(), |device| {
            for unit in 0..self.texture_units as u32 {
                device.active_texture(unit)?;
                device.texture_shader_operation(TextureOperation::None)?;
            }

            for stage in &self.texture_stages {
                let unit = stage.unit as u32;
                device.active_texture(unit)?;

                if stage.kind.uses_previous() {
                    device.previous_texture_input(stage.previous as u32)?;
                }

                if stage.kind.is_dot_product() {
                    let mapping = if stage.signed_scale {
                        Mapping::ExpandNormal
                    } else {
                        Mapping::UnsignedIdentity
                    };

                    device.rgba_dot_product_mapping(mapping)?;
                }

                let operation = match stage.kind {
                    TextureKind::Texture => match device.bound_texture_target(unit) {
                        Some(target) => target.into(),
                        None => {
                            tracing::debug!(unit, "no texture target enabled, stage disabled");
                            TextureOperation::None
                        }
                    },

                    TextureKind::DotProductConstEyeReflectCubeMap => {
                        device.const_eye(eye(stage.parameter, constants, lookup))?;
                        TextureOperation::DotProductConstEyeReflectCubeMap
                    }

                    TextureKind::OffsetTexture2D => TextureOperation::OffsetTexture2D,
                    TextureKind::OffsetTexture2DScale => TextureOperation::OffsetTexture2DScale,
                    TextureKind::PassThrough => TextureOperation::PassThrough,
                    TextureKind::CullFragment => TextureOperation::CullFragment,
                    TextureKind::DotProduct => TextureOperation::DotProduct,
                    TextureKind::DotProductTexture2D => TextureOperation::DotProductTexture2D,
                    TextureKind::DotProductTextureCubeMap => {
                        TextureOperation::DotProductTextureCubeMap
                    }
                    TextureKind::DotProductReflectCubeMap => {
                        TextureOperation::DotProductReflectCubeMap
                    }
                    TextureKind::DependentAr => TextureOperation::DependentArTexture2D,
                    TextureKind::DependentGb => TextureOperation::DependentGbTexture2D,
                };

                device.texture_shader_operation(operation)?;
            }

            Ok(())
        })
    }
}

impl Pipeline for Nv {
    type Error = NvError;

    fn compile(
        program: &Program,
        limits: &Limits,
        device: &mut dyn Device,
    ) -> Result<Self, NvError> {
        if !program.version.is_legacy() {
            return Err(NvError::Ps14Unsupported);
        }

        let instructions = &program.instructions;
        let split = instructions
            .iter()
            .position(|instruction| instruction.opcode.is_arithmetic())
            .unwrap_or(instructions.len());

        let (textures, arithmetic) = instructions.split_at(split);
        if let Some(late) = arithmetic
            .iter()
            .find(|instruction| instruction.opcode.is_texture())
        {
            return Err(NvError::TextureAfterArithmetic(late.opcode));
        }

        let texture_stages = textures
            .iter()
            .map(|instruction| texture_stage(instruction, limits))
            .collect::<Result<Vec<_>, _>>()?;

        let mut stages = Vec::new();
        for instruction in arithmetic {
            stages.extend(combiner_stages(instruction)?);
        }

        let units = merge(stages);
        if units.is_empty() {
            return Err(NvError::NoArithmetic);
        } else if units.len() > limits.max_general_combiners as usize {
            return Err(NvError::TooManyCombiners {
                needed: units.len(),
                limit: limits.max_general_combiners,
            });
        }

        let lists = device.gen_lists(2)?;
        if let Err(error) = compile_list(device, lists, |device| emit_combiners(device, &units)) {
            device.delete_lists(lists, 2);
            return Err(error);
        }

        tracing::debug!(
            combiners = units.len(),
            texture_stages = texture_stages.len(),
            "register combiners compiled"
        );

        Ok(Nv {
            lists,
            texture_units: limits.texture_units,
            texture_stages,
            constant_pairs: units.iter().map(|unit| unit[0].constants).collect(),
            texture_list_built: false,
        })
    }

    fn activate(&self, device: &mut dyn Device) -> Result<(), NvError> {
        device.enable(Capability::TextureShaderNv);
        device.enable(Capability::RegisterCombinersNv);
        device.enable(Capability::PerStageConstantsNv);
        device.call_list(self.combiner_list());

        Ok(())
    }

    fn deactivate(&self, device: &mut dyn Device) {
        device.disable(Capability::PerStageConstantsNv);
        device.disable(Capability::RegisterCombinersNv);
        device.disable(Capability::TextureShaderNv);
    }

    fn setup_state(
        &mut self,
        device: &mut dyn Device,
        constants: &ConstantTable,
        lookup: &dyn VariableLookup,
    ) -> Result<(), NvError> {
        if !self.texture_list_built {
            self.build_texture_list(device, constants, lookup)?;
            self.texture_list_built = true;
        }

        device.call_list(self.texture_list());

        for (unit, pair) in self.constant_pairs.iter().enumerate() {
            for (slot, register) in pair.iter().enumerate() {
                let value = register.and_then(|register| constants.resolve(register, lookup));
                if let Some(value) = value {
                    device.combiner_stage_constant(unit as u32, slot as u8, value)?;
                }
            }
        }

        Ok(())
    }

    fn release(self, device: &mut dyn Device) {
        device.delete_lists(self.lists, 2);
    }
}

/// Compila una display list. La lista se cierra aunque el cuerpo falle.
fn compile_list<F>(device: &mut dyn Device, list: u32, body: F) -> Result<(), NvError>
where
    F: FnOnce(&mut dyn Device) -> Result<(), NvError>,
{
    device.new_list(list)?;
    let result = body(device);
    let ended = device.end_list();

    result?;
    ended?;

    Ok(())
}

fn eye(register: u8, constants: &ConstantTable, lookup: &dyn VariableLookup) -> Vector4 {
    constants.resolve(register, lookup).unwrap_or_else(|| {
        tracing::warn!(register, "eye vector constant is undefined, using default");
        [0.0, 0.0, -1.0, 0.0]
    })
}

fn texture_stage(instruction: &ir::Instruction, limits: &Limits) -> Result<TextureStage, NvError> {
    let opcode = instruction.opcode;
    let kind = TextureKind::from_opcode(opcode).ok_or(NvError::Unsupported(opcode))?;

    let dest = instruction.writes().ok_or(NvError::MissingOperand(opcode))?;
    if dest.class != RegisterClass::Texture {
        return Err(NvError::IllegalOperand {
            opcode,
            register: dest,
        });
    }

    let check_unit = |unit: u8| {
        if unit < limits.texture_units {
            Ok(unit)
        } else {
            Err(NvError::TextureUnit {
                unit,
                limit: limits.texture_units,
            })
        }
    };

    let first = instruction.sources.first();
    let previous = first.map_or(0, |source| source.register.index);

    Ok(TextureStage {
        unit: check_unit(dest.index)?,
        kind,
        previous: check_unit(previous)?,
        signed_scale: first.map_or(false, |source| {
            source.modifiers.contains(SourceModifiers::SIGNED_SCALE)
        }),
        parameter: match instruction.sources.get(1) {
            None => 0,
            Some(source) if source.register.class == RegisterClass::Constant => {
                source.register.index
            }
            Some(source) => {
                return Err(NvError::IllegalOperand {
                    opcode,
                    register: source.register,
                })
            }
        },
    })
}

/// Porciones de combinador de una instrucción aritmética.
fn combiner_stages(instruction: &ir::Instruction) -> Result<Vec<CombinerStage>, NvError> {
    let opcode = instruction.opcode;
    match opcode {
        Opcode::Nop => return Ok(Vec::new()),
        Opcode::Dp4 | Opcode::Bem | Opcode::Cmp => return Err(NvError::Unsupported(opcode)),
        _ => (),
    }

    let dest = instruction.dest.ok_or(NvError::MissingOperand(opcode))?;
    let modifiers = instruction.modifiers;

    // `_sat` no tiene equivalente en los combinadores generales
    let scaling = modifiers - InstructionModifiers::SAT;
    if modifiers.contains(InstructionModifiers::SAT) {
        tracing::debug!(%opcode, "saturate modifier ignored");
    }

    let scale = if scaling.is_empty() {
        Scale::None
    } else if scaling == InstructionModifiers::X2 {
        Scale::By2
    } else if scaling == InstructionModifiers::X4 {
        Scale::By4
    } else if scaling == InstructionModifiers::D2 {
        Scale::ByOneHalf
    } else {
        return Err(NvError::InstructionModifier(opcode));
    };

    let portions: &[Portion] = match (dest.mask.writes_rgb(), dest.mask.writes_alpha()) {
        (false, _) if opcode == Opcode::Dp3 => return Err(NvError::AlphaDotProduct),
        (true, _) if opcode == Opcode::Dp3 => &[Portion::Rgb],
        (true, true) => &[Portion::Rgb, Portion::Alpha],
        (true, false) => &[Portion::Rgb],
        (false, _) => &[Portion::Alpha],
    };

    let target = match dest.register {
        ir::Register {
            class: RegisterClass::Temp,
            index: 0,
        } => CombinerRegister::Spare0,

        ir::Register {
            class: RegisterClass::Temp,
            index: 1,
        } => CombinerRegister::Spare1,

        ir::Register {
            class: RegisterClass::Texture,
            index,
        } => CombinerRegister::Texture(index),

        register => return Err(NvError::IllegalOperand { opcode, register }),
    };

    let mut constants: ConstantPair = [None; 2];
    for source in &instruction.sources {
        let register = source.register;
        if register.class != RegisterClass::Constant || constants.contains(&Some(register.index)) {
            continue;
        }

        let slot = constants
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(NvError::TooManyConstants)?;

        *slot = Some(register.index);
    }

    let mut output = Output {
        scale,
        ..Default::default()
    };

    match opcode {
        Opcode::Mul => output.ab = target,
        Opcode::Dp3 => {
            output.ab = target;
            output.ab_dot_product = true;
        }

        Opcode::Cnd => {
            output.sum = target;
            output.mux_sum = true;
        }

        _ => output.sum = target,
    }

    portions
        .iter()
        .map(|&portion| {
            let filler = Filler {
                opcode,
                sources: &instruction.sources,
                portion,
                constants: &constants,
            };

            Ok(CombinerStage {
                portion,
                inputs: filler.inputs()?,
                output,
                constants,
            })
        })
        .collect()
}

/// Asignación de entradas A, B, C y D para una porción.
struct Filler<'a> {
    opcode: Opcode,
    sources: &'a [ir::Source],
    portion: Portion,
    constants: &'a ConstantPair,
}

impl Filler<'_> {
    fn inputs(&self) -> Result<[Input; 4], NvError> {
        let component = match self.portion {
            Portion::Rgb => Component::Rgb,
            Portion::Alpha => Component::Alpha,
        };

        let one = Input::one(component);
        let zero = Input::zero(component);

        let inputs = match self.opcode {
            Opcode::Add => [self.source(0)?, one, self.source(1)?, one],
            Opcode::Mul | Opcode::Dp3 => [self.source(0)?, self.source(1)?, zero, zero],
            Opcode::Mov => [self.source(0)?, one, zero, zero],
            Opcode::Mad => [self.source(0)?, self.source(1)?, self.source(2)?, one],

            Opcode::Sub => {
                let mut negated = *self.operand(1)?;
                negated.modifiers.toggle(SourceModifiers::NEGATE);

                [self.source(0)?, one, self.input(&negated)?, one]
            }

            Opcode::Lrp => {
                let interpolant = self.operand(0)?;
                if !(interpolant.modifiers - SourceModifiers::REPLICATE).is_empty() {
                    return Err(NvError::LerpModifier);
                }

                let base = self.input(interpolant)?;
                let a = Input {
                    mapping: Mapping::UnsignedIdentity,
                    ..base
                };

                let c = Input {
                    mapping: Mapping::UnsignedInvert,
                    ..base
                };

                [a, self.source(1)?, c, self.source(2)?]
            }

            // El mux selecciona CD si spare0.a > 0.5
            Opcode::Cnd => {
                let condition = self.operand(0)?.register;
                if condition != ir::Register::temp(0) {
                    return Err(NvError::CndCondition(condition));
                }

                [self.source(2)?, one, self.source(1)?, one]
            }

            opcode => return Err(NvError::Unsupported(opcode)),
        };

        Ok(inputs)
    }

    fn operand(&self, index: usize) -> Result<&ir::Source, NvError> {
        self.sources
            .get(index)
            .ok_or(NvError::MissingOperand(self.opcode))
    }

    fn source(&self, index: usize) -> Result<Input, NvError> {
        self.input(self.operand(index)?)
    }

    fn input(&self, source: &ir::Source) -> Result<Input, NvError> {
        let register = match source.register {
            ir::Register {
                class: RegisterClass::Temp,
                index: 0,
            } => CombinerRegister::Spare0,

            ir::Register {
                class: RegisterClass::Temp,
                index: 1,
            } => CombinerRegister::Spare1,

            ir::Register {
                class: RegisterClass::Color,
                index: 0,
            } => CombinerRegister::PrimaryColor,

            ir::Register {
                class: RegisterClass::Color,
                index: 1,
            } => CombinerRegister::SecondaryColor,

            ir::Register {
                class: RegisterClass::Texture,
                index,
            } => CombinerRegister::Texture(index),

            ir::Register {
                class: RegisterClass::Constant,
                index,
            } => match self.constants.iter().position(|&slot| slot == Some(index)) {
                Some(0) => CombinerRegister::ConstantColor0,
                Some(_) => CombinerRegister::ConstantColor1,
                None => return Err(NvError::TooManyConstants),
            },

            register => {
                return Err(NvError::IllegalOperand {
                    opcode: self.opcode,
                    register,
                })
            }
        };

        Ok(Input {
            register,
            mapping: mapping(source)?,
            component: self.component(source)?,
        })
    }

    fn component(&self, source: &ir::Source) -> Result<Component, NvError> {
        let modifiers = source.modifiers;

        match self.portion {
            Portion::Rgb if modifiers.contains(SourceModifiers::REP_BLUE) => {
                Err(NvError::BlueReplicate(source.register))
            }

            Portion::Rgb if modifiers.contains(SourceModifiers::REP_ALPHA) => Ok(Component::Alpha),
            Portion::Rgb => Ok(Component::Rgb),
            Portion::Alpha if modifiers.contains(SourceModifiers::REP_BLUE) => Ok(Component::Blue),
            Portion::Alpha => Ok(Component::Alpha),
        }
    }
}

fn mapping(source: &ir::Source) -> Result<Mapping, NvError> {
    let relevant = SourceModifiers::NEGATE | SourceModifiers::INVERT | SourceModifiers::SIGNED_SCALE;
    let modifiers = source.modifiers & relevant;

    let table = [
        (SourceModifiers::empty(), Mapping::SignedIdentity),
        (SourceModifiers::NEGATE, Mapping::SignedNegate),
        (SourceModifiers::BIAS, Mapping::HalfBiasNormal),
        (SourceModifiers::NEGATE | SourceModifiers::BIAS, Mapping::HalfBiasNegate),
        (SourceModifiers::SIGNED_SCALE, Mapping::ExpandNormal),
        (SourceModifiers::NEGATE | SourceModifiers::SIGNED_SCALE, Mapping::ExpandNegate),
        (SourceModifiers::INVERT, Mapping::UnsignedInvert),
    ];

    match table.iter().find(|&&(bits, _)| bits == modifiers) {
        Some(&(_, mapping)) => Ok(mapping),
        None if modifiers.contains(SourceModifiers::SCALE) && !modifiers.contains(SourceModifiers::BIAS) => {
            Err(NvError::ScaleWithoutBias(source.register))
        }

        None => Err(NvError::SourceModifier(source.register)),
    }
}

/// Agrupa porciones en combinadores generales.
///
/// Una porción de alfa comparte combinador con la porción RGB inmediatamente
/// anterior si ambas escriben a los mismos registros y sus constantes no
/// entran en conflicto.
fn merge(stages: Vec<CombinerStage>) -> Vec<Vec<CombinerStage>> {
    let mut units: Vec<Vec<CombinerStage>> = Vec::new();

    for stage in stages {
        let shared = match units.last() {
            Some(unit) => unit.len() == 1 && mergeable(&unit[0], &stage),
            None => false,
        };

        match units.last_mut() {
            Some(unit) if shared => unit.push(stage),
            _ => units.push(vec![stage]),
        }
    }

    units
}

fn mergeable(current: &CombinerStage, next: &CombinerStage) -> bool {
    let compatible = next
        .constants
        .iter()
        .zip(&current.constants)
        .all(|(next, current)| next.is_none() || next == current);

    current.portion == Portion::Rgb
        && next.portion == Portion::Alpha
        && current.output == next.output
        && compatible
}

fn emit_combiners(device: &mut dyn Device, units: &[Vec<CombinerStage>]) -> Result<(), NvError> {
    device.combiner_parameter(CombinerParameter::NumGeneralCombiners(units.len() as u32))?;

    for (unit, stages) in units.iter().enumerate() {
        for stage in stages {
            for (&variable, &input) in Variable::ALL.iter().zip(&stage.inputs) {
                device.combiner_input(unit as u32, stage.portion, variable, input)?;
            }

            device.combiner_output(unit as u32, stage.portion, &stage.output)?;
        }
    }

    let spare0 = |component| Input {
        register: CombinerRegister::Spare0,
        mapping: Mapping::UnsignedIdentity,
        component,
    };

    device.final_combiner_input(FinalVariable::A, Input::zero(Component::Rgb))?;
    device.final_combiner_input(FinalVariable::B, Input::zero(Component::Rgb))?;
    device.final_combiner_input(FinalVariable::C, Input::zero(Component::Rgb))?;
    device.final_combiner_input(FinalVariable::D, spare0(Component::Rgb))?;
    device.final_combiner_input(FinalVariable::G, spare0(Component::Alpha))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        arch::{nv::TextureTarget, Call, Recorder},
        ir::{Destination, Instruction, Source, WriteMask},
        parse::parse_str,
    };
    use pretty_assertions::assert_eq;

    fn compile_with(text: &str, limits: &Limits) -> (Result<Nv, NvError>, Recorder) {
        let program = parse_str("<test>", text).unwrap();
        let mut recorder = Recorder::new();
        let result = Nv::compile(&program, limits, &mut recorder);

        (result, recorder)
    }

    fn compile(text: &str) -> (Result<Nv, NvError>, Recorder) {
        compile_with(text, &Limits::default())
    }

    fn stages_of(text: &str) -> Vec<CombinerStage> {
        let program = parse_str("<test>", text).unwrap();
        program
            .instructions
            .iter()
            .filter(|instruction| instruction.opcode.is_arithmetic())
            .flat_map(|instruction| combiner_stages(instruction).unwrap())
            .collect()
    }

    fn no_variables(_: &str) -> Option<Vector4> {
        None
    }

    #[test]
    fn full_mask_merges_into_one_combiner() {
        let (result, recorder) = compile("ps.1.1\ntex t0\nmul r0, t0, c0");
        let nv = result.unwrap();

        assert_eq!(nv.constant_pairs(), &[[Some(0), None]]);

        let list = recorder.list(nv.combiner_list()).unwrap();
        assert_eq!(list[0], Call::CombinerParameter(CombinerParameter::NumGeneralCombiners(1)));

        let outputs: Vec<_> = list
            .iter()
            .filter_map(|call| match call {
                Call::CombinerOutput {
                    stage,
                    portion,
                    output,
                } => Some((*stage, *portion, output.ab)),
                _ => None,
            })
            .collect();

        assert_eq!(
            outputs,
            vec![
                (0, Portion::Rgb, CombinerRegister::Spare0),
                (0, Portion::Alpha, CombinerRegister::Spare0),
            ]
        );

        assert!(list.contains(&Call::CombinerInput {
            stage: 0,
            portion: Portion::Alpha,
            variable: Variable::B,
            input: Input {
                register: CombinerRegister::ConstantColor0,
                mapping: Mapping::SignedIdentity,
                component: Component::Alpha,
            },
        }));
    }

    #[test]
    fn final_combiner_reads_spare0() {
        let (result, recorder) = compile("ps.1.1\nmov r0, v0");
        let nv = result.unwrap();
        let list = recorder.list(nv.combiner_list()).unwrap();

        assert_eq!(
            list.last(),
            Some(&Call::FinalCombinerInput {
                variable: FinalVariable::G,
                input: Input {
                    register: CombinerRegister::Spare0,
                    mapping: Mapping::UnsignedIdentity,
                    component: Component::Alpha,
                },
            })
        );
    }

    #[test]
    fn rejected_programs() {
        let cases: &[(&str, fn(&NvError) -> bool)] = &[
            ("ps.1.4\nmov r0, v0", |e| matches!(e, NvError::Ps14Unsupported)),
            ("ps.1.2\ntex t0\ndp4 r0, t0, c0", |e| {
                matches!(e, NvError::Unsupported(Opcode::Dp4))
            }),
            ("ps.1.2\ncmp r0, v0, v1, c0", |e| {
                matches!(e, NvError::Unsupported(Opcode::Cmp))
            }),
            ("ps.1.1\nmov r0, v0\ntex t0", |e| {
                matches!(e, NvError::TextureAfterArithmetic(Opcode::Tex))
            }),
            ("ps.1.1\nmad r0, c0, c1, c2", |e| matches!(e, NvError::TooManyConstants)),
            ("ps.1.1\ncnd r0, r1.a, v0, v1", |e| matches!(e, NvError::CndCondition(_))),
            ("ps.1.1\ntex t0\ndp3 r0.a, t0, v0", |e| matches!(e, NvError::AlphaDotProduct)),
            (
                "ps.1.1\ntex t0\ntexm3x3pad t1, t0_bx2\ntexm3x3pad t2, t0_bx2\n\
                 texm3x3spec t3, t0_bx2, v1\nmov r0, t3",
                |e| {
                    matches!(
                        e,
                        NvError::IllegalOperand {
                            opcode: Opcode::Texm3x3spec,
                            register: ir::Register {
                                class: RegisterClass::Color,
                                index: 1,
                            },
                        }
                    )
                },
            ),
            ("ps.1.1\nlrp r0, 1-v0, v1, c0", |e| matches!(e, NvError::LerpModifier)),
            ("ps.1.1\nmov r0.rgb, v0.b", |e| matches!(e, NvError::BlueReplicate(_))),
            ("ps.1.1\ntex t0", |e| matches!(e, NvError::NoArithmetic)),
            ("ps.1.3\ntexdp3 t1, t0", |e| {
                matches!(e, NvError::Unsupported(Opcode::Texdp3))
            }),
        ];

        for (text, check) in cases {
            let (result, recorder) = compile(text);
            let error = result.unwrap_err();

            assert!(check(&error), "{}: unexpected {:?}", text, error);
            assert!(!recorder.calls().iter().any(|call| matches!(call, Call::GenLists { .. })));
        }
    }

    #[test]
    fn too_many_combiners() {
        let limits = Limits {
            max_general_combiners: 1,
            ..Limits::default()
        };

        let (result, _) = compile_with("ps.1.1\nmul r0.rgb, v0, v1\nadd r0.a, v0, v1", &limits);
        assert!(matches!(
            result,
            Err(NvError::TooManyCombiners {
                needed: 2,
                limit: 1
            })
        ));
    }

    #[test]
    fn coissued_portions_merge() {
        let stages = stages_of("ps.1.1\nadd r0.rgb, v0, c0\n+add r0.a, v1, c0");
        assert_eq!(merge(stages).len(), 1);

        let stages = stages_of("ps.1.1\nadd r0.rgb, v0, c0\n+add r0.a, v1, c1");
        assert_eq!(merge(stages).len(), 2);

        let stages = stages_of("ps.1.1\nadd r0.a, v0, c0\nadd r0.rgb, v1, c0");
        assert_eq!(merge(stages).len(), 2);
    }

    #[test]
    fn operand_fills() {
        let stages = stages_of("ps.1.1\nsub r0.rgb, v0_bx2, -v1_bias");
        let one = Input::one(Component::Rgb);

        assert_eq!(
            stages[0].inputs,
            [
                Input {
                    register: CombinerRegister::PrimaryColor,
                    mapping: Mapping::ExpandNormal,
                    component: Component::Rgb,
                },
                one,
                Input {
                    register: CombinerRegister::SecondaryColor,
                    mapping: Mapping::HalfBiasNormal,
                    component: Component::Rgb,
                },
                one,
            ]
        );

        let stages = stages_of("ps.1.1\nlrp r0.rgb, v0.a, c0, c1");
        assert_eq!(stages[0].inputs[0].mapping, Mapping::UnsignedIdentity);
        assert_eq!(stages[0].inputs[2].mapping, Mapping::UnsignedInvert);
        assert_eq!(stages[0].inputs[0].component, Component::Alpha);
        assert_eq!(stages[0].inputs[3].register, CombinerRegister::ConstantColor1);

        let stages = stages_of("ps.1.1\ncnd r0, r0.a, v0, v1");
        assert!(stages[0].output.mux_sum);
        assert_eq!(stages[0].inputs[0].register, CombinerRegister::SecondaryColor);
        assert_eq!(stages[0].inputs[2].register, CombinerRegister::PrimaryColor);

        let stages = stages_of("ps.1.1\ntex t0\ndp3_x4 r1, t0_bx2, v0_bx2");
        assert_eq!(stages.len(), 1);
        assert!(stages[0].output.ab_dot_product);
        assert_eq!(stages[0].output.ab, CombinerRegister::Spare1);
        assert_eq!(stages[0].output.scale, Scale::By4);
    }

    #[test]
    fn saturate_is_ignored() {
        let stages = stages_of("ps.1.1\nmul_x2_sat r0, v0, v1");
        assert_eq!(stages.len(), 2);
        assert!(stages.iter().all(|stage| stage.output.scale == Scale::By2));

        let stages = stages_of("ps.1.1\nmov_sat r0, v0");
        assert!(stages.iter().all(|stage| stage.output.scale == Scale::None));

        let instruction = Instruction {
            opcode: Opcode::Mul,
            modifiers: InstructionModifiers::X8 | InstructionModifiers::SAT,
            dest: Some(Destination {
                register: ir::Register::temp(0),
                mask: WriteMask::RGBA,
            }),
            sources: vec![
                Source::plain(ir::Register::color(0)),
                Source::plain(ir::Register::color(1)),
            ],
        };

        assert!(matches!(
            combiner_stages(&instruction),
            Err(NvError::InstructionModifier(Opcode::Mul))
        ));
    }

    #[test]
    fn scale_without_bias() {
        let instruction = Instruction {
            opcode: Opcode::Mov,
            modifiers: InstructionModifiers::empty(),
            dest: Some(Destination {
                register: ir::Register::temp(0),
                mask: WriteMask::RGBA,
            }),
            sources: vec![Source {
                register: ir::Register::color(0),
                modifiers: SourceModifiers::SCALE,
            }],
        };

        assert!(matches!(
            combiner_stages(&instruction),
            Err(NvError::ScaleWithoutBias(_))
        ));
    }

    #[test]
    fn texture_list_is_built_once() {
        let (result, mut recorder) = compile("ps.1.1\ntex t0\nmov r0, t0");
        let mut nv = result.unwrap();
        recorder.set_texture_target(0, TextureTarget::CubeMap);

        let table = ConstantTable::default();
        nv.setup_state(&mut recorder, &table, &no_variables).unwrap();
        nv.setup_state(&mut recorder, &table, &no_variables).unwrap();

        let texture_list = nv.texture_list();
        let compiled = recorder
            .calls()
            .iter()
            .filter(|call| **call == Call::NewList(texture_list))
            .count();

        let called = recorder
            .calls()
            .iter()
            .filter(|call| **call == Call::CallList(texture_list))
            .count();

        assert_eq!((compiled, called), (1, 2));

        let list = recorder.list(texture_list).unwrap();
        assert_eq!(
            &list[list.len() - 2..],
            &[
                Call::ActiveTexture(0),
                Call::TextureShaderOperation(TextureOperation::TextureCubeMap),
            ]
        );
    }

    #[test]
    fn unbound_units_disable_their_stage() {
        let (result, mut recorder) = compile("ps.1.1\ntex t0\ntex t1\nmul r0, t0, t1");
        let mut nv = result.unwrap();
        recorder.set_texture_target(1, TextureTarget::Texture3D);

        nv.setup_state(&mut recorder, &ConstantTable::default(), &no_variables)
            .unwrap();

        let list = recorder.list(nv.texture_list()).unwrap();
        assert_eq!(
            &list[list.len() - 4..],
            &[
                Call::ActiveTexture(0),
                Call::TextureShaderOperation(TextureOperation::None),
                Call::ActiveTexture(1),
                Call::TextureShaderOperation(TextureOperation::Texture3D),
            ]
        );
    }

    #[test]
    fn specular_uses_the_eye_constant() {
        let text = "ps.1.1\ndef c0, 0, 0, 1, 0\ntex t0\ntexm3x3pad t1, t0_bx2\n\
                    texm3x3pad t2, t0_bx2\ntexm3x3spec t3, t0_bx2, c0\nmov r0, t3";

        let (result, mut recorder) = compile(text);
        let mut nv = result.unwrap();

        assert_eq!(
            nv.texture_stages()[3],
            TextureStage {
                unit: 3,
                kind: TextureKind::DotProductConstEyeReflectCubeMap,
                previous: 0,
                signed_scale: true,
                parameter: 0,
            }
        );

        let program = parse_str("<test>", text).unwrap();
        let table = ConstantTable::from_program(&program);
        nv.setup_state(&mut recorder, &table, &no_variables).unwrap();

        let list = recorder.list(nv.texture_list()).unwrap();
        assert!(list.contains(&Call::ConstEye([0.0, 0.0, 1.0, 0.0])));
        assert!(list.contains(&Call::RgbaDotProductMapping(Mapping::ExpandNormal)));
    }

    #[test]
    fn stage_constants_follow_the_side_table() {
        let text = "ps.1.1\ndef c3, 1, 0, 0, 1\ndef c5, 0, 1, 0, 1\nmad r0, v0, c5, c3";
        let (result, mut recorder) = compile(text);
        let mut nv = result.unwrap();

        let program = parse_str("<test>", text).unwrap();
        let table = ConstantTable::from_program(&program);
        nv.setup_state(&mut recorder, &table, &no_variables).unwrap();

        let uploads: Vec<_> = recorder
            .calls()
            .iter()
            .filter_map(|call| match call {
                Call::CombinerStageConstant { stage, slot, value } => Some((*stage, *slot, *value)),
                _ => None,
            })
            .collect();

        assert_eq!(
            uploads,
            vec![(0, 0, [0.0, 1.0, 0.0, 1.0]), (0, 1, [1.0, 0.0, 0.0, 1.0])]
        );
    }

    #[test]
    fn activation_order() {
        let (result, mut recorder) = compile("ps.1.1\nmov r0, v0");
        let nv = result.unwrap();
        recorder.take_calls();

        nv.activate(&mut recorder).unwrap();
        nv.deactivate(&mut recorder);

        assert_eq!(
            recorder.calls(),
            &[
                Call::Enable(Capability::TextureShaderNv),
                Call::Enable(Capability::RegisterCombinersNv),
                Call::Enable(Capability::PerStageConstantsNv),
                Call::CallList(nv.combiner_list()),
                Call::Disable(Capability::PerStageConstantsNv),
                Call::Disable(Capability::RegisterCombinersNv),
                Call::Disable(Capability::TextureShaderNv),
            ]
        );
    }

    #[test]
    fn hardware_errors_release_the_lists() {
        let program = parse_str("<test>", "ps.1.1\nmov r0, v0").unwrap();
        let mut recorder = Recorder::new();
        recorder.fail_at(2);

        let result = Nv::compile(&program, &Limits::default(), &mut recorder);
        assert!(matches!(result, Err(NvError::Hardware(_))));
        assert_eq!(
            recorder.calls().last(),
            Some(&Call::DeleteLists { list: 1, range: 2 })
        );
    }
}
