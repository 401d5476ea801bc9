//! Back end para `ATI_fragment_shader`.
//!
//! El modelo de ATI es casi uno a uno con PS1.4: cada instrucción de
//! texturas corresponde a una rutina de muestreo o de paso de
//! coordenadas, y cada instrucción aritmética a una operación de color,
//! una de alfa, o ambas según la máscara de escritura. Los programas
//! PS1.1-PS1.3 pasan primero por [`crate::normalize`].

use thiserror::Error;

use super::{Limits, Pipeline};
use crate::{
    arch::{
        ati::{ArgMod, Args, Argument, Destination, DstMask, DstMod, Op, Register, Replicate, Swizzle},
        Capability, Device, HardwareError,
    },
    constants::{ConstantTable, VariableLookup},
    ir::{self, InstructionModifiers, Program, RegisterClass, SourceModifiers, WriteMask},
    normalize::{normalize, NormalizeError},
    opcode::Opcode,
};

#[derive(Error, Debug)]
pub enum AtiError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("Fragment shader configuration failed: {0}")]
    Hardware(#[from] HardwareError),

    #[error("`{0}` has no fragment shader equivalent")]
    Unsupported(Opcode),

    #[error("Texture register `{0}` cannot be read by arithmetic instructions")]
    TextureRead(ir::Register),

    #[error("`{register}` is not a valid operand for `{opcode}`")]
    IllegalOperand {
        opcode: Opcode,
        register: ir::Register,
    },

    #[error("`{0}` is missing operands")]
    MissingOperand(Opcode),
}

/// Un fragment shader compilado.
#[derive(Debug)]
pub struct Ati {
    shader: u32,
}

impl Ati {
    /// Nombre del objeto de fragment shader.
    pub fn shader(&self) -> u32 {
        self.shader
    }
}

impl Pipeline for Ati {
    type Error = AtiError;

    fn compile(
        program: &Program,
        _limits: &Limits,
        device: &mut dyn Device,
    ) -> Result<Self, AtiError> {
        let normalized;
        let program = if program.version.is_legacy() {
            normalized = normalize(program)?;
            &normalized
        } else {
            program
        };

        let shader = device.gen_fragment_shader()?;
        match emit(program, device, shader) {
            Ok(()) => {
                tracing::debug!(shader, "fragment shader compiled");
                Ok(Ati { shader })
            }

            Err(error) => {
                device.delete_fragment_shader(shader);
                Err(error)
            }
        }
    }

    fn activate(&self, device: &mut dyn Device) -> Result<(), AtiError> {
        device.enable(Capability::FragmentShaderAti);
        device.bind_fragment_shader(self.shader)?;

        Ok(())
    }

    fn deactivate(&self, device: &mut dyn Device) {
        device.disable(Capability::FragmentShaderAti);
    }

    fn setup_state(
        &mut self,
        device: &mut dyn Device,
        constants: &ConstantTable,
        lookup: &dyn VariableLookup,
    ) -> Result<(), AtiError> {
        for (register, value) in constants.resolved(lookup) {
            device.set_fragment_shader_constant(register, value)?;
        }

        Ok(())
    }

    fn release(self, device: &mut dyn Device) {
        device.delete_fragment_shader(self.shader);
    }
}

fn emit(program: &Program, device: &mut dyn Device, shader: u32) -> Result<(), AtiError> {
    device.bind_fragment_shader(shader)?;
    device.begin_fragment_shader()?;

    for instruction in &program.instructions {
        lower(instruction, device)?;
    }

    device.end_fragment_shader()?;
    Ok(())
}

fn lower(instruction: &ir::Instruction, device: &mut dyn Device) -> Result<(), AtiError> {
    let opcode = instruction.opcode;

    let op = match opcode {
        Opcode::Nop | Opcode::Phase => return Ok(()),

        Opcode::Texld | Opcode::Texcrd => {
            let (dst, source) = match (instruction.dest, instruction.sources.first()) {
                (Some(dest), Some(source)) => (dest.register, source),
                _ => return Err(AtiError::MissingOperand(opcode)),
            };

            let dst = match dst.class {
                RegisterClass::Temp => Register::Reg(dst.index),
                _ => return Err(illegal(opcode, dst)),
            };

            let interpolator = match source.register {
                ir::Register {
                    class: RegisterClass::Texture,
                    index,
                } => Register::Texture(index),

                ir::Register {
                    class: RegisterClass::Temp,
                    index,
                } => Register::Reg(index),

                register => return Err(illegal(opcode, register)),
            };

            let swizzle = swizzle(source.modifiers);
            if opcode == Opcode::Texld {
                device.sample_map(dst, interpolator, swizzle)?;
            } else {
                device.pass_tex_coord(dst, interpolator, swizzle)?;
            }

            return Ok(());
        }

        Opcode::Add => Op::Add,
        Opcode::Sub => Op::Sub,
        Opcode::Mul => Op::Mul,
        Opcode::Mad => Op::Mad,
        Opcode::Lrp => Op::Lerp,
        Opcode::Mov => Op::Mov,
        Opcode::Dp3 => Op::Dot3,
        Opcode::Dp4 => Op::Dot4,
        Opcode::Cnd => Op::Cnd,
        Opcode::Cmp => Op::Cnd0,

        _ => return Err(AtiError::Unsupported(opcode)),
    };

    let dest = instruction.dest.ok_or(AtiError::MissingOperand(opcode))?;
    let register = match dest.register.class {
        RegisterClass::Temp => Register::Reg(dest.register.index),
        _ => return Err(illegal(opcode, dest.register)),
    };

    let mut args = instruction
        .sources
        .iter()
        .map(|source| argument(opcode, source))
        .collect::<Result<Vec<_>, _>>()?;

    // La condición es el último argumento en ATI
    if matches!(opcode, Opcode::Cnd | Opcode::Cmp) {
        args.rotate_left(1);
    }

    let args = Args::from_slice(&args).ok_or(AtiError::MissingOperand(opcode))?;
    let dst = Destination {
        register,
        mask: color_mask(dest.mask),
        modifiers: destination_modifiers(instruction.modifiers),
    };

    if dest.mask.writes_rgb() {
        device.color_fragment_op(op, dst, args)?;
    }

    if dest.mask.writes_alpha() {
        let dst = Destination {
            mask: DstMask::empty(),
            ..dst
        };

        device.alpha_fragment_op(op, dst, args)?;
    }

    Ok(())
}

fn illegal(opcode: Opcode, register: ir::Register) -> AtiError {
    AtiError::IllegalOperand { opcode, register }
}

fn argument(opcode: Opcode, source: &ir::Source) -> Result<Argument, AtiError> {
    let ir::Register { class, index } = source.register;

    let register = match (class, index) {
        (RegisterClass::Temp, _) => Register::Reg(index),
        (RegisterClass::Constant, _) => Register::Con(index),
        (RegisterClass::Color, 0) => Register::PrimaryColor,
        (RegisterClass::Color, 1) => Register::SecondaryInterpolator,
        (RegisterClass::Texture, _) => return Err(AtiError::TextureRead(source.register)),
        _ => return Err(illegal(opcode, source.register)),
    };

    let modifiers = source.modifiers;
    let replicate = if modifiers.contains(SourceModifiers::REP_RED) {
        Replicate::Red
    } else if modifiers.contains(SourceModifiers::REP_GREEN) {
        Replicate::Green
    } else if modifiers.contains(SourceModifiers::REP_BLUE) {
        Replicate::Blue
    } else if modifiers.contains(SourceModifiers::REP_ALPHA) {
        Replicate::Alpha
    } else {
        Replicate::None
    };

    let mut bits = ArgMod::empty();
    for &(modifier, bit) in &[
        (SourceModifiers::NEGATE, ArgMod::NEGATE),
        (SourceModifiers::INVERT, ArgMod::COMP),
        (SourceModifiers::BIAS, ArgMod::BIAS),
        (SourceModifiers::SCALE, ArgMod::X2),
    ] {
        if modifiers.contains(modifier) {
            bits |= bit;
        }
    }

    Ok(Argument {
        register,
        replicate,
        modifiers: bits,
    })
}

fn swizzle(modifiers: SourceModifiers) -> Swizzle {
    if modifiers.contains(SourceModifiers::XYW) {
        Swizzle::Stq
    } else if modifiers.contains(SourceModifiers::DZ) {
        Swizzle::StrDr
    } else if modifiers.contains(SourceModifiers::DW) {
        Swizzle::StqDq
    } else {
        Swizzle::Str
    }
}

fn color_mask(mask: WriteMask) -> DstMask {
    let mut bits = DstMask::empty();
    for &(channel, bit) in &[
        (WriteMask::RED, DstMask::RED),
        (WriteMask::GREEN, DstMask::GREEN),
        (WriteMask::BLUE, DstMask::BLUE),
    ] {
        if mask.contains(channel) {
            bits |= bit;
        }
    }

    bits
}

fn destination_modifiers(modifiers: InstructionModifiers) -> DstMod {
    let mut bits = DstMod::empty();
    for &(modifier, bit) in &[
        (InstructionModifiers::X2, DstMod::X2),
        (InstructionModifiers::X4, DstMod::X4),
        (InstructionModifiers::X8, DstMod::X8),
        (InstructionModifiers::D2, DstMod::HALF),
        (InstructionModifiers::D4, DstMod::QUARTER),
        (InstructionModifiers::D8, DstMod::EIGHTH),
        (InstructionModifiers::SAT, DstMod::SATURATE),
    ] {
        if modifiers.contains(modifier) {
            bits |= bit;
        }
    }

    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        arch::{Call, Recorder},
        parse::parse_str,
    };
    use pretty_assertions::assert_eq;

    fn compile(text: &str) -> (Result<Ati, AtiError>, Recorder) {
        let program = parse_str("<test>", text).unwrap();
        let mut recorder = Recorder::new();
        let result = Ati::compile(&program, &Limits::default(), &mut recorder);

        (result, recorder)
    }

    fn plain(register: Register) -> Argument {
        Argument {
            register,
            replicate: Replicate::None,
            modifiers: ArgMod::empty(),
        }
    }

    #[test]
    fn sample_then_add() {
        let (result, recorder) = compile("ps.1.4\ntexld r0, t0\nadd r0.rgb, r0, v0");
        let shader = result.unwrap().shader();

        assert_eq!(
            recorder.calls(),
            &[
                Call::GenFragmentShader(shader),
                Call::BindFragmentShader(shader),
                Call::BeginFragmentShader,
                Call::SampleMap {
                    dst: Register::Reg(0),
                    interp: Register::Texture(0),
                    swizzle: Swizzle::Str,
                },
                Call::ColorFragmentOp {
                    op: Op::Add,
                    dst: Destination {
                        register: Register::Reg(0),
                        mask: DstMask::all(),
                        modifiers: DstMod::empty(),
                    },
                    args: Args::Two(plain(Register::Reg(0)), plain(Register::PrimaryColor)),
                },
                Call::EndFragmentShader,
            ]
        );
    }

    #[test]
    fn full_mask_emits_both_ops() {
        let (result, recorder) = compile("ps.1.4\nmul_x2_sat r1, c0, v1_bx2.a");
        result.unwrap();

        let ops: Vec<_> = recorder
            .calls()
            .iter()
            .filter_map(|call| match call {
                Call::ColorFragmentOp { dst, args, .. } => Some(("color", *dst, *args)),
                Call::AlphaFragmentOp { dst, args, .. } => Some(("alpha", *dst, *args)),
                _ => None,
            })
            .collect();

        let modifiers = DstMod::X2 | DstMod::SATURATE;
        let args = Args::Two(
            plain(Register::Con(0)),
            Argument {
                register: Register::SecondaryInterpolator,
                replicate: Replicate::Alpha,
                modifiers: ArgMod::BIAS | ArgMod::X2,
            },
        );

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].0, "color");
        assert_eq!(ops[0].1.modifiers, modifiers);
        assert_eq!(ops[1].0, "alpha");
        assert_eq!(ops[1].2, args);
    }

    #[test]
    fn conditional_moves_condition_last() {
        let (result, recorder) = compile("ps.1.4\ncnd r0.a, r1, c0, c1");
        result.unwrap();

        let args = recorder.calls().iter().find_map(|call| match call {
            Call::AlphaFragmentOp { op: Op::Cnd, args, .. } => Some(*args),
            _ => None,
        });

        assert_eq!(
            args,
            Some(Args::Three(
                plain(Register::Con(0)),
                plain(Register::Con(1)),
                plain(Register::Reg(1))
            ))
        );
    }

    #[test]
    fn legacy_programs_are_normalized() {
        let (result, recorder) = compile("ps.1.1\ntex t0\nmov r0, t0");
        result.unwrap();

        assert!(recorder.calls().contains(&Call::SampleMap {
            dst: Register::Reg(2),
            interp: Register::Texture(0),
            swizzle: Swizzle::Str,
        }));

        let (result, recorder) =
            compile("ps.1.1\ntex t0\ntexm3x2pad t1, t0\ntexm3x2tex t2, t0\nmov r0, t2");
        assert!(matches!(
            result,
            Err(AtiError::Normalize(NormalizeError::NoPs14Form(Opcode::Texm3x2pad)))
        ));
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn texture_reads_in_arithmetic_fail() {
        let (result, recorder) = compile("ps.1.4\nmov r0, t0");
        assert!(matches!(result, Err(AtiError::TextureRead(_))));
        assert_eq!(recorder.calls().last(), Some(&Call::DeleteFragmentShader(1)));
    }

    #[test]
    fn unsupported_instructions() {
        let (result, _) = compile("ps.1.4\ntexkill r0");
        assert!(matches!(result, Err(AtiError::Unsupported(Opcode::Texkill))));

        let (result, _) = compile("ps.1.4\nbem r0.rg, r1, r2");
        assert!(matches!(result, Err(AtiError::Unsupported(Opcode::Bem))));
    }

    #[test]
    fn hardware_errors_release_the_shader() {
        let program = parse_str("<test>", "ps.1.4\nmov r0, v0").unwrap();
        let mut recorder = Recorder::new();
        recorder.fail_at(3);

        let result = Ati::compile(&program, &Limits::default(), &mut recorder);
        assert!(matches!(result, Err(AtiError::Hardware(HardwareError::InvalidOperation))));
        assert_eq!(recorder.calls().last(), Some(&Call::DeleteFragmentShader(1)));
    }

    #[test]
    fn constants_are_uploaded() {
        let program = parse_str("<test>", "ps.1.4\ndef c3, 1, 0.5, 0, 1\nmov r0, c3").unwrap();
        let mut recorder = Recorder::new();
        let mut ati = Ati::compile(&program, &Limits::default(), &mut recorder).unwrap();

        let table = ConstantTable::from_program(&program);
        let lookup = |_: &str| -> Option<ir::Vector4> { None };
        ati.setup_state(&mut recorder, &table, &lookup).unwrap();

        assert_eq!(
            recorder.calls().last(),
            Some(&Call::SetFragmentShaderConstant {
                register: 3,
                value: [1.0, 0.5, 0.0, 1.0],
            })
        );
    }
}
