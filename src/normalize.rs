//! Normalización de PS1.1-PS1.3 hacia el modelo de registros de PS1.4.
//!
//! PS1.4 no tiene registros `t#` escribibles: los resultados de
//! direccionamiento de texturas viven en registros temporales. Este pase
//! reasigna cada registro original a un registro físico de PS1.4 por
//! medio de un recorrido lineal sobre los rangos de vida.
//!
//! Los temporales originales utilizan `r0` y `r1`. Los resultados de
//! instrucciones de texturas utilizan `r2` a `r5`. El `r0` original es
//! la salida del pixel: ocupa `r0` desde su primera definición hasta el
//! final, y antes de eso `r0` queda libre para temporales que mueren a
//! tiempo.
//!
//! `tex` y `texcoord` pasan a `texld` y `texcrd`. Las demás instrucciones
//! de texturas exclusivas de PS1.1-PS1.3 no tienen forma en PS1.4 y se
//! rechazan.

use thiserror::Error;

use crate::{
    ir::{Destination, Instruction, Program, Register, RegisterClass, Source, Version},
    opcode::Opcode,
};

#[derive(Error, Debug, PartialEq)]
pub enum NormalizeError {
    #[error("Program already targets ps.1.4")]
    AlreadyPs14,

    #[error("Ran out of {class} registers while allocating `{register}` at instruction {instruction}")]
    Exhausted {
        register: Register,
        class: RegisterClass,
        instruction: usize,
    },

    #[error("Opcode `{0}` has no ps.1.4 form")]
    NoPs14Form(Opcode),
}

const TEMP_POOL: [Register; 2] = [Register::temp(0), Register::temp(1)];
const TEXTURE_POOL: [Register; 4] = [
    Register::temp(2),
    Register::temp(3),
    Register::temp(4),
    Register::temp(5),
];

const OUTPUT: Register = Register::temp(0);

/// Rango de vida de un registro original.
#[derive(Copy, Clone, Debug)]
struct Usage {
    register: Register,
    first_use: usize,
    last_use: usize,
}

struct Slot {
    register: Register,
    occupant: Option<Usage>,
}

struct Allocations {
    usages: Vec<Usage>,
    temps: Vec<Slot>,
    textures: Vec<Slot>,
    mapping: Vec<(Register, Register)>,
    output_from: Option<usize>,
}

/// Reescribe un programa PS1.1-PS1.3 con registros de PS1.4.
///
/// No hay salida parcial: ante agotamiento de registros se falla.
pub fn normalize(program: &Program) -> Result<Program, NormalizeError> {
    if !program.version.is_legacy() {
        return Err(NormalizeError::AlreadyPs14);
    }

    let mut regs = Allocations::new(collect_usages(&program.instructions));

    let mut instructions = Vec::with_capacity(program.instructions.len());
    for (index, instruction) in program.instructions.iter().enumerate() {
        instructions.push(regs.rewrite(index, instruction)?);
    }

    tracing::debug!(
        from = %program.version,
        registers = regs.mapping.len(),
        "program normalized"
    );

    Ok(Program {
        version: Version::Ps14,
        instructions,
        constants: program.constants.clone(),
    })
}

fn ps14_opcode(opcode: Opcode) -> Result<Opcode, NormalizeError> {
    let opcode = match opcode {
        Opcode::Tex => Opcode::Texld,
        Opcode::Texcoord => Opcode::Texcrd,
        opcode => opcode,
    };

    if opcode.supports(Version::Ps14) {
        Ok(opcode)
    } else {
        Err(NormalizeError::NoPs14Form(opcode))
    }
}

/// Registros cuyo contenido se reasigna.
fn is_allocated(register: Register) -> bool {
    matches!(register.class, RegisterClass::Temp | RegisterClass::Texture)
}

/// `texkill` solo lee su operando, no lo define.
fn defines(instruction: &Instruction) -> Option<Register> {
    match instruction.opcode {
        Opcode::Texkill => None,
        _ => instruction.writes().filter(|&register| is_allocated(register)),
    }
}

fn collect_usages(instructions: &[Instruction]) -> Vec<Usage> {
    let mut usages: Vec<Usage> = Vec::new();

    for (index, instruction) in instructions.iter().enumerate() {
        for register in instruction.reads() {
            match usages.iter_mut().find(|usage| usage.register == register) {
                Some(usage) => usage.last_use = index,

                // Un temporal leído sin definir se asigna en esa lectura
                None if register.class == RegisterClass::Temp => usages.push(Usage {
                    register,
                    first_use: index,
                    last_use: index,
                }),

                None => (),
            }
        }

        if let Some(register) = defines(instruction) {
            match usages.iter_mut().find(|usage| usage.register == register) {
                Some(usage) => usage.last_use = usage.last_use.max(index),
                None => usages.push(Usage {
                    register,
                    first_use: index,
                    last_use: index,
                }),
            }
        }
    }

    if let Some(output) = usages.iter_mut().find(|usage| usage.register == OUTPUT) {
        output.last_use = instructions.len();
    }

    usages
}

impl Allocations {
    fn new(usages: Vec<Usage>) -> Self {
        let slots = |pool: &[Register]| {
            pool.iter()
                .map(|&register| Slot {
                    register,
                    occupant: None,
                })
                .collect::<Vec<_>>()
        };

        let output_from = usages
            .iter()
            .find(|usage| usage.register == OUTPUT)
            .map(|usage| usage.first_use);

        Allocations {
            temps: slots(&TEMP_POOL),
            textures: slots(&TEXTURE_POOL),
            mapping: Vec::new(),
            output_from,
            usages,
        }
    }

    fn find(&self, register: Register) -> Option<Register> {
        self.mapping
            .iter()
            .find(|(original, _)| *original == register)
            .map(|&(_, physical)| physical)
    }

    fn rewrite(
        &mut self,
        index: usize,
        instruction: &Instruction,
    ) -> Result<Instruction, NormalizeError> {
        let mut sources = Vec::with_capacity(instruction.sources.len() + 1);
        for source in &instruction.sources {
            let register = match source.register {
                register if register.class == RegisterClass::Temp => self.take(register, index)?,

                // Una coordenada nunca definida sigue siendo una coordenada
                register => self.find(register).unwrap_or(register),
            };

            sources.push(Source { register, ..*source });
        }

        let dest = match (instruction.dest, defines(instruction)) {
            (Some(dest), Some(register)) => {
                let physical = self.take(register, index)?;

                if instruction.opcode.is_texture()
                    && register.class == RegisterClass::Texture
                    && instruction.sources.is_empty()
                {
                    sources.push(Source::plain(register));
                }

                Some(Destination {
                    register: physical,
                    ..dest
                })
            }

            (dest, _) => dest,
        };

        Ok(Instruction {
            opcode: ps14_opcode(instruction.opcode)?,
            modifiers: instruction.modifiers,
            dest,
            sources,
        })
    }

    /// Obtiene el registro físico de un registro original, asignándolo si es necesario.
    fn take(&mut self, register: Register, index: usize) -> Result<Register, NormalizeError> {
        if let Some(physical) = self.find(register) {
            return Ok(physical);
        }

        let usage = self
            .usages
            .iter()
            .find(|usage| usage.register == register)
            .copied()
            .unwrap_or(Usage {
                register,
                first_use: index,
                last_use: index,
            });

        // Solo la salida entra a r0 una vez que esta fue definida
        let output_from = self.output_from;
        let fits = |slot: &Slot| match (register == OUTPUT, slot.register == OUTPUT) {
            (true, pinned) => pinned,
            (false, true) => output_from.map_or(true, |from| usage.last_use < from),
            (false, false) => true,
        };

        let pool = match register.class {
            RegisterClass::Texture => &mut self.textures,
            _ => &mut self.temps,
        };

        let slot = pool
            .iter_mut()
            .filter(|slot| fits(slot))
            .find(|slot| match &slot.occupant {
                None => true,
                Some(occupant) => occupant.last_use < index,
            })
            .ok_or(NormalizeError::Exhausted {
                register,
                class: register.class,
                instruction: index,
            })?;

        slot.occupant = Some(usage);
        let physical = slot.register;

        tracing::debug!(original = %register, %physical, instruction = index, "register assigned");

        self.mapping.retain(|&(_, assigned)| assigned != physical);
        self.mapping.push((register, physical));

        Ok(physical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{InstructionModifiers, WriteMask},
        parse::parse_str,
    };
    use pretty_assertions::assert_eq;

    fn instruction(opcode: Opcode, dest: Register, sources: &[Register]) -> Instruction {
        Instruction {
            opcode,
            modifiers: InstructionModifiers::empty(),
            dest: Some(Destination {
                register: dest,
                mask: WriteMask::RGBA,
            }),
            sources: sources.iter().copied().map(Source::plain).collect(),
        }
    }

    fn legacy(instructions: Vec<Instruction>) -> Program {
        Program {
            version: Version::Ps11,
            instructions,
            constants: Vec::new(),
        }
    }

    #[test]
    fn texture_results_move_to_temps() {
        let program = parse_str(
            "<test>",
            "ps.1.1\ndef c0, 0.5, 0.5, 0.5, 1\ntex t0\ntex t1\nmul_x2 r0.rgb, t0, t1_bx2\n+mov r0.a, c0",
        )
        .unwrap();

        let normalized = normalize(&program).unwrap();
        assert_eq!(normalized.version, Version::Ps14);
        assert_eq!(normalized.constants, program.constants);
        assert_eq!(
            normalized.to_string(),
            "ps.1.4\ndef c0, 0.5, 0.5, 0.5, 1\ntexld r2, t0\ntexld r3, t1\nmul_x2 r0.rgb, r2, r3_bx2\nmov r0.a, c0\n"
        );

        let reparsed = parse_str("<test>", &normalized.to_string()).unwrap();
        assert_eq!(reparsed, normalized);
    }

    #[test]
    fn texcoord_becomes_texcrd() {
        let program = parse_str("<test>", "ps.1.1\ntexcoord t1\nmov r0, t1").unwrap();
        let normalized = normalize(&program).unwrap();

        assert_eq!(normalized.to_string(), "ps.1.4\ntexcrd r2, t1\nmov r0, r2\n");
        assert!(parse_str("<test>", &normalized.to_string()).is_ok());
    }

    #[test]
    fn legacy_only_texture_ops_are_rejected() {
        let program = parse_str(
            "<test>",
            "ps.1.1\ntex t0\ntexm3x2pad t1, t0_bx2\ntexm3x2tex t2, t0_bx2\nmov r0, t2",
        )
        .unwrap();
        assert_eq!(
            normalize(&program),
            Err(NormalizeError::NoPs14Form(Opcode::Texm3x2pad))
        );

        let program = parse_str("<test>", "ps.1.2\ntex t0\ntexreg2ar t1, t0\nmov r0, t1").unwrap();
        assert_eq!(
            normalize(&program),
            Err(NormalizeError::NoPs14Form(Opcode::Texreg2ar))
        );
    }

    #[test]
    fn only_registers_change() {
        let program = parse_str(
            "<test>",
            "ps.1.3\ntex t0\ntexcoord t1\nmad_sat r1, t0, c1, v0\nlrp r0, r1.a, t1, 1-v1",
        )
        .unwrap();

        let normalized = normalize(&program).unwrap();
        for (old, new) in program.instructions.iter().zip(&normalized.instructions) {
            assert_eq!(ps14_opcode(old.opcode), Ok(new.opcode));
            assert_eq!(old.modifiers, new.modifiers);

            let old_modifiers: Vec<_> = old.sources.iter().map(|source| source.modifiers).collect();
            let new_modifiers: Vec<_> = new.sources.iter().map(|source| source.modifiers).collect();
            assert!(new_modifiers.starts_with(&old_modifiers));
        }
    }

    #[test]
    fn overlapping_temps_are_exhausted() {
        let program = legacy(vec![
            instruction(Opcode::Mov, Register::temp(1), &[Register::constant(0)]),
            instruction(Opcode::Mov, Register::temp(2), &[Register::constant(1)]),
            instruction(Opcode::Add, Register::temp(0), &[Register::temp(1), Register::temp(2)]),
        ]);

        assert_eq!(
            normalize(&program),
            Err(NormalizeError::Exhausted {
                register: Register::temp(2),
                class: RegisterClass::Temp,
                instruction: 1,
            })
        );
    }

    #[test]
    fn disjoint_temps_share_a_slot() {
        let program = legacy(vec![
            instruction(Opcode::Mov, Register::temp(1), &[Register::constant(0)]),
            instruction(Opcode::Mov, Register::temp(0), &[Register::temp(1)]),
            instruction(Opcode::Mov, Register::temp(2), &[Register::constant(1)]),
            instruction(Opcode::Add, Register::temp(0), &[Register::temp(0), Register::temp(2)]),
        ]);

        let normalized = normalize(&program).unwrap();
        assert_eq!(
            normalized.to_string(),
            "ps.1.4\nmov r1, c0\nmov r0, r1\nmov r1, c1\nadd r0, r0, r1\n"
        );
    }

    #[test]
    fn temps_use_r0_before_the_output_is_written() {
        let program = legacy(vec![
            instruction(Opcode::Mov, Register::temp(1), &[Register::constant(0)]),
            instruction(Opcode::Mov, Register::temp(2), &[Register::constant(1)]),
            instruction(Opcode::Add, Register::temp(1), &[Register::temp(1), Register::temp(2)]),
            instruction(Opcode::Mov, Register::temp(0), &[Register::temp(1)]),
        ]);

        let normalized = normalize(&program).unwrap();
        assert_eq!(
            normalized.to_string(),
            "ps.1.4\nmov r1, c0\nmov r0, c1\nadd r1, r1, r0\nmov r0, r1\n"
        );
    }

    #[test]
    fn temps_crossing_the_output_definition_stay_off_r0() {
        let program = legacy(vec![
            instruction(Opcode::Mov, Register::temp(1), &[Register::constant(0)]),
            instruction(Opcode::Mov, Register::temp(2), &[Register::constant(1)]),
            instruction(Opcode::Mov, Register::temp(0), &[Register::temp(1)]),
            instruction(Opcode::Add, Register::temp(0), &[Register::temp(0), Register::temp(2)]),
        ]);

        assert_eq!(
            normalize(&program),
            Err(NormalizeError::Exhausted {
                register: Register::temp(2),
                class: RegisterClass::Temp,
                instruction: 1,
            })
        );
    }

    #[test]
    fn output_keeps_r0() {
        let program = legacy(vec![
            instruction(Opcode::Mov, Register::temp(1), &[Register::color(0)]),
            instruction(Opcode::Mul, Register::temp(0), &[Register::temp(1), Register::color(1)]),
        ]);

        let normalized = normalize(&program).unwrap();
        assert_eq!(normalized.instructions[0].writes(), Some(Register::temp(1)));
        assert_eq!(normalized.instructions[1].writes(), Some(Register::temp(0)));
    }

    #[test]
    fn coordinates_stay_untouched() {
        let program = parse_str("<test>", "ps.1.1\ntexkill t0\nmov r0, t3").unwrap();
        let normalized = normalize(&program).unwrap();

        assert_eq!(normalized.to_string(), "ps.1.4\ntexkill t0\nmov r0, t3\n");
    }

    #[test]
    fn rejects_ps14() {
        let program = parse_str("<test>", "ps.1.4\nmov r0, v0").unwrap();
        assert_eq!(normalize(&program), Err(NormalizeError::AlreadyPs14));
    }
}
