//! Análisis sintáctico.
//!
//! # Estructura de un programa
//! El dialecto es orientado a líneas. La primera línea que no esté vacía
//! ni sea un comentario debe ser una directiva de versión (`ps.1.1`,
//! `ps_1_4`, etc.), la cual fija los límites de registros y la gramática
//! de modificadores para el resto del programa. Cada línea siguiente
//! contiene a lo sumo una instrucción.
//!
//! # Comentarios
//! Tanto `//` como `;` inician un comentario que termina al final de la
//! línea.
//!
//! # Constantes
//! `def` no produce una instrucción. Sus cuatro literales se acumulan en
//! la tabla de constantes del programa.
//!
//! # Errores
//! A diferencia del lexer de otros lenguajes, aquí no hay recuperación:
//! el primer error aborta el análisis y se reporta con su ubicación.

use std::rc::Rc;
use thiserror::Error;

use crate::{
    ir::{
        Constant, Destination, Instruction, InstructionModifiers, Program, Register,
        RegisterClass, Source, SourceModifiers, Version, WriteMask,
    },
    opcode::Opcode,
    source::{self, Located, Location},
};

#[non_exhaustive]
#[derive(Error, Debug, PartialEq)]
pub enum ParserError {
    #[error("Expected a version directive such as `ps.1.1` before any instruction")]
    MissingVersion,

    #[error("Unsupported version directive `{0}`, valid versions are 1.1 to 1.4")]
    InvalidVersion(String),

    #[error("Unknown opcode `{0}`")]
    UnknownOpcode(String),

    #[error("Opcode `{opcode}` is not supported by {version}")]
    UnsupportedOpcode { opcode: Opcode, version: Version },

    #[error("Unknown modifier `{0}`")]
    UnknownModifier(String),

    #[error("Modifier `{modifier}` is not supported by {version}")]
    UnsupportedModifier { modifier: String, version: Version },

    #[error("Only one scale modifier may be applied to an instruction")]
    ConflictingModifiers,

    #[error("`{opcode}` takes {expected} operands, found {found}")]
    ArgumentCount {
        opcode: Opcode,
        expected: usize,
        found: usize,
    },

    #[error("Malformed operand `{0}`")]
    MalformedOperand(String),

    #[error("Register `{register}` is out of range for {version}, limit is {limit}")]
    RegisterRange {
        register: String,
        limit: u8,
        version: Version,
    },

    #[error("Invalid write mask `{0}`")]
    BadWriteMask(String),

    #[error("`{opcode}` cannot write to `{register}`")]
    IllegalDestination { opcode: Opcode, register: Register },

    #[error("`def` requires a constant register, found `{0}`")]
    ExpectedConstant(Register),

    #[error("Malformed constant literal `{0}`")]
    MalformedConstant(String),
}

pub type Parse<T> = Result<T, Located<ParserError>>;

/// Analiza un programa completo.
pub fn parse(source: &Rc<source::Source>) -> Parse<Program> {
    let mut lines = source.lines().filter_map(|(number, line)| {
        let code = strip_comment(line).trim();
        if code.is_empty() {
            None
        } else {
            Some((number, line, code))
        }
    });

    let (number, line, code) = match lines.next() {
        Some(first) => first,
        None => {
            return Err(Located::at(
                ParserError::MissingVersion,
                Location::new(source, 1, 1..2),
            ))
        }
    };

    let mut parser = Parser {
        source,
        number,
        line,
        version: Version::Ps11,
    };

    parser.version = parser.version_directive(code)?;
    tracing::debug!(version = %parser.version, "version directive found");

    let mut instructions = Vec::new();
    let mut constants: Vec<Constant> = Vec::new();

    for (number, line, code) in lines {
        parser.number = number;
        parser.line = line;

        match parser.statement(code)? {
            Statement::Instruction(instruction) => instructions.push(instruction),

            // Una redefinición reemplaza a la anterior
            Statement::Constant(constant) => {
                match constants
                    .iter_mut()
                    .find(|old| old.register == constant.register)
                {
                    Some(old) => *old = constant,
                    None => constants.push(constant),
                }
            }
        }
    }

    tracing::debug!(
        instructions = instructions.len(),
        constants = constants.len(),
        "program parsed"
    );

    Ok(Program {
        version: parser.version,
        instructions,
        constants,
    })
}

/// Atajo para analizar texto sin una fuente construida de antemano.
pub fn parse_str(name: &str, text: &str) -> Parse<Program> {
    parse(&source::Source::new(name, text))
}

enum Statement {
    Instruction(Instruction),
    Constant(Constant),
}

struct Parser<'a> {
    source: &'a Rc<source::Source>,
    number: u32,
    line: &'a str,
    version: Version,
}

impl<'a> Parser<'a> {
    fn version_directive(&self, code: &'a str) -> Parse<Version> {
        let lower = code.to_ascii_lowercase();
        let rest = match lower.strip_prefix("ps") {
            Some(rest) if rest.starts_with(|c: char| c == '.' || c == '_' || c.is_ascii_digit()) => {
                rest
            }

            _ => return self.fail(ParserError::MissingVersion, code),
        };

        let rest = rest.strip_prefix(|c: char| c == '.' || c == '_').unwrap_or(rest);
        let minor = rest
            .strip_prefix('1')
            .and_then(|rest| rest.strip_prefix(|c: char| c == '.' || c == '_'))
            .filter(|minor| minor.len() == 1)
            .and_then(|minor| minor.parse().ok())
            .and_then(Version::from_minor);

        match minor {
            Some(version) => Ok(version),
            None => self.fail(ParserError::InvalidVersion(code.to_string()), code),
        }
    }

    fn statement(&self, code: &'a str) -> Parse<Statement> {
        // El indicador de co-emisión no tiene efecto
        let code = code.strip_prefix('+').map(str::trim_start).unwrap_or(code);

        let (mnemonic, operands) = match code.find(char::is_whitespace) {
            Some(split) => (&code[..split], code[split..].trim()),
            None => (code, ""),
        };

        let mut parts = mnemonic.split('_');
        let base = parts.next().unwrap_or("");

        let opcode: Opcode = match base.parse() {
            Ok(opcode) => opcode,
            Err(()) => return self.fail(ParserError::UnknownOpcode(base.to_string()), base),
        };

        if !opcode.supports(self.version) {
            let error = ParserError::UnsupportedOpcode {
                opcode,
                version: self.version,
            };

            return self.fail(error, base);
        }

        let mut modifiers = InstructionModifiers::empty();
        for suffix in parts {
            let modifier = self.instruction_modifier(suffix)?;
            if modifier.intersects(InstructionModifiers::SCALE)
                && modifiers.intersects(InstructionModifiers::SCALE)
            {
                return self.fail(ParserError::ConflictingModifiers, suffix);
            }

            modifiers |= modifier;
        }

        let operands: Vec<&'a str> = if operands.is_empty() {
            Vec::new()
        } else {
            operands.split(',').map(str::trim).collect()
        };

        if operands.len() != opcode.arguments() {
            let error = ParserError::ArgumentCount {
                opcode,
                expected: opcode.arguments(),
                found: operands.len(),
            };

            return self.fail(error, code);
        }

        if let Some(empty) = operands.iter().find(|operand| operand.is_empty()) {
            return self.fail(ParserError::MalformedOperand(String::new()), empty);
        }

        if opcode == Opcode::Def {
            if !modifiers.is_empty() {
                return self.fail(ParserError::UnknownModifier(mnemonic.to_string()), mnemonic);
            }

            return self.constant(&operands).map(Statement::Constant);
        }

        let dest = match operands.first() {
            Some(operand) => Some(self.destination(opcode, operand)?),
            None => None,
        };

        let sources = operands
            .iter()
            .skip(1)
            .map(|operand| self.source(operand))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Statement::Instruction(Instruction {
            opcode,
            modifiers,
            dest,
            sources,
        }))
    }

    fn instruction_modifier(&self, suffix: &'a str) -> Parse<InstructionModifiers> {
        let (modifier, since_1_4) = match suffix.to_ascii_lowercase().as_str() {
            "x2" => (InstructionModifiers::X2, false),
            "x4" => (InstructionModifiers::X4, false),
            "d2" => (InstructionModifiers::D2, false),
            "sat" => (InstructionModifiers::SAT, false),
            "x8" => (InstructionModifiers::X8, true),
            "d4" => (InstructionModifiers::D4, true),
            "d8" => (InstructionModifiers::D8, true),
            _ => return self.fail(ParserError::UnknownModifier(suffix.to_string()), suffix),
        };

        if since_1_4 && self.version.is_legacy() {
            return self.unsupported_modifier(suffix, suffix);
        }

        Ok(modifier)
    }

    fn constant(&self, operands: &[&'a str]) -> Parse<Constant> {
        let (register, rest) = self.register(operands[0], operands[0])?;
        if register.class != RegisterClass::Constant {
            return self.fail(ParserError::ExpectedConstant(register), operands[0]);
        } else if !rest.is_empty() {
            return self.fail(ParserError::MalformedOperand(operands[0].to_string()), operands[0]);
        }

        let mut value = [0.0; 4];
        for (component, literal) in value.iter_mut().zip(&operands[1..]) {
            *component = match literal.parse::<f32>() {
                Ok(parsed) if parsed.is_finite() => parsed,
                _ => {
                    let error = ParserError::MalformedConstant(literal.to_string());
                    return self.fail(error, literal);
                }
            };
        }

        Ok(Constant {
            register: register.index,
            value,
        })
    }

    fn destination(&self, opcode: Opcode, operand: &'a str) -> Parse<Destination> {
        let (register, rest) = self.register(operand, operand)?;

        let legal = match (opcode, register.class) {
            (Opcode::Texkill, RegisterClass::Texture) => true,
            (Opcode::Texkill, RegisterClass::Temp) => !self.version.is_legacy(),
            (_, RegisterClass::Temp) if opcode.is_texture() => !self.version.is_legacy(),
            (_, RegisterClass::Texture) if opcode.is_texture() => self.version.is_legacy(),
            (_, RegisterClass::Temp) => true,
            (_, RegisterClass::Texture) => self.version.is_legacy(),
            _ => false,
        };

        if !legal {
            return self.fail(ParserError::IllegalDestination { opcode, register }, operand);
        }

        let mask = match rest.strip_prefix('.') {
            None if rest.is_empty() => WriteMask::RGBA,
            None => return self.fail(ParserError::MalformedOperand(operand.to_string()), operand),
            Some(mask) if self.version.is_legacy() => legacy_mask(mask),
            Some(mask) => match channel_mask(mask) {
                Some(mask) => mask,
                None => return self.fail(ParserError::BadWriteMask(mask.to_string()), rest),
            },
        };

        Ok(Destination { register, mask })
    }

    fn source(&self, operand: &'a str) -> Parse<Source> {
        let compact: String = operand.chars().filter(|c| !c.is_whitespace()).collect();
        let mut modifiers = SourceModifiers::empty();

        let mut rest = compact.as_str();
        if let Some(inverted) = rest.strip_prefix("1-") {
            modifiers |= SourceModifiers::INVERT;
            rest = inverted;
        } else if let Some(negated) = rest.strip_prefix('-') {
            modifiers |= SourceModifiers::NEGATE;
            rest = negated;
        }

        let (register, mut rest) = self.register(rest, operand)?;
        let legacy = self.version.is_legacy();

        while !rest.is_empty() {
            if let Some(suffix) = rest.strip_prefix('_') {
                let end = suffix.find(|c: char| c == '_' || c == '.').unwrap_or(suffix.len());
                let (name, tail) = suffix.split_at(end);
                rest = tail;

                let (modifier, since_1_4) = match name.to_ascii_lowercase().as_str() {
                    "bias" => (SourceModifiers::BIAS, false),
                    "bx2" => (SourceModifiers::SIGNED_SCALE, false),
                    "x2" => (SourceModifiers::SCALE, true),
                    "dz" | "db" => (SourceModifiers::DZ, true),
                    "dw" | "da" => (SourceModifiers::DW, true),
                    _ => return self.fail(ParserError::UnknownModifier(name.to_string()), operand),
                };

                if since_1_4 && legacy {
                    return self.unsupported_modifier(name, operand);
                }

                modifiers |= modifier;
            } else if let Some(selector) = rest.strip_prefix('.') {
                let (modifier, since_1_4) = match selector.to_ascii_lowercase().as_str() {
                    "a" | "w" => (SourceModifiers::REP_ALPHA, false),
                    "b" | "z" => (SourceModifiers::REP_BLUE, false),
                    "r" | "x" => (SourceModifiers::REP_RED, true),
                    "g" | "y" => (SourceModifiers::REP_GREEN, true),
                    "rgb" | "xyz" => (SourceModifiers::XYZ, true),
                    "rga" | "xyw" => (SourceModifiers::XYW, true),
                    "rgba" | "xyzw" => (SourceModifiers::empty(), false),
                    _ => {
                        let error = ParserError::MalformedOperand(operand.to_string());
                        return self.fail(error, operand);
                    }
                };

                if since_1_4 && legacy {
                    return self.unsupported_modifier(selector, operand);
                }

                modifiers |= modifier;
                break;
            } else {
                return self.fail(ParserError::MalformedOperand(operand.to_string()), operand);
            }
        }

        Ok(Source {
            register,
            modifiers,
        })
    }

    /// Separa un registro de lo que le sigue. Los errores se ubican en `operand`.
    fn register<'t>(&self, text: &'t str, operand: &'a str) -> Parse<(Register, &'t str)> {
        let malformed = || self.fail(ParserError::MalformedOperand(operand.to_string()), operand);

        let class = match text.chars().next().and_then(RegisterClass::from_prefix) {
            Some(class) => class,
            None => return malformed(),
        };

        let digits = &text[1..];
        let end = digits
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(digits.len());

        let (number, rest) = digits.split_at(end);
        if number.is_empty() {
            return malformed();
        }

        let limit = self.version.limit(class);
        match number.parse::<u32>() {
            Ok(index) if index < limit as u32 => {
                Ok((Register::new(class, index as u8), rest))
            }

            _ => {
                let error = ParserError::RegisterRange {
                    register: format!("{}{}", class.prefix(), number),
                    limit,
                    version: self.version,
                };

                self.fail(error, operand)
            }
        }
    }

    fn unsupported_modifier<T>(&self, modifier: &str, token: &str) -> Parse<T> {
        let error = ParserError::UnsupportedModifier {
            modifier: modifier.to_string(),
            version: self.version,
        };

        self.fail(error, token)
    }

    fn fail<T>(&self, error: ParserError, token: &str) -> Parse<T> {
        Err(Located::at(error, self.locate(token)))
    }

    /// Ubica un fragmento de la línea actual.
    fn locate(&self, token: &str) -> Location {
        let base = self.line.as_ptr() as usize;
        let start = token.as_ptr() as usize;

        let columns = if start >= base && start + token.len() <= base + self.line.len() {
            let offset = (start - base) as u32;
            offset + 1..offset + 1 + token.len() as u32
        } else {
            1..self.line.len() as u32 + 1
        };

        Location::new(self.source, self.number, columns)
    }
}

/// Descarta cualquier comentario al final de una línea.
fn strip_comment(line: &str) -> &str {
    let end = [line.find("//"), line.find(';')]
        .iter()
        .filter_map(|position| *position)
        .min()
        .unwrap_or(line.len());

    &line[..end]
}

/// Máscara de PS1.4: cualquier subconjunto de canales, en orden.
fn channel_mask(mask: &str) -> Option<WriteMask> {
    const CHANNELS: [(WriteMask, char, char); 4] = [
        (WriteMask::RED, 'r', 'x'),
        (WriteMask::GREEN, 'g', 'y'),
        (WriteMask::BLUE, 'b', 'z'),
        (WriteMask::ALPHA, 'a', 'w'),
    ];

    let mut result = WriteMask::empty();
    let mut next = 0;

    for letter in mask.chars().map(|c| c.to_ascii_lowercase()) {
        let position = CHANNELS[next..]
            .iter()
            .position(|&(_, color, vector)| letter == color || letter == vector)?;

        result |= CHANNELS[next + position].0;
        next += position + 1;
    }

    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

/// Máscara de PS1.1 a PS1.3: todo, solo RGB o solo alfa.
///
/// Una máscara que no selecciona RGB ni alfa se trata como solo alfa.
/// Hay contenido que depende de este comportamiento.
fn legacy_mask(mask: &str) -> WriteMask {
    let lower = mask.to_ascii_lowercase();

    let rgb = lower.contains("rgb") || lower.contains("xyz");
    let alpha = lower.contains('a') || lower.contains('w');

    match (rgb, alpha) {
        (true, true) => WriteMask::RGBA,
        (true, false) => WriteMask::RGB,
        (false, true) => WriteMask::ALPHA,
        (false, false) => {
            tracing::debug!(mask = %mask, "write mask selects no channel group, assuming alpha");
            WriteMask::ALPHA
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Vector4;
    use pretty_assertions::assert_eq;

    fn error_of(text: &str) -> ParserError {
        parse_str("<test>", text).unwrap_err().into_inner()
    }

    #[test]
    fn version_spellings() {
        for (text, version) in &[
            ("ps.1.1", Version::Ps11),
            ("PS_1_2", Version::Ps12),
            ("ps1.3", Version::Ps13),
            ("ps.1_4", Version::Ps14),
            ("  // comment\n\nps_1.4", Version::Ps14),
        ] {
            assert_eq!(parse_str("<test>", text).unwrap().version, *version);
        }
    }

    #[test]
    fn missing_or_bad_version() {
        assert_eq!(error_of("mov r0, c0"), ParserError::MissingVersion);
        assert_eq!(error_of("; nothing here\n"), ParserError::MissingVersion);
        assert_eq!(
            error_of("ps.2.0\nmov r0, c0"),
            ParserError::InvalidVersion("ps.2.0".to_string())
        );
    }

    #[test]
    fn constants_are_collected() {
        let program = parse_str(
            "<test>",
            "ps.1.1\ndef c0, 1, 0, 0, 1\ndef c3, 0.5, -0.25, 2, 0 ; comment\nmov r0, c0",
        )
        .unwrap();

        let values: Vec<(u8, Vector4)> = program
            .constants
            .iter()
            .map(|constant| (constant.register, constant.value))
            .collect();

        assert_eq!(
            values,
            vec![(0, [1.0, 0.0, 0.0, 1.0]), (3, [0.5, -0.25, 2.0, 0.0])]
        );
        assert_eq!(program.instructions.len(), 1);
    }

    #[test]
    fn redefinition_replaces_constant() {
        let program = parse_str("<test>", "ps.1.1\ndef c1, 1, 1, 1, 1\ndef c1, 0, 0, 0, 0").unwrap();
        assert_eq!(program.constants.len(), 1);
        assert_eq!(program.constants[0].value, [0.0; 4]);
    }

    #[test]
    fn malformed_constant() {
        assert_eq!(
            error_of("ps.1.1\ndef c0, 1, zero, 0, 1"),
            ParserError::MalformedConstant("zero".to_string())
        );

        assert_eq!(
            error_of("ps.1.1\ndef r0, 1, 0, 0, 1"),
            ParserError::ExpectedConstant(Register::temp(0))
        );

        assert!(matches!(
            error_of("ps.1.1\ndef c0, 1, 0, 0"),
            ParserError::ArgumentCount {
                opcode: Opcode::Def,
                expected: 5,
                found: 4,
            }
        ));
    }

    #[test]
    fn register_ranges() {
        assert!(matches!(
            error_of("ps.1.1\nmov r0, c8"),
            ParserError::RegisterRange { limit: 8, .. }
        ));

        assert!(matches!(
            error_of("ps.1.1\nmov r2, c0"),
            ParserError::RegisterRange { limit: 2, version: Version::Ps11, .. }
        ));

        assert!(matches!(
            error_of("ps.1.3\ntex t4"),
            ParserError::RegisterRange { limit: 4, .. }
        ));

        assert!(parse_str("<test>", "ps.1.4\nmov r5, c7").is_ok());
    }

    #[test]
    fn opcode_errors() {
        assert_eq!(
            error_of("ps.1.1\nfrob r0, r1"),
            ParserError::UnknownOpcode("frob".to_string())
        );

        assert_eq!(
            error_of("ps.1.1\ntexld r0, t0"),
            ParserError::UnsupportedOpcode {
                opcode: Opcode::Texld,
                version: Version::Ps11,
            }
        );

        assert!(matches!(
            error_of("ps.1.1\nadd r0, r1"),
            ParserError::ArgumentCount {
                expected: 3,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn source_modifiers() {
        let program = parse_str(
            "<test>",
            "ps.1.4\nmad r0, -r1_bx2, 1 - c0, r2_bias.a\ntexld r1, t0_dz\ntexcrd r2.rgb, t1.xyw",
        )
        .unwrap();

        let modifiers: Vec<_> = program
            .instructions
            .iter()
            .flat_map(|instruction| instruction.sources.iter().map(|source| source.modifiers))
            .collect();

        assert_eq!(
            modifiers,
            vec![
                SourceModifiers::NEGATE | SourceModifiers::SIGNED_SCALE,
                SourceModifiers::INVERT,
                SourceModifiers::BIAS | SourceModifiers::REP_ALPHA,
                SourceModifiers::DZ,
                SourceModifiers::XYW,
            ]
        );
    }

    #[test]
    fn version_limited_modifiers() {
        assert!(matches!(
            error_of("ps.1.1\nmov r0, r1_x2"),
            ParserError::UnsupportedModifier { .. }
        ));

        assert!(matches!(
            error_of("ps.1.3\nmov r0, r1.r"),
            ParserError::UnsupportedModifier { .. }
        ));

        assert!(matches!(
            error_of("ps.1.1\nmul_x8 r0, r1, r1"),
            ParserError::UnsupportedModifier { .. }
        ));

        assert_eq!(
            error_of("ps.1.4\nmul_x2_d2 r0, r1, r1"),
            ParserError::ConflictingModifiers
        );

        assert!(parse_str("<test>", "ps.1.1\nlrp r0, t0.a, t1, r1").is_ok());
    }

    #[test]
    fn write_masks() {
        let program = parse_str(
            "<test>",
            "ps.1.4\nmov r0.rb, r1\nmov r0.xyzw, r1\nmov r1.a, r0",
        )
        .unwrap();

        let masks: Vec<_> = program
            .instructions
            .iter()
            .filter_map(|instruction| instruction.dest.map(|dest| dest.mask))
            .collect();

        assert_eq!(
            masks,
            vec![WriteMask::RED | WriteMask::BLUE, WriteMask::RGBA, WriteMask::ALPHA]
        );

        assert_eq!(
            error_of("ps.1.4\nmov r0.br, r1"),
            ParserError::BadWriteMask("br".to_string())
        );
    }

    #[test]
    fn legacy_write_masks() {
        let program = parse_str(
            "<test>",
            "ps.1.1\nmov r0.rgb, r1\nmov r0.a, r1\nmov r0.xyzw, r1\nmov r0.rg, r1",
        )
        .unwrap();

        let masks: Vec<_> = program
            .instructions
            .iter()
            .filter_map(|instruction| instruction.dest.map(|dest| dest.mask))
            .collect();

        assert_eq!(
            masks,
            vec![
                WriteMask::RGB,
                WriteMask::ALPHA,
                WriteMask::RGBA,
                WriteMask::ALPHA,
            ]
        );
    }

    #[test]
    fn destination_classes() {
        assert!(matches!(
            error_of("ps.1.1\nmov c0, r0"),
            ParserError::IllegalDestination { .. }
        ));

        assert!(matches!(
            error_of("ps.1.4\nmov t0, r0"),
            ParserError::IllegalDestination { .. }
        ));

        assert!(matches!(
            error_of("ps.1.1\ntex r0"),
            ParserError::IllegalDestination { .. }
        ));

        assert!(parse_str("<test>", "ps.1.1\ntex t0\nmov t1, t0").is_ok());
    }

    #[test]
    fn coissue_and_case() {
        let program = parse_str("<test>", "PS.1.1\nMUL R0.RGB, V0, C0\n+ADD_SAT R0.A, V0, C1").unwrap();

        assert_eq!(program.instructions[1].opcode, Opcode::Add);
        assert_eq!(program.instructions[1].modifiers, InstructionModifiers::SAT);
        assert_eq!(program.instructions[1].dest.unwrap().mask, WriteMask::ALPHA);
    }

    #[test]
    fn errors_point_at_the_operand() {
        let error = parse_str("<shader>", "ps.1.1\nmov r0, c9").unwrap_err();
        assert_eq!(error.location().to_string(), "<shader>:[2:9-2:10]");
    }
}
