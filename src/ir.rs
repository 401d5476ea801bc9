//! Representación intermedia.
//!
//! Un programa es una lista ordenada de instrucciones más una tabla de
//! constantes. Todas las fases posteriores al parser (normalización y
//! ambos back ends) consumen esta representación. La implementación de
//! [`Display`] para [`Program`] es la serialización canónica: volver a
//! analizar su salida produce exactamente el mismo programa.

use bitflags::bitflags;
use std::fmt::{self, Display};

use crate::opcode::Opcode;

/// Un vector de cuatro componentes.
pub type Vector4 = [f32; 4];

/// Cantidad de registros de constantes, igual para todas las versiones.
pub const CONSTANT_REGISTERS: u8 = 8;

/// Versión del dialecto.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    Ps11,
    Ps12,
    Ps13,
    Ps14,
}

impl Version {
    /// Tamaño del archivo de registros de una clase en esta versión.
    pub fn limit(self, class: RegisterClass) -> u8 {
        match (class, self) {
            (RegisterClass::Temp, Version::Ps14) => 6,
            (RegisterClass::Temp, _) => 2,
            (RegisterClass::Texture, Version::Ps14) => 6,
            (RegisterClass::Texture, _) => 4,
            (RegisterClass::Constant, _) => CONSTANT_REGISTERS,
            (RegisterClass::Color, _) => 2,
        }
    }

    /// Versión menor, es decir, `x` en `ps.1.x`.
    pub fn minor(self) -> u8 {
        match self {
            Version::Ps11 => 1,
            Version::Ps12 => 2,
            Version::Ps13 => 3,
            Version::Ps14 => 4,
        }
    }

    pub fn from_minor(minor: u8) -> Option<Self> {
        match minor {
            1 => Some(Version::Ps11),
            2 => Some(Version::Ps12),
            3 => Some(Version::Ps13),
            4 => Some(Version::Ps14),
            _ => None,
        }
    }

    pub fn is_legacy(self) -> bool {
        self < Version::Ps14
    }
}

impl Display for Version {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "ps.1.{}", self.minor())
    }
}

/// Clase de registro.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RegisterClass {
    /// `t#`
    Texture,
    /// `c#`
    Constant,
    /// `r#`
    Temp,
    /// `v#`
    Color,
}

impl RegisterClass {
    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix.to_ascii_lowercase() {
            't' => Some(RegisterClass::Texture),
            'c' => Some(RegisterClass::Constant),
            'r' => Some(RegisterClass::Temp),
            'v' => Some(RegisterClass::Color),
            _ => None,
        }
    }

    pub fn prefix(self) -> char {
        match self {
            RegisterClass::Texture => 't',
            RegisterClass::Constant => 'c',
            RegisterClass::Temp => 'r',
            RegisterClass::Color => 'v',
        }
    }
}

impl Display for RegisterClass {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = match self {
            RegisterClass::Texture => "texture",
            RegisterClass::Constant => "constant",
            RegisterClass::Temp => "temporary",
            RegisterClass::Color => "color",
        };

        fmt.write_str(string)
    }
}

/// Referencia a un registro. No es dueña de nada, es un índice.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Register {
    pub class: RegisterClass,
    pub index: u8,
}

impl Register {
    pub const fn new(class: RegisterClass, index: u8) -> Self {
        Register { class, index }
    }

    pub const fn temp(index: u8) -> Self {
        Register::new(RegisterClass::Temp, index)
    }

    pub const fn texture(index: u8) -> Self {
        Register::new(RegisterClass::Texture, index)
    }

    pub const fn constant(index: u8) -> Self {
        Register::new(RegisterClass::Constant, index)
    }

    pub const fn color(index: u8) -> Self {
        Register::new(RegisterClass::Color, index)
    }
}

impl Display for Register {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}{}", self.class.prefix(), self.index)
    }
}

bitflags! {
    /// Canales escritos por una instrucción.
    pub struct WriteMask: u8 {
        const RED = 0x01;
        const GREEN = 0x02;
        const BLUE = 0x04;
        const ALPHA = 0x08;

        const RGB = Self::RED.bits | Self::GREEN.bits | Self::BLUE.bits;
        const RGBA = Self::RGB.bits | Self::ALPHA.bits;
    }
}

impl WriteMask {
    pub fn writes_rgb(self) -> bool {
        self.intersects(WriteMask::RGB)
    }

    pub fn writes_alpha(self) -> bool {
        self.contains(WriteMask::ALPHA)
    }
}

bitflags! {
    /// Modificadores de instrucción (`mul_x2_sat`).
    pub struct InstructionModifiers: u8 {
        const X2 = 0x01;
        const X4 = 0x02;
        const X8 = 0x04;
        const D2 = 0x08;
        const D4 = 0x10;
        const D8 = 0x20;
        const SAT = 0x40;

        const SCALE = Self::X2.bits
            | Self::X4.bits
            | Self::X8.bits
            | Self::D2.bits
            | Self::D4.bits
            | Self::D8.bits;
    }
}

impl InstructionModifiers {
    /// Sufijos en orden canónico. La escala siempre precede a `_sat`.
    pub const SUFFIXES: &'static [(InstructionModifiers, &'static str)] = &[
        (InstructionModifiers::X2, "x2"),
        (InstructionModifiers::X4, "x4"),
        (InstructionModifiers::X8, "x8"),
        (InstructionModifiers::D2, "d2"),
        (InstructionModifiers::D4, "d4"),
        (InstructionModifiers::D8, "d8"),
        (InstructionModifiers::SAT, "sat"),
    ];
}

bitflags! {
    /// Modificadores de un operando fuente.
    pub struct SourceModifiers: u16 {
        /// `-r0`
        const NEGATE = 0x0001;
        /// `1-r0`
        const INVERT = 0x0002;
        /// `r0_bias`
        const BIAS = 0x0004;
        /// `r0_x2`; junto a `BIAS` forma `r0_bx2`
        const SCALE = 0x0008;
        const REP_RED = 0x0010;
        const REP_GREEN = 0x0020;
        const REP_BLUE = 0x0040;
        const REP_ALPHA = 0x0080;
        /// `t0.xyz`
        const XYZ = 0x0100;
        /// `t0.xyw`
        const XYW = 0x0200;
        /// `t0_dz`
        const DZ = 0x0400;
        /// `t0_dw`
        const DW = 0x0800;

        const SIGNED_SCALE = Self::BIAS.bits | Self::SCALE.bits;
        const REPLICATE = Self::REP_RED.bits
            | Self::REP_GREEN.bits
            | Self::REP_BLUE.bits
            | Self::REP_ALPHA.bits;
        const SWIZZLE = Self::XYZ.bits | Self::XYW.bits | Self::DZ.bits | Self::DW.bits;
    }
}

/// Operando destino.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    pub register: Register,
    pub mask: WriteMask,
}

impl Display for Destination {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.register)?;
        if self.mask == WriteMask::RGBA {
            return Ok(());
        }

        fmt.write_str(".")?;

        let channels = [
            (WriteMask::RED, 'r'),
            (WriteMask::GREEN, 'g'),
            (WriteMask::BLUE, 'b'),
            (WriteMask::ALPHA, 'a'),
        ];

        for &(channel, letter) in channels.iter() {
            if self.mask.contains(channel) {
                write!(fmt, "{}", letter)?;
            }
        }

        Ok(())
    }
}

/// Operando fuente.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Source {
    pub register: Register,
    pub modifiers: SourceModifiers,
}

impl Source {
    pub fn plain(register: Register) -> Self {
        Source {
            register,
            modifiers: SourceModifiers::empty(),
        }
    }
}

impl Display for Source {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modifiers = self.modifiers;

        if modifiers.contains(SourceModifiers::INVERT) {
            fmt.write_str("1-")?;
        } else if modifiers.contains(SourceModifiers::NEGATE) {
            fmt.write_str("-")?;
        }

        write!(fmt, "{}", self.register)?;

        if modifiers.contains(SourceModifiers::SIGNED_SCALE) {
            fmt.write_str("_bx2")?;
        } else if modifiers.contains(SourceModifiers::BIAS) {
            fmt.write_str("_bias")?;
        } else if modifiers.contains(SourceModifiers::SCALE) {
            fmt.write_str("_x2")?;
        }

        if modifiers.contains(SourceModifiers::DZ) {
            fmt.write_str("_dz")?;
        } else if modifiers.contains(SourceModifiers::DW) {
            fmt.write_str("_dw")?;
        }

        let selector = if modifiers.contains(SourceModifiers::REP_RED) {
            ".r"
        } else if modifiers.contains(SourceModifiers::REP_GREEN) {
            ".g"
        } else if modifiers.contains(SourceModifiers::REP_BLUE) {
            ".b"
        } else if modifiers.contains(SourceModifiers::REP_ALPHA) {
            ".a"
        } else if modifiers.contains(SourceModifiers::XYZ) {
            ".xyz"
        } else if modifiers.contains(SourceModifiers::XYW) {
            ".xyw"
        } else {
            ""
        };

        fmt.write_str(selector)
    }
}

/// Una instrucción de programa.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub modifiers: InstructionModifiers,
    /// `None` para `nop` y `phase`.
    pub dest: Option<Destination>,
    /// A lo sumo tres.
    pub sources: Vec<Source>,
}

impl Instruction {
    /// Registros leídos, en orden.
    pub fn reads(&self) -> impl Iterator<Item = Register> + '_ {
        self.sources.iter().map(|source| source.register)
    }

    /// Registro escrito, si hay alguno.
    pub fn writes(&self) -> Option<Register> {
        self.dest.map(|dest| dest.register)
    }
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.opcode)?;
        for &(modifier, suffix) in InstructionModifiers::SUFFIXES {
            if self.modifiers.contains(modifier) {
                write!(fmt, "_{}", suffix)?;
            }
        }

        let mut separator = " ";
        if let Some(dest) = &self.dest {
            write!(fmt, "{}{}", separator, dest)?;
            separator = ", ";
        }

        for source in &self.sources {
            write!(fmt, "{}{}", separator, source)?;
            separator = ", ";
        }

        Ok(())
    }
}

/// Declaración `def`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Constant {
    pub register: u8,
    pub value: Vector4,
}

/// Un programa completo.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub version: Version,
    pub instructions: Vec<Instruction>,
    pub constants: Vec<Constant>,
}

impl Display for Program {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(fmt, "{}", self.version)?;

        for Constant { register, value } in &self.constants {
            writeln!(
                fmt,
                "def c{}, {}, {}, {}, {}",
                register, value[0], value[1], value[2], value[3]
            )?;
        }

        for instruction in &self.instructions {
            writeln!(fmt, "{}", instruction)?;
        }

        Ok(())
    }
}
