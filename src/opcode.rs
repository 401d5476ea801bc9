//! Registro de opcodes.
//!
//! Cada opcode del dialecto PS1.x tiene asociado un número fijo de
//! operandos (destino incluido) y el conjunto de versiones que lo
//! admiten. La tabla es inmutable y se comparte por todas las
//! instancias del parser.
//!
//! Los mnemónicos son case-insensitive, por lo cual tanto `texld` como
//! `TEXLD` y `TexLd` resultan en [`Opcode::Texld`].

use bitflags::bitflags;
use std::{
    fmt::{self, Display},
    str::FromStr,
};

use crate::ir::Version;

// Case-insensitive
pub use unicase::Ascii as NoCase;

bitflags! {
    /// Conjunto de versiones que admiten un opcode.
    pub struct Versions: u8 {
        const PS_1_1 = 0x01;
        const PS_1_2 = 0x02;
        const PS_1_3 = 0x04;
        const PS_1_4 = 0x08;

        const LEGACY = Self::PS_1_1.bits | Self::PS_1_2.bits | Self::PS_1_3.bits;
        const PS_1_2_3 = Self::PS_1_2.bits | Self::PS_1_3.bits;
        const FROM_1_2 = Self::PS_1_2_3.bits | Self::PS_1_4.bits;
        const ALL = Self::LEGACY.bits | Self::PS_1_4.bits;
    }
}

impl From<Version> for Versions {
    fn from(version: Version) -> Self {
        match version {
            Version::Ps11 => Versions::PS_1_1,
            Version::Ps12 => Versions::PS_1_2,
            Version::Ps13 => Versions::PS_1_3,
            Version::Ps14 => Versions::PS_1_4,
        }
    }
}

/// Un opcode.
///
/// El orden de las variantes importa: todas las instrucciones aritméticas
/// preceden a [`Opcode::Tex`], y todas las de direccionamiento de texturas
/// están entre esta y [`Opcode::Phase`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Opcode {
    Add,
    Bem,
    Cmp,
    Cnd,
    Dp3,
    Dp4,
    Lrp,
    Mad,
    Mov,
    Mul,
    Nop,
    Sub,
    Tex,
    Texbem,
    Texbeml,
    Texcoord,
    Texcrd,
    Texdepth,
    Texdp3,
    Texdp3tex,
    Texkill,
    Texld,
    Texm3x2depth,
    Texm3x2pad,
    Texm3x2tex,
    Texm3x3,
    Texm3x3pad,
    Texm3x3spec,
    Texm3x3tex,
    Texm3x3vspec,
    Texreg2ar,
    Texreg2gb,
    Texreg2rgb,
    Phase,
    Def,
}

/// Metadatos inmutables de un opcode.
#[derive(Copy, Clone, Debug)]
pub struct OpcodeInfo {
    pub mnemonic: &'static str,
    /// Operandos totales, destino incluido.
    pub arguments: usize,
    pub versions: Versions,
}

const fn info(mnemonic: &'static str, arguments: usize, versions: Versions) -> OpcodeInfo {
    OpcodeInfo {
        mnemonic,
        arguments,
        versions,
    }
}

const INFO: &[(Opcode, OpcodeInfo)] = &[
    (Opcode::Add, info("add", 3, Versions::ALL)),
    (Opcode::Bem, info("bem", 3, Versions::PS_1_4)),
    (Opcode::Cmp, info("cmp", 4, Versions::FROM_1_2)),
    (Opcode::Cnd, info("cnd", 4, Versions::ALL)),
    (Opcode::Dp3, info("dp3", 3, Versions::ALL)),
    (Opcode::Dp4, info("dp4", 3, Versions::FROM_1_2)),
    (Opcode::Lrp, info("lrp", 4, Versions::ALL)),
    (Opcode::Mad, info("mad", 4, Versions::ALL)),
    (Opcode::Mov, info("mov", 2, Versions::ALL)),
    (Opcode::Mul, info("mul", 3, Versions::ALL)),
    (Opcode::Nop, info("nop", 0, Versions::ALL)),
    (Opcode::Sub, info("sub", 3, Versions::ALL)),
    (Opcode::Tex, info("tex", 1, Versions::LEGACY)),
    (Opcode::Texbem, info("texbem", 2, Versions::LEGACY)),
    (Opcode::Texbeml, info("texbeml", 2, Versions::LEGACY)),
    (Opcode::Texcoord, info("texcoord", 1, Versions::LEGACY)),
    (Opcode::Texcrd, info("texcrd", 2, Versions::PS_1_4)),
    (Opcode::Texdepth, info("texdepth", 1, Versions::PS_1_4)),
    (Opcode::Texdp3, info("texdp3", 2, Versions::PS_1_2_3)),
    (Opcode::Texdp3tex, info("texdp3tex", 2, Versions::PS_1_2_3)),
    (Opcode::Texkill, info("texkill", 1, Versions::ALL)),
    (Opcode::Texld, info("texld", 2, Versions::PS_1_4)),
    (Opcode::Texm3x2depth, info("texm3x2depth", 2, Versions::PS_1_3)),
    (Opcode::Texm3x2pad, info("texm3x2pad", 2, Versions::LEGACY)),
    (Opcode::Texm3x2tex, info("texm3x2tex", 2, Versions::LEGACY)),
    (Opcode::Texm3x3, info("texm3x3", 2, Versions::PS_1_2_3)),
    (Opcode::Texm3x3pad, info("texm3x3pad", 2, Versions::LEGACY)),
    (Opcode::Texm3x3spec, info("texm3x3spec", 3, Versions::LEGACY)),
    (Opcode::Texm3x3tex, info("texm3x3tex", 2, Versions::LEGACY)),
    (Opcode::Texm3x3vspec, info("texm3x3vspec", 2, Versions::LEGACY)),
    (Opcode::Texreg2ar, info("texreg2ar", 2, Versions::LEGACY)),
    (Opcode::Texreg2gb, info("texreg2gb", 2, Versions::LEGACY)),
    (Opcode::Texreg2rgb, info("texreg2rgb", 2, Versions::PS_1_2_3)),
    (Opcode::Phase, info("phase", 0, Versions::PS_1_4)),
    (Opcode::Def, info("def", 5, Versions::ALL)),
];

impl Opcode {
    /// Obtiene los metadatos del opcode.
    pub fn info(self) -> &'static OpcodeInfo {
        // La tabla sigue el orden de declaración de las variantes
        &INFO[self as usize].1
    }

    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    pub fn arguments(self) -> usize {
        self.info().arguments
    }

    /// Determina si una versión dada admite el opcode.
    pub fn supports(self, version: Version) -> bool {
        self.info().versions.contains(Versions::from(version))
    }

    /// Instrucciones de direccionamiento de texturas.
    pub fn is_texture(self) -> bool {
        self >= Opcode::Tex && self < Opcode::Phase
    }

    /// Instrucciones aritméticas, `nop` incluido.
    pub fn is_arithmetic(self) -> bool {
        self < Opcode::Tex
    }
}

impl Display for Opcode {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.mnemonic())
    }
}

impl FromStr for Opcode {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let string = NoCase::new(string);

        INFO.iter()
            .find(|(_, info)| NoCase::new(info.mnemonic) == string)
            .map(|&(opcode, _)| opcode)
            .ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_follows_declaration_order() {
        for (index, (opcode, _)) in INFO.iter().enumerate() {
            assert_eq!(*opcode as usize, index);
        }
    }

    #[test]
    fn case_insensitive_lookup() {
        assert_eq!("TexLD".parse(), Ok(Opcode::Texld));
        assert_eq!("texm3x3SPEC".parse(), Ok(Opcode::Texm3x3spec));
        assert_eq!("frobnicate".parse::<Opcode>(), Err(()));
    }

    #[test]
    fn version_support() {
        assert!(Opcode::Tex.supports(Version::Ps11));
        assert!(!Opcode::Tex.supports(Version::Ps14));
        assert!(Opcode::Texld.supports(Version::Ps14));
        assert!(!Opcode::Cmp.supports(Version::Ps11));
        assert!(Opcode::Cmp.supports(Version::Ps12));
        assert!(Opcode::Phase.supports(Version::Ps14));
    }

    #[test]
    fn opcode_classes() {
        assert!(Opcode::Sub.is_arithmetic());
        assert!(Opcode::Tex.is_texture());
        assert!(Opcode::Texreg2rgb.is_texture());
        assert!(!Opcode::Phase.is_texture());
        assert!(!Opcode::Phase.is_arithmetic());
        assert!(!Opcode::Def.is_texture());
    }
}
