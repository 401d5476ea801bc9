//! Vocabulario de `ATI_fragment_shader`.
//!
//! # Especificación
//! <https://registry.khronos.org/OpenGL/extensions/ATI/ATI_fragment_shader.txt>

use bitflags::bitflags;
use std::fmt::{self, Display};

/// Registro de una operación de fragmento.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Register {
    /// `GL_REG_n_ATI`
    Reg(u8),
    /// `GL_CON_n_ATI`
    Con(u8),
    /// `GL_TEXTUREn_ARB`, solo como interpolador
    Texture(u8),
    PrimaryColor,
    SecondaryInterpolator,
}

impl Display for Register {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Reg(n) => write!(fmt, "GL_REG_{}_ATI", n),
            Register::Con(n) => write!(fmt, "GL_CON_{}_ATI", n),
            Register::Texture(n) => write!(fmt, "GL_TEXTURE{}_ARB", n),
            Register::PrimaryColor => fmt.write_str("GL_PRIMARY_COLOR_ARB"),
            Register::SecondaryInterpolator => fmt.write_str("GL_SECONDARY_INTERPOLATOR_ATI"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Swizzle {
    Str,
    Stq,
    StrDr,
    StqDq,
}

impl Display for Swizzle {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Swizzle::Str => "GL_SWIZZLE_STR_ATI",
            Swizzle::Stq => "GL_SWIZZLE_STQ_ATI",
            Swizzle::StrDr => "GL_SWIZZLE_STR_DR_ATI",
            Swizzle::StqDq => "GL_SWIZZLE_STQ_DQ_ATI",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Mad,
    Lerp,
    Mov,
    Cnd,
    Cnd0,
    Dot3,
    Dot4,
}

impl Display for Op {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Op::Add => "GL_ADD_ATI",
            Op::Sub => "GL_SUB_ATI",
            Op::Mul => "GL_MUL_ATI",
            Op::Mad => "GL_MAD_ATI",
            Op::Lerp => "GL_LERP_ATI",
            Op::Mov => "GL_MOV_ATI",
            Op::Cnd => "GL_CND_ATI",
            Op::Cnd0 => "GL_CND0_ATI",
            Op::Dot3 => "GL_DOT3_ATI",
            Op::Dot4 => "GL_DOT4_ATI",
        })
    }
}

bitflags! {
    /// Máscara de una operación de color.
    pub struct DstMask: u8 {
        const RED = 0x01;
        const GREEN = 0x02;
        const BLUE = 0x04;
    }
}

bitflags! {
    pub struct DstMod: u8 {
        const X2 = 0x01;
        const X4 = 0x02;
        const X8 = 0x04;
        const HALF = 0x08;
        const QUARTER = 0x10;
        const EIGHTH = 0x20;
        const SATURATE = 0x40;
    }
}

bitflags! {
    pub struct ArgMod: u8 {
        const X2 = 0x01;
        const COMP = 0x02;
        const NEGATE = 0x04;
        const BIAS = 0x08;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Replicate {
    None,
    Red,
    Green,
    Blue,
    Alpha,
}

impl Display for Replicate {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Replicate::None => "GL_NONE",
            Replicate::Red => "GL_RED",
            Replicate::Green => "GL_GREEN",
            Replicate::Blue => "GL_BLUE",
            Replicate::Alpha => "GL_ALPHA",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    pub register: Register,
    pub mask: DstMask,
    pub modifiers: DstMod,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Argument {
    pub register: Register,
    pub replicate: Replicate,
    pub modifiers: ArgMod,
}

/// Argumentos de una operación, uno por cada variante de `gl*FragmentOp*ATI`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Args {
    One(Argument),
    Two(Argument, Argument),
    Three(Argument, Argument, Argument),
}

impl Args {
    pub fn from_slice(args: &[Argument]) -> Option<Self> {
        match *args {
            [a] => Some(Args::One(a)),
            [a, b] => Some(Args::Two(a, b)),
            [a, b, c] => Some(Args::Three(a, b, c)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Args::One(..) => 1,
            Args::Two(..) => 2,
            Args::Three(..) => 3,
        }
    }

    pub fn as_vec(&self) -> Vec<Argument> {
        match *self {
            Args::One(a) => vec![a],
            Args::Two(a, b) => vec![a, b],
            Args::Three(a, b, c) => vec![a, b, c],
        }
    }
}

/// Escribe una lista de bits GL unidos por `|`, o `GL_NONE`.
fn write_bits(fmt: &mut fmt::Formatter<'_>, names: &[(bool, &str)]) -> fmt::Result {
    let mut separator = "";
    let mut any = false;

    for &(set, name) in names {
        if set {
            write!(fmt, "{}{}", separator, name)?;
            separator = "|";
            any = true;
        }
    }

    if !any {
        fmt.write_str("GL_NONE")?;
    }

    Ok(())
}

impl Display for DstMask {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.contains(DstMask::RED), "GL_RED_BIT_ATI"),
            (self.contains(DstMask::GREEN), "GL_GREEN_BIT_ATI"),
            (self.contains(DstMask::BLUE), "GL_BLUE_BIT_ATI"),
        ];

        write_bits(fmt, &names)
    }
}

impl Display for DstMod {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.contains(DstMod::X2), "GL_2X_BIT_ATI"),
            (self.contains(DstMod::X4), "GL_4X_BIT_ATI"),
            (self.contains(DstMod::X8), "GL_8X_BIT_ATI"),
            (self.contains(DstMod::HALF), "GL_HALF_BIT_ATI"),
            (self.contains(DstMod::QUARTER), "GL_QUARTER_BIT_ATI"),
            (self.contains(DstMod::EIGHTH), "GL_EIGHTH_BIT_ATI"),
            (self.contains(DstMod::SATURATE), "GL_SATURATE_BIT_ATI"),
        ];

        write_bits(fmt, &names)
    }
}

impl Display for ArgMod {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.contains(ArgMod::X2), "GL_2X_BIT_ATI"),
            (self.contains(ArgMod::COMP), "GL_COMP_BIT_ATI"),
            (self.contains(ArgMod::NEGATE), "GL_NEGATE_BIT_ATI"),
            (self.contains(ArgMod::BIAS), "GL_BIAS_BIT_ATI"),
        ];

        write_bits(fmt, &names)
    }
}

impl Display for Argument {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}, {}, {}", self.register, self.replicate, self.modifiers)
    }
}

impl Display for Args {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut separator = "";
        for argument in self.as_vec() {
            write!(fmt, "{}{}", separator, argument)?;
            separator = ", ";
        }

        Ok(())
    }
}
