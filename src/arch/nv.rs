//! Vocabulario de `NV_register_combiners` y `NV_texture_shader`.
//!
//! # Especificaciones
//! - <https://registry.khronos.org/OpenGL/extensions/NV/NV_register_combiners.txt>
//! - <https://registry.khronos.org/OpenGL/extensions/NV/NV_register_combiners2.txt>
//! - <https://registry.khronos.org/OpenGL/extensions/NV/NV_texture_shader.txt>

use std::fmt::{self, Display};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Portion {
    Rgb,
    Alpha,
}

impl Display for Portion {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Portion::Rgb => "GL_RGB",
            Portion::Alpha => "GL_ALPHA",
        })
    }
}

/// Variable de entrada de un combinador general.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Variable {
    A,
    B,
    C,
    D,
}

impl Variable {
    pub const ALL: [Variable; 4] = [Variable::A, Variable::B, Variable::C, Variable::D];
}

/// Variable de entrada del combinador final.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FinalVariable {
    A,
    B,
    C,
    D,
    G,
}

impl Display for Variable {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Variable::A => 'A',
            Variable::B => 'B',
            Variable::C => 'C',
            Variable::D => 'D',
        };

        write!(fmt, "GL_VARIABLE_{}_NV", name)
    }
}

impl Display for FinalVariable {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FinalVariable::A => 'A',
            FinalVariable::B => 'B',
            FinalVariable::C => 'C',
            FinalVariable::D => 'D',
            FinalVariable::G => 'G',
        };

        write!(fmt, "GL_VARIABLE_{}_NV", name)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CombinerRegister {
    Zero,
    Discard,
    ConstantColor0,
    ConstantColor1,
    PrimaryColor,
    SecondaryColor,
    Spare0,
    Spare1,
    Texture(u8),
}

impl Display for CombinerRegister {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CombinerRegister::Zero => "GL_ZERO",
            CombinerRegister::Discard => "GL_DISCARD_NV",
            CombinerRegister::ConstantColor0 => "GL_CONSTANT_COLOR0_NV",
            CombinerRegister::ConstantColor1 => "GL_CONSTANT_COLOR1_NV",
            CombinerRegister::PrimaryColor => "GL_PRIMARY_COLOR_NV",
            CombinerRegister::SecondaryColor => "GL_SECONDARY_COLOR_NV",
            CombinerRegister::Spare0 => "GL_SPARE0_NV",
            CombinerRegister::Spare1 => "GL_SPARE1_NV",
            CombinerRegister::Texture(n) => return write!(fmt, "GL_TEXTURE{}_ARB", n),
        };

        fmt.write_str(name)
    }
}

/// Mapeo de rango de una entrada.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mapping {
    UnsignedIdentity,
    UnsignedInvert,
    ExpandNormal,
    ExpandNegate,
    HalfBiasNormal,
    HalfBiasNegate,
    SignedIdentity,
    SignedNegate,
}

impl Display for Mapping {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Mapping::UnsignedIdentity => "GL_UNSIGNED_IDENTITY_NV",
            Mapping::UnsignedInvert => "GL_UNSIGNED_INVERT_NV",
            Mapping::ExpandNormal => "GL_EXPAND_NORMAL_NV",
            Mapping::ExpandNegate => "GL_EXPAND_NEGATE_NV",
            Mapping::HalfBiasNormal => "GL_HALF_BIAS_NORMAL_NV",
            Mapping::HalfBiasNegate => "GL_HALF_BIAS_NEGATE_NV",
            Mapping::SignedIdentity => "GL_SIGNED_IDENTITY_NV",
            Mapping::SignedNegate => "GL_SIGNED_NEGATE_NV",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Component {
    Rgb,
    Alpha,
    Blue,
}

impl Display for Component {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Component::Rgb => "GL_RGB",
            Component::Alpha => "GL_ALPHA",
            Component::Blue => "GL_BLUE",
        })
    }
}

/// Argumentos de `glCombinerInputNV` y `glFinalCombinerInputNV`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Input {
    pub register: CombinerRegister,
    pub mapping: Mapping,
    pub component: Component,
}

impl Input {
    /// Constante cero.
    pub fn zero(component: Component) -> Self {
        Input {
            register: CombinerRegister::Zero,
            mapping: Mapping::UnsignedIdentity,
            component,
        }
    }

    /// Constante uno, es decir, cero invertido.
    pub fn one(component: Component) -> Self {
        Input {
            mapping: Mapping::UnsignedInvert,
            ..Input::zero(component)
        }
    }
}

impl Display for Input {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}, {}, {}", self.register, self.mapping, self.component)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Scale {
    None,
    By2,
    By4,
    ByOneHalf,
}

/// Argumentos de `glCombinerOutputNV`. El sesgo de salida siempre es
/// `GL_NONE`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Output {
    pub ab: CombinerRegister,
    pub cd: CombinerRegister,
    pub sum: CombinerRegister,
    pub scale: Scale,
    pub ab_dot_product: bool,
    pub cd_dot_product: bool,
    pub mux_sum: bool,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            ab: CombinerRegister::Discard,
            cd: CombinerRegister::Discard,
            sum: CombinerRegister::Discard,
            scale: Scale::None,
            ab_dot_product: false,
            cd_dot_product: false,
            mux_sum: false,
        }
    }
}

impl Display for Output {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = match self.scale {
            Scale::None => "GL_NONE",
            Scale::By2 => "GL_SCALE_BY_TWO_NV",
            Scale::By4 => "GL_SCALE_BY_FOUR_NV",
            Scale::ByOneHalf => "GL_SCALE_BY_ONE_HALF_NV",
        };

        let flag = |set: bool| if set { "GL_TRUE" } else { "GL_FALSE" };

        write!(
            fmt,
            "{}, {}, {}, {}, GL_NONE, {}, {}, {}",
            self.ab,
            self.cd,
            self.sum,
            scale,
            flag(self.ab_dot_product),
            flag(self.cd_dot_product),
            flag(self.mux_sum)
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CombinerParameter {
    NumGeneralCombiners(u32),
}

impl Display for CombinerParameter {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let CombinerParameter::NumGeneralCombiners(count) = self;
        write!(fmt, "GL_NUM_GENERAL_COMBINERS_NV, {}", count)
    }
}

/// Objetivo de textura habilitado en una unidad.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TextureTarget {
    Texture1D,
    Texture2D,
    Texture3D,
    Rectangle,
    CubeMap,
}

/// Valor de `GL_SHADER_OPERATION_NV`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TextureOperation {
    None,
    Texture1D,
    Texture2D,
    Texture3D,
    TextureRectangle,
    TextureCubeMap,
    PassThrough,
    CullFragment,
    OffsetTexture2D,
    OffsetTexture2DScale,
    DependentArTexture2D,
    DependentGbTexture2D,
    DotProduct,
    DotProductTexture2D,
    DotProductTextureCubeMap,
    DotProductReflectCubeMap,
    DotProductConstEyeReflectCubeMap,
}

impl From<TextureTarget> for TextureOperation {
    fn from(target: TextureTarget) -> Self {
        match target {
            TextureTarget::Texture1D => TextureOperation::Texture1D,
            TextureTarget::Texture2D => TextureOperation::Texture2D,
            TextureTarget::Texture3D => TextureOperation::Texture3D,
            TextureTarget::Rectangle => TextureOperation::TextureRectangle,
            TextureTarget::CubeMap => TextureOperation::TextureCubeMap,
        }
    }
}

impl Display for TextureOperation {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TextureOperation::*;

        fmt.write_str(match self {
            None => "GL_NONE",
            Texture1D => "GL_TEXTURE_1D",
            Texture2D => "GL_TEXTURE_2D",
            Texture3D => "GL_TEXTURE_3D",
            TextureRectangle => "GL_TEXTURE_RECTANGLE_NV",
            TextureCubeMap => "GL_TEXTURE_CUBE_MAP_ARB",
            PassThrough => "GL_PASS_THROUGH_NV",
            CullFragment => "GL_CULL_FRAGMENT_NV",
            OffsetTexture2D => "GL_OFFSET_TEXTURE_2D_NV",
            OffsetTexture2DScale => "GL_OFFSET_TEXTURE_2D_SCALE_NV",
            DependentArTexture2D => "GL_DEPENDENT_AR_TEXTURE_2D_NV",
            DependentGbTexture2D => "GL_DEPENDENT_GB_TEXTURE_2D_NV",
            DotProduct => "GL_DOT_PRODUCT_NV",
            DotProductTexture2D => "GL_DOT_PRODUCT_TEXTURE_2D_NV",
            DotProductTextureCubeMap => "GL_DOT_PRODUCT_TEXTURE_CUBE_MAP_NV",
            DotProductReflectCubeMap => "GL_DOT_PRODUCT_REFLECT_CUBE_MAP_NV",
            DotProductConstEyeReflectCubeMap => "GL_DOT_PRODUCT_CONST_EYE_REFLECT_CUBE_MAP_NV",
        })
    }
}
