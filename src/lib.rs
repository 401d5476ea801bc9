//! Compilador de pixel shaders PS1.1-PS1.4.
//!
//! # Front end
//! Cada programa deriva de un único bloque de texto, conservado junto a
//! su nombre de origen en [`source`]. El texto se somete a análisis
//! sintáctico en [`parse`], a partir de los metadatos de opcodes que
//! describe [`opcode`], de lo cual se obtiene la representación intermedia
//! descrita en [`ir`]. Los programas PS1.1-PS1.3 pueden llevarse al modelo
//! de registros de PS1.4 por medio de [`normalize`].
//!
//! # Back end
//! En esta sección el compilador deja de ser agnóstico al hardware. Cada
//! familia de GPU expone un pipeline de función fija distinto, cuyo
//! vocabulario vive en [`arch`] y cuya configuración se genera en
//! [`codegen`]: `ATI_fragment_shader` por una parte, y la combinación de
//! `NV_register_combiners` con `NV_texture_shader` por otra. Los registros
//! de constantes se resuelven en [`constants`] al momento de cada draw.
//!
//! # Fachada
//! [`shader::PixelShader`] elige un back end según las extensiones
//! disponibles y administra el ciclo de vida completo. Los fallos se
//! acumulan como reportes de [`error`].

#[macro_use]
mod macros;

pub mod arch;
pub mod codegen;
pub mod constants;
pub mod error;
pub mod ir;
pub mod normalize;
pub mod opcode;
pub mod parse;
pub mod shader;
pub mod source;

pub use shader::PixelShader;
