/// Despacha una expresión sobre la variante concreta de un back end.
///
/// La primera forma toma un [`crate::arch::Arch`] y define `$type` como
/// el tipo del back end correspondiente, lo cual permite invocar funciones
/// asociadas como `$type::compile()`. La segunda toma un
/// [`crate::codegen::Backend`] y liga su contenido a `$pipeline`.
macro_rules! dispatch_backend {
    ($type:ident: $arch:expr => $expr:expr) => {{
        use crate::{
            arch::Arch,
            codegen::{Ati, Nv},
        };

        match $arch {
            Arch::Ati => {
                type $type = Ati;
                $expr
            }

            Arch::Nv => {
                type $type = Nv;
                $expr
            }
        }
    }};

    ($backend:expr, $pipeline:ident => $expr:expr) => {{
        use crate::codegen::Backend;

        match $backend {
            Backend::Ati($pipeline) => $expr,
            Backend::Nv($pipeline) => $expr,
        }
    }};
}
