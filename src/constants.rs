//! Registros de constantes.
//!
//! Un registro `c#` obtiene su valor de dos maneras: un literal `def` en
//! el programa, o un enlace a una variable externa nombrada que se
//! resuelve cada vez que se configura el estado. Si la variable no existe
//! se utiliza el literal.

use std::collections::HashMap;
use thiserror::Error;

use crate::ir::{Program, Vector4, CONSTANT_REGISTERS};

#[derive(Error, Debug, PartialEq)]
pub enum ConstantError {
    #[error("Constant register `c{0}` does not exist, there are only {} registers", CONSTANT_REGISTERS)]
    OutOfRange(u8),
}

/// Fuente de valores para variables nombradas.
pub trait VariableLookup {
    fn lookup(&self, name: &str) -> Option<Vector4>;
}

impl VariableLookup for HashMap<String, Vector4> {
    fn lookup(&self, name: &str) -> Option<Vector4> {
        self.get(name).copied()
    }
}

impl<F> VariableLookup for F
where
    F: Fn(&str) -> Option<Vector4>,
{
    fn lookup(&self, name: &str) -> Option<Vector4> {
        self(name)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantRegister {
    pub default: Vector4,
    pub binding: Option<String>,
    pub valid: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantTable {
    registers: [ConstantRegister; CONSTANT_REGISTERS as usize],
}

impl ConstantTable {
    /// Tabla con los literales de un programa.
    pub fn from_program(program: &Program) -> Self {
        let mut table = ConstantTable::default();
        for constant in &program.constants {
            if let Some(slot) = table.registers.get_mut(constant.register as usize) {
                slot.default = constant.value;
                slot.valid = true;
            }
        }

        table
    }

    /// Enlaza un registro a una variable nombrada.
    pub fn bind<S: Into<String>>(&mut self, register: u8, name: S) -> Result<(), ConstantError> {
        let slot = self
            .registers
            .get_mut(register as usize)
            .ok_or(ConstantError::OutOfRange(register))?;

        slot.binding = Some(name.into());
        slot.valid = true;

        Ok(())
    }

    pub fn get(&self, register: u8) -> Option<&ConstantRegister> {
        self.registers.get(register as usize)
    }

    /// Resuelve el valor actual de un registro.
    pub fn resolve(&self, register: u8, lookup: &dyn VariableLookup) -> Option<Vector4> {
        let slot = self.get(register).filter(|slot| slot.valid)?;
        let bound = slot.binding.as_deref().and_then(|name| lookup.lookup(name));

        Some(bound.unwrap_or(slot.default))
    }

    /// Todos los registros válidos con su valor resuelto.
    pub fn resolved<'a>(
        &'a self,
        lookup: &'a dyn VariableLookup,
    ) -> impl Iterator<Item = (u8, Vector4)> + 'a {
        (0..CONSTANT_REGISTERS)
            .filter_map(move |register| self.resolve(register, lookup).map(|value| (register, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_str;

    fn nothing(_: &str) -> Option<Vector4> {
        None
    }

    #[test]
    fn literals_and_bindings() {
        let program = parse_str("<test>", "ps.1.1\ndef c2, 1, 2, 3, 4\nmov r0, c2").unwrap();
        let mut table = ConstantTable::from_program(&program);
        table.bind(5, "light").unwrap();

        let mut variables = HashMap::new();
        variables.insert("light".to_string(), [0.5; 4]);

        let resolved: Vec<_> = table.resolved(&variables).collect();
        assert_eq!(resolved, vec![(2, [1.0, 2.0, 3.0, 4.0]), (5, [0.5; 4])]);
    }

    #[test]
    fn unresolved_binding_falls_back_to_literal() {
        let program = parse_str("<test>", "ps.1.1\ndef c0, 1, 1, 0, 1\nmov r0, c0").unwrap();
        let mut table = ConstantTable::from_program(&program);
        table.bind(0, "missing").unwrap();

        assert_eq!(table.resolve(0, &nothing), Some([1.0, 1.0, 0.0, 1.0]));
        assert_eq!(table.resolve(1, &nothing), None);
    }

    #[test]
    fn closures_resolve_bindings() {
        let mut table = ConstantTable::default();
        table.bind(1, "time").unwrap();

        let lookup = |name: &str| -> Option<Vector4> {
            if name == "time" {
                Some([2.0; 4])
            } else {
                None
            }
        };
        assert_eq!(table.resolve(1, &lookup), Some([2.0; 4]));
    }

    #[test]
    fn binding_out_of_range() {
        let mut table = ConstantTable::default();
        assert_eq!(table.bind(8, "x"), Err(ConstantError::OutOfRange(8)));
    }
}
