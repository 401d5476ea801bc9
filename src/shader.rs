//! Fachada de alto nivel.
//!
//! [`PixelShader`] es el único punto de contacto para el código de
//! render. Elige un back end según las extensiones disponibles, lleva el
//! programa desde su texto hasta un objeto compilado y administra el ciclo
//! de vida de este. Ningún tipo de error cruza esta frontera: cada fallo
//! se registra como un [`Report`] y la operación retorna `false`.

use std::{cell::RefCell, rc::Rc};

use crate::{
    arch::{Arch, Capabilities, Device},
    codegen::{Backend, Limits, Pipeline},
    constants::{ConstantTable, VariableLookup},
    error::{Report, Severity},
    ir::{Program, CONSTANT_REGISTERS},
    parse::parse_str,
};

pub struct PixelShader<D: Device> {
    device: Rc<RefCell<D>>,
    arch: Arch,
    limits: Limits,
    program: Option<Program>,
    constants: ConstantTable,
    compiled: Option<Backend>,
    reports: Vec<Report>,
}

impl<D: Device> PixelShader<D> {
    /// Retorna `None` si ningún back end es soportado.
    pub fn new(device: Rc<RefCell<D>>, capabilities: Capabilities) -> Option<Self> {
        let arch = match capabilities.select() {
            Some(arch) => arch,
            None => {
                tracing::warn!("neither ATI_fragment_shader nor NV_texture_shader is available");
                return None;
            }
        };

        tracing::debug!(%arch, "pixel shader back end selected");

        Some(PixelShader {
            device,
            arch,
            limits: Limits::default(),
            program: None,
            constants: ConstantTable::default(),
            compiled: None,
            reports: Vec::new(),
        })
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn device(&self) -> &Rc<RefCell<D>> {
        &self.device
    }

    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    pub fn constants(&self) -> &ConstantTable {
        &self.constants
    }

    pub fn backend(&self) -> Option<&Backend> {
        self.compiled.as_ref()
    }

    /// Reportes acumulados, en orden de emisión.
    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn take_reports(&mut self) -> Vec<Report> {
        std::mem::take(&mut self.reports)
    }

    /// Analiza un programa. Los enlaces de constantes previos se conservan.
    pub fn load(&mut self, name: &str, text: &str) -> bool {
        self.release();

        let program = match parse_str(name, text) {
            Ok(program) => program,
            Err(error) => {
                self.program = None;
                self.report(Severity::Error, error.to_string());
                return false;
            }
        };

        let bindings: Vec<(u8, String)> = (0..CONSTANT_REGISTERS)
            .filter_map(|register| {
                let name = self.constants.get(register)?.binding.clone()?;
                Some((register, name))
            })
            .collect();

        let mut constants = ConstantTable::from_program(&program);
        for (register, name) in bindings {
            if let Err(error) = constants.bind(register, name) {
                self.report(Severity::Bug, error.to_string());
            }
        }

        tracing::debug!(
            name,
            version = %program.version,
            instructions = program.instructions.len(),
            "pixel shader loaded"
        );

        self.constants = constants;
        self.program = Some(program);

        true
    }

    /// Enlaza un registro `c#` a una variable externa.
    pub fn bind_constant(&mut self, register: u8, name: &str) -> bool {
        match self.constants.bind(register, name) {
            Ok(()) => true,
            Err(error) => {
                self.report(Severity::Error, error.to_string());
                false
            }
        }
    }

    /// Compila el programa cargado. Un objeto compilado previo se libera
    /// antes de empezar.
    pub fn compile(&mut self) -> bool {
        self.release();

        let result = match &self.program {
            None => Err(String::from("No program has been loaded")),
            Some(program) => {
                let mut device = self.device.borrow_mut();
                let limits = &self.limits;

                dispatch_backend!(P: self.arch => {
                    P::compile(program, limits, &mut *device)
                        .map(Backend::from)
                        .map_err(|error| format!("Failed to compile for {}: {}", self.arch, error))
                })
            }
        };

        match result {
            Ok(backend) => {
                tracing::debug!(arch = %self.arch, "pixel shader compiled");
                self.compiled = Some(backend);
                true
            }

            Err(message) => {
                self.report(Severity::Error, message);
                false
            }
        }
    }

    pub fn activate(&mut self) -> bool {
        let result = match &self.compiled {
            None => Err(String::from("Cannot activate a shader that failed to compile")),
            Some(backend) => {
                let mut device = self.device.borrow_mut();
                dispatch_backend!(backend, pipeline => {
                    pipeline.activate(&mut *device).map_err(|error| error.to_string())
                })
            }
        };

        self.check(result)
    }

    pub fn deactivate(&mut self) {
        if let Some(backend) = &self.compiled {
            let mut device = self.device.borrow_mut();
            dispatch_backend!(backend, pipeline => pipeline.deactivate(&mut *device));
        }
    }

    /// Carga constantes y demás estado previo a un draw.
    pub fn setup_state(&mut self, lookup: &dyn VariableLookup) -> bool {
        let constants = &self.constants;
        let result = match &mut self.compiled {
            None => Err(String::from("Cannot set up state for a shader that failed to compile")),
            Some(backend) => {
                let mut device = self.device.borrow_mut();
                dispatch_backend!(backend, pipeline => {
                    pipeline
                        .setup_state(&mut *device, constants, lookup)
                        .map_err(|error| error.to_string())
                })
            }
        };

        self.check(result)
    }

    pub fn reset_state(&mut self) {
        if let Some(backend) = &mut self.compiled {
            let mut device = self.device.borrow_mut();
            dispatch_backend!(backend, pipeline => pipeline.reset_state(&mut *device));
        }
    }

    pub fn is_valid(&self) -> bool {
        self.compiled.is_some()
    }

    fn release(&mut self) {
        if let Some(backend) = self.compiled.take() {
            let mut device = self.device.borrow_mut();
            dispatch_backend!(backend, pipeline => pipeline.release(&mut *device));
        }
    }

    fn check(&mut self, result: Result<(), String>) -> bool {
        match result {
            Ok(()) => true,
            Err(message) => {
                self.report(Severity::Error, message);
                false
            }
        }
    }

    fn report(&mut self, severity: Severity, message: String) {
        let report = Report::new(severity, message);
        report.log();

        self.reports.push(report);
    }
}

impl<D: Device> Drop for PixelShader<D> {
    fn drop(&mut self) {
        let backend = match self.compiled.take() {
            Some(backend) => backend,
            None => return,
        };

        match self.device.try_borrow_mut() {
            Ok(mut device) => dispatch_backend!(backend, pipeline => pipeline.release(&mut *device)),
            Err(_) => tracing::warn!("device is busy, compiled shader objects leak"),
        }
    }
}
