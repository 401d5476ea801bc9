//! Canal de reportes y presentación de errores.
//!
//! Los errores con ubicación (análisis sintáctico) se presentan con la
//! línea original y un subrayado del rango afectado por medio de
//! [`Diagnostics`]. El resto de fallos llegan hasta la fachada como
//! [`Report`], que solo incluye severidad y mensaje.

use crate::source::{Located, Location};
use std::{
    error::Error,
    fmt::{self, Display},
};

mod sealed {
    pub trait Sealed {}
}

pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn location(&self) -> &Location;
}

/// Severidad de un reporte.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Notify,
    Warning,
    Error,
    Bug,
}

impl Display for Severity {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = match self {
            Severity::Debug => "debug",
            Severity::Notify => "notify",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Bug => "bug",
        };

        fmt.write_str(string)
    }
}

/// Un mensaje emitido hacia el invocador de la fachada.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub severity: Severity,
    pub message: String,
}

impl Report {
    pub fn new<S: Into<String>>(severity: Severity, message: S) -> Self {
        Report {
            severity,
            message: message.into(),
        }
    }

    /// Emite el reporte también a través de `tracing`.
    pub fn log(&self) {
        match self.severity {
            Severity::Debug => tracing::debug!("{}", self.message),
            Severity::Notify => tracing::info!("{}", self.message),
            Severity::Warning => tracing::warn!("{}", self.message),
            Severity::Error | Severity::Bug => tracing::error!("{}", self.message),
        }
    }
}

impl Display for Report {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: {}", self.severity, self.message)
    }
}

/// Errores con ubicación, presentados junto a la línea que los origina.
pub struct Diagnostics {
    errors: Vec<Box<dyn 'static + LocatedError>>,
}

impl<E: 'static + LocatedError> From<E> for Diagnostics {
    fn from(error: E) -> Self {
        Diagnostics {
            errors: vec![Box::new(error)],
        }
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.errors {
            underline(fmt, &**error)?;
        }

        let count = self.errors.len();
        let noun = if count == 1 { "error" } else { "errors" };
        writeln!(fmt, "Compilation failed with {} {}", count, noun)
    }
}

/// Mensaje, ubicación, línea original y subrayado del rango.
fn underline(fmt: &mut fmt::Formatter<'_>, error: &dyn LocatedError) -> fmt::Result {
    let location = error.location();
    let (start, end) = (location.start(), location.end());

    let line = start.line();
    let gutter = line.to_string().len();

    writeln!(fmt, "error: {}", error.source())?;
    writeln!(fmt, " --> {}", location)?;
    writeln!(fmt, "{:gutter$} |", "", gutter = gutter)?;

    location.source().with_line(line, |text| {
        writeln!(fmt, "{} | {}", line, text)
    })?;

    // Un diagnóstico nunca abarca más de una línea
    let skip = start.column().saturating_sub(1) as usize;
    let width = end.column().saturating_sub(start.column()).max(1) as usize;
    writeln!(
        fmt,
        "{:gutter$} | {:skip$}{}",
        "",
        "",
        "^".repeat(width),
        gutter = gutter,
        skip = skip
    )?;

    writeln!(fmt)
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.as_ref()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;
    use pretty_assertions::assert_eq;
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("Register out of range")]
    struct OutOfRange;

    #[test]
    fn located_errors_are_underlined() {
        let source = Source::new("<test>", "ps.1.1\nmov r0, c9\n");
        let error = Located::at(OutOfRange, Location::new(&source, 2, 9..11));

        assert_eq!(
            Diagnostics::from(error).to_string(),
            "error: Register out of range\n --> <test>:[2:9-2:10]\n  |\n2 | mov r0, c9\n  |         ^^\n\nCompilation failed with 1 error\n"
        );
    }

    #[test]
    fn reports_carry_their_severity() {
        let report = Report::new(Severity::Warning, "Eye constant c0 is undefined");
        assert_eq!(report.to_string(), "warning: Eye constant c0 is undefined");
        assert!(Severity::Bug > Severity::Error);
    }
}
