//! Punto de entrada ("driver").
//!
//! Este módulo expone una CLI que compila un programa contra alguno de
//! los back ends y muestra el resultado de una fase en específico.

use anyhow::{self, bail, Context};
use clap::{crate_version, Arg, Command};
use ps1x::{
    arch::{Arch, Recorder},
    error::Diagnostics,
    ir::Vector4,
    normalize, parse,
    source::Source,
    PixelShader,
};

use std::{
    cell::RefCell,
    fmt::Write as _,
    fs::{self, File},
    io::{self, Read, Write},
    rc::Rc,
};

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    // Parsing de CLI
    let args = Command::new("ps1x")
        .version(crate_version!())
        .about("PS1.x pixel shader compiler")
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .value_name("ARCH")
                .takes_value(true)
                .default_value("ati")
                .possible_values(["ati", "nv"])
                .help("Fixed-function pipeline to compile for"),
        )
        .arg(
            Arg::new("emit")
                .short('e')
                .long("emit")
                .value_name("STAGE")
                .takes_value(true)
                .default_value("calls")
                .possible_values(["ir", "normalized", "calls"])
                .help("Output of a specific compilation stage"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .takes_value(true)
                .value_name("FILE")
                .default_value("-")
                .help("Output file ('-' for stdout)"),
        )
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .required(true)
                .help("Program file ('-' for stdin)"),
        )
        .get_matches();

    let arg = |name: &str| args.get_one::<String>(name).map(String::as_str);

    let arch = match arg("target") {
        Some("nv") => Arch::Nv,
        _ => Arch::Ati,
    };

    let emit = arg("emit").unwrap_or("calls");
    let input = arg("input").unwrap_or("-");
    let output = arg("output").unwrap_or("-");

    let (name, text) = read_input(input)?;
    let source = Source::new(name, &text);

    let program = match parse::parse(&source) {
        Ok(program) => program,
        Err(error) => {
            eprint!("{}", Diagnostics::from(error));
            bail!("Failed to parse: {}", source.name());
        }
    };

    let rendered = match emit {
        "ir" => program.to_string(),

        // PS1.4 ya está en el modelo de registros final
        "normalized" if !program.version.is_legacy() => program.to_string(),
        "normalized" => normalize::normalize(&program)
            .context("Failed to normalize program")?
            .to_string(),

        _ => record_calls(arch, source.name(), &text)?,
    };

    write_output(output, &rendered)
}

fn read_input(input: &str) -> anyhow::Result<(String, String)> {
    if input == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read from stdin")?;

        Ok((String::from("<stdin>"), text))
    } else {
        let text = fs::read_to_string(input)
            .with_context(|| format!("Failed to open for reading: {}", input))?;

        Ok((input.to_string(), text))
    }
}

fn write_output(output: &str, rendered: &str) -> anyhow::Result<()> {
    match output {
        "-" => io::stdout()
            .write_all(rendered.as_bytes())
            .context("Failed to write to stdout"),

        path => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            file.write_all(rendered.as_bytes())
                .with_context(|| format!("Failed to write to file: {}", path))
        }
    }
}

/// Ejecuta un ciclo completo de compilación y draw sobre un [`Recorder`].
fn record_calls(arch: Arch, name: &str, text: &str) -> anyhow::Result<String> {
    let device = Rc::new(RefCell::new(Recorder::new()));
    let mut shader = PixelShader::new(Rc::clone(&device), arch.into())
        .with_context(|| format!("No {} back end is available", arch))?;

    let no_variables = |_: &str| -> Option<Vector4> { None };
    let succeeded = shader.load(name, text)
        && shader.compile()
        && shader.activate()
        && shader.setup_state(&no_variables);

    shader.deactivate();

    if !succeeded {
        let reports: Vec<String> = shader.reports().iter().map(ToString::to_string).collect();
        bail!("{}", reports.join("\n"));
    }

    let mut rendered = String::new();
    {
        let device = device.borrow();
        for call in device.calls() {
            writeln!(rendered, "{}", call)?;
        }

        for (list, calls) in device.lists() {
            writeln!(rendered, "\nlist {}:", list)?;
            for call in calls {
                writeln!(rendered, "    {}", call)?;
            }
        }
    }

    Ok(rendered)
}
