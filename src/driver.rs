use std::fs;
use std::path::PathBuf;
use std::process::Command;

use inkwell::context::Context;
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine,
};
use inkwell::OptimizationLevel;
use thiserror::Error;

use crate::codegen::CodeGen;
use crate::lexer::Lexer;
use crate::parser::Parser;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{0}")]
    Usage(String),
    #[error("Could not read {}: {source}", .path.display())]
    SourceRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}", .errors.join("\n"))]
    Parse { errors: Vec<String> },
    #[error("{0}")]
    Backend(String),
}

impl DriverError {
    /// Process exit code for the error class: usage errors exit 64, source
    /// I/O errors 66, everything else 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            DriverError::Usage(_) => 64,
            DriverError::SourceRead { .. } => 66,
            DriverError::Parse { .. } | DriverError::Backend(_) => 1,
        }
    }
}

/// Parsed command line: positional source paths plus `--dump`, `--release`,
/// and `--output NAME`.
#[derive(Debug, PartialEq, Eq)]
pub struct Options {
    pub sources: Vec<PathBuf>,
    pub dump: bool,
    pub release: bool,
    pub output: String,
}

impl Options {
    pub fn parse(args: impl Iterator<Item = String>) -> Result<Options, DriverError> {
        let mut args = args;
        let mut sources = Vec::new();
        let mut dump = false;
        let mut release = false;
        let mut output = String::from("program");

        while let Some(argument) = args.next() {
            match argument.as_str() {
                "--dump" => dump = true,
                "--release" => release = true,
                "--output" => {
                    output = args.next().ok_or_else(|| {
                        DriverError::Usage("Expected an output name after --output".to_string())
                    })?;
                }
                _ => sources.push(PathBuf::from(argument)),
            }
        }

        if sources.is_empty() {
            return Err(DriverError::Usage("Expected source files".to_string()));
        }

        Ok(Options {
            sources,
            dump,
            release,
            output,
        })
    }
}

/// Compiles every source file to an object file and links the results into
/// the output executable. With `--dump`, prints each module's IR instead.
pub fn run(options: &Options) -> Result<(), DriverError> {
    Target::initialize_all(&InitializationConfig::default());

    let triple = TargetMachine::get_default_triple();
    let target =
        Target::from_triple(&triple).map_err(|error| DriverError::Backend(error.to_string()))?;
    let target_machine = target
        .create_target_machine(
            &triple,
            "generic",
            "",
            OptimizationLevel::Default,
            RelocMode::Default,
            CodeModel::Default,
        )
        .ok_or_else(|| {
            DriverError::Backend(format!(
                "No target machine for {}",
                triple.as_str().to_string_lossy()
            ))
        })?;

    let context = Context::create();
    let mut object_files = Vec::new();

    for path in &options.sources {
        let source = fs::read_to_string(path).map_err(|error| DriverError::SourceRead {
            path: path.clone(),
            source: error,
        })?;

        let mut parser = Parser::new(Lexer::new(&source));
        let program = parser.parse_program();
        if !parser.errors().is_empty() {
            return Err(DriverError::Parse {
                errors: parser.errors().to_vec(),
            });
        }

        let codegen = CodeGen::new(&context);
        let module = codegen
            .compile_module(path, &program, options.release)
            .map_err(|error| DriverError::Backend(error.to_string()))?;

        if options.dump {
            println!("{}", module.print_to_string().to_string());
            continue;
        }

        module.set_triple(&triple);
        module.set_data_layout(&target_machine.get_target_data().get_data_layout());

        let object_path = path.with_extension("o");
        target_machine
            .write_to_file(&module, FileType::Object, &object_path)
            .map_err(|error| DriverError::Backend(error.to_string()))?;
        object_files.push(object_path);
    }

    if options.dump {
        return Ok(());
    }

    link(&object_files, &options.output)
}

/// Links the emitted objects with the platform C compiler driver.
fn link(object_files: &[PathBuf], output: &str) -> Result<(), DriverError> {
    let status = Command::new("cc")
        .args(object_files)
        .arg("-o")
        .arg(output)
        .status()
        .map_err(|error| DriverError::Backend(format!("Could not run linker: {error}")))?;

    if !status.success() {
        return Err(DriverError::Backend(format!(
            "Linker exited with {status}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, DriverError> {
        Options::parse(args.iter().map(|argument| argument.to_string()))
    }

    #[test]
    fn source_files_are_positional() {
        let options = parse(&["main.sol", "util.sol"]).expect("options");
        assert_eq!(
            options.sources,
            vec![PathBuf::from("main.sol"), PathBuf::from("util.sol")]
        );
        assert!(!options.dump);
        assert!(!options.release);
        assert_eq!(options.output, "program");
    }

    #[test]
    fn flags_are_recognized_in_any_order() {
        let options = parse(&["--release", "main.sol", "--dump"]).expect("options");
        assert!(options.dump);
        assert!(options.release);
    }

    #[test]
    fn output_takes_the_following_argument() {
        let options = parse(&["--output", "solar_demo", "main.sol"]).expect("options");
        assert_eq!(options.output, "solar_demo");
        assert_eq!(options.sources, vec![PathBuf::from("main.sol")]);
    }

    #[test]
    fn missing_output_name_is_a_usage_error() {
        let error = parse(&["main.sol", "--output"]).expect_err("usage error");
        assert_eq!(error.exit_code(), 64);
    }

    #[test]
    fn missing_sources_are_a_usage_error() {
        let error = parse(&["--dump"]).expect_err("usage error");
        assert_eq!(error.exit_code(), 64);
        assert!(error.to_string().contains("Expected source files"));
    }

    #[test]
    fn exit_codes_map_by_error_class() {
        let io_error = DriverError::SourceRead {
            path: PathBuf::from("missing.sol"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(io_error.exit_code(), 66);

        let parse_error = DriverError::Parse {
            errors: vec!["[line 1] Error at !: boom".to_string()],
        };
        assert_eq!(parse_error.exit_code(), 1);
        assert!(parse_error.to_string().contains("[line 1]"));

        assert_eq!(DriverError::Backend("nope".to_string()).exit_code(), 1);
    }
}
