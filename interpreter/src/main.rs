use std::cell::RefCell;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::{env, fs, thread};

use carrion::enhanced::{render, EnhancedError, ErrorCategory};
use carrion::{Config, Error, Interpreter, Parser};
use log::{error, LevelFilter};

// The evaluator recurses on the native stack for every nested call and expression
const STACK_SIZE: usize = 64 * 1024 * 1024;

fn main() -> ExitCode {
    let mut config = Config::from_env();
    let mut file = None;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--debug" => config.debug = true,
            "-h" | "--help" => {
                println!("usage: carrion [--debug] [file.crl]");
                return ExitCode::SUCCESS;
            }
            _ if file.is_none() => file = Some(PathBuf::from(arg)),
            _ => {
                eprintln!("usage: carrion [--debug] [file.crl]");
                return ExitCode::from(2);
            }
        }
    }

    let mut logger = env_logger::Builder::from_default_env();
    if config.debug {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    let runner = thread::Builder::new()
        .name(String::from("carrion"))
        .stack_size(STACK_SIZE)
        .spawn(move || execute(file.as_deref(), config));

    match runner.map(|handle| handle.join()) {
        Ok(Ok(true)) => ExitCode::SUCCESS,
        Ok(Ok(false)) => ExitCode::FAILURE,
        Ok(Err(_)) => {
            error!("interpreter thread panicked");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("could not start interpreter: {}", err);
            ExitCode::FAILURE
        }
    }
}

// Returns whether the program ran to completion
fn execute(path: Option<&Path>, config: Config) -> bool {
    let src = match read_source(path) {
        Ok(src) => src,
        Err(err) => {
            let enhanced = EnhancedError::new(ErrorCategory::Io, "IOError", &err.to_string());
            eprint!("{}", render(&enhanced, None));
            return false;
        }
    };
    let file: Option<Rc<str>> = path.map(|path| Rc::from(path.display().to_string()));

    let mut parser = Parser::new(&src);
    let program = parser.parse_program();
    if !parser.diagnostics().is_empty() {
        for err in EnhancedError::from_parse_errors(parser.diagnostics(), file) {
            eprint!("{}", render(&err, Some(&src)));
        }
        return false;
    }

    let stdout: Rc<RefCell<io::Stdout>> = Rc::new(RefCell::new(io::stdout()));
    let mut interpreter = Interpreter::with_config(stdout, config);
    if let Some(file) = &file {
        interpreter.set_file(file);
    }

    match interpreter.interpret(&program) {
        Ok(_) => true,
        Err(err) => {
            eprint!("{}", render(&EnhancedError::from_error(&err), Some(&src)));
            false
        }
    }
}

fn read_source(path: Option<&Path>) -> Result<String, Error> {
    match path {
        Some(path) => fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        }),
        None => {
            let mut src = String::new();
            io::stdin()
                .read_to_string(&mut src)
                .map_err(|source| Error::Io {
                    path: PathBuf::from("<stdin>"),
                    source,
                })?;
            Ok(src)
        }
    }
}
