use std::io::Write;
use std::{env, fs, io, process};

use loxwalk::error::{self, LoxError};
use loxwalk::{treewalk, Interpreter};

// sysexits.h: EX_USAGE and EX_IOERR
const EXIT_USAGE: i32 = 64;
const EXIT_IO: i32 = 74;

fn main() {
    init_tracing();

    let mut args = env::args();
    args.next()
        .expect("Program arguments should have at least one entry (typically the path of executable by default)");

    if args.len() > 1 {
        eprintln!("Usage: loxwalk [SCRIPT_PATH]");
        process::exit(EXIT_USAGE);
    } else if let Some(path) = args.next() {
        run_file(&path);
    } else if let Err(error) = run_prompt() {
        eprintln!("{error}");
        process::exit(EXIT_IO);
    }
}

// Logs go to stderr and only when RUST_LOG is set, so program output stays clean
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr).with_target(true).with_level(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn run_file(path: &str) {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) => {
            eprintln!("Could not read script at '{path}': {error}");
            process::exit(EXIT_IO);
        }
    };

    let mut stdout = io::stdout().lock();
    let result = treewalk::execute(&contents, &mut Interpreter::new(&mut stdout));
    if let Err(error) = result {
        display_error(&error);
        process::exit(error.exit_code());
    }
}

fn run_prompt() -> error::GenericResult<()> {
    println!("Welcome to the interactive prompt for the loxwalk interpreter.\n");

    let stdin = io::stdin();
    let mut output_writer = io::stdout();
    let mut interp = Interpreter::new(&mut output_writer);
    let mut buffer = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;
        if stdin.read_line(&mut buffer)? == 0 {
            println!();
            return Ok(());
        }
        if let Err(error) = treewalk::execute_repl_line(&buffer, &mut interp) {
            display_error(&error);
        }
        buffer.clear();
    }
}

fn display_error(error: &LoxError) {
    eprintln!("{error}");
}
