use sol25::{parse_program, Interpreter, RuntimeError};
use std::env;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::process;
use tracing_subscriber::EnvFilter;

fn main()
{
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut dump_ast = false;
    let mut source_path: Option<String> = None;

    let mut idx = 1;
    while idx < args.len()
    {
        match args[idx].as_str()
        {
            "-h" | "--help" =>
            {
                print_usage(&args[0]);
                return;
            }
            "--dump-ast" => dump_ast = true,
            arg if arg.starts_with('-') =>
            {
                eprintln!("Unknown option '{arg}'.");
                print_usage(&args[0]);
                process::exit(10);
            }
            arg =>
            {
                if source_path.is_some()
                {
                    eprintln!("Only one program file can be given.");
                    print_usage(&args[0]);
                    process::exit(10);
                }
                source_path = Some(arg.to_string());
            }
        }
        idx += 1;
    }

    let source = match &source_path
    {
        Some(path) => match fs::read_to_string(path)
        {
            Ok(content) => content,
            Err(err) =>
            {
                eprintln!("Error reading file '{path}': {err}");
                process::exit(11);
            }
        },
        None =>
        {
            if io::stdin().is_terminal()
            {
                print_usage(&args[0]);
                return;
            }
            let mut content = String::new();
            if let Err(err) = io::stdin().read_to_string(&mut content)
            {
                eprintln!("Error reading standard input: {err}");
                process::exit(11);
            }
            content
        }
    };

    let program = match parse_program(&source)
    {
        Ok(program) => program,
        Err(err) => report(err),
    };

    if dump_ast
    {
        println!("{program:#?}");
        return;
    }

    let mut interpreter = Interpreter::new();
    if let Err(err) = interpreter.load_program(&program)
    {
        report(err);
    }
    if let Err(err) = interpreter.run_main()
    {
        report(err);
    }
}

fn report(err: RuntimeError) -> !
{
    eprintln!("sol25: {err}");
    process::exit(err.code());
}

fn print_usage(bin: &str)
{
    println!(
        "Usage: {bin} [options] [program.xml]
  -h, --help       Show this help
      --dump-ast   Print the parsed program and exit

The program is an XML AST document; it is read from standard input
when no file is given."
    );
}

fn init_tracing()
{
    let filter = EnvFilter::try_from_env("SOL25_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .compact()
        .init();
}
