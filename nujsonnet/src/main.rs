#![warn(
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications
)]
#![forbid(unsafe_code)]

use std::borrow::Cow;
use std::io::{Read as _, Write as _};
use std::path::Path;
use std::process::ExitCode;

use nujsonnet_front::Session;

mod cli;

#[global_allocator]
static GLOBAL_ALLOCATOR: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> ExitCode {
    match main_inner() {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Generic) => ExitCode::from(1),
        Err(RunError::Usage) => ExitCode::from(2),
    }
}

enum RunError {
    Generic,
    Usage,
}

fn main_inner() -> Result<(), RunError> {
    let args = match <cli::Cli as clap::Parser>::try_parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            return Err(RunError::Usage);
        }
    };

    if args.string && args.yaml_stream {
        eprintln!("error: cannot use '-S' / '--string' together with '-y' / '--yaml-stream'");
        return Err(RunError::Usage);
    }

    enum Input {
        File(String),
        Snippet(&'static str, String),
    }

    let input;
    if args.exec {
        input = Input::Snippet("<cmdline>", args.input.to_string_lossy().into_owned());
    } else if args.input == "-" {
        let mut data = String::new();
        match std::io::stdin().read_to_string(&mut data) {
            Ok(_) => input = Input::Snippet("<stdin>", data),
            Err(e) => {
                eprintln!("failed to read stdin: {e}");
                return Err(RunError::Generic);
            }
        }
    } else {
        input = Input::File(args.input.to_string_lossy().into_owned());
    }

    let mut session = Session::new();

    if let Some(max_stack) = args.max_stack {
        session.vm_mut().set_max_stack(max_stack);
    }
    if let Some(max_trace) = args.max_trace {
        session.vm_mut().set_max_trace(max_trace);
    }
    session.vm_mut().set_string_output(args.string);
    session.set_colored_output(std::env::var_os("NO_COLOR").map_or(true, |v| v.is_empty()));

    for path in args.jpath.iter().rev() {
        session.add_search_path(path.clone());
    }

    let mut ext_names = std::collections::HashSet::new();
    let mut check_ext = |var: &str| -> Result<(), RunError> {
        if !ext_names.insert(var.to_owned()) {
            eprintln!("error: external variable {var:?} defined more than once");
            return Err(RunError::Generic);
        }
        Ok(())
    };

    for arg in args.ext_str.iter() {
        check_ext(&arg.var)?;
        let value = get_opt_val(arg)?;
        session.vm_mut().ext_var(&arg.var, &value);
    }
    for arg in args.ext_str_file.iter() {
        check_ext(&arg.var)?;
        let value = read_text_file(&arg.file)?;
        session.vm_mut().ext_var(&arg.var, &value);
    }
    for arg in args.ext_code.iter() {
        check_ext(&arg.var)?;
        let code = get_opt_val(arg)?;
        session.vm_mut().ext_code(&arg.var, &code);
    }
    for arg in args.ext_code_file.iter() {
        check_ext(&arg.var)?;
        let code = format!("import {:?}", arg.file.display().to_string());
        session.vm_mut().ext_code(&arg.var, &code);
    }

    let mut tla_names = std::collections::HashSet::new();
    let mut check_tla = |var: &str| -> Result<(), RunError> {
        if !tla_names.insert(var.to_owned()) {
            eprintln!("error: top-level argument {var:?} defined more than once");
            return Err(RunError::Generic);
        }
        Ok(())
    };

    for arg in args.tla_str.iter() {
        check_tla(&arg.var)?;
        let value = get_opt_val(arg)?;
        session.vm_mut().tla_var(&arg.var, &value);
    }
    for arg in args.tla_str_file.iter() {
        check_tla(&arg.var)?;
        let value = read_text_file(&arg.file)?;
        session.vm_mut().tla_var(&arg.var, &value);
    }
    for arg in args.tla_code.iter() {
        check_tla(&arg.var)?;
        let code = get_opt_val(arg)?;
        session.vm_mut().tla_code(&arg.var, &code);
    }
    for arg in args.tla_code_file.iter() {
        check_tla(&arg.var)?;
        let code = format!("import {:?}", arg.file.display().to_string());
        session.vm_mut().tla_code(&arg.var, &code);
    }

    if let Some(ref dir_path) = args.multi {
        let files = match input {
            Input::File(ref path) => session.evaluate_file_multi(path),
            Input::Snippet(name, ref src) => session.evaluate_snippet_multi(name, src),
        };
        let Some(files) = files else {
            return Err(RunError::Generic);
        };
        let mut path_list = String::new();
        for (name, contents) in files.iter() {
            let path = dir_path.join(name);
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    eprintln!("error: failed to create {parent:?}: {e}");
                    return Err(RunError::Generic);
                }
            }
            if let Err(e) = std::fs::write(&path, contents.as_bytes()) {
                eprintln!("error: failed to write {path:?}: {e}");
                return Err(RunError::Generic);
            }
            path_list.push_str(&path.display().to_string());
            path_list.push('\n');
        }
        return write_output(args.output.as_deref(), &path_list);
    }

    let output = if args.yaml_stream {
        match input {
            Input::File(ref path) => session.evaluate_file_stream(path),
            Input::Snippet(name, ref src) => session.evaluate_snippet_stream(name, src),
        }
    } else {
        match input {
            Input::File(ref path) => session.evaluate_file(path),
            Input::Snippet(name, ref src) => session.evaluate_snippet(name, src),
        }
    };
    let Some(output) = output else {
        return Err(RunError::Generic);
    };
    write_output(args.output.as_deref(), &output)
}

fn write_output(output_path: Option<&Path>, output: &str) -> Result<(), RunError> {
    if let Some(output_path) = output_path {
        match std::fs::write(output_path, output.as_bytes()) {
            Ok(()) => Ok(()),
            Err(e) => {
                eprintln!("failed to write {output_path:?}: {e}");
                Err(RunError::Generic)
            }
        }
    } else {
        match std::io::stdout().write_all(output.as_bytes()) {
            Ok(()) => Ok(()),
            Err(e) => {
                eprintln!("failed to write to stdout: {e}");
                Err(RunError::Generic)
            }
        }
    }
}

fn get_opt_val(arg: &cli::VarOptVal) -> Result<Cow<'_, str>, RunError> {
    if let Some(ref value) = arg.val {
        Ok(Cow::Borrowed(value))
    } else if let Some(value) = std::env::var_os(&arg.var) {
        match value.into_string() {
            Ok(v) => Ok(Cow::Owned(v)),
            Err(v) => {
                eprintln!(
                    "error: value of environment variable {:?} is not valid unicode: {v:?}",
                    arg.var,
                );
                Err(RunError::Generic)
            }
        }
    } else {
        eprintln!("error: environment variable {:?} is not defined", arg.var);
        Err(RunError::Generic)
    }
}

fn read_text_file(path: &Path) -> Result<String, RunError> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("error: failed to read {path:?}: {e}");
            return Err(RunError::Generic);
        }
    };
    match String::from_utf8(data) {
        Ok(s) => Ok(s),
        Err(_) => {
            eprintln!("error: {path:?} is not valid UTF-8");
            Err(RunError::Generic)
        }
    }
}
