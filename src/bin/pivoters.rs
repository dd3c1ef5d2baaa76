//! Batch driver: read an LP (and optionally a basis), solve it, report the
//! outcome.
//!
//! Exit status: 0 once any terminating solver status is reached, 1 on an
//! input/output error, 2 on an internal solver error.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::process::ExitCode;

use pivoters::callback::{ConsoleSink, Logger, Verbosity};
use pivoters::interface::{basis, read_file, NameTables};
use pivoters::settings::{
    PricerSelection, RatioTesterSelection, ScalerSelection, Settings, SimplifierSelection,
    StarterSelection,
};
use pivoters::simplex::SimplexSolver;
use pivoters::{Status, E};

const DEFAULT_SETTINGS_FILE: &str = "default.set";
const OVERRIDE_SETTINGS_FILE: &str = "pivoters.set";

fn print_usage() {
    eprintln!("usage: pivoters [options] <lpfile>");
    eprintln!("  -e          entering (primal) algorithm");
    eprintln!("  -r          row representation");
    eprintln!("  -i          eta factorization updates");
    eprintln!("  -p<0..6>    pricer selection");
    eprintln!("  -t<0..3>    ratio tester selection");
    eprintln!("  -g<0..4>    scaler selection");
    eprintln!("  -c<0..3>    starter selection");
    eprintln!("  -s<0..1>    simplifier selection");
    eprintln!("  -f<tol>     feasibility tolerance");
    eprintln!("  -o<tol>     optimality tolerance");
    eprintln!("  -l<secs>    time limit");
    eprintln!("  -L<iters>   iteration limit");
    eprintln!("  -br<file>   read starting basis");
    eprintln!("  -bw<file>   write final basis");
    eprintln!("  -x          print the primal solution");
    eprintln!("  -y          print the dual solution");
    eprintln!("  -v<0..5>    verbosity");
}

struct Invocation {
    settings: Settings,
    filename: String,
    read_basis: Option<String>,
    write_basis: Option<String>,
    print_primal: bool,
    print_dual: bool,
    verbosity: Verbosity,
}

fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut inv = Invocation {
        settings: load_settings()?,
        filename: String::new(),
        read_basis: None,
        write_basis: None,
        print_primal: false,
        print_dual: false,
        verbosity: Verbosity::Info1,
    };

    let mut k = 0;
    while k < args.len() {
        let arg = &args[k];
        k += 1;
        if !arg.starts_with('-') {
            if !inv.filename.is_empty() {
                return Err(format!("unexpected extra argument '{}'", arg));
            }
            inv.filename = arg.clone();
            continue;
        }
        let (flag, rest) = {
            let mut chars = arg.chars();
            chars.next();
            (chars.next().unwrap_or(' '), chars.as_str())
        };
        let code = |rest: &str| -> Result<usize, String> {
            rest.parse::<usize>()
                .map_err(|_| format!("option -{} needs a numeric selector", flag))
        };
        let real = |rest: &str| -> Result<E, String> {
            rest.parse::<E>()
                .map_err(|_| format!("option -{} needs a numeric value", flag))
        };
        match flag {
            'e' => inv.settings.algorithm = pivoters::settings::Algorithm::Enter,
            'r' => inv.settings.representation = pivoters::settings::Representation::Row,
            'i' => inv.settings.factor_update = pivoters::settings::FactorUpdate::Eta,
            'p' => inv.settings.pricer = PricerSelection::from_code(code(rest)?),
            't' => inv.settings.ratiotester = RatioTesterSelection::from_code(code(rest)?),
            'g' => inv.settings.scaler = ScalerSelection::from_code(code(rest)?),
            'c' => inv.settings.starter = StarterSelection::from_code(code(rest)?),
            's' => {
                inv.settings.simplifier = if code(rest)? == 0 {
                    SimplifierSelection::Off
                } else {
                    SimplifierSelection::Main
                }
            }
            'f' => {
                let v = real(rest)?;
                inv.settings.feastol = v;
                inv.settings.fp_feastol = v;
            }
            'o' => {
                let v = real(rest)?;
                inv.settings.opttol = v;
                inv.settings.fp_opttol = v;
            }
            'l' => inv.settings.time_limit = real(rest)?,
            'L' => inv.settings.iter_limit = code(rest)? as i64,
            'b' => {
                let mut it = rest.chars();
                match (it.next(), it.as_str()) {
                    (Some('r'), file) if !file.is_empty() => {
                        inv.read_basis = Some(file.to_string())
                    }
                    (Some('w'), file) if !file.is_empty() => {
                        inv.write_basis = Some(file.to_string())
                    }
                    _ => return Err("use -br<file> or -bw<file>".to_string()),
                }
            }
            'x' => inv.print_primal = true,
            'y' => inv.print_dual = true,
            'v' => {
                inv.verbosity = match code(rest)? {
                    0 => Verbosity::Error,
                    1 => Verbosity::Warning,
                    2 => Verbosity::Info1,
                    3 => Verbosity::Info2,
                    4 => Verbosity::Info3,
                    _ => Verbosity::Debug,
                }
            }
            _ => return Err(format!("unknown option '{}'", arg)),
        }
    }
    if inv.filename.is_empty() {
        return Err("no input file given".to_string());
    }
    Ok(inv)
}

/// Dumps the defaults to `default.set` and applies the optional override
/// file.
fn load_settings() -> Result<Settings, String> {
    let defaults = Settings::default();
    if let Err(e) = defaults.save(DEFAULT_SETTINGS_FILE) {
        eprintln!("warning: could not save {}: {}", DEFAULT_SETTINGS_FILE, e);
    }
    if std::path::Path::new(OVERRIDE_SETTINGS_FILE).exists() {
        println!("applying settings from {}", OVERRIDE_SETTINGS_FILE);
        Settings::load(OVERRIDE_SETTINGS_FILE).map_err(|e| e.to_string())
    } else {
        Ok(defaults)
    }
}

fn run(inv: Invocation) -> Result<(), String> {
    let (lp, names): (pivoters::lp::LinearProgram, NameTables) =
        read_file(&inv.filename, inv.settings.objsense).map_err(|e| e.to_string())?;

    let logger = Logger::new(inv.verbosity, Box::new(ConsoleSink));
    let mut solver = SimplexSolver::with_logger(&lp, inv.settings.clone(), logger);

    if let Some(path) = &inv.read_basis {
        let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path, e))?;
        let desc = basis::read_basis(&text, &lp, &names).map_err(|e| e.to_string())?;
        solver.set_basis(desc).map_err(|e| e.to_string())?;
    }

    let start = std::time::Instant::now();
    let status = solver.solve().map_err(|e| e.to_string())?;
    let elapsed = start.elapsed().as_secs_f64();

    println!("status     : {}", status);
    let stats = solver.stats();
    println!("iterations : {}", stats.iterations);
    println!("refactors  : {}", stats.refactorizations);
    println!("flips      : {}", stats.bound_flips);
    println!("time       : {:.3}s", elapsed);

    if let Some(sol) = solver.solution() {
        if status == Status::Optimal {
            println!("objective  : {:.10e}", sol.objective);
        }
        if inv.print_primal {
            for (j, name) in names.cols.iter().enumerate() {
                if sol.primal[j] != 0. {
                    println!("{:<24} {:.10e}", name, sol.primal[j]);
                }
            }
        }
        if inv.print_dual {
            for (i, name) in names.rows.iter().enumerate() {
                if sol.duals[i] != 0. {
                    println!("{:<24} {:.10e}", name, sol.duals[i]);
                }
            }
        }
    }

    if let Some(path) = &inv.write_basis {
        let mut file = std::fs::File::create(path).map_err(|e| format!("{}: {}", path, e))?;
        basis::write_basis(&mut file, solver.descriptor(), &names)
            .map_err(|e| format!("{}: {}", path, e))?;
    }

    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let inv = match parse_args(&args) {
        Ok(inv) => inv,
        Err(message) => {
            eprintln!("error: {}", message);
            print_usage();
            return ExitCode::from(1);
        }
    };

    match catch_unwind(AssertUnwindSafe(|| run(inv))) {
        Ok(Ok(())) => ExitCode::from(0),
        Ok(Err(message)) => {
            eprintln!("error: {}", message);
            ExitCode::from(1)
        }
        Err(_) => {
            eprintln!("internal solver error");
            ExitCode::from(2)
        }
    }
}
