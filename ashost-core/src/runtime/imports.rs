//! Default host imports.
//!
//! Installed under `env`, `Math` and `Date` before any embedder definitions.
//! The linker runs with shadowing enabled, so an embedder's own `env.abort`
//! (or any other name) replaces the default rather than colliding with it.

use wasmtime::{Caller, Linker};

use crate::abi::{IMPORT_MODULE, UNKNOWN_STRING, host_imports};
use crate::error::BridgeError;
use crate::heap::Heap;
use crate::marshal::string;
use crate::state::{self, HostState};

/// Define all default imports.
pub fn define_imports(linker: &mut Linker<HostState>) -> Result<(), anyhow::Error> {
    // --- Runtime ---
    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::ABORT,
        |mut caller: Caller<'_, HostState>,
         msg: u32,
         file: u32,
         line: u32,
         column: u32|
         -> wasmtime::Result<()> {
            let message = read_guest_string(&mut caller, msg);
            let file = read_guest_string(&mut caller, file);
            Err(BridgeError::Abort {
                message,
                file,
                line,
                column,
            }
            .into())
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::TRACE,
        |mut caller: Caller<'_, HostState>,
         msg: u32,
         n: i32,
         a0: f64,
         a1: f64,
         a2: f64,
         a3: f64,
         a4: f64| {
            let message = read_guest_string(&mut caller, msg);
            log::info!("{}", format_trace(&message, n, &[a0, a1, a2, a3, a4]));
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::SEED,
        |_caller: Caller<'_, HostState>| -> f64 { state::system_millis() },
    )?;

    // --- Math ---
    for &name in host_imports::MATH_UNARY {
        if let Some(f) = math_unary(name) {
            linker.func_wrap(
                host_imports::MATH_MODULE,
                name,
                move |_caller: Caller<'_, HostState>, x: f64| -> f64 { f(x) },
            )?;
        }
    }

    for &name in host_imports::MATH_BINARY {
        if let Some(f) = math_binary(name) {
            linker.func_wrap(
                host_imports::MATH_MODULE,
                name,
                move |_caller: Caller<'_, HostState>, x: f64, y: f64| -> f64 { f(x, y) },
            )?;
        }
    }

    linker.func_wrap(
        host_imports::MATH_MODULE,
        host_imports::MATH_RANDOM,
        |mut caller: Caller<'_, HostState>| -> f64 { caller.data_mut().next_random() },
    )?;

    // --- Date ---
    linker.func_wrap(
        host_imports::DATE_MODULE,
        host_imports::DATE_NOW,
        |_caller: Caller<'_, HostState>| -> f64 { state::system_millis() },
    )?;

    Ok(())
}

/// Best-effort string read for diagnostics: never fails, and does not insist
/// on the string tag since the guest may be in a broken state.
fn read_guest_string(caller: &mut Caller<'_, HostState>, ptr: u32) -> String {
    let Some(memory) = state::caller_memory(caller) else {
        return UNKNOWN_STRING.to_string();
    };
    if ptr == 0 {
        return "null".to_string();
    }
    match Heap::new(memory.data(&*caller)).any_object(ptr) {
        Ok(object) => string::decode(object.payload),
        Err(e) => format!("<{e}>"),
    }
}

/// `trace: <msg>` followed by the first `n` arguments.
pub fn format_trace(message: &str, n: i32, args: &[f64]) -> String {
    let n = n.clamp(0, args.len() as i32) as usize;
    let mut out = format!("trace: {message}");
    if n > 0 {
        out.push(' ');
        let rendered: Vec<String> = args[..n].iter().map(|a| a.to_string()).collect();
        out.push_str(&rendered.join(", "));
    }
    out
}

fn math_unary(name: &str) -> Option<fn(f64) -> f64> {
    let f: fn(f64) -> f64 = match name {
        "abs" => f64::abs,
        "acos" => f64::acos,
        "acosh" => f64::acosh,
        "asin" => f64::asin,
        "asinh" => f64::asinh,
        "atan" => f64::atan,
        "atanh" => f64::atanh,
        "cbrt" => f64::cbrt,
        "ceil" => f64::ceil,
        "cos" => f64::cos,
        "cosh" => f64::cosh,
        "exp" => f64::exp,
        "expm1" => f64::exp_m1,
        "floor" => f64::floor,
        "fround" => |x| x as f32 as f64,
        "log" => f64::ln,
        "log10" => f64::log10,
        "log1p" => f64::ln_1p,
        "log2" => f64::log2,
        "round" => round_half_up,
        "sign" => |x| {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                x
            }
        },
        "sin" => f64::sin,
        "sinh" => f64::sinh,
        "sqrt" => f64::sqrt,
        "tan" => f64::tan,
        "tanh" => f64::tanh,
        "trunc" => f64::trunc,
        _ => return None,
    };
    Some(f)
}

/// Halves round towards +infinity; a zero result keeps the sign of `x`.
fn round_half_up(x: f64) -> f64 {
    let floor = x.floor();
    let rounded = if x - floor >= 0.5 { floor + 1.0 } else { floor };
    if rounded == 0.0 { rounded.copysign(x) } else { rounded }
}

fn math_binary(name: &str) -> Option<fn(f64, f64) -> f64> {
    let f: fn(f64, f64) -> f64 = match name {
        "atan2" => f64::atan2,
        "hypot" => f64::hypot,
        "max" => |a, b| if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) },
        "min" => |a, b| if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) },
        "pow" => f64::powf,
        _ => return None,
    };
    Some(f)
}
