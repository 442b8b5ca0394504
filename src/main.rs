//! Loads a trusted module built against `enclave-trusted-runtime`, issues
//! one `EnclaveCall`, and tears it down — a minimal demonstration of the
//! untrusted-side API, not a general-purpose enclave runner.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use enclave_ffi_types::{ParameterStack, Selector, USER_SELECTOR_BASE};
use enclave_host::{Backend, ExitCallTable, SimulatorBackend};

fn main() {
    pretty_env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = match args.next() {
        Some(p) => PathBuf::from(p),
        None => {
            eprintln!("usage: enclave-cli <path-to-trusted-module.so> [selector] [arg]");
            process::exit(2);
        }
    };
    let selector: Selector = args
        .next()
        .map(|s| s.parse().expect("selector must be an integer"))
        .unwrap_or(USER_SELECTOR_BASE);
    let arg: i32 = args
        .next()
        .map(|s| s.parse().expect("arg must be an i32"))
        .unwrap_or(0);

    let backend = SimulatorBackend::new();
    let exit_calls = Arc::new(ExitCallTable::new());
    let client = match backend.load(&path, exit_calls) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("failed to load {}: {}", path.display(), e);
            process::exit(1);
        }
    };

    log::info!("loaded {}", path.display());

    let mut params = ParameterStack::new(false);
    params.push_value(arg);
    match client.enclave_call(selector, &mut params) {
        Ok(()) => match params.pop_value::<i32>() {
            Ok(result) => println!("{}", result),
            Err(_) => log::warn!("call succeeded but returned no i32 frame"),
        },
        Err(e) => {
            eprintln!("enclave call failed: {}", e);
            client.destroy();
            process::exit(1);
        }
    }

    client.destroy();
}
