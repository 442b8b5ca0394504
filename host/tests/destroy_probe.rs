mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use enclave_ffi_types::ParameterStack;
use enclave_host::{Backend, ExitCallTable, SimulatorBackend};

/// Testable property: dropping the last owner of a non-closed client runs
/// `destroy()` implicitly, observed here through the probe counter
/// `with_destroy_probe` exists specifically to expose.
#[test]
fn dropping_the_last_owner_invokes_destroy_exactly_once() {
    let probe = Arc::new(AtomicUsize::new(0));
    let backend = SimulatorBackend::with_destroy_probe(Arc::clone(&probe));
    let client = backend
        .load(&support::fixture_cdylib_path(), Arc::new(ExitCallTable::new()))
        .unwrap();
    let co_owner = Arc::clone(&client);

    let mut params = ParameterStack::new(false);
    params.push_value(1i32);
    client
        .enclave_call(enclave_sim_fixture::selectors::TIMES_TWO, &mut params)
        .unwrap();
    assert_eq!(probe.load(Ordering::SeqCst), 0);

    drop(client);
    assert_eq!(probe.load(Ordering::SeqCst), 0, "a co-owner still holds the client open");

    drop(co_owner);
    assert_eq!(probe.load(Ordering::SeqCst), 1);
}

#[test]
fn explicit_destroy_before_the_last_drop_does_not_double_count() {
    let probe = Arc::new(AtomicUsize::new(0));
    let backend = SimulatorBackend::with_destroy_probe(Arc::clone(&probe));
    let client = backend
        .load(&support::fixture_cdylib_path(), Arc::new(ExitCallTable::new()))
        .unwrap();
    let co_owner = Arc::clone(&client);

    client.destroy();
    assert_eq!(probe.load(Ordering::SeqCst), 1);

    drop(client);
    drop(co_owner);
    assert_eq!(probe.load(Ordering::SeqCst), 1);
}
