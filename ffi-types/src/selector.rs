/// A 64-bit handler identifier. The same space is used symmetrically on both
/// sides of the boundary, but the untrusted dispatch table and the trusted
/// entry registry keep independent maps.
pub type Selector = u64;

/// Invoked once at load, before `EnclaveCall` is usable.
pub const SEL_INIT: Selector = 0;
/// Invoked once at `Destroy`.
pub const SEL_FINI: Selector = 1;
/// Forces the client into a non-enterable state without necessarily
/// releasing trusted-side resources (see `Backend::leaks_memory_on_abort`).
pub const SEL_ABORT: Selector = 2;
/// Probes whether the trusted allocator can still satisfy a request of a
/// given size.
pub const SEL_TRUSTED_MALLOC_PROBE: Selector = 3;
/// Exit selector: probes whether the untrusted allocator can still satisfy a
/// request of a given size.
pub const SEL_UNTRUSTED_ALLOC_PROBE: Selector = 4;
/// Exit selector the initializer may invoke before returning from `SEL_INIT`.
pub const SEL_UNTRUSTED_INIT: Selector = 5;

/// Number of selector values reserved for runtime-internal use. Registering
/// a user handler in `0..RESERVED_SELECTOR_COUNT` is a configuration error.
pub const RESERVED_SELECTOR_COUNT: Selector = 16;

/// First selector value available to user code.
pub const USER_SELECTOR_BASE: Selector = RESERVED_SELECTOR_COUNT;
