//! Utility functions for WASM setup.

/// Sets up the panic hook for better error messages.
///
/// Called when the WASM module initializes. Rust panics are redirected to
/// the browser console.
pub fn set_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Drops `value` on a later microtask.
///
/// Event listeners may close or drop the object that owns them; freeing a
/// wasm-bindgen closure while it runs is not allowed.
pub(crate) fn release<T: 'static>(value: T) {
    wasm_bindgen_futures::spawn_local(async move { drop(value) });
}
