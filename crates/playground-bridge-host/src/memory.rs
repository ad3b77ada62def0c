//! Bounds-checked access to guest memory.

use wasmtime::{Caller, Extern};

use playground_bridge_common::HostFunctionError;
use playground_bridge_core::store::RuntimeContext;
use playground_bridge_core::handle::MEMORY_EXPORT;

/// Slice `len` bytes at `ptr` out of `data`.
///
/// # Errors
///
/// Returns [`HostFunctionError::OutOfBounds`] for negative values or a range
/// past the end of memory.
pub fn guest_slice(data: &[u8], ptr: i32, len: i32) -> Result<&[u8], HostFunctionError> {
    let out_of_bounds = || HostFunctionError::OutOfBounds {
        ptr: i64::from(ptr),
        len: i64::from(len),
    };

    let start = usize::try_from(ptr).map_err(|_| out_of_bounds())?;
    let len = usize::try_from(len).map_err(|_| out_of_bounds())?;
    let end = start.checked_add(len).ok_or_else(out_of_bounds)?;

    data.get(start..end).ok_or_else(out_of_bounds)
}

/// Copy bytes out of the calling instance's memory.
///
/// # Errors
///
/// Returns an error if the guest exports no memory or the range is invalid.
pub fn read_bytes(
    caller: &mut Caller<'_, RuntimeContext>,
    ptr: i32,
    len: i32,
) -> Result<Vec<u8>, HostFunctionError> {
    let memory = caller
        .get_export(MEMORY_EXPORT)
        .and_then(Extern::into_memory)
        .ok_or(HostFunctionError::MemoryNotExported)?;

    guest_slice(memory.data(&*caller), ptr, len).map(<[u8]>::to_vec)
}

/// Read a string out of the calling instance's memory.
///
/// Invalid UTF-8 sequences are replaced rather than rejected, so whatever
/// the runtime wrote still reaches the caller.
///
/// # Errors
///
/// Returns an error if the range is invalid.
pub fn read_string(
    caller: &mut Caller<'_, RuntimeContext>,
    ptr: i32,
    len: i32,
) -> Result<String, HostFunctionError> {
    let bytes = read_bytes(caller, ptr, len)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
