//! Win32 producer objects
//!
//! The named mutex and the named file mapping the producer creates. Both are
//! opened per read and closed again before the guard is released.

use crate::error::FetchError;
use crate::hwinfo::lock::CrossProcessLock;
use crate::hwinfo::region::{MappedView, SharedRegion};
use std::ffi::c_void;
use std::time::Duration;
use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, HANDLE};
use windows_sys::Win32::System::Memory::{
    MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, VirtualQuery, FILE_MAP_READ,
    MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS,
};
use windows_sys::Win32::System::Threading::{OpenMutexW, ReleaseMutex, WaitForSingleObject};

const SYNCHRONIZE: u32 = 0x0010_0000;
const WAIT_OBJECT_0: u32 = 0x0000_0000;
const WAIT_ABANDONED: u32 = 0x0000_0080;
const WAIT_TIMEOUT: u32 = 0x0000_0102;

fn wide(name: &str) -> Vec<u16> {
    name.encode_utf16().chain(std::iter::once(0)).collect()
}

fn last_error() -> u32 {
    // SAFETY: reads thread-local error state only
    unsafe { GetLastError() }
}

/// The producer's named mutex
pub struct NamedMutex {
    name: Vec<u16>,
    display_name: String,
    handle: Option<HANDLE>,
}

// SAFETY: the handle is owned exclusively by this value and only used from the
// thread that currently owns it.
unsafe impl Send for NamedMutex {}

impl NamedMutex {
    pub fn new(name: &str) -> Self {
        Self {
            name: wide(name),
            display_name: name.to_string(),
            handle: None,
        }
    }
}

impl CrossProcessLock for NamedMutex {
    fn try_acquire(&mut self, timeout: Duration) -> Result<(), FetchError> {
        // SAFETY: `name` is a NUL-terminated UTF-16 string that outlives the call
        let handle = unsafe { OpenMutexW(SYNCHRONIZE, 0, self.name.as_ptr()) };
        if handle.is_null() {
            return Err(FetchError::LockFailure(format!(
                "OpenMutex({}) failed with error {}",
                self.display_name,
                last_error()
            )));
        }

        let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX - 1);
        // SAFETY: `handle` was just opened and is valid
        let wait = unsafe { WaitForSingleObject(handle, millis) };
        match wait {
            WAIT_OBJECT_0 | WAIT_ABANDONED => {
                if wait == WAIT_ABANDONED {
                    tracing::warn!(mutex = %self.display_name, "Producer mutex was abandoned");
                }
                self.handle = Some(handle);
                Ok(())
            }
            WAIT_TIMEOUT => {
                // SAFETY: `handle` is valid and not owned by us
                unsafe { CloseHandle(handle) };
                Err(FetchError::LockTimeout { timeout })
            }
            other => {
                let code = last_error();
                // SAFETY: as above
                unsafe { CloseHandle(handle) };
                Err(FetchError::LockFailure(format!(
                    "wait on {} returned {:#x} (error {})",
                    self.display_name, other, code
                )))
            }
        }
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            // SAFETY: `handle` is owned and was acquired by this thread
            unsafe {
                ReleaseMutex(handle);
                CloseHandle(handle);
            }
        }
    }
}

impl Drop for NamedMutex {
    fn drop(&mut self) {
        self.release();
    }
}

/// The producer's named file mapping
pub struct NamedFileMapping {
    name: Vec<u16>,
    display_name: String,
}

impl NamedFileMapping {
    pub fn new(name: &str) -> Self {
        Self {
            name: wide(name),
            display_name: name.to_string(),
        }
    }
}

impl SharedRegion for NamedFileMapping {
    fn map_view(&mut self) -> Result<Box<dyn MappedView + '_>, FetchError> {
        // SAFETY: `name` is a NUL-terminated UTF-16 string that outlives the call
        let mapping = unsafe { OpenFileMappingW(FILE_MAP_READ, 0, self.name.as_ptr()) };
        if mapping.is_null() {
            return Err(FetchError::MappingFailure(format!(
                "OpenFileMapping({}) failed with error {}",
                self.display_name,
                last_error()
            )));
        }

        // SAFETY: `mapping` is a valid file mapping handle
        let address = unsafe { MapViewOfFile(mapping, FILE_MAP_READ, 0, 0, 0) };
        if address.Value.is_null() {
            let code = last_error();
            // SAFETY: `mapping` is valid
            unsafe { CloseHandle(mapping) };
            return Err(FetchError::MappingFailure(format!(
                "MapViewOfFile({}) failed with error {}",
                self.display_name, code
            )));
        }

        // SAFETY: zeroed MEMORY_BASIC_INFORMATION is a valid out-parameter
        let mut info: MEMORY_BASIC_INFORMATION = unsafe { std::mem::zeroed() };
        // SAFETY: `address` is the base of a live view
        let written = unsafe {
            VirtualQuery(
                address.Value as *const c_void,
                &mut info,
                std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        let view = MappedFileView {
            mapping,
            address,
            len: if written == 0 { 0 } else { info.RegionSize },
        };
        if view.len == 0 {
            return Err(FetchError::MappingFailure(format!(
                "VirtualQuery on {} view failed with error {}",
                self.display_name,
                last_error()
            )));
        }
        Ok(Box::new(view))
    }
}

/// A live view; unmapped and closed on drop
struct MappedFileView {
    mapping: HANDLE,
    address: MEMORY_MAPPED_VIEW_ADDRESS,
    len: usize,
}

impl MappedView for MappedFileView {
    fn as_bytes(&self) -> &[u8] {
        // SAFETY: the view is mapped read-only for `len` bytes until drop
        unsafe { std::slice::from_raw_parts(self.address.Value as *const u8, self.len) }
    }
}

impl Drop for MappedFileView {
    fn drop(&mut self) {
        // SAFETY: both were obtained in `map_view` and are released exactly once
        unsafe {
            UnmapViewOfFile(self.address);
            CloseHandle(self.mapping);
        }
    }
}
