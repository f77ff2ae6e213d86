//! Loaded module enumeration.
//!
//! A module is the main executable or any shared library mapped into the
//! current process. Its base address is the lowest mapped address of its
//! image, which is what a disassembler's image-relative offsets are relative
//! to.

use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{CallgateError, CallgateResult};
use crate::types::Address;

/// A binary image loaded in the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule
{
    /// File name of the image (`libc.so.6`)
    pub name: String,
    /// Full path of the image as reported by the loader
    pub path: PathBuf,
    /// Lowest mapped address of the image
    pub base: Address,
}

impl LoadedModule
{
    fn new(path: PathBuf, base: usize) -> Self
    {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            path,
            base: Address::new(base),
        }
    }

    /// Whether `query` names this module.
    ///
    /// Accepts the full path, the file name, or the file name up to its first
    /// `.` (`libc` matches `libc.so.6`).
    #[must_use]
    pub fn matches(&self, query: &str) -> bool
    {
        if self.path == Path::new(query) || self.name == query {
            return true;
        }
        self.name.split('.').next().is_some_and(|stem| !stem.is_empty() && stem == query)
    }
}

/// List every module loaded in the current process, main executable first.
pub fn loaded_modules() -> Vec<LoadedModule>
{
    let modules = enumerate();
    trace!(count = modules.len(), "Enumerated loaded modules");
    modules
}

/// Base address of the module named `name`; an empty name selects the main executable.
///
/// ## Errors
///
/// - `ModuleNotFound`: nothing matches `name`
pub fn module_base_address(name: &str) -> CallgateResult<Address>
{
    let modules = loaded_modules();
    let query = name.trim();
    let found = if query.is_empty() {
        modules.first()
    } else {
        modules.iter().find(|module| module.matches(query))
    };
    found
        .map(|module| module.base)
        .ok_or_else(|| CallgateError::ModuleNotFound(name.to_string()))
}

#[cfg(target_os = "linux")]
fn enumerate() -> Vec<LoadedModule>
{
    use std::ffi::CStr;

    unsafe extern "C" fn collect(info: *mut libc::dl_phdr_info, _size: libc::size_t, data: *mut libc::c_void) -> libc::c_int
    {
        // SAFETY: `data` is the `Vec` passed to `dl_iterate_phdr` below and
        // `info` is valid for the duration of the callback.
        let modules = unsafe { &mut *data.cast::<Vec<LoadedModule>>() };
        let info = unsafe { &*info };

        let path = if info.dlpi_name.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(info.dlpi_name) }.to_string_lossy().into_owned()
        };

        let lowest_segment = if info.dlpi_phdr.is_null() || info.dlpi_phnum == 0 {
            0
        } else {
            let headers = unsafe { std::slice::from_raw_parts(info.dlpi_phdr, usize::from(info.dlpi_phnum)) };
            headers
                .iter()
                .filter(|header| header.p_type == libc::PT_LOAD)
                .map(|header| header.p_vaddr as usize)
                .min()
                .unwrap_or(0)
        };
        let base = (info.dlpi_addr as usize).wrapping_add(lowest_segment);

        // The loader reports the main executable with an empty name.
        let path = if path.is_empty() && modules.is_empty() {
            std::env::current_exe().unwrap_or_default()
        } else {
            PathBuf::from(path)
        };
        modules.push(LoadedModule::new(path, base));
        0
    }

    let mut modules: Vec<LoadedModule> = Vec::new();
    unsafe {
        libc::dl_iterate_phdr(Some(collect), (&mut modules as *mut Vec<LoadedModule>).cast());
    }
    modules
}

#[cfg(target_os = "macos")]
fn enumerate() -> Vec<LoadedModule>
{
    use std::ffi::CStr;

    let count = unsafe { libc::_dyld_image_count() };
    let mut modules = Vec::with_capacity(count as usize);
    for index in 0..count {
        unsafe {
            let header = libc::_dyld_get_image_header(index);
            let name = libc::_dyld_get_image_name(index);
            if header.is_null() || name.is_null() {
                continue;
            }
            let path = PathBuf::from(CStr::from_ptr(name).to_string_lossy().into_owned());
            modules.push(LoadedModule::new(path, header as usize));
        }
    }
    modules
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn enumerate() -> Vec<LoadedModule>
{
    Vec::new()
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_matches_path_name_and_stem()
    {
        let module = LoadedModule::new(PathBuf::from("/usr/lib/libc.so.6"), 0x7000_0000);
        assert!(module.matches("/usr/lib/libc.so.6"));
        assert!(module.matches("libc.so.6"));
        assert!(module.matches("libc"));
        assert!(!module.matches("libm"));
        assert!(!module.matches("LIBC"));
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    #[test]
    fn test_main_executable_is_listed_first()
    {
        let modules = loaded_modules();
        assert!(!modules.is_empty());
        assert!(!modules[0].base.is_null());
        assert_eq!(module_base_address("").unwrap(), modules[0].base);
    }

    #[test]
    fn test_unknown_module_is_not_found()
    {
        let err = module_base_address("definitely-not-loaded-module").unwrap_err();
        assert!(matches!(err, CallgateError::ModuleNotFound(_)));
    }
}
