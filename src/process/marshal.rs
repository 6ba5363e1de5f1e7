/*!
 * Argument/Environment Marshalling
 * Converts an Executable into the NUL-terminated arrays execve() expects
 */

use super::executable::Executable;
use crate::core::errors::{ProcessError, ProcessResult};
use nix::libc::c_char;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;

/// execve()-ready image of an [`Executable`]
///
/// Everything is allocated up front so the forked child only touches
/// prepared memory before exec.
pub struct ExecImage {
    path: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
    // Pointers into the CString heap buffers above, NULL-terminated
    argv_ptrs: Vec<*const c_char>,
    envp_ptrs: Vec<*const c_char>,
}

impl ExecImage {
    /// argv = binary + arguments, envp = "key=value" per environment entry
    pub fn marshal(executable: &Executable) -> ProcessResult<Self> {
        let path = to_cstring(executable.binary.as_os_str().as_bytes(), "binary")?;

        let mut argv = Vec::with_capacity(executable.arguments.len() + 1);
        argv.push(path.clone());
        for arg in &executable.arguments {
            argv.push(to_cstring(arg.as_bytes(), "argument")?);
        }

        let envp = executable
            .environment
            .iter()
            .map(|(key, value)| {
                if key.contains('=') {
                    return Err(ProcessError::InvalidExecutable(format!(
                        "environment key '{}' contains '='",
                        key
                    )));
                }
                to_cstring(format!("{}={}", key, value).as_bytes(), "environment entry")
            })
            .collect::<ProcessResult<Vec<_>>>()?;

        let argv_ptrs = null_terminated(&argv);
        let envp_ptrs = null_terminated(&envp);

        Ok(Self {
            path,
            argv,
            envp,
            argv_ptrs,
            envp_ptrs,
        })
    }

    pub fn path(&self) -> &CString {
        &self.path
    }

    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    pub fn envp(&self) -> &[CString] {
        &self.envp
    }

    pub(crate) fn path_ptr(&self) -> *const c_char {
        self.path.as_ptr()
    }

    pub(crate) fn argv_ptr(&self) -> *const *const c_char {
        self.argv_ptrs.as_ptr()
    }

    pub(crate) fn envp_ptr(&self) -> *const *const c_char {
        self.envp_ptrs.as_ptr()
    }
}

fn to_cstring(bytes: &[u8], what: &str) -> ProcessResult<CString> {
    CString::new(bytes).map_err(|e| {
        ProcessError::InvalidExecutable(format!(
            "{} has a NUL byte at offset {}",
            what,
            e.nul_position()
        ))
    })
}

fn null_terminated(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}
