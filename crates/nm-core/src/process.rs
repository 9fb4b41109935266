//! Process identity helpers
//!
//! Utilities for naming the running manager process and the terminal it
//! was started from, so that nodes launched in terminals can be told apart.

use std::io::{self, Write};

/// Escape sequence that sets an xterm-compatible window title
pub fn terminal_title_sequence(name: &str) -> String {
    format!("\x1b]2;{}\x07", name)
}

/// Change the title of the controlling terminal.
///
/// Write errors are ignored; a missing or redirected stdout is not an error.
pub fn set_terminal_name(name: &str) {
    let mut stdout = io::stdout();
    let _ = stdout.write_all(terminal_title_sequence(name).as_bytes());
    let _ = stdout.flush();
}

/// Change the kernel-visible name of the current process.
///
/// Linux truncates the name to 15 bytes.
#[cfg(target_os = "linux")]
pub fn set_process_name(name: &str) -> io::Result<()> {
    use std::ffi::CString;

    let name = CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: PR_SET_NAME reads a NUL-terminated string that outlives the call.
    let result = unsafe {
        libc::prctl(
            libc::PR_SET_NAME,
            name.as_ptr() as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
        )
    };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_process_name(_name: &str) -> io::Result<()> {
    Ok(())
}
