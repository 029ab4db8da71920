//! Thin, `libc`-backed wrappers for the OS-level mechanics §9.6 of
//! SPEC_FULL describes as "external collaborators, interfaces only":
//! privilege drop, chroot, daemonization and the pidfile. None of this is
//! unit-tested — it requires root or process-level side effects — so it's
//! kept small and isolated at the edge of `main`, the way the rest of the
//! crate stays testable without it.
use std::ffi::CString;
use std::fs;
use std::io;
use std::path::Path;

use crate::config::UserSpec;
use crate::error::{DNSError, DNSResult};

/// Resolves `spec` via `getpwnam`/`getgrnam` and calls `setgid` then
/// `setuid`, in that order — group must drop first, since dropping the
/// user first would strip the privilege needed to change the group.
pub fn drop_privileges(spec: &UserSpec) -> DNSResult<()> {
    let user_cstr = CString::new(spec.user.as_str())
        .map_err(|_| DNSError::config("user name contains a NUL byte"))?;

    // SAFETY: getpwnam returns a pointer into a thread-local static buffer
    // owned by libc; we copy the fields we need out before any other libc
    // call that might reuse that buffer.
    let (uid, primary_gid) = unsafe {
        let pw = libc::getpwnam(user_cstr.as_ptr());
        if pw.is_null() {
            return Err(DNSError::config(format!("unknown user: {}", spec.user)));
        }
        ((*pw).pw_uid, (*pw).pw_gid)
    };

    let gid = match &spec.group {
        Some(group) => {
            let group_cstr = CString::new(group.as_str())
                .map_err(|_| DNSError::config("group name contains a NUL byte"))?;
            // SAFETY: same buffer-lifetime contract as getpwnam above.
            unsafe {
                let gr = libc::getgrnam(group_cstr.as_ptr());
                if gr.is_null() {
                    return Err(DNSError::config(format!("unknown group: {}", group)));
                }
                (*gr).gr_gid
            }
        }
        None => primary_gid,
    };

    // SAFETY: setgid/setuid are plain libc calls with no preconditions
    // beyond running with sufficient privilege, which the caller is
    // responsible for (this is invoked before any privilege is dropped).
    unsafe {
        if libc::setgid(gid) != 0 {
            return Err(DNSError::Io(io::Error::last_os_error()));
        }
        if libc::setuid(uid) != 0 {
            return Err(DNSError::Io(io::Error::last_os_error()));
        }
    }

    Ok(())
}

/// `chroot(dir)` followed by `chdir("/")`, per the usual ordering that
/// avoids leaving the working directory outside the new root.
pub fn chroot(dir: &Path) -> DNSResult<()> {
    let dir_cstr = CString::new(dir.to_string_lossy().as_bytes())
        .map_err(|_| DNSError::config("chroot path contains a NUL byte"))?;

    // SAFETY: chroot/chdir take a NUL-terminated path and have no other
    // preconditions beyond running with sufficient privilege.
    unsafe {
        if libc::chroot(dir_cstr.as_ptr()) != 0 {
            return Err(DNSError::Io(io::Error::last_os_error()));
        }
        let root = CString::new("/").unwrap();
        if libc::chdir(root.as_ptr()) != 0 {
            return Err(DNSError::Io(io::Error::last_os_error()));
        }
    }

    Ok(())
}

pub fn chdir(dir: &Path) -> DNSResult<()> {
    let dir_cstr = CString::new(dir.to_string_lossy().as_bytes())
        .map_err(|_| DNSError::config("workdir path contains a NUL byte"))?;

    // SAFETY: chdir takes a NUL-terminated path; no other preconditions.
    unsafe {
        if libc::chdir(dir_cstr.as_ptr()) != 0 {
            return Err(DNSError::Io(io::Error::last_os_error()));
        }
    }

    Ok(())
}

/// Forks and exits the parent, then calls `setsid` in the child so it
/// detaches from the controlling terminal. Only called when `-n`
/// (foreground) is absent.
pub fn daemonize() -> DNSResult<()> {
    // SAFETY: fork has no preconditions; the parent path exits
    // immediately and never touches Rust state concurrently with the
    // child, so there's no shared-state hazard across the fork.
    unsafe {
        match libc::fork() {
            -1 => return Err(DNSError::Io(io::Error::last_os_error())),
            0 => {
                if libc::setsid() == -1 {
                    return Err(DNSError::Io(io::Error::last_os_error()));
                }
            }
            _ => std::process::exit(0),
        }
    }

    Ok(())
}

/// Writes the current process's PID to `path`, truncating any existing
/// contents. Called after `daemonize()` so the file holds the child's PID.
pub fn write_pidfile(path: &Path) -> DNSResult<()> {
    let pid = std::process::id();
    fs::write(path, format!("{}\n", pid))?;
    Ok(())
}
