//! Named POSIX semaphore wrapper built directly on libc FFI.
//!
//! `nix` does not wrap the named-semaphore family (`sem_open`/`sem_unlink`),
//! so this goes straight to libc, the same way the segment pool reaches past
//! higher-level crates for the shared-memory side in `shm.rs`.

use std::ffi::CString;
use std::os::raw::c_uint;

use anyhow::{anyhow, Context, Result};

/// A named semaphore, opened or created under a well-known name.
///
/// `wait`/`post` delegate straight to `sem_wait`/`sem_post`; both block with
/// no timeout, matching this crate's scheduling model.
pub struct NamedSemaphore {
    handle: *mut libc::sem_t,
    name: String,
}

unsafe impl Send for NamedSemaphore {}

impl NamedSemaphore {
    /// Creates a named semaphore at initial value 0. Unlinks any stale
    /// object under `name` first, so repeated startups are idempotent.
    pub fn create(name: &str, mode: u32) -> Result<Self> {
        let _ = unlink_name(name);
        let cname = CString::new(name).context("semaphore name contains NUL")?;
        let handle = unsafe {
            libc::sem_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                mode as libc::mode_t as c_uint,
                0 as c_uint,
            )
        };
        if handle == libc::SEM_FAILED {
            return Err(anyhow!(
                "sem_open({name}, O_CREAT|O_EXCL) failed: {}",
                std::io::Error::last_os_error()
            ));
        }
        Ok(Self {
            handle,
            name: name.to_string(),
        })
    }

    /// Opens an already-existing named semaphore.
    pub fn open(name: &str) -> Result<Self> {
        let cname = CString::new(name).context("semaphore name contains NUL")?;
        let handle = unsafe { libc::sem_open(cname.as_ptr(), 0) };
        if handle == libc::SEM_FAILED {
            return Err(anyhow!(
                "sem_open({name}) failed: {}",
                std::io::Error::last_os_error()
            ));
        }
        Ok(Self {
            handle,
            name: name.to_string(),
        })
    }

    /// Blocks until the value is greater than zero, then decrements it.
    /// No timeout, by design.
    pub fn wait(&self) -> Result<()> {
        let rc = unsafe { libc::sem_wait(self.handle) };
        if rc != 0 {
            return Err(anyhow!(
                "sem_wait({}) failed: {}",
                self.name,
                std::io::Error::last_os_error()
            ));
        }
        Ok(())
    }

    /// Increments the value and wakes one waiter if any.
    pub fn post(&self) -> Result<()> {
        let rc = unsafe { libc::sem_post(self.handle) };
        if rc != 0 {
            return Err(anyhow!(
                "sem_post({}) failed: {}",
                self.name,
                std::io::Error::last_os_error()
            ));
        }
        Ok(())
    }

    /// Reads the current value without blocking. Used by tests to confirm
    /// the ping-pong returns to 0 after a transaction.
    pub fn value(&self) -> Result<i32> {
        let mut val: libc::c_int = 0;
        let rc = unsafe { libc::sem_getvalue(self.handle, &mut val) };
        if rc != 0 {
            return Err(anyhow!(
                "sem_getvalue({}) failed: {}",
                self.name,
                std::io::Error::last_os_error()
            ));
        }
        Ok(val)
    }

    /// Removes this semaphore's name from the system. The daemon side never
    /// calls this — only the proxy worker owns unlinking.
    pub fn unlink(&self) -> Result<bool> {
        unlink_name(&self.name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.handle);
        }
    }
}

/// Removes a named semaphore if present. Returns `Ok(true)` if something
/// was actually unlinked, `Ok(false)` if it was already absent.
pub fn unlink_name(name: &str) -> Result<bool> {
    let cname = CString::new(name).context("semaphore name contains NUL")?;
    let rc = unsafe { libc::sem_unlink(cname.as_ptr()) };
    if rc == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ENOENT) {
        Ok(false)
    } else {
        Err(anyhow!("sem_unlink({name}) failed: {err}"))
    }
}
