use std::os::unix::io::{AsRawFd, RawFd};

/// Sentinel meaning "no descriptor held".
const NONE: RawFd = -1;

/// A move-only, close-on-drop file descriptor. `release()` hands the
/// descriptor to code that will own and close it itself.
#[derive(Debug)]
pub struct Fd(RawFd);

impl Fd {
    /// Takes ownership of an already-open descriptor.
    ///
    /// # Safety
    /// `raw` must be a valid, open descriptor not owned elsewhere.
    pub unsafe fn from_raw(raw: RawFd) -> Fd {
        debug_assert!(raw >= 0);
        Fd(raw)
    }

    pub fn raw(&self) -> RawFd {
        self.0
    }

    /// Surrenders the descriptor without closing it. The `Fd` becomes the
    /// sentinel and will no longer close anything on drop.
    pub fn release(mut self) -> RawFd {
        let raw = self.0;
        self.0 = NONE;
        raw
    }

    fn is_live(&self) -> bool {
        self.0 != NONE
    }
}

impl AsRawFd for Fd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        if self.is_live() {
            // SAFETY: `self.0` is a descriptor we own exclusively; closing it
            // here is the one and only close in its lifetime.
            unsafe {
                libc::close(self.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_suppresses_close() {
        let (r, w) = unsafe {
            let mut fds = [0; 2];
            assert_eq!(libc::pipe(fds.as_mut_ptr()), 0);
            (Fd::from_raw(fds[0]), Fd::from_raw(fds[1]))
        };
        let raw = r.raw();
        let released = r.release();
        assert_eq!(raw, released);
        // We now own the close; clean up manually so the test doesn't leak.
        unsafe {
            libc::close(released);
        }
        drop(w);
    }

    #[test]
    fn drop_closes_exactly_once() {
        let mut fds = [0; 2];
        unsafe {
            assert_eq!(libc::pipe(fds.as_mut_ptr()), 0);
        }
        let fd = unsafe { Fd::from_raw(fds[0]) };
        drop(fd);
        // Second close on the same raw fd should now fail (EBADF), proving
        // drop actually closed it and isn't double-closing under the hood.
        let rc = unsafe { libc::close(fds[0]) };
        assert_eq!(rc, -1);
        unsafe {
            libc::close(fds[1]);
        }
    }
}
